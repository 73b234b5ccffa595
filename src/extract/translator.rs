use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::client::query::{capitalize_language, count_query, page_query, page_query_by_ids};
use crate::client::{Binding, SparqlEndpoint};
use crate::error::ExtractError;
use crate::table::{EntityKey, LabelPair, TranslationTable};

const DEFAULT_LIMIT: usize = 5_000;
const DEFAULT_VALUES_BATCH_SIZE: usize = 200;

/// Extraction paginée des labels d'une propriété Wikidata, une langue à la
/// fois, fusionnée en une table large sur (entité, valeur de propriété).
pub struct Translator<C: SparqlEndpoint> {
    client: Arc<C>,
    property: String,
    languages: Vec<String>,
    limit: usize,
    values_batch_size: usize,
}

impl<C: SparqlEndpoint> Translator<C> {
    pub fn new(client: Arc<C>, property: impl Into<String>, languages: Vec<String>) -> Self {
        Self {
            client,
            property: property.into(),
            languages,
            limit: DEFAULT_LIMIT,
            values_batch_size: DEFAULT_VALUES_BATCH_SIZE,
        }
    }

    /// Taille des fenêtres OFFSET. Plus grand accélère l'extraction mais
    /// augmente le risque de dépasser la limite de temps par requête.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Taille des lots VALUES; à garder petit pour éviter l'erreur 414.
    pub fn with_values_batch_size(mut self, size: usize) -> Self {
        self.values_batch_size = size.max(1);
        self
    }

    /// Extrait toutes les entités portant la propriété, par fenêtres
    /// d'offset. Le nombre d'entités est d'abord compté, puis exactement
    /// `langues × lots` requêtes sont émises.
    ///
    /// L'endpoint est interrogé en direct, sans isolation: si l'ensemble
    /// des entités change entre deux pages, des lignes peuvent être
    /// manquées ou dupliquées malgré le tri par ?entity.
    pub fn translate(&self) -> Result<TranslationTable, ExtractError> {
        let count = self.count_entities()?;
        let batch_count = count.div_ceil(self.limit);
        self.run(batch_count, |language, batch| {
            page_query(&self.property, language, batch * self.limit, self.limit)
        })
    }

    /// Extrait uniquement les entités dont la valeur de propriété figure
    /// dans `ids`, par lots VALUES. Aucune requête de comptage n'est émise.
    pub fn translate_ids(&self, ids: &[String]) -> Result<TranslationTable, ExtractError> {
        let batch_count = ids.len().div_ceil(self.values_batch_size);
        self.run(batch_count, |language, batch| {
            let start = batch * self.values_batch_size;
            let end = (start + self.values_batch_size).min(ids.len());
            page_query_by_ids(&self.property, language, &ids[start..end])
        })
    }

    fn run(
        &self,
        batch_count: usize,
        query_for: impl Fn(&str, usize) -> String,
    ) -> Result<TranslationTable, ExtractError> {
        let mut table = TranslationTable::new(self.languages.clone());
        info!(
            queries = batch_count * self.languages.len(),
            property = %self.property,
            "message" = "démarrage des requêtes d'extraction"
        );

        for language in &self.languages {
            info!(%language, "message" = "début des requêtes pour la langue");
            let cap = capitalize_language(language);
            let mut partial: BTreeMap<EntityKey, LabelPair> = BTreeMap::new();

            // Chaque lot est émis même si un lot précédent était vide: le
            // nombre d'appels ne dépend que du comptage initial.
            for batch in 0..batch_count {
                let query = query_for(language, batch);
                for row in self.client.execute(&query)? {
                    let (key, pair) = binding_row(&row, &cap)?;
                    partial.insert(key, pair);
                }
            }

            // Fusion seulement une fois la langue complète, pour ne jamais
            // dupliquer une clé à cheval sur deux pages.
            table.merge_language(language, partial);
        }

        Ok(table)
    }

    fn count_entities(&self) -> Result<usize, ExtractError> {
        info!(property = %self.property, "message" = "comptage des entités portant la propriété");
        let rows = self.client.execute(&count_query(&self.property))?;
        let count = rows
            .first()
            .and_then(|row| row.get("nb_elem"))
            .ok_or_else(|| {
                ExtractError::Malformed(
                    "la requête de comptage n'a pas renvoyé de variable nb_elem".to_string(),
                )
            })?
            .parse::<usize>()
            .map_err(|err| {
                ExtractError::Malformed(format!("comptage d'entités illisible: {err}"))
            })?;
        debug!(count, "message" = "entités trouvées pour la propriété");
        Ok(count)
    }
}

fn binding_row(row: &Binding, lang_cap: &str) -> Result<(EntityKey, LabelPair), ExtractError> {
    let entity = row.get("entity").ok_or_else(|| {
        ExtractError::Malformed("ligne de résultat sans variable entity".to_string())
    })?;
    let value_property = row.get("value_property").ok_or_else(|| {
        ExtractError::Malformed("ligne de résultat sans variable value_property".to_string())
    })?;

    let label = row.get(&format!("label{lang_cap}")).cloned();
    // GROUP_CONCAT sans alternatif renvoie une chaîne vide: normalisée en
    // None pour rester distinguable d'un agrégat vidé après déduplication.
    let alt = row
        .get(&format!("alt{lang_cap}"))
        .filter(|value| !value.is_empty())
        .cloned();

    Ok((
        EntityKey::new(entity.clone(), value_property.clone()),
        LabelPair { label, alt },
    ))
}
