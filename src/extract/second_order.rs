use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::client::query::capitalize_language;
use crate::client::SparqlEndpoint;
use crate::error::ExtractError;
use crate::extract::Translator;
use crate::table::{LabelPair, LinkTable, Record};

/// Provenance d'une ligne: directement la propriété principale, ou obtenue
/// via la jointure avec une propriété auxiliaire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Degree {
    First,
    Second,
}

impl fmt::Display for Degree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degree::First => write!(f, "First"),
            Degree::Second => write!(f, "Second"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecondOrderRow {
    pub entity: String,
    pub value_property: String,
    pub labels: BTreeMap<String, LabelPair>,
    pub id_auxiliary: Option<String>,
    pub name_auxiliary: Option<String>,
    pub source_degree: Degree,
}

/// Résultat du second ordre: l'union des lignes de premier degré et des
/// lignes jointes via les ontologies auxiliaires, sans doublons exacts.
#[derive(Debug, Clone, Default)]
pub struct SecondOrderTable {
    languages: Vec<String>,
    rows: Vec<SecondOrderRow>,
}

impl SecondOrderTable {
    pub fn rows(&self) -> &[SecondOrderRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn to_records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| {
                let mut record = Record::new();
                record.insert("entity".to_string(), Some(row.entity.clone()));
                record.insert(
                    "value_property".to_string(),
                    Some(row.value_property.clone()),
                );
                for language in &self.languages {
                    let cap = capitalize_language(language);
                    let pair = row.labels.get(language);
                    record.insert(
                        format!("label{cap}"),
                        pair.and_then(|p| p.label.clone()),
                    );
                    record.insert(format!("alt{cap}"), pair.and_then(|p| p.alt.clone()));
                }
                record.insert("id_auxiliary".to_string(), row.id_auxiliary.clone());
                record.insert("name_auxiliary".to_string(), row.name_auxiliary.clone());
                record.insert(
                    "source_degree".to_string(),
                    Some(row.source_degree.to_string()),
                );
                record
            })
            .collect()
    }
}

/// Orchestration du second ordre: une passe sur la propriété principale,
/// puis une passe par propriété auxiliaire, jointe sur la table de liens.
pub struct SecondOrder<C: SparqlEndpoint> {
    client: Arc<C>,
    main_property: String,
    links: LinkTable,
    auxiliaries: Vec<(String, String)>,
    languages: Vec<String>,
    limit: usize,
    values_batch_size: usize,
    all_elem: bool,
}

const DEFAULT_LIMIT: usize = 5_000;
// Plus bas que pour une extraction simple: les requêtes du second ordre
// cumulent déjà des clauses VALUES sur plusieurs propriétés.
const DEFAULT_VALUES_BATCH_SIZE: usize = 100;

impl<C: SparqlEndpoint> SecondOrder<C> {
    pub fn new(
        client: Arc<C>,
        main_property: impl Into<String>,
        links: LinkTable,
        auxiliaries: Vec<(String, String)>,
        languages: Vec<String>,
    ) -> Self {
        Self {
            client,
            main_property: main_property.into(),
            links,
            auxiliaries,
            languages,
            limit: DEFAULT_LIMIT,
            values_batch_size: DEFAULT_VALUES_BATCH_SIZE,
            all_elem: true,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn with_values_batch_size(mut self, size: usize) -> Self {
        self.values_batch_size = size.max(1);
        self
    }

    /// `true` (défaut): la passe principale extrait toutes les entités
    /// portant la propriété; `false`: seulement les valeurs présentes dans
    /// la table de liens.
    pub fn with_all_elem(mut self, all_elem: bool) -> Self {
        self.all_elem = all_elem;
        self
    }

    pub fn translate(&self) -> Result<SecondOrderTable, ExtractError> {
        let mut rows = Vec::new();

        // Passe de premier degré sur la propriété principale.
        let main_table = if self.all_elem {
            self.translator(&self.main_property).translate()?
        } else {
            let values = self.links.distinct_values();
            self.translator(&self.main_property).translate_ids(&values)?
        };
        info!(
            rows = main_table.len(),
            "message" = "traductions de la propriété principale obtenues"
        );
        for (key, cells) in main_table.rows() {
            rows.push(SecondOrderRow {
                entity: key.entity.clone(),
                value_property: key.value_property.clone(),
                labels: cells.clone(),
                id_auxiliary: None,
                name_auxiliary: None,
                source_degree: Degree::First,
            });
        }

        // Une passe par propriété auxiliaire, restreinte aux identifiants
        // de son ontologie, puis jointure interne sur id_auxiliary: un
        // identifiant absent du résultat ne produit aucune ligne.
        for (property, ontology) in &self.auxiliaries {
            info!(%property, %ontology, "message" = "début des requêtes pour la propriété auxiliaire");
            let ids = self.links.distinct_auxiliary_ids(ontology);
            let auxiliary_table = self.translator(property).translate_ids(&ids)?;

            for (key, cells) in auxiliary_table.rows() {
                // La valeur de propriété du résultat auxiliaire joue le
                // rôle d'identifiant auxiliaire dans la jointure.
                for link in self
                    .links
                    .rows_for(ontology)
                    .filter(|link| link.id_auxiliary == key.value_property)
                {
                    rows.push(SecondOrderRow {
                        entity: key.entity.clone(),
                        value_property: link.value_property.clone(),
                        labels: cells.clone(),
                        id_auxiliary: Some(link.id_auxiliary.clone()),
                        name_auxiliary: Some(link.name_auxiliary.clone()),
                        source_degree: Degree::Second,
                    });
                }
            }
        }

        // Union sans doublons exacts (provenance comprise), en conservant
        // l'ordre de production.
        let mut seen = HashSet::new();
        let rows = rows
            .into_iter()
            .filter(|row| seen.insert(row.clone()))
            .collect();

        info!("message" = "traductions de toutes les propriétés obtenues");
        Ok(SecondOrderTable {
            languages: self.languages.clone(),
            rows,
        })
    }

    fn translator(&self, property: &str) -> Translator<C> {
        Translator::new(self.client.clone(), property, self.languages.clone())
            .with_limit(self.limit)
            .with_values_batch_size(self.values_batch_size)
    }
}
