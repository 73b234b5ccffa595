use std::collections::HashSet;

use serde_json::Value;

use super::wide::coerce_scalar;
use crate::error::ExtractError;

const MANDATORY_COLUMNS: [&str; 3] = ["value_property", "id_auxiliary", "name_auxiliary"];

/// Une ligne de la table de liens: valeur de la propriété principale,
/// identifiant dans l'ontologie externe, nom de cette ontologie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRow {
    pub value_property: String,
    pub id_auxiliary: String,
    pub name_auxiliary: String,
}

/// Table de liens fournie en entrée du second ordre. Toutes les valeurs
/// sont ramenées à des chaînes avant toute jointure, pour éviter les
/// décalages de clés numériques/textuelles.
#[derive(Debug, Clone, Default)]
pub struct LinkTable {
    rows: Vec<LinkRow>,
}

impl LinkTable {
    pub fn new(rows: Vec<LinkRow>) -> Self {
        Self { rows }
    }

    /// Lecture depuis un tableau JSON d'objets. Les trois colonnes sont
    /// obligatoires sur chaque ligne; c'est une erreur de configuration,
    /// détectée avant toute activité réseau.
    pub fn from_json(value: &Value) -> Result<Self, ExtractError> {
        let entries = value.as_array().ok_or_else(|| {
            ExtractError::Config(
                "la table de liens doit être un tableau JSON d'objets".to_string(),
            )
        })?;

        let mut rows = Vec::with_capacity(entries.len());
        for entry in entries {
            let object = entry.as_object().ok_or_else(|| {
                ExtractError::Config(
                    "chaque ligne de la table de liens doit être un objet JSON".to_string(),
                )
            })?;

            let mut cells = [None, None, None];
            for (slot, column) in MANDATORY_COLUMNS.iter().enumerate() {
                cells[slot] = object
                    .get(*column)
                    .map(|cell| coerce_scalar(cell, column))
                    .transpose()?
                    .flatten();
            }

            let [value_property, id_auxiliary, name_auxiliary] = cells;
            match (value_property, id_auxiliary, name_auxiliary) {
                (Some(value_property), Some(id_auxiliary), Some(name_auxiliary)) => {
                    rows.push(LinkRow {
                        value_property,
                        id_auxiliary,
                        name_auxiliary,
                    });
                }
                _ => {
                    return Err(ExtractError::Config(format!(
                        "colonnes obligatoires manquantes dans la table de liens: \
                         {MANDATORY_COLUMNS:?} sont toutes nécessaires"
                    )))
                }
            }
        }

        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[LinkRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Valeurs distinctes de la propriété principale, dans l'ordre
    /// d'apparition.
    pub fn distinct_values(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .filter(|row| seen.insert(row.value_property.clone()))
            .map(|row| row.value_property.clone())
            .collect()
    }

    /// Identifiants auxiliaires distincts pour une ontologie donnée, dans
    /// l'ordre d'apparition.
    pub fn distinct_auxiliary_ids(&self, ontology: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .filter(|row| row.name_auxiliary == ontology)
            .filter(|row| seen.insert(row.id_auxiliary.clone()))
            .map(|row| row.id_auxiliary.clone())
            .collect()
    }

    /// Lignes d'une ontologie donnée, pour la jointure interne du second
    /// ordre.
    pub fn rows_for<'a>(&'a self, ontology: &'a str) -> impl Iterator<Item = &'a LinkRow> + 'a {
        self.rows
            .iter()
            .filter(move |row| row.name_auxiliary == ontology)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_coerces_scalar_types() {
        let json = serde_json::json!([
            {"value_property": "Q1", "id_auxiliary": 42, "name_auxiliary": "MeSH"},
            {"value_property": "Q2", "id_auxiliary": "D001", "name_auxiliary": "MeSH"}
        ]);
        let table = LinkTable::from_json(&json).unwrap();
        assert_eq!(table.rows().len(), 2);
        assert_eq!(table.rows()[0].id_auxiliary, "42");
    }

    #[test]
    fn missing_column_is_a_config_error() {
        let json = serde_json::json!([
            {"value_property": "Q1", "id_auxiliary": "D001"}
        ]);
        assert!(matches!(
            LinkTable::from_json(&json).unwrap_err(),
            ExtractError::Config(_)
        ));
    }

    #[test]
    fn null_cell_counts_as_missing() {
        let json = serde_json::json!([
            {"value_property": "Q1", "id_auxiliary": null, "name_auxiliary": "MeSH"}
        ]);
        assert!(LinkTable::from_json(&json).is_err());
    }

    #[test]
    fn distinct_helpers_preserve_first_seen_order() {
        let json = serde_json::json!([
            {"value_property": "Q2", "id_auxiliary": "M2", "name_auxiliary": "MeSH"},
            {"value_property": "Q1", "id_auxiliary": "M1", "name_auxiliary": "MeSH"},
            {"value_property": "Q2", "id_auxiliary": "O1", "name_auxiliary": "OMIM"},
            {"value_property": "Q2", "id_auxiliary": "M2", "name_auxiliary": "MeSH"}
        ]);
        let table = LinkTable::from_json(&json).unwrap();
        assert_eq!(table.distinct_values(), vec!["Q2", "Q1"]);
        assert_eq!(table.distinct_auxiliary_ids("MeSH"), vec!["M2", "M1"]);
        assert_eq!(table.distinct_auxiliary_ids("OMIM"), vec!["O1"]);
        assert!(table.distinct_auxiliary_ids("UMLS").is_empty());
        assert_eq!(table.rows_for("OMIM").count(), 1);
    }
}
