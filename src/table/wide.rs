use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::client::query::capitalize_language;
use crate::error::ExtractError;

/// Clé stable d'une ligne de résultat. Une entité peut apparaître plusieurs
/// fois si la propriété est multi-valuée; la paire (entité, valeur) est
/// unique dans un résultat donné.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityKey {
    pub entity: String,
    pub value_property: String,
}

impl EntityKey {
    pub fn new(entity: impl Into<String>, value_property: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            value_property: value_property.into(),
        }
    }
}

/// Cellule par langue: label principal et labels alternatifs joints par `|`.
/// `None` signifie "pas de label dans cette langue", jamais une chaîne vide,
/// pour rester distinguable d'un agrégat vide après déduplication.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LabelPair {
    pub label: Option<String>,
    pub alt: Option<String>,
}

/// Forme plate d'une ligne, au format de sortie: colonne -> valeur ou null.
pub type Record = BTreeMap<String, Option<String>>;

/// Table large résultat d'une extraction: la jointure externe, sur
/// (entité, valeur de propriété), des résultats partiels de chaque langue.
#[derive(Debug, Clone, Default)]
pub struct TranslationTable {
    languages: Vec<String>,
    rows: BTreeMap<EntityKey, BTreeMap<String, LabelPair>>,
}

impl TranslationTable {
    pub fn new(languages: Vec<String>) -> Self {
        Self {
            languages,
            rows: BTreeMap::new(),
        }
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &EntityKey> {
        self.rows.keys()
    }

    pub fn get(&self, key: &EntityKey, language: &str) -> Option<&LabelPair> {
        self.rows.get(key).and_then(|cells| cells.get(language))
    }

    pub fn rows(&self) -> impl Iterator<Item = (&EntityKey, &BTreeMap<String, LabelPair>)> {
        self.rows.iter()
    }

    /// Jointure externe du résultat partiel d'une langue: les clés déjà
    /// présentes gagnent une cellule, les nouvelles créent leur ligne. Les
    /// lignes sans correspondance dans cette langue restent telles quelles
    /// (leur cellule sera null à la matérialisation, pas absente).
    pub fn merge_language(&mut self, language: &str, partial: BTreeMap<EntityKey, LabelPair>) {
        for (key, pair) in partial {
            self.rows
                .entry(key)
                .or_default()
                .insert(language.to_string(), pair);
        }
    }

    /// Matérialisation en enregistrements plats, avec un null explicite pour
    /// chaque langue sans correspondance.
    pub fn to_records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|(key, cells)| {
                let mut record = Record::new();
                record.insert("entity".to_string(), Some(key.entity.clone()));
                record.insert(
                    "value_property".to_string(),
                    Some(key.value_property.clone()),
                );
                for language in &self.languages {
                    let cap = capitalize_language(language);
                    let pair = cells.get(language);
                    record.insert(
                        format!("label{cap}"),
                        pair.and_then(|p| p.label.clone()),
                    );
                    record.insert(format!("alt{cap}"), pair.and_then(|p| p.alt.clone()));
                }
                record
            })
            .collect()
    }
}

/// Sérialisation JSON des enregistrements plats (les valeurs absentes
/// deviennent des null explicites).
pub fn records_to_json(records: &[Record]) -> Value {
    Value::Array(
        records
            .iter()
            .map(|record| {
                let mut object = Map::new();
                for (column, value) in record {
                    object.insert(
                        column.clone(),
                        value
                            .as_ref()
                            .map_or(Value::Null, |v| Value::String(v.clone())),
                    );
                }
                Value::Object(object)
            })
            .collect(),
    )
}

/// Relecture d'enregistrements plats depuis un JSON; les scalaires non
/// textuels sont convertis en chaînes pour éviter tout mélange de types.
pub fn records_from_json(value: &Value) -> Result<Vec<Record>, ExtractError> {
    let rows = value.as_array().ok_or_else(|| {
        ExtractError::Config("un tableau JSON d'enregistrements est attendu".to_string())
    })?;

    rows.iter()
        .map(|row| {
            let object = row.as_object().ok_or_else(|| {
                ExtractError::Config(
                    "chaque enregistrement doit être un objet JSON".to_string(),
                )
            })?;
            let mut record = Record::new();
            for (column, cell) in object {
                record.insert(column.clone(), coerce_scalar(cell, column)?);
            }
            Ok(record)
        })
        .collect()
}

pub(crate) fn coerce_scalar(value: &Value, column: &str) -> Result<Option<String>, ExtractError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        _ => Err(ExtractError::Config(format!(
            "valeur non scalaire dans la colonne {column}: {value}"
        ))),
    }
}
