//! Post-traitement des tables fusionnées: ne garder que les traductions,
//! agrégées et dédupliquées par valeur de propriété.

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ExtractError;
use crate::table::Record;

// Quand une entité n'a pas de label dans une langue, le service de labels
// renvoie son identifiant Wikidata: ces jetons sont filtrés (préfixe,
// comme re.match).
static SELF_REFERENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^Q[0-9]+").unwrap());

const DROPPED_COLUMNS: [&str; 4] = ["entity", "id_auxiliary", "name_auxiliary", "source_degree"];

/// Agrège les enregistrements plats par valeur de propriété: les colonnes
/// d'identité et de provenance sont écartées, puis chaque colonne restante
/// est jointe par `|`, filtrée de ses auto-références Wikidata, dédupliquée
/// et triée. Idempotent sur sa propre sortie.
pub fn translations_only(records: &[Record]) -> Result<Vec<Record>, ExtractError> {
    let mut columns: BTreeSet<String> = BTreeSet::new();
    for record in records {
        for column in record.keys() {
            if column != "value_property" && !DROPPED_COLUMNS.contains(&column.as_str()) {
                columns.insert(column.clone());
            }
        }
    }

    let mut groups: BTreeMap<String, BTreeMap<String, Vec<String>>> = BTreeMap::new();
    for record in records {
        let value_property = record
            .get("value_property")
            .and_then(|value| value.clone())
            .ok_or_else(|| {
                ExtractError::Config(
                    "la colonne value_property est obligatoire pour l'agrégation".to_string(),
                )
            })?;

        let group = groups.entry(value_property).or_default();
        for column in &columns {
            if let Some(Some(value)) = record.get(column) {
                group.entry(column.clone()).or_default().push(value.clone());
            }
        }
    }

    Ok(groups
        .into_iter()
        .map(|(value_property, cells)| {
            let mut record = Record::new();
            record.insert("value_property".to_string(), Some(value_property));
            for column in &columns {
                let aggregated = cells.get(column).map(|values| aggregate(values));
                record.insert(column.clone(), aggregated);
            }
            record
        })
        .collect())
}

fn aggregate(values: &[String]) -> String {
    let tokens: BTreeSet<&str> = values
        .iter()
        .flat_map(|value| value.split('|'))
        .filter(|token| !SELF_REFERENCE.is_match(token))
        .collect();
    tokens.into_iter().collect::<Vec<_>>().join("|")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, Option<&str>)]) -> Record {
        pairs
            .iter()
            .map(|(column, value)| (column.to_string(), value.map(String::from)))
            .collect()
    }

    #[test]
    fn groups_dedups_and_sorts_by_value_property() {
        let records = vec![
            record(&[
                ("entity", Some("http://www.wikidata.org/entity/Q42")),
                ("value_property", Some("10")),
                ("labelFr", Some("chat")),
                ("altFr", Some("minet|chat")),
            ]),
            record(&[
                ("entity", Some("http://www.wikidata.org/entity/Q43")),
                ("value_property", Some("10")),
                ("labelFr", Some("chat")),
                ("altFr", None),
            ]),
        ];

        let output = translations_only(&records).unwrap();
        assert_eq!(output.len(), 1);
        let group = &output[0];
        assert_eq!(group.get("value_property"), Some(&Some("10".to_string())));
        assert_eq!(group.get("labelFr"), Some(&Some("chat".to_string())));
        assert_eq!(group.get("altFr"), Some(&Some("chat|minet".to_string())));
        assert!(!group.contains_key("entity"));
    }

    #[test]
    fn drops_provenance_columns_when_present() {
        let records = vec![record(&[
            ("entity", Some("Q1")),
            ("value_property", Some("Q1")),
            ("id_auxiliary", Some("M1")),
            ("name_auxiliary", Some("MeSH")),
            ("source_degree", Some("Second")),
            ("labelEn", Some("bar")),
        ])];

        let output = translations_only(&records).unwrap();
        let group = &output[0];
        assert_eq!(group.get("labelEn"), Some(&Some("bar".to_string())));
        for column in ["id_auxiliary", "name_auxiliary", "source_degree"] {
            assert!(!group.contains_key(column));
        }
    }

    #[test]
    fn wikidata_self_references_are_filtered_even_alone() {
        let records = vec![record(&[
            ("value_property", Some("10")),
            ("labelCs", Some("Q3025852")),
        ])];

        let output = translations_only(&records).unwrap();
        // Le seul jeton du groupe était un identifiant: chaîne vide.
        assert_eq!(output[0].get("labelCs"), Some(&Some(String::new())));
    }

    #[test]
    fn aggregation_is_idempotent() {
        let records = vec![
            record(&[
                ("value_property", Some("10")),
                ("labelFr", Some("b|a")),
                ("altFr", Some("Q42|z")),
            ]),
            record(&[
                ("value_property", Some("20")),
                ("labelFr", Some("c")),
                ("altFr", None),
            ]),
        ];

        let once = translations_only(&records).unwrap();
        let twice = translations_only(&once).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once[0].get("labelFr"), Some(&Some("a|b".to_string())));
        assert_eq!(once[0].get("altFr"), Some(&Some("z".to_string())));
        // Colonne sans aucune valeur dans le groupe: null, pas chaîne vide.
        assert_eq!(once[1].get("altFr"), Some(&None));
    }

    #[test]
    fn missing_value_property_is_a_config_error() {
        let records = vec![record(&[("labelFr", Some("chat"))])];
        assert!(matches!(
            translations_only(&records).unwrap_err(),
            ExtractError::Config(_)
        ));
    }
}
