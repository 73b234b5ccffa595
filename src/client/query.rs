//! Construction des requêtes SPARQL envoyées à Wikidata. Les formes sont
//! figées: toutes les pages sont ordonnées par ?entity pour rendre la
//! pagination déterministe d'un appel à l'autre.

/// Capitalisation d'un code langue pour les noms de colonnes:
/// "fr" -> "Fr", "zh-hans" -> "Zh-hans".
pub fn capitalize_language(code: &str) -> String {
    let mut chars = code.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Compte distinct des entités portant la propriété.
pub fn count_query(property: &str) -> String {
    format!(
        r#"SELECT (COUNT(DISTINCT(?entity)) as ?nb_elem)
WHERE {{
    ?entity wdt:{property} ?value_property .
}}"#
    )
}

/// Une page (fenêtre LIMIT/OFFSET) pour une langue donnée: identifiant,
/// valeur de propriété, label optionnel et labels alternatifs agrégés.
pub fn page_query(property: &str, language: &str, offset: usize, limit: usize) -> String {
    let window = format!(
        "}}ORDER BY ?entity\n                LIMIT {limit} OFFSET {offset}"
    );
    labelled_query(property, language, &window)
}

/// Variante restreinte à un lot explicite de valeurs de propriété,
/// via une clause VALUES pour rester sous la limite d'URI.
pub fn page_query_by_ids(property: &str, language: &str, ids: &[String]) -> String {
    let values = ids
        .iter()
        .map(|id| format!("(\"{id}\")"))
        .collect::<Vec<_>>()
        .join("\n                    ");
    let window = format!(
        "    VALUES (?value_property){{\n                    {values}\n                }}\n            }}ORDER BY ?entity"
    );
    labelled_query(property, language, &window)
}

fn labelled_query(property: &str, language: &str, window: &str) -> String {
    let lang_cap = capitalize_language(language);
    format!(
        r#"SELECT ?entity ?value_property ?label{lang_cap}
(GROUP_CONCAT(?altBis{lang_cap}; separator='|') AS ?alt{lang_cap})
WHERE {{
    {{
        SELECT ?entity ?value_property
        WHERE {{
            ?entity wdt:{property} ?value_property .
            {window}
    }}
    OPTIONAL {{
        ?entity skos:altLabel ?altBis{lang_cap}.
        FILTER (lang(?altBis{lang_cap})='{language}')
    }}
    SERVICE wikibase:label {{
        bd:serviceParam wikibase:language '{language}' .
        ?entity rdfs:label ?label{lang_cap} .
    }}
}} GROUP BY ?entity ?value_property ?label{lang_cap}"#
    )
}
