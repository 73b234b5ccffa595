use thiserror::Error;

/// Erreurs remontées par l'extraction, de la configuration jusqu'à
/// l'endpoint SPARQL. Les erreurs réseau sont classées par statut pour que
/// l'appelant puisse distinguer un problème transitoire (429 épuisé) d'un
/// problème de configuration (414) ou d'un bannissement (403).
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("configuration invalide: {0}")]
    Config(String),

    #[error(
        "3 erreurs 429 consécutives après {attempts} tentatives, l'IP risque \
         d'être bannie du serveur SPARQL, arrêt des essais"
    )]
    RateLimitExhausted { attempts: u32 },

    #[error(
        "erreur 403, l'IP semble bannie du serveur SPARQL de Wikidata \
         (bannissement de 24 h). Message reçu: {body}"
    )]
    Banned { body: String },

    #[error(
        "erreur 414, Request-URI trop longue: réduire la taille des lots \
         VALUES (values_batch_size) et réessayer"
    )]
    QueryTooLong,

    #[error("la requête a échoué avec le statut {status}: {body}")]
    Request { status: u16, body: String },

    #[error("la requête a réussi mais la réponse n'est pas un JSON valide: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("réponse inattendue de l'endpoint: {0}")]
    Malformed(String),

    #[error("appel HTTP à l'endpoint SPARQL impossible: {0}")]
    Http(#[from] reqwest::Error),
}
