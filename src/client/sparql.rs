use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, warn};

use super::transport::{HttpTransport, Transport, TransportReply};
use crate::error::ExtractError;

const DEFAULT_ENDPOINT: &str = "https://query.wikidata.org/sparql";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
// Pause fixe avant un nouvel essai après un 429 (politique Wikidata).
const DEFAULT_RETRY_PAUSE: Duration = Duration::from_secs(60);
const MAX_RETRIES: u32 = 2;

/// Une ligne de résultat SPARQL aplatie: variable -> valeur.
pub type Binding = BTreeMap<String, String>;

/// Configuration du client. La chaîne d'identification (User-Agent) est un
/// paramètre obligatoire du constructeur: aucune requête ne peut partir
/// sans elle (politique d'usage de l'endpoint Wikidata,
/// https://meta.wikimedia.org/wiki/User-Agent_policy).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: String,
    pub user_agent: String,
    pub timeout: Duration,
    pub retry_pause: Duration,
}

impl ClientConfig {
    pub fn new(user_agent: impl Into<String>) -> Result<Self, ExtractError> {
        let user_agent = user_agent.into();
        if user_agent.trim().is_empty() {
            return Err(ExtractError::Config(
                "une chaîne d'identification (User-Agent) non vide est requise \
                 avant toute requête à l'endpoint"
                    .to_string(),
            ));
        }
        Ok(Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            user_agent,
            timeout: DEFAULT_TIMEOUT,
            retry_pause: DEFAULT_RETRY_PAUSE,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_pause(mut self, pause: Duration) -> Self {
        self.retry_pause = pause;
        self
    }
}

/// Exécution d'une requête SPARQL. Les couches hautes (Translator,
/// SecondOrder) ne dépendent que de ce trait.
pub trait SparqlEndpoint: Send + Sync {
    fn execute(&self, query: &str) -> Result<Vec<Binding>, ExtractError>;
}

pub struct WikidataClient<T: Transport = HttpTransport> {
    transport: T,
    config: ClientConfig,
}

impl WikidataClient<HttpTransport> {
    pub fn new(config: ClientConfig) -> Result<Self, ExtractError> {
        let transport = HttpTransport::new(&config.user_agent, config.timeout)?;
        Ok(Self { transport, config })
    }
}

impl<T: Transport> WikidataClient<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        Self { transport, config }
    }
}

impl<T: Transport> SparqlEndpoint for WikidataClient<T> {
    fn execute(&self, query: &str) -> Result<Vec<Binding>, ExtractError> {
        let mut retries = 0u32;

        loop {
            let TransportReply { status, body } =
                self.transport.fetch(&self.config.endpoint, query)?;

            match status {
                200 => {
                    let parsed: SparqlResponse =
                        serde_json::from_str(&body).map_err(ExtractError::Parse)?;
                    debug!("message" = "résultats obtenus depuis l'endpoint");
                    return Ok(parsed.into_bindings());
                }
                429 => {
                    // Un 429 est transitoire, mais insister mène au
                    // bannissement de l'IP: au plus 2 nouveaux essais.
                    if retries < MAX_RETRIES {
                        retries += 1;
                        warn!(
                            retries,
                            pause_s = self.config.retry_pause.as_secs(),
                            "message" = "erreur 429, attente avant un nouvel essai"
                        );
                        sleep(self.config.retry_pause);
                        continue;
                    }
                    return Err(ExtractError::RateLimitExhausted {
                        attempts: retries + 1,
                    });
                }
                403 => return Err(ExtractError::Banned { body }),
                414 => return Err(ExtractError::QueryTooLong),
                _ => return Err(ExtractError::Request { status, body }),
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct SparqlResponse {
    results: SparqlResults,
}

#[derive(Debug, Deserialize)]
struct SparqlResults {
    bindings: Vec<BTreeMap<String, SparqlValue>>,
}

#[derive(Debug, Deserialize)]
struct SparqlValue {
    value: String,
}

impl SparqlResponse {
    fn into_bindings(self) -> Vec<Binding> {
        self.results
            .bindings
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|(variable, cell)| (variable, cell.value))
                    .collect()
            })
            .collect()
    }
}

/// Endpoint factice pour les tests: rejoue une file de réponses préparées
/// et garde la trace des requêtes reçues.
#[derive(Clone, Default)]
pub struct MockSparqlEndpoint {
    replies: Arc<Mutex<VecDeque<Result<Vec<Binding>, ExtractError>>>>,
    queries: Arc<Mutex<Vec<String>>>,
}

impl MockSparqlEndpoint {
    pub fn push_page(&self, bindings: Vec<Binding>) {
        self.replies.lock().push_back(Ok(bindings));
    }

    pub fn push_error(&self, error: ExtractError) {
        self.replies.lock().push_back(Err(error));
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().len()
    }
}

impl SparqlEndpoint for MockSparqlEndpoint {
    fn execute(&self, query: &str) -> Result<Vec<Binding>, ExtractError> {
        self.queries.lock().push(query.to_string());
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| {
                Err(ExtractError::Config(
                    "aucune réponse mock disponible".to_string(),
                ))
            })
    }
}

/// Construit un binding à partir de paires (variable, valeur); pratique
/// dans les tests.
pub fn binding(pairs: &[(&str, &str)]) -> Binding {
    pairs
        .iter()
        .map(|(variable, value)| (variable.to_string(), value.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeTransport {
        replies: Mutex<VecDeque<TransportReply>>,
        calls: Mutex<u32>,
    }

    impl FakeTransport {
        fn new(replies: Vec<(u16, &str)>) -> Self {
            Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|(status, body)| TransportReply {
                            status,
                            body: body.to_string(),
                        })
                        .collect(),
                ),
                calls: Mutex::new(0),
            }
        }
    }

    impl Transport for FakeTransport {
        fn fetch(&self, _: &str, _: &str) -> Result<TransportReply, ExtractError> {
            *self.calls.lock() += 1;
            self.replies
                .lock()
                .pop_front()
                .ok_or_else(|| ExtractError::Config("file de réponses vide".to_string()))
        }
    }

    fn client(replies: Vec<(u16, &str)>) -> WikidataClient<FakeTransport> {
        let config = ClientConfig::new("WpeTest/0.1 (test@example.org)")
            .unwrap()
            .with_retry_pause(Duration::ZERO);
        WikidataClient::with_transport(config, FakeTransport::new(replies))
    }

    const OK_BODY: &str = r#"{
        "results": {
            "bindings": [
                {
                    "entity": {"type": "uri", "value": "http://www.wikidata.org/entity/Q42"},
                    "value_property": {"type": "literal", "value": "1234"},
                    "labelFr": {"type": "literal", "xml:lang": "fr", "value": "exemple"}
                }
            ]
        }
    }"#;

    #[test]
    fn blank_user_agent_is_rejected() {
        let err = ClientConfig::new("   ").unwrap_err();
        assert!(matches!(err, ExtractError::Config(_)));
    }

    #[test]
    fn flattens_bindings_to_plain_values() {
        let client = client(vec![(200, OK_BODY)]);
        let rows = client.execute("SELECT").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].get("entity").map(String::as_str),
            Some("http://www.wikidata.org/entity/Q42")
        );
        assert_eq!(rows[0].get("labelFr").map(String::as_str), Some("exemple"));
    }

    #[test]
    fn retries_twice_on_429_then_succeeds() {
        let client = client(vec![(429, ""), (429, ""), (200, OK_BODY)]);
        let rows = client.execute("SELECT").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(*client.transport.calls.lock(), 3);
    }

    #[test]
    fn three_429_exhaust_the_retry_budget() {
        let client = client(vec![(429, ""), (429, ""), (429, ""), (200, OK_BODY)]);
        let err = client.execute("SELECT").unwrap_err();
        assert!(matches!(
            err,
            ExtractError::RateLimitExhausted { attempts: 3 }
        ));
        // Pas de 4e tentative.
        assert_eq!(*client.transport.calls.lock(), 3);
    }

    #[test]
    fn ban_is_fatal_and_carries_the_body() {
        let client = client(vec![(403, "banned for 24h")]);
        match client.execute("SELECT").unwrap_err() {
            ExtractError::Banned { body } => assert_eq!(body, "banned for 24h"),
            other => panic!("erreur inattendue: {other}"),
        }
    }

    #[test]
    fn uri_too_long_is_a_caller_error() {
        let client = client(vec![(414, "")]);
        assert!(matches!(
            client.execute("SELECT").unwrap_err(),
            ExtractError::QueryTooLong
        ));
        assert_eq!(*client.transport.calls.lock(), 1);
    }

    #[test]
    fn other_statuses_fail_with_status_and_body() {
        let client = client(vec![(500, "boom")]);
        match client.execute("SELECT").unwrap_err() {
            ExtractError::Request { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("erreur inattendue: {other}"),
        }
    }

    #[test]
    fn malformed_success_body_is_a_parse_error() {
        let client = client(vec![(200, "<html>maintenance</html>")]);
        assert!(matches!(
            client.execute("SELECT").unwrap_err(),
            ExtractError::Parse(_)
        ));
    }
}
