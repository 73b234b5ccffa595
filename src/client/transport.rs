use std::time::Duration;

use reqwest::blocking::Client as HttpClient;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use tracing::debug;

use crate::error::ExtractError;

/// Réponse brute de l'endpoint, avant toute interprétation.
#[derive(Debug, Clone)]
pub struct TransportReply {
    pub status: u16,
    pub body: String,
}

/// Couche d'accès HTTP, isolée derrière un trait pour que la politique de
/// retry du client soit testable sans réseau.
pub trait Transport: Send + Sync {
    fn fetch(&self, endpoint: &str, query: &str) -> Result<TransportReply, ExtractError>;
}

pub struct HttpTransport {
    http: HttpClient,
}

impl HttpTransport {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, ExtractError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent).map_err(|_| {
                ExtractError::Config(format!(
                    "chaîne d'identification invalide pour un en-tête HTTP: {user_agent:?}"
                ))
            })?,
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/sparql-results+json"),
        );

        let http = HttpClient::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self { http })
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, endpoint: &str, query: &str) -> Result<TransportReply, ExtractError> {
        debug!(endpoint, "message" = "requête envoyée à l'endpoint SPARQL");
        let response = self
            .http
            .get(endpoint)
            .query(&[("format", "json"), ("query", query)])
            .send()?;

        let status = response.status().as_u16();
        let body = response.text()?;
        Ok(TransportReply { status, body })
    }
}
