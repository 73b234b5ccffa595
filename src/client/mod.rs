pub mod query;
mod sparql;
mod transport;

pub use sparql::{binding, Binding, ClientConfig, MockSparqlEndpoint, SparqlEndpoint, WikidataClient};
pub use transport::{HttpTransport, Transport, TransportReply};
