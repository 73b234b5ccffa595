pub mod client;
pub mod error;
pub mod extract;
pub mod postprocess;
pub mod table;

pub use client::{ClientConfig, MockSparqlEndpoint, SparqlEndpoint, WikidataClient};
pub use error::ExtractError;
pub use extract::{Degree, SecondOrder, SecondOrderTable, Translator};
pub use table::{LinkTable, Record, TranslationTable};
