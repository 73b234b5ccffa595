mod links;
mod wide;

pub use links::{LinkRow, LinkTable};
pub use wide::{
    records_from_json, records_to_json, EntityKey, LabelPair, Record, TranslationTable,
};
