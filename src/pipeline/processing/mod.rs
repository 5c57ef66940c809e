// Pipeline processing: cleaning, enrichment, and validation stages

pub mod dedup;
pub mod enrich;
pub mod missing_values;
pub mod outliers;
pub mod profile;
pub mod validation;

pub use dedup::{deduplicate, RowFingerprint};
pub use enrich::{DefaultEnricher, Enricher};
pub use missing_values::MissingValueHandler;
pub use outliers::{OutlierFilter, SaleDateParser};
pub use profile::DataProfile;
pub use validation::{ValidationReport, Validator};
