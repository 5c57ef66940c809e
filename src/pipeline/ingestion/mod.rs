// Pipeline ingestion: CSV sources and header resolution

pub mod loader;

pub use loader::{list_csv_files, CsvLoader};
