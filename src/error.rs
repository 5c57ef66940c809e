use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Schema error in {path}: missing required field(s): {}", .missing.join(", "))]
    Schema { path: String, missing: Vec<String> },

    #[error("Parse error in {path} at line {line}: {message}")]
    Parse {
        path: String,
        line: u64,
        message: String,
    },

    #[error("Validation failed: {violations} violation(s): {summary}")]
    Validation { violations: usize, summary: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, EtlError>;
