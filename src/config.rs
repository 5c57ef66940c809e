use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::DEFAULT_DATE_FORMATS;
use crate::domain::SalesField;
use crate::error::{EtlError, Result};

/// Environment variable pointing at the configuration file
pub const CONFIG_ENV_VAR: &str = "SALES_ETL_CONFIG";
/// Configuration file picked up from the working directory when present
pub const DEFAULT_CONFIG_FILE: &str = "etl.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub batch: BatchConfig,
    pub stream: StreamConfig,
    pub cleaning: CleaningConfig,
    pub enrich: EnrichConfig,
    pub logging: LoggingConfig,
}

/// How the loader treats numeric cells that do not parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMode {
    /// Fail the load with a parse error
    Strict,
    /// Treat the cell as null
    Permissive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub profile: bool,
    pub preview_rows: usize,
    pub parse_mode: ParseMode,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("ventes.csv"),
            output: PathBuf::from("vente_clean.csv"),
            profile: true,
            preview_rows: 5,
            parse_mode: ParseMode::Strict,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub checkpoint_dir: PathBuf,
    pub poll_interval_ms: u64,
    /// Stop after this many consecutive polls found no new file
    pub max_idle_polls: Option<u32>,
    pub channel_capacity: usize,
    pub parse_mode: ParseMode,
    /// A file that fails to load and was modified less than this long ago is
    /// retried on a later poll instead of being marked as failed
    pub settle_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("input"),
            output_dir: PathBuf::from("output/stream"),
            checkpoint_dir: PathBuf::from("checkpoint"),
            poll_interval_ms: 1000,
            max_idle_polls: None,
            channel_capacity: 16,
            parse_mode: ParseMode::Permissive,
            settle_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    /// Rows with a null in any of these fields are dropped
    pub critical_fields: Vec<SalesField>,
    /// Sale date formats, tried in order
    pub date_formats: Vec<String>,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            critical_fields: SalesField::ALL.to_vec(),
            date_formats: DEFAULT_DATE_FORMATS.iter().map(|f| f.to_string()).collect(),
        }
    }
}

/// One row of the product classification table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub name: String,
    pub keywords: Vec<String>,
}

impl CategoryRule {
    pub fn new(name: &str, keywords: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
    /// Totals at or below this are "low"
    pub low_max: f64,
    /// Totals at or below this (and above `low_max`) are "medium"
    pub medium_max: f64,
    pub price_decimals: u32,
    /// Checked in order, first match wins
    pub categories: Vec<CategoryRule>,
    pub fallback_category: String,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            low_max: 50.0,
            medium_max: 200.0,
            price_decimals: 3,
            categories: vec![
                CategoryRule::new("apparel", &["shirt", "pants", "jacket", "chemise", "pantalon", "veste"]),
                CategoryRule::new("electronics", &["computer", "screen", "ordinateur", "écran"]),
            ],
            fallback_category: "other".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
    pub file_name: String,
    pub json_file: bool,
    /// Used when RUST_LOG is not set
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            file_name: "etl.log".to_string(),
            json_file: true,
            default_filter: "sales_etl=info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from an explicit path, `$SALES_ETL_CONFIG`, or
    /// `etl.toml` in the working directory, falling back to defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Self::load_from(Path::new(path.trim()));
            }
        }
        let default_path = Path::new(DEFAULT_CONFIG_FILE);
        if default_path.exists() {
            return Self::load_from(default_path);
        }
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            EtlError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let enrich = &self.enrich;
        if enrich.categories.is_empty() {
            return Err(EtlError::Config("enrich.categories must not be empty".to_string()));
        }
        if let Some(rule) = enrich.categories.iter().find(|r| r.keywords.iter().all(|k| k.trim().is_empty())) {
            return Err(EtlError::Config(format!("category '{}' has no keywords", rule.name)));
        }
        if !(enrich.low_max > 0.0) || !(enrich.medium_max > 0.0) {
            return Err(EtlError::Config("amount thresholds must be positive".to_string()));
        }
        if enrich.low_max >= enrich.medium_max {
            return Err(EtlError::Config(format!(
                "enrich.low_max ({}) must be below enrich.medium_max ({})",
                enrich.low_max, enrich.medium_max
            )));
        }
        if self.cleaning.date_formats.is_empty() {
            return Err(EtlError::Config("cleaning.date_formats must not be empty".to_string()));
        }
        if self.stream.channel_capacity == 0 {
            return Err(EtlError::Config("stream.channel_capacity must be at least 1".to_string()));
        }
        Ok(())
    }
}
