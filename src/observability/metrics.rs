//! Metrics for the sales ETL pipeline
//!
//! Recording goes through the `metrics` facade, so every helper is a no-op
//! until a recorder is installed with [`init`].

use std::fmt;
use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Enum representing all metric names used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Loader metrics
    LoaderRowsLoaded,
    LoaderErrors,

    // Cleaning metrics
    CleaningRowsDroppedMissing,
    CleaningValuesImputed,
    CleaningRowsDroppedOutlier,
    CleaningRowsDroppedDate,
    CleaningDuplicatesRemoved,

    // Enrichment and validation metrics
    EnrichRowsEnriched,
    ValidationViolations,
    StageDuration,

    // Sink metrics
    SinkRowsWritten,
    SinkFilesWritten,

    // Streaming metrics
    StreamBatchesProcessed,
    StreamFilesProcessed,
    StreamFilesFailed,
    StreamConsumerErrors,
    StreamCurrentYearRevenue,
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::LoaderRowsLoaded => "sales_etl_loader_rows_loaded_total",
            MetricName::LoaderErrors => "sales_etl_loader_errors_total",

            MetricName::CleaningRowsDroppedMissing => "sales_etl_cleaning_rows_dropped_missing_total",
            MetricName::CleaningValuesImputed => "sales_etl_cleaning_values_imputed_total",
            MetricName::CleaningRowsDroppedOutlier => "sales_etl_cleaning_rows_dropped_outlier_total",
            MetricName::CleaningRowsDroppedDate => "sales_etl_cleaning_rows_dropped_date_total",
            MetricName::CleaningDuplicatesRemoved => "sales_etl_cleaning_duplicates_removed_total",

            MetricName::EnrichRowsEnriched => "sales_etl_enrich_rows_enriched_total",
            MetricName::ValidationViolations => "sales_etl_validation_violations_total",
            MetricName::StageDuration => "sales_etl_stage_duration_seconds",

            MetricName::SinkRowsWritten => "sales_etl_sink_rows_written_total",
            MetricName::SinkFilesWritten => "sales_etl_sink_files_written_total",

            MetricName::StreamBatchesProcessed => "sales_etl_stream_batches_processed_total",
            MetricName::StreamFilesProcessed => "sales_etl_stream_files_processed_total",
            MetricName::StreamFilesFailed => "sales_etl_stream_files_failed_total",
            MetricName::StreamConsumerErrors => "sales_etl_stream_consumer_errors_total",
            MetricName::StreamCurrentYearRevenue => "sales_etl_stream_current_year_revenue",
        }
    }
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Calling it twice is harmless.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {}", e))?;
    METRICS_HANDLE.set(handle).ok();
    info!("Metrics system initialized");
    Ok(())
}

/// Render the current metric values in Prometheus text format
pub fn render() -> Option<String> {
    METRICS_HANDLE.get().map(|handle| handle.render())
}

/// Record how long a pipeline stage took
pub fn stage_duration(stage: &'static str, secs: f64) {
    ::metrics::histogram!(MetricName::StageDuration.as_str(), "stage" => stage).record(secs);
}

// ============================================================================
// Loader Metrics
// ============================================================================

pub mod loader {
    use super::MetricName;

    pub fn rows_loaded(count: usize) {
        ::metrics::counter!(MetricName::LoaderRowsLoaded.as_str()).increment(count as u64);
    }

    pub fn load_error(kind: &'static str) {
        ::metrics::counter!(MetricName::LoaderErrors.as_str(), "kind" => kind).increment(1);
    }
}

// ============================================================================
// Cleaning Metrics
// ============================================================================

pub mod cleaning {
    use super::MetricName;

    pub fn rows_dropped_missing(count: usize) {
        ::metrics::counter!(MetricName::CleaningRowsDroppedMissing.as_str()).increment(count as u64);
    }

    pub fn values_imputed(field: &'static str, count: usize) {
        ::metrics::counter!(MetricName::CleaningValuesImputed.as_str(), "field" => field)
            .increment(count as u64);
    }

    pub fn rows_dropped_outlier(count: usize) {
        ::metrics::counter!(MetricName::CleaningRowsDroppedOutlier.as_str()).increment(count as u64);
    }

    pub fn rows_dropped_date(count: usize) {
        ::metrics::counter!(MetricName::CleaningRowsDroppedDate.as_str()).increment(count as u64);
    }

    pub fn duplicates_removed(count: usize) {
        ::metrics::counter!(MetricName::CleaningDuplicatesRemoved.as_str()).increment(count as u64);
    }
}

// ============================================================================
// Enrichment / Validation Metrics
// ============================================================================

pub mod enrich {
    use super::MetricName;

    pub fn rows_enriched(count: usize) {
        ::metrics::counter!(MetricName::EnrichRowsEnriched.as_str()).increment(count as u64);
    }
}

pub mod validation {
    use super::MetricName;

    pub fn violations(count: usize) {
        ::metrics::counter!(MetricName::ValidationViolations.as_str()).increment(count as u64);
    }
}

// ============================================================================
// Sink Metrics
// ============================================================================

pub mod sink {
    use super::MetricName;

    pub fn rows_written(sink: &'static str, count: usize) {
        ::metrics::counter!(MetricName::SinkRowsWritten.as_str(), "sink" => sink).increment(count as u64);
    }

    pub fn files_written(sink: &'static str, count: usize) {
        ::metrics::counter!(MetricName::SinkFilesWritten.as_str(), "sink" => sink).increment(count as u64);
    }
}

// ============================================================================
// Streaming Metrics
// ============================================================================

pub mod stream {
    use super::MetricName;

    pub fn batch_processed(files: usize) {
        ::metrics::counter!(MetricName::StreamBatchesProcessed.as_str()).increment(1);
        ::metrics::counter!(MetricName::StreamFilesProcessed.as_str()).increment(files as u64);
    }

    pub fn file_failed() {
        ::metrics::counter!(MetricName::StreamFilesFailed.as_str()).increment(1);
    }

    pub fn consumer_error(consumer: &'static str) {
        ::metrics::counter!(MetricName::StreamConsumerErrors.as_str(), "consumer" => consumer).increment(1);
    }

    pub fn current_year_revenue(revenue: f64) {
        ::metrics::gauge!(MetricName::StreamCurrentYearRevenue.as_str()).set(revenue);
    }
}
