// Data processing pipeline: ingestion, cleaning stages, and streaming components

pub mod ingestion;
pub mod processing;
pub mod streaming;

use serde::Serialize;
use std::time::Instant;
use tracing::info;

use crate::config::Config;
use crate::domain::{EnrichedSalesRecord, RawSalesRecord};
use crate::error::Result;
use crate::observability::metrics;
use processing::{
    deduplicate, DefaultEnricher, Enricher, MissingValueHandler, OutlierFilter, SaleDateParser,
    ValidationReport, Validator,
};

/// Row counts after each stage of one pipeline pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageCounts {
    pub loaded: usize,
    pub after_missing_values: usize,
    pub after_outliers: usize,
    pub after_dedup: usize,
    pub enriched: usize,
}

/// Result of a complete cleaning pass
#[derive(Debug)]
pub struct PipelineResult {
    pub records: Vec<EnrichedSalesRecord>,
    pub counts: StageCounts,
    pub validation: ValidationReport,
}

/// The shared cleaning chain. Each stage takes ownership of the previous
/// stage's output and returns a new record set.
pub struct CleaningPipeline {
    missing_values: MissingValueHandler,
    outliers: OutlierFilter,
    enricher: Box<dyn Enricher + Send + Sync>,
    validator: Validator,
}

fn timed<T>(stage: &'static str, f: impl FnOnce() -> T) -> T {
    let started = Instant::now();
    let out = f();
    metrics::stage_duration(stage, started.elapsed().as_secs_f64());
    out
}

impl CleaningPipeline {
    pub fn new(
        missing_values: MissingValueHandler,
        outliers: OutlierFilter,
        enricher: Box<dyn Enricher + Send + Sync>,
        validator: Validator,
    ) -> Self {
        Self {
            missing_values,
            outliers,
            enricher,
            validator,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            MissingValueHandler::new(config.cleaning.critical_fields.clone()),
            OutlierFilter::new(SaleDateParser::new(config.cleaning.date_formats.clone())),
            Box::new(DefaultEnricher::from_config(&config.enrich)?),
            Validator::new(),
        ))
    }

    /// Missing values, outliers, dedup, enrichment. Pure per input set, so it
    /// is also the per-micro-batch transformation of the streaming runner.
    pub fn transform(&self, raw: Vec<RawSalesRecord>) -> (Vec<EnrichedSalesRecord>, StageCounts) {
        let mut counts = StageCounts {
            loaded: raw.len(),
            ..Default::default()
        };

        let filled = timed("missing_values", || self.missing_values.handle(raw));
        counts.after_missing_values = filled.len();

        let filtered = timed("outliers", || self.outliers.filter(filled));
        counts.after_outliers = filtered.len();

        let unique = timed("dedup", || deduplicate(filtered));
        counts.after_dedup = unique.len();

        let enriched = timed("enrich", || self.enricher.enrich(unique));
        counts.enriched = enriched.len();

        (enriched, counts)
    }

    /// Transform, then gate the result through the validator
    pub fn run(&self, raw: Vec<RawSalesRecord>) -> Result<PipelineResult> {
        let (records, counts) = self.transform(raw);
        let validation = timed("validation", || self.validator.validate(&records))?;
        info!(
            loaded = counts.loaded,
            after_missing_values = counts.after_missing_values,
            after_outliers = counts.after_outliers,
            after_dedup = counts.after_dedup,
            enriched = counts.enriched,
            "Cleaning pipeline complete"
        );
        Ok(PipelineResult {
            records,
            counts,
            validation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AmountCategory, SalesField, SalesRecord};
    use crate::error::EtlError;
    use std::sync::{Arc, Mutex};

    fn raw(id: i64, name: &str, qty: Option<f64>, price: Option<f64>, date: &str) -> RawSalesRecord {
        RawSalesRecord {
            product_id: Some(id),
            product_name: Some(name.to_string()),
            quantity_sold: qty,
            unit_price: price,
            sale_date: Some(date.to_string()),
        }
    }

    #[test]
    fn test_reference_row_end_to_end() {
        let pipeline = CleaningPipeline::from_config(&Config::default()).unwrap();
        let result = pipeline
            .run(vec![raw(1, "  Chemise Bleue ", Some(2.0), Some(25.0), "2024-03-15")])
            .unwrap();

        let r = &result.records[0];
        assert_eq!(r.product_name, "chemise bleue");
        assert_eq!(r.total_amount, 50.0);
        assert_eq!(r.amount_category, AmountCategory::Low);
        assert_eq!(r.product_category, "apparel");
        assert_eq!((r.sale_month, r.sale_year), (3, 2024));
    }

    #[test]
    fn test_stage_counts() {
        let pipeline = CleaningPipeline::from_config(&Config::default()).unwrap();
        let rows = vec![
            raw(1, "shirt", Some(1.0), Some(10.0), "2024-01-01"),
            raw(2, "shirt", None, Some(10.0), "2024-01-01"),
            raw(3, "pants", Some(-1.0), Some(10.0), "2024-01-01"),
            raw(4, "pants", Some(1.0), Some(10.0), "someday"),
            raw(1, "shirt", Some(1.0), Some(10.0), "2024-01-01"),
            raw(5, "screen", Some(4.0), Some(60.0), "2024-02-01 09:00:00"),
        ];
        let result = pipeline.run(rows).unwrap();
        assert_eq!(
            result.counts,
            StageCounts {
                loaded: 6,
                after_missing_values: 5,
                after_outliers: 3,
                after_dedup: 2,
                enriched: 2,
            }
        );
        assert!(result
            .records
            .iter()
            .all(|r| r.quantity_sold > 0.0 && r.unit_price > 0.0 && r.total_amount == r.quantity_sold * r.unit_price));
    }

    #[test]
    fn test_median_imputation_before_outlier_filter() {
        let mut config = Config::default();
        config.cleaning.critical_fields = vec![SalesField::ProductId, SalesField::ProductName, SalesField::SaleDate];
        let pipeline = CleaningPipeline::from_config(&config).unwrap();

        let (records, _) = pipeline.transform(vec![
            raw(1, "a", Some(1.0), Some(10.0), "2024-01-01"),
            raw(2, "b", Some(1.0), None, "2024-01-01"),
            raw(3, "c", Some(1.0), Some(30.0), "2024-01-01"),
        ]);
        assert_eq!(records[1].unit_price, 20.0);
    }

    #[test]
    fn test_negative_quantity_never_reaches_enricher() {
        struct RecordingEnricher {
            seen: Arc<Mutex<Vec<i64>>>,
            inner: DefaultEnricher,
        }
        impl Enricher for RecordingEnricher {
            fn enrich(&self, records: Vec<SalesRecord>) -> Vec<EnrichedSalesRecord> {
                self.seen.lock().unwrap().extend(records.iter().map(|r| r.product_id));
                self.inner.enrich(records)
            }
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let pipeline = CleaningPipeline::new(
            MissingValueHandler::default(),
            OutlierFilter::default(),
            Box::new(RecordingEnricher {
                seen: seen.clone(),
                inner: DefaultEnricher::from_config(&Default::default()).unwrap(),
            }),
            Validator::new(),
        );
        pipeline.transform(vec![
            raw(1, "a", Some(-1.0), Some(10.0), "2024-01-01"),
            raw(2, "b", Some(1.0), Some(10.0), "2024-01-01"),
        ]);

        assert_eq!(*seen.lock().unwrap(), vec![2]);
    }

    #[test]
    fn test_validation_failure_aborts_run() {
        struct BrokenEnricher;
        impl Enricher for BrokenEnricher {
            fn enrich(&self, records: Vec<SalesRecord>) -> Vec<EnrichedSalesRecord> {
                let mut out = DefaultEnricher::from_config(&Default::default()).unwrap().enrich(records);
                for r in out.iter_mut() {
                    r.normalized_price = 2.0;
                }
                out
            }
        }

        let pipeline = CleaningPipeline::new(
            MissingValueHandler::default(),
            OutlierFilter::default(),
            Box::new(BrokenEnricher),
            Validator::new(),
        );
        let err = pipeline.run(vec![raw(1, "a", Some(1.0), Some(1.0), "2024-01-01")]).unwrap_err();
        assert!(matches!(err, EtlError::Validation { violations: 1, .. }));
    }
}
