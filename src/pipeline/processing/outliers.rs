use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::{info, warn};

use crate::constants::DEFAULT_DATE_FORMATS;
use crate::domain::{RawSalesRecord, SalesRecord};
use crate::observability::metrics;

/// Coerces raw sale date text into a timestamp
#[derive(Debug, Clone)]
pub struct SaleDateParser {
    formats: Vec<String>,
}

impl Default for SaleDateParser {
    fn default() -> Self {
        Self::new(DEFAULT_DATE_FORMATS.iter().map(|f| f.to_string()).collect())
    }
}

impl SaleDateParser {
    pub fn new(formats: Vec<String>) -> Self {
        Self { formats }
    }

    /// Try each format in order; date-only formats resolve to midnight
    pub fn parse(&self, value: &str) -> Option<NaiveDateTime> {
        let value = value.trim();
        for format in &self.formats {
            if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
                return Some(ts);
            }
            if let Ok(day) = NaiveDate::parse_from_str(value, format) {
                return day.and_hms_opt(0, 0, 0);
            }
        }
        DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.naive_utc())
    }
}

/// Keeps rows with positive quantity and price and a parseable sale date
#[derive(Debug, Clone, Default)]
pub struct OutlierFilter {
    date_parser: SaleDateParser,
}

impl OutlierFilter {
    pub fn new(date_parser: SaleDateParser) -> Self {
        Self { date_parser }
    }

    pub fn filter(&self, records: Vec<RawSalesRecord>) -> Vec<SalesRecord> {
        let before = records.len();
        let mut non_positive = 0;
        let mut bad_dates = 0;
        let mut incomplete = 0;

        let kept: Vec<SalesRecord> = records
            .into_iter()
            .filter_map(|r| {
                let (Some(quantity_sold), Some(unit_price)) = (r.quantity_sold, r.unit_price) else {
                    non_positive += 1;
                    return None;
                };
                // NaN fails the comparison, infinity fails is_finite
                let valid = |v: f64| v.is_finite() && v > 0.0;
                if !(valid(quantity_sold) && valid(unit_price)) {
                    non_positive += 1;
                    return None;
                }
                let Some(sale_date) = r.sale_date.as_deref().and_then(|d| self.date_parser.parse(d)) else {
                    bad_dates += 1;
                    return None;
                };
                match (r.product_id, r.product_name) {
                    (Some(product_id), Some(product_name)) => Some(SalesRecord {
                        product_id,
                        product_name,
                        quantity_sold,
                        unit_price,
                        sale_date,
                    }),
                    _ => {
                        incomplete += 1;
                        None
                    }
                }
            })
            .collect();

        if incomplete > 0 {
            warn!(incomplete, "Dropped rows with null identity fields that were not marked critical");
        }
        metrics::cleaning::rows_dropped_outlier(non_positive);
        metrics::cleaning::rows_dropped_date(bad_dates);
        info!(
            rows_in = before,
            rows_out = kept.len(),
            non_positive,
            bad_dates,
            "Outlier filtering complete"
        );

        kept
    }
}
