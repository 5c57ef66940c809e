use chrono::Datelike;
use serde::Serialize;
use tracing::{error, info};

use crate::domain::EnrichedSalesRecord;
use crate::error::{EtlError, Result};
use crate::observability::metrics;

/// How many violations are spelled out in the error message
const SUMMARY_LIMIT: usize = 5;

/// Types of post-condition violations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ViolationKind {
    /// Missing or non-finite value
    NullValue,
    /// Value outside its allowed range
    OutOfRange,
    /// Derived column disagrees with its inputs
    Inconsistent,
}

/// One violated post-condition
#[derive(Debug, Clone, Serialize)]
pub struct ValidationIssue {
    /// Position of the record in the validated set
    pub record_index: usize,
    pub field: &'static str,
    pub kind: ViolationKind,
    pub description: String,
}

/// Outcome of a validation pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub records_checked: usize,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    fn summary(&self) -> String {
        let mut parts: Vec<String> = self
            .issues
            .iter()
            .take(SUMMARY_LIMIT)
            .map(|i| format!("record {}: {} {}", i.record_index, i.field, i.description))
            .collect();
        if self.issues.len() > SUMMARY_LIMIT {
            parts.push(format!("and {} more", self.issues.len() - SUMMARY_LIMIT));
        }
        parts.join("; ")
    }
}

/// Post-condition gate over the enriched record set. Never drops records.
#[derive(Debug, Clone, Default)]
pub struct Validator;

impl Validator {
    pub fn new() -> Self {
        Self
    }

    /// Check every record and fail on the first pass that finds any violation
    pub fn validate(&self, records: &[EnrichedSalesRecord]) -> Result<ValidationReport> {
        let report = self.inspect(records);
        if !report.is_valid() {
            metrics::validation::violations(report.issues.len());
            error!(violations = report.issues.len(), "Validation failed");
            return Err(EtlError::Validation {
                violations: report.issues.len(),
                summary: report.summary(),
            });
        }
        info!(records = report.records_checked, "Validation passed");
        Ok(report)
    }

    /// Collect every violation without failing
    pub fn inspect(&self, records: &[EnrichedSalesRecord]) -> ValidationReport {
        let mut issues = Vec::new();
        for (idx, record) in records.iter().enumerate() {
            check_record(idx, record, &mut issues);
        }
        ValidationReport {
            records_checked: records.len(),
            issues,
        }
    }
}

fn check_record(idx: usize, r: &EnrichedSalesRecord, issues: &mut Vec<ValidationIssue>) {
    let mut push = |field: &'static str, kind: ViolationKind, description: String| {
        issues.push(ValidationIssue {
            record_index: idx,
            field,
            kind,
            description,
        });
    };

    let numbers = [
        ("quantity_sold", r.quantity_sold),
        ("unit_price", r.unit_price),
        ("total_amount", r.total_amount),
        ("normalized_price", r.normalized_price),
    ];
    for (field, value) in numbers {
        if !value.is_finite() {
            push(field, ViolationKind::NullValue, format!("is not a finite number ({})", value));
        }
    }
    if r.product_name.trim().is_empty() {
        push("product_name", ViolationKind::NullValue, "is empty".to_string());
    }
    if r.product_category.trim().is_empty() {
        push("product_category", ViolationKind::NullValue, "is empty".to_string());
    }

    if !(r.quantity_sold > 0.0) {
        push("quantity_sold", ViolationKind::OutOfRange, format!("must be > 0, got {}", r.quantity_sold));
    }
    if !(r.unit_price > 0.0) {
        push("unit_price", ViolationKind::OutOfRange, format!("must be > 0, got {}", r.unit_price));
    }
    if !(0.0..=1.0).contains(&r.normalized_price) {
        push(
            "normalized_price",
            ViolationKind::OutOfRange,
            format!("must be within [0, 1], got {}", r.normalized_price),
        );
    }

    let expected_total = r.quantity_sold * r.unit_price;
    if r.total_amount != expected_total && r.total_amount.is_finite() {
        push(
            "total_amount",
            ViolationKind::Inconsistent,
            format!("{} != {} x {}", r.total_amount, r.quantity_sold, r.unit_price),
        );
    }
    if r.sale_month != r.sale_date.month() || r.sale_year != r.sale_date.year() {
        push(
            "sale_date",
            ViolationKind::Inconsistent,
            format!("month/year {}/{} do not match {}", r.sale_month, r.sale_year, r.sale_date),
        );
    }
}
