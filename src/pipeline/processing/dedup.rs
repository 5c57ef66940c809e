use chrono::Timelike;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::constants::OUTPUT_DATE_FORMAT;
use crate::domain::{EnrichedSalesRecord, SalesRecord};
use crate::observability::metrics;

/// A stable digest over every column of a row.
///
/// Floats are hashed by bit pattern so two rows collide only when every
/// value is identical.
pub trait RowFingerprint {
    fn fingerprint(&self) -> [u8; 32];
}

fn hash_str(hasher: &mut Sha256, value: &str) {
    // Length prefix keeps ("ab", "c") and ("a", "bc") apart
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

fn hash_sales_fields(hasher: &mut Sha256, record: &SalesRecord) {
    hasher.update(record.product_id.to_le_bytes());
    hash_str(hasher, &record.product_name);
    hasher.update(record.quantity_sold.to_bits().to_le_bytes());
    hasher.update(record.unit_price.to_bits().to_le_bytes());
    hash_str(hasher, &record.sale_date.format(OUTPUT_DATE_FORMAT).to_string());
    hasher.update(record.sale_date.nanosecond().to_le_bytes());
}

impl RowFingerprint for SalesRecord {
    fn fingerprint(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hash_sales_fields(&mut hasher, self);
        hasher.finalize().into()
    }
}

impl RowFingerprint for EnrichedSalesRecord {
    fn fingerprint(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        let base = SalesRecord {
            product_id: self.product_id,
            product_name: self.product_name.clone(),
            quantity_sold: self.quantity_sold,
            unit_price: self.unit_price,
            sale_date: self.sale_date,
        };
        hash_sales_fields(&mut hasher, &base);
        hasher.update(self.total_amount.to_bits().to_le_bytes());
        hasher.update(self.normalized_price.to_bits().to_le_bytes());
        hasher.update(self.sale_month.to_le_bytes());
        hasher.update(self.sale_year.to_le_bytes());
        hash_str(&mut hasher, self.amount_category.as_str());
        hash_str(&mut hasher, &self.product_category);
        hasher.finalize().into()
    }
}

/// Remove exact duplicates, keeping the first occurrence in input order
pub fn deduplicate<T: RowFingerprint>(records: Vec<T>) -> Vec<T> {
    let before = records.len();
    let mut seen: HashSet<[u8; 32]> = HashSet::with_capacity(before);

    let kept: Vec<T> = records
        .into_iter()
        .filter(|r| {
            let fp = r.fingerprint();
            let first = seen.insert(fp);
            if !first {
                debug!(fingerprint = %hex::encode(fp), "Dropping duplicate row");
            }
            first
        })
        .collect();

    let removed = before - kept.len();
    metrics::cleaning::duplicates_removed(removed);
    info!(rows_in = before, rows_out = kept.len(), removed, "{} duplicates removed", removed);

    kept
}
