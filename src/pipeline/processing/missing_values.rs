use tracing::info;

use crate::domain::{RawSalesRecord, SalesField};
use crate::observability::metrics;

/// Drops rows missing a critical field and fills the remaining gaps
#[derive(Debug, Clone)]
pub struct MissingValueHandler {
    critical_fields: Vec<SalesField>,
}

impl Default for MissingValueHandler {
    fn default() -> Self {
        Self::new(SalesField::ALL.to_vec())
    }
}

impl MissingValueHandler {
    pub fn new(critical_fields: Vec<SalesField>) -> Self {
        Self { critical_fields }
    }

    pub fn critical_fields(&self) -> &[SalesField] {
        &self.critical_fields
    }

    pub fn handle(&self, records: Vec<RawSalesRecord>) -> Vec<RawSalesRecord> {
        let before = records.len();
        let mut kept: Vec<RawSalesRecord> = records
            .into_iter()
            .filter(|r| !self.critical_fields.iter().any(|f| r.is_null(*f)))
            .collect();
        let dropped = before - kept.len();

        // Median over what is left at this point, not over the raw input
        let median_price = median(kept.iter().filter_map(|r| r.unit_price).collect());

        let mut quantities_defaulted = 0;
        let mut prices_imputed = 0;
        for record in kept.iter_mut() {
            if record.quantity_sold.is_none() {
                record.quantity_sold = Some(0.0);
                quantities_defaulted += 1;
            }
            if record.unit_price.is_none() {
                if let Some(median) = median_price {
                    record.unit_price = Some(median);
                    prices_imputed += 1;
                }
            }
        }

        metrics::cleaning::rows_dropped_missing(dropped);
        metrics::cleaning::values_imputed("quantity_sold", quantities_defaulted);
        metrics::cleaning::values_imputed("unit_price", prices_imputed);
        info!(
            rows_in = before,
            rows_out = kept.len(),
            dropped,
            quantities_defaulted,
            prices_imputed,
            "Missing value handling complete"
        );

        kept
    }
}

/// Median with the mean of the two middle values for even counts
pub fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: i64, qty: Option<f64>, price: Option<f64>) -> RawSalesRecord {
        RawSalesRecord {
            product_id: Some(id),
            product_name: Some(format!("item {id}")),
            quantity_sold: qty,
            unit_price: price,
            sale_date: Some("2024-01-01".to_string()),
        }
    }

    #[test]
    fn test_drops_rows_missing_critical_fields() {
        let handler = MissingValueHandler::default();
        let mut no_name = raw(2, Some(1.0), Some(1.0));
        no_name.product_name = None;
        let records = vec![raw(1, Some(1.0), Some(1.0)), no_name, raw(3, None, Some(2.0)), raw(4, Some(1.0), None)];

        let kept = handler.handle(records);
        let ids: Vec<_> = kept.iter().map(|r| r.product_id).collect();
        assert_eq!(ids, vec![Some(1)]);
    }

    #[test]
    fn test_imputes_median_price_when_price_not_critical() {
        let handler = MissingValueHandler::new(vec![
            SalesField::ProductId,
            SalesField::ProductName,
            SalesField::SaleDate,
        ]);
        let records = vec![raw(1, Some(1.0), Some(10.0)), raw(2, Some(1.0), None), raw(3, Some(1.0), Some(30.0))];

        let kept = handler.handle(records);
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[1].unit_price, Some(20.0));
        assert_eq!(kept[0].unit_price, Some(10.0));
    }

    #[test]
    fn test_defaults_null_quantity_to_zero() {
        let handler = MissingValueHandler::new(vec![SalesField::ProductId]);
        let kept = handler.handle(vec![raw(1, None, Some(5.0))]);
        assert_eq!(kept[0].quantity_sold, Some(0.0));
    }

    #[test]
    fn test_median_ignores_rows_dropped_earlier() {
        // The row with price 1000 has no date and is dropped before the median is taken
        let handler = MissingValueHandler::new(vec![SalesField::SaleDate]);
        let mut undated = raw(9, Some(1.0), Some(1000.0));
        undated.sale_date = None;
        let records = vec![raw(1, Some(1.0), Some(4.0)), undated, raw(2, Some(1.0), None), raw(3, Some(1.0), Some(6.0))];

        let kept = handler.handle(records);
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[1].unit_price, Some(5.0));
    }

    #[test]
    fn test_no_price_to_impute_from_leaves_null() {
        let handler = MissingValueHandler::new(vec![]);
        let kept = handler.handle(vec![raw(1, Some(1.0), None)]);
        assert_eq!(kept[0].unit_price, None);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(vec![]), None);
        assert_eq!(median(vec![3.0]), Some(3.0));
        assert_eq!(median(vec![30.0, 10.0]), Some(20.0));
        assert_eq!(median(vec![5.0, 1.0, 3.0]), Some(3.0));
    }
}
