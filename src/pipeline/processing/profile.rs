//! Exploratory profile of a raw record set: preview rows, per-column
//! null counts and descriptive statistics for the numeric columns.

use serde::Serialize;
use std::fmt;

use crate::domain::{RawSalesRecord, SalesField};

#[derive(Debug, Clone, Serialize)]
pub struct NumericSummary {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation, NaN below two values
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
}

impl NumericSummary {
    pub fn from_values(mut values: Vec<f64>) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        values.sort_by(|a, b| a.total_cmp(b));
        let count = values.len();
        let mean = values.iter().sum::<f64>() / count as f64;
        let std = if count < 2 {
            f64::NAN
        } else {
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
            var.sqrt()
        };
        Some(Self {
            count,
            mean,
            std,
            min: values[0],
            q25: quantile(&values, 0.25),
            median: quantile(&values, 0.5),
            q75: quantile(&values, 0.75),
            max: values[count - 1],
        })
    }
}

/// Linear interpolation between closest ranks over sorted values
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let weight = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnProfile {
    pub name: &'static str,
    pub dtype: &'static str,
    pub non_null: usize,
    pub nulls: usize,
    pub stats: Option<NumericSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataProfile {
    pub row_count: usize,
    pub columns: Vec<ColumnProfile>,
    pub preview: Vec<RawSalesRecord>,
}

impl DataProfile {
    pub fn build(records: &[RawSalesRecord], preview_rows: usize) -> Self {
        let columns = SalesField::ALL
            .iter()
            .map(|field| {
                let nulls = records.iter().filter(|r| r.is_null(*field)).count();
                let (dtype, values): (&'static str, Option<Vec<f64>>) = match field {
                    SalesField::ProductId => ("int64", Some(records.iter().filter_map(|r| r.product_id.map(|v| v as f64)).collect())),
                    SalesField::QuantitySold => ("float64", Some(records.iter().filter_map(|r| r.quantity_sold).collect())),
                    SalesField::UnitPrice => ("float64", Some(records.iter().filter_map(|r| r.unit_price).collect())),
                    SalesField::ProductName | SalesField::SaleDate => ("text", None),
                };
                ColumnProfile {
                    name: field.as_str(),
                    dtype,
                    non_null: records.len() - nulls,
                    nulls,
                    stats: values.and_then(NumericSummary::from_values),
                }
            })
            .collect();

        Self {
            row_count: records.len(),
            columns,
            preview: records.iter().take(preview_rows).cloned().collect(),
        }
    }

    pub fn total_nulls(&self) -> usize {
        self.columns.iter().map(|c| c.nulls).sum()
    }
}

fn cell<T: fmt::Display>(value: &Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "NaN".to_string(),
    }
}

impl fmt::Display for DataProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Data preview:")?;
        writeln!(
            f,
            "{:>4}  {:>10}  {:<24}  {:>13}  {:>10}  {:<20}",
            "", "product_id", "product_name", "quantity_sold", "unit_price", "sale_date"
        )?;
        for (idx, r) in self.preview.iter().enumerate() {
            writeln!(
                f,
                "{:>4}  {:>10}  {:<24}  {:>13}  {:>10}  {:<20}",
                idx,
                cell(&r.product_id),
                cell(&r.product_name),
                cell(&r.quantity_sold),
                cell(&r.unit_price),
                cell(&r.sale_date)
            )?;
        }

        writeln!(f, "\nGeneral info: {} rows, {} columns", self.row_count, self.columns.len())?;
        for c in &self.columns {
            writeln!(f, "  {:<15} {:>6} non-null  {}", c.name, c.non_null, c.dtype)?;
        }

        writeln!(f, "\nMissing values per column:")?;
        for c in &self.columns {
            writeln!(f, "  {:<15} {}", c.name, c.nulls)?;
        }

        writeln!(f, "\nDescriptive statistics:")?;
        writeln!(
            f,
            "  {:<15} {:>8} {:>12} {:>12} {:>12} {:>12} {:>12} {:>12} {:>12}",
            "", "count", "mean", "std", "min", "25%", "50%", "75%", "max"
        )?;
        for c in &self.columns {
            if let Some(s) = &c.stats {
                writeln!(
                    f,
                    "  {:<15} {:>8} {:>12.3} {:>12.3} {:>12.3} {:>12.3} {:>12.3} {:>12.3} {:>12.3}",
                    c.name, s.count, s.mean, s.std, s.min, s.q25, s.median, s.q75, s.max
                )?;
            }
        }
        Ok(())
    }
}
