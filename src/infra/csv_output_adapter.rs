use chrono::NaiveDateTime;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

use crate::constants::{canonical_column, OUTPUT_COLUMNS, OUTPUT_DATE_FORMAT, UTF8_BOM};
use crate::domain::{canonical_product_category, AmountCategory, EnrichedSalesRecord};
use crate::error::{EtlError, Result};
use crate::observability::metrics;

fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

fn to_row(r: &EnrichedSalesRecord) -> [String; 11] {
    [
        r.product_id.to_string(),
        r.product_name.clone(),
        format_float(r.quantity_sold),
        format_float(r.unit_price),
        r.sale_date.format(OUTPUT_DATE_FORMAT).to_string(),
        format_float(r.total_amount),
        format_float(r.normalized_price),
        r.sale_month.to_string(),
        r.sale_year.to_string(),
        r.amount_category.as_str().to_string(),
        r.product_category.clone(),
    ]
}

/// Write the cleaned dataset as UTF-8 CSV with a byte-order mark so that
/// spreadsheet tools pick the right encoding.
pub fn write_enriched_csv(path: &Path, records: &[EnrichedSalesRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut file = BufWriter::new(File::create(path)?);
    file.write_all(UTF8_BOM)?;

    let mut writer = WriterBuilder::new().from_writer(file);
    writer.write_record(OUTPUT_COLUMNS)?;
    for r in records {
        writer.write_record(to_row(r))?;
    }
    writer.flush()?;

    metrics::sink::rows_written("csv", records.len());
    metrics::sink::files_written("csv", 1);
    info!(path = %path.display(), rows = records.len(), "Cleaned CSV written");
    Ok(())
}

fn field<'a>(row: &'a StringRecord, index: &HashMap<&'static str, usize>, name: &'static str) -> &'a str {
    index.get(name).and_then(|i| row.get(*i)).unwrap_or("").trim()
}

fn parse_cell<T: std::str::FromStr>(path: &Path, line: u64, column: &str, cell: &str) -> Result<T> {
    cell.parse::<T>().map_err(|_| EtlError::Parse {
        path: path.display().to_string(),
        line,
        message: format!("invalid {} value '{}'", column, cell),
    })
}

/// Read back a file produced by [`write_enriched_csv`]. Headers may be the
/// canonical names or their localized aliases, and category labels may be
/// localized too.
pub fn read_enriched_csv(path: &Path) -> Result<Vec<EnrichedSalesRecord>> {
    let file = File::open(path)
        .map_err(|e| EtlError::SourceNotFound(format!("{}: {}", path.display(), e)))?;
    let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(file);

    let headers = rdr.headers()?.clone();
    let mut index = HashMap::new();
    for (i, h) in headers.iter().enumerate() {
        if let Some(canonical) = canonical_column(h) {
            index.insert(canonical, i);
        }
    }
    let missing: Vec<String> = OUTPUT_COLUMNS
        .iter()
        .filter(|c| !index.contains_key(*c))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(EtlError::Schema {
            path: path.display().to_string(),
            missing,
        });
    }

    let mut out = Vec::new();
    for result in rdr.records() {
        let row = result?;
        let line = row.position().map(|p| p.line()).unwrap_or(0);
        let get = |name| field(&row, &index, name);

        let sale_date = NaiveDateTime::parse_from_str(get("sale_date"), OUTPUT_DATE_FORMAT)
            .map_err(|e| EtlError::Parse {
                path: path.display().to_string(),
                line,
                message: format!("invalid sale_date '{}': {}", get("sale_date"), e),
            })?;

        out.push(EnrichedSalesRecord {
            product_id: parse_cell(path, line, "product_id", get("product_id"))?,
            product_name: get("product_name").to_string(),
            quantity_sold: parse_cell(path, line, "quantity_sold", get("quantity_sold"))?,
            unit_price: parse_cell(path, line, "unit_price", get("unit_price"))?,
            sale_date,
            total_amount: parse_cell(path, line, "total_amount", get("total_amount"))?,
            normalized_price: parse_cell(path, line, "normalized_price", get("normalized_price"))?,
            sale_month: parse_cell(path, line, "sale_month", get("sale_month"))?,
            sale_year: parse_cell(path, line, "sale_year", get("sale_year"))?,
            amount_category: parse_cell::<AmountCategory>(path, line, "amount_category", get("amount_category"))?,
            product_category: canonical_product_category(get("product_category")),
        });
    }
    Ok(out)
}
