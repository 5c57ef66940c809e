use csv::{ReaderBuilder, StringRecord};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{error, info, instrument};

use crate::config::ParseMode;
use crate::constants::is_null_token;
use crate::domain::{RawSalesRecord, SalesField};
use crate::error::{EtlError, Result};
use crate::observability::metrics;

/// Reads raw sales rows from CSV sources
#[derive(Debug, Clone)]
pub struct CsvLoader {
    parse_mode: ParseMode,
}

/// Column positions of the five source fields within a header row
#[derive(Debug, Clone)]
struct ColumnMap {
    positions: HashMap<SalesField, usize>,
}

impl ColumnMap {
    fn resolve(headers: &StringRecord, origin: &str) -> Result<Self> {
        let mut positions = HashMap::new();
        for (idx, header) in headers.iter().enumerate() {
            if let Some(field) = SalesField::from_header(header) {
                // First occurrence wins on duplicated headers
                positions.entry(field).or_insert(idx);
            }
        }

        let missing: Vec<String> = SalesField::ALL
            .iter()
            .filter(|f| !positions.contains_key(*f))
            .map(|f| f.as_str().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(EtlError::Schema {
                path: origin.to_string(),
                missing,
            });
        }

        Ok(Self { positions })
    }

    fn cell<'r>(&self, record: &'r StringRecord, field: SalesField) -> Option<&'r str> {
        let value = record.get(self.positions[&field])?;
        if is_null_token(value) {
            None
        } else {
            Some(value)
        }
    }
}

impl CsvLoader {
    pub fn new(parse_mode: ParseMode) -> Self {
        Self { parse_mode }
    }

    pub fn parse_mode(&self) -> ParseMode {
        self.parse_mode
    }

    /// Load one CSV file, checking the header against the required fields
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn load(&self, path: &Path) -> Result<Vec<RawSalesRecord>> {
        let file = File::open(path).map_err(|e| {
            error!("Source file not found: {}", e);
            metrics::loader::load_error("source_not_found");
            EtlError::SourceNotFound(format!("{}: {}", path.display(), e))
        })?;

        let records = self.load_reader(file, &path.display().to_string())?;
        info!(rows = records.len(), "Source loaded successfully");
        Ok(records)
    }

    /// Load every `*.csv` file of a directory in file-name order
    pub fn load_dir(&self, dir: &Path) -> Result<Vec<RawSalesRecord>> {
        let mut all = Vec::new();
        for path in list_csv_files(dir)? {
            all.extend(self.load(&path)?);
        }
        Ok(all)
    }

    /// Load records from any reader; `origin` names the source in errors
    pub fn load_reader<R: Read>(&self, reader: R, origin: &str) -> Result<Vec<RawSalesRecord>> {
        let result = self.read_records(reader, origin);
        if let Err(e) = &result {
            error!("Failed to load {}: {}", origin, e);
            match e {
                EtlError::Schema { .. } => metrics::loader::load_error("schema"),
                EtlError::Parse { .. } => metrics::loader::load_error("parse"),
                _ => metrics::loader::load_error("other"),
            }
        }
        result
    }

    fn read_records<R: Read>(&self, reader: R, origin: &str) -> Result<Vec<RawSalesRecord>> {
        let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(reader);

        let headers = rdr.headers().map_err(|e| csv_parse_error(e, origin))?.clone();
        let columns = ColumnMap::resolve(&headers, origin)?;

        let mut records = Vec::new();
        for result in rdr.records() {
            let row = result.map_err(|e| csv_parse_error(e, origin))?;
            let line = row.position().map(|p| p.line()).unwrap_or(0);
            records.push(self.parse_row(&row, &columns, origin, line)?);
        }

        metrics::loader::rows_loaded(records.len());
        Ok(records)
    }

    fn parse_row(&self, row: &StringRecord, columns: &ColumnMap, origin: &str, line: u64) -> Result<RawSalesRecord> {
        let product_id = match columns.cell(row, SalesField::ProductId) {
            Some(cell) => self.numeric(cell, parse_product_id, SalesField::ProductId, origin, line)?,
            None => None,
        };
        let quantity_sold = match columns.cell(row, SalesField::QuantitySold) {
            Some(cell) => self.numeric(cell, parse_f64, SalesField::QuantitySold, origin, line)?,
            None => None,
        };
        let unit_price = match columns.cell(row, SalesField::UnitPrice) {
            Some(cell) => self.numeric(cell, parse_f64, SalesField::UnitPrice, origin, line)?,
            None => None,
        };

        Ok(RawSalesRecord {
            product_id,
            product_name: columns.cell(row, SalesField::ProductName).map(str::to_string),
            quantity_sold,
            unit_price,
            sale_date: columns.cell(row, SalesField::SaleDate).map(|s| s.trim().to_string()),
        })
    }

    fn numeric<T>(
        &self,
        cell: &str,
        parse: fn(&str) -> Option<T>,
        field: SalesField,
        origin: &str,
        line: u64,
    ) -> Result<Option<T>> {
        match parse(cell.trim()) {
            Some(value) => Ok(Some(value)),
            None => match self.parse_mode {
                ParseMode::Permissive => Ok(None),
                ParseMode::Strict => Err(EtlError::Parse {
                    path: origin.to_string(),
                    line,
                    message: format!("invalid value '{}' for {}", cell, field),
                }),
            },
        }
    }
}

/// List `*.csv` files of a directory sorted by file name
pub fn list_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .map_err(|e| EtlError::SourceNotFound(format!("{}: {}", dir.display(), e)))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if path.is_file() && is_csv {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn csv_parse_error(err: csv::Error, origin: &str) -> EtlError {
    let line = err.position().map(|p| p.line()).unwrap_or(0);
    EtlError::Parse {
        path: origin.to_string(),
        line,
        message: err.to_string(),
    }
}

/// "inf", "infinity" and overflowing literals such as "1e400" are not numbers here
fn parse_f64(cell: &str) -> Option<f64> {
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Integral floats such as "3.0" are accepted as ids
fn parse_product_id(cell: &str) -> Option<i64> {
    if let Ok(id) = cell.parse::<i64>() {
        return Some(id);
    }
    let value = cell.parse::<f64>().ok()?;
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Some(value as i64)
    } else {
        None
    }
}
