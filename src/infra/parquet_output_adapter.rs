use async_trait::async_trait;
use chrono::NaiveDateTime;
use parquet::basic::{Compression, LogicalType, Repetition, Type as PhysicalType, ZstdLevel};
use parquet::data_type::{ByteArray, ByteArrayType, DoubleType, Int32Type, Int64Type};
use parquet::file::properties::WriterProperties;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::file::writer::SerializedFileWriter;
use parquet::record::RowAccessor;
use parquet::schema::types::{Type, TypePtr};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::app::ports::{EnrichedBatch, SalesSinkPort};
use crate::constants::{OUTPUT_COLUMNS, OUTPUT_DATE_FORMAT, SALE_MONTH, SALE_YEAR};
use crate::domain::EnrichedSalesRecord;
use crate::error::{EtlError, Result};
use crate::observability::metrics;

fn column(name: &str, physical: PhysicalType, logical: Option<LogicalType>) -> Result<TypePtr> {
    Ok(Arc::new(
        Type::primitive_type_builder(name, physical)
            .with_repetition(Repetition::REQUIRED)
            .with_logical_type(logical)
            .build()?,
    ))
}

// Same columns and order as the CSV output
fn build_schema() -> Result<TypePtr> {
    let physical = |name: &str| match name {
        "product_id" => (PhysicalType::INT64, None),
        "quantity_sold" | "unit_price" | "total_amount" | "normalized_price" => (PhysicalType::DOUBLE, None),
        "sale_month" | "sale_year" => (PhysicalType::INT32, None),
        _ => (PhysicalType::BYTE_ARRAY, Some(LogicalType::String)),
    };
    let fields = OUTPUT_COLUMNS
        .iter()
        .map(|name| {
            let (p, l) = physical(name);
            column(name, p, l)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Arc::new(Type::group_type_builder("sales").with_fields(fields).build()?))
}

fn write_file(path: &Path, schema: TypePtr, props: Arc<WriterProperties>, rows: &[&EnrichedSalesRecord]) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = SerializedFileWriter::new(file, schema, props)?;
    let mut rg = writer.next_row_group()?;

    let strings = |f: fn(&EnrichedSalesRecord) -> String| -> Vec<ByteArray> {
        rows.iter().map(|r| ByteArray::from(f(r).as_str())).collect()
    };
    let doubles = |f: fn(&EnrichedSalesRecord) -> f64| -> Vec<f64> { rows.iter().map(|r| f(r)).collect() };

    let mut index = 0;
    while let Some(mut col) = rg.next_column()? {
        match OUTPUT_COLUMNS[index] {
            "product_id" => {
                let vals: Vec<i64> = rows.iter().map(|r| r.product_id).collect();
                col.typed::<Int64Type>().write_batch(&vals, None, None)?;
            }
            "product_name" => {
                col.typed::<ByteArrayType>().write_batch(&strings(|r| r.product_name.clone()), None, None)?;
            }
            "quantity_sold" => {
                col.typed::<DoubleType>().write_batch(&doubles(|r| r.quantity_sold), None, None)?;
            }
            "unit_price" => {
                col.typed::<DoubleType>().write_batch(&doubles(|r| r.unit_price), None, None)?;
            }
            "sale_date" => {
                let vals = strings(|r| r.sale_date.format(OUTPUT_DATE_FORMAT).to_string());
                col.typed::<ByteArrayType>().write_batch(&vals, None, None)?;
            }
            "total_amount" => {
                col.typed::<DoubleType>().write_batch(&doubles(|r| r.total_amount), None, None)?;
            }
            "normalized_price" => {
                col.typed::<DoubleType>().write_batch(&doubles(|r| r.normalized_price), None, None)?;
            }
            "sale_month" => {
                let vals: Vec<i32> = rows.iter().map(|r| r.sale_month as i32).collect();
                col.typed::<Int32Type>().write_batch(&vals, None, None)?;
            }
            "sale_year" => {
                let vals: Vec<i32> = rows.iter().map(|r| r.sale_year).collect();
                col.typed::<Int32Type>().write_batch(&vals, None, None)?;
            }
            "amount_category" => {
                col.typed::<ByteArrayType>()
                    .write_batch(&strings(|r| r.amount_category.as_str().to_string()), None, None)?;
            }
            _ => {
                col.typed::<ByteArrayType>().write_batch(&strings(|r| r.product_category.clone()), None, None)?;
            }
        }
        col.close()?;
        index += 1;
    }
    rg.close()?;
    writer.close()?;
    Ok(())
}

/// Write records as ZSTD-compressed parquet, one file per
/// `sale_year=<y>/sale_month=<m>` partition. Existing files are never touched.
pub fn write_partitioned(root: &Path, batch_id: u64, records: &[EnrichedSalesRecord]) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    if records.is_empty() {
        return Ok(written);
    }

    let mut groups: BTreeMap<(i32, u32), Vec<&EnrichedSalesRecord>> = BTreeMap::new();
    for r in records {
        groups.entry((r.sale_year, r.sale_month)).or_default().push(r);
    }

    let schema = build_schema()?;
    let props = Arc::new(
        WriterProperties::builder()
            .set_compression(Compression::ZSTD(ZstdLevel::default()))
            .build(),
    );

    for ((year, month), rows) in groups {
        let part_dir = root
            .join(format!("{}={}", SALE_YEAR, year))
            .join(format!("{}={}", SALE_MONTH, month));
        fs::create_dir_all(&part_dir)?;
        let file_path = part_dir.join(format!("part-{:05}-{}.parquet", batch_id, Uuid::new_v4()));
        write_file(&file_path, schema.clone(), props.clone(), &rows)?;
        debug!(path = %file_path.display(), rows = rows.len(), "Parquet partition file written");
        written.push(file_path);
    }

    metrics::sink::rows_written("parquet", records.len());
    metrics::sink::files_written("parquet", written.len());
    Ok(written)
}

/// Read one parquet file written by [`write_partitioned`]
pub fn read_parquet_file(path: &Path) -> Result<Vec<EnrichedSalesRecord>> {
    let reader = SerializedFileReader::new(File::open(path)?)?;
    let mut out = Vec::new();
    for row in reader.get_row_iter(None)? {
        let row = row?;
        let date = row.get_string(4)?;
        let sale_date = NaiveDateTime::parse_from_str(date, OUTPUT_DATE_FORMAT).map_err(|e| EtlError::Parse {
            path: path.display().to_string(),
            line: out.len() as u64 + 1,
            message: format!("invalid sale_date '{}': {}", date, e),
        })?;
        let amount_category = row.get_string(9)?.parse().map_err(|message| EtlError::Parse {
            path: path.display().to_string(),
            line: out.len() as u64 + 1,
            message,
        })?;
        out.push(EnrichedSalesRecord {
            product_id: row.get_long(0)?,
            product_name: row.get_string(1)?.clone(),
            quantity_sold: row.get_double(2)?,
            unit_price: row.get_double(3)?,
            sale_date,
            total_amount: row.get_double(5)?,
            normalized_price: row.get_double(6)?,
            sale_month: row.get_int(7)? as u32,
            sale_year: row.get_int(8)?,
            amount_category,
            product_category: row.get_string(10)?.clone(),
        });
    }
    Ok(out)
}

/// Append-only parquet sink for the streaming runner
pub struct ParquetOutputAdapter {
    root: PathBuf,
}

impl ParquetOutputAdapter {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl SalesSinkPort for ParquetOutputAdapter {
    async fn write_batch(&self, batch: &EnrichedBatch) -> anyhow::Result<Vec<PathBuf>> {
        let root = self.root.clone();
        let batch_id = batch.batch_id;
        let records = batch.records.clone();
        let written = tokio::task::spawn_blocking(move || write_partitioned(&root, batch_id, &records)).await??;
        info!(batch_id, files = written.len(), rows = batch.records.len(), "Batch appended to parquet sink");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AmountCategory;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn record(id: i64, year: i32, month: u32) -> EnrichedSalesRecord {
        EnrichedSalesRecord {
            product_id: id,
            product_name: format!("item {}", id),
            quantity_sold: 2.0,
            unit_price: 12.5,
            sale_date: NaiveDate::from_ymd_opt(year, month, 3).unwrap().and_hms_opt(8, 15, 0).unwrap(),
            total_amount: 25.0,
            normalized_price: 0.5,
            sale_month: month,
            sale_year: year,
            amount_category: AmountCategory::Low,
            product_category: "other".to_string(),
        }
    }

    #[test]
    fn test_partition_layout() {
        let dir = tempdir().unwrap();
        let records = vec![record(1, 2024, 1), record(2, 2024, 2), record(3, 2024, 1)];
        let files = write_partitioned(dir.path(), 7, &records).unwrap();

        assert_eq!(files.len(), 2);
        assert!(files[0].starts_with(dir.path().join("sale_year=2024").join("sale_month=1")));
        assert!(files[1].starts_with(dir.path().join("sale_year=2024").join("sale_month=2")));
        let name = files[0].file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("part-00007-") && name.ends_with(".parquet"));

        let january = read_parquet_file(&files[0]).unwrap();
        assert_eq!(january, vec![record(1, 2024, 1), record(3, 2024, 1)]);
    }

    #[test]
    fn test_append_never_overwrites() {
        let dir = tempdir().unwrap();
        let first = write_partitioned(dir.path(), 0, &[record(1, 2024, 1)]).unwrap();
        let second = write_partitioned(dir.path(), 1, &[record(2, 2024, 1)]).unwrap();
        assert_ne!(first[0], second[0]);
        assert!(first[0].exists() && second[0].exists());
    }

    #[test]
    fn test_sub_second_sale_date_round_trips() {
        let dir = tempdir().unwrap();
        let mut rec = record(4, 2024, 6);
        rec.sale_date = NaiveDate::from_ymd_opt(2024, 6, 3)
            .unwrap()
            .and_hms_micro_opt(8, 15, 0, 123_456)
            .unwrap();
        let files = write_partitioned(dir.path(), 0, &[rec.clone()]).unwrap();
        assert_eq!(read_parquet_file(&files[0]).unwrap(), vec![rec]);
    }

    #[test]
    fn test_empty_batch_writes_nothing() {
        let dir = tempdir().unwrap();
        assert!(write_partitioned(dir.path(), 0, &[]).unwrap().is_empty());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_adapter_writes_batch() {
        let dir = tempdir().unwrap();
        let adapter = ParquetOutputAdapter::new(dir.path());
        let batch = EnrichedBatch {
            batch_id: 3,
            files: vec!["a.csv".to_string()],
            records: vec![record(9, 2025, 12)],
        };
        let files = adapter.write_batch(&batch).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(read_parquet_file(&files[0]).unwrap()[0].product_id, 9);
    }
}
