use async_trait::async_trait;
use sales_etl::app::ports::AggregateSinkPort;
use sales_etl::app::stream_use_case::{StreamOptions, StreamingEtlUseCase};
use sales_etl::config::{Config, ParseMode};
use sales_etl::constants::PROCESSED_LEDGER_FILE;
use sales_etl::infra::parquet_output_adapter::{read_parquet_file, ParquetOutputAdapter};
use sales_etl::pipeline::ingestion::CsvLoader;
use sales_etl::pipeline::streaming::{DirectorySource, ProcessedLedger, RevenueSnapshot, YearlyRevenueAggregator};
use sales_etl::pipeline::CleaningPipeline;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

const HEADER: &str = "ID_produit,Nom_produit,Quantite_vendue,Prix_unitaire,Date_vente\n";

struct RecordingAggregateSink {
    emitted: Arc<Mutex<Vec<(u64, RevenueSnapshot)>>>,
}

#[async_trait]
impl AggregateSinkPort for RecordingAggregateSink {
    async fn emit(&self, batch_id: u64, snapshot: &RevenueSnapshot) -> anyhow::Result<()> {
        self.emitted.lock().await.push((batch_id, snapshot.clone()));
        Ok(())
    }
}

fn parquet_files(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().map(|e| e == "parquet").unwrap_or(false) {
                out.push(path);
            }
        }
    }
    out.sort();
    out
}

async fn run_once(
    input: &Path,
    output: &Path,
    checkpoint: &Path,
    emitted: Arc<Mutex<Vec<(u64, RevenueSnapshot)>>>,
) -> sales_etl::app::stream_use_case::StreamOutcome {
    let use_case = StreamingEtlUseCase::new(
        CleaningPipeline::from_config(&Config::default()).unwrap(),
        Arc::new(ParquetOutputAdapter::new(output)),
        Arc::new(RecordingAggregateSink { emitted }),
        YearlyRevenueAggregator::new(2024),
        StreamOptions {
            poll_interval: Duration::from_millis(10),
            max_idle_polls: Some(1),
            channel_capacity: 2,
        },
    );
    let source = DirectorySource::new(
        input,
        CsvLoader::new(ParseMode::Permissive),
        ProcessedLedger::open(checkpoint).unwrap(),
    );
    let (_tx, rx) = watch::channel(false);
    use_case.run(source, rx).await
}

#[tokio::test]
async fn test_stream_writes_partitions_and_aggregate() {
    let root = tempfile::tempdir().unwrap();
    let input = root.path().join("input");
    let output = root.path().join("output");
    let checkpoint = root.path().join("checkpoint");
    fs::create_dir_all(&input).unwrap();

    fs::write(
        input.join("ventes_001.csv"),
        format!(
            "{HEADER}\
             1,Chemise,2,25,2024-01-10 09:00:00\n\
             2,Ordinateur,1,800,2024-02-11 10:00:00\n\
             3,Veste,1,60,2023-12-31 23:59:59\n\
             4,Pantalon,-3,40,2024-01-12 11:00:00\n\
             5,Ecran,1,abc,2024-01-13 12:00:00\n"
        ),
    )
    .unwrap();
    fs::write(input.join("notes.txt"), "ignored").unwrap();

    let emitted = Arc::new(Mutex::new(Vec::new()));
    let outcome = run_once(&input, &output, &checkpoint, emitted.clone()).await;
    assert!(outcome.is_success(), "{:?}", outcome.failures());

    let files = parquet_files(&output);
    assert_eq!(files.len(), 3);
    assert!(files[0].starts_with(output.join("sale_year=2023").join("sale_month=12")));
    assert!(files[1].starts_with(output.join("sale_year=2024").join("sale_month=1")));
    assert!(files[2].starts_with(output.join("sale_year=2024").join("sale_month=2")));

    let january = read_parquet_file(&files[1]).unwrap();
    assert_eq!(january.len(), 1);
    assert_eq!(january[0].product_name, "chemise");
    assert_eq!(january[0].total_amount, 50.0);

    let emitted = emitted.lock().await;
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].1.rows.len(), 1);
    assert_eq!(emitted[0].1.revenue_for(2024), Some(850.0));

    assert!(checkpoint.join(PROCESSED_LEDGER_FILE).exists());
}

#[tokio::test]
async fn test_restart_skips_processed_files() {
    let root = tempfile::tempdir().unwrap();
    let input = root.path().join("input");
    let output = root.path().join("output");
    let checkpoint = root.path().join("checkpoint");
    fs::create_dir_all(&input).unwrap();
    fs::write(
        input.join("a.csv"),
        format!("{HEADER}1,Chemise,1,10,2024-05-01 08:00:00\n"),
    )
    .unwrap();

    let first = run_once(&input, &output, &checkpoint, Arc::new(Mutex::new(Vec::new()))).await;
    assert_eq!(first.producer.unwrap().batches, 1);
    assert_eq!(parquet_files(&output).len(), 1);

    fs::write(
        input.join("b.csv"),
        format!("{HEADER}2,Veste,2,10,2024-05-02 08:00:00\n"),
    )
    .unwrap();
    let emitted = Arc::new(Mutex::new(Vec::new()));
    let second = run_once(&input, &output, &checkpoint, emitted.clone()).await;
    let stats = second.producer.unwrap();
    assert_eq!((stats.batches, stats.files), (1, 1));
    assert_eq!(parquet_files(&output).len(), 2);

    // The aggregate restarts from the files of this run only
    assert_eq!(emitted.lock().await[0].1.revenue_for(2024), Some(20.0));
}

#[tokio::test]
async fn test_unreadable_file_is_skipped() {
    let root = tempfile::tempdir().unwrap();
    let input = root.path().join("input");
    let output = root.path().join("output");
    let checkpoint = root.path().join("checkpoint");
    fs::create_dir_all(&input).unwrap();
    fs::write(input.join("bad.csv"), "foo,bar\n1,2\n").unwrap();
    fs::write(
        input.join("good.csv"),
        format!("{HEADER}1,Chemise,1,10,2024-05-01 08:00:00\n"),
    )
    .unwrap();

    let outcome = run_once(&input, &output, &checkpoint, Arc::new(Mutex::new(Vec::new()))).await;
    assert!(outcome.is_success());
    let stats = outcome.producer.unwrap();
    assert_eq!((stats.files, stats.failed_files), (1, 1));
    assert_eq!(parquet_files(&output).len(), 1);
}
