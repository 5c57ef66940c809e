use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::app::ports::{AggregateSinkPort, EnrichedBatch, SalesSinkPort};
use crate::config::{Config, StreamConfig};
use crate::domain::RawSalesRecord;
use crate::infra::console_aggregate_adapter::ConsoleAggregateAdapter;
use crate::infra::parquet_output_adapter::ParquetOutputAdapter;
use crate::observability::metrics;
use crate::pipeline::streaming::{DirectorySource, RevenueSnapshot, YearlyRevenueAggregator};
use crate::pipeline::CleaningPipeline;

/// Stages 2 to 5 over one micro-batch. Pure with respect to its inputs.
pub fn transform_micro_batch(
    pipeline: &CleaningPipeline,
    batch_id: u64,
    files: Vec<String>,
    records: Vec<RawSalesRecord>,
) -> EnrichedBatch {
    let (records, counts) = pipeline.transform(records);
    info!(
        batch_id,
        loaded = counts.loaded,
        after_missing_values = counts.after_missing_values,
        after_outliers = counts.after_outliers,
        after_dedup = counts.after_dedup,
        enriched = counts.enriched,
        "Micro-batch transformed"
    );
    EnrichedBatch {
        batch_id,
        files,
        records,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StreamOptions {
    pub poll_interval: Duration,
    /// Stop after this many consecutive empty polls; `None` runs until shutdown
    pub max_idle_polls: Option<u32>,
    pub channel_capacity: usize,
}

impl StreamOptions {
    pub fn from_config(config: &StreamConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_idle_polls: config.max_idle_polls,
            channel_capacity: config.channel_capacity.max(1),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProducerStats {
    pub batches: u64,
    pub files: usize,
    pub failed_files: usize,
    pub records: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SinkStats {
    pub batches: u64,
    pub rows: usize,
    pub files: usize,
}

/// What each of the three tasks reported when the run ended
#[derive(Debug)]
pub struct StreamOutcome {
    pub run_id: String,
    pub producer: Result<ProducerStats, String>,
    pub parquet: Result<SinkStats, String>,
    pub aggregate: Result<Option<RevenueSnapshot>, String>,
}

impl StreamOutcome {
    pub fn is_success(&self) -> bool {
        self.producer.is_ok() && self.parquet.is_ok() && self.aggregate.is_ok()
    }

    /// Error texts of the failed tasks, labelled by task
    pub fn failures(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Err(e) = &self.producer {
            out.push(format!("producer: {}", e));
        }
        if let Err(e) = &self.parquet {
            out.push(format!("parquet sink: {}", e));
        }
        if let Err(e) = &self.aggregate {
            out.push(format!("aggregate sink: {}", e));
        }
        out
    }
}

/// Use case for the directory-watching ETL: one producer feeding two
/// independent consumers over bounded channels.
pub struct StreamingEtlUseCase {
    pipeline: CleaningPipeline,
    sales_sink: Arc<dyn SalesSinkPort>,
    aggregate_sink: Arc<dyn AggregateSinkPort>,
    aggregator: YearlyRevenueAggregator,
    options: StreamOptions,
}

impl StreamingEtlUseCase {
    pub fn new(
        pipeline: CleaningPipeline,
        sales_sink: Arc<dyn SalesSinkPort>,
        aggregate_sink: Arc<dyn AggregateSinkPort>,
        aggregator: YearlyRevenueAggregator,
        options: StreamOptions,
    ) -> Self {
        Self {
            pipeline,
            sales_sink,
            aggregate_sink,
            aggregator,
            options,
        }
    }

    /// Parquet files under `output_dir` and the console table
    pub fn with_default_sinks(config: &Config, output_dir: &Path, current_year: i32) -> Result<Self> {
        Ok(Self::new(
            CleaningPipeline::from_config(config)?,
            Arc::new(ParquetOutputAdapter::new(output_dir)),
            Arc::new(ConsoleAggregateAdapter::new()),
            YearlyRevenueAggregator::new(current_year),
            StreamOptions::from_config(&config.stream),
        ))
    }

    pub async fn run(self, source: DirectorySource, shutdown: watch::Receiver<bool>) -> StreamOutcome {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("stream_run", run_id = %run_id);

        async move {
            info!(
                poll_interval_ms = self.options.poll_interval.as_millis() as u64,
                max_idle_polls = ?self.options.max_idle_polls,
                "Starting streaming ETL"
            );
            let (sales_tx, sales_rx) = mpsc::channel(self.options.channel_capacity);
            let (agg_tx, agg_rx) = mpsc::channel(self.options.channel_capacity);

            let sales = tokio::spawn(run_sales_consumer(self.sales_sink, sales_rx).in_current_span());
            let aggregate =
                tokio::spawn(run_aggregate_consumer(self.aggregate_sink, self.aggregator, agg_rx).in_current_span());
            let producer = produce(self.pipeline, source, self.options, sales_tx, agg_tx, shutdown);

            let (producer, sales, aggregate) = tokio::join!(producer, sales, aggregate);
            let outcome = StreamOutcome {
                run_id: run_id.clone(),
                producer,
                parquet: sales.map_err(|e| format!("parquet consumer panicked: {}", e)).and_then(|r| r),
                aggregate: aggregate
                    .map_err(|e| format!("aggregate consumer panicked: {}", e))
                    .and_then(|r| r),
            };
            if outcome.is_success() {
                info!("Streaming ETL stopped cleanly");
            } else {
                for failure in outcome.failures() {
                    error!("Streaming task failed: {}", failure);
                }
            }
            outcome
        }
        .instrument(span)
        .await
    }
}

async fn forward(
    tx: &mut Option<mpsc::Sender<Arc<EnrichedBatch>>>,
    batch: Arc<EnrichedBatch>,
    consumer: &'static str,
) {
    if let Some(sender) = tx {
        if sender.send(batch).await.is_err() {
            warn!(consumer, "Consumer stopped, no longer feeding it");
            *tx = None;
        }
    }
}

/// Runs file I/O and the cleaning stages on the blocking pool, inside the caller's span
async fn on_blocking_pool<T, F>(f: F) -> Result<T, String>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let span = tracing::Span::current();
    tokio::task::spawn_blocking(move || span.in_scope(f))
        .await
        .map_err(|e| format!("blocking stream task panicked: {}", e))
}

async fn produce(
    pipeline: CleaningPipeline,
    mut source: DirectorySource,
    options: StreamOptions,
    sales_tx: mpsc::Sender<Arc<EnrichedBatch>>,
    agg_tx: mpsc::Sender<Arc<EnrichedBatch>>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<ProducerStats, String> {
    let pipeline = Arc::new(pipeline);
    let mut sales_tx = Some(sales_tx);
    let mut agg_tx = Some(agg_tx);
    let mut stats = ProducerStats::default();
    let mut idle_polls = 0u32;
    let mut watching_shutdown = true;

    loop {
        if *shutdown.borrow() {
            info!("Shutdown requested, stopping producer");
            break;
        }
        if sales_tx.is_none() && agg_tx.is_none() {
            warn!("Every consumer has stopped, stopping producer");
            break;
        }

        // The source moves onto the blocking pool and comes back with the result
        let (returned, polled) = on_blocking_pool(move || {
            let polled = source.poll();
            (source, polled)
        })
        .await?;
        source = returned;
        let polled = polled.map_err(|e| {
            error!("Polling the input directory failed: {}", e);
            println!("❌ Stream source failed: {}", e);
            e.to_string()
        })?;

        match polled {
            Some(mut micro) => {
                idle_polls = 0;
                let records = std::mem::take(&mut micro.records);
                stats.records += records.len();
                let batch_id = stats.batches;
                let files = micro.files.clone();
                let stage_pipeline = pipeline.clone();
                let batch = Arc::new(
                    on_blocking_pool(move || transform_micro_batch(&stage_pipeline, batch_id, files, records)).await?,
                );

                forward(&mut sales_tx, batch.clone(), "parquet").await;
                forward(&mut agg_tx, batch, "aggregate").await;

                let (processed, failed) = (micro.files.len(), micro.failed_files.len());
                let (returned, committed) = on_blocking_pool(move || {
                    let committed = source.commit(&micro);
                    (source, committed)
                })
                .await?;
                source = returned;
                committed.map_err(|e| {
                    error!("Could not update the processed-file ledger: {}", e);
                    e.to_string()
                })?;
                metrics::stream::batch_processed(processed);
                stats.files += processed;
                stats.failed_files += failed;
                stats.batches += 1;
            }
            None => {
                idle_polls += 1;
                if let Some(max) = options.max_idle_polls {
                    if idle_polls >= max {
                        info!(idle_polls, "Idle limit reached, stopping producer");
                        break;
                    }
                }
                tokio::select! {
                    _ = tokio::time::sleep(options.poll_interval) => {}
                    changed = shutdown.changed(), if watching_shutdown => {
                        if changed.is_err() {
                            watching_shutdown = false;
                        }
                    }
                }
            }
        }
    }

    info!(
        batches = stats.batches,
        files = stats.files,
        failed_files = stats.failed_files,
        "Producer finished"
    );
    Ok(stats)
}

async fn run_sales_consumer(
    sink: Arc<dyn SalesSinkPort>,
    mut rx: mpsc::Receiver<Arc<EnrichedBatch>>,
) -> Result<SinkStats, String> {
    let mut stats = SinkStats::default();
    while let Some(batch) = rx.recv().await {
        match sink.write_batch(&batch).await {
            Ok(written) => {
                stats.batches += 1;
                stats.rows += batch.records.len();
                stats.files += written.len();
            }
            Err(e) => {
                error!(consumer = "parquet", batch_id = batch.batch_id, "Sink write failed: {:#}", e);
                println!("❌ Parquet sink failed on batch {}: {:#}", batch.batch_id, e);
                metrics::stream::consumer_error("parquet");
                return Err(format!("batch {}: {:#}", batch.batch_id, e));
            }
        }
    }
    Ok(stats)
}

async fn run_aggregate_consumer(
    sink: Arc<dyn AggregateSinkPort>,
    mut aggregator: YearlyRevenueAggregator,
    mut rx: mpsc::Receiver<Arc<EnrichedBatch>>,
) -> Result<Option<RevenueSnapshot>, String> {
    let mut last = None;
    while let Some(batch) = rx.recv().await {
        let snapshot = aggregator.update(&batch.records);
        metrics::stream::current_year_revenue(snapshot.revenue_for(aggregator.current_year()).unwrap_or(0.0));
        if let Err(e) = sink.emit(batch.batch_id, &snapshot).await {
            error!(consumer = "aggregate", batch_id = batch.batch_id, "Aggregate emit failed: {:#}", e);
            println!("❌ Aggregate output failed on batch {}: {:#}", batch.batch_id, e);
            metrics::stream::consumer_error("aggregate");
            return Err(format!("batch {}: {:#}", batch.batch_id, e));
        }
        last = Some(snapshot);
    }
    Ok(last)
}
