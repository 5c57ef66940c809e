use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, info_span};
use uuid::Uuid;

use crate::config::Config;
use crate::infra::csv_output_adapter::write_enriched_csv;
use crate::pipeline::ingestion::CsvLoader;
use crate::pipeline::processing::DataProfile;
use crate::pipeline::{CleaningPipeline, StageCounts};

/// Outcome of a batch run
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub run_id: String,
    pub input: PathBuf,
    pub output: PathBuf,
    pub counts: StageCounts,
    pub rows_written: usize,
}

/// Use case for the one-shot file-to-file ETL: load, profile, clean,
/// validate, and save.
pub struct BatchEtlUseCase {
    loader: CsvLoader,
    pipeline: CleaningPipeline,
    profile: bool,
    preview_rows: usize,
}

impl BatchEtlUseCase {
    pub fn new(loader: CsvLoader, pipeline: CleaningPipeline, profile: bool, preview_rows: usize) -> Self {
        Self {
            loader,
            pipeline,
            profile,
            preview_rows,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            CsvLoader::new(config.batch.parse_mode),
            CleaningPipeline::from_config(config)?,
            config.batch.profile,
            config.batch.preview_rows,
        ))
    }

    /// Load a file and build its profile without cleaning it
    pub fn profile(&self, input: &Path) -> Result<DataProfile> {
        let raw = self.loader.load(input)?;
        Ok(DataProfile::build(&raw, self.preview_rows))
    }

    /// Run the whole chain. Nothing is written when validation fails.
    pub fn run(&self, input: &Path, output: &Path) -> Result<BatchSummary> {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("batch_run", run_id = %run_id);
        let _enter = span.enter();

        info!(input = %input.display(), "Starting batch ETL");
        let raw = self
            .loader
            .load(input)
            .with_context(|| format!("loading {}", input.display()))?;

        if self.profile {
            println!("{}", DataProfile::build(&raw, self.preview_rows));
        }

        let result = self.pipeline.run(raw)?;
        write_enriched_csv(output, &result.records)
            .with_context(|| format!("writing {}", output.display()))?;

        info!(
            output = %output.display(),
            rows = result.records.len(),
            "Batch ETL finished"
        );
        Ok(BatchSummary {
            run_id,
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            counts: result.counts,
            rows_written: result.records.len(),
        })
    }
}
