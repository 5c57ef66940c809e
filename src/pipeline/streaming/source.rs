use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::constants::PROCESSED_LEDGER_FILE;
use crate::domain::RawSalesRecord;
use crate::error::Result;
use crate::observability::metrics;
use crate::pipeline::ingestion::{list_csv_files, CsvLoader};

/// File names already handed to the consumers, persisted in the checkpoint directory
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ProcessedLedger {
    #[serde(skip)]
    path: PathBuf,
    files: BTreeSet<String>,
}

impl ProcessedLedger {
    pub fn open(checkpoint_dir: &Path) -> Result<Self> {
        fs::create_dir_all(checkpoint_dir)?;
        let path = checkpoint_dir.join(PROCESSED_LEDGER_FILE);
        let mut ledger = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str::<ProcessedLedger>(&content)?
        } else {
            ProcessedLedger::default()
        };
        ledger.path = path;
        Ok(ledger)
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.files.contains(file_name)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Record file names and rewrite the ledger file
    pub fn record<I: IntoIterator<Item = String>>(&mut self, names: I) -> Result<()> {
        self.files.extend(names);
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// New files found by one poll, loaded and concatenated in file-name order
#[derive(Debug)]
pub struct MicroBatch {
    pub files: Vec<String>,
    pub failed_files: Vec<String>,
    /// Failed to load but still inside the settle window; not committed
    pub deferred_files: Vec<String>,
    pub records: Vec<RawSalesRecord>,
}

/// Polls a directory for CSV files not seen before.
///
/// Producers should drop files atomically (write to a name without the
/// `.csv` extension, then rename). A file caught mid-write fails to load;
/// with a settle window it is retried until its modification time is older
/// than the window, without one it is marked as failed right away.
pub struct DirectorySource {
    dir: PathBuf,
    loader: CsvLoader,
    ledger: ProcessedLedger,
    settle_window: Duration,
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

impl DirectorySource {
    pub fn new(dir: &Path, loader: CsvLoader, ledger: ProcessedLedger) -> Self {
        Self {
            dir: dir.to_path_buf(),
            loader,
            ledger,
            settle_window: Duration::ZERO,
        }
    }

    pub fn with_settle_window(mut self, window: Duration) -> Self {
        self.settle_window = window;
        self
    }

    fn still_settling(&self, path: &Path) -> bool {
        if self.settle_window.is_zero() {
            return false;
        }
        match fs::metadata(path).and_then(|m| m.modified()) {
            // A modification time in the future counts as recent
            Ok(modified) => modified.elapsed().map(|age| age < self.settle_window).unwrap_or(true),
            Err(_) => false,
        }
    }

    pub fn ledger(&self) -> &ProcessedLedger {
        &self.ledger
    }

    /// Returns `None` when no new file arrived since the last commit, or when
    /// every new file is still settling. A file that fails to load is reported
    /// in `failed_files` and skipped, or in `deferred_files` while settling.
    pub fn poll(&mut self) -> Result<Option<MicroBatch>> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
        }
        let new_files: Vec<PathBuf> = list_csv_files(&self.dir)?
            .into_iter()
            .filter(|p| !self.ledger.contains(&file_name(p)))
            .collect();
        if new_files.is_empty() {
            return Ok(None);
        }

        let mut batch = MicroBatch {
            files: Vec::new(),
            failed_files: Vec::new(),
            deferred_files: Vec::new(),
            records: Vec::new(),
        };
        for path in new_files {
            let name = file_name(&path);
            match self.loader.load(&path) {
                Ok(records) => {
                    batch.records.extend(records);
                    batch.files.push(name);
                }
                Err(e) if self.still_settling(&path) => {
                    warn!(file = %name, "Input file not loadable yet, retrying on next poll: {}", e);
                    batch.deferred_files.push(name);
                }
                Err(e) => {
                    error!(file = %name, "Skipping unreadable input file: {}", e);
                    println!("❌ Error in stream input {}: {}", name, e);
                    metrics::stream::file_failed();
                    batch.failed_files.push(name);
                }
            }
        }
        if batch.files.is_empty() && batch.failed_files.is_empty() {
            return Ok(None);
        }
        info!(
            files = batch.files.len(),
            failed = batch.failed_files.len(),
            deferred = batch.deferred_files.len(),
            rows = batch.records.len(),
            "Micro-batch collected"
        );
        Ok(Some(batch))
    }

    /// Mark a batch's files (failed ones included, deferred ones not) as processed
    pub fn commit(&mut self, batch: &MicroBatch) -> Result<()> {
        self.ledger
            .record(batch.files.iter().chain(batch.failed_files.iter()).cloned())
    }
}
