use async_trait::async_trait;
use std::path::PathBuf;

use crate::domain::EnrichedSalesRecord;
use crate::pipeline::streaming::RevenueSnapshot;

/// One transformed micro-batch, shared read-only between the stream consumers
#[derive(Debug, Clone)]
pub struct EnrichedBatch {
    pub batch_id: u64,
    pub files: Vec<String>,
    pub records: Vec<EnrichedSalesRecord>,
}

// Stream output ports
#[async_trait]
pub trait SalesSinkPort: Send + Sync {
    /// Persist a batch, returning the files written
    async fn write_batch(&self, batch: &EnrichedBatch) -> anyhow::Result<Vec<PathBuf>>;
}

#[async_trait]
pub trait AggregateSinkPort: Send + Sync {
    async fn emit(&self, batch_id: u64, snapshot: &RevenueSnapshot) -> anyhow::Result<()>;
}
