// Streaming components: directory micro-batch source and the running revenue aggregate

pub mod aggregator;
pub mod source;

pub use aggregator::{RevenueSnapshot, YearRevenue, YearlyRevenueAggregator};
pub use source::{DirectorySource, MicroBatch, ProcessedLedger};
