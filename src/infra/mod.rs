// Output adapters for the CSV, parquet, and console sinks
pub mod console_aggregate_adapter;
pub mod csv_output_adapter;
pub mod parquet_output_adapter;
