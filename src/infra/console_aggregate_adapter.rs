use async_trait::async_trait;
use std::fmt::Write;
use tracing::info;

use crate::app::ports::AggregateSinkPort;
use crate::pipeline::streaming::RevenueSnapshot;

const HEADERS: [&str; 2] = ["sale_year", "revenue"];

/// Render a snapshot as a bordered text table headed by the batch number
pub fn render_snapshot(batch_id: u64, snapshot: &RevenueSnapshot) -> String {
    let cells: Vec<[String; 2]> = snapshot
        .rows
        .iter()
        .map(|r| [r.sale_year.to_string(), format!("{:.2}", r.revenue)])
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &cells {
        for (w, cell) in widths.iter_mut().zip(row.iter()) {
            *w = (*w).max(cell.len());
        }
    }
    let border = format!("+{}+{}+", "-".repeat(widths[0]), "-".repeat(widths[1]));

    let mut out = String::new();
    let _ = writeln!(out, "-------------------------------------------");
    let _ = writeln!(out, "Batch: {}", batch_id);
    let _ = writeln!(out, "-------------------------------------------");
    let _ = writeln!(out, "{}", border);
    let _ = writeln!(out, "|{:>w0$}|{:>w1$}|", HEADERS[0], HEADERS[1], w0 = widths[0], w1 = widths[1]);
    let _ = writeln!(out, "{}", border);
    for [year, revenue] in &cells {
        let _ = writeln!(out, "|{:>w0$}|{:>w1$}|", year, revenue, w0 = widths[0], w1 = widths[1]);
    }
    let _ = writeln!(out, "{}", border);
    out
}

/// Prints the full aggregate state to stdout after every micro-batch
#[derive(Debug, Default)]
pub struct ConsoleAggregateAdapter;

impl ConsoleAggregateAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AggregateSinkPort for ConsoleAggregateAdapter {
    async fn emit(&self, batch_id: u64, snapshot: &RevenueSnapshot) -> anyhow::Result<()> {
        println!("{}", render_snapshot(batch_id, snapshot));
        info!(batch_id, years = snapshot.rows.len(), "Revenue aggregate emitted");
        Ok(())
    }
}
