use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::EnrichedSalesRecord;

/// Cumulative revenue of one sale year
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearRevenue {
    pub sale_year: i32,
    pub revenue: f64,
}

/// Full aggregation state after a micro-batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RevenueSnapshot {
    pub rows: Vec<YearRevenue>,
}

impl RevenueSnapshot {
    pub fn revenue_for(&self, year: i32) -> Option<f64> {
        self.rows.iter().find(|r| r.sale_year == year).map(|r| r.revenue)
    }
}

/// Running sum of total_amount for the current calendar year, grouped by year
#[derive(Debug, Clone)]
pub struct YearlyRevenueAggregator {
    current_year: i32,
    totals: BTreeMap<i32, f64>,
}

impl YearlyRevenueAggregator {
    pub fn new(current_year: i32) -> Self {
        Self {
            current_year,
            totals: BTreeMap::new(),
        }
    }

    pub fn current_year(&self) -> i32 {
        self.current_year
    }

    /// Fold a batch into the running state and return the complete state
    pub fn update(&mut self, records: &[EnrichedSalesRecord]) -> RevenueSnapshot {
        for r in records.iter().filter(|r| r.sale_year == self.current_year) {
            *self.totals.entry(r.sale_year).or_insert(0.0) += r.total_amount;
        }
        self.snapshot()
    }

    pub fn snapshot(&self) -> RevenueSnapshot {
        RevenueSnapshot {
            rows: self
                .totals
                .iter()
                .map(|(year, revenue)| YearRevenue {
                    sale_year: *year,
                    revenue: *revenue,
                })
                .collect(),
        }
    }
}
