use chrono::Datelike;
use regex::{Regex, RegexBuilder};
use tracing::info;

use crate::config::{CategoryRule, EnrichConfig};
use crate::domain::{AmountCategory, EnrichedSalesRecord, SalesRecord};
use crate::error::{EtlError, Result};
use crate::observability::metrics;

/// Trait for deriving the enrichment columns of a cleaned record set
pub trait Enricher {
    /// Enrich the whole set; set-wide statistics (price range) are taken over `records`
    fn enrich(&self, records: Vec<SalesRecord>) -> Vec<EnrichedSalesRecord>;
}

/// Priority-ordered (category, keywords) table compiled into one regex per category
#[derive(Debug, Clone)]
pub struct CategoryTable {
    rules: Vec<(String, Regex)>,
    fallback: String,
}

impl CategoryTable {
    pub fn new(rules: &[CategoryRule], fallback: &str) -> Result<Self> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            let alternatives: Vec<String> = rule
                .keywords
                .iter()
                .map(|k| k.trim())
                .filter(|k| !k.is_empty())
                .map(|k| regex::escape(&k.to_lowercase()))
                .collect();
            // An empty alternation would match every name
            if alternatives.is_empty() {
                continue;
            }
            let pattern = RegexBuilder::new(&alternatives.join("|"))
                .case_insensitive(true)
                .build()
                .map_err(|e| EtlError::Config(format!("invalid keywords for category '{}': {}", rule.name, e)))?;
            compiled.push((rule.name.clone(), pattern));
        }
        Ok(Self {
            rules: compiled,
            fallback: fallback.to_string(),
        })
    }

    /// First category with a keyword contained in `name` wins
    pub fn classify(&self, name: &str) -> &str {
        self.rules
            .iter()
            .find(|(_, pattern)| pattern.is_match(name))
            .map(|(category, _)| category.as_str())
            .unwrap_or(self.fallback.as_str())
    }
}

/// Upper bounds (inclusive) of the low and medium amount buckets
#[derive(Debug, Clone, Copy)]
pub struct AmountThresholds {
    pub low_max: f64,
    pub medium_max: f64,
}

impl Default for AmountThresholds {
    fn default() -> Self {
        Self {
            low_max: 50.0,
            medium_max: 200.0,
        }
    }
}

impl AmountThresholds {
    pub fn classify(&self, total_amount: f64) -> AmountCategory {
        if total_amount <= self.low_max {
            AmountCategory::Low
        } else if total_amount <= self.medium_max {
            AmountCategory::Medium
        } else {
            AmountCategory::High
        }
    }
}

/// Default enricher driven by [`EnrichConfig`]
#[derive(Debug, Clone)]
pub struct DefaultEnricher {
    categories: CategoryTable,
    thresholds: AmountThresholds,
    price_decimals: u32,
}

impl DefaultEnricher {
    pub fn from_config(config: &EnrichConfig) -> Result<Self> {
        Ok(Self {
            categories: CategoryTable::new(&config.categories, &config.fallback_category)?,
            thresholds: AmountThresholds {
                low_max: config.low_max,
                medium_max: config.medium_max,
            },
            price_decimals: config.price_decimals,
        })
    }

    pub fn categories(&self) -> &CategoryTable {
        &self.categories
    }
}

impl Enricher for DefaultEnricher {
    fn enrich(&self, records: Vec<SalesRecord>) -> Vec<EnrichedSalesRecord> {
        let range = price_range(&records);
        let count = records.len();

        let enriched: Vec<EnrichedSalesRecord> = records
            .into_iter()
            .map(|r| {
                let total_amount = r.quantity_sold * r.unit_price;
                let normalized_price = normalize_price(r.unit_price, range, self.price_decimals);
                let product_name = clean_product_name(&r.product_name);
                let amount_category = self.thresholds.classify(total_amount);
                let product_category = self.categories.classify(&product_name).to_string();

                EnrichedSalesRecord {
                    product_id: r.product_id,
                    product_name,
                    quantity_sold: r.quantity_sold,
                    unit_price: r.unit_price,
                    sale_date: r.sale_date,
                    total_amount,
                    normalized_price,
                    sale_month: r.sale_date.month(),
                    sale_year: r.sale_date.year(),
                    amount_category,
                    product_category,
                }
            })
            .collect();

        metrics::enrich::rows_enriched(count);
        info!(rows = count, price_min = ?range.map(|r| r.0), price_max = ?range.map(|r| r.1), "Enrichment applied");

        enriched
    }
}

/// Min and max unit price of the set
fn price_range(records: &[SalesRecord]) -> Option<(f64, f64)> {
    records.iter().map(|r| r.unit_price).fold(None, |acc, p| match acc {
        None => Some((p, p)),
        Some((lo, hi)) => Some((lo.min(p), hi.max(p))),
    })
}

/// Min-max scaling rounded to `decimals`; a flat price range maps to 0.0
pub fn normalize_price(price: f64, range: Option<(f64, f64)>, decimals: u32) -> f64 {
    match range {
        Some((lo, hi)) if hi > lo => round_to((price - lo) / (hi - lo), decimals),
        _ => 0.0,
    }
}

pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

pub fn clean_product_name(name: &str) -> String {
    name.trim().to_lowercase()
}
