use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants;

/// The five semantic fields every source must provide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SalesField {
    ProductId,
    ProductName,
    QuantitySold,
    UnitPrice,
    SaleDate,
}

impl SalesField {
    pub const ALL: [SalesField; 5] = [
        SalesField::ProductId,
        SalesField::ProductName,
        SalesField::QuantitySold,
        SalesField::UnitPrice,
        SalesField::SaleDate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SalesField::ProductId => constants::PRODUCT_ID,
            SalesField::ProductName => constants::PRODUCT_NAME,
            SalesField::QuantitySold => constants::QUANTITY_SOLD,
            SalesField::UnitPrice => constants::UNIT_PRICE,
            SalesField::SaleDate => constants::SALE_DATE,
        }
    }

    /// Match a header cell against canonical and localized names
    pub fn from_header(header: &str) -> Option<Self> {
        let canonical = constants::canonical_column(header)?;
        SalesField::ALL.into_iter().find(|f| f.as_str() == canonical)
    }
}

impl fmt::Display for SalesField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A row as read from the source. Every field is nullable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSalesRecord {
    pub product_id: Option<i64>,
    pub product_name: Option<String>,
    pub quantity_sold: Option<f64>,
    pub unit_price: Option<f64>,
    pub sale_date: Option<String>,
}

impl RawSalesRecord {
    pub fn is_null(&self, field: SalesField) -> bool {
        match field {
            SalesField::ProductId => self.product_id.is_none(),
            SalesField::ProductName => self.product_name.is_none(),
            SalesField::QuantitySold => self.quantity_sold.is_none(),
            SalesField::UnitPrice => self.unit_price.is_none(),
            SalesField::SaleDate => self.sale_date.is_none(),
        }
    }
}

/// A row that survived missing-value handling and outlier filtering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesRecord {
    pub product_id: i64,
    pub product_name: String,
    pub quantity_sold: f64,
    pub unit_price: f64,
    pub sale_date: NaiveDateTime,
}

/// Bucket for the total amount of a sale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmountCategory {
    Low,
    Medium,
    High,
}

impl AmountCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AmountCategory::Low => "low",
            AmountCategory::Medium => "medium",
            AmountCategory::High => "high",
        }
    }
}

impl fmt::Display for AmountCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AmountCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" | "faible" => Ok(AmountCategory::Low),
            "medium" | "moyen" => Ok(AmountCategory::Medium),
            "high" | "élevé" | "eleve" => Ok(AmountCategory::High),
            other => Err(format!("unknown amount category '{}'", other)),
        }
    }
}

/// Map localized product category labels to the canonical ones
pub fn canonical_product_category(label: &str) -> String {
    let lowered = label.trim().to_lowercase();
    match lowered.as_str() {
        "habillement" => "apparel".to_string(),
        "électronique" | "electronique" => "electronics".to_string(),
        "autre" => "other".to_string(),
        _ => lowered,
    }
}

/// A cleaned row with every derived column populated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedSalesRecord {
    pub product_id: i64,
    pub product_name: String,
    pub quantity_sold: f64,
    pub unit_price: f64,
    pub sale_date: NaiveDateTime,
    pub total_amount: f64,
    pub normalized_price: f64,
    pub sale_month: u32,
    pub sale_year: i32,
    pub amount_category: AmountCategory,
    pub product_category: String,
}
