/// Column name constants shared by the loader and the sinks.
/// Canonical names are used for output; localized names are accepted on input.

// Canonical input columns
pub const PRODUCT_ID: &str = "product_id";
pub const PRODUCT_NAME: &str = "product_name";
pub const QUANTITY_SOLD: &str = "quantity_sold";
pub const UNIT_PRICE: &str = "unit_price";
pub const SALE_DATE: &str = "sale_date";

// Derived columns
pub const TOTAL_AMOUNT: &str = "total_amount";
pub const NORMALIZED_PRICE: &str = "normalized_price";
pub const SALE_MONTH: &str = "sale_month";
pub const SALE_YEAR: &str = "sale_year";
pub const AMOUNT_CATEGORY: &str = "amount_category";
pub const PRODUCT_CATEGORY: &str = "product_category";

/// Output column order for every sink
pub const OUTPUT_COLUMNS: [&str; 11] = [
    PRODUCT_ID,
    PRODUCT_NAME,
    QUANTITY_SOLD,
    UNIT_PRICE,
    SALE_DATE,
    TOTAL_AMOUNT,
    NORMALIZED_PRICE,
    SALE_MONTH,
    SALE_YEAR,
    AMOUNT_CATEGORY,
    PRODUCT_CATEGORY,
];

/// Localized header names found in source exports, keyed by canonical name
pub const COLUMN_ALIASES: [(&str, &str); 11] = [
    (PRODUCT_ID, "ID_produit"),
    (PRODUCT_NAME, "Nom_produit"),
    (QUANTITY_SOLD, "Quantite_vendue"),
    (UNIT_PRICE, "Prix_unitaire"),
    (SALE_DATE, "Date_vente"),
    (TOTAL_AMOUNT, "Montant_total"),
    (NORMALIZED_PRICE, "Prix_unitaire_normalisé"),
    (SALE_MONTH, "Mois_vente"),
    (SALE_YEAR, "Annee_vente"),
    (AMOUNT_CATEGORY, "Categorie_montant"),
    (PRODUCT_CATEGORY, "Categorie_produit"),
];

/// Resolve a header cell to its canonical column name
pub fn canonical_column(header: &str) -> Option<&'static str> {
    let cleaned = header.trim().trim_start_matches('\u{feff}').trim();
    COLUMN_ALIASES.iter().find_map(|(canonical, localized)| {
        if cleaned.eq_ignore_ascii_case(canonical) || cleaned.to_lowercase() == localized.to_lowercase() {
            Some(*canonical)
        } else {
            None
        }
    })
}

/// Cell values treated as null on input (compared case-insensitively)
pub const NULL_TOKENS: [&str; 6] = ["", "na", "n/a", "nan", "null", "none"];

pub fn is_null_token(cell: &str) -> bool {
    let trimmed = cell.trim();
    NULL_TOKENS.iter().any(|t| trimmed.eq_ignore_ascii_case(t))
}

/// Date format used when writing sale dates. Sub-second precision is kept
/// and omitted when the fraction is zero.
pub const OUTPUT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Date formats tried in order when coercing raw sale dates
pub const DEFAULT_DATE_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d",
    "%d/%m/%Y",
];

/// Ledger file kept in the streaming checkpoint directory
pub const PROCESSED_LEDGER_FILE: &str = "processed_files.json";

/// UTF-8 byte order mark written at the start of CSV output
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_column_accepts_localized_headers() {
        assert_eq!(canonical_column("ID_produit"), Some(PRODUCT_ID));
        assert_eq!(canonical_column(" date_vente "), Some(SALE_DATE));
        assert_eq!(canonical_column("\u{feff}Nom_produit"), Some(PRODUCT_NAME));
        assert_eq!(canonical_column("Prix_unitaire_normalisé"), Some(NORMALIZED_PRICE));
        assert_eq!(canonical_column("Quantity_Sold"), Some(QUANTITY_SOLD));
        assert_eq!(canonical_column("comment"), None);
    }

    #[test]
    fn test_null_tokens() {
        assert!(is_null_token(""));
        assert!(is_null_token("  NaN "));
        assert!(is_null_token("NULL"));
        assert!(!is_null_token("0"));
    }
}
