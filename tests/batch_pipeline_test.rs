use sales_etl::app::batch_use_case::BatchEtlUseCase;
use sales_etl::config::{Config, ParseMode};
use sales_etl::constants::{OUTPUT_COLUMNS, UTF8_BOM};
use sales_etl::domain::{AmountCategory, SalesField};
use sales_etl::error::EtlError;
use sales_etl::infra::csv_output_adapter::{read_enriched_csv, write_enriched_csv};
use sales_etl::pipeline::ingestion::CsvLoader;
use sales_etl::pipeline::processing::deduplicate;
use sales_etl::pipeline::CleaningPipeline;
use std::fs;
use tempfile::tempdir;

const SALES: &str = "\
ID_produit,Nom_produit,Quantite_vendue,Prix_unitaire,Date_vente
1,  Chemise Bleue ,2,25.0,2024-03-15
2,Ordinateur Portable,1,899.99,2024-03-16 14:30:00
2,Ordinateur Portable,1,899.99,2024-03-16 14:30:00
3,Pantalon,-1,40,2024-03-17
4,Ecran,2,100,2024-03-18
5,Tasse,4,12.5,not a date
6,Veste,1,0,2024-03-19
7,Stylo,10,1.5,2024-04-01
";

fn quiet_config() -> Config {
    let mut config = Config::default();
    config.batch.profile = false;
    config
}

#[test]
fn test_batch_end_to_end() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("ventes.csv");
    let output = dir.path().join("vente_clean.csv");
    fs::write(&input, SALES).unwrap();

    let summary = BatchEtlUseCase::from_config(&quiet_config())
        .unwrap()
        .run(&input, &output)
        .unwrap();
    assert_eq!(summary.counts.loaded, 8);
    assert_eq!(summary.counts.after_outliers, 5);
    assert_eq!(summary.rows_written, 4);

    let bytes = fs::read(&output).unwrap();
    assert!(bytes.starts_with(UTF8_BOM));

    let rows = read_enriched_csv(&output).unwrap();
    assert_eq!(rows.len(), 4);
    for r in &rows {
        assert!(r.quantity_sold > 0.0 && r.unit_price > 0.0);
        assert_eq!(r.total_amount, r.quantity_sold * r.unit_price);
        assert!((0.0..=1.0).contains(&r.normalized_price));
    }

    let shirt = &rows[0];
    assert_eq!(shirt.product_name, "chemise bleue");
    assert_eq!(shirt.total_amount, 50.0);
    assert_eq!(shirt.amount_category, AmountCategory::Low);
    assert_eq!(shirt.product_category, "apparel");
    assert_eq!((shirt.sale_month, shirt.sale_year), (3, 2024));

    let laptop = &rows[1];
    assert_eq!(laptop.product_category, "electronics");
    assert_eq!(laptop.amount_category, AmountCategory::High);
    assert_eq!(laptop.normalized_price, 1.0);

    let screen = &rows[2];
    assert_eq!(screen.total_amount, 200.0);
    assert_eq!(screen.amount_category, AmountCategory::Medium);

    let pen = &rows[3];
    assert_eq!(pen.product_category, "other");
    assert_eq!(pen.normalized_price, 0.0);
}

#[test]
fn test_written_file_round_trips_and_dedups_to_itself() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("ventes.csv");
    let output = dir.path().join("vente_clean.csv");
    fs::write(&input, SALES).unwrap();
    BatchEtlUseCase::from_config(&quiet_config())
        .unwrap()
        .run(&input, &output)
        .unwrap();

    let rows = read_enriched_csv(&output).unwrap();
    assert_eq!(deduplicate(rows.clone()), rows);

    let again = dir.path().join("again.csv");
    write_enriched_csv(&again, &rows).unwrap();
    assert_eq!(read_enriched_csv(&again).unwrap(), rows);

    let header = fs::read_to_string(&again).unwrap();
    let first_line = header.trim_start_matches('\u{feff}').lines().next().unwrap().to_string();
    assert_eq!(first_line, OUTPUT_COLUMNS.join(","));
}

#[test]
fn test_missing_source_file() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("out.csv");
    let err = BatchEtlUseCase::from_config(&quiet_config())
        .unwrap()
        .run(&dir.path().join("nope.csv"), &output)
        .unwrap_err();
    assert!(matches!(err.downcast_ref::<EtlError>(), Some(EtlError::SourceNotFound(_))));
    assert!(!output.exists());
}

#[test]
fn test_missing_required_column_is_schema_error() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("ventes.csv");
    fs::write(&input, "ID_produit,Nom_produit,Quantite_vendue,Date_vente\n1,a,1,2024-01-01\n").unwrap();

    let err = CsvLoader::new(ParseMode::Strict).load(&input).unwrap_err();
    match err {
        EtlError::Schema { missing, .. } => assert_eq!(missing, vec!["unit_price".to_string()]),
        other => panic!("expected schema error, got {:?}", other),
    }
}

#[test]
fn test_strict_mode_rejects_bad_number_permissive_nulls_it() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("ventes.csv");
    fs::write(
        &input,
        "ID_produit,Nom_produit,Quantite_vendue,Prix_unitaire,Date_vente\n1,a,deux,10,2024-01-01\n",
    )
    .unwrap();

    assert!(matches!(
        CsvLoader::new(ParseMode::Strict).load(&input),
        Err(EtlError::Parse { line: 2, .. })
    ));
    let rows = CsvLoader::new(ParseMode::Permissive).load(&input).unwrap();
    assert_eq!(rows[0].quantity_sold, None);
}

#[test]
fn test_median_imputation_when_price_not_critical() {
    let mut config = quiet_config();
    config.cleaning.critical_fields = vec![SalesField::ProductId, SalesField::ProductName, SalesField::SaleDate];
    let dir = tempdir().unwrap();
    let input = dir.path().join("ventes.csv");
    fs::write(
        &input,
        "ID_produit,Nom_produit,Quantite_vendue,Prix_unitaire,Date_vente\n\
         1,a,1,10,2024-01-01\n\
         2,b,1,,2024-01-01\n\
         3,c,1,30,2024-01-01\n\
         4,d,,20,2024-01-01\n",
    )
    .unwrap();

    let raw = CsvLoader::new(ParseMode::Strict).load(&input).unwrap();
    let result = CleaningPipeline::from_config(&config).unwrap().run(raw).unwrap();
    // Quantity 0 after imputation fails the outlier filter
    assert_eq!(result.records.len(), 3);
    assert_eq!(result.records[1].unit_price, 20.0);
}

#[test]
fn test_infinite_price_does_not_poison_normalization() {
    let raw = |id: i64, price: f64| sales_etl::domain::RawSalesRecord {
        product_id: Some(id),
        product_name: Some(format!("item {}", id)),
        quantity_sold: Some(1.0),
        unit_price: Some(price),
        sale_date: Some("2024-01-01".to_string()),
    };
    let result = CleaningPipeline::from_config(&quiet_config())
        .unwrap()
        .run(vec![raw(1, 25.0), raw(2, f64::INFINITY), raw(3, 50.0)])
        .unwrap();

    assert_eq!(result.records.len(), 2);
    let normalized: Vec<f64> = result.records.iter().map(|r| r.normalized_price).collect();
    assert_eq!(normalized, vec![0.0, 1.0]);
}
