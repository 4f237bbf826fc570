//! Integration tests for the lookalike pipeline

use std::io::Write;

use lookalike::segment::best_of_seeds;
use lookalike::{
    build_profiles, load_records, normalize, rank_many, rank_similar, report, segment,
    summarize_clusters, AnalysisError, KMeansParams, SeedPolicy, ZeroVariancePolicy,
};
use tempfile::{tempdir, NamedTempFile};

fn write_csv(lines: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    file
}

struct Fixture {
    customers: NamedTempFile,
    products: NamedTempFile,
    transactions: NamedTempFile,
}

/// Six transacting customers in two behavioral groups plus one inactive customer
fn create_fixture() -> Fixture {
    let customers = write_csv(&[
        "CustomerID,CustomerName,Region,SignupDate",
        "C0001,Lawrence Carroll,Europe,2022-07-10",
        "C0002,Elizabeth Lutz,Europe,2022-02-13",
        "C0003,Michael Rivera,Europe,2024-03-07",
        "C0004,Kathleen Rodriguez,Asia,2022-10-09",
        "C0005,Laura Weber,Asia,2022-08-15",
        "C0006,Brittany Palmer,Asia,2024-01-07",
        "C0007,Paul Graves,North America,2022-06-18",
    ]);

    let products = write_csv(&[
        "ProductID,ProductName,Category,Price",
        "P001,ActiveWear Biography,Books,20.00",
        "P002,SoundWave Cookbook,Books,30.00",
        "P003,ActiveWear Smartwatch,Electronics,300.00",
        "P004,TechPro Headphones,Electronics,250.00",
        "P005,HomeSense Rug,Home Decor,80.00",
    ]);

    let transactions = write_csv(&[
        "TransactionID,CustomerID,ProductID,TransactionDate,Quantity,TotalValue,Price",
        // Book readers
        "T00001,C0001,P001,2024-01-05 10:00:00,2,40.00,20.00",
        "T00002,C0001,P002,2024-02-11 12:30:00,1,30.00,30.00",
        "T00003,C0002,P001,2024-03-02 09:15:00,2,40.00,20.00",
        "T00004,C0002,P002,2024-03-20 18:45:00,1,30.00,30.00",
        "T00005,C0003,P002,2024-04-01 14:00:00,3,90.00,30.00",
        // Electronics buyers
        "T00006,C0004,P003,2024-05-10 11:00:00,1,300.00,300.00",
        "T00007,C0004,P004,2024-06-12 16:20:00,1,250.00,250.00",
        "T00008,C0005,P003,2024-06-30 08:05:00,2,600.00,300.00",
        "T00009,C0006,P004,2024-07-04 19:40:00,1,250.00,250.00",
        "T00010,C0006,P005,2024-07-05 19:41:00,1,80.00,80.00",
    ]);

    Fixture {
        customers,
        products,
        transactions,
    }
}

fn load(fixture: &Fixture) -> lookalike::RecordSet {
    load_records(
        fixture.customers.path(),
        fixture.products.path(),
        fixture.transactions.path(),
    )
    .unwrap()
}

#[test]
fn test_end_to_end_pipeline() {
    let fixture = create_fixture();
    let records = load(&fixture);

    let mut profiles = build_profiles(&records).unwrap();

    // C0007 never transacted and is not profiled
    assert_eq!(profiles.len(), 6);
    assert!(profiles.index_of("C0007").is_none());
    assert_eq!(profiles.schema.categories, vec!["Books", "Electronics", "Home Decor"]);
    assert_eq!(profiles.schema.regions, vec!["Asia", "Europe", "North America"]);

    let matrix = normalize(&profiles, ZeroVariancePolicy::ZeroFill).unwrap();
    assert_eq!(matrix.constant_columns(), vec!["Region_North America"]);

    // Lowest inertia over several seeds settles on the global optimum
    let seeds: Vec<u64> = (0..10).collect();
    let assignment = best_of_seeds(&matrix, &KMeansParams::new(2), &seeds).unwrap();
    assert_eq!(assignment.labels.len(), 6);
    assert!(assignment.davies_bouldin.is_finite() && assignment.davies_bouldin >= 0.0);

    // Book readers and electronics buyers end up in different segments
    let books = assignment.label_of("C0001").unwrap();
    let electronics = assignment.label_of("C0004").unwrap();
    assert_ne!(books, electronics);
    assert_eq!(assignment.label_of("C0002"), Some(books));
    assert_eq!(assignment.label_of("C0005"), Some(electronics));

    profiles.attach_clusters(&assignment).unwrap();
    let summaries = summarize_clusters(&profiles, &assignment).unwrap();
    assert_eq!(summaries.iter().map(|s| s.size).sum::<usize>(), 6);

    let dir = tempdir().unwrap();
    let path = dir.path().join("segments.csv");
    let mut df = report::profile_frame(&profiles).unwrap();
    report::write_csv(&mut df, &path).unwrap();
    assert!(path.exists());
}

#[test]
fn test_lookalikes_table() {
    let fixture = create_fixture();
    let profiles = build_profiles(&load(&fixture)).unwrap();
    let matrix = normalize(&profiles, ZeroVariancePolicy::ZeroFill).unwrap();

    // C0001 and C0002 have identical purchase histories
    let result = rank_similar(&matrix, "C0001", 3).unwrap();
    assert_eq!(result.neighbors[0].customer_id, "C0002");
    assert!((result.neighbors[0].score - 1.0).abs() < 1e-9);
    assert!(result.neighbors.iter().all(|n| n.customer_id != "C0001"));
    assert!(result.neighbors.iter().all(|n| (-1.0..=1.0).contains(&n.score)));

    let queries = ["C0001", "C0007", "C0004"];
    let rows = report::lookalike_rows(rank_many(&matrix, &queries, 3));
    assert_eq!(rows.len(), 2);

    let dir = tempdir().unwrap();
    let path = dir.path().join("lookalikes.csv");
    let mut df = report::lookalike_frame(&rows, 3).unwrap();
    report::write_csv(&mut df, &path).unwrap();

    let written = std::fs::read_to_string(&path).unwrap();
    assert_eq!(
        written.lines().next().unwrap(),
        "CustomerID,Similar1,Score1,Similar2,Score2,Similar3,Score3"
    );
    assert!(written.lines().nth(1).unwrap().starts_with("C0001,C0002,"));
}

#[test]
fn test_error_handling() {
    let fixture = create_fixture();
    let profiles = build_profiles(&load(&fixture)).unwrap();
    let matrix = normalize(&profiles, ZeroVariancePolicy::ZeroFill).unwrap();

    // Inactive customers have no profile
    assert_eq!(
        rank_similar(&matrix, "C0007", 1),
        Err(AnalysisError::not_found("customer", "C0007"))
    );

    // Five other customers: k = 5 asks for every one of them
    assert!(matches!(
        rank_similar(&matrix, "C0001", 5),
        Err(AnalysisError::InvalidArgument(_))
    ));

    assert!(segment(&matrix, &KMeansParams::new(1)).is_err());
    assert!(segment(&matrix, &KMeansParams::new(6)).is_err());

    // An unpurchased region column is constant
    assert!(matches!(
        normalize(&profiles, ZeroVariancePolicy::Reject),
        Err(AnalysisError::InvalidArgument(_))
    ));
}

#[test]
fn test_fixed_seed_reproducible_across_runs() {
    let fixture = create_fixture();
    let profiles = build_profiles(&load(&fixture)).unwrap();
    let matrix = normalize(&profiles, ZeroVariancePolicy::ZeroFill).unwrap();
    let params = KMeansParams::new(3).with_seed(SeedPolicy::Fixed(2024));

    let first = segment(&matrix, &params).unwrap();
    let second = segment(&matrix, &params).unwrap();
    assert_eq!(first.labels, second.labels);
    assert_eq!(first.davies_bouldin, second.davies_bouldin);
}

#[test]
fn test_missing_file_fails() {
    let fixture = create_fixture();
    let missing = std::path::Path::new("/nonexistent/Transactions.csv");
    assert!(load_records(fixture.customers.path(), fixture.products.path(), missing).is_err());
}
