//! End-to-end refresh into an in-memory SQLite database.

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use trivy_db_sync::Error;
use trivy_db_sync::etl::{RefreshOptions, Refresher, SourceFilter};
use trivy_db_sync::snapshot::MemorySnapshot;
use trivy_db_sync::storage::{Driver, SqliteDriver, TableNames};

async fn memory_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap()
}

fn trivy_snapshot() -> MemorySnapshot {
    let mut snapshot = MemorySnapshot::new();
    snapshot
        .put(
            &["vulnerability"],
            "CVE-2022-0778",
            r#"{"Title":"openssl: Infinite loop in BN_mod_sqrt()","Severity":"HIGH"}"#,
        )
        .put(
            &["vulnerability"],
            "CVE-2023-0286",
            r#"{"Title":"openssl: X.400 address type confusion","Severity":"HIGH"}"#,
        )
        .put(
            &["data-source"],
            "alpine 3.15",
            r#"{"ID":"alpine","Name":"Alpine Secdb","URL":"https://secdb.alpinelinux.org/"}"#,
        )
        .put(
            &["data-source"],
            "debian 11",
            r#"{"ID":"debian","Name":"Debian Security Tracker","URL":"https://salsa.debian.org/security-tracker-team/security-tracker"}"#,
        )
        .put(
            &["alpine 3.15", "openssl"],
            "CVE-2022-0778",
            r#"{"FixedVersion":"1.1.1n-r0"}"#,
        )
        .put(
            &["alpine 3.15", "openssl"],
            "CVE-2023-0286",
            r#"{"FixedVersion":"1.1.1t-r0"}"#,
        )
        .put(&["alpine edge", "openssl"], "CVE-2023-0286", r#"{"FixedVersion":"3.0.8-r0"}"#)
        .put(&["debian 11", "openssl"], "CVE-2022-0778", r#"{"FixedVersion":"1.1.1k-1+deb11u2"}"#)
        .put(&["GitHub Security Advisory npm", "lodash"], "CVE-2021-23337", "{}");
    snapshot
}

async fn advisory_rows(pool: &SqlitePool) -> Vec<(String, String, String, String, String)> {
    sqlx::query_as(
        "SELECT vulnerability_id, platform, segment, package, value \
         FROM vulnerability_advisories ORDER BY platform, segment, vulnerability_id",
    )
    .fetch_all(pool)
    .await
    .unwrap()
}

async fn vulnerability_rows(pool: &SqlitePool) -> Vec<(String, String)> {
    sqlx::query_as("SELECT vulnerability_id, value FROM vulnerabilities ORDER BY vulnerability_id")
        .fetch_all(pool)
        .await
        .unwrap()
}

async fn data_source_rows(pool: &SqlitePool) -> Vec<(String, String, String, String)> {
    sqlx::query_as(
        "SELECT source_key, source_id, source_name, source_url \
         FROM data_sources ORDER BY source_key",
    )
    .fetch_all(pool)
    .await
    .unwrap()
}

async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_full_refresh_is_repeatable() {
    let pool = memory_pool().await;
    let driver = SqliteDriver::new(pool.clone(), TableNames::default());
    driver.migrate().await.unwrap();
    let snapshot = trivy_snapshot();
    let options = RefreshOptions {
        batch_size: 2,
        ..RefreshOptions::default()
    };

    let first = Refresher::new(&driver, options.clone())
        .run(&snapshot)
        .await
        .unwrap();
    let rows_after_first = advisory_rows(&pool).await;
    let vulns_after_first = vulnerability_rows(&pool).await;
    let sources_after_first = data_source_rows(&pool).await;

    let second = Refresher::new(&driver, options).run(&snapshot).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(rows_after_first, advisory_rows(&pool).await);
    assert_eq!(vulns_after_first, vulnerability_rows(&pool).await);
    assert_eq!(sources_after_first, data_source_rows(&pool).await);

    assert_eq!(
        vulns_after_first,
        vec![
            (
                "CVE-2022-0778".to_string(),
                r#"{"Title":"openssl: Infinite loop in BN_mod_sqrt()","Severity":"HIGH"}"#
                    .to_string(),
            ),
            (
                "CVE-2023-0286".to_string(),
                r#"{"Title":"openssl: X.400 address type confusion","Severity":"HIGH"}"#
                    .to_string(),
            ),
        ]
    );
    assert_eq!(
        sources_after_first,
        vec![
            (
                "alpine 3.15".to_string(),
                "alpine".to_string(),
                "Alpine Secdb".to_string(),
                "https://secdb.alpinelinux.org/".to_string(),
            ),
            (
                "debian 11".to_string(),
                "debian".to_string(),
                "Debian Security Tracker".to_string(),
                "https://salsa.debian.org/security-tracker-team/security-tracker".to_string(),
            ),
        ]
    );
    assert_eq!(rows_after_first.len(), 5);
    assert_eq!(first.labels_walked, 4);

    assert_eq!(
        rows_after_first[0],
        (
            "CVE-2021-23337".to_string(),
            "GitHub Security Advisory npm".to_string(),
            String::new(),
            "lodash".to_string(),
            "{}".to_string(),
        )
    );
    let edge: Vec<_> = rows_after_first
        .iter()
        .filter(|row| row.2 == "edge")
        .collect();
    assert_eq!(edge.len(), 1);
    assert_eq!(edge[0].1, "alpine");
}

#[tokio::test]
async fn test_refresh_with_allow_list() {
    let pool = memory_pool().await;
    let driver = SqliteDriver::new(pool.clone(), TableNames::default());
    driver.migrate().await.unwrap();
    let options = RefreshOptions {
        sources: SourceFilter::new(["^alpine"]).unwrap(),
        ..RefreshOptions::default()
    };

    let summary = Refresher::new(&driver, options)
        .run(&trivy_snapshot())
        .await
        .unwrap();

    let rows = advisory_rows(&pool).await;
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|row| row.1 == "alpine"));
    assert_eq!(summary.labels_walked, 2);
    assert_eq!(summary.labels_skipped, 2);
    // Flat tables are always loaded in full.
    assert_eq!(count(&pool, "vulnerabilities").await, 2);
}

#[tokio::test]
async fn test_malformed_data_source_fails_refresh() {
    let pool = memory_pool().await;
    let driver = SqliteDriver::new(pool.clone(), TableNames::default());
    driver.migrate().await.unwrap();
    let mut snapshot = trivy_snapshot();
    snapshot.put(&["data-source"], "broken", "not json");

    let err = Refresher::new(&driver, RefreshOptions::default())
        .run(&snapshot)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Decode { ref key, .. } if key == "broken"));
    // Vulnerabilities were already loaded, advisories never started.
    assert_eq!(count(&pool, "vulnerabilities").await, 2);
    assert_eq!(count(&pool, "data_sources").await, 0);
    assert_eq!(count(&pool, "vulnerability_advisories").await, 0);
}
