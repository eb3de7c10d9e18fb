use anyhow::Result;
use tracing::{error, info, warn};

use trivy_db_sync::config::{Command, Config};
use trivy_db_sync::etl::Refresher;
use trivy_db_sync::snapshot::BoltSnapshot;
use trivy_db_sync::{Error, logging, storage};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_args();

    // Handle version subcommand
    if let Some(Command::Version) = &config.command {
        println!(
            "trivy-db-sync {}, commit: {}, build_date: {}",
            env!("CARGO_PKG_VERSION"),
            env!("VERGEN_GIT_SHA"),
            env!("VERGEN_BUILD_TIMESTAMP"),
        );
        return Ok(());
    }

    logging::init(&config.log_format, &config.log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("VERGEN_GIT_SHA"),
        build_date = env!("VERGEN_BUILD_TIMESTAMP"),
        "trivy-db-sync starting"
    );

    if let Err(e) = config.validate() {
        error!(error = %e, "Configuration validation failed");
        std::process::exit(1);
    }

    if let Err(e) = run(config).await {
        error!(error = %e, table = e.table().unwrap_or("-"), "Refresh failed");
        std::process::exit(1);
    }

    info!("Done");
    Ok(())
}

async fn run(config: Config) -> trivy_db_sync::Result<()> {
    let tables = config.table_names()?;
    let options = config.refresh_options()?;
    let snapshot_path = config.snapshot_path()?;

    let driver = storage::connect(config.dsn()?, tables).await?;
    info!(backend = %driver.backend(), tables = %driver.tables(), "Destination ready");

    if config.skip_init_db {
        info!("Skipping schema initialization");
    } else {
        driver.migrate().await?;
        info!("Schema initialized");
    }

    let snapshot = BoltSnapshot::open(&snapshot_path).map_err(|e| Error::Connection {
        target: snapshot_path.display().to_string(),
        reason: e.to_string(),
    })?;
    info!(path = %snapshot_path.display(), txid = snapshot.txid(), "Opened Trivy DB");

    // Ctrl-C stops the refresh between batches
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received shutdown signal, stopping after the current batch");
            let _ = shutdown_tx.send(true);
        }
    });

    let summary = Refresher::new(driver.as_ref(), options)
        .with_shutdown(shutdown_rx)
        .run(&snapshot)
        .await?;

    info!(
        vulnerabilities = summary.vulnerabilities.rows,
        advisories = summary.advisories.rows,
        data_sources = summary.data_sources.rows,
        insert_calls = summary.vulnerabilities.batches
            + summary.advisories.batches
            + summary.data_sources.batches,
        "Tables refreshed"
    );
    Ok(())
}
