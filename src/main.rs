use std::fs;
use std::path::Path;
use std::process::ExitCode;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dwload::config::Config;
use dwload::pipeline;
use dwload::postgres_storage::PostgresStorage;
use dwload::storage::Storage;

fn main() -> ExitCode {
    let config = Config::from_env();

    if let Err(e) = init_logging(&config.logs_dir) {
        eprintln!("Failed to set up logging: {e}");
        return ExitCode::FAILURE;
    }

    tracing::info!(data_dir = %config.data_dir.display(), "starting load run");

    let mut storage = match PostgresStorage::connect(&config.db.connection_string()) {
        Ok(storage) => storage,
        Err(e) => {
            tracing::error!(
                error = %e,
                host = %config.db.host,
                dbname = %config.db.dbname,
                "could not open database connection"
            );
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(host = %config.db.host, dbname = %config.db.dbname, "database connection established");

    if let Err(e) = storage.init_schema() {
        tracing::error!(error = %e, "schema initialization failed");
        return ExitCode::FAILURE;
    }

    let summary = pipeline::run(&mut storage, &config.data_dir);
    tracing::info!(
        tables_loaded = summary.tables_loaded,
        tables_failed = summary.tables_failed,
        rows_loaded = summary.rows_loaded,
        "run finished"
    );

    ExitCode::SUCCESS
}

// Mirrors every line to the console and to etl.log under the logs directory.
fn init_logging(logs_dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(logs_dir)?;
    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(logs_dir.join("etl.log"))?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .with(fmt::layer().with_writer(log_file).with_ansi(false))
        .init();
    Ok(())
}
