use tracing::{info, instrument};

use dka_storage::{Database, InitReport, StorageError, TableReport};
use dka_util::AppConfig;

/// Opens the configured store and brings the reference tables up to date.
///
/// Any failure is returned as-is; the caller must not continue startup
/// against a store that could not be initialized.
#[instrument(skip_all, fields(path = %config.database_path.display()))]
pub async fn initialize(config: &AppConfig) -> Result<InitReport, StorageError> {
    let database = Database::open(&config.database_path).await?;
    let result = database.initializer().run().await;
    database.close().await;

    let report = result?;
    log_table(&report.treatments);
    log_table(&report.administration_types);
    Ok(report)
}

fn log_table(report: &TableReport) {
    info!(
        stage = "app",
        table = report.table,
        inserted = report.inserted,
        already_present = report.already_present,
        total_rows = report.total_rows,
        "reference table ready"
    );
}
