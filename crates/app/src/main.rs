mod bootstrap;
mod telemetry;

use serde::Serialize;
use tracing::{error, info};

use dka_storage::InitReport;
use dka_util::{load_env_file, AppConfig};

/// Printed on stdout once the reference tables are ready.
#[derive(Serialize)]
struct StartupSummary<'a> {
    environment: &'static str,
    database_path: String,
    #[serde(flatten)]
    report: &'a InitReport,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;

    info!(stage = "app", path = %config.database_path.display(), env = %config.environment.as_str(), "initializing reference tables");

    let report = match bootstrap::initialize(&config).await {
        Ok(report) => report,
        Err(err) => {
            error!(stage = "app", error = %err, "reference table initialization failed; aborting startup");
            return Err(err.into());
        }
    };

    let summary = StartupSummary {
        environment: config.environment.as_str(),
        database_path: config.database_path.display().to_string(),
        report: &report,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
