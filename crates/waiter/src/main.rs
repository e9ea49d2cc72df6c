//! `wait_for_dbs`: blocks until every configured database accepts connections.

use std::io;

use dbroute_domain::config::WaiterConfig;
use dbroute_domain::services::telemetry::{init_telemetry, TelemetryConfig};
use dbroute_storage::ConnectionRegistry;
use dbroute_waiter::{unwaited_databases, wait_for_databases, TokioPause, WaitError, WaitPlan};
use tracing::warn;

#[tokio::main(flavor = "current_thread")]
async fn main() -> io::Result<()> {
    if let Err(err) = bootstrap().await {
        eprintln!("[wait_for_dbs] bootstrap failed: {err}");
        return Err(io::Error::other(err.to_string()));
    }

    Ok(())
}

async fn bootstrap() -> Result<(), WaitError> {
    let config = WaiterConfig::load_from_env()?;
    let telemetry_config = TelemetryConfig::from_env("WAITER");
    let _telemetry = init_telemetry(&telemetry_config)?;

    let registry = ConnectionRegistry::from_settings(config.databases())?;
    let plan = WaitPlan::from_config(&config);
    for database in unwaited_databases(config.routes(), &plan) {
        warn!(database, "routed database is not in the wait list");
    }

    let mut stdout = io::stdout();
    wait_for_databases(&registry, &plan, &TokioPause, &mut stdout).await?;
    Ok(())
}
