use std::time::Duration;

use async_trait::async_trait;
use dbroute_domain::probe::{ConnectionProbe, ProbeError, ProbeResult};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use tokio::sync::OnceCell;
use tracing::debug;
use url::Url;

use crate::errors::classify_db_err;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Lazily connected SeaORM handle for one SQL alias. The connection is only
/// kept once it has been opened successfully, so every failed probe retries
/// the full connect.
pub struct SeaOrmHandle {
    alias: String,
    url: String,
    connection: OnceCell<DatabaseConnection>,
}

impl SeaOrmHandle {
    pub fn new(alias: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            url: url.into(),
            connection: OnceCell::new(),
        }
    }

    /// Wraps an already open connection.
    pub fn from_connection(alias: impl Into<String>, db: DatabaseConnection) -> Self {
        Self {
            alias: alias.into(),
            url: String::new(),
            connection: OnceCell::new_with(Some(db)),
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Connection established by an earlier successful probe.
    pub fn connection(&self) -> Option<&DatabaseConnection> {
        self.connection.get()
    }

    async fn connect(&self) -> ProbeResult<DatabaseConnection> {
        // SeaORM panics on URLs it cannot parse.
        Url::parse(&self.url).map_err(|err| ProbeError::fatal(&self.alias, err))?;
        let mut options = ConnectOptions::new(self.url.clone());
        options
            .connect_timeout(CONNECT_TIMEOUT)
            .acquire_timeout(CONNECT_TIMEOUT)
            .sqlx_logging(false);
        debug!(alias = %self.alias, "opening database connection");
        Database::connect(options)
            .await
            .map_err(|err| classify_db_err(&self.alias, err))
    }
}

#[async_trait]
impl ConnectionProbe for SeaOrmHandle {
    async fn ensure_connection(&self) -> ProbeResult<()> {
        let db = self
            .connection
            .get_or_try_init(|| self.connect())
            .await?;
        let backend = db.get_database_backend();
        db.execute(Statement::from_string(backend, "SELECT 1".to_owned()))
            .await
            .map_err(|err| classify_db_err(&self.alias, err))?;
        Ok(())
    }
}
