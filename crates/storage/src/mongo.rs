use std::time::Duration;

use async_trait::async_trait;
use dbroute_domain::probe::{ConnectionProbe, ProbeError, ProbeResult, TransientKind};
use mongodb::bson::doc;
use mongodb::options::ClientOptions;
use mongodb::Client;
use tokio::sync::OnceCell;
use tracing::debug;

const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Document-store handle. Every driver failure counts as "not reachable yet".
pub struct MongoHandle {
    alias: String,
    url: String,
    client: OnceCell<Client>,
}

impl MongoHandle {
    pub fn new(alias: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            url: url.into(),
            client: OnceCell::new(),
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    fn unavailable(&self, err: mongodb::error::Error) -> ProbeError {
        ProbeError::transient(TransientKind::DocumentStore, &self.alias, err)
    }

    async fn build_client(&self) -> ProbeResult<Client> {
        let mut options = ClientOptions::parse(&self.url)
            .await
            .map_err(|err| self.unavailable(err))?;
        options.server_selection_timeout = Some(SERVER_SELECTION_TIMEOUT);
        options.connect_timeout = Some(SERVER_SELECTION_TIMEOUT);
        debug!(alias = %self.alias, "building document store client");
        Client::with_options(options).map_err(|err| self.unavailable(err))
    }
}

#[async_trait]
impl ConnectionProbe for MongoHandle {
    async fn ensure_connection(&self) -> ProbeResult<()> {
        let client = self
            .client
            .get_or_try_init(|| self.build_client())
            .await?;
        client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|err| self.unavailable(err))?;
        Ok(())
    }
}
