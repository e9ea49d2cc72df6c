use async_trait::async_trait;
use dbroute_domain::config::{DatabaseBackend, DatabaseSettings};
use dbroute_domain::probe::{ConnectionLookup, ConnectionProbe, ProbeResult};
use dbroute_domain::routing::{DatabaseRouter, ModelRef, RouteResolver};
use sea_orm::DatabaseConnection;

use crate::errors::StorageError;
use crate::handle::SeaOrmHandle;
#[cfg(feature = "mongodb")]
use crate::mongo::MongoHandle;

/// One configured logical database.
pub enum DatabaseHandle {
    Sql(SeaOrmHandle),
    #[cfg(feature = "mongodb")]
    Document(MongoHandle),
}

impl DatabaseHandle {
    pub fn from_settings(settings: &DatabaseSettings) -> Result<Self, StorageError> {
        let alias = settings.alias();
        match settings.backend() {
            DatabaseBackend::Sqlite if cfg!(feature = "sqlite") => {
                Ok(Self::Sql(SeaOrmHandle::new(alias, settings.url())))
            }
            DatabaseBackend::Postgres if cfg!(feature = "postgres") => {
                Ok(Self::Sql(SeaOrmHandle::new(alias, settings.url())))
            }
            #[cfg(feature = "mongodb")]
            DatabaseBackend::MongoDb => {
                Ok(Self::Document(MongoHandle::new(alias, settings.url())))
            }
            backend => Err(StorageError::BackendDisabled {
                alias: alias.to_string(),
                backend,
            }),
        }
    }

    pub fn alias(&self) -> &str {
        match self {
            Self::Sql(handle) => handle.alias(),
            #[cfg(feature = "mongodb")]
            Self::Document(handle) => handle.alias(),
        }
    }

    /// SQL connection, once a probe has opened it.
    pub fn sql_connection(&self) -> Option<&DatabaseConnection> {
        match self {
            Self::Sql(handle) => handle.connection(),
            #[cfg(feature = "mongodb")]
            Self::Document(_) => None,
        }
    }
}

#[async_trait]
impl ConnectionProbe for DatabaseHandle {
    async fn ensure_connection(&self) -> ProbeResult<()> {
        match self {
            Self::Sql(handle) => handle.ensure_connection().await,
            #[cfg(feature = "mongodb")]
            Self::Document(handle) => handle.ensure_connection().await,
        }
    }
}

/// Connection handles addressed by alias, kept in configuration order.
#[derive(Default)]
pub struct ConnectionRegistry {
    handles: Vec<DatabaseHandle>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds one handle per alias. An alias repeated with the same URL
    /// shares its handle; the same alias pointing elsewhere is rejected.
    pub fn from_settings<'a, I>(settings: I) -> Result<Self, StorageError>
    where
        I: IntoIterator<Item = &'a DatabaseSettings>,
    {
        let mut seen: Vec<&DatabaseSettings> = Vec::new();
        let mut registry = Self::new();
        for settings in settings {
            match seen.iter().find(|prior| prior.alias() == settings.alias()) {
                Some(prior) if prior.url() == settings.url() => continue,
                Some(_) => {
                    return Err(StorageError::DuplicateAlias(settings.alias().to_string()));
                }
                None => {}
            }
            registry = registry.with_handle(DatabaseHandle::from_settings(settings)?)?;
            seen.push(settings);
        }
        Ok(registry)
    }

    pub fn with_handle(mut self, handle: DatabaseHandle) -> Result<Self, StorageError> {
        if self.get(handle.alias()).is_some() {
            return Err(StorageError::DuplicateAlias(handle.alias().to_string()));
        }
        self.handles.push(handle);
        Ok(self)
    }

    pub fn get(&self, alias: &str) -> Option<&DatabaseHandle> {
        self.handles.iter().find(|handle| handle.alias() == alias)
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.handles.iter().map(DatabaseHandle::alias)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Handle a model is written to, after applying the resolver's defaults.
    pub fn for_model<R>(
        &self,
        resolver: &RouteResolver<R>,
        model: &ModelRef,
    ) -> Option<&DatabaseHandle>
    where
        R: DatabaseRouter,
    {
        self.get(resolver.writer(model))
    }
}

impl ConnectionLookup for ConnectionRegistry {
    fn probe(&self, alias: &str) -> Option<&dyn ConnectionProbe> {
        self.get(alias).map(|handle| handle as &dyn ConnectionProbe)
    }
}
