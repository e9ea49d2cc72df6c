use dbroute_domain::config::DatabaseBackend;
use dbroute_domain::probe::{ProbeError, TransientKind};
#[cfg(any(feature = "sqlite", feature = "postgres"))]
use sea_orm::RuntimeErr;
use sea_orm::DbErr;
use thiserror::Error;

/// Errors raised while assembling the connection registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("conflicting registrations for database alias `{0}`")]
    DuplicateAlias(String),
    #[error("database `{alias}` uses the {backend} backend, which this build does not include")]
    BackendDisabled {
        alias: String,
        backend: DatabaseBackend,
    },
}

/// Maps a SeaORM error onto the probe taxonomy. Connection-level failures and
/// failed round trips are worth waiting out; everything else is a
/// configuration or programming error.
pub(crate) fn classify_db_err(alias: &str, err: DbErr) -> ProbeError {
    match err {
        // Bad connect options surface as connection errors too.
        #[cfg(any(feature = "sqlite", feature = "postgres"))]
        DbErr::Conn(RuntimeErr::SqlxError(sea_orm::SqlxError::Configuration(_))) => {
            ProbeError::fatal(alias, err)
        }
        DbErr::Conn { .. } | DbErr::ConnectionAcquire { .. } => {
            ProbeError::transient(TransientKind::DriverOperational, alias, err)
        }
        DbErr::Exec { .. } | DbErr::Query { .. } => {
            ProbeError::transient(TransientKind::OrmOperational, alias, err)
        }
        other => ProbeError::fatal(alias, other),
    }
}
