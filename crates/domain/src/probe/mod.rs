//! Connectivity probes the availability waiter drives, and the error taxonomy
//! that decides whether a failed probe is retried.

mod traits;

use strum_macros::{AsRefStr, Display};
use thiserror::Error;

pub use traits::{ConnectionLookup, ConnectionProbe};

/// Common result alias for probe operations.
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Recognized families of "not reachable yet" failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum TransientKind {
    /// Driver could not open or acquire a connection.
    DriverOperational,
    /// Connection opened but the ORM layer failed a round trip.
    OrmOperational,
    /// Document-store client error.
    DocumentStore,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("database `{alias}` unreachable ({kind}): {message}")]
    Transient {
        kind: TransientKind,
        alias: String,
        message: String,
    },
    #[error("database `{alias}` probe failed: {message}")]
    Fatal { alias: String, message: String },
}

impl ProbeError {
    pub fn transient(
        kind: TransientKind,
        alias: impl Into<String>,
        err: impl std::fmt::Display,
    ) -> Self {
        Self::Transient {
            kind,
            alias: alias.into(),
            message: err.to_string(),
        }
    }

    pub fn fatal(alias: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Fatal {
            alias: alias.into(),
            message: err.to_string(),
        }
    }

    /// Only transient failures are worth waiting out.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn alias(&self) -> &str {
        match self {
            Self::Transient { alias, .. } | Self::Fatal { alias, .. } => alias,
        }
    }

    pub fn transient_kind(&self) -> Option<TransientKind> {
        match self {
            Self::Transient { kind, .. } => Some(*kind),
            Self::Fatal { .. } => None,
        }
    }
}
