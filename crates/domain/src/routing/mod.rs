//! Namespace-to-database routing decisions consulted by the ORM layer on
//! every read, write, relation and migration.

mod resolver;
mod table;

use strum_macros::AsRefStr;
use thiserror::Error;

pub use resolver::RouteResolver;
pub use table::{RoutingTable, RoutingTableBuilder, DEFAULT_ROUTES};

/// Outcome of a routing hook. `NoOpinion` leaves the decision to the caller's
/// default policy and is distinct from an explicit `Deny`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Verdict {
    Allow,
    Deny,
    NoOpinion,
}

impl Verdict {
    /// Collapses the verdict into a boolean, using `default` when the router
    /// abstained.
    pub fn resolve(self, default: bool) -> bool {
        match self {
            Verdict::Allow => true,
            Verdict::Deny => false,
            Verdict::NoOpinion => default,
        }
    }

    pub fn is_opinion(self) -> bool {
        !matches!(self, Verdict::NoOpinion)
    }
}

impl From<Option<bool>> for Verdict {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => Verdict::Allow,
            Some(false) => Verdict::Deny,
            None => Verdict::NoOpinion,
        }
    }
}

impl From<bool> for Verdict {
    fn from(value: bool) -> Self {
        if value {
            Verdict::Allow
        } else {
            Verdict::Deny
        }
    }
}

/// Minimal description of a model handed to the router hooks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelRef {
    namespace: String,
    name: String,
}

impl ModelRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Hook surface of a database router. Every hook abstains by default so a
/// router only has to implement the decisions it cares about.
pub trait DatabaseRouter: Send + Sync {
    fn db_for_read(&self, _model: &ModelRef) -> Option<&str> {
        None
    }

    fn db_for_write(&self, _model: &ModelRef) -> Option<&str> {
        None
    }

    fn allow_relation(&self, _left: &ModelRef, _right: &ModelRef) -> Verdict {
        Verdict::NoOpinion
    }

    fn allow_migrate(&self, _db: &str, _namespace: &str, _model_name: Option<&str>) -> Verdict {
        Verdict::NoOpinion
    }
}

/// Errors raised while building a routing table. Lookups themselves never
/// fail.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("namespace `{0}` is routed more than once")]
    DuplicateNamespace(String),
    #[error("routing entry has an empty namespace or database")]
    EmptySegment,
    #[error("malformed routing entry `{0}`, expected `namespace=database`")]
    MalformedEntry(String),
}
