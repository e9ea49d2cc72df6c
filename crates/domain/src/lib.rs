//! Domain-level building blocks shared by the storage and waiter crates:
//! the namespace routing table, the connectivity probe contract and the
//! environment configuration every binary loads.

pub mod config;
pub mod probe;
pub mod routing;
pub mod services;

pub use config::{ConfigError, DatabaseBackend, DatabaseSettings, WaiterConfig};
pub use probe::{
    ConnectionLookup, ConnectionProbe, ProbeError, ProbeResult, TransientKind,
};
pub use routing::{
    DatabaseRouter, ModelRef, RouteResolver, RoutingError, RoutingTable, Verdict,
};
