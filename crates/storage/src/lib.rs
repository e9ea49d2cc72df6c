//! Concrete connection handles behind the domain probe traits: SeaORM for
//! SQLite and PostgreSQL, and MongoDB behind the `mongodb` feature.

mod errors;
mod handle;
#[cfg(feature = "mongodb")]
mod mongo;
mod registry;

pub use errors::StorageError;
pub use handle::SeaOrmHandle;
#[cfg(feature = "mongodb")]
pub use mongo::MongoHandle;
pub use registry::{ConnectionRegistry, DatabaseHandle};
