//! SQLite persistence for Acolyte.
//!
//! Implements the engine's `FlowStorage` and `ActorDirectory` traits on a
//! single SQLite database whose schema is managed by embedded migrations,
//! plus a `NamedLock` shared by every process using that database.

pub mod error;
pub mod lock;
pub mod store;

pub use error::{Result, StoreError};
pub use lock::{DEFAULT_LEASE, SqliteLock};
pub use store::SqliteStore;
