//! Infrastructure Layer
//!
//! Database implementations and in-memory stand-ins.

pub mod memory;
pub mod postgres;

pub use memory::MemoryCredentialStore;
pub use postgres::{PgCredentialStore, PgKvStore};
