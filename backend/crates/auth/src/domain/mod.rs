//! Domain Layer
//!
//! Contains entities, value objects, the signature service and repository traits.

pub mod entity;
pub mod repository;
pub mod service;
pub mod value_object;

// Re-exports
pub use entity::identity::{Credentials, Identity};
pub use repository::CredentialStore;
