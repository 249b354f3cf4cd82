//! Shared Kernel - Domain-crossing minimal core
//!
//! This crate contains the "smallest core" of domain vocabulary:
//! - The unified error type rendered to API clients (`errorCode` + status)
//! - Typed ID wrappers
//!
//! **Design Principle**: Only include things that are "hard to change"
//! and have consistent meaning across all domains.

pub mod error {
    pub mod app_error;
    pub mod conversions;
    pub mod kind;
}
pub mod id;
