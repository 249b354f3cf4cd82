//! Domain Services

pub mod signature;
