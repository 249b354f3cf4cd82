//! Value Object Module

pub mod email;
pub mod identity_ref;
pub mod who_token;
