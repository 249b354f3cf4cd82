//! Platform Crate - Technical Infrastructure
//!
//! This crate provides shared technical foundations:
//! - Cryptographic utilities (SHA-256, HMAC, Base64)
//! - Password hashing (PBKDF2-HMAC-SHA256 with per-identity salt and cost)
//! - Client IP extraction
//! - Fixed-window rate limit arithmetic
//! - Key-value store abstraction for replay and throttle state

pub mod client;
pub mod crypto;
pub mod kv;
pub mod password;
pub mod rate_limit;
