//! String protection with scope keys, user credentials, X.509
//! certificates and key files.
//!
//! [`core::services::protection_service::ProtectionService`] is the entry
//! point; it resolves a [`core::models::key_source::KeySourceRef`] through
//! [`core::services::key_resolver::KeyResolver`] and returns Base64
//! ciphertext.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
