pub mod certs;
pub mod key_source;
pub mod keys;
pub mod protect;
pub mod unprotect;
