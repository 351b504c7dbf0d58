pub mod cert_store;
pub mod cipher;
pub mod key_store;
