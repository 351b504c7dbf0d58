pub mod credential_store;
pub mod file_scope_store;

#[cfg(windows)]
pub mod windows_key_store;
