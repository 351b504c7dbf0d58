pub mod aes_key;
pub mod rsa_key;

#[cfg(windows)]
pub mod dpapi_key;
