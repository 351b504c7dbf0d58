pub mod commands;
pub mod context;
pub mod output;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::core::models::key_source::PaddingMode;

/// Protect strings with scope keys, user credentials, certificates or key files.
#[derive(Parser, Debug)]
#[command(name = "scopeseal", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to alternative config file
    #[arg(long, global = true, env = "SCOPESEAL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Base directory for keys, users, certificates and config.toml
    #[arg(long, global = true, env = "SCOPESEAL_HOME")]
    pub home: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode: only show errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Encrypt strings into Base64 ciphertext
    Protect(ProtectArgs),

    /// Decrypt Base64 ciphertext back into strings
    Unprotect(ProtectArgs),

    /// Generate keys and manage enrolled users
    Keys {
        #[command(subcommand)]
        action: KeysAction,
    },

    /// Manage the certificate store
    Certs {
        #[command(subcommand)]
        action: CertsAction,
    },
}

/// Inputs and key selection shared by `protect` and `unprotect`.
#[derive(Args, Debug)]
pub struct ProtectArgs {
    /// Strings to process. Reads one per line from stdin when omitted.
    pub inputs: Vec<String>,

    #[command(flatten)]
    pub source: KeySourceArgs,

    /// Secret for --user
    #[arg(long, env = "SCOPESEAL_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// RSA padding (default from config, else oaep)
    #[arg(long, value_enum)]
    pub padding: Option<PaddingArg>,
}

/// Exactly one key source per call.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct KeySourceArgs {
    /// Per-user or per-machine protection key
    #[arg(long, value_enum)]
    pub scope: Option<ScopeArg>,

    /// Protection key of another user (needs --password)
    #[arg(long)]
    pub user: Option<String>,

    /// Certificate file or cert:\Location\Store\Thumbprint path
    #[arg(long)]
    pub cert: Option<String>,

    /// Certificate thumbprint, searched in every store
    #[arg(long)]
    pub thumbprint: Option<String>,

    /// PEM RSA key or raw/Base64 AES key file
    #[arg(long)]
    pub key_file: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeArg {
    CurrentUser,
    LocalMachine,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaddingArg {
    Oaep,
    Pkcs1,
}

impl From<PaddingArg> for PaddingMode {
    fn from(arg: PaddingArg) -> Self {
        match arg {
            PaddingArg::Oaep => PaddingMode::Oaep,
            PaddingArg::Pkcs1 => PaddingMode::Pkcs1,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum KeysAction {
    /// Generate an RSA key pair with a self-signed certificate
    NewRsa {
        /// Certificate subject common name
        #[arg(long)]
        subject: String,
        /// Key size: 2048, 3072 or 4096
        #[arg(long, default_value_t = 4096)]
        bits: usize,
        /// Directory for the generated files
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        /// File name stem (default: derived from the subject)
        #[arg(long)]
        name: Option<String>,
    },
    /// Generate a random AES key file
    NewAes {
        /// Key file to create
        path: PathBuf,
        /// Key size: 128, 192 or 256
        #[arg(long, default_value_t = 256)]
        bits: usize,
    },
    /// Enroll a user for --user protection
    AddUser {
        username: String,
        /// The user's secret
        #[arg(long, env = "SCOPESEAL_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Remove an enrolled user
    RemoveUser { username: String },
    /// List enrolled users
    ListUsers,
}

#[derive(Subcommand, Debug)]
pub enum CertsAction {
    /// Import a certificate (and any private key found with it)
    Import {
        /// PEM or DER certificate file
        file: PathBuf,
        /// Target store, e.g. CurrentUser\My
        #[arg(long)]
        store: Option<String>,
    },
    /// List certificates in a store
    List {
        #[arg(long)]
        store: Option<String>,
    },
    /// Remove a certificate from every store
    Remove { thumbprint: String },
}
