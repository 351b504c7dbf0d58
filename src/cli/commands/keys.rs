use std::io::{self, BufRead, Write};
use std::path::Path;

use zeroize::Zeroizing;

use crate::cli::KeysAction;
use crate::cli::context::Context;
use crate::cli::output;
use crate::core::errors::{Result, ScopeSealError};
use crate::core::models::key_source::Credential;
use crate::core::services::key_generator;

/// Execute the `scopeseal keys` command.
pub fn execute(ctx: &Context, action: &KeysAction) -> Result<()> {
    match action {
        KeysAction::NewRsa {
            subject,
            bits,
            out_dir,
            name,
        } => execute_new_rsa(subject, *bits, out_dir, name.as_deref()),
        KeysAction::NewAes { path, bits } => execute_new_aes(path, *bits),
        KeysAction::AddUser { username, password } => {
            execute_add_user(ctx, username, password.as_deref())
        }
        KeysAction::RemoveUser { username } => execute_remove_user(ctx, username),
        KeysAction::ListUsers => execute_list_users(ctx),
    }
}

/// Generate an RSA key pair and self-signed certificate.
fn execute_new_rsa(subject: &str, bits: usize, out_dir: &Path, name: Option<&str>) -> Result<()> {
    let name = match name {
        Some(name) => name.to_string(),
        None => file_stem_for(subject),
    };

    output::header(&format!("Generating {bits}-bit RSA key for CN={subject}"));
    let generated = key_generator::generate_rsa_key_pair(subject, bits, out_dir, &name)?;

    output::success(&format!("Certificate: {}", generated.certificate.display()));
    output::success(&format!("Private key: {}", generated.private_key.display()));
    output::success(&format!("Thumbprint:  {}", generated.thumbprint));
    println!("\n  Protect with:   scopeseal protect --cert {} <text>", generated.certificate.display());
    println!("  Or import it:   scopeseal certs import {}", generated.certificate.display());
    Ok(())
}

/// Generate a random AES key file.
fn execute_new_aes(path: &Path, bits: usize) -> Result<()> {
    key_generator::generate_aes_key_file(path, bits)?;
    output::success(&format!("{bits}-bit AES key written to {}", path.display()));
    println!("\n  Protect with: scopeseal protect --key-file {} <text>", path.display());
    Ok(())
}

/// Enroll a user for `--user` protection.
fn execute_add_user(ctx: &Context, username: &str, password: Option<&str>) -> Result<()> {
    let store = ctx.credential_store()?;
    let secret = match password {
        Some(p) => Zeroizing::new(p.to_string()),
        None => prompt_secret(username)?,
    };
    if secret.is_empty() {
        return Err(ScopeSealError::InvalidConfig {
            detail: "the secret must not be empty".into(),
        });
    }

    store.enroll(&Credential::new(username, secret.as_str()))?;
    output::success(&format!("Enrolled user: {username}"));
    Ok(())
}

/// Remove an enrolled user.
fn execute_remove_user(ctx: &Context, username: &str) -> Result<()> {
    ctx.credential_store()?.remove(username)?;
    output::success(&format!("Removed user: {username}"));
    output::warning("Strings protected for this user can no longer be recovered.");
    Ok(())
}

/// List enrolled users.
fn execute_list_users(ctx: &Context) -> Result<()> {
    let users = ctx.credential_store()?.list()?;
    if users.is_empty() {
        output::warning("No users enrolled.");
        println!("  Run 'scopeseal keys add-user <name>' to add one.");
        return Ok(());
    }

    output::header(&format!("Enrolled users ({})", users.len()));
    for user in &users {
        println!(
            "  • {}  (enrolled {})",
            user.username,
            user.enrolled_at.format("%Y-%m-%d %H:%M UTC")
        );
    }
    Ok(())
}

/// Read a secret from one line of stdin.
fn prompt_secret(username: &str) -> Result<Zeroizing<String>> {
    eprint!("  Secret for {username}: ");
    io::stderr().flush()?;

    let mut input = Zeroizing::new(String::new());
    io::stdin().lock().read_line(&mut input)?;
    Ok(Zeroizing::new(input.trim_end_matches(['\r', '\n']).to_string()))
}

/// Default file stem for a subject: lower-case, runs of other
/// characters collapsed to '-'.
fn file_stem_for(subject: &str) -> String {
    let mut stem = String::new();
    for c in subject.chars() {
        if c.is_ascii_alphanumeric() {
            stem.push(c.to_ascii_lowercase());
        } else if !stem.ends_with('-') {
            stem.push('-');
        }
    }
    let stem = stem.trim_matches('-');
    if stem.is_empty() {
        "scopeseal".into()
    } else {
        stem.into()
    }
}
