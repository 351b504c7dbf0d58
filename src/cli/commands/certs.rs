use std::path::Path;

use crate::cli::CertsAction;
use crate::cli::context::Context;
use crate::cli::output;
use crate::core::errors::Result;
use crate::core::traits::cert_store::CertificateStore;

/// Execute the `scopeseal certs` command.
pub fn execute(ctx: &Context, action: &CertsAction) -> Result<()> {
    let default_store = ctx.config.certificates.default_store.as_str();
    match action {
        CertsAction::Import { file, store } => {
            execute_import(ctx, file, store.as_deref().unwrap_or(default_store))
        }
        CertsAction::List { store } => {
            execute_list(ctx, store.as_deref().unwrap_or(default_store))
        }
        CertsAction::Remove { thumbprint } => execute_remove(ctx, thumbprint),
    }
}

/// Import a certificate file into a store.
fn execute_import(ctx: &Context, file: &Path, store: &str) -> Result<()> {
    let cert_store = ctx.cert_store();
    let thumbprint = cert_store.import(file, store)?;
    let cert = cert_store.find_by_thumbprint(&thumbprint)?;

    output::success(&format!("Imported {} into {store}", cert.subject()));
    output::success(&format!("Thumbprint: {thumbprint}"));
    if !cert.has_private_key() {
        output::warning("No private key found; this certificate can protect but not unprotect.");
    }
    if !cert.is_rsa() {
        output::warning(&format!(
            "Public key type is {}; only RSA certificates can protect strings.",
            cert.public_key_algorithm()
        ));
    }
    Ok(())
}

/// List the certificates in a store.
fn execute_list(ctx: &Context, store: &str) -> Result<()> {
    let certs = ctx.cert_store().list(store)?;
    if certs.is_empty() {
        output::warning(&format!("No certificates in {store}."));
        println!("  Run 'scopeseal certs import <file>' to add one.");
        return Ok(());
    }

    output::header(&format!("Certificates in {store} ({})", certs.len()));
    for cert in &certs {
        let expires = cert
            .not_after()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "unknown".into());
        let key = if cert.has_private_key() { "private key" } else { "public only" };
        println!("  • {}  {}", cert.thumbprint(), cert.subject());
        output::detail(&format!(
            "{}, {key}, expires {expires}",
            cert.public_key_algorithm()
        ));
    }
    Ok(())
}

/// Remove a certificate from every store.
fn execute_remove(ctx: &Context, thumbprint: &str) -> Result<()> {
    let removed = ctx.cert_store().remove(thumbprint)?;
    let copies = if removed == 1 { "copy" } else { "copies" };
    output::success(&format!("Removed {removed} {copies} of {thumbprint}"));
    Ok(())
}
