use std::io::{self, BufRead};

use tracing::warn;

use crate::cli::commands::key_source;
use crate::cli::context::Context;
use crate::cli::{ProtectArgs, output};
use crate::core::errors::{Result, ScopeSealError};
use crate::core::models::key_source::PaddingMode;
use crate::core::models::protection_request::Mode;

/// Execute the `scopeseal protect` command.
pub fn execute(ctx: &Context, args: &ProtectArgs) -> Result<()> {
    run(ctx, args, Mode::Encrypt)
}

/// Shared driver for `protect` and `unprotect`.
///
/// Results go to stdout one per line in input order. A failed item is
/// reported on stderr and the rest still run; any failure makes the
/// command fail with a summary.
pub fn run(ctx: &Context, args: &ProtectArgs, mode: Mode) -> Result<()> {
    let source = key_source::from_args(&args.source, args.password.as_deref())?;
    let padding: PaddingMode = args
        .padding
        .map(Into::into)
        .unwrap_or(ctx.config.protect.padding);

    let inputs = if args.inputs.is_empty() {
        read_stdin_lines()?
    } else {
        args.inputs.clone()
    };
    let total = inputs.len();

    let service = ctx.protection_service();
    let results = match mode {
        Mode::Encrypt => service.protect_all(inputs, &source, padding)?,
        Mode::Decrypt => service.unprotect_all(inputs, &source, padding)?,
    };

    let mut failed = 0;
    for (index, result) in results.enumerate() {
        match result {
            Ok(text) => println!("{text}"),
            Err(e) => {
                failed += 1;
                output::error(&format!("item {}: {e}", index + 1));
            }
        }
    }

    if failed > 0 {
        warn!(failed, total, "batch finished with failures");
        return Err(ScopeSealError::BatchFailed { failed, total });
    }
    Ok(())
}

/// One input per non-empty stdin line.
fn read_stdin_lines() -> Result<Vec<String>> {
    let mut lines = Vec::new();
    for line in io::stdin().lock().lines() {
        let line = line?;
        let line = line.trim_end_matches('\r');
        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }
    Ok(lines)
}
