use crate::cli::ProtectArgs;
use crate::cli::commands::protect;
use crate::cli::context::Context;
use crate::core::errors::Result;
use crate::core::models::protection_request::Mode;

/// Execute the `scopeseal unprotect` command.
///
/// Same input and output rules as `protect`; inputs are Base64 ciphertext.
pub fn execute(ctx: &Context, args: &ProtectArgs) -> Result<()> {
    protect::run(ctx, args, Mode::Decrypt)
}
