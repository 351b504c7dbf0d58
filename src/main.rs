use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use scopeseal::cli::context::Context;
use scopeseal::cli::{self, Cli, Commands};
use scopeseal::config::app_config::AppConfig;

fn main() {
    let args = Cli::parse();

    let result = AppConfig::load(args.config.as_deref(), args.home.as_deref()).and_then(|config| {
        init_tracing(&args, &config.log.level);
        let ctx = Context::new(config);
        match &args.command {
            Commands::Protect(protect) => cli::commands::protect::execute(&ctx, protect),
            Commands::Unprotect(unprotect) => cli::commands::unprotect::execute(&ctx, unprotect),
            Commands::Keys { action } => cli::commands::keys::execute(&ctx, action),
            Commands::Certs { action } => cli::commands::certs::execute(&ctx, action),
        }
    });

    if let Err(e) = result {
        cli::output::error(&format!("Error: {e}"));
        std::process::exit(1);
    }
}

/// Log to stderr. `RUST_LOG` wins, then `-v` / `-q`, then the config level.
fn init_tracing(args: &Cli, config_level: &str) {
    let fallback = if args.verbose {
        "debug"
    } else if args.quiet {
        "error"
    } else {
        config_level
    };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
