use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize structured logging on stderr.
///
/// `RUST_LOG` overrides the level chosen from the CLI flags.
pub fn init_tracing(verbose: bool, log_json: bool) -> Result<()> {
    let level = if verbose {
        "arena_judge=debug"
    } else {
        "arena_judge=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);

    if log_json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()
            .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;
    } else {
        registry
            .with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;
    }

    Ok(())
}
