use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt};

pub fn init(verbose: u8) -> Result<()> {
    // Base filter:
    // - if RUST_LOG is set, use it
    // - else default to "info" (or "debug" with -v)
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // stderr keeps --json output on stdout parseable
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err| anyhow::anyhow!("Failed to initialize logging: {}", err))?;

    Ok(())
}
