use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Log to stderr. `RUST_LOG` wins; otherwise `info`, or `debug` when verbose.
pub fn init(verbose: bool) -> anyhow::Result<()> {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .without_time()
                .with_filter(filter),
        )
        .try_init()?;

    Ok(())
}
