// Logging initialization — ambient stack, §10.
//
// Grounded on this crate's prior `observability` module, trimmed to the
// one piece the rest of the crate actually uses: a `tracing-subscriber`
// layered filter set up once at process startup. Structured metrics live
// in [`crate::metrics`] via a real `prometheus` registry rather than the
// ad-hoc atomic counters this module used to carry.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the logging and tracing infrastructure.
/// This should be called once at application startup.
pub fn init_logging() -> Result<()> {
    init_logging_with_level(false, false)
}

/// Initialize logging with configurable verbosity.
pub fn init_logging_with_level(verbose: bool, quiet: bool) -> Result<()> {
    let filter_level = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("searchcore=debug,info")
    } else {
        EnvFilter::new("searchcore=warn,error")
    };

    // Quiet always wins over RUST_LOG, so `--quiet` is a hard guarantee.
    let env_filter = if quiet {
        EnvFilter::new("error")
    } else if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::try_from_default_env().unwrap_or(filter_level)
    } else {
        filter_level
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(!quiet)
        .with_thread_ids(!quiet)
        .with_line_number(!quiet)
        .with_file(!quiet)
        .with_ansi(true);

    match tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
    {
        Ok(()) => {
            if !quiet {
                info!("searchcore observability initialized");
            }
            Ok(())
        }
        Err(_) => {
            // Already initialized — fine in test binaries that share a process.
            Ok(())
        }
    }
}
