//! Utilities: logging setup (level from -v/-q, RUST_LOG override).
//!
//! Key items:
//!   derive_level / init_logging
//!   default_filter

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Map CLI verbosity to a level. `-q` wins over any `-v`.
pub fn derive_level(verbose: u8, quiet: bool) -> Level {
    if quiet {
        return Level::ERROR;
    }
    match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Filter directive for `level`. Only this crate is raised past info so
/// `-vv` does not flood stderr with tokio internals.
pub fn default_filter(level: Level) -> String {
    let crate_target = env!("CARGO_PKG_NAME").replace('-', "_");
    if level > Level::INFO {
        format!("info,{crate_target}={}", level.as_str().to_ascii_lowercase())
    } else {
        level.as_str().to_ascii_lowercase()
    }
}

/// Install the global subscriber. Logs go to stderr; stdout stays for results.
/// RUST_LOG, when set, replaces the derived filter.
pub fn init_logging(level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(level)));
    // A second init (tests) is harmless; keep the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
