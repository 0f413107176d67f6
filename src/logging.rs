//! Log output for the `vpump` binary.

use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber writing to stderr.
///
/// `level` is a filter such as `info` or `turboctl=debug`; `RUST_LOG`
/// takes precedence when it is set. Fails if a subscriber is already
/// installed.
pub fn init(level: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_one_subscriber() {
        assert!(init("debug").is_ok());
        assert!(init("debug").is_err());
    }
}
