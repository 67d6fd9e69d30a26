use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod settings;

pub use settings::{AuthMode, Settings};

/// Initialize logging with structured output and environment-based level filtering.
///
/// Logs go to stderr: stdout carries the stdio JSON-RPC transport.
pub fn init_logging(default_level: Option<&str>) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = default_level.unwrap_or("info");
        EnvFilter::new(format!("incidentd={},tokio=warn", level))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_names(false)
                .with_file(true)
                .with_line_number(true)
                .with_level(true)
                .compact(),
        )
        .try_init()?;

    tracing::debug!("Structured logging initialized");
    Ok(())
}

/// Initialize logging for testing with reduced verbosity
pub fn init_test_logging() -> anyhow::Result<()> {
    let env_filter = EnvFilter::new("incidentd=debug");

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_test_writer().compact())
        .try_init()
        .or_else(|_| Ok(())) // Ignore if already initialized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_test_logging_is_idempotent() {
        assert!(init_test_logging().is_ok());
        assert!(init_test_logging().is_ok());
    }
}
