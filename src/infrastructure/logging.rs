//! Tracing subscriber setup.

use color_eyre::eyre::{Result, WrapErr};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use super::config::PipelineConfig;

/// Builds the level filter. `RUST_LOG` wins over the configured level.
fn build_filter(config: &PipelineConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()))
}

/// Installs the global subscriber: an append-mode file layer when a log path
/// is configured, stderr otherwise.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened or a global subscriber
/// is already installed.
pub fn init_logging(config: &PipelineConfig) -> Result<()> {
    let filter = build_filter(config);

    if let Some(log_path) = &config.log_path {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent).wrap_err("Failed to create log directory")?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .wrap_err_with(|| format!("Failed to open log file {}", log_path.display()))?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .try_init()
            .wrap_err("Failed to install tracing subscriber")?;

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init()
            .wrap_err("Failed to install tracing subscriber")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::LogLevel;

    #[test]
    fn test_filter_uses_configured_level() {
        let config = PipelineConfig {
            log_level: LogLevel::Warn,
            ..PipelineConfig::default()
        };

        if std::env::var_os("RUST_LOG").is_none() {
            assert_eq!(build_filter(&config).to_string(), "warn");
        }
    }

    #[test]
    fn test_without_log_path_installs_stderr_subscriber() {
        let config = PipelineConfig::default();
        assert!(config.log_path.is_none());

        init_logging(&config).expect("stderr subscriber");

        assert!(tracing::dispatcher::has_been_set());
    }
}
