use std::fs::{self, OpenOptions};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

pub const LOG_ENV: &str = "COMPLEXAPP_LOG";

pub fn filter(cfg: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(&cfg.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn init(cfg: &LoggingConfig) -> Result<()> {
    let Some(path) = cfg.file.as_ref() else {
        return Ok(());
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("logging: create directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("logging: open {}", path.display()))?;

    tracing_subscriber::registry()
        .with(filter(cfg))
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_ansi(false)
                .with_writer(Arc::new(file)),
        )
        .try_init()
        .context("logging: install subscriber")?;

    tracing::info!(version = crate::VERSION, log = %path.display(), "logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn init_creates_the_log_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("app.log");
        let cfg = LoggingConfig {
            level: "debug".into(),
            file: Some(path.clone()),
        };
        // Another test may have installed a subscriber already.
        let _ = init(&cfg);
        assert!(path.exists());
    }

    #[test]
    fn no_file_means_no_subscriber() {
        let cfg = LoggingConfig {
            level: "info".into(),
            file: None,
        };
        assert!(init(&cfg).is_ok());
    }
}
