use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::LogConfig;

/// Installs the process-wide subscriber. Only binaries call this; library code just emits events.
pub fn init(cfg: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&cfg.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(path) = cfg.file.as_ref() else {
        return fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init()
            .map_err(|err| anyhow!("install log subscriber: {err}"));
    };

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create log directory {}", dir.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {}", path.display()))?;

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr.and(Mutex::new(file)))
        .with_target(true)
        .with_ansi(false)
        .try_init()
        .map_err(|err| anyhow!("install log subscriber: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unusable_log_directory_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").expect("write");
        let cfg = LogConfig {
            level: "info".to_string(),
            file: Some(blocker.join("logs").join("ingest.log")),
        };
        let err = init(&cfg).expect_err("directory under a file cannot be created");
        assert!(format!("{err:#}").contains("create log directory"));
    }
}
