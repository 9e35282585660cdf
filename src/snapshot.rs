use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use serde_json::Value;
use tracing::{error, info};

const MAX_SUFFIX: u32 = 1_000;

/// Best-effort audit trail of raw provider responses. Never read back by the pipeline.
#[derive(Debug, Clone)]
pub struct SnapshotArchiver {
    dir: PathBuf,
}

impl SnapshotArchiver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `{name}_{YYYYMMDD_HHMMSS}.json`. Failures are logged and swallowed.
    pub fn archive(&self, payload: &Value, name: &str) {
        match self.write_snapshot(payload, name) {
            Ok(path) => info!(path = %path.display(), "snapshot saved"),
            Err(err) => error!(name, dir = %self.dir.display(), "error saving snapshot: {err}"),
        }
    }

    fn write_snapshot(&self, payload: &Value, name: &str) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(payload)?;
        let stem = format!("{}_{}", sanitize(name), Local::now().format("%Y%m%d_%H%M%S"));

        // Same name within the same second gets a numeric suffix instead of overwriting.
        for attempt in 0..MAX_SUFFIX {
            let file_name = if attempt == 0 {
                format!("{stem}.json")
            } else {
                format!("{stem}_{attempt}.json")
            };
            let path = self.dir.join(file_name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(json.as_bytes())?;
                    return Ok(path);
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(err),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free snapshot slot for {stem}"),
        ))
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}
