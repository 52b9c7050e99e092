//! Dev-mode subscriber: JSONL to a shared file, optionally mirrored to stderr.
//!
//! Several `fanos` processes may append to the same file; every write is
//! flushed immediately so lines never interleave mid-way.

use crate::json_layer::JsonLayer;
use crate::LogConfig;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const LOG_BUFFER_BYTES: usize = 8 * 1024;

/// `~/.fanos/logs/dev.jsonl`, or under the temp dir when there is no home.
pub fn default_log_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".fanos")
        .join("logs")
        .join("dev.jsonl")
}

/// Shared append-only handle on the log file.
#[derive(Clone)]
pub struct AppendLog {
    file: Arc<Mutex<BufWriter<File>>>,
}

impl AppendLog {
    /// Open `path` for appending, creating it and its parent directories.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Arc::new(Mutex::new(BufWriter::with_capacity(LOG_BUFFER_BYTES, file))),
        })
    }
}

impl Write for AppendLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = self.file.lock();
        let written = file.write(buf)?;
        file.flush()?;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.lock().flush()
    }
}

impl<'a> MakeWriter<'a> for AppendLog {
    type Writer = AppendLog;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn env_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_level))
}

/// Install the dev subscriber.
///
/// Returns `false` only when the log file cannot be opened, so the caller can
/// fall back to the compact subscriber. A subscriber that is already
/// installed counts as success.
pub fn init_dev_subscriber(config: &LogConfig) -> bool {
    let path = config.log_path.clone().unwrap_or_else(default_log_path);
    let log = match AppendLog::open(&path) {
        Ok(log) => log,
        Err(e) => {
            eprintln!("fanos: cannot open log file {}: {e}", path.display());
            return false;
        }
    };

    let stderr = config.also_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(io::stderr)
            .with_filter(env_filter(config))
    });

    let installed = tracing_subscriber::registry()
        .with(JsonLayer::new(config.service_name.clone(), log).with_filter(env_filter(config)))
        .with(stderr)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(log_path = %path.display(), service = %config.service_name, "Logging initialized");
    }
    true
}
