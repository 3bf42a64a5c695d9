// src/job.rs

//! The job a collector serves: its log directory and unique id.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Directory under the job log dir holding one sub-directory per task.
pub const TEST_RESULTS_DIR: &str = "test-results";

const UNIQUE_ID_LEN: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobContext {
    logdir: PathBuf,
    unique_id: String,
}

impl JobContext {
    /// Create a job context with a freshly derived unique id.
    pub fn new(logdir: impl Into<PathBuf>) -> Self {
        let logdir = logdir.into();
        let unique_id = derive_unique_id(&logdir);
        Self { logdir, unique_id }
    }

    pub fn with_unique_id(logdir: impl Into<PathBuf>, unique_id: impl Into<String>) -> Self {
        Self {
            logdir: logdir.into(),
            unique_id: unique_id.into(),
        }
    }

    pub fn logdir(&self) -> &Path {
        &self.logdir
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    /// `<logdir>/test-results`
    pub fn test_results_dir(&self) -> PathBuf {
        self.logdir.join(TEST_RESULTS_DIR)
    }
}

/// blake3 over the log dir, the wall clock and the pid, as hex.
fn derive_unique_id(logdir: &Path) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();

    let mut hasher = blake3::Hasher::new();
    hasher.update(logdir.to_string_lossy().as_bytes());
    hasher.update(&nanos.to_le_bytes());
    hasher.update(&std::process::id().to_le_bytes());

    let mut id = hasher.finalize().to_hex().to_string();
    id.truncate(UNIQUE_ID_LEN);
    id
}
