//! Append-only access log for PII-bearing content
//!
//! One JSON object per line. Content is masked before it reaches this
//! module and only a hash of the unmasked text is kept, so records can be
//! correlated without storing what was read.

use crate::config::AccessLogConfig;
use crate::error::{ProtectionError, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, error};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessAction {
    Read,
    Write,
    Export,
    Delete,
    Anonymize,
}

impl AccessAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Export => "export",
            Self::Delete => "delete",
            Self::Anonymize => "anonymize",
        }
    }
}

impl fmt::Display for AccessAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessAction {
    type Err = ProtectionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "export" => Ok(Self::Export),
            "delete" => Ok(Self::Delete),
            "anonymize" => Ok(Self::Anonymize),
            other => Err(ProtectionError::Input(format!("unknown access action '{}'", other))),
        }
    }
}

fn default_success() -> bool {
    true
}

fn default_action() -> AccessAction {
    AccessAction::Read
}

/// A single access to be recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRequest {
    pub user_id: String,
    pub session_id: String,
    pub data_type: String,
    #[serde(default)]
    pub data_content: String,
    #[serde(default = "default_action")]
    pub action: AccessAction,
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub context: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessLogRecord {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub session_id: String,
    pub data_type: String,
    pub action: AccessAction,
    pub success: bool,
    pub context: String,
    pub masked_content: String,
    pub content_hash: String,
    pub pii_instances: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AccessLogOutcome {
    /// Consent tracking is off; nothing was written.
    Skipped,
    Written { event_id: Uuid },
    Failed { error: String },
}

pub struct AccessLogger {
    path: PathBuf,
    excerpt_chars: usize,
    write_lock: Mutex<()>,
}

impl AccessLogger {
    pub fn new(config: &AccessLogConfig) -> Self {
        Self {
            path: config.path.clone(),
            excerpt_chars: config.excerpt_chars,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Builds and appends a record. `masked_content` must already be masked.
    ///
    /// Write failures are reported through `tracing` and the returned
    /// outcome; they never propagate to the caller.
    pub fn log(&self, request: &AccessRequest, masked_content: &str, pii_instances: usize) -> AccessLogOutcome {
        let record = AccessLogRecord {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            user_id: request.user_id.clone(),
            session_id: request.session_id.clone(),
            data_type: request.data_type.clone(),
            action: request.action,
            success: request.success,
            context: request.context.clone(),
            masked_content: truncate_chars(masked_content, self.excerpt_chars),
            content_hash: content_hash(&request.data_content),
            pii_instances,
        };

        match self.append(&record) {
            Ok(()) => {
                debug!(
                    "Logged {} access to '{}' as event {}",
                    record.action, record.data_type, record.event_id
                );
                AccessLogOutcome::Written {
                    event_id: record.event_id,
                }
            }
            Err(e) => {
                error!("Failed to write PII access log {}: {}", self.path.display(), e);
                AccessLogOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    fn append(&self, record: &AccessLogRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;

        let _guard = self.write_lock.lock();
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

/// SHA-256 of the unmasked content, hex encoded; empty content hashes to "".
pub fn content_hash(content: &str) -> String {
    if content.is_empty() {
        return String::new();
    }
    hex::encode(Sha256::digest(content.as_bytes()))
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
