//! Line-delimited JSON service over stdin/stdout
//!
//! Each input line is one request object tagged by `op`; each output line is
//! the matching response. An optional `id` field is echoed back. Malformed
//! lines produce an error response and the loop keeps going until EOF.

use crate::access_log::AccessRequest;
use crate::engine::ProtectionEngine;
use crate::error::ProtectionError;
use crate::policy::Role;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{stdin, stdout, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ServiceRequest {
    Detect {
        text: String,
        #[serde(default)]
        context: String,
    },
    Mask {
        text: String,
        role: Role,
        #[serde(default)]
        context: String,
        #[serde(default)]
        preserve_context: Option<bool>,
    },
    MaskJson {
        value: Value,
        role: Role,
        #[serde(default)]
        context: String,
        #[serde(default)]
        preserve_context: Option<bool>,
    },
    Anonymize {
        text: String,
        #[serde(default)]
        context: String,
    },
    Export {
        text: String,
        #[serde(default)]
        context: String,
    },
    LogAccess(AccessRequest),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStats {
    pub handled: usize,
    pub failed: usize,
}

pub struct StdioService {
    engine: Arc<ProtectionEngine>,
}

impl StdioService {
    pub fn new(engine: Arc<ProtectionEngine>) -> Self {
        Self { engine }
    }

    pub async fn run(&self) -> Result<ServiceStats> {
        info!("Serving PII protection requests on stdin/stdout");
        let stats = self.run_with(BufReader::new(stdin()), stdout()).await?;
        info!(
            "Service stopped: {} requests handled, {} failed",
            stats.handled, stats.failed
        );
        Ok(stats)
    }

    pub async fn run_with<R, W>(&self, mut reader: R, mut writer: W) -> Result<ServiceStats>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut stats = ServiceStats::default();
        let mut buffer = Vec::new();

        loop {
            if reader.read_until(b'\n', &mut buffer).await? == 0 {
                break;
            }

            let response = match ProtectionError::from_utf8(std::mem::take(&mut buffer)) {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => self.handle_line(&line),
                Err(e) => {
                    warn!("Rejected request line that is not UTF-8");
                    error_response(Value::Null, &e)
                }
            };
            if response["ok"] == json!(true) {
                stats.handled += 1;
            } else {
                stats.failed += 1;
            }

            let mut encoded = serde_json::to_string(&response)?;
            encoded.push('\n');
            writer.write_all(encoded.as_bytes()).await?;
            writer.flush().await?;
        }

        debug!("Input closed");
        Ok(stats)
    }

    /// Handles one request line and builds its response object.
    pub fn handle_line(&self, line: &str) -> Value {
        let raw: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                warn!("Rejected malformed request line: {}", e);
                return error_response(Value::Null, &ProtectionError::Input(format!("malformed JSON: {}", e)));
            }
        };
        let id = raw.get("id").cloned().unwrap_or(Value::Null);

        let request: ServiceRequest = match serde_json::from_value(raw) {
            Ok(request) => request,
            Err(e) => {
                warn!("Rejected invalid request: {}", e);
                return error_response(id, &ProtectionError::Input(e.to_string()));
            }
        };

        match self.dispatch(request) {
            Ok(result) => json!({ "id": id, "ok": true, "result": result }),
            Err(e) => error_response(id, &e),
        }
    }

    fn dispatch(&self, request: ServiceRequest) -> Result<Value, ProtectionError> {
        let engine = &self.engine;
        let result = match request {
            ServiceRequest::Detect { text, context } => {
                let report = engine.detect_pii(&text, &context);
                let summary = report.summary();
                json!({ "report": report, "summary": summary })
            }
            ServiceRequest::Mask {
                text,
                role,
                context,
                preserve_context,
            } => serde_json::to_value(engine.mask_pii(&text, &role, &context, preserve_context))?,
            ServiceRequest::MaskJson {
                value,
                role,
                context,
                preserve_context,
            } => serde_json::to_value(engine.mask_json(&value, &role, &context, preserve_context))?,
            ServiceRequest::Anonymize { text, context } => {
                let (anonymized, record) = engine.anonymize(&text, &context);
                json!({ "text": anonymized, "metadata": record.metadata })
            }
            ServiceRequest::Export { text, context } => {
                serde_json::to_value(engine.mask_for_export(&text, &context))?
            }
            ServiceRequest::LogAccess(access) => serde_json::to_value(engine.log_access(&access))?,
        };
        Ok(result)
    }
}

fn error_kind(error: &ProtectionError) -> &'static str {
    match error {
        ProtectionError::Configuration { .. } => "configuration",
        ProtectionError::Input(_) => "input",
        ProtectionError::Io(_) => "io",
        ProtectionError::Serialization(_) => "serialization",
    }
}

fn error_response(id: Value, error: &ProtectionError) -> Value {
    json!({
        "id": id,
        "ok": false,
        "error": { "kind": error_kind(error), "message": error.to_string() }
    })
}
