//! Protection engine: the entry points collaborators call
//!
//! An engine is built once from an immutable [`ProtectionConfig`] and then
//! shared freely; every call is a pure function of its arguments apart from
//! the access log append, which the logger serializes internally.

use crate::access_log::{AccessLogOutcome, AccessLogger, AccessRequest};
use crate::anonymize::{self, AnonymizationRecord};
use crate::config::ProtectionConfig;
use crate::detection::{Detection, DetectionSummary, Detector};
use crate::error::{ProtectionError, Result};
use crate::masking::Masker;
use crate::patterns::PatternLibrary;
use crate::policy::{PolicyEngine, Role};
use crate::resolve::resolve;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionStatus {
    Active,
    Disabled,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
    pub status: ProtectionStatus,
    pub detections: Vec<Detection>,
    pub warnings: Vec<String>,
}

impl DetectionReport {
    pub fn summary(&self) -> DetectionSummary {
        DetectionSummary::from_detections(&self.detections)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MaskOutcome {
    pub status: ProtectionStatus,
    pub text: String,
    pub detections: Vec<Detection>,
    pub masked_count: usize,
    pub preserve_context: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonMaskOutcome {
    pub status: ProtectionStatus,
    pub value: Value,
    pub masked_count: usize,
    pub detections: Vec<Detection>,
}

pub struct ProtectionEngine {
    config: ProtectionConfig,
    detector: Detector,
    policy: PolicyEngine,
    masker: Masker,
    access_logger: AccessLogger,
}

impl ProtectionEngine {
    pub fn new(config: ProtectionConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| ProtectionError::configuration(e.to_string()))?;

        let library = PatternLibrary::new(&config.pii_protection)?;
        let pattern_count = library.pattern_count();
        let detector = Detector::new(library);
        let policy = PolicyEngine::new(
            config.security.mask_pii,
            config.security.retain_patient_context,
            config.pii_protection.role_based_masking.clone(),
        );
        let masker = Masker::new(config.threshold());
        let access_logger = AccessLogger::new(&config.access_log);

        info!(
            "PII protection initialized - masking enabled: {}, {} patterns, {} roles",
            config.enabled(),
            pattern_count,
            config.pii_protection.role_based_masking.len()
        );

        Ok(Self {
            config,
            detector,
            policy,
            masker,
            access_logger,
        })
    }

    pub fn config(&self) -> &ProtectionConfig {
        &self.config
    }

    pub fn status(&self) -> ProtectionStatus {
        if self.config.enabled() {
            ProtectionStatus::Active
        } else {
            ProtectionStatus::Disabled
        }
    }

    pub fn warnings(&self) -> &[String] {
        self.detector.library().warnings()
    }

    /// Detects and resolves PII regardless of the enabled flag.
    fn scan(&self, text: &str, context: &str) -> Vec<Detection> {
        resolve(self.detector.detect(text, context))
    }

    pub fn detect_pii(&self, text: &str, context: &str) -> DetectionReport {
        let status = self.status();
        let detections = match status {
            ProtectionStatus::Active => self.scan(text, context),
            ProtectionStatus::Disabled => Vec::new(),
        };

        DetectionReport {
            status,
            detections,
            warnings: self.warnings().to_vec(),
        }
    }

    /// Masks `text` for `role`.
    ///
    /// `preserve_override` replaces the configured preserve-context default
    /// when given. The returned detections are every resolved span, masked or
    /// not, for audit.
    pub fn mask_pii(
        &self,
        text: &str,
        role: &Role,
        context: &str,
        preserve_override: Option<bool>,
    ) -> MaskOutcome {
        let preserve_context = self.policy.effective_preserve(preserve_override);

        if self.status() == ProtectionStatus::Disabled {
            return MaskOutcome {
                status: ProtectionStatus::Disabled,
                text: text.to_string(),
                detections: Vec::new(),
                masked_count: 0,
                preserve_context,
            };
        }

        let detections = self.scan(text, context);
        let mask_types = self.policy.select_mask_types(role, preserve_context);
        let (masked, masked_count) = self
            .masker
            .mask(text, &detections, &mask_types, preserve_context);

        debug!(
            "Role '{}' (known: {}) masked {} of {} spans, preserve_context={}",
            role,
            self.policy.is_known_role(role),
            masked_count,
            detections.len(),
            preserve_context
        );

        MaskOutcome {
            status: ProtectionStatus::Active,
            text: masked,
            detections,
            masked_count,
            preserve_context,
        }
    }

    /// Fully de-identifies `text`, ignoring roles and the detection threshold.
    pub fn anonymize(&self, text: &str, context: &str) -> (String, AnonymizationRecord) {
        if !self.config.enabled() || !self.config.security.data_anonymization {
            return (text.to_string(), AnonymizationRecord::disabled(text));
        }

        let detections = self.scan(text, context);
        anonymize::anonymize(text, &detections)
    }

    /// Applies the strictest profile when exports are configured to be masked.
    pub fn mask_for_export(&self, text: &str, context: &str) -> MaskOutcome {
        if !self.config.enabled() || !self.config.pii_protection.mask_in_exports {
            return MaskOutcome {
                status: ProtectionStatus::Disabled,
                text: text.to_string(),
                detections: Vec::new(),
                masked_count: 0,
                preserve_context: false,
            };
        }

        let detections = self.scan(text, context);
        let (masked, masked_count) = Masker::mask_all(text, &detections);

        MaskOutcome {
            status: ProtectionStatus::Active,
            text: masked,
            detections,
            masked_count,
            preserve_context: false,
        }
    }

    /// Masks every string inside a JSON document with the same policy as [`Self::mask_pii`].
    ///
    /// Each string is scanned with the context label `"{context}@{path}"`.
    pub fn mask_json(
        &self,
        value: &Value,
        role: &Role,
        context: &str,
        preserve_override: Option<bool>,
    ) -> JsonMaskOutcome {
        let mut outcome = JsonMaskOutcome {
            status: self.status(),
            value: value.clone(),
            masked_count: 0,
            detections: Vec::new(),
        };

        if outcome.status == ProtectionStatus::Disabled {
            return outcome;
        }

        // Collect the string leaves first so the value can be rewritten in place.
        let mut leaves = Vec::new();
        collect_string_paths(value, String::new(), &mut Vec::new(), &mut leaves);

        for (path, pointer) in leaves {
            let Some(Value::String(original)) = outcome.value.pointer_mut(&pointer) else {
                continue;
            };
            let label = format!("{}@{}", context, path);
            let masked = self.mask_pii(original, role, &label, preserve_override);
            *original = masked.text;
            outcome.masked_count += masked.masked_count;
            outcome.detections.extend(masked.detections);
        }
        outcome
    }

    /// Records an access with content masked under the strictest profile.
    pub fn log_access(&self, request: &AccessRequest) -> AccessLogOutcome {
        if !self.config.security.consent_tracking {
            return AccessLogOutcome::Skipped;
        }

        let (masked_content, pii_instances) =
            if self.config.pii_protection.mask_in_logs && !request.data_content.is_empty() {
                let detections = self.scan(&request.data_content, &request.context);
                let (masked, _) = Masker::mask_all(&request.data_content, &detections);
                (masked, detections.len())
            } else {
                (String::new(), 0)
            };

        self.access_logger
            .log(request, &masked_content, pii_instances)
    }
}

/// Walks `value` and records `(display path, JSON pointer)` for every string leaf.
fn collect_string_paths(
    value: &Value,
    path: String,
    pointer: &mut Vec<String>,
    leaves: &mut Vec<(String, String)>,
) {
    match value {
        Value::String(_) => {
            let encoded: String = pointer
                .iter()
                .map(|token| format!("/{}", token.replace('~', "~0").replace('/', "~1")))
                .collect();
            leaves.push((path, encoded));
        }
        Value::Object(map) => {
            for (key, val) in map {
                let new_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                pointer.push(key.clone());
                collect_string_paths(val, new_path, pointer, leaves);
                pointer.pop();
            }
        }
        Value::Array(arr) => {
            for (index, val) in arr.iter().enumerate() {
                let new_path = format!("{}[{}]", path, index);
                pointer.push(index.to_string());
                collect_string_paths(val, new_path, pointer, leaves);
                pointer.pop();
            }
        }
        _ => {}
    }
}
