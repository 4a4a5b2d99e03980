//! Full de-identification for export and training data
//!
//! Unlike masking, anonymization ignores roles and thresholds: every span
//! the detector finds is replaced. The original-to-replacement mapping is
//! hashed over a key-sorted serialization so the same mapping always yields
//! the same digest.

use crate::detection::{Detection, PiiCategory};
use crate::engine::ProtectionStatus;
use crate::masking::rewrite_spans;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnonymizationMetadata {
    pub status: ProtectionStatus,
    pub original_length: usize,
    pub anonymized_length: usize,
    pub pii_instances_found: usize,
    pub anonymization_timestamp: DateTime<Utc>,
    pub anonymization_map_hash: Option<String>,
    pub hash_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnonymizationRecord {
    /// Original substring to replacement token. Holds raw PII, so it is never serialized.
    #[serde(skip_serializing)]
    pub mapping: BTreeMap<String, String>,
    pub metadata: AnonymizationMetadata,
}

impl AnonymizationRecord {
    /// Record for a call where anonymization is switched off.
    pub fn disabled(text: &str) -> Self {
        let length = text.chars().count();
        Self {
            mapping: BTreeMap::new(),
            metadata: AnonymizationMetadata {
                status: ProtectionStatus::Disabled,
                original_length: length,
                anonymized_length: length,
                pii_instances_found: 0,
                anonymization_timestamp: Utc::now(),
                anonymization_map_hash: None,
                hash_error: None,
            },
        }
    }
}

pub fn anonymized_replacement(detection: &Detection) -> &str {
    match detection.category {
        PiiCategory::Name => "[PATIENT_NAME]",
        PiiCategory::Custom => "[REDACTED]",
        _ => detection.replacement.as_str(),
    }
}

/// Rewrites every resolved detection and builds the audit record.
pub fn anonymize(text: &str, detections: &[Detection]) -> (String, AnonymizationRecord) {
    let mut mapping = BTreeMap::new();
    for detection in detections {
        mapping
            .entry(detection.original_text.clone())
            .or_insert_with(|| anonymized_replacement(detection).to_string());
    }

    let (anonymized, _) = rewrite_spans(text, detections.iter(), anonymized_replacement);

    let (map_hash, hash_error) = match canonical_map_hash(&mapping) {
        Ok(hash) => (Some(hash), None),
        Err(e) => {
            warn!("Failed to hash anonymization map: {}", e);
            (None, Some(e.to_string()))
        }
    };

    debug!(
        "Anonymized {} PII instances ({} distinct values)",
        detections.len(),
        mapping.len()
    );

    let metadata = AnonymizationMetadata {
        status: ProtectionStatus::Active,
        original_length: text.chars().count(),
        anonymized_length: anonymized.chars().count(),
        pii_instances_found: detections.len(),
        anonymization_timestamp: Utc::now(),
        anonymization_map_hash: map_hash,
        hash_error,
    };

    (anonymized, AnonymizationRecord { mapping, metadata })
}

/// SHA-256 over the JSON form of the key-sorted mapping, hex encoded.
pub fn canonical_map_hash(mapping: &BTreeMap<String, String>) -> Result<String, serde_json::Error> {
    let canonical = serde_json::to_vec(mapping)?;
    Ok(hex::encode(Sha256::digest(&canonical)))
}
