pub mod access_log;
pub mod anonymize;
pub mod config;
pub mod detection;
pub mod engine;
pub mod error;
pub mod masking;
pub mod patterns;
pub mod policy;
pub mod resolve;
pub mod service;

#[cfg(test)]
pub mod integration_tests;

pub use access_log::{AccessAction, AccessLogOutcome, AccessLogRecord, AccessLogger, AccessRequest};
pub use anonymize::{AnonymizationMetadata, AnonymizationRecord};
pub use config::{AccessLogConfig, InvalidPatternPolicy, PiiProtectionConfig, ProtectionConfig, SecurityConfig};
pub use detection::{Detection, DetectionSummary, Detector, PiiCategory, Sensitivity};
pub use engine::{DetectionReport, JsonMaskOutcome, MaskOutcome, ProtectionEngine, ProtectionStatus};
pub use error::{ProtectionError, Result};
pub use masking::Masker;
pub use patterns::{CompiledPattern, PatternLibrary};
pub use policy::{MaskSet, PolicyEngine, Role};
pub use service::{ServiceRequest, ServiceStats, StdioService};
