//! Configuration management for pii-sentinel

use crate::detection::PiiCategory;
use crate::policy::Role;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectionConfig {
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub pii_protection: PiiProtectionConfig,
    #[serde(default)]
    pub access_log: AccessLogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Master switch; when off every entry point passes text through untouched.
    #[serde(default = "default_true")]
    pub mask_pii: bool,
    #[serde(default = "default_true")]
    pub retain_patient_context: bool,
    #[serde(default = "default_true")]
    pub data_anonymization: bool,
    #[serde(default = "default_true")]
    pub consent_tracking: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PiiProtectionConfig {
    #[serde(default = "default_threshold")]
    pub detection_threshold: f64,
    #[serde(default = "default_true")]
    pub mask_in_logs: bool,
    #[serde(default)]
    pub mask_in_exports: bool,
    #[serde(default)]
    pub custom_patterns: Vec<String>,
    #[serde(default)]
    pub invalid_pattern_policy: InvalidPatternPolicy,
    #[serde(default = "default_role_masking")]
    pub role_based_masking: BTreeMap<Role, BTreeSet<PiiCategory>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidPatternPolicy {
    /// Fail engine construction on the first custom pattern that does not compile.
    #[default]
    Reject,
    /// Drop the offending pattern and keep a warning.
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessLogConfig {
    #[serde(default = "default_log_path")]
    pub path: PathBuf,
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
}

fn default_true() -> bool {
    true
}

fn default_threshold() -> f64 {
    0.7
}

fn default_log_path() -> PathBuf {
    PathBuf::from("pii_access.log")
}

fn default_excerpt_chars() -> usize {
    200
}

fn default_role_masking() -> BTreeMap<Role, BTreeSet<PiiCategory>> {
    use PiiCategory::*;

    let mut roles = BTreeMap::new();
    roles.insert(
        Role::new("auditor"),
        BTreeSet::from([Name, Date, Address, Phone, Email, MedicalRecordNumber, Custom]),
    );
    roles.insert(
        Role::new("readonly"),
        BTreeSet::from([Name, Date, Address, Phone, Email]),
    );
    roles.insert(Role::new("reviewer"), BTreeSet::from([Name, Address, Phone]));
    roles
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            mask_pii: true,
            retain_patient_context: true,
            data_anonymization: true,
            consent_tracking: true,
        }
    }
}

impl Default for PiiProtectionConfig {
    fn default() -> Self {
        Self {
            detection_threshold: default_threshold(),
            mask_in_logs: true,
            mask_in_exports: false,
            custom_patterns: Vec::new(),
            invalid_pattern_policy: InvalidPatternPolicy::Reject,
            role_based_masking: default_role_masking(),
        }
    }
}

impl Default for AccessLogConfig {
    fn default() -> Self {
        Self {
            path: default_log_path(),
            excerpt_chars: default_excerpt_chars(),
        }
    }
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            security: SecurityConfig::default(),
            pii_protection: PiiProtectionConfig::default(),
            access_log: AccessLogConfig::default(),
        }
    }
}

impl ProtectionConfig {
    pub fn get_app_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("com", "pii-sentinel", "pii-sentinel")
            .ok_or_else(|| anyhow::anyhow!("Failed to determine application directories"))
    }

    pub fn resolve_paths(&mut self) -> Result<()> {
        if self.access_log.path.is_relative() {
            let project_dirs = Self::get_app_dirs()?;
            let data_dir = project_dirs.data_dir();
            std::fs::create_dir_all(data_dir)?;
            self.access_log.path = data_dir.join(&self.access_log.path);
        }

        Ok(())
    }

    /// Parses a TOML document without touching the filesystem.
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse protection config TOML")
    }

    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::from_toml(&contents)?;
        config.resolve_paths()?;
        Ok(config)
    }

    pub fn get_default_config_path() -> Result<PathBuf> {
        let project_dirs = Self::get_app_dirs()?;
        let config_dir = project_dirs.config_dir();
        std::fs::create_dir_all(config_dir)?;
        Ok(config_dir.join("pii-sentinel.toml"))
    }

    pub fn to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Checks scalar settings. Custom patterns are compiled, and rejected or
    /// skipped, only when the pattern library is built.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.pii_protection.detection_threshold) {
            return Err(anyhow::anyhow!("Detection threshold must be between 0.0 and 1.0"));
        }

        if self.access_log.excerpt_chars == 0 {
            return Err(anyhow::anyhow!("Access log excerpt length must be greater than zero"));
        }

        Ok(())
    }

    pub fn enabled(&self) -> bool {
        self.security.mask_pii
    }

    pub fn threshold(&self) -> f64 {
        self.pii_protection.detection_threshold
    }
}
