//! Role and context-preservation policy
//!
//! Maps a caller's role and the preserve-context flag to the set of
//! categories the masker is allowed to rewrite. Roles absent from the
//! configured map mask nothing; this is the documented fallback for callers
//! without a masking profile, not an error.

use crate::detection::PiiCategory;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

/// Categories a role may still mask when patient context is preserved.
pub const CONTEXT_PRESERVING_CATEGORIES: [PiiCategory; 4] = [
    PiiCategory::MedicalRecordNumber,
    PiiCategory::Phone,
    PiiCategory::Email,
    PiiCategory::Address,
];

pub type MaskSet = BTreeSet<PiiCategory>;

/// Name of a permission profile in the role masking map.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(String);

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Role {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[derive(Debug, Clone)]
pub struct PolicyEngine {
    enabled: bool,
    default_preserve_context: bool,
    roles: BTreeMap<Role, MaskSet>,
}

impl PolicyEngine {
    pub fn new(enabled: bool, default_preserve_context: bool, roles: BTreeMap<Role, MaskSet>) -> Self {
        Self {
            enabled,
            default_preserve_context,
            roles,
        }
    }

    /// The preserve flag in effect once the caller's override, if any, is applied.
    pub fn effective_preserve(&self, preserve_override: Option<bool>) -> bool {
        preserve_override.unwrap_or(self.default_preserve_context)
    }

    pub fn is_known_role(&self, role: &Role) -> bool {
        self.roles.contains_key(role)
    }

    pub fn select_mask_types(&self, role: &Role, preserve_context: bool) -> MaskSet {
        if !self.enabled {
            return MaskSet::new();
        }

        let Some(configured) = self.roles.get(role) else {
            debug!("Role '{}' has no masking profile, masking nothing", role);
            return MaskSet::new();
        };

        if !preserve_context {
            return configured.clone();
        }

        // Dates stay in the set; the masker only rewrites birth dates in this mode.
        configured
            .iter()
            .copied()
            .filter(|category| {
                *category == PiiCategory::Date || CONTEXT_PRESERVING_CATEGORIES.contains(category)
            })
            .collect()
    }

    /// Every category; used where raw PII must never leak regardless of role.
    pub fn most_restrictive() -> MaskSet {
        PiiCategory::ALL.into_iter().collect()
    }
}
