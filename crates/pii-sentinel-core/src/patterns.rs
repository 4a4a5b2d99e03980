//! Compiled per-category detection patterns
//!
//! Built-in patterns and caller-supplied custom patterns are compiled exactly
//! once, when the library is constructed. Callers only ever see opaque
//! [`CompiledPattern`] handles, so nothing downstream can recompile per call.
//! Matching uses the `regex` crate, which runs in time linear to the input.

use crate::config::{InvalidPatternPolicy, PiiProtectionConfig};
use crate::detection::PiiCategory;
use crate::error::{ProtectionError, Result};
use regex::{Regex, RegexBuilder};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Upper bound on the compiled size of a single custom pattern.
const CUSTOM_PATTERN_SIZE_LIMIT: usize = 1 << 20;

const NAME_PATTERNS: &[&str] = &[
    r"\b[A-Z][a-z]{1,15}\s+[A-Z][a-z]{1,15}\b",
    r"\b(?:Mr|Mrs|Ms|Dr|Prof)\.?\s+[A-Z][a-z]+(?:\s+[A-Z][a-z]+)*\b",
    r"\b[A-Z]\.[A-Z]\.\B",
    r"\b[A-Z][a-z]+(?:-[A-Z][a-z]+)*\s+[A-Z][a-z]+\b",
];

const DATE_PATTERNS: &[&str] = &[
    r"\b\d{1,2}[/\-]\d{1,2}[/\-]\d{4}\b",
    r"\b(?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{1,2},?\s+\d{4}\b",
    r"\b\d{1,2}\s+(?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{4}\b",
    r"\b\d{4}-\d{2}-\d{2}\b",
];

const ADDRESS_PATTERNS: &[&str] = &[
    r"\b\d{1,6}\s+(?:[A-Za-z]+\s+){1,4}(?:Street|St|Avenue|Ave|Road|Rd|Boulevard|Blvd|Lane|Ln|Drive|Dr|Court|Ct|Place|Pl)\b",
    r"\b\d{5}(?:-\d{4})?\b",
    r"\b[A-Z]\d[A-Z]\s*\d[A-Z]\d\b",
];

const PHONE_PATTERNS: &[&str] = &[
    r"(?:\+?\b1[-.\s]?)?(?:\([2-9]\d{2}\)|\b[2-9]\d{2})[-.\s]?\d{3}[-.\s]?\d{4}\b",
    r"\+\d{1,3}[-.\s]?\d{1,4}[-.\s]?\d{1,4}[-.\s]?\d{1,9}\b",
];

const EMAIL_PATTERNS: &[&str] = &[r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b"];

const MRN_PATTERNS: &[&str] = &[
    r"\b(?:MRN|Medical Record(?: Number)?|Patient ID)[\s:#]*[A-Z]{0,4}-?\d[A-Z0-9\-]{4,}\b",
    r"\b[A-Z]{2}\d{6,}\b",
];

/// An opaque, already-compiled detection pattern.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    regex: Regex,
}

impl CompiledPattern {
    /// Yields `(start, end)` byte offsets of every non-overlapping match.
    pub fn spans<'a>(&'a self, text: &'a str) -> impl Iterator<Item = (usize, usize)> + 'a {
        self.regex.find_iter(text).map(|m| (m.start(), m.end()))
    }
}

#[derive(Debug, Clone)]
pub struct PatternLibrary {
    patterns: BTreeMap<PiiCategory, Vec<CompiledPattern>>,
    warnings: Vec<String>,
}

impl PatternLibrary {
    pub fn new(config: &PiiProtectionConfig) -> Result<Self> {
        let mut patterns = BTreeMap::new();

        for category in PiiCategory::BUILT_IN {
            let (sources, case_insensitive) = builtin_sources(category);
            let compiled = sources
                .iter()
                .map(|source| compile(source, case_insensitive, None))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| {
                    ProtectionError::configuration(format!(
                        "built-in {} pattern failed to compile: {}",
                        category, e
                    ))
                })?;
            debug!("Loaded {} built-in patterns for '{}'", compiled.len(), category);
            patterns.insert(category, compiled);
        }

        let mut warnings = Vec::new();
        let mut custom = Vec::new();

        for (index, source) in config.custom_patterns.iter().enumerate() {
            match compile(source, true, Some(CUSTOM_PATTERN_SIZE_LIMIT)) {
                Ok(pattern) => {
                    custom.push(pattern);
                    debug!("Loaded custom pattern #{}", index);
                }
                Err(e) => match config.invalid_pattern_policy {
                    InvalidPatternPolicy::Reject => {
                        return Err(ProtectionError::configuration(format!(
                            "invalid custom pattern #{} '{}': {}",
                            index, source, e
                        )));
                    }
                    InvalidPatternPolicy::Skip => {
                        let message = format!("skipped custom pattern #{} '{}': {}", index, source, e);
                        warn!("{}", message);
                        warnings.push(message);
                    }
                },
            }
        }

        patterns.insert(PiiCategory::Custom, custom);

        Ok(Self { patterns, warnings })
    }

    pub fn patterns_for(&self, category: PiiCategory) -> &[CompiledPattern] {
        self.patterns
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Categories in scan order.
    pub fn categories(&self) -> impl Iterator<Item = PiiCategory> + '_ {
        self.patterns.keys().copied()
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.values().map(Vec::len).sum()
    }
}

fn builtin_sources(category: PiiCategory) -> (&'static [&'static str], bool) {
    match category {
        PiiCategory::Name => (NAME_PATTERNS, false),
        PiiCategory::Date => (DATE_PATTERNS, true),
        PiiCategory::Address => (ADDRESS_PATTERNS, true),
        PiiCategory::Phone => (PHONE_PATTERNS, false),
        PiiCategory::Email => (EMAIL_PATTERNS, false),
        PiiCategory::MedicalRecordNumber => (MRN_PATTERNS, true),
        PiiCategory::Custom => (&[], true),
    }
}

fn compile(
    source: &str,
    case_insensitive: bool,
    size_limit: Option<usize>,
) -> std::result::Result<CompiledPattern, regex::Error> {
    let mut builder = RegexBuilder::new(source);
    builder.case_insensitive(case_insensitive);
    if let Some(limit) = size_limit {
        builder.size_limit(limit);
    }
    builder.build().map(|regex| CompiledPattern { regex })
}
