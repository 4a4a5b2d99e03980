//! PII detection over free-text clinical narratives

use crate::patterns::PatternLibrary;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Spans whose lowercase text contains one of these are clinical vocabulary, not people.
const NAME_FALSE_POSITIVES: &[&str] = &[
    "adverse event",
    "medical history",
    "patient reported",
    "side effect",
    "drug name",
    "brand name",
    "generic name",
    "patient john",
    "patient jane",
    "clinical trial",
    "case report",
    "lot number",
    "u.s.",
];

const HONORIFICS: &[&str] = &["Mr", "Mrs", "Ms", "Dr", "Prof"];

const BIRTH_KEYWORDS: &[&str] = &["birth", "born", "dob"];

/// How many characters before a date are inspected for birth-date wording.
const BIRTH_LEAD_IN_CHARS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiCategory {
    Name,
    #[serde(alias = "date_of_birth")]
    Date,
    Address,
    Phone,
    Email,
    #[serde(alias = "mrn")]
    MedicalRecordNumber,
    Custom,
}

impl PiiCategory {
    pub const ALL: [PiiCategory; 7] = [
        Self::Name,
        Self::Date,
        Self::Address,
        Self::Phone,
        Self::Email,
        Self::MedicalRecordNumber,
        Self::Custom,
    ];

    /// Categories that ship with compiled patterns; `Custom` comes from config.
    pub const BUILT_IN: [PiiCategory; 6] = [
        Self::Name,
        Self::Date,
        Self::Address,
        Self::Phone,
        Self::Email,
        Self::MedicalRecordNumber,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Date => "date",
            Self::Address => "address",
            Self::Phone => "phone",
            Self::Email => "email",
            Self::MedicalRecordNumber => "medical_record_number",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for PiiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sensitivity {
    Low,
    Medium,
    High,
    Critical,
}

/// One PII span found in a piece of text.
///
/// `start..end` is a half-open byte range into the scanned text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub category: PiiCategory,
    pub sensitivity: Sensitivity,
    /// The matched PII itself; kept out of every serialized form.
    #[serde(skip_serializing, default)]
    pub original_text: String,
    pub start: usize,
    pub end: usize,
    pub confidence: f64,
    pub replacement: String,
    pub context: String,
}

impl Detection {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

#[derive(Debug, Clone)]
pub struct Detector {
    library: PatternLibrary,
}

impl Detector {
    pub fn new(library: PatternLibrary) -> Self {
        Self { library }
    }

    pub fn library(&self) -> &PatternLibrary {
        &self.library
    }

    /// Scans `text` with every category's patterns.
    ///
    /// The result is grouped by category with each group ordered by offset;
    /// overlaps between categories are left for the resolver.
    pub fn detect(&self, text: &str, context: &str) -> Vec<Detection> {
        if text.is_empty() {
            return Vec::new();
        }

        let mut detections = Vec::new();
        for category in self.library.categories() {
            detections.extend(self.detect_category(category, text, context));
        }

        debug!(
            "Found {} candidate spans in text of {} bytes",
            detections.len(),
            text.len()
        );
        detections
    }

    fn detect_category(&self, category: PiiCategory, text: &str, context: &str) -> Vec<Detection> {
        let mut found = Vec::new();

        for pattern in self.library.patterns_for(category) {
            for (start, end) in pattern.spans(text) {
                let Some((start, end)) = trim_span(text, start, end) else {
                    continue;
                };
                let span = &text[start..end];

                if category == PiiCategory::Name && !is_likely_name(span) {
                    continue;
                }

                let sensitivity = assess_sensitivity(category, text, start, context);
                found.push(Detection {
                    category,
                    sensitivity,
                    original_text: span.to_string(),
                    start,
                    end,
                    confidence: score(category, span, context),
                    replacement: suggested_replacement(category, sensitivity, span),
                    context: context.to_string(),
                });
            }
        }

        found.sort_by_key(|d| d.start);
        found
    }
}

/// Shrinks a match to exclude surrounding whitespace; `None` when nothing is left.
fn trim_span(text: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    let raw = &text[start..end];
    let leading = raw.len() - raw.trim_start().len();
    let trailing = raw.len() - raw.trim_end().len();
    if leading + trailing >= raw.len() {
        return None;
    }
    Some((start + leading, end - trailing))
}

fn is_likely_name(span: &str) -> bool {
    let lower = span.to_lowercase();
    if lower.starts_with("patient ") {
        return false;
    }
    !NAME_FALSE_POSITIVES.iter().any(|fp| lower.contains(fp))
}

fn strip_honorific(span: &str) -> &str {
    for title in HONORIFICS {
        if let Some(rest) = span.strip_prefix(title) {
            let rest = rest.strip_prefix('.').unwrap_or(rest);
            if rest.starts_with(char::is_whitespace) {
                return rest.trim_start();
            }
        }
    }
    span
}

/// True for exactly two words, each one uppercase letter followed by lowercase letters.
fn is_strict_name_shape(span: &str) -> bool {
    let words: Vec<&str> = span.split(' ').collect();
    words.len() == 2
        && words.iter().all(|word| {
            let mut chars = word.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
                && word.len() > 1
                && chars.all(|c| c.is_ascii_lowercase())
        })
}

fn mentions_any(haystack: &str, needles: &[&str]) -> bool {
    let lower = haystack.to_lowercase();
    needles.iter().any(|n| lower.contains(n))
}

fn score(category: PiiCategory, span: &str, context: &str) -> f64 {
    match category {
        PiiCategory::Email => 0.95,
        PiiCategory::Phone | PiiCategory::MedicalRecordNumber | PiiCategory::Date => 0.9,
        PiiCategory::Address => 0.8,
        PiiCategory::Custom => 0.7,
        PiiCategory::Name => {
            let strict = is_strict_name_shape(strip_honorific(span));
            let patient_context = mentions_any(context, &["patient"]);
            match (strict, patient_context) {
                (true, true) => 1.0,
                (true, false) => 0.8,
                (false, true) => 0.7,
                (false, false) => 0.5,
            }
        }
    }
}

fn assess_sensitivity(category: PiiCategory, text: &str, start: usize, context: &str) -> Sensitivity {
    match category {
        PiiCategory::Name | PiiCategory::Address => Sensitivity::High,
        PiiCategory::Phone | PiiCategory::Email | PiiCategory::Custom => Sensitivity::Medium,
        PiiCategory::MedicalRecordNumber => Sensitivity::Critical,
        PiiCategory::Date => {
            if mentions_any(context, BIRTH_KEYWORDS) || mentions_any(lead_in(text, start), BIRTH_KEYWORDS) {
                Sensitivity::Critical
            } else {
                Sensitivity::Medium
            }
        }
    }
}

fn lead_in(text: &str, start: usize) -> &str {
    let before = &text[..start];
    let from = before
        .char_indices()
        .rev()
        .take(BIRTH_LEAD_IN_CHARS)
        .last()
        .map_or(start, |(i, _)| i);
    &before[from..]
}

fn suggested_replacement(category: PiiCategory, sensitivity: Sensitivity, span: &str) -> String {
    match category {
        PiiCategory::Name => {
            let parts: Vec<&str> = span.split_whitespace().collect();
            match parts.as_slice() {
                [first, last] => format!(
                    "[PATIENT_{}{}]",
                    first.chars().count(),
                    last.chars().count()
                ),
                _ => "[PATIENT_NAME]".to_string(),
            }
        }
        PiiCategory::Date if sensitivity == Sensitivity::Critical => "[DATE_OF_BIRTH]".to_string(),
        PiiCategory::Date => "[DATE]".to_string(),
        PiiCategory::Address => "[ADDRESS]".to_string(),
        PiiCategory::Phone => "[PHONE]".to_string(),
        PiiCategory::Email => "[EMAIL]".to_string(),
        PiiCategory::MedicalRecordNumber => "[MRN]".to_string(),
        PiiCategory::Custom => "[CUSTOM_PII]".to_string(),
    }
}

/// Counts of a detection list by category and sensitivity tier.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectionSummary {
    pub total: usize,
    pub by_category: BTreeMap<PiiCategory, usize>,
    pub by_sensitivity: BTreeMap<Sensitivity, usize>,
    pub highest_sensitivity: Option<Sensitivity>,
}

impl DetectionSummary {
    pub fn from_detections(detections: &[Detection]) -> Self {
        let mut summary = Self {
            total: detections.len(),
            ..Self::default()
        };

        for detection in detections {
            *summary.by_category.entry(detection.category).or_default() += 1;
            *summary.by_sensitivity.entry(detection.sensitivity).or_default() += 1;
        }
        summary.highest_sensitivity = summary.by_sensitivity.keys().next_back().copied();
        summary
    }
}
