//! Policy-driven span masking

use crate::detection::{Detection, PiiCategory, Sensitivity};
use crate::policy::MaskSet;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct Masker {
    threshold: f64,
}

impl Masker {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Whether `detection` is rewritten under the given mask set.
    ///
    /// In preserve-context mode names are never selected and dates only when
    /// they are birth dates.
    pub fn should_mask(&self, detection: &Detection, mask_types: &MaskSet, preserve_context: bool) -> bool {
        if !mask_types.contains(&detection.category) || detection.confidence < self.threshold {
            return false;
        }
        if preserve_context {
            match detection.category {
                PiiCategory::Name => return false,
                PiiCategory::Date => return detection.sensitivity == Sensitivity::Critical,
                _ => {}
            }
        }
        true
    }

    /// Rewrites the selected spans with their suggested replacement tokens.
    ///
    /// Returns the masked text and the number of spans rewritten. Spans that
    /// are not selected come through verbatim.
    pub fn mask(
        &self,
        text: &str,
        detections: &[Detection],
        mask_types: &MaskSet,
        preserve_context: bool,
    ) -> (String, usize) {
        let selected = detections
            .iter()
            .filter(|d| self.should_mask(d, mask_types, preserve_context));
        let (masked, rewritten) = rewrite_spans(text, selected, |d| d.replacement.as_str());

        debug!(
            "Masked {} of {} detections ({} categories selected)",
            rewritten,
            detections.len(),
            mask_types.len()
        );
        (masked, rewritten)
    }

    /// Rewrites every span regardless of category or confidence.
    pub fn mask_all(text: &str, detections: &[Detection]) -> (String, usize) {
        rewrite_spans(text, detections.iter(), |d| d.replacement.as_str())
    }
}

/// Splices replacements into `text` right to left so earlier offsets stay valid.
///
/// Spans must be disjoint; a span that overlaps one already rewritten, runs
/// past the text, or does not sit on char boundaries is skipped.
pub(crate) fn rewrite_spans<'d, I, F>(text: &str, spans: I, replacement: F) -> (String, usize)
where
    I: Iterator<Item = &'d Detection>,
    F: Fn(&'d Detection) -> &'d str,
{
    let mut ordered: Vec<&Detection> = spans.collect();
    ordered.sort_by(|a, b| b.start.cmp(&a.start));

    let mut result = text.to_string();
    let mut limit = text.len();
    let mut rewritten = 0;

    for detection in ordered {
        let (start, end) = (detection.start, detection.end);
        if start > end
            || end > limit
            || !text.is_char_boundary(start)
            || !text.is_char_boundary(end)
        {
            warn!(
                "Skipping {} span {}..{} that does not fit the text",
                detection.category, start, end
            );
            continue;
        }
        result.replace_range(start..end, replacement(detection));
        limit = start;
        rewritten += 1;
    }

    (result, rewritten)
}
