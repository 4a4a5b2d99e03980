//! Reduction of candidate spans to a disjoint, ordered set

use crate::detection::Detection;

/// Keeps the earliest span at each position, preferring higher confidence on ties.
///
/// Output is ordered by `start` and satisfies `out[i].end <= out[i + 1].start`.
pub fn resolve(mut detections: Vec<Detection>) -> Vec<Detection> {
    // Stable, so full ties keep the detector's category order.
    detections.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then_with(|| b.confidence.total_cmp(&a.confidence))
    });

    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    let mut last_end = 0;

    for detection in detections {
        if kept.is_empty() || detection.start >= last_end {
            last_end = detection.end;
            kept.push(detection);
        }
    }

    kept
}
