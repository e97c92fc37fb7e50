//! Non-maximum suppression over correlation candidates.

use std::cmp::Ordering;

use super::ncc::Candidate;

/// Half-window used to suppress neighbours of an accepted match:
/// `max(1, ceil(size * factor))`.
pub fn suppression_radius(size: usize, factor: f64) -> usize {
    ((size as f64 * factor).ceil() as usize).max(1)
}

/// Highest score first; ties broken by row then column so output is
/// deterministic regardless of scan order.
fn by_strength(a: &Candidate, b: &Candidate) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then(a.y.cmp(&b.y))
        .then(a.x.cmp(&b.x))
}

/// Greedily keeps the strongest candidate and drops every other candidate
/// within `radius_x` / `radius_y` of it (exclusive) until none remain.
pub fn suppress(mut candidates: Vec<Candidate>, radius_x: usize, radius_y: usize) -> Vec<Candidate> {
    candidates.sort_by(by_strength);

    let mut kept: Vec<Candidate> = Vec::new();
    for c in candidates {
        let overlaps = kept
            .iter()
            .any(|k| k.x.abs_diff(c.x) < radius_x && k.y.abs_diff(c.y) < radius_y);
        if !overlaps {
            kept.push(c);
        }
    }
    kept
}
