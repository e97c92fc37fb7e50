//! Normalized cross-correlation over every window position.

use std::ops::Range;

use super::cancel::CancellationToken;
use super::integral::IntegralImage;
use super::luma::LumaPlane;
use crate::error::Result;

/// Windows (and references) whose luminance variance falls below this are
/// treated as flat: correlation against them is undefined.
pub const FLAT_VARIANCE_EPSILON: f64 = 1e-4;

/// A position whose score met the threshold.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    pub x: usize,
    pub y: usize,
    pub score: f64,
}

/// Reference plane with its totals precomputed.
pub struct Reference<'a> {
    plane: &'a LumaPlane,
    sum: f64,
    /// `sqrt(n * sum_sq - sum^2)`
    norm: f64,
}

impl<'a> Reference<'a> {
    /// `None` when the reference is flat.
    pub fn new(plane: &'a LumaPlane) -> Option<Self> {
        let n = plane.len() as f64;
        let (sum, sq_sum) = plane
            .values()
            .iter()
            .fold((0.0, 0.0), |(s, q), &v| (s + v, q + v * v));
        let spread = n * sq_sum - sum * sum;
        if spread < FLAT_VARIANCE_EPSILON * n * n {
            return None;
        }
        Some(Self {
            plane,
            sum,
            norm: spread.sqrt(),
        })
    }

    pub fn width(&self) -> usize {
        self.plane.width()
    }

    pub fn height(&self) -> usize {
        self.plane.height()
    }
}

/// Everything a row band needs; shared read-only across worker threads.
pub struct Search<'a> {
    pub source: &'a LumaPlane,
    pub integral: &'a IntegralImage,
    pub reference: &'a Reference<'a>,
    pub threshold: f64,
    pub cancel: &'a CancellationToken,
}

impl Search<'_> {
    /// Number of valid top-left rows.
    pub fn rows(&self) -> usize {
        self.source.height() - self.reference.height() + 1
    }

    fn cols(&self) -> usize {
        self.source.width() - self.reference.width() + 1
    }

    #[inline]
    fn cross_term(&self, x: usize, y: usize) -> f64 {
        let (rw, rh) = (self.reference.width(), self.reference.height());
        let mut acc = 0.0;
        for ry in 0..rh {
            let src = &self.source.row(y + ry)[x..x + rw];
            let tpl = self.reference.plane.row(ry);
            acc += src.iter().zip(tpl).map(|(s, r)| s * r).sum::<f64>();
        }
        acc
    }

    /// Score at one position, or `None` for a flat window.
    pub fn score_at(&self, x: usize, y: usize) -> Option<f64> {
        let (rw, rh) = (self.reference.width(), self.reference.height());
        let n = (rw * rh) as f64;
        let (s_sum, s_sq) = self.integral.window(x, y, rw, rh);
        let spread = n * s_sq - s_sum * s_sum;
        if spread < FLAT_VARIANCE_EPSILON * n * n {
            return None;
        }
        let numerator = n * self.cross_term(x, y) - s_sum * self.reference.sum;
        let score = numerator / (spread.sqrt() * self.reference.norm);
        Some(score.clamp(-1.0, 1.0))
    }

    /// Scans a band of top-left rows, checking for cancellation before each.
    pub fn scan_rows(&self, rows: Range<usize>) -> Result<Vec<Candidate>> {
        let cols = self.cols();
        let mut found = Vec::new();
        for y in rows {
            self.cancel.check()?;
            for x in 0..cols {
                if let Some(score) = self.score_at(x, y) {
                    if score >= self.threshold {
                        found.push(Candidate { x, y, score });
                    }
                }
            }
        }
        Ok(found)
    }

    /// Scans all rows, split into contiguous bands over `workers` scoped
    /// threads.
    pub fn scan(&self, workers: usize) -> Result<Vec<Candidate>> {
        let rows = self.rows();
        let workers = workers.clamp(1, rows);
        if workers == 1 {
            return self.scan_rows(0..rows);
        }

        let band = rows.div_ceil(workers);
        let results: Vec<Result<Vec<Candidate>>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..rows)
                .step_by(band)
                .map(|start| {
                    let end = (start + band).min(rows);
                    scope.spawn(move || self.scan_rows(start..end))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect()
        });

        let mut all = Vec::new();
        for band in results {
            all.extend(band?);
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn plane(w: u32, h: u32, f: impl Fn(u32, u32) -> u8) -> LumaPlane {
        LumaPlane::from_rgba_image(&RgbaImage::from_fn(w, h, |x, y| {
            let v = f(x, y);
            Rgba([v, v, v, 255])
        }))
    }

    fn textured(x: u32, y: u32) -> u8 {
        ((x * 37 + y * 91 + (x * y) % 13) % 256) as u8
    }

    #[test]
    fn test_flat_reference_rejected() {
        assert!(Reference::new(&plane(4, 4, |_, _| 128)).is_none());
        assert!(Reference::new(&plane(4, 4, textured)).is_some());
    }

    #[test]
    fn test_exact_position_scores_one() {
        let source = plane(24, 18, textured);
        let tpl = plane(6, 5, |x, y| textured(x + 9, y + 7));
        let reference = Reference::new(&tpl).unwrap();
        let integral = IntegralImage::new(&source);
        let cancel = CancellationToken::new();
        let search = Search {
            source: &source,
            integral: &integral,
            reference: &reference,
            threshold: 0.99,
            cancel: &cancel,
        };

        let score = search.score_at(9, 7).unwrap();
        assert!((score - 1.0).abs() < 1e-9, "score {}", score);
        let hits = search.scan(1).unwrap();
        assert!(hits.iter().any(|c| c.x == 9 && c.y == 7));
    }

    #[test]
    fn test_illumination_invariance() {
        let source = plane(20, 20, |x, y| textured(x, y) / 2 + 40);
        let tpl = plane(5, 5, |x, y| textured(x + 3, y + 4));
        let reference = Reference::new(&tpl).unwrap();
        let integral = IntegralImage::new(&source);
        let cancel = CancellationToken::new();
        let search = Search {
            source: &source,
            integral: &integral,
            reference: &reference,
            threshold: 0.9,
            cancel: &cancel,
        };
        // Affine brightness change keeps the correlation near 1 (halving rounds)
        assert!(search.score_at(3, 4).unwrap() > 0.95);
    }

    #[test]
    fn test_parallel_scan_matches_serial() {
        let source = plane(40, 33, textured);
        let tpl = plane(7, 6, |x, y| textured(x + 20, y + 11));
        let reference = Reference::new(&tpl).unwrap();
        let integral = IntegralImage::new(&source);
        let cancel = CancellationToken::new();
        let search = Search {
            source: &source,
            integral: &integral,
            reference: &reference,
            threshold: 0.5,
            cancel: &cancel,
        };

        let serial = search.scan(1).unwrap();
        let parallel = search.scan(4).unwrap();
        assert_eq!(serial, parallel);
        // More workers than rows still works
        assert_eq!(search.scan(1000).unwrap(), serial);
    }

    #[test]
    fn test_cancelled_scan_stops() {
        let source = plane(30, 30, textured);
        let tpl = plane(5, 5, |x, y| textured(x + 1, y + 1));
        let reference = Reference::new(&tpl).unwrap();
        let integral = IntegralImage::new(&source);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let search = Search {
            source: &source,
            integral: &integral,
            reference: &reference,
            threshold: 0.5,
            cancel: &cancel,
        };
        assert!(search.scan(1).is_err());
        assert!(search.scan(3).is_err());
    }

    #[test]
    fn test_cancel_from_another_thread_interrupts_scan() {
        // Large enough that a full scan takes far longer than the cancel delay
        let source = plane(1200, 900, textured);
        let tpl = plane(64, 64, |x, y| textured(x + 3, y + 5));
        let reference = Reference::new(&tpl).unwrap();
        let integral = IntegralImage::new(&source);

        for workers in [1, 4] {
            let cancel = CancellationToken::new();
            let search = Search {
                source: &source,
                integral: &integral,
                reference: &reference,
                threshold: 0.5,
                cancel: &cancel,
            };
            let canceller = cancel.clone();
            let start = std::time::Instant::now();
            let result = std::thread::scope(|scope| {
                scope.spawn(move || {
                    std::thread::sleep(std::time::Duration::from_millis(30));
                    canceller.cancel();
                });
                search.scan(workers)
            });
            assert!(
                matches!(result, Err(crate::error::DeskshotError::Cancelled)),
                "workers={} finished without observing the cancel",
                workers
            );
            assert!(
                start.elapsed() < std::time::Duration::from_secs(5),
                "workers={} took {:?} to stop",
                workers,
                start.elapsed()
            );
        }
    }
}
