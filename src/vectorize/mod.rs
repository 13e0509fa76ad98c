//! Vectorization pipeline: binary bitmap → contour paths → smooth curves.
//!
//! 1. Path decomposition (contour tracing with XOR erase)
//! 2. Prefix sums + longest straight subpaths
//! 3. Optimal polygon (DP)
//! 4. Sub-pixel vertex adjustment
//! 5. Winding normalization + smoothing
//! 6. Optional curve optimization

pub mod curve;
pub mod decompose;
pub mod opticurve;
pub mod polygon;

pub use curve::{Curve, SegTag};
pub use decompose::PixelPath;

use crate::config::PotraceParams;
use crate::error::Error;

/// Synchronous progress reporting over a sub-interval of [0, 1].
///
/// `subrange` composes nested stage reporting: a callee reports its own
/// 0..1 and the wrapper maps it into the caller's interval.
pub struct Progress<'a> {
    callback: &'a mut dyn FnMut(f64),
    lo: f64,
    span: f64,
}

impl<'a> Progress<'a> {
    pub fn new(callback: &'a mut dyn FnMut(f64)) -> Self {
        Progress { callback, lo: 0.0, span: 1.0 }
    }

    /// Report a fraction of this handle's interval.
    pub fn report(&mut self, fraction: f64) {
        let f = fraction.clamp(0.0, 1.0);
        (self.callback)(self.lo + self.span * f);
    }

    /// A handle covering [lo, hi] of this handle's interval.
    pub fn subrange(&mut self, lo: f64, hi: f64) -> Progress<'_> {
        Progress {
            lo: self.lo + self.span * lo,
            span: self.span * (hi - lo),
            callback: &mut *self.callback,
        }
    }
}

/// Number of reported stages per path.
const STAGES: usize = 5;

/// Run stages 2..6 over every decomposed path, in order.
///
/// Returns the final curve per path plus any non-fatal statuses (a failed
/// curve optimization falls back to the unoptimized curve).
pub fn process_paths(
    paths: &[PixelPath],
    params: &PotraceParams,
    mut progress: Option<Progress<'_>>,
) -> (Vec<Curve>, Vec<Error>) {
    let total = paths.len().max(1) as f64;
    let mut curves = Vec::with_capacity(paths.len());
    let mut warnings = Vec::new();

    for (idx, path) in paths.iter().enumerate() {
        let mut stage = 0usize;
        let mut tick = |progress: &mut Option<Progress<'_>>| {
            stage += 1;
            if let Some(p) = progress.as_mut() {
                p.report((idx * STAGES + stage) as f64 / (total * STAGES as f64));
            }
        };

        let sums = polygon::calc_sums(&path.points);
        tick(&mut progress);
        let lon = polygon::calc_lon(&path.points);
        tick(&mut progress);
        let po = polygon::best_polygon(&path.points, &lon, &sums);
        tick(&mut progress);
        let mut vertices = polygon::adjust_vertices(&path.points, &po, &sums);
        tick(&mut progress);

        // Holes are traced with the inverted region on the same side as
        // outer boundaries; reversing them gives the output consistent
        // winding.
        if path.sign < 0 {
            vertices.reverse();
        }
        let smoothed = curve::smooth(&vertices, params.alpha_max);
        tick(&mut progress);

        let final_curve = if params.opt_curve {
            match opticurve::optimize(&smoothed, params.opt_tolerance) {
                Ok(optimized) => optimized,
                Err(status) => {
                    warnings.push(status);
                    smoothed
                }
            }
        } else {
            smoothed
        };
        curves.push(final_curve);
    }

    if let Some(p) = progress.as_mut() {
        p.report(1.0);
    }
    (curves, warnings)
}
