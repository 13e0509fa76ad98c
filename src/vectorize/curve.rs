//! Curve storage and the smoothing stage.
//!
//! A `Curve` holds one segment per polygon vertex. Smoothing classifies
//! each vertex as a sharp corner or a smooth curve point based on how far
//! it deviates from the line through its neighbors, and places the Bezier
//! control points accordingly.

use kurbo::Point;

use crate::geom::{ddenom, dpara, interval};

/// Segment kind produced by smoothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegTag {
    /// Sharp vertex: `c[1]` is the corner, `c[2]` the outgoing endpoint;
    /// `c[0]` is unused.
    Corner,
    /// Smooth vertex: `c[0]`, `c[1]` are the cubic control points, `c[2]`
    /// the endpoint.
    Curve,
}

/// A closed sequence of corner/curve segments with three control slots per
/// segment plus the per-vertex smoothing parameters.
#[derive(Debug, Clone)]
pub struct Curve {
    pub n: usize,
    pub tag: Vec<SegTag>,
    /// Control points, three per segment: `c[3i..3i+3]`.
    pub c: Vec<Point>,
    pub vertex: Vec<Point>,
    /// Clamped smoothing parameter per vertex.
    pub alpha: Vec<f64>,
    /// Raw (unclamped) smoothing parameter per vertex.
    pub alpha0: Vec<f64>,
    pub beta: Vec<f64>,
}

impl Curve {
    pub fn new(n: usize) -> Self {
        Curve {
            n,
            tag: vec![SegTag::Corner; n],
            c: vec![Point::ZERO; 3 * n],
            vertex: vec![Point::ZERO; n],
            alpha: vec![0.0; n],
            alpha0: vec![0.0; n],
            beta: vec![0.0; n],
        }
    }

    /// Number of segments with the given tag.
    pub fn count_tag(&self, tag: SegTag) -> usize {
        self.tag.iter().filter(|&&t| t == tag).count()
    }
}

/// Lower bound of the clamped curve alpha.
const ALPHA_MIN: f64 = 0.55;
/// Upper bound of the clamped curve alpha.
const ALPHA_MAX_CLAMP: f64 = 1.0;

/// Classify each vertex and place control points.
///
/// For the vertex triple (v[i], v[j], v[k]) the deviation measure is
/// `dd = |dpara / ddenom|`; the raw alpha is `(1 - 1/dd) / 0.75` (zero when
/// dd <= 1, 4/3 when the denominator degenerates). At or above `alpha_max`
/// the vertex becomes a CORNER; otherwise a CURVE with alpha clamped to
/// [0.55, 1] and tangent control points interpolated at `0.5 + 0.5 alpha`.
pub fn smooth(vertices: &[Point], alpha_max: f64) -> Curve {
    let m = vertices.len();
    let mut curve = Curve::new(m);
    curve.vertex = vertices.to_vec();

    for i in 0..m {
        let j = (i + 1) % m;
        let k = (i + 2) % m;
        let p4 = interval(0.5, vertices[k], vertices[j]);

        let denom = ddenom(vertices[i], vertices[k]);
        let mut alpha = if denom != 0.0 {
            let dd = (dpara(vertices[i], vertices[j], vertices[k]) / denom).abs();
            let raw = if dd > 1.0 { 1.0 - 1.0 / dd } else { 0.0 };
            raw / 0.75
        } else {
            4.0 / 3.0
        };
        curve.alpha0[j] = alpha;

        if alpha >= alpha_max {
            curve.tag[j] = SegTag::Corner;
            curve.c[3 * j + 1] = vertices[j];
            curve.c[3 * j + 2] = p4;
        } else {
            alpha = alpha.clamp(ALPHA_MIN, ALPHA_MAX_CLAMP);
            curve.tag[j] = SegTag::Curve;
            curve.c[3 * j] = interval(0.5 + 0.5 * alpha, vertices[i], vertices[j]);
            curve.c[3 * j + 1] = interval(0.5 + 0.5 * alpha, vertices[k], vertices[j]);
            curve.c[3 * j + 2] = p4;
        }
        curve.alpha[j] = alpha;
        curve.beta[j] = 0.5;
    }

    curve
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_vertices(side: f64) -> Vec<Point> {
        vec![
            Point::new(0.0, 0.0),
            Point::new(0.0, side),
            Point::new(side, side),
            Point::new(side, 0.0),
        ]
    }

    #[test]
    fn large_square_keeps_sharp_corners() {
        // side 12: dd = 6, alpha = (1 - 1/6) / 0.75 > 1.
        let curve = smooth(&square_vertices(12.0), 1.0);
        assert_eq!(curve.count_tag(SegTag::Corner), 4);
        for i in 0..4 {
            assert_eq!(curve.c[3 * i + 1], curve.vertex[i]);
        }
    }

    #[test]
    fn small_square_rounds_off() {
        // side 5: dd = 2.5, alpha = 0.8 < 1, so every vertex smooths.
        let curve = smooth(&square_vertices(5.0), 1.0);
        assert_eq!(curve.count_tag(SegTag::Curve), 4);
        for a in &curve.alpha {
            assert!((ALPHA_MIN..=ALPHA_MAX_CLAMP).contains(a));
        }
    }

    #[test]
    fn endpoints_sit_at_edge_midpoints() {
        let vertices = square_vertices(12.0);
        let curve = smooth(&vertices, 1.0);
        let m = vertices.len();
        for i in 0..m {
            let j = (i + 1) % m;
            let mid = interval(0.5, vertices[j], vertices[i]);
            let c2 = curve.c[3 * i + 2];
            assert!((c2.x - mid.x).abs() < 1e-12);
            assert!((c2.y - mid.y).abs() < 1e-12);
        }
    }

    #[test]
    fn alpha0_keeps_raw_value() {
        let curve = smooth(&square_vertices(5.0), 1.0);
        for i in 0..curve.n {
            // Raw alpha 0.8 is inside the clamp window here, so the two agree.
            assert!((curve.alpha0[i] - 0.8).abs() < 1e-9);
            assert_eq!(curve.beta[i], 0.5);
        }
    }
}
