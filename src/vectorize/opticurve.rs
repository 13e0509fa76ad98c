//! Curve optimization: merge runs of consecutive CURVE segments into a
//! single cubic Bezier wherever the merged curve stays within tolerance of
//! the original.
//!
//! Candidate spans are scored by `opti_penalty`, which fits a cubic with
//! matching endpoint tangents from closed-form area ratios and then rejects
//! it unless every sampled deviation is inside `opt_tolerance`. A dynamic
//! program over segment counts picks the globally shortest merge, breaking
//! ties by accumulated penalty.

use kurbo::Point;

use crate::error::Error;
use crate::geom::{bezier, cprod, ddist, dpara, interval, iprod, iprod1, pmod, tangent};
use super::curve::{Curve, SegTag};

/// cos(179 degrees): merged spans may not turn back on themselves.
const COS_TURN_LIMIT: f64 = -0.999_847_695_156;

/// A fitted candidate for one merged span.
#[derive(Debug, Clone, Copy)]
struct Opti {
    pen: f64,
    c: [Point; 2],
    t: f64,
    s: f64,
    alpha: f64,
}

/// Optimize a smoothed curve. Fails only when there is nothing to work on;
/// the caller keeps the unoptimized curve in that case.
pub fn optimize(curve: &Curve, opt_tolerance: f64) -> Result<Curve, Error> {
    let m = curve.n;
    if m == 0 {
        return Err(Error::OptimizationIncomplete);
    }
    let vertex = &curve.vertex;

    // Convexity sign of every CURVE vertex; corners get 0 and stop merges.
    let mut convc = vec![0i32; m];
    for i in 0..m {
        if curve.tag[i] == SegTag::Curve {
            convc[i] = fsign(dpara(
                vertex[pmod(i as isize - 1, m)],
                vertex[i],
                vertex[(i + 1) % m],
            ));
        }
    }

    // Cumulative tangent-weighted areas, used to recover the enclosed area
    // of any span in O(1).
    let mut area = 0.0f64;
    let mut areac = vec![0.0f64; m + 1];
    let p0 = vertex[0];
    for i in 0..m {
        let i1 = (i + 1) % m;
        if curve.tag[i1] == SegTag::Curve {
            let alpha = curve.alpha[i1];
            area += 0.3 * alpha * (4.0 - alpha)
                * dpara(curve.c[i * 3 + 2], vertex[i1], curve.c[i1 * 3 + 2])
                / 2.0;
            area += dpara(p0, curve.c[i * 3 + 2], curve.c[i1 * 3 + 2]) / 2.0;
        }
        areac[i + 1] = area;
    }

    // pt[j]: best predecessor of node j; len[j]: segments used; pen[j]:
    // accumulated penalty.
    let mut pt = vec![-1isize; m + 1];
    let mut pen = vec![0.0f64; m + 1];
    let mut len = vec![0usize; m + 1];
    let mut opt: Vec<Option<Opti>> = vec![None; m + 1];

    for j in 1..=m {
        pt[j] = j as isize - 1;
        pen[j] = pen[j - 1];
        len[j] = len[j - 1] + 1;

        let mut i = j as isize - 2;
        while i >= 0 {
            let Some(res) =
                opti_penalty(curve, i as usize, j % m, opt_tolerance, &convc, &areac)
            else {
                break;
            };
            let iu = i as usize;
            if len[j] > len[iu] + 1 || (len[j] == len[iu] + 1 && pen[j] > pen[iu] + res.pen) {
                pt[j] = i;
                pen[j] = pen[iu] + res.pen;
                len[j] = len[iu] + 1;
                opt[j] = Some(res);
            }
            i -= 1;
        }
    }

    let om = len[m];
    let mut ocurve = Curve::new(om);
    let mut s_arr = vec![0.0f64; om];
    let mut t_arr = vec![0.0f64; om];

    let mut j = m;
    for i in (0..om).rev() {
        let jm = j % m;
        if pt[j] == j as isize - 1 {
            ocurve.tag[i] = curve.tag[jm];
            ocurve.c[i * 3] = curve.c[jm * 3];
            ocurve.c[i * 3 + 1] = curve.c[jm * 3 + 1];
            ocurve.c[i * 3 + 2] = curve.c[jm * 3 + 2];
            ocurve.vertex[i] = curve.vertex[jm];
            ocurve.alpha[i] = curve.alpha[jm];
            ocurve.alpha0[i] = curve.alpha0[jm];
            ocurve.beta[i] = curve.beta[jm];
            s_arr[i] = 1.0;
            t_arr[i] = 1.0;
        } else {
            let Some(o) = opt[j] else {
                return Err(Error::OptimizationIncomplete);
            };
            ocurve.tag[i] = SegTag::Curve;
            ocurve.c[i * 3] = o.c[0];
            ocurve.c[i * 3 + 1] = o.c[1];
            ocurve.c[i * 3 + 2] = curve.c[jm * 3 + 2];
            ocurve.vertex[i] = interval(o.s, curve.c[jm * 3 + 2], curve.vertex[jm]);
            ocurve.alpha[i] = o.alpha;
            ocurve.alpha0[i] = o.alpha;
            s_arr[i] = o.s;
            t_arr[i] = o.t;
        }
        if i > 0 {
            j = pt[j] as usize;
        }
    }

    for i in 0..om {
        let i1 = (i + 1) % om;
        ocurve.beta[i] = s_arr[i] / (s_arr[i] + t_arr[i1]);
    }

    Ok(ocurve)
}

/// Score merging segments (i, j] into one cubic, or reject.
///
/// Rejections: a corner or convexity flip inside the span, a near-reversal
/// of direction, a degenerate tangent intersection, a fitted alpha outside
/// [0, 1] (this also catches the NaN of a negative discriminant), any
/// sampled deviation beyond `opt_tolerance`, or a sample falling outside
/// its segment's extent.
fn opti_penalty(
    curve: &Curve,
    i: usize,
    j: usize,
    opt_tolerance: f64,
    convc: &[i32],
    areac: &[f64],
) -> Option<Opti> {
    let m = curve.n;
    if i == j {
        return None;
    }

    let vertex = &curve.vertex;
    let i1 = (i + 1) % m;
    let conv = convc[i1];
    if conv == 0 {
        return None;
    }

    let d = ddist(vertex[i], vertex[i1]);
    let mut k = i;
    while k != j {
        let k1 = (k + 1) % m;
        let k2 = (k + 2) % m;
        if convc[k1] != conv {
            return None;
        }
        if fsign(cprod(vertex[i], vertex[i1], vertex[k1], vertex[k2])) != conv {
            return None;
        }
        if iprod1(vertex[i], vertex[i1], vertex[k1], vertex[k2])
            < d * ddist(vertex[k1], vertex[k2]) * COS_TURN_LIMIT
        {
            return None;
        }
        k = k1;
    }

    let p0 = curve.c[i * 3 + 2];
    let mut area = areac[j] - areac[i];
    area -= dpara(vertex[0], curve.c[i * 3 + 2], curve.c[j * 3 + 2]) / 2.0;
    if i >= j {
        area += areac[m];
    }

    let q1 = vertex[i1];
    let q2 = vertex[j];
    let p3 = curve.c[j * 3 + 2];

    let a1 = dpara(p0, q1, q2);
    let a2 = dpara(p0, q1, p3);
    let a3 = dpara(p0, q2, p3);
    let a4 = a1 + a3 - a2;

    if a2 == a1 {
        return None;
    }

    let t = a3 / (a3 - a4);
    let s = a2 / (a2 - a1);
    let big_a = a2 * t / 2.0;
    if big_a == 0.0 {
        return None;
    }

    let r = area / big_a;
    let alpha = 2.0 - (4.0 - r / 0.3).sqrt();
    if !(0.0..=1.0).contains(&alpha) {
        return None;
    }

    let p1 = interval(t * alpha, p0, q1);
    let p2 = interval(s * alpha, p3, q2);
    let mut res = Opti { pen: 0.0, c: [p1, p2], t, s, alpha };

    // Deviation of the original vertices from the candidate cubic.
    let mut k = (i + 1) % m;
    while k != j {
        let k1 = (k + 1) % m;
        let t = tangent(p0, p1, p2, p3, vertex[k], vertex[k1]);
        if t < -0.5 {
            return None;
        }
        let pt = bezier(t, p0, p1, p2, p3);
        let d = ddist(vertex[k], vertex[k1]);
        if d == 0.0 {
            return None;
        }
        let d1 = dpara(vertex[k], vertex[k1], pt) / d;
        if d1.abs() > opt_tolerance {
            return None;
        }
        if iprod(vertex[k], vertex[k1], pt) < 0.0 || iprod(vertex[k1], vertex[k], pt) < 0.0 {
            return None;
        }
        res.pen += d1 * d1;
        k = k1;
    }

    // Deviation of the original endpoint chords.
    let mut k = i;
    while k != j {
        let k1 = (k + 1) % m;
        let t = tangent(p0, p1, p2, p3, curve.c[k * 3 + 2], curve.c[k1 * 3 + 2]);
        if t < -0.5 {
            return None;
        }
        let pt = bezier(t, p0, p1, p2, p3);
        let d = ddist(curve.c[k * 3 + 2], curve.c[k1 * 3 + 2]);
        if d == 0.0 {
            return None;
        }
        let mut d1 = dpara(curve.c[k * 3 + 2], curve.c[k1 * 3 + 2], pt) / d;
        let mut d2 = dpara(curve.c[k * 3 + 2], curve.c[k1 * 3 + 2], vertex[k1]) / d;
        d2 *= 0.75 * curve.alpha[k1];
        if d2 < 0.0 {
            d1 = -d1;
            d2 = -d2;
        }
        if d1 < d2 - opt_tolerance {
            return None;
        }
        if d1 < d2 {
            res.pen += (d1 - d2) * (d1 - d2);
        }
        k = k1;
    }

    Some(res)
}

fn fsign(x: f64) -> i32 {
    if x > 0.0 {
        1
    } else if x < 0.0 {
        -1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vectorize::curve::smooth;

    /// Regular polygon vertices approximating a circle.
    fn ring_vertices(r: f64, count: usize) -> Vec<Point> {
        (0..count)
            .map(|i| {
                let a = i as f64 / count as f64 * std::f64::consts::TAU;
                Point::new(r + r * a.cos(), r + r * a.sin())
            })
            .collect()
    }

    #[test]
    fn all_corner_curve_passes_through_unchanged() {
        let square = vec![
            Point::new(0.0, 0.0),
            Point::new(0.0, 20.0),
            Point::new(20.0, 20.0),
            Point::new(20.0, 0.0),
        ];
        let curve = smooth(&square, 1.0);
        assert_eq!(curve.count_tag(SegTag::Corner), 4);
        let opt = optimize(&curve, 0.2).unwrap();
        assert_eq!(opt.n, 4);
        assert_eq!(opt.count_tag(SegTag::Corner), 4);
    }

    #[test]
    fn smooth_ring_merges_segments() {
        let curve = smooth(&ring_vertices(60.0, 24), 1.0);
        assert_eq!(curve.count_tag(SegTag::Curve), 24);
        let opt = optimize(&curve, 0.2).unwrap();
        assert!(opt.n < 24, "expected merges, got {} segments", opt.n);
        assert_eq!(opt.count_tag(SegTag::Corner), 0);
    }

    #[test]
    fn merged_curve_stays_within_tolerance_of_vertices() {
        let tolerance = 0.2;
        let vertices = ring_vertices(60.0, 24);
        let curve = smooth(&vertices, 1.0);
        let opt = optimize(&curve, tolerance).unwrap();

        // Every original vertex should lie close to the optimized outline.
        // Sample the optimized curve densely and measure nearest distance.
        let mut samples = Vec::new();
        for seg in 0..opt.n {
            let start = opt.c[pmod(seg as isize - 1, opt.n) * 3 + 2];
            match opt.tag[seg] {
                SegTag::Curve => {
                    for step in 0..=64 {
                        let t = step as f64 / 64.0;
                        samples.push(bezier(
                            t,
                            start,
                            opt.c[seg * 3],
                            opt.c[seg * 3 + 1],
                            opt.c[seg * 3 + 2],
                        ));
                    }
                }
                SegTag::Corner => {
                    samples.push(opt.c[seg * 3 + 1]);
                    samples.push(opt.c[seg * 3 + 2]);
                }
            }
        }
        for v in &vertices {
            let min = samples
                .iter()
                .map(|s| ddist(*s, *v))
                .fold(f64::INFINITY, f64::min);
            // The smoothed curve itself passes mid-edge, so allow the
            // vertex-to-curve sag on top of the merge tolerance.
            assert!(min < 1.5 + tolerance, "vertex {:?} drifted {}", v, min);
        }
    }

    #[test]
    fn beta_blends_neighbor_parameters() {
        let curve = smooth(&ring_vertices(60.0, 16), 1.0);
        let opt = optimize(&curve, 0.2).unwrap();
        for i in 0..opt.n {
            assert!((0.0..=1.0).contains(&opt.beta[i]), "beta {}", opt.beta[i]);
        }
    }
}
