//! Optimal polygon approximation.
//!
//! Four stages, each feeding the next:
//!
//! 1. **Prefix sums** (`calc_sums`) — O(1) line-fit statistics for any
//!    cyclic sub-range of the contour.
//! 2. **Longest straight subpath** (`calc_lon`) — for each vertex, the
//!    farthest vertex reachable by a single straight segment, found by
//!    propagating an angular constraint corridor.
//! 3. **Best polygon** (`best_polygon`) — shortest-path DP over the `lon`
//!    reachability graph, with the RMS line-fit penalty breaking ties
//!    between equal segment counts.
//! 4. **Vertex adjustment** (`adjust_vertices`) — sub-pixel refinement of
//!    each polygon corner by minimizing a quadratic form built from the two
//!    incident least-squares line fits, constrained to the unit square
//!    around the original corner.

use kurbo::Point;

use crate::geom::{cyclic, pmod, quadform, sign, xprod, Quad};

/// Prefix sum accumulator for O(1) line-fit statistics.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Sums {
    x: f64,
    y: f64,
    xy: f64,
    x2: f64,
    y2: f64,
}

/// Prefix sums of the contour points, offset by the first point so the
/// quadratic terms stay small. `sums[0]` is zero, `sums[n]` the total.
pub(crate) fn calc_sums(pt: &[(i32, i32)]) -> Vec<Sums> {
    let n = pt.len();
    let x0 = pt[0].0;
    let y0 = pt[0].1;

    let mut sums = vec![Sums::default(); n + 1];
    for i in 0..n {
        let x = (pt[i].0 - x0) as f64;
        let y = (pt[i].1 - y0) as f64;
        sums[i + 1] = Sums {
            x: sums[i].x + x,
            y: sums[i].y + y,
            xy: sums[i].xy + x * y,
            x2: sums[i].x2 + x * x,
            y2: sums[i].y2 + y * y,
        };
    }
    sums
}

/// For each vertex i, the farthest cyclic index reachable by a straight
/// segment starting at i.
///
/// Walks forward from every vertex keeping two integer constraint vectors
/// that bound the admissible directions. A vertex stops the walk when the
/// path has stepped in all four cardinal directions, when it leaves the
/// corridor, or when the walk would wrap past its own start. The final
/// passes make `lon` monotone in cyclic order.
pub(crate) fn calc_lon(pt: &[(i32, i32)]) -> Vec<usize> {
    let n = pt.len();
    let mut pivk = vec![0usize; n];
    let mut nc = vec![0usize; n];
    let mut lon = vec![0usize; n];

    // nc[i]: the next direction change at or after i. Adjacent points
    // differ in exactly one coordinate, so k never reaches n here.
    let mut k = 0usize;
    for i in (0..n).rev() {
        if pt[i].0 != pt[k].0 && pt[i].1 != pt[k].1 {
            k = i + 1;
        }
        nc[i] = k;
    }

    for i in (0..n).rev() {
        let mut ct = [0i32; 4];
        let i1 = (i + 1) % n;
        let dir = ((3 + 3 * (pt[i1].0 - pt[i].0) + (pt[i1].1 - pt[i].1)) / 2) as usize;
        ct[dir] += 1;

        let mut constraint = [(0i32, 0i32); 2];
        let mut k = nc[i];
        let mut k1 = i;
        let mut found = false;

        loop {
            let dir = ((3 + 3 * sign(pt[k].0 - pt[k1].0) + sign(pt[k].1 - pt[k1].1)) / 2) as usize;
            ct[dir] += 1;

            if ct[0] > 0 && ct[1] > 0 && ct[2] > 0 && ct[3] > 0 {
                pivk[i] = k1;
                found = true;
                break;
            }

            let cur = (pt[k].0 - pt[i].0, pt[k].1 - pt[i].1);
            if xprod(constraint[0], cur) < 0 || xprod(constraint[1], cur) > 0 {
                break;
            }

            if cur.0.abs() > 1 || cur.1.abs() > 1 {
                let off = (
                    cur.0 + if cur.1 >= 0 && (cur.1 > 0 || cur.0 < 0) { 1 } else { -1 },
                    cur.1 + if cur.0 <= 0 && (cur.0 < 0 || cur.1 < 0) { 1 } else { -1 },
                );
                if xprod(constraint[0], off) >= 0 {
                    constraint[0] = off;
                }
                let off = (
                    cur.0 + if cur.1 <= 0 && (cur.1 < 0 || cur.0 < 0) { 1 } else { -1 },
                    cur.1 + if cur.0 >= 0 && (cur.0 > 0 || cur.1 < 0) { 1 } else { -1 },
                );
                if xprod(constraint[1], off) <= 0 {
                    constraint[1] = off;
                }
            }

            k1 = k;
            k = nc[k1];
            if !cyclic(k, i, k1) {
                break;
            }
        }

        if !found {
            // The corridor was violated between k1 and k; interpolate the
            // exact number of unit steps that still fit.
            let dk = (sign(pt[k].0 - pt[k1].0), sign(pt[k].1 - pt[k1].1));
            let cur = (pt[k1].0 - pt[i].0, pt[k1].1 - pt[i].1);
            let a = xprod(constraint[0], cur);
            let b = xprod(constraint[0], dk);
            let c = xprod(constraint[1], cur);
            let d = xprod(constraint[1], dk);

            let mut j: i64 = 10_000_000;
            if b < 0 {
                j = a.div_euclid(-b);
            }
            if d > 0 {
                j = j.min((-c).div_euclid(d));
            }
            pivk[i] = pmod(k1 as isize + j as isize, n);
        }
    }

    let mut j = pivk[n - 1];
    lon[n - 1] = j;
    for i in (0..n - 1).rev() {
        if cyclic(i + 1, pivk[i], j) {
            j = pivk[i];
        }
        lon[i] = j;
    }

    let mut i = n - 1;
    while cyclic(pmod(i as isize + 1, n), j, lon[i]) {
        lon[i] = j;
        if i == 0 {
            break;
        }
        i -= 1;
    }

    lon
}

/// RMS orthogonal deviation of the points between cyclic indices i and j
/// from the straight segment joining them. `j >= n` denotes a wrapped
/// range. O(1) via the prefix sums.
pub(crate) fn penalty3(pt: &[(i32, i32)], sums: &[Sums], i: usize, j: usize) -> f64 {
    let n = pt.len();
    let (j, r) = if j >= n { (j - n, 1.0) } else { (j, 0.0) };

    let x = sums[j + 1].x - sums[i].x + r * sums[n].x;
    let y = sums[j + 1].y - sums[i].y + r * sums[n].y;
    let x2 = sums[j + 1].x2 - sums[i].x2 + r * sums[n].x2;
    let xy = sums[j + 1].xy - sums[i].xy + r * sums[n].xy;
    let y2 = sums[j + 1].y2 - sums[i].y2 + r * sums[n].y2;
    let k = (j as isize + 1 - i as isize) as f64 + r * n as f64;

    let x0 = pt[0].0 as f64;
    let y0 = pt[0].1 as f64;
    let px = (pt[i].0 + pt[j].0) as f64 / 2.0 - x0;
    let py = (pt[i].1 + pt[j].1) as f64 / 2.0 - y0;
    let ey = (pt[j].0 - pt[i].0) as f64;
    let ex = -((pt[j].1 - pt[i].1) as f64);

    let a = (x2 - 2.0 * x * px) / k + px * px;
    let b = (xy - x * py - y * px) / k + px * py;
    let c = (y2 - 2.0 * y * py) / k + py * py;

    let s = ex * ex * a + 2.0 * ex * ey * b + ey * ey * c;
    s.max(0.0).sqrt()
}

/// Choose the polygon vertices: the fewest segments first, the lowest
/// accumulated `penalty3` among equal counts. Returns indices into the
/// contour, strictly cyclically increasing.
pub(crate) fn best_polygon(pt: &[(i32, i32)], lon: &[usize], sums: &[Sums]) -> Vec<usize> {
    let n = pt.len();

    // clip0[i]: the furthest vertex a segment from i may reach.
    let mut clip0 = vec![0usize; n];
    for (i, clip) in clip0.iter_mut().enumerate() {
        let mut c = pmod(lon[pmod(i as isize - 1, n)] as isize - 1, n);
        if c == i {
            c = (i + 1) % n;
        }
        *clip = if c < i { n } else { c };
    }

    // clip1[j]: the earliest vertex from which j is reachable.
    let mut clip1 = vec![0usize; n + 1];
    {
        let mut j = 1usize;
        for (i, &clip) in clip0.iter().enumerate() {
            while j <= clip {
                clip1[j] = i;
                j += 1;
            }
        }
    }

    // seg0: greedy forward walk, giving the minimal segment count m.
    let mut seg0 = vec![0usize; n + 1];
    let m;
    {
        let mut i = 0usize;
        let mut j = 0usize;
        while i < n {
            seg0[j] = i;
            i = clip0[i];
            j += 1;
        }
        seg0[j] = n;
        m = j;
    }

    // seg1: the same walk backwards from n.
    let mut seg1 = vec![0usize; n + 1];
    {
        let mut i = n;
        for j in (1..=m).rev() {
            seg1[j] = i;
            i = clip1[i];
        }
        seg1[0] = 0;
    }

    // DP over vertices reachable in exactly j segments; ties on segment
    // count resolved by cumulative penalty.
    let mut pen = vec![0.0f64; n + 1];
    let mut prev = vec![0usize; n + 1];
    for j in 1..=m {
        for i in seg1[j]..=seg0[j] {
            let mut best = -1.0f64;
            for k in (clip1[i]..=seg0[j - 1]).rev() {
                let thispen = penalty3(pt, sums, k, i) + pen[k];
                if best < 0.0 || thispen < best {
                    prev[i] = k;
                    best = thispen;
                }
            }
            pen[i] = best;
        }
    }

    let mut po = vec![0usize; m];
    let mut i = n;
    for slot in po.iter_mut().rev() {
        i = prev[i];
        *slot = i;
    }
    po
}

/// Refine polygon corners to sub-pixel positions.
///
/// Each corner minimizes the sum of squared distances to the least-squares
/// lines of its two incident segments, encoded as a 3x3 quadratic form.
/// The minimizer is constrained to the unit square centered on the original
/// corner; when the unconstrained optimum falls outside, the four edges and
/// four corners of the square are searched instead.
pub(crate) fn adjust_vertices(pt: &[(i32, i32)], po: &[usize], sums: &[Sums]) -> Vec<Point> {
    let n = pt.len();
    let m = po.len();
    let x0 = pt[0].0 as f64;
    let y0 = pt[0].1 as f64;

    let mut ctr = vec![Point::ZERO; m];
    let mut dir = vec![Point::ZERO; m];
    let mut q: Vec<Quad> = vec![[[0.0; 3]; 3]; m];

    for i in 0..m {
        let j = po[(i + 1) % m];
        let j = pmod(j as isize - po[i] as isize, n) + po[i];
        let (c, d) = point_slope(pt, sums, po[i] as isize, j as isize);
        ctr[i] = c;
        dir[i] = d;
    }

    for i in 0..m {
        let d = dir[i].x * dir[i].x + dir[i].y * dir[i].y;
        if d != 0.0 {
            let v = [
                dir[i].y,
                -dir[i].x,
                dir[i].x * ctr[i].y - dir[i].y * ctr[i].x,
            ];
            for l in 0..3 {
                for k in 0..3 {
                    q[i][l][k] = v[l] * v[k] / d;
                }
            }
        }
    }

    let mut vertices = vec![Point::ZERO; m];
    for i in 0..m {
        let s = Point::new(pt[po[i]].0 as f64 - x0, pt[po[i]].1 as f64 - y0);
        let j = pmod(i as isize - 1, m);

        let mut qq: Quad = [[0.0; 3]; 3];
        for l in 0..3 {
            for k in 0..3 {
                qq[l][k] = q[j][l][k] + q[i][l][k];
            }
        }

        let w;
        loop {
            let det = qq[0][0] * qq[1][1] - qq[0][1] * qq[1][0];
            if det != 0.0 {
                w = Point::new(
                    (-qq[0][2] * qq[1][1] + qq[1][2] * qq[0][1]) / det,
                    (qq[0][2] * qq[1][0] - qq[1][2] * qq[0][0]) / det,
                );
                break;
            }
            // Singular: the incident lines are parallel. Add a line
            // through s orthogonal to them and solve again.
            let (vx, vy) = if qq[0][0] > qq[1][1] {
                (-qq[0][1], qq[0][0])
            } else if qq[1][1] != 0.0 {
                (-qq[1][1], qq[1][0])
            } else {
                (1.0, 0.0)
            };
            let d = vx * vx + vy * vy;
            let v = [vx, vy, -vy * s.y - vx * s.x];
            for l in 0..3 {
                for k in 0..3 {
                    qq[l][k] += v[l] * v[k] / d;
                }
            }
        }

        if (w.x - s.x).abs() <= 0.5 && (w.y - s.y).abs() <= 0.5 {
            vertices[i] = Point::new(w.x + x0, w.y + y0);
            continue;
        }

        // Constrained minimum on the unit square around s.
        let mut min = quadform(&qq, s);
        let mut xmin = s.x;
        let mut ymin = s.y;

        if qq[0][0] != 0.0 {
            for z in 0..2 {
                let wy = s.y - 0.5 + z as f64;
                let wx = -(qq[0][1] * wy + qq[0][2]) / qq[0][0];
                if (wx - s.x).abs() <= 0.5 {
                    let cand = quadform(&qq, Point::new(wx, wy));
                    if cand < min {
                        min = cand;
                        xmin = wx;
                        ymin = wy;
                    }
                }
            }
        }

        if qq[1][1] != 0.0 {
            for z in 0..2 {
                let wx = s.x - 0.5 + z as f64;
                let wy = -(qq[1][0] * wx + qq[1][2]) / qq[1][1];
                if (wy - s.y).abs() <= 0.5 {
                    let cand = quadform(&qq, Point::new(wx, wy));
                    if cand < min {
                        min = cand;
                        xmin = wx;
                        ymin = wy;
                    }
                }
            }
        }

        for l in 0..2 {
            for k in 0..2 {
                let wp = Point::new(s.x - 0.5 + l as f64, s.y - 0.5 + k as f64);
                let cand = quadform(&qq, wp);
                if cand < min {
                    min = cand;
                    xmin = wp.x;
                    ymin = wp.y;
                }
            }
        }

        vertices[i] = Point::new(xmin + x0, ymin + y0);
    }

    vertices
}

/// Least-squares line through the cyclic contour range [i, j]: centroid and
/// principal direction (eigenvector of the larger covariance eigenvalue).
/// Indices may lie outside [0, n); wraps adjust the sum totals.
fn point_slope(pt: &[(i32, i32)], sums: &[Sums], i: isize, j: isize) -> (Point, Point) {
    let n = pt.len();
    let ni = n as isize;
    let (mut i, mut j) = (i, j);
    let mut r: f64 = 0.0;

    while j >= ni {
        j -= ni;
        r += 1.0;
    }
    while i >= ni {
        i -= ni;
        r -= 1.0;
    }
    while j < 0 {
        j += ni;
        r -= 1.0;
    }
    while i < 0 {
        i += ni;
        r += 1.0;
    }
    let (i, j) = (i as usize, j as usize);

    let x = sums[j + 1].x - sums[i].x + r * sums[n].x;
    let y = sums[j + 1].y - sums[i].y + r * sums[n].y;
    let x2 = sums[j + 1].x2 - sums[i].x2 + r * sums[n].x2;
    let xy = sums[j + 1].xy - sums[i].xy + r * sums[n].xy;
    let y2 = sums[j + 1].y2 - sums[i].y2 + r * sums[n].y2;
    let k = (j as isize + 1 - i as isize) as f64 + r * n as f64;

    let ctr = Point::new(x / k, y / k);

    let mut a = (x2 - x * x / k) / k;
    let b = (xy - x * y / k) / k;
    let mut c = (y2 - y * y / k) / k;

    // Larger eigenvalue of the covariance matrix; its eigenvector is the
    // direction of maximum variance.
    let lambda2 = (a + c + ((a - c).powi(2) + 4.0 * b * b).sqrt()) / 2.0;
    a -= lambda2;
    c -= lambda2;

    let mut dir = Point::ZERO;
    if a.abs() >= c.abs() {
        let l = (a * a + b * b).sqrt();
        if l != 0.0 {
            dir = Point::new(-b / l, a / l);
        }
    } else {
        let l = (c * c + b * b).sqrt();
        if l != 0.0 {
            dir = Point::new(-c / l, b / l);
        }
    }

    (ctr, dir)
}
