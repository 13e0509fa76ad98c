//! Path decomposition: scan the binary bitmap, trace the contour of every
//! connected region, and erase each region with an XOR so nested holes are
//! discovered on later passes.
//!
//! Contours are traced on the pixel-corner grid. Each step moves one unit in
//! a cardinal direction; the enclosed area accumulates as the walk proceeds.
//! Ambiguous 2x2 crossings are resolved by the configured turn policy.

use crate::bitmap::Bitmap;
use crate::config::TurnPolicy;

/// A closed contour on the pixel-corner grid.
#[derive(Debug, Clone)]
pub struct PixelPath {
    /// Points in pixel-corner coordinates, one unit cardinal step apart.
    pub points: Vec<(i32, i32)>,
    /// Enclosed area in pixels.
    pub area: i64,
    /// +1 for an outer boundary, -1 for a hole.
    pub sign: i8,
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
    /// Index of the smallest enclosing path, if any.
    pub parent: Option<usize>,
    /// Indexes of directly enclosed paths.
    pub children: Vec<usize>,
}

/// Decompose a binary bitmap into contour paths.
///
/// Scans in raster order; every hit starts a contour trace followed by an
/// XOR erase of the enclosed region, which flips holes to foreground so the
/// scan discovers them later. Regions of `turd_size` pixels or fewer are
/// dropped. The returned paths carry parent/child links forming the
/// containment tree.
pub fn decompose(map: &Bitmap, turd_size: u32, policy: TurnPolicy) -> Vec<PixelPath> {
    let mut work = map.clone();
    let mut paths = Vec::new();
    let (mut x, mut y) = (0u32, 0u32);

    while let Some((fx, fy)) = work.find_next(x, y) {
        let path = find_path(&work, map, fx as i32, fy as i32, policy);
        xor_path(&mut work, &path);
        if path.area > turd_size as i64 {
            paths.push(path);
        }
        // Resume just past the entry point.
        if fx + 1 < work.width {
            x = fx + 1;
            y = fy;
        } else {
            x = 0;
            y = fy + 1;
        }
    }

    build_tree(&mut paths);
    paths
}

/// Trace one closed contour starting at the top-left corner of pixel
/// (x0, y0), walking the edge between set and clear pixels of `work`.
///
/// The sign comes from the pristine map: a region discovered after its
/// enclosing region was erased is a hole and reads clear there.
fn find_path(work: &Bitmap, pristine: &Bitmap, x0: i32, y0: i32, policy: TurnPolicy) -> PixelPath {
    let sign: i8 = if pristine.get(x0, y0) { 1 } else { -1 };

    let mut points = Vec::new();
    let (mut x, mut y) = (x0, y0);
    let (mut dirx, mut diry) = (0i32, 1i32);
    let mut area: i64 = 0;
    let (mut min_x, mut max_x) = (x0, x0);
    let (mut min_y, mut max_y) = (y0, y0);

    loop {
        points.push((x, y));
        min_x = min_x.min(x);
        max_x = max_x.max(x);
        min_y = min_y.min(y);
        max_y = max_y.max(y);

        x += dirx;
        y += diry;
        area -= x as i64 * diry as i64;

        if x == x0 && y == y0 {
            break;
        }

        // The two pixels flanking the edge about to be crossed. The offset
        // expressions are exact: dirx + diry is always odd, so the
        // numerators are even.
        let l = work.get(x + (dirx + diry - 1) / 2, y + (diry - dirx - 1) / 2);
        let r = work.get(x + (dirx - diry - 1) / 2, y + (diry + dirx - 1) / 2);

        if r && !l {
            // Ambiguous crossing: the turn policy decides.
            let turn_right = match policy {
                TurnPolicy::Right => true,
                TurnPolicy::Left => false,
                TurnPolicy::Black => sign > 0,
                TurnPolicy::White => sign < 0,
                TurnPolicy::Majority => majority(work, x, y),
                TurnPolicy::Minority => !majority(work, x, y),
            };
            if turn_right {
                (dirx, diry) = (-diry, dirx);
            } else {
                (dirx, diry) = (diry, -dirx);
            }
        } else if r {
            (dirx, diry) = (-diry, dirx);
        } else if !l {
            (dirx, diry) = (diry, -dirx);
        }
    }

    PixelPath {
        points,
        area,
        sign,
        min_x,
        min_y,
        max_x,
        max_y,
        parent: None,
        children: Vec::new(),
    }
}

/// Sample square rings of radius 2..4 around (x, y) and report whether set
/// pixels outnumber clear ones on the first unbalanced ring. A full tie
/// falls through to a position-derived deterministic bit so the same
/// coordinate always resolves the same way.
fn majority(bm: &Bitmap, x: i32, y: i32) -> bool {
    for i in 2..5 {
        let mut ct = 0i32;
        for a in (-i + 1)..i {
            ct += if bm.get(x + a, y + i - 1) { 1 } else { -1 };
            ct += if bm.get(x + i - 1, y + a - 1) { 1 } else { -1 };
            ct += if bm.get(x + a - 1, y - i) { 1 } else { -1 };
            ct += if bm.get(x - i, y + a) { 1 } else { -1 };
        }
        if ct > 0 {
            return true;
        } else if ct < 0 {
            return false;
        }
    }
    detrand(x, y)
}

/// Deterministic pseudo-random bit derived from (x, y) alone.
fn detrand(x: i32, y: i32) -> bool {
    let z = ((x as u32).wrapping_mul(0x04b3_e375) ^ y as u32).wrapping_mul(0x05a8_ef93);
    z.count_ones() & 1 == 1
}

/// Erase the region enclosed by `path`: for every vertical step, XOR the
/// row between the step's column and the path's right extent. Each interior
/// pixel is flipped an odd number of times, everything outside an even
/// number.
pub(crate) fn xor_path(work: &mut Bitmap, path: &PixelPath) {
    let mut y1 = path.points[0].1;
    for &(x, y) in &path.points[1..] {
        if y != y1 {
            work.flip_range(y1.min(y), x, path.max_x);
            y1 = y;
        }
    }
}

/// Link every path to the smallest path enclosing it.
fn build_tree(paths: &mut [PixelPath]) {
    for i in 0..paths.len() {
        // The entry pixel's center is strictly inside the region.
        let (ex, ey) = paths[i].points[0];
        let px = ex as f64 + 0.5;
        let py = ey as f64 + 0.5;

        let mut parent: Option<usize> = None;
        for j in 0..paths.len() {
            if i == j {
                continue;
            }
            let cand = &paths[j];
            if cand.area <= paths[i].area
                || px < cand.min_x as f64
                || px > cand.max_x as f64
                || py < cand.min_y as f64
                || py > cand.max_y as f64
            {
                continue;
            }
            if contains(&cand.points, px, py)
                && parent.map_or(true, |p| cand.area < paths[p].area)
            {
                parent = Some(j);
            }
        }
        paths[i].parent = parent;
        if let Some(p) = parent {
            paths[p].children.push(i);
        }
    }
}

/// Even-odd ray cast. Edges are unit cardinal segments, so a test point at
/// a pixel center never meets a vertex.
fn contains(poly: &[(i32, i32)], px: f64, py: f64) -> bool {
    let mut inside = false;
    let n = poly.len();
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (poly[i].0 as f64, poly[i].1 as f64);
        let (xj, yj) = (poly[j].0 as f64, poly[j].1 as f64);
        if (yi > py) != (yj > py) && px < (xj - xi) * (py - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bitmap_from_rows(rows: &[&str]) -> Bitmap {
        let h = rows.len() as u32;
        let w = rows[0].len() as u32;
        let mut bm = Bitmap::new(w, h);
        for (y, row) in rows.iter().enumerate() {
            for (x, ch) in row.chars().enumerate() {
                if ch == '#' {
                    bm.set(x as i32, y as i32);
                }
            }
        }
        bm
    }

    /// Twice the signed shoelace area of a closed integer polygon.
    fn shoelace2(points: &[(i32, i32)]) -> i64 {
        let n = points.len();
        let mut sum = 0i64;
        for i in 0..n {
            let (x1, y1) = points[i];
            let (x2, y2) = points[(i + 1) % n];
            sum += x1 as i64 * y2 as i64 - x2 as i64 * y1 as i64;
        }
        sum
    }

    #[test]
    fn blank_bitmap_yields_no_paths() {
        let bm = Bitmap::new(10, 10);
        assert!(decompose(&bm, 2, TurnPolicy::Minority).is_empty());
    }

    #[test]
    fn single_square_region() {
        let bm = bitmap_from_rows(&[
            "........",
            ".####...",
            ".####...",
            ".####...",
            ".####...",
            "........",
            "........",
            "........",
        ]);
        let paths = decompose(&bm, 2, TurnPolicy::Minority);
        assert_eq!(paths.len(), 1);
        let p = &paths[0];
        assert_eq!(p.sign, 1);
        assert_eq!(p.area, 16);
        assert_eq!(p.points.len(), 16);
        assert_eq!(p.points.len() % 2, 0);
        assert_eq!(shoelace2(&p.points), -2 * p.area);
        assert!(p.parent.is_none());
    }

    #[test]
    fn single_pixel_is_discarded_by_turdsize() {
        let mut bm = Bitmap::new(5, 5);
        bm.set(2, 2);
        assert!(decompose(&bm, 2, TurnPolicy::Minority).is_empty());
        assert_eq!(decompose(&bm, 0, TurnPolicy::Minority).len(), 1);
    }

    #[test]
    fn ring_produces_hole_with_parent_link() {
        let bm = bitmap_from_rows(&[
            "..........",
            ".######...",
            ".######...",
            ".##..##...",
            ".##..##...",
            ".######...",
            ".######...",
            "..........",
            "..........",
            "..........",
        ]);
        let paths = decompose(&bm, 0, TurnPolicy::Minority);
        assert_eq!(paths.len(), 2);
        let outer = &paths[0];
        let hole = &paths[1];
        assert_eq!(outer.sign, 1);
        assert_eq!(outer.area, 36);
        assert_eq!(hole.sign, -1);
        assert_eq!(hole.area, 4);
        assert_eq!(hole.parent, Some(0));
        assert_eq!(outer.children, vec![1]);
    }

    #[test]
    fn checkerboard_majority_gives_two_unit_paths() {
        let bm = bitmap_from_rows(&["#.", ".#"]);
        let paths = decompose(&bm, 0, TurnPolicy::Majority);
        assert_eq!(paths.len(), 2);
        for p in &paths {
            assert_eq!(p.sign, 1);
            assert_eq!(p.area, 1);
            assert!(p.children.is_empty());
        }
    }

    #[test]
    fn detrand_is_deterministic() {
        assert_eq!(detrand(17, 23), detrand(17, 23));
    }

    // Keep a tiny deterministic generator local to the tests.
    fn xorshift(state: &mut u32) -> u32 {
        let mut x = *state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        *state = x;
        x
    }

    fn random_bitmap(w: u32, h: u32, seed: u32) -> Bitmap {
        let mut bm = Bitmap::new(w, h);
        let mut state = seed;
        for y in 0..h {
            for x in 0..w {
                if xorshift(&mut state) & 1 == 1 {
                    bm.set(x as i32, y as i32);
                }
            }
        }
        bm
    }

    #[test]
    fn every_path_area_matches_its_polygon() {
        for seed in [1u32, 0xdead_beef, 42] {
            let bm = random_bitmap(24, 24, seed);
            for p in decompose(&bm, 0, TurnPolicy::Minority) {
                assert_eq!(shoelace2(&p.points), -2 * p.area, "seed {}", seed);
                assert!(p.points.len() >= 4);
                assert_eq!(p.points.len() % 2, 0);
            }
        }
    }

    #[test]
    fn erasing_all_paths_blanks_the_scratch_bitmap() {
        for seed in [7u32, 99, 123456] {
            let bm = random_bitmap(24, 24, seed);
            // With turd_size 0 every region is traced; re-applying each
            // path's erase to a fresh copy must cancel the image exactly.
            let paths = decompose(&bm, 0, TurnPolicy::Minority);
            let mut scratch = bm.clone();
            for p in &paths {
                xor_path(&mut scratch, p);
            }
            assert!(scratch.is_blank(), "seed {}", seed);
        }
    }

    #[test]
    fn turn_policy_does_not_change_covered_pixels() {
        let policies = [
            TurnPolicy::Black,
            TurnPolicy::White,
            TurnPolicy::Left,
            TurnPolicy::Right,
            TurnPolicy::Minority,
            TurnPolicy::Majority,
        ];
        for seed in [3u32, 0xc0ffee] {
            let bm = random_bitmap(20, 20, seed);
            // The union of enclosed pixels is the original foreground for
            // every policy; reconstruct via the XOR erase.
            let reference: Vec<u64> = {
                let paths = decompose(&bm, 0, policies[0]);
                let mut fill = Bitmap::new(20, 20);
                for p in &paths {
                    xor_path(&mut fill, p);
                }
                (0..20)
                    .map(|y| (0..20).map(|x| (fill.get(x, y) as u64) << x).sum())
                    .collect()
            };
            for &policy in &policies[1..] {
                let paths = decompose(&bm, 0, policy);
                let mut fill = Bitmap::new(20, 20);
                for p in &paths {
                    xor_path(&mut fill, p);
                }
                let rows: Vec<u64> = (0..20)
                    .map(|y| (0..20).map(|x| (fill.get(x, y) as u64) << x).sum())
                    .collect();
                assert_eq!(rows, reference, "seed {} policy {:?}", seed, policy);
            }
        }
    }
}
