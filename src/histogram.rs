//! Luminance histogram: multilevel Otsu thresholding, dominant color
//! lookup, and per-range statistics.
//!
//! The thresholding machinery works off a lazily built 256x256 lookup table
//! `H[a][b] = S(a..b)^2 / P(a..b)` (between-class weight of the histogram
//! segment a..b), so evaluating one k-tuple of thresholds costs k table
//! reads. The table itself is 256 KiB of f64 and is built at most once per
//! histogram.

use std::collections::HashMap;

use crate::bitmap::{luminance, LumaImage};

const COLOR_DEPTH: usize = 256;
const COLOR_RANGE_END: usize = COLOR_DEPTH - 1;

fn index(x: usize, y: usize) -> usize {
    COLOR_DEPTH * x + y
}

/// Which channel a histogram aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Channel {
    #[default]
    Luminance,
    Red,
    Green,
    Blue,
}

/// Statistics over the value levels of a histogram segment.
#[derive(Debug, Clone, Copy)]
pub struct LevelStats {
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub unique: u32,
}

/// Statistics over the pixel counts per level of a histogram segment.
#[derive(Debug, Clone, Copy)]
pub struct PixelsPerLevel {
    pub mean: f64,
    pub median: f64,
    pub peak: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct Stats {
    pub levels: LevelStats,
    pub pixels_per_level: PixelsPerLevel,
    pub pixels: u32,
}

/// 256-bin pixel-count histogram over an 8-bit channel.
#[derive(Debug, Clone)]
pub struct Histogram {
    data: [u32; COLOR_DEPTH],
    pub pixels: u32,
    sorted_indexes: Option<Vec<u8>>,
    lookup_table_h: Option<Vec<f64>>,
    stats_cache: HashMap<(u8, u8), Stats>,
}

impl Histogram {
    fn empty() -> Self {
        Histogram {
            data: [0; COLOR_DEPTH],
            pixels: 0,
            sorted_indexes: None,
            lookup_table_h: None,
            stats_cache: HashMap::new(),
        }
    }

    /// Aggregate a luminance grid.
    pub fn from_luma(img: &LumaImage) -> Self {
        let mut h = Histogram::empty();
        for &v in img.pixels() {
            h.data[v as usize] += 1;
        }
        h.pixels = img.pixels().len() as u32;
        h
    }

    /// Aggregate one channel of an RGBA image.
    pub fn from_rgba(img: &image::RgbaImage, channel: Channel) -> Self {
        let mut h = Histogram::empty();
        for px in img.pixels() {
            let [r, g, b, _] = px.0;
            let v = match channel {
                Channel::Red => r,
                Channel::Green => g,
                Channel::Blue => b,
                Channel::Luminance => luminance(r as f64, g as f64, b as f64),
            };
            h.data[v as usize] += 1;
        }
        h.pixels = img.width() * img.height();
        h
    }

    /// Raw count for one level.
    pub fn count_at(&self, level: u8) -> u32 {
        self.data[level as usize]
    }

    /// Color indexes sorted from least to most used, built once.
    fn sorted_indexes(&mut self) -> &[u8] {
        if self.sorted_indexes.is_none() {
            let mut idx: Vec<u8> = (0..=255).collect();
            idx.sort_by_key(|&i| self.data[i as usize]);
            self.sorted_indexes = Some(idx);
        }
        self.sorted_indexes.as_deref().unwrap()
    }

    /// Build lookup tables P (class probability), S (class mean weight) and
    /// derive H = S^2 / P, the between-class contribution of each segment.
    fn build_lookup_table(&mut self) {
        let total = self.pixels as f64;
        let mut p = vec![0.0f64; COLOR_DEPTH * COLOR_DEPTH];
        let mut s = vec![0.0f64; COLOR_DEPTH * COLOR_DEPTH];
        let mut h = vec![0.0f64; COLOR_DEPTH * COLOR_DEPTH];

        // Diagonal.
        for i in 1..COLOR_DEPTH {
            let idx = index(i, i);
            let tmp = self.data[i] as f64 / total;
            p[idx] = tmp;
            s[idx] = i as f64 * tmp;
        }

        // First row; row 0 stays zero.
        for i in 1..COLOR_DEPTH - 1 {
            let tmp = self.data[i + 1] as f64 / total;
            let idx = index(1, i);
            p[idx + 1] = p[idx] + tmp;
            s[idx + 1] = s[idx] + (i + 1) as f64 * tmp;
        }

        // Remaining rows derive from row 1.
        for i in 2..COLOR_DEPTH {
            for j in i + 1..COLOR_DEPTH {
                p[index(i, j)] = p[index(1, j)] - p[index(1, i - 1)];
                s[index(i, j)] = s[index(1, j)] - s[index(1, i - 1)];
            }
        }

        for i in 1..COLOR_DEPTH {
            for j in i + 1..COLOR_DEPTH {
                let idx = index(i, j);
                h[idx] = if p[idx] != 0.0 { s[idx] * s[idx] / p[idx] } else { 0.0 };
            }
        }

        self.lookup_table_h = Some(h);
    }

    /// Find `amount` thresholds in [level_min, level_max] maximizing the
    /// summed between-class weight. Brute-force enumeration of increasing
    /// tuples; interactive for amount <= 4, combinatorial beyond that.
    pub fn multilevel_thresholding(
        &mut self,
        amount: usize,
        level_min: Option<f64>,
        level_max: Option<f64>,
    ) -> Vec<u8> {
        let (level_min, level_max) = normalize_min_max(level_min, level_max);
        let amount = amount.min((level_max - level_min).saturating_sub(2));

        if amount < 1 {
            return vec![];
        }
        if amount > 4 {
            eprintln!("warning: computing {} thresholds may take a long time", amount);
        }

        if self.lookup_table_h.is_none() {
            self.build_lookup_table();
        }
        let h = self.lookup_table_h.as_deref().unwrap();

        struct Search<'a> {
            h: &'a [f64],
            level_max: usize,
            amount: usize,
            max_sig: f64,
            stops: Option<Vec<usize>>,
        }

        impl Search<'_> {
            fn run(&mut self, starting: usize, prev_variance: f64, indexes: &mut [usize], prev_depth: usize) {
                let sp = starting + 1;
                let depth = prev_depth + 1;
                for i in sp..=self.level_max - self.amount + prev_depth {
                    let variance = prev_variance + self.h[index(sp, i)];
                    indexes[depth - 1] = i;
                    if depth < self.amount {
                        self.run(i, variance, indexes, depth);
                    } else {
                        let variance = variance + self.h[index(i + 1, self.level_max)];
                        if self.max_sig < variance {
                            self.max_sig = variance;
                            self.stops = Some(indexes.to_vec());
                        }
                    }
                }
            }
        }

        let mut search = Search { h, level_max, amount, max_sig: 0.0, stops: None };
        let mut indexes = vec![0usize; amount];
        search.run(level_min, 0.0, &mut indexes, 0);

        search
            .stops
            .map(|v| v.into_iter().map(|i| i as u8).collect())
            .unwrap_or_default()
    }

    /// Single automatic threshold (multilevel Otsu with k = 1).
    pub fn auto_threshold(&mut self, level_min: Option<f64>, level_max: Option<f64>) -> Option<u8> {
        self.multilevel_thresholding(1, level_min, level_max).first().copied()
    }

    /// The dominant level in [level_min, level_max], summing `tolerance`
    /// adjacent bins around each candidate. Returns -1 when the segment is
    /// empty.
    pub fn dominant_color(
        &self,
        level_min: Option<f64>,
        level_max: Option<f64>,
        tolerance: u32,
    ) -> i32 {
        let (level_min, level_max) = normalize_min_max(level_min, level_max);
        let colors = &self.data;
        let mut dominant_index: i32 = -1;
        let mut dominant_value: i64 = -1;

        if level_min == level_max {
            return if colors[level_min] > 0 { level_min as i32 } else { -1 };
        }

        let tolerance = tolerance as i32;
        for i in level_min..=level_max {
            let mut tmp: i64 = 0;
            for j in (-tolerance).div_euclid(2)..tolerance {
                let idx = i as i32 + j;
                if (0..=COLOR_RANGE_END as i32).contains(&idx) {
                    tmp += colors[idx as usize] as i64;
                }
            }

            let sum_is_bigger = tmp > dominant_value;
            let sum_equal_but_center_bigger = tmp == dominant_value
                && (dominant_index < 0 || colors[i] > colors[dominant_index as usize]);

            if sum_is_bigger || sum_equal_but_center_bigger {
                dominant_index = i as i32;
                dominant_value = tmp;
            }
        }

        if dominant_value <= 0 {
            -1
        } else {
            dominant_index
        }
    }

    /// Statistics for the segment [level_min, level_max], cached per range.
    pub fn stats(&mut self, level_min: Option<f64>, level_max: Option<f64>) -> Stats {
        let (level_min, level_max) = normalize_min_max(level_min, level_max);
        let key = (level_min as u8, level_max as u8);
        if let Some(cached) = self.stats_cache.get(&key) {
            return *cached;
        }

        let mut pixels_total: u64 = 0;
        let mut values_combined: u64 = 0;
        let mut unique: u32 = 0;
        let mut peak: u32 = 0;

        for i in level_min..=level_max {
            let cnt = self.data[i];
            pixels_total += cnt as u64;
            values_combined += cnt as u64 * i as u64;
            if cnt > 0 {
                unique += 1;
            }
            peak = peak.max(cnt);
        }

        if pixels_total == 0 {
            let stats = Stats {
                levels: LevelStats { mean: f64::NAN, median: f64::NAN, std_dev: f64::NAN, unique: 0 },
                pixels_per_level: PixelsPerLevel { mean: f64::NAN, median: f64::NAN, peak: 0 },
                pixels: 0,
            };
            self.stats_cache.insert(key, stats);
            return stats;
        }

        let mean = values_combined as f64 / pixels_total as f64;
        let per_level_mean = if level_max > level_min {
            pixels_total as f64 / (level_max - level_min) as f64
        } else {
            f64::NAN
        };
        let per_level_median = if unique > 0 {
            pixels_total as f64 / unique as f64
        } else {
            f64::NAN
        };
        let median_pixel_index = pixels_total / 2;

        // Walk levels from least to most used; the level that crosses the
        // half-way pixel count is the median of the frequency distribution.
        let mut iterated: u64 = 0;
        let mut deviation_sum = 0.0;
        let mut median = f64::NAN;
        let data = self.data;
        for &idx in self.sorted_indexes() {
            let idx = idx as usize;
            if idx < level_min || idx > level_max {
                continue;
            }
            let count = data[idx];
            iterated += count as u64;
            deviation_sum += (idx as f64 - mean).powi(2) * count as f64;
            if median.is_nan() && iterated >= median_pixel_index {
                median = idx as f64;
            }
        }
        let std_dev = (deviation_sum / pixels_total as f64).sqrt();

        let stats = Stats {
            levels: LevelStats { mean, median, std_dev, unique },
            pixels_per_level: PixelsPerLevel {
                mean: per_level_mean,
                median: per_level_median,
                peak,
            },
            pixels: pixels_total as u32,
        };
        self.stats_cache.insert(key, stats);
        stats
    }
}

/// Clamp and round an optional level range, defaulting to [0, 255].
fn normalize_min_max(level_min: Option<f64>, level_max: Option<f64>) -> (usize, usize) {
    let min = level_min
        .map(|v| v.round().clamp(0.0, COLOR_RANGE_END as f64) as usize)
        .unwrap_or(0);
    let max = level_max
        .map(|v| v.round().clamp(0.0, COLOR_RANGE_END as f64) as usize)
        .unwrap_or(COLOR_RANGE_END);
    assert!(min <= max, "invalid level range {}..{}", min, max);
    (min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bimodal() -> Histogram {
        // 40% of pixels at level 30, 60% at level 200.
        let mut data = vec![30u8; 400];
        data.extend(std::iter::repeat(200).take(600));
        let img = LumaImage::from_raw(1000, 1, data).unwrap();
        Histogram::from_luma(&img)
    }

    #[test]
    fn auto_threshold_separates_bimodal_clusters() {
        // Between-class variance plateaus between fully separated modes;
        // the search keeps the first maximizer, i.e. the dark mode's edge.
        let mut h = bimodal();
        let t = h.auto_threshold(None, None).unwrap();
        assert!((30..200).contains(&t), "threshold {} does not separate the modes", t);
    }

    #[test]
    fn multilevel_thresholds_are_increasing() {
        let data: Vec<u8> = (0..=255).flat_map(|v| std::iter::repeat(v).take(4)).collect();
        let img = LumaImage::from_raw(1024, 1, data).unwrap();
        let mut h = Histogram::from_luma(&img);
        let stops = h.multilevel_thresholding(3, None, None);
        assert_eq!(stops.len(), 3);
        assert!(stops.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn thresholds_respect_segment_bounds() {
        let mut h = bimodal();
        let stops = h.multilevel_thresholding(2, Some(0.0), Some(100.0));
        for &s in &stops {
            assert!(s <= 100);
        }
    }

    #[test]
    fn dominant_color_picks_heaviest_window() {
        // Tolerance 1 sums bins i-1..i; the window at 51 (10 + 30) beats
        // the one at 52 (30 + 5).
        let mut data = vec![50u8; 10];
        data.extend(std::iter::repeat(51).take(30));
        data.extend(std::iter::repeat(52).take(5));
        let img = LumaImage::from_raw(45, 1, data).unwrap();
        let h = Histogram::from_luma(&img);
        assert_eq!(h.dominant_color(None, None, 1), 51);
        assert_eq!(h.dominant_color(Some(100.0), Some(200.0), 1), -1);
    }

    #[test]
    fn stats_mean_and_bounds() {
        let mut h = bimodal();
        let stats = h.stats(None, None);
        assert_eq!(stats.pixels, 1000);
        assert!((stats.levels.mean - 132.0).abs() < 1e-9); // 0.4*30 + 0.6*200
        assert_eq!(stats.levels.unique, 2);
        assert_eq!(stats.pixels_per_level.peak, 600);

        let empty = h.stats(Some(100.0), Some(150.0));
        assert_eq!(empty.pixels, 0);
        assert!(empty.levels.mean.is_nan());
    }

    #[test]
    fn stats_are_cached() {
        let mut h = bimodal();
        let a = h.stats(Some(0.0), Some(255.0));
        let b = h.stats(Some(0.0), Some(255.0));
        assert_eq!(a.pixels, b.pixels);
        assert_eq!(h.stats_cache.len(), 1);
    }
}
