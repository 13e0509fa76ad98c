//! Pixel storage: the 8-bit luminance grid and the word-packed binary bitmap.
//!
//! `LumaImage` holds the decoded image reduced to one luminance byte per
//! pixel. `Bitmap` is the 1-bit working grid the contour tracer runs on,
//! packed into 64-bit words so the XOR erase and the next-pixel scan touch
//! a word at a time instead of a pixel at a time.

use image::DynamicImage;

/// Rec. 709 luma weights.
const LUMA_R: f64 = 0.2126;
const LUMA_G: f64 = 0.7152;
const LUMA_B: f64 = 0.0722;

/// Luminance of an (r, g, b) triple, rounded to 0..255.
pub fn luminance(r: f64, g: f64, b: f64) -> u8 {
    (LUMA_R * r + LUMA_G * g + LUMA_B * b).round().clamp(0.0, 255.0) as u8
}

/// A two-dimensional grid of 8-bit luminance values.
#[derive(Debug, Clone)]
pub struct LumaImage {
    pub width: u32,
    pub height: u32,
    data: Vec<u8>,
}

impl LumaImage {
    /// Build from raw luminance bytes in row-major order.
    ///
    /// Returns `None` when the buffer length does not match the dimensions.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if data.len() != (width as usize) * (height as usize) {
            return None;
        }
        Some(LumaImage { width, height, data })
    }

    /// Build from a decoded image. Partially transparent pixels are
    /// composited over a white background before luminance extraction.
    pub fn from_dynamic(img: &DynamicImage) -> Self {
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        let mut data = Vec::with_capacity((width as usize) * (height as usize));
        for px in rgba.pixels() {
            let [r, g, b, a] = px.0;
            let opacity = a as f64 / 255.0;
            let rr = 255.0 + (r as f64 - 255.0) * opacity;
            let gg = 255.0 + (g as f64 - 255.0) * opacity;
            let bb = 255.0 + (b as f64 - 255.0) * opacity;
            data.push(luminance(rr, gg, bb));
        }
        LumaImage { width, height, data }
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.data[(y * self.width + x) as usize]
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Threshold into a binary bitmap. With `black_on_white`, luminance at
    /// or below the threshold is foreground; otherwise luminance strictly
    /// below the threshold is background.
    pub fn threshold_map(&self, threshold: f64, black_on_white: bool) -> Bitmap {
        let mut bm = Bitmap::new(self.width, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                let lum = self.get(x, y) as f64;
                let black = if black_on_white {
                    lum <= threshold
                } else {
                    lum >= threshold
                };
                if black {
                    bm.set(x as i32, y as i32);
                }
            }
        }
        bm
    }
}

const WORD_BITS: u32 = 64;

/// A two-dimensional grid of single-bit pixels packed into 64-bit words.
///
/// Bit `x & 63` of word `x / 64` in a row holds column `x` (LSB-first).
/// Bits beyond `width` in a row's last word are always zero, which lets
/// `find_next` trust whole-word emptiness tests.
#[derive(Debug, Clone)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    stride: u32,
    words: Vec<u64>,
}

impl Bitmap {
    pub fn new(width: u32, height: u32) -> Self {
        let stride = width.div_ceil(WORD_BITS);
        Bitmap {
            width,
            height,
            stride,
            words: vec![0u64; (stride as usize) * (height as usize)],
        }
    }

    /// Read the bit at (x, y). Out-of-range coordinates read 0.
    pub fn get(&self, x: i32, y: i32) -> bool {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return false;
        }
        let (x, y) = (x as u32, y as u32);
        let word = self.words[(y * self.stride + x / WORD_BITS) as usize];
        word >> (x % WORD_BITS) & 1 != 0
    }

    pub fn set(&mut self, x: i32, y: i32) {
        self.put(x, y, true);
    }

    pub fn clear(&mut self, x: i32, y: i32) {
        self.put(x, y, false);
    }

    /// Write the bit at (x, y). Out-of-range coordinates are ignored.
    pub fn put(&mut self, x: i32, y: i32, v: bool) {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return;
        }
        let (x, y) = (x as u32, y as u32);
        let idx = (y * self.stride + x / WORD_BITS) as usize;
        let mask = 1u64 << (x % WORD_BITS);
        if v {
            self.words[idx] |= mask;
        } else {
            self.words[idx] &= !mask;
        }
    }

    /// XOR every bit of row `y` in the column interval
    /// [min(x, xa), max(x, xa)), clamped to the row.
    pub fn flip_range(&mut self, y: i32, x: i32, xa: i32) {
        if y < 0 || y as u32 >= self.height {
            return;
        }
        let lo = x.min(xa).max(0) as u32;
        let hi = (x.max(xa) as u32).min(self.width);
        if lo >= hi {
            return;
        }
        let row = y as u32 * self.stride;
        let first = lo / WORD_BITS;
        let last = (hi - 1) / WORD_BITS;
        // Mask of bits >= lo%64, and of bits <= (hi-1)%64.
        let head = !0u64 << (lo % WORD_BITS);
        let tail = !0u64 >> (WORD_BITS - 1 - (hi - 1) % WORD_BITS);
        if first == last {
            self.words[(row + first) as usize] ^= head & tail;
        } else {
            self.words[(row + first) as usize] ^= head;
            for w in first + 1..last {
                self.words[(row + w) as usize] ^= !0u64;
            }
            self.words[(row + last) as usize] ^= tail;
        }
    }

    /// Find the next set bit at or after (x, y) in raster order
    /// (left to right within a row, rows top to bottom).
    pub fn find_next(&self, x: u32, y: u32) -> Option<(u32, u32)> {
        if y >= self.height {
            return None;
        }
        let mut row = y;
        let mut col = x.min(self.width);
        loop {
            let base = (row * self.stride) as usize;
            let mut w = col / WORD_BITS;
            while w < self.stride {
                let mut word = self.words[base + w as usize];
                if w == col / WORD_BITS {
                    word &= !0u64 << (col % WORD_BITS);
                }
                if word != 0 {
                    let bit = w * WORD_BITS + word.trailing_zeros();
                    if bit < self.width {
                        return Some((bit, row));
                    }
                }
                w += 1;
            }
            row += 1;
            if row >= self.height {
                return None;
            }
            col = 0;
        }
    }

    /// True when no bit is set.
    pub fn is_blank(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Number of set bits.
    pub fn count(&self) -> u64 {
        self.words.iter().map(|w| w.count_ones() as u64).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_is_bounds_checked() {
        let mut bm = Bitmap::new(10, 10);
        bm.set(3, 4);
        assert!(bm.get(3, 4));
        assert!(!bm.get(-1, 4));
        assert!(!bm.get(3, -1));
        assert!(!bm.get(10, 4));
        assert!(!bm.get(3, 10));
    }

    #[test]
    fn flip_range_crosses_word_boundaries() {
        let mut bm = Bitmap::new(200, 2);
        bm.flip_range(0, 10, 150);
        for x in 0..200 {
            assert_eq!(bm.get(x, 0), (10..150).contains(&x), "x = {}", x);
        }
        // Flipping the same range again restores the row.
        bm.flip_range(0, 150, 10);
        assert!(bm.is_blank());
    }

    #[test]
    fn flip_range_single_word() {
        let mut bm = Bitmap::new(64, 1);
        bm.flip_range(0, 5, 9);
        assert_eq!(bm.count(), 4);
        assert!(bm.get(5, 0) && bm.get(8, 0));
        assert!(!bm.get(4, 0) && !bm.get(9, 0));
    }

    #[test]
    fn find_next_scans_in_raster_order() {
        let mut bm = Bitmap::new(130, 4);
        bm.set(129, 1);
        bm.set(2, 3);
        assert_eq!(bm.find_next(0, 0), Some((129, 1)));
        assert_eq!(bm.find_next(129, 1), Some((129, 1)));
        assert_eq!(bm.find_next(130, 1), Some((2, 3)));
        assert_eq!(bm.find_next(3, 3), None);
    }

    #[test]
    fn threshold_map_sides() {
        let img = LumaImage::from_raw(3, 1, vec![10, 128, 250]).unwrap();
        let dark = img.threshold_map(128.0, true);
        assert!(dark.get(0, 0) && dark.get(1, 0) && !dark.get(2, 0));
        let bright = img.threshold_map(128.0, false);
        assert!(!bright.get(0, 0) && bright.get(1, 0) && bright.get(2, 0));
    }

    #[test]
    fn luminance_weights() {
        assert_eq!(luminance(255.0, 255.0, 255.0), 255);
        assert_eq!(luminance(0.0, 0.0, 0.0), 0);
        assert_eq!(luminance(255.0, 0.0, 0.0), 54); // 0.2126 * 255
    }
}
