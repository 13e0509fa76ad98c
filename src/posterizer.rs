//! Posterization: run the tracer at several luminance thresholds and stack
//! the results as semi-transparent layers.
//!
//! Threshold stops come from the histogram (multilevel Otsu), an equal
//! partition, or an explicit list. Each stop gets a fill intensity from the
//! configured strategy; layers are emitted back-to-front with a cumulative
//! opacity cascade so the stacked result reproduces the intended tones.

use crate::config::{
    PosterizerOptions, PosterizerParams, PotraceOptions, FillStrategy, RangeDistribution, Steps,
    COLOR_TRANSPARENT, THRESHOLD_AUTO,
};
use crate::error::Error;
use crate::potrace::Potrace;
use crate::svg;

/// One layer: a threshold and the fill intensity of everything darker
/// (or brighter) than it.
#[derive(Debug, Clone, Copy)]
struct ColorStop {
    value: f64,
    color_intensity: f64,
}

/// Widest final range that needs no extra detail stop.
const EXTRA_STOP_RANGE: f64 = 25.0;

/// Multi-threshold tracer built on [`Potrace`].
pub struct Posterizer {
    potrace: Potrace,
    params: PosterizerParams,
    calculated_threshold: Option<f64>,
}

impl Default for Posterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Posterizer {
    pub fn new() -> Self {
        Posterizer {
            potrace: Potrace::new(),
            params: PosterizerParams::default(),
            calculated_threshold: None,
        }
    }

    pub fn with_options(options: &PosterizerOptions) -> Result<Self, Error> {
        let mut posterizer = Posterizer::new();
        posterizer.set_parameters(options)?;
        Ok(posterizer)
    }

    /// Validate and merge options; shared tracing keys are forwarded to the
    /// inner tracer.
    pub fn set_parameters(&mut self, options: &PosterizerOptions) -> Result<(), Error> {
        options.validate()?;
        self.potrace.set_parameters(&options.trace)?;
        options.apply(&mut self.params);
        self.calculated_threshold = None;
        Ok(())
    }

    pub fn params(&self) -> &PosterizerParams {
        &self.params
    }

    pub fn load_image(&mut self, path: &std::path::Path) -> Result<(), Error> {
        self.calculated_threshold = None;
        self.potrace.load_image(path)
    }

    pub fn load_dynamic(&mut self, img: &image::DynamicImage) {
        self.calculated_threshold = None;
        self.potrace.load_dynamic(img);
    }

    pub fn load_luma(&mut self, width: u32, height: u32, data: Vec<u8>) -> Result<(), Error> {
        self.calculated_threshold = None;
        self.potrace.load_luma(width, height, data)
    }

    /// The top threshold, resolving AUTO through a two-level Otsu split.
    fn param_threshold(&mut self) -> Result<f64, Error> {
        if let Some(t) = self.calculated_threshold {
            return Ok(t);
        }
        let t = if self.params.threshold != THRESHOLD_AUTO {
            self.params.threshold
        } else {
            let two = self.potrace.histogram_mut()?.multilevel_thresholding(2, None, None);
            let pick = if self.params.black_on_white { two.get(1) } else { two.first() };
            pick.map(|&v| v as f64).unwrap_or(128.0)
        };
        self.calculated_threshold = Some(t);
        Ok(t)
    }

    /// The number of layers to produce.
    fn steps_count(&mut self) -> Result<usize, Error> {
        match &self.params.steps {
            Steps::Values(values) => Ok(values.len()),
            Steps::Auto => {
                if self.params.threshold == THRESHOLD_AUTO {
                    return Ok(4);
                }
                let t = self.param_threshold()?;
                let colors = if self.params.black_on_white { t } else { 255.0 - t };
                Ok(if colors > 200.0 { 4 } else { 3 })
            }
            Steps::Count(n) => {
                let n = *n as usize;
                let t = self.param_threshold()?;
                let colors = if self.params.black_on_white { t } else { 255.0 - t };
                Ok((colors as usize).min(n.max(2)))
            }
        }
    }

    /// The ordered color stops with their fill intensities.
    fn get_ranges(&mut self) -> Result<Vec<ColorStop>, Error> {
        let steps = self.params.steps.clone();
        let Steps::Values(values) = &steps else {
            return match self.params.range_distribution {
                RangeDistribution::Auto => self.ranges_auto(),
                RangeDistribution::Equal => self.ranges_equal(),
            };
        };

        // Explicit thresholds: order them toward the traced side and make
        // sure the top threshold itself is present.
        let threshold = self.param_threshold()?;
        let bow = self.params.black_on_white;
        let mut stops: Vec<f64> = values.iter().map(|&v| v as f64).collect();
        if bow {
            stops.sort_by(|a, b| b.partial_cmp(a).unwrap());
        } else {
            stops.sort_by(|a, b| a.partial_cmp(b).unwrap());
        }
        if bow && stops[0] < threshold {
            stops.insert(0, threshold);
        } else if !bow && *stops.last().unwrap() < threshold {
            stops.push(threshold);
        }
        self.calc_color_intensity(&stops)
    }

    /// Multilevel Otsu on the threshold-bounded histogram segment.
    fn ranges_auto(&mut self) -> Result<Vec<ColorStop>, Error> {
        let steps = self.steps_count()?;
        let bow = self.params.black_on_white;

        let mut stops: Vec<f64> = if self.params.threshold == THRESHOLD_AUTO {
            self.potrace
                .histogram_mut()?
                .multilevel_thresholding(steps, None, None)
                .iter()
                .map(|&v| v as f64)
                .collect()
        } else {
            let threshold = self.param_threshold()?;
            if bow {
                let mut v: Vec<f64> = self
                    .potrace
                    .histogram_mut()?
                    .multilevel_thresholding(steps.saturating_sub(1), Some(0.0), Some(threshold))
                    .iter()
                    .map(|&v| v as f64)
                    .collect();
                v.push(threshold);
                v
            } else {
                let mut v: Vec<f64> = self
                    .potrace
                    .histogram_mut()?
                    .multilevel_thresholding(steps.saturating_sub(1), Some(threshold), Some(255.0))
                    .iter()
                    .map(|&v| v as f64)
                    .collect();
                v.insert(0, threshold);
                v
            }
        };

        if bow {
            stops.reverse();
        }
        self.calc_color_intensity(&stops)
    }

    /// Equally spaced partition of the traced side.
    fn ranges_equal(&mut self) -> Result<Vec<ColorStop>, Error> {
        let bow = self.params.black_on_white;
        let threshold = self.param_threshold()?;
        let colors_to_threshold = if bow { threshold } else { 255.0 - threshold };
        let steps = self.steps_count()?;
        let step_size = colors_to_threshold / steps as f64;

        let mut stops = Vec::with_capacity(steps);
        for i in (0..steps).rev() {
            let th = colors_to_threshold.min((i as f64 + 1.0) * step_size);
            stops.push(if bow { th } else { 255.0 - th });
        }
        self.calc_color_intensity(&stops)
    }

    /// Pick a representative grey level per range and map it to a fill
    /// intensity. SPREAD derives the level geometrically and never consults
    /// the histogram; the other strategies bail out on empty ranges.
    fn calc_color_intensity(&mut self, stops: &[f64]) -> Result<Vec<ColorStop>, Error> {
        let bow = self.params.black_on_white;
        let strategy = self.params.fill_strategy;
        let full_range = (self.param_threshold()? - if bow { 0.0 } else { 255.0 }).abs();

        let mut out = Vec::with_capacity(stops.len());
        for (index, &threshold) in stops.iter().enumerate() {
            let next_value = if index + 1 == stops.len() {
                if bow {
                    -1.0
                } else {
                    256.0
                }
            } else {
                stops[index + 1]
            };
            let range_start = (if bow { next_value + 1.0 } else { threshold }).round();
            let range_end = (if bow { threshold } else { next_value - 1.0 }).round();
            let factor = if stops.len() > 1 {
                index as f64 / (stops.len() - 1) as f64
            } else {
                0.0
            };
            let interval_size = range_end - range_start;

            let stats = if strategy != FillStrategy::Spread {
                let s = self
                    .potrace
                    .histogram_mut()?
                    .stats(Some(range_start), Some(range_end));
                if s.pixels == 0 {
                    out.push(ColorStop { value: threshold, color_intensity: 0.0 });
                    continue;
                }
                Some(s)
            } else {
                None
            };

            let mut color = match (strategy, stats) {
                (FillStrategy::Spread, _) => {
                    let spread = interval_size * (full_range / 255.0).max(0.5) * factor;
                    if bow {
                        range_start + spread
                    } else {
                        range_end - spread
                    }
                }
                (FillStrategy::Dominant, _) => {
                    let tolerance = clamp(interval_size, 1.0, 5.0) as u32;
                    self.potrace.histogram_mut()?.dominant_color(
                        Some(range_start),
                        Some(range_end),
                        tolerance,
                    ) as f64
                }
                (FillStrategy::Mean, Some(s)) => s.levels.mean,
                (FillStrategy::Median, Some(s)) => s.levels.median,
                (_, None) => -1.0,
            };

            // Space consecutive fills apart so adjacent layers stay
            // distinguishable.
            if index != 0 && color != -1.0 {
                color = if bow {
                    clamp(color, range_start, range_end - (interval_size * 0.1).round())
                } else {
                    clamp(color, range_start + (interval_size * 0.1).round(), range_end)
                };
            }

            let intensity = if color == -1.0 {
                0.0
            } else if bow {
                (255.0 - color) / 255.0
            } else {
                color / 255.0
            };
            out.push(ColorStop { value: threshold, color_intensity: intensity });
        }
        Ok(out)
    }

    /// When the final range is wider than 25 grey levels and not yet at
    /// full intensity, append one more stop inside it so dark (or bright)
    /// detail survives.
    fn add_extra_color_stop(&mut self, ranges: &mut Vec<ColorStop>) -> Result<(), Error> {
        let bow = self.params.black_on_white;
        let Some(last) = ranges.last().copied() else {
            return Ok(());
        };
        let last_from = if bow { 0.0 } else { last.value };
        let last_to = if bow { last.value } else { 255.0 };

        if last_to - last_from > EXTRA_STOP_RANGE && last.color_intensity != 1.0 {
            let levels = self
                .potrace
                .histogram_mut()?
                .stats(Some(last_from), Some(last_to))
                .levels;
            let new_stop = if levels.mean + levels.std_dev <= EXTRA_STOP_RANGE {
                levels.mean + levels.std_dev
            } else if levels.mean - levels.std_dev <= EXTRA_STOP_RANGE {
                levels.mean - levels.std_dev
            } else {
                EXTRA_STOP_RANGE
            };
            let new_color_stop = new_stop.round();

            let stats = if bow {
                self.potrace.histogram_mut()?.stats(Some(0.0), Some(new_color_stop))
            } else {
                self.potrace.histogram_mut()?.stats(Some(new_color_stop), Some(255.0))
            };
            let color = stats.levels.mean;
            let color_intensity = if color.is_nan() {
                0.0
            } else if bow {
                (255.0 - color) / 255.0
            } else {
                color / 255.0
            };
            ranges.push(ColorStop {
                value: ((if bow { 0.0 } else { 255.0 }) - new_color_stop).abs(),
                color_intensity,
            });
        }
        Ok(())
    }

    /// One `<path>` per surviving layer, back-to-front. Layers whose
    /// computed opacity or path data is empty are left blank.
    fn path_tags(&mut self, no_fill: bool) -> Result<Vec<String>, Error> {
        let mut ranges = self.get_ranges()?;
        if matches!(self.params.steps, Steps::Auto) {
            self.add_extra_color_stop(&mut ranges)?;
        }

        let bow = self.params.black_on_white;
        self.potrace.set_parameters(&PotraceOptions {
            black_on_white: Some(bow),
            ..Default::default()
        })?;

        let mut actual_prev_layers_opacity = 0.0f64;
        let mut tags = Vec::with_capacity(ranges.len());

        for stop in &ranges {
            let this_layer_opacity = stop.color_intensity;
            if this_layer_opacity == 0.0 {
                tags.push(String::new());
                continue;
            }

            // Solve for the per-layer opacity that, composited over the
            // previous layers, lands on the absolute intensity.
            let calculated = if actual_prev_layers_opacity == 0.0 || this_layer_opacity == 1.0 {
                this_layer_opacity
            } else {
                let bot = actual_prev_layers_opacity - 1.0;
                if bot.abs() < 1e-9 {
                    0.0
                } else {
                    clamp(
                        round3((actual_prev_layers_opacity - this_layer_opacity) / bot),
                        0.0,
                        1.0,
                    )
                }
            };
            actual_prev_layers_opacity += (1.0 - actual_prev_layers_opacity) * calculated;

            self.potrace.set_parameters(&PotraceOptions {
                threshold: Some(stop.value),
                ..Default::default()
            })?;

            let d = self.potrace.path_data(None)?;
            if calculated == 0.0 || d.is_empty() {
                tags.push(String::new());
                continue;
            }
            let fill = if no_fill {
                String::new()
            } else {
                self.potrace.resolve_fill_color()
            };
            tags.push(svg::path_tag(&d, &fill, Some(calculated)));
        }

        Ok(tags)
    }

    /// A `<symbol>` with all layers and no fill colors.
    pub fn get_symbol(&mut self, id: &str) -> Result<String, Error> {
        let luma = self.potrace.luminance_data()?;
        let (w, h) = (luma.width, luma.height);
        let tags = self.path_tags(true)?;
        Ok(svg::symbol(&tags.concat(), id, w, h))
    }

    /// The complete layered SVG document.
    pub fn get_svg(&mut self) -> Result<String, Error> {
        let luma = self.potrace.luminance_data()?;
        let (w, h) = (luma.width, luma.height);
        let tags = self.path_tags(false)?;
        let background = (self.params.background != COLOR_TRANSPARENT)
            .then(|| self.params.background.clone());
        Ok(svg::svg_document(w, h, background.as_deref(), &tags))
    }
}

/// Clamp that tolerates an inverted window, like the reference helper.
fn clamp(v: f64, lo: f64, hi: f64) -> f64 {
    lo.max(v.min(hi))
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}
