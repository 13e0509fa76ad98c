//! The tracing engine: owns the loaded luminance data, the parameter set,
//! and the lazily computed path list and curves.
//!
//! `load_image` / `set_parameters` / `get_*` may be called in any order,
//! but the getters fail with `UnloadedImage` until a load succeeds.
//! Changing a parameter that affects tracing invalidates the cached curves;
//! the next getter recomputes them.

use std::path::Path;

use image::{DynamicImage, ImageReader};
use kurbo::{BezPath, Point as KPoint};

use crate::bitmap::LumaImage;
use crate::config::{PotraceOptions, PotraceParams, COLOR_AUTO, THRESHOLD_AUTO};
use crate::error::Error;
use crate::histogram::Histogram;
use crate::svg;
use crate::vectorize::{self, decompose, Curve, PixelPath, Progress, SegTag};

/// Potrace-style raster tracer.
pub struct Potrace {
    params: PotraceParams,
    luminance: Option<LumaImage>,
    histogram: Option<Histogram>,
    pathlist: Vec<PixelPath>,
    curves: Vec<Curve>,
    processed: bool,
    warnings: Vec<Error>,
    progress: Option<Box<dyn FnMut(f64)>>,
}

impl Default for Potrace {
    fn default() -> Self {
        Self::new()
    }
}

impl Potrace {
    pub fn new() -> Self {
        Potrace {
            params: PotraceParams::default(),
            luminance: None,
            histogram: None,
            pathlist: Vec::new(),
            curves: Vec::new(),
            processed: false,
            warnings: Vec::new(),
            progress: None,
        }
    }

    /// Construct with an initial set of options.
    pub fn with_options(options: &PotraceOptions) -> Result<Self, Error> {
        let mut potrace = Potrace::new();
        potrace.set_parameters(options)?;
        Ok(potrace)
    }

    /// Validate and merge a partial parameter update. A change to any key
    /// other than color/background discards cached curves.
    pub fn set_parameters(&mut self, options: &PotraceOptions) -> Result<(), Error> {
        options.validate()?;
        if options.apply(&mut self.params) {
            self.processed = false;
        }
        Ok(())
    }

    /// The resolved parameter set.
    pub fn params(&self) -> &PotraceParams {
        &self.params
    }

    /// Register a synchronous progress callback for the tracing stages.
    /// The callback must not reenter the engine.
    pub fn set_progress(&mut self, callback: impl FnMut(f64) + 'static) {
        self.progress = Some(Box::new(callback));
    }

    /// Decode and load an image file.
    pub fn load_image(&mut self, path: &Path) -> Result<(), Error> {
        let img = ImageReader::open(path)
            .map_err(|e| Error::ImageDecodingFailed(e.to_string()))?
            .decode()
            .map_err(|e| Error::ImageDecodingFailed(e.to_string()))?;
        self.load_dynamic(&img);
        Ok(())
    }

    /// Load an already decoded image.
    pub fn load_dynamic(&mut self, img: &DynamicImage) {
        self.install(LumaImage::from_dynamic(img));
    }

    /// Load a raw luminance grid directly.
    pub fn load_luma(&mut self, width: u32, height: u32, data: Vec<u8>) -> Result<(), Error> {
        let img = LumaImage::from_raw(width, height, data).ok_or_else(|| {
            Error::ImageDecodingFailed(format!(
                "luminance buffer does not match {}x{}",
                width, height
            ))
        })?;
        self.install(img);
        Ok(())
    }

    fn install(&mut self, img: LumaImage) {
        // A new image releases all previous state first.
        self.luminance = Some(img);
        self.histogram = None;
        self.pathlist = Vec::new();
        self.curves = Vec::new();
        self.warnings = Vec::new();
        self.processed = false;
    }

    /// True once an image has been loaded.
    pub fn image_loaded(&self) -> bool {
        self.luminance.is_some()
    }

    pub(crate) fn luminance_data(&self) -> Result<&LumaImage, Error> {
        self.luminance.as_ref().ok_or(Error::UnloadedImage)
    }

    /// The luminance histogram of the loaded image, built once.
    pub fn histogram_mut(&mut self) -> Result<&mut Histogram, Error> {
        let luma = self.luminance.as_ref().ok_or(Error::UnloadedImage)?;
        Ok(self.histogram.get_or_insert_with(|| Histogram::from_luma(luma)))
    }

    /// The threshold actually used: the configured one, or the histogram's
    /// automatic pick (128 when the histogram cannot decide).
    pub fn resolve_threshold(&mut self) -> Result<f64, Error> {
        if self.params.threshold != THRESHOLD_AUTO {
            return Ok(self.params.threshold);
        }
        let auto = self.histogram_mut()?.auto_threshold(None, None);
        Ok(auto.map(f64::from).unwrap_or(128.0))
    }

    /// Threshold, decompose, and fit. No-op when the cache is warm.
    fn process(&mut self) -> Result<(), Error> {
        if self.processed {
            return Ok(());
        }
        let threshold = self.resolve_threshold()?;
        let luma = self.luminance.as_ref().ok_or(Error::UnloadedImage)?;
        let map = luma.threshold_map(threshold, self.params.black_on_white);
        self.pathlist = decompose::decompose(&map, self.params.turd_size, self.params.turn_policy);

        let progress = self.progress.as_mut().map(|cb| Progress::new(cb.as_mut()));
        let (curves, warnings) = vectorize::process_paths(&self.pathlist, &self.params, progress);
        self.curves = curves;
        self.warnings = warnings;
        self.processed = true;
        Ok(())
    }

    /// The decomposed contour paths (tracing first if needed).
    pub fn path_list(&mut self) -> Result<&[PixelPath], Error> {
        self.process()?;
        Ok(&self.pathlist)
    }

    /// The final curve of every path (tracing first if needed).
    pub fn curves(&mut self) -> Result<&[Curve], Error> {
        self.process()?;
        Ok(&self.curves)
    }

    /// Non-fatal statuses from the last processing run (currently only
    /// curve-optimization fallbacks).
    pub fn warnings(&self) -> &[Error] {
        &self.warnings
    }

    /// The concatenated SVG path data of all contours.
    pub(crate) fn path_data(&mut self, scale: Option<(f64, f64)>) -> Result<String, Error> {
        self.process()?;
        let scale = scale.unwrap_or((1.0, 1.0));
        let parts: Vec<String> = self
            .curves
            .iter()
            .map(|c| svg::render_path_data(c, scale))
            .collect();
        Ok(parts.join(" "))
    }

    /// Resolve `COLOR_AUTO` against the traced side.
    pub(crate) fn resolve_fill_color(&self) -> String {
        if self.params.color == COLOR_AUTO {
            if self.params.black_on_white { "black" } else { "white" }.to_string()
        } else {
            self.params.color.clone()
        }
    }

    /// A single `<path>` element containing all traced contours.
    pub fn get_path_tag(
        &mut self,
        fill_color: Option<&str>,
        scale: Option<(f64, f64)>,
    ) -> Result<String, Error> {
        if !self.image_loaded() {
            return Err(Error::UnloadedImage);
        }
        let fill = match fill_color {
            Some(c) => c.to_string(),
            None => self.resolve_fill_color(),
        };
        let d = self.path_data(scale)?;
        Ok(svg::path_tag(&d, &fill, None))
    }

    /// A `<symbol>` element wrapping the traced path without fill, for use
    /// with `<use>`.
    pub fn get_symbol(&mut self, id: &str) -> Result<String, Error> {
        let luma = self.luminance_data()?;
        let (w, h) = (luma.width, luma.height);
        let tag = self.get_path_tag(Some(""), None)?;
        Ok(svg::symbol(&tag, id, w, h))
    }

    /// The full SVG document, honoring the width/height overrides and the
    /// background color.
    pub fn get_svg(&mut self) -> Result<String, Error> {
        let luma = self.luminance_data()?;
        let (img_w, img_h) = (luma.width, luma.height);
        let width = self.params.width.unwrap_or(img_w);
        let height = self.params.height.unwrap_or(img_h);
        let scale = (
            width as f64 / img_w.max(1) as f64,
            height as f64 / img_h.max(1) as f64,
        );

        let background = (self.params.background != crate::config::COLOR_TRANSPARENT)
            .then(|| self.params.background.clone());
        let tag = self.get_path_tag(None, Some(scale))?;
        Ok(svg::svg_document(width, height, background.as_deref(), &[tag]))
    }

    /// The traced contours as `kurbo::BezPath`s, one per contour.
    pub fn bez_paths(&mut self) -> Result<Vec<BezPath>, Error> {
        self.process()?;
        let mut out = Vec::with_capacity(self.curves.len());
        for curve in &self.curves {
            let mut path = BezPath::new();
            if curve.n == 0 {
                out.push(path);
                continue;
            }
            let start = curve.c[(curve.n - 1) * 3 + 2];
            path.move_to(KPoint::new(start.x, start.y));
            for i in 0..curve.n {
                let c0 = curve.c[i * 3];
                let c1 = curve.c[i * 3 + 1];
                let c2 = curve.c[i * 3 + 2];
                match curve.tag[i] {
                    SegTag::Curve => path.curve_to(c0, c1, c2),
                    SegTag::Corner => {
                        path.line_to(c1);
                        path.line_to(c2);
                    }
                }
            }
            path.close_path();
            out.push(path);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TurnPolicy;

    fn white_image(w: u32, h: u32) -> Vec<u8> {
        vec![255u8; (w * h) as usize]
    }

    fn square_image(dim: u32, left: u32, top: u32, side: u32) -> Vec<u8> {
        let mut data = white_image(dim, dim);
        for y in top..top + side {
            for x in left..left + side {
                data[(y * dim + x) as usize] = 0;
            }
        }
        data
    }

    #[test]
    fn getters_require_a_loaded_image() {
        let mut p = Potrace::new();
        assert!(matches!(p.get_path_tag(None, None), Err(Error::UnloadedImage)));
        assert!(matches!(p.get_svg(), Err(Error::UnloadedImage)));
        assert!(matches!(p.get_symbol("id"), Err(Error::UnloadedImage)));
    }

    #[test]
    fn all_white_image_yields_empty_path() {
        let mut p = Potrace::new();
        p.load_luma(10, 10, white_image(10, 10)).unwrap();
        let tag = p.get_path_tag(None, None).unwrap();
        assert_eq!(tag, "<path d=\"\" stroke=\"none\" fill=\"black\" fill-rule=\"evenodd\"/>");
        let svg = p.get_svg().unwrap();
        assert!(svg.contains("d=\"\""));
    }

    #[test]
    fn square_traces_to_four_corners() {
        let mut p = Potrace::new();
        p.load_luma(20, 20, square_image(20, 4, 4, 12)).unwrap();
        let paths = p.path_list().unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].sign, 1);
        assert_eq!(paths[0].area, 144);
        let curves = p.curves().unwrap();
        assert_eq!(curves[0].count_tag(SegTag::Corner), 4);
    }

    #[test]
    fn get_svg_is_idempotent() {
        let mut p = Potrace::new();
        p.load_luma(20, 20, square_image(20, 4, 4, 12)).unwrap();
        let first = p.get_svg().unwrap();
        let second = p.get_svg().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn parameter_change_invalidates_cache() {
        let mut p = Potrace::new();
        p.load_luma(20, 20, square_image(20, 4, 4, 12)).unwrap();
        assert_eq!(p.path_list().unwrap().len(), 1);

        // A turd size larger than the square swallows it.
        p.set_parameters(&PotraceOptions {
            turd_size: Some(200),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(p.path_list().unwrap().len(), 0);
    }

    #[test]
    fn parameters_round_trip_canonically() {
        let mut p = Potrace::new();
        p.set_parameters(&PotraceOptions {
            turn_policy: Some(TurnPolicy::Left),
            threshold: Some(100.0),
            opt_curve: Some(false),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(p.params().turn_policy, TurnPolicy::Left);
        assert_eq!(p.params().threshold, 100.0);
        assert!(!p.params().opt_curve);
    }

    #[test]
    fn invalid_parameters_are_rejected_eagerly() {
        let mut p = Potrace::new();
        let err = p.set_parameters(&PotraceOptions {
            threshold: Some(-3.0),
            ..Default::default()
        });
        assert!(matches!(err, Err(Error::InvalidParameter(_))));
        // The instance keeps its previous consistent state.
        assert_eq!(p.params().threshold, THRESHOLD_AUTO);
    }

    #[test]
    fn inverting_black_on_white_flips_traced_side() {
        // Dark square on white: blackOnWhite=false traces the bright
        // region instead (the surrounding frame).
        let mut p = Potrace::new();
        p.load_luma(20, 20, square_image(20, 4, 4, 12)).unwrap();
        p.set_parameters(&PotraceOptions {
            threshold: Some(128.0),
            ..Default::default()
        })
        .unwrap();
        let dark_area: i64 = p.path_list().unwrap().iter().map(|p| p.area).sum();
        assert_eq!(dark_area, 144);

        p.set_parameters(&PotraceOptions {
            black_on_white: Some(false),
            ..Default::default()
        })
        .unwrap();
        let bright = p.path_list().unwrap();
        // The bright region is the full frame with the square as a hole.
        assert_eq!(bright.len(), 2);
        assert_eq!(bright[0].sign, 1);
        assert_eq!(bright[1].sign, -1);
        assert_eq!(bright[0].area, 400);
        assert_eq!(bright[1].area, 144);
    }

    #[test]
    fn scale_applies_to_coordinates() {
        let mut p = Potrace::new();
        p.load_luma(20, 20, square_image(20, 4, 4, 12)).unwrap();
        p.set_parameters(&PotraceOptions {
            width: Some(Some(40)),
            ..Default::default()
        })
        .unwrap();
        let svg = p.get_svg().unwrap();
        assert!(svg.contains("width=\"40\""));
        assert!(svg.contains("height=\"20\""));
    }

    #[test]
    fn bez_paths_mirror_the_curves() {
        let mut p = Potrace::new();
        p.load_luma(20, 20, square_image(20, 4, 4, 12)).unwrap();
        let paths = p.bez_paths().unwrap();
        assert_eq!(paths.len(), 1);
        // Four corners, two LineTos each, plus MoveTo and ClosePath.
        assert_eq!(paths[0].elements().len(), 10);
    }
}
