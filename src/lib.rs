//! rast2svg: raster bitmap → smooth vector contours → SVG.
//!
//! Traces a binary (thresholded) image into closed contour paths, fits
//! each jagged contour with straight segments and cubic Beziers, and emits
//! the result as SVG path data. The posterizer runs the tracer at several
//! luminance thresholds and stacks the layers into a tonal SVG.
//!
//! # Example
//!
//! ```no_run
//! use rast2svg::Potrace;
//! use std::path::Path;
//!
//! let mut potrace = Potrace::new();
//! potrace.load_image(Path::new("input.png"))?;
//! let svg = potrace.get_svg()?;
//! # Ok::<(), rast2svg::Error>(())
//! ```

#![forbid(unsafe_code)]

mod bitmap;
mod config;
mod geom;
mod histogram;
mod posterizer;
mod potrace;
mod svg;
mod vectorize;

pub mod error;

// Re-export kurbo so downstream users share the Point/BezPath types
// returned by the API.
pub use kurbo;

pub use bitmap::{Bitmap, LumaImage};
pub use config::{
    FillStrategy, PosterizerOptions, PosterizerParams, PotraceOptions, PotraceParams,
    RangeDistribution, Steps, TurnPolicy, COLOR_AUTO, COLOR_TRANSPARENT, STEPS_AUTO,
    THRESHOLD_AUTO,
};
pub use error::Error;
pub use histogram::{Channel, Histogram, Stats};
pub use posterizer::Posterizer;
pub use potrace::Potrace;
pub use vectorize::{Curve, PixelPath, Progress, SegTag};
