//! Tracing and posterization parameters.
//!
//! `PotraceParams` / `PosterizerParams` hold the resolved state an engine
//! instance runs with; the `*Options` structs are partial updates (every
//! field optional) merged in by `set_parameters`, with eager validation.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Sentinel for automatic threshold selection.
pub const THRESHOLD_AUTO: f64 = -1.0;
/// Sentinel for automatic step-count selection.
pub const STEPS_AUTO: i32 = -1;
/// Fill color resolved from `black_on_white` at render time.
pub const COLOR_AUTO: &str = "auto";
/// Background left unpainted.
pub const COLOR_TRANSPARENT: &str = "transparent";

/// How ambiguous 2x2 configurations are resolved during contour tracing.
///
/// Discriminants are fixed for wire/test compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TurnPolicy {
    Black = 0,
    White = 1,
    Left = 2,
    Right = 3,
    Minority = 4,
    Majority = 5,
}

impl TurnPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            TurnPolicy::Black => "black",
            TurnPolicy::White => "white",
            TurnPolicy::Left => "left",
            TurnPolicy::Right => "right",
            TurnPolicy::Minority => "minority",
            TurnPolicy::Majority => "majority",
        }
    }
}

impl fmt::Display for TurnPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TurnPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "black" => Ok(TurnPolicy::Black),
            "white" => Ok(TurnPolicy::White),
            "left" => Ok(TurnPolicy::Left),
            "right" => Ok(TurnPolicy::Right),
            "minority" => Ok(TurnPolicy::Minority),
            "majority" => Ok(TurnPolicy::Majority),
            other => Err(Error::InvalidParameter(format!(
                "bad turnPolicy value '{}'; allowed: black, white, left, right, minority, majority",
                other
            ))),
        }
    }
}

/// How the posterizer picks a fill intensity for each layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillStrategy {
    Spread,
    #[default]
    Dominant,
    Median,
    Mean,
}

impl FillStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            FillStrategy::Spread => "spread",
            FillStrategy::Dominant => "dominant",
            FillStrategy::Median => "median",
            FillStrategy::Mean => "mean",
        }
    }
}

impl fmt::Display for FillStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FillStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "spread" => Ok(FillStrategy::Spread),
            "dominant" => Ok(FillStrategy::Dominant),
            "median" => Ok(FillStrategy::Median),
            "mean" => Ok(FillStrategy::Mean),
            other => Err(Error::InvalidParameter(format!(
                "bad fillStrategy value '{}'; allowed: spread, dominant, median, mean",
                other
            ))),
        }
    }
}

/// How the posterizer distributes thresholds over the traced range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RangeDistribution {
    #[default]
    Auto,
    Equal,
}

impl RangeDistribution {
    pub fn as_str(self) -> &'static str {
        match self {
            RangeDistribution::Auto => "auto",
            RangeDistribution::Equal => "equal",
        }
    }
}

impl fmt::Display for RangeDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RangeDistribution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "auto" => Ok(RangeDistribution::Auto),
            "equal" => Ok(RangeDistribution::Equal),
            other => Err(Error::InvalidParameter(format!(
                "bad rangeDistribution value '{}'; allowed: auto, equal",
                other
            ))),
        }
    }
}

/// Posterizer step specification: automatic, a layer count, or explicit
/// threshold values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Steps {
    Auto,
    Count(u32),
    Values(Vec<u8>),
}

impl Default for Steps {
    fn default() -> Self {
        Steps::Auto
    }
}

impl Steps {
    fn validate(&self) -> Result<(), Error> {
        match self {
            Steps::Auto => Ok(()),
            Steps::Count(n) => {
                if (1..=255).contains(n) {
                    Ok(())
                } else {
                    Err(Error::InvalidParameter(format!(
                        "bad steps value {}; expected 1..255, a list, or auto",
                        n
                    )))
                }
            }
            Steps::Values(values) => {
                if values.is_empty() {
                    return Err(Error::InvalidParameter("empty steps list".into()));
                }
                if values.windows(2).any(|w| w[0] >= w[1]) {
                    return Err(Error::InvalidParameter(
                        "steps list must be strictly increasing".into(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Resolved tracing parameters.
#[derive(Debug, Clone)]
pub struct PotraceParams {
    /// Ambiguity resolution during path decomposition.
    pub turn_policy: TurnPolicy,
    /// Suppress speckles of up to this many pixels.
    pub turd_size: u32,
    /// Corner threshold; vertices with smoothing alpha at or above it stay
    /// sharp.
    pub alpha_max: f64,
    /// Enable curve optimization (segment merging).
    pub opt_curve: bool,
    /// Maximum sampled deviation allowed when merging curve segments.
    pub opt_tolerance: f64,
    /// Luminance cut-off, or `THRESHOLD_AUTO` for Otsu selection.
    pub threshold: f64,
    /// Trace the dark side of the threshold (true) or the bright side.
    pub black_on_white: bool,
    /// Fill color, or `COLOR_AUTO`.
    pub color: String,
    /// Background color, or `COLOR_TRANSPARENT`.
    pub background: String,
    /// Optional SVG output width (defaults to image width).
    pub width: Option<u32>,
    /// Optional SVG output height (defaults to image height).
    pub height: Option<u32>,
}

impl Default for PotraceParams {
    fn default() -> Self {
        PotraceParams {
            turn_policy: TurnPolicy::Minority,
            turd_size: 2,
            alpha_max: 1.0,
            opt_curve: true,
            opt_tolerance: 0.2,
            threshold: THRESHOLD_AUTO,
            black_on_white: true,
            color: COLOR_AUTO.to_string(),
            background: COLOR_TRANSPARENT.to_string(),
            width: None,
            height: None,
        }
    }
}

/// Partial update for [`PotraceParams`]; unset fields keep their value.
#[derive(Debug, Clone, Default)]
pub struct PotraceOptions {
    pub turn_policy: Option<TurnPolicy>,
    pub turd_size: Option<u32>,
    pub alpha_max: Option<f64>,
    pub opt_curve: Option<bool>,
    pub opt_tolerance: Option<f64>,
    pub threshold: Option<f64>,
    pub black_on_white: Option<bool>,
    pub color: Option<String>,
    pub background: Option<String>,
    pub width: Option<Option<u32>>,
    pub height: Option<Option<u32>>,
}

impl PotraceOptions {
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(t) = self.threshold {
            if t != THRESHOLD_AUTO && !(0.0..=255.0).contains(&t) {
                return Err(Error::InvalidParameter(format!(
                    "bad threshold value {}; expected 0..255 or auto",
                    t
                )));
            }
        }
        if let Some(a) = self.alpha_max {
            if !(a >= 0.0) {
                return Err(Error::InvalidParameter(format!(
                    "bad alphaMax value {}; expected >= 0",
                    a
                )));
            }
        }
        if let Some(t) = self.opt_tolerance {
            if !(t >= 0.0) {
                return Err(Error::InvalidParameter(format!(
                    "bad optTolerance value {}; expected >= 0",
                    t
                )));
            }
        }
        for (name, dim) in [("width", self.width), ("height", self.height)] {
            if let Some(Some(0)) = dim {
                return Err(Error::InvalidParameter(format!(
                    "bad {} value 0; expected a positive integer",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Merge into `params`. Returns true when a key affecting tracing
    /// changed (color and background only affect rendering).
    pub fn apply(&self, params: &mut PotraceParams) -> bool {
        let mut invalidated = false;
        macro_rules! merge {
            ($field:ident) => {
                if let Some(v) = self.$field.clone() {
                    if params.$field != v {
                        params.$field = v;
                        invalidated = true;
                    }
                }
            };
        }
        merge!(turn_policy);
        merge!(turd_size);
        merge!(alpha_max);
        merge!(opt_curve);
        merge!(opt_tolerance);
        merge!(threshold);
        merge!(black_on_white);
        merge!(width);
        merge!(height);
        if let Some(c) = self.color.clone() {
            params.color = c;
        }
        if let Some(b) = self.background.clone() {
            params.background = b;
        }
        invalidated
    }
}

/// Resolved posterization parameters (on top of the inner tracer's).
#[derive(Debug, Clone)]
pub struct PosterizerParams {
    pub threshold: f64,
    pub black_on_white: bool,
    pub steps: Steps,
    pub background: String,
    pub fill_strategy: FillStrategy,
    pub range_distribution: RangeDistribution,
}

impl Default for PosterizerParams {
    fn default() -> Self {
        PosterizerParams {
            threshold: THRESHOLD_AUTO,
            black_on_white: true,
            steps: Steps::Auto,
            background: COLOR_TRANSPARENT.to_string(),
            fill_strategy: FillStrategy::Dominant,
            range_distribution: RangeDistribution::Auto,
        }
    }
}

/// Partial update for a posterizer: the shared tracing options plus the
/// posterizer-only keys.
#[derive(Debug, Clone, Default)]
pub struct PosterizerOptions {
    pub trace: PotraceOptions,
    pub steps: Option<Steps>,
    pub fill_strategy: Option<FillStrategy>,
    pub range_distribution: Option<RangeDistribution>,
}

impl PosterizerOptions {
    pub fn validate(&self) -> Result<(), Error> {
        self.trace.validate()?;
        if let Some(steps) = &self.steps {
            steps.validate()?;
        }
        Ok(())
    }

    pub fn apply(&self, params: &mut PosterizerParams) {
        if let Some(t) = self.trace.threshold {
            params.threshold = t;
        }
        if let Some(b) = self.trace.black_on_white {
            params.black_on_white = b;
        }
        if let Some(bg) = self.trace.background.clone() {
            params.background = bg;
        }
        if let Some(s) = self.steps.clone() {
            params.steps = s;
        }
        if let Some(f) = self.fill_strategy {
            params.fill_strategy = f;
        }
        if let Some(r) = self.range_distribution {
            params.range_distribution = r;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_policy_round_trips_names_and_values() {
        for (policy, name, value) in [
            (TurnPolicy::Black, "black", 0u8),
            (TurnPolicy::White, "white", 1),
            (TurnPolicy::Left, "left", 2),
            (TurnPolicy::Right, "right", 3),
            (TurnPolicy::Minority, "minority", 4),
            (TurnPolicy::Majority, "majority", 5),
        ] {
            assert_eq!(policy.as_str(), name);
            assert_eq!(name.parse::<TurnPolicy>().unwrap(), policy);
            assert_eq!(policy as u8, value);
        }
        assert!("diagonal".parse::<TurnPolicy>().is_err());
    }

    #[test]
    fn threshold_validation() {
        let ok = PotraceOptions { threshold: Some(128.0), ..Default::default() };
        assert!(ok.validate().is_ok());
        let auto = PotraceOptions { threshold: Some(THRESHOLD_AUTO), ..Default::default() };
        assert!(auto.validate().is_ok());
        let bad = PotraceOptions { threshold: Some(300.0), ..Default::default() };
        assert!(matches!(bad.validate(), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn steps_list_must_increase() {
        assert!(Steps::Values(vec![10, 20, 30]).validate().is_ok());
        assert!(Steps::Values(vec![10, 10]).validate().is_err());
        assert!(Steps::Values(vec![30, 20]).validate().is_err());
        assert!(Steps::Values(vec![]).validate().is_err());
        assert!(Steps::Count(0).validate().is_err());
        assert!(Steps::Count(4).validate().is_ok());
    }

    #[test]
    fn apply_reports_cache_invalidation() {
        let mut params = PotraceParams::default();
        let color_only = PotraceOptions { color: Some("red".into()), ..Default::default() };
        assert!(!color_only.apply(&mut params));
        assert_eq!(params.color, "red");

        let threshold = PotraceOptions { threshold: Some(42.0), ..Default::default() };
        assert!(threshold.apply(&mut params));
        assert_eq!(params.threshold, 42.0);

        // Re-applying the same value is not a change.
        assert!(!threshold.apply(&mut params));
    }
}
