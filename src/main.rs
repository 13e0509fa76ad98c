use clap::Parser;
use rast2svg::{
    FillStrategy, Posterizer, PosterizerOptions, PotraceOptions, RangeDistribution, Steps,
    TurnPolicy,
};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "rast2svg", about = "Trace a raster image into smooth SVG contours")]
struct Cli {
    /// Input image path (PNG, JPEG, BMP)
    #[arg(short, long)]
    input: PathBuf,

    /// Output SVG path
    #[arg(short, long)]
    output: PathBuf,

    /// Posterize into stacked tonal layers instead of a single trace
    #[arg(long)]
    posterize: bool,

    /// Turn policy: black, white, left, right, minority, majority
    #[arg(long, default_value = "minority")]
    turn_policy: String,

    /// Suppress speckles up to this many pixels
    #[arg(long, default_value = "2")]
    turd_size: u32,

    /// Corner threshold; lower values produce more corners
    #[arg(long, default_value = "1.0")]
    alpha_max: f64,

    /// Disable curve optimization
    #[arg(long)]
    no_curve_optimization: bool,

    /// Curve optimization tolerance
    #[arg(long, default_value = "0.2")]
    opt_tolerance: f64,

    /// Luminance threshold 0-255 (Otsu auto-detection if omitted)
    #[arg(long)]
    threshold: Option<f64>,

    /// Trace the bright side of the threshold instead of the dark side
    #[arg(long)]
    invert: bool,

    /// Fill color (CSS color or "auto")
    #[arg(long, default_value = "auto")]
    color: String,

    /// Background color (CSS color or "transparent")
    #[arg(long, default_value = "transparent")]
    background: String,

    /// Output width override
    #[arg(long)]
    width: Option<u32>,

    /// Output height override
    #[arg(long)]
    height: Option<u32>,

    /// Posterizer: number of layers
    #[arg(long)]
    steps: Option<u32>,

    /// Posterizer: explicit thresholds, comma separated (e.g. "60,120,180")
    #[arg(long)]
    step_values: Option<String>,

    /// Posterizer fill strategy: dominant, mean, median, spread
    #[arg(long, default_value = "dominant")]
    fill_strategy: String,

    /// Posterizer range distribution: auto, equal
    #[arg(long, default_value = "auto")]
    range_distribution: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let t_start = Instant::now();

    let trace_options = PotraceOptions {
        turn_policy: Some(cli.turn_policy.parse::<TurnPolicy>()?),
        turd_size: Some(cli.turd_size),
        alpha_max: Some(cli.alpha_max),
        opt_curve: Some(!cli.no_curve_optimization),
        opt_tolerance: Some(cli.opt_tolerance),
        threshold: cli.threshold,
        black_on_white: Some(!cli.invert),
        color: Some(cli.color.clone()),
        background: Some(cli.background.clone()),
        width: cli.width.map(Some),
        height: cli.height.map(Some),
    };

    eprintln!();
    eprintln!("  rast2svg \u{00b7} {}", cli.input.display());

    let svg = if cli.posterize {
        let steps = match (&cli.step_values, cli.steps) {
            (Some(values), _) => {
                let parsed: Result<Vec<u8>, _> =
                    values.split(',').map(|v| v.trim().parse::<u8>()).collect();
                Some(Steps::Values(parsed?))
            }
            (None, Some(count)) => Some(Steps::Count(count)),
            (None, None) => None,
        };
        let options = PosterizerOptions {
            trace: trace_options,
            steps,
            fill_strategy: Some(cli.fill_strategy.parse::<FillStrategy>()?),
            range_distribution: Some(cli.range_distribution.parse::<RangeDistribution>()?),
        };
        let mut posterizer = Posterizer::with_options(&options)?;
        posterizer.load_image(&cli.input)?;
        let svg = posterizer.get_svg()?;
        let layers = svg.matches("<path").count();
        eprintln!("  Posterize   {} layers", layers);
        svg
    } else {
        let mut potrace = rast2svg::Potrace::with_options(&trace_options)?;
        potrace.load_image(&cli.input)?;
        let svg = potrace.get_svg()?;
        let paths = potrace.path_list()?.len();
        let segments: usize = potrace.curves()?.iter().map(|c| c.n).sum();
        eprintln!("  Trace       {} contours \u{2192} {} segments", paths, segments);
        if !potrace.warnings().is_empty() {
            eprintln!("  Note        {} curve(s) kept unoptimized", potrace.warnings().len());
        }
        svg
    };

    std::fs::write(&cli.output, &svg)?;
    eprintln!(
        "  \u{2713} {}  ({} bytes, {}ms)",
        cli.output.display(),
        svg.len(),
        t_start.elapsed().as_millis()
    );
    eprintln!();

    Ok(())
}
