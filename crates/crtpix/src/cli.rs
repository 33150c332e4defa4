use std::path::PathBuf;

use clap::{Parser, Subcommand};
use crtconfig::{DensitySetting, ExportFormatSetting, FieldSetting, OrientationSetting};

#[derive(Parser, Debug)]
#[command(
    name = "crtpix",
    author,
    version,
    about = "Render images through a CRT subpixel mask",
    arg_required_else_help = true
)]
pub struct Cli {
    /// Configuration file; defaults to `crtpix.toml` in the user config directory.
    #[arg(long, global = true, value_name = "PATH", env = "CRTPIX_CONFIG")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render a still image and write the encoded result.
    Render(RenderArgs),
    /// Print the pixel density that best fits a target output height.
    Density(DensityArgs),
    /// Run the live loop over a directory of frames.
    Camera(CameraArgs),
}

/// Effect overrides shared by `render` and `camera`.
#[derive(Parser, Debug, Default, Clone)]
pub struct EffectArgs {
    /// Stripe orientation: `columns` or `rows`.
    #[arg(long, value_name = "MODE", value_parser = parse_orientation)]
    pub orientation: Option<OrientationSetting>,

    /// Pixel density: an integer >= 1, or `auto` to fit `--target-height`.
    #[arg(long, value_name = "N|auto", value_parser = parse_density)]
    pub density: Option<DensitySetting>,

    /// Output height aimed for when the density is `auto`.
    #[arg(long, value_name = "PIXELS")]
    pub target_height: Option<u32>,

    /// Blank alternating 3-row bands.
    #[arg(long)]
    pub interlaced: bool,

    /// Field drawn when interlaced: `odd` or `even`.
    #[arg(long, value_name = "FIELD", value_parser = parse_field)]
    pub field: Option<FieldSetting>,
}

/// Encoding overrides shared by `render` and `camera`.
#[derive(Parser, Debug, Default, Clone)]
pub struct EncodeArgs {
    /// Output format: `png` or `jpeg`. Inferred from the output extension when omitted.
    #[arg(long, value_name = "FORMAT", value_parser = parse_format)]
    pub format: Option<ExportFormatSetting>,

    /// JPEG quality in 0..=1.
    #[arg(long, value_name = "Q")]
    pub quality: Option<f32>,
}

#[derive(Parser, Debug)]
pub struct RenderArgs {
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    #[arg(short, long, value_name = "OUTPUT")]
    pub output: PathBuf,

    #[command(flatten)]
    pub effect: EffectArgs,

    #[command(flatten)]
    pub encode: EncodeArgs,

    /// Shade on the CPU instead of requesting a GPU adapter.
    #[arg(long)]
    pub software: bool,
}

#[derive(Parser, Debug)]
pub struct DensityArgs {
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    #[arg(long, value_name = "PIXELS")]
    pub target_height: Option<u32>,
}

#[derive(Parser, Debug)]
pub struct CameraArgs {
    /// Directory of frames played back in file-name order.
    #[arg(value_name = "DIR")]
    pub directory: PathBuf,

    /// Number of frames to render before stopping.
    #[arg(long, value_name = "N", default_value_t = 60)]
    pub frames: u64,

    /// Export every K-th rendered frame (0 disables exports).
    #[arg(long, value_name = "K", default_value_t = 0)]
    pub export_every: u64,

    /// Directory receiving exported frames.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub out_dir: PathBuf,

    /// Playback rate; falls back to the configured frame interval.
    #[arg(long, value_name = "FPS")]
    pub fps: Option<f32>,

    #[command(flatten)]
    pub effect: EffectArgs,

    #[command(flatten)]
    pub encode: EncodeArgs,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_orientation(value: &str) -> Result<OrientationSetting, String> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "columns" | "column" | "vertical" => Ok(OrientationSetting::Columns),
        "rows" | "row" | "horizontal" => Ok(OrientationSetting::Rows),
        "" => Err("orientation must not be empty".to_string()),
        other => Err(format!(
            "unknown orientation '{other}'; expected columns or rows"
        )),
    }
}

pub fn parse_density(value: &str) -> Result<DensitySetting, String> {
    match value.parse::<DensitySetting>()? {
        DensitySetting::Fixed(0) => Err("pixel density must be at least 1".to_string()),
        density => Ok(density),
    }
}

pub fn parse_field(value: &str) -> Result<FieldSetting, String> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "odd" => Ok(FieldSetting::Odd),
        "even" => Ok(FieldSetting::Even),
        other => Err(format!("unknown field '{other}'; expected odd or even")),
    }
}

pub fn parse_format(value: &str) -> Result<ExportFormatSetting, String> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "png" => Ok(ExportFormatSetting::Png),
        "jpeg" | "jpg" => Ok(ExportFormatSetting::Jpeg),
        other => Err(format!("unknown format '{other}'; expected png or jpeg")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn density_accepts_auto_and_integers() {
        assert_eq!(parse_density("auto"), Ok(DensitySetting::Auto));
        assert_eq!(parse_density(" 3 "), Ok(DensitySetting::Fixed(3)));
        assert!(parse_density("0").is_err());
        assert!(parse_density("-2").is_err());
    }

    #[test]
    fn render_flags_parse() {
        let cli = Cli::try_parse_from([
            "crtpix",
            "render",
            "in.png",
            "-o",
            "out.jpg",
            "--orientation",
            "rows",
            "--density",
            "2",
            "--interlaced",
            "--field",
            "even",
            "--format",
            "jpg",
            "--software",
        ])
        .unwrap();

        let Command::Render(args) = cli.command else {
            panic!("expected render subcommand");
        };
        assert_eq!(args.effect.orientation, Some(OrientationSetting::Rows));
        assert_eq!(args.effect.density, Some(DensitySetting::Fixed(2)));
        assert!(args.effect.interlaced);
        assert_eq!(args.effect.field, Some(FieldSetting::Even));
        assert_eq!(args.encode.format, Some(ExportFormatSetting::Jpeg));
        assert!(args.software);
    }

    #[test]
    fn unknown_values_are_rejected() {
        assert!(parse_orientation("diagonal").is_err());
        assert!(parse_field("both").is_err());
        assert!(parse_format("webp").is_err());
    }
}
