use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use postfx::{CanvasSize, Point};

#[derive(Parser, Debug)]
#[command(
    name = "libshader",
    author,
    version,
    about = "LUT color grading and Retro-TV distortion for still frames"
)]
pub struct Cli {
    #[command(flatten)]
    pub pipeline: PipelineArgs,
    #[command(subcommand)]
    pub command: Command,
}

/// Overrides applied on top of the pipeline configuration.
#[derive(Args, Debug, Default, Clone)]
pub struct PipelineArgs {
    /// Pipeline description; defaults to `pipeline.toml` in the user config
    /// directory when present.
    #[arg(long, global = true, value_name = "PATH", env = "LIBSHADER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory or http(s) URL the shaders and lookup table are fetched from.
    #[arg(long, global = true, value_name = "DIR|URL")]
    pub assets: Option<String>,

    /// Seed for the per-pass and per-frame random uniforms.
    #[arg(long, global = true, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Curvature for every Retro-TV pass.
    #[arg(long, global = true, value_name = "K", value_parser = parse_curvature)]
    pub curvature: Option<f32>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render one frame headlessly and write it as an image.
    Render(RenderArgs),
    /// Show the pipeline applied to an image in a window.
    Preview(PreviewArgs),
    /// Map a point on the distorted output back into source coordinates.
    Remap(RemapArgs),
    /// Write an identity lookup table.
    Lut(LutArgs),
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    #[arg(long, short, value_name = "IMAGE")]
    pub input: PathBuf,

    #[arg(long, short, value_name = "IMAGE")]
    pub output: PathBuf,

    /// Elapsed time in seconds fed to the passes.
    #[arg(long, value_name = "SECONDS", default_value_t = 0.0)]
    pub time: f32,

    /// Pointer position in logical pixels (e.g. `120,80`).
    #[arg(long, value_name = "X,Y", value_parser = parse_point)]
    pub pointer: Option<Point>,

    /// Device pixel scale; the logical canvas is the image size divided by it.
    #[arg(long, value_name = "FACTOR", default_value_t = 1.0, value_parser = parse_scale)]
    pub scale: f32,
}

#[derive(Args, Debug)]
pub struct PreviewArgs {
    #[arg(long, short, value_name = "IMAGE")]
    pub input: PathBuf,

    /// Initial window size; defaults to the image size.
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<CanvasSize>,
}

#[derive(Args, Debug)]
pub struct RemapArgs {
    /// Screen the point lives on.
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: CanvasSize,

    #[arg(allow_negative_numbers = true)]
    pub x: f32,
    #[arg(allow_negative_numbers = true)]
    pub y: f32,
}

#[derive(Args, Debug)]
pub struct LutArgs {
    /// Cells per axis; the table is `N*N` by `N` pixels.
    #[arg(
        long,
        value_name = "N",
        default_value_t = 16,
        value_parser = clap::value_parser!(u32).range(2..=64)
    )]
    pub size: u32,

    #[arg(long, short, value_name = "IMAGE")]
    pub output: PathBuf,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<CanvasSize, String> {
    let (width, height) = value
        .trim()
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| "expected WIDTHxHEIGHT, e.g. 1280x720".to_string())?;
    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width '{}'", width.trim()))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height '{}'", height.trim()))?;
    if width == 0 || height == 0 {
        return Err("dimensions must be greater than zero".to_string());
    }
    Ok(CanvasSize::new(width, height))
}

pub fn parse_point(value: &str) -> Result<Point, String> {
    let (x, y) = value
        .trim()
        .split_once(',')
        .ok_or_else(|| "expected X,Y, e.g. 120,80".to_string())?;
    let x: f32 = x.trim().parse().map_err(|_| format!("invalid x '{}'", x.trim()))?;
    let y: f32 = y.trim().parse().map_err(|_| format!("invalid y '{}'", y.trim()))?;
    Ok(Point::new(x, y))
}

pub fn parse_curvature(value: &str) -> Result<f32, String> {
    let curvature: f32 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid curvature '{value}'"))?;
    if !curvature.is_finite() || curvature < 0.0 {
        return Err("curvature must be a finite value >= 0".to_string());
    }
    Ok(curvature)
}

fn parse_scale(value: &str) -> Result<f32, String> {
    let scale: f32 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid scale '{value}'"))?;
    if !scale.is_finite() || scale <= 0.0 {
        return Err("scale must be a finite value > 0".to_string());
    }
    Ok(scale)
}
