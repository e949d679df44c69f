use std::path::Path;

use anyhow::{Context, Result};
use image::RgbaImage;
use postfx::{
    barrel_inverse, build_renderer, drive_frame, identity_lut, remap_pointer, CanvasSize,
    HostAdapter, Point, WgpuDevice,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::bindings::{curvatures, pipeline_spec, resolve_config, resource_loader, ResolvedConfig};
use crate::cli::{Cli, Command, LutArgs, PipelineArgs, PreviewArgs, RemapArgs, RenderArgs};
use crate::host::ImageHost;
use crate::paths;
use crate::window;

const DEFAULT_FILTER: &str = "warn,libshader=info,postfx=info,resources=info,naga=error,wgpu=error,\
wgpu_core=error,wgpu_hal=error,winit=error";

pub fn run(cli: Cli) -> Result<()> {
    initialise_tracing();

    match cli.command {
        Command::Render(args) => render(&cli.pipeline, &args),
        Command::Preview(args) => preview(&cli.pipeline, &args),
        Command::Remap(args) => remap(&cli.pipeline, &args),
        Command::Lut(args) => write_lut(&args),
    }
}

fn initialise_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn resolve(args: &PipelineArgs) -> Result<ResolvedConfig> {
    let resolved = resolve_config(args, paths::default_config_file())?;
    match &resolved.source {
        Some(path) => info!(config = %path.display(), "loaded pipeline configuration"),
        None => debug!("no pipeline configuration found; using built-in defaults"),
    }
    debug!(
        base = %resolved.resource_base,
        passes = resolved.config.passes.len(),
        seed = ?resolved.config.random_seed,
        "resolved pipeline"
    );
    Ok(resolved)
}

fn load_source(path: &Path) -> Result<RgbaImage> {
    let image = image::open(path)
        .with_context(|| format!("failed to read source image {}", path.display()))?;
    Ok(image.to_rgba8())
}

fn render(pipeline: &PipelineArgs, args: &RenderArgs) -> Result<()> {
    let resolved = resolve(pipeline)?;
    let source = load_source(&args.input)?;
    let size = CanvasSize::new(source.width(), source.height());

    let mut device =
        WgpuDevice::headless(size).context("failed to initialise headless GPU device")?;
    let profile = device.adapter_profile();
    info!(
        adapter = %profile.name,
        backend = ?profile.backend,
        software = profile.is_software(),
        "GPU ready"
    );

    let loader = resource_loader(&resolved)?;
    let mut renderer = build_renderer(&mut device, &loader, &pipeline_spec(&resolved.config), size)
        .context("failed to build post-processing pipeline")?;

    let mut host = ImageHost::still(source, size, args.time);
    host.set_pixel_scale(args.scale);
    if let Some(pointer) = args.pointer {
        let context = host.frame_context();
        let remapped = remap_pointer(&renderer, pointer, &context);
        info!(
            x = pointer.x,
            y = pointer.y,
            remapped_x = remapped.x,
            remapped_y = remapped.y,
            "pointer remapped"
        );
        host.set_pointer(remapped);
    }

    drive_frame(&mut renderer, &mut device, &mut host);
    let output = device.read_default_framebuffer()?;
    renderer.free(&mut device);

    output
        .save(&args.output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    info!(output = %args.output.display(), %size, "frame written");
    Ok(())
}

fn preview(pipeline: &PipelineArgs, args: &PreviewArgs) -> Result<()> {
    let resolved = resolve(pipeline)?;
    let source = load_source(&args.input)?;
    let size = args
        .size
        .unwrap_or_else(|| CanvasSize::new(source.width(), source.height()));
    let loader = resource_loader(&resolved)?;
    window::run_preview(&pipeline_spec(&resolved.config), &loader, source, size)
}

/// Applies the configured Retro-TV mappings on the CPU, in pipeline order.
fn remap(pipeline: &PipelineArgs, args: &RemapArgs) -> Result<()> {
    let resolved = resolve(pipeline)?;
    let point = remap_with(&curvatures(&resolved.config), Point::new(args.x, args.y), args.size);
    println!("{} {}", point.x, point.y);
    Ok(())
}

fn remap_with(curvatures: &[f32], point: Point, screen: CanvasSize) -> Point {
    curvatures
        .iter()
        .fold(point, |point, &curvature| barrel_inverse(point, screen, curvature))
}

fn write_lut(args: &LutArgs) -> Result<()> {
    let table = identity_lut(args.size);
    table
        .save(&args.output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    info!(
        output = %args.output.display(),
        cells = args.size,
        width = table.width(),
        height = table.height(),
        "identity lookup table written"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remap_without_retro_tv_is_identity() {
        let point = Point::new(12.0, 34.0);
        assert_eq!(remap_with(&[], point, CanvasSize::new(100, 100)), point);
    }

    #[test]
    fn remap_applies_each_curvature_in_turn() {
        let screen = CanvasSize::new(100, 100);
        let point = Point::new(10.0, 90.0);
        let once = barrel_inverse(point, screen, 0.2);
        let twice = barrel_inverse(once, screen, 0.3);
        assert_eq!(remap_with(&[0.2, 0.3], point, screen), twice);
    }

    #[test]
    fn lut_command_writes_a_readable_table() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("lut.png");
        write_lut(&LutArgs {
            size: 4,
            output: output.clone(),
        })
        .unwrap();

        let written = image::open(&output).unwrap().to_rgba8();
        assert_eq!(written.dimensions(), (16, 4));
        assert_eq!(written, identity_lut(4));
    }
}
