use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fxconfig::{PassConfig, PipelineConfig};
use postfx::{PassSpec, PipelineSpec};
use resources::{fetcher_for_base, ResourceLoader};

use crate::cli::PipelineArgs;

/// Configuration after CLI overrides, with the resource base made usable from
/// the current directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub config: PipelineConfig,
    pub source: Option<PathBuf>,
    pub resource_base: String,
}

/// Loads `--config` (or `fallback` when absent), applies the remaining flags
/// and validates the result. Without either file the built-in defaults apply.
pub fn resolve_config(args: &PipelineArgs, fallback: Option<PathBuf>) -> Result<ResolvedConfig> {
    let source = args.config.clone().or(fallback);
    let mut config = match &source {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("failed to load pipeline configuration {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    if let Some(assets) = &args.assets {
        config.resource_base = assets.clone();
    }
    if let Some(seed) = args.seed {
        config.random_seed = Some(seed);
    }
    if let Some(curvature) = args.curvature {
        config.override_curvature(curvature);
    }
    config.validate().context("invalid pipeline configuration")?;

    // A relative base written in a config file is relative to that file.
    let config_dir = match (&args.assets, &source) {
        (None, Some(path)) => path.parent(),
        _ => None,
    };
    let resource_base = anchor_resource_base(&config.resource_base, config_dir);

    Ok(ResolvedConfig {
        config,
        source,
        resource_base,
    })
}

fn anchor_resource_base(base: &str, config_dir: Option<&Path>) -> String {
    let is_url = base.starts_with("http://") || base.starts_with("https://");
    match config_dir {
        Some(dir) if !is_url && Path::new(base).is_relative() => {
            dir.join(base).display().to_string()
        }
        _ => base.to_string(),
    }
}

pub fn pipeline_spec(config: &PipelineConfig) -> PipelineSpec {
    let passes = config
        .passes
        .iter()
        .map(|pass| match pass {
            PassConfig::Lut { fragment_shader, lut } => PassSpec::Lut {
                fragment_shader: fragment_shader.clone(),
                table: lut.clone(),
            },
            PassConfig::RetroTv {
                fragment_shader,
                curvature,
            } => PassSpec::RetroTv {
                fragment_shader: fragment_shader.clone(),
                curvature: *curvature,
            },
        })
        .collect();
    PipelineSpec {
        vertex_shader: config.vertex_shader.clone(),
        passes,
        random_seed: config.random_seed,
    }
}

pub fn resource_loader(resolved: &ResolvedConfig) -> Result<ResourceLoader> {
    let fetcher = fetcher_for_base(&resolved.resource_base)
        .with_context(|| format!("invalid resource base '{}'", resolved.resource_base))?;
    Ok(ResourceLoader::new(fetcher))
}

/// Curvatures of the Retro-TV passes, in pipeline order.
pub fn curvatures(config: &PipelineConfig) -> Vec<f32> {
    config
        .passes
        .iter()
        .filter_map(|pass| match pass {
            PassConfig::RetroTv { curvature, .. } => Some(*curvature),
            PassConfig::Lut { .. } => None,
        })
        .collect()
}
