//! Builds a renderer from a declarative pass list.
//!
//! Every pass registers its resources up front, the loader fetches them all at
//! once, and only then are GPU objects created. The first failure aborts the
//! whole build and frees whatever was already built.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use resources::ResourceLoader;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::PipelineError;
use crate::pass::{LutPass, LutResources, Pass, RetroTvPass, RetroTvResources};
use crate::renderer::Renderer;
use crate::types::CanvasSize;

#[derive(Clone, Debug, PartialEq)]
pub enum PassSpec {
    Lut { fragment_shader: String, table: String },
    RetroTv { fragment_shader: String, curvature: f32 },
}

#[derive(Clone, Debug, PartialEq)]
pub struct PipelineSpec {
    /// Shared by every pass.
    pub vertex_shader: String,
    pub passes: Vec<PassSpec>,
    /// Seeds the per-pass `u_random_seed` and the per-frame `u_random` draws.
    /// `None` seeds from entropy.
    pub random_seed: Option<u64>,
}

enum Registered {
    Lut(LutResources),
    RetroTv(RetroTvResources, f32),
}

pub fn build_renderer(
    device: &mut dyn Device,
    loader: &ResourceLoader,
    spec: &PipelineSpec,
    size: CanvasSize,
) -> Result<Renderer, PipelineError> {
    let registered: Vec<Registered> = spec
        .passes
        .iter()
        .map(|pass| match pass {
            PassSpec::Lut { fragment_shader, table } => Registered::Lut(LutResources::register(
                loader,
                &spec.vertex_shader,
                fragment_shader,
                table,
            )),
            PassSpec::RetroTv {
                fragment_shader,
                curvature,
            } => Registered::RetroTv(
                RetroTvResources::register(loader, &spec.vertex_shader, fragment_shader),
                *curvature,
            ),
        })
        .collect();

    info!(passes = registered.len(), source = %loader.describe(), "loading pipeline resources");
    loader.load_all()?;

    let mut rng = match spec.random_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut passes: Vec<Box<dyn Pass>> = Vec::with_capacity(registered.len());
    for resources in &registered {
        let seed = rng.gen::<f32>();
        let built: Result<Box<dyn Pass>, PipelineError> = match resources {
            Registered::Lut(resources) => LutPass::new(device, resources, size, seed)
                .map(|pass| Box::new(pass) as Box<dyn Pass>),
            Registered::RetroTv(resources, curvature) => {
                RetroTvPass::new(device, resources, size, seed, *curvature)
                    .map(|pass| Box::new(pass) as Box<dyn Pass>)
            }
        };
        match built {
            Ok(pass) => {
                debug!(pass = pass.name(), seed, "pass built");
                passes.push(pass);
            }
            Err(err) => {
                for pass in passes.iter_mut() {
                    pass.free(device);
                }
                return Err(err);
            }
        }
    }

    Renderer::new(device, passes, size, rng)
}
