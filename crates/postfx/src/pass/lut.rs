use std::sync::Arc;

use image::{Rgba, RgbaImage};
use resources::{ImageResource, ResourceLoader};
use tracing::debug;

use crate::device::{Device, TextureFilter, TextureFormat, TextureWrap};
use crate::error::PipelineError;
use crate::gpu::{Texture2D, Uniform};
use crate::types::{CanvasSize, PassFrame};

use super::{Pass, PassCore, PassResources};

pub const LUT_TEXTURE_UNIT: u32 = 1;

#[derive(Debug, Clone)]
pub struct LutResources {
    pub shaders: PassResources,
    pub table: Arc<ImageResource>,
}

impl LutResources {
    pub fn register(
        loader: &ResourceLoader,
        vertex_shader: &str,
        fragment_shader: &str,
        table: &str,
    ) -> Self {
        Self {
            shaders: PassResources::register(loader, vertex_shader, fragment_shader),
            table: loader.image_resource(table),
        }
    }
}

/// Color grade through a lookup table strip of `N` cells, each `N x N`.
pub struct LutPass {
    core: PassCore,
    table: Texture2D,
    table_uniform: Uniform,
}

impl LutPass {
    pub fn new(
        device: &mut dyn Device,
        resources: &LutResources,
        size: CanvasSize,
        random_seed: f32,
    ) -> Result<Self, PipelineError> {
        let image = resources.table.data()?;
        let mut core = PassCore::new(device, "lut", &resources.shaders, size, random_seed)?;

        let created =
            Texture2D::create_configured(device, TextureFilter::Linear, TextureWrap::ClampToEdge);
        let mut table = match created {
            Ok(texture) => texture,
            Err(err) => {
                core.free(device);
                return Err(err);
            }
        };
        table.set_data(device, TextureFormat::Rgba, &image);

        core.program().bind(device);
        let (width, height) = image.dimensions();
        core.uniform(device, "u_lut_size")
            .set_vec2(device, width as f32, height as f32);
        let table_uniform = core.uniform(device, "u_tex_lut");
        table_uniform.set_i32(device, LUT_TEXTURE_UNIT as i32);
        debug!(
            pass = core.name(),
            width,
            height,
            path = resources.table.path(),
            "lookup table uploaded"
        );

        Ok(Self {
            core,
            table,
            table_uniform,
        })
    }

    pub fn table(&self) -> &Texture2D {
        &self.table
    }
}

impl Pass for LutPass {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn begin_rendering(&mut self, device: &mut dyn Device, frame: &PassFrame, input: &Texture2D) {
        self.core.begin(device, frame, input);
        self.table_uniform
            .set_texture_2d(device, &self.table, LUT_TEXTURE_UNIT);
    }

    fn finish_rendering(&self) -> &Texture2D {
        self.core.output()
    }

    fn resize(&mut self, device: &mut dyn Device, size: CanvasSize) {
        self.core.resize(device, size);
    }

    fn free(&mut self, device: &mut dyn Device) {
        self.table.free(device);
        self.core.free(device);
    }
}

/// Builds a table that maps every color to itself: `N * N` pixels wide, `N`
/// high. Red runs across a cell, green down it, blue selects the cell.
pub fn identity_lut(n: u32) -> RgbaImage {
    let n = n.max(2);
    let scale = 255.0 / (n - 1) as f32;
    let level = |i: u32| (i as f32 * scale).round() as u8;
    RgbaImage::from_fn(n * n, n, |x, y| Rgba([level(x % n), level(y), level(x / n), 255]))
}
