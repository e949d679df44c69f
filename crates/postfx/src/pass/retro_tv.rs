use resources::ResourceLoader;

use crate::device::Device;
use crate::error::PipelineError;
use crate::gpu::{Texture2D, Uniform};
use crate::types::{CanvasSize, PassFrame, Point};

use super::{Pass, PassCore, PassResources};

pub const DEFAULT_CURVATURE: f32 = 0.2;

#[derive(Debug, Clone)]
pub struct RetroTvResources {
    pub shaders: PassResources,
}

impl RetroTvResources {
    pub fn register(loader: &ResourceLoader, vertex_shader: &str, fragment_shader: &str) -> Self {
        Self {
            shaders: PassResources::register(loader, vertex_shader, fragment_shader),
        }
    }
}

/// CRT look: barrel distortion, vignette and scanlines. A curvature of zero
/// leaves the image untouched.
pub struct RetroTvPass {
    core: PassCore,
    curvature: f32,
    curvature_uniform: Uniform,
}

impl RetroTvPass {
    pub fn new(
        device: &mut dyn Device,
        resources: &RetroTvResources,
        size: CanvasSize,
        random_seed: f32,
        curvature: f32,
    ) -> Result<Self, PipelineError> {
        let core = PassCore::new(device, "retro-tv", &resources.shaders, size, random_seed)?;
        let curvature_uniform = core.uniform(device, "u_curvature");
        Ok(Self {
            core,
            curvature,
            curvature_uniform,
        })
    }

    pub fn curvature(&self) -> f32 {
        self.curvature
    }
}

impl Pass for RetroTvPass {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn begin_rendering(&mut self, device: &mut dyn Device, frame: &PassFrame, input: &Texture2D) {
        self.core.begin(device, frame, input);
        self.curvature_uniform.set_f32(device, self.curvature);
    }

    fn finish_rendering(&self) -> &Texture2D {
        self.core.output()
    }

    fn transform_screen_point(&self, point: Point, screen: CanvasSize) -> Point {
        barrel_inverse(point, screen, self.curvature)
    }

    fn resize(&mut self, device: &mut dyn Device, size: CanvasSize) {
        self.core.resize(device, size);
    }

    fn free(&mut self, device: &mut dyn Device) {
        self.core.free(device);
    }
}

/// Maps a point on the distorted screen back to the content coordinate the
/// fragment program sampled for it. The program applies the same mapping per
/// fragment, so both sides agree for any `curvature`.
pub fn barrel_inverse(point: Point, screen: CanvasSize, curvature: f32) -> Point {
    if screen.is_empty() {
        return point;
    }
    let [width, height] = screen.as_vec2();
    let (x, y) = (point.x / width, point.y / height);
    let (cx, cy) = (0.5 - x, 0.5 - y);
    let d = (cx * cx + cy * cy) * curvature;
    Point::new((x - cx * (1.0 + d) * d) * width, (y - cy * (1.0 + d) * d) * height)
}
