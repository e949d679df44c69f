//! Effect passes.
//!
//! A pass owns a program, an output texture and a framebuffer rendering into
//! it. The renderer only talks to passes through the `Pass` trait; `PassCore`
//! carries the construction and per-frame work every pass shares.

mod lut;
mod retro_tv;

use std::sync::Arc;

use resources::{ResourceLoader, TextResource};
use tracing::{debug, warn};

use crate::device::{Device, ShaderStage, TextureFilter, TextureFormat, TextureWrap};
use crate::error::PipelineError;
use crate::gpu::{Framebuffer, Program, Shader, Texture2D, Uniform};
use crate::types::{CanvasSize, PassFrame, Point};

pub use lut::{identity_lut, LutPass, LutResources};
pub use retro_tv::{barrel_inverse, RetroTvPass, RetroTvResources, DEFAULT_CURVATURE};

pub const VERTEX_ATTRIB_POSITION_LOCATION: u32 = 0;
pub const VERTEX_ATTRIB_TEXCOORD_LOCATION: u32 = 1;
pub const INPUT_TEXTURE_UNIT: u32 = 0;

pub trait Pass {
    fn name(&self) -> &str;

    /// Prepares the pass to draw `input`: sizes and binds the output target,
    /// binds the program and writes this frame's uniforms. Does not draw.
    fn begin_rendering(&mut self, device: &mut dyn Device, frame: &PassFrame, input: &Texture2D);

    /// The texture the pass rendered into, to be consumed by the next stage.
    fn finish_rendering(&self) -> &Texture2D;

    /// Maps a point on the pass's visible output back to the input coordinate
    /// that was drawn there.
    fn transform_screen_point(&self, point: Point, _screen: CanvasSize) -> Point {
        point
    }

    fn resize(&mut self, device: &mut dyn Device, size: CanvasSize);

    fn free(&mut self, device: &mut dyn Device);
}

/// Shader sources every pass needs.
#[derive(Debug, Clone)]
pub struct PassResources {
    pub vertex_shader: Arc<TextResource>,
    pub fragment_shader: Arc<TextResource>,
}

impl PassResources {
    pub fn register(loader: &ResourceLoader, vertex_shader: &str, fragment_shader: &str) -> Self {
        Self {
            vertex_shader: loader.text_resource(vertex_shader),
            fragment_shader: loader.text_resource(fragment_shader),
        }
    }
}

struct StandardUniforms {
    time: Uniform,
    random: Uniform,
    size: Uniform,
    real_size: Uniform,
    mouse: Uniform,
    context_scale: Uniform,
    input: Uniform,
}

impl StandardUniforms {
    fn resolve(device: &dyn Device, program: &Program) -> Self {
        Self {
            time: program.uniform(device, "u_time"),
            random: program.uniform(device, "u_random"),
            size: program.uniform(device, "u_size"),
            real_size: program.uniform(device, "u_real_size"),
            mouse: program.uniform(device, "u_mouse"),
            context_scale: program.uniform(device, "u_context_scale"),
            input: program.uniform(device, "u_tex"),
        }
    }
}

/// Program, render target and standard uniforms shared by every pass.
pub struct PassCore {
    name: &'static str,
    program: Program,
    output: Texture2D,
    framebuffer: Framebuffer,
    uniforms: StandardUniforms,
}

impl PassCore {
    /// Builds the program from loaded sources and a render target of `size`.
    /// Anything allocated before a failure is freed again.
    pub fn new(
        device: &mut dyn Device,
        name: &'static str,
        resources: &PassResources,
        size: CanvasSize,
        random_seed: f32,
    ) -> Result<Self, PipelineError> {
        let vertex_source = resources.vertex_shader.data()?;
        let fragment_source = resources.fragment_shader.data()?;

        let program = link_program(device, &vertex_source, &fragment_source)?;
        let core = Self::with_program(device, name, program, size)?;
        core.program
            .uniform(device, "u_random_seed")
            .set_f32(device, random_seed);
        core.uniforms.input.set_i32(device, INPUT_TEXTURE_UNIT as i32);
        debug!(pass = name, width = size.width, height = size.height, "pass constructed");
        Ok(core)
    }

    fn with_program(
        device: &mut dyn Device,
        name: &'static str,
        mut program: Program,
        size: CanvasSize,
    ) -> Result<Self, PipelineError> {
        let created =
            Texture2D::create_configured(device, TextureFilter::Linear, TextureWrap::ClampToEdge);
        let mut output = match created {
            Ok(texture) => texture,
            Err(err) => {
                program.free(device);
                return Err(err);
            }
        };
        output.reserve_data(device, TextureFormat::Rgba, size.width, size.height);

        let mut framebuffer = match Framebuffer::create(device) {
            Ok(framebuffer) => framebuffer,
            Err(err) => {
                output.free(device);
                program.free(device);
                return Err(err);
            }
        };
        framebuffer.attach_color_texture_2d(device, &output, 0);
        let complete = framebuffer.ensure_complete(device);
        Framebuffer::unbind(device);
        if let Err(err) = complete {
            framebuffer.free(device);
            output.free(device);
            program.free(device);
            return Err(err);
        }

        let uniforms = StandardUniforms::resolve(device, &program);
        Ok(Self {
            name,
            program,
            output,
            framebuffer,
            uniforms,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn output(&self) -> &Texture2D {
        &self.output
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }

    pub fn uniform(&self, device: &dyn Device, name: &str) -> Uniform {
        self.program.uniform(device, name)
    }

    /// Common half of `Pass::begin_rendering`.
    pub fn begin(&mut self, device: &mut dyn Device, frame: &PassFrame, input: &Texture2D) {
        let context = &frame.context;
        if self.output.size() != Some(context.real_size) {
            self.reserve(device, context.real_size);
        }

        self.framebuffer.bind(device);
        self.program.bind(device);

        let u = &self.uniforms;
        u.time.set_f32(device, context.time);
        u.random.set_f32(device, frame.random);
        let [width, height] = context.logical_size.as_vec2();
        u.size.set_vec2(device, width, height);
        let [width, height] = context.real_size.as_vec2();
        u.real_size.set_vec2(device, width, height);
        u.mouse.set_vec2(device, context.pointer.x, context.pointer.y);
        u.context_scale.set_f32(device, context.pixel_scale);
        u.input.set_texture_2d(device, input, INPUT_TEXTURE_UNIT);
    }

    /// Reallocates the render target and re-checks the framebuffer.
    pub fn resize(&mut self, device: &mut dyn Device, size: CanvasSize) {
        self.reserve(device, size);
        if let Err(err) = self.framebuffer.ensure_complete(device) {
            warn!(pass = self.name, %size, "{err}");
        }
        Framebuffer::unbind(device);
    }

    fn reserve(&mut self, device: &mut dyn Device, size: CanvasSize) {
        debug!(pass = self.name, width = size.width, height = size.height, "reserving pass target");
        self.output
            .reserve_data(device, TextureFormat::Rgba, size.width, size.height);
    }

    pub fn free(&mut self, device: &mut dyn Device) {
        self.framebuffer.free(device);
        self.output.free(device);
        self.program.free(device);
    }
}

/// Compiles both stages and links them with the quad's attribute locations.
/// The shaders are released once the program exists.
pub(crate) fn link_program(
    device: &mut dyn Device,
    vertex: &str,
    fragment: &str,
) -> Result<Program, PipelineError> {
    let mut vertex = Shader::compile(device, ShaderStage::Vertex, vertex)?;
    let mut fragment = match Shader::compile(device, ShaderStage::Fragment, fragment) {
        Ok(shader) => shader,
        Err(err) => {
            vertex.free(device);
            return Err(err);
        }
    };

    let program = Program::link(device, &vertex, &fragment, |device, program| {
        program
            .request_attribute_location(device, "a_position", VERTEX_ATTRIB_POSITION_LOCATION)
            .request_attribute_location(device, "a_texcoord", VERTEX_ATTRIB_TEXCOORD_LOCATION);
    });
    vertex.free(device);
    fragment.free(device);
    program
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::device::recording::RecordingDevice;
    use crate::device::{ObjectKind, Primitive, UniformValue};
    use crate::gpu::VertexBuffer;
    use crate::types::FrameContext;

    fn resources(fragment: &str) -> (ResourceLoader, PassResources) {
        let loader = loader(vec![
            ("shaders/default.vert.glsl", VERTEX.as_bytes().to_vec()),
            ("shaders/plain.frag.glsl", fragment.as_bytes().to_vec()),
        ]);
        let resources = PassResources::register(
            &loader,
            "shaders/default.vert.glsl",
            "shaders/plain.frag.glsl",
        );
        loader.load_all().unwrap();
        (loader, resources)
    }

    fn frame(size: CanvasSize) -> PassFrame {
        PassFrame {
            context: FrameContext {
                time: 2.5,
                pointer: Point::new(10.0, 20.0),
                pixel_scale: 2.0,
                logical_size: CanvasSize::new(size.width / 2, size.height / 2),
                real_size: size,
            },
            random: 0.25,
        }
    }

    #[test]
    fn construction_builds_target_and_writes_seed() {
        let mut device = RecordingDevice::new();
        let (_loader, resources) = resources(PLAIN_FRAGMENT);
        let mut core = PassCore::new(
            &mut device,
            "plain",
            &resources,
            CanvasSize::new(64, 32),
            0.75,
        )
        .unwrap();

        let program = core.program().id().unwrap();
        assert_eq!(
            device.uniform_value(program, "u_random_seed"),
            Some(UniformValue::Float(0.75))
        );
        assert_eq!(
            device.program_attrib_locations(program),
            vec![(0, "a_position".to_string()), (1, "a_texcoord".to_string())]
        );
        let output = core.output().id().unwrap();
        assert_eq!(device.texture_size(output), Some((64, 32)));
        assert_eq!(
            device.framebuffer_attachment(core.framebuffer().id().unwrap()),
            Some(output)
        );
        // shaders are released once linked
        assert_eq!(device.deletions(ObjectKind::Shader), 2);

        core.free(&mut device);
        assert_eq!(device.live_objects(), 0);
    }

    #[test]
    fn begin_writes_standard_uniforms_and_binds_input() {
        let mut device = RecordingDevice::new();
        let (_loader, resources) = resources(PLAIN_FRAGMENT);
        let mut core = PassCore::new(
            &mut device,
            "plain",
            &resources,
            CanvasSize::new(64, 32),
            0.5,
        )
        .unwrap();
        let mut input = Texture2D::create(&mut device).unwrap();

        core.begin(&mut device, &frame(CanvasSize::new(64, 32)), &input);
        let mut quad = VertexBuffer::create(&mut device).unwrap();
        quad.bind(&mut device);
        quad.draw(&mut device, Primitive::TriangleStrip, 0, 4);
        quad.free(&mut device);

        let program = core.program().id().unwrap();
        let value = |name| device.uniform_value(program, name);
        assert_eq!(value("u_time"), Some(UniformValue::Float(2.5)));
        assert_eq!(value("u_random"), Some(UniformValue::Float(0.25)));
        assert_eq!(value("u_size"), Some(UniformValue::Vec2([32.0, 16.0])));
        assert_eq!(value("u_real_size"), Some(UniformValue::Vec2([64.0, 32.0])));
        assert_eq!(value("u_mouse"), Some(UniformValue::Vec2([10.0, 20.0])));
        assert_eq!(value("u_context_scale"), Some(UniformValue::Float(2.0)));
        assert_eq!(value("u_tex"), Some(UniformValue::Int(0)));

        let draw = device.draws()[0].clone();
        assert_eq!(draw.framebuffer, core.framebuffer().id());
        assert_eq!(draw.program, Some(program));
        assert_eq!(draw.units.get(&0).copied(), input.id());

        input.free(&mut device);
        core.free(&mut device);
    }

    #[test]
    fn begin_re_reserves_when_canvas_changes() {
        let mut device = RecordingDevice::new();
        let (_loader, resources) = resources(PLAIN_FRAGMENT);
        let mut core = PassCore::new(
            &mut device,
            "plain",
            &resources,
            CanvasSize::new(64, 32),
            0.5,
        )
        .unwrap();
        let mut input = Texture2D::create(&mut device).unwrap();

        core.begin(&mut device, &frame(CanvasSize::new(100, 50)), &input);
        assert_eq!(
            device.texture_size(core.output().id().unwrap()),
            Some((100, 50))
        );

        input.free(&mut device);
        core.free(&mut device);
    }

    #[test]
    fn compile_failure_releases_everything() {
        let mut device = RecordingDevice::new();
        let (_loader, resources) = resources("#error broken shader");
        let err = PassCore::new(&mut device, "plain", &resources, CanvasSize::new(8, 8), 0.0)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            PipelineError::Compile {
                stage: ShaderStage::Fragment,
                ..
            }
        ));
        assert_eq!(device.live_objects(), 0);
    }

    #[test]
    fn zero_sized_target_is_incomplete() {
        let mut device = RecordingDevice::new();
        let (_loader, resources) = resources(PLAIN_FRAGMENT);
        let err = PassCore::new(&mut device, "plain", &resources, CanvasSize::new(0, 0), 0.0)
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::FramebufferIncomplete(_)));
        assert_eq!(device.live_objects(), 0);
    }

    #[test]
    fn framebuffer_allocation_failure_releases_program() {
        let mut device = RecordingDevice::new();
        let (_loader, resources) = resources(PLAIN_FRAGMENT);
        device.fail_allocations(ObjectKind::Framebuffer);
        let err = PassCore::new(&mut device, "plain", &resources, CanvasSize::new(8, 8), 0.0)
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::Allocation(ObjectKind::Framebuffer)));
        assert_eq!(device.live_objects(), 0);
    }

    #[test]
    fn unloaded_resources_are_reported() {
        let mut device = RecordingDevice::new();
        let loader = loader(Vec::new());
        let resources = PassResources::register(
            &loader,
            "shaders/default.vert.glsl",
            "shaders/plain.frag.glsl",
        );
        let err = PassCore::new(&mut device, "plain", &resources, CanvasSize::new(8, 8), 0.0)
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::ResourceLoad(_)));
        assert_eq!(device.live_objects(), 0);
    }
}
