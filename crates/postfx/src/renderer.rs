use image::RgbaImage;
use rand::rngs::StdRng;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::blit::{BLIT_FRAGMENT_SHADER, BLIT_VERTEX_SHADER, FLIP_VERTICAL};
use crate::device::{BufferUsage, Device, Primitive, TextureFilter, TextureFormat, TextureWrap};
use crate::error::PipelineError;
use crate::gpu::{
    setup_vertex_attribute_pointers, AttribDescriptor, Framebuffer, Program, Texture2D, Uniform,
    VertexBuffer,
};
use crate::pass::{
    link_program, Pass, INPUT_TEXTURE_UNIT, VERTEX_ATTRIB_POSITION_LOCATION,
    VERTEX_ATTRIB_TEXCOORD_LOCATION,
};
use crate::types::{CanvasSize, FrameContext, PassFrame, Point};

/// Interleaved `(x, y, u, v)` triangle strip covering clip space.
#[rustfmt::skip]
const QUAD_VERTICES: [f32; 16] = [
    -1.0, -1.0, 0.0, 0.0,
     1.0, -1.0, 1.0, 0.0,
    -1.0,  1.0, 0.0, 1.0,
     1.0,  1.0, 1.0, 1.0,
];
const QUAD_VERTEX_COUNT: u32 = 4;

const QUAD_ATTRIBUTES: [AttribDescriptor; 2] = [
    AttribDescriptor::floats(VERTEX_ATTRIB_POSITION_LOCATION, 2),
    AttribDescriptor::floats(VERTEX_ATTRIB_TEXCOORD_LOCATION, 2),
];

const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Chains passes through their render targets and composites the result onto
/// the visible framebuffer.
pub struct Renderer {
    quad: VertexBuffer,
    canvas: Texture2D,
    passes: Vec<Box<dyn Pass>>,
    blit: Program,
    blit_texture: Uniform,
    size: CanvasSize,
    rng: StdRng,
}

impl Renderer {
    /// Takes ownership of `passes`; they are freed again if construction fails.
    pub fn new(
        device: &mut dyn Device,
        mut passes: Vec<Box<dyn Pass>>,
        size: CanvasSize,
        rng: StdRng,
    ) -> Result<Self, PipelineError> {
        let (quad, canvas, blit) = match build_objects(device, size) {
            Ok(objects) => objects,
            Err(err) => {
                for pass in passes.iter_mut() {
                    pass.free(device);
                }
                return Err(err);
            }
        };
        blit.uniform(device, "u_transform").set_mat3(device, FLIP_VERTICAL);
        let blit_texture = blit.uniform(device, "u_tex");
        blit_texture.set_i32(device, INPUT_TEXTURE_UNIT as i32);

        device.viewport(0, 0, size.width, size.height);
        info!(
            passes = passes.len(),
            names = ?passes.iter().map(|pass| pass.name()).collect::<Vec<_>>(),
            %size,
            "renderer ready"
        );
        Ok(Self {
            quad,
            canvas,
            passes,
            blit,
            blit_texture,
            size,
            rng,
        })
    }

    pub fn size(&self) -> CanvasSize {
        self.size
    }

    pub fn passes(&self) -> &[Box<dyn Pass>] {
        &self.passes
    }

    pub fn canvas_texture(&self) -> &Texture2D {
        &self.canvas
    }

    /// Draws one frame: the source surface through every pass, then onto the
    /// default framebuffer.
    pub fn render(&mut self, device: &mut dyn Device, context: &FrameContext, source: &RgbaImage) {
        Framebuffer::unbind(device);
        device.clear_color(CLEAR_COLOR);
        device.clear();
        self.quad.bind(device);

        self.canvas.set_data(device, TextureFormat::Rgba, source);

        let mut input = &self.canvas;
        for pass in self.passes.iter_mut() {
            let frame = PassFrame {
                context: *context,
                random: self.rng.gen::<f32>(),
            };
            pass.begin_rendering(device, &frame, input);
            self.quad.draw(device, Primitive::TriangleStrip, 0, QUAD_VERTEX_COUNT);
            input = pass.finish_rendering();
        }

        Framebuffer::unbind(device);
        self.blit.bind(device);
        self.blit_texture
            .set_texture_2d(device, input, INPUT_TEXTURE_UNIT);
        self.quad.draw(device, Primitive::TriangleStrip, 0, QUAD_VERTEX_COUNT);
    }

    pub fn resize(&mut self, device: &mut dyn Device, size: CanvasSize) {
        if size.is_empty() {
            debug!(%size, "ignoring zero-sized resize");
            return;
        }
        self.canvas
            .reserve_data(device, TextureFormat::Rgba, size.width, size.height);
        for pass in self.passes.iter_mut() {
            pass.resize(device, size);
        }
        Framebuffer::unbind(device);
        device.viewport(0, 0, size.width, size.height);
        self.size = size;
        debug!(%size, "renderer resized");
    }

    /// Maps a point on the visible output back into source-surface
    /// coordinates, applying each pass's mapping in pass order.
    pub fn transform_screen_point(&self, point: Point, screen: CanvasSize) -> Point {
        self.passes
            .iter()
            .fold(point, |point, pass| pass.transform_screen_point(point, screen))
    }

    pub fn is_freed(&self) -> bool {
        self.quad.is_freed()
    }

    pub fn free(&mut self, device: &mut dyn Device) {
        if self.is_freed() {
            return;
        }
        for pass in self.passes.iter_mut() {
            pass.free(device);
        }
        self.blit.free(device);
        self.canvas.free(device);
        self.quad.free(device);
    }
}

/// Quad, canvas texture and blit program. Partial objects are freed on failure.
fn build_objects(
    device: &mut dyn Device,
    size: CanvasSize,
) -> Result<(VertexBuffer, Texture2D, Program), PipelineError> {
    let mut quad = VertexBuffer::create(device)?;
    quad.set_data(device, bytemuck::cast_slice(&QUAD_VERTICES), BufferUsage::StaticDraw);
    setup_vertex_attribute_pointers(device, &QUAD_ATTRIBUTES);

    let created =
        Texture2D::create_configured(device, TextureFilter::Linear, TextureWrap::ClampToEdge);
    let mut canvas = match created {
        Ok(texture) => texture,
        Err(err) => {
            quad.free(device);
            return Err(err);
        }
    };
    if size.is_empty() {
        warn!(%size, "renderer created with an empty canvas");
    } else {
        canvas.reserve_data(device, TextureFormat::Rgba, size.width, size.height);
    }

    match link_program(device, BLIT_VERTEX_SHADER, BLIT_FRAGMENT_SHADER) {
        Ok(blit) => Ok((quad, canvas, blit)),
        Err(err) => {
            canvas.free(device);
            quad.free(device);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use rand::SeedableRng;

    use super::*;
    use crate::device::recording::{Call, RecordingDevice};
    use crate::device::{ObjectKind, TextureId, UniformValue};

    type InputLog = Rc<RefCell<Vec<(&'static str, Option<TextureId>, f32)>>>;

    /// Renders into its own target and records what it was given.
    struct FakePass {
        name: &'static str,
        output: Texture2D,
        framebuffer: Framebuffer,
        log: InputLog,
        map: fn(Point) -> Point,
    }

    impl FakePass {
        fn boxed(
            device: &mut dyn Device,
            name: &'static str,
            log: &InputLog,
            map: fn(Point) -> Point,
        ) -> Box<dyn Pass> {
            let mut output = Texture2D::create(device).unwrap();
            output.reserve_data(device, TextureFormat::Rgba, 16, 16);
            let framebuffer = Framebuffer::create(device).unwrap();
            framebuffer.attach_color_texture_2d(device, &output, 0);
            Box::new(Self {
                name,
                output,
                framebuffer,
                log: Rc::clone(log),
                map,
            })
        }
    }

    impl Pass for FakePass {
        fn name(&self) -> &str {
            self.name
        }

        fn begin_rendering(
            &mut self,
            device: &mut dyn Device,
            frame: &PassFrame,
            input: &Texture2D,
        ) {
            self.framebuffer.bind(device);
            input.bind_to_unit(device, INPUT_TEXTURE_UNIT);
            self.log.borrow_mut().push((self.name, input.id(), frame.random));
        }

        fn finish_rendering(&self) -> &Texture2D {
            &self.output
        }

        fn transform_screen_point(&self, point: Point, _screen: CanvasSize) -> Point {
            (self.map)(point)
        }

        fn resize(&mut self, device: &mut dyn Device, size: CanvasSize) {
            self.output
                .reserve_data(device, TextureFormat::Rgba, size.width, size.height);
        }

        fn free(&mut self, device: &mut dyn Device) {
            self.framebuffer.free(device);
            self.output.free(device);
        }
    }

    const SIZE: CanvasSize = CanvasSize::new(16, 16);

    fn source() -> RgbaImage {
        RgbaImage::from_pixel(SIZE.width, SIZE.height, image::Rgba([10, 20, 30, 255]))
    }

    fn renderer(device: &mut RecordingDevice, passes: Vec<Box<dyn Pass>>) -> Renderer {
        Renderer::new(device, passes, SIZE, StdRng::seed_from_u64(7)).unwrap()
    }

    fn double(point: Point) -> Point {
        Point::new(point.x * 2.0, point.y * 2.0)
    }

    fn shift(point: Point) -> Point {
        Point::new(point.x + 1.0, point.y + 1.0)
    }

    #[test]
    fn passes_are_chained_through_their_outputs() {
        let mut device = RecordingDevice::new();
        let log = InputLog::default();
        let first = FakePass::boxed(&mut device, "first", &log, double);
        let second = FakePass::boxed(&mut device, "second", &log, shift);
        let first_output = first.finish_rendering().id();
        let second_output = second.finish_rendering().id();
        let mut renderer = renderer(&mut device, vec![first, second]);

        renderer.render(&mut device, &FrameContext::still(SIZE), &source());
        assert_eq!(device.bound_framebuffer(), None);

        let canvas = renderer.canvas_texture().id();
        let log = log.borrow();
        assert_eq!(log[0].0, "first");
        assert_eq!(log[0].1, canvas);
        assert_eq!(log[1].0, "second");
        assert_eq!(log[1].1, first_output);
        assert_ne!(log[0].2, log[1].2, "each pass draws its own random value");

        let draws = device.draws();
        assert_eq!(draws.len(), 3);
        let blit = draws[2];
        assert_eq!(blit.framebuffer, None);
        assert_eq!(blit.program, renderer.blit.id());
        assert_eq!(blit.units.get(&0).copied(), second_output);
        assert!(draws
            .iter()
            .all(|draw| draw.primitive == Primitive::TriangleStrip && draw.count == 4));

        renderer.free(&mut device);
        assert_eq!(device.live_objects(), 0);
    }

    #[test]
    fn frame_starts_with_a_clear_of_the_default_framebuffer() {
        let mut device = RecordingDevice::new();
        let mut renderer = renderer(&mut device, Vec::new());
        device.calls.clear();

        renderer.render(&mut device, &FrameContext::still(SIZE), &source());

        assert_eq!(device.calls[0], Call::Clear { framebuffer: None });
        assert_eq!(device.clear_color, CLEAR_COLOR);
        let canvas = renderer.canvas_texture().id().unwrap();
        assert!(matches!(
            device.calls[1],
            Call::TexImage { texture, width: 16, height: 16, uploaded: true } if texture == canvas
        ));
        renderer.free(&mut device);
    }

    #[test]
    fn without_passes_the_canvas_is_blitted() {
        let mut device = RecordingDevice::new();
        let mut renderer = renderer(&mut device, Vec::new());
        renderer.render(&mut device, &FrameContext::still(SIZE), &source());

        let draws = device.draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].framebuffer, None);
        assert_eq!(draws[0].units.get(&0).copied(), renderer.canvas_texture().id());
        renderer.free(&mut device);
    }

    #[test]
    fn blit_program_carries_the_flip() {
        let mut device = RecordingDevice::new();
        let mut renderer = renderer(&mut device, Vec::new());
        let program = renderer.blit.id().unwrap();
        assert_eq!(
            device.uniform_value(program, "u_transform"),
            Some(UniformValue::Mat3(FLIP_VERTICAL))
        );
        assert_eq!(
            device.buffer_contents(renderer.quad.id().unwrap()),
            Some(bytemuck::cast_slice::<f32, u8>(&QUAD_VERTICES))
        );
        assert_eq!(device.attribs[&VERTEX_ATTRIB_TEXCOORD_LOCATION].offset, 8);
        assert_eq!(device.attribs[&VERTEX_ATTRIB_POSITION_LOCATION].stride, 16);
        renderer.free(&mut device);
    }

    #[test]
    fn resize_reaches_canvas_passes_and_viewport() {
        let mut device = RecordingDevice::new();
        let log = InputLog::default();
        let pass = FakePass::boxed(&mut device, "only", &log, shift);
        let output = pass.finish_rendering().id().unwrap();
        let mut renderer = renderer(&mut device, vec![pass]);

        renderer.resize(&mut device, CanvasSize::new(640, 480));
        assert_eq!(renderer.size(), CanvasSize::new(640, 480));
        assert_eq!(
            device.texture_size(renderer.canvas_texture().id().unwrap()),
            Some((640, 480))
        );
        assert_eq!(device.texture_size(output), Some((640, 480)));
        assert_eq!(device.viewport, Some((0, 0, 640, 480)));

        renderer.resize(&mut device, CanvasSize::new(0, 480));
        assert_eq!(renderer.size(), CanvasSize::new(640, 480));
        assert_eq!(device.viewport, Some((0, 0, 640, 480)));

        renderer.free(&mut device);
    }

    #[test]
    fn screen_points_compose_in_pass_order() {
        let mut device = RecordingDevice::new();
        let log = InputLog::default();
        let passes = vec![
            FakePass::boxed(&mut device, "double", &log, double),
            FakePass::boxed(&mut device, "shift", &log, shift),
        ];
        let mut chained = renderer(&mut device, passes);
        let mapped = chained.transform_screen_point(Point::new(3.0, 4.0), SIZE);
        assert_eq!(mapped, Point::new(7.0, 9.0));
        chained.free(&mut device);

        let mut empty = renderer(&mut device, Vec::new());
        assert_eq!(
            empty.transform_screen_point(Point::new(3.0, 4.0), SIZE),
            Point::new(3.0, 4.0)
        );
        empty.free(&mut device);
    }

    #[test]
    fn free_is_idempotent() {
        let mut device = RecordingDevice::new();
        let log = InputLog::default();
        let pass = FakePass::boxed(&mut device, "only", &log, shift);
        let mut renderer = renderer(&mut device, vec![pass]);
        renderer.free(&mut device);
        renderer.free(&mut device);
        assert!(renderer.is_freed());
        assert_eq!(device.deletions(ObjectKind::Program), 1);
        assert_eq!(device.deletions(ObjectKind::Framebuffer), 1);
        assert_eq!(device.live_objects(), 0);
    }

    #[test]
    fn failed_construction_frees_passes() {
        let mut device = RecordingDevice::new();
        let log = InputLog::default();
        let pass = FakePass::boxed(&mut device, "only", &log, shift);
        device.fail_allocations(ObjectKind::Program);

        let err = Renderer::new(&mut device, vec![pass], SIZE, StdRng::seed_from_u64(1))
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::Allocation(ObjectKind::Program)));
        assert_eq!(device.live_objects(), 0);
    }
}
