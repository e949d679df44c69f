//! Seam between whatever produces frames (a game loop, an image viewer, a test)
//! and the renderer. The host never hands the renderer anything but the values
//! below, sampled once per frame.

use image::RgbaImage;
use tracing::debug;

use crate::device::Device;
use crate::renderer::Renderer;
use crate::types::{CanvasSize, FrameContext, Point};

pub trait HostAdapter {
    /// Time, pointer, scale and sizes for the frame about to be drawn.
    fn frame_context(&mut self) -> FrameContext;

    /// The 2D frame to post-process, top row first.
    fn source_surface(&mut self) -> &RgbaImage;

    /// The latest canvas size in physical pixels if it changed since the
    /// previous call. Intermediate sizes may be coalesced.
    fn take_resize(&mut self) -> Option<CanvasSize>;
}

/// Applies a pending resize, then renders one frame from the host's surface.
pub fn drive_frame(renderer: &mut Renderer, device: &mut dyn Device, host: &mut dyn HostAdapter) {
    if let Some(size) = host.take_resize() {
        debug!(%size, "host resized");
        renderer.resize(device, size);
    }
    let context = host.frame_context();
    renderer.render(device, &context, host.source_surface());
}

/// Maps a pointer position on the visible output back into source-surface
/// coordinates, for hit-testing against the undistorted content.
pub fn remap_pointer(renderer: &Renderer, pointer: Point, context: &FrameContext) -> Point {
    renderer.transform_screen_point(pointer, context.logical_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::recording::RecordingDevice;
    use crate::device::UniformValue;
    use crate::pipeline::{build_renderer, PassSpec, PipelineSpec};
    use crate::pass::test_support::{loader, VERTEX};

    const RETRO_FRAGMENT: &str = "\
uniform sampler2D u_tex;
uniform float u_curvature;
uniform vec2 u_size;
uniform vec2 u_real_size;
uniform vec2 u_mouse;
void main() {}
";

    struct StillHost {
        surface: RgbaImage,
        context: FrameContext,
        resize: Option<CanvasSize>,
    }

    impl HostAdapter for StillHost {
        fn frame_context(&mut self) -> FrameContext {
            self.context
        }

        fn source_surface(&mut self) -> &RgbaImage {
            &self.surface
        }

        fn take_resize(&mut self) -> Option<CanvasSize> {
            self.resize.take()
        }
    }

    fn renderer(device: &mut RecordingDevice, size: CanvasSize) -> Renderer {
        let loader = loader(vec![
            ("shaders/default.vert.glsl", VERTEX.as_bytes().to_vec()),
            ("shaders/retro-tv.frag.glsl", RETRO_FRAGMENT.as_bytes().to_vec()),
        ]);
        let spec = PipelineSpec {
            vertex_shader: "shaders/default.vert.glsl".into(),
            passes: vec![PassSpec::RetroTv {
                fragment_shader: "shaders/retro-tv.frag.glsl".into(),
                curvature: 0.2,
            }],
            random_seed: Some(1),
        };
        build_renderer(device, &loader, &spec, size).unwrap()
    }

    #[test]
    fn pending_resize_is_applied_before_rendering() {
        let mut device = RecordingDevice::new();
        let mut renderer = renderer(&mut device, CanvasSize::new(8, 8));
        let mut host = StillHost {
            surface: RgbaImage::new(16, 12),
            context: FrameContext::still(CanvasSize::new(16, 12)),
            resize: Some(CanvasSize::new(16, 12)),
        };

        drive_frame(&mut renderer, &mut device, &mut host);

        assert_eq!(renderer.size(), CanvasSize::new(16, 12));
        assert_eq!(host.resize, None);
        let output = renderer.passes()[0].finish_rendering().id().unwrap();
        assert_eq!(device.texture_size(output), Some((16, 12)));
        let canvas = renderer.canvas_texture().id().unwrap();
        assert_eq!(device.texture_size(canvas), Some((16, 12)));

        renderer.free(&mut device);
        assert_eq!(device.live_objects(), 0);
    }

    #[test]
    fn frame_context_reaches_the_passes() {
        let mut device = RecordingDevice::new();
        let mut renderer = renderer(&mut device, CanvasSize::new(8, 8));
        let mut context = FrameContext::still(CanvasSize::new(8, 8));
        context.pointer = Point::new(3.0, 5.0);
        let mut host = StillHost {
            surface: RgbaImage::new(8, 8),
            context,
            resize: None,
        };

        drive_frame(&mut renderer, &mut device, &mut host);

        let draws = device.draws();
        assert_eq!(draws.len(), 2);
        let pass_program = draws[0].program.unwrap();
        assert_eq!(
            device.uniform_value(pass_program, "u_mouse"),
            Some(UniformValue::Vec2([3.0, 5.0]))
        );

        renderer.free(&mut device);
    }

    #[test]
    fn pointer_is_remapped_against_the_logical_size() {
        let mut device = RecordingDevice::new();
        let mut renderer = renderer(&mut device, CanvasSize::new(200, 100));
        let mut context = FrameContext::still(CanvasSize::new(200, 100));
        context.logical_size = CanvasSize::new(100, 50);
        context.pixel_scale = 2.0;

        let centre = remap_pointer(&renderer, Point::new(50.0, 25.0), &context);
        assert!((centre.x - 50.0).abs() < 1e-4);
        assert!((centre.y - 25.0).abs() < 1e-4);

        let corner = remap_pointer(&renderer, Point::new(100.0, 50.0), &context);
        assert!(corner.x > 100.0);
        assert!(corner.y > 50.0);

        renderer.free(&mut device);
    }
}
