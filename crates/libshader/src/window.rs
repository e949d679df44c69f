//! Interactive preview: the pipeline applied to an image inside a winit
//! window, with cursor positions remapped through the distortion.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use image::RgbaImage;
use postfx::{
    build_renderer, drive_frame, remap_pointer, CanvasSize, HostAdapter, PipelineSpec, Point,
    Renderer, WgpuDevice,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use resources::ResourceLoader;
use tracing::{debug, error, info};
use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::{Window, WindowBuilder};

use crate::host::ImageHost;

/// Fields drop in declaration order; the surface owned by `device` has to go
/// before the window it was created from.
struct PreviewState {
    renderer: Renderer,
    device: WgpuDevice,
    host: ImageHost,
    window: Arc<Window>,
}

pub fn run_preview(
    spec: &PipelineSpec,
    loader: &ResourceLoader,
    source: RgbaImage,
    size: CanvasSize,
) -> Result<()> {
    let event_loop = EventLoop::new().context("failed to initialize event loop")?;
    let window = WindowBuilder::new()
        .with_title("libshader preview")
        .with_inner_size(PhysicalSize::new(size.width, size.height))
        .build(&event_loop)
        .context("failed to create preview window")?;
    let window = Arc::new(window);

    let inner = window.inner_size();
    let canvas = CanvasSize::new(inner.width.max(1), inner.height.max(1));
    let mut device = WgpuDevice::for_window(window.as_ref(), canvas)
        .context("failed to initialise GPU for the preview window")?;
    let profile = device.adapter_profile();
    info!(
        adapter = %profile.name,
        backend = ?profile.backend,
        software = profile.is_software(),
        "preview device ready"
    );

    let renderer = match build_renderer(&mut device, loader, spec, canvas) {
        Ok(renderer) => renderer,
        Err(err) => {
            error!("post-processing unavailable, showing the raw source: {err}");
            Renderer::new(&mut device, Vec::new(), canvas, StdRng::from_entropy())
                .context("failed to build pass-through renderer")?
        }
    };

    let host = ImageHost::animated(source, canvas, window.scale_factor() as f32);
    let mut state = PreviewState {
        renderer,
        device,
        host,
        window,
    };
    state.window.request_redraw();
    let preview = state.window.id();

    event_loop
        .run(move |event, elwt| {
            elwt.set_control_flow(ControlFlow::Wait);

            match event {
                Event::WindowEvent { window_id, event } if window_id == preview => match event {
                    WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                        state.renderer.free(&mut state.device);
                        elwt.exit();
                    }
                    WindowEvent::CursorMoved { position, .. } => {
                        state.pointer_moved(position.x as f32, position.y as f32);
                    }
                    WindowEvent::Resized(new_size) => {
                        state.resize(new_size);
                    }
                    WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                        state.host.set_pixel_scale(scale_factor as f32);
                    }
                    WindowEvent::RedrawRequested => {
                        state.redraw();
                    }
                    _ => {}
                },
                Event::AboutToWait => {
                    state.window.request_redraw();
                }
                _ => {}
            }
        })
        .map_err(|err| anyhow!("event loop error: {err}"))
}

impl PreviewState {
    /// `x`, `y` are physical pixels; the pipeline works in logical ones.
    fn pointer_moved(&mut self, x: f32, y: f32) {
        let context = self.host.frame_context();
        let raw = Point::new(x / context.pixel_scale, y / context.pixel_scale);
        let remapped = remap_pointer(&self.renderer, raw, &context);
        debug!(
            x = raw.x,
            y = raw.y,
            remapped_x = remapped.x,
            remapped_y = remapped.y,
            "pointer moved"
        );
        self.host.set_pointer(remapped);
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        let size = CanvasSize::new(size.width, size.height);
        if size.is_empty() {
            return;
        }
        self.device.resize_surface(size);
        self.host.resize(size);
    }

    fn redraw(&mut self) {
        if self.renderer.is_freed() {
            return;
        }
        drive_frame(&mut self.renderer, &mut self.device, &mut self.host);
        self.device.present();
    }
}
