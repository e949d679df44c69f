use std::time::Instant;

use image::RgbaImage;
use postfx::{CanvasSize, FrameContext, HostAdapter, Point};

enum Clock {
    Fixed(f32),
    Running(Instant),
}

/// Feeds a decoded image to the renderer as the source surface of every frame.
pub struct ImageHost {
    surface: RgbaImage,
    clock: Clock,
    pointer: Point,
    pixel_scale: f32,
    real_size: CanvasSize,
    pending_resize: Option<CanvasSize>,
}

impl ImageHost {
    /// A single frame at a fixed time, as rendered by `render`.
    pub fn still(surface: RgbaImage, real_size: CanvasSize, time: f32) -> Self {
        Self {
            surface,
            clock: Clock::Fixed(time),
            pointer: Point::default(),
            pixel_scale: 1.0,
            real_size,
            pending_resize: None,
        }
    }

    /// Time runs from construction, for the preview window.
    pub fn animated(surface: RgbaImage, real_size: CanvasSize, pixel_scale: f32) -> Self {
        Self {
            surface,
            clock: Clock::Running(Instant::now()),
            pointer: Point::default(),
            pixel_scale,
            real_size,
            pending_resize: None,
        }
    }

    pub fn set_pointer(&mut self, pointer: Point) {
        self.pointer = pointer;
    }

    pub fn set_pixel_scale(&mut self, pixel_scale: f32) {
        if pixel_scale.is_finite() && pixel_scale > 0.0 {
            self.pixel_scale = pixel_scale;
        }
    }

    /// Records a new drawing-buffer size, applied on the next frame.
    pub fn resize(&mut self, size: CanvasSize) {
        if size != self.real_size {
            self.real_size = size;
            self.pending_resize = Some(size);
        }
    }

    pub fn real_size(&self) -> CanvasSize {
        self.real_size
    }

    pub fn logical_size(&self) -> CanvasSize {
        CanvasSize::new(
            (self.real_size.width as f32 / self.pixel_scale).round() as u32,
            (self.real_size.height as f32 / self.pixel_scale).round() as u32,
        )
    }
}

impl HostAdapter for ImageHost {
    fn frame_context(&mut self) -> FrameContext {
        let time = match self.clock {
            Clock::Fixed(time) => time,
            Clock::Running(started) => started.elapsed().as_secs_f32(),
        };
        FrameContext {
            time,
            pointer: self.pointer,
            pixel_scale: self.pixel_scale,
            logical_size: self.logical_size(),
            real_size: self.real_size,
        }
    }

    fn source_surface(&mut self) -> &RgbaImage {
        &self.surface
    }

    fn take_resize(&mut self) -> Option<CanvasSize> {
        self.pending_resize.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn still_host_reports_fixed_time_and_scaled_logical_size() {
        let mut host = ImageHost::still(RgbaImage::new(4, 4), CanvasSize::new(200, 100), 1.5);
        host.set_pixel_scale(2.0);
        host.set_pointer(Point::new(3.0, 4.0));

        let context = host.frame_context();
        assert_eq!(context.time, 1.5);
        assert_eq!(context.pointer, Point::new(3.0, 4.0));
        assert_eq!(context.real_size, CanvasSize::new(200, 100));
        assert_eq!(context.logical_size, CanvasSize::new(100, 50));
        assert_eq!(host.frame_context().time, 1.5);
    }

    #[test]
    fn resizes_are_coalesced_and_taken_once() {
        let mut host = ImageHost::animated(RgbaImage::new(4, 4), CanvasSize::new(10, 10), 1.0);
        assert_eq!(host.take_resize(), None);

        host.resize(CanvasSize::new(10, 10));
        assert_eq!(host.take_resize(), None);

        host.resize(CanvasSize::new(20, 10));
        host.resize(CanvasSize::new(30, 15));
        assert_eq!(host.take_resize(), Some(CanvasSize::new(30, 15)));
        assert_eq!(host.take_resize(), None);
        assert_eq!(host.frame_context().real_size, CanvasSize::new(30, 15));
    }

    #[test]
    fn invalid_scales_are_ignored() {
        let mut host = ImageHost::animated(RgbaImage::new(1, 1), CanvasSize::new(8, 8), 1.0);
        host.set_pixel_scale(0.0);
        host.set_pixel_scale(f32::NAN);
        assert_eq!(host.frame_context().pixel_scale, 1.0);
    }
}
