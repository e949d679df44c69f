use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Pixel dimensions of a canvas or render target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl CanvasSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn as_vec2(&self) -> [f32; 2] {
        [self.width as f32, self.height as f32]
    }
}

impl fmt::Display for CanvasSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Host state sampled once per frame and handed to the renderer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameContext {
    /// Seconds since the host started animating.
    pub time: f32,
    /// Pointer position in raw screen pixels.
    pub pointer: Point,
    /// Device pixel scale factor.
    pub pixel_scale: f32,
    /// Size the host lays content out in.
    pub logical_size: CanvasSize,
    /// Size of the drawing buffer in physical pixels.
    pub real_size: CanvasSize,
}

impl FrameContext {
    /// A context with no scaling, where logical and real sizes coincide.
    pub fn still(size: CanvasSize) -> Self {
        Self {
            time: 0.0,
            pointer: Point::default(),
            pixel_scale: 1.0,
            logical_size: size,
            real_size: size,
        }
    }
}

/// What a single pass sees for one frame: the shared context plus the random
/// scalar drawn for it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PassFrame {
    pub context: FrameContext,
    pub random: f32,
}
