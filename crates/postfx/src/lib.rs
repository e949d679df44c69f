//! Multi-pass GPU post-processing for frames produced by an external 2D
//! renderer: a lookup-table color grade and a Retro-TV barrel distortion,
//! plus the inverse mapping that keeps pointer hit-testing on the undistorted
//! content.
//!
//! ```text
//!   ResourceLoader ──load_all──▶ pipeline::build_renderer ──▶ Renderer
//!                                                               │
//!   HostAdapter ──FrameContext + RgbaImage──▶ Renderer::render ─┤
//!                                                               ▼
//!            canvas texture ─▶ pass 1 ─▶ … ─▶ pass n ─▶ blit (flip) ─▶ default framebuffer
//! ```
//!
//! Everything above the `device` module talks to the GPU through the
//! GL-style `Device` trait, so wrappers, passes and the renderer are exercised
//! without a GPU in tests. `backend::WgpuDevice` is the real implementation,
//! rendering headless or into a window surface.

pub mod backend;
pub mod blit;
pub mod device;
mod error;
pub mod gpu;
pub mod host;
pub mod pass;
pub mod pipeline;
pub mod renderer;
pub mod types;

pub use backend::{AdapterProfile, GpuPowerPreference, WgpuDevice};
pub use error::PipelineError;
pub use host::{drive_frame, remap_pointer, HostAdapter};
pub use pass::{barrel_inverse, identity_lut, Pass, DEFAULT_CURVATURE};
pub use pipeline::{build_renderer, PassSpec, PipelineSpec};
pub use renderer::Renderer;
pub use types::{CanvasSize, FrameContext, PassFrame, Point};
