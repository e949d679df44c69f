//! Owning wrappers around device objects.
//!
//! Each wrapper holds exactly one handle from the moment `create` succeeds until
//! `free` is called. Calling `free` a second time is a no-op. Using a wrapper after
//! `free` is a programming error and panics. Dropping a wrapper that still owns a
//! handle leaks the device object (the device is not reachable from `Drop`), so
//! it is reported with a warning.

mod buffer;
mod framebuffer;
mod shader;
mod texture;

pub use buffer::{attribute_layout, setup_vertex_attribute_pointers, AttribDescriptor, VertexBuffer};
pub use framebuffer::Framebuffer;
pub use shader::{Program, Shader, Uniform};
pub use texture::Texture2D;

use crate::device::ObjectKind;

fn warn_leak(kind: ObjectKind, raw: u32) {
    tracing::warn!(%kind, handle = raw, "{kind} dropped without being freed; device object leaked");
}

fn trace_double_free(kind: ObjectKind) {
    tracing::trace!(%kind, "free called on an already freed {kind}; ignoring");
}
