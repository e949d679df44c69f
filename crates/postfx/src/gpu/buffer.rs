use crate::device::{
    AttribKind, BufferId, BufferUsage, Device, ObjectKind, Primitive, VertexAttrib,
};
use crate::error::PipelineError;

use super::{trace_double_free, warn_leak};

#[derive(Debug)]
pub struct VertexBuffer {
    id: Option<BufferId>,
}

impl VertexBuffer {
    pub fn create(device: &mut dyn Device) -> Result<Self, PipelineError> {
        let id = device
            .create_buffer()
            .ok_or(PipelineError::Allocation(ObjectKind::Buffer))?;
        Ok(Self { id: Some(id) })
    }

    pub fn id(&self) -> Option<BufferId> {
        self.id
    }

    pub fn is_freed(&self) -> bool {
        self.id.is_none()
    }

    fn handle(&self) -> BufferId {
        self.id.expect("vertex buffer used after free")
    }

    pub fn bind(&self, device: &mut dyn Device) {
        device.bind_array_buffer(Some(self.handle()));
    }

    pub fn unbind(device: &mut dyn Device) {
        device.bind_array_buffer(None);
    }

    /// Binds the buffer and replaces its contents. The buffer stays bound.
    pub fn set_data(&self, device: &mut dyn Device, data: &[u8], usage: BufferUsage) {
        self.bind(device);
        device.buffer_data(data, usage);
    }

    pub fn draw(&self, device: &mut dyn Device, primitive: Primitive, first: u32, count: u32) {
        self.handle();
        device.draw_arrays(primitive, first, count);
    }

    pub fn free(&mut self, device: &mut dyn Device) {
        match self.id.take() {
            Some(id) => device.delete_buffer(id),
            None => trace_double_free(ObjectKind::Buffer),
        }
    }
}

impl Drop for VertexBuffer {
    fn drop(&mut self) {
        if let Some(id) = self.id {
            warn_leak(ObjectKind::Buffer, id.raw());
        }
    }
}

/// One interleaved vertex attribute as declared by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttribDescriptor {
    pub location: u32,
    pub kind: AttribKind,
    pub count: u32,
    pub normalize: bool,
}

impl AttribDescriptor {
    pub const fn floats(location: u32, count: u32) -> Self {
        Self {
            location,
            kind: AttribKind::Float,
            count,
            normalize: false,
        }
    }

    pub const fn size(&self) -> u32 {
        self.kind.size() * self.count
    }
}

/// Interleaved layout for `attribs`: the shared stride and each attribute's
/// offset, accumulated in list order.
pub fn attribute_layout(attribs: &[AttribDescriptor]) -> (u32, Vec<u32>) {
    let mut offsets = Vec::with_capacity(attribs.len());
    let mut stride = 0;
    for attrib in attribs {
        offsets.push(stride);
        stride += attrib.size();
    }
    (stride, offsets)
}

/// Points every attribute in `attribs` at the bound array buffer. Call once,
/// after binding the buffer and before drawing with it. Returns the stride.
pub fn setup_vertex_attribute_pointers(
    device: &mut dyn Device,
    attribs: &[AttribDescriptor],
) -> u32 {
    let (stride, offsets) = attribute_layout(attribs);
    for (attrib, offset) in attribs.iter().zip(offsets) {
        device.vertex_attrib_pointer(VertexAttrib {
            location: attrib.location,
            kind: attrib.kind,
            count: attrib.count,
            normalize: attrib.normalize,
            stride,
            offset,
        });
    }
    stride
}
