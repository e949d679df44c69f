use crate::device::{Device, FramebufferId, FramebufferStatus, ObjectKind};
use crate::error::PipelineError;

use super::texture::Texture2D;
use super::{trace_double_free, warn_leak};

#[derive(Debug)]
pub struct Framebuffer {
    id: Option<FramebufferId>,
}

impl Framebuffer {
    pub fn create(device: &mut dyn Device) -> Result<Self, PipelineError> {
        let id = device
            .create_framebuffer()
            .ok_or(PipelineError::Allocation(ObjectKind::Framebuffer))?;
        Ok(Self { id: Some(id) })
    }

    pub fn id(&self) -> Option<FramebufferId> {
        self.id
    }

    fn handle(&self) -> FramebufferId {
        self.id.expect("framebuffer used after free")
    }

    pub fn bind(&self, device: &mut dyn Device) {
        device.bind_framebuffer(Some(self.handle()));
    }

    /// Rebinds the default (visible) framebuffer.
    pub fn unbind(device: &mut dyn Device) {
        device.bind_framebuffer(None);
    }

    /// Binds the framebuffer and renders into `texture` at color attachment `index`.
    pub fn attach_color_texture_2d(
        &self,
        device: &mut dyn Device,
        texture: &Texture2D,
        index: u32,
    ) {
        self.bind(device);
        device.framebuffer_texture_2d(index, texture.id());
    }

    pub fn status(&self, device: &mut dyn Device) -> FramebufferStatus {
        self.bind(device);
        device.check_framebuffer_status()
    }

    pub fn is_complete(&self, device: &mut dyn Device) -> bool {
        self.status(device) == FramebufferStatus::Complete
    }

    pub fn ensure_complete(&self, device: &mut dyn Device) -> Result<(), PipelineError> {
        match self.status(device) {
            FramebufferStatus::Complete => Ok(()),
            status => Err(PipelineError::FramebufferIncomplete(status)),
        }
    }

    pub fn free(&mut self, device: &mut dyn Device) {
        match self.id.take() {
            Some(id) => device.delete_framebuffer(id),
            None => trace_double_free(ObjectKind::Framebuffer),
        }
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        if let Some(id) = self.id {
            warn_leak(ObjectKind::Framebuffer, id.raw());
        }
    }
}
