use image::RgbaImage;

use crate::device::{Device, ObjectKind, TextureFilter, TextureFormat, TextureId, TextureWrap};
use crate::error::PipelineError;
use crate::types::CanvasSize;

use super::{trace_double_free, warn_leak};

#[derive(Debug)]
pub struct Texture2D {
    id: Option<TextureId>,
    size: Option<CanvasSize>,
}

impl Texture2D {
    pub fn create(device: &mut dyn Device) -> Result<Self, PipelineError> {
        let id = device
            .create_texture()
            .ok_or(PipelineError::Allocation(ObjectKind::Texture))?;
        Ok(Self {
            id: Some(id),
            size: None,
        })
    }

    /// Creates a texture and applies sampling parameters. The texture is left
    /// bound to the active unit.
    pub fn create_configured(
        device: &mut dyn Device,
        filter: TextureFilter,
        wrap: TextureWrap,
    ) -> Result<Self, PipelineError> {
        let texture = Self::create(device)?;
        texture.set_parameters(device, filter, wrap);
        Ok(texture)
    }

    pub fn id(&self) -> Option<TextureId> {
        self.id
    }

    /// Storage size from the last `set_data` or `reserve_data`.
    pub fn size(&self) -> Option<CanvasSize> {
        self.size
    }

    fn handle(&self) -> TextureId {
        self.id.expect("texture used after free")
    }

    pub fn bind(&self, device: &mut dyn Device) {
        device.bind_texture(Some(self.handle()));
    }

    pub fn unbind(device: &mut dyn Device) {
        device.bind_texture(None);
    }

    pub fn bind_to_unit(&self, device: &mut dyn Device, unit: u32) {
        device.active_texture(unit);
        self.bind(device);
    }

    pub fn set_parameters(
        &self,
        device: &mut dyn Device,
        filter: TextureFilter,
        wrap: TextureWrap,
    ) {
        self.bind(device);
        device.tex_parameters(filter, wrap);
    }

    /// Uploads `source`, converted to `format`, replacing the current storage.
    pub fn set_data(&mut self, device: &mut dyn Device, format: TextureFormat, source: &RgbaImage) {
        let (width, height) = source.dimensions();
        let pixels = convert_pixels(source, format);
        self.bind(device);
        device.tex_image_2d(format, width, height, Some(&pixels));
        self.size = Some(CanvasSize::new(width, height));
    }

    /// Allocates uninitialised storage, used for render targets.
    pub fn reserve_data(
        &mut self,
        device: &mut dyn Device,
        format: TextureFormat,
        width: u32,
        height: u32,
    ) {
        self.bind(device);
        device.tex_image_2d(format, width, height, None);
        self.size = Some(CanvasSize::new(width, height));
    }

    pub fn free(&mut self, device: &mut dyn Device) {
        match self.id.take() {
            Some(id) => {
                device.delete_texture(id);
                self.size = None;
            }
            None => trace_double_free(ObjectKind::Texture),
        }
    }
}

impl Drop for Texture2D {
    fn drop(&mut self) {
        if let Some(id) = self.id {
            warn_leak(ObjectKind::Texture, id.raw());
        }
    }
}

fn luminance(pixel: &[u8]) -> u8 {
    let [r, g, b] = [pixel[0], pixel[1], pixel[2]].map(f32::from);
    (0.299 * r + 0.587 * g + 0.114 * b).round().clamp(0.0, 255.0) as u8
}

/// Repacks RGBA8 pixels into `format`, row order unchanged.
pub(crate) fn convert_pixels(source: &RgbaImage, format: TextureFormat) -> Vec<u8> {
    let raw = source.as_raw();
    match format {
        TextureFormat::Rgba => raw.clone(),
        TextureFormat::Rgb => raw.chunks_exact(4).flat_map(|p| [p[0], p[1], p[2]]).collect(),
        TextureFormat::Luminance => raw.chunks_exact(4).map(luminance).collect(),
        TextureFormat::LuminanceAlpha => raw
            .chunks_exact(4)
            .flat_map(|p| [luminance(p), p[3]])
            .collect(),
    }
}
