//! Translation of the GL-style draw state into wgpu pipeline and pass inputs.

use std::collections::BTreeMap;
use std::num::NonZeroU64;

use crate::device::{
    AttribKind, BufferId, Primitive, ProgramId, TextureFilter, TextureFormat, TextureWrap,
    VertexAttrib,
};

use super::reflect::{HandleKind, ProgramReflection};

pub(crate) const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

pub(crate) fn vertex_format(
    kind: AttribKind,
    count: u32,
    normalize: bool,
) -> Option<wgpu::VertexFormat> {
    use wgpu::VertexFormat as F;

    let format = match (kind, count, normalize) {
        (AttribKind::Float, 1, _) => F::Float32,
        (AttribKind::Float, 2, _) => F::Float32x2,
        (AttribKind::Float, 3, _) => F::Float32x3,
        (AttribKind::Float, 4, _) => F::Float32x4,
        (AttribKind::UnsignedByte, 2, false) => F::Uint8x2,
        (AttribKind::UnsignedByte, 4, false) => F::Uint8x4,
        (AttribKind::UnsignedByte, 2, true) => F::Unorm8x2,
        (AttribKind::UnsignedByte, 4, true) => F::Unorm8x4,
        (AttribKind::Byte, 2, false) => F::Sint8x2,
        (AttribKind::Byte, 4, false) => F::Sint8x4,
        (AttribKind::Byte, 2, true) => F::Snorm8x2,
        (AttribKind::Byte, 4, true) => F::Snorm8x4,
        (AttribKind::UnsignedShort, 2, false) => F::Uint16x2,
        (AttribKind::UnsignedShort, 4, false) => F::Uint16x4,
        (AttribKind::UnsignedShort, 2, true) => F::Unorm16x2,
        (AttribKind::UnsignedShort, 4, true) => F::Unorm16x4,
        (AttribKind::Short, 2, false) => F::Sint16x2,
        (AttribKind::Short, 4, false) => F::Sint16x4,
        (AttribKind::Short, 2, true) => F::Snorm16x2,
        (AttribKind::Short, 4, true) => F::Snorm16x4,
        _ => return None,
    };
    Some(format)
}

pub(crate) fn topology(primitive: Primitive) -> wgpu::PrimitiveTopology {
    match primitive {
        Primitive::Points => wgpu::PrimitiveTopology::PointList,
        Primitive::Lines => wgpu::PrimitiveTopology::LineList,
        Primitive::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        Primitive::Triangles => wgpu::PrimitiveTopology::TriangleList,
        Primitive::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
    }
}

/// An attribute pointer together with the array buffer bound when it was set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct BoundAttrib {
    pub buffer: BufferId,
    pub attrib: VertexAttrib,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct VertexLayout {
    pub stride: u64,
    pub attributes: Vec<wgpu::VertexAttribute>,
}

impl VertexLayout {
    pub(crate) fn as_wgpu(&self) -> wgpu::VertexBufferLayout<'_> {
        wgpu::VertexBufferLayout {
            array_stride: self.stride,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &self.attributes,
        }
    }
}

/// Groups the attribute pointers a program reads into one vertex buffer slot
/// per `(buffer, stride)` pair.
pub(crate) fn vertex_layouts(
    reflection: &ProgramReflection,
    attribs: &BTreeMap<u32, BoundAttrib>,
) -> Result<Vec<(BufferId, VertexLayout)>, String> {
    let mut slots: Vec<(BufferId, VertexLayout)> = Vec::new();
    for (name, location) in &reflection.inputs {
        let bound = attribs
            .get(location)
            .ok_or_else(|| format!("no attribute pointer for '{name}' at location {location}"))?;
        let attrib = bound.attrib;
        let format = vertex_format(attrib.kind, attrib.count, attrib.normalize).ok_or_else(|| {
            format!(
                "unsupported vertex format for '{name}': {:?} x{} (normalize: {})",
                attrib.kind, attrib.count, attrib.normalize
            )
        })?;
        let stride = if attrib.stride == 0 {
            format.size()
        } else {
            u64::from(attrib.stride)
        };
        let attribute = wgpu::VertexAttribute {
            format,
            offset: u64::from(attrib.offset),
            shader_location: *location,
        };

        match slots
            .iter_mut()
            .find(|(buffer, layout)| *buffer == bound.buffer && layout.stride == stride)
        {
            Some((_, layout)) => layout.attributes.push(attribute),
            None => slots.push((
                bound.buffer,
                VertexLayout {
                    stride,
                    attributes: vec![attribute],
                },
            )),
        }
    }
    for (_, layout) in &mut slots {
        layout.attributes.sort_by_key(|attribute| attribute.shader_location);
    }
    // slot order follows attribute location, not the name order of reflection
    slots.sort_by_key(|(_, layout)| layout.attributes[0].shader_location);
    Ok(slots)
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct PipelineKey {
    pub program: ProgramId,
    pub format: wgpu::TextureFormat,
    pub primitive: Primitive,
    pub layouts: Vec<VertexLayout>,
}

pub(crate) fn bind_group_layout_entries(
    reflection: &ProgramReflection,
) -> Vec<wgpu::BindGroupLayoutEntry> {
    let visibility = wgpu::ShaderStages::VERTEX_FRAGMENT;
    let mut entries = Vec::with_capacity(reflection.handles.len() + 1);
    if let Some(block) = &reflection.block {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: block.binding,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: NonZeroU64::new(u64::from(block.size)),
            },
            count: None,
        });
    }
    for handle in &reflection.handles {
        let ty = match handle.kind {
            HandleKind::Image => wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            HandleKind::Sampler => wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        };
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: handle.binding,
            visibility,
            ty,
            count: None,
        });
    }
    entries
}

pub(crate) fn create_render_pipeline(
    device: &wgpu::Device,
    key: &PipelineKey,
    pipeline_layout: &wgpu::PipelineLayout,
    vertex: &wgpu::ShaderModule,
    fragment: &wgpu::ShaderModule,
) -> wgpu::RenderPipeline {
    let buffers: Vec<wgpu::VertexBufferLayout<'_>> =
        key.layouts.iter().map(VertexLayout::as_wgpu).collect();
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("postfx pipeline"),
        layout: Some(pipeline_layout),
        vertex: wgpu::VertexState {
            module: vertex,
            entry_point: Some("main"),
            buffers: &buffers,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: topology(key.primitive),
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        fragment: Some(wgpu::FragmentState {
            module: fragment,
            entry_point: Some("main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: key.format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    })
}

pub(crate) fn sampler_descriptor(
    filter: TextureFilter,
    wrap: TextureWrap,
) -> wgpu::SamplerDescriptor<'static> {
    let filter_mode = match filter {
        TextureFilter::Nearest => wgpu::FilterMode::Nearest,
        TextureFilter::Linear => wgpu::FilterMode::Linear,
    };
    let address_mode = match wrap {
        TextureWrap::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        TextureWrap::Repeat => wgpu::AddressMode::Repeat,
        TextureWrap::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
    };
    wgpu::SamplerDescriptor {
        label: Some("postfx sampler"),
        address_mode_u: address_mode,
        address_mode_v: address_mode,
        address_mode_w: address_mode,
        mag_filter: filter_mode,
        min_filter: filter_mode,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    }
}

/// Widens uploaded pixels to RGBA8, the only storage format the backend uses.
pub(crate) fn expand_to_rgba(format: TextureFormat, pixels: &[u8]) -> Vec<u8> {
    match format {
        TextureFormat::Rgba => pixels.to_vec(),
        TextureFormat::Rgb => pixels
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        TextureFormat::Luminance => pixels.iter().flat_map(|&l| [l, l, l, 255]).collect(),
        TextureFormat::LuminanceAlpha => pixels
            .chunks_exact(2)
            .flat_map(|p| [p[0], p[0], p[0], p[1]])
            .collect(),
    }
}

/// Converts a bottom-left-origin viewport into wgpu's top-left space, clipped
/// to the target. Returns `None` when nothing of it remains visible.
pub(crate) fn clamp_viewport(
    (x, y, width, height): (i32, i32, u32, u32),
    (target_width, target_height): (u32, u32),
) -> Option<[f32; 4]> {
    let left = i64::from(x).max(0);
    let bottom = i64::from(y).max(0);
    let right = (i64::from(x) + i64::from(width)).min(i64::from(target_width));
    let top = (i64::from(y) + i64::from(height)).min(i64::from(target_height));
    if right <= left || top <= bottom {
        return None;
    }
    let flipped_top = i64::from(target_height) - top;
    Some([
        left as f32,
        flipped_top as f32,
        (right - left) as f32,
        (top - bottom) as f32,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::reflect::ProgramReflection;

    fn bound(buffer: u32, location: u32, count: u32, stride: u32, offset: u32) -> BoundAttrib {
        BoundAttrib {
            buffer: BufferId::from_raw(buffer),
            attrib: VertexAttrib {
                location,
                kind: AttribKind::Float,
                count,
                normalize: false,
                stride,
                offset,
            },
        }
    }

    fn reflection(inputs: &[(&str, u32)]) -> ProgramReflection {
        ProgramReflection {
            inputs: inputs.iter().map(|(name, loc)| (name.to_string(), *loc)).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn interleaved_attributes_share_a_slot() {
        let attribs = BTreeMap::from([(0, bound(1, 0, 2, 16, 0)), (1, bound(1, 1, 2, 16, 8))]);
        let reflection = reflection(&[("a_position", 0), ("a_texcoord", 1)]);
        let layouts = vertex_layouts(&reflection, &attribs).unwrap();
        assert_eq!(layouts.len(), 1);
        let (buffer, layout) = &layouts[0];
        assert_eq!(*buffer, BufferId::from_raw(1));
        assert_eq!(layout.stride, 16);
        assert_eq!(layout.attributes[1].offset, 8);
        assert_eq!(layout.attributes[1].format, wgpu::VertexFormat::Float32x2);
    }

    #[test]
    fn separate_buffers_get_separate_slots() {
        let attribs = BTreeMap::from([(0, bound(1, 0, 2, 0, 0)), (1, bound(2, 1, 4, 0, 0))]);
        let reflection = reflection(&[("a_position", 0), ("a_color", 1)]);
        let layouts = vertex_layouts(&reflection, &attribs).unwrap();
        assert_eq!(layouts.len(), 2);
        assert_eq!(layouts[0].0, BufferId::from_raw(1));
        assert_eq!(layouts[0].1.stride, 8);
        assert_eq!(layouts[0].1.attributes[0].shader_location, 0);
        assert_eq!(layouts[1].0, BufferId::from_raw(2));
        assert_eq!(layouts[1].1.stride, 16);
        assert_eq!(layouts[1].1.attributes[0].shader_location, 1);
    }

    #[test]
    fn missing_pointer_is_reported() {
        let err = vertex_layouts(&reflection(&[("a_position", 0)]), &BTreeMap::new()).unwrap_err();
        assert!(err.contains("a_position"));
    }

    #[test]
    fn unsupported_formats_are_rejected() {
        assert_eq!(vertex_format(AttribKind::UnsignedByte, 3, true), None);
        assert_eq!(
            vertex_format(AttribKind::Short, 2, true),
            Some(wgpu::VertexFormat::Snorm16x2)
        );
    }

    #[test]
    fn channel_formats_expand_to_rgba() {
        assert_eq!(expand_to_rgba(TextureFormat::Rgb, &[1, 2, 3]), vec![1, 2, 3, 255]);
        assert_eq!(expand_to_rgba(TextureFormat::Luminance, &[9]), vec![9, 9, 9, 255]);
        assert_eq!(expand_to_rgba(TextureFormat::LuminanceAlpha, &[9, 7]), vec![9, 9, 9, 7]);
    }

    #[test]
    fn viewport_is_flipped_and_clipped() {
        assert_eq!(clamp_viewport((0, 0, 800, 600), (800, 600)), Some([0.0, 0.0, 800.0, 600.0]));
        assert_eq!(clamp_viewport((0, 0, 1024, 768), (800, 600)), Some([0.0, 0.0, 800.0, 600.0]));
        assert_eq!(clamp_viewport((10, 20, 100, 50), (800, 600)), Some([10.0, 530.0, 100.0, 50.0]));
        assert_eq!(clamp_viewport((900, 0, 10, 10), (800, 600)), None);
    }
}
