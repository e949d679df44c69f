//! `Device` implemented on wgpu.
//!
//! The GL-style object model is emulated on the CPU side: bindings, attribute
//! pointers and uniform values are tracked per call, and every `draw_arrays`
//! or `clear` becomes its own render pass and queue submission. Shaders are
//! Vulkan-dialect GLSL compiled through naga; see `reflect` for the binding
//! convention programs must follow.

mod context;
mod draw;
mod reflect;

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

use anyhow::{Context as AnyhowContext, Result};
use image::RgbaImage;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, trace, warn};

use crate::device::{
    BufferId, BufferUsage, Device, FramebufferId, FramebufferStatus, Primitive, ProgramId,
    ShaderId, ShaderStage, TextureFilter, TextureFormat, TextureId, TextureWrap, UniformLocation,
    UniformValue, VertexAttrib,
};
use crate::types::CanvasSize;

pub use context::{AdapterProfile, GpuPowerPreference};

use context::GpuContext;
use draw::{BoundAttrib, PipelineKey, TARGET_FORMAT};
use reflect::{HandleKind, ProgramReflection, StageReflection, UniformSlot};

struct CompiledShader {
    module: wgpu::ShaderModule,
    reflection: StageReflection,
}

struct ShaderEntry {
    stage: ShaderStage,
    source: String,
    compiled: Option<CompiledShader>,
    log: String,
}

struct LinkedProgram {
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    reflection: ProgramReflection,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    uniform_buffer: Option<wgpu::Buffer>,
    uniform_bytes: Vec<u8>,
    /// Texture unit per image binding, as written through `set_uniform`.
    units: HashMap<u32, u32>,
}

#[derive(Default)]
struct ProgramEntry {
    attached: Vec<ShaderId>,
    attrib_requests: Vec<(u32, String)>,
    linked: Option<LinkedProgram>,
    log: String,
}

struct TextureStorage {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

#[derive(Default)]
struct TextureEntry {
    storage: Option<TextureStorage>,
    filter: TextureFilter,
    wrap: TextureWrap,
}

enum DefaultTarget {
    Headless(TextureStorage),
    Surface(Option<(wgpu::SurfaceTexture, wgpu::TextureView)>),
}

/// Where the next clear or draw lands.
struct RenderTarget {
    view: wgpu::TextureView,
    format: wgpu::TextureFormat,
    size: (u32, u32),
    texture: Option<TextureId>,
}

pub struct WgpuDevice {
    gpu: GpuContext,
    default_target: DefaultTarget,
    next_id: u32,

    buffers: HashMap<BufferId, Option<wgpu::Buffer>>,
    array_buffer: Option<BufferId>,
    attribs: BTreeMap<u32, BoundAttrib>,

    shaders: HashMap<ShaderId, ShaderEntry>,
    programs: HashMap<ProgramId, ProgramEntry>,
    current_program: Option<ProgramId>,

    textures: HashMap<TextureId, TextureEntry>,
    active_unit: u32,
    units: BTreeMap<u32, TextureId>,

    framebuffers: HashMap<FramebufferId, Option<TextureId>>,
    framebuffer: Option<FramebufferId>,

    viewport: Option<(i32, i32, u32, u32)>,
    clear_color: [f32; 4],

    samplers: HashMap<(TextureFilter, TextureWrap), wgpu::Sampler>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

impl WgpuDevice {
    /// Offscreen device whose default framebuffer is an RGBA8 texture of
    /// `size`, readable with `read_default_framebuffer`.
    pub fn headless(size: CanvasSize) -> Result<Self> {
        Self::headless_with(size, GpuPowerPreference::default())
    }

    pub fn headless_with(size: CanvasSize, power: GpuPowerPreference) -> Result<Self> {
        if size.is_empty() {
            anyhow::bail!("headless target must not be empty, got {size}");
        }
        let gpu = GpuContext::headless(power)?;
        let storage =
            create_storage(&gpu.device, size.width, size.height, "postfx default framebuffer");
        Ok(Self::with_target(gpu, DefaultTarget::Headless(storage)))
    }

    /// Device presenting to a window surface. `target` must outlive the device.
    pub fn for_window<T>(target: &T, size: CanvasSize) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let gpu = GpuContext::for_window(target, size, GpuPowerPreference::default())?;
        Ok(Self::with_target(gpu, DefaultTarget::Surface(None)))
    }

    fn with_target(gpu: GpuContext, default_target: DefaultTarget) -> Self {
        Self {
            gpu,
            default_target,
            next_id: 0,
            buffers: HashMap::new(),
            array_buffer: None,
            attribs: BTreeMap::new(),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            current_program: None,
            textures: HashMap::new(),
            active_unit: 0,
            units: BTreeMap::new(),
            framebuffers: HashMap::new(),
            framebuffer: None,
            viewport: None,
            clear_color: [0.0, 0.0, 0.0, 0.0],
            samplers: HashMap::new(),
            pipelines: HashMap::new(),
        }
    }

    pub fn adapter_profile(&self) -> &AdapterProfile {
        &self.gpu.adapter_profile
    }

    /// Presents the surface frame drawn since the last call. No-op for
    /// headless devices or when nothing was drawn.
    pub fn present(&mut self) {
        if let DefaultTarget::Surface(frame) = &mut self.default_target {
            if let Some((texture, _view)) = frame.take() {
                texture.present();
            }
        }
    }

    /// Resizes the default framebuffer: reconfigures the surface, or
    /// reallocates the headless target.
    pub fn resize_surface(&mut self, size: CanvasSize) {
        if size.is_empty() {
            return;
        }
        match &mut self.default_target {
            DefaultTarget::Surface(frame) => {
                frame.take();
                self.gpu.resize_surface(size);
            }
            DefaultTarget::Headless(storage) => {
                *storage = create_storage(
                    &self.gpu.device,
                    size.width,
                    size.height,
                    "postfx default framebuffer",
                );
            }
        }
        debug!(%size, "default framebuffer resized");
    }

    /// Copies the headless default framebuffer back to the CPU.
    pub fn read_default_framebuffer(&self) -> Result<RgbaImage> {
        let DefaultTarget::Headless(storage) = &self.default_target else {
            anyhow::bail!("only headless devices can read back their default framebuffer");
        };
        read_texture(&self.gpu, storage)
    }

    fn allocate(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn current_target(&mut self) -> Option<RenderTarget> {
        let Some(framebuffer) = self.framebuffer else {
            return self.default_render_target();
        };
        let texture = self.framebuffers.get(&framebuffer).copied().flatten()?;
        let storage = self.textures.get(&texture)?.storage.as_ref()?;
        Some(RenderTarget {
            view: storage.view.clone(),
            format: TARGET_FORMAT,
            size: (storage.width, storage.height),
            texture: Some(texture),
        })
    }

    fn default_render_target(&mut self) -> Option<RenderTarget> {
        match &mut self.default_target {
            DefaultTarget::Headless(storage) => Some(RenderTarget {
                view: storage.view.clone(),
                format: TARGET_FORMAT,
                size: (storage.width, storage.height),
                texture: None,
            }),
            DefaultTarget::Surface(frame) => {
                if frame.is_none() {
                    *frame = acquire_frame(&self.gpu);
                }
                let (surface_texture, view) = frame.as_ref()?;
                Some(RenderTarget {
                    view: view.clone(),
                    format: surface_texture.texture.format(),
                    size: (surface_texture.texture.width(), surface_texture.texture.height()),
                    texture: None,
                })
            }
        }
    }

    fn link(&self, entry: &ProgramEntry) -> Result<LinkedProgram, String> {
        let shaders: Vec<&ShaderEntry> = entry
            .attached
            .iter()
            .filter_map(|id| self.shaders.get(id))
            .collect();
        let vertex = compiled_stage(&shaders, ShaderStage::Vertex)?;
        let fragment = compiled_stage(&shaders, ShaderStage::Fragment)?;

        let reflection = ProgramReflection::merge(&vertex.reflection, &fragment.reflection)?;
        for (location, name) in &entry.attrib_requests {
            if let Some(declared) = reflection.inputs.get(name) {
                if declared != location {
                    return Err(format!(
                        "attribute '{name}' is declared at location {declared} \
                         but was requested at {location}"
                    ));
                }
            }
        }

        let device = &self.gpu.device;
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("postfx program layout"),
            entries: &draw::bind_group_layout_entries(&reflection),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("postfx pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let size = reflection
            .block
            .as_ref()
            .map(|block| block.size.div_ceil(16) * 16)
            .unwrap_or(0);
        let uniform_buffer = (size > 0).then(|| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("postfx uniforms"),
                size: u64::from(size),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });

        Ok(LinkedProgram {
            vertex: vertex.module.clone(),
            fragment: fragment.module.clone(),
            reflection,
            bind_group_layout,
            pipeline_layout,
            uniform_buffer,
            uniform_bytes: vec![0; size as usize],
            units: HashMap::new(),
        })
    }

    fn try_draw(&mut self, primitive: Primitive, first: u32, count: u32) -> Result<(), String> {
        let program_id = self.current_program.ok_or("no program in use")?;
        let target = self.current_target().ok_or("no render target available")?;
        let Some(viewport) = self
            .viewport
            .map_or(Some([0.0, 0.0, target.size.0 as f32, target.size.1 as f32]), |viewport| {
                draw::clamp_viewport(viewport, target.size)
            })
        else {
            trace!("viewport lies outside the render target; nothing to draw");
            return Ok(());
        };

        let linked = self
            .programs
            .get(&program_id)
            .and_then(|entry| entry.linked.as_ref())
            .ok_or("program in use is not linked")?;
        let layouts = draw::vertex_layouts(&linked.reflection, &self.attribs)?;
        let key = PipelineKey {
            program: program_id,
            format: target.format,
            primitive,
            layouts: layouts.iter().map(|(_, layout)| layout.clone()).collect(),
        };

        if !self.pipelines.contains_key(&key) {
            let device = &self.gpu.device;
            device.push_error_scope(wgpu::ErrorFilter::Validation);
            let pipeline = draw::create_render_pipeline(
                device,
                &key,
                &linked.pipeline_layout,
                &linked.vertex,
                &linked.fragment,
            );
            if let Some(err) = pollster::block_on(device.pop_error_scope()) {
                return Err(format!("failed to create render pipeline: {err}"));
            }
            debug!(
                program = program_id.raw(),
                format = ?key.format,
                ?primitive,
                "render pipeline created"
            );
            self.pipelines.insert(key.clone(), pipeline);
        }

        // Resolve what every handle binding samples before borrowing views.
        let mut images = Vec::new();
        let mut samplers = Vec::new();
        for handle in &linked.reflection.handles {
            let image_binding = match handle.kind {
                HandleKind::Image => handle.binding,
                HandleKind::Sampler => handle.binding - 1,
            };
            let unit = linked.units.get(&image_binding).copied().unwrap_or(0);
            let texture = self.units.get(&unit).copied();
            match handle.kind {
                HandleKind::Image => {
                    let texture = texture.ok_or_else(|| {
                        format!("no texture bound to unit {unit} for '{}'", handle.name)
                    })?;
                    if Some(texture) == target.texture {
                        return Err(format!(
                            "'{}' samples the texture being rendered to",
                            handle.name
                        ));
                    }
                    images.push((handle.binding, texture));
                }
                HandleKind::Sampler => {
                    let params = texture
                        .and_then(|texture| self.textures.get(&texture))
                        .map(|entry| (entry.filter, entry.wrap))
                        .unwrap_or_default();
                    samplers.push((handle.binding, params));
                }
            }
        }
        for (_, params) in &samplers {
            let device = &self.gpu.device;
            self.samplers
                .entry(*params)
                .or_insert_with(|| {
                    device.create_sampler(&draw::sampler_descriptor(params.0, params.1))
                });
        }

        let mut entries = Vec::with_capacity(images.len() + samplers.len() + 1);
        if let (Some(block), Some(buffer)) = (&linked.reflection.block, &linked.uniform_buffer) {
            self.gpu.queue.write_buffer(buffer, 0, &linked.uniform_bytes);
            entries.push(wgpu::BindGroupEntry {
                binding: block.binding,
                resource: buffer.as_entire_binding(),
            });
        }
        for (binding, texture) in &images {
            let storage = self
                .textures
                .get(texture)
                .and_then(|entry| entry.storage.as_ref())
                .ok_or_else(|| format!("texture {} has no storage", texture.raw()))?;
            entries.push(wgpu::BindGroupEntry {
                binding: *binding,
                resource: wgpu::BindingResource::TextureView(&storage.view),
            });
        }
        for (binding, params) in &samplers {
            let sampler = self
                .samplers
                .get(params)
                .ok_or("sampler cache miss")?;
            entries.push(wgpu::BindGroupEntry {
                binding: *binding,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }

        let mut vertex_buffers = Vec::with_capacity(layouts.len());
        for (buffer, _) in &layouts {
            let buffer = self
                .buffers
                .get(buffer)
                .and_then(Option::as_ref)
                .ok_or_else(|| format!("vertex buffer {} has no data", buffer.raw()))?;
            vertex_buffers.push(buffer);
        }

        let device = &self.gpu.device;
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("postfx bind group"),
            layout: &linked.bind_group_layout,
            entries: &entries,
        });
        let pipeline = self
            .pipelines
            .get(&key)
            .ok_or("render pipeline cache miss")?;

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("postfx draw"),
        });
        {
            let mut pass = begin_pass(&mut encoder, &target.view, wgpu::LoadOp::Load);
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            for (slot, buffer) in vertex_buffers.iter().enumerate() {
                pass.set_vertex_buffer(slot as u32, buffer.slice(..));
            }
            let [x, y, width, height] = viewport;
            pass.set_viewport(x, y, width, height, 0.0, 1.0);
            pass.draw(first..first + count, 0..1);
        }
        self.gpu.queue.submit(Some(encoder.finish()));
        Ok(())
    }
}

fn compiled_stage<'a>(
    shaders: &[&'a ShaderEntry],
    stage: ShaderStage,
) -> Result<&'a CompiledShader, String> {
    let mut matching = shaders.iter().filter(|shader| shader.stage == stage);
    let shader = matching
        .next()
        .ok_or_else(|| format!("program has no {stage} shader attached"))?;
    if matching.next().is_some() {
        return Err(format!("program has more than one {stage} shader attached"));
    }
    shader
        .compiled
        .as_ref()
        .ok_or_else(|| format!("attached {stage} shader is not compiled"))
}

fn begin_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    view: &wgpu::TextureView,
    load: wgpu::LoadOp<wgpu::Color>,
) -> wgpu::RenderPass<'e> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("postfx pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            depth_slice: None,
            resolve_target: None,
            ops: wgpu::Operations {
                load,
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    })
}

fn create_storage(device: &wgpu::Device, width: u32, height: u32, label: &str) -> TextureStorage {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TARGET_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    TextureStorage {
        texture,
        view,
        width,
        height,
    }
}

fn acquire_frame(gpu: &GpuContext) -> Option<(wgpu::SurfaceTexture, wgpu::TextureView)> {
    let state = gpu.surface.as_ref()?;
    let texture = match state.surface.get_current_texture() {
        Ok(texture) => texture,
        Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
            gpu.reconfigure_surface();
            match state.surface.get_current_texture() {
                Ok(texture) => texture,
                Err(err) => {
                    warn!(%err, "surface frame unavailable after reconfigure; skipping frame");
                    return None;
                }
            }
        }
        Err(err) => {
            warn!(%err, "failed to acquire surface frame; skipping frame");
            return None;
        }
    };
    let view = texture.texture.create_view(&wgpu::TextureViewDescriptor::default());
    Some((texture, view))
}

fn read_texture(gpu: &GpuContext, storage: &TextureStorage) -> Result<RgbaImage> {
    let (width, height) = (storage.width, storage.height);
    let unpadded = 4 * width;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let padded = unpadded.div_ceil(align) * align;

    let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("postfx readback"),
        size: u64::from(padded) * u64::from(height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });
    let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("postfx readback"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture: &storage.texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    gpu.queue.submit(Some(encoder.finish()));

    let slice = buffer.slice(..);
    let (sender, receiver) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    gpu.device
        .poll(wgpu::PollType::Wait)
        .context("failed to wait for GPU readback")?;
    receiver
        .recv()
        .context("readback callback was dropped")?
        .context("failed to map readback buffer")?;

    let mut pixels = Vec::with_capacity((unpadded * height) as usize);
    {
        let data = slice.get_mapped_range();
        for row in data.chunks_exact(padded as usize) {
            pixels.extend_from_slice(&row[..unpadded as usize]);
        }
    }
    buffer.unmap();
    RgbaImage::from_raw(width, height, pixels)
        .context("readback produced an unexpected number of bytes")
}

impl Device for WgpuDevice {
    fn create_buffer(&mut self) -> Option<BufferId> {
        let id = BufferId::from_raw(self.allocate());
        self.buffers.insert(id, None);
        Some(id)
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer);
        if self.array_buffer == Some(buffer) {
            self.array_buffer = None;
        }
        self.attribs.retain(|_, bound| bound.buffer != buffer);
    }

    fn bind_array_buffer(&mut self, buffer: Option<BufferId>) {
        self.array_buffer = buffer;
    }

    fn buffer_data(&mut self, data: &[u8], _usage: BufferUsage) {
        use wgpu::util::DeviceExt;

        let Some(id) = self.array_buffer else {
            warn!("buffer_data called without a bound array buffer");
            return;
        };
        let buffer = (!data.is_empty()).then(|| {
            self.gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("postfx vertices"),
                contents: data,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            })
        });
        if let Some(slot) = self.buffers.get_mut(&id) {
            *slot = buffer;
        }
    }

    fn vertex_attrib_pointer(&mut self, attrib: VertexAttrib) {
        let Some(buffer) = self.array_buffer else {
            warn!(
                location = attrib.location,
                "vertex_attrib_pointer called without a bound array buffer"
            );
            return;
        };
        self.attribs.insert(attrib.location, BoundAttrib { buffer, attrib });
    }

    fn draw_arrays(&mut self, primitive: Primitive, first: u32, count: u32) {
        if count == 0 {
            return;
        }
        if let Err(reason) = self.try_draw(primitive, first, count) {
            warn!(%reason, "skipping draw");
        }
    }

    fn create_shader(&mut self, stage: ShaderStage) -> Option<ShaderId> {
        let id = ShaderId::from_raw(self.allocate());
        self.shaders.insert(
            id,
            ShaderEntry {
                stage,
                source: String::new(),
                compiled: None,
                log: String::new(),
            },
        );
        Some(id)
    }

    fn shader_source(&mut self, shader: ShaderId, source: &str) {
        if let Some(entry) = self.shaders.get_mut(&shader) {
            entry.source = source.to_string();
        }
    }

    fn compile_shader(&mut self, shader: ShaderId) -> bool {
        let Some(entry) = self.shaders.get_mut(&shader) else {
            return false;
        };
        entry.compiled = None;

        let parsed = reflect::parse(entry.stage, &entry.source);
        let reflection = match parsed.and_then(|module| reflect::reflect(&module)) {
            Ok(reflection) => reflection,
            Err(log) => {
                entry.log = log;
                return false;
            }
        };

        let device = &self.gpu.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("postfx shader"),
            source: wgpu::ShaderSource::Glsl {
                shader: Cow::Owned(entry.source.clone()),
                stage: reflect::naga_stage(entry.stage),
                defines: &[],
            },
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            entry.log = err.to_string();
            return false;
        }

        entry.log.clear();
        entry.compiled = Some(CompiledShader { module, reflection });
        true
    }

    fn shader_info_log(&self, shader: ShaderId) -> String {
        self.shaders
            .get(&shader)
            .map(|entry| entry.log.clone())
            .unwrap_or_default()
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        self.shaders.remove(&shader);
    }

    fn create_program(&mut self) -> Option<ProgramId> {
        let id = ProgramId::from_raw(self.allocate());
        self.programs.insert(id, ProgramEntry::default());
        Some(id)
    }

    fn attach_shader(&mut self, program: ProgramId, shader: ShaderId) {
        if let Some(entry) = self.programs.get_mut(&program) {
            if !entry.attached.contains(&shader) {
                entry.attached.push(shader);
            }
        }
    }

    fn detach_shader(&mut self, program: ProgramId, shader: ShaderId) {
        if let Some(entry) = self.programs.get_mut(&program) {
            entry.attached.retain(|attached| *attached != shader);
        }
    }

    fn bind_attrib_location(&mut self, program: ProgramId, location: u32, name: &str) {
        if let Some(entry) = self.programs.get_mut(&program) {
            entry.attrib_requests.retain(|(_, existing)| existing != name);
            entry.attrib_requests.push((location, name.to_string()));
        }
    }

    fn link_program(&mut self, program: ProgramId) -> bool {
        let Some(entry) = self.programs.get(&program) else {
            return false;
        };
        let linked = self.link(entry);
        self.pipelines.retain(|key, _| key.program != program);

        let Some(entry) = self.programs.get_mut(&program) else {
            return false;
        };
        match linked {
            Ok(linked) => {
                entry.linked = Some(linked);
                entry.log.clear();
                true
            }
            Err(log) => {
                entry.linked = None;
                entry.log = log;
                false
            }
        }
    }

    fn program_info_log(&self, program: ProgramId) -> String {
        self.programs
            .get(&program)
            .map(|entry| entry.log.clone())
            .unwrap_or_default()
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.current_program = program;
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let linked = self.programs.get(&program)?.linked.as_ref()?;
        let slot = linked.reflection.slot(name)?;
        Some(UniformLocation { program, slot })
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        let Some(linked) = self
            .programs
            .get_mut(&location.program)
            .and_then(|entry| entry.linked.as_mut())
        else {
            return;
        };
        let Some(slot) = linked.reflection.uniforms.get(location.slot as usize) else {
            return;
        };
        match slot {
            UniformSlot::Member(member) => {
                if !member.ty.accepts(&value) {
                    warn!(
                        uniform = %member.name,
                        expected = ?member.ty,
                        ?value,
                        "uniform type mismatch; write ignored"
                    );
                    return;
                }
                let bytes = reflect::std140_bytes(&value);
                let start = member.offset as usize;
                if let Some(target) = linked.uniform_bytes.get_mut(start..start + bytes.len()) {
                    target.copy_from_slice(&bytes);
                }
            }
            UniformSlot::Image { name, binding } => match value {
                UniformValue::Int(unit) if unit >= 0 => {
                    linked.units.insert(*binding, unit as u32);
                }
                other => {
                    warn!(uniform = %name, value = ?other, "texture uniforms take a texture unit")
                }
            },
        }
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        self.pipelines.retain(|key, _| key.program != program);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn create_texture(&mut self) -> Option<TextureId> {
        let id = TextureId::from_raw(self.allocate());
        self.textures.insert(id, TextureEntry::default());
        Some(id)
    }

    fn active_texture(&mut self, unit: u32) {
        self.active_unit = unit;
    }

    fn bind_texture(&mut self, texture: Option<TextureId>) {
        match texture {
            Some(texture) => self.units.insert(self.active_unit, texture),
            None => self.units.remove(&self.active_unit),
        };
    }

    fn tex_parameters(&mut self, filter: TextureFilter, wrap: TextureWrap) {
        let texture = self.units.get(&self.active_unit).copied();
        if let Some(entry) = texture.and_then(|texture| self.textures.get_mut(&texture)) {
            entry.filter = filter;
            entry.wrap = wrap;
        }
    }

    fn tex_image_2d(
        &mut self,
        format: TextureFormat,
        width: u32,
        height: u32,
        pixels: Option<&[u8]>,
    ) {
        let Some(texture) = self.units.get(&self.active_unit).copied() else {
            warn!(unit = self.active_unit, "tex_image_2d called without a bound texture");
            return;
        };
        let Some(entry) = self.textures.get_mut(&texture) else {
            return;
        };

        let max = self.gpu.adapter_profile.max_texture_dimension;
        if width == 0 || height == 0 || width > max || height > max {
            if width > max || height > max {
                warn!(width, height, max, "texture exceeds the adapter's size limit");
            }
            entry.storage = None;
            return;
        }

        let reuse = entry
            .storage
            .as_ref()
            .is_some_and(|storage| storage.width == width && storage.height == height);
        if !reuse {
            entry.storage = Some(create_storage(&self.gpu.device, width, height, "postfx texture"));
        }

        let (Some(pixels), Some(storage)) = (pixels, entry.storage.as_ref()) else {
            return;
        };
        let rgba = draw::expand_to_rgba(format, pixels);
        if rgba.len() != width as usize * height as usize * 4 {
            warn!(
                width,
                height,
                ?format,
                bytes = pixels.len(),
                "pixel data does not match texture size; upload skipped"
            );
            return;
        }
        self.gpu.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &storage.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
        self.units.retain(|_, bound| *bound != texture);
    }

    fn create_framebuffer(&mut self) -> Option<FramebufferId> {
        let id = FramebufferId::from_raw(self.allocate());
        self.framebuffers.insert(id, None);
        Some(id)
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.framebuffer = framebuffer;
    }

    fn framebuffer_texture_2d(&mut self, attachment: u32, texture: Option<TextureId>) {
        if attachment != 0 {
            warn!(attachment, "only color attachment 0 is supported");
            return;
        }
        match self.framebuffer.and_then(|id| self.framebuffers.get_mut(&id)) {
            Some(slot) => *slot = texture,
            None => warn!("framebuffer_texture_2d called on the default framebuffer"),
        }
    }

    fn check_framebuffer_status(&self) -> FramebufferStatus {
        let Some(framebuffer) = self.framebuffer else {
            return FramebufferStatus::Complete;
        };
        match self.framebuffers.get(&framebuffer).copied().flatten() {
            None => FramebufferStatus::MissingAttachment,
            Some(texture) => {
                let storage = self.textures.get(&texture).and_then(|entry| entry.storage.as_ref());
                match storage {
                    Some(_) => FramebufferStatus::Complete,
                    None => FramebufferStatus::IncompleteAttachment,
                }
            }
        }
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.framebuffers.remove(&framebuffer);
        if self.framebuffer == Some(framebuffer) {
            self.framebuffer = None;
        }
    }

    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.viewport = Some((x, y, width, height));
    }

    fn clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    fn clear(&mut self) {
        let Some(target) = self.current_target() else {
            warn!("no render target available; clear skipped");
            return;
        };
        let [r, g, b, a] = self.clear_color.map(f64::from);
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("postfx clear"),
            });
        begin_pass(&mut encoder, &target.view, wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }));
        self.gpu.queue.submit(Some(encoder.finish()));
    }
}
