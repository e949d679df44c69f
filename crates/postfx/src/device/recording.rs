//! In-memory `Device` that keeps GL-like state and a log of the calls that matter
//! to the pipeline, so wrappers, passes and the renderer can be tested without a
//! GPU.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::*;

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct DrawCall {
    pub framebuffer: Option<FramebufferId>,
    pub program: Option<ProgramId>,
    pub units: BTreeMap<u32, TextureId>,
    pub primitive: Primitive,
    pub first: u32,
    pub count: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Call {
    Clear {
        framebuffer: Option<FramebufferId>,
    },
    TexImage {
        texture: TextureId,
        width: u32,
        height: u32,
        uploaded: bool,
    },
    Draw(DrawCall),
    Delete(ObjectKind, u32),
}

struct ShaderEntry {
    stage: ShaderStage,
    source: String,
    compiled: bool,
    log: String,
}

#[derive(Default)]
struct ProgramEntry {
    attached: Vec<ShaderId>,
    attrib_locations: Vec<(u32, String)>,
    linked: bool,
    log: String,
    identifiers: Vec<String>,
    values: HashMap<u32, UniformValue>,
}

#[derive(Default)]
pub(crate) struct TextureEntry {
    pub width: u32,
    pub height: u32,
    pub format: Option<TextureFormat>,
    pub filter: TextureFilter,
    pub wrap: TextureWrap,
    pub pixels: Option<Vec<u8>>,
}

#[derive(Default)]
pub(crate) struct RecordingDevice {
    next_id: u32,
    fail_kind: Option<ObjectKind>,
    pub calls: Vec<Call>,

    buffers: HashMap<BufferId, Vec<u8>>,
    array_buffer: Option<BufferId>,
    pub attribs: BTreeMap<u32, VertexAttrib>,

    shaders: HashMap<ShaderId, ShaderEntry>,
    programs: HashMap<ProgramId, ProgramEntry>,
    current_program: Option<ProgramId>,

    textures: HashMap<TextureId, TextureEntry>,
    active_unit: u32,
    units: BTreeMap<u32, TextureId>,

    framebuffers: HashMap<FramebufferId, Option<TextureId>>,
    framebuffer: Option<FramebufferId>,

    pub viewport: Option<(i32, i32, u32, u32)>,
    pub clear_color: [f32; 4],
    deleted: BTreeSet<u32>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent allocation of `kind` return no handle.
    pub fn fail_allocations(&mut self, kind: ObjectKind) {
        self.fail_kind = Some(kind);
    }

    pub fn draws(&self) -> Vec<&DrawCall> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Draw(draw) => Some(draw),
                _ => None,
            })
            .collect()
    }

    pub fn texture(&self, texture: TextureId) -> Option<&TextureEntry> {
        self.textures.get(&texture)
    }

    pub fn texture_size(&self, texture: TextureId) -> Option<(u32, u32)> {
        self.textures
            .get(&texture)
            .map(|entry| (entry.width, entry.height))
    }

    pub fn framebuffer_attachment(&self, framebuffer: FramebufferId) -> Option<TextureId> {
        self.framebuffers.get(&framebuffer).copied().flatten()
    }

    pub fn bound_framebuffer(&self) -> Option<FramebufferId> {
        self.framebuffer
    }

    pub fn uniform_value(&self, program: ProgramId, name: &str) -> Option<UniformValue> {
        let location = self.uniform_location(program, name)?;
        self.programs
            .get(&program)?
            .values
            .get(&location.slot)
            .copied()
    }

    pub fn program_attrib_locations(&self, program: ProgramId) -> Vec<(u32, String)> {
        self.programs
            .get(&program)
            .map(|entry| entry.attrib_locations.clone())
            .unwrap_or_default()
    }

    pub fn attached_shaders(&self, program: ProgramId) -> Vec<ShaderId> {
        self.programs
            .get(&program)
            .map(|entry| entry.attached.clone())
            .unwrap_or_default()
    }

    pub fn buffer_contents(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(Vec::as_slice)
    }

    pub fn live_objects(&self) -> usize {
        self.buffers.len()
            + self.shaders.len()
            + self.programs.len()
            + self.textures.len()
            + self.framebuffers.len()
    }

    pub fn deletions(&self, kind: ObjectKind) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, Call::Delete(k, _) if *k == kind))
            .count()
    }

    fn allocate(&mut self, kind: ObjectKind) -> Option<u32> {
        if self.fail_kind == Some(kind) {
            return None;
        }
        self.next_id += 1;
        Some(self.next_id)
    }

    fn record_delete(&mut self, kind: ObjectKind, raw: u32) {
        assert!(self.deleted.insert(raw), "{kind} {raw} deleted twice");
        self.calls.push(Call::Delete(kind, raw));
    }
}

fn identifiers(source: &str) -> impl Iterator<Item = &str> {
    source
        .split(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
        .filter(|token| !token.is_empty())
}

impl Device for RecordingDevice {
    fn create_buffer(&mut self) -> Option<BufferId> {
        let id = BufferId::from_raw(self.allocate(ObjectKind::Buffer)?);
        self.buffers.insert(id, Vec::new());
        Some(id)
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer);
        if self.array_buffer == Some(buffer) {
            self.array_buffer = None;
        }
        self.record_delete(ObjectKind::Buffer, buffer.raw());
    }

    fn bind_array_buffer(&mut self, buffer: Option<BufferId>) {
        self.array_buffer = buffer;
    }

    fn buffer_data(&mut self, data: &[u8], _usage: BufferUsage) {
        let buffer = self.array_buffer.expect("buffer_data without a bound array buffer");
        self.buffers.insert(buffer, data.to_vec());
    }

    fn vertex_attrib_pointer(&mut self, attrib: VertexAttrib) {
        assert!(
            self.array_buffer.is_some(),
            "vertex_attrib_pointer without a bound array buffer"
        );
        self.attribs.insert(attrib.location, attrib);
    }

    fn draw_arrays(&mut self, primitive: Primitive, first: u32, count: u32) {
        self.calls.push(Call::Draw(DrawCall {
            framebuffer: self.framebuffer,
            program: self.current_program,
            units: self.units.clone(),
            primitive,
            first,
            count,
        }));
    }

    fn create_shader(&mut self, stage: ShaderStage) -> Option<ShaderId> {
        let id = ShaderId::from_raw(self.allocate(ObjectKind::Shader)?);
        self.shaders.insert(
            id,
            ShaderEntry {
                stage,
                source: String::new(),
                compiled: false,
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
        if entry.source.trim().is_empty() {
            entry.log = "ERROR: 0:1: empty shader source".into();
            entry.compiled = false;
        } else if let Some(line) = entry.source.lines().position(|l| l.contains("#error")) {
            entry.log = format!("ERROR: 0:{}: '#error' directive", line + 1);
            entry.compiled = false;
        } else {
            entry.log.clear();
            entry.compiled = true;
        }
        entry.compiled
    }

    fn shader_info_log(&self, shader: ShaderId) -> String {
        self.shaders
            .get(&shader)
            .map(|entry| entry.log.clone())
            .unwrap_or_default()
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        self.shaders.remove(&shader);
        self.record_delete(ObjectKind::Shader, shader.raw());
    }

    fn create_program(&mut self) -> Option<ProgramId> {
        let id = ProgramId::from_raw(self.allocate(ObjectKind::Program)?);
        self.programs.insert(id, ProgramEntry::default());
        Some(id)
    }

    fn attach_shader(&mut self, program: ProgramId, shader: ShaderId) {
        if let Some(entry) = self.programs.get_mut(&program) {
            entry.attached.push(shader);
        }
    }

    fn detach_shader(&mut self, program: ProgramId, shader: ShaderId) {
        if let Some(entry) = self.programs.get_mut(&program) {
            entry.attached.retain(|attached| *attached != shader);
        }
    }

    fn bind_attrib_location(&mut self, program: ProgramId, location: u32, name: &str) {
        if let Some(entry) = self.programs.get_mut(&program) {
            entry.attrib_locations.push((location, name.to_string()));
        }
    }

    fn link_program(&mut self, program: ProgramId) -> bool {
        let Some(entry) = self.programs.get(&program) else {
            return false;
        };
        let shaders: Vec<&ShaderEntry> = entry
            .attached
            .iter()
            .filter_map(|id| self.shaders.get(id))
            .collect();
        let stages = |stage| shaders.iter().filter(|s| s.stage == stage).count();

        let log = if shaders.iter().any(|s| !s.compiled) {
            Some("attached shader is not compiled".to_string())
        } else if stages(ShaderStage::Vertex) != 1 || stages(ShaderStage::Fragment) != 1 {
            Some("program needs exactly one vertex and one fragment shader".to_string())
        } else {
            None
        };

        let mut names: Vec<String> = shaders
            .iter()
            .flat_map(|s| identifiers(&s.source))
            .map(str::to_string)
            .collect();
        names.sort();
        names.dedup();

        let entry = self.programs.get_mut(&program).expect("program exists");
        entry.linked = log.is_none();
        entry.log = log.unwrap_or_default();
        entry.identifiers = if entry.linked { names } else { Vec::new() };
        entry.values.clear();
        entry.linked
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
        let entry = self.programs.get(&program)?;
        let slot = entry.identifiers.binary_search_by(|id| id.as_str().cmp(name)).ok()?;
        Some(UniformLocation {
            program,
            slot: slot as u32,
        })
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        if let Some(entry) = self.programs.get_mut(&location.program) {
            entry.values.insert(location.slot, value);
        }
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
        self.record_delete(ObjectKind::Program, program.raw());
    }

    fn create_texture(&mut self) -> Option<TextureId> {
        let id = TextureId::from_raw(self.allocate(ObjectKind::Texture)?);
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
        if let Some(entry) = texture.and_then(|id| self.textures.get_mut(&id)) {
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
        let texture = *self
            .units
            .get(&self.active_unit)
            .expect("tex_image_2d without a bound texture");
        if let Some(pixels) = pixels {
            assert_eq!(
                pixels.len(),
                width as usize * height as usize * format.channels(),
                "pixel data does not match {width}x{height} {format:?}"
            );
        }
        let entry = self.textures.entry(texture).or_default();
        entry.width = width;
        entry.height = height;
        entry.format = Some(format);
        entry.pixels = pixels.map(<[u8]>::to_vec);
        self.calls.push(Call::TexImage {
            texture,
            width,
            height,
            uploaded: pixels.is_some(),
        });
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
        self.units.retain(|_, bound| *bound != texture);
        self.record_delete(ObjectKind::Texture, texture.raw());
    }

    fn create_framebuffer(&mut self) -> Option<FramebufferId> {
        let id = FramebufferId::from_raw(self.allocate(ObjectKind::Framebuffer)?);
        self.framebuffers.insert(id, None);
        Some(id)
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.framebuffer = framebuffer;
    }

    fn framebuffer_texture_2d(&mut self, attachment: u32, texture: Option<TextureId>) {
        assert_eq!(attachment, 0, "only color attachment 0 is modelled");
        let framebuffer = self
            .framebuffer
            .expect("framebuffer_texture_2d on the default framebuffer");
        self.framebuffers.insert(framebuffer, texture);
    }

    fn check_framebuffer_status(&self) -> FramebufferStatus {
        let Some(framebuffer) = self.framebuffer else {
            return FramebufferStatus::Complete;
        };
        match self.framebuffers.get(&framebuffer).copied().flatten() {
            None => FramebufferStatus::MissingAttachment,
            Some(texture) => match self.textures.get(&texture) {
                Some(entry) if entry.width > 0 && entry.height > 0 => FramebufferStatus::Complete,
                _ => FramebufferStatus::IncompleteAttachment,
            },
        }
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.framebuffers.remove(&framebuffer);
        if self.framebuffer == Some(framebuffer) {
            self.framebuffer = None;
        }
        self.record_delete(ObjectKind::Framebuffer, framebuffer.raw());
    }

    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.viewport = Some((x, y, width, height));
    }

    fn clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    fn clear(&mut self) {
        self.calls.push(Call::Clear {
            framebuffer: self.framebuffer,
        });
    }
}
