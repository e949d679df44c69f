//! The graphics device seam.
//!
//! `Device` is a handle-based, GL-flavoured command surface: objects are created
//! and deleted explicitly, binding state is device-global, and uniforms are
//! resolved by name once and written through opaque locations. The GPU wrappers
//! in `gpu` are the only intended callers. `backend::WgpuDevice` implements it on
//! top of wgpu.

use std::fmt;

#[cfg(test)]
pub(crate) mod recording;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            pub const fn from_raw(raw: u32) -> Self {
                Self(raw)
            }

            pub const fn raw(self) -> u32 {
                self.0
            }
        }
    };
}

handle!(
    /// Vertex buffer handle.
    BufferId
);
handle!(ShaderId);
handle!(ProgramId);
handle!(TextureId);
handle!(FramebufferId);

/// A uniform slot resolved inside one program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UniformLocation {
    pub program: ProgramId,
    pub slot: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Buffer,
    Shader,
    Program,
    Texture,
    Framebuffer,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ObjectKind::Buffer => "buffer",
            ObjectKind::Shader => "shader",
            ObjectKind::Program => "program",
            ObjectKind::Texture => "texture",
            ObjectKind::Framebuffer => "framebuffer",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    #[default]
    StaticDraw,
    DynamicDraw,
    StreamDraw,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    Points,
    Lines,
    LineStrip,
    Triangles,
    TriangleStrip,
}

/// Channel layout of texture data handed to the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgb,
    Rgba,
    Luminance,
    LuminanceAlpha,
}

impl TextureFormat {
    pub const fn channels(self) -> usize {
        match self {
            TextureFormat::Rgb => 3,
            TextureFormat::Rgba => 4,
            TextureFormat::Luminance => 1,
            TextureFormat::LuminanceAlpha => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TextureFilter {
    Nearest,
    #[default]
    Linear,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TextureWrap {
    #[default]
    ClampToEdge,
    Repeat,
    MirroredRepeat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FramebufferStatus {
    Complete,
    MissingAttachment,
    IncompleteAttachment,
    Unsupported,
}

impl fmt::Display for FramebufferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FramebufferStatus::Complete => "complete",
            FramebufferStatus::MissingAttachment => "no color attachment",
            FramebufferStatus::IncompleteAttachment => "attachment has no storage",
            FramebufferStatus::Unsupported => "attachment combination unsupported",
        };
        f.write_str(label)
    }
}

/// Component type of a vertex attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttribKind {
    Byte,
    UnsignedByte,
    Short,
    UnsignedShort,
    Float,
}

impl AttribKind {
    pub const fn size(self) -> u32 {
        match self {
            AttribKind::Byte | AttribKind::UnsignedByte => 1,
            AttribKind::Short | AttribKind::UnsignedShort => 2,
            AttribKind::Float => 4,
        }
    }
}

/// Fully resolved vertex attribute pointer, captured from the bound array buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexAttrib {
    pub location: u32,
    pub kind: AttribKind,
    pub count: u32,
    pub normalize: bool,
    pub stride: u32,
    pub offset: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2([f32; 2]),
    /// Column-major.
    Mat3([f32; 9]),
}

pub trait Device {
    fn create_buffer(&mut self) -> Option<BufferId>;
    fn delete_buffer(&mut self, buffer: BufferId);
    fn bind_array_buffer(&mut self, buffer: Option<BufferId>);
    /// Replaces the contents of the bound array buffer.
    fn buffer_data(&mut self, data: &[u8], usage: BufferUsage);
    /// Records where `attrib.location` reads from in the bound array buffer.
    fn vertex_attrib_pointer(&mut self, attrib: VertexAttrib);
    fn draw_arrays(&mut self, primitive: Primitive, first: u32, count: u32);

    fn create_shader(&mut self, stage: ShaderStage) -> Option<ShaderId>;
    fn shader_source(&mut self, shader: ShaderId, source: &str);
    fn compile_shader(&mut self, shader: ShaderId) -> bool;
    fn shader_info_log(&self, shader: ShaderId) -> String;
    fn delete_shader(&mut self, shader: ShaderId);

    fn create_program(&mut self) -> Option<ProgramId>;
    fn attach_shader(&mut self, program: ProgramId, shader: ShaderId);
    fn detach_shader(&mut self, program: ProgramId, shader: ShaderId);
    /// Must be requested before `link_program` to take effect.
    fn bind_attrib_location(&mut self, program: ProgramId, location: u32, name: &str);
    fn link_program(&mut self, program: ProgramId) -> bool;
    fn program_info_log(&self, program: ProgramId) -> String;
    fn use_program(&mut self, program: Option<ProgramId>);
    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;
    /// Writes into the program that owns `location`, whether or not it is in use.
    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue);
    fn delete_program(&mut self, program: ProgramId);

    fn create_texture(&mut self) -> Option<TextureId>;
    fn active_texture(&mut self, unit: u32);
    /// Binds to the active texture unit.
    fn bind_texture(&mut self, texture: Option<TextureId>);
    fn tex_parameters(&mut self, filter: TextureFilter, wrap: TextureWrap);
    /// (Re)allocates storage for the bound texture, optionally filling it with
    /// tightly packed rows in `format`.
    fn tex_image_2d(
        &mut self,
        format: TextureFormat,
        width: u32,
        height: u32,
        pixels: Option<&[u8]>,
    );
    fn delete_texture(&mut self, texture: TextureId);

    fn create_framebuffer(&mut self) -> Option<FramebufferId>;
    /// `None` selects the default (visible) framebuffer.
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>);
    fn framebuffer_texture_2d(&mut self, attachment: u32, texture: Option<TextureId>);
    fn check_framebuffer_status(&self) -> FramebufferStatus;
    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);

    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32);
    fn clear_color(&mut self, color: [f32; 4]);
    /// Clears the bound framebuffer's color attachment.
    fn clear(&mut self);
}
