use crate::device::{
    Device, ObjectKind, ProgramId, ShaderId, ShaderStage, UniformLocation, UniformValue,
};
use crate::error::PipelineError;

use super::texture::Texture2D;
use super::{trace_double_free, warn_leak};

#[derive(Debug)]
pub struct Shader {
    id: Option<ShaderId>,
    stage: ShaderStage,
}

impl Shader {
    pub fn create(device: &mut dyn Device, stage: ShaderStage) -> Result<Self, PipelineError> {
        let id = device
            .create_shader(stage)
            .ok_or(PipelineError::Allocation(ObjectKind::Shader))?;
        Ok(Self {
            id: Some(id),
            stage,
        })
    }

    /// Creates and compiles a shader in one step. On failure the shader is freed
    /// and the device's compile log is returned.
    pub fn compile(
        device: &mut dyn Device,
        stage: ShaderStage,
        source: &str,
    ) -> Result<Self, PipelineError> {
        let mut shader = Self::create(device, stage)?;
        let id = shader.handle();
        device.shader_source(id, source);
        if !device.compile_shader(id) {
            let log = device.shader_info_log(id);
            shader.free(device);
            return Err(PipelineError::Compile { stage, log });
        }
        Ok(shader)
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn id(&self) -> Option<ShaderId> {
        self.id
    }

    fn handle(&self) -> ShaderId {
        self.id.expect("shader used after free")
    }

    pub fn free(&mut self, device: &mut dyn Device) {
        match self.id.take() {
            Some(id) => device.delete_shader(id),
            None => trace_double_free(ObjectKind::Shader),
        }
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        if let Some(id) = self.id {
            warn_leak(ObjectKind::Shader, id.raw());
        }
    }
}

#[derive(Debug)]
pub struct Program {
    id: Option<ProgramId>,
}

impl Program {
    pub fn create(device: &mut dyn Device) -> Result<Self, PipelineError> {
        let id = device
            .create_program()
            .ok_or(PipelineError::Allocation(ObjectKind::Program))?;
        Ok(Self { id: Some(id) })
    }

    /// Attaches both shaders, lets `configure` request attribute locations, then
    /// links. Shaders are detached again after a successful link and stay owned
    /// by the caller. On failure the program is freed.
    pub fn link(
        device: &mut dyn Device,
        vertex: &Shader,
        fragment: &Shader,
        configure: impl FnOnce(&mut dyn Device, &Program),
    ) -> Result<Self, PipelineError> {
        let mut program = Self::create(device)?;
        let id = program.handle();
        device.attach_shader(id, vertex.handle());
        device.attach_shader(id, fragment.handle());
        configure(&mut *device, &program);

        if !device.link_program(id) {
            let log = device.program_info_log(id);
            program.free(device);
            return Err(PipelineError::Link { log });
        }

        device.detach_shader(id, vertex.handle());
        device.detach_shader(id, fragment.handle());
        program.bind(device);
        Ok(program)
    }

    pub fn attach(&self, device: &mut dyn Device, shader: &Shader) {
        device.attach_shader(self.handle(), shader.handle());
    }

    pub fn detach(&self, device: &mut dyn Device, shader: &Shader) {
        device.detach_shader(self.handle(), shader.handle());
    }

    pub fn request_attribute_location(
        &self,
        device: &mut dyn Device,
        name: &str,
        location: u32,
    ) -> &Self {
        device.bind_attrib_location(self.handle(), location, name);
        self
    }

    pub fn id(&self) -> Option<ProgramId> {
        self.id
    }

    fn handle(&self) -> ProgramId {
        self.id.expect("program used after free")
    }

    pub fn bind(&self, device: &mut dyn Device) {
        device.use_program(Some(self.handle()));
    }

    pub fn unbind(device: &mut dyn Device) {
        device.use_program(None);
    }

    /// Resolves a uniform by name. Names the program does not use resolve to an
    /// inert uniform whose writes are ignored.
    pub fn uniform(&self, device: &dyn Device, name: &str) -> Uniform {
        let location = device.uniform_location(self.handle(), name);
        if location.is_none() {
            tracing::trace!(uniform = name, "uniform not active in program");
        }
        Uniform {
            name: name.to_string(),
            location,
        }
    }

    pub fn free(&mut self, device: &mut dyn Device) {
        match self.id.take() {
            Some(id) => device.delete_program(id),
            None => trace_double_free(ObjectKind::Program),
        }
    }
}

impl Drop for Program {
    fn drop(&mut self) {
        if let Some(id) = self.id {
            warn_leak(ObjectKind::Program, id.raw());
        }
    }
}

/// A named slot in a program, resolved once.
#[derive(Clone, Debug, PartialEq)]
pub struct Uniform {
    name: String,
    location: Option<UniformLocation>,
}

impl Uniform {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.location.is_some()
    }

    pub fn set(&self, device: &mut dyn Device, value: UniformValue) {
        if let Some(location) = self.location {
            device.set_uniform(location, value);
        }
    }

    pub fn set_i32(&self, device: &mut dyn Device, value: i32) {
        self.set(device, UniformValue::Int(value));
    }

    pub fn set_f32(&self, device: &mut dyn Device, value: f32) {
        self.set(device, UniformValue::Float(value));
    }

    pub fn set_vec2(&self, device: &mut dyn Device, x: f32, y: f32) {
        self.set(device, UniformValue::Vec2([x, y]));
    }

    /// `matrix` is column-major.
    pub fn set_mat3(&self, device: &mut dyn Device, matrix: [f32; 9]) {
        self.set(device, UniformValue::Mat3(matrix));
    }

    /// Binds `texture` to `unit` and points the sampler uniform at it.
    pub fn set_texture_2d(&self, device: &mut dyn Device, texture: &Texture2D, unit: u32) {
        texture.bind_to_unit(device, unit);
        self.set_i32(device, unit as i32);
    }
}
