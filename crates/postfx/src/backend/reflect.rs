//! Resource and interface reflection over naga modules parsed from GLSL.
//!
//! Programs follow one binding convention: everything lives in descriptor
//! set 0, the uniform block (if any) at binding 0, each `texture2D` at an even
//! binding `2k` with its `sampler` at `2k + 1`.

use std::collections::BTreeMap;

use wgpu::naga;

use crate::device::{ShaderStage, UniformValue};

/// Scalar, vector and matrix shapes a uniform block member can take.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MemberType {
    Float,
    Int,
    Vec2,
    Vec3,
    Vec4,
    Mat3,
    Mat4,
    Other,
}

impl MemberType {
    pub(crate) fn accepts(&self, value: &UniformValue) -> bool {
        matches!(
            (self, value),
            (MemberType::Float, UniformValue::Float(_))
                | (MemberType::Int, UniformValue::Int(_))
                | (MemberType::Vec2, UniformValue::Vec2(_))
                | (MemberType::Mat3, UniformValue::Mat3(_))
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct BlockMember {
    pub name: String,
    pub offset: u32,
    pub ty: MemberType,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct UniformBlock {
    pub binding: u32,
    pub size: u32,
    pub members: Vec<BlockMember>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum HandleKind {
    Image,
    Sampler,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct HandleBinding {
    pub name: String,
    pub binding: u32,
    pub kind: HandleKind,
}

/// What one compiled stage exposes to the pipeline.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct StageReflection {
    pub block: Option<UniformBlock>,
    pub handles: Vec<HandleBinding>,
    /// Vertex inputs by name, only filled for vertex shaders.
    pub inputs: BTreeMap<String, u32>,
}

pub(crate) fn naga_stage(stage: ShaderStage) -> naga::ShaderStage {
    match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    }
}

/// Parses GLSL into a naga module, rendering parse failures the way a GL
/// info log would present them.
pub(crate) fn parse(stage: ShaderStage, source: &str) -> Result<naga::Module, String> {
    let mut frontend = naga::front::glsl::Frontend::default();
    frontend
        .parse(&naga::front::glsl::Options::from(naga_stage(stage)), source)
        .map_err(|errors| errors.emit_to_string(source))
}

pub(crate) fn reflect(module: &naga::Module) -> Result<StageReflection, String> {
    let mut reflection = StageReflection::default();

    for (_, global) in module.global_variables.iter() {
        let Some(binding) = global.binding.as_ref() else {
            continue;
        };
        let name = global.name.clone().unwrap_or_default();
        if binding.group != 0 {
            return Err(format!(
                "'{name}' is bound in descriptor set {}; only set 0 is supported",
                binding.group
            ));
        }

        match (&global.space, &module.types[global.ty].inner) {
            (naga::AddressSpace::Uniform, naga::TypeInner::Struct { members, span }) => {
                if reflection.block.is_some() {
                    return Err("more than one uniform block per stage is not supported".into());
                }
                let members = members
                    .iter()
                    .filter_map(|member| {
                        Some(BlockMember {
                            name: member.name.clone()?,
                            offset: member.offset,
                            ty: member_type(&module.types[member.ty].inner),
                        })
                    })
                    .collect();
                reflection.block = Some(UniformBlock {
                    binding: binding.binding,
                    size: *span,
                    members,
                });
            }
            (naga::AddressSpace::Handle, naga::TypeInner::Image { dim, arrayed, .. }) => {
                if *dim != naga::ImageDimension::D2 || *arrayed {
                    return Err(format!("'{name}' must be a non-arrayed texture2D"));
                }
                if binding.binding % 2 != 0 {
                    return Err(format!(
                        "texture '{name}' must use an even binding, found {}",
                        binding.binding
                    ));
                }
                reflection.handles.push(HandleBinding {
                    name,
                    binding: binding.binding,
                    kind: HandleKind::Image,
                });
            }
            (naga::AddressSpace::Handle, naga::TypeInner::Sampler { .. }) => {
                if binding.binding % 2 != 1 {
                    return Err(format!(
                        "sampler '{name}' must use an odd binding, found {}",
                        binding.binding
                    ));
                }
                reflection.handles.push(HandleBinding {
                    name,
                    binding: binding.binding,
                    kind: HandleKind::Sampler,
                });
            }
            (space, _) => {
                return Err(format!("unsupported resource '{name}' in address space {space:?}"));
            }
        }
    }

    if let Some(entry) = module
        .entry_points
        .iter()
        .find(|entry| entry.stage == naga::ShaderStage::Vertex)
    {
        for argument in &entry.function.arguments {
            if let (Some(name), Some(naga::Binding::Location { location, .. })) =
                (argument.name.as_ref(), argument.binding.as_ref())
            {
                reflection.inputs.insert(name.clone(), *location);
            }
        }
    }

    reflection.handles.sort_by_key(|handle| handle.binding);
    Ok(reflection)
}

fn member_type(inner: &naga::TypeInner) -> MemberType {
    use naga::{ScalarKind, TypeInner, VectorSize};

    match inner {
        TypeInner::Scalar(scalar) => match scalar.kind {
            ScalarKind::Float => MemberType::Float,
            ScalarKind::Sint | ScalarKind::Uint => MemberType::Int,
            _ => MemberType::Other,
        },
        TypeInner::Vector { size, scalar } if scalar.kind == ScalarKind::Float => match size {
            VectorSize::Bi => MemberType::Vec2,
            VectorSize::Tri => MemberType::Vec3,
            VectorSize::Quad => MemberType::Vec4,
        },
        TypeInner::Matrix { columns, rows, .. } => match (columns, rows) {
            (VectorSize::Tri, VectorSize::Tri) => MemberType::Mat3,
            (VectorSize::Quad, VectorSize::Quad) => MemberType::Mat4,
            _ => MemberType::Other,
        },
        _ => MemberType::Other,
    }
}

/// One resolvable uniform name in a linked program. The slot index of a name
/// is its position in `ProgramReflection::uniforms`.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum UniformSlot {
    Member(BlockMember),
    Image { name: String, binding: u32 },
}

impl UniformSlot {
    pub(crate) fn name(&self) -> &str {
        match self {
            UniformSlot::Member(member) => &member.name,
            UniformSlot::Image { name, .. } => name,
        }
    }
}

/// Vertex and fragment reflections merged into a single set-0 layout.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct ProgramReflection {
    pub block: Option<UniformBlock>,
    pub handles: Vec<HandleBinding>,
    pub inputs: BTreeMap<String, u32>,
    pub uniforms: Vec<UniformSlot>,
}

impl ProgramReflection {
    pub(crate) fn merge(
        vertex: &StageReflection,
        fragment: &StageReflection,
    ) -> Result<Self, String> {
        let block = match (&vertex.block, &fragment.block) {
            (Some(a), Some(b)) if a != b => {
                return Err("vertex and fragment stages declare different uniform blocks".into())
            }
            (Some(block), _) | (None, Some(block)) => Some(block.clone()),
            (None, None) => None,
        };

        let mut handles: Vec<HandleBinding> = Vec::new();
        for handle in vertex.handles.iter().chain(&fragment.handles) {
            match handles.iter().find(|existing| existing.binding == handle.binding) {
                Some(existing) if existing == handle => {}
                Some(existing) => {
                    return Err(format!(
                        "binding {} is declared as both '{}' and '{}'",
                        handle.binding, existing.name, handle.name
                    ))
                }
                None => handles.push(handle.clone()),
            }
        }
        if let Some(block) = &block {
            if let Some(clash) = handles.iter().find(|handle| handle.binding == block.binding) {
                return Err(format!(
                    "'{}' shares binding {} with the uniform block",
                    clash.name, block.binding
                ));
            }
        }
        handles.sort_by_key(|handle| handle.binding);

        let mut uniforms: Vec<UniformSlot> = block
            .iter()
            .flat_map(|block| block.members.iter().cloned().map(UniformSlot::Member))
            .collect();
        uniforms.extend(
            handles
                .iter()
                .filter(|handle| handle.kind == HandleKind::Image)
                .map(|handle| UniformSlot::Image {
                    name: handle.name.clone(),
                    binding: handle.binding,
                }),
        );

        Ok(Self {
            block,
            handles,
            inputs: vertex.inputs.clone(),
            uniforms,
        })
    }

    pub(crate) fn slot(&self, name: &str) -> Option<u32> {
        self.uniforms
            .iter()
            .position(|uniform| uniform.name() == name)
            .map(|slot| slot as u32)
    }
}

/// std140 bytes for `value`. Matrix columns are padded to 16 bytes.
pub(crate) fn std140_bytes(value: &UniformValue) -> Vec<u8> {
    match value {
        UniformValue::Int(v) => v.to_ne_bytes().to_vec(),
        UniformValue::Float(v) => v.to_ne_bytes().to_vec(),
        UniformValue::Vec2(v) => bytemuck::cast_slice(v).to_vec(),
        UniformValue::Mat3(m) => {
            let mut padded = [0.0f32; 12];
            for column in 0..3 {
                padded[column * 4..column * 4 + 3].copy_from_slice(&m[column * 3..column * 3 + 3]);
            }
            bytemuck::cast_slice(&padded).to_vec()
        }
    }
}
