//! Read-only descriptions of a loaded effect. Names, semantics and annotations are `None` or
//! empty once the effect is optimized.

use fxrt_files::fx::types::{ObjectType, ScalarType, VarType, VariableFlags};

use super::Effect;
use crate::device::ShaderStage;
use crate::error::{EffectError, invalid_call, not_found};
use crate::model::{
    AnnotationId, AnnotationValue, CbId, GroupId, ObjectRef, PassId, ShaderId, SignatureCounts, Span, TechniqueId,
    TypeId, VariableData, VariableId,
};
use crate::types::TypeKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectDesc {
    pub version: &'static str,
    pub constant_buffers: usize,
    pub variables: usize,
    pub groups: usize,
    pub techniques: usize,
    pub passes: usize,
    pub shaders: usize,
    pub interface_elements: u32,
    pub optimized: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationData<'a> {
    Strings(Vec<Option<&'a str>>),
    /// Register aligned, like a constant buffer variable.
    Numeric(&'a [u8]),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationDesc<'a> {
    pub name: Option<&'a str>,
    pub ty: TypeId,
    pub data: AnnotationData<'a>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupDesc<'a> {
    pub name: Option<&'a str>,
    pub techniques: u32,
    pub annotations: Vec<AnnotationDesc<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TechniqueDesc<'a> {
    pub name: Option<&'a str>,
    pub passes: u32,
    pub annotations: Vec<AnnotationDesc<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PassDesc<'a> {
    pub name: Option<&'a str>,
    /// Assignment records in the binary, folded ones included.
    pub assignments: u32,
    /// Assignments re-evaluated on apply.
    pub live_assignments: u32,
    pub annotations: Vec<AnnotationDesc<'a>>,
    pub stencil_ref: u32,
    pub sample_mask: u32,
    pub blend_factor: [f32; 4],
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDesc<'a> {
    pub name: Option<&'a str>,
    pub semantic: Option<&'a str>,
    pub flags: VariableFlags,
    pub ty: TypeId,
    pub explicit_bind_point: Option<u32>,
    /// Constant buffer and byte offset of numeric variables.
    pub buffer: Option<(CbId, u32)>,
    pub annotations: Vec<AnnotationDesc<'a>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberDescription<'a> {
    pub name: Option<&'a str>,
    pub semantic: Option<&'a str>,
    pub offset: u32,
    pub ty: TypeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescription<'a> {
    pub name: Option<&'a str>,
    pub class: VarType,
    pub scalar: Option<ScalarType>,
    pub object: Option<ObjectType>,
    pub rows: u32,
    pub columns: u32,
    pub column_major: bool,
    pub elements: u32,
    pub packed_size: u32,
    pub unpacked_size: u32,
    pub stride: u32,
    pub members: Vec<MemberDescription<'a>>,
    pub base_class: Option<TypeId>,
    pub implements_interface: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstantBufferDesc<'a> {
    pub name: Option<&'a str>,
    pub size: u32,
    pub is_tbuffer: bool,
    pub is_single: bool,
    pub explicit_bind_point: Option<u32>,
    pub variables: Vec<VariableId>,
    pub annotations: Vec<AnnotationDesc<'a>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderDesc<'a> {
    pub stage: ShaderStage,
    /// `None` for shaders created inline by a pass.
    pub variable: Option<VariableId>,
    /// 0 for null shaders and once the effect is optimized.
    pub bytecode_len: usize,
    pub is_null_gs: bool,
    pub so_decls: Vec<Option<&'a str>>,
    pub rasterized_stream: u32,
    pub signature: SignatureCounts,
}

impl Effect {
    pub fn desc(&self) -> EffectDesc {
        EffectDesc {
            version: self.graph.version.name,
            constant_buffers: self.graph.cbs.len(),
            variables: self.graph.variables.len(),
            groups: self.graph.groups.len(),
            techniques: self.graph.techniques.len(),
            passes: self.graph.passes.len(),
            shaders: self.graph.shaders.len(),
            interface_elements: self.graph.interface_count,
            optimized: self.is_optimized(),
        }
    }

    fn annotation_descs(&self, span: Span<AnnotationId>) -> Vec<AnnotationDesc<'_>> {
        let Some(reflection) = self.reflection.as_deref() else {
            return Vec::new();
        };
        reflection
            .annotations(span)
            .iter()
            .map(|annotation| AnnotationDesc {
                name: reflection.name(annotation.name),
                ty: annotation.ty,
                data: match &annotation.value {
                    AnnotationValue::Strings(strings) => {
                        AnnotationData::Strings(strings.iter().map(|id| reflection.name(*id)).collect())
                    }
                    AnnotationValue::Numeric(handle) => AnnotationData::Numeric(reflection.arena.get(*handle)),
                },
            })
            .collect()
    }

    pub fn group_desc(&self, group: GroupId) -> Result<GroupDesc<'_>, EffectError> {
        let def = self
            .graph
            .groups
            .get(group.index())
            .ok_or_else(|| not_found("group", group.0.to_string()))?;
        Ok(GroupDesc {
            name: self.name(def.name),
            techniques: def.techniques.len,
            annotations: self.annotation_descs(def.annotations),
        })
    }

    pub fn technique_desc(&self, technique: TechniqueId) -> Result<TechniqueDesc<'_>, EffectError> {
        let def = self
            .graph
            .techniques
            .get(technique.index())
            .ok_or_else(|| not_found("technique", technique.0.to_string()))?;
        Ok(TechniqueDesc {
            name: self.name(def.name),
            passes: def.passes.len,
            annotations: self.annotation_descs(def.annotations),
        })
    }

    /// Pass state values reflect this instance's last apply.
    pub fn pass_desc(&self, pass: PassId) -> Result<PassDesc<'_>, EffectError> {
        let def = self
            .graph
            .passes
            .get(pass.index())
            .ok_or_else(|| not_found("pass", pass.0.to_string()))?;
        let store = &self.state.passes[pass.index()].store;
        Ok(PassDesc {
            name: self.name(def.name),
            assignments: def.declared_assignments,
            live_assignments: def.assignments.len,
            annotations: self.annotation_descs(def.annotations),
            stencil_ref: store.stencil_ref,
            sample_mask: store.sample_mask,
            blend_factor: store.blend_factor,
        })
    }

    /// The shader a pass binds for `stage`, if it names one.
    pub fn pass_shader(&self, pass: PassId, stage: ShaderStage) -> Result<Option<ShaderId>, EffectError> {
        let state = self
            .state
            .passes
            .get(pass.index())
            .ok_or_else(|| not_found("pass", pass.0.to_string()))?;
        Ok(match state.store.shader(stage) {
            ObjectRef::Block(shader) => Some(shader),
            _ => None,
        })
    }

    pub fn variable_desc(&self, var: VariableId) -> Result<VariableDesc<'_>, EffectError> {
        let variable = self
            .graph
            .variables
            .get(var.index())
            .ok_or_else(|| not_found("variable", var.0.to_string()))?;
        let buffer = match variable.data {
            VariableData::Numeric { cb, offset } => Some((cb, offset)),
            _ => None,
        };
        Ok(VariableDesc {
            name: self.name(variable.name),
            semantic: self.name(variable.semantic),
            flags: variable.flags,
            ty: variable.ty,
            explicit_bind_point: variable.explicit_bind_point,
            buffer,
            annotations: self.annotation_descs(variable.annotations),
        })
    }

    pub fn type_description(&self, ty: TypeId) -> Result<TypeDescription<'_>, EffectError> {
        let desc = self
            .graph
            .types
            .get(ty.index())
            .ok_or_else(|| not_found("type", ty.0.to_string()))?;

        let mut description = TypeDescription {
            name: self.name(desc.name),
            class: desc.var_type(),
            scalar: None,
            object: desc.object_type(),
            rows: 0,
            columns: 0,
            column_major: false,
            elements: desc.elements,
            packed_size: desc.packed_size,
            unpacked_size: desc.total_size,
            stride: desc.stride,
            members: Vec::new(),
            base_class: None,
            implements_interface: false,
        };
        match &desc.kind {
            TypeKind::Numeric(numeric) => {
                description.scalar = Some(numeric.scalar);
                description.rows = numeric.rows;
                description.columns = numeric.columns;
                description.column_major = numeric.column_major;
            }
            TypeKind::Struct(structure) => {
                description.members = structure
                    .members
                    .iter()
                    .map(|member| MemberDescription {
                        name: self.name(member.name),
                        semantic: self.name(member.semantic),
                        offset: member.offset,
                        ty: member.ty,
                    })
                    .collect();
                description.base_class = structure.base_class;
                description.implements_interface = structure.implements_interface;
            }
            TypeKind::Object(_) | TypeKind::Interface => {}
        }
        Ok(description)
    }

    pub fn constant_buffer_desc(&self, cb: CbId) -> Result<ConstantBufferDesc<'_>, EffectError> {
        let def = self
            .graph
            .cbs
            .get(cb.index())
            .ok_or_else(|| not_found("constant buffer", cb.0.to_string()))?;
        Ok(ConstantBufferDesc {
            name: self.name(def.name),
            size: def.size,
            is_tbuffer: def.is_tbuffer(),
            is_single: def.is_single(),
            explicit_bind_point: def.explicit_bind_point,
            variables: def.variables.iter().collect(),
            annotations: self.annotation_descs(def.annotations),
        })
    }

    pub fn shader_desc(&self, shader: ShaderId) -> Result<ShaderDesc<'_>, EffectError> {
        let def = self
            .graph
            .shaders
            .get(shader.index())
            .ok_or_else(|| not_found("shader", shader.0.to_string()))?;
        let bytecode_len = self
            .reflection
            .as_deref()
            .and_then(|reflection| reflection.bytecode(shader))
            .map_or(0, <[u8]>::len);
        Ok(ShaderDesc {
            stage: def.stage,
            variable: def.owner,
            bytecode_len,
            is_null_gs: def.is_null_gs,
            so_decls: def.so_decls.iter().map(|decl| self.name(*decl)).collect(),
            rasterized_stream: def.rasterized_stream,
            signature: def.signature,
        })
    }

    /// Shader blocks owned by a shader variable, one per element.
    pub fn variable_shaders(&self, var: VariableId) -> Result<Vec<ShaderId>, EffectError> {
        match self.graph.variables.get(var.index()).map(|variable| &variable.data) {
            Some(VariableData::Shader(span)) => Ok(span.iter().collect()),
            Some(_) => Err(invalid_call("the variable is not a shader")),
            None => Err(not_found("variable", var.0.to_string())),
        }
    }
}
