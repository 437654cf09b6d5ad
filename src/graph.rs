use fxrt_files::fx::types::{BinaryHeader, EffectVersion};

use crate::arena::{ArenaHandle, ByteArena};
use crate::model::{
    Annotation, AnnotationId, AssignmentDef, ConstantBufferDef, GroupDef, PassDef, ShaderDef, ShaderId, Span,
    StateBlockDef, StrId, TechniqueDef, Variable, VariableId,
};
use crate::types::TypeDesc;

/// The immutable part of a loaded effect, shared by every clone.
#[derive(Debug)]
pub struct EffectGraph {
    pub version: &'static EffectVersion,
    pub header: BinaryHeader,
    pub types: Vec<TypeDesc>,
    pub cbs: Vec<ConstantBufferDef>,
    pub variables: Vec<Variable>,
    pub rasterizers: Vec<StateBlockDef>,
    pub depth_stencils: Vec<StateBlockDef>,
    pub blends: Vec<StateBlockDef>,
    pub samplers: Vec<StateBlockDef>,
    pub shaders: Vec<ShaderDef>,
    pub assignments: Vec<AssignmentDef>,
    pub groups: Vec<GroupDef>,
    pub techniques: Vec<TechniqueDef>,
    pub passes: Vec<PassDef>,
    pub srv_count: u32,
    pub uav_count: u32,
    pub rtv_count: u32,
    pub dsv_count: u32,
    pub interface_count: u32,
}

impl EffectGraph {
    pub fn type_of(&self, variable: VariableId) -> &TypeDesc {
        &self.types[self.variables[variable.index()].ty.index()]
    }

    pub fn variable(&self, variable: VariableId) -> &Variable {
        &self.variables[variable.index()]
    }
}

/// Names, annotations and bytecode. Dropped by [`crate::Effect::optimize`].
#[derive(Debug)]
pub struct ReflectionData {
    pub arena: ByteArena,
    /// Indexed by [`StrId`].
    pub strings: Vec<ArenaHandle>,
    pub annotations: Vec<Annotation>,
    /// Indexed by [`ShaderId`], `None` for null shaders.
    pub bytecode: Vec<Option<ArenaHandle>>,
}

impl ReflectionData {
    pub fn string(&self, id: StrId) -> Option<&str> {
        let handle = self.strings.get(id.index())?;
        std::str::from_utf8(self.arena.get(*handle)).ok()
    }

    pub fn name(&self, id: Option<StrId>) -> Option<&str> {
        id.and_then(|id| self.string(id))
    }

    pub fn bytecode(&self, shader: ShaderId) -> Option<&[u8]> {
        self.bytecode
            .get(shader.index())
            .copied()
            .flatten()
            .map(|handle| self.arena.get(handle))
    }

    pub fn annotations(&self, span: Span<AnnotationId>) -> &[Annotation] {
        let start = span.start as usize;
        self.annotations
            .get(start..start + span.len as usize)
            .unwrap_or_default()
    }
}
