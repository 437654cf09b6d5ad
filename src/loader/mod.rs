use std::collections::HashMap;

use fxrt_files::fx::reader::{EffectBinary, UnstructuredData};
use fxrt_files::fx::types::{
    ARRAY_INDEX_NONE, BinaryAnnotation, BinaryConstantBuffer, BinaryGroup, BinaryGsSoInitializer, BinaryHeader,
    BinaryInterfaceInitializer, BinaryInterfaceVariable, BinaryNumericVariable, BinaryObjectVariable, BinaryPass,
    BinaryShaderData5, BinaryTechnique, CbFlags, EffectVersion, NumericLayout, ObjectType, REGISTER_SIZE,
    ScalarType, TypePayload, VariableFlags, align_to_register,
};
use log::{debug, trace};

use crate::arena::{ArenaHandle, ByteArena};
use crate::device::ShaderStage;
use crate::error::{EffectError, malformed};
use crate::model::{
    Annotation, AnnotationId, AnnotationValue, CbId, ClassInstanceRef, ConstantBufferDef, GroupDef, GroupId,
    InterfaceId, PassDef, PassId, PendingAssignment, ShaderDef, ShaderDependencies, ShaderId,
    SignatureCounts, Span, StrId, TechniqueDef, TechniqueId, TypeId, Variable, VariableData, VariableId,
};
use crate::pool::{StringPool, TypePool};
use crate::reflection::ShaderReflector;
use crate::states::{
    BlendDesc, DepthStencilDesc, PassBackingStore, RasterizerDesc, SamplerState, StateFields, StateOwner,
};
use crate::types::{MemberDesc, NumericDesc, StructDesc, TypeDesc, TypeKind, unpack_data};

mod assignments;
mod shader_data;

/// Nesting limit for struct members and base classes, which guards against type records that
/// refer to themselves.
const MAX_TYPE_DEPTH: u32 = 32;

/// A render state or sampler block as parsed, before its assignments are bound to it.
#[derive(Debug, Clone)]
pub(crate) struct ScratchBlock<D> {
    pub owner: Option<VariableId>,
    pub desc: D,
    pub pending: Vec<PendingAssignment>,
}

#[derive(Debug, Clone)]
pub(crate) struct ScratchShader {
    pub def: ShaderDef,
    pub bytecode: Option<ArenaHandle>,
    /// Interface bindings by instance name, resolved once every variable is known.
    pub raw_bindings: Vec<BinaryInterfaceInitializer>,
}

#[derive(Debug, Clone)]
pub(crate) struct ScratchPass {
    pub def: PassDef,
    pub pending: Vec<PendingAssignment>,
}

/// Everything the parser produced, still living in growable scratch storage.
#[derive(Debug)]
pub(crate) struct ScratchEffect {
    pub version: &'static EffectVersion,
    pub header: BinaryHeader,
    pub strings: StringPool,
    pub types: TypePool,
    /// Names, annotation values and bytecode.
    pub reflection: ByteArena,
    /// Constant buffer backing stores.
    pub runtime: ByteArena,
    pub cbs: Vec<ConstantBufferDef>,
    pub cb_storage: Vec<ArenaHandle>,
    pub variables: Vec<Variable>,
    pub variable_names: HashMap<StrId, VariableId>,
    pub annotations: Vec<Annotation>,
    pub blend: Vec<ScratchBlock<BlendDesc>>,
    pub depth_stencil: Vec<ScratchBlock<DepthStencilDesc>>,
    pub rasterizer: Vec<ScratchBlock<RasterizerDesc>>,
    pub samplers: Vec<ScratchBlock<SamplerState>>,
    pub shaders: Vec<ScratchShader>,
    pub anonymous_shaders: u32,
    pub srv_count: u32,
    pub uav_count: u32,
    pub rtv_count: u32,
    pub dsv_count: u32,
    pub string_count: u32,
    pub class_instance_elements: u32,
    /// Initial class instance bound to every interface element.
    pub interfaces: Vec<Option<ClassInstanceRef>>,
    pub groups: Vec<GroupDef>,
    pub techniques: Vec<TechniqueDef>,
    pub passes: Vec<ScratchPass>,
}

pub(crate) struct Loader<'a, 'r> {
    binary: EffectBinary<'a>,
    reflector: &'r dyn ShaderReflector,
    out: ScratchEffect,
}

/// Parses and validates `data` into a scratch graph.
pub(crate) fn load(data: &[u8], reflector: &dyn ShaderReflector) -> Result<ScratchEffect, EffectError> {
    let binary = EffectBinary::parse(data)?;
    debug!(
        "Loading {} effect: {} constant buffers, {} numeric and {} object variables, {} techniques",
        binary.version.name,
        binary.header.effect.c_cbs,
        binary.header.effect.c_numeric_variables,
        binary.header.effect.c_object_variables,
        binary.header.c_techniques
    );

    let mut loader = Loader::new(binary, reflector);
    loader.load_constant_buffers()?;
    loader.load_object_variables()?;
    loader.load_interface_variables()?;
    loader.load_groups()?;
    loader.check_totals()?;
    loader.load_shader_dependencies()?;
    loader.propagate_dependencies();

    debug!(
        "Parsed {} strings, {} types, {} shaders and {} passes",
        loader.out.strings.len(),
        loader.out.types.len(),
        loader.out.shaders.len(),
        loader.out.passes.len()
    );
    Ok(loader.out)
}

impl<'a, 'r> Loader<'a, 'r> {
    fn new(binary: EffectBinary<'a>, reflector: &'r dyn ShaderReflector) -> Self {
        let out = ScratchEffect {
            version: binary.version,
            header: binary.header,
            strings: StringPool::new(),
            types: TypePool::new(),
            reflection: ByteArena::new(),
            runtime: ByteArena::new(),
            cbs: Vec::new(),
            cb_storage: Vec::new(),
            variables: Vec::new(),
            variable_names: HashMap::new(),
            annotations: Vec::new(),
            blend: Vec::new(),
            depth_stencil: Vec::new(),
            rasterizer: Vec::new(),
            samplers: Vec::new(),
            shaders: Vec::new(),
            anonymous_shaders: 0,
            srv_count: 0,
            uav_count: 0,
            rtv_count: 0,
            dsv_count: 0,
            string_count: 0,
            class_instance_elements: 0,
            interfaces: Vec::new(),
            groups: Vec::new(),
            techniques: Vec::new(),
            passes: Vec::new(),
        };
        Self {
            binary,
            reflector,
            out,
        }
    }

    fn header(&self) -> &BinaryHeader {
        &self.binary.header
    }

    fn string(&mut self, offset: u32) -> Result<Option<StrId>, EffectError> {
        Ok(self
            .binary
            .unstructured
            .read_optional_string(offset)?
            .map(|value| self.out.strings.intern(&value)))
    }

    fn lookup_variable(&self, name: Option<StrId>) -> Option<VariableId> {
        name.and_then(|name| self.out.variable_names.get(&name).copied())
    }

    /// Looks up a variable by the name stored at `offset`.
    fn variable_at(&mut self, offset: u32) -> Result<VariableId, EffectError> {
        let name = self.string(offset)?;
        self.lookup_variable(name)
            .ok_or_else(|| malformed("assignment refers to an unknown variable"))
    }

    fn register_variable(&mut self, variable: Variable) -> VariableId {
        let id = VariableId::from(self.out.variables.len());
        if let Some(name) = variable.name {
            self.out.variable_names.insert(name, id);
        }
        self.out.variables.push(variable);
        id
    }

    fn type_desc(&self, id: TypeId) -> &TypeDesc {
        self.out.types.get(id)
    }

    /// Fails when adding `elements` to `current` exceeds the header's `declared` total.
    fn reserve_count(current: u32, elements: u32, declared: u32, reason: &'static str) -> Result<u32, EffectError> {
        current
            .checked_add(elements)
            .filter(|total| *total <= declared)
            .ok_or_else(|| malformed(reason))
    }

    fn load_type(&mut self, offset: u32) -> Result<TypeId, EffectError> {
        self.load_type_nested(offset, 0)
    }

    fn load_type_nested(&mut self, offset: u32, depth: u32) -> Result<TypeId, EffectError> {
        if let Some(id) = self.out.types.by_offset(offset) {
            return Ok(id);
        }
        if depth > MAX_TYPE_DEPTH {
            return Err(malformed("type records nest too deeply"));
        }

        let record = self.binary.unstructured.read_type(offset)?;
        let name = self.string(record.header.o_type_name)?;

        let kind = match record.payload {
            TypePayload::Numeric(bits) => {
                if bits.is_packed_array() {
                    return Err(EffectError::NotImplemented {
                        reason: "packed numeric arrays are not supported",
                    });
                }
                TypeKind::Numeric(NumericDesc {
                    layout: NumericLayout::try_from(bits.layout()).map_err(|_| malformed("invalid numeric layout"))?,
                    scalar: ScalarType::try_from(bits.scalar_type()).map_err(|_| malformed("invalid scalar type"))?,
                    rows: bits.rows(),
                    columns: bits.columns(),
                    column_major: bits.is_column_major(),
                })
            }
            TypePayload::Object(object) => TypeKind::Object(object),
            TypePayload::Struct {
                members,
                o_base_class,
                interfaces,
            } => {
                let mut descs = Vec::with_capacity(members.len());
                let mut running = 0u32;
                for member in members {
                    let ty = self.load_type_nested(member.o_type, depth + 1)?;
                    let size = self.type_desc(ty).total_size;

                    let aligned = align_to_register(running).ok_or_else(|| malformed("struct size overflows"))?;
                    if member.offset != running && member.offset != aligned {
                        return Err(malformed("struct member offset is not packed"));
                    }
                    running = member
                        .offset
                        .checked_add(size)
                        .ok_or_else(|| malformed("struct size overflows"))?;

                    descs.push(MemberDesc {
                        name: self.string(member.o_name)?,
                        semantic: self.string(member.o_semantic)?,
                        offset: member.offset,
                        ty,
                    });
                }
                if align_to_register(running) != Some(record.header.stride) {
                    return Err(malformed("struct stride does not match its members"));
                }

                let base_class = match o_base_class {
                    0 => None,
                    base => Some(self.load_type_nested(base, depth + 1)?),
                };
                let (implements_interface, has_super_class) = if !interfaces.is_empty() {
                    (true, base_class.is_some())
                } else {
                    let inherited = base_class.is_some_and(|base| self.type_desc(base).is_class_instance());
                    (inherited, inherited)
                };

                TypeKind::Struct(StructDesc {
                    members: descs,
                    base_class,
                    implements_interface,
                    has_super_class,
                })
            }
            TypePayload::Interface => TypeKind::Interface,
        };

        let id = self.out.types.intern(TypeDesc {
            name,
            elements: record.header.elements,
            total_size: record.header.total_size,
            stride: record.header.stride,
            packed_size: record.header.packed_size,
            kind,
        });
        self.out.types.remember_offset(offset, id);
        trace!("Type at {:#x} interned as {:?}", offset, id);
        Ok(id)
    }

    /// Reads an annotation list from the structured stream.
    fn load_annotations(&mut self) -> Result<Span<AnnotationId>, EffectError> {
        let count = self.binary.structured.read_u32()?;
        let start = self.out.annotations.len() as u32;

        for _ in 0..count {
            let record: BinaryAnnotation = self.binary.structured.read_record()?;
            let name = self.string(record.o_name)?;
            let ty = self.load_type(record.o_type)?;
            let desc = self.type_desc(ty).clone();

            let value = match &desc.kind {
                TypeKind::Object(ObjectType::String) => {
                    let offsets = self.binary.structured.read_records::<u32>(desc.element_count())?;
                    let strings = offsets
                        .into_iter()
                        .map(|offset| self.string(offset))
                        .collect::<Result<Vec<_>, _>>()?;
                    AnnotationValue::Strings(strings)
                }
                TypeKind::Numeric(_) => {
                    let offset = self.binary.structured.read_u32()?;
                    let handle = self.out.reflection.allocate_raw(desc.total_size as usize)?;
                    if offset != 0 {
                        let packed = self
                            .binary
                            .unstructured
                            .read_at(offset as usize, desc.packed_size as usize)?;
                        unpack_data(
                            self.out.types.as_slice(),
                            &desc,
                            self.out.reflection.get_mut(handle),
                            packed,
                        )?;
                    }
                    AnnotationValue::Numeric(handle)
                }
                _ => return Err(malformed("annotations must be strings or numeric values")),
            };

            self.out.annotations.push(Annotation { name, ty, value });
        }

        Ok(Span::new(start, count))
    }

    fn load_constant_buffers(&mut self) -> Result<(), EffectError> {
        for _ in 0..self.header().effect.c_cbs {
            let record: BinaryConstantBuffer = self.binary.structured.read_record()?;
            let name = self.string(record.o_name)?;
            if record.size % REGISTER_SIZE != 0 {
                return Err(malformed("constant buffer size is not register aligned"));
            }

            let cb = CbId::from(self.out.cbs.len());
            let storage = self.out.runtime.allocate_raw(record.size as usize)?;
            let annotations = self.load_annotations()?;

            let first = self.out.variables.len() as u32;
            for _ in 0..record.c_variables {
                self.load_numeric_variable(cb, storage, record.size)?;
            }
            if self.out.variables.len() as u32 > self.header().effect.c_numeric_variables {
                return Err(malformed("more numeric variables than declared"));
            }

            trace!("Constant buffer {:?}: {} bytes, {} variables", cb, record.size, record.c_variables);
            self.out.cbs.push(ConstantBufferDef {
                name,
                size: record.size,
                flags: CbFlags::from_bits_truncate(record.flags),
                explicit_bind_point: (record.explicit_bind_point != u32::MAX).then_some(record.explicit_bind_point),
                variables: Span::new(first, record.c_variables),
                annotations,
            });
            self.out.cb_storage.push(storage);
        }
        Ok(())
    }

    fn load_numeric_variable(&mut self, cb: CbId, storage: ArenaHandle, cb_size: u32) -> Result<(), EffectError> {
        let record: BinaryNumericVariable = self.binary.structured.read_record()?;
        let name = self.string(record.o_name)?;
        let semantic = self.string(record.o_semantic)?;
        let ty = self.load_type(record.o_type)?;
        let desc = self.type_desc(ty).clone();

        if !desc.belongs_in_constant_buffer() {
            return Err(malformed("constant buffer variables must be numeric or structs"));
        }
        let end = record
            .offset
            .checked_add(desc.total_size)
            .filter(|end| *end <= cb_size)
            .ok_or_else(|| malformed("variable does not fit its constant buffer"))?;

        if record.o_default_value != 0 {
            let packed = self
                .binary
                .unstructured
                .read_at(record.o_default_value as usize, desc.packed_size as usize)?;
            let bytes = &mut self.out.runtime.get_mut(storage)[record.offset as usize..end as usize];
            unpack_data(self.out.types.as_slice(), &desc, bytes, packed)?;
        }

        if desc.is_class_instance() {
            self.out.class_instance_elements = Self::reserve_count(
                self.out.class_instance_elements,
                desc.element_count(),
                self.header().c_class_instance_elements,
                "more class instance elements than declared",
            )?;
        }

        let flags = VariableFlags::from_bits_truncate(record.flags);
        let annotations = self.load_annotations()?;
        self.register_variable(Variable {
            name,
            semantic,
            ty,
            flags,
            explicit_bind_point: flags.contains(VariableFlags::EXPLICIT_BIND_POINT).then_some(record.offset),
            annotations,
            data: VariableData::Numeric {
                cb,
                offset: record.offset,
            },
        });
        Ok(())
    }

    fn load_object_variables(&mut self) -> Result<(), EffectError> {
        for _ in 0..self.header().effect.c_object_variables {
            let record: BinaryObjectVariable = self.binary.structured.read_record()?;
            let name = self.string(record.o_name)?;
            let semantic = self.string(record.o_semantic)?;
            let ty = self.load_type(record.o_type)?;
            let desc = self.type_desc(ty).clone();
            let object = desc
                .object_type()
                .ok_or_else(|| malformed("object variables must have an object type"))?;
            let elements = desc.element_count();
            let id = VariableId::from(self.out.variables.len());

            let data = self.load_object_payload(id, object, elements)?;
            let annotations = self.load_annotations()?;

            trace!("Object variable {:?} of {:?} with {} elements", id, object, elements);
            self.register_variable(Variable {
                name,
                semantic,
                ty,
                flags: VariableFlags::empty(),
                explicit_bind_point: (record.explicit_bind_point != u32::MAX).then_some(record.explicit_bind_point),
                annotations,
                data,
            });
        }
        Ok(())
    }

    fn load_object_payload(&mut self, id: VariableId, object: ObjectType, elements: u32) -> Result<VariableData, EffectError> {
        let header = *self.header();
        let data = match object {
            ObjectType::String => {
                self.out.string_count =
                    Self::reserve_count(self.out.string_count, elements, header.c_strings, "too many strings")?;
                let offsets = self.binary.structured.read_records::<u32>(elements)?;
                let strings = offsets
                    .into_iter()
                    .map(|offset| self.string(offset))
                    .collect::<Result<Vec<_>, _>>()?;
                VariableData::Strings(strings)
            }
            ObjectType::Blend => {
                Self::reserve_count(self.out.blend.len() as u32, elements, header.c_blend_state_blocks, "too many blend blocks")?;
                let start = self.out.blend.len() as u32;
                for _ in 0..elements {
                    let block = self.load_state_block(id, StateOwner::Blend)?;
                    self.out.blend.push(block);
                }
                VariableData::Blend(Span::new(start, elements))
            }
            ObjectType::DepthStencil => {
                Self::reserve_count(
                    self.out.depth_stencil.len() as u32,
                    elements,
                    header.c_depth_stencil_blocks,
                    "too many depth stencil blocks",
                )?;
                let start = self.out.depth_stencil.len() as u32;
                for _ in 0..elements {
                    let block = self.load_state_block(id, StateOwner::DepthStencil)?;
                    self.out.depth_stencil.push(block);
                }
                VariableData::DepthStencil(Span::new(start, elements))
            }
            ObjectType::Rasterizer => {
                Self::reserve_count(
                    self.out.rasterizer.len() as u32,
                    elements,
                    header.c_rasterizer_state_blocks,
                    "too many rasterizer blocks",
                )?;
                let start = self.out.rasterizer.len() as u32;
                for _ in 0..elements {
                    let block = self.load_state_block(id, StateOwner::Rasterizer)?;
                    self.out.rasterizer.push(block);
                }
                VariableData::Rasterizer(Span::new(start, elements))
            }
            ObjectType::Sampler => {
                Self::reserve_count(self.out.samplers.len() as u32, elements, header.c_samplers, "too many samplers")?;
                let start = self.out.samplers.len() as u32;
                for _ in 0..elements {
                    let block = self.load_state_block(id, StateOwner::Sampler)?;
                    self.out.samplers.push(block);
                }
                VariableData::Sampler(Span::new(start, elements))
            }
            ObjectType::RenderTargetView => {
                let start = self.out.rtv_count;
                self.out.rtv_count =
                    Self::reserve_count(start, elements, header.c_render_target_views, "too many render target views")?;
                VariableData::RenderTargetView(Span::new(start, elements))
            }
            ObjectType::DepthStencilView => {
                let start = self.out.dsv_count;
                self.out.dsv_count =
                    Self::reserve_count(start, elements, header.c_depth_stencil_views, "too many depth stencil views")?;
                VariableData::DepthStencilView(Span::new(start, elements))
            }
            shader if shader.is_shader() => {
                let stage = ShaderStage::from_object_type(shader).ok_or_else(|| malformed("invalid shader type"))?;
                let start = self.out.shaders.len() as u32;
                for _ in 0..elements {
                    self.load_variable_shader(id, shader, stage)?;
                }
                VariableData::Shader(Span::new(start, elements))
            }
            resource if resource.is_shader_resource() => {
                let start = self.out.srv_count;
                self.out.srv_count =
                    Self::reserve_count(start, elements, header.c_shader_resources, "too many shader resources")?;
                VariableData::ShaderResource(Span::new(start, elements))
            }
            view if view.is_unordered_access_view() => {
                let start = self.out.uav_count;
                self.out.uav_count = Self::reserve_count(
                    start,
                    elements,
                    header.c_unordered_access_views,
                    "too many unordered access views",
                )?;
                VariableData::UnorderedAccessView(Span::new(start, elements))
            }
            _ => {
                return Err(EffectError::NotImplemented {
                    reason: "unsupported object variable type",
                });
            }
        };
        Ok(data)
    }

    fn load_state_block<D: StateFields + Default>(
        &mut self,
        owner: VariableId,
        kind: StateOwner,
    ) -> Result<ScratchBlock<D>, EffectError> {
        let count = self.binary.structured.read_u32()?;
        let mut desc = D::default();
        let pending = self.load_assignments(count, kind, &mut desc)?;
        Ok(ScratchBlock {
            owner: Some(owner),
            desc,
            pending,
        })
    }

    /// Shader records come in three shapes depending on the object type.
    fn load_variable_shader(&mut self, owner: VariableId, object: ObjectType, stage: ShaderStage) -> Result<ShaderId, EffectError> {
        if object.is_shader5() {
            let record: BinaryShaderData5 = self.binary.structured.read_record()?;
            if record.c_so_decls > 4 {
                return Err(malformed("too many stream output declarations"));
            }
            let decls = record.o_so_decls[..record.c_so_decls as usize].to_vec();
            self.add_shader(
                stage,
                Some(owner),
                record.o_shader,
                &decls,
                record.rasterized_stream,
                Some((record.c_interface_bindings, record.o_interface_bindings)),
            )
        } else if object == ObjectType::GeometryShaderSO {
            let record: BinaryGsSoInitializer = self.binary.structured.read_record()?;
            self.add_shader(stage, Some(owner), record.o_shader, &[record.o_so_decl], 0, None)
        } else {
            let o_shader = self.binary.structured.read_u32()?;
            self.add_shader(stage, Some(owner), o_shader, &[], 0, None)
        }
    }

    /// Creates a shader block. An empty bytecode block is a deliberate null shader, its stream
    /// output declarations and interface bindings are not read.
    fn add_shader(
        &mut self,
        stage: ShaderStage,
        owner: Option<VariableId>,
        o_shader: u32,
        so_decls: &[u32],
        rasterized_stream: u32,
        interface_bindings: Option<(u32, u32)>,
    ) -> Result<ShaderId, EffectError> {
        if self.out.shaders.len() as u32 >= self.header().c_total_shaders {
            return Err(malformed("more shaders than declared"));
        }
        if stage != ShaderStage::Geometry && so_decls.iter().any(|decl| *decl != 0) {
            return Err(malformed("only geometry shaders can stream out"));
        }

        let bytecode = self.binary.unstructured.read_data_block(o_shader)?;
        let (handle, decls, raw_bindings) = if bytecode.is_empty() {
            (None, Vec::new(), Vec::new())
        } else {
            let handle = self.out.reflection.append(bytecode)?;
            let decls = so_decls
                .iter()
                .map(|offset| self.string(*offset))
                .collect::<Result<Vec<_>, _>>()?;
            let raw_bindings = match interface_bindings {
                Some((count, offset)) if count > 0 => {
                    self.binary.unstructured.seek(offset as usize)?;
                    self.binary
                        .unstructured
                        .read_records::<BinaryInterfaceInitializer>(count)?
                }
                _ => Vec::new(),
            };
            (Some(handle), decls, raw_bindings)
        };

        let id = ShaderId::from(self.out.shaders.len());
        self.out.shaders.push(ScratchShader {
            def: ShaderDef {
                stage,
                owner,
                has_bytecode: handle.is_some(),
                is_null_gs: false,
                so_decls: decls,
                rasterized_stream,
                interface_bindings: Vec::new(),
                dependencies: ShaderDependencies::default(),
                signature: SignatureCounts::default(),
            },
            bytecode: handle,
            raw_bindings,
        });
        Ok(id)
    }

    fn load_interface_variables(&mut self) -> Result<(), EffectError> {
        for _ in 0..self.header().c_interface_variables {
            let record: BinaryInterfaceVariable = self.binary.structured.read_record()?;
            let name = self.string(record.o_name)?;
            let ty = self.load_type(record.o_type)?;
            let desc = self.type_desc(ty).clone();
            if desc.kind != TypeKind::Interface {
                return Err(malformed("interface variables must have an interface type"));
            }

            let elements = desc.element_count();
            let start = self.out.interfaces.len() as u32;
            Self::reserve_count(
                start,
                elements,
                self.header().c_interface_variable_elements,
                "too many interface elements",
            )?;

            if record.o_default_value != 0 {
                self.binary.unstructured.seek(record.o_default_value as usize)?;
                let initializers = self
                    .binary
                    .unstructured
                    .read_records::<BinaryInterfaceInitializer>(elements)?;
                for initializer in initializers {
                    let instance = self.resolve_class_instance(&initializer)?;
                    self.out.interfaces.push(Some(instance));
                }
            } else {
                self.out.interfaces.extend(std::iter::repeat_n(None, elements as usize));
            }

            let annotations = self.load_annotations()?;
            self.register_variable(Variable {
                name,
                semantic: None,
                ty,
                flags: VariableFlags::from_bits_truncate(record.flags),
                explicit_bind_point: None,
                annotations,
                data: VariableData::Interface(Span::<InterfaceId>::new(start, elements)),
            });
        }
        Ok(())
    }

    /// Resolves an initializer naming a class instance variable, optionally one of its elements.
    fn resolve_class_instance(&mut self, initializer: &BinaryInterfaceInitializer) -> Result<ClassInstanceRef, EffectError> {
        let name = self.string(initializer.o_instance_name)?;
        let variable = self
            .lookup_variable(name)
            .ok_or_else(|| malformed("interface initializer names an unknown class instance"))?;
        let desc = self.type_desc(self.out.variables[variable.index()].ty);
        if !desc.is_class_instance() {
            return Err(malformed("interface initializer does not name a class instance"));
        }

        let element = match initializer.array_index {
            ARRAY_INDEX_NONE if !desc.is_array() => 0,
            index if desc.is_array() && index < desc.elements => index,
            _ => return Err(malformed("interface initializer index does not match the class instance")),
        };
        Ok(ClassInstanceRef { variable, element })
    }

    fn load_groups(&mut self) -> Result<(), EffectError> {
        let header = *self.header();

        if header.c_groups == 0 {
            // older versions list their techniques without any group record
            if header.c_techniques > 0 {
                let techniques = self.load_techniques(header.c_techniques)?;
                self.out.groups.push(GroupDef {
                    name: None,
                    annotations: Span::default(),
                    techniques,
                    has_dependencies: false,
                });
            }
            return Ok(());
        }

        let mut unnamed = 0;
        let mut total = 0u32;
        for _ in 0..header.c_groups {
            let record: BinaryGroup = self.binary.structured.read_record()?;
            let name = self.string(record.o_name)?;
            if name.is_none() {
                unnamed += 1;
                if unnamed > 1 {
                    return Err(malformed("more than one unnamed group"));
                }
            }
            total = Self::reserve_count(total, record.c_techniques, header.c_techniques, "more techniques than declared")?;

            let annotations = self.load_annotations()?;
            let techniques = self.load_techniques(record.c_techniques)?;
            trace!("Group {:?} with {} techniques", GroupId::from(self.out.groups.len()), record.c_techniques);
            self.out.groups.push(GroupDef {
                name,
                annotations,
                techniques,
                has_dependencies: false,
            });
        }

        if total != header.c_techniques {
            return Err(malformed("group technique counts do not add up to the declared total"));
        }
        Ok(())
    }

    fn load_techniques(&mut self, count: u32) -> Result<Span<TechniqueId>, EffectError> {
        let start = self.out.techniques.len() as u32;
        for _ in 0..count {
            let record: BinaryTechnique = self.binary.structured.read_record()?;
            let name = self.string(record.o_name)?;
            let annotations = self.load_annotations()?;

            let first_pass = self.out.passes.len() as u32;
            for _ in 0..record.c_passes {
                self.load_pass()?;
            }

            self.out.techniques.push(TechniqueDef {
                name,
                annotations,
                passes: Span::new(first_pass, record.c_passes),
                has_dependencies: false,
            });
        }
        Ok(Span::new(start, count))
    }

    fn load_pass(&mut self) -> Result<PassId, EffectError> {
        let record: BinaryPass = self.binary.structured.read_record()?;
        let name = self.string(record.o_name)?;
        let annotations = self.load_annotations()?;

        let mut store = PassBackingStore::default();
        let pending = self.load_assignments(record.c_assignments, StateOwner::Pass, &mut store)?;

        let id = PassId::from(self.out.passes.len());
        trace!(
            "Pass {:?}: {} assignments, {} stay live",
            id,
            record.c_assignments,
            pending.len()
        );
        self.out.passes.push(ScratchPass {
            def: PassDef {
                name,
                annotations,
                declared_assignments: record.c_assignments,
                assignments: Span::default(),
                has_dependencies: false,
                initial: store,
            },
            pending,
        });
        Ok(id)
    }

    /// Compares what was parsed against every total the header declared.
    fn check_totals(&self) -> Result<(), EffectError> {
        let header = self.header();
        let out = &self.out;
        let checks = [
            (
                out.variables.len() as u32,
                header
                    .effect
                    .c_numeric_variables
                    .saturating_add(header.effect.c_object_variables)
                    .saturating_add(header.c_interface_variables),
                "variable count",
            ),
            (out.shaders.len() as u32, header.c_total_shaders, "shader count"),
            (out.anonymous_shaders, header.c_inline_shaders, "inline shader count"),
            (out.blend.len() as u32, header.c_blend_state_blocks, "blend block count"),
            (out.depth_stencil.len() as u32, header.c_depth_stencil_blocks, "depth stencil block count"),
            (out.rasterizer.len() as u32, header.c_rasterizer_state_blocks, "rasterizer block count"),
            (out.samplers.len() as u32, header.c_samplers, "sampler count"),
            (out.string_count, header.c_strings, "string count"),
            (out.srv_count, header.c_shader_resources, "shader resource count"),
            (out.uav_count, header.c_unordered_access_views, "unordered access view count"),
            (out.rtv_count, header.c_render_target_views, "render target view count"),
            (out.dsv_count, header.c_depth_stencil_views, "depth stencil view count"),
            (out.interfaces.len() as u32, header.c_interface_variable_elements, "interface element count"),
            (out.class_instance_elements, header.c_class_instance_elements, "class instance element count"),
            (out.techniques.len() as u32, header.c_techniques, "technique count"),
        ];

        for (parsed, declared, what) in checks {
            if parsed != declared {
                debug!("Header declares {} {} but {} were parsed", declared, what, parsed);
                return Err(malformed("parsed counts do not match the header"));
            }
        }
        Ok(())
    }

    /// Marks passes whose state can change after loading, then techniques and groups
    /// containing them.
    fn propagate_dependencies(&mut self) {
        let out = &mut self.out;
        for pass in &mut out.passes {
            let store = &pass.def.initial;
            let live_block = store
                .rasterizer
                .block()
                .is_some_and(|id| !out.rasterizer[id.index()].pending.is_empty())
                || store
                    .depth_stencil
                    .block()
                    .is_some_and(|id| !out.depth_stencil[id.index()].pending.is_empty())
                || store.blend.block().is_some_and(|id| !out.blend[id.index()].pending.is_empty());
            pass.def.has_dependencies = !pass.pending.is_empty() || live_block;
        }

        for technique in &mut out.techniques {
            technique.has_dependencies = technique
                .passes
                .iter()
                .any(|pass: PassId| out.passes[pass.index()].def.has_dependencies);
        }
        for group in &mut out.groups {
            group.has_dependencies = group
                .techniques
                .iter()
                .any(|technique: TechniqueId| out.techniques[technique.index()].has_dependencies);
        }
    }
}
