use std::marker::PhantomData;

use fxrt_files::fx::types::{CbFlags, VariableFlags};

use crate::device::ShaderStage;
use crate::states::{PassBackingStore, StateIndex};

macro_rules! define_id {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u32);

            impl $name {
                pub fn index(self) -> usize {
                    self.0 as usize
                }
            }

            impl From<usize> for $name {
                fn from(index: usize) -> Self {
                    Self(index as u32)
                }
            }
        )*
    };
}

define_id!(
    /// Interned type descriptor.
    TypeId,
    /// Interned string.
    StrId,
    CbId,
    VariableId,
    AnnotationId,
    ShaderId,
    BlendId,
    DepthStencilId,
    RasterizerId,
    SamplerId,
    SrvId,
    UavId,
    RtvId,
    DsvId,
    /// One element of an interface variable.
    InterfaceId,
    GroupId,
    TechniqueId,
    PassId,
    /// A live assignment, folded assignments never get one.
    AssignmentId,
);

/// Contiguous run of ids.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Span<I> {
    pub start: u32,
    pub len: u32,
    _marker: PhantomData<I>,
}

// derive would require `I: Clone`
impl<I> Clone for Span<I> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<I> Copy for Span<I> {}

impl<I> Default for Span<I> {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl<I> Span<I> {
    pub fn new(start: u32, len: u32) -> Self {
        Self {
            start,
            len,
            _marker: PhantomData,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<I: From<usize>> Span<I> {
    pub fn get(&self, index: u32) -> Option<I> {
        (index < self.len).then(|| I::from((self.start + index) as usize))
    }

    pub fn first(&self) -> Option<I> {
        self.get(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = I> + use<I> {
        (self.start..self.start + self.len).map(|i| I::from(i as usize))
    }
}

/// An object slot. `Unset` leaves the device state alone, `Null` explicitly binds nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ObjectRef<I> {
    #[default]
    Unset,
    Null,
    Block(I),
}

impl<I: Copy> ObjectRef<I> {
    pub fn block(&self) -> Option<I> {
        match self {
            ObjectRef::Block(id) => Some(*id),
            _ => None,
        }
    }
}

/// A block of any kind, as produced by folding an object assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockRef {
    Null,
    Rasterizer(RasterizerId),
    DepthStencil(DepthStencilId),
    Blend(BlendId),
    Shader(ShaderId),
    RenderTarget(RtvId),
    DepthStencilView(DsvId),
    ShaderResource(SrvId),
}

#[derive(Debug, Clone)]
pub enum AnnotationValue {
    Strings(Vec<Option<StrId>>),
    /// Register aligned value inside the reflection arena.
    Numeric(crate::arena::ArenaHandle),
}

#[derive(Debug, Clone)]
pub struct Annotation {
    pub name: Option<StrId>,
    pub ty: TypeId,
    pub value: AnnotationValue,
}

#[derive(Debug, Clone)]
pub struct ConstantBufferDef {
    pub name: Option<StrId>,
    pub size: u32,
    pub flags: CbFlags,
    pub explicit_bind_point: Option<u32>,
    pub variables: Span<VariableId>,
    pub annotations: Span<AnnotationId>,
}

impl ConstantBufferDef {
    pub fn is_tbuffer(&self) -> bool {
        self.flags.contains(CbFlags::IS_TBUFFER)
    }

    pub fn is_single(&self) -> bool {
        self.flags.contains(CbFlags::IS_SINGLE)
    }
}

#[derive(Debug, Clone)]
pub enum VariableData {
    /// Lives at `offset` inside the backing store of `cb`.
    Numeric { cb: CbId, offset: u32 },
    Strings(Vec<Option<StrId>>),
    Blend(Span<BlendId>),
    DepthStencil(Span<DepthStencilId>),
    Rasterizer(Span<RasterizerId>),
    Sampler(Span<SamplerId>),
    Shader(Span<ShaderId>),
    ShaderResource(Span<SrvId>),
    UnorderedAccessView(Span<UavId>),
    RenderTargetView(Span<RtvId>),
    DepthStencilView(Span<DsvId>),
    Interface(Span<InterfaceId>),
}

impl VariableData {
    /// The block for `element`, if this is an object variable with blocks.
    pub fn block(&self, element: u32) -> Option<BlockRef> {
        match self {
            VariableData::Blend(span) => span.get(element).map(BlockRef::Blend),
            VariableData::DepthStencil(span) => span.get(element).map(BlockRef::DepthStencil),
            VariableData::Rasterizer(span) => span.get(element).map(BlockRef::Rasterizer),
            VariableData::Shader(span) => span.get(element).map(BlockRef::Shader),
            VariableData::ShaderResource(span) => span.get(element).map(BlockRef::ShaderResource),
            VariableData::RenderTargetView(span) => span.get(element).map(BlockRef::RenderTarget),
            VariableData::DepthStencilView(span) => span.get(element).map(BlockRef::DepthStencilView),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: Option<StrId>,
    pub semantic: Option<StrId>,
    pub ty: TypeId,
    pub flags: VariableFlags,
    pub explicit_bind_point: Option<u32>,
    pub annotations: Span<AnnotationId>,
    pub data: VariableData,
}

/// Relocatable destination: a state table entry and element inside whichever block owns the
/// assignment. Only used while loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelativeOffset {
    pub state: StateIndex,
    pub index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignmentOwner {
    Pass(PassId),
    Rasterizer(RasterizerId),
    DepthStencil(DepthStencilId),
    Blend(BlendId),
    Sampler(SamplerId),
}

/// Destination bound to its owner, produced exactly once during compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedHandle {
    pub owner: AssignmentOwner,
    pub state: StateIndex,
    pub index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentRule {
    /// Copies `columns` words starting `byte_offset` bytes into `source`.
    NumericVariable { source: VariableId, byte_offset: u32 },
    /// `array[index]`, the element address is cached until `index` changes.
    NumericVariableIndex { index: VariableId, array: VariableId },
    /// Aliases the `index`th block of `array`.
    ObjectVariableIndex { index: VariableId, array: VariableId },
}

impl AssignmentRule {
    pub fn dependencies(&self) -> impl Iterator<Item = VariableId> + use<> {
        let (first, second) = match *self {
            AssignmentRule::NumericVariable { source, .. } => (source, None),
            AssignmentRule::NumericVariableIndex { index, array } => (index, Some(array)),
            AssignmentRule::ObjectVariableIndex { index, .. } => (index, None),
        };
        std::iter::once(first).chain(second)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PendingAssignment {
    pub destination: RelativeOffset,
    pub rule: AssignmentRule,
}

#[derive(Debug, Clone, Copy)]
pub struct AssignmentDef {
    pub destination: ResolvedHandle,
    pub rule: AssignmentRule,
}

/// Static part of a render state or sampler block, the description itself is mutable state.
#[derive(Debug, Clone, Default)]
pub struct StateBlockDef {
    pub owner: Option<VariableId>,
    pub assignments: Span<AssignmentId>,
}

/// Where a class instance bound to an interface slot comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassInstanceRef {
    pub variable: VariableId,
    pub element: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterfaceRef {
    Null,
    /// Resolved through the interface variable's current binding.
    Interface(InterfaceId),
    /// A class instance bound directly by the shader's interface bindings.
    ClassInstance(ClassInstanceRef),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceRef {
    Null,
    ShaderResource(SrvId),
    /// The view of a texture buffer.
    TextureBuffer(CbId),
    /// Whatever texture the sampler's description currently names.
    SamplerTexture(SamplerId),
}

/// Consecutive bind points starting at `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindRange<T> {
    pub start: u32,
    pub items: Vec<T>,
}

impl<T> BindRange<T> {
    pub fn end(&self) -> u32 {
        self.start + self.items.len() as u32
    }
}

#[derive(Debug, Clone, Default)]
pub struct ShaderDependencies {
    pub constant_buffers: Vec<BindRange<Option<CbId>>>,
    pub samplers: Vec<BindRange<Option<SamplerId>>>,
    pub resources: Vec<BindRange<ResourceRef>>,
    pub unordered_access_views: Option<BindRange<Option<UavId>>>,
    pub interfaces: Option<BindRange<InterfaceRef>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignatureCounts {
    pub input_parameters: u32,
    pub output_parameters: u32,
    pub patch_constant_parameters: u32,
}

#[derive(Debug, Clone)]
pub struct ShaderDef {
    pub stage: ShaderStage,
    /// `None` for anonymous shaders created by inline shader assignments.
    pub owner: Option<VariableId>,
    pub has_bytecode: bool,
    /// A geometry shader with stream output built from vertex shader bytecode.
    pub is_null_gs: bool,
    pub so_decls: Vec<Option<StrId>>,
    pub rasterized_stream: u32,
    pub interface_bindings: Vec<InterfaceRef>,
    pub dependencies: ShaderDependencies,
    pub signature: SignatureCounts,
}

#[derive(Debug, Clone)]
pub struct PassDef {
    pub name: Option<StrId>,
    pub annotations: Span<AnnotationId>,
    /// Assignment records on disk, folded ones included.
    pub declared_assignments: u32,
    pub assignments: Span<AssignmentId>,
    pub has_dependencies: bool,
    /// Backing store after folding, copied into every effect instance.
    pub initial: PassBackingStore,
}

#[derive(Debug, Clone)]
pub struct TechniqueDef {
    pub name: Option<StrId>,
    pub annotations: Span<AnnotationId>,
    pub passes: Span<PassId>,
    pub has_dependencies: bool,
}

#[derive(Debug, Clone)]
pub struct GroupDef {
    pub name: Option<StrId>,
    pub annotations: Span<AnnotationId>,
    pub techniques: Span<TechniqueId>,
    pub has_dependencies: bool,
}
