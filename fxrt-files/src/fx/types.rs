use bitflags::bitflags;
use fxrt_files_derive_parseable::{Emit, Parse};
use num_enum::{IntoPrimitive, TryFromPrimitive};

// Layout of compiled effect binaries: a fixed header, an offset addressed "unstructured" blob
// (strings, type records, default values, bytecode) and a sequential "structured" record stream.

pub const HEADER_SIZE: usize = 96;
pub const REGISTER_SIZE: u32 = 16;
pub const SCALAR_SIZE: u32 = 4;
pub const SIMULTANEOUS_RENDER_TARGET_COUNT: u32 = 8;
pub const MAX_INTERFACES: u32 = 253;
pub const SO_STREAM_COUNT: usize = 4;
pub const NO_RASTERIZED_STREAM: u32 = 0xFFFF_FFFF;
/// Marks an interface initializer that refers to a non-array class instance.
pub const ARRAY_INDEX_NONE: u32 = 0xFFFF_FFFF;

pub const fn align_to_register(size: u32) -> Option<u32> {
    match size.checked_add(REGISTER_SIZE - 1) {
        Some(padded) => Some(padded & !(REGISTER_SIZE - 1)),
        None => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectVersion {
    pub tag: u32,
    pub version: u32,
    pub name: &'static str,
}

pub const FX_4_0: u32 = 0xFEFF_1001;
pub const FX_4_1: u32 = 0xFEFF_1011;
pub const FX_5_0: u32 = 0xFEFF_2001;

/// Supported versions, ascending.
pub const EFFECT_VERSIONS: [EffectVersion; 3] = [
    EffectVersion {
        tag: FX_4_0,
        version: 0x40,
        name: "fx_4_0",
    },
    EffectVersion {
        tag: FX_4_1,
        version: 0x41,
        name: "fx_4_1",
    },
    EffectVersion {
        tag: FX_5_0,
        version: 0x50,
        name: "fx_5_0",
    },
];

pub fn find_version(tag: u32) -> Option<&'static EffectVersion> {
    EFFECT_VERSIONS.iter().find(|version| version.tag == tag)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Parse, Emit)]
pub struct VarCounts {
    pub c_cbs: u32,
    pub c_numeric_variables: u32,
    pub c_object_variables: u32,
}

impl VarCounts {
    pub fn is_empty(&self) -> bool {
        self.c_cbs == 0 && self.c_numeric_variables == 0 && self.c_object_variables == 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Parse, Emit)]
pub struct BinaryHeader {
    pub tag: u32,
    pub effect: VarCounts,
    pub pool: VarCounts,
    pub c_techniques: u32,
    pub cb_unstructured: u32,
    pub c_strings: u32,
    pub c_shader_resources: u32,
    pub c_depth_stencil_blocks: u32,
    pub c_blend_state_blocks: u32,
    pub c_rasterizer_state_blocks: u32,
    pub c_samplers: u32,
    pub c_render_target_views: u32,
    pub c_depth_stencil_views: u32,
    pub c_total_shaders: u32,
    pub c_inline_shaders: u32,
    pub c_groups: u32,
    pub c_unordered_access_views: u32,
    pub c_interface_variables: u32,
    pub c_interface_variable_elements: u32,
    pub c_class_instance_elements: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum VarType {
    Numeric = 1,
    Object = 2,
    Struct = 3,
    Interface = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum ScalarType {
    Float = 1,
    Int = 2,
    UInt = 3,
    Bool = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum NumericLayout {
    Scalar = 1,
    Vector = 2,
    Matrix = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum ObjectType {
    String = 1,
    Blend = 2,
    DepthStencil = 3,
    Rasterizer = 4,
    PixelShader = 5,
    VertexShader = 6,
    GeometryShader = 7,
    GeometryShaderSO = 8,
    Texture = 9,
    Texture1D = 10,
    Texture1DArray = 11,
    Texture2D = 12,
    Texture2DArray = 13,
    Texture2DMS = 14,
    Texture2DMSArray = 15,
    Texture3D = 16,
    TextureCube = 17,
    ConstantBuffer = 18,
    RenderTargetView = 19,
    DepthStencilView = 20,
    Sampler = 21,
    Buffer = 22,
    TextureCubeArray = 23,
    // 24 is the legacy element count and never used as a tag
    PixelShader5 = 25,
    VertexShader5 = 26,
    GeometryShader5 = 27,
    ComputeShader5 = 28,
    HullShader5 = 29,
    DomainShader5 = 30,
    RWTexture1D = 31,
    RWTexture1DArray = 32,
    RWTexture2D = 33,
    RWTexture2DArray = 34,
    RWTexture3D = 35,
    RWBuffer = 36,
    ByteAddressBuffer = 37,
    RWByteAddressBuffer = 38,
    StructuredBuffer = 39,
    RWStructuredBuffer = 40,
    RWStructuredBufferAlloc = 41,
    RWStructuredBufferConsume = 42,
    AppendStructuredBuffer = 43,
    ConsumeStructuredBuffer = 44,
}

impl ObjectType {
    pub fn is_state_block(self) -> bool {
        matches!(
            self,
            ObjectType::Blend | ObjectType::DepthStencil | ObjectType::Rasterizer | ObjectType::Sampler
        )
    }

    pub fn is_shader(self) -> bool {
        matches!(
            self,
            ObjectType::PixelShader
                | ObjectType::VertexShader
                | ObjectType::GeometryShader
                | ObjectType::GeometryShaderSO
                | ObjectType::PixelShader5
                | ObjectType::VertexShader5
                | ObjectType::GeometryShader5
                | ObjectType::ComputeShader5
                | ObjectType::HullShader5
                | ObjectType::DomainShader5
        )
    }

    pub fn is_shader5(self) -> bool {
        self.is_shader() && self >= ObjectType::PixelShader5
    }

    pub fn is_shader_resource(self) -> bool {
        matches!(
            self,
            ObjectType::Texture
                | ObjectType::Texture1D
                | ObjectType::Texture1DArray
                | ObjectType::Texture2D
                | ObjectType::Texture2DArray
                | ObjectType::Texture2DMS
                | ObjectType::Texture2DMSArray
                | ObjectType::Texture3D
                | ObjectType::TextureCube
                | ObjectType::Buffer
                | ObjectType::TextureCubeArray
                | ObjectType::ByteAddressBuffer
                | ObjectType::StructuredBuffer
        )
    }

    pub fn is_unordered_access_view(self) -> bool {
        matches!(
            self,
            ObjectType::RWTexture1D
                | ObjectType::RWTexture1DArray
                | ObjectType::RWTexture2D
                | ObjectType::RWTexture2DArray
                | ObjectType::RWTexture3D
                | ObjectType::RWBuffer
                | ObjectType::RWByteAddressBuffer
                | ObjectType::RWStructuredBuffer
                | ObjectType::RWStructuredBufferAlloc
                | ObjectType::RWStructuredBufferConsume
                | ObjectType::AppendStructuredBuffer
                | ObjectType::ConsumeStructuredBuffer
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum AssignmentType {
    Constant = 1,
    Variable = 2,
    ConstIndex = 3,
    VariableIndex = 4,
    ExpressionIndex = 5,
    Expression = 6,
    InlineShader = 7,
    InlineShader5 = 8,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CbFlags: u32 {
        const IS_TBUFFER = 1 << 0;
        const IS_SINGLE = 1 << 1;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VariableFlags: u32 {
        const ANNOTATION = 1 << 1;
        const EXPLICIT_BIND_POINT = 1 << 2;
    }
}

/// Header of every type record in the unstructured blob. The variable-type specific payload
/// follows immediately.
#[derive(Debug, Clone, Copy, Default, Parse, Emit)]
pub struct BinaryType {
    pub o_type_name: u32,
    pub var_type: u32,
    pub elements: u32,
    pub total_size: u32,
    pub stride: u32,
    pub packed_size: u32,
}

/// Bitfield describing a numeric type:
/// layout (3 bits), scalar type (5), rows (3), columns (3), column major (1), packed array (1).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Parse, Emit)]
pub struct BinaryNumericType {
    pub bits: u32,
}

impl BinaryNumericType {
    pub fn new(layout: NumericLayout, scalar: ScalarType, rows: u32, columns: u32, column_major: bool) -> Self {
        let bits = (u32::from(layout) & 0x7)
            | ((u32::from(scalar) & 0x1F) << 3)
            | ((rows & 0x7) << 8)
            | ((columns & 0x7) << 11)
            | ((column_major as u32) << 14);
        Self { bits }
    }

    pub fn layout(&self) -> u32 {
        self.bits & 0x7
    }

    pub fn scalar_type(&self) -> u32 {
        (self.bits >> 3) & 0x1F
    }

    pub fn rows(&self) -> u32 {
        (self.bits >> 8) & 0x7
    }

    pub fn columns(&self) -> u32 {
        (self.bits >> 11) & 0x7
    }

    pub fn is_column_major(&self) -> bool {
        (self.bits >> 14) & 1 != 0
    }

    pub fn is_packed_array(&self) -> bool {
        (self.bits >> 15) & 1 != 0
    }
}

#[derive(Debug, Clone, Copy, Default, Parse, Emit)]
pub struct BinaryMember {
    pub o_name: u32,
    pub o_semantic: u32,
    pub offset: u32,
    pub o_type: u32,
}

#[derive(Debug, Clone, Copy, Default, Parse, Emit)]
pub struct BinaryConstantBuffer {
    pub o_name: u32,
    pub size: u32,
    pub flags: u32,
    pub c_variables: u32,
    pub explicit_bind_point: u32,
}

#[derive(Debug, Clone, Copy, Default, Parse, Emit)]
pub struct BinaryAnnotation {
    pub o_name: u32,
    pub o_type: u32,
}

#[derive(Debug, Clone, Copy, Default, Parse, Emit)]
pub struct BinaryNumericVariable {
    pub o_name: u32,
    pub o_type: u32,
    pub o_semantic: u32,
    pub offset: u32,
    pub o_default_value: u32,
    pub flags: u32,
}

#[derive(Debug, Clone, Copy, Default, Parse, Emit)]
pub struct BinaryObjectVariable {
    pub o_name: u32,
    pub o_type: u32,
    pub o_semantic: u32,
    pub explicit_bind_point: u32,
}

#[derive(Debug, Clone, Copy, Default, Parse, Emit)]
pub struct BinaryInterfaceVariable {
    pub o_name: u32,
    pub o_type: u32,
    pub o_default_value: u32,
    pub flags: u32,
}

#[derive(Debug, Clone, Copy, Default, Parse, Emit)]
pub struct BinaryInterfaceInitializer {
    pub o_instance_name: u32,
    pub array_index: u32,
}

/// Geometry shader with a single stream output declaration.
#[derive(Debug, Clone, Copy, Default, Parse, Emit)]
pub struct BinaryGsSoInitializer {
    pub o_shader: u32,
    pub o_so_decl: u32,
}

#[derive(Debug, Clone, Copy, Default, Parse, Emit)]
pub struct BinaryShaderData5 {
    pub o_shader: u32,
    pub o_so_decls: [u32; 4],
    pub c_so_decls: u32,
    pub rasterized_stream: u32,
    pub c_interface_bindings: u32,
    pub o_interface_bindings: u32,
}

#[derive(Debug, Clone, Copy, Default, Parse, Emit)]
pub struct BinaryGroup {
    pub o_name: u32,
    pub c_techniques: u32,
}

#[derive(Debug, Clone, Copy, Default, Parse, Emit)]
pub struct BinaryTechnique {
    pub o_name: u32,
    pub c_passes: u32,
}

#[derive(Debug, Clone, Copy, Default, Parse, Emit)]
pub struct BinaryPass {
    pub o_name: u32,
    pub c_assignments: u32,
}

#[derive(Debug, Clone, Copy, Default, Parse, Emit)]
pub struct BinaryAssignment {
    pub i_state: u32,
    pub index: u32,
    pub assignment_type: u32,
    pub o_initializer: u32,
}

/// A single immediate value of a constant assignment. `value` holds the raw bits, its meaning
/// depends on `scalar_type`.
#[derive(Debug, Clone, Copy, Default, Parse, Emit)]
pub struct BinaryConstant {
    pub scalar_type: u32,
    pub value: u32,
}

impl BinaryConstant {
    pub fn int(value: i32) -> Self {
        Self {
            scalar_type: ScalarType::Int.into(),
            value: value as u32,
        }
    }

    pub fn uint(value: u32) -> Self {
        Self {
            scalar_type: ScalarType::UInt.into(),
            value,
        }
    }

    pub fn float(value: f32) -> Self {
        Self {
            scalar_type: ScalarType::Float.into(),
            value: value.to_bits(),
        }
    }

    pub fn bool(value: bool) -> Self {
        Self {
            scalar_type: ScalarType::Bool.into(),
            value: value as u32,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Parse, Emit)]
pub struct BinaryConstantIndex {
    pub o_array_name: u32,
    pub index: u32,
}

#[derive(Debug, Clone, Copy, Default, Parse, Emit)]
pub struct BinaryVariableIndex {
    pub o_array_name: u32,
    pub o_index_var_name: u32,
}

#[derive(Debug, Clone, Copy, Default, Parse, Emit)]
pub struct BinaryInlineShader {
    pub o_shader: u32,
    pub o_so_decl: u32,
}

/// Variable-type specific part of a type record.
#[derive(Debug, Clone)]
pub enum TypePayload {
    Numeric(BinaryNumericType),
    Object(ObjectType),
    Struct {
        members: Vec<BinaryMember>,
        o_base_class: u32,
        interfaces: Vec<u32>,
    },
    Interface,
}

#[derive(Debug, Clone)]
pub struct TypeRecord {
    pub header: BinaryType,
    pub var_type: VarType,
    pub payload: TypePayload,
}
