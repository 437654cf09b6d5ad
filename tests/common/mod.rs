#![allow(dead_code)]

use fxrt::device::recording::{ContextCall, RecordingContext};
use fxrt::device::RasterizerStateHandle;
use fxrt::states::find_state;
use fxrt_files::ParserError;
use fxrt_files::fx::types::{
    AssignmentType, BinaryAssignment, BinaryConstant, BinaryInterfaceInitializer, CbFlags, FX_5_0, NumericLayout,
    ObjectType, ScalarType, VariableFlags,
};
use fxrt_files::fx::writer::{AnnotationSpec, AnnotationValue, FxWriter, StructMemberSpec};

pub fn assignment(state: &str, kind: AssignmentType, o_initializer: u32) -> BinaryAssignment {
    let index = find_state(state).unwrap_or_else(|| panic!("unknown state {}", state));
    BinaryAssignment {
        i_state: u32::from(index.0),
        index: 0,
        assignment_type: kind.into(),
        o_initializer,
    }
}

/// A constant buffer `Params` with `Bias` (int), `Which` (uint), `Ref` (uint, default 7) and
/// `Refs` (uint[3], default 10, 20, 30), a rasterizer whose depth bias follows `Bias`, a two
/// element rasterizer array and one technique `T` in group `G` with the passes:
/// - `Biased`: `RasterizerState = g_Biased`
/// - `Indexed`: `RasterizerState = g_States[Which]`
/// - `Stencil`: `StencilRef = Ref`
/// - `StencilIndexed`: `StencilRef = Refs[Which]`
pub fn dynamic_effect() -> Result<Vec<u8>, ParserError> {
    let mut fx = FxWriter::new(FX_5_0);
    let int = fx.numeric_type("int", NumericLayout::Scalar, ScalarType::Int, 1, 1, false, 0)?;
    let uint = fx.numeric_type("uint", NumericLayout::Scalar, ScalarType::UInt, 1, 1, false, 0)?;
    let uints = fx.numeric_type("uint", NumericLayout::Scalar, ScalarType::UInt, 1, 1, false, 3)?;
    let rasterizer = fx.object_type("RasterizerState", ObjectType::Rasterizer, 0)?;
    let rasterizers = fx.object_type("RasterizerState", ObjectType::Rasterizer, 2)?;

    fx.constant_buffer("Params", 64, CbFlags::empty(), 4, None)?;
    fx.no_annotations()?;
    fx.numeric_variable("Bias", int, None, 0, None, VariableFlags::empty())?;
    fx.no_annotations()?;
    fx.numeric_variable("Which", uint, None, 4, None, VariableFlags::empty())?;
    fx.no_annotations()?;
    let seven = fx.u32_values(&[7]);
    fx.numeric_variable("Ref", uint, None, 8, Some(seven), VariableFlags::empty())?;
    fx.no_annotations()?;
    let refs = fx.u32_values(&[10, 20, 30]);
    fx.numeric_variable("Refs", uints, None, 16, Some(refs), VariableFlags::empty())?;
    fx.no_annotations()?;

    fx.object_variable("g_Biased", rasterizer, None, None)?;
    let bias = fx.variable_reference("Bias");
    fx.assignments(&[assignment("DepthBias", AssignmentType::Variable, bias)])?;
    fx.no_annotations()?;

    fx.object_variable("g_States", rasterizers, None, None)?;
    for cull_mode in [1, 2] {
        let constant = fx.constants(&[BinaryConstant::uint(cull_mode)])?;
        fx.assignments(&[assignment("CullMode", AssignmentType::Constant, constant)])?;
    }
    fx.no_annotations()?;

    fx.group(Some("G"), 1)?;
    fx.no_annotations()?;
    fx.technique("T", 4)?;
    fx.no_annotations()?;

    let biased = fx.variable_reference("g_Biased");
    fx.pass("Biased", &[], &[assignment("RasterizerState", AssignmentType::Variable, biased)])?;
    let indexed = fx.variable_index("g_States", "Which")?;
    fx.pass(
        "Indexed",
        &[],
        &[assignment("RasterizerState", AssignmentType::VariableIndex, indexed)],
    )?;
    let reference = fx.variable_reference("Ref");
    fx.pass("Stencil", &[], &[assignment("StencilRef", AssignmentType::Variable, reference)])?;
    let stencil_indexed = fx.variable_index("Refs", "Which")?;
    fx.pass(
        "StencilIndexed",
        &[],
        &[assignment("StencilRef", AssignmentType::VariableIndex, stencil_indexed)],
    )?;

    fx.finish()
}

/// `Shared` is flagged single and holds `Tint` (float4), `Local` holds `Gain` (float).
pub fn shared_buffer_effect() -> Result<Vec<u8>, ParserError> {
    let mut fx = FxWriter::new(FX_5_0);
    let float4 = fx.numeric_type("float4", NumericLayout::Vector, ScalarType::Float, 1, 4, false, 0)?;
    let float = fx.numeric_type("float", NumericLayout::Scalar, ScalarType::Float, 1, 1, false, 0)?;

    fx.constant_buffer("Shared", 16, CbFlags::IS_SINGLE, 1, None)?;
    fx.no_annotations()?;
    fx.numeric_variable("Tint", float4, None, 0, None, VariableFlags::empty())?;
    fx.no_annotations()?;

    fx.constant_buffer("Local", 16, CbFlags::empty(), 1, None)?;
    fx.no_annotations()?;
    fx.numeric_variable("Gain", float, None, 0, None, VariableFlags::empty())?;
    fx.no_annotations()?;

    fx.finish()
}

/// Class instances `g_Matte` (a `Matte`) and `g_Glossy` (a `Matte[2]`) in buffer `Classes`,
/// and an interface array `g_Shade` initialized with `g_Matte[matte_index]` and
/// `g_Glossy[glossy_index]`.
pub fn interface_effect(matte_index: u32, glossy_index: u32) -> Result<Vec<u8>, ParserError> {
    let mut fx = FxWriter::new(FX_5_0);
    let shade = fx.interface_type("IShade", 2)?;
    let single_shade = fx.interface_type("IShade", 0)?;
    let float = fx.numeric_type("float", NumericLayout::Scalar, ScalarType::Float, 1, 1, false, 0)?;
    let albedo = [StructMemberSpec {
        name: "albedo",
        semantic: None,
        ty: float,
    }];
    let matte = fx.struct_type("Matte", &albedo, 0, &[single_shade], 0)?;
    let mattes = fx.struct_type("Matte", &albedo, 0, &[single_shade], 2)?;

    fx.constant_buffer("Classes", 48, CbFlags::empty(), 2, None)?;
    fx.no_annotations()?;
    fx.numeric_variable("g_Matte", matte, None, 0, None, VariableFlags::empty())?;
    fx.no_annotations()?;
    fx.numeric_variable("g_Glossy", mattes, None, 16, None, VariableFlags::empty())?;
    fx.no_annotations()?;
    fx.add_class_instance_elements(3);

    let o_matte = fx.string("g_Matte");
    let o_glossy = fx.string("g_Glossy");
    let initializers = fx.interface_initializers(&[
        BinaryInterfaceInitializer {
            o_instance_name: o_matte,
            array_index: matte_index,
        },
        BinaryInterfaceInitializer {
            o_instance_name: o_glossy,
            array_index: glossy_index,
        },
    ])?;
    fx.interface_variable("g_Shade", shade, Some(initializers), VariableFlags::empty())?;
    fx.no_annotations()?;

    fx.finish()
}

/// `Tint` (float4) annotated with `UIName = "Tint color"` and `UIScale = 2.5`, in one pass `P`
/// annotated with `UIName = "Main"`. The `UIName` annotations use a type of object class
/// `name_object`, which only loads as a string.
pub fn annotated_effect(name_object: ObjectType) -> Result<Vec<u8>, ParserError> {
    let mut fx = FxWriter::new(FX_5_0);
    let float4 = fx.numeric_type("float4", NumericLayout::Vector, ScalarType::Float, 1, 4, false, 0)?;
    let float = fx.numeric_type("float", NumericLayout::Scalar, ScalarType::Float, 1, 1, false, 0)?;
    let string = fx.object_type("string", name_object, 0)?;

    fx.constant_buffer("Params", 16, CbFlags::empty(), 1, None)?;
    fx.no_annotations()?;
    fx.numeric_variable("Tint", float4, None, 0, None, VariableFlags::empty())?;
    let ui_name = fx.string("UIName");
    let tint_color = fx.string("Tint color");
    let ui_scale = fx.string("UIScale");
    let scale = fx.f32_values(&[2.5]);
    fx.annotations(&[
        AnnotationSpec {
            name: ui_name,
            ty: string,
            value: AnnotationValue::Strings(vec![tint_color]),
        },
        AnnotationSpec {
            name: ui_scale,
            ty: float,
            value: AnnotationValue::Numeric(scale),
        },
    ])?;

    fx.group(None, 1)?;
    fx.no_annotations()?;
    fx.technique("T", 1)?;
    fx.no_annotations()?;
    let pass_name = fx.string("UIName");
    let main = fx.string("Main");
    fx.pass(
        "P",
        &[AnnotationSpec {
            name: pass_name,
            ty: string,
            value: AnnotationValue::Strings(vec![main]),
        }],
        &[],
    )?;

    fx.finish()
}

pub const INLINE_PIXEL_SHADER: &[u8] = b"DXBC inline pixel shader";

/// One pass `P` whose pixel shader is compiled inline, left unfinished so callers can corrupt
/// the header first.
pub fn inline_shader_writer() -> Result<FxWriter, ParserError> {
    let mut fx = FxWriter::new(FX_5_0);
    fx.group(None, 1)?;
    fx.no_annotations()?;
    fx.technique("T", 1)?;
    fx.no_annotations()?;
    let bytecode = fx.data_block(INLINE_PIXEL_SHADER);
    let shader = fx.inline_shader(bytecode, 0)?;
    fx.pass("P", &[], &[assignment("PixelShader", AssignmentType::InlineShader, shader)])?;
    Ok(fx)
}

/// Rasterizer handles bound by the recorded calls, in order.
pub fn bound_rasterizers(context: &RecordingContext) -> Vec<Option<RasterizerStateHandle>> {
    context
        .calls
        .iter()
        .filter_map(|call| match call {
            ContextCall::SetRasterizerState(handle) => Some(*handle),
            _ => None,
        })
        .collect()
}
