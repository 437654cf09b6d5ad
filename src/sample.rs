//! A small demonstration effect: one constant buffer holding `Color`, a pixel shader reading
//! it, a rasterizer block and a single pass binding both.

use fxrt_files::ParserError;
use fxrt_files::fx::types::{
    AssignmentType, BinaryAssignment, BinaryConstant, CbFlags, FX_5_0, NumericLayout, ObjectType, ScalarType,
    VariableFlags,
};
use fxrt_files::fx::writer::FxWriter;

use crate::device::ShaderStage;
use crate::reflection::{BoundResource, ResourceKind, ShaderReflection, StaticReflector};
use crate::states::find_state;

pub const PIXEL_SHADER_BYTECODE: &[u8] = b"DXBC sample pixel shader";

fn state(name: &str) -> Result<u32, ParserError> {
    find_state(name)
        .map(|index| u32::from(index.0))
        .ok_or(ParserError::FormatError {
            reason: "unknown state name",
        })
}

/// Writes the demonstration effect.
pub fn sample_effect() -> Result<Vec<u8>, ParserError> {
    let mut fx = FxWriter::new(FX_5_0);

    let float4 = fx.numeric_type("float4", NumericLayout::Vector, ScalarType::Float, 1, 4, false, 0)?;
    let pixel_shader = fx.object_type("PixelShader", ObjectType::PixelShader, 0)?;
    let rasterizer = fx.object_type("RasterizerState", ObjectType::Rasterizer, 0)?;

    fx.constant_buffer("Globals", 16, CbFlags::empty(), 1, None)?;
    fx.no_annotations()?;
    let default = fx.f32_values(&[1.0, 0.0, 0.0, 1.0]);
    fx.numeric_variable("Color", float4, Some("COLOR"), 0, Some(default), VariableFlags::empty())?;
    fx.no_annotations()?;

    fx.object_variable("g_PS", pixel_shader, None, None)?;
    let bytecode = fx.data_block(PIXEL_SHADER_BYTECODE);
    fx.u32(bytecode)?;
    fx.no_annotations()?;

    fx.object_variable("g_RS", rasterizer, None, None)?;
    let cull_none = fx.constants(&[BinaryConstant::uint(1)])?;
    fx.assignments(&[BinaryAssignment {
        i_state: state("CullMode")?,
        index: 0,
        assignment_type: AssignmentType::Constant.into(),
        o_initializer: cull_none,
    }])?;
    fx.no_annotations()?;

    fx.group(Some("Main"), 1)?;
    fx.no_annotations()?;
    fx.technique("Render", 1)?;
    fx.no_annotations()?;
    let ps = fx.variable_reference("g_PS");
    let rs = fx.variable_reference("g_RS");
    fx.pass(
        "P0",
        &[],
        &[
            BinaryAssignment {
                i_state: state("PixelShader")?,
                index: 0,
                assignment_type: AssignmentType::Variable.into(),
                o_initializer: ps,
            },
            BinaryAssignment {
                i_state: state("RasterizerState")?,
                index: 0,
                assignment_type: AssignmentType::Variable.into(),
                o_initializer: rs,
            },
        ],
    )?;

    fx.finish()
}

/// Reflection for the sample's pixel shader, which reads `Globals` from slot 0.
pub fn sample_reflector() -> StaticReflector {
    StaticReflector::new().with(
        PIXEL_SHADER_BYTECODE,
        ShaderReflection {
            bound_resources: vec![BoundResource {
                name: "Globals".to_string(),
                kind: ResourceKind::ConstantBuffer,
                bind_point: 0,
                bind_count: 1,
            }],
            ..ShaderReflection::empty(ShaderStage::Pixel)
        },
    )
}
