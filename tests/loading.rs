use fxrt::device::ShaderStage;
use fxrt::effect::desc::AnnotationData;
use fxrt::model::ClassInstanceRef;
use fxrt::sample::{sample_effect, sample_reflector};
use fxrt::{Effect, EffectError};
use fxrt_files::fx::types::{
    ARRAY_INDEX_NONE, AssignmentType, CbFlags, FX_4_0, FX_5_0, NumericLayout, ObjectType, ScalarType, VarType,
    VariableFlags,
};
use fxrt_files::fx::writer::FxWriter;

mod common;

#[test_log::test]
fn sample_counts_match_the_header() -> Result<(), anyhow::Error> {
    let effect = Effect::load_with_reflector(&sample_effect()?, &sample_reflector())?;
    let desc = effect.desc();

    assert_eq!(desc.version, "fx_5_0");
    assert_eq!(desc.constant_buffers, 1);
    assert_eq!(desc.variables, 3);
    assert_eq!(desc.groups, 1);
    assert_eq!(desc.techniques, 1);
    assert_eq!(desc.passes, 1);
    assert_eq!(desc.shaders, 1);
    assert!(!desc.optimized);

    let group = effect.group_by_name("Main")?;
    let technique = effect.group_technique_by_name(group, "Render")?;
    assert_eq!(technique, effect.technique_by_name("Render")?);
    let pass = effect.pass_by_name(technique, "P0")?;
    let pass_desc = effect.pass_desc(pass)?;
    assert_eq!(pass_desc.name, Some("P0"));
    assert_eq!(pass_desc.assignments, 2);
    assert_eq!(pass_desc.live_assignments, 0);
    assert_eq!(pass_desc.sample_mask, 0xFFFF_FFFF);
    assert_eq!(pass_desc.blend_factor, [1.0; 4]);

    let cb = effect.constant_buffer_by_name("Globals")?;
    let cb_desc = effect.constant_buffer_desc(cb)?;
    assert_eq!(cb_desc.size, 16);
    assert!(!cb_desc.is_tbuffer);
    assert_eq!(cb_desc.variables, vec![effect.variable_by_name("Color")?]);

    let color = effect.variable_by_name("Color")?;
    assert_eq!(effect.variable_by_semantic("color")?, color);
    let var_desc = effect.variable_desc(color)?;
    assert_eq!(var_desc.buffer, Some((cb, 0)));
    let ty = effect.type_description(var_desc.ty)?;
    assert_eq!(ty.name, Some("float4"));
    assert_eq!(ty.class, VarType::Numeric);
    assert_eq!((ty.rows, ty.columns), (1, 4));
    assert_eq!(ty.unpacked_size, 16);

    let shaders = effect.variable_shaders(effect.variable_by_name("g_PS")?)?;
    assert_eq!(shaders.len(), 1);
    assert_eq!(effect.pass_shader(pass, fxrt::device::ShaderStage::Pixel)?, Some(shaders[0]));
    let shader = effect.shader_desc(shaders[0])?;
    assert_eq!(shader.bytecode_len, fxrt::sample::PIXEL_SHADER_BYTECODE.len());
    Ok(())
}

#[test_log::test]
fn every_truncation_is_malformed() -> Result<(), anyhow::Error> {
    let data = sample_effect()?;
    for len in 0..data.len() {
        match Effect::load(&data[..len]) {
            Err(EffectError::MalformedInput { .. }) => {}
            other => panic!("truncating to {} bytes gave {:?}", len, other.map(|_| ())),
        }
    }
    assert!(Effect::load(&data).is_ok());
    Ok(())
}

#[test_log::test]
fn unknown_versions_are_malformed() -> Result<(), anyhow::Error> {
    let data = FxWriter::new(0xFEFF_3001).finish()?;
    assert!(matches!(Effect::load(&data), Err(EffectError::MalformedInput { .. })));
    Ok(())
}

#[test_log::test]
fn pools_are_not_implemented() -> Result<(), anyhow::Error> {
    let mut fx = FxWriter::new(FX_4_0);
    fx.header_mut().pool.c_object_variables = 1;
    assert!(matches!(
        Effect::load(&fx.finish()?),
        Err(EffectError::NotImplemented { .. })
    ));
    Ok(())
}

#[test_log::test]
fn expression_assignments_are_not_implemented() -> Result<(), anyhow::Error> {
    let mut fx = FxWriter::new(FX_4_0);
    fx.header_mut().c_techniques = 1;
    fx.technique("T", 1)?;
    fx.no_annotations()?;
    fx.pass("P", &[], &[common::assignment("StencilRef", AssignmentType::Expression, 0)])?;

    assert!(matches!(
        Effect::load(&fx.finish()?),
        Err(EffectError::NotImplemented { .. })
    ));
    Ok(())
}

#[test_log::test]
fn references_to_unknown_variables_are_malformed() -> Result<(), anyhow::Error> {
    let mut fx = FxWriter::new(FX_4_0);
    fx.header_mut().c_techniques = 1;
    fx.technique("T", 1)?;
    fx.no_annotations()?;
    let missing = fx.variable_reference("g_Missing");
    fx.pass("P", &[], &[common::assignment("StencilRef", AssignmentType::Variable, missing)])?;

    assert!(matches!(
        Effect::load(&fx.finish()?),
        Err(EffectError::MalformedInput { .. })
    ));
    Ok(())
}

#[test_log::test]
fn techniques_without_groups_land_in_an_unnamed_group() -> Result<(), anyhow::Error> {
    let mut fx = FxWriter::new(FX_4_0);
    fx.header_mut().c_techniques = 2;
    for name in ["First", "Second"] {
        fx.technique(name, 0)?;
        fx.no_annotations()?;
    }

    let effect = Effect::load(&fx.finish()?)?;
    assert_eq!(effect.group_count(), 1);
    let group = effect.group_by_index(0)?;
    assert_eq!(effect.group_desc(group)?.name, None);
    assert_eq!(effect.group_desc(group)?.techniques, 2);
    assert_eq!(effect.group_technique_by_index(group, 1)?, effect.technique_by_name("Second")?);
    assert!(matches!(
        effect.technique_by_name("Third"),
        Err(EffectError::NotFound { .. })
    ));
    Ok(())
}

#[test_log::test]
fn identical_types_are_interned() -> Result<(), anyhow::Error> {
    let mut fx = FxWriter::new(FX_5_0);
    let first = fx.numeric_type("float2", NumericLayout::Vector, ScalarType::Float, 1, 2, false, 0)?;
    let second = fx.numeric_type("float2", NumericLayout::Vector, ScalarType::Float, 1, 2, false, 0)?;
    let other = fx.numeric_type("int2", NumericLayout::Vector, ScalarType::Int, 1, 2, false, 0)?;
    assert_ne!(first, second);

    fx.constant_buffer("Values", 48, CbFlags::empty(), 3, None)?;
    fx.no_annotations()?;
    for (name, ty, offset) in [("A", first, 0), ("B", second, 16), ("C", other, 32)] {
        fx.numeric_variable(name, ty, None, offset, None, VariableFlags::empty())?;
        fx.no_annotations()?;
    }

    let effect = Effect::load(&fx.finish()?)?;
    let ty = |name: &str| -> Result<_, EffectError> { Ok(effect.variable_desc(effect.variable_by_name(name)?)?.ty) };
    assert_eq!(ty("A")?, ty("B")?);
    assert_ne!(ty("A")?, ty("C")?);
    Ok(())
}

#[test_log::test]
fn variables_must_fit_their_buffer() -> Result<(), anyhow::Error> {
    let mut fx = FxWriter::new(FX_5_0);
    let float4 = fx.numeric_type("float4", NumericLayout::Vector, ScalarType::Float, 1, 4, false, 0)?;
    fx.constant_buffer("Small", 16, CbFlags::empty(), 1, None)?;
    fx.no_annotations()?;
    fx.numeric_variable("Overflow", float4, None, 4, None, VariableFlags::empty())?;
    fx.no_annotations()?;

    assert!(matches!(
        Effect::load(&fx.finish()?),
        Err(EffectError::MalformedInput { .. })
    ));
    Ok(())
}

fn is_malformed<T>(result: Result<T, EffectError>) -> bool {
    matches!(result, Err(EffectError::MalformedInput { .. }))
}

#[test_log::test]
fn interface_initializers_resolve_class_instances() -> Result<(), anyhow::Error> {
    let effect = Effect::load(&common::interface_effect(ARRAY_INDEX_NONE, 1)?)?;
    assert_eq!(effect.desc().interface_elements, 2);

    let shade = effect.variable_by_name("g_Shade")?;
    let matte = effect.variable_by_name("g_Matte")?;
    let glossy = effect.variable_by_name("g_Glossy")?;
    assert_eq!(
        effect.get_class_instance(shade, 0)?,
        Some(ClassInstanceRef {
            variable: matte,
            element: 0,
        })
    );
    assert_eq!(
        effect.get_class_instance(shade, 1)?,
        Some(ClassInstanceRef {
            variable: glossy,
            element: 1,
        })
    );
    assert!(effect.get_class_instance(shade, 2).is_err());
    Ok(())
}

#[test_log::test]
fn interface_initializers_must_match_their_instance() -> Result<(), anyhow::Error> {
    // an index into a single instance
    assert!(is_malformed(Effect::load(&common::interface_effect(0, 1)?)));
    // past the end of an instance array
    assert!(is_malformed(Effect::load(&common::interface_effect(ARRAY_INDEX_NONE, 2)?)));
    // an instance array without an index
    assert!(is_malformed(Effect::load(&common::interface_effect(
        ARRAY_INDEX_NONE,
        ARRAY_INDEX_NONE
    )?)));
    Ok(())
}

#[test_log::test]
fn annotations_load_until_optimized() -> Result<(), anyhow::Error> {
    let mut effect = Effect::load(&common::annotated_effect(ObjectType::String)?)?;
    let tint = effect.variable_by_name("Tint")?;
    let pass = effect.pass_by_index(effect.technique_by_name("T")?, 0)?;

    let annotations = effect.variable_desc(tint)?.annotations;
    assert_eq!(annotations.len(), 2);
    assert_eq!(annotations[0].name, Some("UIName"));
    assert_eq!(annotations[0].data, AnnotationData::Strings(vec![Some("Tint color")]));
    assert_eq!(annotations[1].name, Some("UIScale"));
    assert_eq!(annotations[1].data, AnnotationData::Numeric(&2.5f32.to_le_bytes()));
    assert_eq!(effect.type_description(annotations[0].ty)?.class, VarType::Object);

    let pass_annotations = effect.pass_desc(pass)?.annotations;
    assert_eq!(pass_annotations.len(), 1);
    assert_eq!(pass_annotations[0].data, AnnotationData::Strings(vec![Some("Main")]));
    // annotations are not string variables
    assert_eq!(effect.desc().variables, 1);

    effect.optimize();
    assert!(effect.variable_desc(tint)?.annotations.is_empty());
    assert!(effect.pass_desc(pass)?.annotations.is_empty());
    Ok(())
}

#[test_log::test]
fn annotations_must_be_strings_or_numbers() -> Result<(), anyhow::Error> {
    assert!(is_malformed(Effect::load(&common::annotated_effect(ObjectType::Rasterizer)?)));
    Ok(())
}

#[test_log::test]
fn inline_shaders_belong_to_their_pass() -> Result<(), anyhow::Error> {
    let effect = Effect::load(&common::inline_shader_writer()?.finish()?)?;
    assert_eq!(effect.desc().shaders, 1);

    let pass = effect.pass_by_index(effect.technique_by_name("T")?, 0)?;
    let shader = effect
        .pass_shader(pass, ShaderStage::Pixel)?
        .ok_or_else(|| anyhow::anyhow!("the pass has no pixel shader"))?;
    let desc = effect.shader_desc(shader)?;
    assert_eq!(desc.stage, ShaderStage::Pixel);
    assert_eq!(desc.variable, None);
    assert_eq!(desc.bytecode_len, common::INLINE_PIXEL_SHADER.len());
    assert_eq!(effect.pass_shader(pass, ShaderStage::Vertex)?, None);
    Ok(())
}

#[test_log::test]
fn inline_shaders_must_match_the_declared_count() -> Result<(), anyhow::Error> {
    let mut undeclared = common::inline_shader_writer()?;
    undeclared.header_mut().c_inline_shaders = 0;
    assert!(is_malformed(Effect::load(&undeclared.finish()?)));

    let mut overcounted = common::inline_shader_writer()?;
    overcounted.header_mut().c_inline_shaders = 2;
    overcounted.header_mut().c_total_shaders = 2;
    assert!(is_malformed(Effect::load(&overcounted.finish()?)));
    Ok(())
}
