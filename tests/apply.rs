use std::sync::Arc;

use fxrt::{Effect, ScalarValue};
use fxrt::device::ShaderStage;
use fxrt::device::recording::{ContextCall, DeviceCall, RecordingContext, RecordingDevice};
use fxrt::model::PassId;
use fxrt::sample::{sample_effect, sample_reflector};

mod common;

fn floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn rasterizer_creations(device: &RecordingDevice) -> usize {
    device.count(|call| matches!(call, DeviceCall::CreateRasterizerState(_)))
}

fn dynamic_pass(effect: &Effect, name: &str) -> Result<PassId, anyhow::Error> {
    let technique = effect.technique_by_name("T")?;
    Ok(effect.pass_by_name(technique, name)?)
}

#[test_log::test]
fn writing_a_variable_uploads_its_buffer_once() -> Result<(), anyhow::Error> {
    let mut effect = Effect::load_with_reflector(&sample_effect()?, &sample_reflector())?;
    let technique = effect.technique_by_index(0)?;
    let pass = effect.pass_by_index(technique, 0)?;
    assert_eq!(effect.pass_desc(pass)?.assignments, 2);

    let color = effect.variable_by_name("Color")?;
    assert_eq!(effect.get_float_vector(color, 0)?, vec![1.0, 0.0, 0.0, 1.0]);

    let device = Arc::new(RecordingDevice::new());
    effect.bind_to_device(device.clone())?;
    let mut context = RecordingContext::new();
    effect.apply(pass, &mut context)?;
    assert_eq!(context.uploads(), 1);
    let rasterizers = rasterizer_creations(&device);
    assert_eq!(rasterizers, 1);
    context.clear();

    effect.set_float_vector(color, 0, &[0.0, 1.0, 0.0, 1.0])?;
    assert_eq!(effect.get_float_vector(color, 0)?, vec![0.0, 1.0, 0.0, 1.0]);
    effect.apply(pass, &mut context)?;

    let uploads = context
        .calls
        .iter()
        .filter_map(|call| match call {
            ContextCall::UpdateBuffer { data, .. } => Some(floats(data)),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(uploads, vec![vec![0.0, 1.0, 0.0, 1.0]]);
    assert_eq!(rasterizer_creations(&device), rasterizers);

    assert!(context.calls.iter().any(|call| matches!(
        call,
        ContextCall::SetConstantBuffers { stage: ShaderStage::Pixel, start: 0, buffers } if buffers.len() == 1 && buffers[0].is_some()
    )));
    assert!(context.calls.iter().any(|call| matches!(
        call,
        ContextCall::SetShader { stage: ShaderStage::Pixel, shader: Some(_), .. }
    )));

    context.clear();
    effect.apply(pass, &mut context)?;
    assert_eq!(context.uploads(), 0);
    Ok(())
}

#[test_log::test]
fn applying_requires_a_device() -> Result<(), anyhow::Error> {
    let mut effect = Effect::load(&sample_effect()?)?;
    let pass = effect.pass_by_index(effect.technique_by_index(0)?, 0)?;
    let mut context = RecordingContext::new();
    assert!(matches!(
        effect.apply(pass, &mut context),
        Err(fxrt::EffectError::InvalidCall { .. })
    ));
    assert!(context.calls.is_empty());
    Ok(())
}

#[test_log::test]
fn state_blocks_follow_their_dependencies() -> Result<(), anyhow::Error> {
    let mut effect = Effect::load(&common::dynamic_effect()?)?;
    let device = Arc::new(RecordingDevice::new());
    effect.bind_to_device(device.clone())?;
    assert_eq!(rasterizer_creations(&device), 3);

    let pass = dynamic_pass(&effect, "Biased")?;
    assert_eq!(effect.pass_desc(pass)?.live_assignments, 0);
    let mut context = RecordingContext::new();

    // the first apply evaluates every assignment once
    effect.apply(pass, &mut context)?;
    let after_first = rasterizer_creations(&device);
    effect.apply(pass, &mut context)?;
    assert_eq!(rasterizer_creations(&device), after_first);

    let bias = effect.variable_by_name("Bias")?;
    effect.set_int(bias, 5)?;
    effect.apply(pass, &mut context)?;
    assert_eq!(rasterizer_creations(&device), after_first + 1);
    match device.calls().iter().rev().find(|call| matches!(call, DeviceCall::CreateRasterizerState(_))) {
        Some(DeviceCall::CreateRasterizerState(desc)) => assert_eq!(desc.depth_bias, 5),
        other => panic!("expected a rasterizer creation, got {:?}", other),
    }

    effect.apply(pass, &mut context)?;
    assert_eq!(rasterizer_creations(&device), after_first + 1);

    // writes to unrelated variables leave the block alone
    let reference = effect.variable_by_name("Ref")?;
    effect.set_uint(reference, 3)?;
    effect.apply(pass, &mut context)?;
    assert_eq!(rasterizer_creations(&device), after_first + 1);
    Ok(())
}

#[test_log::test]
fn object_indices_select_elements_and_clamp() -> Result<(), anyhow::Error> {
    let mut effect = Effect::load(&common::dynamic_effect()?)?;
    effect.bind_to_device(Arc::new(RecordingDevice::new()))?;
    let pass = dynamic_pass(&effect, "Indexed")?;
    assert_eq!(effect.pass_desc(pass)?.live_assignments, 1);
    let which = effect.variable_by_name("Which")?;
    let mut context = RecordingContext::new();

    effect.apply(pass, &mut context)?;
    effect.set_uint(which, 1)?;
    effect.apply(pass, &mut context)?;
    effect.set_uint(which, 9)?;
    effect.apply(pass, &mut context)?;

    let bound = common::bound_rasterizers(&context);
    assert_eq!(bound.len(), 3);
    assert!(bound.iter().all(Option::is_some));
    assert_ne!(bound[0], bound[1]);
    assert_eq!(bound[0], bound[2]);
    Ok(())
}

#[test_log::test]
fn numeric_indices_follow_index_and_array_writes() -> Result<(), anyhow::Error> {
    let mut effect = Effect::load(&common::dynamic_effect()?)?;
    effect.bind_to_device(Arc::new(RecordingDevice::new()))?;
    let pass = dynamic_pass(&effect, "StencilIndexed")?;
    assert_eq!(effect.pass_desc(pass)?.live_assignments, 1);
    let which = effect.variable_by_name("Which")?;
    let refs = effect.variable_by_name("Refs")?;
    let mut context = RecordingContext::new();

    effect.apply(pass, &mut context)?;
    assert_eq!(effect.pass_desc(pass)?.stencil_ref, 10);

    effect.set_uint(which, 2)?;
    effect.apply(pass, &mut context)?;
    assert_eq!(effect.pass_desc(pass)?.stencil_ref, 30);

    effect.set_scalar(refs, 2, ScalarValue::UInt(33))?;
    effect.apply(pass, &mut context)?;
    assert_eq!(effect.pass_desc(pass)?.stencil_ref, 33);

    // out of range indices fall back to the first element
    effect.set_uint(which, 9)?;
    effect.apply(pass, &mut context)?;
    assert_eq!(effect.pass_desc(pass)?.stencil_ref, 10);
    Ok(())
}

#[test_log::test]
fn pass_values_survive_clock_rollover() -> Result<(), anyhow::Error> {
    let mut effect = Effect::load(&common::dynamic_effect()?)?;
    effect.bind_to_device(Arc::new(RecordingDevice::new()))?;
    effect.set_clock_ceiling(3);
    let pass = dynamic_pass(&effect, "Stencil")?;
    let reference = effect.variable_by_name("Ref")?;
    let mut context = RecordingContext::new();

    effect.apply(pass, &mut context)?;
    assert_eq!(effect.pass_desc(pass)?.stencil_ref, 7);

    for value in 0..10u32 {
        effect.set_uint(reference, value)?;
        effect.apply(pass, &mut context)?;
        assert_eq!(effect.pass_desc(pass)?.stencil_ref, value);
        effect.apply(pass, &mut context)?;
        assert_eq!(effect.pass_desc(pass)?.stencil_ref, value);
    }
    Ok(())
}

#[test_log::test]
fn typed_setters_convert_to_the_variable_type() -> Result<(), anyhow::Error> {
    let mut effect = Effect::load(&common::dynamic_effect()?)?;
    let bias = effect.variable_by_name("Bias")?;

    effect.set_float(bias, 2.9)?;
    assert_eq!(effect.get_int(bias)?, 2);
    effect.set_bool(bias, true)?;
    assert_eq!(effect.get_int(bias)?, 1);
    assert_eq!(effect.get_raw(bias, 0, 4)?, &1u32.to_le_bytes());

    effect.set_raw(bias, 0, &(-4i32).to_le_bytes())?;
    assert_eq!(effect.get_int(bias)?, -4);
    assert!(effect.set_raw(bias, 2, &[0; 4]).is_err());
    assert!(effect.set_float_vector(bias, 0, &[1.0, 2.0]).is_err());
    assert!(effect.set_scalar(bias, 1, fxrt::ScalarValue::Int(1)).is_err());
    Ok(())
}
