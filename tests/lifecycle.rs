use std::sync::Arc;

use fxrt::device::recording::{DeviceCall, RecordingContext, RecordingDevice, Rejection};
use fxrt::sample::{sample_effect, sample_reflector};
use fxrt::{CloneFlags, Effect, EffectError};

mod common;

fn sample() -> Result<Effect, anyhow::Error> {
    Ok(Effect::load_with_reflector(&sample_effect()?, &sample_reflector())?)
}

#[test_log::test]
fn rejected_blocks_invalidate_their_passes() -> Result<(), anyhow::Error> {
    let mut effect = sample()?;
    let group = effect.group_by_index(0)?;
    let technique = effect.group_technique_by_index(group, 0)?;
    let pass = effect.pass_by_index(technique, 0)?;

    let device = Arc::new(RecordingDevice::new());
    device.reject(Rejection::RasterizerState);
    effect.bind_to_device(device.clone())?;

    assert!(!effect.is_pass_valid(pass));
    assert!(!effect.is_technique_valid(technique));
    assert!(!effect.is_group_valid(group));

    // the pass still applies, just without a rasterizer state
    let mut context = RecordingContext::new();
    effect.apply(pass, &mut context)?;
    assert_eq!(common::bound_rasterizers(&context), vec![None]);
    Ok(())
}

#[test_log::test]
fn rejected_shaders_invalidate_their_passes() -> Result<(), anyhow::Error> {
    let mut effect = sample()?;
    let pass = effect.pass_by_index(effect.technique_by_index(0)?, 0)?;
    let device = Arc::new(RecordingDevice::new());
    device.reject(Rejection::Shader);
    effect.bind_to_device(device)?;
    assert!(!effect.is_pass_valid(pass));
    Ok(())
}

#[test_log::test]
fn buffer_failures_abort_binding() -> Result<(), anyhow::Error> {
    let mut effect = sample()?;
    let device = Arc::new(RecordingDevice::new());
    device.reject(Rejection::Buffer);
    assert!(matches!(
        effect.bind_to_device(device),
        Err(EffectError::ResourceCreationFailed { .. })
    ));
    Ok(())
}

#[test_log::test]
fn failed_binding_releases_earlier_buffers() -> Result<(), anyhow::Error> {
    let mut effect = Effect::load(&common::shared_buffer_effect()?)?;
    let device = Arc::new(RecordingDevice::new());
    device.reject_after(Rejection::Buffer, 1);
    assert!(matches!(
        effect.bind_to_device(device.clone()),
        Err(EffectError::ResourceCreationFailed { .. })
    ));
    assert!(!effect.is_bound());
    assert_eq!(device.count(|call| matches!(call, DeviceCall::CreateBuffer(_))), 2);
    assert_eq!(device.count(|call| matches!(call, DeviceCall::Release(_))), 1);

    // nothing from the failed attempt is left behind
    let retry = Arc::new(RecordingDevice::new());
    effect.bind_to_device(retry.clone())?;
    assert!(effect.is_bound());
    assert_eq!(retry.count(|call| matches!(call, DeviceCall::CreateBuffer(_))), 2);
    Ok(())
}

#[test_log::test]
fn binding_twice_is_rejected() -> Result<(), anyhow::Error> {
    let mut effect = sample()?;
    let device = Arc::new(RecordingDevice::new());
    effect.bind_to_device(device.clone())?;
    assert!(effect.is_bound());
    assert!(matches!(effect.bind_to_device(device), Err(EffectError::InvalidCall { .. })));
    Ok(())
}

#[test_log::test]
fn clones_are_independent() -> Result<(), anyhow::Error> {
    let mut effect = sample()?;
    effect.bind_to_device(Arc::new(RecordingDevice::new()))?;
    let color = effect.variable_by_name("Color")?;

    let mut clone = effect.clone_effect(CloneFlags::empty())?;
    assert!(clone.is_bound());
    clone.set_float_vector(color, 0, &[0.0, 0.0, 1.0, 1.0])?;
    assert_eq!(effect.get_float_vector(color, 0)?, vec![1.0, 0.0, 0.0, 1.0]);

    effect.set_float_vector(color, 0, &[0.5, 0.5, 0.5, 1.0])?;
    assert_eq!(clone.get_float_vector(color, 0)?, vec![0.0, 0.0, 1.0, 1.0]);

    // each instance uploads its own buffer
    let pass = effect.pass_by_index(effect.technique_by_index(0)?, 0)?;
    let mut context = RecordingContext::new();
    clone.apply(pass, &mut context)?;
    assert_eq!(context.uploads(), 1);
    Ok(())
}

#[test_log::test]
fn single_buffers_are_shared_unless_forced() -> Result<(), anyhow::Error> {
    let mut effect = Effect::load(&common::shared_buffer_effect()?)?;
    let device = Arc::new(RecordingDevice::new());
    effect.bind_to_device(device.clone())?;
    let tint = effect.variable_by_name("Tint")?;
    let gain = effect.variable_by_name("Gain")?;
    effect.set_float_vector(tint, 0, &[0.25, 0.5, 0.75, 1.0])?;

    let buffers = |device: &RecordingDevice| device.count(|call| matches!(call, DeviceCall::CreateBuffer(_)));
    assert_eq!(buffers(&device), 2);

    let mut shared = effect.clone_effect(CloneFlags::empty())?;
    assert_eq!(buffers(&device), 3);
    assert!(matches!(
        shared.set_float_vector(tint, 0, &[0.0; 4]),
        Err(EffectError::InvalidCall { .. })
    ));
    shared.set_float(gain, 2.0)?;
    assert_eq!(shared.get_float_vector(tint, 0)?, vec![0.25, 0.5, 0.75, 1.0]);

    let mut forced = effect.clone_effect(CloneFlags::FORCE_NONSINGLE)?;
    assert_eq!(buffers(&device), 5);
    forced.set_float_vector(tint, 0, &[0.0; 4])?;
    assert_eq!(effect.get_float_vector(tint, 0)?, vec![0.25, 0.5, 0.75, 1.0]);
    Ok(())
}

#[test_log::test]
fn unbound_clones_share_nothing() -> Result<(), anyhow::Error> {
    let effect = Effect::load(&common::shared_buffer_effect()?)?;
    let tint = effect.variable_by_name("Tint")?;
    let mut clone = effect.clone_effect(CloneFlags::empty())?;
    clone.set_float_vector(tint, 0, &[1.0; 4])?;
    assert_eq!(effect.get_float_vector(tint, 0)?, vec![0.0; 4]);
    Ok(())
}

#[test_log::test]
fn every_device_object_is_released_once() -> Result<(), anyhow::Error> {
    let device = Arc::new(RecordingDevice::new());
    {
        let mut effect = sample()?;
        effect.bind_to_device(device.clone())?;
        let clone = effect.clone_effect(CloneFlags::empty())?;
        drop(effect);
        // the clone still holds the shader and rasterizer the source created
        assert_eq!(device.count(|call| matches!(call, DeviceCall::Release(_))), 1);
        drop(clone);
    }

    let created = device.count(|call| !matches!(call, DeviceCall::Release(_)));
    let released = device.count(|call| matches!(call, DeviceCall::Release(_)));
    assert_eq!(created, 4);
    assert_eq!(released, created);
    Ok(())
}

#[test_log::test]
fn optimize_drops_reflection() -> Result<(), anyhow::Error> {
    let mut effect = sample()?;
    let color = effect.variable_by_name("Color")?;
    let pass = effect.pass_by_index(effect.technique_by_index(0)?, 0)?;
    effect.bind_to_device(Arc::new(RecordingDevice::new()))?;

    effect.optimize();
    effect.optimize();
    assert!(effect.is_optimized());
    assert!(effect.desc().optimized);
    assert!(matches!(
        effect.variable_by_name("Color"),
        Err(EffectError::NotFound { .. })
    ));
    assert_eq!(effect.pass_desc(pass)?.name, None);
    assert_eq!(effect.variable_by_index(0)?, color);

    effect.set_float_vector(color, 0, &[0.0, 1.0, 0.0, 1.0])?;
    let mut context = RecordingContext::new();
    effect.apply(pass, &mut context)?;
    assert_eq!(context.uploads(), 1);

    let mut unbound = sample()?;
    unbound.optimize();
    assert!(matches!(
        unbound.bind_to_device(Arc::new(RecordingDevice::new())),
        Err(EffectError::InvalidCall { .. })
    ));
    Ok(())
}
