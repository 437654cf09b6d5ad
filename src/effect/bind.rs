use std::sync::Arc;

use fxrt_files::fx::types::{NO_RASTERIZED_STREAM, REGISTER_SIZE};
use log::{info, warn};

use super::Effect;
use super::state::{Bound, ShaderState};
use crate::device::{BufferDesc, BufferHandle, BufferKind, Device, DeviceObject, ShaderResourceViewHandle, ShaderStage};
use crate::error::{EffectError, invalid_call};
use crate::graph::ReflectionData;
use crate::model::{ConstantBufferDef, ShaderDef, ShaderId};
use crate::so_decl::parse_stream_out;

pub(super) fn create_constant_buffer(
    device: &Arc<dyn Device>,
    def: &ConstantBufferDef,
) -> Result<(Bound<BufferHandle>, Option<Bound<ShaderResourceViewHandle>>), EffectError> {
    let kind = if def.is_tbuffer() {
        BufferKind::Texture
    } else {
        BufferKind::Constant
    };
    let handle = device
        .create_buffer(&BufferDesc { size: def.size, kind })
        .map_err(|source| EffectError::ResourceCreationFailed {
            what: "constant buffer",
            source,
        })?;
    let buffer = Bound::new(handle, DeviceObject::Buffer(handle), device);

    let view = if def.is_tbuffer() {
        let view = device
            .create_buffer_view(handle, def.size / REGISTER_SIZE)
            .map_err(|source| EffectError::ResourceCreationFailed {
                what: "texture buffer view",
                source,
            })?;
        Some(Bound::new(view, DeviceObject::ShaderResourceView(view), device))
    } else {
        None
    };

    Ok((buffer, view))
}

/// Shaders the device refuses are marked invalid instead of failing the bind.
fn create_shader(device: &Arc<dyn Device>, def: &ShaderDef, reflection: &ReflectionData, id: ShaderId) -> ShaderState {
    let Some(bytecode) = reflection.bytecode(id) else {
        return ShaderState::default();
    };

    let declarations = def
        .so_decls
        .iter()
        .enumerate()
        .filter_map(|(stream, decl)| Some((stream as u32, reflection.name(*decl)?)))
        .collect::<Vec<_>>();

    let created = if !declarations.is_empty() {
        match parse_stream_out(&declarations, def.rasterized_stream) {
            Ok(decl) => device
                .create_shader(ShaderStage::Geometry, bytecode, Some(&decl))
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        }
    } else if def.stage == ShaderStage::Geometry && def.rasterized_stream == NO_RASTERIZED_STREAM {
        Err("rasterization is disabled but nothing is streamed out".to_string())
    } else {
        device.create_shader(def.stage, bytecode, None).map_err(|e| e.to_string())
    };

    match created {
        Ok(handle) => ShaderState {
            bound: Some(Bound::new(handle, DeviceObject::Shader(handle), device)),
            valid: true,
        },
        Err(reason) => {
            warn!("Creating {:?} shader {} failed: {}", def.stage, id.0, reason);
            ShaderState {
                bound: None,
                valid: false,
            }
        }
    }
}

impl Effect {
    /// Creates every device object the effect needs. Constant buffers must succeed, rejected
    /// state blocks and shaders only invalidate the passes that use them.
    pub fn bind_to_device(&mut self, device: Arc<dyn Device>) -> Result<(), EffectError> {
        if self.device.is_some() {
            return Err(invalid_call("the effect is already bound to a device"));
        }
        let reflection = self
            .reflection
            .clone()
            .ok_or_else(|| invalid_call("an optimized effect can no longer be bound"))?;
        let graph = Arc::clone(&self.graph);
        let state = &mut self.state;

        for (index, def) in graph.cbs.iter().enumerate() {
            let (buffer, view) = match create_constant_buffer(&device, def) {
                Ok(created) => created,
                Err(err) => {
                    // leave the effect unbound, releasing the buffers created so far
                    for cb in &mut state.cbs[..index] {
                        cb.buffer = None;
                        cb.view = None;
                        cb.dirty = false;
                    }
                    return Err(err);
                }
            };
            let cb = &mut state.cbs[index];
            cb.buffer = Some(buffer);
            cb.view = view;
            cb.dirty = def.size > 0;
        }

        for block in &mut state.rasterizers {
            block.recreate(&device);
        }
        for block in &mut state.depth_stencils {
            block.recreate(&device);
        }
        for block in &mut state.blends {
            block.recreate(&device);
        }
        for block in &mut state.samplers {
            block.recreate(&device);
        }

        state.shaders = graph
            .shaders
            .iter()
            .enumerate()
            .map(|(index, def)| create_shader(&device, def, &reflection, ShaderId::from(index)))
            .collect();

        let invalid_shaders = state.shaders.iter().filter(|shader| !shader.valid).count();
        self.device = Some(device);

        let invalid_passes = (0..graph.passes.len())
            .filter(|pass| !self.is_pass_valid((*pass).into()))
            .count();
        info!(
            "Bound effect: {} constant buffers, {} shaders ({} invalid), {} of {} passes valid",
            graph.cbs.len(),
            graph.shaders.len(),
            invalid_shaders,
            graph.passes.len() - invalid_passes,
            graph.passes.len()
        );
        Ok(())
    }
}
