use std::sync::Arc;

use log::trace;

use super::Effect;
use super::state::{BlockState, DeviceState, EffectState};
use crate::arena::{ArenaHandle, ByteArena};
use crate::device::{
    BufferHandle, Device, DeviceContext, SamplerStateHandle, ShaderResourceViewHandle, ShaderStage,
};
use crate::error::{EffectError, invalid_call, not_found};
use crate::evaluator::Evaluator;
use crate::graph::EffectGraph;
use crate::model::{CbId, InterfaceRef, ObjectRef, PassId, ResourceRef, SamplerId, ShaderId, StateBlockDef};

/// Evaluates the block's live assignments and recreates its device object when any of them
/// wrote a new value.
fn refresh_block<D: DeviceState>(
    graph: &EffectGraph,
    evaluator: &mut Evaluator,
    runtime: &ByteArena,
    cb_storage: &[ArenaHandle],
    device: &Arc<dyn Device>,
    def: &StateBlockDef,
    block: &mut BlockState<D>,
) -> Option<D::Handle> {
    let mut changed = false;
    for id in def.assignments.iter() {
        changed |= evaluator.evaluate(graph, id, runtime, cb_storage, &mut block.desc);
    }
    if changed {
        trace!("Recreating {} after an assignment changed", D::WHAT);
        block.recreate(device);
    }
    block.handle()
}

impl EffectState {
    /// Uploads the backing store if it changed and returns the buffer to bind.
    fn commit_constant_buffer(&mut self, cb: CbId, context: &mut dyn DeviceContext) -> Option<BufferHandle> {
        let state = &mut self.cbs[cb.index()];
        let buffer = state.buffer.as_ref()?.handle();
        if state.dirty && !state.shared {
            context.update_buffer(buffer, self.runtime.get(self.cb_storage[cb.index()]));
            state.dirty = false;
        }
        Some(buffer)
    }

    fn refresh_sampler(&mut self, graph: &EffectGraph, device: &Arc<dyn Device>, sampler: SamplerId) -> Option<SamplerStateHandle> {
        refresh_block(
            graph,
            &mut self.evaluator,
            &self.runtime,
            &self.cb_storage,
            device,
            &graph.samplers[sampler.index()],
            &mut self.samplers[sampler.index()],
        )
    }

    fn resource_view(
        &mut self,
        graph: &EffectGraph,
        device: &Arc<dyn Device>,
        resource: ResourceRef,
        context: &mut dyn DeviceContext,
    ) -> Option<ShaderResourceViewHandle> {
        match resource {
            ResourceRef::Null => None,
            ResourceRef::ShaderResource(srv) => self.srvs[srv.index()],
            ResourceRef::TextureBuffer(cb) => {
                self.commit_constant_buffer(cb, context);
                self.cbs[cb.index()].view.as_ref().map(|view| view.handle())
            }
            ResourceRef::SamplerTexture(sampler) => {
                self.refresh_sampler(graph, device, sampler);
                match self.samplers[sampler.index()].desc.texture {
                    ObjectRef::Block(srv) => self.srvs[srv.index()],
                    _ => None,
                }
            }
        }
    }

    /// Binds the shader's resources in constant buffer, sampler, resource, UAV order, then the
    /// shader itself.
    fn apply_shader(
        &mut self,
        graph: &EffectGraph,
        device: &Arc<dyn Device>,
        shader: ShaderId,
        stage: ShaderStage,
        context: &mut dyn DeviceContext,
    ) {
        let dependencies = &graph.shaders[shader.index()].dependencies;

        for range in &dependencies.constant_buffers {
            let buffers = range
                .items
                .iter()
                .map(|cb| cb.and_then(|cb| self.commit_constant_buffer(cb, context)))
                .collect::<Vec<_>>();
            context.set_constant_buffers(stage, range.start, &buffers);
        }

        for range in &dependencies.samplers {
            let samplers = range
                .items
                .iter()
                .map(|sampler| sampler.and_then(|sampler| self.refresh_sampler(graph, device, sampler)))
                .collect::<Vec<_>>();
            context.set_samplers(stage, range.start, &samplers);
        }

        for range in &dependencies.resources {
            let views = range
                .items
                .iter()
                .map(|resource| self.resource_view(graph, device, *resource, context))
                .collect::<Vec<_>>();
            context.set_shader_resources(stage, range.start, &views);
        }

        if let Some(range) = &dependencies.unordered_access_views {
            let views = range
                .items
                .iter()
                .map(|uav| uav.and_then(|uav| self.uavs[uav.index()]))
                .collect::<Vec<_>>();
            context.set_unordered_access_views(stage, range.start, &views);
        }

        let class_instances = dependencies
            .interfaces
            .iter()
            .flat_map(|range| range.items.iter())
            .map(|interface| match *interface {
                InterfaceRef::Null => None,
                InterfaceRef::Interface(id) => self.interfaces[id.index()],
                InterfaceRef::ClassInstance(instance) => Some(instance),
            })
            .collect::<Vec<_>>();

        context.set_shader(stage, self.shaders[shader.index()].handle(), &class_instances);
    }
}

impl Effect {
    /// Brings the pass's state up to date and hands it to `context`: rasterizer, depth stencil,
    /// blend, render targets, then the shader stages. Stages bound before a failure stay bound.
    pub fn apply(&mut self, pass: PassId, context: &mut dyn DeviceContext) -> Result<(), EffectError> {
        let device = self
            .device
            .clone()
            .ok_or_else(|| invalid_call("the effect must be bound to a device before applying passes"))?;
        let graph = Arc::clone(&self.graph);
        let pass_def = graph
            .passes
            .get(pass.index())
            .ok_or_else(|| not_found("pass", pass.0.to_string()))?;
        let state = &mut self.state;

        state.evaluator.tick();
        if pass_def.has_dependencies {
            for id in pass_def.assignments.iter() {
                state.evaluator.evaluate(
                    &graph,
                    id,
                    &state.runtime,
                    &state.cb_storage,
                    &mut state.passes[pass.index()].store,
                );
            }
        }
        let store = state.passes[pass.index()].store;

        match store.rasterizer {
            ObjectRef::Unset => {}
            ObjectRef::Null => context.set_rasterizer_state(None),
            ObjectRef::Block(id) => {
                let handle = refresh_block(
                    &graph,
                    &mut state.evaluator,
                    &state.runtime,
                    &state.cb_storage,
                    &device,
                    &graph.rasterizers[id.index()],
                    &mut state.rasterizers[id.index()],
                );
                context.set_rasterizer_state(handle);
            }
        }

        match store.depth_stencil {
            ObjectRef::Unset => {}
            ObjectRef::Null => context.set_depth_stencil_state(None, store.stencil_ref),
            ObjectRef::Block(id) => {
                let handle = refresh_block(
                    &graph,
                    &mut state.evaluator,
                    &state.runtime,
                    &state.cb_storage,
                    &device,
                    &graph.depth_stencils[id.index()],
                    &mut state.depth_stencils[id.index()],
                );
                context.set_depth_stencil_state(handle, store.stencil_ref);
            }
        }

        match store.blend {
            ObjectRef::Unset => {}
            ObjectRef::Null => context.set_blend_state(None, store.blend_factor, store.sample_mask),
            ObjectRef::Block(id) => {
                let handle = refresh_block(
                    &graph,
                    &mut state.evaluator,
                    &state.runtime,
                    &state.cb_storage,
                    &device,
                    &graph.blends[id.index()],
                    &mut state.blends[id.index()],
                );
                context.set_blend_state(handle, store.blend_factor, store.sample_mask);
            }
        }

        if store.render_target_count > 0 || store.depth_stencil_view != ObjectRef::Unset {
            let render_targets = store.render_targets[..store.render_target_count as usize]
                .iter()
                .map(|target| target.block().and_then(|rtv| state.rtvs[rtv.index()]))
                .collect::<Vec<_>>();
            let depth_stencil = store
                .depth_stencil_view
                .block()
                .and_then(|dsv| state.dsvs[dsv.index()]);
            context.set_render_targets(&render_targets, depth_stencil);
        }

        for stage in ShaderStage::ALL {
            match store.shader(stage) {
                ObjectRef::Unset => {}
                ObjectRef::Null => context.set_shader(stage, None, &[]),
                ObjectRef::Block(shader) => state.apply_shader(&graph, &device, shader, stage, context),
            }
        }

        trace!("Applied pass {:?}", pass);
        Ok(())
    }
}
