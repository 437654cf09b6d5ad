use std::sync::Arc;

use bitflags::bitflags;
use fxrt_files::fx::types::EffectVersion;
use log::{debug, info};

use crate::compaction::{self, Compacted};
use crate::device::Device;
use crate::error::{EffectError, invalid_call, not_found};
use crate::graph::{EffectGraph, ReflectionData};
use crate::loader;
use crate::model::{CbId, GroupId, ObjectRef, PassId, ShaderId, StrId, TechniqueId};
use crate::reflection::{NoReflection, ShaderReflector};

mod apply;
mod bind;
pub mod desc;
pub(crate) mod state;
mod variables;

pub use variables::ScalarValue;

use state::EffectState;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CloneFlags: u32 {
        /// Give single constant buffers their own copy instead of sharing them with the source.
        const FORCE_NONSINGLE = 1;
    }
}

/// A loaded effect. The parsed graph is shared between clones, variable values and device
/// objects belong to each instance.
#[derive(Debug)]
pub struct Effect {
    graph: Arc<EffectGraph>,
    reflection: Option<Arc<ReflectionData>>,
    state: EffectState,
    device: Option<Arc<dyn Device>>,
}

impl Effect {
    /// Loads an effect whose shaders are bound without reflected resources.
    pub fn load(data: &[u8]) -> Result<Self, EffectError> {
        Self::load_with_reflector(data, &NoReflection)
    }

    pub fn load_with_reflector(data: &[u8], reflector: &dyn ShaderReflector) -> Result<Self, EffectError> {
        let scratch = loader::load(data, reflector)?;
        let Compacted {
            graph,
            reflection,
            state,
        } = compaction::compact(scratch)?;

        info!(
            "Loaded {} effect with {} groups, {} techniques and {} passes",
            graph.version.name,
            graph.groups.len(),
            graph.techniques.len(),
            graph.passes.len()
        );
        Ok(Self {
            graph: Arc::new(graph),
            reflection: Some(Arc::new(reflection)),
            state,
            device: None,
        })
    }

    pub fn version(&self) -> &'static EffectVersion {
        self.graph.version
    }

    pub fn is_bound(&self) -> bool {
        self.device.is_some()
    }

    pub fn is_optimized(&self) -> bool {
        self.reflection.is_none()
    }

    /// Drops names, annotations and bytecode. Lookups by name fail afterwards and the effect can
    /// no longer be bound to a device.
    pub fn optimize(&mut self) {
        match self.reflection.take() {
            Some(reflection) => debug!("Optimized away {} bytes of reflection data", reflection.arena.len()),
            None => debug!("Effect is already optimized"),
        }
    }

    /// Lowers the point at which the evaluation clock rolls over.
    pub fn set_clock_ceiling(&mut self, ceiling: u32) {
        self.state.evaluator.set_ceiling(ceiling);
    }

    /// Creates an independent instance sharing the parsed graph. Constant buffers flagged single
    /// stay shared with this effect unless `flags` forces a copy; a bound effect gives the clone
    /// its own device buffers for everything it does not share.
    pub fn clone_effect(&self, flags: CloneFlags) -> Result<Effect, EffectError> {
        let mut state = self.state.clone();

        let (runtime, cb_storage, remap) = compaction::relocate(&self.state.runtime, &self.state.cb_storage)?;
        state.runtime = runtime;
        state.cb_storage = cb_storage;
        for assignment in state.evaluator.assignment_states_mut() {
            if let Some(source) = assignment.source {
                assignment.source = Some(
                    remap
                        .translate(source)
                        .ok_or_else(|| invalid_call("cached assignment source is outside every constant buffer"))?,
                );
            }
        }

        if let Some(device) = &self.device {
            let force = flags.contains(CloneFlags::FORCE_NONSINGLE);
            for (index, def) in self.graph.cbs.iter().enumerate() {
                let cb = &mut state.cbs[index];
                cb.shared = def.is_single() && !force;
                if !cb.shared {
                    let (buffer, view) = bind::create_constant_buffer(device, def)?;
                    cb.buffer = Some(buffer);
                    cb.view = view;
                    cb.dirty = def.size > 0;
                }
            }
        }

        debug!(
            "Cloned effect, {} of {} constant buffers shared",
            state.cbs.iter().filter(|cb| cb.shared).count(),
            state.cbs.len()
        );
        Ok(Effect {
            graph: Arc::clone(&self.graph),
            reflection: self.reflection.clone(),
            state,
            device: self.device.clone(),
        })
    }

    fn reflection(&self) -> Option<&ReflectionData> {
        self.reflection.as_deref()
    }

    pub(crate) fn name(&self, id: Option<StrId>) -> Option<&str> {
        self.reflection()?.name(id)
    }

    fn find_by_name<I: From<usize>>(
        &self,
        kind: &'static str,
        name: &str,
        names: impl Iterator<Item = Option<StrId>>,
    ) -> Result<I, EffectError> {
        names
            .enumerate()
            .find(|(_, id)| self.name(*id) == Some(name))
            .map(|(index, _)| I::from(index))
            .ok_or_else(|| not_found(kind, name))
    }

    pub fn group_count(&self) -> usize {
        self.graph.groups.len()
    }

    pub fn group_by_index(&self, index: usize) -> Result<GroupId, EffectError> {
        (index < self.graph.groups.len())
            .then(|| GroupId::from(index))
            .ok_or_else(|| not_found("group", index.to_string()))
    }

    pub fn group_by_name(&self, name: &str) -> Result<GroupId, EffectError> {
        self.find_by_name("group", name, self.graph.groups.iter().map(|group| group.name))
    }

    pub fn technique_count(&self) -> usize {
        self.graph.techniques.len()
    }

    /// Techniques are numbered across all groups.
    pub fn technique_by_index(&self, index: usize) -> Result<TechniqueId, EffectError> {
        (index < self.graph.techniques.len())
            .then(|| TechniqueId::from(index))
            .ok_or_else(|| not_found("technique", index.to_string()))
    }

    pub fn technique_by_name(&self, name: &str) -> Result<TechniqueId, EffectError> {
        self.find_by_name(
            "technique",
            name,
            self.graph.techniques.iter().map(|technique| technique.name),
        )
    }

    pub fn group_technique_by_index(&self, group: GroupId, index: usize) -> Result<TechniqueId, EffectError> {
        self.graph.groups[group.index()]
            .techniques
            .get(index as u32)
            .ok_or_else(|| not_found("technique", index.to_string()))
    }

    pub fn group_technique_by_name(&self, group: GroupId, name: &str) -> Result<TechniqueId, EffectError> {
        self.graph.groups[group.index()]
            .techniques
            .iter()
            .find(|technique: &TechniqueId| self.name(self.graph.techniques[technique.index()].name) == Some(name))
            .ok_or_else(|| not_found("technique", name))
    }

    pub fn pass_by_index(&self, technique: TechniqueId, index: usize) -> Result<PassId, EffectError> {
        self.graph.techniques[technique.index()]
            .passes
            .get(index as u32)
            .ok_or_else(|| not_found("pass", index.to_string()))
    }

    pub fn pass_by_name(&self, technique: TechniqueId, name: &str) -> Result<PassId, EffectError> {
        self.graph.techniques[technique.index()]
            .passes
            .iter()
            .find(|pass: &PassId| self.name(self.graph.passes[pass.index()].name) == Some(name))
            .ok_or_else(|| not_found("pass", name))
    }

    pub fn constant_buffer_count(&self) -> usize {
        self.graph.cbs.len()
    }

    pub fn constant_buffer_by_index(&self, index: usize) -> Result<CbId, EffectError> {
        (index < self.graph.cbs.len())
            .then(|| CbId::from(index))
            .ok_or_else(|| not_found("constant buffer", index.to_string()))
    }

    pub fn constant_buffer_by_name(&self, name: &str) -> Result<CbId, EffectError> {
        self.find_by_name("constant buffer", name, self.graph.cbs.iter().map(|cb| cb.name))
    }

    /// A pass is valid while every block and shader it references could be created.
    pub fn is_pass_valid(&self, pass: PassId) -> bool {
        let store = &self.state.passes[pass.index()].store;
        let state = &self.state;
        let block_valid = |valid: Option<bool>| valid.unwrap_or(true);

        block_valid(store.rasterizer.block().map(|id| state.rasterizers[id.index()].valid))
            && block_valid(store.depth_stencil.block().map(|id| state.depth_stencils[id.index()].valid))
            && block_valid(store.blend.block().map(|id| state.blends[id.index()].valid))
            && store.shaders.iter().all(|shader| match shader {
                ObjectRef::Block(id) => self.is_shader_valid(*id),
                _ => true,
            })
    }

    fn is_shader_valid(&self, shader: ShaderId) -> bool {
        self.state.shaders[shader.index()].valid
            && self.graph.shaders[shader.index()]
                .dependencies
                .samplers
                .iter()
                .flat_map(|range| range.items.iter().flatten())
                .all(|sampler| self.state.samplers[sampler.index()].valid)
    }

    pub fn is_technique_valid(&self, technique: TechniqueId) -> bool {
        self.graph.techniques[technique.index()]
            .passes
            .iter()
            .all(|pass| self.is_pass_valid(pass))
    }

    pub fn is_group_valid(&self, group: GroupId) -> bool {
        self.graph.groups[group.index()]
            .techniques
            .iter()
            .all(|technique| self.is_technique_valid(technique))
    }
}

#[cfg(test)]
mod tests {
    use fxrt_files::fx::types::{AssignmentType, BinaryAssignment, CbFlags, FX_5_0, NumericLayout, ScalarType, VariableFlags};
    use fxrt_files::fx::writer::FxWriter;

    use super::*;
    use crate::arena::ArenaHandle;
    use crate::device::recording::{RecordingContext, RecordingDevice};
    use crate::states::find_state;

    /// `StencilRef = Refs[Which]` with `Refs` defaulting to 10, 20, 30.
    fn indexed_stencil_effect() -> Result<Vec<u8>, anyhow::Error> {
        let mut fx = FxWriter::new(FX_5_0);
        let uint = fx.numeric_type("uint", NumericLayout::Scalar, ScalarType::UInt, 1, 1, false, 0)?;
        let uints = fx.numeric_type("uint", NumericLayout::Scalar, ScalarType::UInt, 1, 1, false, 3)?;

        fx.constant_buffer("Params", 64, CbFlags::empty(), 2, None)?;
        fx.no_annotations()?;
        fx.numeric_variable("Which", uint, None, 0, None, VariableFlags::empty())?;
        fx.no_annotations()?;
        let refs = fx.u32_values(&[10, 20, 30]);
        fx.numeric_variable("Refs", uints, None, 16, Some(refs), VariableFlags::empty())?;
        fx.no_annotations()?;

        fx.group(None, 1)?;
        fx.no_annotations()?;
        fx.technique("T", 1)?;
        fx.no_annotations()?;
        let stencil = find_state("StencilRef").ok_or_else(|| anyhow::anyhow!("no StencilRef state"))?;
        let indexed = fx.variable_index("Refs", "Which")?;
        let assignment = BinaryAssignment {
            i_state: u32::from(stencil.0),
            index: 0,
            assignment_type: AssignmentType::VariableIndex.into(),
            o_initializer: indexed,
        };
        fx.pass("P", &[], &[assignment])?;
        Ok(fx.finish()?)
    }

    fn cached_source(effect: &mut Effect, pass: PassId) -> Option<ArenaHandle> {
        let id = effect.graph.passes[pass.index()].assignments.first()?;
        effect.state.evaluator.assignment_states_mut()[id.index()].source
    }

    #[test]
    fn indexed_sources_are_cached_until_the_index_changes() -> Result<(), anyhow::Error> {
        let mut effect = Effect::load(&indexed_stencil_effect()?)?;
        effect.bind_to_device(Arc::new(RecordingDevice::new()))?;
        let pass = effect.pass_by_index(effect.technique_by_index(0)?, 0)?;
        let which = effect.variable_by_name("Which")?;
        let refs = effect.variable_by_name("Refs")?;
        let mut context = RecordingContext::new();

        effect.apply(pass, &mut context)?;
        assert_eq!(effect.pass_desc(pass)?.stencil_ref, 10);
        let first = cached_source(&mut effect, pass);
        assert!(first.is_some());

        // only the array changed, the same element is read again
        effect.set_scalar(refs, 0, ScalarValue::UInt(11))?;
        effect.apply(pass, &mut context)?;
        assert_eq!(effect.pass_desc(pass)?.stencil_ref, 11);
        assert_eq!(cached_source(&mut effect, pass), first);

        effect.set_uint(which, 2)?;
        effect.apply(pass, &mut context)?;
        assert_eq!(effect.pass_desc(pass)?.stencil_ref, 30);
        let moved = cached_source(&mut effect, pass);
        assert!(moved.is_some());
        assert_ne!(moved, first);
        Ok(())
    }
}
