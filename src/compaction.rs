use std::collections::BTreeMap;

use log::debug;

use crate::arena::{ArenaHandle, ByteArena};
use crate::effect::state::{BlockState, CbState, DeviceState, EffectState, PassState, ShaderState};
use crate::error::EffectError;
use crate::evaluator::{DEFAULT_CLOCK_CEILING, Evaluator};
use crate::graph::{EffectGraph, ReflectionData};
use crate::loader::{ScratchBlock, ScratchEffect, ScratchShader};
use crate::model::{
    Annotation, AnnotationValue, AssignmentDef, AssignmentId, AssignmentOwner, BlendId, DepthStencilId, PassId,
    PendingAssignment, RasterizerId, ResolvedHandle, SamplerId, Span, StateBlockDef,
};
use crate::pool::StringPool;

/// Old and new placement of every allocation moved from one arena to another. Handles pointing
/// anywhere inside a moved allocation translate by their offset into it.
#[derive(Debug, Default)]
pub(crate) struct RemapTable {
    /// Keyed by old offset. An empty allocation can share its offset with the next one, so the
    /// key also says whether the allocation holds any bytes (empty ones sort first).
    entries: BTreeMap<(usize, bool), (ArenaHandle, ArenaHandle)>,
}

impl RemapTable {
    fn insert(&mut self, old: ArenaHandle, new: ArenaHandle) {
        self.entries.insert((old.offset(), !old.is_empty()), (old, new));
    }

    pub fn translate(&self, handle: ArenaHandle) -> Option<ArenaHandle> {
        let offset = handle.offset();
        let exact_empty = self.entries.get(&(offset, false)).filter(|_| handle.is_empty());
        let (old, new) = exact_empty.or_else(|| {
            self.entries
                .range(..=(offset, true))
                .next_back()
                .map(|(_, entry)| entry)
                .filter(|(old, _)| old.contains(offset))
        })?;
        new.slice(offset - old.offset(), handle.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Copies `allocations` out of `source` into a new arena reserved at exactly their padded size.
pub(crate) fn relocate(
    source: &ByteArena,
    allocations: &[ArenaHandle],
) -> Result<(ByteArena, Vec<ArenaHandle>, RemapTable), EffectError> {
    let size = allocations
        .iter()
        .map(|handle| ByteArena::padded_size(handle.len()))
        .sum();

    let mut arena = ByteArena::new();
    arena.reserve(size)?;
    let mut table = RemapTable::default();
    let mut moved = Vec::with_capacity(allocations.len());
    for old in allocations {
        let new = arena.append(source.get(*old))?;
        table.insert(*old, new);
        moved.push(new);
    }
    arena.finish()?;

    Ok((arena, moved, table))
}

/// The final form of a loaded effect.
pub(crate) struct Compacted {
    pub graph: EffectGraph,
    pub reflection: ReflectionData,
    pub state: EffectState,
}

/// Moves the scratch graph into exactly sized arenas and binds every assignment to its owner.
pub(crate) fn compact(scratch: ScratchEffect) -> Result<Compacted, EffectError> {
    let reflection = compact_reflection(&scratch.strings, &scratch.annotations, &scratch.shaders, &scratch.reflection)?;
    let (runtime, cb_storage, _) = relocate(&scratch.runtime, &scratch.cb_storage)?;
    debug!(
        "Compacted into a {} byte reflection arena and a {} byte runtime arena",
        reflection.arena.len(),
        runtime.len()
    );

    let mut assignments = Vec::new();
    let mut passes = Vec::with_capacity(scratch.passes.len());
    let mut pass_states = Vec::with_capacity(scratch.passes.len());
    for (index, pass) in scratch.passes.into_iter().enumerate() {
        let mut def = pass.def;
        def.assignments = resolve_assignments(&mut assignments, AssignmentOwner::Pass(PassId::from(index)), &pass.pending);
        pass_states.push(PassState { store: def.initial });
        passes.push(def);
    }

    let (rasterizers, rasterizer_states) = compact_blocks(&mut assignments, scratch.rasterizer, |i| {
        AssignmentOwner::Rasterizer(RasterizerId::from(i))
    });
    let (depth_stencils, depth_stencil_states) = compact_blocks(&mut assignments, scratch.depth_stencil, |i| {
        AssignmentOwner::DepthStencil(DepthStencilId::from(i))
    });
    let (blends, blend_states) = compact_blocks(&mut assignments, scratch.blend, |i| {
        AssignmentOwner::Blend(BlendId::from(i))
    });
    let (samplers, sampler_states) = compact_blocks(&mut assignments, scratch.samplers, |i| {
        AssignmentOwner::Sampler(SamplerId::from(i))
    });

    let cbs = scratch
        .cbs
        .iter()
        .map(|_| CbState {
            dirty: false,
            buffer: None,
            view: None,
            shared: false,
        })
        .collect();

    let state = EffectState {
        runtime,
        cb_storage,
        cbs,
        rasterizers: rasterizer_states,
        depth_stencils: depth_stencil_states,
        blends: blend_states,
        samplers: sampler_states,
        shaders: vec![ShaderState::default(); scratch.shaders.len()],
        passes: pass_states,
        srvs: vec![None; scratch.srv_count as usize],
        uavs: vec![None; scratch.uav_count as usize],
        rtvs: vec![None; scratch.rtv_count as usize],
        dsvs: vec![None; scratch.dsv_count as usize],
        interfaces: scratch.interfaces.clone(),
        evaluator: Evaluator::new(scratch.variables.len(), assignments.len(), DEFAULT_CLOCK_CEILING),
    };

    let graph = EffectGraph {
        version: scratch.version,
        header: scratch.header,
        types: scratch.types.into_types(),
        cbs: scratch.cbs,
        variables: scratch.variables,
        rasterizers,
        depth_stencils,
        blends,
        samplers,
        shaders: scratch.shaders.into_iter().map(|shader| shader.def).collect(),
        assignments,
        groups: scratch.groups,
        techniques: scratch.techniques,
        passes,
        srv_count: scratch.srv_count,
        uav_count: scratch.uav_count,
        rtv_count: scratch.rtv_count,
        dsv_count: scratch.dsv_count,
        interface_count: scratch.interfaces.len() as u32,
    };

    Ok(Compacted {
        graph,
        reflection,
        state,
    })
}

fn compact_reflection(
    strings: &StringPool,
    annotations: &[Annotation],
    shaders: &[ScratchShader],
    scratch: &ByteArena,
) -> Result<ReflectionData, EffectError> {
    let string_size: usize = strings
        .iter()
        .map(|(_, value)| ByteArena::padded_size(value.len()))
        .sum();
    let annotation_size: usize = annotations
        .iter()
        .filter_map(|annotation| match annotation.value {
            AnnotationValue::Numeric(handle) => Some(ByteArena::padded_size(handle.len())),
            AnnotationValue::Strings(_) => None,
        })
        .sum();
    let bytecode_size: usize = shaders
        .iter()
        .filter_map(|shader| shader.bytecode)
        .map(|handle| ByteArena::padded_size(handle.len()))
        .sum();

    let mut arena = ByteArena::new();
    arena.reserve(string_size + annotation_size + bytecode_size)?;

    let mut string_handles = vec![ArenaHandle::default(); strings.len()];
    for (id, value) in strings.iter() {
        string_handles[id.index()] = arena.append(value.as_bytes())?;
    }

    let annotations = annotations
        .iter()
        .map(|annotation| {
            let value = match &annotation.value {
                AnnotationValue::Numeric(handle) => AnnotationValue::Numeric(arena.append(scratch.get(*handle))?),
                strings => strings.clone(),
            };
            Ok(Annotation { value, ..annotation.clone() })
        })
        .collect::<Result<Vec<_>, EffectError>>()?;

    let bytecode = shaders
        .iter()
        .map(|shader| shader.bytecode.map(|handle| arena.append(scratch.get(handle))).transpose())
        .collect::<Result<Vec<_>, _>>()?;

    arena.finish()?;
    Ok(ReflectionData {
        arena,
        strings: string_handles,
        annotations,
        bytecode,
    })
}

fn resolve_assignments(
    assignments: &mut Vec<AssignmentDef>,
    owner: AssignmentOwner,
    pending: &[PendingAssignment],
) -> Span<AssignmentId> {
    let start = assignments.len() as u32;
    assignments.extend(pending.iter().map(|assignment| AssignmentDef {
        destination: ResolvedHandle {
            owner,
            state: assignment.destination.state,
            index: assignment.destination.index,
        },
        rule: assignment.rule,
    }));
    Span::new(start, pending.len() as u32)
}

fn compact_blocks<D: DeviceState>(
    assignments: &mut Vec<AssignmentDef>,
    blocks: Vec<ScratchBlock<D>>,
    owner: impl Fn(usize) -> AssignmentOwner,
) -> (Vec<StateBlockDef>, Vec<BlockState<D>>) {
    blocks
        .into_iter()
        .enumerate()
        .map(|(index, block)| {
            let def = StateBlockDef {
                owner: block.owner,
                assignments: resolve_assignments(assignments, owner(index), &block.pending),
            };
            (def, BlockState::new(block.desc))
        })
        .unzip()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relocation_translates_interior_handles() -> Result<(), EffectError> {
        let mut scratch = ByteArena::new();
        let first = scratch.append(&[1; 12])?;
        let second = scratch.append(&[2, 3, 4, 5, 6, 7, 8, 9])?;

        let (arena, moved, table) = relocate(&scratch, &[second, first])?;
        assert_eq!(table.len(), 2);
        assert_eq!(arena.len(), ByteArena::padded_size(8) + ByteArena::padded_size(12));
        assert_eq!(moved[0].offset(), 0);

        let interior = second.slice(4, 4).expect("slice");
        let translated = table.translate(interior).expect("translated");
        assert_eq!(arena.get(translated), &[6, 7, 8, 9]);
        assert_eq!(table.translate(first), Some(moved[1]));
        Ok(())
    }

    #[test]
    fn empty_allocations_keep_their_own_placement() -> Result<(), EffectError> {
        let mut scratch = ByteArena::new();
        let head = scratch.append(&[1; 4])?;
        let empty = scratch.append(&[])?;
        let tail = scratch.append(&[2, 3, 4, 5])?;
        assert_eq!(empty.offset(), tail.offset());

        let (arena, moved, table) = relocate(&scratch, &[tail, head, empty])?;
        assert_eq!(table.len(), 3);
        assert_eq!(table.translate(empty), Some(moved[2]));
        assert_eq!(table.translate(tail), Some(moved[0]));
        assert_eq!(table.translate(head), Some(moved[1]));

        let end_of_tail = tail.slice(2, 2).expect("slice");
        assert_eq!(arena.get(table.translate(end_of_tail).expect("translated")), &[4, 5]);

        let mut other = ByteArena::new();
        other.append(&[0; 32])?;
        let beyond = other.append(&[0; 4])?;
        assert_eq!(table.translate(beyond), None);
        Ok(())
    }
}
