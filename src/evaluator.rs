use byteorder::{ByteOrder, LittleEndian};
use fxrt_files::fx::types::SCALAR_SIZE;
use log::{debug, warn};

use crate::arena::{ArenaHandle, ByteArena};
use crate::graph::EffectGraph;
use crate::model::{AssignmentId, AssignmentRule, VariableData, VariableId};
use crate::states::{StateFields, StateIndex, StateValue};

pub const DEFAULT_CLOCK_CEILING: u32 = u32::MAX;

/// Monotonic stamp source. Starts at 1 so that stamps of 0 always read as stale.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    now: u32,
    ceiling: u32,
}

impl Clock {
    pub fn new(ceiling: u32) -> Self {
        Self {
            now: 1,
            ceiling: ceiling.max(2),
        }
    }

    pub fn now(&self) -> u32 {
        self.now
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Returns `true` when the clock wrapped back to 1.
    fn advance(&mut self) -> bool {
        if self.now >= self.ceiling {
            self.now = 1;
            true
        } else {
            self.now += 1;
            false
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AssignmentState {
    pub last_evaluated: u32,
    /// Cached element of `array[index]` inside the runtime arena.
    pub source: Option<ArenaHandle>,
}

/// Dirty tracking for live assignments. Writes stamp variables with the current time, an
/// assignment re-runs when any of its dependencies carries a stamp at or after its last run.
#[derive(Debug, Clone)]
pub struct Evaluator {
    clock: Clock,
    variable_stamps: Vec<u32>,
    assignments: Vec<AssignmentState>,
}

impl Evaluator {
    pub fn new(variables: usize, assignments: usize, ceiling: u32) -> Self {
        Self {
            clock: Clock::new(ceiling),
            variable_stamps: vec![0; variables],
            assignments: vec![AssignmentState::default(); assignments],
        }
    }

    pub fn clock(&self) -> Clock {
        self.clock
    }

    pub fn set_ceiling(&mut self, ceiling: u32) {
        self.clock.ceiling = ceiling.max(2);
    }

    /// Advances the clock. On rollover every stamp is reset so that everything re-evaluates.
    pub fn tick(&mut self) {
        if self.clock.advance() {
            debug!("Evaluation clock rolled over, invalidating {} assignments", self.assignments.len());
            self.variable_stamps.fill(0);
            for state in &mut self.assignments {
                state.last_evaluated = 0;
            }
        }
    }

    pub fn touch(&mut self, variable: VariableId) {
        if let Some(stamp) = self.variable_stamps.get_mut(variable.index()) {
            *stamp = self.clock.now;
        }
    }

    pub fn assignment_states_mut(&mut self) -> &mut [AssignmentState] {
        &mut self.assignments
    }

    fn is_stale(&self, variable: VariableId, last_evaluated: u32) -> bool {
        self.variable_stamps[variable.index()] >= last_evaluated
    }

    /// Runs assignment `id` into `target` if any dependency changed since its last run.
    /// Returns whether the destination was written.
    pub fn evaluate(
        &mut self,
        graph: &EffectGraph,
        id: AssignmentId,
        runtime: &ByteArena,
        cb_storage: &[ArenaHandle],
        target: &mut dyn StateFields,
    ) -> bool {
        let def = graph.assignments[id.index()];
        let state = self.assignments[id.index()];
        if !def
            .rule
            .dependencies()
            .any(|variable| self.is_stale(variable, state.last_evaluated))
        {
            return false;
        }

        let destination = def.destination;
        let columns = match destination.state.entry().value {
            StateValue::Numeric { columns, .. } => columns as usize,
            StateValue::Object(_) => 0,
        };

        match def.rule {
            AssignmentRule::NumericVariable { source, byte_offset } => {
                let location = variable_location(graph, cb_storage, source)
                    .and_then(|handle| handle.slice(byte_offset as usize, columns * SCALAR_SIZE as usize));
                if let Some(location) = location {
                    write_words(runtime, location, destination.state, destination.index, target);
                }
            }
            AssignmentRule::NumericVariableIndex { index, array } => {
                let mut source = state.source;
                if source.is_none() || self.is_stale(index, state.last_evaluated) {
                    let element = read_index(graph, runtime, cb_storage, index, array);
                    let stride = graph.type_of(array).stride as usize;
                    source = variable_location(graph, cb_storage, array).and_then(|handle| {
                        let offset = (element as usize).checked_mul(stride)?;
                        handle.slice(offset, columns * SCALAR_SIZE as usize)
                    });
                    if source.is_none() {
                        warn!(
                            "Element {} of variable {:?} is too small for {}",
                            element,
                            array,
                            destination.state.entry().name
                        );
                    }
                    self.assignments[id.index()].source = source;
                }
                if let Some(source) = source {
                    write_words(runtime, source, destination.state, destination.index, target);
                }
            }
            AssignmentRule::ObjectVariableIndex { index, array } => {
                let element = read_index(graph, runtime, cb_storage, index, array);
                if let Some(block) = graph.variable(array).data.block(element) {
                    target.write_object(destination.state, destination.index, block);
                }
            }
        }

        self.assignments[id.index()].last_evaluated = self.clock.now;
        true
    }
}

/// Where a constant buffer variable's bytes live in the runtime arena.
fn variable_location(graph: &EffectGraph, cb_storage: &[ArenaHandle], variable: VariableId) -> Option<ArenaHandle> {
    match graph.variable(variable).data {
        VariableData::Numeric { cb, offset } => cb_storage
            .get(cb.index())?
            .slice(offset as usize, graph.type_of(variable).total_size as usize),
        _ => None,
    }
}

/// Current value of an index variable, clamped to 0 when it is out of range for `array`.
fn read_index(
    graph: &EffectGraph,
    runtime: &ByteArena,
    cb_storage: &[ArenaHandle],
    index: VariableId,
    array: VariableId,
) -> u32 {
    let value = variable_location(graph, cb_storage, index)
        .and_then(|handle| handle.slice(0, SCALAR_SIZE as usize))
        .map_or(0, |handle| LittleEndian::read_u32(runtime.get(handle)));

    let elements = graph.type_of(array).element_count();
    if value >= elements {
        warn!(
            "Index {} is out of range for variable {:?} with {} elements, using element 0",
            value, array, elements
        );
        return 0;
    }
    value
}

fn write_words(runtime: &ByteArena, location: ArenaHandle, state: StateIndex, index: u32, target: &mut dyn StateFields) {
    let bytes = runtime.get(location);
    let mut words = [0u32; 4];
    for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(SCALAR_SIZE as usize)) {
        *word = LittleEndian::read_u32(chunk);
    }
    let columns = (bytes.len() / SCALAR_SIZE as usize).min(words.len());
    target.write_numeric(state, index, &words[..columns]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_rolls_over_at_the_ceiling() {
        let mut clock = Clock::new(3);
        assert_eq!(clock.now(), 1);
        assert!(!clock.advance());
        assert!(!clock.advance());
        assert_eq!(clock.now(), 3);
        assert!(clock.advance());
        assert_eq!(clock.now(), 1);
    }

    #[test]
    fn rollover_resets_stamps() {
        let mut evaluator = Evaluator::new(2, 1, 2);
        evaluator.touch(VariableId(1));
        evaluator.assignments[0].last_evaluated = 1;

        evaluator.tick();
        assert_eq!(evaluator.clock().now(), 2);
        assert_eq!(evaluator.variable_stamps[1], 1);

        evaluator.tick();
        assert_eq!(evaluator.clock().now(), 1);
        assert_eq!(evaluator.variable_stamps, vec![0, 0]);
        assert_eq!(evaluator.assignments[0].last_evaluated, 0);
    }
}
