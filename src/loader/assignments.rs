use fxrt_files::fx::reader::UnstructuredData;
use fxrt_files::fx::types::{
    AssignmentType, BinaryAssignment, BinaryConstant, BinaryConstantIndex, BinaryInlineShader, BinaryShaderData5,
    BinaryVariableIndex, SCALAR_SIZE, SO_STREAM_COUNT, ScalarType,
};
use log::trace;

use super::Loader;
use crate::device::ShaderStage;
use crate::error::{EffectError, malformed};
use crate::model::{AssignmentRule, BlockRef, PendingAssignment, RelativeOffset, VariableId};
use crate::states::{FieldType, ObjectKind, StateEntry, StateFields, StateIndex, StateOwner, StateValue};

/// Object arrays indexed at runtime address their blocks with 16 bits.
const MAX_INDEXED_OBJECT_ELEMENTS: u32 = 0xFFFF;

impl Loader<'_, '_> {
    /// Reads `count` assignment records for a block owned by `owner`. Constant and fixed
    /// references are folded into `target` right away, the rest is returned for evaluation at
    /// apply time.
    pub(super) fn load_assignments(
        &mut self,
        count: u32,
        owner: StateOwner,
        target: &mut dyn StateFields,
    ) -> Result<Vec<PendingAssignment>, EffectError> {
        let records = self.binary.structured.read_records::<BinaryAssignment>(count)?;
        let mut pending = Vec::new();

        for record in records {
            let state =
                StateIndex::from_raw(record.i_state).ok_or_else(|| malformed("assignment targets an unknown state"))?;
            let entry = state.entry();
            if entry.owner != owner {
                return Err(malformed("assignment targets a state of another block kind"));
            }
            if record.index >= entry.indices {
                return Err(malformed("assignment index is out of range for its state"));
            }

            let destination = RelativeOffset {
                state,
                index: record.index,
            };
            let kind = AssignmentType::try_from(record.assignment_type)
                .map_err(|_| malformed("invalid assignment type"))?;
            trace!("{} [{}] <- {:?}", entry.name, record.index, kind);

            match kind {
                AssignmentType::Constant => {
                    self.fold_constant(entry, destination, record.o_initializer, target)?;
                }
                AssignmentType::Variable => {
                    let source = self.variable_at(record.o_initializer)?;
                    match entry.value {
                        StateValue::Object(kind) => {
                            let block = self.object_block(source, kind, 0)?;
                            target.write_object(state, destination.index, block);
                        }
                        StateValue::Numeric { columns, .. } => {
                            self.check_numeric_source(source, 0, columns)?;
                            pending.push(PendingAssignment {
                                destination,
                                rule: AssignmentRule::NumericVariable {
                                    source,
                                    byte_offset: 0,
                                },
                            });
                        }
                    }
                }
                AssignmentType::ConstIndex => {
                    let initializer: BinaryConstantIndex =
                        self.binary.unstructured.read_record_at(record.o_initializer as usize)?;
                    let array = self.variable_at(initializer.o_array_name)?;
                    match entry.value {
                        StateValue::Object(kind) => {
                            let block = self.object_block(array, kind, initializer.index)?;
                            target.write_object(state, destination.index, block);
                        }
                        StateValue::Numeric { columns, .. } => {
                            let byte_offset = initializer
                                .index
                                .checked_mul(SCALAR_SIZE)
                                .ok_or_else(|| malformed("constant index overflows"))?;
                            self.check_numeric_source(array, byte_offset, columns)?;
                            pending.push(PendingAssignment {
                                destination,
                                rule: AssignmentRule::NumericVariable {
                                    source: array,
                                    byte_offset,
                                },
                            });
                        }
                    }
                }
                AssignmentType::VariableIndex => {
                    let initializer: BinaryVariableIndex =
                        self.binary.unstructured.read_record_at(record.o_initializer as usize)?;
                    let array = self.variable_at(initializer.o_array_name)?;
                    let index = self.variable_at(initializer.o_index_var_name)?;
                    let rule = self.indexed_rule(entry, array, index)?;
                    pending.push(PendingAssignment { destination, rule });
                }
                AssignmentType::Expression | AssignmentType::ExpressionIndex => {
                    return Err(EffectError::NotImplemented {
                        reason: "expression assignments are not supported",
                    });
                }
                AssignmentType::InlineShader | AssignmentType::InlineShader5 => {
                    let StateValue::Object(ObjectKind::Shader(stage)) = entry.value else {
                        return Err(malformed("inline shaders can only be assigned to shader states"));
                    };
                    let shader = self.load_inline_shader(stage, kind, record.o_initializer)?;
                    target.write_object(state, destination.index, BlockRef::Shader(shader));
                }
            }
        }

        Ok(pending)
    }

    fn fold_constant(
        &mut self,
        entry: &StateEntry,
        destination: RelativeOffset,
        o_initializer: u32,
        target: &mut dyn StateFields,
    ) -> Result<(), EffectError> {
        self.binary.unstructured.seek(o_initializer as usize)?;
        let count = self.binary.unstructured.read_u32()?;
        let constants = self.binary.unstructured.read_records::<BinaryConstant>(count)?;

        match entry.value {
            StateValue::Object(_) => {
                // the only constant an object slot takes is a literal NULL
                let is_null = matches!(
                    constants.as_slice(),
                    [constant] if constant.value == 0
                        && matches!(
                            ScalarType::try_from(constant.scalar_type),
                            Ok(ScalarType::Int | ScalarType::UInt)
                        )
                );
                if !is_null {
                    return Err(malformed("object states only accept a NULL constant"));
                }
                target.write_object(destination.state, destination.index, BlockRef::Null);
            }
            StateValue::Numeric { field, columns } => {
                if count != columns {
                    return Err(malformed("constant count does not match the state's columns"));
                }
                let words = constants
                    .iter()
                    .map(|constant| convert_constant(constant, field))
                    .collect::<Result<Vec<_>, _>>()?;
                target.write_numeric(destination.state, destination.index, &words);
            }
        }
        Ok(())
    }

    /// Checks that `columns` words at `byte_offset` fit inside a constant buffer variable.
    fn check_numeric_source(&self, variable: VariableId, byte_offset: u32, columns: u32) -> Result<(), EffectError> {
        let desc = self.type_desc(self.out.variables[variable.index()].ty);
        if !desc.belongs_in_constant_buffer() {
            return Err(malformed("numeric states need a numeric source variable"));
        }
        let end = byte_offset
            .checked_add(columns * SCALAR_SIZE)
            .ok_or_else(|| malformed("assignment source overflows"))?;
        if end > desc.total_size {
            return Err(malformed("assignment reads past the end of its source variable"));
        }
        Ok(())
    }

    /// The block an object assignment aliases, checked against what the slot accepts.
    fn object_block(&self, variable: VariableId, kind: ObjectKind, element: u32) -> Result<BlockRef, EffectError> {
        let source = &self.out.variables[variable.index()];
        let object = self
            .type_desc(source.ty)
            .object_type()
            .ok_or_else(|| malformed("object states need an object source variable"))?;
        if !kind.accepts(object) {
            return Err(malformed("source variable has the wrong object type for its state"));
        }
        source
            .data
            .block(element)
            .ok_or_else(|| malformed("object assignment index is out of range"))
    }

    fn indexed_rule(&self, entry: &StateEntry, array: VariableId, index: VariableId) -> Result<AssignmentRule, EffectError> {
        if !self.type_desc(self.out.variables[index.index()].ty).is_integer_scalar() {
            return Err(malformed("index variables must be int or uint"));
        }
        let array_desc = self.type_desc(self.out.variables[array.index()].ty);
        if !array_desc.is_array() {
            return Err(malformed("indexed assignment source is not an array"));
        }

        match entry.value {
            StateValue::Object(kind) => {
                let object = array_desc
                    .object_type()
                    .ok_or_else(|| malformed("object states need an object source variable"))?;
                if !kind.accepts(object) {
                    return Err(malformed("source variable has the wrong object type for its state"));
                }
                if array_desc.elements > MAX_INDEXED_OBJECT_ELEMENTS {
                    return Err(malformed("indexed object array is too large"));
                }
                Ok(AssignmentRule::ObjectVariableIndex { index, array })
            }
            StateValue::Numeric { .. } => {
                if !array_desc.belongs_in_constant_buffer() {
                    return Err(malformed("numeric states need a numeric source variable"));
                }
                Ok(AssignmentRule::NumericVariableIndex { index, array })
            }
        }
    }

    fn load_inline_shader(
        &mut self,
        stage: ShaderStage,
        kind: AssignmentType,
        o_initializer: u32,
    ) -> Result<crate::model::ShaderId, EffectError> {
        if self.out.anonymous_shaders >= self.header().c_inline_shaders {
            return Err(malformed("more inline shaders than declared"));
        }

        let shader = if kind == AssignmentType::InlineShader5 {
            let record: BinaryShaderData5 = self.binary.unstructured.read_record_at(o_initializer as usize)?;
            if record.c_so_decls as usize > SO_STREAM_COUNT {
                return Err(malformed("too many stream output declarations"));
            }
            let decls = record.o_so_decls[..record.c_so_decls as usize].to_vec();
            self.add_shader(
                stage,
                None,
                record.o_shader,
                &decls,
                record.rasterized_stream,
                Some((record.c_interface_bindings, record.o_interface_bindings)),
            )?
        } else {
            let record: BinaryInlineShader = self.binary.unstructured.read_record_at(o_initializer as usize)?;
            self.add_shader(stage, None, record.o_shader, &[record.o_so_decl], 0, None)?
        };

        self.out.anonymous_shaders += 1;
        Ok(shader)
    }
}

/// Converts one literal to the representation of the destination field.
fn convert_constant(constant: &BinaryConstant, field: FieldType) -> Result<u32, EffectError> {
    let scalar = ScalarType::try_from(constant.scalar_type).map_err(|_| malformed("invalid constant type"))?;
    let value = constant.value;

    Ok(match (scalar, field) {
        (ScalarType::Float, FieldType::F32) => value,
        (ScalarType::Float, FieldType::I32) => f32::from_bits(value) as i32 as u32,
        (ScalarType::Float, FieldType::U8) => u32::from(f32::from_bits(value) as u8),
        (ScalarType::Float, _) => f32::from_bits(value) as u32,
        (ScalarType::UInt, FieldType::F32) => (value as f32).to_bits(),
        (_, FieldType::F32) => (value as i32 as f32).to_bits(),
        (_, FieldType::U8) => value & 0xFF,
        (_, _) => value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_convert_to_field_types() -> Result<(), EffectError> {
        assert_eq!(convert_constant(&BinaryConstant::int(2), FieldType::F32)?, 2.0f32.to_bits());
        assert_eq!(convert_constant(&BinaryConstant::int(-1), FieldType::F32)?, (-1.0f32).to_bits());
        assert_eq!(convert_constant(&BinaryConstant::float(3.75), FieldType::U32)?, 3);
        assert_eq!(convert_constant(&BinaryConstant::float(-2.0), FieldType::I32)?, (-2i32) as u32);
        assert_eq!(convert_constant(&BinaryConstant::uint(0x1FF), FieldType::U8)?, 0xFF);
        assert_eq!(convert_constant(&BinaryConstant::bool(true), FieldType::Bool)?, 1);
        assert!(convert_constant(&BinaryConstant { scalar_type: 9, value: 0 }, FieldType::U32).is_err());
        Ok(())
    }
}
