use byteorder::{ByteOrder, LittleEndian};
use fxrt_files::fx::types::{REGISTER_SIZE, SCALAR_SIZE, ScalarType};
use log::trace;

use super::Effect;
use crate::arena::ArenaHandle;
use crate::device::{
    DepthStencilViewHandle, RenderTargetViewHandle, ShaderResourceViewHandle, UnorderedAccessViewHandle,
};
use crate::error::{EffectError, invalid_call, not_found};
use crate::model::{CbId, ClassInstanceRef, Span, VariableData, VariableId};
use crate::types::{NumericDesc, TypeDesc};

/// One scalar of a numeric variable. Setters convert into the variable's own scalar type,
/// getters return it unconverted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarValue {
    Float(f32),
    Int(i32),
    UInt(u32),
    Bool(bool),
}

impl ScalarValue {
    fn encode(self, scalar: ScalarType) -> u32 {
        match (self, scalar) {
            (ScalarValue::Float(v), ScalarType::Float) => v.to_bits(),
            (ScalarValue::Float(v), ScalarType::Int) => v as i32 as u32,
            (ScalarValue::Float(v), ScalarType::UInt) => v as u32,
            (ScalarValue::Float(v), ScalarType::Bool) => (v != 0.0) as u32,
            (ScalarValue::Int(v), ScalarType::Float) => (v as f32).to_bits(),
            (ScalarValue::Int(v), ScalarType::Bool) => (v != 0) as u32,
            (ScalarValue::Int(v), _) => v as u32,
            (ScalarValue::UInt(v), ScalarType::Float) => (v as f32).to_bits(),
            (ScalarValue::UInt(v), ScalarType::Bool) => (v != 0) as u32,
            (ScalarValue::UInt(v), _) => v,
            (ScalarValue::Bool(v), ScalarType::Float) => (if v { 1.0f32 } else { 0.0 }).to_bits(),
            (ScalarValue::Bool(v), _) => v as u32,
        }
    }

    fn decode(word: u32, scalar: ScalarType) -> Self {
        match scalar {
            ScalarType::Float => ScalarValue::Float(f32::from_bits(word)),
            ScalarType::Int => ScalarValue::Int(word as i32),
            ScalarType::UInt => ScalarValue::UInt(word),
            ScalarType::Bool => ScalarValue::Bool(word != 0),
        }
    }

    pub fn as_f32(self) -> f32 {
        match self {
            ScalarValue::Float(v) => v,
            ScalarValue::Int(v) => v as f32,
            ScalarValue::UInt(v) => v as f32,
            ScalarValue::Bool(v) => v as u32 as f32,
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            ScalarValue::Float(v) => v as i32,
            ScalarValue::Int(v) => v,
            ScalarValue::UInt(v) => v as i32,
            ScalarValue::Bool(v) => v as i32,
        }
    }

    pub fn as_bool(self) -> bool {
        match self {
            ScalarValue::Float(v) => v != 0.0,
            ScalarValue::Int(v) => v != 0,
            ScalarValue::UInt(v) => v != 0,
            ScalarValue::Bool(v) => v,
        }
    }
}

/// Byte position of scalar `(row, column)` inside one element of `numeric`.
fn scalar_offset(numeric: &NumericDesc, row: u32, column: u32) -> usize {
    let (register, entry) = if numeric.column_major {
        (column, row)
    } else {
        (row, column)
    };
    (register * REGISTER_SIZE + entry * SCALAR_SIZE) as usize
}

fn check_element<T>(span: Span<T>, element: u32, count: usize) -> Result<(), EffectError> {
    let end = (element as usize)
        .checked_add(count)
        .ok_or_else(|| invalid_call("element range overflows"))?;
    if end > span.len as usize {
        return Err(invalid_call(format!(
            "elements {}..{} are out of range for a variable with {} elements",
            element, end, span.len
        )));
    }
    Ok(())
}

impl Effect {
    pub fn variable_count(&self) -> usize {
        self.graph.variables.len()
    }

    pub fn variable_by_index(&self, index: usize) -> Result<VariableId, EffectError> {
        (index < self.graph.variables.len())
            .then(|| VariableId::from(index))
            .ok_or_else(|| not_found("variable", index.to_string()))
    }

    pub fn variable_by_name(&self, name: &str) -> Result<VariableId, EffectError> {
        self.find_by_name("variable", name, self.graph.variables.iter().map(|var| var.name))
    }

    /// Semantics compare case-insensitively.
    pub fn variable_by_semantic(&self, semantic: &str) -> Result<VariableId, EffectError> {
        self.graph
            .variables
            .iter()
            .position(|var| {
                self.name(var.semantic)
                    .is_some_and(|candidate| candidate.eq_ignore_ascii_case(semantic))
            })
            .map(VariableId::from)
            .ok_or_else(|| not_found("variable with semantic", semantic))
    }

    pub fn variable_type(&self, var: VariableId) -> &TypeDesc {
        self.graph.type_of(var)
    }

    /// The constant buffer holding `var` and the variable's bytes in the runtime arena.
    fn numeric_location(&self, var: VariableId) -> Result<(CbId, ArenaHandle), EffectError> {
        let variable = self
            .graph
            .variables
            .get(var.index())
            .ok_or_else(|| not_found("variable", var.0.to_string()))?;
        let VariableData::Numeric { cb, offset } = variable.data else {
            return Err(invalid_call("the variable does not live in a constant buffer"));
        };
        let handle = self.state.cb_storage[cb.index()]
            .slice(offset as usize, self.graph.type_of(var).total_size as usize)
            .ok_or_else(|| invalid_call("the variable lies outside its constant buffer"))?;
        Ok((cb, handle))
    }

    fn numeric_desc(&self, var: VariableId) -> Result<NumericDesc, EffectError> {
        self.graph
            .type_of(var)
            .numeric()
            .copied()
            .ok_or_else(|| invalid_call("the variable is not numeric"))
    }

    /// Overwrites `bytes.len()` bytes of the variable's register layout starting at `offset`.
    pub fn set_raw(&mut self, var: VariableId, offset: u32, bytes: &[u8]) -> Result<(), EffectError> {
        let (cb, handle) = self.numeric_location(var)?;
        if self.state.cbs[cb.index()].shared {
            return Err(invalid_call(
                "the constant buffer is shared with the effect this one was cloned from",
            ));
        }
        let target = handle
            .slice(offset as usize, bytes.len())
            .ok_or_else(|| invalid_call(format!("{} bytes at offset {} exceed the variable", bytes.len(), offset)))?;

        self.state.runtime.get_mut(target).copy_from_slice(bytes);
        self.state.cbs[cb.index()].dirty = true;
        self.state.evaluator.touch(var);
        trace!("Wrote {} bytes into variable {:?}", bytes.len(), var);
        Ok(())
    }

    pub fn get_raw(&self, var: VariableId, offset: u32, len: u32) -> Result<&[u8], EffectError> {
        let (_, handle) = self.numeric_location(var)?;
        let source = handle
            .slice(offset as usize, len as usize)
            .ok_or_else(|| invalid_call(format!("{} bytes at offset {} exceed the variable", len, offset)))?;
        Ok(self.state.runtime.get(source))
    }

    /// Writes `values` as consecutive scalars of element `element`, in row order. Matrices are
    /// laid out into their registers, entries past the type's shape are rejected.
    fn write_scalars(&mut self, var: VariableId, element: u32, values: &[ScalarValue]) -> Result<(), EffectError> {
        let numeric = self.numeric_desc(var)?;
        let ty = self.graph.type_of(var);
        if element >= ty.element_count() {
            return Err(invalid_call(format!("element {} is out of range", element)));
        }
        if values.len() > (numeric.rows * numeric.columns) as usize {
            return Err(invalid_call(format!(
                "{} values do not fit a {}x{} variable",
                values.len(),
                numeric.rows,
                numeric.columns
            )));
        }

        let (cb, handle) = self.numeric_location(var)?;
        if self.state.cbs[cb.index()].shared {
            return Err(invalid_call(
                "the constant buffer is shared with the effect this one was cloned from",
            ));
        }
        let base = element as usize * ty.stride as usize;
        let bytes = self.state.runtime.get_mut(handle);
        for (i, value) in values.iter().enumerate() {
            let (row, column) = (i as u32 / numeric.columns, i as u32 % numeric.columns);
            let at = base + scalar_offset(&numeric, row, column);
            LittleEndian::write_u32(&mut bytes[at..at + SCALAR_SIZE as usize], value.encode(numeric.scalar));
        }

        self.state.cbs[cb.index()].dirty = true;
        self.state.evaluator.touch(var);
        Ok(())
    }

    fn read_scalars(&self, var: VariableId, element: u32) -> Result<Vec<ScalarValue>, EffectError> {
        let numeric = self.numeric_desc(var)?;
        let ty = self.graph.type_of(var);
        if element >= ty.element_count() {
            return Err(invalid_call(format!("element {} is out of range", element)));
        }
        let (_, handle) = self.numeric_location(var)?;
        let base = element as usize * ty.stride as usize;
        let bytes = self.state.runtime.get(handle);

        Ok((0..numeric.rows)
            .flat_map(|row| (0..numeric.columns).map(move |column| (row, column)))
            .map(|(row, column)| {
                let at = base + scalar_offset(&numeric, row, column);
                ScalarValue::decode(LittleEndian::read_u32(&bytes[at..]), numeric.scalar)
            })
            .collect())
    }

    pub fn set_scalar(&mut self, var: VariableId, element: u32, value: ScalarValue) -> Result<(), EffectError> {
        self.write_scalars(var, element, &[value])
    }

    pub fn get_scalar(&self, var: VariableId, element: u32) -> Result<ScalarValue, EffectError> {
        self.read_scalars(var, element)?
            .first()
            .copied()
            .ok_or_else(|| invalid_call("the variable has no scalars"))
    }

    pub fn set_float(&mut self, var: VariableId, value: f32) -> Result<(), EffectError> {
        self.set_scalar(var, 0, ScalarValue::Float(value))
    }

    pub fn set_int(&mut self, var: VariableId, value: i32) -> Result<(), EffectError> {
        self.set_scalar(var, 0, ScalarValue::Int(value))
    }

    pub fn set_uint(&mut self, var: VariableId, value: u32) -> Result<(), EffectError> {
        self.set_scalar(var, 0, ScalarValue::UInt(value))
    }

    pub fn set_bool(&mut self, var: VariableId, value: bool) -> Result<(), EffectError> {
        self.set_scalar(var, 0, ScalarValue::Bool(value))
    }

    pub fn get_float(&self, var: VariableId) -> Result<f32, EffectError> {
        Ok(self.get_scalar(var, 0)?.as_f32())
    }

    pub fn get_int(&self, var: VariableId) -> Result<i32, EffectError> {
        Ok(self.get_scalar(var, 0)?.as_i32())
    }

    pub fn get_bool(&self, var: VariableId) -> Result<bool, EffectError> {
        Ok(self.get_scalar(var, 0)?.as_bool())
    }

    /// Writes the leading components of a scalar or vector element.
    pub fn set_float_vector(&mut self, var: VariableId, element: u32, values: &[f32]) -> Result<(), EffectError> {
        let values = values.iter().map(|v| ScalarValue::Float(*v)).collect::<Vec<_>>();
        self.write_scalars(var, element, &values)
    }

    pub fn set_int_vector(&mut self, var: VariableId, element: u32, values: &[i32]) -> Result<(), EffectError> {
        let values = values.iter().map(|v| ScalarValue::Int(*v)).collect::<Vec<_>>();
        self.write_scalars(var, element, &values)
    }

    pub fn get_float_vector(&self, var: VariableId, element: u32) -> Result<Vec<f32>, EffectError> {
        Ok(self
            .read_scalars(var, element)?
            .into_iter()
            .map(ScalarValue::as_f32)
            .collect())
    }

    /// `matrix[row][column]`, only the variable's own rows and columns are written.
    pub fn set_matrix(&mut self, var: VariableId, element: u32, matrix: &[[f32; 4]; 4]) -> Result<(), EffectError> {
        let numeric = self.numeric_desc(var)?;
        let values = matrix[..numeric.rows as usize]
            .iter()
            .flat_map(|row| row[..numeric.columns as usize].iter())
            .map(|v| ScalarValue::Float(*v))
            .collect::<Vec<_>>();
        self.write_scalars(var, element, &values)
    }

    pub fn get_matrix(&self, var: VariableId, element: u32) -> Result<[[f32; 4]; 4], EffectError> {
        let numeric = self.numeric_desc(var)?;
        let mut matrix = [[0.0; 4]; 4];
        for (i, value) in self.read_scalars(var, element)?.into_iter().enumerate() {
            matrix[i / numeric.columns as usize][i % numeric.columns as usize] = value.as_f32();
        }
        Ok(matrix)
    }

    /// Sets the first scalar of consecutive array elements starting at `start`.
    pub fn set_float_array(&mut self, var: VariableId, start: u32, values: &[f32]) -> Result<(), EffectError> {
        let elements = self.graph.type_of(var).element_count();
        if start as usize + values.len() > elements as usize {
            return Err(invalid_call(format!(
                "{} values starting at {} exceed {} elements",
                values.len(),
                start,
                elements
            )));
        }
        for (offset, value) in values.iter().enumerate() {
            self.write_scalars(var, start + offset as u32, &[ScalarValue::Float(*value)])?;
        }
        Ok(())
    }

    fn object_data(&self, var: VariableId) -> Result<&VariableData, EffectError> {
        self.graph
            .variables
            .get(var.index())
            .map(|variable| &variable.data)
            .ok_or_else(|| not_found("variable", var.0.to_string()))
    }

    pub fn set_shader_resources(
        &mut self,
        var: VariableId,
        start: u32,
        views: &[Option<ShaderResourceViewHandle>],
    ) -> Result<(), EffectError> {
        let VariableData::ShaderResource(span) = *self.object_data(var)? else {
            return Err(invalid_call("the variable is not a shader resource"));
        };
        check_element(span, start, views.len())?;
        for (offset, view) in views.iter().enumerate() {
            if let Some(srv) = span.get(start + offset as u32) {
                self.state.srvs[srv.index()] = *view;
            }
        }
        Ok(())
    }

    pub fn set_shader_resource(
        &mut self,
        var: VariableId,
        view: Option<ShaderResourceViewHandle>,
    ) -> Result<(), EffectError> {
        self.set_shader_resources(var, 0, &[view])
    }

    pub fn get_shader_resource(&self, var: VariableId, element: u32) -> Result<Option<ShaderResourceViewHandle>, EffectError> {
        let VariableData::ShaderResource(span) = *self.object_data(var)? else {
            return Err(invalid_call("the variable is not a shader resource"));
        };
        check_element(span, element, 1)?;
        Ok(span.get(element).and_then(|srv| self.state.srvs[srv.index()]))
    }

    pub fn set_unordered_access_views(
        &mut self,
        var: VariableId,
        start: u32,
        views: &[Option<UnorderedAccessViewHandle>],
    ) -> Result<(), EffectError> {
        let VariableData::UnorderedAccessView(span) = *self.object_data(var)? else {
            return Err(invalid_call("the variable is not an unordered access view"));
        };
        check_element(span, start, views.len())?;
        for (offset, view) in views.iter().enumerate() {
            if let Some(uav) = span.get(start + offset as u32) {
                self.state.uavs[uav.index()] = *view;
            }
        }
        Ok(())
    }

    pub fn set_render_target_views(
        &mut self,
        var: VariableId,
        start: u32,
        views: &[Option<RenderTargetViewHandle>],
    ) -> Result<(), EffectError> {
        let VariableData::RenderTargetView(span) = *self.object_data(var)? else {
            return Err(invalid_call("the variable is not a render target view"));
        };
        check_element(span, start, views.len())?;
        for (offset, view) in views.iter().enumerate() {
            if let Some(rtv) = span.get(start + offset as u32) {
                self.state.rtvs[rtv.index()] = *view;
            }
        }
        Ok(())
    }

    pub fn set_depth_stencil_views(
        &mut self,
        var: VariableId,
        start: u32,
        views: &[Option<DepthStencilViewHandle>],
    ) -> Result<(), EffectError> {
        let VariableData::DepthStencilView(span) = *self.object_data(var)? else {
            return Err(invalid_call("the variable is not a depth stencil view"));
        };
        check_element(span, start, views.len())?;
        for (offset, view) in views.iter().enumerate() {
            if let Some(dsv) = span.get(start + offset as u32) {
                self.state.dsvs[dsv.index()] = *view;
            }
        }
        Ok(())
    }

    /// Binds element `element` of interface `var` to a class instance, or clears it.
    pub fn set_class_instance(
        &mut self,
        var: VariableId,
        element: u32,
        instance: Option<ClassInstanceRef>,
    ) -> Result<(), EffectError> {
        let VariableData::Interface(span) = *self.object_data(var)? else {
            return Err(invalid_call("the variable is not an interface"));
        };
        check_element(span, element, 1)?;
        if let Some(instance) = instance {
            let ty = self
                .graph
                .variables
                .get(instance.variable.index())
                .map(|_| self.graph.type_of(instance.variable))
                .ok_or_else(|| not_found("variable", instance.variable.0.to_string()))?;
            if !ty.is_class_instance() {
                return Err(invalid_call("the instance variable does not implement an interface"));
            }
            if instance.element >= ty.element_count() {
                return Err(invalid_call(format!("class instance element {} is out of range", instance.element)));
            }
        }
        if let Some(interface) = span.get(element) {
            self.state.interfaces[interface.index()] = instance;
        }
        Ok(())
    }

    pub fn get_class_instance(&self, var: VariableId, element: u32) -> Result<Option<ClassInstanceRef>, EffectError> {
        let VariableData::Interface(span) = *self.object_data(var)? else {
            return Err(invalid_call("the variable is not an interface"));
        };
        check_element(span, element, 1)?;
        Ok(span.get(element).and_then(|interface| self.state.interfaces[interface.index()]))
    }

    /// Contents of a string variable. Fails once the effect is optimized.
    pub fn get_string(&self, var: VariableId, element: u32) -> Result<&str, EffectError> {
        let VariableData::Strings(strings) = self.object_data(var)? else {
            return Err(invalid_call("the variable is not a string"));
        };
        let id = strings
            .get(element as usize)
            .ok_or_else(|| invalid_call(format!("string element {} is out of range", element)))?;
        if self.is_optimized() {
            return Err(invalid_call("string contents are gone once the effect is optimized"));
        }
        Ok(self.name(*id).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_convert_into_the_variable_type() {
        assert_eq!(ScalarValue::Float(2.7).encode(ScalarType::Int), 2);
        assert_eq!(ScalarValue::Int(-3).encode(ScalarType::Float), (-3.0f32).to_bits());
        assert_eq!(ScalarValue::Bool(true).encode(ScalarType::Float), 1.0f32.to_bits());
        assert_eq!(ScalarValue::UInt(7).encode(ScalarType::Bool), 1);
        assert_eq!(ScalarValue::decode(0xFFFF_FFFF, ScalarType::Int), ScalarValue::Int(-1));
        assert!(ScalarValue::decode(2, ScalarType::Bool).as_bool());
    }

    #[test]
    fn column_major_entries_are_transposed() {
        let numeric = NumericDesc {
            layout: fxrt_files::fx::types::NumericLayout::Matrix,
            scalar: ScalarType::Float,
            rows: 3,
            columns: 2,
            column_major: true,
        };
        assert_eq!(scalar_offset(&numeric, 2, 1), 16 + 8);

        let row_major = NumericDesc {
            column_major: false,
            ..numeric
        };
        assert_eq!(scalar_offset(&row_major, 2, 1), 32 + 4);
    }
}
