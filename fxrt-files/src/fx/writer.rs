use std::collections::HashMap;

use crate::ParserError;
use crate::common::writer::Emittable;
use crate::fx::types::{
    AssignmentType, BinaryAnnotation, BinaryAssignment, BinaryConstant, BinaryConstantBuffer, BinaryConstantIndex,
    BinaryGroup, BinaryGsSoInitializer, BinaryHeader, BinaryInlineShader, BinaryInterfaceInitializer,
    BinaryInterfaceVariable, BinaryMember, BinaryNumericType, BinaryNumericVariable, BinaryObjectVariable,
    BinaryPass, BinaryShaderData5, BinaryTechnique, BinaryType, BinaryVariableIndex, CbFlags, HEADER_SIZE, NumericLayout,
    ObjectType, REGISTER_SIZE, SCALAR_SIZE, ScalarType, VarType, VariableFlags, align_to_register,
};

/// Shape of a type registered with the writer, used to fill in header counts and struct
/// member offsets.
#[derive(Debug, Clone, Copy)]
struct WrittenType {
    var_type: VarType,
    object: Option<ObjectType>,
    elements: u32,
    total_size: u32,
    packed_size: u32,
}

#[derive(Debug, Clone)]
pub enum AnnotationValue {
    /// One unstructured string offset per element.
    Strings(Vec<u32>),
    /// Offset of the packed default value.
    Numeric(u32),
}

#[derive(Debug, Clone)]
pub struct AnnotationSpec {
    pub name: u32,
    pub ty: u32,
    pub value: AnnotationValue,
}

pub struct StructMemberSpec<'a> {
    pub name: &'a str,
    pub semantic: Option<&'a str>,
    pub ty: u32,
}

/// Assembles effect binaries record by record. Records are written in the order the caller
/// issues them, the writer only keeps the header totals in sync for the common record kinds.
/// Tests and tools corrupt anything else through [`FxWriter::header_mut`].
pub struct FxWriter {
    header: BinaryHeader,
    unstructured: Vec<u8>,
    structured: Vec<u8>,
    types: HashMap<u32, WrittenType>,
}

impl FxWriter {
    pub fn new(tag: u32) -> Self {
        Self {
            header: BinaryHeader {
                tag,
                ..Default::default()
            },
            // offset 0 is reserved for "absent"
            unstructured: vec![0; 4],
            structured: Vec::new(),
            types: HashMap::new(),
        }
    }

    pub fn header_mut(&mut self) -> &mut BinaryHeader {
        &mut self.header
    }

    pub fn finish(mut self) -> Result<Vec<u8>, ParserError> {
        self.header.cb_unstructured = self.unstructured.len() as u32;
        let mut out = Vec::with_capacity(HEADER_SIZE + self.unstructured.len() + self.structured.len());
        self.header.emit(&mut out)?;
        out.extend_from_slice(&self.unstructured);
        out.extend_from_slice(&self.structured);
        Ok(out)
    }

    // --- unstructured blob ---

    /// Appends raw bytes, returning their offset.
    pub fn blob(&mut self, bytes: &[u8]) -> u32 {
        let offset = self.unstructured.len() as u32;
        self.unstructured.extend_from_slice(bytes);
        offset
    }

    /// Appends a string without deduplication, so identical text can live at several offsets.
    pub fn string(&mut self, text: &str) -> u32 {
        let offset = self.blob(text.as_bytes());
        self.unstructured.push(0);
        offset
    }

    pub fn optional_string(&mut self, text: Option<&str>) -> u32 {
        text.map_or(0, |text| self.string(text))
    }

    pub fn data_block(&mut self, bytes: &[u8]) -> u32 {
        let offset = self.blob(&(bytes.len() as u32).to_le_bytes());
        self.blob(bytes);
        offset
    }

    pub fn u32_values(&mut self, values: &[u32]) -> u32 {
        let offset = self.unstructured.len() as u32;
        for value in values {
            self.unstructured.extend_from_slice(&value.to_le_bytes());
        }
        offset
    }

    pub fn f32_values(&mut self, values: &[f32]) -> u32 {
        let bits = values.iter().map(|v| v.to_bits()).collect::<Vec<_>>();
        self.u32_values(&bits)
    }

    fn unstructured_record<T: Emittable>(&mut self, record: &T) -> Result<u32, ParserError> {
        let offset = self.unstructured.len() as u32;
        record.emit(&mut self.unstructured)?;
        Ok(offset)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn numeric_type(
        &mut self,
        name: &str,
        layout: NumericLayout,
        scalar: ScalarType,
        rows: u32,
        columns: u32,
        column_major: bool,
        elements: u32,
    ) -> Result<u32, ParserError> {
        let (registers, entries) = if column_major { (columns, rows) } else { (rows, columns) };
        let stride = registers * REGISTER_SIZE;
        let last = (registers - 1) * REGISTER_SIZE + entries * SCALAR_SIZE;
        let total_size = elements.saturating_sub(1) * stride + last;
        let packed_size = elements.max(1) * rows * columns * SCALAR_SIZE;

        let o_type_name = self.string(name);
        let offset = self.unstructured_record(&BinaryType {
            o_type_name,
            var_type: VarType::Numeric.into(),
            elements,
            total_size,
            stride,
            packed_size,
        })?;
        self.unstructured_record(&BinaryNumericType::new(layout, scalar, rows, columns, column_major))?;

        self.types.insert(
            offset,
            WrittenType {
                var_type: VarType::Numeric,
                object: None,
                elements,
                total_size,
                packed_size,
            },
        );
        Ok(offset)
    }

    pub fn object_type(&mut self, name: &str, object: ObjectType, elements: u32) -> Result<u32, ParserError> {
        let o_type_name = self.string(name);
        let offset = self.unstructured_record(&BinaryType {
            o_type_name,
            var_type: VarType::Object.into(),
            elements,
            ..Default::default()
        })?;
        self.unstructured_record(&u32::from(object))?;

        self.types.insert(
            offset,
            WrittenType {
                var_type: VarType::Object,
                object: Some(object),
                elements,
                total_size: 0,
                packed_size: 0,
            },
        );
        Ok(offset)
    }

    pub fn interface_type(&mut self, name: &str, elements: u32) -> Result<u32, ParserError> {
        let o_type_name = self.string(name);
        let offset = self.unstructured_record(&BinaryType {
            o_type_name,
            var_type: VarType::Interface.into(),
            elements,
            ..Default::default()
        })?;
        self.types.insert(
            offset,
            WrittenType {
                var_type: VarType::Interface,
                object: None,
                elements,
                total_size: 0,
                packed_size: 0,
            },
        );
        Ok(offset)
    }

    /// Lays the members out with register packing: a member starts a new register when it would
    /// straddle one, or when it is an array or a struct.
    pub fn struct_type(
        &mut self,
        name: &str,
        members: &[StructMemberSpec],
        base_class: u32,
        interfaces: &[u32],
        elements: u32,
    ) -> Result<u32, ParserError> {
        let mut records = Vec::with_capacity(members.len());
        let mut running = 0u32;
        let mut packed = 0u32;
        for member in members {
            let ty = self.types.get(&member.ty).copied().ok_or(ParserError::FormatError {
                reason: "struct member type was not written by this writer",
            })?;
            let straddles = running % REGISTER_SIZE != 0 && running % REGISTER_SIZE + ty.total_size > REGISTER_SIZE;
            if straddles || ty.elements > 0 || ty.var_type == VarType::Struct {
                running = align_to_register(running).unwrap_or(running);
            }
            let o_name = self.string(member.name);
            let o_semantic = self.optional_string(member.semantic);
            records.push(BinaryMember {
                o_name,
                o_semantic,
                offset: running,
                o_type: member.ty,
            });
            running += ty.total_size;
            packed += ty.packed_size;
        }

        let stride = align_to_register(running).unwrap_or(running);
        let total_size = elements.saturating_sub(1) * stride + running;
        let packed_size = elements.max(1) * packed;

        let o_type_name = self.string(name);
        let offset = self.unstructured_record(&BinaryType {
            o_type_name,
            var_type: VarType::Struct.into(),
            elements,
            total_size,
            stride,
            packed_size,
        })?;
        self.unstructured_record(&(records.len() as u32))?;
        for record in &records {
            self.unstructured_record(record)?;
        }
        self.unstructured_record(&base_class)?;
        self.unstructured_record(&(interfaces.len() as u32))?;
        for interface in interfaces {
            self.unstructured_record(interface)?;
        }

        self.types.insert(
            offset,
            WrittenType {
                var_type: VarType::Struct,
                object: None,
                elements,
                total_size,
                packed_size,
            },
        );
        Ok(offset)
    }

    /// Count followed by the constant records, the initializer of a `Constant` assignment.
    pub fn constants(&mut self, constants: &[BinaryConstant]) -> Result<u32, ParserError> {
        let offset = self.unstructured_record(&(constants.len() as u32))?;
        for constant in constants {
            self.unstructured_record(constant)?;
        }
        Ok(offset)
    }

    pub fn constant_index(&mut self, array: &str, index: u32) -> Result<u32, ParserError> {
        let o_array_name = self.string(array);
        self.unstructured_record(&BinaryConstantIndex { o_array_name, index })
    }

    pub fn variable_index(&mut self, array: &str, index_variable: &str) -> Result<u32, ParserError> {
        let o_array_name = self.string(array);
        let o_index_var_name = self.string(index_variable);
        self.unstructured_record(&BinaryVariableIndex {
            o_array_name,
            o_index_var_name,
        })
    }

    pub fn inline_shader(&mut self, o_shader: u32, o_so_decl: u32) -> Result<u32, ParserError> {
        self.unstructured_record(&BinaryInlineShader { o_shader, o_so_decl })
    }

    pub fn shader_data5(&mut self, data: &BinaryShaderData5) -> Result<u32, ParserError> {
        self.unstructured_record(data)
    }

    pub fn interface_initializers(&mut self, entries: &[BinaryInterfaceInitializer]) -> Result<u32, ParserError> {
        let offset = self.unstructured.len() as u32;
        for entry in entries {
            self.unstructured_record(entry)?;
        }
        Ok(offset)
    }

    /// Initializer of a `Variable` assignment, which is just the variable's name.
    pub fn variable_reference(&mut self, name: &str) -> u32 {
        self.string(name)
    }

    // --- structured stream ---

    pub fn record<T: Emittable>(&mut self, record: &T) -> Result<(), ParserError> {
        record.emit(&mut self.structured)
    }

    pub fn u32(&mut self, value: u32) -> Result<(), ParserError> {
        self.record(&value)
    }

    pub fn constant_buffer(
        &mut self,
        name: &str,
        size: u32,
        flags: CbFlags,
        variables: u32,
        explicit_bind_point: Option<u32>,
    ) -> Result<(), ParserError> {
        let o_name = self.string(name);
        self.header.effect.c_cbs += 1;
        self.record(&BinaryConstantBuffer {
            o_name,
            size,
            flags: flags.bits(),
            c_variables: variables,
            explicit_bind_point: explicit_bind_point.unwrap_or(u32::MAX),
        })
    }

    pub fn numeric_variable(
        &mut self,
        name: &str,
        ty: u32,
        semantic: Option<&str>,
        offset: u32,
        default_value: Option<u32>,
        flags: VariableFlags,
    ) -> Result<(), ParserError> {
        let o_name = self.string(name);
        let o_semantic = self.optional_string(semantic);
        self.header.effect.c_numeric_variables += 1;
        self.record(&BinaryNumericVariable {
            o_name,
            o_type: ty,
            o_semantic,
            offset,
            o_default_value: default_value.unwrap_or(0),
            flags: flags.bits(),
        })
    }

    /// Writes the variable record and accounts its elements in the matching header total. The
    /// caller writes the per-element payload and the annotations afterwards.
    pub fn object_variable(
        &mut self,
        name: &str,
        ty: u32,
        semantic: Option<&str>,
        explicit_bind_point: Option<u32>,
    ) -> Result<(), ParserError> {
        let written = self.types.get(&ty).copied().ok_or(ParserError::FormatError {
            reason: "object variable type was not written by this writer",
        })?;
        let elements = written.elements.max(1);
        self.header.effect.c_object_variables += 1;

        match written.object {
            Some(ObjectType::String) => self.header.c_strings += elements,
            Some(ObjectType::Blend) => self.header.c_blend_state_blocks += elements,
            Some(ObjectType::DepthStencil) => self.header.c_depth_stencil_blocks += elements,
            Some(ObjectType::Rasterizer) => self.header.c_rasterizer_state_blocks += elements,
            Some(ObjectType::Sampler) => self.header.c_samplers += elements,
            Some(ObjectType::RenderTargetView) => self.header.c_render_target_views += elements,
            Some(ObjectType::DepthStencilView) => self.header.c_depth_stencil_views += elements,
            Some(object) if object.is_shader() => self.header.c_total_shaders += elements,
            Some(object) if object.is_shader_resource() => self.header.c_shader_resources += elements,
            Some(object) if object.is_unordered_access_view() => self.header.c_unordered_access_views += elements,
            _ => {}
        }

        let o_name = self.string(name);
        let o_semantic = self.optional_string(semantic);
        self.record(&BinaryObjectVariable {
            o_name,
            o_type: ty,
            o_semantic,
            explicit_bind_point: explicit_bind_point.unwrap_or(u32::MAX),
        })
    }

    pub fn interface_variable(
        &mut self,
        name: &str,
        ty: u32,
        default_value: Option<u32>,
        flags: VariableFlags,
    ) -> Result<(), ParserError> {
        let elements = self.types.get(&ty).map_or(1, |written| written.elements.max(1));
        let o_name = self.string(name);
        self.header.c_interface_variables += 1;
        self.header.c_interface_variable_elements += elements;
        self.record(&BinaryInterfaceVariable {
            o_name,
            o_type: ty,
            o_default_value: default_value.unwrap_or(0),
            flags: flags.bits(),
        })
    }

    /// Registers numeric variables of a class type as class instance elements. Must be called
    /// by the author, since the variable record alone does not reveal the class.
    pub fn add_class_instance_elements(&mut self, elements: u32) {
        self.header.c_class_instance_elements += elements;
    }

    /// A state block's assignment list: count, then records.
    pub fn assignments(&mut self, assignments: &[BinaryAssignment]) -> Result<(), ParserError> {
        self.u32(assignments.len() as u32)?;
        self.assignment_records(assignments)
    }

    fn assignment_records(&mut self, assignments: &[BinaryAssignment]) -> Result<(), ParserError> {
        for assignment in assignments {
            if assignment.assignment_type == u32::from(AssignmentType::InlineShader)
                || assignment.assignment_type == u32::from(AssignmentType::InlineShader5)
            {
                self.header.c_total_shaders += 1;
                self.header.c_inline_shaders += 1;
            }
            self.record(assignment)?;
        }
        Ok(())
    }

    pub fn shader_gs_so(&mut self, o_shader: u32, o_so_decl: u32) -> Result<(), ParserError> {
        self.record(&BinaryGsSoInitializer { o_shader, o_so_decl })
    }

    pub fn annotations(&mut self, annotations: &[AnnotationSpec]) -> Result<(), ParserError> {
        self.u32(annotations.len() as u32)?;
        for annotation in annotations {
            self.record(&BinaryAnnotation {
                o_name: annotation.name,
                o_type: annotation.ty,
            })?;
            match &annotation.value {
                AnnotationValue::Strings(offsets) => {
                    for offset in offsets {
                        self.u32(*offset)?;
                    }
                }
                AnnotationValue::Numeric(offset) => self.u32(*offset)?,
            }
        }
        Ok(())
    }

    pub fn no_annotations(&mut self) -> Result<(), ParserError> {
        self.annotations(&[])
    }

    pub fn group(&mut self, name: Option<&str>, techniques: u32) -> Result<(), ParserError> {
        let o_name = self.optional_string(name);
        self.header.c_groups += 1;
        self.header.c_techniques += techniques;
        self.record(&BinaryGroup {
            o_name,
            c_techniques: techniques,
        })
    }

    pub fn technique(&mut self, name: &str, passes: u32) -> Result<(), ParserError> {
        let o_name = self.string(name);
        self.record(&BinaryTechnique { o_name, c_passes: passes })
    }

    /// Pass record, its annotations and its assignments.
    pub fn pass(
        &mut self,
        name: &str,
        annotations: &[AnnotationSpec],
        assignments: &[BinaryAssignment],
    ) -> Result<(), ParserError> {
        let o_name = self.string(name);
        self.record(&BinaryPass {
            o_name,
            c_assignments: assignments.len() as u32,
        })?;
        self.annotations(annotations)?;
        self.assignment_records(assignments)
    }
}
