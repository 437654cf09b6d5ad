use fxrt_files::fx::types::{NumericLayout, ObjectType, REGISTER_SIZE, SCALAR_SIZE, ScalarType, VarType};

use crate::error::{EffectError, malformed};
use crate::model::{StrId, TypeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NumericDesc {
    pub layout: NumericLayout,
    pub scalar: ScalarType,
    pub rows: u32,
    pub columns: u32,
    pub column_major: bool,
}

impl NumericDesc {
    /// Number of 16 byte registers one element occupies.
    pub fn registers(&self) -> u32 {
        if self.column_major { self.columns } else { self.rows }
    }

    /// Scalars per register.
    pub fn entries(&self) -> u32 {
        if self.column_major { self.rows } else { self.columns }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberDesc {
    pub name: Option<StrId>,
    pub semantic: Option<StrId>,
    pub offset: u32,
    pub ty: TypeId,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructDesc {
    pub members: Vec<MemberDesc>,
    pub base_class: Option<TypeId>,
    pub implements_interface: bool,
    pub has_super_class: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Numeric(NumericDesc),
    Object(ObjectType),
    Struct(StructDesc),
    Interface,
}

/// Interned type descriptor. Equality is structural, so two descriptors read from different
/// offsets compare equal when they describe the same type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDesc {
    pub name: Option<StrId>,
    /// 0 for non-arrays.
    pub elements: u32,
    pub total_size: u32,
    pub stride: u32,
    pub packed_size: u32,
    pub kind: TypeKind,
}

impl TypeDesc {
    pub fn var_type(&self) -> VarType {
        match self.kind {
            TypeKind::Numeric(_) => VarType::Numeric,
            TypeKind::Object(_) => VarType::Object,
            TypeKind::Struct(_) => VarType::Struct,
            TypeKind::Interface => VarType::Interface,
        }
    }

    pub fn element_count(&self) -> u32 {
        self.elements.max(1)
    }

    pub fn is_array(&self) -> bool {
        self.elements > 0
    }

    pub fn numeric(&self) -> Option<&NumericDesc> {
        match &self.kind {
            TypeKind::Numeric(numeric) => Some(numeric),
            _ => None,
        }
    }

    pub fn object_type(&self) -> Option<ObjectType> {
        match self.kind {
            TypeKind::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Numeric and struct variables live in constant buffers.
    pub fn belongs_in_constant_buffer(&self) -> bool {
        matches!(self.kind, TypeKind::Numeric(_) | TypeKind::Struct(_))
    }

    pub fn is_class_instance(&self) -> bool {
        matches!(&self.kind, TypeKind::Struct(s) if s.implements_interface)
    }

    pub fn is_integer_scalar(&self) -> bool {
        matches!(
            self.numeric(),
            Some(NumericDesc {
                scalar: ScalarType::Int | ScalarType::UInt,
                ..
            })
        )
    }
}

/// Expands a tightly packed default value into the register aligned runtime layout.
///
/// Rows of row-major matrices and vectors start on a new register, column-major matrices are
/// transposed so each column fills one register, structs recurse per element and member.
/// The number of consumed bytes must match the type's packed size.
pub fn unpack_data(types: &[TypeDesc], ty: &TypeDesc, dst: &mut [u8], src: &[u8]) -> Result<(), EffectError> {
    let read = unpack_into(types, ty, ty.element_count(), dst, 0, src, 0)?;
    if read != ty.packed_size as usize {
        return Err(malformed("default value does not match the packed size of its type"));
    }
    Ok(())
}

fn unpack_into(
    types: &[TypeDesc],
    ty: &TypeDesc,
    elements: u32,
    dst: &mut [u8],
    dst_offset: usize,
    src: &[u8],
    src_offset: usize,
) -> Result<usize, EffectError> {
    let stride = ty.stride as usize;
    let mut read = 0usize;

    match &ty.kind {
        TypeKind::Numeric(numeric) => {
            let register = REGISTER_SIZE as usize;
            let scalar = SCALAR_SIZE as usize;
            for element in 0..elements as usize {
                let base = dst_offset + element * stride;
                if numeric.column_major {
                    let (columns, rows) = (numeric.columns as usize, numeric.rows as usize);
                    for column in 0..columns {
                        for row in 0..rows {
                            let from = src_offset + read + (row * columns + column) * scalar;
                            copy_checked(dst, base + column * register + row * scalar, src, from, scalar)?;
                        }
                    }
                    read += rows * columns * scalar;
                } else {
                    let row_bytes = numeric.columns as usize * scalar;
                    for row in 0..numeric.rows as usize {
                        copy_checked(dst, base + row * register, src, src_offset + read, row_bytes)?;
                        read += row_bytes;
                    }
                }
            }
        }
        TypeKind::Struct(desc) => {
            for element in 0..elements as usize {
                for member in &desc.members {
                    let member_ty = types
                        .get(member.ty.index())
                        .ok_or_else(|| malformed("struct member refers to an unknown type"))?;
                    read += unpack_into(
                        types,
                        member_ty,
                        member_ty.element_count(),
                        dst,
                        dst_offset + element * stride + member.offset as usize,
                        src,
                        src_offset + read,
                    )?;
                }
            }
        }
        // objects and interfaces carry no numeric payload
        TypeKind::Object(_) | TypeKind::Interface => {}
    }

    Ok(read)
}

fn copy_checked(dst: &mut [u8], dst_offset: usize, src: &[u8], src_offset: usize, len: usize) -> Result<(), EffectError> {
    let source = src
        .get(src_offset..src_offset + len)
        .ok_or_else(|| malformed("default value is shorter than its type"))?;
    let target = dst
        .get_mut(dst_offset..dst_offset + len)
        .ok_or_else(|| malformed("default value does not fit its destination"))?;
    target.copy_from_slice(source);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(rows: u32, columns: u32, column_major: bool, elements: u32) -> TypeDesc {
        let desc = NumericDesc {
            layout: if rows > 1 { NumericLayout::Matrix } else { NumericLayout::Vector },
            scalar: ScalarType::Float,
            rows,
            columns,
            column_major,
        };
        let stride = desc.registers() * 16;
        let last = (desc.registers() - 1) * 16 + desc.entries() * 4;
        TypeDesc {
            name: None,
            elements,
            total_size: elements.saturating_sub(1) * stride + last,
            stride,
            packed_size: elements.max(1) * rows * columns * 4,
            kind: TypeKind::Numeric(desc),
        }
    }

    fn floats(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn read_f32(bytes: &[u8], at: usize) -> f32 {
        f32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
    }

    #[test]
    fn row_major_rows_start_new_registers() -> Result<(), EffectError> {
        let ty = numeric(2, 3, false, 0);
        let src = floats(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let mut dst = vec![0u8; 32];
        unpack_data(&[], &ty, &mut dst, &src)?;

        assert_eq!(read_f32(&dst, 0), 1.0);
        assert_eq!(read_f32(&dst, 8), 3.0);
        assert_eq!(read_f32(&dst, 12), 0.0);
        assert_eq!(read_f32(&dst, 16), 4.0);
        assert_eq!(read_f32(&dst, 24), 6.0);
        Ok(())
    }

    #[test]
    fn column_major_is_transposed() -> Result<(), EffectError> {
        let ty = numeric(2, 2, true, 0);
        // packed row by row: [[1, 2], [3, 4]]
        let src = floats(&[1.0, 2.0, 3.0, 4.0]);
        let mut dst = vec![0u8; 32];
        unpack_data(&[], &ty, &mut dst, &src)?;

        // first register holds the first column
        assert_eq!(read_f32(&dst, 0), 1.0);
        assert_eq!(read_f32(&dst, 4), 3.0);
        assert_eq!(read_f32(&dst, 16), 2.0);
        assert_eq!(read_f32(&dst, 20), 4.0);
        Ok(())
    }

    #[test]
    fn arrays_advance_by_stride() -> Result<(), EffectError> {
        let ty = numeric(1, 2, false, 2);
        let src = floats(&[1.0, 2.0, 3.0, 4.0]);
        let mut dst = vec![0u8; ty.total_size as usize];
        unpack_data(&[], &ty, &mut dst, &src)?;

        assert_eq!(read_f32(&dst, 16), 3.0);
        assert_eq!(read_f32(&dst, 20), 4.0);
        Ok(())
    }

    #[test]
    fn rejects_short_source_and_destination() {
        let ty = numeric(1, 4, false, 0);
        let mut dst = vec![0u8; 16];
        assert!(unpack_data(&[], &ty, &mut dst, &floats(&[1.0, 2.0])).is_err());

        let mut small = vec![0u8; 8];
        assert!(unpack_data(&[], &ty, &mut small, &floats(&[1.0, 2.0, 3.0, 4.0])).is_err());
    }

    #[test]
    fn structs_recurse_into_members() -> Result<(), EffectError> {
        let float2 = numeric(1, 2, false, 0);
        let members = vec![
            MemberDesc {
                name: None,
                semantic: None,
                offset: 0,
                ty: TypeId(0),
            },
            MemberDesc {
                name: None,
                semantic: None,
                offset: 8,
                ty: TypeId(0),
            },
        ];
        let pair = TypeDesc {
            name: None,
            elements: 0,
            total_size: 16,
            stride: 16,
            packed_size: 16,
            kind: TypeKind::Struct(StructDesc {
                members,
                base_class: None,
                implements_interface: false,
                has_super_class: false,
            }),
        };

        let mut dst = vec![0u8; 16];
        unpack_data(&[float2], &pair, &mut dst, &floats(&[1.0, 2.0, 3.0, 4.0]))?;
        assert_eq!(read_f32(&dst, 8), 3.0);
        assert_eq!(read_f32(&dst, 12), 4.0);
        Ok(())
    }
}
