use log::trace;

use crate::ParserError;
use crate::common::reader::BoundedReader;
use crate::fx::types::{
    BinaryHeader, BinaryMember, BinaryNumericType, BinaryType, EffectVersion, HEADER_SIZE, NumericLayout,
    ObjectType, REGISTER_SIZE, ScalarType, TypePayload, TypeRecord, VarType, align_to_register, find_version,
};

/// A compiled effect split into its two streams. Both readers borrow the caller's buffer.
#[derive(Debug)]
pub struct EffectBinary<'a> {
    pub header: BinaryHeader,
    pub version: &'static EffectVersion,
    /// Offset addressed blob, offset 0 is the first byte behind the header.
    pub unstructured: BoundedReader<'a>,
    /// Sequential record stream, positioned at its first record.
    pub structured: BoundedReader<'a>,
}

impl<'a> EffectBinary<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, ParserError> {
        let mut rdr = BoundedReader::new(data);
        let header: BinaryHeader = rdr.read_record()?;

        let version = find_version(header.tag).ok_or(ParserError::InvalidMagicValue { magic: header.tag })?;

        if !header.pool.is_empty() {
            return Err(ParserError::NotImplemented {
                reason: "effect pools are not supported",
            });
        }

        if header.c_inline_shaders > header.c_total_shaders {
            return Err(ParserError::FormatError {
                reason: "more inline shaders than shaders in total",
            });
        }

        Self::check_totals(&header)?;

        let structured_start = (header.cb_unstructured as usize)
            .checked_add(HEADER_SIZE)
            .ok_or(ParserError::FormatError {
                reason: "unstructured data size overflows",
            })?;
        let unstructured = BoundedReader::new(rdr.read_at(HEADER_SIZE, header.cb_unstructured as usize)?);
        rdr.seek(structured_start)?;

        trace!(
            "{} effect: {} bytes unstructured, {} bytes structured",
            version.name,
            header.cb_unstructured,
            rdr.remaining()
        );

        Ok(Self {
            header,
            version,
            unstructured,
            structured: rdr,
        })
    }

    /// Rejects headers whose per-category totals overflow when summed, before anything is
    /// allocated based on them.
    fn check_totals(header: &BinaryHeader) -> Result<(), ParserError> {
        let overflow = ParserError::FormatError {
            reason: "variable counts overflow",
        };

        let object_blocks = [
            header.c_strings,
            header.c_shader_resources,
            header.c_depth_stencil_blocks,
            header.c_blend_state_blocks,
            header.c_rasterizer_state_blocks,
            header.c_samplers,
            header.c_render_target_views,
            header.c_depth_stencil_views,
            header.c_total_shaders,
            header.c_unordered_access_views,
            header.c_interface_variable_elements,
            header.c_class_instance_elements,
        ];
        object_blocks
            .iter()
            .try_fold(0u32, |acc, count| acc.checked_add(*count))
            .ok_or(overflow)?;

        let variables = [
            header.effect.c_numeric_variables,
            header.effect.c_object_variables,
            header.c_interface_variables,
        ];
        variables
            .iter()
            .try_fold(0u32, |acc, count| acc.checked_add(*count))
            .ok_or(ParserError::FormatError {
                reason: "variable counts overflow",
            })?;

        Ok(())
    }

    pub fn is_fx5(&self) -> bool {
        self.version.version >= 0x50
    }
}

/// Accessors into the unstructured blob, where offset 0 means "absent".
pub trait UnstructuredData<'a> {
    /// `None` for offset 0, otherwise the string at `offset`.
    fn read_optional_string(&mut self, offset: u32) -> Result<Option<String>, ParserError>;

    /// A length prefixed byte block. A zero length yields an empty slice.
    fn read_data_block(&mut self, offset: u32) -> Result<&'a [u8], ParserError>;

    /// Reads and sanity checks the type record at `offset`.
    fn read_type(&mut self, offset: u32) -> Result<TypeRecord, ParserError>;
}

impl<'a> UnstructuredData<'a> for BoundedReader<'a> {
    fn read_optional_string(&mut self, offset: u32) -> Result<Option<String>, ParserError> {
        if offset == 0 {
            return Ok(None);
        }
        self.read_string(offset as usize).map(Some)
    }

    fn read_data_block(&mut self, offset: u32) -> Result<&'a [u8], ParserError> {
        let size: u32 = self.read_record_at(offset as usize)?;
        self.read(size as usize)
    }

    fn read_type(&mut self, offset: u32) -> Result<TypeRecord, ParserError> {
        let header: BinaryType = self.read_record_at(offset as usize)?;
        let var_type = VarType::try_from(header.var_type).map_err(|_| ParserError::FormatError {
            reason: "invalid variable type",
        })?;

        check_type_sizes(&header)?;

        let payload = match var_type {
            VarType::Numeric => {
                let numeric: BinaryNumericType = self.read_record()?;
                check_numeric(&numeric)?;
                TypePayload::Numeric(numeric)
            }
            VarType::Object => {
                let tag = self.read_u32()?;
                let object = ObjectType::try_from(tag).map_err(|_| ParserError::FormatError {
                    reason: "invalid object type",
                })?;
                TypePayload::Object(object)
            }
            VarType::Struct => {
                let count = self.read_u32()?;
                let members = self.read_records::<BinaryMember>(count)?;
                let o_base_class = self.read_u32()?;
                let interface_count = self.read_u32()?;
                let interfaces = self.read_records::<u32>(interface_count)?;
                TypePayload::Struct {
                    members,
                    o_base_class,
                    interfaces,
                }
            }
            VarType::Interface => TypePayload::Interface,
        };

        Ok(TypeRecord {
            header,
            var_type,
            payload,
        })
    }
}

fn check_type_sizes(ty: &BinaryType) -> Result<(), ParserError> {
    let elements = ty.elements.max(1);

    let aligned_total = align_to_register(ty.total_size).ok_or(ParserError::FormatError {
        reason: "type size overflows",
    })?;
    let strided = elements.checked_mul(ty.stride).ok_or(ParserError::FormatError {
        reason: "type size overflows",
    })?;

    if strided != aligned_total {
        return Err(ParserError::FormatError {
            reason: "type stride does not match its total size",
        });
    }
    if ty.stride % REGISTER_SIZE != 0 {
        return Err(ParserError::FormatError {
            reason: "type stride is not register aligned",
        });
    }
    if ty.packed_size > ty.total_size {
        return Err(ParserError::FormatError {
            reason: "packed size exceeds total size",
        });
    }
    if ty.packed_size % elements != 0 {
        return Err(ParserError::FormatError {
            reason: "packed size is not a multiple of the element count",
        });
    }
    Ok(())
}

fn check_numeric(numeric: &BinaryNumericType) -> Result<(), ParserError> {
    let layout = NumericLayout::try_from(numeric.layout()).map_err(|_| ParserError::FormatError {
        reason: "invalid numeric layout",
    })?;
    ScalarType::try_from(numeric.scalar_type()).map_err(|_| ParserError::FormatError {
        reason: "invalid scalar type",
    })?;
    if !(1..=4).contains(&numeric.rows()) || !(1..=4).contains(&numeric.columns()) {
        return Err(ParserError::FormatError {
            reason: "numeric rows and columns must be within 1..=4",
        });
    }
    if numeric.is_column_major() && layout != NumericLayout::Matrix {
        return Err(ParserError::FormatError {
            reason: "only matrices can be column major",
        });
    }
    Ok(())
}
