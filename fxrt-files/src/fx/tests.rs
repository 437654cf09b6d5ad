use crate::ParserError;
use crate::common::reader::FixedSize;
use crate::fx::reader::{EffectBinary, UnstructuredData};
use crate::fx::types::{
    BinaryHeader, FX_4_0, FX_5_0, HEADER_SIZE, NumericLayout, ObjectType, ScalarType, TypePayload, VarType,
};
use crate::fx::writer::FxWriter;

#[test]
fn header_is_96_bytes() {
    assert_eq!(BinaryHeader::SIZE, HEADER_SIZE);
}

#[test]
fn rejects_unknown_tag() -> Result<(), anyhow::Error> {
    let data = FxWriter::new(0xDEAD_BEEF).finish()?;
    assert!(matches!(
        EffectBinary::parse(&data),
        Err(ParserError::InvalidMagicValue { magic: 0xDEAD_BEEF })
    ));
    Ok(())
}

#[test]
fn rejects_truncated_header() {
    let data = [0u8; HEADER_SIZE - 1];
    assert!(matches!(EffectBinary::parse(&data), Err(ParserError::OutOfBounds { .. })));
}

#[test]
fn rejects_pools() -> Result<(), anyhow::Error> {
    let mut writer = FxWriter::new(FX_5_0);
    writer.header_mut().pool.c_cbs = 1;
    let data = writer.finish()?;
    assert!(matches!(EffectBinary::parse(&data), Err(ParserError::NotImplemented { .. })));
    Ok(())
}

#[test]
fn rejects_more_inline_than_total_shaders() -> Result<(), anyhow::Error> {
    let mut writer = FxWriter::new(FX_4_0);
    writer.header_mut().c_inline_shaders = 2;
    writer.header_mut().c_total_shaders = 1;
    let data = writer.finish()?;
    assert!(matches!(EffectBinary::parse(&data), Err(ParserError::FormatError { .. })));
    Ok(())
}

#[test]
fn rejects_overflowing_totals() -> Result<(), anyhow::Error> {
    let mut writer = FxWriter::new(FX_4_0);
    writer.header_mut().c_samplers = u32::MAX;
    writer.header_mut().c_strings = 1;
    let data = writer.finish()?;
    assert!(matches!(EffectBinary::parse(&data), Err(ParserError::FormatError { .. })));
    Ok(())
}

#[test]
fn rejects_unstructured_size_past_end() -> Result<(), anyhow::Error> {
    let mut data = FxWriter::new(FX_4_0).finish()?;
    // cb_unstructured is the 9th field
    data[32..36].copy_from_slice(&1000u32.to_le_bytes());
    assert!(matches!(EffectBinary::parse(&data), Err(ParserError::OutOfBounds { .. })));
    Ok(())
}

#[test]
fn splits_streams() -> Result<(), anyhow::Error> {
    let mut writer = FxWriter::new(FX_5_0);
    let name = writer.string("Color");
    writer.u32(7)?;
    let data = writer.finish()?;

    let mut binary = EffectBinary::parse(&data)?;
    assert!(binary.is_fx5());
    assert_eq!(binary.version.name, "fx_5_0");
    assert_eq!(binary.unstructured.read_optional_string(name)?.as_deref(), Some("Color"));
    assert_eq!(binary.unstructured.read_optional_string(0)?, None);
    assert_eq!(binary.structured.read_u32()?, 7);
    assert_eq!(binary.structured.remaining(), 0);
    Ok(())
}

#[test]
fn reads_written_types() -> Result<(), anyhow::Error> {
    let mut writer = FxWriter::new(FX_5_0);
    let float3_array = writer.numeric_type("float3", NumericLayout::Vector, ScalarType::Float, 1, 3, false, 2)?;
    let texture = writer.object_type("Texture2D", ObjectType::Texture2D, 0)?;
    let block = writer.data_block(&[1, 2, 3]);
    let data = writer.finish()?;

    let mut binary = EffectBinary::parse(&data)?;
    let numeric = binary.unstructured.read_type(float3_array)?;
    assert_eq!(numeric.var_type, VarType::Numeric);
    assert_eq!(numeric.header.stride, 16);
    assert_eq!(numeric.header.total_size, 28);
    assert_eq!(numeric.header.packed_size, 24);
    match numeric.payload {
        TypePayload::Numeric(bits) => {
            assert_eq!(bits.rows(), 1);
            assert_eq!(bits.columns(), 3);
            assert!(!bits.is_column_major());
        }
        other => panic!("unexpected payload {other:?}"),
    }

    let object = binary.unstructured.read_type(texture)?;
    assert!(matches!(object.payload, TypePayload::Object(ObjectType::Texture2D)));

    assert_eq!(binary.unstructured.read_data_block(block)?, &[1, 2, 3]);
    Ok(())
}

#[test]
fn rejects_inconsistent_stride() -> Result<(), anyhow::Error> {
    let mut writer = FxWriter::new(FX_5_0);
    let float4 = writer.numeric_type("float4", NumericLayout::Vector, ScalarType::Float, 1, 4, false, 0)?;
    let mut data = writer.finish()?;

    // stride is the 5th word of the type record
    let stride_at = HEADER_SIZE + float4 as usize + 16;
    data[stride_at..stride_at + 4].copy_from_slice(&32u32.to_le_bytes());

    let mut binary = EffectBinary::parse(&data)?;
    assert!(matches!(
        binary.unstructured.read_type(float4),
        Err(ParserError::FormatError { .. })
    ));
    Ok(())
}
