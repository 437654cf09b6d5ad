use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::ParserError;

/// Counterpart of [`crate::common::reader::Parseable`], used to produce effect binaries.
pub trait Emittable {
    fn emit<W: Write>(&self, wtr: &mut W) -> Result<(), ParserError>;
}

impl Emittable for u8 {
    fn emit<W: Write>(&self, wtr: &mut W) -> Result<(), ParserError> {
        Ok(wtr.write_u8(*self)?)
    }
}

impl Emittable for u16 {
    fn emit<W: Write>(&self, wtr: &mut W) -> Result<(), ParserError> {
        Ok(wtr.write_u16::<LittleEndian>(*self)?)
    }
}

impl Emittable for u32 {
    fn emit<W: Write>(&self, wtr: &mut W) -> Result<(), ParserError> {
        Ok(wtr.write_u32::<LittleEndian>(*self)?)
    }
}

impl Emittable for i32 {
    fn emit<W: Write>(&self, wtr: &mut W) -> Result<(), ParserError> {
        Ok(wtr.write_i32::<LittleEndian>(*self)?)
    }
}

impl Emittable for f32 {
    fn emit<W: Write>(&self, wtr: &mut W) -> Result<(), ParserError> {
        Ok(wtr.write_f32::<LittleEndian>(*self)?)
    }
}

impl<T: Emittable, const N: usize> Emittable for [T; N] {
    fn emit<W: Write>(&self, wtr: &mut W) -> Result<(), ParserError> {
        for element in self {
            element.emit(wtr)?;
        }
        Ok(())
    }
}
