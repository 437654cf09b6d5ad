use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::ParserError;

pub trait Parseable<T> {
    fn parse<R: Read>(rdr: &mut R) -> Result<T, ParserError>;
}

/// The number of bytes a record occupies on disk.
pub trait FixedSize {
    const SIZE: usize;
}

impl Parseable<u8> for u8 {
    fn parse<R: Read>(rdr: &mut R) -> Result<u8, ParserError> {
        Ok(rdr.read_u8()?)
    }
}

impl Parseable<u16> for u16 {
    fn parse<R: Read>(rdr: &mut R) -> Result<u16, ParserError> {
        Ok(rdr.read_u16::<LittleEndian>()?)
    }
}

impl Parseable<u32> for u32 {
    fn parse<R: Read>(rdr: &mut R) -> Result<u32, ParserError> {
        Ok(rdr.read_u32::<LittleEndian>()?)
    }
}

impl Parseable<i32> for i32 {
    fn parse<R: Read>(rdr: &mut R) -> Result<i32, ParserError> {
        Ok(rdr.read_i32::<LittleEndian>()?)
    }
}

impl Parseable<f32> for f32 {
    fn parse<R: Read>(rdr: &mut R) -> Result<f32, ParserError> {
        Ok(rdr.read_f32::<LittleEndian>()?)
    }
}

impl<T: Parseable<T> + Copy + Default, const N: usize> Parseable<[T; N]> for [T; N] {
    fn parse<R: Read>(rdr: &mut R) -> Result<[T; N], ParserError> {
        let mut array = [T::default(); N];
        for element in array.iter_mut() {
            *element = T::parse(rdr)?;
        }
        Ok(array)
    }
}

impl FixedSize for u8 {
    const SIZE: usize = 1;
}

impl FixedSize for u16 {
    const SIZE: usize = 2;
}

impl FixedSize for u32 {
    const SIZE: usize = 4;
}

impl FixedSize for i32 {
    const SIZE: usize = 4;
}

impl FixedSize for f32 {
    const SIZE: usize = 4;
}

impl<T: FixedSize, const N: usize> FixedSize for [T; N] {
    const SIZE: usize = T::SIZE * N;
}

/// Random access reader over an untrusted byte buffer. Every access is checked against the
/// buffer length before any byte is touched, so a malformed offset or count surfaces as
/// [`ParserError::OutOfBounds`] instead of a panic.
#[derive(Debug, Clone)]
pub struct BoundedReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BoundedReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn seek(&mut self, offset: usize) -> Result<(), ParserError> {
        if offset > self.data.len() {
            return Err(self.out_of_bounds(offset, 0));
        }
        self.position = offset;
        Ok(())
    }

    /// Reads `size` bytes at the current position and advances past them.
    pub fn read(&mut self, size: usize) -> Result<&'a [u8], ParserError> {
        let bytes = self.slice(self.position, size)?;
        self.position += size;
        Ok(bytes)
    }

    /// Reads `size` bytes at `offset`. The position ends up right behind the read bytes, so
    /// consecutive `read` calls continue from there.
    pub fn read_at(&mut self, offset: usize, size: usize) -> Result<&'a [u8], ParserError> {
        let bytes = self.slice(offset, size)?;
        self.position = offset + size;
        Ok(bytes)
    }

    /// Reads the NUL terminated string starting at `offset`.
    pub fn read_string(&mut self, offset: usize) -> Result<String, ParserError> {
        let tail = self.slice(offset, self.data.len().saturating_sub(offset))?;
        let terminator = tail
            .iter()
            .position(|&c| c == 0)
            .ok_or_else(|| self.out_of_bounds(offset, tail.len() + 1))?;

        self.position = offset + terminator + 1;
        Ok(String::from_utf8(tail[..terminator].to_vec())?)
    }

    pub fn read_u32(&mut self) -> Result<u32, ParserError> {
        self.read_record::<u32>()
    }

    pub fn read_record<T: Parseable<T> + FixedSize>(&mut self) -> Result<T, ParserError> {
        let mut bytes = self.read(T::SIZE)?;
        T::parse(&mut bytes)
    }

    pub fn read_record_at<T: Parseable<T> + FixedSize>(&mut self, offset: usize) -> Result<T, ParserError> {
        let mut bytes = self.read_at(offset, T::SIZE)?;
        T::parse(&mut bytes)
    }

    /// Reads `count` consecutive records. The whole range is bounds checked before the first
    /// record is parsed.
    pub fn read_records<T: Parseable<T> + FixedSize>(&mut self, count: u32) -> Result<Vec<T>, ParserError> {
        let size = (count as usize)
            .checked_mul(T::SIZE)
            .ok_or_else(|| self.out_of_bounds(self.position, usize::MAX))?;
        let mut bytes = self.read(size)?;

        let mut records = Vec::with_capacity(count as usize);
        for _ in 0..count {
            records.push(T::parse(&mut bytes)?);
        }
        Ok(records)
    }

    fn slice(&self, offset: usize, size: usize) -> Result<&'a [u8], ParserError> {
        let end = offset
            .checked_add(size)
            .ok_or_else(|| self.out_of_bounds(offset, size))?;
        if end > self.data.len() {
            return Err(self.out_of_bounds(offset, size));
        }
        Ok(&self.data[offset..end])
    }

    fn out_of_bounds(&self, offset: usize, size: usize) -> ParserError {
        ParserError::OutOfBounds {
            offset,
            size,
            len: self.data.len(),
        }
    }
}
