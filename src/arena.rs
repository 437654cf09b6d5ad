use crate::error::{EffectError, malformed};

/// Every allocation starts on this boundary.
pub const ARENA_ALIGNMENT: usize = 8;

/// Location of one allocation inside a [`ByteArena`]. Handles stay valid for the lifetime of
/// the arena that produced them, growing the arena never moves an allocation's offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ArenaHandle {
    offset: u32,
    len: u32,
}

impl ArenaHandle {
    pub fn offset(&self) -> usize {
        self.offset as usize
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, position: usize) -> bool {
        position >= self.offset() && position < self.offset() + self.len()
    }

    /// Sub-range `[start, start + len)` of this allocation.
    pub fn slice(&self, start: usize, len: usize) -> Option<ArenaHandle> {
        let end = start.checked_add(len)?;
        if end > self.len() {
            return None;
        }
        Some(ArenaHandle {
            offset: self.offset + start as u32,
            len: len as u32,
        })
    }
}

/// Append-only byte storage. During loading it grows freely as scratch space; final storage is
/// created with [`ByteArena::reserve`] at the exact size computed up front and must end up
/// filled to the byte, which [`ByteArena::finish`] asserts.
#[derive(Debug, Clone, Default)]
pub struct ByteArena {
    data: Vec<u8>,
    reserved: Option<usize>,
}

impl ByteArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// The space one allocation of `len` bytes consumes, padding included.
    pub fn padded_size(len: usize) -> usize {
        len.div_ceil(ARENA_ALIGNMENT) * ARENA_ALIGNMENT
    }

    /// Switches an empty arena to exact accounting. Allocations past `exact_size` fail.
    pub fn reserve(&mut self, exact_size: usize) -> Result<(), EffectError> {
        if !self.data.is_empty() || self.reserved.is_some() {
            return Err(EffectError::InvalidCall {
                reason: "an arena can only be reserved once, while it is empty".to_string(),
            });
        }
        self.data
            .try_reserve_exact(exact_size)
            .map_err(|_| malformed("arena reservation exceeds the available memory"))?;
        self.reserved = Some(exact_size);
        Ok(())
    }

    pub fn append(&mut self, bytes: &[u8]) -> Result<ArenaHandle, EffectError> {
        let handle = self.allocate_raw(bytes.len())?;
        self.get_mut(handle).copy_from_slice(bytes);
        Ok(handle)
    }

    /// Allocates `size` zeroed bytes.
    pub fn allocate_raw(&mut self, size: usize) -> Result<ArenaHandle, EffectError> {
        let offset = self.data.len();
        let padded = Self::padded_size(size);
        let end = offset
            .checked_add(padded)
            .ok_or_else(|| malformed("arena allocation overflows"))?;

        match self.reserved {
            Some(reserved) if end > reserved => {
                return Err(EffectError::LayoutMismatch { reserved, filled: end });
            }
            _ => {}
        }
        if end > u32::MAX as usize {
            return Err(malformed("arena exceeds 4 GiB"));
        }

        self.data.resize(end, 0);
        Ok(ArenaHandle {
            offset: offset as u32,
            len: size as u32,
        })
    }

    /// Checks that a reserved arena was filled exactly.
    pub fn finish(&self) -> Result<(), EffectError> {
        match self.reserved {
            Some(reserved) if reserved != self.data.len() => Err(EffectError::LayoutMismatch {
                reserved,
                filled: self.data.len(),
            }),
            _ => Ok(()),
        }
    }

    pub fn get(&self, handle: ArenaHandle) -> &[u8] {
        &self.data[handle.offset()..handle.offset() + handle.len()]
    }

    pub fn get_mut(&mut self, handle: ArenaHandle) -> &mut [u8] {
        &mut self.data[handle.offset()..handle.offset() + handle.len()]
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_reservation_is_checked() -> Result<(), EffectError> {
        let mut arena = ByteArena::new();
        arena.reserve(ByteArena::padded_size(3) + ByteArena::padded_size(8))?;

        let first = arena.append(&[1, 2, 3])?;
        assert!(matches!(arena.finish(), Err(EffectError::LayoutMismatch { .. })));

        let second = arena.allocate_raw(8)?;
        arena.finish()?;

        assert_eq!(arena.get(first), &[1, 2, 3]);
        assert_eq!(second.offset(), ARENA_ALIGNMENT);
        assert!(arena.get(second).iter().all(|b| *b == 0));
        assert!(matches!(arena.append(&[0]), Err(EffectError::LayoutMismatch { .. })));
        Ok(())
    }

    #[test]
    fn handles_survive_growth() -> Result<(), EffectError> {
        let mut arena = ByteArena::new();
        let handle = arena.append(b"Color")?;
        for _ in 0..64 {
            arena.allocate_raw(100)?;
        }
        assert_eq!(arena.get(handle), b"Color");
        Ok(())
    }
}
