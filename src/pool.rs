use std::collections::HashMap;

use string_interner::backend::StringBackend;
use string_interner::symbol::SymbolU32;
use string_interner::{StringInterner, Symbol};

use crate::model::{StrId, TypeId};
use crate::types::TypeDesc;

/// Load-scoped string pool. Equal strings read from different offsets share one id, and the
/// symbol index doubles as the final [`StrId`].
#[derive(Debug, Default)]
pub struct StringPool {
    interner: StringInterner<StringBackend<SymbolU32>>,
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, value: &str) -> StrId {
        let symbol = self.interner.get_or_intern(value);
        StrId::from(symbol.to_usize())
    }

    pub fn lookup(&self, value: &str) -> Option<StrId> {
        self.interner.get(value).map(|symbol| StrId::from(symbol.to_usize()))
    }

    pub fn resolve(&self, id: StrId) -> Option<&str> {
        SymbolU32::try_from_usize(id.index()).and_then(|symbol| self.interner.resolve(symbol))
    }

    pub fn len(&self) -> usize {
        self.interner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interner.is_empty()
    }

    /// All strings in id order.
    pub fn iter(&self) -> impl Iterator<Item = (StrId, &str)> {
        self.interner
            .iter()
            .map(|(symbol, value)| (StrId::from(symbol.to_usize()), value))
    }
}

/// Hash-consing pool for type descriptors. Structural equality of [`TypeDesc`] compares
/// member types by id, which is identity because members are interned first.
#[derive(Debug, Default)]
pub struct TypePool {
    types: Vec<TypeDesc>,
    interned: HashMap<TypeDesc, TypeId>,
    by_offset: HashMap<u32, TypeId>,
}

impl TypePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, desc: TypeDesc) -> TypeId {
        if let Some(id) = self.interned.get(&desc) {
            return *id;
        }
        let id = TypeId::from(self.types.len());
        self.types.push(desc.clone());
        self.interned.insert(desc, id);
        id
    }

    /// Types already read from a given unstructured offset.
    pub fn by_offset(&self, offset: u32) -> Option<TypeId> {
        self.by_offset.get(&offset).copied()
    }

    pub fn remember_offset(&mut self, offset: u32, id: TypeId) {
        self.by_offset.insert(offset, id);
    }

    pub fn get(&self, id: TypeId) -> &TypeDesc {
        &self.types[id.index()]
    }

    pub fn as_slice(&self) -> &[TypeDesc] {
        &self.types
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn into_types(self) -> Vec<TypeDesc> {
        self.types
    }
}

#[cfg(test)]
mod tests {
    use fxrt_files::fx::types::{NumericLayout, ScalarType};

    use super::*;
    use crate::types::{NumericDesc, TypeKind};

    fn float4(name: Option<StrId>) -> TypeDesc {
        TypeDesc {
            name,
            elements: 0,
            total_size: 16,
            stride: 16,
            packed_size: 16,
            kind: TypeKind::Numeric(NumericDesc {
                layout: NumericLayout::Vector,
                scalar: ScalarType::Float,
                rows: 1,
                columns: 4,
                column_major: false,
            }),
        }
    }

    #[test]
    fn strings_are_interned() {
        let mut pool = StringPool::new();
        let first = pool.intern("Color");
        let other = pool.intern("g_PS");
        assert_eq!(pool.intern("Color"), first);
        assert_ne!(first, other);
        assert_eq!(pool.resolve(other), Some("g_PS"));
        assert_eq!(pool.lookup("missing"), None);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn types_are_interned_structurally() {
        let mut strings = StringPool::new();
        let name = strings.intern("float4");

        let mut pool = TypePool::new();
        let a = pool.intern(float4(Some(name)));
        let b = pool.intern(float4(Some(name)));
        let unnamed = pool.intern(float4(None));

        assert_eq!(a, b);
        assert_ne!(a, unnamed);
        assert_eq!(pool.len(), 2);
    }
}
