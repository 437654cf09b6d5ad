use thiserror::Error;

/// Output buffer slots a geometry shader can stream to.
pub const SO_BUFFER_SLOT_COUNT: usize = 4;
pub const SO_MAX_ENTRIES: usize = 512;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SoDeclError {
    #[error("invalid output slot in {0:?}")]
    InvalidSlot(String),
    #[error("invalid component mask in {0:?}")]
    InvalidMask(String),
    #[error("missing semantic name in {0:?}")]
    MissingSemantic(String),
    #[error("stream output declaration has more than {SO_MAX_ENTRIES} entries")]
    TooManyEntries,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoEntry {
    pub stream: u32,
    /// `None` for `$SKIP` gaps.
    pub semantic_name: Option<String>,
    pub semantic_index: u32,
    pub start_component: u8,
    pub component_count: u8,
    pub output_slot: u8,
}

/// A parsed stream output declaration, ready for shader creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOutDecl {
    pub entries: Vec<SoEntry>,
    /// Bytes per vertex written to each output slot.
    pub strides: [u32; SO_BUFFER_SLOT_COUNT],
    pub rasterized_stream: u32,
}

/// Parses one declaration string per stream. Entries are separated by `;` and look like
/// `[slot:]SEMANTIC[index][.mask]`, e.g. `1:TEXCOORD2.xy`; `$SKIP.xyz` leaves a gap.
pub fn parse_stream_out(streams: &[(u32, &str)], rasterized_stream: u32) -> Result<StreamOutDecl, SoDeclError> {
    let mut entries = Vec::new();
    let mut strides = [0u32; SO_BUFFER_SLOT_COUNT];

    for (stream, decl) in streams {
        for raw in decl.split(';').map(str::trim).filter(|raw| !raw.is_empty()) {
            let entry = parse_entry(*stream, raw)?;
            strides[entry.output_slot as usize] += u32::from(entry.component_count) * 4;
            entries.push(entry);
            if entries.len() > SO_MAX_ENTRIES {
                return Err(SoDeclError::TooManyEntries);
            }
        }
    }

    Ok(StreamOutDecl {
        entries,
        strides,
        rasterized_stream,
    })
}

fn parse_entry(stream: u32, raw: &str) -> Result<SoEntry, SoDeclError> {
    let (output_slot, rest) = match raw.split_once(':') {
        Some((slot, rest)) => {
            let slot = slot
                .trim()
                .parse::<u8>()
                .ok()
                .filter(|slot| (*slot as usize) < SO_BUFFER_SLOT_COUNT)
                .ok_or_else(|| SoDeclError::InvalidSlot(raw.to_string()))?;
            (slot, rest.trim())
        }
        None => (0, raw),
    };

    let (semantic, mask) = match rest.split_once('.') {
        Some((semantic, mask)) => (semantic.trim(), Some(mask.trim())),
        None => (rest, None),
    };

    let (start_component, component_count) = match mask {
        Some(mask) => parse_mask(mask).ok_or_else(|| SoDeclError::InvalidMask(raw.to_string()))?,
        None => (0, 4),
    };

    if semantic.eq_ignore_ascii_case("$SKIP") {
        return Ok(SoEntry {
            stream,
            semantic_name: None,
            semantic_index: 0,
            start_component,
            component_count,
            output_slot,
        });
    }

    let digits = semantic.len() - semantic.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    let (name, index) = semantic.split_at(semantic.len() - digits);
    if name.is_empty() || name.starts_with('$') {
        return Err(SoDeclError::MissingSemantic(raw.to_string()));
    }
    let semantic_index = if index.is_empty() {
        0
    } else {
        index.parse().map_err(|_| SoDeclError::MissingSemantic(raw.to_string()))?
    };

    Ok(SoEntry {
        stream,
        semantic_name: Some(name.to_string()),
        semantic_index,
        start_component,
        component_count,
        output_slot,
    })
}

/// `xyzw` or `rgba` letters, contiguous and in order.
fn parse_mask(mask: &str) -> Option<(u8, u8)> {
    let components = mask
        .chars()
        .map(|c| match c.to_ascii_lowercase() {
            'x' | 'r' => Some(0u8),
            'y' | 'g' => Some(1),
            'z' | 'b' => Some(2),
            'w' | 'a' => Some(3),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;

    let first = *components.first()?;
    let contiguous = components.iter().enumerate().all(|(i, c)| *c == first + i as u8);
    contiguous.then_some((first, components.len() as u8))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_slots_masks_and_indices() -> Result<(), SoDeclError> {
        let decl = parse_stream_out(&[(0, "SV_POSITION.xyzw; 1:TEXCOORD2.xy;$SKIP.z;")], 0)?;

        assert_eq!(decl.entries.len(), 3);
        assert_eq!(decl.entries[0].semantic_name.as_deref(), Some("SV_POSITION"));
        assert_eq!(decl.entries[0].semantic_index, 0);

        let texcoord = &decl.entries[1];
        assert_eq!(texcoord.semantic_name.as_deref(), Some("TEXCOORD"));
        assert_eq!(texcoord.semantic_index, 2);
        assert_eq!(texcoord.output_slot, 1);
        assert_eq!((texcoord.start_component, texcoord.component_count), (0, 2));

        let skip = &decl.entries[2];
        assert_eq!(skip.semantic_name, None);
        assert_eq!((skip.start_component, skip.component_count), (2, 1));

        assert_eq!(decl.strides, [20, 8, 0, 0]);
        Ok(())
    }

    #[test]
    fn streams_are_tagged() -> Result<(), SoDeclError> {
        let decl = parse_stream_out(&[(0, "POSITION.xyz"), (2, "COLOR.rgba")], 2)?;
        assert_eq!(decl.entries[1].stream, 2);
        assert_eq!(decl.rasterized_stream, 2);
        Ok(())
    }

    #[test]
    fn rejects_bad_entries() {
        assert!(matches!(
            parse_stream_out(&[(0, "4:POSITION")], 0),
            Err(SoDeclError::InvalidSlot(_))
        ));
        assert!(matches!(
            parse_stream_out(&[(0, "POSITION.xz")], 0),
            Err(SoDeclError::InvalidMask(_))
        ));
        assert!(matches!(
            parse_stream_out(&[(0, "0.xy")], 0),
            Err(SoDeclError::MissingSemantic(_))
        ));
    }
}
