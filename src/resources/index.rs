//! Index buffer element widths

use crate::error::{RenderError, RenderResult};

/// Unsigned integer width of index buffer elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndexFormat {
    Uint8,
    Uint16,
    Uint32,
}

impl IndexFormat {
    pub fn byte_size(&self) -> usize {
        match self {
            IndexFormat::Uint8 => 1,
            IndexFormat::Uint16 => 2,
            IndexFormat::Uint32 => 4,
        }
    }

    pub fn bits(&self) -> u32 {
        self.byte_size() as u32 * 8
    }

    /// Largest index representable at this width
    pub fn max_index(&self) -> u32 {
        match self {
            IndexFormat::Uint8 => u8::MAX as u32,
            IndexFormat::Uint16 => u16::MAX as u32,
            IndexFormat::Uint32 => u32::MAX,
        }
    }

    /// Smallest width able to address `count` elements, never narrower than
    /// `minimum`.
    pub fn for_count(minimum: IndexFormat, count: u64) -> IndexFormat {
        let required = if count < 256 {
            IndexFormat::Uint8
        } else if count < 65536 {
            IndexFormat::Uint16
        } else {
            IndexFormat::Uint32
        };
        required.max(minimum)
    }

    /// Pack `indices` into little-endian bytes of this width.
    pub fn write_indices(&self, indices: &[u32]) -> RenderResult<Vec<u8>> {
        let mut bytes = Vec::with_capacity(indices.len() * self.byte_size());
        for &index in indices {
            if index > self.max_index() {
                return Err(RenderError::IndexOutOfRange {
                    index,
                    width: self.bits(),
                });
            }
            match self {
                IndexFormat::Uint8 => bytes.push(index as u8),
                IndexFormat::Uint16 => bytes.extend_from_slice(&(index as u16).to_le_bytes()),
                IndexFormat::Uint32 => bytes.extend_from_slice(&index.to_le_bytes()),
            }
        }
        Ok(bytes)
    }
}
