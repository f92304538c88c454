//! Sample element types.
//!
//! The sample file itself is always host-endian `f32`. `Dtype` describes
//! the element type a `WindowSpec` presents to kernels and the wire
//! protocol after that raw data is sliced into windows. Only `f32` is
//! implemented end-to-end (plugin ABI, wire payload encoding, window
//! buffers); the enum stays open so a future fixed-point kernel path has
//! somewhere to land, but `from_wire_tag` refuses anything it can't back.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    F32,
}

impl Dtype {
    /// Size in bytes of one element on the wire / in a window buffer.
    pub const fn element_size(self) -> usize {
        match self {
            Dtype::F32 => 4,
        }
    }

    /// Numeric tag sent in the wire CONFIG frame and the plugin config struct.
    pub const fn wire_tag(self) -> u8 {
        match self {
            Dtype::F32 => 0,
        }
    }

    pub fn from_wire_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Dtype::F32),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_tag_round_trips() {
        assert_eq!(Dtype::from_wire_tag(Dtype::F32.wire_tag()), Some(Dtype::F32));
    }

    #[test]
    fn unknown_tag_is_none() {
        assert_eq!(Dtype::from_wire_tag(0xFF), None);
    }

    #[test]
    fn element_size() {
        assert_eq!(Dtype::F32.element_size(), 4);
    }
}
