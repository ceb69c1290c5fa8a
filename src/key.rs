//! Opaque variable identifiers.

use std::fmt::{self, Display};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const CHR_BITS: u32 = 8;
const INDEX_BITS: u32 = u64::BITS - CHR_BITS;
const INDEX_MASK: u64 = (1 << INDEX_BITS) - 1;

/// Identifier of a variable or a dual variable.
///
/// Plain integers and `(char, index)` symbols share one `u64` space: a symbol
/// stores its ASCII character in the top 8 bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Key(pub u64);

impl Key {
    /// Build a symbolic key such as `x3` or `l0`.
    ///
    /// Panics if `chr` is not ASCII or `index` does not fit in 56 bits.
    pub fn symbol(chr: char, index: u64) -> Self {
        assert!(chr.is_ascii(), "symbol character must be ASCII");
        assert!(index <= INDEX_MASK, "symbol index out of range");
        Key(((chr as u64) << INDEX_BITS) | index)
    }

    /// Character part of a symbolic key, if this key is one.
    pub fn chr(&self) -> Option<char> {
        let c = (self.0 >> INDEX_BITS) as u8;
        if c.is_ascii_graphic() {
            Some(c as char)
        } else {
            None
        }
    }

    /// Index part of a symbolic key, or the raw value otherwise.
    pub fn index(&self) -> u64 {
        match self.chr() {
            Some(_) => self.0 & INDEX_MASK,
            None => self.0,
        }
    }
}

impl From<u64> for Key {
    fn from(raw: u64) -> Self {
        Key(raw)
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.chr() {
            Some(c) => write!(f, "{}{}", c, self.index()),
            None => write!(f, "{}", self.0),
        }
    }
}
