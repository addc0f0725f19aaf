//! Set of network types.
//!
//! Internally a set is a bitmask over [`NetworkType`] bits, but callers work
//! with set operations; the raw `u8` encoding only appears at the boundary
//! through [`NetworkSet::bits`] / [`NetworkSet::from_bits`] and serde.

use core::fmt;

use serde::{Deserialize, Serialize};

use super::NetworkType;
use crate::error::NmError;

/// A set of network types.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct NetworkSet(u8);

impl NetworkSet {
    /// Bits owned by some network type.
    const KNOWN_BITS: u8 = 0b0001_1111;

    pub const EMPTY: Self = Self(0);
    pub const ALL: Self = Self(Self::KNOWN_BITS);

    pub const fn single(network: NetworkType) -> Self {
        Self(network.bit())
    }

    /// Decode a boundary bitmask.  Returns `None` if any bit is not owned by
    /// a network type.
    pub const fn from_bits(bits: u8) -> Option<Self> {
        if bits & !Self::KNOWN_BITS != 0 {
            None
        } else {
            Some(Self(bits))
        }
    }

    /// Decode a boundary bitmask, dropping unknown bits.
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::KNOWN_BITS)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub const fn contains(self, network: NetworkType) -> bool {
        self.0 & network.bit() != 0
    }

    pub const fn is_subset_of(self, other: Self) -> bool {
        self.0 & !other.0 == 0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    pub const fn with(self, network: NetworkType) -> Self {
        Self(self.0 | network.bit())
    }

    pub fn insert(&mut self, network: NetworkType) {
        self.0 |= network.bit();
    }

    pub fn remove(&mut self, network: NetworkType) {
        self.0 &= !network.bit();
    }

    /// The only member, if the set holds exactly one type.
    pub const fn as_single(self) -> Option<NetworkType> {
        NetworkType::from_bit(self.0)
    }

    /// Members in ascending bit order.
    pub fn iter(self) -> impl Iterator<Item = NetworkType> {
        NetworkType::ALL.into_iter().filter(move |t| self.contains(*t))
    }
}

impl From<NetworkType> for NetworkSet {
    fn from(network: NetworkType) -> Self {
        Self::single(network)
    }
}

impl From<NetworkSet> for u8 {
    fn from(set: NetworkSet) -> u8 {
        set.bits()
    }
}

impl TryFrom<u8> for NetworkSet {
    type Error = NmError;

    fn try_from(bits: u8) -> Result<Self, NmError> {
        Self::from_bits(bits).ok_or(NmError::Invalid)
    }
}

impl FromIterator<NetworkType> for NetworkSet {
    fn from_iter<I: IntoIterator<Item = NetworkType>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

impl core::ops::BitOr for NetworkSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl core::ops::BitOr<NetworkType> for NetworkSet {
    type Output = Self;

    fn bitor(self, rhs: NetworkType) -> Self {
        self.with(rhs)
    }
}

impl core::ops::BitOr for NetworkType {
    type Output = NetworkSet;

    fn bitor(self, rhs: Self) -> NetworkSet {
        NetworkSet::single(self).with(rhs)
    }
}

impl fmt::Debug for NetworkSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for NetworkSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        for (i, t) in self.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            f.write_str(t.name())?;
        }
        Ok(())
    }
}
