//! Change action flags.
//!
//! A change may carry several flags at once (`ADD | TEMPORARY` is the usual
//! shape of a preview). On the wire the set is the integer bitmask.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

bitflags! {
    /// What a [`Change`](crate::Change) does to the entity it names.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ChangeAction: u32 {
        const ADD       = 1 << 0;
        const REMOVE    = 1 << 1;
        const TRANSFORM = 1 << 2;
        const UPDATE    = 1 << 3;
        const LOCKED    = 1 << 4;
        const UNLOCKED  = 1 << 5;
        const TEMPORARY = 1 << 6;
        const RELEASE   = 1 << 7;
    }
}

impl ChangeAction {
    /// `true` when the change is a provisional preview.
    #[inline]
    pub fn is_temporary(&self) -> bool {
        self.contains(Self::TEMPORARY)
    }

    /// Copy of `self` with `flag` set.
    #[inline]
    pub fn with(self, flag: ChangeAction) -> Self {
        self.union(flag)
    }

    /// Copy of `self` with `flag` cleared.
    #[inline]
    pub fn without(self, flag: ChangeAction) -> Self {
        self.difference(flag)
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NONE");
        }
        let mut first = true;
        for (name, _) in self.iter_names() {
            if !first {
                write!(f, "|")?;
            }
            write!(f, "{name}")?;
            first = false;
        }
        Ok(())
    }
}

impl Serialize for ChangeAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.bits())
    }
}

impl<'de> Deserialize<'de> for ChangeAction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u32::deserialize(deserializer)?;
        // Bits from newer clients we do not understand are dropped.
        Ok(ChangeAction::from_bits_truncate(bits))
    }
}
