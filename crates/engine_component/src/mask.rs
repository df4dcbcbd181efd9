//! Component membership masks.
//!
//! Every registered component type owns one bit ([`ComponentFlag`]). An
//! entity's [`Mask`] is the union of the flags of the components attached to
//! it, and a view's mask is the union of the flags it requires, so
//! "does entity E satisfy view V" is a subset test.
//!
//! The backing store is a growable bit-set: there is no upper bound on the
//! number of component types and no flag can ever alias another.

use std::hash::{Hash, Hasher};

use fixedbitset::FixedBitSet;
use serde::{Deserialize, Serialize};

/// The bit assigned to a component type, in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentFlag(pub u32);

impl ComponentFlag {
    /// Returns the bit index this flag occupies.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ComponentFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bit {}", self.0)
    }
}

/// A growable set of component flags.
///
/// Equality and hashing only look at the set bits, so two masks built with
/// different capacities compare equal when they hold the same flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(into = "Vec<ComponentFlag>", from = "Vec<ComponentFlag>")]
pub struct Mask(FixedBitSet);

impl Mask {
    /// Create an empty mask.
    #[must_use]
    pub fn new() -> Self {
        Self(FixedBitSet::new())
    }

    /// Build a mask holding every flag yielded by `flags`.
    pub fn from_flags<I>(flags: I) -> Self
    where
        I: IntoIterator<Item = ComponentFlag>,
    {
        let mut mask = Self::new();
        for flag in flags {
            mask.set(flag);
        }
        mask
    }

    /// Set `flag`, growing the backing storage if needed.
    pub fn set(&mut self, flag: ComponentFlag) {
        let bit = flag.index();
        if bit >= self.0.len() {
            self.0.grow(bit + 1);
        }
        self.0.insert(bit);
    }

    /// Clear `flag`. Clearing a flag beyond the current width is a no-op.
    pub fn clear(&mut self, flag: ComponentFlag) {
        let bit = flag.index();
        if bit < self.0.len() {
            self.0.set(bit, false);
        }
    }

    /// Whether `flag` is set.
    #[must_use]
    pub fn has(&self, flag: ComponentFlag) -> bool {
        self.0.contains(flag.index())
    }

    /// Whether every flag in `required` is also set here.
    #[must_use]
    pub fn contains_all(&self, required: &Mask) -> bool {
        required.0.is_subset(&self.0)
    }

    /// Whether no flag is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.ones().next().is_none()
    }

    /// Number of set flags.
    #[must_use]
    pub fn count(&self) -> usize {
        self.0.ones().count()
    }

    /// Iterate the set flags in ascending order.
    pub fn flags(&self) -> impl Iterator<Item = ComponentFlag> + '_ {
        self.0.ones().map(|bit| ComponentFlag(bit as u32))
    }
}

impl PartialEq for Mask {
    fn eq(&self, other: &Self) -> bool {
        self.0.ones().eq(other.0.ones())
    }
}

impl Eq for Mask {}

impl Hash for Mask {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for bit in self.0.ones() {
            bit.hash(state);
        }
    }
}

impl FromIterator<ComponentFlag> for Mask {
    fn from_iter<I: IntoIterator<Item = ComponentFlag>>(iter: I) -> Self {
        Self::from_flags(iter)
    }
}

impl From<Mask> for Vec<ComponentFlag> {
    fn from(mask: Mask) -> Self {
        mask.flags().collect()
    }
}

impl From<Vec<ComponentFlag>> for Mask {
    fn from(flags: Vec<ComponentFlag>) -> Self {
        Self::from_flags(flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask(bits: &[u32]) -> Mask {
        bits.iter().map(|&b| ComponentFlag(b)).collect()
    }

    #[test]
    fn test_has_set_flag() {
        let m = mask(&[0, 2]);
        assert!(m.has(ComponentFlag(2)));
        assert!(!m.has(ComponentFlag(1)));
    }

    #[test]
    fn test_clear_flag() {
        let mut m = mask(&[2]);
        m.clear(ComponentFlag(2));
        assert!(m.is_empty());
        // Clearing past the width must not panic.
        m.clear(ComponentFlag(500));
    }

    #[test]
    fn test_contains_all() {
        let entity = mask(&[0, 2]);
        assert!(entity.contains_all(&mask(&[2])));
        assert!(entity.contains_all(&Mask::new()));
        assert!(!Mask::new().contains_all(&mask(&[2])));
        assert!(Mask::new().contains_all(&Mask::new()));
    }

    #[test]
    fn test_equality_ignores_capacity() {
        let mut wide = mask(&[1, 100]);
        wide.clear(ComponentFlag(100));
        assert_eq!(wide, mask(&[1]));

        use std::collections::hash_map::DefaultHasher;
        let hash = |m: &Mask| {
            let mut h = DefaultHasher::new();
            m.hash(&mut h);
            h.finish()
        };
        assert_eq!(hash(&wide), hash(&mask(&[1])));
    }

    #[test]
    fn test_forty_flags_do_not_collide() {
        let flags: Vec<ComponentFlag> = (0..40).map(ComponentFlag).collect();
        let full: Mask = flags.iter().copied().collect();
        assert_eq!(full.count(), 40);

        let high = mask(&[39]);
        for flag in &flags[..39] {
            assert!(!high.has(*flag), "flag {flag} aliases bit 39");
        }
        assert!(full.contains_all(&high));
        assert!(!mask(&[7]).contains_all(&high));
    }

    #[test]
    fn test_serde_as_flag_list() {
        let m = mask(&[3, 0, 64]);
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json, serde_json::json!([0, 3, 64]));
        let back: Mask = serde_json::from_value(json).unwrap();
        assert_eq!(back, m);
    }
}
