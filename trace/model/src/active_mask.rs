use bitvec::field::BitField;
use bitvec::BitArr;
use serde::{Deserialize, Serialize};

/// Maximum number of threads (lanes) per warp.
pub const MAX_THREADS: usize = 64;

pub type Inner = BitArr!(for MAX_THREADS, in u64);

/// Thread active mask.
///
/// Bitmask where a 1 at position i means that lane i takes part in the current instruction.
/// Only the first `len` lanes exist; lanes beyond `len` are always inactive.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct ActiveMask {
    bits: Inner,
    len: usize,
}

impl ActiveMask {
    /// Active mask of `len` lanes with all lanes inactive.
    ///
    /// # Panics
    /// If `len` exceeds [`MAX_THREADS`].
    #[must_use]
    pub fn new(len: usize) -> Self {
        assert!(
            len <= MAX_THREADS,
            "active mask of {len} lanes exceeds {MAX_THREADS} lanes"
        );
        Self {
            bits: Inner::ZERO,
            len,
        }
    }

    /// Active mask with only the first `n` of `len` lanes active.
    #[must_use]
    pub fn first(len: usize, n: usize) -> Self {
        let mut mask = Self::new(len);
        mask.set_first(n);
        mask
    }

    /// Active mask with all `len` lanes active.
    #[must_use]
    pub fn all(len: usize) -> Self {
        Self::first(len, len)
    }

    /// Build a mask from the low `len` bits of `value`.
    #[must_use]
    pub fn from_bits(len: usize, value: u64) -> Self {
        let mut mask = Self::new(len);
        if len > 0 {
            mask.bits[..len].store_le(value);
        }
        mask
    }

    /// Number of lanes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of active lanes.
    #[must_use]
    pub fn count(&self) -> usize {
        self.bits[..self.len].count_ones()
    }

    #[must_use]
    pub fn any(&self) -> bool {
        self.bits[..self.len].any()
    }

    #[must_use]
    pub fn none(&self) -> bool {
        self.bits[..self.len].not_any()
    }

    /// # Panics
    /// If `lane` is out of bounds.
    #[must_use]
    pub fn get(&self, lane: usize) -> bool {
        assert!(lane < self.len, "lane {lane} out of bounds ({})", self.len);
        self.bits[lane]
    }

    /// # Panics
    /// If `lane` is out of bounds.
    pub fn set(&mut self, lane: usize, active: bool) {
        assert!(lane < self.len, "lane {lane} out of bounds ({})", self.len);
        self.bits.set(lane, active);
    }

    pub fn fill(&mut self, active: bool) {
        self.bits[..self.len].fill(active);
    }

    /// Activate lanes `0..n` and deactivate all others.
    pub fn set_first(&mut self, n: usize) {
        let n = n.min(self.len);
        self.bits.fill(false);
        self.bits[..n].fill(true);
    }

    /// Lanes that are active in both masks.
    #[must_use]
    pub fn intersection(mut self, other: &Self) -> Self {
        for lane in 0..self.len {
            let active = self.bits[lane] && lane < other.len && other.bits[lane];
            self.bits.set(lane, active);
        }
        self
    }

    /// Lanes that are active in `self` but not in `other`.
    #[must_use]
    pub fn difference(mut self, other: &Self) -> Self {
        for lane in 0..self.len {
            let active = self.bits[lane] && !(lane < other.len && other.bits[lane]);
            self.bits.set(lane, active);
        }
        self
    }

    /// Indices of active lanes in ascending order.
    pub fn iter_active(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits[..self.len].iter_ones()
    }

    /// Lowest active lane.
    #[must_use]
    pub fn lowest_active(&self) -> Option<usize> {
        self.bits[..self.len].first_one()
    }

    #[must_use]
    pub fn as_u64(&self) -> u64 {
        if self.len == 0 {
            return 0;
        }
        self.bits[..self.len].load_le()
    }
}

impl std::fmt::Display for ActiveMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.bits[..self.len].to_bit_string())
    }
}

impl Serialize for ActiveMask {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

struct Visitor;

impl<'de> serde::de::Visitor<'de> for Visitor {
    type Value = ActiveMask;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            formatter,
            "a string of at most {MAX_THREADS} binary digits, highest lane first"
        )
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        if value.len() > MAX_THREADS {
            return Err(E::invalid_length(value.len(), &self));
        }
        let mut mask = ActiveMask::new(value.len());
        for (lane, digit) in value.chars().rev().enumerate() {
            match digit {
                '0' => {}
                '1' => mask.set(lane, true),
                other => {
                    return Err(E::invalid_value(
                        serde::de::Unexpected::Char(other),
                        &self,
                    ))
                }
            }
        }
        Ok(mask)
    }
}

impl<'de> Deserialize<'de> for ActiveMask {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_str(Visitor)
    }
}

/// Format as a binary string.
pub trait ToBitString {
    fn to_bit_string(&self) -> String;
}

impl<A, O> ToBitString for bitvec::slice::BitSlice<A, O>
where
    A: bitvec::store::BitStore,
    O: bitvec::order::BitOrder,
{
    fn to_bit_string(&self) -> String {
        self.iter()
            .rev()
            .map(|b| if *b { "1" } else { "0" })
            .collect::<Vec<_>>()
            .join("")
    }
}

#[cfg(test)]
mod tests {
    use super::ActiveMask;
    use pretty_assertions_sorted as diff;

    #[test]
    fn test_first_lanes() {
        let mask = ActiveMask::first(4, 1);
        assert_eq!(mask.count(), 1);
        assert!(mask.get(0));
        assert!(!mask.get(1));
        assert_eq!(mask.to_string(), "0001");

        let mask = ActiveMask::first(4, 10);
        assert_eq!(mask.count(), 4);
        assert_eq!(mask.as_u64(), 0b1111);
    }

    #[test]
    fn test_set_operations() {
        let a = ActiveMask::from_bits(8, 0b1010_1100);
        let b = ActiveMask::from_bits(8, 0b0110_0110);
        assert_eq!(a.intersection(&b).as_u64(), 0b0010_0100);
        assert_eq!(a.difference(&b).as_u64(), 0b1000_1000);
        assert_eq!(a.lowest_active(), Some(2));
        assert_eq!(a.iter_active().collect::<Vec<_>>(), vec![2, 3, 5, 7]);
    }

    #[test]
    fn test_fill_stays_within_lanes() {
        let mut mask = ActiveMask::new(3);
        mask.fill(true);
        assert_eq!(mask.count(), 3);
        assert_eq!(mask.as_u64(), 0b111);
        mask.fill(false);
        assert!(mask.none());
    }

    #[test]
    fn test_serde() {
        let mask = ActiveMask::from_bits(6, 0b10_0101);
        let json = serde_json::to_string(&mask).unwrap();
        assert_eq!(json, r#""100101""#);
        let parsed: ActiveMask = serde_json::from_str(&json).unwrap();
        diff::assert_eq!(parsed, mask);
        assert!(serde_json::from_str::<ActiveMask>(r#""10a""#).is_err());
    }
}
