use std::fmt;
use serde::{Deserialize, Serialize};
use crate::core::types::Value;

/// Largest supported prefix width.
pub const MAX_BIT_COUNT: u8 = 32;

/// A prefix over the 32-bit row-hash space: rows whose hash shares the top
/// `bit_count` bits with `value` belong to the partition holding this mask.
///
/// `build_set(n)` covers the whole space with 2^n disjoint masks in ascending
/// bit-pattern order, and every mask at width `n` is exactly the union of its
/// two children at width `n + 1`, so increasing the width only ever subdivides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionMask {
    pub bit_count: u8,
    pub value: u32,
}

impl PartitionMask {
    /// Zero-width mask matching every hash.
    pub const ALL: PartitionMask = PartitionMask { bit_count: 0, value: 0 };

    pub fn new(bit_count: u8, value: u32) -> Self {
        debug_assert!(bit_count <= MAX_BIT_COUNT);
        PartitionMask { bit_count, value }
    }

    pub fn matches(&self, hash: u32) -> bool {
        if self.bit_count == 0 {
            return true;
        }
        let shift = 32 - self.bit_count as u32;
        (hash >> shift) == (self.value >> shift)
    }

    /// Masks of width `bit_count`, ascending.
    pub fn build_set(bit_count: u8) -> Vec<PartitionMask> {
        debug_assert!(bit_count <= MAX_BIT_COUNT);
        if bit_count == 0 {
            return vec![PartitionMask::ALL];
        }
        let shift = 32 - bit_count as u32;
        (0..(1u64 << bit_count))
            .map(|prefix| PartitionMask::new(bit_count, (prefix as u32) << shift))
            .collect()
    }

    /// Position in `build_set(bit_count)` of the mask matching `hash`.
    pub fn index_of_hash(hash: u32, bit_count: u8) -> usize {
        if bit_count == 0 {
            return 0;
        }
        (hash >> (32 - bit_count as u32)) as usize
    }

    /// Position of this mask within `build_set(self.bit_count)`.
    pub fn index(&self) -> usize {
        Self::index_of_hash(self.value, self.bit_count)
    }

    /// The two masks one bit wider whose union is this mask.
    pub fn children(&self) -> [PartitionMask; 2] {
        debug_assert!(self.bit_count < MAX_BIT_COUNT);
        let width = self.bit_count + 1;
        let high_bit = 1u32 << (32 - width as u32);
        let base = self.prefix_bits();
        [
            PartitionMask::new(width, base),
            PartitionMask::new(width, base | high_bit),
        ]
    }

    // value with everything below the prefix cleared
    fn prefix_bits(&self) -> u32 {
        if self.bit_count == 0 {
            0
        } else {
            self.value & (u32::MAX << (32 - self.bit_count as u32))
        }
    }
}

impl Default for PartitionMask {
    fn default() -> Self {
        PartitionMask::ALL
    }
}

/// Renders the prefix bits, e.g. "1101" for a 4-bit mask.
impl fmt::Display for PartitionMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in 0..self.bit_count as u32 {
            let set = self.value & (1u32 << (31 - bit)) != 0;
            f.write_str(if set { "1" } else { "0" })?;
        }
        Ok(())
    }
}

/// Stable 32-bit hash of a row identity. Stable across processes, so a
/// reloaded table routes every row to the partition it was saved in.
pub fn hash_id(id: &Value) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    match id {
        Value::Null => {}
        Value::Integer(i) => hasher.update(&i.to_le_bytes()),
        Value::Float(f) => hasher.update(&f.to_bits().to_le_bytes()),
        Value::Boolean(b) => hasher.update(&[*b as u8]),
        Value::DateTime(d) => hasher.update(&d.timestamp_millis().to_le_bytes()),
        Value::Text(s) => hasher.update(s.as_bytes()),
    }
    mix(hasher.finalize())
}

// murmur3 finalizer; spreads CRC output into the high bits used for routing
fn mix(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined(masks: &[PartitionMask]) -> String {
        masks.iter().map(|m| m.to_string()).collect::<Vec<_>>().join(", ")
    }

    #[test]
    fn all_is_zero_and_matches_everything() {
        let mask = PartitionMask::ALL;
        assert_eq!(mask.bit_count, 0);
        assert_eq!(mask.value, 0);
        assert!(mask.matches(0));
        assert!(mask.matches(!0));
        assert_eq!(mask.to_string(), "");
    }

    #[test]
    fn four_bit_mask_matches_prefix_only() {
        let mask = PartitionMask::new(4, 0xD << 28);
        assert!(!mask.matches(0));
        assert!(!mask.matches(!0));
        assert!(!mask.matches(0xC000_0000));
        assert!(mask.matches(0xD000_0000));
        assert!(mask.matches(0xD777_7777));
        assert!(!mask.matches(0xE000_0000));
        assert!(!mask.matches(0xF000_0000));
        assert!(!mask.matches(0x7FFF_FFFF));
        assert_eq!(mask.to_string(), "1101");
    }

    #[test]
    fn two_bit_mask_matches_prefix_only() {
        let mask = PartitionMask::new(2, 0x3 << 30);
        assert!(!mask.matches(0));
        assert!(mask.matches(!0));
        assert!(!mask.matches(0x8000_0000));
        assert!(mask.matches(0xC000_0000));
        assert!(mask.matches(0xE000_0000));
        assert!(!mask.matches(0x7FFF_FFFF));
        assert_eq!(mask.to_string(), "11");
    }

    #[test]
    fn one_bit_masks_split_on_top_bit() {
        let zero = PartitionMask::new(1, 0);
        assert!(zero.matches(0));
        assert!(zero.matches(0x7FFF_FFFF));
        assert!(!zero.matches(0x8000_0000));
        assert_eq!(zero.to_string(), "0");

        let one = PartitionMask::new(1, 1 << 31);
        assert!(one.matches(!0));
        assert!(one.matches(0x8000_0000));
        assert!(!one.matches(0x7FFF_FFFF));
        assert_eq!(one.to_string(), "1");
    }

    #[test]
    fn build_set_is_ascending() {
        assert_eq!(joined(&PartitionMask::build_set(0)), "");
        assert_eq!(joined(&PartitionMask::build_set(1)), "0, 1");
        assert_eq!(joined(&PartitionMask::build_set(2)), "00, 01, 10, 11");
    }

    #[test]
    fn build_set_covers_space_exactly_once() {
        let samples: Vec<u32> = (0..2_000u32)
            .map(|i| i.wrapping_mul(2_654_435_761))
            .chain([0, 1, u32::MAX, 0x8000_0000, 0x7FFF_FFFF])
            .collect();

        for bits in 0..=8u8 {
            let set = PartitionMask::build_set(bits);
            assert_eq!(set.len(), 1 << bits);
            for &hash in &samples {
                let matching: Vec<usize> = set
                    .iter()
                    .enumerate()
                    .filter(|(_, m)| m.matches(hash))
                    .map(|(i, _)| i)
                    .collect();
                assert_eq!(matching.len(), 1, "hash {hash:#x} at {bits} bits");
                assert_eq!(matching[0], PartitionMask::index_of_hash(hash, bits));
            }
        }
    }

    #[test]
    fn children_subdivide_parent() {
        for bits in 0..6u8 {
            for parent in PartitionMask::build_set(bits) {
                let children = parent.children();
                for hash in (0..512u32).map(|i| i.wrapping_mul(0x9E37_79B9)) {
                    let in_children = children.iter().filter(|c| c.matches(hash)).count();
                    if parent.matches(hash) {
                        assert_eq!(in_children, 1);
                    } else {
                        assert_eq!(in_children, 0);
                    }
                }
            }
        }
    }

    #[test]
    fn index_of_hash_reads_high_bits() {
        let bit_count = 2u8;
        assert_eq!(joined(&PartitionMask::build_set(bit_count)), "00, 01, 10, 11");
        for b in 0..u8::MAX {
            let hash = (b as u32) << 24;
            let expected = (b >> (8 - bit_count)) as usize;
            assert_eq!(PartitionMask::index_of_hash(hash, bit_count), expected);
        }
    }

    #[test]
    fn id_hash_is_stable() {
        assert_eq!(hash_id(&Value::Integer(42)), hash_id(&Value::Integer(42)));
        assert_ne!(hash_id(&Value::Integer(1)), hash_id(&Value::Integer(2)));
        assert_ne!(hash_id(&Value::from("a")), hash_id(&Value::from("A")));
    }
}
