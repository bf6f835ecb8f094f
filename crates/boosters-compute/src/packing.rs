//! Bit-packed index streams.
//!
//! A stream is a slice of `u32` or `u64` units. With [`Packing::Bits`]`(b)`
//! each unit holds `items_per_unit = W / b` indices (`W` = unit width):
//!
//! ```text
//! sample i  ->  unit  i / items_per_unit
//!               shift (i % items_per_unit) * b
//!               value (unit >> shift) & ((1 << b) - 1)
//! ```
//!
//! The last unit may be partially filled; its unused high bits are zero.
//! [`Packing::None`] stores one raw index per unit. The layout does not depend
//! on the lane width, so one stream feeds every backend of the same unit width.

use serde::{Deserialize, Serialize};

use crate::error::{ComputeError, Result};
use crate::lanes::LaneUInt;

/// Bits-per-item selection for a packed stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Packing {
    /// One raw index per unit.
    #[default]
    None,
    /// `n` bits per index, `1 <= n <= W`.
    Bits(u32),
}

impl Packing {
    /// Smallest packing that can represent indices `0..n_bins`.
    ///
    /// ```
    /// use boosters_compute::Packing;
    ///
    /// assert_eq!(Packing::for_bins(2, 64), Packing::Bits(1));
    /// assert_eq!(Packing::for_bins(256, 64), Packing::Bits(8));
    /// assert_eq!(Packing::for_bins(257, 64), Packing::Bits(9));
    /// ```
    pub fn for_bins(n_bins: usize, uint_bits: u32) -> Self {
        let max_index = n_bins.saturating_sub(1);
        let bits = (usize::BITS - max_index.leading_zeros()).max(1);
        if bits >= uint_bits {
            Self::None
        } else {
            Self::Bits(bits)
        }
    }

    /// Check `1 <= bits <= uint_bits`.
    pub fn validate(self, uint_bits: u32) -> Result<()> {
        match self {
            Self::None => Ok(()),
            Self::Bits(bits) if bits >= 1 && bits <= uint_bits => Ok(()),
            Self::Bits(bits) => Err(ComputeError::InvalidPacking { bits, uint_bits }),
        }
    }

    /// Effective bits per item for a unit width.
    #[inline]
    pub fn bits_per_item(self, uint_bits: u32) -> u32 {
        match self {
            Self::None => uint_bits,
            Self::Bits(bits) => bits,
        }
    }

    /// Indices stored in each unit.
    ///
    /// Only meaningful for a packing that passed [`validate`](Self::validate);
    /// an out-of-range width is clamped so this never divides by zero.
    #[inline]
    pub fn items_per_unit(self, uint_bits: u32) -> usize {
        let bits = self.bits_per_item(uint_bits).clamp(1, uint_bits.max(1));
        (uint_bits / bits).max(1) as usize
    }

    /// Mask selecting one item.
    #[inline]
    pub fn mask<U: LaneUInt>(self) -> U {
        let bits = self.bits_per_item(U::BITS);
        if bits >= U::BITS {
            U::max_value()
        } else {
            (U::one() << bits as usize) - U::one()
        }
    }
}

/// Units needed to hold `n_samples` indices.
///
/// # Errors
///
/// [`ComputeError::InvalidPacking`] if the packing does not fit `uint_bits`.
pub fn packed_len(n_samples: usize, packing: Packing, uint_bits: u32) -> Result<usize> {
    packing.validate(uint_bits)?;
    Ok(n_samples.div_ceil(packing.items_per_unit(uint_bits)))
}

/// Pack `indices` into a new stream.
///
/// # Errors
///
/// [`ComputeError::InvalidPacking`] if the packing does not fit `U`, or if an
/// index does not fit in the configured bits.
pub fn pack<U: LaneUInt>(indices: &[usize], packing: Packing) -> Result<Vec<U>> {
    let mut out = vec![U::zero(); packed_len(indices.len(), packing, U::BITS)?];
    pack_into(indices, packing, &mut out)?;
    Ok(out)
}

/// Pack `indices` into a caller-provided stream, overwriting it.
pub fn pack_into<U: LaneUInt>(indices: &[usize], packing: Packing, out: &mut [U]) -> Result<()> {
    let required = packed_len(indices.len(), packing, U::BITS)?;
    let bits = packing.bits_per_item(U::BITS);
    let ipu = packing.items_per_unit(U::BITS);
    let mask = packing.mask::<U>();
    if out.len() < required {
        return Err(ComputeError::BufferTooSmall {
            buffer: "packed",
            required,
            actual: out.len(),
        });
    }

    out[..required].fill(U::zero());
    for (i, &index) in indices.iter().enumerate() {
        let value = U::from_index(index);
        if value.as_index() != index || (value & mask) != value {
            return Err(ComputeError::InvalidPacking {
                bits,
                uint_bits: U::BITS,
            });
        }
        let shift = (i % ipu) as u32 * bits;
        let unit = &mut out[i / ipu];
        *unit = *unit | (value << shift as usize);
    }
    Ok(())
}

/// Read the index of one sample.
#[inline(always)]
pub fn unpack_one<U: LaneUInt>(stream: &[U], packing: Packing, sample: usize) -> usize {
    let bits = packing.bits_per_item(U::BITS);
    let ipu = packing.items_per_unit(U::BITS);
    let shift = (sample % ipu) as u32 * bits;
    ((stream[sample / ipu] >> shift as usize) & packing.mask::<U>()).as_index()
}

/// Unpack the first `n_samples` indices of a stream.
pub fn unpack<U: LaneUInt>(stream: &[U], packing: Packing, n_samples: usize) -> Result<Vec<usize>> {
    let required = packed_len(n_samples, packing, U::BITS)?;
    if stream.len() < required {
        return Err(ComputeError::BufferTooSmall {
            buffer: "packed",
            required,
            actual: stream.len(),
        });
    }
    Ok((0..n_samples)
        .map(|i| unpack_one(stream, packing, i))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, 32)]
    #[case(3, 10)]
    #[case(5, 6)]
    #[case(32, 1)]
    fn items_per_unit_u32(#[case] bits: u32, #[case] expected: usize) {
        assert_eq!(Packing::Bits(bits).items_per_unit(32), expected);
    }

    #[test]
    fn layout_is_low_bits_first() {
        let stream = pack::<u32>(&[1, 2, 3], Packing::Bits(4)).unwrap();
        assert_eq!(stream, vec![0x321]);
        let stream = pack::<u64>(&[7, 0, 1], Packing::Bits(3)).unwrap();
        assert_eq!(stream, vec![0b001_000_111]);
    }

    #[test]
    fn partial_last_unit() {
        // 10 items per unit at 3 bits; 23 samples -> 3 units, last holds 3.
        let indices: Vec<usize> = (0..23).map(|i| i % 8).collect();
        let stream = pack::<u32>(&indices, Packing::Bits(3)).unwrap();
        assert_eq!(stream.len(), 3);
        assert_eq!(stream[2] >> 9, 0);
        assert_eq!(unpack(&stream, Packing::Bits(3), 23).unwrap(), indices);
    }

    #[test]
    fn no_packing_is_one_per_unit() {
        let indices = vec![0, 1 << 20, 5];
        let stream = pack::<u32>(&indices, Packing::None).unwrap();
        assert_eq!(stream, vec![0, 1 << 20, 5]);
        assert_eq!(unpack_one(&stream, Packing::None, 1), 1 << 20);
    }

    #[test]
    fn full_width_bits_match_none() {
        let indices = vec![u32::MAX as usize, 0, 12];
        let a = pack::<u32>(&indices, Packing::Bits(32)).unwrap();
        let b = pack::<u32>(&indices, Packing::None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_bad_packing() {
        assert!(matches!(
            pack::<u32>(&[0], Packing::Bits(33)),
            Err(ComputeError::InvalidPacking { bits: 33, uint_bits: 32 })
        ));
        assert!(Packing::Bits(0).validate(64).is_err());
        assert!(matches!(
            pack::<u32>(&[4], Packing::Bits(2)),
            Err(ComputeError::InvalidPacking { .. })
        ));
        assert!(unpack::<u64>(&[0], Packing::Bits(8), 9).is_err());
    }

    #[rstest]
    #[case(Packing::Bits(0))]
    #[case(Packing::Bits(33))]
    #[case(Packing::Bits(u32::MAX))]
    fn out_of_range_widths_are_errors(#[case] packing: Packing) {
        assert!(matches!(pack::<u32>(&[0, 1], packing), Err(ComputeError::InvalidPacking { .. })));
        assert!(matches!(packed_len(5, packing, 32), Err(ComputeError::InvalidPacking { .. })));
        assert!(matches!(unpack::<u32>(&[0], packing, 1), Err(ComputeError::InvalidPacking { .. })));
        let mut out = [0u32; 4];
        assert!(pack_into(&[0], packing, &mut out).is_err());
        assert_eq!(out, [0; 4]);
        assert!(packing.items_per_unit(32) >= 1);
    }

    #[test]
    fn for_bins_picks_minimal_width() {
        assert_eq!(Packing::for_bins(0, 32), Packing::Bits(1));
        assert_eq!(Packing::for_bins(1, 32), Packing::Bits(1));
        assert_eq!(Packing::for_bins(3, 32), Packing::Bits(2));
        assert_eq!(Packing::for_bins(1 << 31, 32), Packing::Bits(31));
        assert_eq!(Packing::for_bins(usize::MAX, 32), Packing::None);
    }

    #[test]
    fn every_width_round_trips() {
        for bits in 1..=64u32 {
            let max = if bits == 64 { usize::MAX } else { (1usize << bits) - 1 };
            let indices: Vec<usize> = (0..77).map(|i| if i % 3 == 0 { max } else { i % 2 }).collect();
            let stream = pack::<u64>(&indices, Packing::Bits(bits)).unwrap();
            assert_eq!(stream.len(), packed_len(77, Packing::Bits(bits), 64).unwrap());
            assert_eq!(unpack(&stream, Packing::Bits(bits), 77).unwrap(), indices, "bits = {bits}");
        }
    }
}
