//! Backend-agnostic kernels.
//!
//! Every kernel is generic over `F: FloatLanes` and takes typed arguments
//! (`T = F::Scalar`, `U` = the paired index type). The dispatch layer
//! downcasts width-erased requests, validates extents and calls in here.
//!
//! # Sample walk
//!
//! Kernels that read one packed stream share [`walk_samples`]. Whole groups
//! of `LANES` consecutive units are loaded at once; item `p` of every unit in
//! the group is unpacked with one shift and mask, giving `LANES` samples at
//! stride `items_per_unit`. Samples past the last whole group (including a
//! partially filled final unit) are visited one at a time.

mod apply_update;
mod bin_sums;

pub use apply_update::{apply_update, MetricSum, TargetValues, UpdateArgs, UpdateBuffers};
pub use bin_sums::{bin_sums_boosting, bin_sums_interaction, BoostingArgs, DimensionArgs, InteractionArgs};

use num_traits::Zero;

use crate::lanes::{FloatLanes, IndexOf, LaneUInt, UIntLanes};
use crate::packing::{unpack_one, Packing};

/// Maximum dimensions of one interaction request.
pub const MAX_DIMENSIONS: usize = 30;

/// Per-sample body of a kernel.
pub(crate) trait SampleVisitor<F: FloatLanes> {
    /// `samples[l]` is the sample index of lane `l`, `slots[l]` its unpacked index.
    fn group(&mut self, samples: F::UInt, slots: F::UInt);

    fn single(&mut self, sample: usize, slot: usize);
}

/// Visit every sample in `0..n_samples` exactly once.
///
/// With no stream, every sample gets slot 0.
#[inline(always)]
pub(crate) fn walk_samples<F, V>(
    n_samples: usize,
    packing: Packing,
    packed: Option<&[IndexOf<F>]>,
    visitor: &mut V,
) where
    F: FloatLanes,
    V: SampleVisitor<F>,
{
    let lanes = F::LANES;
    let iota = F::UInt::iota();

    let Some(stream) = packed else {
        let zero = F::UInt::splat(IndexOf::<F>::zero());
        let whole = n_samples - n_samples % lanes;
        for base in (0..whole).step_by(lanes) {
            visitor.group(iota + F::UInt::splat(IndexOf::<F>::from_index(base)), zero);
        }
        for sample in whole..n_samples {
            visitor.single(sample, 0);
        }
        return;
    };

    let uint_bits = <IndexOf<F> as LaneUInt>::BITS;
    let bits = packing.bits_per_item(uint_bits);
    let ipu = packing.items_per_unit(uint_bits);
    let mask = F::UInt::splat(packing.mask::<IndexOf<F>>());
    let lane_offsets = iota.mul_scalar(IndexOf::<F>::from_index(ipu));

    let groups = n_samples / ipu / lanes;
    for g in 0..groups {
        let units = F::UInt::load(&stream[g * lanes..]);
        let base = g * lanes * ipu;
        for item in 0..ipu {
            let slots = units.shift_right(item as u32 * bits) & mask;
            let samples = lane_offsets + F::UInt::splat(IndexOf::<F>::from_index(base + item));
            visitor.group(samples, slots);
        }
    }
    for sample in groups * lanes * ipu..n_samples {
        visitor.single(sample, unpack_one(stream, packing, sample));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lanes::{ScalarF64, Simd128F32, Simd256F32};
    use crate::packing::pack;

    /// Records which slot every sample was visited with.
    struct Recorder {
        seen: Vec<Option<usize>>,
    }

    impl<F: FloatLanes> SampleVisitor<F> for Recorder {
        fn group(&mut self, samples: F::UInt, slots: F::UInt) {
            let (s, b) = (samples.to_indices(), slots.to_indices());
            for lane in 0..F::LANES {
                assert!(self.seen[s[lane]].is_none(), "sample {} visited twice", s[lane]);
                self.seen[s[lane]] = Some(b[lane]);
            }
        }

        fn single(&mut self, sample: usize, slot: usize) {
            assert!(self.seen[sample].is_none(), "sample {sample} visited twice");
            self.seen[sample] = Some(slot);
        }
    }

    fn check_walk<F: FloatLanes>(n_samples: usize, bits: u32) {
        let uint_bits = <IndexOf<F> as LaneUInt>::BITS;
        let max = if bits >= 32 { 1000 } else { (1usize << bits) - 1 };
        let indices: Vec<usize> = (0..n_samples).map(|i| (i * 7 + 3) % (max + 1)).collect();
        let packing = Packing::Bits(bits);
        let stream = pack::<IndexOf<F>>(&indices, packing).unwrap();
        assert!(bits <= uint_bits);

        let mut rec = Recorder {
            seen: vec![None; n_samples],
        };
        walk_samples::<F, _>(n_samples, packing, Some(&stream[..]), &mut rec);
        let seen: Vec<usize> = rec.seen.into_iter().map(|s| s.expect("sample skipped")).collect();
        assert_eq!(seen, indices, "bits = {bits}, n = {n_samples}");
    }

    #[test]
    fn walk_visits_every_sample_once() {
        for n in [0, 1, 7, 31, 32, 33, 100, 257] {
            for bits in [1, 2, 3, 5, 8, 13, 32] {
                check_walk::<Simd256F32>(n, bits);
                check_walk::<Simd128F32>(n, bits);
            }
            check_walk::<ScalarF64>(n, 3);
            check_walk::<ScalarF64>(n, 64);
        }
    }

    #[test]
    fn walk_without_stream_uses_slot_zero() {
        let mut rec = Recorder { seen: vec![None; 19] };
        walk_samples::<Simd256F32, _>(19, Packing::None, None, &mut rec);
        assert!(rec.seen.iter().all(|s| *s == Some(0)));
    }
}
