//! CUDA zone.
//!
//! Both histogram passes run on the device: one thread per sample with a
//! grid-stride loop, accumulating through `atomicAdd`. Inputs are uploaded
//! per call, device accumulators start at zero and the result is added into
//! the caller's accumulators after the stream is synchronized, so every
//! entry point is synchronous.
//!
//! The update pass has no device counterpart and runs on the host through
//! the 128-bit zone of the same objective.
//!
//! Only `f32` values with `u32` indices are supported.

use std::fmt::Display;
use std::sync::Arc;

use cudarc::driver::{CudaContext, CudaFunction, CudaSlice, CudaStream, DeviceRepr, LaunchConfig, PushKernelArg};
use cudarc::nvrtc::compile_ptx;

use super::{bins_mut, boosting_args, dimension_args, interaction_args, ComputeZone, CpuZone};
use crate::binding::{ApplyUpdateRequest, BoostingBinSumsRequest, InteractionBinSumsRequest};
use crate::buffers::{BinSumsMut, Targets};
use crate::config::Backend;
use crate::error::{ComputeError, Result};
use crate::kernels::{DimensionArgs, MetricSum, MAX_DIMENSIONS};
use crate::lanes::Simd128F32;
use crate::objectives::Objective;

const KERNELS: &str = r#"
__device__ __forceinline__ void accumulate(
    unsigned int i, unsigned int bin, float w, unsigned int occ,
    const float* grad_hess, unsigned int n_outputs, int hessian,
    unsigned long long* counts, float* bin_weights, float* grads, float* hess)
{
    atomicAdd(&counts[bin], (unsigned long long)occ);
    atomicAdd(&bin_weights[bin], w);
    float scale = w * (float)occ;
    unsigned int stride = hessian ? 2u : 1u;
    for (unsigned int k = 0; k < n_outputs; ++k) {
        unsigned int gi = (i * n_outputs + k) * stride;
        unsigned int slot = bin * n_outputs + k;
        atomicAdd(&grads[slot], scale * grad_hess[gi]);
        if (hessian) {
            atomicAdd(&hess[slot], scale * grad_hess[gi + 1]);
        }
    }
}

extern "C" __global__ void bin_sums_boosting(
    const unsigned int* packed, int has_packed,
    unsigned int bits, unsigned int items_per_unit, unsigned int mask,
    const float* grad_hess, const float* weights, int has_weights,
    const unsigned char* occurrences, int has_occurrences,
    unsigned int n_samples, unsigned int n_outputs, int hessian,
    unsigned long long* counts, float* bin_weights, float* grads, float* hess)
{
    for (unsigned int i = blockIdx.x * blockDim.x + threadIdx.x; i < n_samples;
         i += blockDim.x * gridDim.x) {
        unsigned int bin = 0;
        if (has_packed) {
            bin = (packed[i / items_per_unit] >> ((i % items_per_unit) * bits)) & mask;
        }
        float w = has_weights ? weights[i] : 1.0f;
        unsigned int occ = has_occurrences ? (unsigned int)occurrences[i] : 1u;
        accumulate(i, bin, w, occ, grad_hess, n_outputs, hessian, counts, bin_weights, grads, hess);
    }
}

extern "C" __global__ void bin_sums_interaction(
    const unsigned int* packed, const unsigned int* dims, unsigned int n_dims,
    const float* grad_hess, const float* weights, int has_weights,
    unsigned int n_samples, unsigned int n_outputs, int hessian,
    unsigned long long* counts, float* bin_weights, float* grads, float* hess)
{
    // dims: n_dims records of (offset, bits, items_per_unit, mask, stride)
    for (unsigned int i = blockIdx.x * blockDim.x + threadIdx.x; i < n_samples;
         i += blockDim.x * gridDim.x) {
        unsigned int flat = 0;
        for (unsigned int d = 0; d < n_dims; ++d) {
            const unsigned int* dim = dims + d * 5;
            unsigned int ipu = dim[2];
            unsigned int unit = packed[dim[0] + i / ipu];
            flat += ((unit >> ((i % ipu) * dim[1])) & dim[3]) * dim[4];
        }
        float w = has_weights ? weights[i] : 1.0f;
        accumulate(i, flat, w, 1u, grad_hess, n_outputs, hessian, counts, bin_weights, grads, hess);
    }
}
"#;

fn device(e: impl Display) -> ComputeError {
    ComputeError::Device(e.to_string())
}

/// Device copies of the accumulators.
struct DeviceBins {
    counts: CudaSlice<u64>,
    weights: CudaSlice<f32>,
    grads: CudaSlice<f32>,
    hess: CudaSlice<f32>,
}

/// An objective bound to CUDA device 0.
pub(crate) struct CudaZone<O> {
    host: CpuZone<Simd128F32, O>,
    stream: Arc<CudaStream>,
    boosting: CudaFunction,
    interaction: CudaFunction,
    _ctx: Arc<CudaContext>,
}

impl<O: Objective> CudaZone<O> {
    pub(crate) fn new(objective: O) -> Result<Self> {
        let ctx = CudaContext::new(0).map_err(|e| {
            log::debug!("no CUDA device: {e}");
            ComputeError::BackendUnavailable(Backend::Cuda)
        })?;
        let stream = ctx.default_stream();
        let ptx = compile_ptx(KERNELS).map_err(|e| device(format!("compile kernels: {e}")))?;
        let module = ctx.load_module(ptx).map_err(|e| device(format!("load module: {e}")))?;
        let boosting = module.load_function("bin_sums_boosting").map_err(device)?;
        let interaction = module.load_function("bin_sums_interaction").map_err(device)?;
        Ok(Self {
            host: CpuZone::new(objective),
            stream,
            boosting,
            interaction,
            _ctx: ctx,
        })
    }

    fn upload<T: DeviceRepr>(&self, data: &[T]) -> Result<CudaSlice<T>> {
        self.stream.clone_htod(data).map_err(device)
    }

    fn device_bins(&self, bins: &BinSumsMut<'_, f32>) -> Result<DeviceBins> {
        let hess_len = bins.hess.as_ref().map_or(1, |h| h.len().max(1));
        Ok(DeviceBins {
            counts: self.stream.alloc_zeros::<u64>(bins.counts.len().max(1)).map_err(device)?,
            weights: self.stream.alloc_zeros::<f32>(bins.weights.len().max(1)).map_err(device)?,
            grads: self.stream.alloc_zeros::<f32>(bins.grads.len().max(1)).map_err(device)?,
            hess: self.stream.alloc_zeros::<f32>(hess_len).map_err(device)?,
        })
    }

    /// Copy device sums back and add them into the caller's accumulators.
    fn download(&self, d: &DeviceBins, bins: &mut BinSumsMut<'_, f32>, hessian: bool) -> Result<()> {
        let mut counts = vec![0u64; d.counts.len()];
        let mut weights = vec![0f32; d.weights.len()];
        let mut grads = vec![0f32; d.grads.len()];
        let mut hess = vec![0f32; d.hess.len()];
        self.stream.memcpy_dtoh(&d.counts, &mut counts).map_err(device)?;
        self.stream.memcpy_dtoh(&d.weights, &mut weights).map_err(device)?;
        self.stream.memcpy_dtoh(&d.grads, &mut grads).map_err(device)?;
        if hessian {
            self.stream.memcpy_dtoh(&d.hess, &mut hess).map_err(device)?;
        }
        self.stream.synchronize().map_err(device)?;

        for (dst, src) in bins.counts.iter_mut().zip(&counts) {
            *dst += *src;
        }
        for (dst, src) in bins.weights.iter_mut().zip(&weights) {
            *dst += *src;
        }
        for (dst, src) in bins.grads.iter_mut().zip(&grads) {
            *dst += *src;
        }
        if let (true, Some(h)) = (hessian, bins.hess.as_deref_mut()) {
            for (dst, src) in h.iter_mut().zip(&hess) {
                *dst += *src;
            }
        }
        Ok(())
    }
}

impl<O: Objective> ComputeZone for CudaZone<O> {
    fn lane_width(&self) -> usize {
        Backend::Cuda.lane_width()
    }

    fn apply_update(&self, request: &mut ApplyUpdateRequest<'_>) -> Result<MetricSum> {
        self.host.apply_update(request)
    }

    fn finish_metric(&self, mean: f64) -> f64 {
        self.host.finish_metric(mean)
    }

    fn check_targets(&self, targets: &Targets<'_>) -> bool {
        self.host.check_targets(targets)
    }

    fn bin_sums_boosting(&self, r: &mut BoostingBinSumsRequest<'_>) -> Result<()> {
        let args = boosting_args::<f32, u32>(r)?;
        let bins = bins_mut::<f32>(&mut r.bins)?;
        args.validate(bins)?;
        if args.n_samples == 0 {
            return Ok(());
        }

        let d_packed = self.upload(args.packed.unwrap_or(&[0u32][..]))?;
        let d_grad_hess = self.upload(args.grad_hess)?;
        let d_weights = self.upload(args.weights.unwrap_or(&[0f32][..]))?;
        let d_occurrences = self.upload(args.occurrences.unwrap_or(&[0u8][..]))?;
        let mut d_bins = self.device_bins(bins)?;

        let has_packed = i32::from(args.packed.is_some());
        let bits = args.packing.bits_per_item(u32::BITS);
        let items_per_unit = args.packing.items_per_unit(u32::BITS) as u32;
        let mask = args.packing.mask::<u32>();
        let has_weights = i32::from(args.weights.is_some());
        let has_occurrences = i32::from(args.occurrences.is_some());
        let n_samples = args.n_samples as u32;
        let n_outputs = args.n_outputs as u32;
        let hessian = i32::from(args.hessian);

        let mut builder = self.stream.launch_builder(&self.boosting);
        builder.arg(&d_packed);
        builder.arg(&has_packed);
        builder.arg(&bits);
        builder.arg(&items_per_unit);
        builder.arg(&mask);
        builder.arg(&d_grad_hess);
        builder.arg(&d_weights);
        builder.arg(&has_weights);
        builder.arg(&d_occurrences);
        builder.arg(&has_occurrences);
        builder.arg(&n_samples);
        builder.arg(&n_outputs);
        builder.arg(&hessian);
        builder.arg(&mut d_bins.counts);
        builder.arg(&mut d_bins.weights);
        builder.arg(&mut d_bins.grads);
        builder.arg(&mut d_bins.hess);
        unsafe {
            builder
                .launch(LaunchConfig::for_num_elems(n_samples))
                .map_err(|e| device(format!("launch bin_sums_boosting: {e}")))?;
        }

        self.download(&d_bins, bins, args.hessian)
    }

    fn bin_sums_interaction(&self, r: &mut InteractionBinSumsRequest<'_>) -> Result<()> {
        let mut dims = [DimensionArgs::<u32>::default(); MAX_DIMENSIONS];
        let n_dims = dimension_args(r, &mut dims)?;
        let args = interaction_args::<f32, u32>(r, &dims[..n_dims])?;
        let bins = bins_mut::<f32>(&mut r.bins)?;
        args.validate(bins)?;
        if args.n_samples == 0 {
            return Ok(());
        }

        // All streams back to back, plus one record per dimension.
        let mut packed = Vec::new();
        let mut records = Vec::with_capacity(n_dims * 5 + 1);
        let mut stride = 1usize;
        for dim in args.dimensions {
            records.extend_from_slice(&[
                packed.len() as u32,
                dim.packing.bits_per_item(u32::BITS),
                dim.packing.items_per_unit(u32::BITS) as u32,
                dim.packing.mask::<u32>(),
                stride as u32,
            ]);
            packed.extend_from_slice(dim.packed);
            stride *= dim.n_bins;
        }
        packed.push(0);
        records.push(0);

        let d_packed = self.upload(&packed)?;
        let d_records = self.upload(&records)?;
        let d_grad_hess = self.upload(args.grad_hess)?;
        let d_weights = self.upload(args.weights.unwrap_or(&[0f32][..]))?;
        let mut d_bins = self.device_bins(bins)?;

        let n_dims = n_dims as u32;
        let has_weights = i32::from(args.weights.is_some());
        let n_samples = args.n_samples as u32;
        let n_outputs = args.n_outputs as u32;
        let hessian = i32::from(args.hessian);

        let mut builder = self.stream.launch_builder(&self.interaction);
        builder.arg(&d_packed);
        builder.arg(&d_records);
        builder.arg(&n_dims);
        builder.arg(&d_grad_hess);
        builder.arg(&d_weights);
        builder.arg(&has_weights);
        builder.arg(&n_samples);
        builder.arg(&n_outputs);
        builder.arg(&hessian);
        builder.arg(&mut d_bins.counts);
        builder.arg(&mut d_bins.weights);
        builder.arg(&mut d_bins.grads);
        builder.arg(&mut d_bins.hess);
        unsafe {
            builder
                .launch(LaunchConfig::for_num_elems(n_samples))
                .map_err(|e| device(format!("launch bin_sums_interaction: {e}")))?;
        }

        self.download(&d_bins, bins, args.hessian)
    }
}
