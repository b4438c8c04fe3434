//! Frame materializer: float tensors in, clamped 8-bit pixel buffers out.
//!
//! Upstream nodes hand over `[T, H, W, C]` tensors with channel values in
//! [0, 1], sometimes in reduced-precision floating formats. The materializer
//! upcasts, clamps, scales to [0, 255] and truncates to u8 in one pass.

use anyhow::Result;
use half::bf16;
use ndarray::ArrayView4;

use crate::types::FrameSequence;

impl FrameSequence {
    /// Materialize from an f32 tensor of shape `[T, H, W, C]`.
    ///
    /// Total for all finite input: values are clamped to [0, 1] before
    /// scaling, so out-of-range channels saturate instead of wrapping.
    pub fn from_f32(view: ArrayView4<'_, f32>) -> Result<Self> {
        let (frames, height, width, channels) = view.dim();
        let mut data = Vec::with_capacity(frames * height * width * channels);
        data.extend(view.iter().map(|v| quantize(*v)));
        Self::from_raw(data, frames, height, width, channels)
    }

    /// Materialize from a bf16 tensor of shape `[T, H, W, C]`.
    pub fn from_bf16(view: ArrayView4<'_, bf16>) -> Result<Self> {
        let (frames, height, width, channels) = view.dim();
        let mut data = Vec::with_capacity(frames * height * width * channels);
        data.extend(view.iter().map(|v| quantize(v.to_f32())));
        Self::from_raw(data, frames, height, width, channels)
    }
}

/// Clamp to [0, 1], scale to [0, 255], truncate.
fn quantize(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0) as u8
}
