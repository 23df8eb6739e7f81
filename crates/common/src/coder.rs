//! Boundary trait for the external frame coding pipeline.
//!
//! The transform/quantization/entropy pipeline is not part of the control
//! plane. The session drives it through [`FrameCoder`], handing it the
//! motion search result and the per-frame rate decisions, and reads back the
//! coded size for rate-control feedback.

use crate::error::CodecResult;
use crate::image::{Plane, PlaneRef};
use crate::motion::MotionEstimate;
use crate::types::{FrameNumber, Resolution};

/// Everything the coder needs for one frame, snapshotted at the start of the call.
#[derive(Clone, Debug)]
pub struct CodeRequest<'a> {
    pub frame_number: FrameNumber,
    pub source: PlaneRef<'a>,
    /// Code without reference to any other frame.
    pub keyframe: bool,
    /// Motion search result for inter frames; `None` for key frames.
    pub motion: Option<&'a MotionEstimate>,
    pub block_size: u32,
    /// Quantizer index chosen by rate control.
    pub quality: u8,
    /// Advisory bit budget; `None` = best effort.
    pub frame_bit_limit: Option<u32>,
    /// Coarsest quantizer index the coder may fall back to when chasing the budget.
    pub max_quality: u8,
    /// Quantizer weighting table (16 entries, 16 = unity).
    pub qtable: &'a [i32],
}

/// A coded frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodedFrame {
    pub frame_number: FrameNumber,
    pub data: Vec<u8>,
    /// Exact number of meaningful bits in `data`.
    pub bit_length: u64,
    pub keyframe: bool,
    /// Quantizer index actually used.
    pub quality: u8,
    /// Stream group tag, stamped by the session.
    pub group_id: i32,
}

impl CodedFrame {
    pub fn byte_length(&self) -> usize {
        self.bit_length.div_ceil(8) as usize
    }
}

/// Frame coder driven by the codec session.
pub trait FrameCoder: Send {
    /// Short identifier for logs.
    fn name(&self) -> &str;

    /// Prepare for a sequence of `resolution` pictures split into `block_size` blocks.
    fn open(&mut self, resolution: Resolution, block_size: u32) -> CodecResult<()>;

    /// Code one frame.
    fn code(&mut self, request: &CodeRequest<'_>) -> CodecResult<CodedFrame>;

    /// Decode one coded frame.
    fn decode(&mut self, data: &[u8]) -> CodecResult<Plane>;

    /// The latest reconstructed reference picture, if the coder keeps one.
    fn reference(&self) -> Option<PlaneRef<'_>>;

    /// Drop prediction state so the next frame is coded independently.
    fn restart(&mut self);

    /// Release resources at session close.
    fn close(&mut self) {}
}
