//! Motion estimator trait definition.
//!
//! All block-matching strategies implement [`MotionEstimator`]. The codec
//! session owns exactly one boxed estimator and drives it through this
//! interface; estimators never touch session state.

use rtv_common::{
    EstimationMode, EstimatorError, ModeInfo, MotionEstimate, PlaneRef, Resolution,
};

use crate::lifecycle::EstimatorState;

/// Trait for all motion estimators.
///
/// A fresh instance is [`EstimatorState::Uninitialized`]; `create()` must
/// succeed before any estimate. Results are a pure function of the inputs
/// and the state established since the last `create()`/`reset()`.
pub trait MotionEstimator: Send {
    /// Registry name.
    fn name(&self) -> &str;

    /// Picture geometry this instance was constructed for.
    fn resolution(&self) -> Resolution;

    /// Square block size in pixels.
    fn block_size(&self) -> u32;

    /// Allocate all working memory. Re-creating discards previous state.
    fn create(&mut self) -> Result<(), EstimatorError>;

    /// Drop inter-frame assumptions (the retained reference) but
    /// keep working memory.
    fn reset(&mut self);

    /// Current lifecycle phase.
    fn state(&self) -> EstimatorState;

    /// Whether `create()` has succeeded.
    fn ready(&self) -> bool {
        self.state().is_ready()
    }

    /// Select a search mode. Values not listed in [`capabilities`](Self::capabilities)
    /// are rejected with `UnsupportedMode` and leave the current mode unchanged.
    fn set_mode(&mut self, mode: EstimationMode) -> Result<(), EstimatorError>;

    /// The mode most recently set (not the resolved automatic choice).
    fn mode(&self) -> EstimationMode;

    /// Mode values this estimator accepts.
    fn capabilities(&self) -> &[ModeInfo];

    /// Restrict which blocks count towards the average distortion.
    /// `None` includes every block. The mask has one entry per block.
    fn set_distortion_mask(&mut self, mask: Option<Vec<bool>>) -> Result<(), EstimatorError>;

    /// Estimate motion of `source` relative to `reference`.
    fn estimate(
        &mut self,
        source: PlaneRef<'_>,
        reference: PlaneRef<'_>,
    ) -> Result<MotionEstimate, EstimatorError>;

    /// Estimate `source` against the source of the previous successful
    /// estimate. Fails with `NotReady` when nothing has been retained.
    fn estimate_retained(&mut self, source: PlaneRef<'_>)
        -> Result<MotionEstimate, EstimatorError>;
}

/// Whether `mode` is listed in `capabilities`.
pub fn supports_mode(capabilities: &[ModeInfo], mode: EstimationMode) -> bool {
    capabilities.iter().any(|m| m.mode == mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supports_listed_modes_only() {
        let caps = vec![ModeInfo::new(0, "auto", ""), ModeInfo::new(2, "two", "")];
        assert!(supports_mode(&caps, EstimationMode::AUTO));
        assert!(supports_mode(&caps, EstimationMode(2)));
        assert!(!supports_mode(&caps, EstimationMode(1)));
    }
}
