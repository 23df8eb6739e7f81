//! Shared estimator lifecycle: geometry, allocation budget, readiness, and the
//! retained reference used by continuation estimates.
//!
//! ```text
//! Uninitialized --create() ok--> Configured --estimate()--> Estimating
//!       ^                             ^                          |
//!       |                             +--------- reset() --------+
//!       +-- create() failed (all working memory released)
//! ```

use std::fmt;

use rtv_common::{EstimatorConfig, EstimatorError, Plane, PlaneRef, Resolution};
use tracing::warn;

use crate::metric::BlockRect;

/// Lifecycle phase of an estimator instance.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum EstimatorState {
    /// Constructed, no working memory. `estimate` returns `NotReady`.
    #[default]
    Uninitialized,
    /// Working memory allocated, no inter-frame assumptions held.
    Configured,
    /// At least one estimate since `create()`/`reset()`; retained state is valid.
    Estimating,
}

impl EstimatorState {
    pub fn is_ready(self) -> bool {
        self != Self::Uninitialized
    }
}

impl fmt::Display for EstimatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Configured => "configured",
            Self::Estimating => "estimating",
        };
        f.write_str(s)
    }
}

/// Tracks bytes requested during `create()` against an optional limit and
/// reserves memory fallibly.
#[derive(Debug)]
pub struct AllocBudget {
    limit: Option<usize>,
    used: usize,
}

impl AllocBudget {
    pub fn new(limit: Option<usize>) -> Self {
        Self { limit, used: 0 }
    }

    pub fn used(&self) -> usize {
        self.used
    }

    /// Allocate `len` elements initialised to `fill`.
    pub fn vec<T: Clone>(&mut self, len: usize, fill: T) -> Result<Vec<T>, EstimatorError> {
        let bytes = len.saturating_mul(std::mem::size_of::<T>());
        let requested = self.used.saturating_add(bytes);
        if let Some(limit) = self.limit {
            if requested > limit {
                return Err(EstimatorError::AllocationFailure {
                    requested,
                    reason: format!("exceeds memory limit of {limit} bytes"),
                });
            }
        }

        let mut v = Vec::new();
        v.try_reserve_exact(len)
            .map_err(|e| EstimatorError::AllocationFailure {
                requested,
                reason: e.to_string(),
            })?;
        v.resize(len, fill);
        self.used = requested;
        Ok(v)
    }

    /// Allocate a zeroed plane of the given resolution.
    pub fn plane(&mut self, res: Resolution) -> Result<Plane, EstimatorError> {
        let data = self.vec(res.pixel_count() as usize, 0u8)?;
        Plane::from_vec(res, data).map_err(|e| EstimatorError::AllocationFailure {
            requested: self.used,
            reason: e.to_string(),
        })
    }
}

/// Geometry, lifecycle state, and retained reference common to every estimator.
#[derive(Debug)]
pub struct Lifecycle {
    resolution: Resolution,
    block_size: u32,
    search_range: u32,
    memory_limit: Option<usize>,
    state: EstimatorState,
    retained: Option<Plane>,
    retained_valid: bool,
    mask: Option<Vec<bool>>,
}

impl Lifecycle {
    /// Validate geometry; no memory is allocated here.
    pub fn new(resolution: Resolution, config: &EstimatorConfig) -> Result<Self, EstimatorError> {
        if resolution.width == 0 || resolution.height == 0 {
            return Err(EstimatorError::InvalidGeometry(format!(
                "picture must be non-empty, got {resolution}"
            )));
        }
        if config.block_size == 0 {
            return Err(EstimatorError::InvalidGeometry(
                "block size must be > 0".to_string(),
            ));
        }
        if config.search_range > i16::MAX as u32 {
            return Err(EstimatorError::InvalidGeometry(format!(
                "search range {} too large",
                config.search_range
            )));
        }
        Ok(Self {
            resolution,
            block_size: config.block_size,
            search_range: config.search_range,
            memory_limit: config.memory_limit,
            state: EstimatorState::Uninitialized,
            retained: None,
            retained_valid: false,
            mask: None,
        })
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn search_range(&self) -> u32 {
        self.search_range
    }

    pub fn state(&self) -> EstimatorState {
        self.state
    }

    pub fn ready(&self) -> bool {
        self.state.is_ready()
    }

    pub fn grid(&self) -> (u32, u32) {
        self.resolution.block_grid(self.block_size)
    }

    pub fn block_count(&self) -> usize {
        self.resolution.block_count(self.block_size)
    }

    /// Pixel rectangle of block `(bx, by)`, clipped to the picture.
    pub fn block_rect(&self, bx: u32, by: u32) -> BlockRect {
        let x = bx * self.block_size;
        let y = by * self.block_size;
        BlockRect {
            x,
            y,
            width: self.block_size.min(self.resolution.width - x),
            height: self.block_size.min(self.resolution.height - y),
        }
    }

    /// Start a `create()` call: drop any previous working memory and hand out a budget.
    pub fn begin_create(&mut self) -> AllocBudget {
        self.state = EstimatorState::Uninitialized;
        self.retained = None;
        self.retained_valid = false;
        AllocBudget::new(self.memory_limit)
    }

    /// Finish a `create()` call. On failure the instance stays uninitialised.
    pub fn finish_create(
        &mut self,
        name: &str,
        budget: &mut AllocBudget,
        result: Result<(), EstimatorError>,
    ) -> Result<(), EstimatorError> {
        let result = result.and_then(|()| {
            self.retained = Some(budget.plane(self.resolution)?);
            Ok(())
        });
        match result {
            Ok(()) => {
                self.state = EstimatorState::Configured;
                Ok(())
            }
            Err(e) => {
                warn!(estimator = name, error = %e, "Motion estimator create failed");
                self.retained = None;
                self.state = EstimatorState::Uninitialized;
                Err(e)
            }
        }
    }

    /// Forget temporal continuity without releasing memory.
    pub fn reset(&mut self) {
        self.retained_valid = false;
        if self.state == EstimatorState::Estimating {
            self.state = EstimatorState::Configured;
        }
    }

    /// Validate a `(source, reference)` pair before searching.
    pub fn check_inputs(
        &self,
        source: PlaneRef<'_>,
        reference: PlaneRef<'_>,
    ) -> Result<(), EstimatorError> {
        if !self.ready() {
            return Err(EstimatorError::NotReady);
        }
        for got in [source.resolution(), reference.resolution()] {
            if got != self.resolution {
                return Err(EstimatorError::GeometryMismatch {
                    expected: self.resolution,
                    got,
                });
            }
        }
        Ok(())
    }

    /// Take the retained reference out for a continuation estimate.
    ///
    /// Fails with `NotReady` before `create()`, before the first estimate,
    /// and after `reset()`.
    pub fn take_retained(&mut self) -> Result<Plane, EstimatorError> {
        if !self.ready() || !self.retained_valid {
            return Err(EstimatorError::NotReady);
        }
        self.retained.take().ok_or(EstimatorError::NotReady)
    }

    /// Put the retained buffer back after a continuation estimate failed early.
    pub fn restore_retained(&mut self, plane: Plane) {
        self.retained = Some(plane);
    }

    /// Record a completed estimate: `source` becomes the retained reference.
    pub fn complete(&mut self, source: PlaneRef<'_>, buffer: Option<Plane>) {
        if let Some(buffer) = buffer {
            self.retained = Some(buffer);
        }
        if let Some(retained) = self.retained.as_mut() {
            retained.copy_from(source);
            self.retained_valid = true;
        }
        self.state = EstimatorState::Estimating;
    }

    pub fn set_mask(&mut self, mask: Option<Vec<bool>>) -> Result<(), EstimatorError> {
        if let Some(m) = &mask {
            let expected = self.block_count();
            if m.len() != expected {
                return Err(EstimatorError::MaskLength {
                    expected,
                    got: m.len(),
                });
            }
        }
        self.mask = mask;
        Ok(())
    }

    /// Whether block `index` contributes to the average distortion.
    pub fn included(&self, index: usize) -> bool {
        self.mask
            .as_ref()
            .map(|m| m.get(index).copied().unwrap_or(false))
            .unwrap_or(true)
    }
}

/// Running mean of per-block distortion over included blocks.
#[derive(Copy, Clone, Debug, Default)]
pub struct DistortionAccumulator {
    total: u64,
    included: u64,
}

impl DistortionAccumulator {
    pub fn add(&mut self, distortion: u32, included: bool) {
        if included {
            self.total += distortion as u64;
            self.included += 1;
        }
    }

    /// Mean over included blocks; 0 when no block was included.
    pub fn average(&self) -> u64 {
        if self.included == 0 {
            0
        } else {
            self.total / self.included
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(block: u32) -> EstimatorConfig {
        EstimatorConfig {
            block_size: block,
            ..EstimatorConfig::default()
        }
    }

    #[test]
    fn rejects_degenerate_geometry() {
        assert!(Lifecycle::new(Resolution::new(0, 10), &config(16)).is_err());
        assert!(Lifecycle::new(Resolution::new(10, 10), &config(0)).is_err());
    }

    #[test]
    fn edge_blocks_are_clipped() {
        let lc = Lifecycle::new(Resolution::new(40, 20), &config(16)).unwrap();
        assert_eq!(lc.grid(), (3, 2));
        let r = lc.block_rect(2, 1);
        assert_eq!((r.x, r.y, r.width, r.height), (32, 16, 8, 4));
    }

    #[test]
    fn budget_enforces_limit() {
        let mut budget = AllocBudget::new(Some(100));
        assert!(budget.vec(60, 0u8).is_ok());
        let err = budget.vec(60, 0u8).unwrap_err();
        assert!(matches!(err, EstimatorError::AllocationFailure { requested: 120, .. }));
        assert_eq!(budget.used(), 60);
    }

    #[test]
    fn retained_reference_lifecycle() {
        let res = Resolution::new(4, 4);
        let mut lc = Lifecycle::new(res, &config(4)).unwrap();
        assert_eq!(lc.take_retained().unwrap_err(), EstimatorError::NotReady);

        let mut budget = lc.begin_create();
        lc.finish_create("test", &mut budget, Ok(())).unwrap();
        assert_eq!(lc.state(), EstimatorState::Configured);
        // Created, but nothing retained yet.
        assert_eq!(lc.take_retained().unwrap_err(), EstimatorError::NotReady);

        let src = Plane::new(res);
        lc.complete(src.view(), None);
        assert_eq!(lc.state(), EstimatorState::Estimating);
        let buf = lc.take_retained().unwrap();
        lc.restore_retained(buf);

        lc.reset();
        assert_eq!(lc.state(), EstimatorState::Configured);
        assert!(lc.ready());
        assert_eq!(lc.take_retained().unwrap_err(), EstimatorError::NotReady);
    }

    #[test]
    fn failed_create_stays_uninitialized() {
        let res = Resolution::new(64, 64);
        let cfg = EstimatorConfig {
            memory_limit: Some(16),
            ..config(16)
        };
        let mut lc = Lifecycle::new(res, &cfg).unwrap();
        let mut budget = lc.begin_create();
        let err = lc.finish_create("test", &mut budget, Ok(())).unwrap_err();
        assert!(matches!(err, EstimatorError::AllocationFailure { .. }));
        assert_eq!(lc.state(), EstimatorState::Uninitialized);
        assert!(!lc.ready());
    }

    #[test]
    fn mask_controls_inclusion() {
        let mut lc = Lifecycle::new(Resolution::new(8, 8), &config(4)).unwrap();
        assert!(lc.included(3));
        assert!(matches!(
            lc.set_mask(Some(vec![true; 3])),
            Err(EstimatorError::MaskLength { expected: 4, got: 3 })
        ));
        lc.set_mask(Some(vec![true, false, true, false])).unwrap();
        assert!(lc.included(0));
        assert!(!lc.included(1));
    }

    #[test]
    fn accumulator_average() {
        let mut acc = DistortionAccumulator::default();
        assert_eq!(acc.average(), 0);
        acc.add(10, true);
        acc.add(1000, false);
        acc.add(20, true);
        assert_eq!(acc.average(), 15);
    }
}
