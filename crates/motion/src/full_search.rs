//! Exhaustive block-matching estimator.

use rtv_common::{
    EstimationMode, EstimatorConfig, EstimatorError, ModeInfo, MotionEstimate, MotionField,
    PlaneRef, Resolution,
};
use tracing::debug;

use crate::lifecycle::{DistortionAccumulator, EstimatorState, Lifecycle};
use crate::metric::{block_sad, block_sad_bounded};
use crate::traits::{supports_mode, MotionEstimator};

/// Registry name.
pub const NAME: &str = "full_search";

const EXHAUSTIVE: u32 = 1;
const HALF_RANGE: u32 = 2;

/// Tests every full-pel displacement within the search window.
///
/// The zero vector is scored first and a candidate only replaces the current
/// best when strictly better, so ties resolve to the zero vector and then to
/// the first candidate in raster order.
pub struct FullSearchEstimator {
    lifecycle: Lifecycle,
    mode: EstimationMode,
    capabilities: Vec<ModeInfo>,
}

impl FullSearchEstimator {
    pub fn new(resolution: Resolution, config: &EstimatorConfig) -> Result<Self, EstimatorError> {
        Ok(Self {
            lifecycle: Lifecycle::new(resolution, config)?,
            mode: EstimationMode::AUTO,
            capabilities: Self::mode_table(),
        })
    }

    pub fn mode_table() -> Vec<ModeInfo> {
        vec![
            ModeInfo::new(0, "auto", "Exhaustive search over the full range"),
            ModeInfo::new(EXHAUSTIVE, "exhaustive", "Every displacement within the search range"),
            ModeInfo::new(HALF_RANGE, "half_range", "Every displacement within half the search range"),
        ]
    }

    fn effective_range(&self) -> i32 {
        let range = self.lifecycle.search_range() as i32;
        match self.mode.0 {
            HALF_RANGE => range / 2,
            _ => range,
        }
    }

    fn search(&self, source: PlaneRef<'_>, reference: PlaneRef<'_>) -> MotionEstimate {
        let (columns, rows) = self.lifecycle.grid();
        let range = self.effective_range();
        let mut field = MotionField::zeroed(columns, rows);
        let mut acc = DistortionAccumulator::default();

        for (index, vector) in field.vectors.iter_mut().enumerate() {
            let rect = self.lifecycle.block_rect(vector.block_x, vector.block_y);
            let mut best = block_sad(source, reference, rect, 0, 0);
            let (mut best_dx, mut best_dy) = (0, 0);

            'search: for dy in -range..=range {
                for dx in -range..=range {
                    if best == 0 {
                        break 'search;
                    }
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let sad = block_sad_bounded(source, reference, rect, dx, dy, best);
                    if sad < best {
                        best = sad;
                        best_dx = dx;
                        best_dy = dy;
                    }
                }
            }

            vector.dx = best_dx;
            vector.dy = best_dy;
            acc.add(best, self.lifecycle.included(index));
        }

        MotionEstimate {
            field,
            average_distortion: acc.average(),
        }
    }
}

impl MotionEstimator for FullSearchEstimator {
    fn name(&self) -> &str {
        NAME
    }

    fn resolution(&self) -> Resolution {
        self.lifecycle.resolution()
    }

    fn block_size(&self) -> u32 {
        self.lifecycle.block_size()
    }

    fn create(&mut self) -> Result<(), EstimatorError> {
        let mut budget = self.lifecycle.begin_create();
        self.lifecycle.finish_create(NAME, &mut budget, Ok(()))?;
        debug!(
            estimator = NAME,
            resolution = %self.lifecycle.resolution(),
            bytes = budget.used(),
            "Motion estimator created"
        );
        Ok(())
    }

    fn reset(&mut self) {
        self.lifecycle.reset();
    }

    fn state(&self) -> EstimatorState {
        self.lifecycle.state()
    }

    fn set_mode(&mut self, mode: EstimationMode) -> Result<(), EstimatorError> {
        if !supports_mode(&self.capabilities, mode) {
            return Err(EstimatorError::UnsupportedMode { mode: mode.0 });
        }
        self.mode = mode;
        Ok(())
    }

    fn mode(&self) -> EstimationMode {
        self.mode
    }

    fn capabilities(&self) -> &[ModeInfo] {
        &self.capabilities
    }

    fn set_distortion_mask(&mut self, mask: Option<Vec<bool>>) -> Result<(), EstimatorError> {
        self.lifecycle.set_mask(mask)
    }

    fn estimate(
        &mut self,
        source: PlaneRef<'_>,
        reference: PlaneRef<'_>,
    ) -> Result<MotionEstimate, EstimatorError> {
        self.lifecycle.check_inputs(source, reference)?;
        let estimate = self.search(source, reference);
        self.lifecycle.complete(source, None);
        Ok(estimate)
    }

    fn estimate_retained(
        &mut self,
        source: PlaneRef<'_>,
    ) -> Result<MotionEstimate, EstimatorError> {
        let retained = self.lifecycle.take_retained()?;
        if let Err(e) = self.lifecycle.check_inputs(source, retained.view()) {
            self.lifecycle.restore_retained(retained);
            return Err(e);
        }
        let estimate = self.search(source, retained.view());
        self.lifecycle.complete(source, Some(retained));
        Ok(estimate)
    }
}
