//! Multi-resolution cross-search estimator.
//!
//! The picture pair is subsampled into a two- or three-level pyramid. The
//! coarsest level runs a cross search whose step starts at half the level's
//! range and halves every round; each finer level scales the winning vector
//! by two and refines it in a small window. A final noise-floor test reverts
//! doubtful vectors to the zero vector.

use rtv_common::{
    EstimationMode, EstimatorConfig, EstimatorError, ModeInfo, MotionEstimate, MotionField,
    Plane, PlaneRef, Resolution,
};
use tracing::debug;

use crate::lifecycle::{AllocBudget, DistortionAccumulator, EstimatorState, Lifecycle};
use crate::metric::{block_sad, block_sad_bounded, BlockRect};
use crate::pyramid::{downsample_into, level_resolution};
use crate::traits::{supports_mode, MotionEstimator};

/// Registry name.
pub const NAME: &str = "multires_cross";

/// Pictures with more samples than this search from level 2 in auto mode.
pub const AUTO_LEVEL2_AREA: u64 = 40_000;

/// Half-width of the refinement window at levels 1 and 0.
const REFINE_RANGE: i32 = 2;

const CROSS: [(i32, i32); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

/// Search depth selected through [`EstimationMode`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MultiresMode {
    /// Level 2 for pictures larger than [`AUTO_LEVEL2_AREA`], else level 1.
    Auto,
    /// Cross search at half resolution.
    Level1,
    /// Cross search at quarter resolution, refined at half resolution.
    Level2,
}

impl MultiresMode {
    pub fn from_mode(mode: EstimationMode) -> Option<Self> {
        match mode.0 {
            0 => Some(Self::Auto),
            1 => Some(Self::Level1),
            2 => Some(Self::Level2),
            _ => None,
        }
    }

    /// Coarsest pyramid level searched for a picture of `resolution`.
    pub fn top_level(self, resolution: Resolution) -> u32 {
        match self {
            Self::Auto if resolution.pixel_count() > AUTO_LEVEL2_AREA => 2,
            Self::Auto | Self::Level1 => 1,
            Self::Level2 => 2,
        }
    }
}

struct Pyramids {
    src_l1: Plane,
    ref_l1: Plane,
    src_l2: Plane,
    ref_l2: Plane,
}

impl Pyramids {
    fn allocate(resolution: Resolution, budget: &mut AllocBudget) -> Result<Self, EstimatorError> {
        let l1 = level_resolution(resolution, 1);
        let l2 = level_resolution(resolution, 2);
        Ok(Self {
            src_l1: budget.plane(l1)?,
            ref_l1: budget.plane(l1)?,
            src_l2: budget.plane(l2)?,
            ref_l2: budget.plane(l2)?,
        })
    }

    fn build(&mut self, source: PlaneRef<'_>, reference: PlaneRef<'_>, top_level: u32) {
        downsample_into(source, &mut self.src_l1);
        downsample_into(reference, &mut self.ref_l1);
        if top_level >= 2 {
            downsample_into(self.src_l1.view(), &mut self.src_l2);
            downsample_into(self.ref_l1.view(), &mut self.ref_l2);
        }
    }
}

/// Best candidate so far. Equal distortion prefers the shorter vector.
#[derive(Copy, Clone, Debug)]
struct Candidate {
    dx: i32,
    dy: i32,
    sad: u32,
}

impl Candidate {
    fn magnitude_sqr(dx: i32, dy: i32) -> i32 {
        dx * dx + dy * dy
    }

    fn offer(&mut self, dx: i32, dy: i32, sad: u32) {
        let better = sad < self.sad
            || (sad == self.sad
                && Self::magnitude_sqr(dx, dy) < Self::magnitude_sqr(self.dx, self.dy));
        if better {
            *self = Self { dx, dy, sad };
        }
    }
}

/// One pyramid level of one block.
#[derive(Copy, Clone)]
struct LevelBlock<'a> {
    source: PlaneRef<'a>,
    reference: PlaneRef<'a>,
    rect: BlockRect,
    range: i32,
}

impl LevelBlock<'_> {
    fn in_range(&self, dx: i32, dy: i32) -> bool {
        dx.abs() <= self.range && dy.abs() <= self.range
    }

    fn sad(&self, dx: i32, dy: i32) -> u32 {
        block_sad(self.source, self.reference, self.rect, dx, dy)
    }

    /// SAD, exact whenever it does not exceed `best`.
    fn sad_within(&self, dx: i32, dy: i32, best: u32) -> u32 {
        block_sad_bounded(
            self.source,
            self.reference,
            self.rect,
            dx,
            dy,
            best.saturating_add(1),
        )
    }

    fn start(&self, dx: i32, dy: i32) -> Candidate {
        Candidate {
            dx,
            dy,
            sad: self.sad(dx, dy),
        }
    }

    /// Cross search around `best`, step starting at half the range.
    fn cross_search(&self, best: &mut Candidate) {
        let mut step = self.range / 2;
        while step > 0 {
            let (cx, cy) = (best.dx, best.dy);
            for (ux, uy) in CROSS {
                let (dx, dy) = (cx + ux * step, cy + uy * step);
                if !self.in_range(dx, dy) {
                    continue;
                }
                let sad = self.sad_within(dx, dy, best.sad);
                best.offer(dx, dy, sad);
            }
            step /= 2;
        }
    }

    /// Exhaustive search of the `±radius` window around `best`.
    fn refine(&self, best: &mut Candidate, radius: i32) {
        let (cx, cy) = (best.dx, best.dy);
        for oy in -radius..=radius {
            for ox in -radius..=radius {
                let (dx, dy) = (cx + ox, cy + oy);
                if (ox == 0 && oy == 0) || !self.in_range(dx, dy) {
                    continue;
                }
                let sad = self.sad_within(dx, dy, best.sad);
                best.offer(dx, dy, sad);
            }
        }
    }
}

/// Whether a searched vector should be kept over the zero vector.
///
/// Vectors are weighted against the zero-vector distortion: a small gain
/// relative to the vector length, a zero-vector distortion within the noise
/// floor, and a gain small relative to the distortion itself each count
/// against the vector. Two or more strikes revert it.
fn accept_vector(dx: i32, dy: i32, min_sad: u32, zero_sad: u32, noise_floor: u32) -> bool {
    if min_sad >= zero_sad {
        return false;
    }
    let gain = (zero_sad - min_sad) as i64;
    // Vector length in quarter-sample units.
    let (qx, qy) = (dx as i64 * 4, dy as i64 * 4);
    let magnitude_sqr = qx * qx + qy * qy;

    let mut weight = 0;
    if gain * 2 < magnitude_sqr {
        weight += 1;
    }
    if zero_sad < noise_floor {
        weight += 1;
    }
    if gain * 7 < min_sad as i64 {
        weight += 1;
    }
    weight < 2
}

/// Hierarchical cross-search estimator.
///
/// Each estimate depends only on its input pair and the mode; nothing from
/// earlier estimates feeds into the search.
pub struct MultiresCrossEstimator {
    lifecycle: Lifecycle,
    mode: EstimationMode,
    capabilities: Vec<ModeInfo>,
    pyramids: Option<Pyramids>,
}

impl MultiresCrossEstimator {
    pub fn new(resolution: Resolution, config: &EstimatorConfig) -> Result<Self, EstimatorError> {
        Ok(Self {
            lifecycle: Lifecycle::new(resolution, config)?,
            mode: EstimationMode::AUTO,
            capabilities: Self::mode_table(),
            pyramids: None,
        })
    }

    pub fn mode_table() -> Vec<ModeInfo> {
        vec![
            ModeInfo::new(0, "auto", "Level 2 above 40000 samples, otherwise level 1"),
            ModeInfo::new(1, "level1", "Cross search at half resolution"),
            ModeInfo::new(2, "level2", "Cross search at quarter resolution"),
        ]
    }

    /// Coarsest level the current mode searches from.
    pub fn top_level(&self) -> u32 {
        MultiresMode::from_mode(self.mode)
            .unwrap_or(MultiresMode::Auto)
            .top_level(self.lifecycle.resolution())
    }

    fn allocate(&mut self, budget: &mut AllocBudget) -> Result<(), EstimatorError> {
        self.pyramids = Some(Pyramids::allocate(self.lifecycle.resolution(), budget)?);
        Ok(())
    }

    fn search(
        &mut self,
        source: PlaneRef<'_>,
        reference: PlaneRef<'_>,
    ) -> Result<MotionEstimate, EstimatorError> {
        let top_level = self.top_level();
        let Self {
            lifecycle,
            pyramids,
            ..
        } = self;
        let pyramids = pyramids.as_mut().ok_or(EstimatorError::NotReady)?;
        pyramids.build(source, reference, top_level);

        let range = lifecycle.search_range() as i32;
        let (columns, rows) = lifecycle.grid();
        let l1 = pyramids.src_l1.resolution();
        let l2 = pyramids.src_l2.resolution();
        let mut field = MotionField::zeroed(columns, rows);
        let mut acc = DistortionAccumulator::default();

        for (index, vector) in field.vectors.iter_mut().enumerate() {
            let rect = lifecycle.block_rect(vector.block_x, vector.block_y);
            let level0 = LevelBlock {
                source,
                reference,
                rect,
                range,
            };
            let level1 = LevelBlock {
                source: pyramids.src_l1.view(),
                reference: pyramids.ref_l1.view(),
                rect: rect.at_level(1, l1.width, l1.height),
                range: range / 2,
            };

            let mut best = if top_level >= 2 {
                let level2 = LevelBlock {
                    source: pyramids.src_l2.view(),
                    reference: pyramids.ref_l2.view(),
                    rect: rect.at_level(2, l2.width, l2.height),
                    range: range / 4,
                };
                let mut c = level2.start(0, 0);
                level2.cross_search(&mut c);
                let mut c = level1.start(c.dx * 2, c.dy * 2);
                level1.refine(&mut c, REFINE_RANGE);
                c
            } else {
                let mut c = level1.start(0, 0);
                level1.cross_search(&mut c);
                c
            };

            let zero_sad = level0.sad(0, 0);
            best = level0.start(best.dx * 2, best.dy * 2);
            level0.refine(&mut best, REFINE_RANGE);

            let noise_floor = rect.area() / 10;
            let (dx, dy, distortion) =
                if accept_vector(best.dx, best.dy, best.sad, zero_sad, noise_floor) {
                    (best.dx, best.dy, best.sad)
                } else {
                    (0, 0, zero_sad)
                };

            vector.dx = dx;
            vector.dy = dy;
            acc.add(distortion, lifecycle.included(index));
        }

        Ok(MotionEstimate {
            field,
            average_distortion: acc.average(),
        })
    }
}

impl MotionEstimator for MultiresCrossEstimator {
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
        self.pyramids = None;

        let allocated = self.allocate(&mut budget);
        let result = self.lifecycle.finish_create(NAME, &mut budget, allocated);
        if result.is_err() {
            self.pyramids = None;
            return result;
        }
        debug!(
            estimator = NAME,
            resolution = %self.lifecycle.resolution(),
            top_level = self.top_level(),
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
        let estimate = self.search(source, reference)?;
        self.lifecycle.complete(source, None);
        Ok(estimate)
    }

    fn estimate_retained(
        &mut self,
        source: PlaneRef<'_>,
    ) -> Result<MotionEstimate, EstimatorError> {
        let retained = self.lifecycle.take_retained()?;
        let result = self
            .lifecycle
            .check_inputs(source, retained.view())
            .and_then(|()| self.search(source, retained.view()));
        match result {
            Ok(estimate) => {
                self.lifecycle.complete(source, Some(retained));
                Ok(estimate)
            }
            Err(e) => {
                self.lifecycle.restore_retained(retained);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_pictures::{shifted, smooth};

    fn config() -> EstimatorConfig {
        EstimatorConfig {
            kind: NAME.to_string(),
            block_size: 16,
            search_range: 16,
            ..EstimatorConfig::default()
        }
    }

    fn created(res: Resolution) -> MultiresCrossEstimator {
        let mut est = MultiresCrossEstimator::new(res, &config()).unwrap();
        est.create().unwrap();
        est
    }

    #[test]
    fn auto_mode_picks_level_by_area() {
        assert_eq!(MultiresMode::Auto.top_level(Resolution::new(200, 200)), 1);
        assert_eq!(MultiresMode::Auto.top_level(Resolution::new(201, 200)), 2);
        assert_eq!(MultiresMode::Level2.top_level(Resolution::new(16, 16)), 2);
        assert_eq!(MultiresMode::Level1.top_level(Resolution::CIF), 1);
        assert_eq!(MultiresMode::from_mode(EstimationMode(3)), None);
    }

    #[test]
    fn set_mode_validates_against_capabilities() {
        let mut est = created(Resolution::CIF);
        assert_eq!(est.top_level(), 2);
        est.set_mode(EstimationMode(1)).unwrap();
        assert_eq!(est.top_level(), 1);
        assert_eq!(
            est.set_mode(EstimationMode(7)).unwrap_err(),
            EstimatorError::UnsupportedMode { mode: 7 }
        );
        assert_eq!(est.mode(), EstimationMode(1));
        assert_eq!(est.capabilities().len(), 3);
    }

    #[test]
    fn weighting_rejects_doubtful_vectors() {
        // Clear win.
        assert!(accept_vector(3, 1, 100, 5000, 25));
        // No gain.
        assert!(!accept_vector(1, 0, 500, 500, 25));
        // Tiny gain relative to a long vector and to the distortion itself.
        assert!(!accept_vector(8, 8, 990, 1000, 25));
        // Zero-vector distortion within the noise floor and a small gain.
        assert!(!accept_vector(2, 0, 10, 20, 25));
    }

    #[test]
    fn identical_pictures_give_zero_field() {
        let res = Resolution::new(64, 64);
        let mut est = created(res);
        let p = smooth(res, 0);
        let result = est.estimate(p.view(), p.view()).unwrap();
        assert_eq!(result.field.len(), 16);
        assert_eq!(result.field.moving_blocks(), 0);
        assert_eq!(result.average_distortion, 0);
    }

    #[test]
    fn tracks_global_translation() {
        for mode in [1, 2] {
            let res = Resolution::new(96, 96);
            let mut est = created(res);
            est.set_mode(EstimationMode(mode)).unwrap();
            let reference = smooth(res, 0);
            let source = shifted(&reference, 4, -2);
            let result = est.estimate(source.view(), reference.view()).unwrap();
            let centre = result.field.get(2, 2).unwrap();
            assert_eq!((centre.dx, centre.dy), (4, -2), "mode {mode}");
            assert!(result.field.moving_blocks() > 0);
        }
    }

    #[test]
    fn deterministic_across_instances_and_after_reset() {
        let res = Resolution::new(64, 48);
        let frames: Vec<Plane> = (0..4).map(|i| smooth(res, i * 2)).collect();

        let run = |est: &mut MultiresCrossEstimator| -> Vec<MotionEstimate> {
            frames
                .windows(2)
                .map(|w| est.estimate(w[1].view(), w[0].view()).unwrap())
                .collect()
        };

        let mut a = created(res);
        let mut b = created(res);
        let first = run(&mut a);
        assert_eq!(first, run(&mut b));

        a.reset();
        assert_eq!(run(&mut a), first);
    }

    #[test]
    fn repeated_pair_ignores_intervening_estimates() {
        let res = Resolution::new(96, 96);
        let frames: Vec<Plane> = (0..6).map(|i| smooth(res, i * 3)).collect();
        let mut est = created(res);

        let first = est.estimate(frames[1].view(), frames[0].view()).unwrap();
        for w in frames[1..].windows(2) {
            est.estimate(w[1].view(), w[0].view()).unwrap();
        }
        let again = est.estimate(frames[1].view(), frames[0].view()).unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn retained_estimate_requires_prior_estimate() {
        let res = Resolution::new(32, 32);
        let mut est = created(res);
        let a = smooth(res, 0);
        let b = smooth(res, 3);
        assert_eq!(est.estimate_retained(a.view()).unwrap_err(), EstimatorError::NotReady);

        est.estimate(a.view(), a.view()).unwrap();
        let continued = est.estimate_retained(b.view()).unwrap();

        let mut fresh = created(res);
        fresh.estimate(a.view(), a.view()).unwrap();
        assert_eq!(fresh.estimate(b.view(), a.view()).unwrap(), continued);

        est.reset();
        assert_eq!(est.estimate_retained(b.view()).unwrap_err(), EstimatorError::NotReady);
    }

    #[test]
    fn memory_limit_fails_create_and_keeps_instance_unready() {
        let res = Resolution::CIF;
        let cfg = EstimatorConfig {
            memory_limit: Some(res.pixel_count() as usize / 2),
            ..config()
        };
        let mut est = MultiresCrossEstimator::new(res, &cfg).unwrap();
        assert!(matches!(
            est.create(),
            Err(EstimatorError::AllocationFailure { .. })
        ));
        assert_eq!(est.state(), EstimatorState::Uninitialized);
        let p = Plane::new(res);
        assert_eq!(est.estimate(p.view(), p.view()).unwrap_err(), EstimatorError::NotReady);
    }
}
