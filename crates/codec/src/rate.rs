//! Frame-level rate control.
//!
//! The operator sets a base quantizer index through the `quality` property.
//! With no bit limit the base is used unchanged. With a limit, the index is
//! nudged after every frame: coarser when the last frame overshot the
//! budget, finer when it came in well under it.

use rtv_common::RateConfig;
use tracing::trace;

/// Overshoot (in percent of the limit) that triggers a coarser quantizer.
const OVERSHOOT_PERCENT: u64 = 110;
/// Overshoot that triggers a double step.
const LARGE_OVERSHOOT_PERCENT: u64 = 150;
/// Undershoot below which the quantizer is refined.
const UNDERSHOOT_PERCENT: u64 = 70;

/// Per-session rate controller.
#[derive(Clone, Debug)]
pub struct RateController {
    min_quality: u8,
    max_quality: u8,
    /// Operator base index most recently seen.
    base: u8,
    /// Index the next frame will be coded at.
    current: u8,
    last_bits: Option<u64>,
}

impl RateController {
    pub fn new(config: &RateConfig) -> Self {
        let base = config.quality.clamp(config.min_quality, config.max_quality);
        Self {
            min_quality: config.min_quality,
            max_quality: config.max_quality,
            base,
            current: base,
            last_bits: None,
        }
    }

    pub fn min_quality(&self) -> u8 {
        self.min_quality
    }

    pub fn max_quality(&self) -> u8 {
        self.max_quality
    }

    /// Clamp an operator value into the configured quantizer range.
    pub fn clamp(&self, quality: i32) -> u8 {
        quality.clamp(self.min_quality as i32, self.max_quality as i32) as u8
    }

    /// Choose the quantizer index for the next frame.
    ///
    /// A change of the operator `base` restarts adaptation from it.
    pub fn next_quality(&mut self, base: u8, bit_limit: Option<u32>) -> u8 {
        let base = base.clamp(self.min_quality, self.max_quality);
        if base != self.base {
            self.base = base;
            self.current = base;
        }

        let (Some(limit), Some(bits)) = (bit_limit, self.last_bits) else {
            self.current = self.base;
            return self.current;
        };

        let limit = limit as u64;
        let step = if bits * 100 > limit * LARGE_OVERSHOOT_PERCENT {
            2
        } else if bits * 100 > limit * OVERSHOOT_PERCENT {
            1
        } else if bits * 100 < limit * UNDERSHOOT_PERCENT {
            -1
        } else {
            0
        };
        let next = self.clamp(self.current as i32 + step);
        trace!(bits, limit, from = self.current, to = next, "Rate control step");
        self.current = next;
        self.current
    }

    /// Record the size of the frame just produced.
    pub fn frame_coded(&mut self, bits: u64) {
        self.last_bits = Some(bits);
    }

    /// Forget size history (after restart).
    pub fn reset(&mut self) {
        self.last_bits = None;
        self.current = self.base;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> RateController {
        RateController::new(&RateConfig {
            quality: 8,
            min_quality: 2,
            max_quality: 20,
            ..RateConfig::default()
        })
    }

    #[test]
    fn best_effort_uses_base() {
        let mut rc = controller();
        rc.frame_coded(1_000_000);
        assert_eq!(rc.next_quality(8, None), 8);
        assert_eq!(rc.next_quality(50, None), 20);
        assert_eq!(rc.next_quality(0, None), 2);
    }

    #[test]
    fn first_frame_has_no_history() {
        let mut rc = controller();
        assert_eq!(rc.next_quality(8, Some(1000)), 8);
    }

    #[test]
    fn overshoot_coarsens_and_undershoot_refines() {
        let mut rc = controller();
        rc.frame_coded(1200);
        assert_eq!(rc.next_quality(8, Some(1000)), 9);
        rc.frame_coded(2000);
        assert_eq!(rc.next_quality(8, Some(1000)), 11);
        rc.frame_coded(500);
        assert_eq!(rc.next_quality(8, Some(1000)), 10);
        rc.frame_coded(1000);
        assert_eq!(rc.next_quality(8, Some(1000)), 10);
    }

    #[test]
    fn adaptation_is_bounded() {
        let mut rc = controller();
        for _ in 0..20 {
            rc.frame_coded(10_000);
            rc.next_quality(8, Some(100));
        }
        assert_eq!(rc.next_quality(8, Some(100)), 20);
    }

    #[test]
    fn base_change_restarts_adaptation() {
        let mut rc = controller();
        rc.frame_coded(5000);
        assert_eq!(rc.next_quality(8, Some(1000)), 10);
        rc.frame_coded(1000);
        assert_eq!(rc.next_quality(4, Some(1000)), 4);
        rc.reset();
        assert_eq!(rc.next_quality(4, Some(1000)), 4);
    }
}
