//! `rtv-motion`: Block-matching motion estimators behind a common lifecycle.
//!
//! This crate provides:
//! - The [`MotionEstimator`] trait that all estimators implement
//! - An [`EstimatorRegistry`] for by-name construction and capability listing
//! - SAD block metrics with edge-clamped reference reads
//! - Two built-in estimators:
//!
//! ## `full_search`
//! Exhaustive search of every full-pel displacement in the window
//! (modes: auto, exhaustive, half range).
//!
//! ## `multires_cross`
//! Cross search on a subsampled pyramid with refinement at finer levels
//! and noise-floor vector weighting
//! (modes: auto, level 1, level 2).

pub mod full_search;
pub mod lifecycle;
pub mod metric;
pub mod multires;
pub mod pyramid;
pub mod registry;
pub mod traits;

#[cfg(test)]
mod test_pictures;

// Re-export primary types at crate root.
pub use full_search::FullSearchEstimator;
pub use lifecycle::EstimatorState;
pub use metric::{block_sad, BlockRect};
pub use multires::{MultiresCrossEstimator, MultiresMode};
pub use registry::{EstimatorFactory, EstimatorRegistry};
pub use traits::MotionEstimator;

#[cfg(test)]
mod tests {
    use rtv_common::{EstimationMode, EstimatorConfig, Plane, Resolution};

    use super::*;
    use crate::test_pictures::{shifted, smooth};

    #[test]
    fn every_builtin_follows_the_lifecycle() {
        let registry = EstimatorRegistry::with_builtins();
        let res = Resolution::new(64, 48);
        let a = smooth(res, 0);
        let b = shifted(&a, 2, 0);

        for name in registry.names() {
            let cfg = EstimatorConfig {
                kind: name.to_string(),
                block_size: 16,
                search_range: 8,
                ..EstimatorConfig::default()
            };
            let mut est = registry.build(res, &cfg).unwrap();
            assert!(est.ready(), "{name}");
            assert_eq!(est.mode(), EstimationMode::AUTO);

            let first = est.estimate(b.view(), a.view()).unwrap();
            assert_eq!(first.field.len(), 12, "{name}");

            est.reset();
            let again = est.estimate(b.view(), a.view()).unwrap();
            assert_eq!(first, again, "{name}");

            let blank = Plane::new(Resolution::new(8, 8));
            assert!(est.estimate(blank.view(), blank.view()).is_err());
        }
    }
}
