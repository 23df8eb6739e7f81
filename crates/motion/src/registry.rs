//! Estimator registry: by-name construction and capability listing.

use std::collections::HashMap;

use rtv_common::{EstimationMode, EstimatorConfig, EstimatorError, ModeInfo, Resolution};
use tracing::{debug, info};

use crate::full_search::{self, FullSearchEstimator};
use crate::multires::{self, MultiresCrossEstimator};
use crate::traits::MotionEstimator;

/// Builds an unconfigured estimator instance.
pub type EstimatorFactory =
    fn(Resolution, &EstimatorConfig) -> Result<Box<dyn MotionEstimator>, EstimatorError>;

struct Entry {
    factory: EstimatorFactory,
    capabilities: Vec<ModeInfo>,
}

/// Registry of available motion estimators, looked up by name.
pub struct EstimatorRegistry {
    entries: HashMap<String, Entry>,
}

impl EstimatorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Create a registry with all built-in estimators registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        registry.register(
            full_search::NAME,
            |res, cfg| Ok(Box::new(FullSearchEstimator::new(res, cfg)?)),
            FullSearchEstimator::mode_table(),
        );
        registry.register(
            multires::NAME,
            |res, cfg| Ok(Box::new(MultiresCrossEstimator::new(res, cfg)?)),
            MultiresCrossEstimator::mode_table(),
        );

        info!(
            count = registry.entries.len(),
            "Registered built-in motion estimators"
        );

        registry
    }

    /// Register an estimator. Overwrites any previous entry with the same name.
    pub fn register(
        &mut self,
        name: &str,
        factory: EstimatorFactory,
        capabilities: Vec<ModeInfo>,
    ) {
        self.entries.insert(
            name.to_string(),
            Entry {
                factory,
                capabilities,
            },
        );
    }

    /// Construct and `create()` the estimator named by `config.kind`, then
    /// apply `config.mode`.
    pub fn build(
        &self,
        resolution: Resolution,
        config: &EstimatorConfig,
    ) -> Result<Box<dyn MotionEstimator>, EstimatorError> {
        let entry = self
            .entries
            .get(&config.kind)
            .ok_or_else(|| EstimatorError::UnknownEstimator {
                name: config.kind.clone(),
            })?;

        let mut estimator = (entry.factory)(resolution, config)?;
        estimator.create()?;
        estimator.set_mode(EstimationMode(config.mode))?;

        debug!(
            estimator = %config.kind,
            resolution = %resolution,
            block_size = config.block_size,
            mode = %EstimationMode(config.mode),
            "Built motion estimator"
        );
        Ok(estimator)
    }

    /// Mode values accepted by the named estimator.
    pub fn capabilities(&self, name: &str) -> Option<&[ModeInfo]> {
        self.entries.get(name).map(|e| e.capabilities.as_slice())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for EstimatorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
