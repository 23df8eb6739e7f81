//! Session configuration loading and validation.

use std::path::Path;

use rtv_common::{SessionConfig, MAX_QUALITY, MIN_QUALITY};
use rtv_motion::EstimatorRegistry;
use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};

/// Largest motion vector component the reference coder can carry.
pub const MAX_SEARCH_RANGE: u32 = i8::MAX as u32;

/// Largest supported block edge in pixels.
pub const MAX_BLOCK_SIZE: u32 = 64;

/// Deserialize a session configuration from a JSON string.
///
/// Missing fields take their defaults; the result is validated.
pub fn from_json_string(json: &str) -> ConfigResult<SessionConfig> {
    let config: SessionConfig = serde_json::from_str(json)?;

    debug!(
        codec = %config.codec_name,
        resolution = %config.resolution,
        estimator = %config.estimator.kind,
        "Deserialized session config from JSON"
    );

    validate_config(&config)?;
    Ok(config)
}

/// Load a session configuration from a JSON file.
pub fn load_config(path: &Path) -> ConfigResult<SessionConfig> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.display().to_string(),
        });
    }

    let json = std::fs::read_to_string(path).map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "Failed to read config file");
        ConfigError::Io(e)
    })?;

    let config = from_json_string(&json)?;

    info!(
        path = %path.display(),
        resolution = %config.resolution,
        estimator = %config.estimator.kind,
        "Session config loaded"
    );

    Ok(config)
}

/// Check that a configuration describes a session that can be opened.
pub fn validate_config(config: &SessionConfig) -> ConfigResult<()> {
    let res = config.resolution;
    if res.width == 0 || res.height == 0 {
        return Err(ConfigError::invalid(format!("invalid resolution: {res}")));
    }

    if config.codec_name.is_empty() {
        return Err(ConfigError::invalid("codec name is empty"));
    }

    let est = &config.estimator;
    if est.block_size == 0 || est.block_size > MAX_BLOCK_SIZE {
        return Err(ConfigError::invalid(format!(
            "block size {} outside 1..={MAX_BLOCK_SIZE}",
            est.block_size
        )));
    }
    if est.search_range > MAX_SEARCH_RANGE {
        return Err(ConfigError::invalid(format!(
            "search range {} exceeds {MAX_SEARCH_RANGE}",
            est.search_range
        )));
    }

    let registry = EstimatorRegistry::with_builtins();
    let Some(modes) = registry.capabilities(&est.kind) else {
        return Err(ConfigError::invalid(format!(
            "unknown motion estimator '{}'",
            est.kind
        )));
    };
    if !modes.iter().any(|m| m.mode.0 == est.mode) {
        return Err(ConfigError::invalid(format!(
            "estimator '{}' does not support mode {}",
            est.kind, est.mode
        )));
    }

    let rate = &config.rate;
    if rate.min_quality < MIN_QUALITY
        || rate.max_quality > MAX_QUALITY
        || rate.min_quality > rate.max_quality
    {
        return Err(ConfigError::invalid(format!(
            "quality bounds {}..={} outside {MIN_QUALITY}..={MAX_QUALITY}",
            rate.min_quality, rate.max_quality
        )));
    }
    if !(rate.min_quality..=rate.max_quality).contains(&rate.quality) {
        return Err(ConfigError::invalid(format!(
            "initial quality {} outside {}..={}",
            rate.quality, rate.min_quality, rate.max_quality
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtv_common::Resolution;

    #[test]
    fn defaults_validate() {
        validate_config(&SessionConfig::default()).unwrap();
    }

    #[test]
    fn from_json_string_fills_defaults() {
        let cfg = from_json_string(
            r#"{"resolution":{"width":64,"height":48},"estimator":{"kind":"full_search","block_size":8}}"#,
        )
        .unwrap();
        assert_eq!(cfg.resolution, Resolution::new(64, 48));
        assert_eq!(cfg.estimator.kind, "full_search");
        assert_eq!(cfg.estimator.block_size, 8);
        assert_eq!(cfg.codec_name, "rtv-ref");
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            from_json_string("not json"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn rejects_invalid_settings() {
        let mut cfg = SessionConfig::new(Resolution::new(0, 48));
        assert!(validate_config(&cfg).is_err());

        cfg = SessionConfig::default();
        cfg.estimator.kind = "diamond".into();
        let err = validate_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("diamond"));

        cfg = SessionConfig::default();
        cfg.estimator.mode = 9;
        assert!(validate_config(&cfg).is_err());

        cfg = SessionConfig::default();
        cfg.estimator.search_range = 200;
        assert!(validate_config(&cfg).is_err());

        cfg = SessionConfig::default();
        cfg.rate.quality = 40;
        assert!(validate_config(&cfg).is_err());

        cfg = SessionConfig::default();
        cfg.rate.min_quality = 20;
        cfg.rate.max_quality = 10;
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn load_config_missing_file() {
        let err = load_config(Path::new("/nonexistent/rtv/session.json")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"{"gop_length": 12, "rate": {"quality": 10}}"#).unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.gop_length, 12);
        assert_eq!(cfg.rate.quality, 10);
        assert_eq!(cfg.resolution, Resolution::CIF);
    }
}
