//! State shared between a session and its access handles.
//!
//! Everything an operator may touch between frames lives behind one
//! `parking_lot::Mutex`. The encode/decode path snapshots what it needs and
//! marks itself in flight; handle calls made while a call is in flight fail
//! with `InvalidState` instead of racing it.

use std::sync::Arc;

use parking_lot::Mutex;
use rtv_common::{
    CodecError, CodecResult, ControlParameters, PropertyError, PropertyValue, MAX_QUALITY,
    MIN_QUALITY,
};
use tracing::warn;

use crate::registry::PropertyRegistry;

pub(crate) type SharedState = Arc<Mutex<SessionState>>;

pub(crate) const QUALITY: &str = "quality";
pub(crate) const GOP: &str = "gop";
pub(crate) const AUTO_I_PICTURE: &str = "autoipicture";
pub(crate) const MOTION_MODE: &str = "motionmode";
pub(crate) const QTABLE: &str = "qtable";

/// Accepted ranges for operator-writable properties.
#[derive(Clone, Debug)]
pub(crate) struct ValueLimits {
    pub min_quality: u8,
    pub max_quality: u8,
    pub motion_modes: Vec<u32>,
}

impl Default for ValueLimits {
    fn default() -> Self {
        Self {
            min_quality: MIN_QUALITY,
            max_quality: MAX_QUALITY,
            motion_modes: vec![0],
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub open: bool,
    pub registry: PropertyRegistry,
    pub controls: ControlParameters,
    /// Name of the encode/decode call currently running, if any.
    pub in_flight: Option<&'static str>,
    pub last_error: Option<String>,
    pub limits: ValueLimits,
}

impl SessionState {
    pub fn shared() -> SharedState {
        Arc::new(Mutex::new(Self::default()))
    }

    /// Reject control-plane calls while an encode/decode call is running.
    pub fn check_idle(&self, operation: &str) -> CodecResult<()> {
        match self.in_flight {
            Some(running) => {
                warn!(operation, running, "Control-plane call during in-flight call");
                Err(CodecError::invalid_state(operation))
            }
            None => Ok(()),
        }
    }

    pub fn check_open(&self) -> CodecResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(CodecError::NotOpen)
        }
    }

    /// Update the last-error side channel from a call's outcome.
    pub fn record<T>(&mut self, result: CodecResult<T>) -> CodecResult<T> {
        match &result {
            Ok(_) => self.last_error = None,
            Err(e) => self.last_error = Some(e.to_string()),
        }
        result
    }

    /// Content checks for operator-writable slots, applied after the shape check.
    pub fn validate(&self, name: &str, value: &PropertyValue) -> Result<(), PropertyError> {
        let invalid = |reason: String| PropertyError::InvalidValue {
            name: name.to_string(),
            reason,
        };
        let scalar = value.as_int();
        match name {
            QUALITY => match scalar {
                Some(q)
                    if (self.limits.min_quality as i32..=self.limits.max_quality as i32)
                        .contains(&q) =>
                {
                    Ok(())
                }
                _ => Err(invalid(format!(
                    "expected {}..={}",
                    self.limits.min_quality, self.limits.max_quality
                ))),
            },
            GOP | AUTO_I_PICTURE => match scalar {
                Some(v) if v >= 0 => Ok(()),
                _ => Err(invalid("expected a non-negative value".to_string())),
            },
            MOTION_MODE => match scalar {
                Some(m) if m >= 0 && self.limits.motion_modes.contains(&(m as u32)) => Ok(()),
                _ => Err(invalid(format!(
                    "unsupported mode, expected one of {:?}",
                    self.limits.motion_modes
                ))),
            },
            QTABLE => match value.as_ints() {
                Some(table) if table.iter().all(|w| (1..=255).contains(w)) => Ok(()),
                _ => Err(invalid("weights must be in 1..=255".to_string())),
            },
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_flight_rejects_calls() {
        let mut state = SessionState::default();
        assert!(state.check_idle("set_group_id").is_ok());
        state.in_flight = Some("encode");
        let err = state.check_idle("set_group_id").unwrap_err();
        assert!(matches!(err, CodecError::InvalidState { .. }));
    }

    #[test]
    fn record_sets_and_clears_last_error() {
        let mut state = SessionState::default();
        let _ = state.record::<()>(Err(CodecError::NotOpen));
        assert_eq!(state.last_error.as_deref(), Some("Codec session is not open"));
        let _ = state.record(Ok(()));
        assert!(state.last_error.is_none());
    }

    #[test]
    fn validates_dynamic_values() {
        let mut state = SessionState::default();
        state.limits.motion_modes = vec![0, 1, 2];
        assert!(state.validate(QUALITY, &PropertyValue::int(12)).is_ok());
        assert!(state.validate(QUALITY, &PropertyValue::int(0)).is_err());
        assert!(state.validate(GOP, &PropertyValue::int(-1)).is_err());
        assert!(state.validate(MOTION_MODE, &PropertyValue::int(2)).is_ok());
        assert!(state.validate(MOTION_MODE, &PropertyValue::int(3)).is_err());
        assert!(state
            .validate(QTABLE, &PropertyValue::Int(vec![16; 16]))
            .is_ok());
        assert!(state
            .validate(QTABLE, &PropertyValue::Int(vec![0; 16]))
            .is_err());
        assert!(state.validate("width", &PropertyValue::int(-5)).is_ok());
    }
}
