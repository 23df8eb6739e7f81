//! Non-owning handles onto a session's property registry and control surface.
//!
//! Handles hold a weak reference: they never keep a session alive, and any
//! call made after the session has been dropped fails with `SessionClosed`.
//! Every call updates the session's last-error string.

use std::sync::Weak;

use parking_lot::Mutex;
use rtv_common::{
    CodecError, CodecResult, PropertyDescriptor, PropertyError, PropertyKind, PropertyValue,
    PropertyView, MEMBERS,
};
use tracing::debug;

use crate::state::SessionState;

fn with_state<T>(
    state: &Weak<Mutex<SessionState>>,
    f: impl FnOnce(&mut SessionState) -> CodecResult<T>,
) -> CodecResult<T> {
    let shared = state.upgrade().ok_or(CodecError::SessionClosed)?;
    let mut guard = shared.lock();
    let result = f(&mut *guard);
    guard.record(result)
}

fn last_error(state: &Weak<Mutex<SessionState>>) -> Option<String> {
    state.upgrade().and_then(|s| s.lock().last_error.clone())
}

/// Name resolution comes first so unknown names report `NotFound` in any
/// session state.
fn resolve(state: &SessionState, name: &str) -> Result<(), PropertyError> {
    if name == MEMBERS {
        return Ok(());
    }
    state.registry.descriptor(name).map(|_| ())
}

// ---------------------------------------------------------------------------
// PropertyHandle
// ---------------------------------------------------------------------------

/// Named-member access to a session's properties.
#[derive(Clone, Debug)]
pub struct PropertyHandle {
    state: Weak<Mutex<SessionState>>,
}

impl PropertyHandle {
    pub(crate) fn new(state: Weak<Mutex<SessionState>>) -> Self {
        Self { state }
    }

    /// Owned snapshot of a member. `"members"` yields the member count.
    pub fn get(&self, name: &str) -> CodecResult<PropertyValue> {
        with_state(&self.state, |s| {
            resolve(s, name)?;
            s.check_idle("get")?;
            Ok(s.registry.get(name)?)
        })
    }

    /// Run `f` on a borrowed view of a member's live storage.
    ///
    /// The view cannot escape the closure, so it is never held across a
    /// write or an encode/decode call.
    pub fn with_view<T>(&self, name: &str, f: impl FnOnce(PropertyView<'_>) -> T) -> CodecResult<T> {
        with_state(&self.state, |s| {
            resolve(s, name)?;
            s.check_idle("with_view")?;
            Ok(f(s.registry.view(name)?))
        })
    }

    /// Member name at `ordinal`, valid for `0..count()`.
    pub fn name_at(&self, ordinal: usize) -> CodecResult<String> {
        with_state(&self.state, |s| {
            let name = s.registry.name_at(ordinal)?.to_string();
            s.check_idle("name_at")?;
            Ok(name)
        })
    }

    /// Number of enumerable members.
    pub fn count(&self) -> CodecResult<usize> {
        with_state(&self.state, |s| {
            s.check_idle("count")?;
            Ok(s.registry.count())
        })
    }

    /// All member names in ordinal order.
    pub fn names(&self) -> CodecResult<Vec<String>> {
        with_state(&self.state, |s| {
            s.check_idle("names")?;
            Ok(s.registry.descriptors().map(|d| d.name.clone()).collect())
        })
    }

    pub fn descriptor(&self, name: &str) -> CodecResult<PropertyDescriptor> {
        with_state(&self.state, |s| {
            let descriptor = s.registry.descriptor(name)?.clone();
            s.check_idle("descriptor")?;
            Ok(descriptor)
        })
    }

    /// Overwrite a member. Takes effect at the next encode/decode call; on
    /// any error the member is left unchanged.
    pub fn set(&self, name: &str, value: PropertyValue) -> CodecResult<()> {
        with_state(&self.state, |s| {
            resolve(s, name)?;
            s.check_idle("set")?;
            s.registry.check_write(name, &value)?;
            s.validate(name, &value)?;
            s.registry.set(name, value)?;
            debug!(property = name, "Property updated");
            Ok(())
        })
    }

    /// Convenience for scalar integer members.
    pub fn get_int(&self, name: &str) -> CodecResult<i32> {
        with_state(&self.state, |s| {
            resolve(s, name)?;
            s.check_idle("get")?;
            let view = s.registry.view(name)?;
            let err = match view.kind() {
                PropertyKind::Int => PropertyError::LengthMismatch {
                    name: name.to_string(),
                    expected: 1,
                    got: view.element_count(),
                },
                got => PropertyError::TypeMismatch {
                    name: name.to_string(),
                    expected: PropertyKind::Int,
                    got,
                },
            };
            view.as_int().ok_or_else(|| err.into())
        })
    }

    pub fn set_int(&self, name: &str, value: i32) -> CodecResult<()> {
        self.set(name, PropertyValue::int(value))
    }

    /// Description of the most recent failing call, cleared by the next success.
    pub fn last_error(&self) -> Option<String> {
        last_error(&self.state)
    }
}

// ---------------------------------------------------------------------------
// ControlHandle
// ---------------------------------------------------------------------------

/// Rate-control and key-frame scheduling surface.
///
/// Only valid while the session is open and no encode/decode call is in
/// flight.
#[derive(Clone, Debug)]
pub struct ControlHandle {
    state: Weak<Mutex<SessionState>>,
}

impl ControlHandle {
    pub(crate) fn new(state: Weak<Mutex<SessionState>>) -> Self {
        Self { state }
    }

    fn control<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut SessionState) -> T,
    ) -> CodecResult<T> {
        with_state(&self.state, |s| {
            s.check_open()?;
            s.check_idle(operation)?;
            Ok(f(s))
        })
    }

    pub fn frame_bit_limit(&self) -> CodecResult<u32> {
        self.control("frame_bit_limit", |s| s.controls.frame_bit_limit)
    }

    /// Advisory per-frame budget in bits; 0 means best effort.
    pub fn set_frame_bit_limit(&self, bits: u32) -> CodecResult<()> {
        self.control("set_frame_bit_limit", |s| {
            s.controls.frame_bit_limit = bits;
            debug!(bits, "Frame bit limit set");
        })
    }

    pub fn group_id(&self) -> CodecResult<i32> {
        self.control("group_id", |s| s.controls.group_id)
    }

    pub fn set_group_id(&self, id: i32) -> CodecResult<()> {
        self.control("set_group_id", |s| s.controls.group_id = id)
    }

    /// Schedule a forced key frame. Repeated requests before the next frame
    /// collapse into one.
    pub fn generate_idr(&self) -> CodecResult<()> {
        self.control("generate_idr", |s| {
            if s.controls.request_idr() {
                debug!("Forced key frame scheduled");
            }
        })
    }

    pub fn idr_pending(&self) -> CodecResult<bool> {
        self.control("idr_pending", |s| s.controls.idr_pending)
    }

    pub fn last_error(&self) -> Option<String> {
        last_error(&self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SharedState;
    use std::sync::Arc;

    fn open_state() -> SharedState {
        let shared = SessionState::shared();
        {
            let mut s = shared.lock();
            s.registry
                .register(
                    PropertyDescriptor::scalar("width", PropertyKind::Int).read_only(),
                    PropertyValue::int(640),
                )
                .unwrap();
            s.registry
                .register(
                    PropertyDescriptor::scalar("height", PropertyKind::Int).read_only(),
                    PropertyValue::int(480),
                )
                .unwrap();
            s.registry.seal();
            s.open = true;
        }
        shared
    }

    #[test]
    fn property_handle_reads_and_enumerates() {
        let shared = open_state();
        let props = PropertyHandle::new(Arc::downgrade(&shared));
        assert_eq!(props.get_int(MEMBERS).unwrap(), 2);
        assert_eq!(props.name_at(0).unwrap(), "width");
        assert_eq!(props.name_at(1).unwrap(), "height");
        assert_eq!(props.names().unwrap(), vec!["width", "height"]);
        assert_eq!(props.with_view("height", |v| v.as_int()).unwrap(), Some(480));
    }

    #[test]
    fn last_error_tracks_failures() {
        let shared = open_state();
        let props = PropertyHandle::new(Arc::downgrade(&shared));
        assert!(props.get("no-such-name").unwrap_err().is_not_found());
        let msg = props.last_error().unwrap();
        assert!(msg.contains("no-such-name"));
        props.get("width").unwrap();
        assert!(props.last_error().is_none());
        assert!(matches!(
            props.set("width", PropertyValue::int(1)),
            Err(CodecError::Property(PropertyError::ReadOnly { .. }))
        ));
        assert!(props.last_error().unwrap().contains("read-only"));
    }

    #[test]
    fn in_flight_calls_are_rejected_but_unknown_names_are_not_found() {
        let shared = open_state();
        let props = PropertyHandle::new(Arc::downgrade(&shared));
        let controls = ControlHandle::new(Arc::downgrade(&shared));
        shared.lock().in_flight = Some("encode");

        assert!(matches!(props.get("width"), Err(CodecError::InvalidState { .. })));
        assert!(props.get("no-such-name").unwrap_err().is_not_found());
        assert!(matches!(controls.generate_idr(), Err(CodecError::InvalidState { .. })));
        assert!(!shared.lock().controls.idr_pending);
    }

    #[test]
    fn controls_require_open_session() {
        let shared = SessionState::shared();
        let controls = ControlHandle::new(Arc::downgrade(&shared));
        assert!(matches!(controls.set_group_id(3), Err(CodecError::NotOpen)));
        shared.lock().open = true;
        controls.set_group_id(3).unwrap();
        assert_eq!(controls.group_id().unwrap(), 3);
    }

    #[test]
    fn dropped_session_closes_handles() {
        let shared = open_state();
        let props = PropertyHandle::new(Arc::downgrade(&shared));
        let controls = ControlHandle::new(Arc::downgrade(&shared));
        drop(shared);
        assert!(matches!(props.get("width"), Err(CodecError::SessionClosed)));
        assert!(matches!(controls.generate_idr(), Err(CodecError::SessionClosed)));
        assert!(props.last_error().is_none());
    }
}
