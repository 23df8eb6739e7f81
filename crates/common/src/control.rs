//! Rate-control and key-frame scheduling parameters.

use serde::{Deserialize, Serialize};

/// Operator-controlled parameters consulted once per encode call.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlParameters {
    /// Advisory per-frame bit budget; 0 = no explicit limit.
    pub frame_bit_limit: u32,
    /// Opaque stream grouping tag for the multiplexing layer.
    pub group_id: i32,
    /// One-shot forced key frame request.
    pub idr_pending: bool,
}

impl ControlParameters {
    pub fn new(frame_bit_limit: u32, group_id: i32) -> Self {
        Self {
            frame_bit_limit,
            group_id,
            idr_pending: false,
        }
    }

    /// Request a forced key frame. Returns `true` if the request was newly
    /// scheduled, `false` if one was already pending.
    pub fn request_idr(&mut self) -> bool {
        let newly = !self.idr_pending;
        self.idr_pending = true;
        newly
    }

    /// Clear the pending request once the forced frame has been produced.
    pub fn acknowledge_idr(&mut self) {
        self.idr_pending = false;
    }

    /// The bit limit as an `Option`, mapping the "best effort" 0 to `None`.
    pub fn bit_limit(&self) -> Option<u32> {
        (self.frame_bit_limit > 0).then_some(self.frame_bit_limit)
    }
}
