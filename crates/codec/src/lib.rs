//! `rtv-codec`: Codec session, named-property registry and control surface.
//!
//! This crate ties the control plane together:
//! - [`CodecSession`]: owns the registry, control parameters, one motion
//!   estimator and one frame coder; drives per-frame key-frame decisions,
//!   motion search and rate control
//! - [`PropertyHandle`] / [`ControlHandle`]: non-owning operator handles
//! - [`PropertyRegistry`]: named, typed slots with stable ordinal enumeration
//! - [`RateController`]: quantizer adaptation against the advisory bit limit
//! - [`ReferenceCoder`]: a small lossy block coder used as the default
//!   [`FrameCoder`](rtv_common::FrameCoder)
//! - `config`: JSON session configuration loading and validation

pub mod access;
pub mod coder;
pub mod config;
pub mod error;
pub mod rate;
pub mod registry;
pub mod session;
mod state;

pub use access::{ControlHandle, PropertyHandle};
pub use coder::ReferenceCoder;
pub use config::{from_json_string, load_config, validate_config};
pub use error::{ConfigError, ConfigResult};
pub use rate::RateController;
pub use registry::PropertyRegistry;
pub use session::{CodecSession, SessionStats};
