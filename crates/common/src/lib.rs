//! `rtv-common`: Shared types, traits, and errors for the encoder control plane.
//!
//! This crate is the foundation that the motion and codec crates depend on.
//! It defines the core abstractions:
//!
//! - **Types**: `FrameNumber`, `Resolution` (newtypes for safety)
//! - **Images**: `Plane`, `PlaneRef` (8-bit luma sample planes)
//! - **Properties**: `PropertyDescriptor`, `PropertyValue`, `PropertyView` (named-member protocol)
//! - **Motion**: `MotionVector`, `MotionField`, `MotionEstimate`, `EstimationMode`
//! - **Control**: `ControlParameters` (bit budget, group id, pending IDR)
//! - **Coder**: `FrameCoder` (boundary to the external coding pipeline)
//! - **Errors**: `CodecError`, `PropertyError`, `EstimatorError` (thiserror-based)
//! - **Config**: `SessionConfig`, `EstimatorConfig`, `RateConfig`

pub mod coder;
pub mod config;
pub mod control;
pub mod error;
pub mod image;
pub mod motion;
pub mod property;
pub mod types;

// Re-export commonly used items at crate root
pub use coder::{CodeRequest, CodedFrame, FrameCoder};
pub use config::{EstimatorConfig, RateConfig, SessionConfig, MAX_QUALITY, MIN_QUALITY};
pub use control::ControlParameters;
pub use error::{CodecError, CodecResult, EstimatorError, ImageError, PropertyError};
pub use image::{Plane, PlaneRef};
pub use motion::{EstimationMode, ModeInfo, MotionEstimate, MotionField, MotionVector};
pub use property::{
    PropertyAccess, PropertyDescriptor, PropertyKind, PropertyValue, PropertyView, MEMBERS,
};
pub use types::{FrameNumber, Resolution};
