//! Codec session: the owning context for the control plane.
//!
//! `CodecSession` owns the property registry, the control parameters, one
//! motion estimator and one frame coder. Operators reach the registry and
//! the control surface through [`PropertyHandle`] and [`ControlHandle`],
//! which never keep the session alive.
//!
//! Each `encode` call snapshots the operator-visible settings, marks itself
//! in flight, decides the frame type, runs motion search and rate control,
//! hands the frame to the coder and finally publishes the observability
//! properties. Writes made between calls take effect at the next call.

use std::path::Path;
use std::sync::Arc;

use rtv_common::{
    CodeRequest, CodecError, CodecResult, CodedFrame, ControlParameters, EstimationMode,
    EstimatorError, FrameCoder, FrameNumber, ModeInfo, Plane, PlaneRef, PropertyDescriptor,
    PropertyError, PropertyKind, PropertyValue, SessionConfig,
};
use rtv_motion::{EstimatorRegistry, MotionEstimator};
use tracing::{debug, info, warn};

use crate::access::{ControlHandle, PropertyHandle};
use crate::coder::{ReferenceCoder, QTABLE_LEN, UNITY_WEIGHT};
use crate::config::{load_config, validate_config};
use crate::rate::RateController;
use crate::registry::PropertyRegistry;
use crate::state::{
    SessionState, SharedState, ValueLimits, AUTO_I_PICTURE, GOP, MOTION_MODE, QTABLE, QUALITY,
};

const WIDTH: &str = "width";
const HEIGHT: &str = "height";
const MACROBLOCKS: &str = "macroblocks";
const CODEC_NAME: &str = "codecname";
const ESTIMATOR: &str = "estimator";
const MOTION_MODES: &str = "motionmodes";
const FRAME_BITS: &str = "framebits";
const DISTORTION: &str = "distortion";
const FRAME_COUNT: &str = "framecount";
const KEYFRAMES: &str = "keyframes";
const MOTION_VECTORS: &str = "motionvectors";
const REFERENCE: &str = "reference";

// ---------------------------------------------------------------------------
// Session statistics
// ---------------------------------------------------------------------------

/// Counters accumulated since the session was last opened.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_encoded: u64,
    pub keyframes: u64,
    /// Key frames produced for a `generate_idr` request.
    pub forced_keyframes: u64,
    /// Inter frames promoted to key frames by the distortion threshold.
    pub scene_changes: u64,
    pub bits_written: u64,
    pub frames_decoded: u64,
}

impl SessionStats {
    /// Mean coded frame size in bits (0 before the first frame).
    pub fn average_frame_bits(&self) -> u64 {
        if self.frames_encoded == 0 {
            0
        } else {
            self.bits_written / self.frames_encoded
        }
    }
}

/// Why a frame was coded without prediction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum KeyFrameReason {
    /// First frame after open or restart.
    Start,
    Forced,
    Periodic,
    SceneChange,
    /// The estimator had nothing to predict from.
    NoReference,
}

/// Operator settings captured at the start of an encode call.
#[derive(Debug)]
struct FrameSettings {
    quality: i32,
    gop: u32,
    scene_change: u64,
    motion_mode: EstimationMode,
    qtable: Vec<i32>,
    controls: ControlParameters,
}

impl FrameSettings {
    fn snapshot(state: &SessionState) -> CodecResult<Self> {
        let int = |name: &str| {
            state.registry.int(name).ok_or_else(|| {
                CodecError::from(PropertyError::NotFound {
                    name: name.to_string(),
                })
            })
        };
        let qtable = match state.registry.get(QTABLE)? {
            PropertyValue::Int(table) => table,
            _ => Vec::new(),
        };
        Ok(Self {
            quality: int(QUALITY)?,
            gop: int(GOP)?.max(0) as u32,
            scene_change: int(AUTO_I_PICTURE)?.max(0) as u64,
            motion_mode: EstimationMode(int(MOTION_MODE)?.max(0) as u32),
            qtable,
            controls: state.controls,
        })
    }
}

/// Result of the unlocked part of an encode call.
struct FrameOutcome {
    frame: CodedFrame,
    distortion: u64,
    vectors: Vec<i32>,
    acknowledge_idr: bool,
}

fn saturating_i32(value: u64) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

// ---------------------------------------------------------------------------
// CodecSession
// ---------------------------------------------------------------------------

/// Owning encoder context.
///
/// # Usage
///
/// ```ignore
/// let mut session = CodecSession::new(SessionConfig::new(Resolution::VGA))?;
/// session.open()?;
///
/// let props = session.properties();
/// props.set_int("quality", 12)?;
/// session.controls().generate_idr()?;
///
/// for picture in pictures {
///     let frame = session.encode(picture.view())?;
///     sink.write(&frame.data)?;
/// }
/// session.close()?;
/// ```
pub struct CodecSession {
    config: SessionConfig,
    shared: SharedState,
    coder: Box<dyn FrameCoder>,
    estimators: EstimatorRegistry,
    /// Present only while open.
    estimator: Option<Box<dyn MotionEstimator>>,
    rate: RateController,
    frame_number: FrameNumber,
    /// Next frame must be a key frame (after open or restart).
    needs_key: bool,
    last_frame_bits: u64,
    stats: SessionStats,
}

impl std::fmt::Debug for CodecSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecSession")
            .field("codec", &self.config.codec_name)
            .field("resolution", &self.config.resolution)
            .field("estimator", &self.config.estimator.kind)
            .field("coder", &self.coder.name())
            .field("open", &self.is_open())
            .field("frame_number", &self.frame_number)
            .field("stats", &self.stats)
            .finish()
    }
}

impl CodecSession {
    /// Create a closed session using the built-in reference coder.
    ///
    /// # Errors
    /// Returns `CodecError::InvalidConfig` if the configuration is invalid.
    pub fn new(config: SessionConfig) -> CodecResult<Self> {
        Self::with_coder(config, Box::new(ReferenceCoder::new()))
    }

    /// Create a closed session driving an explicit frame coder.
    pub fn with_coder(config: SessionConfig, coder: Box<dyn FrameCoder>) -> CodecResult<Self> {
        validate_config(&config)?;

        info!(
            codec = %config.codec_name,
            resolution = %config.resolution,
            estimator = %config.estimator.kind,
            coder = coder.name(),
            "Codec session created"
        );

        Ok(Self {
            rate: RateController::new(&config.rate),
            config,
            shared: SessionState::shared(),
            coder,
            estimators: EstimatorRegistry::with_builtins(),
            estimator: None,
            frame_number: FrameNumber::ZERO,
            needs_key: true,
            last_frame_bits: 0,
            stats: SessionStats::default(),
        })
    }

    /// Load a JSON configuration file and create a closed session from it.
    pub fn from_config_file(path: &Path) -> CodecResult<Self> {
        let config = load_config(path)?;
        Self::new(config)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.shared.lock().open
    }

    /// Named-property handle. Valid for the lifetime of the session.
    pub fn properties(&self) -> PropertyHandle {
        PropertyHandle::new(Arc::downgrade(&self.shared))
    }

    /// Control-surface handle. Valid for the lifetime of the session.
    pub fn controls(&self) -> ControlHandle {
        ControlHandle::new(Arc::downgrade(&self.shared))
    }

    /// Description of the most recent failing call on this session or its handles.
    pub fn last_error(&self) -> Option<String> {
        self.shared.lock().last_error.clone()
    }

    /// Mode values accepted by the configured estimator.
    pub fn estimator_capabilities(&self) -> Vec<ModeInfo> {
        self.estimators
            .capabilities(&self.config.estimator.kind)
            .map(<[ModeInfo]>::to_vec)
            .unwrap_or_default()
    }

    /// Size of the most recently coded frame in bits.
    pub fn compressed_bit_length(&self) -> u64 {
        self.last_frame_bits
    }

    pub fn compressed_byte_length(&self) -> u64 {
        self.last_frame_bits.div_ceil(8)
    }

    pub fn stats(&self) -> SessionStats {
        self.stats.clone()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Build the estimator, open the coder and register the session properties.
    pub fn open(&mut self) -> CodecResult<()> {
        let result = self.try_open();
        self.shared.lock().record(result)
    }

    fn try_open(&mut self) -> CodecResult<()> {
        let already_open = self.shared.lock().open;
        if already_open {
            return Err(CodecError::AlreadyOpen);
        }

        let resolution = self.config.resolution;
        let block_size = self.config.estimator.block_size;
        let estimator = self.estimators.build(resolution, &self.config.estimator)?;
        self.coder.open(resolution, block_size)?;
        let registry = session_properties(&self.config, &*estimator)?;
        let members = registry.count();

        {
            let mut state = self.shared.lock();
            state.limits = ValueLimits {
                min_quality: self.config.rate.min_quality,
                max_quality: self.config.rate.max_quality,
                motion_modes: estimator.capabilities().iter().map(|m| m.mode.0).collect(),
            };
            state.registry = registry;
            state.controls = self.config.initial_controls();
            state.open = true;
        }

        self.estimator = Some(estimator);
        self.rate = RateController::new(&self.config.rate);
        self.frame_number = FrameNumber::ZERO;
        self.needs_key = true;
        self.last_frame_bits = 0;
        self.stats = SessionStats::default();

        info!(
            resolution = %resolution,
            block_size,
            members,
            coder = self.coder.name(),
            "Codec session opened"
        );
        Ok(())
    }

    /// Release the estimator and coder state and clear the registry.
    pub fn close(&mut self) -> CodecResult<()> {
        let mut state = self.shared.lock();
        if let Err(e) = state.check_open() {
            return state.record(Err(e));
        }
        *state = SessionState::default();
        self.coder.close();
        self.estimator = None;

        info!(
            frames = self.stats.frames_encoded,
            keyframes = self.stats.keyframes,
            bits = self.stats.bits_written,
            "Codec session closed"
        );
        state.record(Ok(()))
    }

    /// Drop all prediction state; the next frame is coded as a key frame.
    pub fn restart(&mut self) -> CodecResult<()> {
        let mut state = self.shared.lock();
        if let Err(e) = state.check_open() {
            return state.record(Err(e));
        }
        self.coder.restart();
        if let Some(estimator) = self.estimator.as_mut() {
            estimator.reset();
        }
        self.rate.reset();
        self.needs_key = true;

        info!(frame = %self.frame_number, "Codec session restarted");
        state.record(Ok(()))
    }

    // -----------------------------------------------------------------------
    // Frame calls
    // -----------------------------------------------------------------------

    /// Encode one picture.
    pub fn encode(&mut self, source: PlaneRef<'_>) -> CodecResult<CodedFrame> {
        let settings = {
            let mut state = self.shared.lock();
            match state
                .check_open()
                .and_then(|()| FrameSettings::snapshot(&state))
            {
                Ok(settings) => {
                    state.in_flight = Some("encode");
                    settings
                }
                Err(e) => return state.record(Err(e)),
            }
        };

        let outcome = self.encode_frame(source, &settings);

        let mut state = self.shared.lock();
        state.in_flight = None;
        let result = outcome.and_then(|outcome| self.publish(&mut state, outcome));
        if let Err(e) = &result {
            warn!(frame = %self.frame_number, error = %e, "Encode failed");
        }
        state.record(result)
    }

    /// Decode one coded frame produced by a session with the same geometry.
    pub fn decode(&mut self, data: &[u8]) -> CodecResult<Plane> {
        {
            let mut state = self.shared.lock();
            if let Err(e) = state.check_open() {
                return state.record(Err(e));
            }
            state.in_flight = Some("decode");
        }

        let result = self.coder.decode(data);

        let mut state = self.shared.lock();
        state.in_flight = None;
        match &result {
            Ok(_) => self.stats.frames_decoded += 1,
            Err(e) => warn!(bytes = data.len(), error = %e, "Decode failed"),
        }
        state.record(result)
    }

    fn encode_frame(
        &mut self,
        source: PlaneRef<'_>,
        settings: &FrameSettings,
    ) -> CodecResult<FrameOutcome> {
        let resolution = self.config.resolution;
        if source.resolution() != resolution {
            return Err(CodecError::FrameGeometry {
                expected: resolution,
                got: source.resolution(),
            });
        }
        let estimator = self.estimator.as_mut().ok_or(CodecError::NotOpen)?;
        if estimator.mode() != settings.motion_mode {
            estimator.set_mode(settings.motion_mode)?;
            debug!(mode = %settings.motion_mode, "Motion search mode changed");
        }

        let frame_number = self.frame_number;
        let mut key_reason = if self.needs_key {
            Some(KeyFrameReason::Start)
        } else if settings.controls.idr_pending {
            Some(KeyFrameReason::Forced)
        } else if frame_number.is_gop_boundary(settings.gop) {
            Some(KeyFrameReason::Periodic)
        } else {
            None
        };

        let mut distortion = 0;
        let mut motion = None;
        if key_reason.is_none() {
            let estimate = match self.coder.reference() {
                Some(reference) => estimator.estimate(source, reference),
                None => estimator.estimate_retained(source),
            };
            match estimate {
                Ok(estimate) => {
                    distortion = estimate.average_distortion;
                    if settings.scene_change > 0 && distortion > settings.scene_change {
                        key_reason = Some(KeyFrameReason::SceneChange);
                    } else {
                        motion = Some(estimate);
                    }
                }
                Err(EstimatorError::NotReady) => key_reason = Some(KeyFrameReason::NoReference),
                Err(e) => return Err(e.into()),
            }
        }
        let keyframe = key_reason.is_some();

        let bit_limit = settings.controls.bit_limit();
        let base = self.rate.clamp(settings.quality);
        let quality = self.rate.next_quality(base, bit_limit);
        let request = CodeRequest {
            frame_number,
            source,
            keyframe,
            motion: motion.as_ref(),
            block_size: self.config.estimator.block_size,
            quality,
            frame_bit_limit: bit_limit,
            max_quality: self.rate.max_quality(),
            qtable: &settings.qtable,
        };
        let mut frame = self.coder.code(&request)?;
        frame.group_id = settings.controls.group_id;
        self.rate.frame_coded(frame.bit_length);

        if let Some(limit) = bit_limit {
            if frame.bit_length > limit as u64 {
                warn!(
                    frame = %frame_number,
                    bits = frame.bit_length,
                    limit,
                    "Frame exceeded advisory bit limit"
                );
            }
        }

        if keyframe {
            estimator.reset();
            // Coders without a reconstruction predict from the previous source.
            if self.coder.reference().is_none() {
                estimator.estimate(source, source)?;
            }
        }

        let blocks = resolution.block_count(self.config.estimator.block_size);
        let vectors = motion
            .as_ref()
            .map(|m| m.field.to_interleaved())
            .unwrap_or_else(|| vec![0; 2 * blocks]);

        self.frame_number = frame_number + 1;
        self.needs_key = false;
        self.last_frame_bits = frame.bit_length;
        self.stats.frames_encoded += 1;
        self.stats.bits_written += frame.bit_length;
        if keyframe {
            self.stats.keyframes += 1;
        }
        if key_reason == Some(KeyFrameReason::Forced) {
            self.stats.forced_keyframes += 1;
        }
        if key_reason == Some(KeyFrameReason::SceneChange) {
            self.stats.scene_changes += 1;
        }

        debug!(
            frame = %frame_number,
            keyframe,
            reason = ?key_reason,
            quality = frame.quality,
            bits = frame.bit_length,
            distortion,
            "Session encoded frame"
        );

        Ok(FrameOutcome {
            frame,
            distortion,
            vectors,
            acknowledge_idr: keyframe && settings.controls.idr_pending,
        })
    }

    /// Publish observability properties; runs under the state lock.
    fn publish(&self, state: &mut SessionState, outcome: FrameOutcome) -> CodecResult<CodedFrame> {
        let registry = &mut state.registry;
        registry.publish(
            FRAME_BITS,
            PropertyValue::int(saturating_i32(outcome.frame.bit_length)),
        )?;
        registry.publish(
            DISTORTION,
            PropertyValue::int(saturating_i32(outcome.distortion)),
        )?;
        registry.publish(
            FRAME_COUNT,
            PropertyValue::int(saturating_i32(self.stats.frames_encoded)),
        )?;
        registry.publish(
            KEYFRAMES,
            PropertyValue::int(saturating_i32(self.stats.keyframes)),
        )?;
        registry.publish(MOTION_VECTORS, PropertyValue::Int(outcome.vectors))?;
        if let Some(reference) = self.coder.reference() {
            registry.publish(REFERENCE, PropertyValue::Bytes(reference.data().to_vec()))?;
        }

        if outcome.acknowledge_idr {
            state.controls.acknowledge_idr();
        }
        Ok(outcome.frame)
    }
}

/// Register every session property in its fixed order and seal the registry.
fn session_properties(
    config: &SessionConfig,
    estimator: &dyn MotionEstimator,
) -> Result<PropertyRegistry, PropertyError> {
    use PropertyKind::{Bytes, Int, String as Text};

    let res = config.resolution;
    let blocks = res.block_count(config.estimator.block_size);
    let modes: Vec<i32> = estimator
        .capabilities()
        .iter()
        .map(|m| m.mode.0 as i32)
        .collect();
    let read_only = |name: &str, kind, count| PropertyDescriptor::new(name, kind, count).read_only();
    let writable = |name: &str, kind, count| PropertyDescriptor::new(name, kind, count);

    let mut registry = PropertyRegistry::new();

    // Fixed for the open session.
    registry.register(read_only(WIDTH, Int, 1), PropertyValue::int(res.width as i32))?;
    registry.register(read_only(HEIGHT, Int, 1), PropertyValue::int(res.height as i32))?;
    registry.register(read_only(MACROBLOCKS, Int, 1), PropertyValue::int(blocks as i32))?;
    registry.register(
        read_only(CODEC_NAME, Text, 1),
        PropertyValue::string(config.codec_name.as_str()),
    )?;
    registry.register(
        read_only(ESTIMATOR, Text, 1),
        PropertyValue::string(estimator.name()),
    )?;
    registry.register(
        read_only(MOTION_MODES, Int, modes.len()),
        PropertyValue::Int(modes),
    )?;

    // Operator-writable, applied at the next encode.
    registry.register(
        writable(QUALITY, Int, 1),
        PropertyValue::int(config.rate.quality as i32),
    )?;
    registry.register(
        writable(GOP, Int, 1),
        PropertyValue::int(saturating_i32(config.gop_length as u64)),
    )?;
    registry.register(
        writable(AUTO_I_PICTURE, Int, 1),
        PropertyValue::int(saturating_i32(config.scene_change_distortion)),
    )?;
    registry.register(
        writable(MOTION_MODE, Int, 1),
        PropertyValue::int(config.estimator.mode as i32),
    )?;
    registry.register(
        writable(QTABLE, Int, QTABLE_LEN),
        PropertyValue::Int(vec![UNITY_WEIGHT; QTABLE_LEN]),
    )?;

    // Published after every encode.
    registry.register(read_only(FRAME_BITS, Int, 1), PropertyValue::int(0))?;
    registry.register(read_only(DISTORTION, Int, 1), PropertyValue::int(0))?;
    registry.register(read_only(FRAME_COUNT, Int, 1), PropertyValue::int(0))?;
    registry.register(read_only(KEYFRAMES, Int, 1), PropertyValue::int(0))?;
    registry.register(
        read_only(MOTION_VECTORS, Int, 2 * blocks),
        PropertyValue::Int(vec![0; 2 * blocks]),
    )?;
    registry.register(
        read_only(REFERENCE, Bytes, res.pixel_count() as usize),
        PropertyValue::Bytes(vec![0; res.pixel_count() as usize]),
    )?;

    registry.seal();
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtv_common::{EstimatorConfig, Resolution, MEMBERS};

    const RES: Resolution = Resolution {
        width: 64,
        height: 48,
    };

    fn config() -> SessionConfig {
        SessionConfig {
            resolution: RES,
            estimator: EstimatorConfig {
                block_size: 8,
                search_range: 4,
                ..EstimatorConfig::default()
            },
            ..SessionConfig::default()
        }
    }

    fn open_session() -> CodecSession {
        let mut session = CodecSession::new(config()).unwrap();
        session.open().unwrap();
        session
    }

    /// Hash texture shifted horizontally by `shift` pixels.
    fn picture(shift: i32) -> Plane {
        let mut plane = Plane::new(RES);
        for y in 0..RES.height {
            for x in 0..RES.width {
                let sx = (x as i32 + shift).rem_euclid(1024) as u32;
                let h = (sx.wrapping_mul(0x9E37_79B1) ^ y.wrapping_mul(0x85EB_CA6B)) >> 24;
                plane.set(x, y, h as u8);
            }
        }
        plane
    }

    #[test]
    fn open_registers_properties_in_order() {
        let session = open_session();
        let props = session.properties();
        let names = props.names().unwrap();
        assert_eq!(&names[..4], &["width", "height", "macroblocks", "codecname"]);
        assert_eq!(props.get_int(MEMBERS).unwrap(), names.len() as i32);
        assert_eq!(props.get_int("width").unwrap(), 64);
        assert_eq!(props.get_int("height").unwrap(), 48);
        assert_eq!(props.get_int("macroblocks").unwrap(), 48);
        assert_eq!(
            props.get("estimator").unwrap(),
            PropertyValue::string("multires_cross")
        );
        assert_eq!(props.get("motionmodes").unwrap(), PropertyValue::Int(vec![0, 1, 2]));
    }

    #[test]
    fn unopened_session_has_no_members() {
        let mut session = CodecSession::new(config()).unwrap();
        let props = session.properties();
        assert_eq!(props.get_int(MEMBERS).unwrap(), 0);
        assert!(props.get("width").unwrap_err().is_not_found());
        assert!(matches!(
            session.encode(picture(0).view()),
            Err(CodecError::NotOpen)
        ));
        assert!(session.last_error().is_some());
    }

    #[test]
    fn open_twice_fails_and_close_reopens() {
        let mut session = open_session();
        assert!(matches!(session.open(), Err(CodecError::AlreadyOpen)));
        session.close().unwrap();
        assert!(!session.is_open());
        assert!(matches!(session.close(), Err(CodecError::NotOpen)));
        session.open().unwrap();
        assert!(session.is_open());
    }

    #[test]
    fn first_frame_is_key_then_inter() {
        let mut session = open_session();
        let first = session.encode(picture(0).view()).unwrap();
        let second = session.encode(picture(2).view()).unwrap();
        assert!(first.keyframe);
        assert!(!second.keyframe);
        assert_eq!(first.frame_number, FrameNumber(0));
        assert_eq!(second.frame_number, FrameNumber(1));
        assert_eq!(session.compressed_bit_length(), second.bit_length);
        assert_eq!(session.compressed_byte_length(), second.data.len() as u64);
    }

    #[test]
    fn gop_property_schedules_key_frames() {
        let mut session = open_session();
        session.properties().set_int("gop", 3).unwrap();
        let keys: Vec<bool> = (0..7)
            .map(|i| session.encode(picture(i).view()).unwrap().keyframe)
            .collect();
        assert_eq!(keys, vec![true, false, false, true, false, false, true]);
        assert_eq!(session.stats().keyframes, 3);
    }

    #[test]
    fn restart_forces_key_frame() {
        let mut session = open_session();
        session.encode(picture(0).view()).unwrap();
        assert!(!session.encode(picture(1).view()).unwrap().keyframe);
        session.restart().unwrap();
        assert!(session.encode(picture(2).view()).unwrap().keyframe);
        assert!(!session.encode(picture(3).view()).unwrap().keyframe);
    }

    #[test]
    fn idr_before_first_frame_is_not_counted_as_forced() {
        let mut session = open_session();
        session.controls().generate_idr().unwrap();
        assert!(session.encode(picture(0).view()).unwrap().keyframe);
        assert!(!session.controls().idr_pending().unwrap());
        assert_eq!(session.stats().forced_keyframes, 0);

        assert!(!session.encode(picture(1).view()).unwrap().keyframe);
        session.controls().generate_idr().unwrap();
        assert!(session.encode(picture(2).view()).unwrap().keyframe);
        assert_eq!(session.stats().keyframes, 2);
        assert_eq!(session.stats().forced_keyframes, 1);
    }

    #[test]
    fn read_only_and_invalid_writes_leave_slots_unchanged() {
        let session = open_session();
        let props = session.properties();
        assert!(matches!(
            props.set_int("width", 320),
            Err(CodecError::Property(PropertyError::ReadOnly { .. }))
        ));
        assert!(matches!(
            props.set_int("motionmode", 7),
            Err(CodecError::Property(PropertyError::InvalidValue { .. }))
        ));
        assert!(matches!(
            props.set("qtable", PropertyValue::Int(vec![16; 4])),
            Err(CodecError::Property(PropertyError::LengthMismatch { .. }))
        ));
        assert_eq!(props.get_int("width").unwrap(), 64);
        assert_eq!(props.get_int("motionmode").unwrap(), 0);
        assert_eq!(props.get("qtable").unwrap(), PropertyValue::Int(vec![16; 16]));
    }

    #[test]
    fn observability_properties_follow_frames() {
        let mut session = open_session();
        let props = session.properties();
        session.encode(picture(0).view()).unwrap();
        let frame = session.encode(picture(1).view()).unwrap();

        assert_eq!(props.get_int("framecount").unwrap(), 2);
        assert_eq!(props.get_int("keyframes").unwrap(), 1);
        assert_eq!(props.get_int("framebits").unwrap() as u64, frame.bit_length);
        let vectors = props.get("motionvectors").unwrap();
        assert_eq!(vectors.element_count(), 2 * 48);
        let reference_len = props.with_view("reference", |v| v.element_count()).unwrap();
        assert_eq!(reference_len, 64 * 48);
    }

    #[test]
    fn geometry_mismatch_is_reported() {
        let mut session = open_session();
        let small = Plane::new(Resolution::new(32, 32));
        assert!(matches!(
            session.encode(small.view()),
            Err(CodecError::FrameGeometry { .. })
        ));
        assert!(session.last_error().unwrap().contains("geometry"));
        // The failed call is not in flight any more.
        session.properties().get_int("width").unwrap();
        assert!(session.last_error().is_none());
    }

    #[test]
    fn decode_reproduces_reconstruction() {
        let mut session = open_session();
        let key = session.encode(picture(0).view()).unwrap();
        let inter = session.encode(picture(1).view()).unwrap();
        session.decode(&key.data).unwrap();
        let decoded = session.decode(&inter.data).unwrap();
        let reference = session.properties().get("reference").unwrap();
        assert_eq!(reference.as_bytes().unwrap(), decoded.data());
        assert_eq!(session.stats().frames_decoded, 2);
    }

    #[test]
    fn stats_average_frame_bits() {
        let mut session = open_session();
        assert_eq!(session.stats().average_frame_bits(), 0);
        let a = session.encode(picture(0).view()).unwrap();
        let b = session.encode(picture(0).view()).unwrap();
        let stats = session.stats();
        assert_eq!(stats.frames_encoded, 2);
        assert_eq!(stats.bits_written, a.bit_length + b.bit_length);
        assert_eq!(stats.average_frame_bits(), (a.bit_length + b.bit_length) / 2);
    }

    #[test]
    fn capabilities_follow_configured_estimator() {
        let mut cfg = config();
        cfg.estimator.kind = "full_search".to_string();
        let session = CodecSession::new(cfg).unwrap();
        let caps = session.estimator_capabilities();
        assert_eq!(caps.len(), 3);
        assert!(caps[0].mode.is_auto());
    }
}
