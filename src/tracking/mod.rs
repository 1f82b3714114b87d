//! Tracking module
//!
//! Core data model and pluggable contracts for the tracking pipeline:
//! - Landmark/snapshot types shared by the coordinator, smoothers, and senders
//! - `CameraSource` / `Processor` / `Sender` traits for pluggable backends
//! - The `Tracker` coordinator and the Kalman smoothing engine

pub mod smoothing;
pub mod tracker;

pub use smoothing::{KalmanFilter, KalmanFilter3d, LandmarkSmoother};
pub use tracker::Tracker;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use crate::error::Result;

/// A 3D coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3D {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// A tracked landmark point with visibility confidence.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Landmark {
    pub point: Point3D,
    /// Detection confidence in [0.0, 1.0].
    pub visibility: f64,
}

/// A rotation in 3D space. The default value is the identity rotation
/// (0, 0, 0, 1). No normalization is enforced here; callers are responsible
/// for supplying valid rotations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quaternion {
    pub const IDENTITY: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Face tracking results.
#[derive(Debug, Clone, Default)]
pub struct FaceData {
    /// 468 face mesh landmarks (MediaPipe indexing convention).
    pub landmarks: Vec<Landmark>,
    /// Facial expression blend shape weights. A `BTreeMap` so iteration is
    /// deterministic (lexicographic by name).
    pub blend_shapes: BTreeMap<String, f64>,
    /// Estimated head rotation.
    pub head_rotation: Quaternion,
    /// Estimated head position.
    pub head_position: Point3D,
}

/// Hand tracking results for a single hand.
#[derive(Debug, Clone, Default)]
pub struct HandData {
    /// True for the left hand.
    pub is_left: bool,
    /// 21 hand landmarks (MediaPipe indexing convention).
    pub landmarks: Vec<Landmark>,
    /// Hand detection confidence in [0.0, 1.0].
    pub confidence: f64,
}

/// Body pose tracking results.
#[derive(Debug, Clone, Default)]
pub struct PoseData {
    /// 33 pose landmarks (MediaPipe indexing convention).
    pub landmarks: Vec<Landmark>,
}

/// All tracking results for a single frame.
///
/// An absent substructure means "not detected this frame", which is a normal
/// steady-state condition rather than an error.
#[derive(Debug, Clone)]
pub struct TrackingData {
    /// When this frame was captured.
    pub timestamp: SystemTime,
    /// Sequential frame number, assigned by the tracker.
    pub frame_number: u64,
    /// Face tracking data.
    pub face: Option<FaceData>,
    /// Left hand tracking data.
    pub left_hand: Option<HandData>,
    /// Right hand tracking data.
    pub right_hand: Option<HandData>,
    /// Body pose tracking data.
    pub pose: Option<PoseData>,
}

impl Default for TrackingData {
    fn default() -> Self {
        Self {
            timestamp: SystemTime::UNIX_EPOCH,
            frame_number: 0,
            face: None,
            left_hand: None,
            right_hand: None,
            pose: None,
        }
    }
}

/// A single captured camera frame: contiguous interleaved 3-channel pixels.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Current state of the tracker lifecycle. `Closed` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    /// Initialized but not running.
    Idle,
    /// Actively capturing and processing.
    Running,
    /// Stopped; can be started again.
    Stopped,
    /// Closed; cannot be reused.
    Closed,
}

impl TrackerState {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for TrackerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Camera capture backend.
///
/// Implementations serialize their own access; the tracker shares one
/// instance between the frame loop and teardown.
#[async_trait]
pub trait CameraSource: Send + Sync {
    /// Initialize the device with the given configuration.
    async fn open(&self, device_id: u32, width: u32, height: u32, fps: u32) -> Result<()>;
    /// Capture a single frame.
    async fn read(&self) -> Result<Frame>;
    /// Release camera resources.
    async fn close(&self) -> Result<()>;
}

/// Landmark detection backend.
///
/// Cancellation is cooperative: when the tracker shuts down mid-detection,
/// the in-flight `process` future is dropped.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Analyze a frame and return tracking data.
    async fn process(&self, frame: &Frame) -> Result<TrackingData>;
    /// Release processor resources.
    async fn close(&self) -> Result<()>;
}

/// Protocol output sender.
pub trait Sender: Send + Sync {
    /// Transmit tracking data.
    fn send(&self, data: &TrackingData) -> Result<()>;
    /// Release sender resources.
    fn close(&self) -> Result<()>;
}
