//! Playback backend abstraction
//!
//! Mirrors a single device/context pair: sources play buffers, properties are
//! set one call at a time and errors are polled instead of returned.

use std::num::NonZeroU32;

use thiserror::Error;

use super::pcm::PcmData;

/// Backend handle for a playback source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(NonZeroU32);

impl SourceId {
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

/// Backend handle for a resident sample buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(NonZeroU32);

impl BufferId {
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

/// Playback state of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceState {
    #[default]
    Initial,
    Playing,
    Paused,
    Stopped,
}

/// A settable source property
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceParam {
    Gain(f32),
    Position([f32; 3]),
    Velocity([f32; 3]),
    /// Position is relative to the listener
    Relative(bool),
    Looping(bool),
    MaxDistance(f32),
    RolloffFactor(f32),
    ReferenceDistance(f32),
}

/// Distance attenuation model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceModel {
    None,
    #[default]
    InverseDistanceClamped,
}

/// Listener orientation, position and velocity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListenerState {
    /// Forward vector followed by up vector
    pub orientation: [f32; 6],
    pub position: [f32; 3],
    pub velocity: [f32; 3],
}

impl Default for ListenerState {
    fn default() -> Self {
        Self {
            orientation: [0.0, 0.0, -1.0, 0.0, 1.0, 0.0],
            position: [0.0; 3],
            velocity: [0.0; 3],
        }
    }
}

/// Descriptive strings reported at init
#[derive(Debug, Clone, Default)]
pub struct BackendInfo {
    pub device: String,
    pub renderer: String,
    pub version: String,
}

/// Errors reported by the backend through polling
///
/// These are diagnostics: they are logged and never abort the operation
/// that triggered them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendDiagnostic {
    #[error("a bad name (ID) was passed to a backend function")]
    InvalidName,

    #[error("an invalid enum value was passed to a backend function")]
    InvalidEnum,

    #[error("an invalid value was passed to a backend function")]
    InvalidValue,

    #[error("the requested operation is not valid")]
    InvalidOperation,

    #[error("the requested operation resulted in the backend running out of memory")]
    OutOfMemory,

    #[error("output stream error: {0}")]
    Stream(String),
}

/// A playback device and its rendering context
///
/// Every call is made with the engine lock held.
pub trait Backend {
    /// Device, renderer and version strings
    fn info(&self) -> BackendInfo;

    fn set_distance_model(&mut self, model: DistanceModel);

    fn set_doppler(&mut self, factor: f32, speed_of_sound: f32);

    /// Create a new source, failing once the device runs out of them
    fn create_source(&mut self) -> Result<SourceId, BackendDiagnostic>;

    fn delete_source(&mut self, source: SourceId);

    /// Upload PCM into a new resident buffer
    fn create_buffer(&mut self, pcm: &PcmData) -> Result<BufferId, BackendDiagnostic>;

    fn delete_buffer(&mut self, buffer: BufferId);

    /// Attach a buffer to a source, or detach with `None`
    fn attach(&mut self, source: SourceId, buffer: Option<BufferId>);

    fn set_param(&mut self, source: SourceId, param: SourceParam);

    fn state(&self, source: SourceId) -> SourceState;

    fn gain(&self, source: SourceId) -> f32;

    fn attached(&self, source: SourceId) -> Option<BufferId>;

    /// Start from the beginning, or continue if paused
    fn play(&mut self, source: SourceId);

    fn pause(&mut self, source: SourceId);

    fn stop(&mut self, source: SourceId);

    fn set_listener(&mut self, listener: &ListenerState);

    /// Take the oldest pending error, if any
    fn take_error(&mut self) -> Option<BackendDiagnostic>;
}
