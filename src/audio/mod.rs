//! Audio module - voice mixing on a fixed pool of backend channels
//!
//! This module provides:
//! - WAVE and Ogg/Vorbis decoding to PCM
//! - A backend abstraction with a software mixer and a cpal output
//! - The channel pool, voices, groups and listener control
//! - The engine tying them together

mod asset;
mod backend;
mod diagnostics;
mod engine;
mod group;
mod listener;
mod mixer;
mod ogg;
mod output;
mod pcm;
mod pool;
mod voice;
mod wav;

pub use asset::{load_pcm, AssetSource, AssetStream, DirectoryAssets, MemoryAssets};
pub use backend::{
    Backend, BackendDiagnostic, BackendInfo, BufferId, DistanceModel, ListenerState, SourceId,
    SourceParam, SourceState,
};
pub use diagnostics::{
    queue as diagnostic_queue, DiagnosticConsumer, DiagnosticProducer, DiagnosticSink, LogSink,
};
pub use engine::{AudioEngine, AudioError, SoundBuffer};
pub use group::{GroupId, GroupState};
pub use listener::listener_from_heading;
pub use mixer::SoftwareMixer;
pub use ogg::{probe as probe_ogg, ProbedStream};
pub use output::{CpalBackend, DeviceError};
pub use pcm::{FormatError, PcmData, SampleFormat};
pub use pool::{ChannelId, PoolStats, MAX_CHANNELS};
pub use voice::{Playback, Voice, VoiceId, VoiceState};
pub use wav::decode_wav;

