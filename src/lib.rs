//! voice-mixer - priority virtual-voice audio mixing
//!
//! Playback requests ([`Voice`]s) are multiplexed onto a fixed pool of
//! backend channels. When the pool runs dry a voice goes virtual: it is
//! tracked but silent. Groups reserve channels of their own for round-robin
//! looped playback and fade out over a short ramp when stopped.
//!
//! ```no_run
//! use voice_mixer::{AudioEngine, DirectoryAssets, EngineConfig};
//!
//! # fn main() -> Result<(), voice_mixer::AudioError> {
//! let engine = AudioEngine::open_default(EngineConfig::load())?;
//! let assets = DirectoryAssets::new("snd");
//! let laser = engine.load_sound(&assets, "laser.ogg")?;
//!
//! let mut voices = Vec::new();
//! let mut voice = engine.voice();
//! engine.play_at(&mut voice, &laser, [100.0, 0.0], [0.0, 0.0]);
//! voices.push(voice);
//!
//! // Once per frame
//! engine.update_listener(0.0, [0.0, 0.0], [0.0, 0.0]);
//! engine.update(&mut voices);
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod settings;

pub use audio::{
    AssetSource, AudioEngine, AudioError, Backend, BackendDiagnostic, ChannelId, CpalBackend,
    DiagnosticSink, DirectoryAssets, GroupId, GroupState, LogSink, MemoryAssets, Playback,
    SoftwareMixer, SoundBuffer, Voice, VoiceState,
};
pub use settings::EngineConfig;
