//! Audio engine
//!
//! [`AudioEngine`] owns the backend, the channel pool, the group table and
//! the global volume behind a single lock. Every public operation takes the
//! lock once, issues its batch of backend calls and then polls the backend
//! for errors, which go to the [`DiagnosticSink`] instead of the caller.
//!
//! Voices are owned by the caller. The engine hands them out with
//! [`AudioEngine::voice`] and advances them in [`AudioEngine::update`].

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;

use super::asset::{load_pcm, AssetSource};
use super::backend::{
    Backend, BackendDiagnostic, BufferId, DistanceModel, SourceParam, SourceState,
};
use super::diagnostics::{DiagnosticSink, LogSink};
use super::group::{GroupId, GroupState, GroupTable};
use super::listener::listener_from_heading;
use super::output::{CpalBackend, DeviceError};
use super::pcm::{FormatError, PcmData, SampleFormat};
use super::pool::{ChannelId, ChannelPool, PoolStats};
use super::voice::{self, Placement, Playback, Voice, VoiceId};
use crate::settings::EngineConfig;

/// Errors returned by engine operations
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Audio device unavailable: {0}")]
    Device(#[from] DeviceError),

    #[error("Failed to load sound '{name}': {source}")]
    Load {
        name: String,
        #[source]
        source: FormatError,
    },

    #[error("Failed to open sound '{name}': {source}")]
    Asset {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to create sound buffer: {0}")]
    BufferCreation(BackendDiagnostic),

    #[error("Not enough free channels for group: {requested} requested, {available} free")]
    GroupExhausted { requested: usize, available: usize },

    #[error("Group '{0}' not found")]
    UnknownGroup(GroupId),

    #[error("Group has no channels")]
    EmptyGroup,
}

/// A decoded sound resident in the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundBuffer {
    id: BufferId,
    name: String,
    format: SampleFormat,
    sample_rate: u32,
    frames: usize,
}

impl SoundBuffer {
    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Length of the sound at its own sample rate
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames as f64 / self.sample_rate.max(1) as f64)
    }
}

struct EngineState<B> {
    backend: B,
    pool: ChannelPool,
    groups: GroupTable,
    volume: f32,
    fade: Duration,
    sink: Arc<dyn DiagnosticSink>,
}

impl<B: Backend> EngineState<B> {
    /// Hand every pending backend error to the sink
    fn check_errors(&mut self, operation: &'static str) {
        report_errors(&mut self.backend, &*self.sink, operation);
    }
}

fn report_errors<B: Backend>(
    backend: &mut B,
    sink: &dyn DiagnosticSink,
    operation: &'static str,
) {
    while let Some(diagnostic) = backend.take_error() {
        sink.report(operation, &diagnostic);
    }
}

/// Voice ids are unique across engines, so a channel tag can never match a
/// voice handed out by another engine.
static NEXT_VOICE: AtomicU64 = AtomicU64::new(1);

/// Priority virtual-voice mixing engine
pub struct AudioEngine<B: Backend> {
    state: Mutex<EngineState<B>>,
    config: EngineConfig,
}

impl AudioEngine<CpalBackend> {
    /// Open the default output device
    pub fn open_default(config: EngineConfig) -> Result<Self, AudioError> {
        let backend = CpalBackend::open(config.max_sources, config.diagnostic_queue)?;
        Ok(Self::new(backend, config))
    }
}

impl<B: Backend> AudioEngine<B> {
    /// Build an engine on `backend`, logging diagnostics with [`LogSink`]
    pub fn new(backend: B, config: EngineConfig) -> Self {
        Self::with_sink(backend, config, Arc::new(LogSink))
    }

    /// Build an engine on `backend` with a custom diagnostic sink
    pub fn with_sink(
        mut backend: B,
        config: EngineConfig,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        let info = backend.info();
        log::info!("Audio device: {}", info.device);
        log::info!("Audio renderer: {}", info.renderer);
        log::info!("Audio version: {}", info.version);

        backend.set_distance_model(DistanceModel::InverseDistanceClamped);
        backend.set_doppler(config.doppler_factor, config.speed_of_sound);
        report_errors(&mut backend, &*sink, "init");

        let (max_distance, rolloff, reference) = (
            config.max_distance,
            config.rolloff_factor,
            config.reference_distance,
        );
        let pool = ChannelPool::create(&mut backend, config.max_sources, |backend, source| {
            backend.set_param(source, SourceParam::MaxDistance(max_distance));
            backend.set_param(source, SourceParam::RolloffFactor(rolloff));
            backend.set_param(source, SourceParam::ReferenceDistance(reference));
            // Drained per channel so the pool only ever sees its own failure
            report_errors(backend, &*sink, "init");
        });
        log::info!("Audio channels: {}", pool.total());

        let mut state = EngineState {
            backend,
            pool,
            groups: GroupTable::new(),
            volume: config.volume.max(0.0),
            fade: Duration::from_millis(config.fade_out_ms),
            sink,
        };
        state.check_errors("init");

        Self {
            state: Mutex::new(state),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Decode an asset and upload it to the backend
    ///
    /// Decoding runs before the engine lock is taken.
    pub fn load_sound(
        &self,
        assets: &dyn AssetSource,
        name: &str,
    ) -> Result<SoundBuffer, AudioError> {
        let pcm = load_pcm(assets, name)?;
        self.register_pcm(name, &pcm)
    }

    /// Upload already decoded PCM to the backend
    pub fn register_pcm(&self, name: &str, pcm: &PcmData) -> Result<SoundBuffer, AudioError> {
        let mut state = self.state.lock();
        let id = match state.backend.create_buffer(pcm) {
            Ok(id) => {
                state.check_errors("register_pcm");
                id
            }
            Err(e) => {
                // The failure itself is returned; anything else still pending is reported
                let mut returned = false;
                while let Some(diagnostic) = state.backend.take_error() {
                    if !returned && diagnostic == e {
                        returned = true;
                        continue;
                    }
                    state.sink.report("register_pcm", &diagnostic);
                }
                log::warn!("Failed to create buffer for '{}': {}", name, e);
                return Err(AudioError::BufferCreation(e));
            }
        };
        log::debug!(
            "Loaded '{}': {:?}, {} Hz, {} frames",
            name,
            pcm.format,
            pcm.sample_rate,
            pcm.frames()
        );

        Ok(SoundBuffer {
            id,
            name: name.to_string(),
            format: pcm.format,
            sample_rate: pcm.sample_rate,
            frames: pcm.frames(),
        })
    }

    /// Delete a sound from the backend
    ///
    /// No live voice or group channel may still be playing it.
    pub fn free_sound(&self, sound: SoundBuffer) {
        let mut state = self.state.lock();
        state.backend.delete_buffer(sound.id);
        state.check_errors("free_sound");
    }

    /// A fresh virtual voice
    pub fn voice(&self) -> Voice {
        Voice::new(VoiceId::new(NEXT_VOICE.fetch_add(1, Ordering::Relaxed)))
    }

    /// Play `sound` on `voice` relative to the listener, at its position
    pub fn play(&self, voice: &mut Voice, sound: &SoundBuffer) -> Playback {
        let placement = Placement {
            position: [0.0, 0.0],
            velocity: [0.0, 0.0],
            relative: true,
        };
        self.start(voice, sound, placement)
    }

    /// Play `sound` on `voice` at a world position
    pub fn play_at(
        &self,
        voice: &mut Voice,
        sound: &SoundBuffer,
        position: [f32; 2],
        velocity: [f32; 2],
    ) -> Playback {
        let placement = Placement {
            position,
            velocity,
            relative: false,
        };
        self.start(voice, sound, placement)
    }

    fn start(&self, voice: &mut Voice, sound: &SoundBuffer, placement: Placement) -> Playback {
        let mut state = self.state.lock();
        let EngineState {
            backend,
            pool,
            volume,
            ..
        } = &mut *state;
        let playback = voice::start(voice, pool, backend, sound.id, placement, *volume);
        state.check_errors("play");
        playback
    }

    /// Request a stop; the channel is reclaimed on a later update
    pub fn stop_voice(&self, voice: &mut Voice) {
        let mut state = self.state.lock();
        let EngineState { backend, pool, .. } = &mut *state;
        voice::stop(voice, pool, backend);
        state.check_errors("stop_voice");
    }

    /// Advance a single voice
    pub fn tick_voice(&self, voice: &mut Voice) {
        let mut state = self.state.lock();
        let EngineState {
            backend,
            pool,
            volume,
            ..
        } = &mut *state;
        voice::tick(voice, pool, backend, *volume);
        state.check_errors("tick_voice");
    }

    /// Run one frame: tick every voice, drop finished ones, advance groups
    pub fn update(&self, voices: &mut Vec<Voice>) {
        self.update_at(voices, Instant::now());
    }

    pub fn update_at(&self, voices: &mut Vec<Voice>, now: Instant) {
        let mut state = self.state.lock();
        let EngineState {
            backend,
            pool,
            groups,
            volume,
            fade,
            ..
        } = &mut *state;

        for voice in voices.iter_mut() {
            voice::tick(voice, pool, backend, *volume);
        }
        voices.retain(|voice| !voice.is_finished());
        groups.tick(now, *fade, pool, backend, *volume);

        state.check_errors("update");
    }

    /// Advance group fades and volume
    pub fn update_groups(&self) {
        self.update_groups_at(Instant::now());
    }

    pub fn update_groups_at(&self, now: Instant) {
        let mut state = self.state.lock();
        let EngineState {
            backend,
            pool,
            groups,
            volume,
            fade,
            ..
        } = &mut *state;
        groups.tick(now, *fade, pool, backend, *volume);
        state.check_errors("update_groups");
    }

    /// Pause every playing channel, group channels included
    pub fn pause_all(&self) {
        let mut state = self.state.lock();
        let EngineState { backend, pool, .. } = &mut *state;
        pool.pause_all(backend);
        state.check_errors("pause_all");
    }

    /// Resume every paused channel, group channels included
    pub fn resume_all(&self) {
        let mut state = self.state.lock();
        let EngineState { backend, pool, .. } = &mut *state;
        pool.resume_all(backend);
        state.check_errors("resume_all");
    }

    /// Set the global gain, applied on the next update
    pub fn set_volume(&self, volume: f32) {
        self.state.lock().volume = volume.max(0.0);
    }

    pub fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    /// Place the listener, facing along `direction` (radians)
    pub fn update_listener(&self, direction: f64, position: [f64; 2], velocity: [f64; 2]) {
        let listener = listener_from_heading(direction, position, velocity);
        let mut state = self.state.lock();
        state.backend.set_listener(&listener);
        state.check_errors("update_listener");
    }

    /// Reserve `size` channels for a new group
    pub fn create_group(&self, size: usize) -> Result<GroupId, AudioError> {
        let mut state = self.state.lock();
        let EngineState { pool, groups, .. } = &mut *state;
        groups.create(pool, size)
    }

    /// Play `sound` on a channel of the group, listener-relative
    pub fn play_group(
        &self,
        id: GroupId,
        sound: &SoundBuffer,
        looping: bool,
    ) -> Result<ChannelId, AudioError> {
        let mut state = self.state.lock();
        let EngineState {
            backend,
            pool,
            groups,
            volume,
            ..
        } = &mut *state;
        let result = groups.play(id, pool, backend, sound.id, looping, *volume);
        state.check_errors("play_group");
        result
    }

    /// Fade the group out, starting now
    pub fn stop_group(&self, id: GroupId) -> Result<(), AudioError> {
        self.stop_group_at(id, Instant::now())
    }

    pub fn stop_group_at(&self, id: GroupId, now: Instant) -> Result<(), AudioError> {
        self.state.lock().groups.stop(id, now)
    }

    pub fn pause_group(&self, id: GroupId) -> Result<(), AudioError> {
        let mut state = self.state.lock();
        let EngineState {
            backend,
            pool,
            groups,
            ..
        } = &mut *state;
        let result = groups.pause(id, pool, backend);
        state.check_errors("pause_group");
        result
    }

    pub fn resume_group(&self, id: GroupId) -> Result<(), AudioError> {
        let mut state = self.state.lock();
        let EngineState {
            backend,
            pool,
            groups,
            ..
        } = &mut *state;
        let result = groups.resume(id, pool, backend);
        state.check_errors("resume_group");
        result
    }

    /// Silence a group and return its channels to the pool
    pub fn destroy_group(&self, id: GroupId) -> Result<(), AudioError> {
        let mut state = self.state.lock();
        let EngineState {
            backend,
            pool,
            groups,
            ..
        } = &mut *state;
        let result = groups.destroy(id, pool, backend);
        state.check_errors("destroy_group");
        result
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.state.lock().pool.stats()
    }

    /// Backend state of a channel, `None` for an unknown channel
    pub fn channel_state(&self, channel: ChannelId) -> Option<SourceState> {
        let state = self.state.lock();
        let source = state.pool.source(channel)?;
        Some(state.backend.state(source))
    }

    pub fn channel_gain(&self, channel: ChannelId) -> Option<f32> {
        let state = self.state.lock();
        let source = state.pool.source(channel)?;
        Some(state.backend.gain(source))
    }

    /// Buffer attached to a channel
    pub fn channel_buffer(&self, channel: ChannelId) -> Option<BufferId> {
        let state = self.state.lock();
        let source = state.pool.source(channel)?;
        state.backend.attached(source)
    }

    pub fn group_channels(&self, id: GroupId) -> Option<Vec<ChannelId>> {
        self.state.lock().groups.channels(id).map(<[ChannelId]>::to_vec)
    }

    pub fn group_state(&self, id: GroupId) -> Option<GroupState> {
        self.state.lock().groups.state(id)
    }

    /// Run `f` on the backend under the engine lock
    pub fn with_backend<R>(&self, f: impl FnOnce(&mut B) -> R) -> R {
        f(&mut self.state.lock().backend)
    }
}

impl<B: Backend> Drop for AudioEngine<B> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if !state.groups.is_empty() {
            log::debug!("Releasing {} live groups", state.groups.len());
        }
        let sources: Vec<_> = state.pool.sources().collect();
        for source in sources {
            state.backend.stop(source);
            state.backend.attach(source, None);
            state.backend.delete_source(source);
        }
        state.check_errors("shutdown");
        log::debug!("Audio engine shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::asset::MemoryAssets;
    use crate::audio::mixer::SoftwareMixer;
    use crate::audio::voice::VoiceState;
    use crate::audio::wav::tests::wav_bytes;

    /// Sink that keeps every diagnostic for inspection
    #[derive(Default)]
    struct CollectSink(Mutex<Vec<(&'static str, BackendDiagnostic)>>);

    impl DiagnosticSink for CollectSink {
        fn report(&self, operation: &'static str, diagnostic: &BackendDiagnostic) {
            self.0.lock().push((operation, diagnostic.clone()));
        }
    }

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn engine(channels: usize) -> (AudioEngine<SoftwareMixer>, Arc<CollectSink>) {
        init_logger();
        let sink = Arc::new(CollectSink::default());
        let engine = AudioEngine::with_sink(
            SoftwareMixer::new(channels, 8000),
            EngineConfig::default(),
            sink.clone(),
        );
        (engine, sink)
    }

    fn beep(engine: &AudioEngine<SoftwareMixer>, frames: usize) -> SoundBuffer {
        let pcm = PcmData::new(SampleFormat::Mono8, 8000, vec![200; frames]);
        engine.register_pcm("beep", &pcm).unwrap()
    }

    fn render(engine: &AudioEngine<SoftwareMixer>, frames: usize) {
        let mut out = vec![0.0f32; frames * 2];
        engine.with_backend(|mixer| mixer.render(&mut out, 2));
    }

    fn assert_pool_balanced(engine: &AudioEngine<SoftwareMixer>) {
        let stats = engine.pool_stats();
        assert_eq!(stats.free + stats.in_voices + stats.in_groups, stats.total);
    }

    #[test]
    fn test_init_configures_backend() {
        let (engine, sink) = engine(4);
        assert_eq!(engine.pool_stats().total, 4);
        engine.with_backend(|mixer| {
            assert_eq!(mixer.distance_model(), DistanceModel::InverseDistanceClamped);
            assert_eq!(mixer.doppler(), (0.1, 1000.0));
        });
        // The expected out-of-sources failure is not a diagnostic
        assert!(sink.0.lock().is_empty());
    }

    #[test]
    fn test_three_plays_on_two_channels() {
        let (engine, _) = engine(2);
        let sound = beep(&engine, 800);

        let mut voices: Vec<Voice> = (0..3).map(|_| engine.voice()).collect();
        let results: Vec<Playback> = voices
            .iter_mut()
            .map(|voice| engine.play(voice, &sound))
            .collect();

        assert!(results[0].is_audible());
        assert!(results[1].is_audible());
        assert_ne!(results[0], results[1]);
        assert_eq!(results[2], Playback::Virtual);
        assert_eq!(voices[0].state(), VoiceState::Playing);
        assert_eq!(voices[2].state(), VoiceState::Virtual);
        assert_eq!(voices[2].channel(), None);

        engine.tick_voice(&mut voices[2]);
        assert_eq!(voices[2].state(), VoiceState::Destroy);

        engine.update(&mut voices);
        assert_eq!(voices.len(), 2);
        assert_pool_balanced(&engine);
    }

    #[test]
    fn test_voice_ids_are_unique() {
        let (first, _) = engine(1);
        let (second, _) = engine(1);
        let a = first.voice();
        let b = first.voice();
        let c = second.voice();
        assert_ne!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
        assert_ne!(b.id(), c.id());
    }

    #[test]
    fn test_voice_from_another_engine_is_ignored() {
        let (first, _) = engine(1);
        let (second, _) = engine(1);
        let sound_a = beep(&first, 800);
        let sound_b = beep(&second, 800);

        let mut stray = first.voice();
        let mut local = second.voice();
        let Playback::Audible(channel) = first.play(&mut stray, &sound_a) else {
            panic!("expected a channel");
        };
        assert_eq!(second.play(&mut local, &sound_b), Playback::Audible(channel));

        second.stop_voice(&mut stray);
        second.tick_voice(&mut stray);
        assert_eq!(stray.state(), VoiceState::Destroy);

        assert_eq!(second.channel_state(channel), Some(SourceState::Playing));
        assert_eq!(second.channel_buffer(channel), Some(sound_b.id()));
        assert_eq!(second.pool_stats().free, 0);

        let mut voices = vec![local];
        second.update(&mut voices);
        assert_eq!(voices.len(), 1);
        assert_eq!(voices[0].state(), VoiceState::Playing);
    }

    #[test]
    fn test_stale_voice_cannot_stop_new_owner() {
        let (engine, _) = engine(1);
        let sound = beep(&engine, 800);

        let mut first = engine.voice();
        let Playback::Audible(channel) = engine.play(&mut first, &sound) else {
            panic!("expected a channel");
        };
        engine.stop_voice(&mut first);
        engine.tick_voice(&mut first);
        assert_eq!(first.state(), VoiceState::Stopped);

        let mut second = engine.voice();
        assert_eq!(engine.play(&mut second, &sound), Playback::Audible(channel));

        // Once reclaimed, the old handle holds nothing
        engine.stop_voice(&mut first);
        engine.tick_voice(&mut first);
        assert_eq!(first.channel(), None);
        assert_eq!(engine.channel_state(channel), Some(SourceState::Playing));
        assert_eq!(engine.pool_stats().in_voices, 1);
    }

    #[test]
    fn test_finished_voice_reclaimed_once() {
        let (engine, _) = engine(2);
        let sound = beep(&engine, 16);
        let mut voices = vec![engine.voice()];
        engine.play_at(&mut voices[0], &sound, [10.0, 0.0], [0.0, 0.0]);
        assert_eq!(engine.pool_stats().free, 1);

        render(&engine, 64);
        engine.update(&mut voices);
        assert!(voices.is_empty());
        assert_eq!(engine.pool_stats().free, 2);

        engine.update(&mut voices);
        assert_eq!(engine.pool_stats().free, 2);
        assert_pool_balanced(&engine);
    }

    #[test]
    fn test_stop_is_two_phase() {
        let (engine, _) = engine(1);
        let sound = beep(&engine, 800);
        let mut voices = vec![engine.voice()];
        engine.play(&mut voices[0], &sound);

        engine.stop_voice(&mut voices[0]);
        assert_eq!(voices[0].state(), VoiceState::Stopping);
        assert_eq!(engine.pool_stats().free, 0);

        engine.update(&mut voices);
        assert!(voices.is_empty());
        assert_eq!(engine.pool_stats().free, 1);
    }

    #[test]
    fn test_volume_applied_on_update() {
        let (engine, _) = engine(4);
        let sound = beep(&engine, 800);
        let mut voices = vec![engine.voice(), engine.voice()];
        let channels: Vec<ChannelId> = voices
            .iter_mut()
            .filter_map(|voice| match engine.play(voice, &sound) {
                Playback::Audible(channel) => Some(channel),
                Playback::Virtual => None,
            })
            .collect();
        let group = engine.create_group(2).unwrap();
        let group_channel = engine.play_group(group, &sound, true).unwrap();

        engine.set_volume(0.5);
        assert_eq!(engine.volume(), 0.5);
        // Not applied until the next update
        assert_eq!(engine.channel_gain(channels[0]), Some(1.0));

        engine.update(&mut voices);
        for &channel in &channels {
            assert_eq!(engine.channel_gain(channel), Some(0.5));
        }
        assert_eq!(engine.channel_gain(group_channel), Some(0.5));
    }

    #[test]
    fn test_full_group_preempts_last_slot() {
        let (engine, _) = engine(2);
        let sound = beep(&engine, 800);
        let group = engine.create_group(2).unwrap();
        let channels = engine.group_channels(group).unwrap();

        engine.play_group(group, &sound, true).unwrap();
        engine.play_group(group, &sound, true).unwrap();
        let reused = engine.play_group(group, &sound, false).unwrap();

        assert_eq!(reused, channels[1]);
        assert_eq!(engine.channel_state(channels[0]), Some(SourceState::Playing));
        assert_eq!(engine.channel_state(channels[1]), Some(SourceState::Playing));
    }

    #[test]
    fn test_group_fade_through_engine() {
        let (engine, _) = engine(2);
        let sound = beep(&engine, 800);
        let group = engine.create_group(1).unwrap();
        let channel = engine.play_group(group, &sound, true).unwrap();

        let start = Instant::now();
        engine.stop_group_at(group, start).unwrap();
        engine.update_groups_at(start + Duration::from_millis(50));
        let gain = engine.channel_gain(channel).unwrap();
        assert!((gain - 0.5).abs() < 1e-4);

        engine.update_groups_at(start + Duration::from_millis(100));
        assert_eq!(engine.group_state(group), Some(GroupState::Playing));
        assert_eq!(engine.channel_state(channel), Some(SourceState::Stopped));
        assert_eq!(engine.channel_buffer(channel), None);
        assert_eq!(engine.channel_gain(channel), Some(1.0));
    }

    #[test]
    fn test_group_channels_leave_the_pool() {
        let (engine, _) = engine(3);
        let sound = beep(&engine, 800);
        let group = engine.create_group(2).unwrap();
        assert!(matches!(
            engine.create_group(2),
            Err(AudioError::GroupExhausted { .. })
        ));

        let mut voices = vec![engine.voice(), engine.voice()];
        assert!(engine.play(&mut voices[0], &sound).is_audible());
        assert_eq!(engine.play(&mut voices[1], &sound), Playback::Virtual);
        assert_pool_balanced(&engine);

        engine.destroy_group(group).unwrap();
        assert_eq!(engine.pool_stats().in_groups, 0);
        assert_eq!(engine.pool_stats().free, 2);
        assert!(matches!(
            engine.play_group(group, &sound, false),
            Err(AudioError::UnknownGroup(_))
        ));
    }

    #[test]
    fn test_pause_all_includes_groups() {
        let (engine, sink) = engine(3);
        let sound = beep(&engine, 800);
        let group = engine.create_group(1).unwrap();
        let group_channel = engine.play_group(group, &sound, true).unwrap();
        let mut voice = engine.voice();
        let Playback::Audible(channel) = engine.play(&mut voice, &sound) else {
            panic!("expected a channel");
        };

        engine.pause_all();
        assert_eq!(engine.channel_state(channel), Some(SourceState::Paused));
        assert_eq!(engine.channel_state(group_channel), Some(SourceState::Paused));

        engine.resume_all();
        assert_eq!(engine.channel_state(channel), Some(SourceState::Playing));
        assert_eq!(engine.channel_state(group_channel), Some(SourceState::Playing));
        assert!(sink.0.lock().is_empty());
    }

    #[test]
    fn test_listener_update() {
        let (engine, _) = engine(1);
        engine.update_listener(0.0, [5.0, -3.0], [1.0, 0.0]);
        engine.with_backend(|mixer| {
            let listener = mixer.listener();
            assert_eq!(listener.orientation, [1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
            assert_eq!(listener.position, [5.0, -3.0, 0.0]);
            assert_eq!(listener.velocity, [1.0, 0.0, 0.0]);
        });
    }

    #[test]
    fn test_load_sound_from_assets() {
        let (engine, _) = engine(1);
        let mut assets = MemoryAssets::new();
        assets.insert("blip.wav", wav_bytes(1, 1, 8000, 8, &[128, 200, 56, 128], None));

        let sound = engine.load_sound(&assets, "blip.wav").unwrap();
        assert_eq!(sound.name(), "blip.wav");
        assert_eq!(sound.format(), SampleFormat::Mono8);
        assert_eq!(sound.sample_rate(), 8000);
        assert_eq!(sound.frames(), 4);
        assert_eq!(sound.duration(), Duration::from_micros(500));

        let missing = engine.load_sound(&assets, "missing.ogg");
        assert!(matches!(missing, Err(AudioError::Asset { .. })));
    }

    #[test]
    fn test_freeing_sound_in_use_is_reported() {
        let (engine, sink) = engine(1);
        let sound = beep(&engine, 800);
        let mut voice = engine.voice();
        engine.play(&mut voice, &sound);

        engine.free_sound(sound.clone());
        let reported = sink.0.lock().clone();
        assert_eq!(
            reported,
            vec![("free_sound", BackendDiagnostic::InvalidOperation)]
        );
    }

    #[test]
    fn test_bad_channel_setup_is_reported() {
        init_logger();
        let sink = Arc::new(CollectSink::default());
        let config = EngineConfig {
            rolloff_factor: -1.0,
            ..EngineConfig::default()
        };
        let engine = AudioEngine::with_sink(SoftwareMixer::new(2, 8000), config, sink.clone());

        assert_eq!(engine.pool_stats().total, 2);
        assert_eq!(
            sink.0.lock().clone(),
            vec![
                ("init", BackendDiagnostic::InvalidValue),
                ("init", BackendDiagnostic::InvalidValue)
            ]
        );
    }

    #[test]
    fn test_pending_error_survives_failed_upload() {
        let (engine, sink) = engine(1);
        engine.with_backend(|mixer| mixer.delete_buffer(BufferId::new(99).unwrap()));

        let pcm = PcmData::new(SampleFormat::Stereo16, 8000, vec![0; 3]);
        assert!(engine.register_pcm("odd", &pcm).is_err());
        assert_eq!(
            sink.0.lock().clone(),
            vec![("register_pcm", BackendDiagnostic::InvalidName)]
        );
    }

    #[test]
    fn test_bad_pcm_is_a_load_failure() {
        let (engine, sink) = engine(1);
        let pcm = PcmData::new(SampleFormat::Stereo16, 8000, vec![0; 3]);
        assert!(matches!(
            engine.register_pcm("odd", &pcm),
            Err(AudioError::BufferCreation(BackendDiagnostic::InvalidValue))
        ));
        assert!(sink.0.lock().is_empty());
    }
}
