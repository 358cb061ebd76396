//! Voices
//!
//! A voice is one caller-owned playback request. It holds a channel while
//! one is available and is silently tracked as virtual otherwise. Stopping
//! is two-phase: `stop` only asks the backend to stop, the channel goes back
//! to the pool on the next tick that sees the backend report it stopped.

use super::backend::{Backend, BufferId, SourceId, SourceParam, SourceState};
use super::pool::{ChannelId, ChannelPool, Owner};

/// Unique id of a voice, used to tag the channel it holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(u64);

impl VoiceId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// Lifecycle of a voice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    /// No channel; removed on the next tick
    Virtual,
    /// Holds a channel that is producing sound
    Playing,
    /// Stop requested, waiting for the backend to confirm
    Stopping,
    /// Channel just reclaimed; the caller drops the voice
    Stopped,
    /// Never had a channel or lost it; the caller drops the voice
    Destroy,
}

/// Result of a play request
///
/// Running out of channels is not an error: the voice simply stays silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Playback {
    Audible(ChannelId),
    Virtual,
}

impl Playback {
    pub fn is_audible(self) -> bool {
        matches!(self, Self::Audible(_))
    }
}

/// A playback request
///
/// Not `Clone`: the channel handle inside must have exactly one holder.
#[derive(Debug)]
pub struct Voice {
    id: VoiceId,
    channel: Option<ChannelId>,
    buffer: Option<BufferId>,
    position: [f32; 3],
    velocity: [f32; 3],
    relative: bool,
    state: VoiceState,
}

impl Voice {
    pub(crate) fn new(id: VoiceId) -> Self {
        Self {
            id,
            channel: None,
            buffer: None,
            position: [0.0; 3],
            velocity: [0.0; 3],
            relative: true,
            state: VoiceState::Virtual,
        }
    }

    pub fn id(&self) -> VoiceId {
        self.id
    }

    /// Channel held by this voice, `None` while virtual
    pub fn channel(&self) -> Option<ChannelId> {
        self.channel
    }

    pub fn buffer(&self) -> Option<BufferId> {
        self.buffer
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    pub fn position(&self) -> [f32; 3] {
        self.position
    }

    pub fn velocity(&self) -> [f32; 3] {
        self.velocity
    }

    pub fn is_relative(&self) -> bool {
        self.relative
    }

    /// The caller should drop this voice
    pub fn is_finished(&self) -> bool {
        matches!(self.state, VoiceState::Stopped | VoiceState::Destroy)
    }

    /// Move the voice; the backend sees it on the next tick
    pub fn update_position(&mut self, position: [f32; 2], velocity: [f32; 2]) {
        self.position = [position[0], position[1], 0.0];
        self.velocity = [velocity[0], velocity[1], 0.0];
    }
}

/// Spatial setup of a play request
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Placement {
    pub position: [f32; 2],
    pub velocity: [f32; 2],
    pub relative: bool,
}

/// Attach `buffer` to a free channel and start it
pub(crate) fn start<B: Backend>(
    voice: &mut Voice,
    pool: &mut ChannelPool,
    backend: &mut B,
    buffer: BufferId,
    placement: Placement,
    volume: f32,
) -> Playback {
    // Replaying a voice must not leak the channel it still holds
    if voice.channel.is_some() {
        reclaim(voice, pool, backend);
    }

    voice.buffer = Some(buffer);
    voice.relative = placement.relative;
    voice.update_position(placement.position, placement.velocity);

    let Some(channel) = pool.acquire(Owner::Voice(voice.id)) else {
        log::debug!("No free channel, voice {} is virtual", voice.id.get());
        voice.state = VoiceState::Virtual;
        return Playback::Virtual;
    };
    let Some(source) = pool.source(channel) else {
        voice.state = VoiceState::Virtual;
        return Playback::Virtual;
    };

    backend.attach(source, Some(buffer));
    backend.set_param(source, SourceParam::Relative(voice.relative));
    backend.set_param(source, SourceParam::Gain(volume));
    backend.set_param(source, SourceParam::Position(voice.position));
    backend.set_param(source, SourceParam::Velocity(voice.velocity));
    backend.play(source);

    voice.channel = Some(channel);
    voice.state = VoiceState::Playing;
    Playback::Audible(channel)
}

/// Advance one voice by one update pass
pub(crate) fn tick<B: Backend>(
    voice: &mut Voice,
    pool: &mut ChannelPool,
    backend: &mut B,
    volume: f32,
) {
    let Some((channel, source)) = held(voice, pool) else {
        voice.channel = None;
        voice.state = VoiceState::Destroy;
        return;
    };

    if backend.state(source) == SourceState::Stopped {
        // Detach so a later resume can't start it again
        backend.attach(source, None);
        pool.release(channel);
        voice.channel = None;
        voice.state = VoiceState::Stopped;
        return;
    }

    backend.set_param(source, SourceParam::Gain(volume));
    backend.set_param(source, SourceParam::Position(voice.position));
    backend.set_param(source, SourceParam::Velocity(voice.velocity));
}

/// Ask the backend to stop; the channel is reclaimed by a later tick
pub(crate) fn stop<B: Backend>(voice: &mut Voice, pool: &ChannelPool, backend: &mut B) {
    if voice.channel.is_none() {
        return;
    }
    let Some((_, source)) = held(voice, pool) else {
        voice.channel = None;
        voice.state = VoiceState::Destroy;
        return;
    };
    backend.stop(source);
    if voice.state == VoiceState::Playing {
        voice.state = VoiceState::Stopping;
    }
}

fn reclaim<B: Backend>(voice: &mut Voice, pool: &mut ChannelPool, backend: &mut B) {
    if let Some((channel, source)) = held(voice, pool) {
        backend.stop(source);
        backend.attach(source, None);
        pool.release(channel);
    }
    voice.channel = None;
}

/// The voice's channel and source, if the pool still has it tagged as ours
///
/// A handle whose channel now belongs to someone else (another voice, a
/// group, or a different pool altogether) must never reach the backend.
fn held(voice: &Voice, pool: &ChannelPool) -> Option<(ChannelId, SourceId)> {
    let channel = voice.channel?;
    if pool.owner(channel) != Some(Owner::Voice(voice.id)) {
        log::debug!(
            "Voice {} no longer holds channel {}",
            voice.id.get(),
            channel.index()
        );
        return None;
    }
    Some((channel, pool.source(channel)?))
}
