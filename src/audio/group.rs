//! Channel groups
//!
//! A group owns channels taken out of the shared pool when it is created and
//! plays listener-relative, optionally looping sounds on them round-robin.
//! Stopping a group fades it out linearly before silencing every channel.

use std::num::NonZeroU32;
use std::time::{Duration, Instant};

use super::backend::{Backend, BufferId, SourceParam, SourceState};
use super::engine::AudioError;
use super::pool::{pause_sources, resume_sources, ChannelId, ChannelPool};

/// Group identifier, generated monotonically and never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(NonZeroU32);

impl GroupId {
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Group-wide state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    /// Ready to play, or playing
    Playing,
    /// Fading out since `started`
    FadeOut { started: Instant },
}

#[derive(Debug)]
struct Group {
    id: GroupId,
    channels: Vec<ChannelId>,
    state: GroupState,
}

/// All groups of one engine
#[derive(Debug, Default)]
pub struct GroupTable {
    groups: Vec<Group>,
    last_id: u32,
}

impl GroupTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `size` channels from the pool for a new group
    pub fn create(&mut self, pool: &mut ChannelPool, size: usize) -> Result<GroupId, AudioError> {
        if size == 0 {
            return Err(AudioError::EmptyGroup);
        }

        self.last_id += 1;
        let id = GroupId::new(self.last_id).ok_or(AudioError::EmptyGroup)?;

        let Some(channels) = pool.withdraw(id, size) else {
            log::warn!(
                "Not enough free channels for group {}: {} requested, {} free",
                id,
                size,
                pool.free_count()
            );
            return Err(AudioError::GroupExhausted {
                requested: size,
                available: pool.free_count(),
            });
        };

        log::debug!("Created group {} with {} channels", id, size);
        self.groups.push(Group {
            id,
            channels,
            state: GroupState::Playing,
        });
        Ok(id)
    }

    /// Play `buffer` on an idle channel of the group
    ///
    /// When every channel is busy the last one is stopped and reused, so the
    /// newest request always wins.
    pub fn play<B: Backend>(
        &mut self,
        id: GroupId,
        pool: &ChannelPool,
        backend: &mut B,
        buffer: BufferId,
        looping: bool,
        volume: f32,
    ) -> Result<ChannelId, AudioError> {
        let group = self.find_mut(id)?;
        group.state = GroupState::Playing;

        let last = group.channels.len() - 1;
        for (index, &channel) in group.channels.iter().enumerate() {
            let Some(source) = pool.source(channel) else {
                continue;
            };
            let state = backend.state(source);

            if index == last {
                if state != SourceState::Stopped {
                    backend.stop(source);
                }
            } else if matches!(state, SourceState::Playing | SourceState::Paused) {
                continue;
            }

            backend.attach(source, Some(buffer));
            backend.set_param(source, SourceParam::Gain(volume));
            backend.set_param(source, SourceParam::Relative(true));
            backend.set_param(source, SourceParam::Position([0.0; 3]));
            backend.set_param(source, SourceParam::Looping(looping));
            backend.play(source);
            return Ok(channel);
        }

        log::warn!("Group '{}' has no usable channels", id);
        Err(AudioError::EmptyGroup)
    }

    /// Start fading the group out
    pub fn stop(&mut self, id: GroupId, now: Instant) -> Result<(), AudioError> {
        let group = self.find_mut(id)?;
        if group.state == GroupState::Playing {
            group.state = GroupState::FadeOut { started: now };
        }
        Ok(())
    }

    pub fn pause<B: Backend>(
        &mut self,
        id: GroupId,
        pool: &ChannelPool,
        backend: &mut B,
    ) -> Result<(), AudioError> {
        let group = self.find_mut(id)?;
        pause_sources(backend, group.channels.iter().filter_map(|&c| pool.source(c)));
        Ok(())
    }

    pub fn resume<B: Backend>(
        &mut self,
        id: GroupId,
        pool: &ChannelPool,
        backend: &mut B,
    ) -> Result<(), AudioError> {
        let group = self.find_mut(id)?;
        resume_sources(backend, group.channels.iter().filter_map(|&c| pool.source(c)));
        Ok(())
    }

    /// Advance fades and apply the global volume to every group channel
    pub fn tick<B: Backend>(
        &mut self,
        now: Instant,
        fade: Duration,
        pool: &ChannelPool,
        backend: &mut B,
        volume: f32,
    ) {
        for group in &mut self.groups {
            let sources = group.channels.iter().filter_map(|&c| pool.source(c));
            match group.state {
                GroupState::FadeOut { started } => {
                    let elapsed = now.saturating_duration_since(started);
                    if elapsed < fade {
                        let level = 1.0 - elapsed.as_secs_f32() / fade.as_secs_f32();
                        for source in sources {
                            backend.set_param(source, SourceParam::Gain(level * volume));
                        }
                    } else {
                        for source in sources {
                            backend.stop(source);
                            backend.attach(source, None);
                            backend.set_param(source, SourceParam::Gain(volume));
                        }
                        group.state = GroupState::Playing;
                    }
                }
                GroupState::Playing => {
                    for source in sources {
                        backend.set_param(source, SourceParam::Gain(volume));
                    }
                }
            }
        }
    }

    /// Silence a group and hand its channels back to the pool
    pub fn destroy<B: Backend>(
        &mut self,
        id: GroupId,
        pool: &mut ChannelPool,
        backend: &mut B,
    ) -> Result<(), AudioError> {
        let index = self
            .groups
            .iter()
            .position(|g| g.id == id)
            .ok_or_else(|| unknown(id))?;
        let group = self.groups.remove(index);

        for channel in group.channels {
            if let Some(source) = pool.source(channel) {
                backend.stop(source);
                backend.attach(source, None);
                backend.set_param(source, SourceParam::Looping(false));
            }
            pool.release(channel);
        }
        Ok(())
    }

    pub fn channels(&self, id: GroupId) -> Option<&[ChannelId]> {
        self.find(id).map(|g| g.channels.as_slice())
    }

    pub fn state(&self, id: GroupId) -> Option<GroupState> {
        self.find(id).map(|g| g.state)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    fn find(&self, id: GroupId) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == id)
    }

    fn find_mut(&mut self, id: GroupId) -> Result<&mut Group, AudioError> {
        self.groups
            .iter_mut()
            .find(|g| g.id == id)
            .ok_or_else(|| unknown(id))
    }
}

fn unknown(id: GroupId) -> AudioError {
    log::warn!("Group '{}' not found", id);
    AudioError::UnknownGroup(id)
}
