//! Channel pool
//!
//! Every channel the engine created lives in one arena slot tagged with its
//! current owner. The free list holds slot indices, so acquiring, releasing
//! and withdrawing channels into a group are tag updates rather than scans.

use super::backend::{Backend, SourceId, SourceState};
use super::group::GroupId;
use super::voice::VoiceId;

/// Hard cap on channels created at startup
pub const MAX_CHANNELS: usize = 256;

/// Index of a channel in the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u32);

impl ChannelId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Who currently holds a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    Free,
    Voice(VoiceId),
    Group(GroupId),
}

#[derive(Debug, Clone)]
struct Slot {
    source: SourceId,
    owner: Owner,
}

/// Channel counts by owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    pub total: usize,
    pub free: usize,
    pub in_voices: usize,
    pub in_groups: usize,
}

/// Fixed set of backend sources shared by voices and groups
#[derive(Debug, Default)]
pub struct ChannelPool {
    slots: Vec<Slot>,
    free: Vec<ChannelId>,
}

impl ChannelPool {
    /// Create up to `limit` sources, stopping at the first failure
    ///
    /// Running out of sources early is expected on small devices: fewer
    /// channels only means more voices go virtual.
    pub fn create<B: Backend>(
        backend: &mut B,
        limit: usize,
        setup: impl Fn(&mut B, SourceId),
    ) -> Self {
        let limit = limit.min(MAX_CHANNELS);
        let mut slots = Vec::with_capacity(limit);

        while slots.len() < limit {
            match backend.create_source() {
                Ok(source) => {
                    setup(backend, source);
                    slots.push(Slot {
                        source,
                        owner: Owner::Free,
                    });
                }
                Err(e) => {
                    log::debug!("Stopped creating channels after {}: {}", slots.len(), e);
                    // The failed creation is expected, don't report it later
                    if let Some(pending) = backend.take_error() {
                        if pending != e {
                            log::warn!("Audio backend error during init: {}", pending);
                        }
                    }
                    break;
                }
            }
        }

        // Reverse so the first channel is handed out first
        let free = (0..slots.len() as u32).rev().map(ChannelId).collect();
        Self { slots, free }
    }

    /// Take a free channel for `owner`, or `None` if the pool is empty
    pub fn acquire(&mut self, owner: Owner) -> Option<ChannelId> {
        let id = self.free.pop()?;
        self.slots[id.index()].owner = owner;
        Some(id)
    }

    /// Return a channel to the free list
    ///
    /// The caller has already stopped it and detached its buffer. Releasing
    /// a channel that is already free is refused so it can never appear in
    /// the free list twice.
    pub fn release(&mut self, id: ChannelId) -> bool {
        match self.slots.get_mut(id.index()) {
            Some(slot) if slot.owner != Owner::Free => {
                slot.owner = Owner::Free;
                self.free.push(id);
                true
            }
            Some(_) => {
                log::warn!("Channel {} released twice", id.index());
                false
            }
            None => {
                log::warn!("Released unknown channel {}", id.index());
                false
            }
        }
    }

    /// Move `count` free channels into a group
    ///
    /// Either all of them move or none do.
    pub fn withdraw(&mut self, group: GroupId, count: usize) -> Option<Vec<ChannelId>> {
        if count > self.free.len() {
            return None;
        }
        let split = self.free.len() - count;
        let mut taken = self.free.split_off(split);
        taken.reverse();
        for id in &taken {
            self.slots[id.index()].owner = Owner::Group(group);
        }
        Some(taken)
    }

    pub fn source(&self, id: ChannelId) -> Option<SourceId> {
        self.slots.get(id.index()).map(|slot| slot.source)
    }

    pub fn owner(&self, id: ChannelId) -> Option<Owner> {
        self.slots.get(id.index()).map(|slot| slot.owner)
    }

    pub fn is_free(&self, id: ChannelId) -> bool {
        self.owner(id) == Some(Owner::Free)
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn total(&self) -> usize {
        self.slots.len()
    }

    pub fn stats(&self) -> PoolStats {
        let mut stats = PoolStats {
            total: self.slots.len(),
            free: self.free.len(),
            ..Default::default()
        };
        for slot in &self.slots {
            match slot.owner {
                Owner::Free => {}
                Owner::Voice(_) => stats.in_voices += 1,
                Owner::Group(_) => stats.in_groups += 1,
            }
        }
        stats
    }

    /// Every source, group channels included
    pub fn sources(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.slots.iter().map(|slot| slot.source)
    }

    /// Pause every channel that is actually playing
    pub fn pause_all<B: Backend>(&self, backend: &mut B) {
        pause_sources(backend, self.sources());
    }

    /// Resume every channel that is actually paused
    pub fn resume_all<B: Backend>(&self, backend: &mut B) {
        resume_sources(backend, self.sources());
    }
}

/// Pause only sources in the playing state, to avoid spurious backend errors
pub(crate) fn pause_sources<B: Backend>(
    backend: &mut B,
    sources: impl Iterator<Item = SourceId>,
) {
    for source in sources {
        if backend.state(source) == SourceState::Playing {
            backend.pause(source);
        }
    }
}

/// Resume only sources in the paused state
pub(crate) fn resume_sources<B: Backend>(
    backend: &mut B,
    sources: impl Iterator<Item = SourceId>,
) {
    for source in sources {
        if backend.state(source) == SourceState::Paused {
            backend.play(source);
        }
    }
}
