//! Software mixer
//!
//! A device-independent [`Backend`]: sources and buffers live in memory and
//! `render` mixes every playing source into an interleaved f32 block. The
//! cpal output drives it from the audio callback; tests drive it directly.
//!
//! Rendering never allocates. Buffers play at their own rate by stepping the
//! read cursor, there is no interpolation.

use super::backend::{
    Backend, BackendDiagnostic, BackendInfo, BufferId, DistanceModel, ListenerState, SourceId,
    SourceParam, SourceState,
};
use super::pcm::PcmData;

#[derive(Debug, Clone)]
struct Source {
    state: SourceState,
    buffer: Option<BufferId>,
    gain: f32,
    position: [f32; 3],
    velocity: [f32; 3],
    relative: bool,
    looping: bool,
    max_distance: f32,
    rolloff_factor: f32,
    reference_distance: f32,
    /// Read position in buffer frames
    cursor: f64,
}

impl Default for Source {
    fn default() -> Self {
        Self {
            state: SourceState::Initial,
            buffer: None,
            gain: 1.0,
            position: [0.0; 3],
            velocity: [0.0; 3],
            relative: false,
            looping: false,
            max_distance: f32::MAX,
            rolloff_factor: 1.0,
            reference_distance: 1.0,
            cursor: 0.0,
        }
    }
}

/// In-memory mixing backend
pub struct SoftwareMixer {
    sources: Vec<Option<Source>>,
    buffers: Vec<Option<PcmData>>,
    max_sources: usize,
    live_sources: usize,
    output_rate: u32,
    listener: ListenerState,
    distance_model: DistanceModel,
    doppler_factor: f32,
    speed_of_sound: f32,
    /// First error since the last poll
    error: Option<BackendDiagnostic>,
    device: String,
}

impl SoftwareMixer {
    /// Create a mixer that can hold up to `max_sources` sources at once
    pub fn new(max_sources: usize, output_rate: u32) -> Self {
        Self {
            sources: Vec::with_capacity(max_sources),
            buffers: Vec::new(),
            max_sources,
            live_sources: 0,
            output_rate: output_rate.max(1),
            listener: ListenerState::default(),
            distance_model: DistanceModel::default(),
            doppler_factor: 1.0,
            speed_of_sound: 343.3,
            error: None,
            device: "Headless".to_string(),
        }
    }

    pub(crate) fn with_device_name(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    pub fn listener(&self) -> &ListenerState {
        &self.listener
    }

    pub fn doppler(&self) -> (f32, f32) {
        (self.doppler_factor, self.speed_of_sound)
    }

    pub fn distance_model(&self) -> DistanceModel {
        self.distance_model
    }

    /// Position last set on a source
    pub fn position(&self, source: SourceId) -> Option<[f32; 3]> {
        self.source(source).map(|s| s.position)
    }

    /// Velocity last set on a source
    pub fn velocity(&self, source: SourceId) -> Option<[f32; 3]> {
        self.source(source).map(|s| s.velocity)
    }

    pub fn is_relative(&self, source: SourceId) -> Option<bool> {
        self.source(source).map(|s| s.relative)
    }

    pub fn is_looping(&self, source: SourceId) -> Option<bool> {
        self.source(source).map(|s| s.looping)
    }

    /// Mix every playing source into `out`
    ///
    /// `out` is interleaved with `channels` samples per frame and is
    /// overwritten. Sources that run out of data without looping stop.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        out.fill(0.0);
        if channels == 0 {
            return;
        }

        for source in self.sources.iter_mut().flatten() {
            if source.state != SourceState::Playing {
                continue;
            }
            let pcm = match source
                .buffer
                .and_then(|id| self.buffers.get(id.get() as usize - 1))
                .and_then(Option::as_ref)
            {
                Some(pcm) => pcm,
                None => {
                    source.state = SourceState::Stopped;
                    continue;
                }
            };

            let frames = pcm.frames();
            let step = f64::from(pcm.sample_rate) / f64::from(self.output_rate);
            let (gain_left, gain_right) =
                spatial_gains(source, &self.listener, self.distance_model);

            for frame in out.chunks_mut(channels) {
                let mut index = source.cursor as usize;
                if index >= frames {
                    if source.looping && frames > 0 {
                        source.cursor %= frames as f64;
                        index = source.cursor as usize;
                    } else {
                        source.state = SourceState::Stopped;
                        source.cursor = 0.0;
                        break;
                    }
                }

                let left = pcm.sample(index, 0) * gain_left;
                let right = pcm.sample(index, 1) * gain_right;
                if channels >= 2 {
                    frame[0] += left;
                    frame[1] += right;
                } else {
                    frame[0] += (left + right) * 0.5;
                }
                source.cursor += step;
            }
        }

        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
    }

    fn record(&mut self, error: BackendDiagnostic) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn source(&self, id: SourceId) -> Option<&Source> {
        self.sources.get(id.get() as usize - 1).and_then(Option::as_ref)
    }

    fn source_mut(&mut self, id: SourceId) -> Option<&mut Source> {
        let index = id.get() as usize - 1;
        if matches!(self.sources.get(index), Some(Some(_))) {
            self.sources[index].as_mut()
        } else {
            self.record(BackendDiagnostic::InvalidName);
            None
        }
    }

    fn buffer_exists(&self, id: BufferId) -> bool {
        matches!(self.buffers.get(id.get() as usize - 1), Some(Some(_)))
    }
}

/// Per-side gain of a source after distance attenuation and panning
fn spatial_gains(source: &Source, listener: &ListenerState, model: DistanceModel) -> (f32, f32) {
    let offset = if source.relative {
        source.position
    } else {
        sub(source.position, listener.position)
    };
    let distance = length(offset);

    let attenuation = match model {
        DistanceModel::None => 1.0,
        DistanceModel::InverseDistanceClamped => {
            let reference = source.reference_distance;
            let clamped = distance.max(reference).min(source.max_distance.max(reference));
            let denom = reference + source.rolloff_factor * (clamped - reference);
            if denom > 0.0 {
                reference / denom
            } else {
                1.0
            }
        }
    };

    let pan = if distance > f32::EPSILON {
        let right = if source.relative {
            [1.0, 0.0, 0.0]
        } else {
            let forward = [listener.orientation[0], listener.orientation[1], listener.orientation[2]];
            let up = [listener.orientation[3], listener.orientation[4], listener.orientation[5]];
            normalize(cross(forward, up))
        };
        (dot(offset, right) / distance).clamp(-1.0, 1.0)
    } else {
        0.0
    };

    let gain = source.gain * attenuation;
    (gain * (1.0 - pan.max(0.0)), gain * (1.0 + pan.min(0.0)))
}

fn sub(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn dot(a: [f32; 3], b: [f32; 3]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn length(a: [f32; 3]) -> f32 {
    dot(a, a).sqrt()
}

fn normalize(a: [f32; 3]) -> [f32; 3] {
    let len = length(a);
    if len > f32::EPSILON {
        [a[0] / len, a[1] / len, a[2] / len]
    } else {
        [0.0; 3]
    }
}

impl Backend for SoftwareMixer {
    fn info(&self) -> BackendInfo {
        BackendInfo {
            device: self.device.clone(),
            renderer: "Software mixer".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    fn set_distance_model(&mut self, model: DistanceModel) {
        self.distance_model = model;
    }

    fn set_doppler(&mut self, factor: f32, speed_of_sound: f32) {
        if factor < 0.0 || speed_of_sound <= 0.0 {
            self.record(BackendDiagnostic::InvalidValue);
            return;
        }
        self.doppler_factor = factor;
        self.speed_of_sound = speed_of_sound;
    }

    fn create_source(&mut self) -> Result<SourceId, BackendDiagnostic> {
        if self.live_sources >= self.max_sources {
            self.record(BackendDiagnostic::OutOfMemory);
            return Err(BackendDiagnostic::OutOfMemory);
        }

        let index = match self.sources.iter().position(Option::is_none) {
            Some(index) => {
                self.sources[index] = Some(Source::default());
                index
            }
            None => {
                self.sources.push(Some(Source::default()));
                self.sources.len() - 1
            }
        };
        self.live_sources += 1;

        SourceId::new(index as u32 + 1).ok_or(BackendDiagnostic::InvalidName)
    }

    fn delete_source(&mut self, source: SourceId) {
        if self.source_mut(source).is_some() {
            self.sources[source.get() as usize - 1] = None;
            self.live_sources -= 1;
        }
    }

    fn create_buffer(&mut self, pcm: &PcmData) -> Result<BufferId, BackendDiagnostic> {
        if pcm.bytes.len() % pcm.format.frame_size() != 0 || pcm.sample_rate == 0 {
            self.record(BackendDiagnostic::InvalidValue);
            return Err(BackendDiagnostic::InvalidValue);
        }
        self.buffers.push(Some(pcm.clone()));
        BufferId::new(self.buffers.len() as u32).ok_or(BackendDiagnostic::InvalidName)
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        if !self.buffer_exists(buffer) {
            self.record(BackendDiagnostic::InvalidName);
            return;
        }
        let in_use = self
            .sources
            .iter()
            .flatten()
            .any(|s| s.buffer == Some(buffer));
        if in_use {
            self.record(BackendDiagnostic::InvalidOperation);
            return;
        }
        self.buffers[buffer.get() as usize - 1] = None;
    }

    fn attach(&mut self, source: SourceId, buffer: Option<BufferId>) {
        if let Some(id) = buffer {
            if !self.buffer_exists(id) {
                self.record(BackendDiagnostic::InvalidName);
                return;
            }
        }
        let Some(src) = self.source_mut(source) else {
            return;
        };
        if matches!(src.state, SourceState::Playing | SourceState::Paused) {
            self.record(BackendDiagnostic::InvalidOperation);
            return;
        }
        src.buffer = buffer;
        src.cursor = 0.0;
    }

    fn set_param(&mut self, source: SourceId, param: SourceParam) {
        let invalid = match param {
            SourceParam::Gain(v)
            | SourceParam::MaxDistance(v)
            | SourceParam::RolloffFactor(v)
            | SourceParam::ReferenceDistance(v) => v < 0.0 || v.is_nan(),
            _ => false,
        };
        if invalid {
            self.record(BackendDiagnostic::InvalidValue);
            return;
        }

        let Some(src) = self.source_mut(source) else {
            return;
        };
        match param {
            SourceParam::Gain(v) => src.gain = v,
            SourceParam::Position(p) => src.position = p,
            SourceParam::Velocity(v) => src.velocity = v,
            SourceParam::Relative(r) => src.relative = r,
            SourceParam::Looping(l) => src.looping = l,
            SourceParam::MaxDistance(v) => src.max_distance = v,
            SourceParam::RolloffFactor(v) => src.rolloff_factor = v,
            SourceParam::ReferenceDistance(v) => src.reference_distance = v,
        }
    }

    fn state(&self, source: SourceId) -> SourceState {
        self.source(source).map(|s| s.state).unwrap_or_default()
    }

    fn gain(&self, source: SourceId) -> f32 {
        self.source(source).map(|s| s.gain).unwrap_or(0.0)
    }

    fn attached(&self, source: SourceId) -> Option<BufferId> {
        self.source(source).and_then(|s| s.buffer)
    }

    fn play(&mut self, source: SourceId) {
        let Some(src) = self.source_mut(source) else {
            return;
        };
        match (src.state, src.buffer) {
            (_, None) => src.state = SourceState::Stopped,
            (SourceState::Paused, Some(_)) => src.state = SourceState::Playing,
            (_, Some(_)) => {
                src.cursor = 0.0;
                src.state = SourceState::Playing;
            }
        }
    }

    fn pause(&mut self, source: SourceId) {
        if let Some(src) = self.source_mut(source) {
            if src.state == SourceState::Playing {
                src.state = SourceState::Paused;
            }
        }
    }

    fn stop(&mut self, source: SourceId) {
        if let Some(src) = self.source_mut(source) {
            src.state = SourceState::Stopped;
            src.cursor = 0.0;
        }
    }

    fn set_listener(&mut self, listener: &ListenerState) {
        self.listener = *listener;
    }

    fn take_error(&mut self) -> Option<BackendDiagnostic> {
        self.error.take()
    }
}
