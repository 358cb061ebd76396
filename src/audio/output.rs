//! Audio output device
//!
//! Opens the default cpal output device and renders a shared
//! [`SoftwareMixer`] from the stream callback.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use thiserror::Error;

use super::backend::{
    Backend, BackendDiagnostic, BackendInfo, BufferId, DistanceModel, ListenerState, SourceId,
    SourceParam, SourceState,
};
use super::diagnostics::{self, DiagnosticConsumer, DiagnosticProducer};
use super::mixer::SoftwareMixer;
use super::pcm::PcmData;

/// Errors that can occur while opening the output device
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("No output device available")]
    NoDevice,

    #[error("Failed to get output config: {0}")]
    Config(String),

    #[error("Unsupported output sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to start output stream: {0}")]
    Stream(String),
}

/// Largest callback block rendered without growing the conversion buffer
const SCRATCH_SAMPLES: usize = 16384;

/// Backend playing through the default output device
pub struct CpalBackend {
    mixer: Arc<Mutex<SoftwareMixer>>,
    errors: DiagnosticConsumer,
    /// Keeps the device running
    _stream: cpal::Stream,
}

impl CpalBackend {
    /// Open the default output device and start the stream
    pub fn open(max_sources: usize, diagnostic_capacity: usize) -> Result<Self, DeviceError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(DeviceError::NoDevice)?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        log::info!("Using output device: {}", device_name);

        let supported = device
            .default_output_config()
            .map_err(|e| DeviceError::Config(e.to_string()))?;
        log::info!("Audio config: {:?}", supported);

        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let channels = config.channels as usize;

        let mixer = Arc::new(Mutex::new(
            SoftwareMixer::new(max_sources, config.sample_rate.0).with_device_name(&device_name),
        ));
        let (producer, errors) = diagnostics::queue(diagnostic_capacity);

        let stream = match sample_format {
            cpal::SampleFormat::F32 => {
                let mixer = Arc::clone(&mixer);
                let mut producer = producer;
                device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        mixer.lock().render(data, channels);
                    },
                    move |err| report_stream_error(&mut producer, err),
                    None,
                )
            }
            cpal::SampleFormat::I16 => {
                let mixer = Arc::clone(&mixer);
                let mut producer = producer;
                let mut scratch = vec![0.0f32; SCRATCH_SAMPLES];
                device.build_output_stream(
                    &config,
                    move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                        if scratch.len() < data.len() {
                            scratch.resize(data.len(), 0.0);
                        }
                        let block = &mut scratch[..data.len()];
                        mixer.lock().render(block, channels);
                        for (out, sample) in data.iter_mut().zip(block.iter()) {
                            *out = (sample * i16::MAX as f32) as i16;
                        }
                    },
                    move |err| report_stream_error(&mut producer, err),
                    None,
                )
            }
            format => {
                return Err(DeviceError::UnsupportedFormat(format!("{:?}", format)));
            }
        }
        .map_err(|e| DeviceError::Stream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| DeviceError::Stream(e.to_string()))?;

        Ok(Self {
            mixer,
            errors,
            _stream: stream,
        })
    }

    /// Shared mixer rendered by the stream callback
    pub fn mixer(&self) -> &Arc<Mutex<SoftwareMixer>> {
        &self.mixer
    }

    /// Stream errors lost because the diagnostic queue was full
    pub fn dropped_diagnostics(&self) -> u64 {
        self.errors.dropped()
    }
}

fn report_stream_error(producer: &mut DiagnosticProducer, err: cpal::StreamError) {
    producer.push(BackendDiagnostic::Stream(err.to_string()));
}

impl Backend for CpalBackend {
    fn info(&self) -> BackendInfo {
        self.mixer.lock().info()
    }

    fn set_distance_model(&mut self, model: DistanceModel) {
        self.mixer.lock().set_distance_model(model);
    }

    fn set_doppler(&mut self, factor: f32, speed_of_sound: f32) {
        self.mixer.lock().set_doppler(factor, speed_of_sound);
    }

    fn create_source(&mut self) -> Result<SourceId, BackendDiagnostic> {
        self.mixer.lock().create_source()
    }

    fn delete_source(&mut self, source: SourceId) {
        self.mixer.lock().delete_source(source);
    }

    fn create_buffer(&mut self, pcm: &PcmData) -> Result<BufferId, BackendDiagnostic> {
        self.mixer.lock().create_buffer(pcm)
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.mixer.lock().delete_buffer(buffer);
    }

    fn attach(&mut self, source: SourceId, buffer: Option<BufferId>) {
        self.mixer.lock().attach(source, buffer);
    }

    fn set_param(&mut self, source: SourceId, param: SourceParam) {
        self.mixer.lock().set_param(source, param);
    }

    fn state(&self, source: SourceId) -> SourceState {
        self.mixer.lock().state(source)
    }

    fn gain(&self, source: SourceId) -> f32 {
        self.mixer.lock().gain(source)
    }

    fn attached(&self, source: SourceId) -> Option<BufferId> {
        self.mixer.lock().attached(source)
    }

    fn play(&mut self, source: SourceId) {
        self.mixer.lock().play(source);
    }

    fn pause(&mut self, source: SourceId) {
        self.mixer.lock().pause(source);
    }

    fn stop(&mut self, source: SourceId) {
        self.mixer.lock().stop(source);
    }

    fn set_listener(&mut self, listener: &ListenerState) {
        self.mixer.lock().set_listener(listener);
    }

    fn take_error(&mut self) -> Option<BackendDiagnostic> {
        self.errors.pop().or_else(|| self.mixer.lock().take_error())
    }
}
