//! Compressed-stream decoder
//!
//! Decodes Ogg Vorbis assets with symphonia into interleaved 16-bit PCM.
//! Only the Ogg container is probed so WAVE data is left to the WAVE decoder.

use symphonia::core::audio::SampleBuffer as DecodeBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::{Hint, Probe};
use symphonia::default::formats::OggReader;

use super::asset::{AssetMedia, AssetStream};
use super::pcm::{FormatError, PcmData, SampleFormat};

/// A stream that passed the Ogg container probe, ready to be decoded
pub struct ProbedStream {
    format: Box<dyn FormatReader>,
}

/// Check whether the stream is an Ogg container
///
/// The stream is consumed either way; on failure it is dropped here and
/// the caller has to open the asset again.
pub fn probe(stream: Box<dyn AssetStream>) -> Result<ProbedStream, FormatError> {
    let mss = MediaSourceStream::new(Box::new(AssetMedia::new(stream)), Default::default());

    let mut hint = Hint::new();
    hint.with_extension("ogg");

    let mut probe = Probe::default();
    probe.register_all::<OggReader>();

    let probed = probe
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| FormatError::Probe(e.to_string()))?;

    Ok(ProbedStream {
        format: probed.format,
    })
}

impl ProbedStream {
    /// Decode every packet of the first audio track
    pub fn decode(mut self) -> Result<PcmData, FormatError> {
        let track = self
            .format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(FormatError::NoTracks)?;

        let track_id = track.id;
        let mut sample_rate = track.codec_params.sample_rate;
        let mut channels = track.codec_params.channels.map(|c| c.count() as u16);
        let frames_hint = track.codec_params.n_frames.unwrap_or(0) as usize;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| FormatError::Decoder(e.to_string()))?;

        let mut bytes: Vec<u8> = Vec::with_capacity(frames_hint * 4);
        let mut scratch: Option<DecodeBuffer<i16>> = None;

        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(FormatError::Decoder(e.to_string())),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    log::warn!("Skipping undecodable packet: {}", e);
                    continue;
                }
                Err(e) => return Err(FormatError::Decoder(e.to_string())),
            };

            let spec = *decoded.spec();
            sample_rate.get_or_insert(spec.rate);
            channels.get_or_insert(spec.channels.count() as u16);

            let needed = decoded.capacity() * spec.channels.count();
            if scratch.as_ref().map_or(true, |buf| buf.capacity() < needed) {
                scratch = Some(DecodeBuffer::<i16>::new(decoded.capacity() as u64, spec));
            }
            if let Some(buf) = scratch.as_mut() {
                buf.copy_interleaved_ref(decoded);
                for sample in buf.samples() {
                    bytes.extend_from_slice(&sample.to_le_bytes());
                }
            }
        }

        let channels = channels.ok_or(FormatError::NoTracks)?;
        let format = SampleFormat::from_layout(channels, 16)?;
        let sample_rate =
            sample_rate.ok_or_else(|| FormatError::Decoder("unknown sample rate".into()))?;

        Ok(PcmData::new(format, sample_rate, bytes))
    }
}
