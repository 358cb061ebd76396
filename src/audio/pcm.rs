//! Decoded PCM data shared by both decoders

use thiserror::Error;

/// Errors that can occur while decoding an audio asset
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Failed to read audio stream: {0}")]
    Io(#[from] std::io::Error),

    #[error("Expected '{expected}' header")]
    BadMagic { expected: &'static str },

    #[error("Unsupported WAVE compression 0x{0:04x}")]
    UnsupportedCompression(u16),

    #[error("Unsupported number of channels ({0})")]
    UnsupportedChannels(u16),

    #[error("Unsupported bits per sample ({0})")]
    UnsupportedBitDepth(u16),

    #[error("Chunk length {0} is too short")]
    BadChunkLength(u32),

    #[error("Stream ended before the declared data length")]
    Truncated,

    #[error("Failed to probe audio format: {0}")]
    Probe(String),

    #[error("No audio tracks found")]
    NoTracks,

    #[error("Decoder error: {0}")]
    Decoder(String),
}

/// Channel layout and sample width of a PCM blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    Mono8,
    Mono16,
    Stereo8,
    Stereo16,
}

impl SampleFormat {
    /// Resolve a channel count and bit depth into a format
    pub fn from_layout(channels: u16, bits_per_sample: u16) -> Result<Self, FormatError> {
        match (channels, bits_per_sample) {
            (1, 8) => Ok(Self::Mono8),
            (1, 16) => Ok(Self::Mono16),
            (2, 8) => Ok(Self::Stereo8),
            (2, 16) => Ok(Self::Stereo16),
            (1 | 2, bits) => Err(FormatError::UnsupportedBitDepth(bits)),
            (channels, _) => Err(FormatError::UnsupportedChannels(channels)),
        }
    }

    pub fn channels(self) -> u16 {
        match self {
            Self::Mono8 | Self::Mono16 => 1,
            Self::Stereo8 | Self::Stereo16 => 2,
        }
    }

    pub fn bits_per_sample(self) -> u16 {
        match self {
            Self::Mono8 | Self::Stereo8 => 8,
            Self::Mono16 | Self::Stereo16 => 16,
        }
    }

    /// Bytes per interleaved frame
    pub fn frame_size(self) -> usize {
        self.channels() as usize * self.bits_per_sample() as usize / 8
    }
}

/// Raw decoded audio ready to be handed to the backend
///
/// 8-bit samples are unsigned, 16-bit samples are signed little-endian,
/// channels interleaved.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmData {
    pub format: SampleFormat,
    pub sample_rate: u32,
    pub bytes: Vec<u8>,
}

impl PcmData {
    pub fn new(format: SampleFormat, sample_rate: u32, bytes: Vec<u8>) -> Self {
        Self {
            format,
            sample_rate,
            bytes,
        }
    }

    pub fn channels(&self) -> u16 {
        self.format.channels()
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.format.bits_per_sample()
    }

    /// Number of complete frames in the blob
    pub fn frames(&self) -> usize {
        self.bytes.len() / self.format.frame_size()
    }

    /// Read one sample as a float in [-1, 1]
    ///
    /// `channel` is clamped to the last channel so mono data can be read as
    /// either side of a stereo pair.
    #[inline]
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        let channel = channel.min(self.channels() as usize - 1);
        match self.format {
            SampleFormat::Mono8 | SampleFormat::Stereo8 => {
                let idx = frame * self.channels() as usize + channel;
                self.bytes
                    .get(idx)
                    .map(|&b| (b as f32 - 128.0) / 128.0)
                    .unwrap_or(0.0)
            }
            SampleFormat::Mono16 | SampleFormat::Stereo16 => {
                let idx = (frame * self.channels() as usize + channel) * 2;
                match self.bytes.get(idx..idx + 2) {
                    Some(pair) => i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0,
                    None => 0.0,
                }
            }
        }
    }
}
