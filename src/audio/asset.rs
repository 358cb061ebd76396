//! Asset stream interface
//!
//! The engine never locates assets itself: an [`AssetSource`] hands out a
//! fresh readable/seekable stream for a name, and the loader decides which
//! decoder gets it.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;

use symphonia::core::io::MediaSource;

use super::engine::AudioError;
use super::ogg;
use super::pcm::PcmData;
use super::wav;

/// A readable, seekable byte stream for one asset
pub trait AssetStream: Read + Seek + Send + Sync {}

impl<T: Read + Seek + Send + Sync> AssetStream for T {}

/// Something that can open named assets
pub trait AssetSource {
    /// Open a new stream positioned at the start of the asset
    fn open(&self, name: &str) -> std::io::Result<Box<dyn AssetStream>>;
}

/// Assets stored as files below a root directory
#[derive(Debug, Clone)]
pub struct DirectoryAssets {
    root: PathBuf,
}

impl DirectoryAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetSource for DirectoryAssets {
    fn open(&self, name: &str) -> std::io::Result<Box<dyn AssetStream>> {
        let file = File::open(self.root.join(name))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Assets held in memory, keyed by name
#[derive(Debug, Clone, Default)]
pub struct MemoryAssets {
    assets: HashMap<String, Arc<[u8]>>,
}

impl MemoryAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) {
        self.assets.insert(name.into(), bytes.into());
    }
}

impl AssetSource for MemoryAssets {
    fn open(&self, name: &str) -> std::io::Result<Box<dyn AssetStream>> {
        let bytes = self.assets.get(name).ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, format!("no asset '{}'", name))
        })?;
        Ok(Box::new(Cursor::new(Arc::clone(bytes))))
    }
}

/// Adapter giving symphonia ownership of an asset stream
pub(crate) struct AssetMedia {
    stream: Box<dyn AssetStream>,
}

impl AssetMedia {
    pub(crate) fn new(stream: Box<dyn AssetStream>) -> Self {
        Self { stream }
    }
}

impl Read for AssetMedia {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Seek for AssetMedia {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.stream.seek(pos)
    }
}

impl MediaSource for AssetMedia {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

/// Decode a named asset into PCM
///
/// The compressed probe goes first. It owns the stream and drops it on
/// failure, so the WAVE attempt works on a freshly opened one.
pub fn load_pcm(assets: &dyn AssetSource, name: &str) -> Result<PcmData, AudioError> {
    let open = |name: &str| {
        assets.open(name).map_err(|source| AudioError::Asset {
            name: name.to_string(),
            source,
        })
    };

    let result = match ogg::probe(open(name)?) {
        Ok(probed) => probed.decode(),
        Err(e) => {
            log::debug!("'{}' is not an Ogg stream ({}), trying WAVE", name, e);
            let mut stream = open(name)?;
            wav::decode_wav(&mut stream)
        }
    };

    result.map_err(|source| {
        log::warn!("Failed to load sound file '{}': {}", name, source);
        AudioError::Load {
            name: name.to_string(),
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ogg::tests::{SILENCE_MONO, SILENCE_STEREO};
    use crate::audio::pcm::{FormatError, SampleFormat};
    use crate::audio::wav::tests::wav_bytes;

    #[test]
    fn test_ogg_is_decoded_before_wave() {
        let mut assets = MemoryAssets::new();
        assets.insert("wind.ogg", SILENCE_STEREO);
        // The name says WAVE but the bytes decide
        assets.insert("hit.wav", SILENCE_MONO);

        let pcm = load_pcm(&assets, "wind.ogg").unwrap();
        assert_eq!(pcm.format, SampleFormat::Stereo16);
        assert_eq!(pcm.sample_rate, 22050);

        let pcm = load_pcm(&assets, "hit.wav").unwrap();
        assert_eq!(pcm.format, SampleFormat::Mono16);
        assert_eq!(pcm.sample_rate, 8000);
        assert!(pcm.frames() > 0);
    }

    #[test]
    fn test_wave_fallback() {
        let mut assets = MemoryAssets::new();
        assets.insert("beep.wav", wav_bytes(1, 1, 8000, 8, &[10, 20, 30], None));

        let pcm = load_pcm(&assets, "beep.wav").unwrap();
        assert_eq!(pcm.format, SampleFormat::Mono8);
        assert_eq!(pcm.bytes, vec![10, 20, 30]);
    }

    #[test]
    fn test_error_names_asset() {
        let mut assets = MemoryAssets::new();
        assets.insert("noise.bin", vec![7u8; 64]);

        match load_pcm(&assets, "noise.bin") {
            Err(AudioError::Load { name, source }) => {
                assert_eq!(name, "noise.bin");
                assert!(matches!(source, FormatError::BadMagic { expected: "RIFF" }));
            }
            other => panic!("unexpected result: {:?}", other.map(|p| p.format)),
        }

        assert!(matches!(
            load_pcm(&assets, "missing.ogg"),
            Err(AudioError::Asset { .. })
        ));
    }

    #[test]
    fn test_directory_assets() {
        let dir = std::env::temp_dir().join(format!("voice-mixer-assets-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("hum.wav"), wav_bytes(1, 2, 16000, 16, &[0; 8], None)).unwrap();

        let assets = DirectoryAssets::new(&dir);
        let pcm = load_pcm(&assets, "hum.wav").unwrap();
        assert_eq!(pcm.format, SampleFormat::Stereo16);
        assert_eq!(pcm.frames(), 2);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
