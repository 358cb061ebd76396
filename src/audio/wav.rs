//! RIFF/WAVE decoder
//!
//! Only the linear PCM subset is accepted: mono or stereo, 8 or 16 bits.
//! Chunks are walked strictly forward, header fields are little-endian.

use std::io::{ErrorKind, Read, Seek, SeekFrom};

use super::pcm::{FormatError, PcmData, SampleFormat};

/// WAVE compression code for linear PCM
const WAVE_FORMAT_PCM: u16 = 0x0001;

/// Bytes of the `fmt ` chunk this decoder reads
const FMT_FIELDS_LEN: u32 = 16;

/// Decode a complete WAVE stream into PCM bytes
pub fn decode_wav<R: Read + Seek>(rw: &mut R) -> Result<PcmData, FormatError> {
    expect_magic(rw, b"RIFF", "RIFF")?;
    let _riff_len = read_u32(rw)?;
    expect_magic(rw, b"WAVE", "WAVE")?;

    expect_magic(rw, b"fmt ", "fmt ")?;
    let fmt_len = read_u32(rw)?;
    if fmt_len < FMT_FIELDS_LEN {
        return Err(FormatError::BadChunkLength(fmt_len));
    }

    let compression = read_u16(rw)?;
    if compression != WAVE_FORMAT_PCM {
        return Err(FormatError::UnsupportedCompression(compression));
    }
    let channels = read_u16(rw)?;
    let sample_rate = read_u32(rw)?;
    let _byte_rate = read_u32(rw)?;
    let _block_align = read_u16(rw)?;
    let bits_per_sample = read_u16(rw)?;
    let format = SampleFormat::from_layout(channels, bits_per_sample)?;

    // Extension bytes of a longer fmt chunk
    skip_forward(rw, u64::from(fmt_len - FMT_FIELDS_LEN))?;

    // `fact` and anything else before `data` is skipped by its declared length
    let data_len = loop {
        let mut magic = [0u8; 4];
        read_header(rw, &mut magic, "data")?;
        let len = read_u32(rw)?;
        if &magic == b"data" {
            break len;
        }
        log::debug!(
            "Skipping WAVE chunk '{}' ({} bytes)",
            String::from_utf8_lossy(&magic),
            len
        );
        skip_forward(rw, u64::from(len) + u64::from(len & 1))?;
    };

    let bytes = read_data(rw, data_len)?;

    Ok(PcmData::new(format, sample_rate, bytes))
}

/// Read exactly `len` bytes
///
/// The buffer grows with what the stream actually holds, so a bogus
/// declared length costs nothing before it is found to be short.
fn read_data<R: Read>(rw: &mut R, len: u32) -> Result<Vec<u8>, FormatError> {
    let mut buf = Vec::new();
    rw.take(u64::from(len)).read_to_end(&mut buf)?;
    if buf.len() < len as usize {
        return Err(FormatError::Truncated);
    }
    Ok(buf)
}

fn skip_forward<S: Seek>(rw: &mut S, bytes: u64) -> Result<(), FormatError> {
    if bytes > 0 {
        let offset = i64::try_from(bytes).map_err(|_| FormatError::Truncated)?;
        rw.seek(SeekFrom::Current(offset))?;
    }
    Ok(())
}

fn read_header<R: Read>(
    rw: &mut R,
    out: &mut [u8; 4],
    expected: &'static str,
) -> Result<(), FormatError> {
    rw.read_exact(out).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => FormatError::BadMagic { expected },
        _ => FormatError::Io(e),
    })
}

fn expect_magic<R: Read>(
    rw: &mut R,
    magic: &[u8; 4],
    expected: &'static str,
) -> Result<(), FormatError> {
    let mut buf = [0u8; 4];
    read_header(rw, &mut buf, expected)?;
    if &buf != magic {
        return Err(FormatError::BadMagic { expected });
    }
    Ok(())
}

fn read_u32<R: Read>(rw: &mut R) -> Result<u32, FormatError> {
    let mut buf = [0u8; 4];
    rw.read_exact(&mut buf).map_err(eof_as_truncated)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u16<R: Read>(rw: &mut R) -> Result<u16, FormatError> {
    let mut buf = [0u8; 2];
    rw.read_exact(&mut buf).map_err(eof_as_truncated)?;
    Ok(u16::from_le_bytes(buf))
}

fn eof_as_truncated(e: std::io::Error) -> FormatError {
    match e.kind() {
        ErrorKind::UnexpectedEof => FormatError::Truncated,
        _ => FormatError::Io(e),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;

    /// Build a WAVE stream by hand, optionally with an extra chunk before `data`
    pub(crate) fn wav_bytes(
        compression: u16,
        channels: u16,
        rate: u32,
        bits: u16,
        data: &[u8],
        extra: Option<(&[u8; 4], &[u8])>,
    ) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(b"WAVE");
        body.extend_from_slice(b"fmt ");
        body.extend_from_slice(&16u32.to_le_bytes());
        body.extend_from_slice(&compression.to_le_bytes());
        body.extend_from_slice(&channels.to_le_bytes());
        body.extend_from_slice(&rate.to_le_bytes());
        let block_align = channels * bits / 8;
        body.extend_from_slice(&(rate * block_align as u32).to_le_bytes());
        body.extend_from_slice(&block_align.to_le_bytes());
        body.extend_from_slice(&bits.to_le_bytes());
        if let Some((magic, payload)) = extra {
            body.extend_from_slice(magic);
            body.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            body.extend_from_slice(payload);
        }
        body.extend_from_slice(b"data");
        body.extend_from_slice(&(data.len() as u32).to_le_bytes());
        body.extend_from_slice(data);

        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&body);
        out
    }

    /// Reader that hands out at most one byte per call
    struct Trickle(Cursor<Vec<u8>>);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let end = buf.len().min(1);
            self.0.read(&mut buf[..end])
        }
    }

    impl Seek for Trickle {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            self.0.seek(pos)
        }
    }

    #[test]
    fn test_minimal_mono8_roundtrip() {
        let samples: Vec<u8> = (0..64u8).map(|i| i.wrapping_mul(7)).collect();
        let bytes = wav_bytes(1, 1, 8000, 8, &samples, None);

        let pcm = decode_wav(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(pcm.bytes, samples);
        assert_eq!(pcm.channels(), 1);
        assert_eq!(pcm.bits_per_sample(), 8);
        assert_eq!(pcm.sample_rate, 8000);
    }

    #[test]
    fn test_hound_stereo16() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..100i16 {
                writer.write_sample(i * 100).unwrap();
                writer.write_sample(-i * 100).unwrap();
            }
            writer.finalize().unwrap();
        }

        let pcm = decode_wav(&mut Cursor::new(cursor.into_inner())).unwrap();
        assert_eq!(pcm.format, SampleFormat::Stereo16);
        assert_eq!(pcm.sample_rate, 22050);
        assert_eq!(pcm.frames(), 100);
        assert_eq!(&pcm.bytes[4..8], &[100, 0, 0x9c, 0xff]);
    }

    #[test]
    fn test_skips_fact_and_unknown_chunks() {
        let data = [1u8, 2, 3, 4];
        let bytes = wav_bytes(1, 2, 11025, 8, &data, Some((b"fact", &[9, 9, 9, 9])));
        assert_eq!(decode_wav(&mut Cursor::new(bytes)).unwrap().bytes, data);

        let bytes = wav_bytes(1, 1, 11025, 16, &data, Some((b"LIST", &[0; 10])));
        assert_eq!(decode_wav(&mut Cursor::new(bytes)).unwrap().bytes, data);
    }

    #[test]
    fn test_partial_reads_are_looped() {
        let data: Vec<u8> = (0..=255u8).collect();
        let bytes = wav_bytes(1, 1, 8000, 8, &data, None);
        let pcm = decode_wav(&mut Trickle(Cursor::new(bytes))).unwrap();
        assert_eq!(pcm.bytes, data);
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut bytes = wav_bytes(1, 1, 8000, 8, &[0; 4], None);
        bytes[8..12].copy_from_slice(b"AVI ");
        assert!(matches!(
            decode_wav(&mut Cursor::new(bytes)),
            Err(FormatError::BadMagic { expected: "WAVE" })
        ));

        assert!(matches!(
            decode_wav(&mut Cursor::new(b"OggS\0\0\0\0".to_vec())),
            Err(FormatError::BadMagic { expected: "RIFF" })
        ));
    }

    #[test]
    fn test_rejects_unsupported_layouts() {
        let bytes = wav_bytes(3, 1, 8000, 32, &[0; 8], None);
        assert!(matches!(
            decode_wav(&mut Cursor::new(bytes)),
            Err(FormatError::UnsupportedCompression(3))
        ));

        let bytes = wav_bytes(1, 4, 8000, 16, &[0; 8], None);
        assert!(matches!(
            decode_wav(&mut Cursor::new(bytes)),
            Err(FormatError::UnsupportedChannels(4))
        ));

        let bytes = wav_bytes(1, 2, 8000, 24, &[0; 6], None);
        assert!(matches!(
            decode_wav(&mut Cursor::new(bytes)),
            Err(FormatError::UnsupportedBitDepth(24))
        ));
    }

    #[test]
    fn test_missing_data_and_truncation() {
        let mut bytes = wav_bytes(1, 1, 8000, 8, &[0; 16], None);
        // Declared data length runs past the end of the stream
        let len = bytes.len();
        bytes.truncate(len - 4);
        assert!(matches!(
            decode_wav(&mut Cursor::new(bytes)),
            Err(FormatError::Truncated)
        ));

        // Length field claims 4 GiB on a stream holding 16 bytes
        let mut bytes = wav_bytes(1, 1, 8000, 8, &[0; 16], None);
        let len_at = bytes.len() - 20;
        bytes[len_at..len_at + 4].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            decode_wav(&mut Cursor::new(bytes)),
            Err(FormatError::Truncated)
        ));

        // Header ends right after the fmt chunk
        let bytes = wav_bytes(1, 1, 8000, 8, &[], None);
        let cut = bytes.len() - 8;
        assert!(matches!(
            decode_wav(&mut Cursor::new(bytes[..cut].to_vec())),
            Err(FormatError::BadMagic { expected: "data" })
        ));
    }
}
