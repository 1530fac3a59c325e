//! RIFF/WAVE container parsing and pull-based PCM reading
//!
//! Only 16-bit signed little-endian integer PCM is accepted. Samples are
//! handed out as an opaque sequence of `i16` units; interleaving is left to
//! the sink.
//!
//! # Layout handled
//!
//! ```text
//! "RIFF" <size> "WAVE"
//!   "fmt " <size> <format tag, channels, rate, byte rate, block align, bits> [extension]
//!   <any other chunks: LIST, fact, ...>   (skipped, odd sizes padded)
//!   "data" <size> <samples...>
//! ```
//!
//! The read cursor never leaves `[data_offset, data_offset + data_len]`.

use crate::error::{Error, Result};
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::time::Duration;
use tracing::{debug, warn};

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Only supported sample width
const BITS_PER_SAMPLE: u16 = 16;
const BYTES_PER_SAMPLE: u64 = 2;

/// Upper bound on a sane `fmt ` chunk; anything larger is a corrupt header
const MAX_FMT_CHUNK_LEN: u32 = 256;

/// Stream parameters taken from the `fmt ` chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub block_align: u16,
}

/// Pull-based reader over the `data` chunk of a WAV file
pub struct WavStream<R> {
    source: R,
    format: WavFormat,
    data_offset: u64,
    data_len: u64,
    cursor: u64,
    /// Byte staging area, grown once to the largest block requested
    scratch: Vec<u8>,
}

impl<R: Read + Seek> WavStream<R> {
    /// Parse and validate the header, leaving the cursor on the first sample.
    ///
    /// # Errors
    /// - [`Error::InvalidHeader`] for anything that is not 16-bit PCM WAV
    /// - [`Error::Io`] if the source fails while reading the header
    pub fn open(mut source: R) -> Result<Self> {
        let file_len = source.seek(SeekFrom::End(0))?;
        source.seek(SeekFrom::Start(0))?;

        let mut riff = [0u8; 12];
        read_header_bytes(&mut source, &mut riff, "RIFF header")?;
        if &riff[0..4] != b"RIFF" {
            return Err(Error::invalid_header("missing RIFF signature"));
        }
        if &riff[8..12] != b"WAVE" {
            return Err(Error::invalid_header("RIFF form type is not WAVE"));
        }

        let mut format: Option<WavFormat> = None;
        let mut pos: u64 = 12;

        loop {
            let mut chunk = [0u8; 8];
            read_header_bytes(&mut source, &mut chunk, "chunk header (no data chunk found)")?;
            let id = [chunk[0], chunk[1], chunk[2], chunk[3]];
            let size = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);
            let body = pos + 8;

            match &id {
                b"fmt " => {
                    if !(16..=MAX_FMT_CHUNK_LEN).contains(&size) {
                        return Err(Error::invalid_header(format!(
                            "fmt chunk has invalid length {size}"
                        )));
                    }
                    let mut fmt = vec![0u8; size as usize];
                    read_header_bytes(&mut source, &mut fmt, "fmt chunk")?;
                    format = Some(parse_fmt(&fmt)?);
                }
                b"data" => {
                    let format = format
                        .ok_or_else(|| Error::invalid_header("data chunk precedes fmt chunk"))?;

                    let available = file_len.saturating_sub(body);
                    let declared = u64::from(size);
                    if declared > available {
                        debug!(declared, available, "data chunk longer than file, clamping");
                    }
                    let data_len = declared.min(available);

                    debug!(
                        sample_rate = format.sample_rate,
                        channels = format.channels,
                        data_offset = body,
                        data_len,
                        "Parsed WAV header"
                    );

                    return Ok(Self {
                        source,
                        format,
                        data_offset: body,
                        data_len,
                        cursor: body,
                        scratch: Vec::new(),
                    });
                }
                _ => {
                    debug!(
                        chunk = %String::from_utf8_lossy(&id),
                        size,
                        "Skipping chunk"
                    );
                }
            }

            // Chunks are word aligned: odd sizes carry one pad byte
            pos = body + u64::from(size) + u64::from(size & 1);
            if pos >= file_len {
                return Err(Error::invalid_header("no data chunk found"));
            }
            source.seek(SeekFrom::Start(pos))?;
        }
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    /// Channel count (samples are interleaved when > 1)
    pub fn channels(&self) -> u16 {
        self.format.channels
    }

    pub fn format(&self) -> WavFormat {
        self.format
    }

    /// Byte offset of the first sample
    pub fn data_offset(&self) -> u64 {
        self.data_offset
    }

    /// Length of the sample data in bytes
    pub fn data_len(&self) -> u64 {
        self.data_len
    }

    /// Total `i16` units in the data chunk
    pub fn total_samples(&self) -> u64 {
        self.data_len / BYTES_PER_SAMPLE
    }

    /// `i16` units already read
    pub fn position(&self) -> u64 {
        (self.cursor - self.data_offset) / BYTES_PER_SAMPLE
    }

    /// `i16` units left before end of data
    pub fn remaining_samples(&self) -> u64 {
        (self.data_end() - self.cursor) / BYTES_PER_SAMPLE
    }

    /// Playing time of the whole data chunk
    pub fn duration(&self) -> Duration {
        let frames = self.total_samples() / u64::from(self.format.channels);
        Duration::from_secs_f64(frames as f64 / f64::from(self.format.sample_rate))
    }

    /// Fill up to `max_samples` values from the cursor.
    ///
    /// Returns fewer than requested (possibly zero) at end of data. A source
    /// that ends before the declared data length is treated as end of data.
    pub fn read(&mut self, buffer: &mut [i16], max_samples: usize) -> Result<usize> {
        let wanted = max_samples.min(buffer.len()) as u64;
        let count = wanted.min(self.remaining_samples()) as usize;
        if count == 0 {
            return Ok(0);
        }

        let bytes = count * BYTES_PER_SAMPLE as usize;
        if self.scratch.len() < bytes {
            self.scratch.resize(bytes, 0);
        }

        let mut filled = 0;
        while filled < bytes {
            match self.source.read(&mut self.scratch[filled..bytes]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }

        self.cursor += filled as u64;
        if filled < bytes {
            warn!(
                expected = bytes,
                got = filled,
                "Source ended inside data chunk, truncating stream"
            );
            self.data_len = self.cursor - self.data_offset;
        }

        let samples = filled / BYTES_PER_SAMPLE as usize;
        for (dst, src) in buffer
            .iter_mut()
            .zip(self.scratch[..samples * 2].chunks_exact(2))
        {
            *dst = i16::from_le_bytes([src[0], src[1]]);
        }

        Ok(samples)
    }

    /// Reposition to the first sample (loop support)
    pub fn reset_to_start(&mut self) -> Result<()> {
        self.source.seek(SeekFrom::Start(self.data_offset))?;
        self.cursor = self.data_offset;
        Ok(())
    }

    fn data_end(&self) -> u64 {
        self.data_offset + self.data_len
    }
}

impl<R> std::fmt::Debug for WavStream<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WavStream")
            .field("format", &self.format)
            .field("data_offset", &self.data_offset)
            .field("data_len", &self.data_len)
            .field("cursor", &self.cursor)
            .finish()
    }
}

/// `read_exact` that reports a short header as a format error
fn read_header_bytes<R: Read>(source: &mut R, buf: &mut [u8], what: &str) -> Result<()> {
    source.read_exact(buf).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            Error::invalid_header(format!("truncated {what}"))
        } else {
            Error::Io(e)
        }
    })
}

fn parse_fmt(fmt: &[u8]) -> Result<WavFormat> {
    let le16 = |at: usize| u16::from_le_bytes([fmt[at], fmt[at + 1]]);
    let le32 = |at: usize| u32::from_le_bytes([fmt[at], fmt[at + 1], fmt[at + 2], fmt[at + 3]]);

    let mut tag = le16(0);
    let channels = le16(2);
    let sample_rate = le32(4);
    let block_align = le16(12);
    let bits_per_sample = le16(14);

    if tag == WAVE_FORMAT_EXTENSIBLE {
        // cbSize(2) validBits(2) channelMask(4) then the sub-format GUID,
        // whose first two bytes carry the real format tag
        if fmt.len() < 40 {
            return Err(Error::invalid_header("extensible fmt chunk too short"));
        }
        tag = le16(24);
    }

    if tag != WAVE_FORMAT_PCM {
        return Err(Error::invalid_header(format!(
            "unsupported format tag 0x{tag:04x} (only integer PCM)"
        )));
    }
    if bits_per_sample != BITS_PER_SAMPLE {
        return Err(Error::invalid_header(format!(
            "unsupported bit depth {bits_per_sample} (only 16-bit)"
        )));
    }
    if channels == 0 {
        return Err(Error::invalid_header("zero channels"));
    }
    if sample_rate == 0 {
        return Err(Error::invalid_header("zero sample rate"));
    }

    Ok(WavFormat {
        sample_rate,
        channels,
        bits_per_sample,
        block_align,
    })
}
