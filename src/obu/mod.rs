//! OBU (Open Bitstream Unit) framing.
//!
//! ```text
//!  0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+
//! |obu_type |R|T|X|   R = redundant copy, T = trimming, X = extension
//! +-+-+-+-+-+-+-+-+
//! | obu_size (leb128) ...
//! +-+-+-+-+-+-+-+-+
//! | trim at end (leb128), trim at start (leb128)    if T
//! | extension_size (leb128), extension bytes        if X
//! | body ...
//! ```

use serde::{Deserialize, Serialize};

use crate::error::IamfError;
use crate::util::{BitReader, BitWriter};

pub mod leb128;
mod probe;

pub use probe::{probe, PROBE_SCORE_EXTENSION, PROBE_SCORE_MAX};

/// Upper bound for the header, 1 byte plus three 8 byte leb128 fields.
pub const MAX_OBU_HEADER_SIZE: usize = 1 + leb128::MAX_LEB128_SIZE * 3;

/// Highest substream id that can be carried in the OBU type itself.
pub const MAX_IMPLICIT_SUBSTREAM_ID: u32 = 17;

/// The OBU types of IAMF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObuType {
    /// 0
    CodecConfig,
    /// 1
    AudioElement,
    /// 2
    MixPresentation,
    /// 3
    ParameterBlock,
    /// 4
    TemporalDelimiter,
    /// 5, substream id follows in the body.
    AudioFrame,
    /// 6..=23, substream id 0..=17 implied by the type.
    AudioFrameId(u8),
    /// 24..=30
    Reserved(u8),
    /// 31
    SequenceHeader,
}

impl ObuType {
    /// Audio frame type for a substream id.
    pub fn audio_frame(substream_id: u32) -> Self {
        if substream_id <= MAX_IMPLICIT_SUBSTREAM_ID {
            ObuType::AudioFrameId(substream_id as u8)
        } else {
            ObuType::AudioFrame
        }
    }

    /// Whether this OBU carries audio frame data.
    pub fn is_audio_frame(&self) -> bool {
        matches!(self, ObuType::AudioFrame | ObuType::AudioFrameId(_))
    }

    /// Codec Config, Audio Element and Mix Presentation.
    pub fn is_descriptor(&self) -> bool {
        matches!(
            self,
            ObuType::CodecConfig | ObuType::AudioElement | ObuType::MixPresentation
        )
    }
}

impl From<u8> for ObuType {
    fn from(v: u8) -> Self {
        use ObuType::*;
        match v {
            0 => CodecConfig,
            1 => AudioElement,
            2 => MixPresentation,
            3 => ParameterBlock,
            4 => TemporalDelimiter,
            5 => AudioFrame,
            6..=23 => AudioFrameId(v - 6),
            31 => SequenceHeader,
            _ => Reserved(v),
        }
    }
}

impl From<ObuType> for u8 {
    fn from(v: ObuType) -> Self {
        use ObuType::*;
        match v {
            CodecConfig => 0,
            AudioElement => 1,
            MixPresentation => 2,
            ParameterBlock => 3,
            TemporalDelimiter => 4,
            AudioFrame => 5,
            AudioFrameId(id) => 6 + id,
            Reserved(v) => v,
            SequenceHeader => 31,
        }
    }
}

/// A parsed OBU header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObuHeader {
    /// OBU type.
    pub obu_type: ObuType,
    /// Redundant copy flag.
    pub redundant: bool,
    /// Whether trimming fields are present.
    pub trimming: bool,
    /// Samples to trim at the end of the frame.
    pub skip_samples: u32,
    /// Samples to trim at the start of the frame.
    pub discard_padding: u32,
    /// Size of the skipped extension, if the extension flag was set.
    pub extension_size: Option<u32>,
    /// Bytes following the size field.
    pub obu_size: u32,
    /// Offset of the body from the start of the OBU.
    pub header_len: usize,
    /// Length of the body.
    pub body_len: usize,
}

impl ObuHeader {
    /// A header for writing a body of `body_len` bytes.
    pub fn new(obu_type: ObuType, body_len: usize) -> Self {
        ObuHeader {
            obu_type,
            redundant: false,
            trimming: false,
            skip_samples: 0,
            discard_padding: 0,
            extension_size: None,
            obu_size: 0,
            header_len: 0,
            body_len,
        }
    }

    /// Set trimming fields for writing.
    pub fn with_trim(mut self, skip_samples: u32, discard_padding: u32) -> Self {
        self.trimming = true;
        self.skip_samples = skip_samples;
        self.discard_padding = discard_padding;
        self
    }

    /// Parse a header from the start of `buf`.
    ///
    /// `buf` must cover the fields up to the extension bytes, which are only
    /// accounted for, not read. Up to [`MAX_OBU_HEADER_SIZE`] bytes suffice.
    pub fn parse(buf: &[u8]) -> Result<ObuHeader, IamfError> {
        let mut r = BitReader::new(buf, "OBU header");

        let obu_type = ObuType::from(r.read_bits(5)? as u8);
        let redundant = r.read_bit_flag()?;
        let trimming = r.read_bit_flag()?;
        let extension = r.read_bit_flag()?;

        let obu_size = r.read_leb()?;
        if obu_size > i32::MAX as u32 {
            return Err(IamfError::OutOfRange {
                field: "obu_size",
                value: obu_size as u64,
            });
        }

        let start = r.byte_pos();

        let (skip_samples, discard_padding) = if trimming {
            (r.read_leb()?, r.read_leb()?)
        } else {
            (0, 0)
        };

        let extension_size = if extension {
            let size = r.read_leb()?;
            if size > i32::MAX as u32 / 8 {
                return Err(IamfError::OutOfRange {
                    field: "extension_header_size",
                    value: size as u64,
                });
            }
            Some(size)
        } else {
            None
        };

        let total = start as u64 + obu_size as u64;
        if total > i32::MAX as u64 {
            return Err(IamfError::OutOfRange {
                field: "obu_size",
                value: total,
            });
        }

        let consumed = (r.byte_pos() - start) as u64 + extension_size.unwrap_or(0) as u64;
        if consumed > obu_size as u64 {
            return Err(IamfError::InvalidData(format!(
                "OBU header fields ({} bytes) exceed obu_size {}",
                consumed, obu_size
            )));
        }

        let header_len = start + consumed as usize;
        let body_len = obu_size as usize - consumed as usize;

        Ok(ObuHeader {
            obu_type,
            redundant,
            trimming,
            skip_samples,
            discard_padding,
            extension_size,
            obu_size,
            header_len,
            body_len,
        })
    }

    /// Total length of the OBU, header and body.
    pub fn total_len(&self) -> usize {
        self.header_len + self.body_len
    }

    /// Serialize the header. The body is expected to follow.
    pub fn write(&self, out: &mut Vec<u8>) -> Result<(), IamfError> {
        let mut trim = BitWriter::new();
        if self.trimming {
            trim.put_leb128(self.skip_samples);
            trim.put_leb128(self.discard_padding);
        }
        let trim = trim.into_vec();

        let obu_size = u32::try_from(self.body_len + trim.len())
            .ok()
            .filter(|v| *v <= i32::MAX as u32)
            .ok_or(IamfError::OutOfRange {
                field: "obu_size",
                value: self.body_len as u64,
            })?;

        let mut w = BitWriter::new();
        w.put_bits(5, u8::from(self.obu_type) as u64);
        w.put_bit_flag(false);
        w.put_bit_flag(self.trimming);
        w.put_bit_flag(false);
        w.put_leb128(obu_size);
        w.put_bytes(&trim);

        out.extend_from_slice(&w.into_vec());
        Ok(())
    }
}

/// Write a complete OBU with the given body.
pub(crate) fn write_obu(obu_type: ObuType, body: &[u8], out: &mut Vec<u8>) -> Result<(), IamfError> {
    ObuHeader::new(obu_type, body.len()).write(out)?;
    out.extend_from_slice(body);
    Ok(())
}
