//! Codec Config OBU.
//!
//! Identifies the codec of every substream of the audio elements that refer
//! to it, together with the decoder configuration blob.

use serde::{Deserialize, Serialize};

use crate::error::IamfError;
use crate::id::CodecConfigId;
use crate::obu::ObuType;
use crate::util::{check_underread, BitReader, BitWriter};

/// Size of a FLAC STREAMINFO block.
const FLAC_STREAMINFO_SIZE: usize = 34;

/// Opus decoder configs carry at least the OpusHead fields after the magic.
const OPUS_MIN_CONFIG_SIZE: usize = 11;

const OPUS_HEAD: &[u8; 8] = b"OpusHead";

const MP4_DEC_CONFIG_DESCR_TAG: u8 = 0x04;
const MP4_DEC_SPECIFIC_DESCR_TAG: u8 = 0x05;
const MP4_OBJECT_TYPE_AAC: u8 = 0x40;
const MP4_STREAM_TYPE_AUDIO: u8 = 0x05;

const AOT_ESCAPE: u64 = 31;

/// AudioSpecificConfig bytes up to and including the channel configuration,
/// with both the object type and the sample rate escaped (43 bits).
const AAC_CHANNEL_CONFIG_WINDOW: usize = 6;

const MPEG4_SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// Codecs an IAMF substream can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum Codec {
    Opus,
    Aac,
    Flac,
    PcmS16Le,
    PcmS16Be,
    PcmS24Le,
    PcmS24Be,
    PcmS32Le,
    PcmS32Be,
    /// Unsupported codec, by its FourCC.
    Unknown([u8; 4]),
}

impl Codec {
    /// The FourCC on the wire.
    pub fn fourcc(&self) -> [u8; 4] {
        match self {
            Codec::Opus => *b"Opus",
            Codec::Aac => *b"mp4a",
            Codec::Flac => *b"fLaC",
            Codec::Unknown(v) => *v,
            _ => *b"ipcm",
        }
    }

    fn from_pcm(little_endian: bool, bit_depth: u8) -> Option<Codec> {
        use Codec::*;
        Some(match (little_endian, bit_depth) {
            (false, 16) => PcmS16Be,
            (false, 24) => PcmS24Be,
            (false, 32) => PcmS32Be,
            (true, 16) => PcmS16Le,
            (true, 24) => PcmS24Le,
            (true, 32) => PcmS32Le,
            _ => return None,
        })
    }

    /// For PCM, whether samples are little endian and the bit depth.
    pub fn pcm_format(&self) -> Option<(bool, u8)> {
        use Codec::*;
        Some(match self {
            PcmS16Be => (false, 16),
            PcmS24Be => (false, 24),
            PcmS32Be => (false, 32),
            PcmS16Le => (true, 16),
            PcmS24Le => (true, 24),
            PcmS32Le => (true, 32),
            _ => return None,
        })
    }

    /// Whether the codec is lossless.
    pub fn is_lossless(&self) -> bool {
        *self == Codec::Flac || self.pcm_format().is_some()
    }
}

/// A registered codec configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Unique id.
    pub id: CodecConfigId,
    /// The codec.
    pub codec: Codec,
    /// Samples per frame.
    pub frame_size: u32,
    /// Samples to decode and drop after a seek.
    pub seek_preroll: i16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Decoder configuration. For Opus this is a full OpusHead including the
    /// magic, for AAC the AudioSpecificConfig and for FLAC the STREAMINFO.
    pub decoder_config: Vec<u8>,
}

impl CodecConfig {
    /// Parse a Codec Config OBU body.
    pub fn parse(body: &[u8], strict: bool) -> Result<CodecConfig, IamfError> {
        let mut r = BitReader::new(body, "codec config");

        let id = CodecConfigId::from(r.read_leb()?);
        let fourcc: [u8; 4] = r.read_u32()?.to_be_bytes();
        let frame_size = r.read_leb()?;
        let seek_preroll = r.read_i16()?;

        let (codec, sample_rate, decoder_config) = match &fourcc {
            b"Opus" => parse_opus(&mut r)?,
            b"mp4a" => parse_aac(&mut r)?,
            b"fLaC" => parse_flac(&mut r)?,
            b"ipcm" => parse_ipcm(&mut r)?,
            _ => {
                debug!("Unknown codec {:02x?} in codec config {}", fourcc, id);
                (Codec::Unknown(fourcc), 0, vec![])
            }
        };

        check_underread(&r, ObuType::CodecConfig, strict)?;

        trace!(
            "Codec config {}: {:?} frame_size {} sample_rate {}",
            id,
            codec,
            frame_size,
            sample_rate
        );

        Ok(CodecConfig {
            id,
            codec,
            frame_size,
            seek_preroll,
            sample_rate,
            decoder_config,
        })
    }

    /// Serialize into a Codec Config OBU body.
    pub fn write(&self) -> Result<Vec<u8>, IamfError> {
        let mut w = BitWriter::new();

        w.put_leb128(*self.id);
        w.put_bytes(&self.codec.fourcc());
        w.put_leb128(self.frame_size);
        w.put_i16(self.seek_preroll);

        match self.codec {
            Codec::Opus => {
                let head = self
                    .decoder_config
                    .strip_prefix(OPUS_HEAD)
                    .unwrap_or(&self.decoder_config);
                w.put_bytes(head);
            }
            Codec::Aac => {
                w.put_u8(MP4_DEC_CONFIG_DESCR_TAG);
                w.put_u8(MP4_OBJECT_TYPE_AAC);
                // stream type, upstream 0, reserved 1
                w.put_u8((MP4_STREAM_TYPE_AUDIO << 2) | 1);
                // buffer size db, max bitrate, avg bitrate
                w.put_bytes(&[0; 11]);
                w.put_u8(MP4_DEC_SPECIFIC_DESCR_TAG);
                w.put_bytes(&self.decoder_config);
            }
            Codec::Flac => {
                // Last metadata block, type STREAMINFO.
                w.put_u8(0x80);
                w.put_u24(self.decoder_config.len() as u32);
                w.put_bytes(&self.decoder_config);
            }
            Codec::Unknown(_) => return Err(IamfError::Unsupported("unknown codec")),
            pcm => {
                let Some((le, depth)) = pcm.pcm_format() else {
                    return Err(IamfError::Unsupported("codec"));
                };
                w.put_u8(le as u8);
                w.put_u8(depth);
                w.put_u32(self.sample_rate);
            }
        }

        Ok(w.into_vec())
    }

    /// The decoder config with its channel count field set to `channels`.
    ///
    /// Used when substreams resolve to mono or stereo.
    pub fn decoder_config_for(&self, channels: u8) -> Result<Vec<u8>, IamfError> {
        let mut data = self.decoder_config.clone();

        match self.codec {
            Codec::Opus => {
                if let Some(b) = data.get_mut(9) {
                    *b = channels;
                }
            }
            Codec::Aac => {
                rewrite_bits(&mut data, AAC_CHANNEL_CONFIG_WINDOW, |r, w| {
                    let aot = r.read_bits(5)?;
                    w.put_bits(5, aot);
                    if aot == AOT_ESCAPE {
                        w.put_bits(6, r.read_bits(6)?);
                    }
                    let freq_index = r.read_bits(4)?;
                    w.put_bits(4, freq_index);
                    if freq_index == 0x0f {
                        w.put_bits(24, r.read_bits(24)?);
                    }
                    r.skip_bits(4)?;
                    w.put_bits(4, channels as u64);
                    Ok(())
                })?;
            }
            Codec::Flac => {
                rewrite_bits(&mut data, 13, |r, w| {
                    // min/max block size
                    w.put_bits(32, r.read_bits(32)?);
                    // min/max frame size
                    w.put_bits(48, r.read_bits(48)?);
                    // sample rate
                    w.put_bits(20, r.read_bits(20)?);
                    r.skip_bits(3)?;
                    w.put_bits(3, channels.saturating_sub(1) as u64);
                    Ok(())
                })?;
            }
            _ => {}
        }

        Ok(data)
    }
}

/// Rewrite the first `window` bytes of `data` bit by bit. Bits of the window
/// not written by `f` are copied over.
fn rewrite_bits(
    data: &mut [u8],
    window: usize,
    f: impl FnOnce(&mut BitReader<'_>, &mut BitWriter) -> Result<(), IamfError>,
) -> Result<(), IamfError> {
    let mut padded = vec![0; window];
    let n = data.len().min(window);
    padded[..n].copy_from_slice(&data[..n]);

    let mut r = BitReader::new(&padded, "decoder config");
    let mut w = BitWriter::new();
    f(&mut r, &mut w)?;

    while w.bit_len() < window * 8 {
        let num = (window * 8 - w.bit_len()).min(32);
        w.put_bits(num, r.read_bits(num)?);
    }

    let out = w.into_vec();
    data[..n].copy_from_slice(&out[..n]);
    Ok(())
}

type DecoderConfig = (Codec, u32, Vec<u8>);

fn parse_opus(r: &mut BitReader<'_>) -> Result<DecoderConfig, IamfError> {
    let rest = r.read_rest();
    if rest.len() < OPUS_MIN_CONFIG_SIZE {
        return Err(IamfError::Truncated("opus decoder config"));
    }

    let mut head = Vec::new();
    head.try_reserve_exact(OPUS_HEAD.len() + rest.len())?;
    head.extend_from_slice(OPUS_HEAD);
    head.extend_from_slice(rest);

    Ok((Codec::Opus, 48000, head))
}

fn parse_aac(r: &mut BitReader<'_>) -> Result<DecoderConfig, IamfError> {
    if r.read_u8()? != MP4_DEC_CONFIG_DESCR_TAG {
        return Err(IamfError::InvalidData(
            "expected DecoderConfigDescriptor tag".into(),
        ));
    }

    let object_type = r.read_u8()?;
    if object_type != MP4_OBJECT_TYPE_AAC {
        return Err(IamfError::OutOfRange {
            field: "objectTypeIndication",
            value: object_type as u64,
        });
    }

    let stream_type = r.read_u8()?;
    if stream_type >> 2 != MP4_STREAM_TYPE_AUDIO || (stream_type >> 1) & 1 != 0 {
        return Err(IamfError::OutOfRange {
            field: "streamType",
            value: stream_type as u64,
        });
    }

    // buffer size db, max bitrate, avg bitrate
    r.skip_bytes(3 + 4 + 4)?;

    if r.read_u8()? != MP4_DEC_SPECIFIC_DESCR_TAG {
        return Err(IamfError::InvalidData(
            "expected DecoderSpecificInfo tag".into(),
        ));
    }

    let asc = r.read_rest();
    if asc.is_empty() {
        return Err(IamfError::Truncated("AudioSpecificConfig"));
    }

    let sample_rate = aac_sample_rate(asc)?;

    Ok((Codec::Aac, sample_rate, asc.to_vec()))
}

/// Sample rate from an AudioSpecificConfig.
fn aac_sample_rate(asc: &[u8]) -> Result<u32, IamfError> {
    let mut r = BitReader::new(asc, "AudioSpecificConfig");

    if r.read_bits(5)? == AOT_ESCAPE {
        r.skip_bits(6)?;
    }

    let index = r.read_bits(4)?;
    if index == 0x0f {
        return Ok(r.read_u24()?);
    }

    MPEG4_SAMPLE_RATES
        .get(index as usize)
        .copied()
        .ok_or(IamfError::OutOfRange {
            field: "samplingFrequencyIndex",
            value: index,
        })
}

fn parse_flac(r: &mut BitReader<'_>) -> Result<DecoderConfig, IamfError> {
    // METADATA_BLOCK_HEADER
    r.skip_bytes(4)?;

    let info = r.read_rest();
    if info.len() < FLAC_STREAMINFO_SIZE {
        return Err(IamfError::Truncated("FLAC STREAMINFO"));
    }

    let sample_rate = u32::from_be_bytes([0, info[10], info[11], info[12]]) >> 4;

    Ok((Codec::Flac, sample_rate, info.to_vec()))
}

fn parse_ipcm(r: &mut BitReader<'_>) -> Result<DecoderConfig, IamfError> {
    let format = r.read_u8()?;
    if format > 1 {
        return Err(IamfError::OutOfRange {
            field: "sample_format_flags",
            value: format as u64,
        });
    }

    let bit_depth = r.read_u8()?;
    let codec = Codec::from_pcm(format == 1, bit_depth).ok_or(IamfError::OutOfRange {
        field: "sample_size",
        value: bit_depth as u64,
    })?;

    let sample_rate = r.read_u32()?;

    if r.bytes_left() > 0 {
        return Err(IamfError::InvalidData(format!(
            "{} trailing bytes after LPCM decoder config",
            r.bytes_left()
        )));
    }

    Ok((codec, sample_rate, vec![]))
}
