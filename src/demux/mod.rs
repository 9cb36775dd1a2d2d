//! Reading IAMF streams.
//!
//! Reading happens in two phases. [`Demuxer::open`] reads descriptor OBUs
//! into the [`Registry`] until the first parameter block or audio frame.
//! After that, [`Demuxer::read_packet`] returns one audio frame at a time,
//! with the parameter values in effect attached.

use std::io::Read;

use crate::config::DemuxerConfig;
use crate::error::IamfError;
use crate::id::SubstreamId;
use crate::obu::{ObuHeader, ObuType, MAX_OBU_HEADER_SIZE};
use crate::packet::{Packet, Trim};
use crate::param::{self, ParamDefinition, ParamKind};
use crate::registry::Registry;
use crate::util::BitReader;

mod source;
use source::ByteSource;

/// Reads an IAMF stream.
///
/// Also an iterator over the packets. Iteration stops at the end of input
/// or after the first error.
pub struct Demuxer<R> {
    source: ByteSource<R>,
    config: DemuxerConfig,
    registry: Registry,
    mix_gain: Option<ParamDefinition>,
    demixing: Option<ParamDefinition>,
    recon_gain: Option<ParamDefinition>,
    failed: bool,
}

impl<R: Read> Demuxer<R> {
    /// Read the descriptors of the stream.
    ///
    /// Stops before the first parameter block or audio frame, or at the end
    /// of input.
    pub fn open(reader: R, config: DemuxerConfig) -> Result<Self, IamfError> {
        let mut demuxer = Demuxer {
            source: ByteSource::new(reader),
            config,
            registry: Registry::new(),
            mix_gain: None,
            demixing: None,
            recon_gain: None,
            failed: false,
        };

        demuxer.read_descriptors()?;

        Ok(demuxer)
    }

    /// The descriptors read by [`Demuxer::open`].
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The config in use.
    pub fn config(&self) -> &DemuxerConfig {
        &self.config
    }

    fn read_descriptors(&mut self) -> Result<(), IamfError> {
        while let Some(header) = self.peek_header()? {
            let obu_type = header.obu_type;

            if obu_type == ObuType::ParameterBlock || obu_type.is_audio_frame() {
                debug!(
                    "Descriptors done: {} codec configs, {} audio elements, {} mix presentations",
                    self.registry.codec_configs().len(),
                    self.registry.audio_elements().len(),
                    self.registry.mix_presentations().len()
                );
                break;
            }

            match obu_type {
                ObuType::SequenceHeader | ObuType::CodecConfig | ObuType::AudioElement | ObuType::MixPresentation => {
                    let body = self.read_body(&header)?;
                    self.registry
                        .parse_descriptor(obu_type, &body, self.config.strict)?;
                }
                ObuType::TemporalDelimiter => {
                    self.source.skip(header.total_len(), "temporal delimiter")?;
                    self.clear_parameters();
                }
                _ => {
                    debug!("Skipping {:?} OBU of {} bytes", obu_type, header.body_len);
                    self.source.skip(header.total_len(), "OBU body")?;
                }
            }
        }

        Ok(())
    }

    /// Read the next audio frame.
    ///
    /// Returns `None` at the end of input.
    pub fn read_packet(&mut self) -> Result<Option<Packet>, IamfError> {
        while let Some(header) = self.peek_header()? {
            match header.obu_type {
                ObuType::AudioFrame | ObuType::AudioFrameId(_) => {
                    let body = self.read_body(&header)?;
                    return self.audio_frame(&header, body).map(Some);
                }
                ObuType::ParameterBlock => {
                    let body = self.read_body(&header)?;
                    self.parameter_block(&body)?;
                }
                ObuType::TemporalDelimiter => {
                    self.source.skip(header.total_len(), "temporal delimiter")?;
                    self.clear_parameters();
                }
                obu_type => {
                    debug!("Skipping {:?} OBU of {} bytes", obu_type, header.body_len);
                    self.source.skip(header.total_len(), "OBU body")?;
                }
            }
        }

        Ok(None)
    }

    /// Parse the next header without consuming it.
    fn peek_header(&mut self) -> Result<Option<ObuHeader>, IamfError> {
        let available = self.source.fill(MAX_OBU_HEADER_SIZE)?;
        if available == 0 {
            return Ok(None);
        }

        let header = ObuHeader::parse(self.source.peek())?;

        if header.total_len() > self.config.max_obu_size {
            return Err(IamfError::OutOfRange {
                field: "obu_size",
                value: header.total_len() as u64,
            });
        }

        trace!(
            "OBU {:?} size {} body {}",
            header.obu_type,
            header.obu_size,
            header.body_len
        );

        Ok(Some(header))
    }

    fn read_body(&mut self, header: &ObuHeader) -> Result<Vec<u8>, IamfError> {
        self.source.skip(header.header_len, "OBU header")?;
        self.source.read_vec(header.body_len, "OBU body")
    }

    fn audio_frame(&mut self, header: &ObuHeader, body: Vec<u8>) -> Result<Packet, IamfError> {
        let (substream_id, data) = match header.obu_type {
            ObuType::AudioFrameId(id) => (SubstreamId::from(id as u32), body),
            _ => {
                let mut r = BitReader::new(&body, "audio frame");
                let id = r.read_leb()?;
                let start = r.byte_pos();
                (SubstreamId::from(id), body[start..].to_vec())
            }
        };

        let Some(substream) = self.registry.substream(substream_id) else {
            error!("Audio frame for unknown substream {}", substream_id);
            return Err(IamfError::UnknownReference {
                kind: "substream",
                id: *substream_id,
            });
        };

        let trim = header.trimming.then_some(Trim {
            skip_samples: header.skip_samples,
            discard_padding: header.discard_padding,
        });

        trace!(
            "Audio frame substream {} stream {} len {}",
            substream_id,
            substream.stream_index,
            data.len()
        );

        Ok(Packet {
            stream_index: substream.stream_index,
            substream_id,
            data,
            trim,
            mix_gain: self.mix_gain.clone(),
            demixing: self.demixing.clone(),
            recon_gain: self.recon_gain.clone(),
        })
    }

    fn parameter_block(&mut self, body: &[u8]) -> Result<(), IamfError> {
        let Some(values) = param::parse_block(body, &self.registry, self.config.strict)? else {
            return Ok(());
        };

        let slot = match values.kind {
            ParamKind::MixGain => &mut self.mix_gain,
            ParamKind::Demixing => &mut self.demixing,
            ParamKind::ReconGain => &mut self.recon_gain,
        };
        *slot = Some(values);

        Ok(())
    }

    fn clear_parameters(&mut self) {
        self.mix_gain = None;
        self.demixing = None;
        self.recon_gain = None;
    }
}

impl<R: Read> Iterator for Demuxer<R> {
    type Item = Result<Packet, IamfError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        let r = self.read_packet().transpose();
        if matches!(r, Some(Err(_))) {
            self.failed = true;
        }
        r
    }
}
