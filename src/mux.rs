//! Writing IAMF streams.

use std::io::Write;

use crate::error::IamfError;
use crate::obu::{write_obu, ObuHeader, ObuType};
use crate::packet::Packet;
use crate::param::ParamDefinition;
use crate::registry::{Registry, SequenceHeader};
use crate::util::BitWriter;

/// Writes an IAMF stream.
///
/// The registry describes the stream. [`Muxer::write_header`] writes it as
/// descriptor OBUs, after which packets are written with
/// [`Muxer::write_packet`], each temporal unit started by
/// [`Muxer::write_temporal_delimiter`].
pub struct Muxer<W> {
    writer: W,
    registry: Registry,
    header_written: bool,
}

impl<W: Write> Muxer<W> {
    /// A muxer writing the stream described by `registry`.
    pub fn new(writer: W, registry: Registry) -> Self {
        Muxer {
            writer,
            registry,
            header_written: false,
        }
    }

    /// The stream description.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Write the sequence header and all descriptors.
    pub fn write_header(&mut self) -> Result<(), IamfError> {
        let profile = (self.registry.audio_elements().len() > 1) as u8;
        let header = SequenceHeader {
            primary_profile: profile,
            additional_profile: profile,
        };

        let mut out = Vec::new();
        write_obu(ObuType::SequenceHeader, &header.write(), &mut out)?;

        for c in self.registry.codec_configs() {
            write_obu(ObuType::CodecConfig, &c.write()?, &mut out)?;
        }
        for e in self.registry.audio_elements() {
            write_obu(ObuType::AudioElement, &e.write()?, &mut out)?;
        }
        for m in self.registry.mix_presentations() {
            write_obu(ObuType::MixPresentation, &m.write()?, &mut out)?;
        }

        debug!(
            "Writing header: {} codec configs, {} audio elements, {} mix presentations",
            self.registry.codec_configs().len(),
            self.registry.audio_elements().len(),
            self.registry.mix_presentations().len()
        );

        self.writer.write_all(&out)?;
        self.header_written = true;

        Ok(())
    }

    /// Write a temporal delimiter, starting a new temporal unit.
    pub fn write_temporal_delimiter(&mut self) -> Result<(), IamfError> {
        let mut out = Vec::new();
        write_obu(ObuType::TemporalDelimiter, &[], &mut out)?;
        self.writer.write_all(&out)?;
        Ok(())
    }

    /// Write an audio frame.
    ///
    /// Parameter values attached to packets of the first stream are written
    /// as parameter blocks ahead of the frame.
    pub fn write_packet(&mut self, packet: &Packet) -> Result<(), IamfError> {
        if !self.header_written {
            return Err(IamfError::InvalidModel(
                "packet written before the header".into(),
            ));
        }

        let Some(substream) = self
            .registry
            .substreams()
            .find(|s| s.stream_index == packet.stream_index)
        else {
            return Err(IamfError::InvalidModel(format!(
                "packet for unknown stream {}",
                packet.stream_index
            )));
        };

        let mut out = Vec::new();

        if packet.stream_index == 0 {
            let params = [&packet.mix_gain, &packet.demixing, &packet.recon_gain];
            for values in params.into_iter().flatten() {
                self.parameter_block(values, &mut out)?;
            }
        }

        let obu_type = ObuType::audio_frame(*substream.id);

        let mut body = BitWriter::new();
        if obu_type == ObuType::AudioFrame {
            body.put_leb128(*substream.id);
        }
        body.put_bytes(&packet.data);
        let body = body.into_vec();

        let mut header = ObuHeader::new(obu_type, body.len());
        if let Some(trim) = packet.trim {
            header = header.with_trim(trim.skip_samples, trim.discard_padding);
        }
        header.write(&mut out)?;
        out.extend_from_slice(&body);

        trace!(
            "Audio frame substream {} len {}",
            substream.id,
            packet.data.len()
        );

        self.writer.write_all(&out)?;

        Ok(())
    }

    fn parameter_block(&self, values: &ParamDefinition, out: &mut Vec<u8>) -> Result<(), IamfError> {
        let Some(definition) = self.registry.param_definition(values.parameter_id) else {
            error!("Packet references undefined parameter {}", values.parameter_id);
            return Err(IamfError::InvalidModel(format!(
                "undefined parameter {}",
                values.parameter_id
            )));
        };

        let body = values.write_block(definition, &self.registry)?;
        write_obu(ObuType::ParameterBlock, &body, out)
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> Result<(), IamfError> {
        self.writer.flush()?;
        Ok(())
    }

    /// The underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}
