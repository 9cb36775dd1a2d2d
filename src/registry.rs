//! Descriptors of one IAMF stream.

use serde::{Deserialize, Serialize};

use crate::audio_element::{AudioElement, Substream};
use crate::codec_config::CodecConfig;
use crate::error::IamfError;
use crate::id::{AudioElementId, CodecConfigId, MixPresentationId, ParameterId, SubstreamId};
use crate::mix_presentation::MixPresentation;
use crate::obu::ObuType;
use crate::param::ParamDefinition;
use crate::util::{check_underread, BitReader, BitWriter};

/// Magic of the sequence header.
pub const IAMF_MAGIC: [u8; 4] = *b"iamf";

/// The IA Sequence Header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceHeader {
    /// Profile the stream conforms to.
    pub primary_profile: u8,
    /// Profile a more capable parser can use.
    pub additional_profile: u8,
}

impl SequenceHeader {
    /// Parse a Sequence Header OBU body.
    pub fn parse(body: &[u8], strict: bool) -> Result<SequenceHeader, IamfError> {
        let mut r = BitReader::new(body, "sequence header");

        let magic = r.read_u32()?.to_be_bytes();
        if magic != IAMF_MAGIC {
            return Err(IamfError::BadMagic(magic));
        }

        let primary_profile = r.read_u8()?;
        let additional_profile = r.read_u8()?;

        check_underread(&r, ObuType::SequenceHeader, strict)?;

        Ok(SequenceHeader {
            primary_profile,
            additional_profile,
        })
    }

    /// Serialize into a Sequence Header OBU body.
    pub fn write(&self) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.put_bytes(&IAMF_MAGIC);
        w.put_u8(self.primary_profile);
        w.put_u8(self.additional_profile);
        w.into_vec()
    }
}

/// Codec configs, audio elements, mix presentations and parameter
/// definitions of a stream.
///
/// Filled by the demuxer while reading descriptors, or by hand before
/// handing it to the muxer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    sequence_header: Option<SequenceHeader>,
    codec_configs: Vec<CodecConfig>,
    audio_elements: Vec<AudioElement>,
    mix_presentations: Vec<MixPresentation>,
    param_definitions: Vec<ParamDefinition>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Registry::default()
    }

    /// The last sequence header read, if any.
    pub fn sequence_header(&self) -> Option<&SequenceHeader> {
        self.sequence_header.as_ref()
    }

    /// Set the sequence header.
    pub fn set_sequence_header(&mut self, header: SequenceHeader) {
        self.sequence_header = Some(header);
    }

    /// All codec configs in registration order.
    pub fn codec_configs(&self) -> &[CodecConfig] {
        &self.codec_configs
    }

    /// Codec config by id.
    pub fn codec_config(&self, id: CodecConfigId) -> Option<&CodecConfig> {
        self.codec_configs.iter().find(|c| c.id == id)
    }

    /// All audio elements in registration order.
    pub fn audio_elements(&self) -> &[AudioElement] {
        &self.audio_elements
    }

    /// Audio element by id.
    pub fn audio_element(&self, id: AudioElementId) -> Option<&AudioElement> {
        self.audio_elements.iter().find(|e| e.id == id)
    }

    /// All mix presentations in registration order.
    pub fn mix_presentations(&self) -> &[MixPresentation] {
        &self.mix_presentations
    }

    /// Mix presentation by id.
    pub fn mix_presentation(&self, id: MixPresentationId) -> Option<&MixPresentation> {
        self.mix_presentations.iter().find(|m| m.id == id)
    }

    /// All parameter definitions, latest version of each id.
    pub fn param_definitions(&self) -> &[ParamDefinition] {
        &self.param_definitions
    }

    /// Parameter definition by id.
    pub fn param_definition(&self, id: ParameterId) -> Option<&ParamDefinition> {
        self.param_definitions.iter().find(|p| p.parameter_id == id)
    }

    /// All substreams in stream index order.
    pub fn substreams(&self) -> impl Iterator<Item = &Substream> {
        self.audio_elements.iter().flat_map(|e| e.substreams.iter())
    }

    /// Substream by id.
    pub fn substream(&self, id: SubstreamId) -> Option<&Substream> {
        self.substreams().find(|s| s.id == id)
    }

    /// Number of substreams, which is the number of streams packets are
    /// routed to.
    pub fn stream_count(&self) -> usize {
        self.audio_elements.iter().map(|e| e.substreams.len()).sum()
    }

    /// Register a codec config.
    pub fn add_codec_config(&mut self, config: CodecConfig) -> Result<(), IamfError> {
        if self.codec_config(config.id).is_some() {
            return Err(IamfError::DuplicateId {
                kind: "codec config",
                id: *config.id,
            });
        }
        self.codec_configs.push(config);
        Ok(())
    }

    /// Register an audio element.
    ///
    /// The codec config must be registered. Stream indexes, substream
    /// layouts and decoder configs are filled in from the layers.
    pub fn add_audio_element(&mut self, mut element: AudioElement) -> Result<(), IamfError> {
        if self.audio_element(element.id).is_some() {
            return Err(IamfError::DuplicateId {
                kind: "audio element",
                id: *element.id,
            });
        }

        let config = self
            .codec_config(element.codec_config)
            .ok_or(IamfError::UnknownReference {
                kind: "codec config",
                id: *element.codec_config,
            })?;

        element.validate()?;
        element.assign_substreams(config)?;

        let first_index = self.stream_count();
        for (i, s) in element.substreams.iter_mut().enumerate() {
            s.stream_index = first_index + i;
        }

        let id = element.id;
        let mut params = vec![];
        for def in [&mut element.demixing_info, &mut element.recon_gain_info]
            .into_iter()
            .flatten()
        {
            def.audio_element = Some(id);
            params.push(def.clone());
        }

        self.check_params(&params)?;
        self.commit_audio_element(element, params)
    }

    /// Register a mix presentation.
    ///
    /// Every referenced audio element must be registered.
    pub fn add_mix_presentation(&mut self, mut mix: MixPresentation) -> Result<(), IamfError> {
        if self.mix_presentation(mix.id).is_some() {
            return Err(IamfError::DuplicateId {
                kind: "mix presentation",
                id: *mix.id,
            });
        }

        for e in mix.submixes.iter_mut().flat_map(|s| s.elements.iter_mut()) {
            if self.audio_element(e.audio_element).is_none() {
                return Err(IamfError::UnknownReference {
                    kind: "audio element",
                    id: *e.audio_element,
                });
            }
            let config = &mut e.element_mix_config;
            if config.audio_element.is_none() {
                config.audio_element = Some(e.audio_element);
            }
        }

        let params: Vec<_> = mix.param_definitions().cloned().collect();
        self.check_params(&params)?;
        self.commit_mix_presentation(mix, params);

        Ok(())
    }

    /// Parse a descriptor OBU body into the registry.
    ///
    /// The registry only changes if the whole body parsed.
    pub(crate) fn parse_descriptor(
        &mut self,
        obu_type: ObuType,
        body: &[u8],
        strict: bool,
    ) -> Result<(), IamfError> {
        match obu_type {
            ObuType::SequenceHeader => {
                let header = SequenceHeader::parse(body, strict)?;
                debug!(
                    "Sequence header, profiles {} {}",
                    header.primary_profile, header.additional_profile
                );
                self.sequence_header = Some(header);
            }
            ObuType::CodecConfig => {
                let config = CodecConfig::parse(body, strict)?;
                self.add_codec_config(config)?;
            }
            ObuType::AudioElement => {
                if let Some((element, params)) = AudioElement::parse(body, self, strict)? {
                    self.commit_audio_element(element, params)?;
                }
            }
            ObuType::MixPresentation => {
                let (mix, params) = MixPresentation::parse(body, self, strict)?;
                self.commit_mix_presentation(mix, params);
            }
            _ => {
                debug!("Not a descriptor: {:?}", obu_type);
            }
        }

        Ok(())
    }

    pub(crate) fn commit_audio_element(
        &mut self,
        element: AudioElement,
        params: Vec<ParamDefinition>,
    ) -> Result<(), IamfError> {
        for s in &element.substreams {
            let taken = self.substream(s.id).is_some()
                || element.substreams.iter().filter(|o| o.id == s.id).count() > 1;
            if taken {
                return Err(IamfError::DuplicateId {
                    kind: "substream",
                    id: *s.id,
                });
            }
        }

        self.merge_params(params);
        self.audio_elements.push(element);

        Ok(())
    }

    fn commit_mix_presentation(&mut self, mix: MixPresentation, params: Vec<ParamDefinition>) {
        self.merge_params(params);
        self.mix_presentations.push(mix);
    }

    /// Check definitions against the registered ones, and each other.
    fn check_params(&self, params: &[ParamDefinition]) -> Result<(), IamfError> {
        for (i, def) in params.iter().enumerate() {
            let earlier = params[..i]
                .iter()
                .rev()
                .find(|p| p.parameter_id == def.parameter_id);
            let Some(old) = earlier.or_else(|| self.param_definition(def.parameter_id)) else {
                continue;
            };

            let reason = if old.kind != def.kind {
                "param_definition_type"
            } else if old.self_timed != def.self_timed {
                "param_definition_mode"
            } else if old.subblocks.len() != def.subblocks.len() {
                "num_subblocks"
            } else {
                continue;
            };

            return Err(IamfError::InconsistentParameter {
                parameter_id: *def.parameter_id,
                reason,
            });
        }

        Ok(())
    }

    fn merge_params(&mut self, params: Vec<ParamDefinition>) {
        for def in params {
            if let Some(p) = self
                .param_definitions
                .iter_mut()
                .find(|p| p.parameter_id == def.parameter_id)
            {
                let audio_element = p.audio_element.or(def.audio_element);
                *p = def;
                p.audio_element = audio_element;
            } else {
                self.param_definitions.push(def);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::audio_element::{AudioElementType, Layer};
    use crate::codec_config::Codec;
    use crate::layout::ChannelLayout;
    use crate::param::ParamKind;

    fn pcm(id: u32) -> CodecConfig {
        CodecConfig {
            id: id.into(),
            codec: Codec::PcmS24Le,
            frame_size: 1024,
            seek_preroll: 0,
            sample_rate: 44100,
            decoder_config: vec![],
        }
    }

    fn stereo_element(id: u32, substream: u32) -> AudioElement {
        AudioElement {
            id: id.into(),
            element_type: AudioElementType::Channel,
            codec_config: 0.into(),
            substreams: vec![Substream::new(substream.into(), &pcm(0))],
            layers: vec![Layer::scalable(1, 1, 1)],
            demixing_info: None,
            recon_gain_info: None,
            default_w: 0,
        }
    }

    #[test]
    fn sequence_header() {
        let h = SequenceHeader::parse(b"iamf\x01\x00", true).unwrap();
        assert_eq!(h.primary_profile, 1);
        assert_eq!(h.write(), b"iamf\x01\x00");

        assert!(matches!(
            SequenceHeader::parse(b"iamg\x00\x00", true),
            Err(IamfError::BadMagic(m)) if &m == b"iamg"
        ));
        assert!(SequenceHeader::parse(b"iamf\x00\x00\x00", true).is_err());
        assert!(SequenceHeader::parse(b"iamf\x00\x00\x00", false).is_ok());
    }

    #[test]
    fn duplicate_codec_config() {
        let mut reg = Registry::new();
        reg.add_codec_config(pcm(0)).unwrap();
        assert!(matches!(
            reg.add_codec_config(pcm(0)),
            Err(IamfError::DuplicateId { id: 0, .. })
        ));
        reg.add_codec_config(pcm(1)).unwrap();
        assert_eq!(reg.codec_configs().len(), 2);
    }

    #[test]
    fn audio_elements_get_stream_indexes() {
        let mut reg = Registry::new();
        reg.add_codec_config(pcm(0)).unwrap();
        reg.add_audio_element(stereo_element(1, 4)).unwrap();
        reg.add_audio_element(stereo_element(2, 7)).unwrap();

        assert_eq!(reg.stream_count(), 2);
        let s = reg.substream(7.into()).unwrap();
        assert_eq!(s.stream_index, 1);
        assert_eq!(s.channel_layout, ChannelLayout::STEREO);
        assert_eq!(s.sample_rate, 44100);
    }

    #[test]
    fn audio_element_checks() {
        let mut reg = Registry::new();
        assert!(matches!(
            reg.add_audio_element(stereo_element(1, 0)),
            Err(IamfError::UnknownReference { .. })
        ));

        reg.add_codec_config(pcm(0)).unwrap();
        reg.add_audio_element(stereo_element(1, 0)).unwrap();
        assert!(matches!(
            reg.add_audio_element(stereo_element(1, 1)),
            Err(IamfError::DuplicateId { id: 1, .. })
        ));
        assert!(matches!(
            reg.add_audio_element(stereo_element(2, 0)),
            Err(IamfError::DuplicateId {
                kind: "substream",
                ..
            })
        ));

        let mut e = stereo_element(3, 3);
        e.layers.push(Layer::scalable(2, 2, 1));
        assert!(matches!(
            reg.add_audio_element(e),
            Err(IamfError::InvalidModel(_))
        ));
    }

    #[test]
    fn element_parameters_are_registered() {
        let mut reg = Registry::new();
        reg.add_codec_config(pcm(0)).unwrap();

        let mut e = stereo_element(1, 0);
        e.recon_gain_info = Some(ParamDefinition::new(
            5.into(),
            ParamKind::ReconGain,
            44100,
            1024,
        ));
        reg.add_audio_element(e).unwrap();

        let def = reg.param_definition(5.into()).unwrap();
        assert_eq!(def.audio_element, Some(1.into()));

        let mut e = stereo_element(2, 1);
        e.demixing_info = Some(ParamDefinition::new(
            5.into(),
            ParamKind::Demixing,
            44100,
            1024,
        ));
        assert!(matches!(
            reg.add_audio_element(e),
            Err(IamfError::InconsistentParameter {
                parameter_id: 5,
                reason: "param_definition_type"
            })
        ));
        assert!(reg.audio_element(2.into()).is_none());
    }

    #[test]
    fn failed_descriptor_leaves_registry_unchanged() {
        let mut reg = Registry::new();
        reg.add_codec_config(pcm(0)).unwrap();
        let before = reg.clone();

        // Audio element with a demixing parameter, then a truncated config.
        let body = [1, 0x00, 0, 1, 0, 1, 1, 9, 0x80, 0xf7, 0x02, 0x80, 0x00];
        assert!(reg
            .parse_descriptor(ObuType::AudioElement, &body, true)
            .is_err());
        assert_eq!(reg, before);
    }

    #[test]
    fn serializes_to_json() {
        let mut reg = Registry::new();
        reg.add_codec_config(pcm(0)).unwrap();
        reg.add_audio_element(stereo_element(1, 0)).unwrap();

        let json = serde_json::to_string(&reg).unwrap();
        let back: Registry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, reg);
    }
}
