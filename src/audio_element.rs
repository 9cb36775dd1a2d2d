//! Audio Element OBU.
//!
//! An audio element is a group of substreams coded with the same codec
//! config that together render one piece of audio, either channel based
//! (scalable layers) or scene based (ambisonics).

use serde::{Deserialize, Serialize};

use crate::codec_config::{Codec, CodecConfig};
use crate::error::IamfError;
use crate::id::{AudioElementId, CodecConfigId, SubstreamId};
use crate::layout::{ChannelLayout, SCALABLE_LAYOUTS};
use crate::obu::ObuType;
use crate::param::{ParamContext, ParamDefinition, ParamKind, ParamScope, MAX_LAYERS};
use crate::rational::Rational;
use crate::registry::Registry;
use crate::util::{check_underread, BitReader, BitWriter};

/// Kind of audio element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioElementType {
    /// Channel based, scalable layers.
    Channel,
    /// Scene based, ambisonics.
    Scene,
    /// 3 bit value not defined yet.
    Reserved(u8),
}

impl AudioElementType {
    fn from_wire(v: u8) -> Self {
        match v {
            0 => AudioElementType::Channel,
            1 => AudioElementType::Scene,
            _ => AudioElementType::Reserved(v),
        }
    }

    fn wire(&self) -> u8 {
        match self {
            AudioElementType::Channel => 0,
            AudioElementType::Scene => 1,
            AudioElementType::Reserved(v) => *v,
        }
    }
}

/// How ambisonic channels map to substreams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AmbisonicsMode {
    /// Each channel is a mono substream, or silent.
    Mono,
    /// Channels are a matrix mix of the substreams.
    Projection,
}

/// Output gain of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputGain {
    /// Which output channels the gain applies to, 6 bits.
    pub flags: u8,
    /// Gain in dB.
    pub gain: Rational,
}

/// One layer of an audio element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    /// Layout the layer renders to.
    pub channel_layout: ChannelLayout,
    /// The 4 bit loudspeaker layout code. Only used by channel elements.
    pub loudspeaker_layout: u8,
    /// Number of substreams belonging to the layer.
    pub substream_count: u8,
    /// How many of the substreams are stereo. They come first.
    pub coupled_substream_count: u8,
    /// Whether parameter blocks carry recon gain for the layer.
    pub recon_gain_present: bool,
    /// Output gain, if present.
    pub output_gain: Option<OutputGain>,
    /// Scene elements only.
    pub ambisonics_mode: Option<AmbisonicsMode>,
    /// Projection mode demixing matrix, `(substreams + coupled) * channels` values.
    pub demixing_matrix: Vec<Rational>,
}

impl Layer {
    /// A channel based layer using a code from [`SCALABLE_LAYOUTS`].
    pub fn scalable(loudspeaker_layout: u8, substream_count: u8, coupled_substream_count: u8) -> Self {
        let channel_layout = SCALABLE_LAYOUTS
            .get(loudspeaker_layout as usize)
            .cloned()
            .unwrap_or(ChannelLayout::Unspecified(
                substream_count as u16 + coupled_substream_count as u16,
            ));

        Layer {
            channel_layout,
            loudspeaker_layout,
            substream_count,
            coupled_substream_count,
            recon_gain_present: false,
            output_gain: None,
            ambisonics_mode: None,
            demixing_matrix: vec![],
        }
    }

    /// A mono mode ambisonics layer. `channels` maps each ACN channel to a
    /// substream index, 255 for silent channels.
    pub fn ambisonics_mono(channels: &[u8], substream_count: u8) -> Self {
        Layer {
            channel_layout: ChannelLayout::ambisonic_map(channels),
            loudspeaker_layout: 0,
            substream_count,
            coupled_substream_count: 0,
            recon_gain_present: false,
            output_gain: None,
            ambisonics_mode: Some(AmbisonicsMode::Mono),
            demixing_matrix: vec![],
        }
    }
}

/// A coded substream of an audio element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Substream {
    /// Id carried by audio frames.
    pub id: SubstreamId,
    /// Position among all substreams of the stream.
    pub stream_index: usize,
    /// Codec, from the codec config.
    pub codec: Codec,
    /// Samples per frame.
    pub frame_size: u32,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Preroll samples after seeking.
    pub seek_preroll: i16,
    /// Decoder config with the channel count of this substream.
    pub decoder_config: Vec<u8>,
    /// Mono or stereo once assigned to a layer.
    pub channel_layout: ChannelLayout,
}

impl Substream {
    /// A substream using `config`, not yet assigned to a layer.
    pub fn new(id: SubstreamId, config: &CodecConfig) -> Self {
        Substream {
            id,
            stream_index: 0,
            codec: config.codec,
            frame_size: config.frame_size,
            sample_rate: config.sample_rate,
            seek_preroll: config.seek_preroll,
            decoder_config: config.decoder_config.clone(),
            channel_layout: ChannelLayout::Unspecified(0),
        }
    }

    fn assign(&mut self, stereo: bool, config: &CodecConfig) -> Result<(), IamfError> {
        let channels = if stereo { 2 } else { 1 };
        self.channel_layout = if stereo {
            ChannelLayout::STEREO
        } else {
            ChannelLayout::MONO
        };
        self.decoder_config = config.decoder_config_for(channels)?;
        Ok(())
    }
}

/// An audio element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioElement {
    /// Unique id.
    pub id: AudioElementId,
    /// Channel or scene based.
    pub element_type: AudioElementType,
    /// Codec config of all substreams.
    pub codec_config: CodecConfigId,
    /// Substreams, in order.
    pub substreams: Vec<Substream>,
    /// Layers, in order. Each layer takes the next `substream_count` substreams.
    pub layers: Vec<Layer>,
    /// Demixing parameter.
    pub demixing_info: Option<ParamDefinition>,
    /// Recon gain parameter.
    pub recon_gain_info: Option<ParamDefinition>,
    /// Default weight index for demixing, 4 bits.
    pub default_w: u8,
}

impl AudioElement {
    /// Parse an Audio Element OBU body.
    ///
    /// Returns `None` for elements that refer to a codec we don't know. The
    /// second value holds parameter definitions to merge into the registry.
    pub(crate) fn parse(
        body: &[u8],
        registry: &Registry,
        strict: bool,
    ) -> Result<Option<(AudioElement, Vec<ParamDefinition>)>, IamfError> {
        let mut r = BitReader::new(body, "audio element");

        let id = AudioElementId::from(r.read_leb()?);
        if registry.audio_element(id).is_some() {
            return Err(IamfError::DuplicateId {
                kind: "audio element",
                id: *id,
            });
        }

        let element_type = AudioElementType::from_wire(r.read_bits(3)? as u8);
        r.skip_bits(5)?;

        let codec_config_id = CodecConfigId::from(r.read_leb()?);
        let config = registry
            .codec_config(codec_config_id)
            .ok_or(IamfError::UnknownReference {
                kind: "codec config",
                id: *codec_config_id,
            })?;

        if let Codec::Unknown(fourcc) = config.codec {
            debug!(
                "Ignoring audio element {} with unknown codec {:02x?}",
                id, fourcc
            );
            return Ok(None);
        }

        let num_substreams = r.read_leb()? as usize;
        if num_substreams > r.bytes_left() {
            return Err(IamfError::Truncated("audio substream ids"));
        }

        let first_index = registry.stream_count();
        let mut substreams = Vec::new();
        substreams.try_reserve_exact(num_substreams)?;
        for i in 0..num_substreams {
            let mut s = Substream::new(SubstreamId::from(r.read_leb()?), config);
            s.stream_index = first_index + i;
            substreams.push(s);
        }

        let num_parameters = r.read_leb()?;
        if num_parameters > 0 && element_type != AudioElementType::Channel {
            return Err(IamfError::InvalidData(format!(
                "{} parameters on {:?} audio element {}",
                num_parameters, element_type, id
            )));
        }

        let mut scope = ParamScope::new(registry.param_definitions());
        let ctx = ParamContext {
            audio_element: Some(id),
            frame_size: substreams.first().map(|s| s.frame_size),
        };

        let mut demixing_info = None;
        let mut recon_gain_info = None;
        let mut default_w = 0;

        for _ in 0..num_parameters {
            let param_type = r.read_leb()?;
            match ParamKind::from_wire(param_type) {
                Some(ParamKind::MixGain) => {
                    return Err(IamfError::InvalidData(format!(
                        "mix gain parameter in audio element {}",
                        id
                    )));
                }
                Some(ParamKind::Demixing) => {
                    let def = scope.parse_definition(&mut r, ParamKind::Demixing, ctx)?;
                    default_w = r.read_u8()? >> 4;
                    demixing_info = Some(def);
                }
                Some(ParamKind::ReconGain) => {
                    let def = scope.parse_definition(&mut r, ParamKind::ReconGain, ctx)?;
                    recon_gain_info = Some(def);
                }
                None => {
                    let size = r.read_leb()? as usize;
                    debug!("Skipping parameter type {} ({} bytes)", param_type, size);
                    r.skip_bytes(size)?;
                }
            }
        }

        let layers = match element_type {
            AudioElementType::Channel => parse_scalable(&mut r, num_substreams)?,
            AudioElementType::Scene => parse_ambisonics(&mut r, num_substreams)?,
            AudioElementType::Reserved(t) => {
                let size = r.read_leb()? as usize;
                debug!("Skipping config of audio element type {} ({} bytes)", t, size);
                r.skip_bytes(size)?;
                vec![]
            }
        };

        check_underread(&r, ObuType::AudioElement, strict)?;

        trace!(
            "Audio element {} {:?} codec config {} substreams {} layers {}",
            id,
            element_type,
            codec_config_id,
            substreams.len(),
            layers.len()
        );

        let mut element = AudioElement {
            id,
            element_type,
            codec_config: codec_config_id,
            substreams,
            layers,
            demixing_info,
            recon_gain_info,
            default_w,
        };
        element.assign_substreams(config)?;

        Ok(Some((element, scope.pending)))
    }

    /// Set channel layout and decoder config of every substream from the
    /// layers. The first `coupled_substream_count` substreams of a layer are
    /// stereo, the rest mono.
    pub(crate) fn assign_substreams(&mut self, config: &CodecConfig) -> Result<(), IamfError> {
        let mut next = self.substreams.iter_mut();

        for l in &self.layers {
            for j in 0..l.substream_count {
                let Some(s) = next.next() else {
                    return Err(IamfError::InvalidModel(format!(
                        "audio element {} has too few substreams for its layers",
                        self.id
                    )));
                };
                s.assign(j < l.coupled_substream_count, config)?;
            }
        }

        Ok(())
    }

    /// Check the layer and substream invariants.
    pub(crate) fn validate(&self) -> Result<(), IamfError> {
        let invalid = |msg: String| Err(IamfError::InvalidModel(msg));

        match self.element_type {
            AudioElementType::Channel => {
                if self.layers.len() > MAX_LAYERS {
                    return invalid(format!("audio element {} has {} layers", self.id, self.layers.len()));
                }
                let sum: usize = self.layers.iter().map(|l| l.substream_count as usize).sum();
                if sum != self.substreams.len() {
                    return invalid(format!(
                        "audio element {} layers hold {} substreams, element has {}",
                        self.id,
                        sum,
                        self.substreams.len()
                    ));
                }
                if let Some(l) = self.layers.iter().find(|l| l.coupled_substream_count > l.substream_count) {
                    return invalid(format!(
                        "audio element {} layer couples {} of {} substreams",
                        self.id, l.coupled_substream_count, l.substream_count
                    ));
                }
            }
            AudioElementType::Scene => {
                if self.layers.len() != 1 {
                    return invalid(format!(
                        "scene audio element {} has {} layers",
                        self.id,
                        self.layers.len()
                    ));
                }
                if self.substreams.len() > u8::MAX as usize {
                    return invalid(format!("scene audio element {} has too many substreams", self.id));
                }
            }
            AudioElementType::Reserved(_) => {}
        }

        Ok(())
    }

    /// Serialize into an Audio Element OBU body.
    pub fn write(&self) -> Result<Vec<u8>, IamfError> {
        self.validate()?;

        let mut w = BitWriter::new();

        w.put_leb128(*self.id);
        w.put_bits(3, self.element_type.wire() as u64);
        w.put_bits(5, 0);
        w.put_leb128(*self.codec_config);

        w.put_leb128(self.substreams.len() as u32);
        for s in &self.substreams {
            w.put_leb128(*s.id);
        }

        let num_parameters = self.demixing_info.is_some() as u32 + self.recon_gain_info.is_some() as u32;
        w.put_leb128(num_parameters);

        if let Some(def) = &self.demixing_info {
            w.put_leb128(ParamKind::Demixing.wire());
            def.write_definition(&mut w)?;
            w.put_bits(4, self.default_w as u64);
            w.put_bits(4, 0);
        }

        if let Some(def) = &self.recon_gain_info {
            w.put_leb128(ParamKind::ReconGain.wire());
            def.write_definition(&mut w)?;
        }

        match self.element_type {
            AudioElementType::Channel => {
                w.put_bits(3, self.layers.len() as u64);
                w.put_bits(5, 0);

                for l in &self.layers {
                    w.put_bits(4, l.loudspeaker_layout as u64);
                    w.put_bit_flag(l.output_gain.is_some());
                    w.put_bit_flag(l.recon_gain_present);
                    w.put_bits(2, 0);
                    w.put_u8(l.substream_count);
                    w.put_u8(l.coupled_substream_count);

                    if let Some(g) = &l.output_gain {
                        w.put_bits(6, g.flags as u64);
                        w.put_bits(2, 0);
                        w.put_i16(g.gain.to_q8());
                    }
                }
            }
            AudioElementType::Scene => {
                let l = &self.layers[0];
                let channels = l.channel_layout.channel_count();
                let Ok(c) = u8::try_from(channels) else {
                    return Err(IamfError::InvalidModel(format!(
                        "{} ambisonic channels",
                        channels
                    )));
                };

                match l.ambisonics_mode {
                    Some(AmbisonicsMode::Projection) => {
                        w.put_leb128(1);
                        w.put_u8(c);
                        w.put_u8(self.substreams.len() as u8);
                        w.put_u8(l.coupled_substream_count);
                        for v in &l.demixing_matrix {
                            w.put_i16(v.to_q8());
                        }
                    }
                    _ => {
                        let Some(map) = l.channel_layout.ambisonic_channels() else {
                            return Err(IamfError::InvalidModel(
                                "mono ambisonics layer needs an ambisonic channel map".into(),
                            ));
                        };
                        w.put_leb128(0);
                        w.put_u8(c);
                        w.put_u8(self.substreams.len() as u8);
                        w.put_bytes(&map);
                    }
                }
            }
            AudioElementType::Reserved(_) => {
                // Empty config.
                w.put_leb128(0);
            }
        }

        Ok(w.into_vec())
    }
}

fn parse_scalable(r: &mut BitReader<'_>, num_substreams: usize) -> Result<Vec<Layer>, IamfError> {
    let num_layers = r.read_bits(3)? as usize;
    r.skip_bits(5)?;

    if num_layers > MAX_LAYERS {
        return Err(IamfError::OutOfRange {
            field: "num_layers",
            value: num_layers as u64,
        });
    }

    let mut layers = Vec::with_capacity(num_layers);

    for _ in 0..num_layers {
        let loudspeaker_layout = r.read_bits(4)? as u8;
        let output_gain_present = r.read_bit_flag()?;
        let recon_gain_present = r.read_bit_flag()?;
        r.skip_bits(2)?;

        let substream_count = r.read_u8()?;
        let coupled_substream_count = r.read_u8()?;

        let output_gain = if output_gain_present {
            let flags = r.read_bits(6)? as u8;
            r.skip_bits(2)?;
            let gain = Rational::from_q8(r.read_i16()?);
            Some(OutputGain { flags, gain })
        } else {
            None
        };

        let mut layer = Layer::scalable(loudspeaker_layout, substream_count, coupled_substream_count);
        layer.recon_gain_present = recon_gain_present;
        layer.output_gain = output_gain;

        layers.push(layer);
    }

    let used: usize = layers.iter().map(|l| l.substream_count as usize).sum();
    if used > num_substreams {
        return Err(IamfError::InvalidData(format!(
            "layers use {} substreams, audio element has {}",
            used, num_substreams
        )));
    }
    if used < num_substreams {
        return Err(IamfError::InvalidData(format!(
            "{} substreams not used by any layer",
            num_substreams - used
        )));
    }

    Ok(layers)
}

fn parse_ambisonics(r: &mut BitReader<'_>, num_substreams: usize) -> Result<Vec<Layer>, IamfError> {
    let mode = r.read_leb()?;
    let ambisonics_mode = match mode {
        0 => AmbisonicsMode::Mono,
        1 => AmbisonicsMode::Projection,
        _ => {
            debug!("Unsupported ambisonics mode {}", mode);
            return Ok(vec![]);
        }
    };

    let output_channel_count = r.read_u8()?;
    let substream_count = r.read_u8()?;

    if substream_count as usize != num_substreams {
        return Err(IamfError::InvalidData(format!(
            "ambisonics substream_count {} but audio element has {}",
            substream_count, num_substreams
        )));
    }

    if !is_full_order(output_channel_count) {
        return Err(IamfError::OutOfRange {
            field: "output_channel_count",
            value: output_channel_count as u64,
        });
    }

    let layer = match ambisonics_mode {
        AmbisonicsMode::Mono => {
            let map = r.read_bytes(output_channel_count as usize)?;

            Layer {
                channel_layout: ChannelLayout::ambisonic_map(map),
                loudspeaker_layout: 0,
                substream_count,
                coupled_substream_count: 0,
                recon_gain_present: false,
                output_gain: None,
                ambisonics_mode: Some(ambisonics_mode),
                demixing_matrix: vec![],
            }
        }
        AmbisonicsMode::Projection => {
            let coupled_substream_count = r.read_u8()?;
            let size = (substream_count as usize + coupled_substream_count as usize)
                * output_channel_count as usize;

            let mut demixing_matrix = Vec::new();
            demixing_matrix.try_reserve_exact(size)?;
            for _ in 0..size {
                demixing_matrix.push(Rational::from_q8(r.read_i16()?));
            }

            Layer {
                channel_layout: ChannelLayout::Ambisonic(output_channel_count as u16),
                loudspeaker_layout: 0,
                substream_count,
                coupled_substream_count,
                recon_gain_present: false,
                output_gain: None,
                ambisonics_mode: Some(ambisonics_mode),
                demixing_matrix,
            }
        }
    };

    Ok(vec![layer])
}

/// Whether `channels` is `(order + 1)^2` for some order.
fn is_full_order(channels: u8) -> bool {
    (1..=16_u16).any(|n| n * n == channels as u16)
}
