//! Parameter definitions and parameter blocks.
//!
//! A parameter definition, carried inside an Audio Element or a Mix
//! Presentation, declares a time varying parameter: its id, rate and how its
//! duration is split into subblocks. Parameter Block OBUs later carry the
//! values for each subblock.
//!
//! When the definition is self timed (`param_definition_mode` 0) the
//! timeline lives in the definition and blocks only carry values. Otherwise
//! every block carries its own timeline.

use serde::{Deserialize, Serialize};

use crate::error::IamfError;
use crate::id::{AudioElementId, ParameterId};
use crate::obu::ObuType;
use crate::rational::Rational;
use crate::registry::Registry;
use crate::util::{check_underread, BitReader, BitWriter};

/// Max number of layers of a scalable channel audio element.
pub const MAX_LAYERS: usize = 6;

/// Recon gain slots per layer.
pub const RECON_GAIN_CHANNELS: usize = 12;

/// Max number of subblocks in a parameter definition or parameter block.
///
/// A count derived as `duration / constant_subblock_duration` reads no
/// bytes per subblock, so it is not bounded by the size of the OBU.
pub const MAX_SUBBLOCKS: u32 = 1 << 16;

fn check_subblocks(num: u32) -> Result<u32, IamfError> {
    if num > MAX_SUBBLOCKS {
        return Err(IamfError::OutOfRange {
            field: "num_subblocks",
            value: num as u64,
        });
    }
    Ok(num)
}

/// Recon gain values, per layer and per channel slot.
pub type ReconGainTable = [[u8; RECON_GAIN_CHANNELS]; MAX_LAYERS];

/// The kinds of parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamKind {
    /// Gain applied to an audio element or a submix.
    MixGain,
    /// Down-mixing parameters of a scalable channel audio element.
    Demixing,
    /// Reconstruction gain of a scalable channel audio element.
    ReconGain,
}

impl ParamKind {
    /// From the wire value. Values above 2 are not parameters we know.
    pub fn from_wire(v: u32) -> Option<ParamKind> {
        match v {
            0 => Some(ParamKind::MixGain),
            1 => Some(ParamKind::Demixing),
            2 => Some(ParamKind::ReconGain),
            _ => None,
        }
    }

    /// The wire value.
    pub fn wire(&self) -> u32 {
        match self {
            ParamKind::MixGain => 0,
            ParamKind::Demixing => 1,
            ParamKind::ReconGain => 2,
        }
    }
}

/// Shape of a mix gain over a subblock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Animation {
    /// Constant gain.
    Step {
        /// Gain in dB.
        start: Rational,
    },
    /// Linear ramp.
    Linear {
        /// Gain at the start, in dB.
        start: Rational,
        /// Gain at the end, in dB.
        end: Rational,
    },
    /// Quadratic Bezier curve.
    Bezier {
        /// Gain at the start, in dB.
        start: Rational,
        /// Gain at the end, in dB.
        end: Rational,
        /// Control point gain, in dB.
        control: Rational,
        /// Control point position in 1/256ths of the subblock.
        control_relative_time: u8,
    },
}

impl Animation {
    fn wire(&self) -> u32 {
        match self {
            Animation::Step { .. } => 0,
            Animation::Linear { .. } => 1,
            Animation::Bezier { .. } => 2,
        }
    }

    fn parse(r: &mut BitReader<'_>) -> Result<Animation, IamfError> {
        let animation_type = r.read_leb()?;
        if animation_type > 2 {
            return Err(IamfError::OutOfRange {
                field: "animation_type",
                value: animation_type as u64,
            });
        }

        let start = Rational::from_q8(r.read_i16()?);
        if animation_type == 0 {
            return Ok(Animation::Step { start });
        }

        let end = Rational::from_q8(r.read_i16()?);
        if animation_type == 1 {
            return Ok(Animation::Linear { start, end });
        }

        let control = Rational::from_q8(r.read_i16()?);
        let control_relative_time = r.read_u8()?;

        Ok(Animation::Bezier {
            start,
            end,
            control,
            control_relative_time,
        })
    }

    fn write(&self, w: &mut BitWriter) {
        w.put_leb128(self.wire());
        match self {
            Animation::Step { start } => {
                w.put_i16(start.to_q8());
            }
            Animation::Linear { start, end } => {
                w.put_i16(start.to_q8());
                w.put_i16(end.to_q8());
            }
            Animation::Bezier {
                start,
                end,
                control,
                control_relative_time,
            } => {
                w.put_i16(start.to_q8());
                w.put_i16(end.to_q8());
                w.put_i16(control.to_q8());
                w.put_u8(*control_relative_time);
            }
        }
    }
}

impl Default for Animation {
    fn default() -> Self {
        Animation::Step {
            start: Rational::ZERO,
        }
    }
}

/// One segment of a parameter timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Subblock {
    /// Mix gain values.
    MixGain {
        /// Duration in ticks of the parameter rate.
        duration: u32,
        /// The gain curve.
        animation: Animation,
    },
    /// Demixing values.
    Demixing {
        /// Duration in ticks of the parameter rate.
        duration: u32,
        /// Pre-defined down-mixing mode, 3 bits.
        dmixp_mode: u8,
    },
    /// Recon gain values.
    ReconGain {
        /// Duration in ticks of the parameter rate.
        duration: u32,
        /// Gains indexed by layer and channel slot.
        recon_gain: ReconGainTable,
    },
}

impl Subblock {
    /// A subblock of `kind` carrying only a duration.
    pub fn empty(kind: ParamKind, duration: u32) -> Subblock {
        match kind {
            ParamKind::MixGain => Subblock::MixGain {
                duration,
                animation: Animation::default(),
            },
            ParamKind::Demixing => Subblock::Demixing {
                duration,
                dmixp_mode: 0,
            },
            ParamKind::ReconGain => Subblock::ReconGain {
                duration,
                recon_gain: [[0; RECON_GAIN_CHANNELS]; MAX_LAYERS],
            },
        }
    }

    /// Duration in ticks of the parameter rate.
    pub fn duration(&self) -> u32 {
        match self {
            Subblock::MixGain { duration, .. }
            | Subblock::Demixing { duration, .. }
            | Subblock::ReconGain { duration, .. } => *duration,
        }
    }

    /// The kind of parameter this subblock belongs to.
    pub fn kind(&self) -> ParamKind {
        match self {
            Subblock::MixGain { .. } => ParamKind::MixGain,
            Subblock::Demixing { .. } => ParamKind::Demixing,
            Subblock::ReconGain { .. } => ParamKind::ReconGain,
        }
    }
}

/// A parameter definition, or the values of one parameter block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDefinition {
    /// Identifies the parameter across the whole stream.
    pub parameter_id: ParameterId,
    /// What the parameter controls.
    pub kind: ParamKind,
    /// Ticks per second.
    pub parameter_rate: u32,
    /// Whether the timeline is carried by the definition. Otherwise each
    /// parameter block carries its own.
    pub self_timed: bool,
    /// Total duration in ticks.
    pub duration: u32,
    /// Duration of every subblock, or 0 if each subblock has its own.
    pub constant_subblock_duration: u32,
    /// The subblocks in order, all of `kind`.
    pub subblocks: Vec<Subblock>,
    /// Audio element the parameter belongs to, if defined inside one.
    pub audio_element: Option<AudioElementId>,
}

impl ParamDefinition {
    /// A new self timed definition with a single subblock covering `duration`.
    pub fn new(parameter_id: ParameterId, kind: ParamKind, parameter_rate: u32, duration: u32) -> Self {
        ParamDefinition {
            parameter_id,
            kind,
            parameter_rate,
            self_timed: true,
            duration,
            constant_subblock_duration: duration,
            subblocks: vec![Subblock::empty(kind, duration)],
            audio_element: None,
        }
    }

    fn check_timeline(&self) -> Result<(), IamfError> {
        if self.constant_subblock_duration != 0 {
            let n = self.duration / self.constant_subblock_duration;
            if n as usize != self.subblocks.len() {
                return Err(IamfError::InvalidModel(format!(
                    "parameter {} has {} subblocks, timeline implies {}",
                    self.parameter_id,
                    self.subblocks.len(),
                    n
                )));
            }
        }
        if let Some(s) = self.subblocks.iter().find(|s| s.kind() != self.kind) {
            return Err(IamfError::InvalidModel(format!(
                "{:?} subblock in {:?} parameter {}",
                s.kind(),
                self.kind,
                self.parameter_id
            )));
        }
        Ok(())
    }

    /// Serialize the definition, as embedded in Audio Element and Mix
    /// Presentation OBUs.
    pub(crate) fn write_definition(&self, w: &mut BitWriter) -> Result<(), IamfError> {
        w.put_leb128(*self.parameter_id);
        w.put_leb128(self.parameter_rate);
        w.put_bits(1, !self.self_timed as u64);
        w.put_bits(7, 0);

        if !self.self_timed {
            return Ok(());
        }

        self.check_timeline()?;

        let csd = self.constant_subblock_duration;
        w.put_leb128(self.duration);
        w.put_leb128(csd);
        if csd == 0 {
            w.put_leb128(self.subblocks.len() as u32);
        }

        for s in &self.subblocks {
            if csd == 0 {
                w.put_leb128(s.duration());
            }
            if let Subblock::Demixing { dmixp_mode, .. } = s {
                w.put_bits(3, *dmixp_mode as u64);
                w.put_bits(5, 0);
            }
        }

        Ok(())
    }

    /// Serialize as a Parameter Block OBU body for `definition`.
    ///
    /// `self` holds the values, `definition` is the registered definition.
    pub(crate) fn write_block(
        &self,
        definition: &ParamDefinition,
        registry: &Registry,
    ) -> Result<Vec<u8>, IamfError> {
        if self.kind != definition.kind || self.self_timed != definition.self_timed {
            return Err(IamfError::InvalidModel(format!(
                "parameter block {} does not match its definition",
                self.parameter_id
            )));
        }

        let mut w = BitWriter::new();
        w.put_leb128(*self.parameter_id);

        let csd = self.constant_subblock_duration;
        if self.self_timed {
            if self.subblocks.len() != definition.subblocks.len() {
                return Err(IamfError::InvalidModel(format!(
                    "parameter block {} has {} subblocks, definition has {}",
                    self.parameter_id,
                    self.subblocks.len(),
                    definition.subblocks.len()
                )));
            }
        } else {
            self.check_timeline()?;
            w.put_leb128(self.duration);
            w.put_leb128(csd);
            if csd == 0 {
                w.put_leb128(self.subblocks.len() as u32);
            }
        }

        let recon_layers = if self.kind == ParamKind::ReconGain {
            recon_layers(definition, registry)?
        } else {
            vec![]
        };

        for s in &self.subblocks {
            if !self.self_timed && csd == 0 {
                w.put_leb128(s.duration());
            }

            match s {
                Subblock::MixGain { animation, .. } => animation.write(&mut w),
                Subblock::Demixing { dmixp_mode, .. } => {
                    w.put_bits(3, *dmixp_mode as u64);
                    w.put_bits(5, 0);
                }
                Subblock::ReconGain { recon_gain, .. } => {
                    for &layer in &recon_layers {
                        write_recon_gain(&recon_gain[layer], &mut w);
                    }
                }
            }
        }

        Ok(w.into_vec())
    }
}

/// Where a parameter definition is parsed from.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ParamContext {
    pub audio_element: Option<AudioElementId>,
    /// Frame size of the element's first substream.
    pub frame_size: Option<u32>,
}

/// Parameter definitions known while parsing one OBU.
///
/// Definitions parsed from the OBU are kept in `pending` and only merged
/// into the registry once the whole OBU parsed.
pub(crate) struct ParamScope<'a> {
    known: &'a [ParamDefinition],
    pub pending: Vec<ParamDefinition>,
}

impl<'a> ParamScope<'a> {
    pub fn new(known: &'a [ParamDefinition]) -> Self {
        ParamScope {
            known,
            pending: vec![],
        }
    }

    fn lookup(&self, id: ParameterId) -> Option<&ParamDefinition> {
        self.pending
            .iter()
            .find(|p| p.parameter_id == id)
            .or_else(|| self.known.iter().find(|p| p.parameter_id == id))
    }

    fn store(&mut self, def: ParamDefinition) {
        if let Some(p) = self
            .pending
            .iter_mut()
            .find(|p| p.parameter_id == def.parameter_id)
        {
            *p = def;
        } else {
            self.pending.push(def);
        }
    }

    /// Parse a parameter definition of `kind`.
    ///
    /// A parameter id seen before must agree on kind, timing mode and number
    /// of subblocks. The new values then replace the old ones.
    pub fn parse_definition(
        &mut self,
        r: &mut BitReader<'_>,
        kind: ParamKind,
        ctx: ParamContext,
    ) -> Result<ParamDefinition, IamfError> {
        let parameter_id = ParameterId::from(r.read_leb()?);
        let old = self.lookup(parameter_id).cloned();

        let parameter_rate = r.read_leb()?;
        let self_timed = r.read_bits(1)? == 0;
        r.skip_bits(7)?;

        if let Some(old) = &old {
            if old.kind != kind {
                return Err(IamfError::InconsistentParameter {
                    parameter_id: *parameter_id,
                    reason: "param_definition_type",
                });
            }
            if old.self_timed != self_timed {
                return Err(IamfError::InconsistentParameter {
                    parameter_id: *parameter_id,
                    reason: "param_definition_mode",
                });
            }
        }

        let (duration, constant_subblock_duration, num_subblocks) = if self_timed {
            let duration = r.read_leb()?;
            let csd = r.read_leb()?;
            let num = if csd == 0 {
                let num = r.read_leb()?;
                // Every subblock carries at least its duration.
                if num as usize > r.bytes_left() {
                    return Err(IamfError::Truncated("subblock durations"));
                }
                num
            } else {
                duration / csd
            };
            (duration, csd, check_subblocks(num)?)
        } else {
            let frame_size = ctx.frame_size.unwrap_or(0);
            (frame_size, frame_size, 0)
        };

        if let Some(old) = &old {
            if old.subblocks.len() != num_subblocks as usize {
                return Err(IamfError::InconsistentParameter {
                    parameter_id: *parameter_id,
                    reason: "num_subblocks",
                });
            }
        }

        let mut subblocks = Vec::new();
        subblocks.try_reserve_exact(num_subblocks as usize)?;

        for _ in 0..num_subblocks {
            let duration = if constant_subblock_duration == 0 {
                r.read_leb()?
            } else {
                constant_subblock_duration
            };

            let subblock = match kind {
                ParamKind::Demixing => Subblock::Demixing {
                    duration,
                    dmixp_mode: r.read_u8()? >> 5,
                },
                _ => Subblock::empty(kind, duration),
            };

            subblocks.push(subblock);
        }

        let audio_element = match &old {
            Some(old) => old.audio_element,
            None => ctx.audio_element,
        };

        let def = ParamDefinition {
            parameter_id,
            kind,
            parameter_rate,
            self_timed,
            duration,
            constant_subblock_duration,
            subblocks,
            audio_element,
        };

        trace!(
            "Parameter {} {:?} rate {} self_timed {} subblocks {}",
            parameter_id,
            kind,
            parameter_rate,
            self_timed,
            def.subblocks.len()
        );

        self.store(def.clone());

        Ok(def)
    }
}

/// Parse a Parameter Block OBU body.
///
/// Returns `None` for parameter ids without a definition.
pub fn parse_block(
    body: &[u8],
    registry: &Registry,
    strict: bool,
) -> Result<Option<ParamDefinition>, IamfError> {
    let mut r = BitReader::new(body, "parameter block");

    let parameter_id = ParameterId::from(r.read_leb()?);

    let Some(def) = registry.param_definition(parameter_id) else {
        debug!("Parameter block for unknown parameter {}", parameter_id);
        return Ok(None);
    };

    let (duration, csd, num_subblocks) = if def.self_timed {
        let csd = def.constant_subblock_duration;
        let mut num = def.subblocks.len() as u32;
        if num == 0 && csd != 0 {
            num = def.duration / csd;
        }
        (def.duration, csd, num)
    } else {
        let duration = r.read_leb()?;
        let csd = r.read_leb()?;
        let num = if csd == 0 {
            r.read_leb()?
        } else {
            duration / csd
        };
        (duration, csd, num)
    };
    let num_subblocks = check_subblocks(num_subblocks)?;

    let recon_layers = if def.kind == ParamKind::ReconGain {
        recon_layers(def, registry)?
    } else {
        vec![]
    };

    // Unless a subblock reads nothing, count is bounded by the body.
    let reads_bytes = def.kind != ParamKind::ReconGain || !recon_layers.is_empty();
    if reads_bytes && num_subblocks as usize > r.bytes_left() {
        return Err(IamfError::Truncated("parameter block subblocks"));
    }

    let mut subblocks = Vec::new();
    subblocks.try_reserve_exact(num_subblocks as usize)?;

    for i in 0..num_subblocks as usize {
        let duration = if !def.self_timed && csd == 0 {
            r.read_leb()?
        } else if csd != 0 {
            csd
        } else {
            def.subblocks.get(i).map(|s| s.duration()).unwrap_or(0)
        };

        let subblock = match def.kind {
            ParamKind::MixGain => Subblock::MixGain {
                duration,
                animation: Animation::parse(&mut r)?,
            },
            ParamKind::Demixing => Subblock::Demixing {
                duration,
                dmixp_mode: r.read_u8()? >> 5,
            },
            ParamKind::ReconGain => {
                let mut recon_gain = [[0; RECON_GAIN_CHANNELS]; MAX_LAYERS];
                for &layer in &recon_layers {
                    read_recon_gain(&mut r, &mut recon_gain[layer])?;
                }
                Subblock::ReconGain {
                    duration,
                    recon_gain,
                }
            }
        };

        subblocks.push(subblock);
    }

    check_underread(&r, ObuType::ParameterBlock, strict)?;

    trace!(
        "Parameter block {} {:?} duration {} subblocks {}",
        parameter_id,
        def.kind,
        duration,
        subblocks.len()
    );

    Ok(Some(ParamDefinition {
        parameter_id,
        kind: def.kind,
        parameter_rate: def.parameter_rate,
        self_timed: def.self_timed,
        duration,
        constant_subblock_duration: csd,
        subblocks,
        audio_element: def.audio_element,
    }))
}

/// Indexes of the layers with recon gain, of the element `def` belongs to.
fn recon_layers(def: &ParamDefinition, registry: &Registry) -> Result<Vec<usize>, IamfError> {
    let id = def.audio_element.ok_or_else(|| {
        IamfError::InvalidData(format!(
            "recon gain parameter {} without audio element",
            def.parameter_id
        ))
    })?;
    let element = registry
        .audio_element(id)
        .ok_or(IamfError::UnknownReference {
            kind: "audio element",
            id: *id,
        })?;

    Ok(element
        .layers
        .iter()
        .enumerate()
        .take(MAX_LAYERS)
        .filter(|(_, l)| l.recon_gain_present)
        .map(|(i, _)| i)
        .collect())
}

/// Seven slots are flagged in bits 0..=6. When bit 7 is set, bits 8..=12
/// flag slots 7..=11.
fn read_recon_gain(
    r: &mut BitReader<'_>,
    gains: &mut [u8; RECON_GAIN_CHANNELS],
) -> Result<(), IamfError> {
    let raw = r.read_leb()?;
    let count = if raw & 0x80 != 0 { 12 } else { 7 };
    let flags = (raw & 0x7f) | ((raw & 0xff00) >> 1);

    for (j, gain) in gains.iter_mut().enumerate().take(count) {
        if flags & (1 << j) != 0 {
            *gain = r.read_u8()?;
        }
    }

    Ok(())
}

fn write_recon_gain(gains: &[u8; RECON_GAIN_CHANNELS], w: &mut BitWriter) {
    let mut flags = 0_u32;
    for (j, gain) in gains.iter().enumerate() {
        if *gain == 0 {
            continue;
        }
        if j < 7 {
            flags |= 1 << j;
        } else {
            flags |= 0x80 | (1 << (j + 1));
        }
    }

    w.put_leb128(flags);
    for gain in gains.iter().filter(|g| **g != 0) {
        w.put_u8(*gain);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn def_bytes(id: u8, mode: u8, rest: &[u8]) -> Vec<u8> {
        let mut v = vec![id, 0x80, 0xfa, 0x01, mode << 7];
        v.extend_from_slice(rest);
        v
    }

    fn parse_def(
        scope: &mut ParamScope<'_>,
        bytes: &[u8],
        kind: ParamKind,
    ) -> Result<ParamDefinition, IamfError> {
        let mut r = BitReader::new(bytes, "test");
        scope.parse_definition(&mut r, kind, ParamContext::default())
    }

    #[test]
    fn self_timed_constant_subblocks() {
        let mut scope = ParamScope::new(&[]);
        // duration 960, constant 480
        let bytes = def_bytes(5, 0, &[0xc0, 0x07, 0xe0, 0x03]);
        let d = parse_def(&mut scope, &bytes, ParamKind::MixGain).unwrap();
        assert_eq!(*d.parameter_id, 5);
        assert_eq!(d.parameter_rate, 32000);
        assert!(d.self_timed);
        assert_eq!(d.duration, 960);
        assert_eq!(d.constant_subblock_duration, 480);
        assert_eq!(d.subblocks.len(), 2);
        assert!(d.subblocks.iter().all(|s| s.duration() == 480));
    }

    #[test]
    fn self_timed_explicit_subblocks() {
        let mut scope = ParamScope::new(&[]);
        // duration 10, constant 0, 3 subblocks of 2, 3, 5. Demixing reads a byte each.
        let bytes = def_bytes(
            1,
            0,
            &[10, 0, 3, 2, 0b0010_0000, 3, 0b0100_0000, 5, 0b0110_0000],
        );
        let d = parse_def(&mut scope, &bytes, ParamKind::Demixing).unwrap();
        let modes: Vec<_> = d
            .subblocks
            .iter()
            .map(|s| match s {
                Subblock::Demixing {
                    duration,
                    dmixp_mode,
                } => (*duration, *dmixp_mode),
                _ => panic!("wrong kind"),
            })
            .collect();
        assert_eq!(modes, vec![(2, 1), (3, 2), (5, 3)]);
    }

    #[test]
    fn extern_timed_uses_frame_size() {
        let mut scope = ParamScope::new(&[]);
        let bytes = def_bytes(2, 1, &[]);
        let mut r = BitReader::new(&bytes, "test");
        let ctx = ParamContext {
            audio_element: Some(7.into()),
            frame_size: Some(960),
        };
        let d = scope
            .parse_definition(&mut r, ParamKind::ReconGain, ctx)
            .unwrap();
        assert!(!d.self_timed);
        assert_eq!(d.duration, 960);
        assert_eq!(d.constant_subblock_duration, 960);
        assert!(d.subblocks.is_empty());
        assert_eq!(d.audio_element, Some(7.into()));
    }

    fn leb(values: &[u32]) -> Vec<u8> {
        let mut v = vec![];
        for &n in values {
            crate::obu::leb128::write_leb128(n, &mut v);
        }
        v
    }

    #[test]
    fn constant_subblocks_are_capped() {
        let mut scope = ParamScope::new(&[]);

        // 20M subblocks of one sample from a ten byte definition.
        let bytes = def_bytes(7, 0, &leb(&[20_000_000, 1]));
        assert_eq!(bytes.len(), 10);
        assert!(matches!(
            parse_def(&mut scope, &bytes, ParamKind::MixGain),
            Err(IamfError::OutOfRange {
                field: "num_subblocks",
                value: 20_000_000,
            })
        ));

        let bytes = def_bytes(7, 0, &leb(&[MAX_SUBBLOCKS, 1]));
        let d = parse_def(&mut scope, &bytes, ParamKind::MixGain).unwrap();
        assert_eq!(d.subblocks.len(), MAX_SUBBLOCKS as usize);
    }

    #[test]
    fn recon_gain_block_without_recon_layers_is_capped() {
        use crate::audio_element::{AudioElement, AudioElementType, Layer, Substream};
        use crate::codec_config::{Codec, CodecConfig};

        let config = CodecConfig {
            id: 0.into(),
            codec: Codec::PcmS16Le,
            frame_size: 4,
            seek_preroll: 0,
            sample_rate: 48000,
            decoder_config: vec![],
        };
        let mut recon_gain = ParamDefinition::new(5.into(), ParamKind::ReconGain, 48000, 4);
        recon_gain.self_timed = false;
        recon_gain.subblocks = vec![];

        let mut registry = Registry::new();
        registry.add_codec_config(config.clone()).unwrap();
        registry
            .add_audio_element(AudioElement {
                id: 1.into(),
                element_type: AudioElementType::Channel,
                codec_config: 0.into(),
                substreams: vec![Substream::new(0.into(), &config)],
                layers: vec![Layer::scalable(1, 1, 1)],
                demixing_info: None,
                recon_gain_info: Some(recon_gain),
                default_w: 0,
            })
            .unwrap();

        let mut body = vec![5];
        body.extend(leb(&[20_000_000, 1]));
        assert!(matches!(
            parse_block(&body, &registry, false),
            Err(IamfError::OutOfRange {
                field: "num_subblocks",
                ..
            })
        ));

        // Subblocks without recon layers read nothing.
        let mut body = vec![5];
        body.extend(leb(&[8, 4]));
        let block = parse_block(&body, &registry, true).unwrap().unwrap();
        assert_eq!(block.subblocks.len(), 2);
        assert_eq!(block.subblocks[1].duration(), 4);
    }

    #[test]
    fn merge_requires_same_kind() {
        let mut scope = ParamScope::new(&[]);
        let bytes = def_bytes(5, 0, &[0xc0, 0x07, 0xc0, 0x07]);
        parse_def(&mut scope, &bytes, ParamKind::MixGain).unwrap();

        let err = parse_def(&mut scope, &bytes, ParamKind::Demixing).unwrap_err();
        assert!(matches!(
            err,
            IamfError::InconsistentParameter {
                parameter_id: 5,
                reason: "param_definition_type"
            }
        ));
    }

    #[test]
    fn merge_same_definition_is_idempotent() {
        let mut scope = ParamScope::new(&[]);
        let bytes = def_bytes(5, 0, &[0xc0, 0x07, 0xc0, 0x07]);
        let a = parse_def(&mut scope, &bytes, ParamKind::MixGain).unwrap();
        let b = parse_def(&mut scope, &bytes, ParamKind::MixGain).unwrap();
        assert_eq!(a, b);
        assert_eq!(scope.pending.len(), 1);
    }

    #[test]
    fn merge_requires_same_mode_and_count() {
        let mut scope = ParamScope::new(&[]);
        let bytes = def_bytes(5, 0, &[0xc0, 0x07, 0xc0, 0x07]);
        parse_def(&mut scope, &bytes, ParamKind::MixGain).unwrap();

        let extern_timed = def_bytes(5, 1, &[]);
        assert!(matches!(
            parse_def(&mut scope, &extern_timed, ParamKind::MixGain),
            Err(IamfError::InconsistentParameter {
                reason: "param_definition_mode",
                ..
            })
        ));

        // 960 / 480 gives two subblocks where one was defined.
        let two = def_bytes(5, 0, &[0xc0, 0x07, 0xe0, 0x03]);
        assert!(matches!(
            parse_def(&mut scope, &two, ParamKind::MixGain),
            Err(IamfError::InconsistentParameter {
                reason: "num_subblocks",
                ..
            })
        ));
    }

    #[test]
    fn merge_against_known_definitions() {
        let known = vec![ParamDefinition::new(9.into(), ParamKind::ReconGain, 48000, 960)];
        let mut scope = ParamScope::new(&known);
        let bytes = def_bytes(9, 0, &[0xc0, 0x07, 0xc0, 0x07]);
        assert!(parse_def(&mut scope, &bytes, ParamKind::MixGain).is_err());
        assert!(parse_def(&mut scope, &bytes, ParamKind::ReconGain).is_ok());
    }

    #[test]
    fn definition_write_roundtrip() {
        let mut def = ParamDefinition::new(3.into(), ParamKind::Demixing, 48000, 30);
        def.constant_subblock_duration = 0;
        def.subblocks = vec![
            Subblock::Demixing {
                duration: 10,
                dmixp_mode: 2,
            },
            Subblock::Demixing {
                duration: 20,
                dmixp_mode: 5,
            },
        ];

        let mut w = BitWriter::new();
        def.write_definition(&mut w).unwrap();
        let bytes = w.into_vec();

        let mut scope = ParamScope::new(&[]);
        let parsed = parse_def(&mut scope, &bytes, ParamKind::Demixing).unwrap();
        assert_eq!(parsed, def);
    }

    #[test]
    fn inconsistent_timeline_is_rejected_on_write() {
        let mut def = ParamDefinition::new(3.into(), ParamKind::MixGain, 48000, 960);
        def.constant_subblock_duration = 480;
        let mut w = BitWriter::new();
        assert!(matches!(
            def.write_definition(&mut w),
            Err(IamfError::InvalidModel(_))
        ));
    }

    #[test]
    fn recon_gain_flags() {
        // Slots 0 and 2 only.
        let data = [0b0000_0101, 10, 20];
        let mut r = BitReader::new(&data, "test");
        let mut gains = [0; RECON_GAIN_CHANNELS];
        read_recon_gain(&mut r, &mut gains).unwrap();
        assert_eq!(gains[..3], [10, 0, 20]);

        // Slots 1 and 11 via the escape bit. Bit 12 lives in the second leb byte.
        let mut expected = [0; RECON_GAIN_CHANNELS];
        expected[1] = 7;
        expected[11] = 9;
        let mut w = BitWriter::new();
        write_recon_gain(&expected, &mut w);
        let data = w.into_vec();
        assert_eq!(data, vec![0x82, 0x21, 7, 9]);

        let mut r = BitReader::new(&data, "test");
        let mut gains = [0; RECON_GAIN_CHANNELS];
        read_recon_gain(&mut r, &mut gains).unwrap();
        assert_eq!(gains, expected);
    }

    #[test]
    fn animation_parse() {
        let data = [2, 0xff, 0x00, 0x01, 0x00, 0x00, 0x80, 64];
        let mut r = BitReader::new(&data, "test");
        assert_eq!(
            Animation::parse(&mut r).unwrap(),
            Animation::Bezier {
                start: Rational::from_q8(-256),
                end: Rational::from_q8(256),
                control: Rational::from_q8(128),
                control_relative_time: 64,
            }
        );

        let mut r = BitReader::new(&[3, 0, 0], "test");
        assert!(matches!(
            Animation::parse(&mut r),
            Err(IamfError::OutOfRange {
                field: "animation_type",
                ..
            })
        ));
    }
}
