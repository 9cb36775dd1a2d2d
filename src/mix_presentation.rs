//! Mix Presentation OBU.
//!
//! A mix presentation describes how audio elements are mixed for playback,
//! as one or more submixes, each with the layouts it was loudness measured
//! for.

use serde::{Deserialize, Serialize};

use crate::error::IamfError;
use crate::id::{AudioElementId, MixPresentationId};
use crate::layout::{ChannelLayout, SoundSystem};
use crate::obu::ObuType;
use crate::param::{ParamContext, ParamDefinition, ParamKind, ParamScope};
use crate::rational::Rational;
use crate::registry::Registry;
use crate::util::{check_underread, BitReader, BitWriter};

/// Bytes read for a string, including the NUL.
const MAX_STRING_SIZE: usize = 128;

/// Language tag to text, in insertion order.
///
/// Inserting a tag that is already present keeps the first text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotations(Vec<(String, String)>);

impl Annotations {
    /// Empty annotations.
    pub fn new() -> Self {
        Annotations::default()
    }

    /// Add `text` for `label` unless the label already has one.
    pub fn insert(&mut self, label: impl Into<String>, text: impl Into<String>) {
        let label = label.into();
        if self.get(&label).is_none() {
            self.0.push((label, text.into()));
        }
    }

    /// The text for `label`.
    pub fn get(&self, label: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, t)| t.as_str())
    }

    /// All `(label, text)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(l, t)| (l.as_str(), t.as_str()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// How an element is rendered to headphones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeadphonesMode {
    /// Rendered to stereo loudspeakers.
    Stereo,
    /// Rendered binaurally.
    Binaural,
    /// Not defined yet.
    Reserved(u8),
}

impl HeadphonesMode {
    fn from_wire(v: u8) -> Self {
        match v {
            0 => HeadphonesMode::Stereo,
            1 => HeadphonesMode::Binaural,
            _ => HeadphonesMode::Reserved(v),
        }
    }

    fn wire(&self) -> u8 {
        match self {
            HeadphonesMode::Stereo => 0,
            HeadphonesMode::Binaural => 1,
            HeadphonesMode::Reserved(v) => *v,
        }
    }
}

/// An audio element taking part in a submix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmixElement {
    /// The element.
    pub audio_element: AudioElementId,
    /// Per language label.
    pub annotations: Annotations,
    /// Headphones rendering.
    pub headphones_rendering_mode: HeadphonesMode,
    /// Gain applied to the element before mixing.
    pub element_mix_config: ParamDefinition,
    /// Gain when no parameter block says otherwise, in dB.
    pub default_mix_gain: Rational,
}

/// What a submix layout targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayoutType {
    /// A loudspeaker sound system.
    Loudspeakers,
    /// Binaural headphones.
    Binaural,
}

/// Slots of [`SubmixLayout::anchored_loudness`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnchorElement {
    /// 0
    Unknown,
    /// 1
    Dialogue,
    /// 2
    Album,
}

/// A layout a submix was measured for, with its loudness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmixLayout {
    /// Loudspeakers or binaural.
    pub layout_type: LayoutType,
    /// For loudspeakers, the sound system if the code is known.
    pub sound_system: Option<SoundSystem>,
    /// Integrated loudness in LKFS.
    pub integrated_loudness: Rational,
    /// Digital peak in dBFS.
    pub digital_peak: Rational,
    /// True peak in dBFS.
    pub true_peak: Option<Rational>,
    /// Indexed by [`AnchorElement`].
    pub anchored_loudness: [Option<Rational>; 3],
}

impl SubmixLayout {
    /// The layout played back on.
    pub fn channel_layout(&self) -> Option<ChannelLayout> {
        match self.layout_type {
            LayoutType::Loudspeakers => self.sound_system.map(|s| s.channel_layout()),
            LayoutType::Binaural => Some(ChannelLayout::STEREO),
        }
    }

    /// Anchored loudness for `anchor`.
    pub fn anchored(&self, anchor: AnchorElement) -> Option<Rational> {
        self.anchored_loudness[anchor as usize]
    }
}

/// A mix of audio elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submix {
    /// Elements mixed.
    pub elements: Vec<SubmixElement>,
    /// Layouts with loudness info.
    pub layouts: Vec<SubmixLayout>,
    /// Gain applied to the mix.
    pub output_mix_config: ParamDefinition,
    /// Gain when no parameter block says otherwise, in dB.
    pub default_mix_gain: Rational,
}

/// A mix presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixPresentation {
    /// Unique id.
    pub id: MixPresentationId,
    /// Language tags. Element and presentation annotations come one per label.
    pub language_labels: Vec<String>,
    /// Per language label.
    pub annotations: Annotations,
    /// The submixes.
    pub submixes: Vec<Submix>,
}

impl MixPresentation {
    /// Parse a Mix Presentation OBU body.
    ///
    /// The second value holds parameter definitions to merge into the registry.
    pub(crate) fn parse(
        body: &[u8],
        registry: &Registry,
        strict: bool,
    ) -> Result<(MixPresentation, Vec<ParamDefinition>), IamfError> {
        let mut r = BitReader::new(body, "mix presentation");

        let id = MixPresentationId::from(r.read_leb()?);
        if registry.mix_presentation(id).is_some() {
            return Err(IamfError::DuplicateId {
                kind: "mix presentation",
                id: *id,
            });
        }

        let count_label = r.read_leb()? as usize;
        // Each string is at least its NUL.
        if count_label > r.bytes_left() {
            return Err(IamfError::Truncated("language labels"));
        }

        let mut language_labels = Vec::new();
        language_labels.try_reserve_exact(count_label)?;
        for _ in 0..count_label {
            language_labels.push(read_string(&mut r)?);
        }

        let annotations = read_annotations(&mut r, &language_labels)?;

        let num_submixes = r.read_leb()? as usize;
        if num_submixes > r.bytes_left() {
            return Err(IamfError::Truncated("submixes"));
        }

        let mut scope = ParamScope::new(registry.param_definitions());

        let mut submixes = Vec::new();
        submixes.try_reserve_exact(num_submixes)?;
        for _ in 0..num_submixes {
            submixes.push(parse_submix(&mut r, registry, &mut scope, id, &language_labels)?);
        }

        check_underread(&r, ObuType::MixPresentation, strict)?;

        trace!(
            "Mix presentation {} labels {:?} submixes {}",
            id,
            language_labels,
            submixes.len()
        );

        let mix = MixPresentation {
            id,
            language_labels,
            annotations,
            submixes,
        };

        Ok((mix, scope.pending))
    }

    /// Parameter definitions of the submixes and their elements.
    pub fn param_definitions(&self) -> impl Iterator<Item = &ParamDefinition> {
        self.submixes.iter().flat_map(|s| {
            s.elements
                .iter()
                .map(|e| &e.element_mix_config)
                .chain(std::iter::once(&s.output_mix_config))
        })
    }

    /// Serialize into a Mix Presentation OBU body.
    pub fn write(&self) -> Result<Vec<u8>, IamfError> {
        let mut w = BitWriter::new();

        w.put_leb128(*self.id);
        w.put_leb128(self.language_labels.len() as u32);
        for label in &self.language_labels {
            write_string(label, &mut w)?;
        }
        write_annotations(&self.annotations, &self.language_labels, &mut w)?;

        w.put_leb128(self.submixes.len() as u32);
        for submix in &self.submixes {
            w.put_leb128(submix.elements.len() as u32);

            for e in &submix.elements {
                w.put_leb128(*e.audio_element);
                write_annotations(&e.annotations, &self.language_labels, &mut w)?;
                w.put_bits(2, e.headphones_rendering_mode.wire() as u64);
                w.put_bits(6, 0);
                // No rendering config extension.
                w.put_leb128(0);
                write_mix_gain(&e.element_mix_config, &mut w)?;
                w.put_i16(e.default_mix_gain.to_q8());
            }

            write_mix_gain(&submix.output_mix_config, &mut w)?;
            w.put_i16(submix.default_mix_gain.to_q8());

            w.put_leb128(submix.layouts.len() as u32);
            for l in &submix.layouts {
                write_layout(l, &mut w)?;
            }
        }

        Ok(w.into_vec())
    }
}

fn parse_submix(
    r: &mut BitReader<'_>,
    registry: &Registry,
    scope: &mut ParamScope<'_>,
    mix_id: MixPresentationId,
    language_labels: &[String],
) -> Result<Submix, IamfError> {
    let num_elements = r.read_leb()? as usize;
    if num_elements > r.bytes_left() {
        return Err(IamfError::Truncated("submix elements"));
    }

    let mut elements = Vec::new();
    elements.try_reserve_exact(num_elements)?;

    for _ in 0..num_elements {
        let audio_element = AudioElementId::from(r.read_leb()?);
        let Some(element) = registry.audio_element(audio_element) else {
            error!(
                "Mix presentation {} references unknown audio element {}",
                mix_id, audio_element
            );
            return Err(IamfError::UnknownReference {
                kind: "audio element",
                id: *audio_element,
            });
        };

        let annotations = read_annotations(r, language_labels)?;

        let headphones_rendering_mode = HeadphonesMode::from_wire(r.read_bits(2)? as u8);
        r.skip_bits(6)?;

        let extension_size = r.read_leb()? as usize;
        r.skip_bytes(extension_size)?;

        let ctx = ParamContext {
            audio_element: Some(audio_element),
            frame_size: element.substreams.first().map(|s| s.frame_size),
        };
        let element_mix_config = scope.parse_definition(r, ParamKind::MixGain, ctx)?;
        let default_mix_gain = Rational::from_q8(r.read_i16()?);

        elements.push(SubmixElement {
            audio_element,
            annotations,
            headphones_rendering_mode,
            element_mix_config,
            default_mix_gain,
        });
    }

    let output_mix_config = scope.parse_definition(r, ParamKind::MixGain, ParamContext::default())?;
    let default_mix_gain = Rational::from_q8(r.read_i16()?);

    let num_layouts = r.read_leb()? as usize;
    if num_layouts > r.bytes_left() {
        return Err(IamfError::Truncated("submix layouts"));
    }

    let mut layouts = Vec::new();
    layouts.try_reserve_exact(num_layouts)?;
    for _ in 0..num_layouts {
        layouts.push(parse_layout(r)?);
    }

    Ok(Submix {
        elements,
        layouts,
        output_mix_config,
        default_mix_gain,
    })
}

fn parse_layout(r: &mut BitReader<'_>) -> Result<SubmixLayout, IamfError> {
    let layout_type = r.read_bits(2)?;

    let (layout_type, sound_system) = match layout_type {
        2 => {
            let code = r.read_bits(4)? as u8;
            r.skip_bits(2)?;
            let sound_system = SoundSystem::from_code(code);
            if sound_system.is_none() {
                debug!("Reserved sound system {}", code);
            }
            (LayoutType::Loudspeakers, sound_system)
        }
        3 => {
            r.skip_bits(6)?;
            (LayoutType::Binaural, None)
        }
        _ => {
            return Err(IamfError::OutOfRange {
                field: "layout_type",
                value: layout_type,
            })
        }
    };

    let info_type = r.read_u8()?;
    let integrated_loudness = Rational::from_q8(r.read_i16()?);
    let digital_peak = Rational::from_q8(r.read_i16()?);

    let true_peak = if info_type & 1 != 0 {
        Some(Rational::from_q8(r.read_i16()?))
    } else {
        None
    };

    let mut anchored_loudness = [None; 3];
    if info_type & 2 != 0 {
        let num_anchored = r.read_u8()?;
        for _ in 0..num_anchored {
            let anchor = r.read_u8()? as usize;
            let loudness = Rational::from_q8(r.read_i16()?);
            if (1..=2).contains(&anchor) {
                anchored_loudness[anchor] = Some(loudness);
            }
        }
    }

    if info_type & 0xfc != 0 {
        let size = r.read_leb()? as usize;
        r.skip_bytes(size)?;
    }

    Ok(SubmixLayout {
        layout_type,
        sound_system,
        integrated_loudness,
        digital_peak,
        true_peak,
        anchored_loudness,
    })
}

fn write_layout(l: &SubmixLayout, w: &mut BitWriter) -> Result<(), IamfError> {
    match l.layout_type {
        LayoutType::Loudspeakers => {
            let Some(sound_system) = l.sound_system else {
                return Err(IamfError::InvalidModel(
                    "loudspeaker layout without sound system".into(),
                ));
            };
            w.put_bits(2, 2);
            w.put_bits(4, sound_system.code() as u64);
            w.put_bits(2, 0);
        }
        LayoutType::Binaural => {
            w.put_bits(2, 3);
            w.put_bits(6, 0);
        }
    }

    let anchors: Vec<_> = l
        .anchored_loudness
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|v| (i as u8, v)))
        .collect();

    let mut info_type = 0;
    if l.true_peak.is_some() {
        info_type |= 1;
    }
    if !anchors.is_empty() {
        info_type |= 2;
    }

    w.put_u8(info_type);
    w.put_i16(l.integrated_loudness.to_q8());
    w.put_i16(l.digital_peak.to_q8());

    if let Some(v) = l.true_peak {
        w.put_i16(v.to_q8());
    }

    if !anchors.is_empty() {
        w.put_u8(anchors.len() as u8);
        for (anchor, v) in anchors {
            w.put_u8(anchor);
            w.put_i16(v.to_q8());
        }
    }

    Ok(())
}

fn write_mix_gain(def: &ParamDefinition, w: &mut BitWriter) -> Result<(), IamfError> {
    if def.kind != ParamKind::MixGain {
        return Err(IamfError::InvalidModel(format!(
            "{:?} parameter {} used as mix gain",
            def.kind, def.parameter_id
        )));
    }
    def.write_definition(w)
}

/// A NUL terminated string. At most 128 bytes are read and 127 kept.
fn read_string(r: &mut BitReader<'_>) -> Result<String, IamfError> {
    let mut bytes = Vec::new();

    for i in 0..MAX_STRING_SIZE {
        let b = r.read_u8()?;
        if b == 0 {
            break;
        }
        if i < MAX_STRING_SIZE - 1 {
            bytes.push(b);
        }
    }

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn write_string(s: &str, w: &mut BitWriter) -> Result<(), IamfError> {
    if s.len() >= MAX_STRING_SIZE || s.bytes().any(|b| b == 0) {
        return Err(IamfError::InvalidModel(format!("bad string: {:?}", s)));
    }
    w.put_bytes(s.as_bytes());
    w.put_u8(0);
    Ok(())
}

fn read_annotations(r: &mut BitReader<'_>, labels: &[String]) -> Result<Annotations, IamfError> {
    let mut annotations = Annotations::new();
    for label in labels {
        let text = read_string(r)?;
        annotations.insert(label.clone(), text);
    }
    Ok(annotations)
}

fn write_annotations(
    annotations: &Annotations,
    labels: &[String],
    w: &mut BitWriter,
) -> Result<(), IamfError> {
    for label in labels {
        write_string(annotations.get(label).unwrap_or(""), w)?;
    }
    Ok(())
}
