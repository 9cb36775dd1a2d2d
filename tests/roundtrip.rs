use iamf::layout::SoundSystem;
use iamf::*;

mod common;
use common::*;

const FRAME_SIZE: u32 = 960;

fn opus_config() -> CodecConfig {
    let mut head = b"OpusHead".to_vec();
    // version, channels, pre-skip, input rate, output gain, mapping family
    head.extend_from_slice(&[1, 2, 0x38, 0x01, 0x80, 0xbb, 0, 0, 0, 0, 0]);

    CodecConfig {
        id: 7.into(),
        codec: Codec::Opus,
        frame_size: FRAME_SIZE,
        seek_preroll: 3840,
        sample_rate: 48000,
        decoder_config: head,
    }
}

fn extern_timed(id: u32, kind: ParamKind) -> ParamDefinition {
    let mut def = ParamDefinition::new(id.into(), kind, 48000, FRAME_SIZE);
    def.self_timed = false;
    def.subblocks = vec![];
    def
}

/// Stereo base layer plus a 5.1 layer with recon gain.
fn channel_element(config: &CodecConfig) -> AudioElement {
    let mut top = Layer::scalable(2, 2, 1);
    top.recon_gain_present = true;
    top.output_gain = Some(OutputGain {
        flags: 0b10_0000,
        gain: Rational::from_q8(-512),
    });

    AudioElement {
        id: 1.into(),
        element_type: AudioElementType::Channel,
        codec_config: config.id,
        substreams: (0..3_u32).map(|i| Substream::new(i.into(), config)).collect(),
        layers: vec![Layer::scalable(1, 1, 1), top],
        demixing_info: Some(ParamDefinition::new(
            10.into(),
            ParamKind::Demixing,
            48000,
            FRAME_SIZE,
        )),
        recon_gain_info: Some(extern_timed(11, ParamKind::ReconGain)),
        default_w: 5,
    }
}

/// First order ambisonics, one mono substream per channel.
fn scene_element(config: &CodecConfig) -> AudioElement {
    AudioElement {
        id: 2.into(),
        element_type: AudioElementType::Scene,
        codec_config: config.id,
        substreams: (20..24_u32).map(|i| Substream::new(i.into(), config)).collect(),
        layers: vec![Layer::ambisonics_mono(&[0, 1, 2, 3], 4)],
        demixing_info: None,
        recon_gain_info: None,
        default_w: 0,
    }
}

fn annotated(text: &str) -> Annotations {
    let mut a = Annotations::new();
    a.insert("en-us", text);
    a
}

fn mix_presentation() -> MixPresentation {
    let element = |id: u32, param: u32, text: &str| SubmixElement {
        audio_element: id.into(),
        annotations: annotated(text),
        headphones_rendering_mode: HeadphonesMode::Binaural,
        element_mix_config: ParamDefinition::new(param.into(), ParamKind::MixGain, 48000, FRAME_SIZE),
        default_mix_gain: Rational::from_q8(-256),
    };

    let stereo = SubmixLayout {
        layout_type: LayoutType::Loudspeakers,
        sound_system: Some(SoundSystem::A0_2_0),
        integrated_loudness: Rational::from_q8(-6144),
        digital_peak: Rational::from_q8(-256),
        true_peak: Some(Rational::from_q8(-128)),
        anchored_loudness: [None, Some(Rational::from_q8(-6400)), None],
    };
    let binaural = SubmixLayout {
        layout_type: LayoutType::Binaural,
        sound_system: None,
        integrated_loudness: Rational::from_q8(-5888),
        digital_peak: Rational::ZERO,
        true_peak: None,
        anchored_loudness: [None; 3],
    };

    MixPresentation {
        id: 42.into(),
        language_labels: vec!["en-us".into()],
        annotations: annotated("Main mix"),
        submixes: vec![Submix {
            elements: vec![element(1, 20, "Bed"), element(2, 21, "Scene")],
            layouts: vec![stereo, binaural],
            output_mix_config: ParamDefinition::new(22.into(), ParamKind::MixGain, 48000, FRAME_SIZE),
            default_mix_gain: Rational::ZERO,
        }],
    }
}

fn registry() -> Result<Registry, IamfError> {
    let config = opus_config();

    let mut registry = Registry::new();
    registry.add_codec_config(config.clone())?;
    registry.add_audio_element(channel_element(&config))?;
    registry.add_audio_element(scene_element(&config))?;
    registry.add_mix_presentation(mix_presentation())?;

    Ok(registry)
}

/// Values for the parameters of the first temporal unit.
fn parameters(registry: &Registry) -> (ParamDefinition, ParamDefinition, ParamDefinition) {
    let mut mix_gain = registry
        .param_definition(20.into())
        .expect("mix gain defined")
        .clone();
    mix_gain.subblocks = vec![Subblock::MixGain {
        duration: FRAME_SIZE,
        animation: Animation::Linear {
            start: Rational::ZERO,
            end: Rational::from_q8(-768),
        },
    }];

    let mut demixing = registry
        .param_definition(10.into())
        .expect("demixing defined")
        .clone();
    demixing.subblocks = vec![Subblock::Demixing {
        duration: FRAME_SIZE,
        dmixp_mode: 3,
    }];

    let mut recon_gain = registry
        .param_definition(11.into())
        .expect("recon gain defined")
        .clone();
    let mut table = [[0; RECON_GAIN_CHANNELS]; MAX_LAYERS];
    table[1][0] = 200;
    table[1][4] = 50;
    table[1][9] = 255;
    recon_gain.subblocks = vec![Subblock::ReconGain {
        duration: FRAME_SIZE,
        recon_gain: table,
    }];

    (mix_gain, demixing, recon_gain)
}

#[test]
pub fn registry_survives_mux_and_demux() -> Result<(), IamfError> {
    init_log();

    let mut registry = registry()?;
    assert_eq!(registry.stream_count(), 7);
    assert_eq!(registry.param_definitions().len(), 5);

    let (mix_gain, demixing, recon_gain) = parameters(&registry);

    let mut muxer = Muxer::new(vec![], registry.clone());
    muxer.write_header()?;

    let mut sent = vec![];

    muxer.write_temporal_delimiter()?;
    for s in registry.substreams() {
        let mut packet = Packet::new(s.stream_index, s.id, vec![s.stream_index as u8; 3]);
        packet.mix_gain = Some(mix_gain.clone());
        packet.demixing = Some(demixing.clone());
        packet.recon_gain = Some(recon_gain.clone());
        muxer.write_packet(&packet)?;
        sent.push(packet);
    }

    muxer.write_temporal_delimiter()?;
    for s in registry.substreams() {
        let mut packet = Packet::new(s.stream_index, s.id, vec![0xaa, s.stream_index as u8]);
        if s.stream_index == 6 {
            packet.trim = Some(Trim {
                skip_samples: 0,
                discard_padding: 100,
            });
        }
        muxer.write_packet(&packet)?;
        sent.push(packet);
    }

    muxer.flush()?;
    let data = muxer.into_inner();

    assert_eq!(probe(&data), PROBE_SCORE_EXTENSION + 1);

    let demuxer = Demuxer::open(&data[..], DemuxerConfig::new().set_strict(true))?;

    // Two audio elements.
    registry.set_sequence_header(SequenceHeader {
        primary_profile: 1,
        additional_profile: 1,
    });
    assert_eq!(demuxer.registry(), &registry);

    let received: Vec<_> = demuxer.collect::<Result<_, _>>()?;
    assert_eq!(received, sent);

    Ok(())
}

#[test]
pub fn element_mix_gain_is_linked_to_its_element() -> Result<(), IamfError> {
    init_log();

    let registry = registry()?;

    let linked: Vec<_> = registry
        .param_definitions()
        .iter()
        .map(|p| (*p.parameter_id, p.audio_element.map(|e| *e)))
        .collect();

    assert_eq!(
        linked,
        vec![
            (10, Some(1)),
            (11, Some(1)),
            (20, Some(1)),
            (21, Some(2)),
            (22, None)
        ]
    );

    Ok(())
}

#[test]
pub fn stream_of_pcm_frames() -> Result<(), IamfError> {
    init_log();

    let config = pcm_config(0, 4);
    let mut registry = Registry::new();
    registry.add_codec_config(config.clone())?;
    registry.add_audio_element(AudioElement {
        id: 0.into(),
        element_type: AudioElementType::Channel,
        codec_config: 0.into(),
        substreams: vec![Substream::new(0.into(), &config)],
        layers: vec![Layer::scalable(1, 1, 1)],
        demixing_info: None,
        recon_gain_info: None,
        default_w: 0,
    })?;

    let mut muxer = Muxer::new(vec![], registry);
    muxer.write_header()?;
    for i in 0..10_u8 {
        muxer.write_temporal_delimiter()?;
        muxer.write_packet(&Packet::new(0, 0.into(), vec![i; 16]))?;
    }
    let data = muxer.into_inner();

    let mut demuxer = Demuxer::open(&data[..], DemuxerConfig::new())?;
    assert_eq!(
        demuxer.registry().sequence_header(),
        Some(&SequenceHeader {
            primary_profile: 0,
            additional_profile: 0
        })
    );

    let mut n = 0;
    while let Some(packet) = demuxer.read_packet()? {
        assert_eq!(packet.data, vec![n; 16]);
        n += 1;
    }
    assert_eq!(n, 10);

    Ok(())
}
