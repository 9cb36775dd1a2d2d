#![allow(unused)]
use std::sync::Once;

use iamf::obu::leb128::write_leb128;
use iamf::*;

pub fn init_log() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    static START: Once = Once::new();

    START.call_once(|| {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(env_filter)
            .init();
    });
}

/// A whole OBU with no flags set.
pub fn obu(obu_type: u8, body: &[u8]) -> Vec<u8> {
    let mut v = vec![obu_type << 3];
    write_leb128(body.len() as u32, &mut v);
    v.extend_from_slice(body);
    v
}

pub fn sequence_header() -> Vec<u8> {
    obu(31, b"iamf\x00\x00")
}

pub fn temporal_delimiter() -> Vec<u8> {
    obu(4, &[])
}

/// ipcm codec config, 16 bit little endian at 48kHz.
pub fn ipcm_config(id: u8, frame_size: u8) -> Vec<u8> {
    obu(
        0,
        &[
            id, b'i', b'p', b'c', b'm', frame_size, 0, 0, 1, 16, 0, 0, 0xbb, 0x80,
        ],
    )
}

/// Channel audio element with a single stereo layer.
pub fn stereo_element(id: u8, codec_config: u8, substream: u8) -> Vec<u8> {
    obu(
        1,
        &[id, 0x00, codec_config, 1, substream, 0, 1 << 5, 1 << 4, 1, 1],
    )
}

/// Audio frame with the substream id in the OBU type.
pub fn frame(substream: u8, data: &[u8]) -> Vec<u8> {
    obu(6 + substream, data)
}

pub fn pcm_config(id: u32, frame_size: u32) -> CodecConfig {
    CodecConfig {
        id: id.into(),
        codec: Codec::PcmS16Le,
        frame_size,
        seek_preroll: 0,
        sample_rate: 48000,
        decoder_config: vec![],
    }
}
