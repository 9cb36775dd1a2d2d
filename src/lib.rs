//! Reading and writing IAMF (Immersive Audio Model and Formats) streams.
//!
//! An IAMF stream is a sequence of OBUs (Open Bitstream Units). It starts
//! with descriptor OBUs describing the audio:
//!
//! * **Codec configs**, which codec and with what settings.
//! * **Audio elements**, groups of coded substreams forming channel based
//!   layers or an ambisonics scene.
//! * **Mix presentations**, how audio elements are mixed for playback.
//!
//! After the descriptors come the audio frames of every substream, grouped
//! in temporal units and interleaved with parameter blocks carrying time
//! varying mix gain, demixing and recon gain values.
//!
//! This crate does not decode audio. It reads the metadata model into a
//! [`Registry`] and hands out coded frames as [`Packet`]s, or does the
//! reverse.
//!
//! # Reading
//!
//! ```
//! use iamf::{Demuxer, DemuxerConfig};
//!
//! # fn main() -> Result<(), iamf::IamfError> {
//! # let data = example_stream()?;
//! // data holds an IAMF stream, any std::io::Read works.
//! let demuxer = Demuxer::open(&data[..], DemuxerConfig::new())?;
//!
//! let registry = demuxer.registry();
//! assert_eq!(registry.stream_count(), 1);
//!
//! for packet in demuxer {
//!     let packet = packet?;
//!     assert_eq!(packet.stream_index, 0);
//! }
//! # Ok(())
//! # }
//! # fn example_stream() -> Result<Vec<u8>, iamf::IamfError> {
//! #     use iamf::*;
//! #     let config = CodecConfig {
//! #         id: 0.into(),
//! #         codec: Codec::PcmS16Le,
//! #         frame_size: 2,
//! #         seek_preroll: 0,
//! #         sample_rate: 48000,
//! #         decoder_config: vec![],
//! #     };
//! #     let substream = Substream::new(0.into(), &config);
//! #     let mut registry = Registry::new();
//! #     registry.add_codec_config(config)?;
//! #     registry.add_audio_element(AudioElement {
//! #         id: 0.into(),
//! #         element_type: AudioElementType::Channel,
//! #         codec_config: 0.into(),
//! #         substreams: vec![substream],
//! #         layers: vec![Layer::scalable(1, 1, 1)],
//! #         demixing_info: None,
//! #         recon_gain_info: None,
//! #         default_w: 0,
//! #     })?;
//! #     let mut muxer = Muxer::new(vec![], registry);
//! #     muxer.write_header()?;
//! #     muxer.write_temporal_delimiter()?;
//! #     muxer.write_packet(&Packet::new(0, 0.into(), vec![0; 8]))?;
//! #     Ok(muxer.into_inner())
//! # }
//! ```
//!
//! # Writing
//!
//! Build a [`Registry`] by hand, then write it and the packets with a
//! [`Muxer`].
//!
//! ```
//! use iamf::*;
//!
//! # fn main() -> Result<(), IamfError> {
//! let config = CodecConfig {
//!     id: 0.into(),
//!     codec: Codec::PcmS16Le,
//!     frame_size: 2,
//!     seek_preroll: 0,
//!     sample_rate: 48000,
//!     decoder_config: vec![],
//! };
//! let substream = Substream::new(0.into(), &config);
//!
//! let mut registry = Registry::new();
//! registry.add_codec_config(config)?;
//! registry.add_audio_element(AudioElement {
//!     id: 0.into(),
//!     element_type: AudioElementType::Channel,
//!     codec_config: 0.into(),
//!     substreams: vec![substream],
//!     // Stereo, one coupled substream.
//!     layers: vec![Layer::scalable(1, 1, 1)],
//!     demixing_info: None,
//!     recon_gain_info: None,
//!     default_w: 0,
//! })?;
//!
//! let mut muxer = Muxer::new(Vec::new(), registry);
//! muxer.write_header()?;
//! muxer.write_temporal_delimiter()?;
//! muxer.write_packet(&Packet::new(0, 0.into(), vec![0; 8]))?;
//!
//! let data = muxer.into_inner();
//! assert_eq!(probe(&data), PROBE_SCORE_EXTENSION + 1);
//! # Ok(())
//! # }
//! ```
//!
//! # Strictness
//!
//! By default, bytes left over at the end of an OBU body are logged and
//! ignored. [`DemuxerConfig::set_strict`] turns them into errors.

#![forbid(unsafe_code)]
#![allow(clippy::new_without_default)]
#![allow(clippy::manual_range_contains)]
#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod error;
pub use error::IamfError;

mod id;
pub use id::{AudioElementId, CodecConfigId, MixPresentationId, ParameterId, SubstreamId};

mod util;

pub mod obu;
pub use obu::{probe, PROBE_SCORE_EXTENSION, PROBE_SCORE_MAX};

mod rational;
pub use rational::Rational;

pub mod layout;
pub use layout::ChannelLayout;

mod codec_config;
pub use codec_config::{Codec, CodecConfig};

mod param;
pub use param::{Animation, ParamDefinition, ParamKind, ReconGainTable, Subblock};
pub use param::{MAX_LAYERS, MAX_SUBBLOCKS, RECON_GAIN_CHANNELS};

mod audio_element;
pub use audio_element::{AmbisonicsMode, AudioElement, AudioElementType};
pub use audio_element::{Layer, OutputGain, Substream};

mod mix_presentation;
pub use mix_presentation::{AnchorElement, Annotations, HeadphonesMode, LayoutType};
pub use mix_presentation::{MixPresentation, Submix, SubmixElement, SubmixLayout};

mod registry;
pub use registry::{Registry, SequenceHeader, IAMF_MAGIC};

mod packet;
pub use packet::{Packet, Trim};

mod config;
pub use config::{DemuxerConfig, DEFAULT_MAX_OBU_SIZE};

mod demux;
pub use demux::Demuxer;

mod mux;
pub use mux::Muxer;
