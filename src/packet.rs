use serde::{Deserialize, Serialize};

use crate::id::SubstreamId;
use crate::param::ParamDefinition;

/// Samples to drop from a decoded frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trim {
    /// Samples to drop at the end.
    pub skip_samples: u32,
    /// Samples to drop at the start.
    pub discard_padding: u32,
}

/// One coded audio frame of a substream.
///
/// Parameter values in effect for the frame are attached as snapshots of
/// the latest parameter block of each kind since the last temporal
/// delimiter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// Stream the frame belongs to, see [`crate::Substream::stream_index`].
    pub stream_index: usize,
    /// Substream id the frame was carried with.
    pub substream_id: SubstreamId,
    /// Coded frame.
    pub data: Vec<u8>,
    /// Trimming, if the frame carried any.
    pub trim: Option<Trim>,
    /// Mix gain values.
    pub mix_gain: Option<ParamDefinition>,
    /// Demixing values.
    pub demixing: Option<ParamDefinition>,
    /// Recon gain values.
    pub recon_gain: Option<ParamDefinition>,
}

impl Packet {
    /// A packet of `data` for a substream.
    pub fn new(stream_index: usize, substream_id: SubstreamId, data: Vec<u8>) -> Self {
        Packet {
            stream_index,
            substream_id,
            data,
            ..Default::default()
        }
    }
}
