use std::io::Read;

use crate::demux::Demuxer;
use crate::error::IamfError;

/// Largest OBU the format allows.
pub const DEFAULT_MAX_OBU_SIZE: usize = i32::MAX as usize;

/// Customized config for creating a [`Demuxer`].
///
/// ```no_run
/// use std::fs::File;
/// use iamf::DemuxerConfig;
///
/// let file = File::open("audio.iamf").unwrap();
/// let demuxer = DemuxerConfig::new()
///     .set_strict(true)
///     .build(file)
///     .unwrap();
/// ```
///
/// Configs implement [`Clone`] to help create multiple `Demuxer` instances.
#[derive(Debug, Clone)]
pub struct DemuxerConfig {
    pub(crate) strict: bool,
    pub(crate) max_obu_size: usize,
}

impl DemuxerConfig {
    /// Creates a new default config.
    pub fn new() -> Self {
        DemuxerConfig::default()
    }

    /// Whether strict mode is on.
    pub fn strict(&self) -> bool {
        self.strict
    }

    /// Toggle strict mode.
    ///
    /// In strict mode, bytes left unread at the end of an OBU are an error
    /// instead of a warning.
    ///
    /// Defaults to `false`.
    pub fn set_strict(mut self, enabled: bool) -> Self {
        self.strict = enabled;
        self
    }

    /// Largest OBU accepted, header included.
    pub fn max_obu_size(&self) -> usize {
        self.max_obu_size
    }

    /// Set the largest OBU accepted. Bigger OBUs fail with
    /// [`IamfError::OutOfRange`] before their body is read.
    ///
    /// Defaults to [`DEFAULT_MAX_OBU_SIZE`].
    pub fn set_max_obu_size(mut self, size: usize) -> Self {
        self.max_obu_size = size;
        self
    }

    /// Create a [`Demuxer`] reading from `reader`.
    ///
    /// This reads the descriptors, see [`Demuxer::open`].
    pub fn build<R: Read>(self, reader: R) -> Result<Demuxer<R>, IamfError> {
        Demuxer::open(reader, self)
    }
}

impl Default for DemuxerConfig {
    fn default() -> Self {
        Self {
            strict: false,
            max_obu_size: DEFAULT_MAX_OBU_SIZE,
        }
    }
}
