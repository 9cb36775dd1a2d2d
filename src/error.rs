use std::collections::TryReserveError;
use std::io;

use thiserror::Error;

use crate::obu::ObuType;

/// Errors produced while reading or writing IAMF streams.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IamfError {
    /// A leb128 value carried payload bits outside the 32 bit window.
    #[error("leb128 value overflows 32 bits")]
    Leb128Overflow,

    /// The 8th leb128 byte still had the continuation bit set.
    #[error("leb128 value longer than 8 bytes")]
    Leb128TooLong,

    /// Input ended in the middle of a field.
    #[error("truncated input while reading {0}")]
    Truncated(&'static str),

    /// Sequence header without the `iamf` magic.
    #[error("bad sequence header magic: {0:02x?}")]
    BadMagic([u8; 4]),

    /// An id that must be unique was registered twice.
    #[error("duplicate {kind} id {id}")]
    DuplicateId {
        /// What kind of object the id identifies.
        kind: &'static str,
        /// The offending id.
        id: u32,
    },

    /// A reference to an object that is not registered.
    #[error("unknown {kind} id {id}")]
    UnknownReference {
        /// What kind of object was referenced.
        kind: &'static str,
        /// The referenced id.
        id: u32,
    },

    /// A parameter id was redefined with a different shape.
    #[error("inconsistent parameter definition {parameter_id}: {reason}")]
    InconsistentParameter {
        /// The parameter id.
        parameter_id: u32,
        /// Which property disagrees.
        reason: &'static str,
    },

    /// A field value is outside its allowed range.
    #[error("{field} out of range: {value}")]
    OutOfRange {
        /// The field name.
        field: &'static str,
        /// The value read.
        value: u64,
    },

    /// An OBU body had bytes left after parsing (strict mode only).
    #[error("{remaining} bytes left unread in {obu:?} OBU")]
    Underread {
        /// The OBU type being parsed.
        obu: ObuType,
        /// Number of unread bytes.
        remaining: usize,
    },

    /// Other malformed input.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// An allocation sized from the input could not be satisfied.
    #[error("out of memory: {0}")]
    OutOfMemory(#[from] TryReserveError),

    /// Errors from the underlying reader or writer.
    #[error("{0}")]
    Io(#[from] io::Error),

    /// Something the writer can't express.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    /// The model handed to the writer or registry breaks an invariant.
    #[error("invalid model: {0}")]
    InvalidModel(String),
}

impl IamfError {
    /// Whether the error stems from malformed input data.
    pub fn is_invalid_data(&self) -> bool {
        use IamfError::*;
        match self {
            Leb128Overflow
            | Leb128TooLong
            | Truncated(_)
            | BadMagic(_)
            | DuplicateId { .. }
            | UnknownReference { .. }
            | InconsistentParameter { .. }
            | OutOfRange { .. }
            | Underread { .. }
            | InvalidData(_) => true,
            OutOfMemory(_) | Io(_) | Unsupported(_) | InvalidModel(_) => false,
        }
    }
}
