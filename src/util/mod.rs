use crate::error::IamfError;
use crate::obu::ObuType;

mod bitstream;
pub(crate) use bitstream::{BitReader, BitWriter};

/// Check that an OBU body was fully consumed.
///
/// Leftover bytes are logged, or an error in strict mode.
pub(crate) fn check_underread(
    r: &BitReader<'_>,
    obu: ObuType,
    strict: bool,
) -> Result<(), IamfError> {
    let remaining = r.bytes_left();
    if remaining == 0 {
        return Ok(());
    }
    if strict {
        error!("Underread in {:?} OBU, {} bytes left", obu, remaining);
        return Err(IamfError::Underread { obu, remaining });
    }
    warn!("Underread in {:?} OBU, {} bytes left", obu, remaining);
    Ok(())
}
