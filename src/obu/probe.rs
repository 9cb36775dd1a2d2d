use super::{ObuHeader, ObuType};

/// Score for a certain match.
pub const PROBE_SCORE_MAX: u8 = 100;

/// Score for a match as good as a file extension.
pub const PROBE_SCORE_EXTENSION: u8 = 50;

const MAGIC: &[u8; 4] = b"iamf";

/// Guess whether `buf`, the start of some input, is an IAMF OBU stream.
///
/// Returns 0 for no match, [`PROBE_SCORE_EXTENSION`] when a sequence header
/// is followed by descriptor OBUs that end exactly at the end of the buffer,
/// and one more than that once an audio frame is seen after the sequence
/// header. A header or body cut off by the end of the buffer is no match.
pub fn probe(buf: &[u8]) -> u8 {
    let mut in_sequence = false;
    let mut confirmed = false;
    let mut pos = 0;

    while pos < buf.len() {
        let header = match ObuHeader::parse(&buf[pos..]) {
            Ok(v) => v,
            Err(e) => {
                trace!("Probe failed at {}: {}", pos, e);
                return 0;
            }
        };

        match header.obu_type {
            ObuType::SequenceHeader => {
                let body = &buf[(pos + header.header_len).min(buf.len())..];
                if !body.starts_with(MAGIC) {
                    return 0;
                }
                in_sequence = true;
            }
            ObuType::CodecConfig
            | ObuType::AudioElement
            | ObuType::MixPresentation
            | ObuType::ParameterBlock
            | ObuType::TemporalDelimiter => {
                if !in_sequence {
                    return 0;
                }
                confirmed = true;
            }
            ObuType::AudioFrame | ObuType::AudioFrameId(_) => {
                if !in_sequence {
                    return 0;
                }
                return PROBE_SCORE_EXTENSION + 1;
            }
            ObuType::Reserved(_) => return 0,
        }

        pos += header.total_len();
    }

    if confirmed && pos == buf.len() {
        PROBE_SCORE_EXTENSION
    } else {
        trace!("Probe ran out of data at {} of {}", pos, buf.len());
        0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const SEQ: [u8; 8] = [31 << 3, 6, b'i', b'a', b'm', b'f', 0, 0];

    #[test]
    fn empty_is_no_match() {
        assert_eq!(probe(&[]), 0);
    }

    #[test]
    fn wrong_magic() {
        let mut buf = SEQ;
        buf[2] = b'x';
        assert_eq!(probe(&buf), 0);
    }

    #[test]
    fn sequence_header_alone_is_not_enough() {
        assert_eq!(probe(&SEQ), 0);
    }

    #[test]
    fn descriptors_after_sequence_header() {
        let mut buf = SEQ.to_vec();
        buf.extend_from_slice(&[4 << 3, 0]);
        assert_eq!(probe(&buf), PROBE_SCORE_EXTENSION);
    }

    #[test]
    fn audio_frame_after_sequence_header() {
        let mut buf = SEQ.to_vec();
        buf.extend_from_slice(&[4 << 3, 0, 6 << 3, 2, 0xaa, 0xbb]);
        assert_eq!(probe(&buf), PROBE_SCORE_EXTENSION + 1);
    }

    #[test]
    fn audio_frame_before_sequence_header() {
        assert_eq!(probe(&[6 << 3, 1, 0xaa]), 0);
    }

    #[test]
    fn cut_off_header_is_no_match() {
        let mut buf = SEQ.to_vec();
        buf.extend_from_slice(&[4 << 3, 0]);
        assert_eq!(probe(&buf), PROBE_SCORE_EXTENSION);

        // Type byte of a third OBU without its size.
        buf.push(0x00);
        assert_eq!(probe(&buf), 0);
    }

    #[test]
    fn cut_off_body_is_no_match() {
        let mut buf = SEQ.to_vec();
        // Codec config OBU, type 0.
        buf.extend_from_slice(&[0, 5, 0, b'i', b'p']);
        assert_eq!(probe(&buf), 0);

        buf.extend_from_slice(&[b'c', b'm']);
        assert_eq!(probe(&buf), PROBE_SCORE_EXTENSION);
    }

    #[test]
    fn malformed_leb_is_no_match() {
        let mut buf = SEQ.to_vec();
        buf.push(4 << 3);
        buf.extend_from_slice(&[0x80; 9]);
        assert_eq!(probe(&buf), 0);
    }
}
