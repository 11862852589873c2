//! Server-to-client WebSocket framing (RFC 6455 section 5.2).
//!
//! Only what the server sends is encoded: single-fragment text frames and
//! an empty close frame. Server frames are never masked. Client frames are
//! never decoded, only scanned for a close.

/// FIN bit, set on every frame since nothing is fragmented.
const FIN: u8 = 0x80;

pub(crate) const OPCODE_TEXT: u8 = 0x1;
pub(crate) const OPCODE_CLOSE: u8 = 0x8;

/// Payload lengths at or above this use the 16-bit extended length.
const EXTENDED_16: usize = 126;

/// Encode a single unmasked frame.
pub(crate) fn encode_frame(opcode: u8, payload: &[u8]) -> Vec<u8> {
    let len = payload.len();
    let mut frame = Vec::with_capacity(payload.len() + 10);
    frame.push(FIN | opcode);

    if let Ok(short) = u8::try_from(len)
        && usize::from(short) < EXTENDED_16
    {
        frame.push(short);
    } else if let Ok(len) = u16::try_from(len) {
        frame.push(126);
        frame.extend_from_slice(&len.to_be_bytes());
    } else {
        frame.push(127);
        frame.extend_from_slice(&u64::try_from(len).unwrap_or(u64::MAX).to_be_bytes());
    }

    frame.extend_from_slice(payload);
    frame
}

/// Encode a text frame carrying `payload`.
pub(crate) fn encode_text(payload: &str) -> Vec<u8> {
    encode_frame(OPCODE_TEXT, payload.as_bytes())
}

/// Encode a close frame without a status code.
pub(crate) fn encode_close() -> Vec<u8> {
    encode_frame(OPCODE_CLOSE, &[])
}

/// Follows frame boundaries in the client's byte stream, skipping payloads
/// without buffering them, to spot a close frame.
#[derive(Debug, Default)]
pub(crate) struct InboundScanner {
    header: Vec<u8>,
    skip: u64,
}

impl InboundScanner {
    /// Consume bytes read from the client. Returns `true` once a close
    /// frame header has been seen.
    pub(crate) fn feed(&mut self, mut bytes: &[u8]) -> bool {
        loop {
            if self.skip > 0 {
                let available = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
                let n = self.skip.min(available);
                self.skip -= n;
                bytes = &bytes[usize::try_from(n).unwrap_or(bytes.len())..];
            }

            let Some((&byte, rest)) = bytes.split_first() else {
                return false;
            };
            bytes = rest;
            self.header.push(byte);

            if let Some((opcode, payload_len)) = parse_header(&self.header) {
                self.header.clear();
                if opcode == OPCODE_CLOSE {
                    return true;
                }
                self.skip = payload_len;
            }
        }
    }
}

/// Opcode and payload length of a complete frame header, `None` while
/// more header bytes are needed.
fn parse_header(header: &[u8]) -> Option<(u8, u64)> {
    let (&first, rest) = header.split_first()?;
    let (&second, rest) = rest.split_first()?;

    let mask_len = if second & 0x80 == 0 { 0 } else { 4 };
    let (payload_len, extended_len) = match second & 0x7F {
        126 => (
            u64::from(u16::from_be_bytes(rest.get(..2)?.try_into().ok()?)),
            2,
        ),
        127 => (u64::from_be_bytes(rest.get(..8)?.try_into().ok()?), 8),
        short => (u64::from(short), 0),
    };

    (rest.len() >= extended_len + mask_len).then_some((first & 0x0F, payload_len))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(len: usize) -> String {
        "x".repeat(len)
    }

    #[test]
    fn test_short_payload_single_length_byte() {
        let frame = encode_text(&payload(10));

        assert_eq!(frame[0], 0x81);
        assert_eq!(frame[1], 10);
        assert_eq!(frame.len(), 2 + 10);
    }

    #[test]
    fn test_medium_payload_two_byte_length() {
        let frame = encode_text(&payload(200));

        assert_eq!(frame[0], 0x81);
        assert_eq!(frame[1], 126);
        assert_eq!(&frame[2..4], &200u16.to_be_bytes());
        assert_eq!(frame.len(), 4 + 200);
    }

    #[test]
    fn test_large_payload_eight_byte_length() {
        let frame = encode_text(&payload(100_000));

        assert_eq!(frame[0], 0x81);
        assert_eq!(frame[1], 127);
        assert_eq!(&frame[2..10], &100_000u64.to_be_bytes());
        assert_eq!(frame.len(), 10 + 100_000);
    }

    #[test]
    fn test_length_boundaries() {
        assert_eq!(encode_text(&payload(125))[1], 125);
        assert_eq!(encode_text(&payload(126))[1], 126);
        assert_eq!(encode_text(&payload(65_535))[1], 126);
        assert_eq!(encode_text(&payload(65_536))[1], 127);
    }

    #[test]
    fn test_server_frames_are_unmasked() {
        for len in [0, 10, 200, 100_000] {
            assert_eq!(encode_text(&payload(len))[1] & 0x80, 0);
        }
    }

    #[test]
    fn test_payload_follows_header() {
        let frame = encode_text(r#"{"type":"ping"}"#);
        assert_eq!(&frame[2..], br#"{"type":"ping"}"#);
    }

    /// A masked client frame with an all-zero mask.
    fn client_frame(opcode: u8, payload: &[u8]) -> Vec<u8> {
        let unmasked = encode_frame(opcode, payload);
        let header_len = unmasked.len() - payload.len();

        let mut frame = unmasked[..header_len].to_vec();
        frame[1] |= 0x80;
        frame.extend_from_slice(&[0u8; 4]);
        frame.extend_from_slice(payload);
        frame
    }

    #[test]
    fn test_scanner_spots_close() {
        let mut scanner = InboundScanner::default();
        assert!(scanner.feed(&client_frame(OPCODE_CLOSE, &[0x03, 0xE8])));
    }

    #[test]
    fn test_scanner_skips_payloads() {
        let mut scanner = InboundScanner::default();
        // Payload bytes that look like a close header
        let text = client_frame(OPCODE_TEXT, &[0x88, 0x80, 0x88, 0x00]);
        let long = client_frame(OPCODE_TEXT, &[0x88; 300]);

        assert!(!scanner.feed(&text));
        assert!(!scanner.feed(&long));
        assert!(!scanner.feed(&client_frame(0x9, b"ping")));
        assert!(scanner.feed(&client_frame(OPCODE_CLOSE, &[])));
    }

    #[test]
    fn test_scanner_handles_split_reads() {
        let mut scanner = InboundScanner::default();
        let mut bytes = client_frame(OPCODE_TEXT, &[0x88; 200]);
        bytes.extend(client_frame(OPCODE_CLOSE, &[]));

        let (head, tail) = bytes.split_at(3);
        assert!(!scanner.feed(head));
        let (middle, last) = tail.split_at(tail.len() - 3);
        assert!(!scanner.feed(middle));
        assert!(scanner.feed(last));
    }

    #[test]
    fn test_close_frame() {
        assert_eq!(encode_close(), vec![0x88, 0x00]);
    }
}
