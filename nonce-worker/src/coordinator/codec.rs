//! Line-delimited JSON framing for the coordinator link.

use bytes::BytesMut;
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use super::error::LinkError;
use super::messages::WorkerMessage;
use crate::tracing::prelude::*;

/// Longest line accepted from the coordinator.
pub const MAX_LINE_LENGTH: usize = 1 << 20;

/// One JSON document per line in both directions.
///
/// Decoding yields raw JSON values; routing them is the link's job. Lines that
/// are blank, not JSON, or longer than [`MAX_LINE_LENGTH`] are skipped without
/// ending the stream.
pub struct MessageCodec {
    lines: LinesCodec,
}

impl MessageCodec {
    pub fn new() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(MAX_LINE_LENGTH),
        }
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MessageCodec {
    type Item = Value;
    type Error = LinkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Keep consuming lines until one parses or the buffer runs dry, so a
        // bad line doesn't stall the frames queued behind it.
        loop {
            let line = match self.lines.decode(src) {
                Ok(line) => line,
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    // The lines codec discards through the next newline
                    warn!(max = MAX_LINE_LENGTH, "Skipping oversized line");
                    continue;
                }
                Err(LinesCodecError::Io(e)) => return Err(e.into()),
            };

            match line {
                None => return Ok(None),
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => match serde_json::from_str(&line) {
                    Ok(value) => return Ok(Some(value)),
                    Err(e) => {
                        warn!(error = %e, "Skipping line that is not JSON");
                    }
                },
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let line = match self.lines.decode_eof(src) {
                Ok(line) => line,
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    // The lines codec discards through the next newline
                    warn!(max = MAX_LINE_LENGTH, "Skipping oversized line");
                    continue;
                }
                Err(LinesCodecError::Io(e)) => return Err(e.into()),
            };

            match line {
                None => return Ok(None),
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => match serde_json::from_str(&line) {
                    Ok(value) => return Ok(Some(value)),
                    Err(e) => {
                        warn!(error = %e, "Skipping trailing data that is not JSON");
                    }
                },
            }
        }
    }
}

impl Encoder<WorkerMessage> for MessageCodec {
    type Error = LinkError;

    fn encode(&mut self, message: WorkerMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = serde_json::to_string(&message.to_json())?;
        self.lines
            .encode(line, dst)
            .map_err(|e| LinkError::from_lines(e, MAX_LINE_LENGTH))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_skips_garbage_lines() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::from("not json\n\n{\"turboMode\":true}\n{\"start");

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(json!({"turboMode": true})));
        // Partial frame waits for more data
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"Nonce\":1,\"endNonce\":2}\n");
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(json!({"startNonce": 1, "endNonce": 2}))
        );
    }

    #[test]
    fn test_decode_skips_oversized_line() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::from("x".repeat(MAX_LINE_LENGTH + 10).as_str());
        buf.extend_from_slice(b"\n{\"turboMode\":true}\n");

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(json!({"turboMode": true})));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_eof_without_newline() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::from("{\"turboMode\":false}");

        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(
            codec.decode_eof(&mut buf).unwrap(),
            Some(json!({"turboMode": false}))
        );
    }

    #[test]
    fn test_encode_one_message_per_line() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::new();

        codec.encode(WorkerMessage::RangeRequest, &mut buf).unwrap();
        codec.encode(WorkerMessage::RangeRequest, &mut buf).unwrap();

        assert_eq!(&buf[..], b"\"requestRange\"\n\"requestRange\"\n");
    }
}
