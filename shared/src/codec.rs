//! Length-prefixed codec for TCP framing
//!
//! Every frame on the wire is:
//! ```text
//! [ 4 bytes: length (u32, big-endian) ][ N bytes: protobuf Envelope ]
//! ```
//!
//! The prefix preserves message boundaries over the byte stream.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use prost::Message;
use thiserror::Error;

use crate::Envelope;

/// Maximum frame size (1 MB). Fleet control frames are small; anything
/// larger indicates a corrupt or hostile peer.
pub const MAX_FRAME_SIZE: u32 = 1024 * 1024;

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Frame too large: {0} bytes (max: {MAX_FRAME_SIZE})")]
    FrameTooLarge(usize),

    #[error("Invalid frame length prefix: {0}")]
    InvalidLength(u32),

    #[error("Protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Protobuf encode error: {0}")]
    Encode(#[from] prost::EncodeError),
}

/// Encode an Envelope into a length-prefixed byte buffer
pub fn encode(envelope: &Envelope) -> Result<Bytes, CodecError> {
    let msg_len = envelope.encoded_len();

    if msg_len > MAX_FRAME_SIZE as usize {
        return Err(CodecError::FrameTooLarge(msg_len));
    }

    let mut buf = BytesMut::with_capacity(4 + msg_len);
    buf.put_u32(msg_len as u32);
    envelope.encode(&mut buf)?;

    Ok(buf.freeze())
}

/// Try to decode one length-prefixed Envelope from the front of `buf`
///
/// Returns `Ok(None)` if the buffer does not yet hold a complete frame; in
/// that case nothing is consumed.
pub fn decode(buf: &mut BytesMut) -> Result<Option<Envelope>, CodecError> {
    if buf.len() < 4 {
        return Ok(None);
    }

    // Peek at the length prefix without consuming
    let msg_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);

    if msg_len > MAX_FRAME_SIZE {
        return Err(CodecError::InvalidLength(msg_len));
    }

    let total_len = 4 + msg_len as usize;
    if buf.len() < total_len {
        return Ok(None);
    }

    buf.advance(4);
    let msg_bytes = buf.split_to(msg_len as usize);
    let envelope = Envelope::decode(msg_bytes)?;

    Ok(Some(envelope))
}

/// Accumulates stream bytes and yields complete frames
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Add raw bytes read from the transport
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next frame; call repeatedly until `Ok(None)` to
    /// drain all complete frames
    pub fn decode_next(&mut self) -> Result<Option<Envelope>, CodecError> {
        decode(&mut self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{envelope, Header, RegisterRequest};

    fn register_envelope(drone_id: &str) -> Envelope {
        Envelope::new(
            Header::new(drone_id, 1),
            envelope::Payload::Register(RegisterRequest {
                drone_id: drone_id.into(),
            }),
        )
    }

    #[test]
    fn encode_decode_roundtrip() {
        let original = register_envelope("d1");
        let encoded = encode(&original).expect("encode failed");

        let len_prefix = u32::from_be_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]);
        assert_eq!(len_prefix as usize, encoded.len() - 4);

        let mut buf = BytesMut::from(&encoded[..]);
        let decoded = decode(&mut buf).expect("decode failed").expect("no frame");
        assert_eq!(decoded, original);
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_frame_consumes_nothing() {
        let encoded = encode(&register_envelope("d1")).expect("encode failed");

        let mut buf = BytesMut::from(&encoded[..3]);
        assert!(decode(&mut buf).expect("partial data is not an error").is_none());
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn decoder_yields_frames_across_chunks() {
        let encoded = encode(&register_envelope("d1")).expect("encode failed");

        let mut decoder = FrameDecoder::new();
        decoder.extend(&encoded[..5]);
        assert!(decoder.decode_next().expect("decode error").is_none());

        decoder.extend(&encoded[5..]);
        let decoded = decoder
            .decode_next()
            .expect("decode error")
            .expect("should have frame");
        assert_eq!(
            decoded.header.as_ref().unwrap().device_id,
            "d1".to_string()
        );
    }

    #[test]
    fn decoder_drains_back_to_back_frames() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&encode(&register_envelope("a")).unwrap());
        decoder.extend(&encode(&register_envelope("b")).unwrap());

        assert!(decoder.decode_next().expect("decode error").is_some());
        assert!(decoder.decode_next().expect("decode error").is_some());
        assert!(decoder.decode_next().expect("decode error").is_none());
    }

    #[test]
    fn oversized_length_prefix_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32(MAX_FRAME_SIZE + 1);
        buf.put_bytes(0, 16);

        assert!(matches!(
            decode(&mut buf),
            Err(CodecError::InvalidLength(_))
        ));
    }
}
