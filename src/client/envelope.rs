//! Binary envelope carried in websocket frames
//!
//! Each frame holds exactly one protobuf [`PeerMessage`] behind a
//! variable-length header giving the payload length.
//!
//! Header layout, little endian, the low 2 bits give the header length - 1:
//! - Length <= 0x3F: 1 byte, `(len << 2)`
//! - Length <= 0x3FFF: 2 bytes, `(len << 2) | 0x1`
//! - Length <= 0x3FFFFF: 3 bytes, `(len << 2) | 0x2`
//! - Length <= 0x3FFFFFFF: 4 bytes, `(len << 2) | 0x3`
//!
//! Message schema:
//!
//! ```proto
//! message PeerMessage {
//!   oneof union {
//!     Authenticated authenticated = 1;
//!     AuthRequest auth_request = 2;
//!     MediaEvent media_event = 3;
//!     RtcStatsReport rtc_stats_report = 4;
//!   }
//! }
//! message Authenticated {}
//! message AuthRequest { string token = 1; }
//! message MediaEvent { string data = 1; }
//! message RtcStatsReport { string data = 1; }
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use prost::Message;

use crate::error::{ClientError, Result};

/// Largest payload a header can describe
const MAX_PAYLOAD_LENGTH: usize = 0x3FFF_FFFF;

/// Message exchanged with the engine over the websocket
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PeerMessage {
    #[prost(oneof = "peer_message::Union", tags = "1, 2, 3, 4")]
    pub union: Option<peer_message::Union>,
}

pub mod peer_message {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Union {
        #[prost(message, tag = "1")]
        Authenticated(super::Authenticated),
        #[prost(message, tag = "2")]
        AuthRequest(super::AuthRequest),
        #[prost(message, tag = "3")]
        MediaEvent(super::MediaEvent),
        #[prost(message, tag = "4")]
        RtcStatsReport(super::RtcStatsReport),
    }
}

/// The engine accepted the token
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Authenticated {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AuthRequest {
    #[prost(string, tag = "1")]
    pub token: String,
}

/// Serialized media event
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MediaEvent {
    #[prost(string, tag = "1")]
    pub data: String,
}

/// JSON statistics of the peer connection
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RtcStatsReport {
    #[prost(string, tag = "1")]
    pub data: String,
}

use peer_message::Union;

impl PeerMessage {
    pub fn authenticated() -> Self {
        Self {
            union: Some(Union::Authenticated(Authenticated {})),
        }
    }

    pub fn auth_request(token: impl Into<String>) -> Self {
        Self {
            union: Some(Union::AuthRequest(AuthRequest {
                token: token.into(),
            })),
        }
    }

    pub fn media_event(data: impl Into<String>) -> Self {
        Self {
            union: Some(Union::MediaEvent(MediaEvent { data: data.into() })),
        }
    }

    pub fn rtc_stats_report(data: impl Into<String>) -> Self {
        Self {
            union: Some(Union::RtcStatsReport(RtcStatsReport { data: data.into() })),
        }
    }

    pub fn name(&self) -> &'static str {
        match &self.union {
            Some(Union::Authenticated(_)) => "authenticated",
            Some(Union::AuthRequest(_)) => "authRequest",
            Some(Union::MediaEvent(_)) => "mediaEvent",
            Some(Union::RtcStatsReport(_)) => "rtcStatsReport",
            None => "empty",
        }
    }
}

/// Encode a message into one frame
pub fn encode(message: &PeerMessage) -> Result<Bytes> {
    encode_frame(&message.encode_to_vec())
}

/// Decode one frame
///
/// Frames whose message carries no known variant are rejected.
pub fn decode(frame: &[u8]) -> Result<PeerMessage> {
    let payload = decode_frame(frame)?;
    let message = PeerMessage::decode(payload)
        .map_err(|e| ClientError::Envelope(format!("invalid message: {}", e)))?;
    if message.union.is_none() {
        return Err(ClientError::Envelope("message without content".to_string()));
    }
    Ok(message)
}

fn encode_frame(payload: &[u8]) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(payload.len() + 4);
    put_header(&mut buf, payload.len())?;
    buf.extend_from_slice(payload);
    Ok(buf.freeze())
}

fn put_header(buf: &mut BytesMut, len: usize) -> Result<()> {
    if len <= 0x3F {
        buf.put_u8((len << 2) as u8);
    } else if len <= 0x3FFF {
        buf.put_u16_le(((len << 2) as u16) | 0x1);
    } else if len <= 0x3F_FFFF {
        let h = ((len << 2) as u32) | 0x2;
        buf.put_u8((h & 0xFF) as u8);
        buf.put_u8(((h >> 8) & 0xFF) as u8);
        buf.put_u8(((h >> 16) & 0xFF) as u8);
    } else if len <= MAX_PAYLOAD_LENGTH {
        buf.put_u32_le(((len << 2) as u32) | 0x3);
    } else {
        return Err(ClientError::Envelope(format!(
            "payload of {} bytes is too large",
            len
        )));
    }
    Ok(())
}

/// Strip the header; the frame must hold exactly the announced length
fn decode_frame(frame: &[u8]) -> Result<&[u8]> {
    let mut buf = frame;
    if !buf.has_remaining() {
        return Err(ClientError::Envelope("empty frame".to_string()));
    }

    let head_len = ((buf[0] & 0x3) + 1) as usize;
    if buf.remaining() < head_len {
        return Err(ClientError::Envelope("truncated header".to_string()));
    }
    let mut n = 0usize;
    for (i, byte) in buf[..head_len].iter().enumerate() {
        n |= (*byte as usize) << (8 * i);
    }
    buf.advance(head_len);
    let len = n >> 2;

    if buf.remaining() != len {
        return Err(ClientError::Envelope(format!(
            "header announces {} bytes, frame carries {}",
            len,
            buf.remaining()
        )));
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_frame_layout() {
        let frame = encode(&PeerMessage::auth_request("abc")).unwrap();
        // field 2 (len 5) wrapping field 1 "abc"
        assert_eq!(
            &frame[..],
            &[7 << 2, 0x12, 0x05, 0x0A, 0x03, b'a', b'b', b'c']
        );

        let frame = encode(&PeerMessage::authenticated()).unwrap();
        assert_eq!(&frame[..], &[2 << 2, 0x0A, 0x00]);
    }

    #[test]
    fn test_header_lengths() {
        for (size, head_len) in [(0x3F, 1), (0x40, 2), (0x3FFF, 2), (0x4000, 3), (0x40_0000, 4)] {
            let payload = vec![0xAB; size];
            let frame = encode_frame(&payload).unwrap();
            assert_eq!(((frame[0] & 0x3) + 1) as usize, head_len, "size {}", size);
            assert_eq!(frame.len(), head_len + size);
            assert_eq!(decode_frame(&frame).unwrap(), &payload[..]);
        }

        let message = PeerMessage::media_event("x".repeat(0x40_0000));
        assert_eq!(decode(&encode(&message).unwrap()).unwrap(), message);
    }

    #[test]
    fn test_decode_rejects_bad_frames() {
        assert!(matches!(decode(&[]), Err(ClientError::Envelope(_))));
        // 2-byte header with a single byte present
        assert!(matches!(decode(&[0x01]), Err(ClientError::Envelope(_))));
        // Announces 3 bytes, carries 2
        assert!(matches!(
            decode(&[3 << 2, 0x0A, 0x00]),
            Err(ClientError::Envelope(_))
        ));
        // Valid framing, empty message
        assert!(matches!(decode(&[0]), Err(ClientError::Envelope(_))));
        // Truncated protobuf field
        assert!(matches!(
            decode(&[2 << 2, 0x1A, 0x05]),
            Err(ClientError::Envelope(_))
        ));
        // Invalid UTF-8 in a string field
        assert!(matches!(
            decode(&[6 << 2, 0x1A, 0x04, 0x0A, 0x02, 0xFF, 0xFE]),
            Err(ClientError::Envelope(_))
        ));
    }

    #[test]
    fn test_dispatch_on_union() {
        let data = r#"{"type":"connect","data":{"metadata":{"name":"żółw"}}}"#;
        let decoded = decode(&encode(&PeerMessage::media_event(data)).unwrap()).unwrap();
        assert_eq!(decoded.name(), "mediaEvent");
        match decoded.union {
            Some(Union::MediaEvent(event)) => assert_eq!(event.data, data),
            other => panic!("unexpected {:?}", other),
        }

        let report = decode(&encode(&PeerMessage::rtc_stats_report("{}")).unwrap()).unwrap();
        assert_eq!(report.name(), "rtcStatsReport");
    }
}
