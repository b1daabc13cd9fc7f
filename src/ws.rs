// washwatch — Minimal WebSocket Server Plumbing
//
// Just enough RFC 6455 for the battery telemetry page: the upgrade
// handshake and unfragmented text frames. The framing here is pure
// byte-slicing; the TCP loop lives in the `batteryserver` binary.

use anyhow::{bail, Context};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha1::{Digest, Sha1};

const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Sec-WebSocket-Accept for a client key: base64(sha1(key + GUID)).
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.trim().as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Pull `Sec-WebSocket-Key` out of a raw HTTP upgrade request.
pub fn client_key(request: &str) -> Option<&str> {
    request.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case("sec-websocket-key")
            .then(|| value.trim())
    })
}

/// The 101 Switching Protocols response completing the handshake.
pub fn handshake_response(client_key: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        accept_key(client_key)
    )
}

/// Server-to-client text frame: FIN + text opcode, unmasked, with the
/// 7/16/64-bit length encoding picked by payload size.
pub fn encode_text_frame(payload: &str) -> Vec<u8> {
    let bytes = payload.as_bytes();
    let mut frame = Vec::with_capacity(bytes.len() + 10);
    frame.push(0x81);
    match bytes.len() {
        len if len <= 125 => frame.push(len as u8),
        len if len <= u16::MAX as usize => {
            frame.push(126);
            frame.extend_from_slice(&(len as u16).to_be_bytes());
        }
        len => {
            frame.push(127);
            frame.extend_from_slice(&(len as u64).to_be_bytes());
        }
    }
    frame.extend_from_slice(bytes);
    frame
}

#[derive(Debug, PartialEq, Eq)]
pub enum ClientFrame {
    Text(String),
    Close,
    /// Ping, pong, binary — nothing the telemetry loop acts on.
    Other,
}

/// Decode one client frame from `buf`, returning it and the bytes consumed.
/// `Ok(None)` means more data is needed. Client frames must be masked.
pub fn decode_frame(buf: &[u8]) -> anyhow::Result<Option<(ClientFrame, usize)>> {
    if buf.len() < 2 {
        return Ok(None);
    }
    let opcode = buf[0] & 0x0f;
    let masked = buf[1] & 0x80 != 0;
    if !masked {
        bail!("unmasked client frame");
    }

    let (len, mut offset) = match buf[1] & 0x7f {
        126 => {
            if buf.len() < 4 {
                return Ok(None);
            }
            (u16::from_be_bytes([buf[2], buf[3]]) as usize, 4)
        }
        127 => {
            if buf.len() < 10 {
                return Ok(None);
            }
            let mut len_bytes = [0u8; 8];
            len_bytes.copy_from_slice(&buf[2..10]);
            let len = u64::from_be_bytes(len_bytes);
            (usize::try_from(len).context("frame too large")?, 10)
        }
        len => (len as usize, 2),
    };

    if buf.len() < offset + 4 + len {
        return Ok(None);
    }
    let mask = [buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]];
    offset += 4;

    let payload: Vec<u8> = buf[offset..offset + len]
        .iter()
        .enumerate()
        .map(|(i, b)| b ^ mask[i % 4])
        .collect();
    let consumed = offset + len;

    let frame = match opcode {
        0x1 => ClientFrame::Text(String::from_utf8(payload).context("non-utf8 text frame")?),
        0x8 => ClientFrame::Close,
        _ => ClientFrame::Other,
    };
    Ok(Some((frame, consumed)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_key_matches_the_rfc_example() {
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn client_key_is_found_case_insensitively() {
        let req = "GET /ws HTTP/1.1\r\nHost: bee\r\nSEC-WEBSOCKET-KEY:  abc123  \r\n\r\n";
        assert_eq!(client_key(req), Some("abc123"));
        assert_eq!(client_key("GET / HTTP/1.1\r\n\r\n"), None);
    }

    #[test]
    fn handshake_response_carries_the_accept_header() {
        let resp = handshake_response("dGhlIHNhbXBsZSBub25jZQ==");
        assert!(resp.starts_with("HTTP/1.1 101"));
        assert!(resp.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
        assert!(resp.ends_with("\r\n\r\n"));
    }

    #[test]
    fn short_text_frames_use_the_inline_length() {
        let frame = encode_text_frame("hi");
        assert_eq!(frame, vec![0x81, 2, b'h', b'i']);
    }

    #[test]
    fn medium_frames_use_the_16_bit_length() {
        let payload = "x".repeat(300);
        let frame = encode_text_frame(&payload);
        assert_eq!(frame[0], 0x81);
        assert_eq!(frame[1], 126);
        assert_eq!(u16::from_be_bytes([frame[2], frame[3]]), 300);
        assert_eq!(frame.len(), 4 + 300);
    }

    fn masked(opcode: u8, payload: &[u8]) -> Vec<u8> {
        let mask = [0xa1, 0xb2, 0xc3, 0xd4];
        let mut buf = vec![0x80 | opcode, 0x80 | payload.len() as u8];
        buf.extend_from_slice(&mask);
        buf.extend(payload.iter().enumerate().map(|(i, b)| b ^ mask[i % 4]));
        buf
    }

    #[test]
    fn masked_text_frames_decode() {
        let buf = masked(0x1, b"hello");
        let (frame, consumed) = decode_frame(&buf).unwrap().unwrap();
        assert_eq!(frame, ClientFrame::Text("hello".into()));
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn close_frames_are_reported() {
        let buf = masked(0x8, &[]);
        let (frame, _) = decode_frame(&buf).unwrap().unwrap();
        assert_eq!(frame, ClientFrame::Close);
    }

    #[test]
    fn partial_frames_ask_for_more_data() {
        let buf = masked(0x1, b"hello");
        assert_eq!(decode_frame(&buf[..3]).unwrap(), None);
        assert_eq!(decode_frame(&[]).unwrap(), None);
    }

    #[test]
    fn unmasked_client_frames_are_rejected() {
        let buf = vec![0x81, 2, b'h', b'i'];
        assert!(decode_frame(&buf).is_err());
    }
}
