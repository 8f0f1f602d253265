//! Bolt v1 binary RPC protocol support
//!
//! Only what the harness needs: the fixed request header layout, the byte
//! offset of the correlation identifier, and a parser good enough for the
//! upstream responder to describe inbound requests as text. Nothing here
//! re-encodes payloads; the frame templates carry pre-computed lengths.

mod template;

pub use template::FrameTemplate;

/// Protocol code carried in the first header byte.
pub const PROTOCOL_CODE: u8 = 0x01;

/// Header byte marking a request frame.
pub const TYPE_REQUEST: u8 = 0x01;

/// Header byte marking a response frame.
pub const TYPE_RESPONSE: u8 = 0x00;

/// Command code of an RPC request.
pub const CMD_RPC_REQUEST: u16 = 0x0001;

/// Fixed request header length in bytes.
pub const REQUEST_HEADER_LEN: usize = 22;

/// Byte offset of the 4-byte correlation identifier, shared by request and
/// response frames.
pub const REQUEST_ID_OFFSET: usize = 5;

/// Decoded fixed header of a bolt request frame.
///
/// Layout: proto(1) type(1) cmd_code(2) version(1) request_id(4) codec(1)
/// timeout(4) class_len(2) header_len(2) content_len(4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHead {
    /// Protocol code, always [`PROTOCOL_CODE`] for frames this harness emits.
    pub proto: u8,
    /// Frame type, request or response.
    pub frame_type: u8,
    /// Command code.
    pub cmd_code: u16,
    /// Protocol minor version.
    pub version: u8,
    /// Correlation identifier matching a response to its request.
    pub request_id: u32,
    /// Serialization codec tag.
    pub codec: u8,
    /// Invocation timeout in milliseconds.
    pub timeout_ms: u32,
    /// Length of the serialized class name section.
    pub class_len: u16,
    /// Length of the serialized header map section.
    pub header_len: u16,
    /// Length of the serialized content section.
    pub content_len: u32,
}

impl RequestHead {
    /// Parse a request head from the start of `buf`.
    ///
    /// Returns `None` when the buffer is shorter than the fixed header or
    /// does not start with a recognized request frame.
    pub fn parse(buf: &[u8]) -> Option<RequestHead> {
        if buf.len() < REQUEST_HEADER_LEN {
            return None;
        }
        if buf[0] != PROTOCOL_CODE || buf[1] != TYPE_REQUEST {
            return None;
        }
        Some(RequestHead {
            proto: buf[0],
            frame_type: buf[1],
            cmd_code: u16::from_be_bytes([buf[2], buf[3]]),
            version: buf[4],
            request_id: u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]),
            codec: buf[9],
            timeout_ms: u32::from_be_bytes([buf[10], buf[11], buf[12], buf[13]]),
            class_len: u16::from_be_bytes([buf[14], buf[15]]),
            header_len: u16::from_be_bytes([buf[16], buf[17]]),
            content_len: u32::from_be_bytes([buf[18], buf[19], buf[20], buf[21]]),
        })
    }

    /// Total length of the frame this head belongs to, header included.
    pub fn frame_len(&self) -> usize {
        REQUEST_HEADER_LEN
            + self.class_len as usize
            + self.header_len as usize
            + self.content_len as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_request_template_head() {
        let template = FrameTemplate::request();
        let head = RequestHead::parse(template.bytes()).unwrap();

        assert_eq!(head.proto, PROTOCOL_CODE);
        assert_eq!(head.frame_type, TYPE_REQUEST);
        assert_eq!(head.cmd_code, CMD_RPC_REQUEST);
        assert_eq!(head.codec, 1);
        assert_eq!(head.timeout_ms, 100);
        // The template's section lengths are pre-computed and must add up
        // to the template size.
        assert_eq!(head.frame_len(), template.len());
    }

    #[test]
    fn parse_rejects_short_or_foreign_buffers() {
        assert!(RequestHead::parse(&[]).is_none());
        assert!(RequestHead::parse(&[PROTOCOL_CODE; 10]).is_none());

        // A response frame is not a request head.
        let response = FrameTemplate::response();
        assert!(RequestHead::parse(response.bytes()).is_none());
    }
}
