//! `tokio_util::codec` glue: turns a byte stream into a stream of
//! [`RawFrame`]s and back. Grounded in the teacher's habit of driving the
//! wire protocol off a `Framed` transport rather than hand-rolled
//! read/write loops, adapted here from the teacher's fixed-width binary
//! framing to this protocol's CRLF/header-block framing (a job
//! `tokio_util`'s `Decoder`/`Encoder` traits fit more naturally than the
//! teacher's `nom` combinators, which assume whole-message binary tags).

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::frame::{Frame, Headers, RawFrame, Verb, HEADER_CONTENT_LENGTH, HEADER_MESSAGE_ID};

#[derive(Debug)]
enum DecodeState {
    Header,
    Body {
        verb: Verb,
        headers: Headers,
        header_bytes: Bytes,
        needed: usize,
    },
}

/// Decodes/encodes conga frames on a single stream. Re-entrant: once a body
/// has been consumed the codec immediately looks for the next header block.
#[derive(Debug)]
pub struct FrameCodec {
    state: DecodeState,
}

impl Default for FrameCodec {
    fn default() -> Self {
        FrameCodec {
            state: DecodeState::Header,
        }
    }
}

impl FrameCodec {
    pub fn new() -> FrameCodec {
        FrameCodec::default()
    }
}

fn find_header_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn parse_header_block(block: &[u8]) -> Result<(Verb, Headers), ProtocolError> {
    // `block` includes the trailing "\r\n\r\n"; strip it before splitting
    // into lines.
    let content = &block[..block.len() - 4];
    let text = std::str::from_utf8(content).map_err(|_| ProtocolError::InvalidHeaderEncoding)?;

    let mut lines = text.split("\r\n");
    let verb_line = lines.next().unwrap_or("");
    let verb = Verb::parse(verb_line).ok_or_else(|| ProtocolError::UnknownVerb(verb_line.to_string()))?;

    let mut headers = Headers::new();
    for line in lines {
        let colon = line
            .find(':')
            .ok_or_else(|| ProtocolError::MalformedHeaderLine(line.to_string()))?;
        let name = &line[..colon];
        let mut value = &line[colon + 1..];
        if let Some(stripped) = value.strip_prefix(' ') {
            value = stripped;
        }
        headers.insert(name, value)?;
    }

    Ok((verb, headers))
}

impl Decoder for FrameCodec {
    type Item = RawFrame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RawFrame>, ProtocolError> {
        loop {
            if matches!(self.state, DecodeState::Header) {
                let Some(pos) = find_header_terminator(src) else {
                    return Ok(None);
                };
                let header_block = src.split_to(pos + 4);
                let (verb, headers) = parse_header_block(&header_block)?;

                let needed = headers
                    .get(HEADER_CONTENT_LENGTH)
                    .ok_or(ProtocolError::MissingContentLength)?
                    .parse::<usize>()
                    .map_err(|_| {
                        ProtocolError::InvalidContentLength(
                            headers.get(HEADER_CONTENT_LENGTH).unwrap_or("").to_string(),
                        )
                    })?;

                self.state = DecodeState::Body {
                    verb,
                    headers,
                    header_bytes: header_block.freeze(),
                    needed,
                };
                // Loop again: the body may already be fully buffered.
                continue;
            }

            let needed = match &self.state {
                DecodeState::Body { needed, .. } => *needed,
                DecodeState::Header => unreachable!("checked above"),
            };

            if src.len() < needed {
                src.reserve(needed - src.len());
                return Ok(None);
            }

            let body = src.split_to(needed).freeze();
            let DecodeState::Body {
                verb,
                headers,
                header_bytes,
                ..
            } = std::mem::replace(&mut self.state, DecodeState::Header)
            else {
                unreachable!("state checked above");
            };

            let frame = Frame { verb, headers, body };
            return Ok(Some(RawFrame { frame, header_bytes }));
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        encode_frame(&frame, dst);
        Ok(())
    }
}

/// Serializes `frame` per the emission contract: verb, then every header
/// except `Content-Length` in original order, then a freshly-computed
/// `Content-Length`, then the blank separator line, then the body.
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) {
    dst.extend_from_slice(frame.verb.as_str().as_bytes());
    dst.extend_from_slice(b"\r\n");

    for (name, value) in frame.headers.iter() {
        if name == HEADER_CONTENT_LENGTH {
            continue;
        }
        dst.extend_from_slice(name.as_bytes());
        dst.extend_from_slice(b": ");
        dst.extend_from_slice(value.as_bytes());
        dst.extend_from_slice(b"\r\n");
    }

    dst.extend_from_slice(HEADER_CONTENT_LENGTH.as_bytes());
    dst.extend_from_slice(b": ");
    dst.extend_from_slice(frame.body.len().to_string().as_bytes());
    dst.extend_from_slice(b"\r\n\r\n");
    dst.extend_from_slice(&frame.body);
}

/// Splices a `Message-ID` header into a raw header block immediately before
/// the trailing blank-line delimiter, leaving every other byte untouched.
/// This is how the relay stamps a freshly-allocated id onto a first-hop MSG
/// without disturbing the rest of the header block it is about to forward.
pub fn splice_message_id(header_bytes: &[u8], message_id: &str) -> BytesMut {
    debug_assert!(header_bytes.ends_with(b"\r\n\r\n"));

    let mut out = BytesMut::with_capacity(header_bytes.len() + message_id.len() + HEADER_MESSAGE_ID.len() + 4);
    out.extend_from_slice(&header_bytes[..header_bytes.len() - 2]);
    out.extend_from_slice(HEADER_MESSAGE_ID.as_bytes());
    out.extend_from_slice(b": ");
    out.extend_from_slice(message_id.as_bytes());
    out.extend_from_slice(b"\r\n\r\n");
    out
}
