//! Wire protocol for the conga relay.
//!
//! A frame is a CRLF-delimited header block (a verb line followed by
//! `Name: value` header lines and a blank separator line) followed by
//! exactly `Content-Length` bytes of body. See `codec` for the
//! `tokio_util::codec` glue that turns a byte stream into a stream of
//! frames, and `frame` for the frame types themselves.

pub mod codec;
pub mod error;
pub mod frame;

pub use codec::{encode_frame, splice_message_id, FrameCodec};
pub use error::ProtocolError;
pub use frame::{
    Frame, Headers, RawFrame, Verb, HEADER_CONTENT_LENGTH, HEADER_FROM, HEADER_MESSAGE_ID,
    HEADER_USER_ID,
};
