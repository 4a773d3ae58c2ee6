//! The conga wire frame: a verb line, a block of headers, and a body of
//! exactly `Content-Length` bytes. All numbers are ASCII decimal; lines are
//! CRLF-delimited; header names are matched case-sensitively.

use bytes::Bytes;

use crate::error::ProtocolError;

pub const HEADER_CONTENT_LENGTH: &str = "Content-Length";
pub const HEADER_USER_ID: &str = "User-ID";
pub const HEADER_MESSAGE_ID: &str = "Message-ID";
pub const HEADER_FROM: &str = "From";

/// The three verbs a participant connection ever sends or receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Hello,
    Msg,
    Bye,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Hello => "HELLO",
            Verb::Msg => "MSG",
            Verb::Bye => "BYE",
        }
    }

    pub fn parse(s: &str) -> Option<Verb> {
        match s {
            "HELLO" => Some(Verb::Hello),
            "MSG" => Some(Verb::Msg),
            "BYE" => Some(Verb::Bye),
            _ => None,
        }
    }
}

/// An ordered, duplicate-free set of header name/value pairs.
///
/// Order is preserved from the wire so that re-serializing an unmodified
/// frame reproduces the same header sequence (barring `Content-Length`,
/// which is always recomputed from the body).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Headers {
        Headers(Vec::new())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|(n, _)| n == name)
    }

    /// Inserts a header, failing if one with the same name is already
    /// present. Header names are compared case-sensitively, per the wire
    /// contract.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), ProtocolError> {
        let name = name.into();
        if self.contains(&name) {
            return Err(ProtocolError::DuplicateHeader(name));
        }
        self.0.push((name, value.into()));
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

/// A fully-parsed protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub verb: Verb,
    pub headers: Headers,
    pub body: Bytes,
}

impl Frame {
    pub fn hello(user_id: &str) -> Frame {
        let mut headers = Headers::new();
        headers.insert(HEADER_USER_ID, user_id).expect("fresh headers");
        Frame {
            verb: Verb::Hello,
            headers,
            body: Bytes::new(),
        }
    }

    pub fn bye() -> Frame {
        Frame {
            verb: Verb::Bye,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    pub fn msg(headers: Headers, body: Bytes) -> Frame {
        Frame {
            verb: Verb::Msg,
            headers,
            body,
        }
    }

    pub fn message_id(&self) -> Option<&str> {
        self.headers.get(HEADER_MESSAGE_ID)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.headers.get(HEADER_USER_ID)
    }

    /// Returns a copy of this frame with `Message-ID` set, if it is not
    /// already present. Used by tests and by anything that needs a
    /// structural (re-encoded) copy rather than the raw spliced bytes the
    /// relay actually forwards on the wire.
    pub fn with_message_id_if_absent(&self, id: &str) -> Frame {
        if self.headers.contains(HEADER_MESSAGE_ID) {
            return self.clone();
        }
        let mut headers = self.headers.clone();
        headers.insert(HEADER_MESSAGE_ID, id).expect("checked absent above");
        Frame {
            verb: self.verb,
            headers,
            body: self.body.clone(),
        }
    }
}

/// A frame paired with the exact header-block bytes it was parsed from.
///
/// The relay forwards `MSG` frames by splicing these raw bytes (injecting a
/// `Message-ID` line when one is missing) rather than re-serializing from
/// the structured `Headers`, so that unrelated header formatting is never
/// rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub frame: Frame,
    /// The verb line through the trailing blank-line delimiter, inclusive,
    /// exactly as read off the wire.
    pub header_bytes: Bytes,
}
