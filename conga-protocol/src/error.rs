use thiserror::Error;

/// Everything that can go wrong while parsing a frame off the wire.
///
/// Surfaced to the offending participant only; callers are expected to
/// treat any `ProtocolError` as a trigger for BYE cleanup.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unrecognized verb {0:?}")]
    UnknownVerb(String),

    #[error("header line has no ':' separator: {0:?}")]
    MalformedHeaderLine(String),

    #[error("duplicate header {0:?}")]
    DuplicateHeader(String),

    #[error("header block is not valid utf-8")]
    InvalidHeaderEncoding,

    #[error("missing Content-Length header")]
    MissingContentLength,

    #[error("invalid Content-Length value {0:?}")]
    InvalidContentLength(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
