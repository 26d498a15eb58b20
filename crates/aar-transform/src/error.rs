use std::error::Error;
use std::fmt;

pub type TransformResult<T> = Result<T, TransformError>;

#[derive(Debug, Clone)]
pub enum TransformError {
    /// The provider has no representation for this request shape.
    Unsupported(&'static str),
    /// The request is malformed in a way serde cannot catch.
    InvalidRequest(String),
    /// The upstream body could not be decoded into the native schema.
    InvalidUpstream(String),
    /// The upstream reported an in-band stream error.
    UpstreamStream(String),
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformError::Unsupported(what) => write!(f, "unsupported: {what}"),
            TransformError::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            TransformError::InvalidUpstream(msg) => write!(f, "invalid upstream response: {msg}"),
            TransformError::UpstreamStream(msg) => write!(f, "upstream stream error: {msg}"),
        }
    }
}

impl Error for TransformError {}
