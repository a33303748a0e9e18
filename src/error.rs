use std::path::PathBuf;

use thiserror::Error;

/// A socket frame or stream record that could not be decoded.
///
/// Always recoverable: the offending message is dropped and the link or
/// stream carries on.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload for event '{kind}' is invalid: {source}")]
    Payload {
        kind: String,
        source: serde_json::Error,
    },

    #[error("frame is not a JSON object with a string 'type'")]
    MissingType,
}

/// Failure of a single chunked HTTP request. Never affects socket connectivity.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("stream endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("stream read error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot request failed: {0}")]
    Request(Box<ureq::Error>),

    #[error("snapshot decode error: {0}")]
    Decode(#[from] std::io::Error),

    #[error("snapshot payload invalid: {0}")]
    Payload(#[from] serde_json::Error),
}

impl From<ureq::Error> for SnapshotError {
    fn from(err: ureq::Error) -> Self {
        Self::Request(Box::new(err))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },

    #[error("invalid backend URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Transport-level failure opening or reading a socket link.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect error: {0}")]
    Connect(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("close: {0}")]
    Closed(String),
}

/// A canvas update that could not be applied. The rest of the batch still is.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CanvasError {
    #[error("unknown canvas section '{0}'")]
    UnknownSection(String),

    #[error("section '{section}' expects {expected} content")]
    ContentShape {
        section: &'static str,
        expected: &'static str,
    },
}

// Test-only equality so `Option<Result<_, DecodeError>>` works with `assert_eq!`.
#[cfg(test)]
impl PartialEq for DecodeError {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}
