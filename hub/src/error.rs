//! Error types for the `hub` crate.
use std::error::Error as StdError;
use std::fmt;

pub type Result<T> = core::result::Result<T, Error>;

/// Top-level hub error type.
/// `error_kind` tells callers what failed, `source` keeps the underlying error
/// (socket, serde) for logging. None of these errors is fatal to the process:
/// transport and decode errors end a single client, `HubUnavailable` means the
/// coordinator has already stopped.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// Reading from or writing to the client's socket failed.
    Transport,
    /// An inbound frame was not a valid envelope.
    Decode,
    /// An outbound envelope could not be serialized.
    Encode,
    /// The coordinator task is no longer running.
    HubUnavailable,
}

impl Error {
    pub fn transport<E>(err: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Error {
            source: Some(err.into()),
            error_kind: ErrorKind::Transport,
        }
    }

    pub fn encode(err: serde_json::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Encode,
        }
    }

    pub fn hub_unavailable() -> Self {
        Error {
            source: None,
            error_kind: ErrorKind::HubUnavailable,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "Hub Error ({:?}): {source}", self.error_kind),
            None => write!(f, "Hub Error ({:?})", self.error_kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        let error_kind = if err.is_io() {
            ErrorKind::Transport
        } else {
            ErrorKind::Decode
        };

        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}
