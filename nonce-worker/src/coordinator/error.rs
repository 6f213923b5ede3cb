//! Error types for the coordinator link.

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// Why an inbound message could not be routed.
///
/// These are never fatal; the link logs them and drops the message.
#[derive(Error, Debug)]
pub enum MessageError {
    #[error("message is not a JSON object")]
    NotAnObject,

    #[error("field {0} has the wrong type")]
    InvalidField(&'static str),

    #[error("range start {start} is past end {end}")]
    InvertedRange { start: u64, end: u64 },

    #[error("not a usable task definition: {0}")]
    InvalidTask(#[from] serde_json::Error),
}

/// Errors that end the coordinator link.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line exceeds {0} bytes")]
    LineTooLong(usize),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("executor inbox closed")]
    InboxClosed,
}

impl LinkError {
    pub(crate) fn from_lines(err: LinesCodecError, max_length: usize) -> Self {
        match err {
            LinesCodecError::MaxLineLengthExceeded => LinkError::LineTooLong(max_length),
            LinesCodecError::Io(e) => LinkError::Io(e),
        }
    }
}

pub type LinkResult<T> = std::result::Result<T, LinkError>;
