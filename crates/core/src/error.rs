//! Error types shared by the parser, the translation client and the
//! orchestrator.

use thiserror::Error;

/// Raised when no subtitle entry can be read from the input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("no valid subtitle entries found in input")]
    NoEntries,
}

/// Failure of a single call to the remote generation endpoint.
#[derive(Error, Debug)]
pub enum GenerationError {
    /// The request never produced an HTTP response, or the body could not be read.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("endpoint responded with {status}: {message}")]
    Status { status: u16, message: String },

    /// A success response without the expected fields.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl GenerationError {
    /// Whether the translation client should try the call again.
    ///
    /// Every failure of the remote call is treated the same way: the
    /// client retries until its attempts run out and then falls back to
    /// the sentinel text.
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationError::Transport(_)
            | GenerationError::Status { .. }
            | GenerationError::MalformedResponse(_) => true,
        }
    }
}

/// Invalid caller supplied configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("batch size {0} is outside the allowed range 10..=100")]
    BatchSizeOutOfRange(usize),

    #[error("api credential is empty")]
    MissingCredential,

    #[error("{0} language label is empty")]
    EmptyLanguage(&'static str),
}

/// Errors that terminate a whole document translation.
#[derive(Error, Debug)]
pub enum TranslateError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("translation cancelled after {completed} of {total} entries")]
    Cancelled { completed: usize, total: usize },

    #[error("no subtitle entries with ids between {first} and {last}")]
    EmptySelection { first: u32, last: u32 },
}
