//! AnswerBox error type.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, AnswerBoxError>;

/// All errors AnswerBox can surface.
#[derive(Error, Debug)]
pub enum AnswerBoxError {
    /// Configuration could not be read or parsed.
    #[error("Config error: {0}")]
    Config(String),

    /// The matcher was handed a corpus with no entries. Index
    /// construction requires at least one document.
    #[error("Corpus is empty: the matcher needs at least one entry")]
    EmptyCorpus,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
