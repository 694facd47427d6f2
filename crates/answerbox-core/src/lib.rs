//! # AnswerBox Core
//! Shared foundation for the AnswerBox workspace: the error type,
//! engine configuration, and the domain records exchanged between the
//! corpus store, the matcher, and the presentation layer.

pub mod config;
pub mod error;
pub mod types;

pub use config::EngineConfig;
pub use error::{AnswerBoxError, Result};
pub use types::{MatchResult, QaEntry};
