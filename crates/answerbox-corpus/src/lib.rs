//! # AnswerBox Corpus
//! The static reference catalog: general-knowledge question/answer pairs
//! across seven topics, loaded once at startup and never mutated.
//!
//! ## Design
//! - **Compiled-in** — no files, no database, zero setup
//! - **Stable ordering** — the matcher correlates similarity scores back
//!   to entries by index, so insertion order is part of the contract
//! - **Read-only views** — callers get slices and owned copies, never
//!   mutable access

pub mod builtin;
pub mod store;

pub use store::CorpusStore;
