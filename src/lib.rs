//! Themis - hybrid retrieval for legal question answering
//!
//! Answers questions about French consumer law by retrieving statute articles
//! with dense and keyword search, fusing and reranking them with a
//! cross-encoder, and grounding a language model's answer in the result.

pub mod api;
pub mod cli;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod retrieval;
pub mod storage;

pub use error::{Result, ThemisError};
