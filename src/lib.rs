//! Docent - grounded document question answering
//!
//! Splits a document into chunks, embeds them into an in-memory vector index,
//! and answers questions with a language model constrained to the retrieved
//! context. An optional image is described and indexed as one more chunk.

pub mod chunking;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod http;
pub mod retrieval;
pub mod session;
pub mod vision;

pub use error::{DocentError, Result};
