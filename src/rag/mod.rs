//! Retrieval-augmented generation building blocks
//!
//! Loading class materials, splitting them into chunks, indexing them and
//! reranking retrieved candidates.

pub mod index;
pub mod loader;
pub mod prompt;
pub mod rerank;
pub mod splitter;
