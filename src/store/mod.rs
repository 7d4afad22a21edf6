//! Persistent vector collections
//!
//! SQLite-backed storage for named collections of embedded documents. The
//! `documents` collection holds class material chunks and
//! `memory_collection` holds long-term memories.

pub mod vector_store;

pub use vector_store::{Collection, QueryHit, Record, StoreError, VectorStore, Where, round3};
