//! Long-term memory maintenance

pub mod reflection;

pub use reflection::MemoryExtractor;
