//! Recursive character text splitter
//!
//! Text is split on the coarsest separator present (paragraphs, then
//! sentences, then lines, then words). Pieces that are still too long are
//! split again with the finer separators, and small pieces are merged back
//! into chunks of at most `chunk_size` characters that share up to
//! `chunk_overlap` characters with their predecessor.

use serde_json::{Map, Value, json};
use std::collections::VecDeque;
use std::path::Path;

/// Separators from coarsest to finest
pub const DEFAULT_SEPARATORS: [&str; 6] = ["\n\n", ". ", "! ", "? ", "\n", " "];

/// A piece of a source document ready for embedding
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// `<file name>::chunk_<n>`
    pub id: String,
    pub text: String,
    /// `source` (path) and `chunk_id` (position)
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct TextSplitter {
    separators: Vec<String>,
    chunk_size: usize,
    chunk_overlap: usize,
}

/// Splitter with the default separators
pub fn build_text_splitter(chunk_size: usize, chunk_overlap: usize) -> TextSplitter {
    TextSplitter::new(
        DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        chunk_size,
        chunk_overlap,
    )
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

impl TextSplitter {
    /// `chunk_size` is clamped to at least 1 and the overlap to below it.
    pub fn new(separators: Vec<String>, chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            separators,
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    /// Split `text` into trimmed, non-empty chunks
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.separators)
    }

    fn split_with(&self, text: &str, separators: &[String]) -> Vec<String> {
        let position = separators.iter().position(|sep| text.contains(sep.as_str()));
        let Some(position) = position else {
            return if char_len(text) < self.chunk_size {
                self.merge(vec![text.to_string()])
            } else {
                self.hard_split(text)
            };
        };

        let separator = separators[position].as_str();
        let finer = &separators[position + 1..];

        let mut chunks = Vec::new();
        let mut pending = Vec::new();

        for piece in text.split_inclusive(separator) {
            if char_len(piece) < self.chunk_size {
                pending.push(piece.to_string());
                continue;
            }

            if !pending.is_empty() {
                chunks.extend(self.merge(std::mem::take(&mut pending)));
            }
            if finer.is_empty() {
                chunks.extend(self.hard_split(piece));
            } else {
                chunks.extend(self.split_with(piece, finer));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge(pending));
        }
        chunks
    }

    /// Merge short pieces into chunks, carrying trailing pieces forward as
    /// overlap
    fn merge(&self, pieces: Vec<String>) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<(String, usize)> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(&piece);

            if total + len > self.chunk_size && !window.is_empty() {
                push_trimmed(&mut chunks, &window);

                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }

            total += len;
            window.push_back((piece, len));
        }

        push_trimmed(&mut chunks, &window);
        chunks
    }

    /// Fixed windows for text without usable separators
    fn hard_split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let step = self.chunk_size - self.chunk_overlap;
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let end = (start + self.chunk_size).min(chars.len());
            let piece: String = chars[start..end].iter().collect();
            let piece = piece.trim();
            if !piece.is_empty() {
                chunks.push(piece.to_string());
            }
            if end == chars.len() {
                break;
            }
            start += step;
        }
        chunks
    }
}

fn push_trimmed(chunks: &mut Vec<String>, window: &VecDeque<(String, usize)>) {
    let joined: String = window.iter().map(|(piece, _)| piece.as_str()).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Split a document into chunks carrying their source and position
pub fn chunk_document(doc_text: &str, source: &str, splitter: &TextSplitter) -> Vec<Chunk> {
    let basename = Path::new(source)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| source.to_string());

    splitter
        .split_text(doc_text)
        .into_iter()
        .enumerate()
        .map(|(i, text)| {
            let mut metadata = Map::new();
            metadata.insert("source".to_string(), json!(source));
            metadata.insert("chunk_id".to_string(), json!(i));
            Chunk {
                id: format!("{}::chunk_{}", basename, i),
                text,
                metadata,
            }
        })
        .collect()
}
