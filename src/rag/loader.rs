//! Class material loading

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Data directory {0} does not exist")]
    MissingDir(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to extract text from {path}: {message}")]
    Pdf { path: PathBuf, message: String },

    #[error("Unsupported document type: {0}")]
    Unsupported(PathBuf),
}

/// Extensions picked up by the indexer
const SUPPORTED: [&str; 3] = ["pdf", "txt", "md"];

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

/// Whether the file is a PDF
pub fn is_pdf(path: &Path) -> bool {
    extension(path).as_deref() == Some("pdf")
}

/// Supported documents directly inside `dir`, sorted by path
pub fn find_documents(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    if !dir.is_dir() {
        return Err(LoadError::MissingDir(dir.to_path_buf()));
    }

    let entries = std::fs::read_dir(dir).map_err(|source| LoadError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            extension(path)
                .map(|ext| SUPPORTED.contains(&ext.as_str()))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Extract the text of every page of a PDF
pub fn load_pdf(path: &Path) -> Result<String, LoadError> {
    pdf_extract::extract_text(path).map_err(|e| LoadError::Pdf {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Load a supported document as text
pub fn load_document(path: &Path) -> Result<String, LoadError> {
    match extension(path).as_deref() {
        Some("pdf") => load_pdf(path),
        Some("txt") | Some("md") => std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        }),
        _ => Err(LoadError::Unsupported(path.to_path_buf())),
    }
}
