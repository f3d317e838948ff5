use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use crate::error::{Error, Result};

pub trait DocumentReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<String>;
}

pub struct PdfReader;

impl DocumentReader for PdfReader {
    fn read(&self, path: &Path) -> Result<String> {
        let name = display_name(path);

        // pdf-extract panics on some malformed inputs
        match catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text(path))) {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(Error::IndexBuild(format!("could not parse '{name}': {e}"))),
            Err(_) => Err(Error::IndexBuild(format!(
                "could not parse '{name}': the PDF format is not supported"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    pub name: String,
    pub contents: String,
    pub chunks: Vec<String>,
}

impl Document {
    pub fn new(name: String, contents: String) -> Self {
        Self {
            name,
            contents,
            chunks: Vec::new(),
        }
    }

    /// Splits the contents into chunks of at most `chunk_size` words, packed
    /// along paragraph boundaries, with `overlap` words carried between
    /// consecutive chunks.
    pub fn parse(&mut self, chunk_size: usize, overlap: usize) {
        let chunk_size = chunk_size.max(1);
        let overlap = overlap.min(chunk_size - 1);

        let paragraphs = paragraphs(&self.contents);
        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();

        for paragraph in &paragraphs {
            let words: Vec<&str> = paragraph.split_whitespace().collect();

            if current.len() + words.len() > chunk_size && !current.is_empty() {
                chunks.push(current.join(" "));
                let keep = current.len().saturating_sub(overlap);
                current.drain(..keep);
            }

            for word in words {
                if current.len() == chunk_size {
                    chunks.push(current.join(" "));
                    let keep = current.len() - overlap;
                    current.drain(..keep);
                }
                current.push(word);
            }
        }

        if current.len() > overlap || (chunks.is_empty() && !current.is_empty()) {
            chunks.push(current.join(" "));
        }

        self.chunks = chunks;
    }
}

enum FileState {
    None,
    Paragraph,
}

fn paragraphs(contents: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut state = FileState::None;
    let mut paragraph = String::new();

    for line in contents.lines() {
        let line = line.trim();
        match state {
            FileState::None => {
                if !line.is_empty() {
                    state = FileState::Paragraph;
                    paragraph = String::new();
                    paragraph.push_str(line);
                }
            }
            FileState::Paragraph => {
                if line.is_empty() {
                    state = FileState::None;
                    paragraphs.push(std::mem::take(&mut paragraph));
                } else {
                    paragraph.push(' ');
                    paragraph.push_str(line);
                }
            }
        }
    }
    if let FileState::Paragraph = state {
        paragraphs.push(paragraph);
    }

    paragraphs
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string()
}

/// Recursively loads every file under `dir` whose extension matches
/// `ending`, named relative to `prefix`.
pub fn load_documents_from_dir(
    dir: &Path,
    ending: &str,
    prefix: &Path,
    reader: &dyn DocumentReader,
) -> Result<Vec<Document>> {
    let mut documents = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            let mut nested = load_documents_from_dir(&path, ending, prefix, reader)?;
            documents.append(&mut nested);
        } else if path.is_file() {
            let matches = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(ending));
            if !matches {
                tracing::debug!("Skipped {} (not .{ending})", path.display());
                continue;
            }

            let contents = reader.read(&path)?;
            let name = path
                .strip_prefix(prefix)
                .unwrap_or(&path)
                .display()
                .to_string();
            documents.push(Document::new(name, contents));
        }
    }
    Ok(documents)
}
