
use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use tracing::debug;

use crate::{GroundingError, Result};

/// Character budget per token for the sizing heuristic.
pub const CHARS_PER_TOKEN: usize = 4;

/// Trimmed windows shorter than this carry no useful grounding and are dropped.
pub const MIN_CHUNK_CHARS: usize = 50;

static PAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bpage\s+(\d{1,4})\b").expect("valid page pattern"));

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:section|table|figure|chapter)\s+[0-9A-Z][0-9A-Za-z]*(?:[.\-][0-9A-Za-z]+)*")
        .expect("valid section pattern")
});

/// Window sizing for the chunker, expressed in tokens at the
/// [`CHARS_PER_TOKEN`] heuristic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size_tokens: usize,
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size_tokens: 500,
            overlap_tokens: 100,
        }
    }
}

impl ChunkingConfig {
    #[inline]
    pub fn window_chars(&self) -> usize {
        self.chunk_size_tokens * CHARS_PER_TOKEN
    }

    #[inline]
    pub fn overlap_chars(&self) -> usize {
        self.overlap_tokens * CHARS_PER_TOKEN
    }
}

/// The two document classes the corpus is partitioned into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FolderType {
    /// Authoritative rules (standards handbooks).
    Handbook,
    /// Real-world plan instances.
    Example,
}

impl fmt::Display for FolderType {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FolderType::Handbook => write!(f, "handbook"),
            FolderType::Example => write!(f, "example"),
        }
    }
}

/// One unit of retrievable text, as persisted in the chunk file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRecord {
    pub id: String,
    pub folder_type: FolderType,
    pub doc_name: String,
    pub doc_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_or_figure: Option<String>,
    pub text: String,
}

/// Split one document's extracted text into chunk records.
///
/// Chunk ids are derived from (class, document name, emission index), so
/// re-running on identical input yields identical ids in identical order.
/// Empty or whitespace-only text yields zero chunks; the caller decides
/// whether that is worth a warning.
#[inline]
pub fn chunk_document(
    folder_type: FolderType,
    doc_name: &str,
    doc_path: &str,
    text: &str,
    config: &ChunkingConfig,
) -> Result<Vec<ChunkRecord>> {
    let windows = split_windows(text, config.window_chars(), config.overlap_chars())?;

    let mut chunks = Vec::with_capacity(windows.len());
    for window in windows {
        let trimmed = window.trim();
        if trimmed.chars().count() < MIN_CHUNK_CHARS {
            continue;
        }

        chunks.push(ChunkRecord {
            id: format!("{}-{}-{}", folder_type, doc_name, chunks.len()),
            folder_type,
            doc_name: doc_name.to_string(),
            doc_path: doc_path.to_string(),
            page_number: extract_page_number(trimmed),
            section_or_figure: extract_section_label(trimmed),
            text: trimmed.to_string(),
        });
    }

    debug!(
        "Chunked {} '{}' into {} chunks",
        folder_type,
        doc_name,
        chunks.len()
    );

    Ok(chunks)
}

/// Split text into fixed-size character windows with a fixed overlap.
///
/// Windows advance by `window - overlap` characters. A non-positive advance
/// is rejected rather than looping forever.
fn split_windows(text: &str, window: usize, overlap: usize) -> Result<Vec<String>> {
    if overlap >= window {
        return Err(GroundingError::Config(format!(
            "chunk overlap ({overlap} chars) must be smaller than window ({window} chars)"
        )));
    }

    // Byte offset of every char boundary, so windows never split a char.
    let offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let total = offsets.len();
    let advance = window - overlap;

    let mut windows = Vec::new();
    let mut start = 0;
    while start < total {
        let end = (start + window).min(total);
        let byte_start = offsets[start];
        let byte_end = if end == total { text.len() } else { offsets[end] };
        windows.push(text[byte_start..byte_end].to_string());
        if end == total {
            break;
        }
        start += advance;
    }

    Ok(windows)
}

/// Best-effort "Page N" detection. Absence of a match is an explicit `None`,
/// never a guess.
#[inline]
pub fn extract_page_number(text: &str) -> Option<u32> {
    let captures = PAGE_RE.captures(text).ok().flatten()?;
    captures.get(1)?.as_str().parse().ok()
}

/// Best-effort section/figure label detection, e.g. "Table 6C-2".
#[inline]
pub fn extract_section_label(text: &str) -> Option<String> {
    let matched = SECTION_RE.find(text).ok().flatten()?;
    Some(matched.as_str().to_string())
}
