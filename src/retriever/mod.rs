
use anyhow::Result;
use itertools::Itertools;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::chunker::{ChunkRecord, FolderType};
use crate::embeddings::EmbeddingClient;
use crate::store::{EmbeddingRecord, IndexStore};

/// Default `k` for the query boundary when the caller omits it.
pub const DEFAULT_TOP_K: usize = 5;

/// Display snippet length, a prefix of the chunk text.
pub const SNIPPET_CHARS: usize = 200;

/// Minimum possible cosine score, also used for degenerate vectors.
pub const MIN_SCORE: f32 = -1.0;

/// Summary statistics over a loaded index, recomputed on every load.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub total_chunks: usize,
    pub handbook_chunks: usize,
    pub example_chunks: usize,
    pub unique_docs: usize,
}

#[derive(Debug, Clone)]
struct IndexEntry {
    chunk: ChunkRecord,
    vector: Vec<f32>,
}

/// An in-memory index: the joined set of (chunk, vector) pairs from one
/// ingestion run.
///
/// A `LoadedIndex` is immutable for its lifetime; concurrent queries need no
/// coordination. Reloading after re-ingestion means constructing a new value
/// and swapping the handle, so no query ever observes a half-loaded index.
#[derive(Debug, Clone)]
pub struct LoadedIndex {
    entries: Vec<IndexEntry>,
    stats: IndexStats,
}

/// One ranked match for a query.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalResult {
    pub id: String,
    pub folder_type: FolderType,
    pub doc_name: String,
    pub doc_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_or_figure: Option<String>,
    pub score: f32,
    pub snippet: String,
}

/// The query-time boundary shape consumed by the serving layer.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub query: String,
    pub index_stats: IndexStats,
    pub handbooks: Vec<RetrievalResult>,
    pub examples: Vec<RetrievalResult>,
}

impl LoadedIndex {
    /// Load and join the persisted record pair. Malformed files are fatal
    /// (propagated from the store); unmatched chunk/embedding halves are
    /// skipped with a warning, never served and never zero-filled.
    #[inline]
    pub fn load(store: &IndexStore) -> Result<Self> {
        let chunks = store.load_chunks()?;
        let embeddings = store.load_embeddings()?;
        let index = Self::from_records(chunks, embeddings);
        info!(
            "Loaded index: {} chunks ({} handbook, {} example) across {} documents",
            index.stats.total_chunks,
            index.stats.handbook_chunks,
            index.stats.example_chunks,
            index.stats.unique_docs
        );
        Ok(index)
    }

    #[inline]
    pub fn from_records(chunks: Vec<ChunkRecord>, embeddings: Vec<EmbeddingRecord>) -> Self {
        let mut vectors: HashMap<String, Vec<f32>> = embeddings
            .into_iter()
            .map(|record| (record.id, record.embedding))
            .collect();

        let mut entries = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            match vectors.remove(&chunk.id) {
                Some(vector) => entries.push(IndexEntry { chunk, vector }),
                None => warn!("Chunk '{}' has no embedding; skipping", chunk.id),
            }
        }
        for orphan_id in vectors.keys() {
            warn!("Embedding '{}' has no chunk; skipping", orphan_id);
        }

        let stats = compute_stats(&entries);
        Self { entries, stats }
    }

    #[inline]
    pub fn stats(&self) -> IndexStats {
        self.stats
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rank every eligible candidate by cosine similarity against the query
    /// vector and return the top `k`.
    ///
    /// Ordering is strictly descending by score with ascending chunk id as
    /// the tie-break, so repeated searches are deterministic. A `k` of zero
    /// yields an empty result set rather than an error.
    #[inline]
    pub fn search(
        &self,
        query_vector: &[f32],
        k: usize,
        folder_type: Option<FolderType>,
    ) -> Vec<RetrievalResult> {
        if k == 0 {
            return Vec::new();
        }

        let results: Vec<RetrievalResult> = self
            .entries
            .iter()
            .filter(|entry| folder_type.is_none_or(|f| entry.chunk.folder_type == f))
            .map(|entry| (cosine_similarity(query_vector, &entry.vector), entry))
            .sorted_by(|a, b| {
                b.0.total_cmp(&a.0)
                    .then_with(|| a.1.chunk.id.cmp(&b.1.chunk.id))
            })
            .take(k)
            .map(|(score, entry)| entry.to_result(score))
            .collect();

        debug!(
            "Search returned {} results (k={}, filter={:?})",
            results.len(),
            k,
            folder_type
        );

        results
    }
}

impl IndexEntry {
    fn to_result(&self, score: f32) -> RetrievalResult {
        RetrievalResult {
            id: self.chunk.id.clone(),
            folder_type: self.chunk.folder_type,
            doc_name: self.chunk.doc_name.clone(),
            doc_path: self.chunk.doc_path.clone(),
            page_number: self.chunk.page_number,
            section_or_figure: self.chunk.section_or_figure.clone(),
            score,
            snippet: self.chunk.text.chars().take(SNIPPET_CHARS).collect(),
        }
    }
}

fn compute_stats(entries: &[IndexEntry]) -> IndexStats {
    let handbook_chunks = entries
        .iter()
        .filter(|e| e.chunk.folder_type == FolderType::Handbook)
        .count();
    let unique_docs = entries
        .iter()
        .map(|e| e.chunk.doc_name.as_str())
        .collect::<HashSet<_>>()
        .len();

    IndexStats {
        total_chunks: entries.len(),
        handbook_chunks,
        example_chunks: entries.len() - handbook_chunks,
        unique_docs,
    }
}

/// Cosine similarity in [-1, 1]. A zero-norm vector (or a dimension
/// mismatch) scores [`MIN_SCORE`] instead of dividing by zero.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return MIN_SCORE;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return MIN_SCORE;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

/// Execute the two-class query boundary: one top-`k` list per document
/// class plus the shared index statistics.
///
/// An empty query (or `k` of zero) is normalized to empty result lists; a
/// search subsystem degrades gracefully under bad input rather than failing.
#[inline]
pub fn run_query(
    index: &LoadedIndex,
    client: &EmbeddingClient,
    query: &str,
    k: usize,
) -> Result<QueryResponse> {
    let trimmed = query.trim();
    if trimmed.is_empty() || k == 0 {
        return Ok(QueryResponse {
            query: trimmed.to_string(),
            index_stats: index.stats(),
            handbooks: Vec::new(),
            examples: Vec::new(),
        });
    }

    let query_vector = client.embed_query(trimmed)?;

    Ok(QueryResponse {
        query: trimmed.to_string(),
        index_stats: index.stats(),
        handbooks: index.search(&query_vector, k, Some(FolderType::Handbook)),
        examples: index.search(&query_vector, k, Some(FolderType::Example)),
    })
}
