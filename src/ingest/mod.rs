
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::GroundingError;
use crate::chunker::{self, ChunkRecord, FolderType};
use crate::config::Config;
use crate::embeddings::EmbeddingClient;
use crate::store::{EmbeddingRecord, IndexStore};

/// Black-box seam for turning a source document into plain text. PDF (or
/// any other format) extraction plugs in here; the pipeline only sees text
/// or failure.
pub trait TextExtractor {
    /// Whether this extractor can handle the given file at all. Unsupported
    /// files are skipped without counting as failures.
    fn supports(&self, path: &Path) -> bool;

    fn extract(&self, path: &Path) -> Result<String>;
}

/// Reads pre-extracted plain text (`.txt`/`.md`) documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    #[inline]
    fn supports(&self, path: &Path) -> bool {
        matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("txt" | "md")
        )
    }

    #[inline]
    fn extract(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).map_err(|e| {
            GroundingError::Extraction(format!("Failed to read {}: {e}", path.display())).into()
        })
    }
}

/// One source document discovered in the corpus directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub folder_type: FolderType,
    pub path: PathBuf,
    pub doc_name: String,
    pub doc_path: String,
}

/// Summary of a completed ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub documents_processed: usize,
    pub documents_skipped: usize,
    pub chunks_created: usize,
    pub embeddings_generated: usize,
}

/// The single-pass ingestion pipeline: corpus listing, text extraction,
/// chunking, embedding, and a wholesale index write.
pub struct Ingestor<'a, E: TextExtractor> {
    config: &'a Config,
    extractor: E,
    client: EmbeddingClient,
}

impl<'a, E: TextExtractor> Ingestor<'a, E> {
    #[inline]
    pub fn new(config: &'a Config, extractor: E, client: EmbeddingClient) -> Self {
        Self {
            config,
            extractor,
            client,
        }
    }

    /// Run ingestion end to end.
    ///
    /// A document whose text cannot be extracted is logged and skipped; the
    /// corpus is best-effort across many documents. An embedding failure is
    /// fatal for the whole run, and nothing is persisted in that case.
    #[inline]
    pub fn run(&self) -> Result<IngestStats> {
        let documents = list_corpus_documents(self.config)?;
        info!("Discovered {} corpus documents", documents.len());

        let mut stats = IngestStats::default();
        let mut chunks: Vec<ChunkRecord> = Vec::new();
        let mut seen_docs: HashSet<(FolderType, String)> = HashSet::new();

        let progress = ProgressBar::new(documents.len() as u64);
        if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}") {
            progress.set_style(style);
        }

        for document in &documents {
            progress.set_message(document.doc_name.clone());

            if !self.extractor.supports(&document.path) {
                debug!("Skipping unsupported file: {}", document.path.display());
                progress.inc(1);
                continue;
            }

            // Chunk ids are (class, document name, index); two supported
            // files with the same stem in one class would collide and the
            // index would silently drop one of them at load time.
            if !seen_docs.insert((document.folder_type, document.doc_name.clone())) {
                progress.finish_and_clear();
                anyhow::bail!(
                    "Duplicate document name '{}' in the {} corpus ({}); chunk ids must be unique",
                    document.doc_name,
                    document.folder_type,
                    document.path.display()
                );
            }

            let text = match self.extractor.extract(&document.path) {
                Ok(text) => text,
                Err(e) => {
                    warn!(
                        "Failed to extract text from {}: {e:#}; skipping",
                        document.path.display()
                    );
                    stats.documents_skipped += 1;
                    progress.inc(1);
                    continue;
                }
            };

            let document_chunks = chunker::chunk_document(
                document.folder_type,
                &document.doc_name,
                &document.doc_path,
                &text,
                &self.config.chunking,
            )?;

            if document_chunks.is_empty() {
                warn!("Document '{}' yielded no chunks", document.doc_name);
            }

            stats.documents_processed += 1;
            stats.chunks_created += document_chunks.len();
            chunks.extend(document_chunks);
            progress.inc(1);
        }
        progress.finish_and_clear();

        info!(
            "Chunked {} documents into {} chunks; generating embeddings",
            stats.documents_processed, stats.chunks_created
        );

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self
            .client
            .embed_texts(&texts)
            .context("Embedding failed; aborting ingestion without persisting a partial index")?;
        stats.embeddings_generated = vectors.len();

        let embeddings: Vec<EmbeddingRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, embedding)| EmbeddingRecord {
                id: chunk.id.clone(),
                embedding,
            })
            .collect();

        let store = IndexStore::new(&self.config.corpus.index_dir);
        store.write(&chunks, &embeddings)?;

        Ok(stats)
    }
}

/// List the two corpus directories in a deterministic order: handbooks
/// before examples, documents sorted by file name within each class. Chunk
/// id assignment depends on this ordering being stable across runs.
#[inline]
pub fn list_corpus_documents(config: &Config) -> Result<Vec<SourceDocument>> {
    let mut documents = Vec::new();

    let roots = [
        (FolderType::Handbook, &config.corpus.handbook_dir),
        (FolderType::Example, &config.corpus.example_dir),
    ];

    for (folder_type, dir) in roots {
        let entries = fs::read_dir(dir)
            .with_context(|| format!("Failed to list corpus directory: {}", dir.display()))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        files.sort();

        for path in files {
            let Some(doc_name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                warn!("Skipping file with unusable name: {}", path.display());
                continue;
            };

            documents.push(SourceDocument {
                folder_type,
                doc_name: doc_name.to_string(),
                doc_path: path.display().to_string(),
                path,
            });
        }
    }

    Ok(documents)
}
