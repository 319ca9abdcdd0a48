
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::GroundingError;
use crate::chunker::ChunkRecord;

pub const CHUNKS_FILE: &str = "chunks.jsonl";
pub const EMBEDDINGS_FILE: &str = "embeddings.jsonl";

/// One embedding per chunk, keyed by the chunk id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingRecord {
    pub id: String,
    pub embedding: Vec<f32>,
}

/// Durable representation of a completed ingestion run: a chunk file and an
/// embedding file, written as a matched pair. There is no append or update;
/// a new run replaces the whole snapshot.
#[derive(Debug, Clone)]
pub struct IndexStore {
    dir: PathBuf,
}

impl IndexStore {
    #[inline]
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[inline]
    pub fn chunks_path(&self) -> PathBuf {
        self.dir.join(CHUNKS_FILE)
    }

    #[inline]
    pub fn embeddings_path(&self) -> PathBuf {
        self.dir.join(EMBEDDINGS_FILE)
    }

    /// Whether both halves of a persisted index are present.
    #[inline]
    pub fn exists(&self) -> bool {
        self.chunks_path().exists() && self.embeddings_path().exists()
    }

    /// Persist a complete snapshot, replacing any prior index.
    ///
    /// Both files are written into a staging directory that becomes the
    /// index directory in a single rename, so a reader (or a crash between
    /// steps) never observes a new chunk file paired with an old embedding
    /// file. Because chunk ids are stable across runs, a keyed join could
    /// not detect such a mix after the fact; it has to be impossible here.
    #[inline]
    pub fn write(&self, chunks: &[ChunkRecord], embeddings: &[EmbeddingRecord]) -> Result<()> {
        if chunks.len() != embeddings.len() {
            return Err(GroundingError::Index(format!(
                "Refusing to persist a partial index: {} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            ))
            .into());
        }

        let mut ids = HashSet::with_capacity(chunks.len());
        for chunk in chunks {
            if !ids.insert(chunk.id.as_str()) {
                return Err(GroundingError::Index(format!(
                    "Refusing to persist duplicate chunk id '{}'",
                    chunk.id
                ))
                .into());
            }
        }

        let staging = self.staging_path();
        if staging.exists() {
            fs::remove_dir_all(&staging).with_context(|| {
                format!(
                    "Failed to clear stale staging directory: {}",
                    staging.display()
                )
            })?;
        }
        fs::create_dir_all(&staging).with_context(|| {
            format!("Failed to create staging directory: {}", staging.display())
        })?;

        let staged = write_jsonl(&staging.join(CHUNKS_FILE), chunks)
            .and_then(|()| write_jsonl(&staging.join(EMBEDDINGS_FILE), embeddings));
        if let Err(e) = staged {
            // Leave nothing half-written behind.
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        if self.dir.exists() {
            fs::remove_dir_all(&self.dir).with_context(|| {
                format!("Failed to remove prior index: {}", self.dir.display())
            })?;
        }
        fs::rename(&staging, &self.dir).with_context(|| {
            format!("Failed to move staged index into place: {}", self.dir.display())
        })?;

        info!(
            "Persisted index with {} chunks to {}",
            chunks.len(),
            self.dir.display()
        );
        Ok(())
    }

    /// Sibling directory the next snapshot is assembled in before the swap.
    fn staging_path(&self) -> PathBuf {
        let mut name = self.dir.file_name().unwrap_or_default().to_os_string();
        name.push(".staging");
        self.dir.with_file_name(name)
    }

    #[inline]
    pub fn load_chunks(&self) -> Result<Vec<ChunkRecord>> {
        load_jsonl(&self.chunks_path())
    }

    #[inline]
    pub fn load_embeddings(&self) -> Result<Vec<EmbeddingRecord>> {
        load_jsonl(&self.embeddings_path())
    }
}

fn write_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create index file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    for record in records {
        serde_json::to_writer(&mut writer, record)
            .with_context(|| format!("Failed to serialize record for {}", path.display()))?;
        writer.write_all(b"\n")?;
    }

    writer.flush()?;
    debug!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}

/// Parse one record per line. Any malformed line rejects the file wholesale;
/// serving against a partially parseable index is never acceptable.
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open index file: {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    for (line_number, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }

        let record: T = serde_json::from_str(&line).map_err(|e| {
            GroundingError::Index(format!(
                "Malformed record at {}:{}: {}",
                path.display(),
                line_number + 1,
                e
            ))
        })?;
        records.push(record);
    }

    debug!("Loaded {} records from {}", records.len(), path.display());
    Ok(records)
}
