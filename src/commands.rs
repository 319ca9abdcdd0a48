use anyhow::{Context, Result};
use tracing::info;

use crate::config::Config;
use crate::coverage::assess_coverage;
use crate::embeddings::EmbeddingClient;
use crate::ingest::{Ingestor, PlainTextExtractor};
use crate::retriever::{LoadedIndex, RetrievalResult, run_query};
use crate::store::IndexStore;

/// Run a full ingestion pass over the configured corpus directories.
#[inline]
pub fn ingest(config: &Config) -> Result<()> {
    // Credential and URL problems surface here, before any document work.
    let client =
        EmbeddingClient::new(&config.embedding).context("Embedding client configuration failed")?;

    info!("Starting ingestion run");
    let ingestor = Ingestor::new(config, PlainTextExtractor, client);
    let stats = ingestor.run()?;

    println!("Ingestion complete:");
    println!("  Documents processed: {}", stats.documents_processed);
    if stats.documents_skipped > 0 {
        println!("  Documents skipped:   {}", stats.documents_skipped);
    }
    println!("  Chunks created:      {}", stats.chunks_created);
    println!("  Embeddings:          {}", stats.embeddings_generated);
    println!(
        "  Index written to:    {}",
        config.corpus.index_dir.display()
    );

    Ok(())
}

/// Execute a query against the persisted index and print both ranked lists
/// plus the coverage verdict for the handbook results.
#[inline]
pub fn query(config: &Config, query_text: &str, k: usize, topics: &[String]) -> Result<()> {
    let store = IndexStore::new(&config.corpus.index_dir);
    if !store.exists() {
        anyhow::bail!(
            "No index found at {}; run 'plan-grounding ingest' first",
            config.corpus.index_dir.display()
        );
    }

    let index = LoadedIndex::load(&store)?;
    let client =
        EmbeddingClient::new(&config.embedding).context("Embedding client configuration failed")?;

    let response = run_query(&index, &client, query_text, k)?;

    let stats = response.index_stats;
    println!(
        "Index: {} chunks ({} handbook, {} example) across {} documents",
        stats.total_chunks, stats.handbook_chunks, stats.example_chunks, stats.unique_docs
    );
    println!();

    print_results("Handbook matches", &response.handbooks);
    print_results("Example matches", &response.examples);

    let verdict = assess_coverage(&response.handbooks, topics);
    if verdict.sufficient {
        println!(
            "✅ Coverage sufficient (top score {:.3}, threshold {:.2})",
            verdict.detail.top_score.unwrap_or_default(),
            verdict.detail.threshold
        );
    } else {
        println!(
            "❌ Coverage insufficient (top score {}, threshold {:.2})",
            verdict
                .detail
                .top_score
                .map_or_else(|| "none".to_string(), |s| format!("{s:.3}")),
            verdict.detail.threshold
        );
        if !verdict.missing.is_empty() {
            println!("   Missing topics: {}", verdict.missing.join(", "));
        }
    }

    Ok(())
}

fn print_results(heading: &str, results: &[RetrievalResult]) {
    println!("{} ({}):", heading, results.len());
    if results.is_empty() {
        println!("  (none)");
    }
    for result in results {
        let location = match (&result.section_or_figure, result.page_number) {
            (Some(section), Some(page)) => format!(" [{section}, page {page}]"),
            (Some(section), None) => format!(" [{section}]"),
            (None, Some(page)) => format!(" [page {page}]"),
            (None, None) => String::new(),
        };
        println!("  {:.3}  {} ({}){}", result.score, result.id, result.doc_name, location);
        let preview: String = result.snippet.chars().take(100).collect();
        println!("         {preview}");
    }
    println!();
}

/// Report index readiness: statistics only, no query.
#[inline]
pub fn status(config: &Config) -> Result<()> {
    println!("📊 Grounding Index Status");

    let store = IndexStore::new(&config.corpus.index_dir);
    if !store.exists() {
        println!(
            "   ❌ No index at {} (run 'plan-grounding ingest')",
            config.corpus.index_dir.display()
        );
        return Ok(());
    }

    let index = LoadedIndex::load(&store)?;
    let stats = index.stats();
    println!("   ✅ Index: {}", config.corpus.index_dir.display());
    println!("   Total chunks:    {}", stats.total_chunks);
    println!("   Handbook chunks: {}", stats.handbook_chunks);
    println!("   Example chunks:  {}", stats.example_chunks);
    println!("   Unique docs:     {}", stats.unique_docs);

    Ok(())
}

/// Print the active configuration as TOML.
#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    let rendered =
        toml::to_string_pretty(config).context("Failed to serialize configuration")?;
    println!("# {}", config.base_dir.join("config.toml").display());
    print!("{rendered}");
    Ok(())
}
