//! Subcommand implementations.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use lore_corpus::{
    ChunkStore, ChunkSummary, CorpusChunker, RecursiveChunker, load_chunks, load_pages,
};
use lore_rag::{AskResponse, ConversationHistory, CorpusIndexer, RagConfig, RagEngine, providers};

/// `lore chunk`: split pages into chunk records and write a summary.
pub async fn chunk(config: &RagConfig, pages: &Path, out_dir: &Path) -> Result<()> {
    let pages = load_pages(pages)
        .await
        .with_context(|| format!("failed to read pages from {}", pages.display()))?;

    let chunker_config = config.chunking.chunker_config();
    let chunker = CorpusChunker::new(
        RecursiveChunker::new(chunker_config.clone())?,
        config.chunking.source.as_str(),
    );
    let chunks = chunker.chunk_pages(&pages);

    let store = ChunkStore::new(out_dir).await?;
    store.save_chunks(&chunks).await?;
    let summary = ChunkSummary::from_chunks(&chunks, &chunker_config);
    store.save_summary(&summary).await?;

    println!(
        "Chunked {} pages into {} chunks (average {:.0} characters)",
        pages.len(),
        summary.total_chunks,
        summary.average_chunk_length
    );
    println!("Wrote {}", store.chunks_path().display());
    Ok(())
}

/// `lore index`: embed chunk records and load them into the configured index.
pub async fn index(config: &RagConfig, chunks: &Path) -> Result<()> {
    let chunks = load_chunks(chunks)
        .await
        .with_context(|| format!("failed to read chunks from {}", chunks.display()))?;

    let embedder = providers::embedder(&config.embedding)?;
    let index = providers::open_index(&config.index, config.embedding.dimension).await?;
    let indexer = CorpusIndexer::new(embedder, index, config.indexing.clone());
    let report = indexer.index(&chunks).await?;

    if report.failed_batches > 0 {
        warn!(
            "{} upsert batches failed; re-run `lore index` to retry",
            report.failed_batches
        );
    }
    println!(
        "Indexed {} of {} chunks; the index now holds {} vectors",
        report.upserted, report.chunks, report.total_vectors
    );
    Ok(())
}

/// `lore ask`: answer one question without history.
pub async fn ask(config: &RagConfig, question: &str) -> Result<()> {
    let engine = RagEngine::from_config(config).await?;
    let mut history = ConversationHistory::new();
    let response = engine.ask(question, &mut history).await?;
    print_response(&response);
    Ok(())
}

/// A line typed in `lore chat`.
#[derive(Debug, PartialEq, Eq)]
enum ChatInput<'a> {
    Empty,
    Quit,
    Clear,
    History,
    Question(&'a str),
}

impl<'a> ChatInput<'a> {
    fn parse(line: &'a str) -> Self {
        match line.trim() {
            "" => Self::Empty,
            "/quit" | "/exit" => Self::Quit,
            "/clear" => Self::Clear,
            "/history" => Self::History,
            question => Self::Question(question),
        }
    }
}

/// `lore chat`: multi-turn conversation on stdin.
pub async fn chat(config: &RagConfig) -> Result<()> {
    let engine = RagEngine::from_config(config).await?;
    let mut history = ConversationHistory::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Ask about the wiki. Commands: /clear, /history, /quit");
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match ChatInput::parse(&line) {
            ChatInput::Empty => {}
            ChatInput::Quit => break,
            ChatInput::Clear => {
                engine.clear_history(&mut history);
                println!("History cleared.");
            }
            ChatInput::History => {
                println!("{}", serde_json::to_string_pretty(&history)?);
            }
            ChatInput::Question(question) => match engine.ask(question, &mut history).await {
                Ok(response) => print_response(&response),
                Err(e) => eprintln!("error: {e}"),
            },
        }
    }
    Ok(())
}

/// `lore stats`: describe the configured index.
pub async fn stats(config: &RagConfig) -> Result<()> {
    let index = providers::open_index(&config.index, config.embedding.dimension).await?;
    let stats = index.stats().await?;

    println!("index:     {}", index.name());
    println!("vectors:   {}", stats.total_vectors);
    println!("dimension: {}", stats.dimension);
    Ok(())
}

/// `lore setup`: create the configured Pinecone index and test it.
pub async fn setup(config: &RagConfig) -> Result<()> {
    let admin = providers::pinecone_admin()?;
    let spec = providers::serverless_spec(&config.index, config.embedding.dimension);
    let report = providers::setup_pinecone(&admin, &spec, Duration::from_secs(1))
        .await
        .with_context(|| format!("failed to set up Pinecone index {}", spec.name))?;

    if report.created {
        println!("Created index {}", report.index.name);
    } else {
        println!("Index {} already exists", report.index.name);
    }
    println!("host:      {}", report.index.host);
    println!("dimension: {}", report.index.dimension);
    println!("vectors:   {}", report.total_vectors);

    if config.index.host.as_deref() != Some(report.index.host.as_str()) {
        println!("\nSet `host = \"{}\"` under [index] to use it.", report.index.host);
    }
    Ok(())
}

fn print_response(response: &AskResponse) {
    println!("\n{}\n", response.answer);

    if !response.grounded {
        println!("(no relevant wiki passages were found)");
        return;
    }

    println!("Sources:");
    for (i, rc) in response.chunks.iter().enumerate() {
        println!(
            "  [{}] {:.3}  {}  {}",
            i + 1,
            rc.score,
            rc.chunk.source_title(),
            rc.chunk.source_url()
        );
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_chat_input() {
        assert_eq!(ChatInput::parse("  "), ChatInput::Empty);
        assert_eq!(ChatInput::parse("/quit"), ChatInput::Quit);
        assert_eq!(ChatInput::parse("/clear\n"), ChatInput::Clear);
        assert_eq!(ChatInput::parse("/history"), ChatInput::History);
        assert_eq!(
            ChatInput::parse(" Who is Radahn? "),
            ChatInput::Question("Who is Radahn?")
        );
    }

    #[tokio::test]
    async fn test_chunk_command_writes_records_and_summary() {
        let temp_dir = TempDir::new().unwrap();
        let pages_path = temp_dir.path().join("cleaned_data.json");
        std::fs::write(
            &pages_path,
            serde_json::json!([
                { "url": "https://wiki/x", "title": "X", "content": "A. B. C." }
            ])
            .to_string(),
        )
        .unwrap();

        let mut config = RagConfig::default();
        config.chunking.chunk_size = 5;
        config.chunking.overlap = 2;
        let out_dir = temp_dir.path().join("out");

        chunk(&config, &pages_path, &out_dir).await.unwrap();

        let chunks = load_chunks(out_dir.join("text_chunks.json")).await.unwrap();
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["A. B", "B. C."]);
        assert!(out_dir.join("chunking_summary.json").exists());
    }
}
