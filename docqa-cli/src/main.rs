//! docqa CLI - ask questions about local text files
//!
//! # Commands
//!
//! ```bash
//! # Index a directory of .txt files and ask one question
//! docqa ask data/docs --query "How do I change the port?"
//!
//! # Read questions from stdin, dense retrieval, LLM post-processing
//! docqa ask data/docs --strategy dense --generate
//!
//! # Preview how a document is chunked
//! docqa chunk --size 200 --overlap 20 input.txt
//!
//! # Embed text and show vector stats
//! docqa embed "How do I change the port?" --query
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use docqa_lib::{
    chunk::{Chunker, FixedSizeChunker, UnitMetadata},
    config::PipelineConfig,
    embed::{BgeEmbedder, Embedder},
    generate::{ChatCompletionsConfig, ChatCompletionsGenerator},
    index::{collect_text_files, normalize},
    pipeline::{Pipeline, QaResult},
    read::{ExtractiveModel, OnnxQaConfig, OnnxQaModel, TermOverlapModel},
    retrieve::RetrievalStrategy,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "docqa")]
#[command(about = "Extractive question answering over local text files")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index files and answer questions about them
    Ask(AskArgs),

    /// Chunk a document and show the text units
    Chunk {
        /// Input file to chunk
        input: PathBuf,

        /// Window size in words
        #[arg(long, default_value = "200")]
        size: usize,

        /// Words shared by adjacent windows
        #[arg(long, default_value = "0")]
        overlap: usize,
    },

    /// Embed text and show vector info
    Embed {
        /// Text to embed
        text: String,

        /// Treat as query (uses query prompt prefix)
        #[arg(short, long)]
        query: bool,
    },
}

#[derive(clap::Args)]
struct AskArgs {
    /// Files, or directories of .txt files, to index
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Question to answer; questions are read from stdin when omitted
    #[arg(short, long)]
    query: Option<String>,

    /// Retrieval strategy: "lexical" or "dense"
    #[arg(short, long)]
    strategy: Option<RetrievalStrategy>,

    /// Candidates handed from the retriever to the reader
    #[arg(long)]
    retriever_top_k: Option<usize>,

    /// Answers returned
    #[arg(long)]
    reader_top_k: Option<usize>,

    /// Extractive model
    #[arg(long, value_enum, default_value = "overlap")]
    reader: ReaderKind,

    /// Directory with model.onnx and tokenizer.json (for --reader onnx)
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Phrase a reply from the answers with a chat completions endpoint
    #[arg(short, long)]
    generate: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// JSON pipeline config; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ReaderKind {
    /// Sentences sharing terms with the question, no model files needed
    Overlap,
    /// ONNX export of an extractive QA transformer
    Onnx,
}

fn load_config(args: &AskArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => PipelineConfig::default(),
    };

    if let Some(strategy) = args.strategy {
        config.retrieval_strategy = strategy;
    }
    if let Some(k) = args.retriever_top_k {
        config.retriever_top_k = k;
    }
    if let Some(k) = args.reader_top_k {
        config.reader_top_k = k;
    }
    if args.generate {
        config.generation_enabled = true;
    }

    config.validate()?;
    Ok(config)
}

/// Chat completions settings from the environment (and `.env`).
fn generator_from_env(timeout: Duration) -> Result<ChatCompletionsGenerator> {
    let defaults = ChatCompletionsConfig::default();
    let config = ChatCompletionsConfig {
        base_url: dotenv::var("LLM_BASE_URL").unwrap_or(defaults.base_url),
        model: dotenv::var("LLM_MODEL").unwrap_or(defaults.model),
        api_key: dotenv::var("OPENAI_API_KEY")
            .or_else(|_| dotenv::var("LLM_API_KEY"))
            .ok()
            .filter(|k| !k.is_empty()),
        temperature: defaults.temperature,
        timeout,
    };
    let model = config.model.clone();
    let generator = ChatCompletionsGenerator::new(config)?;
    info!(endpoint = generator.endpoint(), %model, "generation enabled");

    Ok(generator)
}

/// Replace directories with the .txt files they contain.
fn expand_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(collect_text_files(path, "txt")?);
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}

async fn ask(args: AskArgs) -> Result<()> {
    let config = load_config(&args)?;

    match args.reader {
        ReaderKind::Overlap => build(config, TermOverlapModel::default(), &args).await,
        ReaderKind::Onnx => {
            let Some(dir) = &args.model_dir else {
                bail!("--model-dir is required with --reader onnx");
            };
            println!("Loading QA model from {}...", dir.display());
            let model = OnnxQaModel::load(dir, OnnxQaConfig::default())?;
            build(config, model, &args).await
        }
    }
}

async fn build<M: ExtractiveModel>(config: PipelineConfig, model: M, args: &AskArgs) -> Result<()> {
    match config.retrieval_strategy {
        RetrievalStrategy::Lexical => serve(Pipeline::new(config, model)?, args).await,
        RetrievalStrategy::Dense => {
            println!("Loading BGE model (first run downloads ~1.2GB)...");
            let embedder = BgeEmbedder::new()?;
            serve(Pipeline::with_embedder(config, model, embedder)?, args).await
        }
    }
}

async fn serve<M: ExtractiveModel, E: Embedder>(pipeline: Pipeline<M, E>, args: &AskArgs) -> Result<()> {
    let pipeline = if pipeline.config().generation_enabled {
        let timeout = pipeline.config().generation.timeout();
        pipeline.with_generator(generator_from_env(timeout)?)
    } else {
        pipeline
    };

    let files = expand_paths(&args.paths)?;
    let report = pipeline.index_files(&files)?;
    for failure in &report.failures {
        eprintln!("Skipped {}: {}", failure.path.display(), failure.error);
    }
    println!(
        "Indexed {} units from {} files ({} already indexed)",
        report.units.len(),
        files.len().saturating_sub(report.failures.len()),
        report.skipped.len()
    );

    if pipeline.config().retrieval_strategy == RetrievalStrategy::Dense {
        let embedded = pipeline.update_embeddings()?;
        println!("Embedded {embedded} units");
    }

    if let Some(query) = &args.query {
        let result = pipeline.ask(query).await?;
        return print_result(&result, args.json);
    }

    println!("\nAsk a question (Ctrl-D to quit):");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        match pipeline.ask(query).await {
            Ok(result) => print_result(&result, args.json)?,
            Err(e) => eprintln!("Error: {e}"),
        }
    }

    Ok(())
}

fn print_result(result: &QaResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    for warning in &result.warnings {
        eprintln!("Warning: {warning}");
    }

    let Some(best) = result.answers.first() else {
        println!("No answers found.");
        return Ok(());
    };

    println!("\nBest answer: {}", best.text);
    println!("\n=== Answers ===\n");
    for (i, answer) in result.answers.iter().enumerate() {
        let source = answer.source.as_deref().unwrap_or("<inline>");
        println!("#{} (score: {:.4}, source: {source})", i + 1, answer.score);
        println!("---");
        println!("{}\n", answer.context);
    }

    if let Some(generated) = &result.generated_answer {
        println!("=== Generated answer ===\n");
        println!("{generated}\n");
    }

    Ok(())
}

fn chunk(input: &Path, size: usize, overlap: usize) -> Result<()> {
    let text = normalize(&fs::read_to_string(input)?);
    let chunker = FixedSizeChunker::new(size, overlap)?;
    let meta = UnitMetadata {
        source: Some(input.display().to_string()),
        ..Default::default()
    };
    let units = chunker.chunk(&text, meta);

    println!("Chunked '{}' into {} units:\n", input.display(), units.len());
    for (i, unit) in units.iter().enumerate() {
        let words = unit.content.split_whitespace().count();
        println!(
            "--- Unit {} ({words} words at byte {}, id: {}) ---",
            i + 1,
            unit.metadata.position,
            unit.id
        );
        // Show preview (first 200 chars)
        let preview: String = unit.content.chars().take(200).collect();
        let ellipsis = if unit.content.chars().count() > 200 { "..." } else { "" };
        println!("{preview}{ellipsis}\n");
    }

    Ok(())
}

fn embed(text: &str, query: bool) -> Result<()> {
    println!("Loading BGE model (first run downloads ~1.2GB)...");
    let mut embedder = BgeEmbedder::new()?;

    let embedding = if query {
        println!("Embedding as query: {text}");
        embedder.embed_query(text)?
    } else {
        println!("Embedding as document: {text}");
        embedder
            .embed_documents(&[text])?
            .into_iter()
            .next()
            .context("model returned no embedding")?
    };

    let first: Vec<f32> = embedding.iter().take(5).copied().collect();
    println!("\nEmbedding stats:");
    println!("  Model: {}", embedder.model_name());
    println!("  Dimensions: {}", embedding.len());
    println!("  First 5 values: {first:?}");
    println!("  Min: {:.4}", embedding.iter().copied().fold(f32::INFINITY, f32::min));
    println!("  Max: {:.4}", embedding.iter().copied().fold(f32::NEG_INFINITY, f32::max));

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ask(args) => ask(args).await,
        Commands::Chunk {
            input,
            size,
            overlap,
        } => chunk(&input, size, overlap),
        Commands::Embed { text, query } => embed(&text, query),
    }
}
