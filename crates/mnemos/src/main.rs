//! Command-line front end for the conversation memory engine.

mod app;
mod ollama;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use log::{info, warn};
use mnemos_config::{LayeredConfigOptions, MnemosConfig};
use mnemos_memory::{
    Collaborators, ConversationMemory, ExchangeOutcome, FallbackTokenCounter, RecordStatus,
    RetrievedItem,
};
use ollama::OllamaClient;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Command-line options.
#[derive(Parser)]
#[command(name = "mnemos", version)]
struct Cli {
    /// Extra mnemos.json5 layer applied after the discovered ones
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one exchange and print the reply
    Chat {
        /// Message to send
        message: String,
    },
    /// Interactive exchange loop on stdin
    Repl,
    /// Record every non-empty line of a file as a lone utterance
    Ingest {
        /// Provenance tag stored with each line
        #[arg(long, default_value = "import")]
        origin: String,
        file: PathBuf,
    },
    /// Semantic retrieval without generation
    Recall {
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long)]
        min_score: Option<f64>,
    },
    /// Print the most recent transcript rows
    Tail {
        #[arg(short = 'n', long, default_value_t = 20)]
        count: usize,
    },
    /// Show model, bound collection, and checkpoint
    Status,
}

fn main() -> anyhow::Result<()> {
    let _ = env_logger::builder()
        .format_timestamp_millis()
        .parse_default_env()
        .try_init();

    let cli = Cli::parse();
    let cwd = std::env::current_dir().context("failed to resolve working directory")?;
    let mut options = LayeredConfigOptions::new(&cwd);
    if let Some(path) = &cli.config {
        options = options.with_runtime_path(path);
    }
    let layered = MnemosConfig::load_layered_with_options(options)?;
    info!(
        "starting mnemos (model={}, layers={})",
        layered.config.model,
        layered.layers.len()
    );
    let config = layered.config;

    let client = Arc::new(
        OllamaClient::new(
            config.ollama.base_url.clone(),
            config.model.clone(),
            config.ollama.embedding_model.clone(),
        )
        .context("failed to build HTTP client")?,
    );
    let collaborators = Collaborators {
        embedder: client.clone(),
        generator: client.clone(),
        tokens: FallbackTokenCounter::whitespace_only(),
    };
    let context_window = app::context_window(&config, || client.context_length());
    let memory = app::open_memory(&config, &cwd, collaborators, context_window)?;

    match cli.command {
        Command::Chat { message } => {
            let outcome = memory.exchange(&message);
            print_outcome(&outcome);
        }
        Command::Repl => run_repl(&memory)?,
        Command::Ingest { origin, file } => ingest_file(&memory, &file, &origin)?,
        Command::Recall {
            query,
            top_k,
            min_score,
        } => {
            let settings = memory.settings();
            let items = memory.recall(
                &query,
                top_k.unwrap_or(settings.top_k),
                min_score.unwrap_or(settings.min_score),
            );
            if items.is_empty() {
                println!("no memories above threshold");
            }
            print_citations(&items);
        }
        Command::Tail { count } => {
            for turn in memory.tail(count)? {
                println!(
                    "#{} [{}] {}: {}",
                    turn.id,
                    turn.created_at.format("%Y-%m-%d %H:%M:%S"),
                    turn.role.label(),
                    turn.content
                );
            }
        }
        Command::Status => {
            let status = memory.status()?;
            println!("model:      {}", status.model);
            println!("collection: {}", status.collection);
            println!("checkpoint: {}", status.checkpoint);
            println!("points:     {}", status.points);
        }
    }
    Ok(())
}

fn run_repl(memory: &ConversationMemory) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let message = line.trim();
        match message {
            "" => continue,
            "/exit" | "/quit" => break,
            _ => print_outcome(&memory.exchange(message)),
        }
    }
    Ok(())
}

fn ingest_file(memory: &ConversationMemory, file: &Path, origin: &str) -> anyhow::Result<()> {
    if origin.trim().is_empty() {
        bail!("--origin must not be empty");
    }
    let contents =
        fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
    let mut recorded = 0usize;
    for line in contents.lines().map(str::trim).filter(|line| !line.is_empty()) {
        memory
            .ingest(line, origin)
            .with_context(|| format!("failed to record line {}", recorded + 1))?;
        recorded += 1;
    }
    println!("recorded {recorded} lines from {}", file.display());
    Ok(())
}

fn print_outcome(outcome: &ExchangeOutcome) {
    println!("{}", outcome.reply);
    if !outcome.retrieved.is_empty() {
        println!();
        print_citations(&outcome.retrieved);
    }
    if let RecordStatus::NotSaved { reason } = &outcome.record {
        warn!("exchange not saved: {reason}");
        eprintln!("warning: this exchange was not saved ({reason})");
    }
}

fn print_citations(items: &[RetrievedItem]) {
    for (idx, item) in items.iter().enumerate() {
        println!("[{}] {}", idx + 1, item.source_label);
        for line in item.text.lines() {
            println!("    {line}");
        }
    }
}
