mod app;
mod config;
mod db;
mod error;
mod generate;
mod ingest;
mod parser;
mod review;
mod schedule;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use app::AppContext;
use ingest::{FileOutcome, Ingestor};
use review::ReviewSession;

#[derive(Parser)]
#[command(name = "flashgen", about = "Generate flashcards from notes and review them")]
struct Cli {
    /// Configuration file (default: ./config.yaml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Database path, overriding the configured one
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate flashcards for every markdown file under a path
    Generate {
        /// File or directory to ingest
        #[arg(short, long)]
        path: PathBuf,
        /// Model name (default: from configuration)
        #[arg(short, long)]
        model: Option<String>,
    },
    /// Review due flashcards (default command)
    Review {
        /// Only review cards generated from these files
        #[arg(short, long)]
        file: Vec<PathBuf>,
    },
    /// List files that already have flashcards
    Files,
    /// Show flashcard statistics
    Stats,
    /// Inspect and edit stored flashcards
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// List every flashcard
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Edit fields of one flashcard
    Edit {
        id: i64,
        #[arg(long)]
        question: Option<String>,
        #[arg(long)]
        answer: Option<String>,
        #[arg(long)]
        file: Option<String>,
        #[arg(long, allow_negative_numbers = true)]
        revisit_in: Option<i64>,
    },
    /// Delete one flashcard
    Delete { id: i64 },
    /// Make every flashcard due again
    Reset,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let ctx = AppContext::new(cli.config.as_deref(), cli.db.as_deref())?;

    let result = match cli.command.unwrap_or(Commands::Review { file: Vec::new() }) {
        Commands::Generate { path, model } => generate(&ctx, &path, model.as_deref()).await,
        Commands::Review { file } => review(&ctx, &file),
        Commands::Files => {
            let files = ctx.store.list_distinct_files()?;
            if files.is_empty() {
                println!("No processed files. Run 'generate' first.");
            }
            for f in files {
                println!("{}", f);
            }
            Ok(())
        }
        Commands::Stats => {
            let s = ctx.store.stats()?;
            println!("Flashcards: {}", s.total);
            println!("Due:        {}", s.due);
            println!("Files:      {}", s.files);
            Ok(())
        }
        Commands::Admin { action } => admin(&ctx, action),
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn generate(ctx: &AppContext, path: &Path, model: Option<&str>) -> anyhow::Result<()> {
    let generator = ctx.generator(model);
    println!(
        "Model: {} | Endpoint: {} | Database: {}",
        model.unwrap_or(&ctx.settings.ollama.model),
        ctx.settings.ollama.url,
        ctx.settings.database.path.display()
    );

    let ingestor = Ingestor::new(&ctx.store, generator, ctx.settings.ollama.timeout());
    let report = ingestor
        .ingest_path(path)
        .await
        .with_context(|| format!("Cannot ingest {}", path.display()))?;

    println!(
        "\n{} files: {} processed, {} skipped, {} failed. {} flashcards inserted.",
        report.files.len(),
        report.processed(),
        report.skipped(),
        report.failed(),
        report.inserted()
    );
    for (file, outcome) in &report.files {
        if let FileOutcome::Failed(e) = outcome {
            println!("  failed: {}: {}", file.display(), e);
        }
    }
    Ok(())
}

fn review(ctx: &AppContext, files: &[PathBuf]) -> anyhow::Result<()> {
    let cards = if files.is_empty() {
        ctx.store.query_due()?
    } else {
        // Cards are keyed by absolute path.
        let keys = files
            .iter()
            .map(|f| {
                std::path::absolute(f)
                    .map(|p| p.to_string_lossy().to_string())
                    .with_context(|| format!("Invalid path {}", f.display()))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        ctx.store.query_due_for_files(&keys)?
    };

    let Some(mut session) = ReviewSession::start(cards) else {
        println!("No flashcards due for review.");
        return Ok(());
    };

    let ran = review::terminal::run(&mut session);
    // Persist whatever was answered, even if the terminal driver failed.
    let report = review::write_back(&ctx.store, session);

    println!(
        "Reviewed {} flashcards: {} correct, {} incorrect, {} not reached.",
        report.correct + report.incorrect,
        report.correct,
        report.incorrect,
        report.unanswered
    );
    for (id, e) in &report.failed {
        eprintln!("Failed to save flashcard {}: {}", id, e);
    }
    ran
}

fn admin(ctx: &AppContext, action: AdminAction) -> anyhow::Result<()> {
    match action {
        AdminAction::List { json } => {
            let cards = ctx.store.query_all()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&cards)?);
                return Ok(());
            }
            if cards.is_empty() {
                println!("No flashcards.");
                return Ok(());
            }

            println!(
                "{:>5} | {:<32} | {:<32} | {:>6} | {:<24}",
                "ID", "Question", "Answer", "Due in", "File"
            );
            println!("{}", "-".repeat(111));
            for c in &cards {
                println!(
                    "{:>5} | {:<32} | {:<32} | {:>6} | {:<24}",
                    c.id,
                    truncate(&c.question, 29),
                    truncate(&c.answer, 29),
                    due_label(c.revisit_in),
                    truncate(&file_name(&c.file), 21)
                );
            }
            println!("\n{} flashcards", cards.len());
            Ok(())
        }
        AdminAction::Edit {
            id,
            question,
            answer,
            file,
            revisit_in,
        } => {
            let Some(mut card) = ctx.store.get(id)? else {
                bail!("Flashcard {} not found", id);
            };
            if question.is_none() && answer.is_none() && file.is_none() && revisit_in.is_none()
            {
                println!("Nothing to change for flashcard {}.", id);
                return Ok(());
            }
            if let Some(q) = question {
                card.question = q;
            }
            if let Some(a) = answer {
                card.answer = a;
            }
            if let Some(f) = file {
                card.file = f;
            }
            if let Some(r) = revisit_in {
                card.revisit_in = r;
            }
            ctx.store.update_full(&card)?;
            println!("Updated flashcard {}.", id);
            Ok(())
        }
        AdminAction::Delete { id } => {
            ctx.store
                .delete(id)
                .with_context(|| format!("Cannot delete flashcard {}", id))?;
            println!("Deleted flashcard {}.", id);
            Ok(())
        }
        AdminAction::Reset => {
            let n = ctx.store.reset_all()?;
            println!("Reset {} flashcards; all are due now.", n);
            Ok(())
        }
    }
}

fn due_label(revisit_in: i64) -> String {
    if schedule::is_due(revisit_in) {
        "now".into()
    } else {
        format!("{}d", revisit_in)
    }
}

fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}

fn truncate(s: &str, max: usize) -> String {
    let s = s.replace('\n', " ");
    if s.chars().count() <= max {
        s
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
