//! CLI entry point: index a course export, then ask questions against the saved index.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use coursequery_core::answer::{prepare, Reply};
use coursequery_core::{
    app_data_dir, build_course_index, load_config, load_config_from, section_hint, set_index_dir,
    status, Config, CourseIndex, DirectorySource, IndexStore, OllamaClient, Outcome, Retriever,
    SectionType, StoreError, TimeFilter,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "coursequery")]
#[command(about = "Ask questions about your course content")]
struct Cli {
    /// Config file to use instead of the one in the app data directory.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Show backend status and saved indexes.
    Status,
    /// Show where coursequery stores its config and indexes (app data directory).
    DataDir,
    /// Store course indexes in PATH from now on.
    SetIndexDir {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
    /// Index a course from a local export (<DIR>/<COURSE>/<section>/*.md). Replaces any previous index.
    Index {
        #[arg(long, value_name = "ID")]
        course: String,
        /// Course name or code, used to find the course by name and in prompts.
        #[arg(long)]
        name: Option<String>,
        /// Root of the content export.
        #[arg(long, value_name = "DIR")]
        content: PathBuf,
        /// Maximum characters per segment (default from config).
        #[arg(long)]
        max_chars: Option<usize>,
    },
    /// Summarize a saved course index.
    ShowIndex {
        /// Course id, or part of its name or code.
        #[arg(long, value_name = "COURSE")]
        course: String,
    },
    /// Ask a question about a course.
    Ask {
        /// Course id, or part of its name or code.
        #[arg(long, value_name = "COURSE")]
        course: String,
        /// Course name used in the prompt (defaults to the name saved with the index).
        #[arg(long)]
        course_name: Option<String>,
        /// Reference time for "last week" and friends (RFC 3339). Defaults to now.
        #[arg(long, value_name = "RFC3339")]
        now: Option<DateTime<Utc>>,
        /// Number of segments to retrieve (default from config).
        #[arg(short, long)]
        k: Option<usize>,
        /// Print the retrieved segments instead of asking the model.
        #[arg(long)]
        context_only: bool,
        /// With --context-only, print JSON.
        #[arg(long)]
        json: bool,
        #[arg(value_name = "QUESTION", required = true, num_args = 1..)]
        question: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let err = match run(Cli::parse()).await {
        Ok(()) => return Ok(ExitCode::SUCCESS),
        Err(e) => e,
    };
    if let Some(e) = course_guidance(&err) {
        eprintln!("{e}");
        return Ok(ExitCode::from(2));
    }
    Err(err)
}

/// Missing or ambiguous course: the message is the guidance, and the exit status is 2.
fn course_guidance(err: &anyhow::Error) -> Option<&StoreError> {
    err.downcast_ref::<StoreError>().filter(|e| {
        matches!(
            e,
            StoreError::IndexNotFound { .. } | StoreError::AmbiguousCourse { .. }
        )
    })
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_config_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => load_config(),
    };

    match cli.command.unwrap_or(Commands::Status) {
        Commands::Status => {
            println!("coursequery backend");
            println!("  core: {}", status());
            let store = IndexStore::from_config(&config)?;
            let courses = store.list()?;
            println!("  indexes: {} ({} course(s))", store.dir().display(), courses.len());
            for id in courses {
                println!("    {id}");
            }
        }
        Commands::DataDir => match app_data_dir() {
            Some(p) => println!("{}", p.display()),
            None => eprintln!("Could not determine app data directory."),
        },
        Commands::SetIndexDir { path } => {
            let path = set_index_dir(&path).context("saving index directory")?;
            println!("Indexes will be stored in {}", path.display());
        }
        Commands::Index {
            course,
            name,
            content,
            max_chars,
        } => index(&config, &course, name, content, max_chars).await?,
        Commands::ShowIndex { course } => show_index(&config, &course)?,
        Commands::Ask {
            course,
            course_name,
            now,
            k,
            context_only,
            json,
            question,
        } => {
            let question = question.join(" ");
            let opts = AskOptions {
                course_name: course_name.as_deref(),
                now: now.unwrap_or_else(Utc::now),
                k: k.unwrap_or(config.top_k),
                context_only,
                json,
            };
            ask(&config, &course, question.trim(), opts).await?;
        }
    }
    Ok(())
}

async fn index(
    config: &Config,
    course: &str,
    name: Option<String>,
    content: PathBuf,
    max_chars: Option<usize>,
) -> Result<()> {
    let client = OllamaClient::from_config(config)?;
    let source = DirectorySource::new(content);
    let (index, report) =
        build_course_index(course, &source, &client, max_chars.unwrap_or(config.max_chars))
            .await
            .with_context(|| format!("indexing course {course}"))?;
    let index = match name {
        Some(name) => index.with_name(name),
        None => index,
    };

    let store = IndexStore::from_config(config)?;
    let path = store.save(course, &index)?;
    println!(
        "Indexed {} item(s) into {} segment(s) -> {}",
        report.items_indexed,
        report.segments,
        path.display()
    );
    if report.items_empty > 0 {
        println!("  {} empty item(s) had nothing to index", report.items_empty);
    }
    if !report.skipped.is_empty() {
        println!("  skipped {} item(s):", report.skipped.len());
        for s in &report.skipped {
            println!("    ✗ {}: {}", s.source_id, s.reason);
        }
    }
    Ok(())
}

fn show_index(config: &Config, course: &str) -> Result<()> {
    let index = load_index(config, course)?;
    println!("Course {}", index.course_id);
    if let Some(name) = &index.course_name {
        println!("  name: {name}");
    }
    println!("  model: {}", index.embed_model);
    println!("  built: {}", index.created_at.to_rfc3339());
    println!(
        "  segments: {} (dimension {})",
        index.len(),
        index.vectors.dimension().unwrap_or(0)
    );
    for section in SectionType::ALL {
        let n = index.segments().iter().filter(|s| s.section == section).count();
        if n > 0 {
            println!("    {:<14} {n}", section.label());
        }
    }
    Ok(())
}

/// Finds the course the user means and loads its index.
fn load_index(config: &Config, course: &str) -> Result<CourseIndex> {
    let store = IndexStore::from_config(config)?;
    let course_id = store.find_course(course)?;
    Ok(store.load(&course_id)?)
}

struct AskOptions<'a> {
    course_name: Option<&'a str>,
    now: DateTime<Utc>,
    k: usize,
    context_only: bool,
    json: bool,
}

async fn ask(config: &Config, course: &str, question: &str, opts: AskOptions<'_>) -> Result<()> {
    let index = load_index(config, course)?;

    let client = OllamaClient::from_config(config)?;
    if index.embed_model != config.embed_model {
        tracing::warn!(
            index_model = %index.embed_model,
            config_model = %config.embed_model,
            "index was built with a different embedding model"
        );
    }
    let retriever = Retriever::new(client.clone(), TimeFilter::new(opts.now), config);
    let scope = retriever.resolve(question);
    let section = section_hint(question);
    tracing::info!(%scope, ?section, "resolved question");

    let retrieval = retriever
        .retrieve_in_section(question, &scope, section, &index, opts.k)
        .await
        .context("retrieving context")?;

    if opts.context_only {
        if opts.json {
            println!("{}", serde_json::to_string_pretty(&retrieval.hits)?);
        } else {
            for hit in &retrieval.hits {
                let date = hit
                    .segment
                    .timestamp
                    .map(|t| t.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "undated".to_string());
                println!(
                    "#{} [{}] {} ({}) score {:.3}",
                    hit.rank, hit.segment.section, hit.segment.source_id, date, hit.score
                );
                println!("{}\n", hit.segment.text.trim());
            }
        }
        if let Outcome::Partial { requested, found } = retrieval.outcome() {
            eprintln!("Only {found} of the {requested} requested item(s) exist.");
        }
        return Ok(());
    }

    let course_name = opts.course_name.or(index.course_name.as_deref());
    match prepare(question, course_name, &retrieval) {
        Reply::Message(message) => println!("{message}"),
        Reply::Prompt(prompt) => {
            let answer = client.complete(&prompt).await.context("asking the model")?;
            if answer.is_empty() {
                eprintln!("No answer generated.");
            } else {
                println!("{answer}");
            }
        }
    }
    Ok(())
}
