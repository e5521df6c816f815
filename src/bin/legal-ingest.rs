//! CLI binary for legal-ingest.
//!
//! A thin shim over the library crate: maps flags to `PipelineConfig`, keeps
//! resource records in a `JsonFileStore` directory, and prints JSON results.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use legal_ingest::{
    build_backend, normalize_markdown, sniff_path, ChatAssistant, ChatRequestBody, ContextItem,
    DeclaredFileType, ExtractionMode, JsonFileStore, PipelineConfig, Resource, ResourcePipeline,
    ResourceStore, TextExtractor,
};
use serde::Serialize;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const AFTER_HELP: &str = r#"EXAMPLES:
  # What is this file, really?
  legal-ingest sniff contract.pdf

  # Register an upload, then extract and summarize it
  legal-ingest upload contract.pdf --title "Supply Agreement"
  legal-ingest extract 6f1c…
  legal-ingest summarize 6f1c…

  # Markdown extraction
  legal-ingest --markdown extract 6f1c…

  # Clean up a Markdown file
  legal-ingest normalize notes.md

  # Ask the drafting assistant
  legal-ingest chat --message "Summarise the termination rights" --contexts ctx.json

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY              API key for the OpenAI-compatible endpoint
  LEGAL_INGEST_STORE          Directory holding resource records
  LEGAL_INGEST_PROVIDER       edgequake-llm provider when no API key is given
  LEGAL_INGEST_MODEL          Model id
  LEGAL_INGEST_BASE_URL       OpenAI-compatible API root
  LEGAL_INGEST_PDFIUM_LIB     Path to libpdfium
  RUST_LOG                    Log filter (overrides --verbose / --quiet)
"#;

/// Ingest and summarize legal documents.
#[derive(Parser, Debug)]
#[command(
    name = "legal-ingest",
    version,
    about = "Extract, normalise and summarize uploaded legal documents",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding resource records (one JSON file per resource).
    #[arg(long, global = true, env = "LEGAL_INGEST_STORE", default_value = ".legal-ingest")]
    store: PathBuf,

    /// API key for the OpenAI-compatible endpoint.
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// edgequake-llm provider (openai, anthropic, gemini, ollama) used when
    /// no API key is given.
    #[arg(long, global = true, env = "LEGAL_INGEST_PROVIDER")]
    provider: Option<String>,

    /// Model id for summaries and chat.
    #[arg(long, global = true, env = "LEGAL_INGEST_MODEL")]
    model: Option<String>,

    /// OpenAI-compatible API root.
    #[arg(long, global = true, env = "LEGAL_INGEST_BASE_URL")]
    base_url: Option<String>,

    /// Per-request LLM timeout in seconds.
    #[arg(long, global = true, env = "LEGAL_INGEST_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// LLM attempts per call when rate limited.
    #[arg(long, global = true, env = "LEGAL_INGEST_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// Produce Markdown instead of plain page text.
    #[arg(long, global = true, env = "LEGAL_INGEST_MARKDOWN")]
    markdown: bool,

    /// Path to the pdfium shared library.
    #[arg(long, global = true, env = "LEGAL_INGEST_PDFIUM_LIB")]
    pdfium_lib: Option<PathBuf>,

    /// User password for encrypted PDFs.
    #[arg(long, global = true, env = "LEGAL_INGEST_PDF_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "LEGAL_INGEST_VERBOSE")]
    verbose: bool,

    /// Suppress all logs except errors.
    #[arg(short, long, global = true, env = "LEGAL_INGEST_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the content-sniffed MIME type of a file.
    Sniff { file: PathBuf },

    /// Register a file as a resource of a project.
    Upload {
        file: PathBuf,

        /// Owning project; a new id is generated when omitted.
        #[arg(long)]
        project: Option<Uuid>,

        /// Title; defaults to the file stem.
        #[arg(long)]
        title: Option<String>,

        #[arg(long, default_value = "")]
        description: String,

        /// Declared type; guessed from the extension when omitted.
        #[arg(long, value_enum)]
        file_type: Option<FileTypeArg>,
    },

    /// Extract text from a stored resource.
    Extract { id: Uuid },

    /// Summarize a stored resource (extracting first if needed).
    Summarize { id: Uuid },

    /// Print a stored resource record.
    Show { id: Uuid },

    /// Normalise a Markdown file (`-` or no argument reads stdin).
    Normalize { file: Option<PathBuf> },

    /// Ask the drafting assistant a question.
    Chat {
        #[arg(long)]
        message: String,

        /// JSON file with an array of `{type, title, content}` items.
        #[arg(long)]
        contexts: Option<PathBuf>,
    },

    /// Delete every resource of a project.
    DeleteProject { project: Uuid },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FileTypeArg {
    Pdf,
    Doc,
    Txt,
    Other,
}

impl From<FileTypeArg> for DeclaredFileType {
    fn from(v: FileTypeArg) -> Self {
        match v {
            FileTypeArg::Pdf => DeclaredFileType::Pdf,
            FileTypeArg::Doc => DeclaredFileType::Doc,
            FileTypeArg::Txt => DeclaredFileType::Txt,
            FileTypeArg::Other => DeclaredFileType::Other,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;

    match &cli.command {
        Command::Sniff { file } => {
            let mime = sniff_path(file).with_context(|| format!("Failed to sniff {:?}", file))?;
            print_json(&serde_json::json!({ "file": file, "mime": mime }))
        }

        Command::Upload {
            file,
            project,
            title,
            description,
            file_type,
        } => {
            let store = open_store(&cli).await?;
            let file = std::fs::canonicalize(file)
                .with_context(|| format!("Failed to resolve {:?}", file))?;
            let declared = file_type
                .map(DeclaredFileType::from)
                .unwrap_or_else(|| DeclaredFileType::from_extension(&file));
            let title = title.clone().unwrap_or_else(|| default_title(&file));
            let resource = Resource::from_upload(
                project.unwrap_or_else(Uuid::new_v4),
                title,
                file,
                declared,
            )?
            .with_description(description.clone());
            store.save(&resource).await?;
            print_json(&resource)
        }

        Command::Extract { id } => {
            let store = open_store(&cli).await?;
            let pipeline =
                ResourcePipeline::extraction_only(store, TextExtractor::from_config(&config));
            let response = pipeline
                .trigger_extract(*id)
                .await
                .context("Extraction failed")?;
            print_json(&response)
        }

        Command::Summarize { id } => {
            let store = open_store(&cli).await?;
            let backend = build_backend(&config)?;
            let pipeline = ResourcePipeline::from_config(store, backend, &config);
            let response = pipeline
                .trigger_summarize(*id)
                .await
                .context("Summarization failed")?;
            print_json(&response)
        }

        Command::Show { id } => {
            let store = open_store(&cli).await?;
            let resource = store.load(*id).await?;
            print_json(&resource)
        }

        Command::Normalize { file } => {
            let input = read_input(file.as_deref())?;
            println!("{}", normalize_markdown(&input));
            Ok(())
        }

        Command::Chat { message, contexts } => {
            let contexts: Vec<ContextItem> = match contexts {
                Some(path) => {
                    let raw = tokio::fs::read_to_string(path)
                        .await
                        .with_context(|| format!("Failed to read contexts from {:?}", path))?;
                    serde_json::from_str(&raw)
                        .with_context(|| format!("Invalid contexts JSON in {:?}", path))?
                }
                None => Vec::new(),
            };
            let assistant = ChatAssistant::from_config(build_backend(&config)?, &config);
            let body = ChatRequestBody {
                message: Some(message.clone()),
                contexts,
            };
            match assistant.respond(&body).await {
                Ok(reply) => print_json(&reply),
                Err(e) => {
                    print_json(&e.to_body())?;
                    bail!("chat failed with HTTP {}", e.status_code())
                }
            }
        }

        Command::DeleteProject { project } => {
            let store = open_store(&cli).await?;
            let deleted = store.delete_project(*project).await?;
            print_json(&serde_json::json!({ "project": project, "deleted": deleted }))
        }
    }
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .extraction_mode(if cli.markdown {
            ExtractionMode::Markdown
        } else {
            ExtractionMode::PlainText
        })
        .api_timeout_secs(cli.api_timeout)
        .max_attempts(cli.max_attempts);

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref url) = cli.base_url {
        builder = builder.base_url(url);
    }
    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_library_path(lib);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.pdf_password(pwd);
    }

    builder.build().context("Invalid configuration")
}

async fn open_store(cli: &Cli) -> Result<Arc<dyn ResourceStore>> {
    let store = JsonFileStore::open(&cli.store)
        .await
        .with_context(|| format!("Failed to open store at {:?}", cli.store))?;
    Ok(Arc::new(store))
}

fn default_title(file: &Path) -> String {
    file.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Untitled".to_string())
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {:?}", path)),
        _ => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialise output")?;
    println!("{json}");
    Ok(())
}
