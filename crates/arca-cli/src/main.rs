//! `arca`: compare a new regulation against internal policy documents.
//!
//! ```bash
//! arca index policies/                    # build the LanceDB policy index
//! arca search --text "data retention"     # retrieval only
//! arca analyze --file rule.txt --law-date 2025-12-06
//! arca reports                            # newest first
//! arca show compliance_report_20251206_140509_3f2a9c1d0b7e4a55.json
//! ```

mod display;
mod ingest;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use arca_ai::{
    AnthropicOracle, ConflictClassifier, DEFAULT_ORACLE_MODEL, EmbedderCell, EmbeddingConfig,
    EmbeddingProvider, OnnxEmbedder,
};
use arca_pipeline::{Aggregator, Pipeline, PipelineConfig, PipelineError, Retriever};
use arca_store::{PolicyIndex, ReportStore};
use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Regulations shorter than this are rejected before any model is loaded.
const MIN_REGULATION_CHARS: usize = 50;

const EXIT_NO_POLICIES: u8 = 2;
const EXIT_NO_VERDICTS: u8 = 3;

#[derive(Parser)]
#[command(name = "arca", version)]
#[command(about = "Regulatory conflict analysis against internal policy documents")]
struct Cli {
    /// Verbosity (-v debug, -vv trace). RUST_LOG applies when absent.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the policy index from a folder of extracted policy text files
    Index {
        /// Folder of .txt files, pages separated by form feeds
        #[arg(value_name = "DIR")]
        source: PathBuf,
        #[command(flatten)]
        index: IndexArgs,
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Show the policy excerpts most relevant to a text
    Search {
        #[command(flatten)]
        input: TextInput,
        /// Excerpts to return
        #[arg(long, short = 'k', env = "ARCA_TOP_K", default_value_t = 5)]
        top_k: usize,
        #[command(flatten)]
        index: IndexArgs,
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Analyse a regulation and write a compliance report
    Analyze(AnalyzeArgs),
    /// List stored compliance reports, newest first
    Reports {
        /// Only reports for this regulation id
        #[arg(long, value_name = "ID")]
        regulation_id: Option<String>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Print a stored compliance report
    Show {
        /// Report filename as listed by `arca reports`
        #[arg(value_name = "FILE")]
        name: String,
        /// Print the raw JSON artifact
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args)]
struct AnalyzeArgs {
    #[command(flatten)]
    input: TextInput,
    /// Date the regulation was published (YYYY-MM-DD)
    #[arg(long, value_parser = parse_law_date)]
    law_date: Option<String>,
    /// Excerpts retrieved and classified
    #[arg(long, short = 'k', env = "ARCA_TOP_K", default_value_t = 5)]
    top_k: usize,
    /// Classification calls in flight at once
    #[arg(long, env = "ARCA_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,
    /// Per-call oracle deadline in seconds
    #[arg(long, env = "ARCA_ORACLE_TIMEOUT_SECS", default_value_t = 60)]
    oracle_timeout: u64,
    #[command(flatten)]
    oracle: OracleArgs,
    #[command(flatten)]
    index: IndexArgs,
    #[command(flatten)]
    model: ModelArgs,
    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct TextInput {
    /// Read the text from a file
    #[arg(long, short = 'f', value_name = "PATH")]
    file: Option<PathBuf>,
    /// Text given inline
    #[arg(long, short = 't')]
    text: Option<String>,
}

impl TextInput {
    fn read(&self) -> anyhow::Result<String> {
        match (&self.file, &self.text) {
            (Some(path), _) => std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display())),
            (None, Some(text)) => Ok(text.clone()),
            (None, None) => anyhow::bail!("either --file or --text is required"),
        }
    }
}

#[derive(Args)]
struct IndexArgs {
    /// LanceDB policy index directory
    #[arg(long, env = "ARCA_INDEX", default_value = "data/policies.lance")]
    index: PathBuf,
}

#[derive(Args)]
struct ModelArgs {
    /// Directory holding model.onnx and tokenizer.json
    #[arg(long, env = "ARCA_MODEL_DIR", default_value = "models/all-MiniLM-L6-v2")]
    model_dir: PathBuf,
}

#[derive(Args)]
struct OutputArgs {
    /// Folder for compliance report artifacts
    #[arg(long, env = "ARCA_OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,
}

#[derive(Args)]
struct OracleArgs {
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    api_key: String,
    /// Model used for conflict classification
    #[arg(long, env = "ARCA_LLM_MODEL", default_value = DEFAULT_ORACLE_MODEL)]
    llm_model: String,
    /// Override the API base URL (proxies, gateways)
    #[arg(long, env = "ANTHROPIC_BASE_URL")]
    base_url: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    tracing::debug!("arca v{}", env!("CARGO_PKG_VERSION"));

    match run(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(command: Commands) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Index {
            source,
            index,
            model,
        } => {
            let embedder = load_embedder(&model.model_dir)?;
            eprintln!("Indexing policies from {}", source.display());
            let stats = ingest::run_ingest(&source, &index.index, embedder.as_ref()).await?;
            eprintln!(
                "Indexed {} chunks from {} documents in {:.1}s -> {}",
                stats.chunks,
                stats.files,
                stats.elapsed_secs,
                index.index.display()
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::Search {
            input,
            top_k,
            index,
            model,
        } => {
            let text = input.read()?;
            let retriever = open_retriever(&index.index, &model.model_dir).await?;
            let excerpts = retriever.retrieve(&text, top_k).await?;
            display::print_excerpts(&excerpts);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Analyze(args) => analyze(args).await,
        Commands::Reports {
            regulation_id,
            output,
        } => {
            let store = ReportStore::open(&output.output_dir)?;
            let names = match regulation_id {
                Some(id) => store.find_by_regulation_id(&id)?,
                None => store.list()?,
            };
            if names.is_empty() {
                eprintln!("No reports in {}", store.dir().display());
            }
            for name in names {
                println!("{name}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Show { name, json, output } => {
            let store = ReportStore::open(&output.output_dir)?;
            let report = store.load(&name)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                if !report.is_consistent() {
                    tracing::warn!(report = %name, "risk counts do not match the listed risks");
                }
                display::print_report_card(&report);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn analyze(args: AnalyzeArgs) -> anyhow::Result<ExitCode> {
    let text = args.input.read()?;
    let chars = text.trim().chars().count();
    anyhow::ensure!(
        chars >= MIN_REGULATION_CHARS,
        "regulation text too short ({chars} characters, minimum {MIN_REGULATION_CHARS})"
    );

    let retriever = open_retriever(&args.index.index, &args.model.model_dir).await?;
    let oracle = AnthropicOracle::new(
        args.oracle.api_key,
        args.oracle.llm_model,
        args.oracle.base_url,
    )
    .context("building oracle client")?;
    let store = ReportStore::open(&args.output.output_dir)?;

    let config = PipelineConfig {
        top_k: args.top_k,
        concurrency: args.concurrency,
        oracle_timeout: Duration::from_secs(args.oracle_timeout),
    };
    let pipeline = Pipeline::new(
        retriever,
        ConflictClassifier::new(Arc::new(oracle)),
        Aggregator::new(store),
        config,
    );

    match pipeline.run(&text, args.law_date.as_deref()).await {
        Ok(outcome) => {
            display::print_report_card(&outcome.report);
            display::print_dropped(&outcome.dropped);
            if outcome.fallbacks > 0 {
                eprintln!(
                    "{} of {} verdicts are fallbacks and need manual review",
                    outcome.fallbacks, outcome.report.total_risks_flagged
                );
            }
            println!("Report saved to {}", outcome.report_path.display());
            Ok(ExitCode::SUCCESS)
        }
        Err(PipelineError::EmptyRetrieval) => {
            eprintln!("No relevant internal policies found. Has `arca index` been run?");
            Ok(ExitCode::from(EXIT_NO_POLICIES))
        }
        Err(PipelineError::NoVerdictsProduced { attempted, failures }) => {
            eprintln!("All {attempted} classification calls failed; no report written.");
            display::print_dropped(&failures);
            Ok(ExitCode::from(EXIT_NO_VERDICTS))
        }
        Err(PipelineError::Persistence { report, source }) => {
            display::print_report_card(&report);
            Err(anyhow::Error::new(source).context("saving compliance report"))
        }
        Err(e) => Err(e.into()),
    }
}

async fn open_retriever(index_path: &Path, model_dir: &Path) -> anyhow::Result<Retriever> {
    let embedder = load_embedder(model_dir)?;
    let index = PolicyIndex::open(index_path)
        .await
        .context("opening policy index")?;
    Ok(Retriever::new(embedder, Arc::new(index)))
}

/// Load the process embedder once; the model name is the model directory's name.
fn load_embedder(model_dir: &Path) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    let name = model_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| EmbeddingConfig::default().model);
    let config = EmbeddingConfig::new(name, true);

    EmbedderCell::global()
        .get_or_init(&config, |config| {
            let embedder = OnnxEmbedder::load(model_dir, config.clone())?;
            Ok(Arc::new(embedder) as Arc<dyn EmbeddingProvider>)
        })
        .with_context(|| format!("loading embedding model from {}", model_dir.display()))
}

fn parse_law_date(s: &str) -> Result<String, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|e| format!("expected YYYY-MM-DD ({e})"))
}
