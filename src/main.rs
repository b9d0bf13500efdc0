//! @ai:module:intent CLI for the llm-bench benchmark pipeline
//! @ai:module:layer presentation

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use llm_bench::{
    adapter::ScriptedAdapter,
    config::{BenchConfig, ProviderCredentials},
    events::{EventEncoder, EventSink, SummaryEvent},
    report::{ExportDocument, MarkdownReport, RunRecorder},
    runner::{BenchmarkRunner, RunOutcome},
    testset::{
        generate_testset, write_testset, BenchmarkRequest, EvalType, PromptFilter, PromptItem, Provider,
        TestsetGenerationRequest, TestsetLoader, TestsetLoaderTrait,
    },
    tools::ToolRegistry,
    versioner::hash_prompt,
};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DEFAULT_CONFIG: &str = "llm-bench.toml";

/// Reply returned by the dry-run judge
const DRY_RUN_VERDICT: &str = r#"{"score": 1.0, "passed": true, "reason": "dry run"}"#;

#[derive(Parser)]
#[command(name = "llm-bench")]
#[command(about = "Benchmark language models against prompt test sets, streaming NDJSON events")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Address to bind, overriding the configuration
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Run a benchmark and write its event stream
    Run {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Test-set file or directory of `.jsonl` files
        #[arg(short, long)]
        testset: PathBuf,

        /// Subject provider (openai, anthropic, deepseek, ollama)
        #[arg(short, long, default_value = "openai")]
        provider: String,

        /// Subject model
        #[arg(short, long)]
        model: String,

        /// Evaluator provider; defaults to the subject's
        #[arg(long)]
        evaluator_provider: Option<String>,

        /// Evaluator model; defaults to the subject's
        #[arg(long)]
        evaluator_model: Option<String>,

        /// Evaluation type (basic, llm_as_judge, custom)
        #[arg(short, long, default_value = "basic")]
        eval_type: String,

        /// Evaluator configuration as a JSON object
        #[arg(long)]
        eval_config: Option<String>,

        /// System prompt prepended to every subject call
        #[arg(long)]
        system_prompt: Option<String>,

        /// Offer the built-in tools to the subject
        #[arg(long)]
        tools: bool,

        /// Consume the subject's token stream
        #[arg(long)]
        stream: bool,

        /// Filter by categories (comma-separated)
        #[arg(long)]
        categories: Option<String>,

        /// Filter by difficulties (comma-separated)
        #[arg(long)]
        difficulties: Option<String>,

        /// Filter by prompt ids (comma-separated)
        #[arg(long)]
        ids: Option<String>,

        /// Run name; defaults to the test-set file stem
        #[arg(long)]
        name: Option<String>,

        /// Write events here instead of stdout
        #[arg(long)]
        events: Option<PathBuf>,

        /// Write the export document here
        #[arg(long)]
        export: Option<PathBuf>,

        /// Write a Markdown report here
        #[arg(long)]
        markdown: Option<PathBuf>,

        /// Run without making API calls
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate a test set
    Validate {
        /// Test-set file or directory
        testset: PathBuf,
    },

    /// Generate a test set with a model
    Generate {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Topic the questions should cover
        topic: String,

        /// Number of questions
        #[arg(short = 'n', long, default_value_t = 5)]
        count: u32,

        /// Difficulty (easy, medium, hard, mixed)
        #[arg(long, default_value = "mixed")]
        difficulty: String,

        /// Categories to include (free text)
        #[arg(long)]
        categories: Option<String>,

        /// Generation provider; defaults to the first with credentials
        #[arg(long)]
        provider: Option<String>,

        /// Generation model
        #[arg(long)]
        model: Option<String>,

        /// Write the JSONL test set here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the version hash of a prompt
    Hash {
        /// Prompt text; read from --file when absent
        text: Option<String>,

        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Print a summary from an export document
    Summarize {
        /// Path to export JSON
        export: PathBuf,

        /// Print the full Markdown report
        #[arg(long)]
        markdown: bool,
    },

    /// Initialize default configuration
    Init {
        /// Output path for config file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("llm_bench=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, bind } => {
            let mut config = load_or_default_config(config)?;
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            llm_bench::server::serve(&config).await
        }
        Commands::Run {
            config,
            testset,
            provider,
            model,
            evaluator_provider,
            evaluator_model,
            eval_type,
            eval_config,
            system_prompt,
            tools,
            stream,
            categories,
            difficulties,
            ids,
            name,
            events,
            export,
            markdown,
            dry_run,
        } => {
            let config = load_or_default_config(config)?;
            let filter = PromptFilter::from_lists(categories, difficulties, ids);
            let prompts = load_prompts(&testset, &filter)?;

            let mut request = BenchmarkRequest::new(
                name.unwrap_or_else(|| run_name(&testset)),
                provider.parse::<Provider>()?,
                model,
                prompts,
            );
            request.evaluator_provider = evaluator_provider.map(|p| p.parse()).transpose()?;
            request.evaluator_model = evaluator_model;
            request.eval_type = eval_type.parse::<EvalType>()?;
            request.eval_config = eval_config.map(|raw| parse_eval_config(&raw)).transpose()?;
            request.system_prompt = system_prompt;
            request.enable_tools = tools;
            request.stream = stream;

            run_benchmark(
                &config,
                request,
                RunOutputs {
                    events,
                    export,
                    markdown,
                },
                dry_run,
            )
            .await
        }
        Commands::Generate {
            config,
            topic,
            count,
            difficulty,
            categories,
            provider,
            model,
            output,
        } => {
            let config = load_or_default_config(config)?;
            let mut request = TestsetGenerationRequest::new(topic);
            request.num_questions = count;
            request.difficulty = difficulty;
            request.categories = categories;
            request.provider = provider.map(|p| p.parse::<Provider>()).transpose()?;
            request.model = model;
            generate(&config, &request, output.as_deref()).await
        }
        Commands::Validate { testset } => validate(&testset),
        Commands::Hash { text, file } => hash(text, file),
        Commands::Summarize { export, markdown } => summarize(&export, markdown),
        Commands::Init { output } => init_config(output),
    }
}

struct RunOutputs {
    events: Option<PathBuf>,
    export: Option<PathBuf>,
    markdown: Option<PathBuf>,
}

/// @ai:intent Run one benchmark, writing events as they arrive and the export at the end
/// @ai:effects network, fs:write, io
async fn run_benchmark(
    config: &BenchConfig,
    request: BenchmarkRequest,
    outputs: RunOutputs,
    dry_run: bool,
) -> Result<()> {
    request.validate()?;

    let runner = if dry_run {
        tracing::info!("Running in dry-run mode");
        BenchmarkRunner::new(Arc::new(ScriptedAdapter::fixed("dry run")), config.run.clone())
            .with_judge(Arc::new(ScriptedAdapter::fixed(DRY_RUN_VERDICT)))
            .with_tools(ToolRegistry::with_defaults(&ProviderCredentials::default()))
    } else {
        let credentials = config.providers.clone().or(ProviderCredentials::from_env());
        BenchmarkRunner::connect(&request, &credentials, &config.run)?
    };

    let mut out: Box<dyn Write> = match &outputs.events {
        Some(path) => Box::new(BufWriter::new(
            std::fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(std::io::stdout().lock()),
    };

    let (sink, mut rx) = EventSink::channel(64);
    let handle = tokio::spawn({
        let request = request.clone();
        async move { runner.run(&request, &sink).await }
    });

    let mut recorder = RunRecorder::new(request);
    while let Some(event) = rx.recv().await {
        EventEncoder::write(&mut out, &event)?;
        recorder.record(&event);
    }
    drop(out);

    let outcome = handle.await.context("benchmark task panicked")??;
    let document = recorder.finish();

    if let Some(path) = &outputs.export {
        document.save(path)?;
    }
    if let Some(path) = &outputs.markdown {
        MarkdownReport(&document).write_to(path)?;
        tracing::info!("Markdown report written to {}", path.display());
    }

    match outcome {
        RunOutcome::Completed(summary) => print_summary(&summary),
        RunOutcome::Aborted { processed } => {
            tracing::warn!("Run aborted after {processed} prompt(s)");
        }
    }

    Ok(())
}

/// @ai:intent Load prompts from a file or directory and apply the filter
/// @ai:effects fs:read
fn load_prompts(path: &Path, filter: &PromptFilter) -> Result<Vec<PromptItem>> {
    let loader = TestsetLoader::new();
    let prompts = loader.load_filtered(path, filter)?;
    if prompts.is_empty() {
        anyhow::bail!("No prompts in {} match the filter criteria", path.display());
    }
    tracing::info!("Loaded {} prompts from {}", prompts.len(), path.display());
    Ok(prompts)
}

fn run_name(testset: &Path) -> String {
    testset
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("benchmark")
        .to_string()
}

fn parse_eval_config(raw: &str) -> Result<serde_json::Map<String, serde_json::Value>> {
    match serde_json::from_str(raw).context("--eval-config is not valid JSON")? {
        serde_json::Value::Object(map) => Ok(map),
        _ => anyhow::bail!("--eval-config must be a JSON object"),
    }
}

/// @ai:intent Generate a test set and write it as JSONL
/// @ai:effects network, fs:write, io
async fn generate(config: &BenchConfig, request: &TestsetGenerationRequest, output: Option<&Path>) -> Result<()> {
    let credentials = config.providers.clone().or(ProviderCredentials::from_env());
    let (provider, model) = request.resolve_model(&credentials)?;
    let adapter = llm_bench::adapter::connect(provider, &credentials, &config.run)?;

    tracing::info!(%provider, %model, topic = %request.topic, "generating test set");
    let prompts = generate_testset(adapter.as_ref(), &model, request).await?;

    match output {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            write_testset(&mut BufWriter::new(file), &prompts)?;
            eprintln!("Wrote {} prompts to {}", prompts.len(), path.display());
        }
        None => write_testset(&mut std::io::stdout().lock(), &prompts)?,
    }

    Ok(())
}

/// @ai:intent Check that a test set parses and would form a valid request
/// @ai:effects fs:read, io
fn validate(path: &Path) -> Result<()> {
    let prompts = TestsetLoader::new().load_filtered(path, &PromptFilter::default())?;
    BenchmarkRequest::new(run_name(path), Provider::OpenAi, "-", prompts.clone()).validate()?;

    println!("Test set validation passed!");
    println!("Total prompts: {}", prompts.len());
    println!();
    println!("{:<24} {:<16} {:<10} {:<8}", "ID", "Category", "Difficulty", "Expected");
    println!("{}", "-".repeat(62));

    for prompt in &prompts {
        println!(
            "{:<24} {:<16} {:<10} {:<8}",
            prompt.id,
            prompt.category.as_deref().unwrap_or("-"),
            prompt.difficulty.as_deref().unwrap_or("-"),
            if prompt.expected().is_some() { "yes" } else { "no" }
        );
    }

    Ok(())
}

/// @ai:effects fs:read, io
fn hash(text: Option<String>, file: Option<PathBuf>) -> Result<()> {
    let content = match (text, file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, None) => anyhow::bail!("provide prompt text or --file"),
    };
    println!("{}", hash_prompt(&content));
    Ok(())
}

/// @ai:intent Print the summary reconstructed from an export document
/// @ai:effects fs:read, io
fn summarize(path: &Path, markdown: bool) -> Result<()> {
    let document = ExportDocument::load(path)?;
    if markdown {
        print!("{}", MarkdownReport(&document));
    } else {
        print_summary(&document.summary());
    }
    Ok(())
}

/// @ai:intent Initialize default configuration file
/// @ai:effects fs:write
fn init_config(output: PathBuf) -> Result<()> {
    let config = BenchConfig::default();
    config.save(&output)?;
    println!("Configuration saved to {}", output.display());
    Ok(())
}

/// @ai:intent Load configuration or use defaults
/// @ai:effects fs:read
fn load_or_default_config(path: Option<PathBuf>) -> Result<BenchConfig> {
    match path {
        Some(p) => BenchConfig::load(&p),
        None => {
            let default_path = PathBuf::from(DEFAULT_CONFIG);

            if default_path.exists() {
                BenchConfig::load(&default_path)
            } else {
                Ok(BenchConfig::default())
            }
        }
    }
}

/// @ai:intent Print summary to stderr so stdout stays pure NDJSON
/// @ai:effects io
fn print_summary(summary: &SummaryEvent) {
    eprintln!();
    eprintln!("Benchmark Summary");
    eprintln!("=================");
    eprintln!("{:<18} {:>10}", "Prompts:", summary.total_prompts);
    eprintln!("{:<18} {:>10}", "Passed:", summary.passed);
    eprintln!("{:<18} {:>10}", "Failed:", summary.failed);
    eprintln!("{:<18} {:>10.3}", "Average score:", summary.average_score);
    eprintln!("{:<18} {:>9.1}s", "Duration:", summary.total_duration_ms / 1000.0);

    if !summary.errors.is_empty() {
        eprintln!();
        eprintln!("Errors:");
        for error in &summary.errors {
            eprintln!("  - {error}");
        }
    }
    eprintln!();
}
