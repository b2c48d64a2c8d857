//! Trazar CLI - trace service and visualization data generator
//!
//! # Commands
//!
//! - `serve` - Start the trace service
//! - `generate` - Record an inference trace and write a visualization JSON
//! - `train` - Record a teacher-forced trace and write a visualization JSON
//! - `index` - Rebuild the examples index for a data directory
//! - `info` - Show version info

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use trazar::{
    api::{create_router, AppState},
    client::{save_document, GenerateParams, TraceClient},
    error::{Result, TrazarError},
    index,
};

const DEFAULT_SERVER_URL: &str = "http://localhost:8665";

/// Trazar - trace engine for LLM decoding visualization
///
/// Records step-by-step generation and teacher-forced prediction traces
/// against a hosted model and packages them for the animated visualization.
#[derive(Parser)]
#[command(name = "trazar")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the trace service
    ///
    /// Examples:
    ///   trazar serve --demo
    ///   trazar serve -H 0.0.0.0 -p 8665 --demo
    Serve {
        /// Host to bind to
        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "8665")]
        port: u16,

        /// Serve the built-in demo session
        #[arg(long)]
        demo: bool,
    },
    /// Record an inference trace and write the visualization JSON
    ///
    /// Examples:
    ///   trazar generate "What is the capital of France?"
    ///   trazar generate "Hello" -m 20 -t 0.0 -o data/en-001-greedy.json
    Generate {
        /// The prompt to trace
        #[arg(value_name = "PROMPT")]
        prompt: String,

        /// Maximum number of new tokens
        #[arg(short = 'm', long, default_value = "10")]
        max_new_tokens: usize,

        /// Number of top-k candidates per step
        #[arg(short = 'k', long, default_value = "10")]
        top_k: usize,

        /// Sampling temperature: 0 for greedy
        #[arg(short, long, default_value = "1.0")]
        temperature: f32,

        /// Language code for the prompt
        #[arg(short, long, default_value = "en")]
        language: String,

        /// Output file path (default: data/generated_TIMESTAMP.json)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Custom example ID (default: generated_TIMESTAMP)
        #[arg(long)]
        example_id: Option<String>,

        /// Trace service URL
        #[arg(long, default_value = DEFAULT_SERVER_URL)]
        server: String,
    },
    /// Record a teacher-forced trace and write the visualization JSON
    ///
    /// Examples:
    ///   trazar train "The quick brown fox" --source demo
    ///   trazar train "..." --source corpus --max-tokens 32 -o data/tr-001.json
    Train {
        /// The text to process
        #[arg(value_name = "TEXT")]
        text: String,

        /// Where the text came from
        #[arg(short, long)]
        source: String,

        /// Truncate the sequence to this many tokens
        #[arg(long)]
        max_tokens: Option<usize>,

        /// Output file path (default: data/training_TIMESTAMP.json)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Custom example ID (default: training_TIMESTAMP)
        #[arg(long)]
        example_id: Option<String>,

        /// Trace service URL
        #[arg(long, default_value = DEFAULT_SERVER_URL)]
        server: String,
    },
    /// Rebuild the examples index for a data directory
    Index {
        /// Directory holding the generated JSON files
        #[arg(value_name = "DATA_DIR", default_value = "data")]
        data_dir: PathBuf,
    },
    /// Show version and configuration info
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port, demo } => {
            serve(&host, port, demo).await?;
        },
        Commands::Generate {
            prompt,
            max_new_tokens,
            top_k,
            temperature,
            language,
            output,
            example_id,
            server,
        } => {
            let params = GenerateParams {
                prompt,
                max_new_tokens,
                top_k,
                temperature: Some(temperature),
                apply_chat_template: true,
            };
            run_generate(&server, &params, &language, example_id, output)?;
        },
        Commands::Train {
            text,
            source,
            max_tokens,
            output,
            example_id,
            server,
        } => {
            run_train(&server, &text, &source, max_tokens, example_id, output)?;
        },
        Commands::Index { data_dir } => {
            let (added, total) = index::update_index(&data_dir)?;
            println!(
                "Updated {} with {added} new examples (total: {total})",
                data_dir.join(index::INDEX_FILE).display()
            );
        },
        Commands::Info => {
            println!("Trazar v{}", trazar::VERSION);
            println!("Trace engine for LLM decoding visualization");
            println!();
            println!("Features:");
            println!("  - Temperature-decoupled top-k distributions per step");
            println!("  - Greedy and temperature sampling");
            println!("  - Chat-template boundary accounting");
            println!("  - Teacher-forced training traces with per-token loss");
            println!("  - Line-break post-trace filtering");
            println!("  - REST API and JSON file generation");
        },
    }

    Ok(())
}

async fn serve(host: &str, port: u16, demo: bool) -> Result<()> {
    let state = if demo {
        println!("Starting trazar trace service (demo session)...");
        AppState::demo()
    } else {
        println!("Starting trazar trace service (no session loaded)...");
        println!("Trace endpoints return 503 until a session is loaded via POST /load_model.");
        AppState::unloaded()
    };
    let app = create_router(state);

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| TrazarError::InvalidArgument {
            argument: "host/port",
            reason: format!("invalid address: {e}"),
        })?;

    println!("Service listening on http://{addr}");
    println!();
    println!("Endpoints:");
    println!("  GET  /                  - Service banner");
    println!("  GET  /model_info        - Loaded model metadata");
    println!("  POST /tokenize          - Tokenize a prompt");
    println!("  POST /token_ids         - Tokenize with ids");
    println!("  POST /generate          - Record an inference trace");
    println!("  POST /process_training  - Record a training trace");
    println!("  POST /load_model        - Replace the model session");
    println!();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(TrazarError::Io)?;
    axum::serve(listener, app)
        .await
        .map_err(|e| TrazarError::Http(format!("server error: {e}")))?;

    Ok(())
}

fn run_generate(
    server: &str,
    params: &GenerateParams,
    language: &str,
    example_id: Option<String>,
    output: Option<PathBuf>,
) -> Result<()> {
    let client = TraceClient::new(server);

    println!("Checking service at {server}...");
    let banner = client.check_server()?;
    if let Some(model) = banner.get("model").and_then(|m| m.as_str()) {
        println!("Connected. Model: {model}");
    }

    println!("Generating with prompt: '{}'", params.prompt);
    println!(
        "Max new tokens: {}, Top-k: {}, Temperature: {:?}",
        params.max_new_tokens, params.top_k, params.temperature
    );

    let document = client.create_inference_document(params, language, example_id)?;
    let path = output.unwrap_or_else(|| PathBuf::from(format!("data/{}.json", document.id)));
    save_document(&document, &path)?;

    println!();
    println!("Saved {} steps to {}", document.generation_steps.len(), path.display());
    Ok(())
}

fn run_train(
    server: &str,
    text: &str,
    source: &str,
    max_tokens: Option<usize>,
    example_id: Option<String>,
    output: Option<PathBuf>,
) -> Result<()> {
    let client = TraceClient::new(server);

    println!("Checking service at {server}...");
    client.check_server()?;

    let preview: String = text.chars().take(100).collect();
    println!("Processing training example...");
    println!("Text: '{preview}{}'", if text.chars().count() > 100 { "..." } else { "" });
    println!("Source: {source}");
    if let Some(limit) = max_tokens {
        println!("Max tokens: {limit}");
    }

    let document = client.create_training_document(text, source, max_tokens, example_id)?;
    let path = output.unwrap_or_else(|| PathBuf::from(format!("data/{}.json", document.id)));
    save_document(&document, &path)?;

    println!();
    println!("Saved {} steps to {}", document.training_steps.len(), path.display());
    Ok(())
}
