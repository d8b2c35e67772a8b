use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crpt_gate::config::CrptConfig;
use crpt_gate::{Document, SubmissionClient, TimeUnit, INTRODUCE_GOODS_PATH};

/// Submit a signed document to the CRPT API under a request rate limit.
#[derive(Debug, Parser)]
#[command(name = "crpt-gate", version, about)]
struct Cli {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base URL of the document API
    #[arg(long)]
    base_url: Option<String>,

    /// Bearer token
    #[arg(long, env = "CRPT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Rate limit window unit
    #[arg(long)]
    unit: Option<TimeUnit>,

    /// Maximum submissions per window
    #[arg(long)]
    limit: Option<usize>,

    /// Submission path
    #[arg(long, default_value = INTRODUCE_GOODS_PATH)]
    path: String,

    /// Detached document signature
    #[arg(long)]
    signature: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// JSON document file, or `-` for standard input
    document: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let mut config = CrptConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(base_url) = cli.base_url {
        config.client.base_url = base_url;
    }
    if let Some(token) = cli.token {
        config.client.auth_token = Some(token);
    }
    if let Some(unit) = cli.unit {
        config.rate_limiting.unit = unit;
    }
    if let Some(limit) = cli.limit {
        config.rate_limiting.request_limit = limit;
    }
    info!(
        base_url = %config.client.base_url,
        unit = %config.rate_limiting.unit,
        limit = config.rate_limiting.request_limit,
        "Configuration loaded"
    );

    let document = Document::from_json_text(read_document(&cli.document)?)?;
    let client = SubmissionClient::from_config(&config)?;

    let response = client.submit(&cli.path, &document, &cli.signature).await?;

    println!("{}", response.status);
    println!("{}", response.body);
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn read_document(path: &Path) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("reading document from standard input")?;
        return Ok(text);
    }

    std::fs::read_to_string(path)
        .with_context(|| format!("reading document from {}", path.display()))
}
