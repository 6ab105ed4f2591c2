use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use portal_core::config::Config;
use portal_core::rag::{
    load_vectors, upsert_in_batches, Embedder, EmbeddingGenerator, IndexSpec, PineconeClient, PineconeIndex,
    QuestionEmbedding, VectorStore, SAMPLE_SENTENCE,
};
use portal_core::{ChatManager, GeminiProvider, Provider, ProviderError, ReportExtractor, Server};
use portal_plugin::{Permission, PluginRegistry};
use portal_std::{standard_tools, ReportStore};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const TITLE: &str = r#"
 ____                               _       ____            _        _
|  _ \ ___  ___  ___  __ _ _ __ ___| |__   |  _ \ ___  _ __| |_ __ _| |
| |_) / _ \/ __|/ _ \/ _` | '__/ __| '_ \  | |_) / _ \| '__| __/ _` | |
|  _ <  __/\__ \  __/ (_| | | | (__| | | | |  __/ (_) | |  | || (_| | |
|_| \_\___||___/\___|\__,_|_|  \___|_| |_| |_|   \___/|_|   \__\__,_|_|
"#;

#[derive(Parser)]
#[command(name = "portal")]
#[command(about = "Financial research assistant over a library of analyst reports", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Interactive question answering in the terminal")]
    Chat,

    #[command(about = "Run the web API")]
    Serve {
        #[arg(short, long, help = "Address to bind (overrides server.bind)")]
        bind: Option<String>,
    },

    #[command(about = "Generate embedding files")]
    Embed {
        #[command(subcommand)]
        command: EmbedCommands,
    },

    #[command(about = "Manage the hosted vector index")]
    Vectors {
        #[command(subcommand)]
        command: VectorCommands,
    },

    #[command(about = "Convert report PDFs into JSON reports")]
    Extract {
        #[arg(required = true, help = "PDF files to extract")]
        pdfs: Vec<PathBuf>,

        #[arg(short, long, help = "Output directory (defaults to paths.reports_dir)")]
        out_dir: Option<PathBuf>,
    },

    #[command(about = "Show current configuration")]
    Show,
}

#[derive(Subcommand)]
enum EmbedCommands {
    #[command(about = "Embed every report paragraph")]
    Reports,

    #[command(about = "Embed the evaluation questions")]
    Questions,

    #[command(about = "Embed one sentence and print the result")]
    Test {
        #[arg(short, long, help = "Sentence to embed")]
        text: Option<String>,
    },
}

#[derive(Subcommand)]
enum VectorCommands {
    #[command(about = "Create the index if needed and print its statistics")]
    Init,

    #[command(about = "Upload cached report embeddings")]
    Upsert,

    #[command(about = "Find the reports nearest to an embedded question")]
    Query {
        #[arg(short, long, help = "Question embedding file (defaults to q0.json)")]
        query_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?.with_env();
    let http_client = reqwest::Client::new();

    match cli.command {
        Commands::Chat => chat(&config, &http_client).await,
        Commands::Serve { bind } => serve(config, &http_client, bind).await,
        Commands::Embed { command } => embed(&config, &http_client, command).await,
        Commands::Vectors { command } => vectors(&config, &http_client, command).await,
        Commands::Extract { pdfs, out_dir } => extract(&config, &http_client, &pdfs, out_dir).await,
        Commands::Show => {
            show_config(&cli.config, &config);
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("portal_core=info,portal_std=info,portal_cli=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// A missing config file means defaults; a malformed one is an error.
fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        info!(path = %path.display(), "Config file not found, using defaults");
        return Ok(Config::default());
    }
    Config::load(path).with_context(|| format!("Failed to load config from {}", path.display()))
}

fn gemini(config: &Config, http_client: &reqwest::Client) -> Arc<dyn Provider> {
    Arc::new(GeminiProvider::new(&config.llm).with_http_client(http_client.clone()))
}

fn chat_manager(config: &Config, http_client: &reqwest::Client) -> ChatManager {
    let store = ReportStore::new(&config.paths.reports_dir).with_allowed(config.reports.allowed_files.clone());

    let mut registry = PluginRegistry::new(Permission::READ_ONLY);
    for tool in standard_tools(store) {
        registry.register(tool);
    }

    ChatManager::new(config.clone(), gemini(config, http_client), registry)
}

fn is_configuration_error(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<ProviderError>(), Some(ProviderError::MissingApiKey(_)))
}

async fn chat(config: &Config, http_client: &reqwest::Client) -> Result<()> {
    let manager = chat_manager(config, http_client);
    println!("{}", TITLE.bold().cyan());

    let stdin = std::io::stdin();
    loop {
        print!("\n{}\n > ", "What do you need?".bold());
        std::io::stdout().flush()?;

        let mut input = String::new();
        if stdin.read_line(&mut input)? == 0 {
            break;
        }
        let query = input.trim();
        if query.is_empty() {
            continue;
        }
        if query.eq_ignore_ascii_case("exit") || query.eq_ignore_ascii_case("quit") {
            info!("Exiting CLI");
            break;
        }

        info!("Thinking...");
        match manager.query(query).await {
            Ok(response) => println!("{}", response),
            Err(e) if is_configuration_error(&e) => {
                error!(error = %format!("{:#}", e), "Configuration error");
                println!("{} {:#}. Please check your environment setup.", "Error:".red().bold(), e);
            }
            Err(e) => {
                error!(error = %format!("{:#}", e), "Request failed");
                println!("{} {:#}. Please try again.", "An error occurred:".red().bold(), e);
            }
        }
    }

    Ok(())
}

async fn serve(config: Config, http_client: &reqwest::Client, bind: Option<String>) -> Result<()> {
    let manager = chat_manager(&config, http_client);
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());

    Server::new(Arc::new(manager), bind, config.paths.static_dir.clone())
        .start()
        .await
}

async fn embed(config: &Config, http_client: &reqwest::Client, command: EmbedCommands) -> Result<()> {
    let embedder = Embedder::new(gemini(config, http_client), config.embedding.model.clone());
    let generator = EmbeddingGenerator::new(embedder, Duration::from_millis(config.embedding.request_delay_ms));

    match command {
        EmbedCommands::Reports => {
            let summary = generator
                .generate_report_embeddings(&config.paths.reports_dir, &config.paths.report_embeddings_dir)
                .await
                .context("Failed to generate report embeddings")?;
            println!("{} Report embeddings: {}", "✓".green().bold(), summary);
        }
        EmbedCommands::Questions => {
            let summary = generator
                .generate_question_embeddings(&config.paths.questions_path, &config.paths.question_embeddings_dir)
                .await
                .context("Failed to generate question embeddings")?;
            println!("{} Question embeddings: {}", "✓".green().bold(), summary);
        }
        EmbedCommands::Test { text } => {
            let text = text.as_deref().unwrap_or(SAMPLE_SENTENCE);
            let sample = generator.test_embedding(text).await.context("Embedding request failed")?;
            println!("Embedding for '{}':", sample.text.cyan());
            println!("First 10 dimensions: {:?}", sample.head);
            println!("Embedding dimension: {}", sample.dimension);
        }
    }

    Ok(())
}

async fn open_index(config: &Config, http_client: &reqwest::Client) -> Result<PineconeIndex> {
    PineconeClient::new(&config.vector_db)
        .with_http_client(http_client.clone())
        .ensure_index(&IndexSpec::from(&config.vector_db), &config.vector_db.namespace)
        .await
        .with_context(|| format!("Failed to open index '{}'", config.vector_db.index_name))
}

async fn vectors(config: &Config, http_client: &reqwest::Client, command: VectorCommands) -> Result<()> {
    let index = open_index(config, http_client).await?;

    match command {
        VectorCommands::Init => {
            let stats = index.describe_stats().await.context("Failed to describe index")?;
            println!("{}", "Index statistics:".bold().green());
            println!("  Dimension:     {}", stats.dimension);
            println!("  Total vectors: {}", stats.total_vector_count);
            for (namespace, ns) in &stats.namespaces {
                println!("  {} {} ({} vectors)", "•".cyan(), namespace, ns.vector_count);
            }
        }
        VectorCommands::Upsert => {
            let records = load_vectors(&config.paths.report_embeddings_dir).await;
            if records.is_empty() {
                println!("{}", "No embedding files found. Run 'portal embed reports' first.".yellow());
                return Ok(());
            }
            let written = upsert_in_batches(&index, &records, config.vector_db.batch_size)
                .await
                .context("Upsert failed")?;
            println!(
                "{} Upserted {} records into namespace '{}'",
                "✓".green().bold(),
                written,
                index.namespace()
            );
        }
        VectorCommands::Query { query_file } => {
            let path = query_file.unwrap_or_else(|| config.paths.question_embeddings_dir.join("q0.json"));
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let question: QuestionEmbedding =
                serde_json::from_str(&contents).with_context(|| format!("Invalid question file {}", path.display()))?;

            let matches = index
                .query(&question.values, config.vector_db.top_k, true)
                .await
                .context("Query failed")?;

            println!("{} {}", "Question:".bold(), question.text);
            for m in matches {
                let title = m.metadata.as_ref().map(|md| md.paragraph_title.as_str()).unwrap_or("");
                println!("  {} {:.4} {} {}", "•".cyan(), m.score, m.id.bold(), title);
            }
        }
    }

    Ok(())
}

async fn extract(
    config: &Config,
    http_client: &reqwest::Client,
    pdfs: &[PathBuf],
    out_dir: Option<PathBuf>,
) -> Result<()> {
    let out_dir = out_dir.unwrap_or_else(|| config.paths.reports_dir.clone());
    let extractor = ReportExtractor::new(gemini(config, http_client), config.llm.model.clone());

    let mut failed = 0;
    for pdf in pdfs {
        match extractor.extract_to_dir(pdf, &out_dir).await {
            Ok(path) => println!("{} {} -> {}", "✓".green().bold(), pdf.display(), path.display()),
            Err(e) => {
                error!(pdf = %pdf.display(), error = %e, "Extraction failed");
                println!("{} {}: {}", "✗".red().bold(), pdf.display(), e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} PDFs failed to extract", failed, pdfs.len());
    }
    Ok(())
}

fn mask_key(key: Option<&str>) -> String {
    match key {
        None => "(not set)".to_string(),
        Some(key) if key.chars().count() <= 4 => "****".to_string(),
        Some(key) => {
            let tail: String = key.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
            format!("****{}", tail)
        }
    }
}

fn show_config(config_path: &Path, config: &Config) {
    println!("{} {}", "Current Configuration:".bold().green(), config_path.display());
    println!();
    println!("{}", "LLM:".bold());
    println!("  Model:             {}", config.llm.model.cyan());
    println!("  Base URL:          {}", config.llm.base_url);
    println!("  Temperature:       {}", config.llm.temperature);
    println!("  Max Output Tokens: {}", config.llm.max_output_tokens);
    println!("  Max Tool Rounds:   {}", config.llm.max_tool_rounds);
    println!("  API Key:           {}", mask_key(config.llm.api_key.as_deref()));
    println!();
    println!("{}", "Embedding:".bold());
    println!("  Model:             {}", config.embedding.model.cyan());
    println!("  Request Delay:     {} ms", config.embedding.request_delay_ms);
    println!();
    println!("{}", "Vector DB:".bold());
    println!("  Index:             {}", config.vector_db.index_name.cyan());
    println!("  Namespace:         {}", config.vector_db.namespace);
    println!("  Dimension:         {}", config.vector_db.dimension);
    println!("  Metric:            {}", config.vector_db.metric);
    println!("  Serverless:        {}/{}", config.vector_db.cloud, config.vector_db.region);
    println!("  Batch Size:        {}", config.vector_db.batch_size);
    println!("  Top K:             {}", config.vector_db.top_k);
    println!("  API Key:           {}", mask_key(config.vector_db.api_key.as_deref()));
    println!();
    println!("{}", "Paths:".bold());
    println!("  Reports:           {}", config.paths.reports_dir.display());
    println!("  Report Embeddings: {}", config.paths.report_embeddings_dir.display());
    println!("  Question Embeds:   {}", config.paths.question_embeddings_dir.display());
    println!("  Questions:         {}", config.paths.questions_path.display());
    println!("  Static:            {}", config.paths.static_dir.display());
    println!();
    println!("{}", "Server:".bold());
    println!("  Bind:              {}", config.server.bind);
    if !config.reports.allowed_files.is_empty() {
        println!();
        println!("{}", "Allowed Reports:".bold());
        for name in &config.reports.allowed_files {
            println!("  {} {}", "•".cyan(), name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_all_but_last_four() {
        assert_eq!(mask_key(None), "(not set)");
        assert_eq!(mask_key(Some("abc")), "****");
        assert_eq!(mask_key(Some("AIzaSyExample1234")), "****1234");
    }

    #[test]
    fn parses_vector_query_with_file() {
        let cli = Cli::try_parse_from(["portal", "vectors", "query", "--query-file", "q3.json"]).unwrap();
        match cli.command {
            Commands::Vectors {
                command: VectorCommands::Query { query_file },
            } => assert_eq!(query_file, Some(PathBuf::from("q3.json"))),
            _ => panic!("wrong command"),
        }
        assert_eq!(cli.config, PathBuf::from("config.yaml"));
    }

    #[test]
    fn extract_requires_a_pdf() {
        assert!(Cli::try_parse_from(["portal", "extract"]).is_err());
        assert!(Cli::try_parse_from(["portal", "-c", "other.yaml", "extract", "a.pdf", "b.pdf"]).is_ok());
    }

    #[test]
    fn missing_config_file_uses_defaults() {
        let config = load_config(Path::new("/nonexistent/portal/config.yaml")).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:5000");
    }

    #[test]
    fn detects_missing_key_through_context() {
        let err = anyhow::Error::new(ProviderError::MissingApiKey("GEMINI_API_KEY".to_string()))
            .context("Failed to get LLM response");
        assert!(is_configuration_error(&err));
        assert!(!is_configuration_error(&anyhow::anyhow!("other")));
    }
}
