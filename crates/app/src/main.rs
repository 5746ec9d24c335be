use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use mailgraph_core::config::{DEFAULT_GMAIL_BASE_URL, DEFAULT_NEO4J_URL, DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL};
use mailgraph_core::{
    source_folders, BatchReport, BodyExtractor, ConfiguredEngine, Digitizer, DocumentPipeline,
    ExtractionClient, GmailClient, GmailConfig, GraphLoader, GraphPipeline, MailPipeline,
    MailQuery, Neo4jConfig, Neo4jStore, OcrEndpointConfig, OpenAiChatModel, OpenAiConfig,
    OutputFormat, OutputWriter, PromptSet, QuoteHandling,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "mailgraph", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Save the latest messages, one folder per email.
    Messages {
        #[command(flatten)]
        gmail: GmailArgs,

        /// Folder that receives the email folders.
        #[arg(long, default_value = ".")]
        output: PathBuf,

        /// Cut each body at the first quoted-reply marker.
        #[arg(long, default_value_t = false)]
        strip_quoted: bool,
    },
    /// Save the latest threads as threads/<thread_id>/<email>/.
    Threads {
        #[command(flatten)]
        gmail: GmailArgs,

        /// Root folder for thread folders.
        #[arg(long, default_value = "./threads")]
        threads: PathBuf,

        /// Keep quoted replies in each body.
        #[arg(long, default_value_t = false)]
        keep_quoted: bool,
    },
    /// Digitize documents and write one structured output folder per document.
    Extract {
        #[command(flatten)]
        sources: SourceArgs,

        #[command(flatten)]
        openai: OpenAiArgs,

        #[command(flatten)]
        ocr: OcrArgs,

        /// Folder that receives the output folders.
        #[arg(long, default_value = "./outputs")]
        output: PathBuf,

        #[arg(long, value_enum, default_value_t = FormatArg::Json)]
        format: FormatArg,
    },
    /// Load record files and text documents into the graph store.
    Graph {
        #[command(flatten)]
        sources: SourceArgs,

        #[command(flatten)]
        openai: OpenAiArgs,

        #[command(flatten)]
        neo4j: Neo4jArgs,
    },
}

#[derive(Args)]
struct GmailArgs {
    /// OAuth access token for the mailbox.
    #[arg(long, env = "GMAIL_ACCESS_TOKEN", hide_env_values = true)]
    gmail_access_token: String,

    #[arg(long, env = "GMAIL_BASE_URL", default_value = DEFAULT_GMAIL_BASE_URL)]
    gmail_base_url: String,

    #[arg(long, env = "GMAIL_USER", default_value = "me")]
    gmail_user: String,

    /// Only list items carrying these labels.
    #[arg(long = "label")]
    labels: Vec<String>,

    #[arg(long, default_value = "10")]
    max_results: u32,
}

impl GmailArgs {
    fn config(&self) -> GmailConfig {
        GmailConfig {
            base_url: self.gmail_base_url.clone(),
            user_id: self.gmail_user.clone(),
            access_token: self.gmail_access_token.clone(),
        }
    }

    fn query(&self) -> MailQuery {
        MailQuery {
            label_ids: self.labels.clone(),
            max_results: self.max_results,
        }
    }
}

#[derive(Args)]
struct OpenAiArgs {
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: String,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_OPENAI_BASE_URL)]
    openai_base_url: String,

    #[arg(long, env = "OPENAI_MODEL", default_value = DEFAULT_OPENAI_MODEL)]
    openai_model: String,

    /// Folder holding system_message.txt, chatgpt_prompt.txt and json_data*.json.
    #[arg(long, default_value = "./prompts")]
    prompts: PathBuf,
}

impl OpenAiArgs {
    fn extraction_client(&self) -> anyhow::Result<ExtractionClient<OpenAiChatModel>> {
        let prompts = PromptSet::load(&self.prompts)
            .with_context(|| format!("failed to load prompts from {}", self.prompts.display()))?;

        let mut config = OpenAiConfig::new(self.openai_api_key.clone());
        config.base_url = self.openai_base_url.clone();
        config.model = self.openai_model.clone();
        let model = OpenAiChatModel::new(config).context("failed to build the chat client")?;

        Ok(ExtractionClient::new(model, prompts))
    }
}

#[derive(Args)]
struct OcrArgs {
    #[arg(long, env = "OCR_ENDPOINT")]
    ocr_endpoint: Option<String>,

    #[arg(long, env = "OCR_API_KEY", hide_env_values = true)]
    ocr_api_key: Option<String>,
}

#[derive(Args)]
struct Neo4jArgs {
    /// Neo4j HTTP URL
    #[arg(long, env = "NEO4J_URL", default_value = DEFAULT_NEO4J_URL)]
    neo4j_url: String,

    #[arg(long, env = "NEO4J_DB", default_value = "neo4j")]
    neo4j_db: String,

    #[arg(long, env = "NEO4J_USER", default_value = "neo4j")]
    neo4j_user: String,

    #[arg(long, env = "NEO4J_PASSWORD", default_value = "password", hide_env_values = true)]
    neo4j_password: String,
}

#[derive(Args)]
struct SourceArgs {
    #[arg(long, default_value = "./Documents")]
    documents: PathBuf,

    /// Root of the saved threads; every threads/<thread>/<email>/ folder is scanned.
    #[arg(long, default_value = "./threads")]
    threads: PathBuf,
}

impl SourceArgs {
    fn folders(&self) -> Vec<PathBuf> {
        source_folders(&self.documents, &self.threads)
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Json,
    Turtle,
}

impl From<FormatArg> for OutputFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Json => OutputFormat::Json,
            FormatArg::Turtle => OutputFormat::Turtle,
        }
    }
}

fn summarize(command: &str, report: &BatchReport) {
    if !report.skipped.is_empty() {
        warn!(command, skipped = report.skipped.len(), "some items were skipped");
    }
    info!(
        command,
        written = report.written.len(),
        skipped = report.skipped.len(),
        "run finished"
    );
    println!(
        "{command}: {} written, {} skipped at {}",
        report.written.len(),
        report.skipped.len(),
        Utc::now().to_rfc3339()
    );
}

fn mail_pipeline(gmail: &GmailArgs, root: &Path, quotes: QuoteHandling) -> anyhow::Result<MailPipeline<GmailClient>> {
    let extractor = BodyExtractor::new(quotes).context("failed to compile the quoted-reply marker")?;
    Ok(MailPipeline::new(
        GmailClient::new(gmail.config()),
        extractor,
        OutputWriter::new(root),
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(version = env!("CARGO_PKG_VERSION"), "mailgraph boot");

    match cli.command {
        Command::Messages {
            gmail,
            output,
            strip_quoted,
        } => {
            let quotes = if strip_quoted {
                QuoteHandling::StripPrevious
            } else {
                QuoteHandling::Keep
            };
            let report = mail_pipeline(&gmail, &output, quotes)?
                .run_messages(&gmail.query())
                .await
                .context("failed to list messages")?;
            summarize("messages", &report);
        }
        Command::Threads {
            gmail,
            threads,
            keep_quoted,
        } => {
            let quotes = if keep_quoted {
                QuoteHandling::Keep
            } else {
                QuoteHandling::StripPrevious
            };
            let report = mail_pipeline(&gmail, &threads, quotes)?
                .run_threads(&gmail.query())
                .await
                .context("failed to list threads")?;
            summarize("threads", &report);
        }
        Command::Extract {
            sources,
            openai,
            ocr,
            output,
            format,
        } => {
            let engine = ConfiguredEngine::new(OcrEndpointConfig::from_parts(ocr.ocr_endpoint, ocr.ocr_api_key));
            let pipeline = DocumentPipeline::new(
                Digitizer::new(engine),
                openai.extraction_client()?,
                OutputWriter::new(&output),
                format.into(),
            );

            let report = pipeline
                .run(&sources.folders())
                .await
                .context("extraction stopped on a malformed model reply")?;
            summarize("extract", &report);
        }
        Command::Graph {
            sources,
            openai,
            neo4j,
        } => {
            let config = Neo4jConfig {
                endpoint: neo4j.neo4j_url,
                database: neo4j.neo4j_db,
                username: neo4j.neo4j_user,
                password: neo4j.neo4j_password,
            };
            let store = Neo4jStore::connect(config)
                .await
                .context("failed to reach the graph store")?;

            let pipeline = GraphPipeline::new(openai.extraction_client()?, GraphLoader::new(store));
            let report = pipeline
                .run(&sources.folders())
                .await
                .context("graph load stopped on a malformed model reply")?;

            info!(
                documents = report.graph.documents,
                senders = report.graph.senders,
                companies = report.graph.companies,
                skipped_records = report.graph.skipped,
                "graph updated"
            );
            summarize("graph", &report);
            pipeline.into_loader().into_store().close();
        }
    }

    Ok(())
}
