use anyhow::Context;
use clap::Parser;
use nlq_engine::config::Settings;
use nlq_engine::db::connection::init_pool;
use nlq_engine::db::schema_repo::{SchemaReader, SchemaRepository};
use nlq_engine::executor::{PgBackend, TabularBackend};
use nlq_engine::llm::{OllamaClient, TextGenerator};
use nlq_engine::observability::logger::RunLog;
use nlq_engine::pipeline::NlqPipeline;
use nlq_engine::sql_guard::SqlGuard;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Ask questions about a PostgreSQL database in plain language.
#[derive(Parser, Debug)]
#[command(name = "nlq", version, about)]
struct Args {
    /// The question to answer. Omit when using --summary or --tables.
    question: Option<String>,

    /// Print a narrative summary of the schema and exit.
    #[arg(long)]
    summary: bool,

    /// Print the table listing as JSON and exit.
    #[arg(long)]
    tables: bool,

    /// Additionally parse generated SQL and reject anything that is not
    /// a single query statement.
    #[arg(long)]
    strict: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Logs go to stderr so stdout stays valid JSON for piping.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let settings = Settings::from_env().context("failed to load configuration")?;

    let pool = init_pool(&settings.database_url)
        .await
        .context("failed to connect to PostgreSQL")?;

    let llm: Arc<dyn TextGenerator> = Arc::new(OllamaClient::new(
        settings.ollama_base_url.clone(),
        settings.ollama_model.clone(),
    ));
    let backend: Arc<dyn TabularBackend> = Arc::new(PgBackend::new(pool.clone()));
    let schema: Arc<dyn SchemaReader> = Arc::new(SchemaRepository::new(pool));

    let guard = if args.strict {
        SqlGuard::strict()
    } else {
        SqlGuard::new()
    };
    let run_log = Arc::new(RunLog::new(settings.run_log_path.clone(), 1000));

    let pipeline = NlqPipeline::new(schema, llm, backend)
        .with_guard(guard)
        .with_run_log(run_log);

    if args.summary {
        let summary = pipeline.schema_summary().await?;
        println!("{}", summary);
        return Ok(());
    }

    if args.tables {
        let tables = pipeline.list_tables().await?;
        println!("{}", serde_json::to_string_pretty(&tables)?);
        return Ok(());
    }

    let question = args
        .question
        .context("provide a question, or use --summary / --tables")?;

    let outcome = pipeline.process_question(&question).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if !outcome.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
