use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;
use warehouse_qa::config::AssistantConfig;
use warehouse_qa::db::init_pool;
use warehouse_qa::execution::PostgresEngine;
use warehouse_qa::retrieval::{KnowledgeBaseClient, RetrievalSource};
use warehouse_qa::schema::{CatalogHandle, CatalogLoader, FileSchemaSource, PostgresSchemaSource, SchemaSource};
use warehouse_qa::schema_rag::SearchBackend;
use warehouse_qa::{llm, Assistant, Session};

#[derive(Parser)]
#[command(name = "warehouse-qa")]
#[command(about = "Ask questions about your data warehouse in plain language")]
struct Args {
    /// Load environment variables from this file instead of ./.env
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Print the generated SQL under each answer
    #[arg(long)]
    show_sql: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.env_file {
        Some(ref path) => {
            dotenv::from_path(path).with_context(|| format!("Failed to load {}", path.display()))?;
        }
        None => {
            dotenv::dotenv().ok();
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let config = AssistantConfig::from_env()?;
    let assistant = build_assistant(&config).await?;

    println!("Ask me questions about your data (type 'exit' or 'quit' to stop, ':refresh' to reload the schema, ':tables' to list tables).");

    let mut session = Session::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\n> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();

        match question {
            "" => continue,
            q if q.eq_ignore_ascii_case("exit") || q.eq_ignore_ascii_case("quit") => break,
            ":refresh" => match assistant.refresh_schema().await {
                Ok(count) => println!("Schema reloaded: {} tables.", count),
                Err(e) => println!("Schema reload failed: {}", e),
            },
            ":tables" => {
                for table in assistant.visible_tables() {
                    println!("  {}", table);
                }
            }
            _ => {
                let answer = assistant.ask(&mut session, question).await;
                println!("\n[{}] {}", answer.route, answer.text);
                if args.show_sql {
                    if let Some(ref sql) = answer.sql {
                        println!("\nSQL: {}", sql);
                    }
                }
            }
        }
    }

    println!("Goodbye!");
    Ok(())
}

async fn build_assistant(config: &AssistantConfig) -> Result<Assistant> {
    let warehouse_url = config
        .warehouse
        .url
        .as_deref()
        .context("WAREHOUSE_URL (or DATABASE_URL) must be set")?;
    let pool = init_pool(warehouse_url).await.context("Failed to connect to the warehouse")?;

    let source: Arc<dyn SchemaSource> = match config.warehouse.schema_file {
        Some(ref path) => Arc::new(FileSchemaSource::new(path)),
        None => Arc::new(PostgresSchemaSource::new(
            pool.clone(),
            config.warehouse.schema.clone(),
            config.warehouse.external_schema.clone(),
        )),
    };

    let search_backend = SearchBackend::from_settings(&config.embedding, &config.llm)?;
    let loader = CatalogLoader::new(source, search_backend, config.warehouse.hidden_marker.clone());
    let catalog = Arc::new(CatalogHandle::load(loader).await?);
    info!("{} visible tables", catalog.snapshot().catalog.len());

    let model = llm::from_settings(&config.llm)?;

    let retrieval: Option<Arc<dyn RetrievalSource>> = match config.retrieval.knowledge_base_id {
        Some(ref knowledge_base_id) => {
            let token = config
                .llm
                .bedrock
                .bearer_token
                .clone()
                .context("AWS_BEARER_TOKEN_BEDROCK must be set to use the knowledge base")?;
            let model_arn = config
                .retrieval
                .model_arn
                .as_deref()
                .context("KNOWLEDGE_BASE_MODEL_ARN (or BEDROCK_INFERENCE_PROFILE_ID) must be set to use the knowledge base")?;
            Some(Arc::new(KnowledgeBaseClient::new(
                token,
                &config.retrieval.region,
                knowledge_base_id.clone(),
                model_arn,
                config.retrieval.max_citations,
            )?))
        }
        None => None,
    };

    Ok(Assistant::new(
        model,
        Arc::new(PostgresEngine::new(pool)),
        catalog,
        retrieval,
        &config.pipeline,
    ))
}
