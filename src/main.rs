use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::env;

mod campaign;
mod compose;
mod config;
mod generate;
mod init;
mod llm;
mod output;
mod plan;
mod profile;
mod proxy;
mod quota;
mod retrieval;
mod telemetry;

#[derive(Parser)]
#[command(name = "copydesk", about = "Retrieval-grounded marketing copy with per-plan generation quotas")]
struct Cli {
    #[arg(global = true, short, long)]
    dsn: Option<String>,
    /// Emit a single JSON envelope to stdout; logs go to stderr
    #[arg(global = true, long, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Init(init::InitCmd),
    Generate(generate::GenerateCmd),
    Quota(quota::QuotaCmd),
    Plan(plan::PlanCmd),
    Campaign(campaign::CampaignCmd),
    Profile(profile::ProfileCmd),
    /// Check database connectivity
    Check,
    /// Run the generation intermediary
    Proxy(proxy::ProxyCmd),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    telemetry::config::set_json_mode(cli.json);

    // stderr logging; respects RUST_LOG and COPYDESK_LOG_FORMAT
    telemetry::config::init_tracing();

    if let Commands::Proxy(args) = cli.command {
        return proxy::run(args).await;
    }

    let dsn = cli
        .dsn
        .or_else(|| env::var("DATABASE_URL").ok())
        .context("Please provide --dsn or set DATABASE_URL in .env")?;
    let pool = connect(&dsn).await?;
    let cfg = config::AppConfig::from_env();

    match cli.command {
        Commands::Init(args) => init::run(&pool, args).await?,
        Commands::Generate(args) => generate::run(&pool, &cfg, args).await?,
        Commands::Quota(args) => quota::run(&pool, args).await?,
        Commands::Plan(args) => plan::run(&pool, args).await?,
        Commands::Campaign(args) => campaign::run(&pool, &cfg, args).await?,
        Commands::Profile(args) => profile::run(&pool, args).await?,
        Commands::Check => init::check(&pool).await?,
        Commands::Proxy(_) => {}
    }

    Ok(())
}

async fn connect(dsn: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(dsn)
        .await
        .context("connect to database")
}
