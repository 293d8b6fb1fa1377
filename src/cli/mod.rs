pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::database::DatabaseManager;

#[derive(Parser)]
#[command(name = "protocol-admin")]
#[command(about = "Protocol API administration - schema, ordering repair and accounts")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[arg(long, global = true, help = "Override the configured database URL")]
    pub database_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Apply pending schema migrations")]
    Migrate,

    #[command(about = "Report parents whose ordering is not dense")]
    Check(commands::ordering::CheckArgs),

    #[command(about = "Renumber memberships to 1..N, keeping their relative order")]
    Resequence(commands::ordering::ResequenceArgs),

    #[command(about = "Delete expired refresh tokens")]
    CleanupTokens,

    #[command(about = "Create a user account (works with registration disabled)")]
    CreateUser(commands::user::CreateUserArgs),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli, mut config: AppConfig) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);
    if let Some(url) = cli.database_url.clone() {
        config.database.url = url;
    }

    let db = DatabaseManager::connect(&config.database).await?;
    let result = match cli.command {
        Commands::Migrate => commands::migrate::handle(&db, output_format).await,
        Commands::Check(args) => {
            migrated(&db).await?;
            commands::ordering::check(&db, args, output_format).await
        }
        Commands::Resequence(args) => {
            migrated(&db).await?;
            commands::ordering::resequence(&db, args, output_format).await
        }
        Commands::CleanupTokens => {
            migrated(&db).await?;
            commands::tokens::cleanup(&db, output_format).await
        }
        Commands::CreateUser(args) => {
            migrated(&db).await?;
            commands::user::create(&db, &config, args, output_format).await
        }
    };
    db.close().await;
    result
}

/// In-memory databases start empty; file databases must already be migrated
async fn migrated(db: &DatabaseManager) -> anyhow::Result<()> {
    if db.is_memory() {
        db.migrate().await?;
    }
    Ok(())
}
