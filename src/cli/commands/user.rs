use clap::Args;
use serde_json::json;

use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::config::AppConfig;
use crate::database::models::Role;
use crate::database::DatabaseManager;
use crate::services::AuthService;

#[derive(Debug, Args)]
pub struct CreateUserArgs {
    #[arg(help = "Username (3-50 characters: letters, digits, '_' or '-')")]
    pub username: String,

    #[arg(long, env = "PROTOCOL_ADMIN_PASSWORD", help = "Password (or PROTOCOL_ADMIN_PASSWORD)")]
    pub password: String,

    #[arg(long, help = "Grant the admin role")]
    pub admin: bool,
}

pub async fn create(
    db: &DatabaseManager,
    config: &AppConfig,
    args: CreateUserArgs,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    let role = if args.admin { Role::Admin } else { Role::User };
    let auth = AuthService::new(db.pool().clone(), config.security.clone());
    let user = auth.create_user(&args.username, &args.password, role).await?;

    output_success(
        output_format,
        &format!("Created {} '{}' with id {}", role, user.username, user.id),
        Some(json!({ "user": user })),
    )
}
