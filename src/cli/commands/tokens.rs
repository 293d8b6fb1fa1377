use serde_json::json;

use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::database::DatabaseManager;
use crate::services::cleanup_expired_tokens;

pub async fn cleanup(db: &DatabaseManager, output_format: OutputFormat) -> anyhow::Result<()> {
    let deleted = cleanup_expired_tokens(db.pool()).await?;
    output_success(
        output_format,
        &format!("Deleted {} expired refresh tokens", deleted),
        Some(json!({ "deleted": deleted })),
    )
}
