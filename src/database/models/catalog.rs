use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row of any catalog table (sensors, domains, tasks, subsections, sections,
/// protocols). `created_by` is only populated for protocols and sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CatalogRecord {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A child (task or subsection) together with its default associations
#[derive(Debug, Clone, Serialize)]
pub struct ChildDetail {
    #[serde(flatten)]
    pub record: CatalogRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor_ids: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_ids: Option<Vec<i64>>,
}
