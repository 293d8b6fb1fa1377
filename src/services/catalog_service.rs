use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use std::fmt;
use std::str::FromStr;
use tracing::info;

use crate::database::models::{CatalogRecord, ChildDetail};
use crate::ordering::associations::{list_default_associations, replace_default_associations};
use crate::ordering::engine::begin_write;
use crate::ordering::{AssociationKind, OrderingEngine, OrderingError, Relation};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Invalid {field}: {message}")]
    Validation { field: &'static str, message: String },
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Ordering(#[from] OrderingError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// The catalog tables managed through plain CRUD
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogEntity {
    Sensor,
    Domain,
    Task,
    Subsection,
    Section,
    Protocol,
}

impl CatalogEntity {
    pub const ALL: [CatalogEntity; 6] = [
        CatalogEntity::Sensor,
        CatalogEntity::Domain,
        CatalogEntity::Task,
        CatalogEntity::Subsection,
        CatalogEntity::Section,
        CatalogEntity::Protocol,
    ];

    pub fn table(self) -> &'static str {
        match self {
            CatalogEntity::Sensor => "sensors",
            CatalogEntity::Domain => "domains",
            CatalogEntity::Task => "tasks",
            CatalogEntity::Subsection => "subsections",
            CatalogEntity::Section => "sections",
            CatalogEntity::Protocol => "protocols",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CatalogEntity::Sensor => "sensor",
            CatalogEntity::Domain => "domain",
            CatalogEntity::Task => "task",
            CatalogEntity::Subsection => "subsection",
            CatalogEntity::Section => "section",
            CatalogEntity::Protocol => "protocol",
        }
    }

    /// Protocols and sections record their creator, who controls their ordering
    pub fn is_owned(self) -> bool {
        matches!(self, CatalogEntity::Section | CatalogEntity::Protocol)
    }

    /// Entity stored in a relation's parent table
    pub fn parent_of(relation: Relation) -> CatalogEntity {
        match relation {
            Relation::ProtocolTasks | Relation::ProtocolSections => CatalogEntity::Protocol,
            Relation::SectionSubsections => CatalogEntity::Section,
        }
    }

    fn columns(self) -> &'static str {
        if self.is_owned() {
            "id, name, description, created_by, created_at, updated_at"
        } else {
            "id, name, description, NULL AS created_by, created_at, updated_at"
        }
    }
}

impl fmt::Display for CatalogEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for CatalogEntity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CatalogEntity::ALL
            .into_iter()
            .find(|e| e.table() == s || e.label() == s)
            .ok_or_else(|| format!("Unknown catalog entity '{}'", s))
    }
}

/// Create/update payload shared by every catalog entity
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogInput {
    pub name: String,
    pub description: Option<String>,
}

impl CatalogInput {
    const MAX_NAME_LENGTH: usize = 200;

    fn validated(&self) -> Result<(String, Option<String>), CatalogError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(CatalogError::Validation {
                field: "name",
                message: "Name is required".to_string(),
            });
        }
        if name.chars().count() > Self::MAX_NAME_LENGTH {
            return Err(CatalogError::Validation {
                field: "name",
                message: format!("Name must be at most {} characters", Self::MAX_NAME_LENGTH),
            });
        }
        let description = self
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        Ok((name.to_string(), description))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutcome {
    pub id: i64,
    /// Parents whose ordering was compacted because this child was removed from them
    pub resequenced_parents: usize,
}

pub struct CatalogService {
    pool: SqlitePool,
}

impl CatalogService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, entity: CatalogEntity) -> Result<Vec<CatalogRecord>, CatalogError> {
        let sql = format!("SELECT {} FROM {} ORDER BY name", entity.columns(), entity.table());
        let rows = sqlx::query_as::<_, CatalogRecord>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn get(&self, entity: CatalogEntity, id: i64) -> Result<CatalogRecord, CatalogError> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, entity, id).await
    }

    pub async fn create(
        &self,
        entity: CatalogEntity,
        input: &CatalogInput,
        created_by: Option<i64>,
    ) -> Result<CatalogRecord, CatalogError> {
        let (name, description) = input.validated()?;
        let now = chrono::Utc::now();

        let sql = if entity.is_owned() {
            format!(
                "INSERT INTO {} (name, description, created_by, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
                entity.table()
            )
        } else {
            format!(
                "INSERT INTO {} (name, description, created_at, updated_at) VALUES (?, ?, ?, ?)",
                entity.table()
            )
        };

        let mut query = sqlx::query(&sql).bind(&name).bind(description.as_deref());
        if entity.is_owned() {
            query = query.bind(created_by);
        }
        let mut conn = self.pool.acquire().await?;
        let id = query
            .bind(now)
            .bind(now)
            .execute(&mut *conn)
            .await
            .map_err(|e| unique_name_conflict(e, entity, &name))?
            .last_insert_rowid();

        info!("Created {} {} ({})", entity, id, name);
        fetch(&mut conn, entity, id).await
    }

    pub async fn update(
        &self,
        entity: CatalogEntity,
        id: i64,
        input: &CatalogInput,
    ) -> Result<CatalogRecord, CatalogError> {
        let (name, description) = input.validated()?;

        let sql = format!(
            "UPDATE {} SET name = ?, description = ?, updated_at = ? WHERE id = ?",
            entity.table()
        );
        let mut conn = self.pool.acquire().await?;
        let result = sqlx::query(&sql)
            .bind(&name)
            .bind(description.as_deref())
            .bind(chrono::Utc::now())
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(|e| unique_name_conflict(e, entity, &name))?;

        if result.rows_affected() == 0 {
            return Err(not_found(entity, id));
        }
        fetch(&mut conn, entity, id).await
    }

    /// Delete a record. Memberships referencing it go with it (FK cascade), and
    /// every parent that lost a membership is resequenced in the same
    /// transaction so its ordering stays dense.
    pub async fn delete(&self, entity: CatalogEntity, id: i64) -> Result<DeleteOutcome, CatalogError> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = begin_write(&mut conn, entity.table(), id).await?;
        fetch(&mut tx, entity, id).await?;

        let mut affected = Vec::new();
        for relation in Relation::with_child_table(entity.table()) {
            let sql = format!(
                "SELECT DISTINCT {} FROM {} WHERE {} = ?",
                relation.parent_column(),
                relation.table(),
                relation.child_column()
            );
            let parents = sqlx::query_scalar::<_, i64>(&sql)
                .bind(id)
                .fetch_all(&mut *tx)
                .await?;
            affected.extend(parents.into_iter().map(|parent_id| (relation, parent_id)));
        }

        sqlx::query(&format!("DELETE FROM {} WHERE id = ?", entity.table()))
            .bind(id)
            .execute(&mut *tx)
            .await?;

        for (relation, parent_id) in &affected {
            OrderingEngine::new(*relation).resequence(&mut tx, *parent_id).await?;
        }
        tx.commit().await?;

        info!(
            "Deleted {} {} ({} parent orderings compacted)",
            entity,
            id,
            affected.len()
        );
        Ok(DeleteOutcome {
            id,
            resequenced_parents: affected.len(),
        })
    }

    /// A task or subsection with its default associations; other entities are
    /// returned without association fields.
    pub async fn detail(&self, entity: CatalogEntity, id: i64) -> Result<ChildDetail, CatalogError> {
        let mut conn = self.pool.acquire().await?;
        let record = fetch(&mut conn, entity, id).await?;

        let mut detail = ChildDetail {
            record,
            sensor_ids: None,
            domain_ids: None,
        };
        for kind in default_kinds(entity) {
            let ids = list_default_associations(&mut conn, *kind, id).await?;
            match kind.attribute_table() {
                "domains" => detail.domain_ids = Some(ids),
                _ => detail.sensor_ids = Some(ids),
            }
        }
        Ok(detail)
    }

    pub async fn default_associations(
        &self,
        kind: AssociationKind,
        child_id: i64,
    ) -> Result<Vec<i64>, CatalogError> {
        let mut conn = self.pool.acquire().await?;
        let entity = child_entity(kind);
        fetch(&mut conn, entity, child_id).await?;
        Ok(list_default_associations(&mut conn, kind, child_id).await?)
    }

    /// Replace a child's default sensors or domains. Only memberships created
    /// afterwards pick up the new defaults.
    pub async fn set_default_associations(
        &self,
        kind: AssociationKind,
        child_id: i64,
        attribute_ids: &[i64],
    ) -> Result<Vec<i64>, CatalogError> {
        let mut conn = self.pool.acquire().await?;
        let ids = replace_default_associations(&mut conn, kind, child_id, attribute_ids).await?;
        info!("Set {} defaults for {} {}: {:?}", kind.slug(), child_entity(kind), child_id, ids);
        Ok(ids)
    }
}

fn default_kinds(entity: CatalogEntity) -> &'static [AssociationKind] {
    match entity {
        CatalogEntity::Task => Relation::ProtocolTasks.associations(),
        CatalogEntity::Subsection => Relation::SectionSubsections.associations(),
        _ => &[],
    }
}

fn child_entity(kind: AssociationKind) -> CatalogEntity {
    match kind.relation() {
        Relation::ProtocolTasks => CatalogEntity::Task,
        Relation::SectionSubsections => CatalogEntity::Subsection,
        Relation::ProtocolSections => CatalogEntity::Section,
    }
}

async fn fetch(conn: &mut SqliteConnection, entity: CatalogEntity, id: i64) -> Result<CatalogRecord, CatalogError> {
    let sql = format!("SELECT {} FROM {} WHERE id = ?", entity.columns(), entity.table());
    sqlx::query_as::<_, CatalogRecord>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| not_found(entity, id))
}

fn not_found(entity: CatalogEntity, id: i64) -> CatalogError {
    CatalogError::NotFound(format!("{} {} not found", entity, id))
}

fn unique_name_conflict(err: sqlx::Error, entity: CatalogEntity, name: &str) -> CatalogError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            CatalogError::Conflict(format!("A {} named '{}' already exists", entity, name))
        }
        _ => CatalogError::Database(err),
    }
}
