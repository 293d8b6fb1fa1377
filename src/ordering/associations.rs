use std::collections::BTreeSet;

use sqlx::SqliteConnection;

use super::engine::{begin_write, ensure_row, placeholders};
use super::error::{OrderingError, OrderingResult};
use super::relation::AssociationKind;

/// Copy the child's default associations of `kind` onto a membership.
///
/// Rows the membership already has are skipped, so calling this twice inserts
/// nothing the second time. Runs on whatever transaction `conn` is in.
pub async fn copy_default_associations(
    conn: &mut SqliteConnection,
    membership_id: i64,
    child_id: i64,
    kind: AssociationKind,
) -> OrderingResult<u64> {
    let sql = format!(
        "INSERT INTO {mt} ({mc}, {ac}) SELECT ?, {ac} FROM {dt} WHERE {dc} = ? ON CONFLICT DO NOTHING",
        mt = kind.membership_table(),
        mc = kind.membership_column(),
        ac = kind.attribute_column(),
        dt = kind.default_table(),
        dc = kind.default_column(),
    );
    let result = sqlx::query(&sql)
        .bind(membership_id)
        .bind(child_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Attribute ids attached to a child by default
pub async fn list_default_associations(
    conn: &mut SqliteConnection,
    kind: AssociationKind,
    child_id: i64,
) -> OrderingResult<Vec<i64>> {
    let sql = format!(
        "SELECT {ac} FROM {dt} WHERE {dc} = ? ORDER BY {ac}",
        ac = kind.attribute_column(),
        dt = kind.default_table(),
        dc = kind.default_column(),
    );
    let ids = sqlx::query_scalar::<_, i64>(&sql)
        .bind(child_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(ids)
}

/// Replace a child's default associations. Existing memberships keep the
/// copies they were created with.
pub async fn replace_default_associations(
    conn: &mut SqliteConnection,
    kind: AssociationKind,
    child_id: i64,
    attribute_ids: &[i64],
) -> OrderingResult<Vec<i64>> {
    let relation = kind.relation();
    let mut tx = begin_write(conn, relation.child_table(), child_id).await?;

    ensure_row(&mut tx, relation.child_table(), relation.child_label(), child_id).await?;
    let ids = ensure_attributes(&mut tx, kind, attribute_ids).await?;

    replace_rows(
        &mut tx,
        kind.default_table(),
        kind.default_column(),
        kind.attribute_column(),
        child_id,
        &ids,
    )
    .await?;
    tx.commit().await?;

    Ok(ids)
}

/// Attribute ids attached to one membership
pub async fn list_membership_associations(
    conn: &mut SqliteConnection,
    kind: AssociationKind,
    membership_id: i64,
) -> OrderingResult<Vec<i64>> {
    ensure_row(conn, kind.relation().table(), "membership", membership_id).await?;

    let sql = format!(
        "SELECT {ac} FROM {mt} WHERE {mc} = ? ORDER BY {ac}",
        ac = kind.attribute_column(),
        mt = kind.membership_table(),
        mc = kind.membership_column(),
    );
    let ids = sqlx::query_scalar::<_, i64>(&sql)
        .bind(membership_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(ids)
}

/// Override the associations of one membership, independently of the child's defaults
pub async fn replace_membership_associations(
    conn: &mut SqliteConnection,
    kind: AssociationKind,
    membership_id: i64,
    attribute_ids: &[i64],
) -> OrderingResult<Vec<i64>> {
    let mut tx = begin_write(conn, kind.relation().table(), membership_id).await?;

    ensure_row(&mut tx, kind.relation().table(), "membership", membership_id).await?;
    let ids = ensure_attributes(&mut tx, kind, attribute_ids).await?;

    replace_rows(
        &mut tx,
        kind.membership_table(),
        kind.membership_column(),
        kind.attribute_column(),
        membership_id,
        &ids,
    )
    .await?;
    tx.commit().await?;

    Ok(ids)
}

/// Deduplicate and verify every attribute exists; returns the sorted ids
async fn ensure_attributes(
    conn: &mut SqliteConnection,
    kind: AssociationKind,
    attribute_ids: &[i64],
) -> OrderingResult<Vec<i64>> {
    let ids: Vec<i64> = attribute_ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
    if ids.is_empty() {
        return Ok(ids);
    }

    let sql = format!(
        "SELECT id FROM {} WHERE id IN ({})",
        kind.attribute_table(),
        placeholders(ids.len())
    );
    let mut query = sqlx::query_scalar::<_, i64>(&sql);
    for id in &ids {
        query = query.bind(*id);
    }
    let found: BTreeSet<i64> = query.fetch_all(&mut *conn).await?.into_iter().collect();

    let missing: Vec<i64> = ids.iter().copied().filter(|id| !found.contains(id)).collect();
    if !missing.is_empty() {
        return Err(OrderingError::NotFound(format!(
            "{} {:?} not found",
            kind.attribute_table(),
            missing
        )));
    }
    Ok(ids)
}

async fn replace_rows(
    conn: &mut SqliteConnection,
    table: &str,
    owner_column: &str,
    attribute_column: &str,
    owner_id: i64,
    ids: &[i64],
) -> OrderingResult<()> {
    sqlx::query(&format!("DELETE FROM {} WHERE {} = ?", table, owner_column))
        .bind(owner_id)
        .execute(&mut *conn)
        .await?;

    let insert = format!(
        "INSERT INTO {} ({}, {}) VALUES (?, ?)",
        table, owner_column, attribute_column
    );
    for id in ids {
        sqlx::query(&insert)
            .bind(owner_id)
            .bind(*id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}
