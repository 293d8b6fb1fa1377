use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use sqlx::{Connection, FromRow, Sqlite, SqliteConnection, Transaction};
use tracing::{debug, info};

use super::associations::copy_default_associations;
use super::error::{OrderingError, OrderingResult};
use super::relation::Relation;

/// First `order_index` of every parent's sequence
pub const ORDER_BASE: i64 = 1;

/// A row of a membership table, with the relation-specific column names
/// aliased to `parent_id` / `child_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Membership {
    pub id: i64,
    pub parent_id: i64,
    pub child_id: i64,
    pub order_index: i64,
    pub rating: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct InsertOptions {
    pub copy_default_associations: bool,
}

impl Default for InsertOptions {
    fn default() -> Self {
        Self {
            copy_default_associations: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InsertOutcome {
    pub membership_id: i64,
    pub position: i64,
    pub shifted: u64,
    pub copied_associations: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveOutcome {
    pub membership_id: i64,
    pub from: i64,
    pub to: i64,
    pub moved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoveOutcome {
    pub membership_id: i64,
    pub position: i64,
    pub shifted: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderAssignment {
    pub child_id: i64,
    pub order_index: i64,
}

/// Per-membership override fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipDetails {
    pub rating: Option<i64>,
    pub notes: Option<String>,
}

/// Maintains the ordered memberships of one relation.
///
/// The engine holds no connection of its own: every call receives the
/// connection (or transaction) to run on and opens a nested transaction on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderingEngine {
    relation: Relation,
}

impl OrderingEngine {
    pub fn new(relation: Relation) -> Self {
        Self { relation }
    }

    pub fn relation(&self) -> Relation {
        self.relation
    }

    /// All memberships of a parent, ordered by position
    pub async fn list_memberships(
        &self,
        conn: &mut SqliteConnection,
        parent_id: i64,
    ) -> OrderingResult<Vec<Membership>> {
        let sql = format!(
            "{} WHERE {} = ? ORDER BY order_index, id",
            self.select_memberships(),
            self.relation.parent_column()
        );
        let rows = sqlx::query_as::<_, Membership>(&sql)
            .bind(parent_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows)
    }

    pub async fn find_membership(
        &self,
        conn: &mut SqliteConnection,
        parent_id: i64,
        child_id: i64,
    ) -> OrderingResult<Option<Membership>> {
        let sql = format!(
            "{} WHERE {} = ? AND {} = ?",
            self.select_memberships(),
            self.relation.parent_column(),
            self.relation.child_column()
        );
        let row = sqlx::query_as::<_, Membership>(&sql)
            .bind(parent_id)
            .bind(child_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row)
    }

    /// Every parent that has at least one membership
    pub async fn list_parents(&self, conn: &mut SqliteConnection) -> OrderingResult<Vec<i64>> {
        let sql = format!(
            "SELECT DISTINCT {col} FROM {} ORDER BY {col}",
            self.relation.table(),
            col = self.relation.parent_column()
        );
        let parents = sqlx::query_scalar::<_, i64>(&sql).fetch_all(&mut *conn).await?;
        Ok(parents)
    }

    pub async fn membership_by_id(
        &self,
        conn: &mut SqliteConnection,
        membership_id: i64,
    ) -> OrderingResult<Option<Membership>> {
        let sql = format!("{} WHERE id = ?", self.select_memberships());
        let row = sqlx::query_as::<_, Membership>(&sql)
            .bind(membership_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row)
    }

    /// Attach `child_id` to `parent_id` at `position`, shifting every membership
    /// at or after that position up by one. `None` appends.
    pub async fn insert_at_position(
        &self,
        conn: &mut SqliteConnection,
        parent_id: i64,
        child_id: i64,
        position: Option<i64>,
        options: InsertOptions,
    ) -> OrderingResult<InsertOutcome> {
        let relation = self.relation;
        let mut tx = begin_write(conn, relation.parent_table(), parent_id).await?;

        self.ensure_parent(&mut tx, parent_id).await?;
        ensure_row(&mut tx, relation.child_table(), relation.child_label(), child_id).await?;

        if self.find_membership(&mut tx, parent_id, child_id).await?.is_some() {
            return Err(OrderingError::Conflict(format!(
                "{} {} is already part of {} {}",
                relation.child_label(),
                child_id,
                relation.parent_label(),
                parent_id
            )));
        }

        let count = self.count(&mut tx, parent_id).await?;
        let position = position.unwrap_or(ORDER_BASE + count);
        if position < ORDER_BASE || position > ORDER_BASE + count {
            return Err(OrderingError::Validation(format!(
                "Position must be between {} and {}, got {}",
                ORDER_BASE,
                ORDER_BASE + count,
                position
            )));
        }

        let shifts: Vec<(i64, i64)> = self
            .positions_between(&mut tx, parent_id, position, ORDER_BASE + count - 1)
            .await?
            .into_iter()
            .map(|(id, index)| (id, index + 1))
            .collect();
        let shifted = reassign(&mut tx, relation, parent_id, &shifts).await?;

        let sql = format!(
            "INSERT INTO {} ({}, {}, order_index, created_at) VALUES (?, ?, ?, ?)",
            relation.table(),
            relation.parent_column(),
            relation.child_column()
        );
        let membership_id = sqlx::query(&sql)
            .bind(parent_id)
            .bind(child_id)
            .bind(position)
            .bind(chrono::Utc::now())
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

        let mut copied_associations = 0;
        if options.copy_default_associations {
            for kind in relation.associations() {
                copied_associations +=
                    copy_default_associations(&mut tx, membership_id, child_id, *kind).await?;
            }
        }

        tx.commit().await?;

        debug!(
            "Inserted {} {} into {} {} at position {} ({} shifted, {} associations copied)",
            relation.child_label(),
            child_id,
            relation.parent_label(),
            parent_id,
            position,
            shifted,
            copied_associations
        );

        Ok(InsertOutcome {
            membership_id,
            position,
            shifted,
            copied_associations,
        })
    }

    /// Move an existing membership to `new_position`, sliding the memberships in
    /// between by one towards the vacated slot.
    pub async fn move_position(
        &self,
        conn: &mut SqliteConnection,
        parent_id: i64,
        child_id: i64,
        new_position: i64,
    ) -> OrderingResult<MoveOutcome> {
        let relation = self.relation;
        let mut tx = begin_write(conn, relation.parent_table(), parent_id).await?;

        let membership = self.require_membership(&mut tx, parent_id, child_id).await?;
        let count = self.count(&mut tx, parent_id).await?;
        let last = ORDER_BASE + count - 1;
        if new_position < ORDER_BASE || new_position > last {
            return Err(OrderingError::Validation(format!(
                "Position must be between {} and {}, got {}",
                ORDER_BASE, last, new_position
            )));
        }

        let current = membership.order_index;
        if new_position == current {
            return Ok(MoveOutcome {
                membership_id: membership.id,
                from: current,
                to: current,
                moved: false,
            });
        }

        let mut assignments: Vec<(i64, i64)> = if current < new_position {
            self.positions_between(&mut tx, parent_id, current + 1, new_position)
                .await?
                .into_iter()
                .map(|(id, index)| (id, index - 1))
                .collect()
        } else {
            self.positions_between(&mut tx, parent_id, new_position, current - 1)
                .await?
                .into_iter()
                .map(|(id, index)| (id, index + 1))
                .collect()
        };
        assignments.push((membership.id, new_position));

        reassign(&mut tx, relation, parent_id, &assignments).await?;
        tx.commit().await?;

        debug!(
            "Moved {} {} in {} {} from {} to {}",
            relation.child_label(),
            child_id,
            relation.parent_label(),
            parent_id,
            current,
            new_position
        );

        Ok(MoveOutcome {
            membership_id: membership.id,
            from: current,
            to: new_position,
            moved: true,
        })
    }

    /// Detach a child and close the gap it leaves behind
    pub async fn remove_membership(
        &self,
        conn: &mut SqliteConnection,
        parent_id: i64,
        child_id: i64,
    ) -> OrderingResult<RemoveOutcome> {
        let relation = self.relation;
        let mut tx = begin_write(conn, relation.parent_table(), parent_id).await?;

        let membership = self.require_membership(&mut tx, parent_id, child_id).await?;

        let sql = format!("DELETE FROM {} WHERE id = ?", relation.table());
        sqlx::query(&sql).bind(membership.id).execute(&mut *tx).await?;

        let shifts: Vec<(i64, i64)> = self
            .positions_between(&mut tx, parent_id, membership.order_index + 1, i64::MAX)
            .await?
            .into_iter()
            .map(|(id, index)| (id, index - 1))
            .collect();
        let shifted = reassign(&mut tx, relation, parent_id, &shifts).await?;

        tx.commit().await?;

        debug!(
            "Removed {} {} from {} {} at position {} ({} shifted)",
            relation.child_label(),
            child_id,
            relation.parent_label(),
            parent_id,
            membership.order_index,
            shifted
        );

        Ok(RemoveOutcome {
            membership_id: membership.id,
            position: membership.order_index,
            shifted,
        })
    }

    /// Apply a complete new ordering in one transaction.
    ///
    /// The assignments must name every current member exactly once and the
    /// target indices must be exactly `ORDER_BASE..ORDER_BASE + N`. Returns the
    /// number of memberships whose index changed.
    pub async fn bulk_reorder(
        &self,
        conn: &mut SqliteConnection,
        parent_id: i64,
        assignments: &[ReorderAssignment],
    ) -> OrderingResult<u64> {
        let relation = self.relation;
        if assignments.is_empty() {
            return Err(OrderingError::Validation(
                "At least one order assignment is required".to_string(),
            ));
        }

        let mut tx = begin_write(conn, relation.parent_table(), parent_id).await?;
        self.ensure_parent(&mut tx, parent_id).await?;

        let members = self.list_memberships(&mut tx, parent_id).await?;
        let by_child: HashMap<i64, &Membership> =
            members.iter().map(|m| (m.child_id, m)).collect();

        let missing: Vec<i64> = assignments
            .iter()
            .map(|a| a.child_id)
            .filter(|child_id| !by_child.contains_key(child_id))
            .collect();
        if !missing.is_empty() {
            return Err(OrderingError::NotFound(format!(
                "{}s {:?} are not part of {} {}",
                relation.child_label(),
                missing,
                relation.parent_label(),
                parent_id
            )));
        }

        let mut seen = HashSet::new();
        let duplicates: Vec<i64> = assignments
            .iter()
            .map(|a| a.child_id)
            .filter(|child_id| !seen.insert(*child_id))
            .collect();
        if !duplicates.is_empty() {
            return Err(OrderingError::Conflict(format!(
                "{}s {:?} are assigned more than once",
                relation.child_label(),
                duplicates
            )));
        }

        if assignments.len() != members.len() {
            let omitted: Vec<i64> = members
                .iter()
                .map(|m| m.child_id)
                .filter(|child_id| !seen.contains(child_id))
                .collect();
            return Err(OrderingError::Conflict(format!(
                "Reorder must cover all {} members of {} {}; missing {}s {:?}",
                members.len(),
                relation.parent_label(),
                parent_id,
                relation.child_label(),
                omitted
            )));
        }

        let mut indices: Vec<i64> = assignments.iter().map(|a| a.order_index).collect();
        indices.sort_unstable();
        let expected: Vec<i64> = (ORDER_BASE..ORDER_BASE + members.len() as i64).collect();
        if indices != expected {
            return Err(OrderingError::Conflict(format!(
                "Order indices must be exactly {}..={} without duplicates, got {:?}",
                ORDER_BASE,
                ORDER_BASE + members.len() as i64 - 1,
                indices
            )));
        }

        let changes: Vec<(i64, i64)> = assignments
            .iter()
            .filter_map(|a| {
                let membership = by_child[&a.child_id];
                (membership.order_index != a.order_index).then_some((membership.id, a.order_index))
            })
            .collect();

        let updated = reassign(&mut tx, relation, parent_id, &changes).await?;
        tx.commit().await?;

        info!(
            "Reordered {} {}: {} of {} memberships moved",
            relation.parent_label(),
            parent_id,
            updated,
            members.len()
        );

        Ok(updated)
    }

    /// Reassign `ORDER_BASE, ORDER_BASE + 1, ...` following the current relative
    /// order, healing gaps and duplicates. Returns the number of rows changed;
    /// a second run always returns 0.
    pub async fn resequence(&self, conn: &mut SqliteConnection, parent_id: i64) -> OrderingResult<u64> {
        let relation = self.relation;
        let mut tx = begin_write(conn, relation.parent_table(), parent_id).await?;
        self.ensure_parent(&mut tx, parent_id).await?;

        let changes: Vec<(i64, i64)> = self
            .list_memberships(&mut tx, parent_id)
            .await?
            .into_iter()
            .zip(ORDER_BASE..)
            .filter(|(membership, index)| membership.order_index != *index)
            .map(|(membership, index)| (membership.id, index))
            .collect();

        let updated = reassign(&mut tx, relation, parent_id, &changes).await?;
        tx.commit().await?;

        if updated > 0 {
            info!(
                "Resequenced {} {}: {} memberships renumbered",
                relation.parent_label(),
                parent_id,
                updated
            );
        }
        Ok(updated)
    }

    /// Whether the parent's indices are currently exactly `ORDER_BASE..ORDER_BASE + N`
    pub async fn check_density(&self, conn: &mut SqliteConnection, parent_id: i64) -> OrderingResult<bool> {
        let members = self.list_memberships(conn, parent_id).await?;
        Ok(members
            .iter()
            .zip(ORDER_BASE..)
            .all(|(membership, index)| membership.order_index == index))
    }

    /// Overwrite the per-membership override fields; `order_index` is untouched
    pub async fn update_membership_details(
        &self,
        conn: &mut SqliteConnection,
        parent_id: i64,
        child_id: i64,
        details: &MembershipDetails,
    ) -> OrderingResult<Membership> {
        if matches!(details.rating, Some(rating) if rating < 0) {
            return Err(OrderingError::Validation("Rating cannot be negative".to_string()));
        }

        let mut tx = begin_write(conn, self.relation.parent_table(), parent_id).await?;
        let membership = self.require_membership(&mut tx, parent_id, child_id).await?;

        let sql = format!(
            "UPDATE {} SET rating = ?, notes = ? WHERE id = ?",
            self.relation.table()
        );
        sqlx::query(&sql)
            .bind(details.rating)
            .bind(details.notes.as_deref())
            .bind(membership.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(Membership {
            rating: details.rating,
            notes: details.notes.clone(),
            ..membership
        })
    }

    fn select_memberships(&self) -> String {
        format!(
            "SELECT id, {} AS parent_id, {} AS child_id, order_index, rating, notes FROM {}",
            self.relation.parent_column(),
            self.relation.child_column(),
            self.relation.table()
        )
    }

    async fn ensure_parent(&self, conn: &mut SqliteConnection, parent_id: i64) -> OrderingResult<()> {
        ensure_row(conn, self.relation.parent_table(), self.relation.parent_label(), parent_id).await
    }

    async fn require_membership(
        &self,
        conn: &mut SqliteConnection,
        parent_id: i64,
        child_id: i64,
    ) -> OrderingResult<Membership> {
        self.find_membership(conn, parent_id, child_id)
            .await?
            .ok_or_else(|| {
                OrderingError::NotFound(format!(
                    "{} {} is not part of {} {}",
                    self.relation.child_label(),
                    child_id,
                    self.relation.parent_label(),
                    parent_id
                ))
            })
    }

    async fn count(&self, conn: &mut SqliteConnection, parent_id: i64) -> OrderingResult<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?",
            self.relation.table(),
            self.relation.parent_column()
        );
        let count = sqlx::query_scalar::<_, i64>(&sql)
            .bind(parent_id)
            .fetch_one(&mut *conn)
            .await?;
        Ok(count)
    }

    /// `(membership id, order_index)` for every membership with `from <= index <= to`
    async fn positions_between(
        &self,
        conn: &mut SqliteConnection,
        parent_id: i64,
        from: i64,
        to: i64,
    ) -> OrderingResult<Vec<(i64, i64)>> {
        if from > to {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT id, order_index FROM {} WHERE {} = ? AND order_index BETWEEN ? AND ? ORDER BY order_index",
            self.relation.table(),
            self.relation.parent_column()
        );
        let rows = sqlx::query_as::<_, (i64, i64)>(&sql)
            .bind(parent_id)
            .bind(from)
            .bind(to)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows)
    }
}

/// Open a transaction (a savepoint when nested) that already holds SQLite's
/// write lock, taken with a no-op update of `table` row `id` before anything is
/// read. Concurrent writers wait out `busy_timeout` here instead of failing the
/// upgrade from a read snapshot with SQLITE_BUSY.
pub(crate) async fn begin_write<'c>(
    conn: &'c mut SqliteConnection,
    table: &str,
    id: i64,
) -> Result<Transaction<'c, Sqlite>, sqlx::Error> {
    let mut tx = conn.begin().await?;
    sqlx::query(&format!("UPDATE {} SET id = id WHERE id = ?", table))
        .bind(id)
        .execute(&mut *tx)
        .await?;
    Ok(tx)
}

/// NotFound unless `table` has a row with `id`
pub(crate) async fn ensure_row(
    conn: &mut SqliteConnection,
    table: &str,
    label: &str,
    id: i64,
) -> OrderingResult<()> {
    let sql = format!("SELECT COUNT(*) FROM {} WHERE id = ?", table);
    let found = sqlx::query_scalar::<_, i64>(&sql)
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;
    if found == 0 {
        return Err(OrderingError::NotFound(format!("{} {} not found", label, id)));
    }
    Ok(())
}

pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Move memberships of one parent to new indices without ever holding a
/// duplicate `(parent, order_index)`.
///
/// Phase one parks every affected row at `-order_index - park`, which is below
/// the parent's current minimum and pairwise distinct. Phase two places them
/// with one `CASE` statement. The caller guarantees the final state is unique.
pub(crate) async fn reassign(
    conn: &mut SqliteConnection,
    relation: Relation,
    parent_id: i64,
    assignments: &[(i64, i64)],
) -> Result<u64, sqlx::Error> {
    if assignments.is_empty() {
        return Ok(0);
    }

    let (min, max): (Option<i64>, Option<i64>) = sqlx::query_as(&format!(
        "SELECT MIN(order_index), MAX(order_index) FROM {} WHERE {} = ?",
        relation.table(),
        relation.parent_column()
    ))
    .bind(parent_id)
    .fetch_one(&mut *conn)
    .await?;
    let span = min.unwrap_or(0).saturating_abs().max(max.unwrap_or(0).saturating_abs());
    let park = span.saturating_mul(2).saturating_add(1);

    let id_list = placeholders(assignments.len());

    let park_sql = format!(
        "UPDATE {} SET order_index = -order_index - ? WHERE {} = ? AND id IN ({})",
        relation.table(),
        relation.parent_column(),
        id_list
    );
    let mut park_query = sqlx::query(&park_sql).bind(park).bind(parent_id);
    for (id, _) in assignments {
        park_query = park_query.bind(*id);
    }
    park_query.execute(&mut *conn).await?;

    let place_sql = format!(
        "UPDATE {} SET order_index = CASE id {} END WHERE {} = ? AND id IN ({})",
        relation.table(),
        "WHEN ? THEN ? ".repeat(assignments.len()),
        relation.parent_column(),
        id_list
    );
    let mut place_query = sqlx::query(&place_sql);
    for (id, index) in assignments {
        place_query = place_query.bind(*id).bind(*index);
    }
    place_query = place_query.bind(parent_id);
    for (id, _) in assignments {
        place_query = place_query.bind(*id);
    }
    let result = place_query.execute(&mut *conn).await?;

    Ok(result.rows_affected())
}
