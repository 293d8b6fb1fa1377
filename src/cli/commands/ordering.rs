use clap::Args;
use serde_json::json;

use crate::cli::utils::{output_success, output_table};
use crate::cli::OutputFormat;
use crate::database::DatabaseManager;
use crate::ordering::{OrderingEngine, Relation};

#[derive(Debug, Args)]
pub struct CheckArgs {
    #[arg(long, help = "Only check one relation (protocol-tasks, section-subsections, protocol-sections)")]
    pub relation: Option<Relation>,
}

#[derive(Debug, Args)]
pub struct ResequenceArgs {
    #[arg(long, help = "Relation to repair (protocol-tasks, section-subsections, protocol-sections)")]
    pub relation: Option<Relation>,

    #[arg(long, requires = "relation", conflicts_with = "all", help = "Parent id to repair")]
    pub parent: Option<i64>,

    #[arg(long, help = "Repair every parent (of --relation, or of all relations)")]
    pub all: bool,
}

fn relations(only: Option<Relation>) -> Vec<Relation> {
    match only {
        Some(relation) => vec![relation],
        None => Relation::ALL.to_vec(),
    }
}

/// Lists every parent whose indices are not exactly 1..N. Fails when any are found.
pub async fn check(db: &DatabaseManager, args: CheckArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let mut conn = db.pool().acquire().await?;
    let mut broken = Vec::new();
    let mut checked = 0usize;

    for relation in relations(args.relation) {
        let engine = OrderingEngine::new(relation);
        for parent_id in engine.list_parents(&mut conn).await? {
            checked += 1;
            if !engine.check_density(&mut conn, parent_id).await? {
                let indices: Vec<i64> = engine
                    .list_memberships(&mut conn, parent_id)
                    .await?
                    .iter()
                    .map(|m| m.order_index)
                    .collect();
                broken.push((relation, parent_id, indices));
            }
        }
    }

    if broken.is_empty() {
        return output_success(
            output_format,
            &format!("All {} orderings are dense", checked),
            Some(json!({ "checked": checked, "broken": [] })),
        );
    }

    let rows: Vec<Vec<String>> = broken
        .iter()
        .map(|(relation, parent, indices)| vec![relation.to_string(), parent.to_string(), format!("{:?}", indices)])
        .collect();
    let data = json!(broken
        .iter()
        .map(|(relation, parent, indices)| json!({
            "relation": relation.slug(),
            "parent_id": parent,
            "order_indices": indices,
        }))
        .collect::<Vec<_>>());
    output_table(output_format, "broken", &["RELATION", "PARENT", "INDICES"], &rows, data)?;

    anyhow::bail!(
        "{} of {} orderings are not dense; run `protocol-admin resequence --all`",
        broken.len(),
        checked
    )
}

pub async fn resequence(
    db: &DatabaseManager,
    args: ResequenceArgs,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    let mut conn = db.pool().acquire().await?;

    let targets: Vec<(Relation, i64)> = match (args.relation, args.parent, args.all) {
        (Some(relation), Some(parent), false) => vec![(relation, parent)],
        (only, None, true) => {
            let mut targets = Vec::new();
            for relation in relations(only) {
                for parent in OrderingEngine::new(relation).list_parents(&mut conn).await? {
                    targets.push((relation, parent));
                }
            }
            targets
        }
        _ => anyhow::bail!("Pass --relation with --parent, or --all"),
    };

    let mut updated = 0u64;
    let mut touched = 0usize;
    for (relation, parent) in &targets {
        let changed = OrderingEngine::new(*relation).resequence(&mut conn, *parent).await?;
        if changed > 0 {
            touched += 1;
            updated += changed;
        }
    }

    output_success(
        output_format,
        &format!(
            "Resequenced {} of {} parents ({} memberships renumbered)",
            touched,
            targets.len(),
            updated
        ),
        Some(json!({ "parents": targets.len(), "resequenced": touched, "updated": updated })),
    )
}
