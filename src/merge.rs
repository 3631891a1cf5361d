use crate::db::{self, quote_ident};
use crate::error::Result;
use crate::legacy::{value_key, LegacyTable};
use crate::pipeline::StageContext;
use crate::schema::ensure_columns;
use rusqlite::types::Value;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeSummary {
    pub columns_added: usize,
    pub updated: usize,
    pub unmatched: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Widens the primary layer with the tier-1 fields and copies each tier-1
/// record onto the stand it names by (block, stand) number.
pub fn process_tier1(ctx: &mut StageContext<'_>, table: &LegacyTable) -> Result<MergeSummary> {
    let conn = ctx.conn;
    let settings = ctx.settings;
    let catalog = ctx.catalog;
    let layer = settings.videl_layer.as_str();
    let block_field = settings.block_field.as_str();
    let stand_field = settings.stand_field.as_str();

    let added = db::in_batch(conn, |tx| ensure_columns(tx, layer, &table.fields, catalog))?;
    for col in &added {
        ctx.aliases.add(layer, Some(&col.name), &col.alias);
    }
    let mut summary = MergeSummary {
        columns_added: added.len(),
        ..MergeSummary::default()
    };
    if added.is_empty() {
        info!(layer, "no tier-1 columns to merge");
        return Ok(summary);
    }

    let assignments = added
        .iter()
        .map(|c| format!("{} = ?", quote_ident(&c.name)))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ? AND {} = ?",
        quote_ident(layer),
        assignments,
        quote_ident(block_field),
        quote_ident(stand_field)
    );

    let total = table.len();
    let stage = ctx.progress.stage().label();
    db::in_batch(conn, |tx| {
        for (i, rec) in table.records.iter().enumerate() {
            ctx.progress.checkpoint()?;
            let (Some(block), Some(stand)) = (rec.get(block_field), rec.get(stand_field)) else {
                summary.skipped += 1;
                continue;
            };
            if matches!(block, Value::Null) || matches!(stand, Value::Null) {
                summary.skipped += 1;
                continue;
            }

            let mut params = Vec::with_capacity(added.len() + 2);
            for col in &added {
                let raw = rec.get(&col.name).unwrap_or(&Value::Null);
                params.push(ctx.resolver.resolve(&col.name, raw)?);
            }
            params.push(block.clone());
            params.push(stand.clone());

            let (block, stand) = (value_key(block), value_key(stand));
            match tx.execute(&sql, rusqlite::params_from_iter(params.iter())) {
                Ok(0) => {
                    summary.unmatched += 1;
                    ctx.errors.push(
                        stage,
                        format!(
                            "No videl with {block_field} = {block} and {stand_field} = {stand}"
                        ),
                        Some(json!({ block_field: block, stand_field: stand })),
                    );
                }
                Ok(_) => summary.updated += 1,
                Err(e) => {
                    summary.failed += 1;
                    ctx.errors.push(
                        stage,
                        format!(
                            "Update {layer} where {block_field} = {block} and {stand_field} = {stand} error: {e}"
                        ),
                        Some(json!({ block_field: block, stand_field: stand })),
                    );
                }
            }
            debug!(block = %block, stand = %stand, "tier-1 record merged");
            ctx.progress
                .message(&format!("Process {} from {} videls", i + 1, total));
        }
        Ok(())
    })?;

    info!(
        layer,
        updated = summary.updated,
        unmatched = summary.unmatched,
        failed = summary.failed,
        "tier-1 merged"
    );
    Ok(summary)
}
