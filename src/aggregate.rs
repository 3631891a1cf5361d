use crate::db::{self, quote_ident, LayerField, FID_COLUMN, GEOMETRY_COLUMN};
use crate::error::{ConvertError, Result};
use crate::geometry::{from_wkb, to_wkb, try_union, GeometryType};
use crate::legacy::value_key;
use crate::progress::Progress;
use geo::MultiPolygon;
use rusqlite::types::Value;
use rusqlite::Connection;
use tracing::{debug, info, warn};

/// Column names driving the block aggregation.
#[derive(Debug, Clone, Copy)]
pub struct BlockFields<'a> {
    pub block: &'a str,
    pub stand_area: &'a str,
    pub block_area: &'a str,
}

/// Builds one polygon per distinct block number of `source_layer`: the union
/// of its stands, carrying the summed stand area. Returns the number of
/// blocks written.
pub fn aggregate_by_block(
    conn: &Connection,
    source_layer: &str,
    dest_layer: &str,
    fields: BlockFields<'_>,
    progress: &mut Progress,
) -> Result<usize> {
    let columns = db::table_columns(conn, source_layer)?;
    let Some(block_def) = columns
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(fields.block))
        .cloned()
    else {
        return Err(ConvertError::Schema(format!(
            "can't create field '{}': missing in {source_layer}",
            fields.block
        )));
    };
    if !columns
        .iter()
        .any(|c| c.name.eq_ignore_ascii_case(fields.stand_area))
    {
        return Err(ConvertError::Schema(format!(
            "field '{}' missing in {source_layer}",
            fields.stand_area
        )));
    }

    let blocks: Vec<Value> = {
        let sql = format!(
            "SELECT DISTINCT {} FROM {}",
            quote_ident(&block_def.name),
            quote_ident(source_layer)
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |r| r.get::<_, Value>(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()?
    };

    let srid = db::layer_srid(conn, source_layer)?;
    let dest_fields = vec![
        LayerField::new(fields.block_area, "REAL"),
        LayerField::new(block_def.name.clone(), block_def.sql_type.clone()),
    ];
    let member_sql = format!(
        "SELECT {}, {} FROM {} WHERE {} IS ? ORDER BY {}",
        quote_ident(GEOMETRY_COLUMN),
        quote_ident(fields.stand_area),
        quote_ident(source_layer),
        quote_ident(&block_def.name),
        quote_ident(FID_COLUMN)
    );

    let total = blocks.len();
    db::in_batch(conn, |tx| {
        db::create_layer(tx, dest_layer, GeometryType::Polygon, srid, &dest_fields)?;

        for (i, block) in blocks.iter().enumerate() {
            progress.message(&format!(
                "Process blocks {} from {} ({})",
                i,
                total,
                value_key(block)
            ));

            let members: Vec<(Option<Vec<u8>>, Option<f64>)> = {
                let mut stmt = tx.prepare_cached(&member_sql)?;
                let rows = stmt.query_map([block], |r| Ok((r.get(0)?, r.get(1)?)))?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            };

            let mut shape = MultiPolygon::<f64>(Vec::new());
            let mut area = 0.0;
            for (wkb, stand_area) in &members {
                progress.checkpoint()?;
                if let Some(bytes) = wkb {
                    match from_wkb(bytes) {
                        Ok(g) => match try_union(&shape, &g) {
                            Some(u) => shape = u,
                            None => debug!(block = %value_key(block), "union skipped"),
                        },
                        Err(e) => warn!(block = %value_key(block), error = %e, "unreadable stand geometry"),
                    }
                }
                area += stand_area.unwrap_or(0.0);
            }

            db::insert_feature(
                tx,
                dest_layer,
                &dest_fields,
                Some(to_wkb(&shape)),
                &[Value::Real(area), block.clone()],
            )?;
        }
        Ok(())
    })?;

    info!(layer = dest_layer, blocks = total, "block layer built");
    Ok(total)
}
