use crate::db;
use crate::error::{ConvertError, Result};
use crate::geometry::to_wkb;
use crate::progress::Progress;
use crate::shape::{VectorReader, SHAPEFILE_DRIVER};
use rusqlite::Connection;
use std::path::Path;
use tracing::{info, warn};

/// Supplies a WKT coordinate system when the source carries none.
pub type CrsFallback = Box<dyn Fn() -> Option<String> + Send + Sync>;

/// Copies the stand polygons into a new layer of the destination store and
/// returns the open store.
pub fn ingest(
    reader: &dyn VectorReader,
    source: &Path,
    destination: &Path,
    layer_name: &str,
    crs_fallback: Option<&CrsFallback>,
    progress: &mut Progress,
) -> Result<Connection> {
    let layer = reader.open(source).map_err(|e| {
        ConvertError::Format(format!("can't open datasource for shape: {e:#}"))
    })?;
    if layer.driver != SHAPEFILE_DRIVER {
        return Err(ConvertError::Format(format!(
            "input file has not shape format (driver {})",
            layer.driver
        )));
    }
    let Some(geometry_type) = layer.geometry_type else {
        return Err(ConvertError::Format(
            "input shape has not polygon geometry".into(),
        ));
    };

    let conn = db::open_store(destination)?;

    let crs = layer
        .crs_wkt
        .clone()
        .or_else(|| crs_fallback.and_then(|f| f()));
    if crs.is_none() {
        warn!(source = %source.to_string_lossy(), "no coordinate system, layer left undefined");
    }
    let srid = db::register_srs(&conn, crs.as_deref())?;

    let total = layer.feature_count();
    db::in_batch(&conn, |tx| {
        db::create_layer(tx, layer_name, geometry_type, srid, &layer.fields)?;
        for (i, feature) in layer.features.iter().enumerate() {
            progress.checkpoint()?;
            let wkb = feature.geometry.as_ref().map(to_wkb);
            db::insert_feature(tx, layer_name, &layer.fields, wkb, &feature.attributes)?;
            progress.message(&format!("Copied {} from {} features", i + 1, total));
        }
        Ok(())
    })?;

    info!(layer = layer_name, features = total, srid, "shape copied");
    Ok(conn)
}
