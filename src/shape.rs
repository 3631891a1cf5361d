use crate::db::LayerField;
use crate::geometry::GeometryType;
use crate::legacy::{DbfTableReader, TableReader};
use crate::schema::sql_type_for_code;
use anyhow::Context;
use geo::{Geometry, MultiPolygon};
use rusqlite::types::Value;
use std::path::{Path, PathBuf};

pub const SHAPEFILE_DRIVER: &str = "ESRI Shapefile";

#[derive(Debug, Clone)]
pub struct SourceFeature {
    pub geometry: Option<MultiPolygon<f64>>,
    /// One value per layer field, in field order.
    pub attributes: Vec<Value>,
}

/// First layer of an opened vector dataset.
#[derive(Debug, Clone)]
pub struct SourceLayer {
    pub driver: String,
    pub crs_wkt: Option<String>,
    pub geometry_type: Option<GeometryType>,
    pub fields: Vec<LayerField>,
    pub features: Vec<SourceFeature>,
}

impl SourceLayer {
    pub fn feature_count(&self) -> usize {
        self.features.len()
    }
}

/// Opens polygon datasets.
pub trait VectorReader: Send + Sync {
    fn open(&self, path: &Path) -> anyhow::Result<SourceLayer>;
}

/// `.shp` + `.dbf` (+ optional `.prj`) through the `shapefile` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShapefileReader;

impl VectorReader for ShapefileReader {
    fn open(&self, path: &Path) -> anyhow::Result<SourceLayer> {
        let is_shp = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.eq_ignore_ascii_case("shp"))
            .unwrap_or(false);
        if !is_shp {
            // Report what we were given; the ingester rejects the driver.
            return Ok(SourceLayer {
                driver: "unknown".into(),
                crs_wkt: None,
                geometry_type: None,
                fields: Vec::new(),
                features: Vec::new(),
            });
        }

        let reader = shapefile::ShapeReader::from_path(path)
            .with_context(|| format!("can't open shape {}", path.to_string_lossy()))?;
        let geometry_type = match reader.header().shape_type {
            shapefile::ShapeType::Polygon
            | shapefile::ShapeType::PolygonM
            | shapefile::ShapeType::PolygonZ => Some(GeometryType::Polygon),
            _ => None,
        };
        let shapes = reader
            .read()
            .with_context(|| format!("can't read shapes from {}", path.to_string_lossy()))?;

        let dbf_path = sibling(path, "dbf")
            .with_context(|| format!("no attribute table next to {}", path.to_string_lossy()))?;
        let table = DbfTableReader.read_table(&dbf_path)?;
        let fields: Vec<LayerField> = table
            .fields
            .iter()
            .map(|f| LayerField::new(f.name.clone(), sql_type_for_code(&f.type_code.to_string())))
            .collect();

        let crs_wkt = match sibling(path, "prj") {
            Some(prj) => Some(std::fs::read_to_string(&prj)?.trim().to_string())
                .filter(|s| !s.is_empty()),
            None => None,
        };

        let mut features = Vec::with_capacity(shapes.len());
        for (i, shape) in shapes.into_iter().enumerate() {
            let attributes = table
                .records
                .get(i)
                .map(|r| r.values.iter().map(|(_, v)| v.clone()).collect())
                .unwrap_or_else(|| vec![Value::Null; fields.len()]);
            features.push(SourceFeature {
                geometry: shape_to_multipolygon(shape)?,
                attributes,
            });
        }

        Ok(SourceLayer {
            driver: SHAPEFILE_DRIVER.into(),
            crs_wkt,
            geometry_type,
            fields,
            features,
        })
    }
}

fn shape_to_multipolygon(shape: shapefile::Shape) -> anyhow::Result<Option<MultiPolygon<f64>>> {
    if matches!(shape, shapefile::Shape::NullShape) {
        return Ok(None);
    }
    let geom = Geometry::<f64>::try_from(shape)
        .map_err(|e| anyhow::anyhow!("unsupported shape: {e:?}"))?;
    match geom {
        Geometry::Polygon(p) => Ok(Some(MultiPolygon(vec![p]))),
        Geometry::MultiPolygon(mp) => Ok(Some(mp)),
        other => anyhow::bail!("expected a polygon shape, got {other:?}"),
    }
}

/// Same stem, other extension, any case.
fn sibling(path: &Path, ext: &str) -> Option<PathBuf> {
    let dir = path.parent()?;
    let stem = path.file_stem()?.to_str()?;
    let entries = std::fs::read_dir(if dir.as_os_str().is_empty() { Path::new(".") } else { dir }).ok()?;
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_stem().and_then(|s| s.to_str()) == Some(stem)
                && p.extension()
                    .and_then(|s| s.to_str())
                    .map(|s| s.eq_ignore_ascii_case(ext))
                    .unwrap_or(false)
        })
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

/// In-memory dataset for callers that already hold decoded features.
#[derive(Debug, Clone)]
pub struct MemoryVectorReader {
    pub layer: SourceLayer,
}

impl VectorReader for MemoryVectorReader {
    fn open(&self, _path: &Path) -> anyhow::Result<SourceLayer> {
        Ok(self.layer.clone())
    }
}
