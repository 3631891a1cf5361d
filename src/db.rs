use crate::error::{ConvertError, Result};
use crate::geometry::GeometryType;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use std::io::Read;
use std::path::Path;

pub const SQLITE_DRIVER: &str = "SQLite";
const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

pub const FID_COLUMN: &str = "ogc_fid";
pub const GEOMETRY_COLUMN: &str = "GEOMETRY";

/// Attribute column of a spatial layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerField {
    pub name: String,
    pub sql_type: String,
}

impl LayerField {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
        }
    }
}

/// Opens the destination database, creating it when missing. An existing file
/// that is not SQLite is rejected.
pub fn open_store(path: &Path) -> Result<Connection> {
    if path.is_file() && !is_sqlite_file(path)? {
        return Err(ConvertError::Format(format!(
            "output file has not {SQLITE_DRIVER} format: {}",
            path.to_string_lossy()
        )));
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    ensure_spatial_metadata(&conn)?;
    Ok(conn)
}

fn is_sqlite_file(path: &Path) -> Result<bool> {
    let mut f = std::fs::File::open(path)?;
    let mut header = [0u8; 16];
    let mut read = 0;
    while read < header.len() {
        let n = f.read(&mut header[read..])?;
        if n == 0 {
            break;
        }
        read += n;
    }
    // A zero-length file is a database SQLite has not written yet.
    Ok(read == 0 || (read == header.len() && &header == SQLITE_MAGIC))
}

fn ensure_spatial_metadata(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS geometry_columns(
            f_table_name VARCHAR NOT NULL,
            f_geometry_column VARCHAR NOT NULL,
            geometry_type INTEGER,
            coord_dimension INTEGER,
            srid INTEGER,
            geometry_format VARCHAR
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS spatial_ref_sys(
            srid INTEGER UNIQUE,
            auth_name TEXT,
            auth_srid TEXT,
            srtext TEXT
        )",
        [],
    )?;
    Ok(())
}

/// Returns the srid for a WKT definition, registering it on first use.
/// No definition maps to -1.
pub fn register_srs(conn: &Connection, wkt: Option<&str>) -> Result<i64> {
    let Some(wkt) = wkt.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(-1);
    };
    let existing: Option<i64> = conn
        .query_row(
            "SELECT srid FROM spatial_ref_sys WHERE srtext = ?",
            [wkt],
            |r| r.get(0),
        )
        .optional()?;
    if let Some(srid) = existing {
        return Ok(srid);
    }
    let next: i64 = conn.query_row(
        "SELECT COALESCE(MAX(srid), 100000) + 1 FROM spatial_ref_sys",
        [],
        |r| r.get(0),
    )?;
    conn.execute(
        "INSERT INTO spatial_ref_sys(srid, auth_name, auth_srid, srtext) VALUES(?, NULL, NULL, ?)",
        (next, wkt),
    )?;
    Ok(next)
}

pub fn layer_srid(conn: &Connection, layer: &str) -> Result<i64> {
    let srid: Option<i64> = conn
        .query_row(
            "SELECT srid FROM geometry_columns WHERE f_table_name = ?",
            [layer],
            |r| r.get(0),
        )
        .optional()?;
    Ok(srid.unwrap_or(-1))
}

/// Creates (or replaces) a spatial layer table and registers its geometry column.
pub fn create_layer(
    conn: &Connection,
    name: &str,
    geometry_type: GeometryType,
    srid: i64,
    fields: &[LayerField],
) -> Result<()> {
    let mut columns = vec![
        format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", quote_ident(FID_COLUMN)),
        format!("{} BLOB", quote_ident(GEOMETRY_COLUMN)),
    ];
    for f in fields {
        columns.push(format!("{} {}", quote_ident(&f.name), f.sql_type));
    }
    let sql = format!(
        "CREATE TABLE {} ({})",
        quote_ident(name),
        columns.join(", ")
    );

    conn.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(name)), [])?;
    conn.execute("DELETE FROM geometry_columns WHERE f_table_name = ?", [name])?;
    conn.execute(&sql, [])
        .map_err(|e| ConvertError::Schema(format!("can't create layer {name}: {e}")))?;
    conn.execute(
        "INSERT INTO geometry_columns(f_table_name, f_geometry_column, geometry_type, coord_dimension, srid, geometry_format)
         VALUES(?, ?, ?, 2, ?, 'WKB')",
        (name, GEOMETRY_COLUMN.to_lowercase(), geometry_type.ogc_code(), srid),
    )?;
    Ok(())
}

/// Inserts one feature and returns its feature id.
pub fn insert_feature(
    conn: &Connection,
    layer: &str,
    fields: &[LayerField],
    geometry: Option<Vec<u8>>,
    values: &[Value],
) -> Result<i64> {
    let mut names = vec![quote_ident(GEOMETRY_COLUMN)];
    names.extend(fields.iter().map(|f| quote_ident(&f.name)));
    let placeholders = vec!["?"; names.len()].join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(layer),
        names.join(", "),
        placeholders
    );

    let mut params: Vec<Value> = Vec::with_capacity(values.len() + 1);
    params.push(geometry.map(Value::Blob).unwrap_or(Value::Null));
    params.extend(values.iter().cloned());
    let mut stmt = conn.prepare_cached(&sql)?;
    stmt.execute(params_from_iter(params.iter()))?;
    Ok(conn.last_insert_rowid())
}

/// Declared column names and types, in table order.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<LayerField>> {
    let sql = format!("PRAGMA table_info({})", quote_ident(table));
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        let sql_type: String = row.get(2)?;
        out.push(LayerField { name, sql_type });
    }
    Ok(out)
}

pub fn table_has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    Ok(table_columns(conn, table)?
        .iter()
        .any(|c| c.name.eq_ignore_ascii_case(column)))
}

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        [table],
        |r| r.get(0),
    )?;
    Ok(n > 0)
}

pub fn count_rows(conn: &Connection, table: &str) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
    Ok(conn.query_row(&sql, [], |r| r.get(0))?)
}

/// Runs `f` inside one transaction and commits whatever it wrote, including
/// when it fails or is interrupted part way.
pub fn in_batch<T>(conn: &Connection, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
    let tx = conn.unchecked_transaction()?;
    let out = f(&tx);
    tx.commit()?;
    out
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
