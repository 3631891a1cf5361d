#![allow(dead_code)]

use geo::{polygon, MultiPolygon};
use lesis2sqlite::db::LayerField;
use lesis2sqlite::geometry::GeometryType;
use lesis2sqlite::legacy::{table_from_rows, MemoryTableReader};
use lesis2sqlite::shape::{MemoryVectorReader, SourceFeature, SourceLayer, SHAPEFILE_DRIVER};
use rusqlite::types::Value;
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

/// Creates an empty file (and its parents) so directory scans can see it.
pub fn touch(path: &Path) -> PathBuf {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dir");
    }
    std::fs::write(path, b"").expect("touch file");
    path.to_path_buf()
}

pub fn int(v: i64) -> Value {
    Value::Integer(v)
}

pub fn real(v: f64) -> Value {
    Value::Real(v)
}

pub fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

pub fn square(x: f64, y: f64) -> MultiPolygon<f64> {
    MultiPolygon(vec![polygon![
        (x: x, y: y),
        (x: x + 1.0, y: y),
        (x: x + 1.0, y: y + 1.0),
        (x: x, y: y + 1.0),
        (x: x, y: y),
    ]])
}

/// Stand layer with (nomkvr, nomvyd, nnn, plsvyd) attributes.
pub fn stand_layer(stands: &[(i64, i64, i64, f64)]) -> SourceLayer {
    let fields = vec![
        LayerField::new("nomkvr", "REAL"),
        LayerField::new("nomvyd", "REAL"),
        LayerField::new("nnn", "REAL"),
        LayerField::new("plsvyd", "REAL"),
    ];
    let features = stands
        .iter()
        .enumerate()
        .map(|(i, (block, stand, key, area))| SourceFeature {
            geometry: Some(square(i as f64, 0.0)),
            attributes: vec![int(*block), int(*stand), int(*key), real(*area)],
        })
        .collect();
    SourceLayer {
        driver: SHAPEFILE_DRIVER.to_string(),
        crs_wkt: None,
        geometry_type: Some(GeometryType::Polygon),
        fields,
        features,
    }
}

/// A Lesis export on disk (empty placeholder files) whose table contents are
/// served from memory.
pub struct Fixture {
    pub root: PathBuf,
    pub base: PathBuf,
    pub shape: PathBuf,
    pub sqlite: PathBuf,
    pub tables: MemoryTableReader,
}

impl Fixture {
    pub fn new(prefix: &str) -> Self {
        let root = temp_dir(prefix);
        let base = root.join("lesis");
        std::fs::create_dir_all(&base).expect("create base dir");
        let shape = touch(&root.join("videl.shp"));
        Self {
            sqlite: root.join("out.sqlite"),
            root,
            base,
            shape,
            tables: MemoryTableReader::new(),
        }
    }

    /// Registers a table under `rel` (relative to the export base).
    pub fn table(&mut self, rel: &str, columns: &[(&str, char)], rows: Vec<Vec<Value>>) -> PathBuf {
        let path = touch(&self.base.join(rel));
        self.tables.insert(table_from_rows(path.clone(), columns, rows));
        path
    }

    pub fn fields(&mut self, rows: &[(&str, &str, &str, Option<&str>)]) -> PathBuf {
        let rows = rows
            .iter()
            .map(|(field, tip, name, sprav)| {
                vec![
                    text(field),
                    text(tip),
                    text(name),
                    sprav.map(text).unwrap_or(Value::Null),
                ]
            })
            .collect();
        self.table(
            "N/Fields.DBF",
            &[("field", 'C'), ("tip", 'C'), ("name", 'C'), ("sprav", 'C')],
            rows,
        )
    }

    pub fn vectors(&self, stands: &[(i64, i64, i64, f64)]) -> MemoryVectorReader {
        MemoryVectorReader {
            layer: stand_layer(stands),
        }
    }
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_lesis2sqlite");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn lesis2sqlite");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

/// Sends one request and returns its response, skipping event lines.
pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).expect("read response line");
        assert!(n > 0, "sidecar closed stdout while waiting for {}", method);
        if line.trim().is_empty() {
            continue;
        }
        let value: serde_json::Value =
            serde_json::from_str(line.trim()).expect("parse response json");
        if value.get("event").is_some() {
            continue;
        }
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
        return value;
    }
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or(serde_json::Value::Null)
}
