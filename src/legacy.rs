use anyhow::Context;
use dbase::{FieldType, FieldValue};
use rusqlite::types::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Column of a legacy table. Names are lower-cased on read.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyField {
    pub name: String,
    pub type_code: char,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyRecord {
    pub values: Vec<(String, Value)>,
}

impl LegacyRecord {
    pub fn new(values: Vec<(String, Value)>) -> Self {
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Textual form of a non-null value.
    pub fn text(&self, name: &str) -> Option<String> {
        match self.get(name) {
            None | Some(Value::Null) => None,
            Some(v) => Some(value_key(v)),
        }
    }

    pub fn is_null(&self, name: &str) -> bool {
        matches!(self.get(name), None | Some(Value::Null))
    }
}

#[derive(Debug, Clone, Default)]
pub struct LegacyTable {
    pub path: PathBuf,
    pub fields: Vec<LegacyField>,
    pub records: Vec<LegacyRecord>,
}

impl LegacyTable {
    pub fn field(&self, name: &str) -> Option<&LegacyField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Yields the full contents of a fixed-format legacy table.
pub trait TableReader: Send + Sync {
    fn read_table(&self, path: &Path) -> anyhow::Result<LegacyTable>;
}

impl<T: TableReader + ?Sized> TableReader for std::sync::Arc<T> {
    fn read_table(&self, path: &Path) -> anyhow::Result<LegacyTable> {
        (**self).read_table(path)
    }
}

/// Code page of every Lesis table, shapefile attributes included.
pub const LESIS_CODE_PAGE: yore::code_pages::CP866 = yore::code_pages::CP866;

/// Reads `.DBF` files with the `dbase` crate, decoding text as CP866.
#[derive(Debug, Default, Clone, Copy)]
pub struct DbfTableReader;

impl TableReader for DbfTableReader {
    fn read_table(&self, path: &Path) -> anyhow::Result<LegacyTable> {
        let mut reader = dbase::Reader::from_path_with_encoding(path, LESIS_CODE_PAGE)
            .with_context(|| format!("failed to open {}", path.to_string_lossy()))?;
        let fields: Vec<LegacyField> = reader
            .fields()
            .iter()
            .map(|f| LegacyField {
                name: f.name().to_lowercase(),
                type_code: dbf_type_code(f.field_type()),
            })
            .collect();
        let raw_names: Vec<String> = reader.fields().iter().map(|f| f.name().to_string()).collect();

        let mut records = Vec::new();
        for rec in reader.iter_records() {
            let rec = rec.with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
            let values = raw_names
                .iter()
                .zip(fields.iter())
                .map(|(raw, field)| {
                    let v = rec.get(raw).cloned().map(dbf_value).unwrap_or(Value::Null);
                    (field.name.clone(), v)
                })
                .collect();
            records.push(LegacyRecord { values });
        }

        Ok(LegacyTable {
            path: path.to_path_buf(),
            fields,
            records,
        })
    }
}

pub fn dbf_type_code(t: FieldType) -> char {
    match t {
        FieldType::Character => 'C',
        FieldType::Currency => 'N',
        FieldType::Numeric => 'N',
        FieldType::Float => 'F',
        FieldType::Date => 'D',
        FieldType::DateTime => 'T',
        FieldType::Logical => 'L',
        FieldType::Memo => 'M',
        FieldType::Integer => 'I',
        FieldType::Double => 'F',
    }
}

fn dbf_value(v: FieldValue) -> Value {
    match v {
        FieldValue::Character(Some(s)) => {
            let t = s.trim();
            if t.is_empty() {
                Value::Null
            } else {
                Value::Text(t.to_string())
            }
        }
        FieldValue::Numeric(Some(n)) => number_value(n),
        FieldValue::Float(Some(n)) => Value::Real(n as f64),
        FieldValue::Logical(Some(b)) => Value::Integer(b as i64),
        FieldValue::Date(Some(d)) => {
            match chrono::NaiveDate::from_ymd_opt(d.year() as i32, d.month() as u32, d.day() as u32) {
                Some(date) => Value::Text(date.format("%Y-%m-%d").to_string()),
                None => Value::Null,
            }
        }
        FieldValue::Integer(i) => Value::Integer(i as i64),
        FieldValue::Double(n) => Value::Real(n),
        FieldValue::Currency(n) => Value::Real(n),
        FieldValue::Memo(s) => Value::Text(s),
        FieldValue::DateTime(dt) => Value::Text(format!("{dt:?}")),
        _ => Value::Null,
    }
}

/// Numeric DBF columns carry whole numbers for every code and key field.
fn number_value(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        Value::Integer(n as i64)
    } else {
        Value::Real(n)
    }
}

/// Canonical string form used for key comparison and reference lookups.
pub fn value_key(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => {
            if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
                (*f as i64).to_string()
            } else {
                f.to_string()
            }
        }
        Value::Text(s) => s.trim().to_string(),
        Value::Blob(b) => String::from_utf8_lossy(b).trim().to_string(),
    }
}

/// Serves tables from memory and counts reads per path.
#[derive(Debug, Default)]
pub struct MemoryTableReader {
    tables: HashMap<PathBuf, LegacyTable>,
    reads: Mutex<HashMap<PathBuf, usize>>,
}

impl MemoryTableReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: LegacyTable) {
        self.tables.insert(table.path.clone(), table);
    }

    pub fn reads(&self, path: &Path) -> usize {
        self.reads
            .lock()
            .map(|m| m.get(path).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl TableReader for MemoryTableReader {
    fn read_table(&self, path: &Path) -> anyhow::Result<LegacyTable> {
        if let Ok(mut reads) = self.reads.lock() {
            *reads.entry(path.to_path_buf()).or_insert(0) += 1;
        }
        self.tables
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no table at {}", path.to_string_lossy()))
    }
}

/// Builds a table from `(name, type_code)` columns and rows of values in
/// column order.
pub fn table_from_rows(
    path: impl Into<PathBuf>,
    columns: &[(&str, char)],
    rows: Vec<Vec<Value>>,
) -> LegacyTable {
    let fields: Vec<LegacyField> = columns
        .iter()
        .map(|(n, t)| LegacyField {
            name: n.to_lowercase(),
            type_code: *t,
        })
        .collect();
    let records = rows
        .into_iter()
        .map(|row| LegacyRecord {
            values: fields
                .iter()
                .map(|f| f.name.clone())
                .zip(row)
                .collect(),
        })
        .collect();
    LegacyTable {
        path: path.into(),
        fields,
        records,
    }
}
