use crate::catalog::FieldCatalog;
use crate::error::{ConvertError, Result};
use crate::layout::WorkspaceLayout;
use crate::legacy::{value_key, TableReader};
use rusqlite::types::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const REFERENCE_NOT_FOUND: &str = "Reference file not found!";

const KEY_COLUMN: &str = "kl";
const TEXT_COLUMN: &str = "tx";

/// Resolves coded legacy values to reference-table descriptions.
///
/// One resolver belongs to one conversion run. Entries are never replaced:
/// the first description cached for a (table, key) pair is the one every
/// later lookup returns.
pub struct ReferenceResolver<'a> {
    tables: &'a dyn TableReader,
    layout: &'a WorkspaceLayout,
    catalog: &'a FieldCatalog,
    cache: HashMap<(PathBuf, String), Option<String>>,
    scanned: HashSet<PathBuf>,
    locations: HashMap<String, Option<PathBuf>>,
    scans: usize,
    lookups: usize,
}

impl<'a> ReferenceResolver<'a> {
    pub fn new(
        tables: &'a dyn TableReader,
        layout: &'a WorkspaceLayout,
        catalog: &'a FieldCatalog,
    ) -> Self {
        Self {
            tables,
            layout,
            catalog,
            cache: HashMap::new(),
            scanned: HashSet::new(),
            locations: HashMap::new(),
            scans: 0,
            lookups: 0,
        }
    }

    /// Value to store for `field_id`. Fields the catalog does not describe
    /// yield null; fields without a reference pass through unchanged.
    pub fn resolve(&mut self, field_id: &str, raw: &Value) -> Result<Value> {
        let Some(desc) = self.catalog.get(field_id) else {
            return Ok(Value::Null);
        };
        let Some(reference) = desc.reference.as_deref() else {
            return Ok(raw.clone());
        };
        match self.locate(reference)? {
            Some(path) => self.resolve_in(&path, raw),
            None => Ok(Value::Text(REFERENCE_NOT_FOUND.into())),
        }
    }

    /// Path of the reference table `name`. The directory search runs once
    /// per name; misses are remembered too.
    pub fn locate(&mut self, name: &str) -> Result<Option<PathBuf>> {
        let key = name.to_lowercase();
        if let Some(found) = self.locations.get(&key) {
            return Ok(found.clone());
        }
        let found = self.layout.find_reference_table(name)?;
        self.lookups += 1;
        self.locations.insert(key, found.clone());
        Ok(found)
    }

    pub fn resolve_in(&mut self, table_path: &Path, raw: &Value) -> Result<Value> {
        if matches!(raw, Value::Null) {
            return Ok(Value::Null);
        }
        let key = value_key(raw);
        let cache_key = (table_path.to_path_buf(), key);
        if let Some(hit) = self.cache.get(&cache_key) {
            return Ok(text_or_null(hit));
        }
        if !self.scanned.contains(table_path) {
            self.scan(table_path)?;
        }
        let resolved = self.cache.entry(cache_key).or_insert(None);
        Ok(text_or_null(resolved))
    }

    /// Loads every key of a reference table into the cache.
    fn scan(&mut self, table_path: &Path) -> Result<()> {
        let table = self
            .tables
            .read_table(table_path)
            .map_err(ConvertError::table)?;
        self.scans += 1;

        let key_type = table
            .field(KEY_COLUMN)
            .map(|f| f.type_code)
            .unwrap_or('N');
        let numeric_key = matches!(key_type, 'I' | 'F' | 'N' | '0');

        let mut seen: HashMap<String, Option<String>> = HashMap::new();
        for rec in &table.records {
            let key = match rec.get(KEY_COLUMN) {
                None | Some(Value::Null) if numeric_key => "0".to_string(),
                None | Some(Value::Null) => String::new(),
                Some(v) => value_key(v),
            };
            seen.insert(key, rec.text(TEXT_COLUMN));
        }
        debug!(
            table = %table_path.to_string_lossy(),
            keys = seen.len(),
            "reference table cached"
        );
        for (key, text) in seen {
            self.cache
                .entry((table_path.to_path_buf(), key))
                .or_insert(text);
        }
        self.scanned.insert(table_path.to_path_buf());
        Ok(())
    }

    /// Number of reference tables read so far.
    pub fn scans(&self) -> usize {
        self.scans
    }

    /// Number of reference-table directory searches so far.
    pub fn directory_lookups(&self) -> usize {
        self.lookups
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}

fn text_or_null(v: &Option<String>) -> Value {
    match v {
        Some(s) => Value::Text(s.clone()),
        None => Value::Null,
    }
}
