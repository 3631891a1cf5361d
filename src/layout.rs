use crate::error::{ConvertError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const FIELDS_TABLE: &str = "fields.dbf";

/// Attribute tables found in one `d` directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataFileSet {
    pub phl1: Option<PathBuf>,
    pub phl2: Option<PathBuf>,
    pub phl3: Option<PathBuf>,
}

impl DataFileSet {
    fn is_empty(&self) -> bool {
        self.phl1.is_none() && self.phl2.is_none() && self.phl3.is_none()
    }
}

/// Reference (`n`) and data (`d`) directories of a Lesis export.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceLayout {
    pub base_dir: PathBuf,
    /// Most deeply nested first.
    pub reference_dirs: Vec<PathBuf>,
    /// Discovery order.
    pub data_dirs: Vec<PathBuf>,
    pub fields_table: PathBuf,
}

impl WorkspaceLayout {
    pub fn scan(base_dir: &Path) -> Result<Self> {
        if !base_dir.is_dir() {
            return Err(ConvertError::Structure(format!(
                "specified directory does not exist: {}",
                base_dir.to_string_lossy()
            )));
        }

        let mut reference_dirs: Vec<PathBuf> = Vec::new();
        let mut data_dirs: Vec<PathBuf> = Vec::new();
        walk(base_dir, &mut reference_dirs, &mut data_dirs)?;

        // The field catalog lives in the outermost reference directory.
        let Some(outermost) = reference_dirs.last() else {
            return Err(ConvertError::Structure(
                "no reference directory (n) found".into(),
            ));
        };
        let Some(fields_table) = find_file_ci(outermost, FIELDS_TABLE)? else {
            return Err(ConvertError::Structure("Fields.DBF not found!".into()));
        };

        debug!(
            reference_dirs = reference_dirs.len(),
            data_dirs = data_dirs.len(),
            fields = %fields_table.to_string_lossy(),
            "lesis layout scanned"
        );

        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            reference_dirs,
            data_dirs,
            fields_table,
        })
    }

    pub fn find_reference_table(&self, name: &str) -> Result<Option<PathBuf>> {
        let wanted = Path::new(name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(name)
            .to_lowercase();
        for dir in &self.reference_dirs {
            for p in sorted_entries(dir)? {
                if !p.is_file() {
                    continue;
                }
                let ext = p
                    .extension()
                    .and_then(|s| s.to_str())
                    .unwrap_or("")
                    .to_lowercase();
                if ext != "dbf" {
                    continue;
                }
                let stem = p
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("")
                    .to_lowercase();
                if stem == wanted {
                    return Ok(Some(p));
                }
            }
        }
        Ok(None)
    }

    pub fn data_file_sets(&self) -> Result<Vec<DataFileSet>> {
        let mut out = Vec::new();
        for dir in &self.data_dirs {
            let set = DataFileSet {
                phl1: find_file_ci(dir, "phl1.dbf")?,
                phl2: find_file_ci(dir, "phl2.dbf")?,
                phl3: find_file_ci(dir, "phl3.dbf")?,
            };
            if !set.is_empty() {
                out.push(set);
            }
        }
        Ok(out)
    }
}

fn walk(dir: &Path, reference_dirs: &mut Vec<PathBuf>, data_dirs: &mut Vec<PathBuf>) -> Result<()> {
    let children: Vec<PathBuf> = sorted_entries(dir)?
        .into_iter()
        .filter(|p| p.is_dir())
        .collect();

    for child in &children {
        let name = child.file_name().and_then(|s| s.to_str()).unwrap_or("");
        if name.eq_ignore_ascii_case("n") {
            if !reference_dirs.contains(child) {
                reference_dirs.insert(0, child.clone());
            }
        } else if name.eq_ignore_ascii_case("d") && !data_dirs.contains(child) {
            data_dirs.push(child.clone());
        }
    }
    for child in &children {
        walk(child, reference_dirs, data_dirs)?;
    }
    Ok(())
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for ent in std::fs::read_dir(dir)? {
        out.push(ent?.path());
    }
    out.sort();
    Ok(out)
}

/// Case-insensitive file lookup in one directory.
pub fn find_file_ci(dir: &Path, name: &str) -> Result<Option<PathBuf>> {
    for p in sorted_entries(dir)? {
        if !p.is_file() {
            continue;
        }
        let file_name = p.file_name().and_then(|s| s.to_str()).unwrap_or("");
        if file_name.eq_ignore_ascii_case(name) {
            return Ok(Some(p));
        }
    }
    Ok(None)
}
