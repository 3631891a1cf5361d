use crate::catalog::FieldCatalog;
use crate::db::{quote_ident, table_columns};
use crate::error::{ConvertError, Result};
use crate::legacy::LegacyField;
use rusqlite::Connection;
use tracing::debug;

pub const TEXT_TYPE: &str = "TEXT";

const TYPE_MAP: &[(&str, &str)] = &[
    ("F", "FLOAT"),
    ("L", "BOOLEAN"),
    ("I", "INTEGER"),
    ("C", "TEXT"),
    // N holds both integers and fractions.
    ("N", "REAL"),
    ("M", "TEXT"),
    ("D", "DATE"),
    ("T", "DATETIME"),
    ("0", "INTEGER"),
];

pub fn sql_type_for_code(code: &str) -> &'static str {
    TYPE_MAP
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, t)| *t)
        .unwrap_or(TEXT_TYPE)
}

/// Column type for a legacy field in a table created from scratch. Resolved
/// references are display text, and unknown fields keep their raw text.
pub fn column_type_for(field: &LegacyField, catalog: &FieldCatalog) -> &'static str {
    match catalog.get(&field.name) {
        None => TEXT_TYPE,
        Some(d) if d.has_reference() => TEXT_TYPE,
        Some(_) => sql_type_for_code(&field.type_code.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddedColumn {
    pub name: String,
    pub sql_type: String,
    pub alias: String,
}

/// Adds every catalog-described legacy field missing from `table`. Fields the
/// catalog does not describe are skipped without a report.
pub fn ensure_columns(
    conn: &Connection,
    table: &str,
    legacy_fields: &[LegacyField],
    catalog: &FieldCatalog,
) -> Result<Vec<AddedColumn>> {
    let mut existing: Vec<String> = table_columns(conn, table)?
        .into_iter()
        .map(|c| c.name.to_lowercase())
        .collect();

    let mut added = Vec::new();
    for field in legacy_fields {
        if existing.contains(&field.name) {
            continue;
        }
        let Some(desc) = catalog.get(&field.name) else {
            continue;
        };
        let sql_type = if desc.has_reference() {
            TEXT_TYPE
        } else {
            sql_type_for_code(&field.type_code.to_string())
        };

        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            quote_ident(table),
            quote_ident(&field.name),
            sql_type
        );
        conn.execute(&sql, []).map_err(|e| {
            ConvertError::Schema(format!("can't add column {} to {table}: {e}", field.name))
        })?;
        debug!(table, column = %field.name, sql_type, "column added");

        existing.push(field.name.clone());
        added.push(AddedColumn {
            name: field.name.clone(),
            sql_type: sql_type.to_string(),
            alias: desc.name.clone(),
        });
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_codes_fall_back_to_text() {
        assert_eq!(sql_type_for_code("N"), "REAL");
        assert_eq!(sql_type_for_code("0"), "INTEGER");
        assert_eq!(sql_type_for_code("char"), "TEXT");
        assert_eq!(sql_type_for_code("X"), "TEXT");
    }
}
