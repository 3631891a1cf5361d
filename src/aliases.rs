use crate::db::{self, quote_ident};
use crate::error::Result;
use crate::progress::Progress;
use rusqlite::Connection;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AliasEntry {
    pub table_name: String,
    /// `None` names the whole table.
    pub field_name: Option<String>,
    pub alias: String,
}

#[derive(Debug, Default)]
pub struct AliasRegistry {
    entries: Vec<AliasEntry>,
}

impl AliasRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, table: &str, field: Option<&str>, alias: &str) {
        self.entries.push(AliasEntry {
            table_name: table.to_string(),
            field_name: field.map(str::to_string),
            alias: alias.to_string(),
        });
    }

    pub fn entries(&self) -> &[AliasEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn persist(&self, conn: &Connection, table: &str, progress: &mut Progress) -> Result<()> {
        db::in_batch(conn, |tx| {
            tx.execute(
                &format!(
                    "CREATE TABLE {} (table_name TEXT, field_name TEXT, alias TEXT)",
                    quote_ident(table)
                ),
                [],
            )?;
            let sql = format!(
                "INSERT INTO {} (table_name, field_name, alias) VALUES (?, ?, ?)",
                quote_ident(table)
            );
            let mut stmt = tx.prepare(&sql)?;
            for e in &self.entries {
                progress.checkpoint()?;
                stmt.execute((&e.table_name, &e.field_name, &e.alias))?;
            }
            Ok(())
        })
    }
}
