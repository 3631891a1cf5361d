use crate::db::{self, quote_ident, FID_COLUMN};
use crate::error::{ConvertError, Result};
use crate::legacy::{value_key, LegacyField, LegacyTable};
use crate::pipeline::StageContext;
use crate::reference::REFERENCE_NOT_FOUND;
use crate::schema::{column_type_for, sql_type_for_code, TEXT_TYPE};
use rusqlite::types::Value;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

const MAKETS_TABLE: &str = "makets";
const TEMPLATE_ALIAS_ROW: &str = "n0";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildSummary {
    pub tables: usize,
    pub inserted: usize,
    pub dropped: usize,
}

/// Maps stand numbers of the primary layer to their feature ids.
fn stand_index(conn: &Connection, layer: &str, key_field: &str) -> Result<HashMap<String, i64>> {
    if !db::table_has_column(conn, layer, key_field)? {
        return Err(ConvertError::Schema(format!(
            "field '{key_field}' missing in {layer}"
        )));
    }
    let sql = format!(
        "SELECT {}, {} FROM {}",
        quote_ident(FID_COLUMN),
        quote_ident(key_field),
        quote_ident(layer)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, Value>(1)?)))?;
    let mut out = HashMap::new();
    for row in rows {
        let (fid, key) = row?;
        if matches!(key, Value::Null) {
            continue;
        }
        out.entry(value_key(&key)).or_insert(fid);
    }
    Ok(out)
}

fn create_child_table(
    conn: &Connection,
    table: &str,
    columns: &[(String, String)],
    fk_column: &str,
    parent: &str,
) -> Result<()> {
    let mut defs: Vec<String> = columns
        .iter()
        .map(|(name, ty)| format!("{} {}", quote_ident(name), ty))
        .collect();
    defs.push(format!(
        "{} INTEGER REFERENCES {}({})",
        quote_ident(fk_column),
        quote_ident(parent),
        quote_ident(FID_COLUMN)
    ));
    let sql = format!("CREATE TABLE {} ({})", quote_ident(table), defs.join(", "));
    conn.execute(&sql, [])
        .map_err(|e| ConvertError::Schema(format!("can't create table {table}: {e}")))?;
    Ok(())
}

fn insert_sql(table: &str, columns: &[&str], fk_column: &str) -> String {
    let mut names: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    names.push(quote_ident(fk_column));
    let marks = vec!["?"; names.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        names.join(", "),
        marks
    )
}

/// Builds the fixed tier-2 child table and fills it from `table`.
pub fn process_tier2(ctx: &mut StageContext<'_>, table: &LegacyTable) -> Result<ChildSummary> {
    let conn = ctx.conn;
    let settings = ctx.settings;
    let catalog = ctx.catalog;
    let child = settings.yarus_table.as_str();
    let key_field = settings.stand_key_field.as_str();
    let fk = settings.foreign_key_column.as_str();
    let stage = ctx.progress.stage().label();

    let mut columns = Vec::with_capacity(table.fields.len());
    for field in &table.fields {
        match catalog.get(&field.name) {
            Some(desc) => ctx.aliases.add(child, Some(&field.name), &desc.name),
            None => ctx.errors.push(
                stage,
                format!("Field {} not present in Fields.DBF", field.name),
                None,
            ),
        }
        columns.push((
            field.name.clone(),
            column_type_for(field, catalog).to_string(),
        ));
    }
    create_child_table(conn, child, &columns, fk, &settings.videl_layer)?;
    ctx.aliases.add(child, None, &settings.yarus_table_alias);

    let stands = stand_index(conn, &settings.videl_layer, key_field)?;
    let names: Vec<&str> = table.fields.iter().map(|f| f.name.as_str()).collect();
    let sql = insert_sql(child, &names, fk);

    let mut summary = ChildSummary {
        tables: 1,
        ..ChildSummary::default()
    };
    let total = table.len();
    db::in_batch(conn, |tx| {
        for (i, rec) in table.records.iter().enumerate() {
            ctx.progress.checkpoint()?;

            let key = rec.text(key_field);
            let Some(fid) = key.as_ref().and_then(|k| stands.get(k)).copied() else {
                summary.dropped += 1;
                let key = key.unwrap_or_default();
                ctx.errors.push(
                    stage,
                    format!("Skip yarus - there is no videl with {key_field}: {key}"),
                    Some(json!({ key_field: key })),
                );
                continue;
            };

            let mut params = Vec::with_capacity(names.len() + 1);
            for name in &names {
                let raw = rec.get(name).unwrap_or(&Value::Null);
                params.push(ctx.resolver.resolve(name, raw)?);
            }
            params.push(Value::Integer(fid));

            match tx.execute(&sql, rusqlite::params_from_iter(params.iter())) {
                Ok(_) => summary.inserted += 1,
                Err(e) => {
                    summary.dropped += 1;
                    ctx.errors.push(
                        stage,
                        format!("Insert into {child} error: {e}"),
                        Some(json!({ fk: fid })),
                    );
                }
            }
            ctx.progress
                .message(&format!("Process {} from {} yaruses", i + 1, total));
        }
        Ok(())
    })?;

    info!(table = child, inserted = summary.inserted, dropped = summary.dropped, "tier-2 built");
    Ok(summary)
}

/// One template child table as declared by the template catalog.
#[derive(Debug, Clone, Default)]
struct Template {
    alias: Option<String>,
    /// Declared fields, in declaration order, with their reference table.
    fields: Vec<(String, Option<String>)>,
}

impl Template {
    fn reference(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .and_then(|(_, r)| r.as_deref())
    }

    fn declares(&self, field: &str) -> bool {
        self.fields.iter().any(|(name, _)| name == field)
    }
}

/// Reads the template catalog for the template ids used by the tier-3 rows.
/// Returns `None` when the catalog cannot be located.
fn load_templates(
    ctx: &mut StageContext<'_>,
    used: &[String],
) -> Result<Option<HashMap<String, Template>>> {
    let stage = ctx.progress.stage().label();
    let Some(path) = ctx.resolver.locate(MAKETS_TABLE)? else {
        ctx.errors.push(
            stage,
            "Makets.dbf not found! Makets tables will not be created.",
            None,
        );
        return Ok(None);
    };
    let catalog = ctx.tables.read_table(&path).map_err(ConvertError::table)?;
    let used: HashSet<&str> = used.iter().map(String::as_str).collect();

    let mut templates: HashMap<String, Template> = HashMap::new();
    for rec in &catalog.records {
        let Some(id) = rec.text("maket") else { continue };
        if !used.contains(id.as_str()) {
            continue;
        }
        let field = rec.text("field").unwrap_or_default();
        if field.eq_ignore_ascii_case(TEMPLATE_ALIAS_ROW) {
            templates.entry(id).or_default().alias = rec.text("name");
        }
    }

    for rec in &catalog.records {
        let Some(id) = rec.text("maket") else { continue };
        if !used.contains(id.as_str()) {
            continue;
        }
        let field = rec.text("field").unwrap_or_default().to_lowercase();
        if field == TEMPLATE_ALIAS_ROW || field.is_empty() {
            continue;
        }
        let Some(template) = templates.get_mut(&id) else {
            ctx.errors.push(
                stage,
                format!("Makets {id} not found!"),
                Some(json!({ "maket": id })),
            );
            continue;
        };
        if template.declares(&field) {
            continue;
        }
        let reference = rec.text("sprav").filter(|s| !s.trim().is_empty());
        if let Some(alias) = rec.text("name") {
            ctx.aliases
                .add(&ctx.settings.maket_table(&id), Some(&field), &alias);
        }
        template.fields.push((field, reference));
    }
    Ok(Some(templates))
}

fn template_columns(template: &Template, fields: &[LegacyField]) -> Vec<(String, String)> {
    let code_of = |name: &str| {
        fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.type_code.to_string())
    };
    let mut columns: Vec<(String, String)> = template
        .fields
        .iter()
        .map(|(name, reference)| {
            let ty = match (reference, code_of(name)) {
                (Some(_), _) | (None, None) => TEXT_TYPE,
                (None, Some(code)) => sql_type_for_code(&code),
            };
            (name.clone(), ty.to_string())
        })
        .collect();
    for field in fields {
        if !template.declares(&field.name) {
            columns.push((
                field.name.clone(),
                sql_type_for_code(&field.type_code.to_string()).to_string(),
            ));
        }
    }
    columns
}

/// Builds one child table per template id used by the tier-3 rows and
/// distributes the rows among them.
pub fn process_tier3(
    ctx: &mut StageContext<'_>,
    table: Option<&LegacyTable>,
) -> Result<ChildSummary> {
    let stage = ctx.progress.stage().label();
    let Some(table) = table else {
        ctx.errors.push(stage, "There is not phl3.dbf", None);
        return Ok(ChildSummary::default());
    };
    let conn = ctx.conn;
    let settings = ctx.settings;
    let maket_field = settings.maket_field.as_str();
    let key_field = settings.stand_key_field.as_str();
    let fk = settings.foreign_key_column.as_str();

    let mut used: Vec<String> = Vec::new();
    for rec in &table.records {
        if let Some(id) = rec.text(maket_field) {
            if !used.contains(&id) {
                used.push(id);
            }
        }
    }

    let Some(templates) = load_templates(ctx, &used)? else {
        return Ok(ChildSummary::default());
    };

    let mut summary = ChildSummary::default();
    for id in &used {
        let Some(template) = templates.get(id) else { continue };
        ctx.progress.checkpoint()?;
        let name = settings.maket_table(id);
        let columns = template_columns(template, &table.fields);
        create_child_table(conn, &name, &columns, fk, &settings.videl_layer)?;
        if let Some(alias) = &template.alias {
            ctx.aliases.add(&name, None, alias);
        }
        summary.tables += 1;
        debug!(table = %name, columns = columns.len(), "template table created");
    }

    let stands = stand_index(conn, &settings.videl_layer, key_field)?;
    let names: Vec<&str> = table.fields.iter().map(|f| f.name.as_str()).collect();

    let total = table.len();
    db::in_batch(conn, |tx| {
        for (i, rec) in table.records.iter().enumerate() {
            ctx.progress.checkpoint()?;
            let Some(id) = rec.text(maket_field) else { continue };
            let Some(template) = templates.get(&id) else {
                summary.dropped += 1;
                ctx.errors.push(
                    stage,
                    format!("Skip maket - template {id} not found"),
                    Some(json!({ "maket": id })),
                );
                continue;
            };
            let key = rec.text(key_field);
            let Some(fid) = key.as_ref().and_then(|k| stands.get(k)).copied() else {
                summary.dropped += 1;
                let key = key.unwrap_or_default();
                ctx.errors.push(
                    stage,
                    format!("Skip maket - there is no videl with {key_field}: {key}"),
                    Some(json!({ key_field: key, "maket": id })),
                );
                continue;
            };

            let mut params = Vec::with_capacity(names.len() + 1);
            for name in &names {
                let raw = rec.get(name).unwrap_or(&Value::Null);
                let value = match template.reference(name) {
                    None => raw.clone(),
                    Some(reference) => match ctx.resolver.locate(reference)? {
                        Some(path) => ctx.resolver.resolve_in(&path, raw)?,
                        None => {
                            warn!(reference, "template reference table missing");
                            Value::Text(REFERENCE_NOT_FOUND.into())
                        }
                    },
                };
                params.push(value);
            }
            params.push(Value::Integer(fid));

            let table_name = settings.maket_table(&id);
            let sql = insert_sql(&table_name, &names, fk);
            match tx.execute(&sql, rusqlite::params_from_iter(params.iter())) {
                Ok(_) => summary.inserted += 1,
                Err(e) => {
                    summary.dropped += 1;
                    ctx.errors.push(
                        stage,
                        format!("Insert into {table_name} error: {e}"),
                        Some(json!({ "maket": id, fk: fid })),
                    );
                }
            }
            ctx.progress
                .message(&format!("Process {} from {} makets", i + 1, total));
        }
        Ok(())
    })?;

    info!(
        tables = summary.tables,
        inserted = summary.inserted,
        dropped = summary.dropped,
        "tier-3 built"
    );
    Ok(summary)
}
