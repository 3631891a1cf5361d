use crate::error::{ConvertError, Result};
use crate::legacy::TableReader;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub id: String,
    /// Single-letter DBF code, or `char` for the synthetic entries.
    pub type_code: String,
    pub name: String,
    pub reference: Option<String>,
}

impl FieldDescriptor {
    pub fn has_reference(&self) -> bool {
        self.reference.is_some()
    }
}

/// `Fields.DBF` keyed by lower-case field id.
#[derive(Debug, Clone, Default)]
pub struct FieldCatalog {
    fields: HashMap<String, FieldDescriptor>,
}

impl FieldCatalog {
    pub fn load(reader: &dyn TableReader, path: &Path) -> Result<Self> {
        let table = reader.read_table(path).map_err(ConvertError::table)?;
        let mut fields = HashMap::new();
        for rec in &table.records {
            let Some(id) = rec.text("field").map(|s| s.to_lowercase()) else {
                continue;
            };
            fields.insert(
                id.clone(),
                FieldDescriptor {
                    id,
                    type_code: rec.text("tip").unwrap_or_default(),
                    name: rec.text("name").unwrap_or_default(),
                    reference: rec.text("sprav").filter(|s| !s.is_empty()),
                },
            );
        }
        let mut catalog = Self { fields };
        catalog.apply_overlay();
        Ok(catalog)
    }

    pub fn from_descriptors(descriptors: impl IntoIterator<Item = FieldDescriptor>) -> Self {
        let mut catalog = Self {
            fields: descriptors
                .into_iter()
                .map(|d| (d.id.to_lowercase(), d))
                .collect(),
        };
        catalog.apply_overlay();
        catalog
    }

    /// Attributes the export carries but `Fields.DBF` never describes.
    fn apply_overlay(&mut self) {
        for d in [
            FieldDescriptor {
                id: "arn".into(),
                type_code: "char".into(),
                name: "Арендатор".into(),
                reference: Some("arnLesse".into()),
            },
            FieldDescriptor {
                id: "vozrub".into(),
                type_code: "char".into(),
                name: "Возраст рубки".into(),
                reference: None,
            },
        ] {
            self.fields.insert(d.id.clone(), d);
        }
    }

    pub fn get(&self, id: &str) -> Option<&FieldDescriptor> {
        self.fields.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.fields.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
