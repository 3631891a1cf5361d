use serde::{Deserialize, Serialize};

/// Output names and legacy key fields. Defaults reproduce the layout the
/// Lesis converter has always produced; callers override them through the
/// `settings` object of a `convert.start` request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ConvertSettings {
    pub videl_layer: String,
    pub kvr_layer: String,
    pub yarus_table: String,
    pub alias_table: String,
    pub maket_table_prefix: String,
    pub yarus_table_alias: String,
    /// Block number, shared by the shapefile and every PHL table.
    pub block_field: String,
    /// Stand number within a block.
    pub stand_field: String,
    /// Stand number unique across the export; links PHL2/PHL3 rows to stands.
    pub stand_key_field: String,
    pub stand_area_field: String,
    pub block_area_field: String,
    pub maket_field: String,
    pub foreign_key_column: String,
}

impl Default for ConvertSettings {
    fn default() -> Self {
        Self {
            videl_layer: "videl_plg".into(),
            kvr_layer: "kvr_plg".into(),
            yarus_table: "yarpor_attr".into(),
            alias_table: "aliases".into(),
            maket_table_prefix: "maket_".into(),
            yarus_table_alias: "Ярусы".into(),
            block_field: "nomkvr".into(),
            stand_field: "nomvyd".into(),
            stand_key_field: "nnn".into(),
            stand_area_field: "plsvyd".into(),
            block_area_field: "plskvr".into(),
            maket_field: "maket".into(),
            foreign_key_column: "videl_id".into(),
        }
    }
}

impl ConvertSettings {
    pub fn from_json(raw: Option<&serde_json::Value>) -> anyhow::Result<Self> {
        match raw {
            None => Ok(Self::default()),
            Some(v) if v.is_null() => Ok(Self::default()),
            Some(v) => Ok(serde_json::from_value(v.clone())?),
        }
    }

    pub fn maket_table(&self, maket_id: &str) -> String {
        format!("{}{}", self.maket_table_prefix, maket_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn partial_settings_keep_defaults() {
        let raw = json!({ "kvrLayer": "blocks" });
        let s = ConvertSettings::from_json(Some(&raw)).expect("parse settings");
        assert_eq!(s.kvr_layer, "blocks");
        assert_eq!(s.videl_layer, "videl_plg");
        assert_eq!(s.maket_table("12"), "maket_12");
    }

    #[test]
    fn null_settings_are_defaults() {
        let s = ConvertSettings::from_json(Some(&serde_json::Value::Null)).expect("parse");
        assert_eq!(s, ConvertSettings::default());
    }
}
