mod test_support;

use lesis2sqlite::catalog::{FieldCatalog, FieldDescriptor};
use lesis2sqlite::db::{self, LayerField};
use lesis2sqlite::geometry::GeometryType;
use lesis2sqlite::legacy::LegacyField;
use lesis2sqlite::schema::{column_type_for, ensure_columns};
use test_support::temp_dir;

fn descriptor(id: &str, tip: &str, name: &str, sprav: Option<&str>) -> FieldDescriptor {
    FieldDescriptor {
        id: id.into(),
        type_code: tip.into(),
        name: name.into(),
        reference: sprav.map(str::to_string),
    }
}

fn field(name: &str, code: char) -> LegacyField {
    LegacyField {
        name: name.into(),
        type_code: code,
    }
}

#[test]
fn ensure_columns_adds_catalog_fields_once() {
    let dir = temp_dir("lesis-schema");
    let conn = db::open_store(&dir.join("out.sqlite")).expect("open store");
    db::create_layer(
        &conn,
        "videl_plg",
        GeometryType::Polygon,
        -1,
        &[LayerField::new("nomkvr", "REAL"), LayerField::new("nomvyd", "REAL")],
    )
    .expect("create layer");

    let catalog = FieldCatalog::from_descriptors([
        descriptor("nomkvr", "N", "Квартал", None),
        descriptor("por", "N", "Порода", Some("porods")),
        descriptor("vozr", "N", "Возраст", None),
        descriptor("dt", "D", "Дата", None),
    ]);
    let legacy = vec![
        field("nomkvr", 'N'),
        field("por", 'N'),
        field("vozr", 'I'),
        field("dt", 'D'),
        field("zzz", 'C'),
    ];

    let added = ensure_columns(&conn, "videl_plg", &legacy, &catalog).expect("first pass");
    let summary: Vec<(&str, &str, &str)> = added
        .iter()
        .map(|c| (c.name.as_str(), c.sql_type.as_str(), c.alias.as_str()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("por", "TEXT", "Порода"),
            ("vozr", "INTEGER", "Возраст"),
            ("dt", "DATE", "Дата"),
        ]
    );

    let again = ensure_columns(&conn, "videl_plg", &legacy, &catalog).expect("second pass");
    assert!(again.is_empty());

    let columns = db::table_columns(&conn, "videl_plg").expect("columns");
    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["ogc_fid", "GEOMETRY", "nomkvr", "nomvyd", "por", "vozr", "dt"]
    );
}

#[test]
fn child_column_types_follow_the_catalog() {
    let catalog = FieldCatalog::from_descriptors([
        descriptor("por", "N", "Порода", Some("porods")),
        descriptor("jar", "N", "Ярус", None),
    ]);
    assert_eq!(column_type_for(&field("por", 'N'), &catalog), "TEXT");
    assert_eq!(column_type_for(&field("jar", 'N'), &catalog), "REAL");
    assert_eq!(column_type_for(&field("xyz", 'N'), &catalog), "TEXT");
    // Overlay entries are always present.
    assert_eq!(column_type_for(&field("arn", 'N'), &catalog), "TEXT");
    assert_eq!(column_type_for(&field("vozrub", 'N'), &catalog), "REAL");
}
