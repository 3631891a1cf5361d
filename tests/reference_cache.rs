mod test_support;

use lesis2sqlite::catalog::FieldCatalog;
use lesis2sqlite::layout::WorkspaceLayout;
use lesis2sqlite::reference::{ReferenceResolver, REFERENCE_NOT_FOUND};
use rusqlite::types::Value;
use test_support::{int, text, Fixture};

fn fixture() -> Fixture {
    let mut fx = Fixture::new("lesis-reference");
    fx.fields(&[
        ("por", "N", "Порода", Some("porods")),
        ("bon", "C", "Бонитет", None),
        ("tip", "N", "Тип", Some("tipy")),
    ]);
    fx.table(
        "N/porods.dbf",
        &[("kl", 'N'), ("tx", 'C')],
        vec![
            vec![int(7), text("Pine")],
            vec![int(3), text("Birch")],
            vec![Value::Null, text("Unknown species")],
        ],
    );
    fx
}

#[test]
fn coded_value_resolves_with_a_single_scan() {
    let fx = fixture();
    let layout = WorkspaceLayout::scan(&fx.base).expect("scan");
    let catalog = FieldCatalog::load(&fx.tables, &layout.fields_table).expect("catalog");
    let porods = layout
        .find_reference_table("porods")
        .expect("find")
        .expect("porods present");

    let mut resolver = ReferenceResolver::new(&fx.tables, &layout, &catalog);
    assert_eq!(resolver.resolve("por", &text("7")).expect("resolve"), text("Pine"));
    assert_eq!(resolver.resolve("por", &int(7)).expect("resolve"), text("Pine"));
    assert_eq!(resolver.resolve("por", &Value::Real(3.0)).expect("resolve"), text("Birch"));
    // A key the table never had is remembered as a miss.
    assert_eq!(resolver.resolve("por", &int(42)).expect("resolve"), Value::Null);
    assert_eq!(resolver.resolve("por", &int(42)).expect("resolve"), Value::Null);

    assert_eq!(resolver.scans(), 1);
    assert_eq!(fx.tables.reads(&porods), 1);
}

#[test]
fn null_numeric_key_is_stored_as_zero() {
    let fx = fixture();
    let layout = WorkspaceLayout::scan(&fx.base).expect("scan");
    let catalog = FieldCatalog::load(&fx.tables, &layout.fields_table).expect("catalog");

    let mut resolver = ReferenceResolver::new(&fx.tables, &layout, &catalog);
    assert_eq!(
        resolver.resolve("por", &int(0)).expect("resolve"),
        text("Unknown species")
    );
    // Null raw values are never looked up.
    assert_eq!(resolver.resolve("por", &Value::Null).expect("resolve"), Value::Null);
}

#[test]
fn plain_unknown_and_unlocatable_fields() {
    let fx = fixture();
    let layout = WorkspaceLayout::scan(&fx.base).expect("scan");
    let catalog = FieldCatalog::load(&fx.tables, &layout.fields_table).expect("catalog");

    let mut resolver = ReferenceResolver::new(&fx.tables, &layout, &catalog);
    assert_eq!(resolver.resolve("bon", &text("2a")).expect("resolve"), text("2a"));
    assert_eq!(resolver.resolve("zzz", &text("1")).expect("resolve"), Value::Null);
    assert_eq!(
        resolver.resolve("tip", &int(1)).expect("resolve"),
        text(REFERENCE_NOT_FOUND)
    );
    // The overlay entry points at a table this export does not ship.
    assert_eq!(
        resolver.resolve("arn", &int(5)).expect("resolve"),
        text(REFERENCE_NOT_FOUND)
    );
    assert_eq!(resolver.scans(), 0);
}

#[test]
fn reference_table_is_located_once_per_name() {
    let fx = fixture();
    let layout = WorkspaceLayout::scan(&fx.base).expect("scan");
    let catalog = FieldCatalog::load(&fx.tables, &layout.fields_table).expect("catalog");

    let mut resolver = ReferenceResolver::new(&fx.tables, &layout, &catalog);
    for key in [7, 3, 7, 42, 3] {
        resolver.resolve("por", &int(key)).expect("resolve");
    }
    assert_eq!(resolver.directory_lookups(), 1);
    // kl 7, 3, the null key stored as 0, and the remembered miss 42.
    assert_eq!(resolver.cached_entries(), 4);

    // A missing table is searched for once as well.
    for _ in 0..3 {
        assert_eq!(
            resolver.resolve("tip", &int(1)).expect("resolve"),
            text(REFERENCE_NOT_FOUND)
        );
    }
    assert_eq!(resolver.locate("TIPY").expect("locate"), None);
    assert_eq!(resolver.directory_lookups(), 2);
    assert!(resolver.locate("porods").expect("locate").is_some());
    assert_eq!(resolver.directory_lookups(), 2);
}
