mod test_support;

use geo::Area;
use lesis2sqlite::geometry::GeometryType;
use lesis2sqlite::legacy::{DbfTableReader, TableReader};
use lesis2sqlite::shape::{ShapefileReader, VectorReader, SHAPEFILE_DRIVER};
use rusqlite::types::Value;
use std::path::Path;
use test_support::{int, real, temp_dir, text};

/// "Сосна" in CP866.
const PINE_CP866: &[u8] = &[0x91, 0xAE, 0xE1, 0xAD, 0xA0];
const CP866_MARK: u8 = 0x65;

/// (name, type, length, decimals)
type DbfField<'a> = (&'a str, u8, u8, u8);

/// Writes a dBase III table. Cell bytes are padded to the field length:
/// character cells on the right, numeric cells on the left.
fn write_dbf(path: &Path, fields: &[DbfField<'_>], rows: &[Vec<&[u8]>]) {
    let header_len = 32 + 32 * fields.len() + 1;
    let record_len = 1 + fields.iter().map(|f| f.2 as usize).sum::<usize>();

    let mut out = vec![0u8; 32];
    out[0] = 0x03;
    out[1..4].copy_from_slice(&[124, 1, 15]);
    out[4..8].copy_from_slice(&(rows.len() as u32).to_le_bytes());
    out[8..10].copy_from_slice(&(header_len as u16).to_le_bytes());
    out[10..12].copy_from_slice(&(record_len as u16).to_le_bytes());
    out[29] = CP866_MARK;

    for (name, kind, len, dec) in fields {
        let mut desc = [0u8; 32];
        desc[..name.len()].copy_from_slice(name.as_bytes());
        desc[11] = *kind;
        desc[16] = *len;
        desc[17] = *dec;
        out.extend_from_slice(&desc);
    }
    out.push(0x0D);

    for row in rows {
        out.push(b' ');
        for ((_, kind, len, _), cell) in fields.iter().zip(row) {
            let pad = *len as usize - cell.len();
            if *kind == b'C' {
                out.extend_from_slice(cell);
                out.extend(std::iter::repeat(b' ').take(pad));
            } else {
                out.extend(std::iter::repeat(b' ').take(pad));
                out.extend_from_slice(cell);
            }
        }
    }
    out.push(0x1A);
    std::fs::write(path, out).expect("write dbf");
}

fn row<'a>(cells: &[&'a [u8]]) -> Vec<&'a [u8]> {
    cells.to_vec()
}

fn shp_header(file_words: i32, bbox: [f64; 4]) -> Vec<u8> {
    let mut out = Vec::with_capacity(100);
    out.extend_from_slice(&9994i32.to_be_bytes());
    out.extend_from_slice(&[0u8; 20]);
    out.extend_from_slice(&file_words.to_be_bytes());
    out.extend_from_slice(&1000i32.to_le_bytes());
    out.extend_from_slice(&5i32.to_le_bytes());
    for v in bbox {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out.extend_from_slice(&[0u8; 32]);
    out
}

/// Writes a one-record polygon shapefile (`.shp` + `.shx`) holding a unit
/// square with its lower-left corner at `(x, y)`.
fn write_unit_square_shp(shp: &Path, x: f64, y: f64) {
    let bbox = [x, y, x + 1.0, y + 1.0];
    // Outer rings are clockwise.
    let ring = [(x, y), (x, y + 1.0), (x + 1.0, y + 1.0), (x + 1.0, y), (x, y)];

    let mut content = Vec::new();
    content.extend_from_slice(&5i32.to_le_bytes());
    for v in bbox {
        content.extend_from_slice(&v.to_le_bytes());
    }
    content.extend_from_slice(&1i32.to_le_bytes());
    content.extend_from_slice(&(ring.len() as i32).to_le_bytes());
    content.extend_from_slice(&0i32.to_le_bytes());
    for (px, py) in ring {
        content.extend_from_slice(&px.to_le_bytes());
        content.extend_from_slice(&py.to_le_bytes());
    }
    let content_words = (content.len() / 2) as i32;

    let mut out = shp_header(50 + 4 + content_words, bbox);
    out.extend_from_slice(&1i32.to_be_bytes());
    out.extend_from_slice(&content_words.to_be_bytes());
    out.extend_from_slice(&content);
    std::fs::write(shp, out).expect("write shp");

    let mut index = shp_header(50 + 4, bbox);
    index.extend_from_slice(&50i32.to_be_bytes());
    index.extend_from_slice(&content_words.to_be_bytes());
    std::fs::write(shp.with_extension("shx"), index).expect("write shx");
}

const STAND_FIELDS: &[DbfField<'static>] = &[
    ("POROD", b'C', 10, 0),
    ("NOMVYD", b'N', 3, 0),
    ("PLSVYD", b'N', 6, 1),
];

#[test]
fn dbf_text_is_decoded_as_cp866() {
    let dir = temp_dir("lesis-dbf-reader");
    let path = dir.join("PORODS.DBF");
    write_dbf(
        &path,
        STAND_FIELDS,
        &[
            row(&[PINE_CP866, b"7", b"1.5"]),
            row(&[b"", b"12", b"3.0"]),
        ],
    );

    let table = DbfTableReader.read_table(&path).expect("read dbf");
    let names: Vec<&str> = table.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["porod", "nomvyd", "plsvyd"]);
    assert_eq!(table.field("porod").expect("porod").type_code, 'C');
    assert_eq!(table.field("nomvyd").expect("nomvyd").type_code, 'N');
    assert_eq!(table.len(), 2);

    let first = &table.records[0];
    assert_eq!(first.get("porod"), Some(&text("Сосна")));
    assert_eq!(first.get("nomvyd"), Some(&int(7)));
    assert_eq!(first.get("plsvyd"), Some(&real(1.5)));

    // Blank character cells read as null; whole numerics stay integers.
    let second = &table.records[1];
    assert_eq!(second.get("porod"), Some(&Value::Null));
    assert_eq!(second.get("nomvyd"), Some(&int(12)));
    assert_eq!(second.get("plsvyd"), Some(&int(3)));
}

#[test]
fn shapefile_trio_becomes_a_polygon_layer() {
    let dir = temp_dir("lesis-shape-reader");
    let shp = dir.join("videl.shp");
    write_unit_square_shp(&shp, 10.0, 20.0);
    write_dbf(&dir.join("videl.dbf"), STAND_FIELDS, &[row(&[PINE_CP866, b"7", b"1.0"])]);
    let wkt = "PROJCS[\"Pulkovo 1942 / Gauss-Kruger zone 7\"]";
    std::fs::write(dir.join("videl.prj"), format!("{wkt}\n")).expect("write prj");

    let layer = ShapefileReader.open(&shp).expect("open shapefile");
    assert_eq!(layer.driver, SHAPEFILE_DRIVER);
    assert_eq!(layer.crs_wkt.as_deref(), Some(wkt));
    assert_eq!(layer.geometry_type, Some(GeometryType::Polygon));

    let names: Vec<&str> = layer.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["porod", "nomvyd", "plsvyd"]);
    assert_eq!(layer.feature_count(), 1);

    let feature = &layer.features[0];
    assert_eq!(feature.attributes, vec![text("Сосна"), int(7), int(1)]);
    let geometry = feature.geometry.as_ref().expect("stand geometry");
    assert_eq!(geometry.0.len(), 1);
    assert!((geometry.unsigned_area() - 1.0).abs() < 1e-9);
}

#[test]
fn shapefile_without_prj_has_no_crs() {
    let dir = temp_dir("lesis-shape-noprj");
    let shp = dir.join("videl.shp");
    write_unit_square_shp(&shp, 0.0, 0.0);
    write_dbf(&dir.join("videl.dbf"), STAND_FIELDS, &[row(&[b"", b"1", b"1.0"])]);

    let layer = ShapefileReader.open(&shp).expect("open shapefile");
    assert_eq!(layer.crs_wkt, None);
    assert_eq!(layer.features[0].attributes[0], Value::Null);
}
