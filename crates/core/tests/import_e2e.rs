use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use exif::experimental::Writer;
use exif::{Field, In, Rational, Tag, Value};
use photopoints_core::config::ImportConfig;
use photopoints_core::domain::{
    Column, ColumnType, FieldValue, Point, Row, SkipReason, StoreTable, ALTITUDE, FILENAME, LATITUDE,
    LONGITUDE,
};
use photopoints_core::error::Error;
use photopoints_core::gpkg;
use photopoints_core::report::{GroupOutcome, RunReport};
use photopoints_core::{ImportProgress, Importer};

/// A photo to place in the input directory.
struct Photo<'a> {
    name: &'a str,
    lat: f64,
    lon: f64,
    alt: Option<f64>,
    description: Option<&'a str>,
}

impl<'a> Photo<'a> {
    fn new(name: &'a str, description: &'a str) -> Self {
        Self {
            name,
            lat: 21.5,
            lon: -157.75,
            alt: None,
            description: Some(description),
        }
    }
}

fn micro(v: f64) -> Value {
    Value::Rational(vec![
        Rational {
            num: (v.abs() * 1_000_000.0).round() as u32,
            denom: 1_000_000,
        },
        Rational { num: 0, denom: 1 },
        Rational { num: 0, denom: 1 },
    ])
}

fn ascii(s: &str) -> Value {
    Value::Ascii(vec![s.as_bytes().to_vec()])
}

fn field(tag: Tag, value: Value) -> Field {
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value,
    }
}

/// Encode a small JPEG and splice an EXIF APP1 segment holding `fields`
/// directly after SOI.
fn jpeg_with_exif(fields: &[Field]) -> Vec<u8> {
    let img = image::RgbImage::from_fn(16, 16, |x, y| image::Rgb([(x * 8) as u8, (y * 8) as u8, 128]));
    let mut jpeg = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut jpeg), image::ImageFormat::Jpeg)
        .unwrap();

    if fields.is_empty() {
        return jpeg;
    }

    let mut writer = Writer::new();
    for f in fields {
        writer.push_field(f);
    }
    let mut tiff = Cursor::new(Vec::new());
    writer.write(&mut tiff, false).unwrap();
    let tiff = tiff.into_inner();

    let mut out = jpeg[..2].to_vec();
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&((2 + 6 + tiff.len()) as u16).to_be_bytes());
    out.extend_from_slice(b"Exif\0\0");
    out.extend_from_slice(&tiff);
    out.extend_from_slice(&jpeg[2..]);
    out
}

fn write_photo(dir: &Path, photo: &Photo) {
    let mut fields = vec![
        field(Tag::GPSLatitudeRef, ascii(if photo.lat < 0.0 { "S" } else { "N" })),
        field(Tag::GPSLatitude, micro(photo.lat)),
        field(Tag::GPSLongitudeRef, ascii(if photo.lon < 0.0 { "W" } else { "E" })),
        field(Tag::GPSLongitude, micro(photo.lon)),
        field(Tag::Orientation, Value::Short(vec![1])),
        field(Tag::DateTimeOriginal, ascii("2024:03:01 09:15:00")),
    ];
    if let Some(alt) = photo.alt {
        fields.push(field(Tag::GPSAltitudeRef, Value::Byte(vec![0])));
        fields.push(field(
            Tag::GPSAltitude,
            Value::Rational(vec![Rational {
                num: (alt * 100.0).round() as u32,
                denom: 100,
            }]),
        ));
    }
    if let Some(desc) = photo.description {
        fields.push(field(Tag::ImageDescription, ascii(desc)));
    }
    fs::write(dir.join(photo.name), jpeg_with_exif(&fields)).unwrap();
}

struct Workspace {
    _tmp: tempfile::TempDir,
    input: PathBuf,
    output: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("photos");
        let output = tmp.path().join("stores");
        fs::create_dir_all(&input).unwrap();
        Self {
            _tmp: tmp,
            input,
            output,
        }
    }

    fn add(&self, photo: Photo) {
        write_photo(&self.input, &photo);
    }

    fn remove(&self, name: &str) {
        fs::remove_file(self.input.join(name)).unwrap();
    }

    fn config(&self) -> ImportConfig {
        ImportConfig::new(&self.input, &self.output, "F")
    }

    fn run(&self) -> RunReport {
        self.run_with(self.config())
    }

    fn run_with(&self, config: ImportConfig) -> RunReport {
        Importer::new(config).unwrap().run(None).unwrap()
    }

    fn store_path(&self, group: &str) -> PathBuf {
        self.output.join(group).join(format!("{group}.gpkg"))
    }

    fn store(&self, group: &str) -> StoreTable {
        gpkg::load(&self.store_path(group)).unwrap()
    }
}

fn find<'a>(table: &'a StoreTable, filename: &str) -> &'a Row {
    table
        .rows
        .iter()
        .find(|r| r.identity() == Some(filename))
        .unwrap_or_else(|| panic!("no row for {filename}"))
}

fn text(s: &str) -> FieldValue {
    FieldValue::Text(s.to_string())
}

fn column_names(table: &StoreTable) -> Vec<&str> {
    table.columns.iter().map(|c| c.name.as_str()).collect()
}

// ── Basic import ─────────────────────────────────────────────────

#[test]
fn test_import_creates_one_store_per_group() {
    let ws = Workspace::new();
    ws.add(Photo::new("a.jpg", "F-arch;site-1"));
    ws.add(Photo::new("b.JPG", "f-fauna; site-2"));
    ws.add(Photo::new("c.jpg", "F-arch;site-3;observer-kl"));

    let report = ws.run();
    assert_eq!(report.photos_seen, 3);
    assert_eq!(report.records_built, 3);
    assert!(!report.has_failures());
    assert_eq!(report.groups.len(), 2);

    let arch = ws.store("arch");
    assert_eq!(arch.rows.len(), 2);
    let names = column_names(&arch);
    assert!(names.contains(&"f"));
    assert!(names.contains(&"site"));
    assert!(names.contains(&"observer"));
    assert_eq!(find(&arch, "a.jpg").get("site"), &text("1"));
    assert_eq!(find(&arch, "a.jpg").get("observer"), &FieldValue::Null);
    assert_eq!(find(&arch, "c.jpg").get("f"), &text("arch"));
    assert_eq!(
        find(&arch, "c.jpg").get("image_description"),
        &text("F-arch;site-3;observer-kl")
    );

    let fauna = ws.store("fauna");
    assert_eq!(fauna.rows.len(), 1);
    assert_eq!(find(&fauna, "b.JPG").get("f"), &text("fauna"));
}

#[test]
fn test_import_converts_coordinates_and_altitude() {
    let ws = Workspace::new();
    ws.add(Photo {
        name: "south.jpg",
        lat: -10.5,
        lon: -20.25,
        alt: Some(123.45),
        description: Some("F-arch"),
    });
    ws.add(Photo {
        name: "flat.jpg",
        lat: 10.5,
        lon: 20.25,
        alt: None,
        description: Some("F-arch"),
    });
    ws.run();

    let arch = ws.store("arch");
    let south = find(&arch, "south.jpg");
    assert_eq!(south.get(LATITUDE), &FieldValue::Real(-10.5));
    assert_eq!(south.get(LONGITUDE), &FieldValue::Real(-20.25));
    match south.get(ALTITUDE) {
        FieldValue::Real(v) => assert!((v - 123.45).abs() < 1e-9),
        other => panic!("unexpected altitude {other:?}"),
    }
    let geom = south.geometry.unwrap();
    assert_eq!((geom.x, geom.y), (-20.25, -10.5));
    assert!(geom.z.is_some());

    let flat = find(&arch, "flat.jpg");
    assert_eq!(flat.get(ALTITUDE), &FieldValue::Null);
    assert_eq!(flat.geometry, Some(Point::new(20.25, 10.5, None)));
    assert_eq!(flat.get("create_date"), &text("2024-03-01T09:15:00"));
    assert_eq!(flat.get("orientation"), &FieldValue::Integer(1));
}

#[test]
fn test_import_skips_photos_without_gps_or_group_key() {
    let ws = Workspace::new();
    ws.add(Photo::new("ok.jpg", "F-arch"));
    ws.add(Photo::new("nokey.jpg", "site-1"));
    fs::write(ws.input.join("noexif.jpg"), jpeg_with_exif(&[])).unwrap();
    fs::write(
        ws.input.join("nogps.jpg"),
        jpeg_with_exif(&[field(Tag::ImageDescription, ascii("F-arch"))]),
    )
    .unwrap();

    let report = ws.run();
    assert_eq!(report.photos_seen, 4);
    assert_eq!(report.records_built, 1);
    let mut skipped: Vec<(String, SkipReason)> = report
        .skipped
        .iter()
        .map(|s| (s.path.file_name().unwrap().to_string_lossy().to_string(), s.reason.clone()))
        .collect();
    skipped.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        skipped,
        vec![
            ("noexif.jpg".to_string(), SkipReason::NoGps),
            ("nogps.jpg".to_string(), SkipReason::NoGps),
            ("nokey.jpg".to_string(), SkipReason::MissingGroupKey),
        ]
    );
    assert_eq!(ws.store("arch").rows.len(), 1);
}

#[test]
fn test_import_empty_directory() {
    let ws = Workspace::new();
    let report = ws.run();
    assert_eq!(report, RunReport::default());
    assert!(!ws.output.exists());
}

#[test]
fn test_import_input_not_found() {
    let ws = Workspace::new();
    let config = ImportConfig::new(ws.input.join("missing"), &ws.output, "F");
    let err = Importer::new(config).unwrap().run(None).unwrap_err();
    assert!(matches!(err, Error::InputNotFound(_)));
}

#[test]
fn test_importer_rejects_invalid_config() {
    let ws = Workspace::new();
    let config = ImportConfig::new(&ws.input, &ws.output, "");
    assert!(matches!(Importer::new(config), Err(Error::InvalidConfig(_))));
}

#[test]
fn test_importer_rejects_group_key_naming_builtin_column() {
    let ws = Workspace::new();
    for key in ["latitude", "Filename", "fid", "geom"] {
        let config = ImportConfig::new(&ws.input, &ws.output, key);
        assert!(matches!(Importer::new(config), Err(Error::InvalidConfig(_))), "{key}");
    }
}

// ── Re-runs: idempotence, upsert, prune ──────────────────────────

#[test]
fn test_rerun_on_unchanged_input_is_idempotent() {
    let ws = Workspace::new();
    ws.add(Photo::new("a.jpg", "F-arch;site-1"));
    ws.add(Photo::new("b.jpg", "F-arch;site-2"));

    ws.run();
    let first = ws.store("arch");
    let report = ws.run();
    let second = ws.store("arch");

    assert_eq!(first, second);
    match &report.group("arch").unwrap().outcome {
        GroupOutcome::Written {
            rows,
            inserted,
            updated,
            pruned,
            ..
        } => assert_eq!((*rows, *inserted, *updated, *pruned), (2, 0, 2, 0)),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn test_rerun_updates_changed_metadata_without_duplicates() {
    let ws = Workspace::new();
    ws.add(Photo::new("a.jpg", "F-arch;site-1"));
    ws.run();

    ws.add(Photo::new("a.jpg", "F-arch;site-9"));
    ws.run();

    let arch = ws.store("arch");
    let rows: Vec<_> = arch.rows.iter().filter(|r| r.identity() == Some("a.jpg")).collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("site"), &text("9"));
}

#[test]
fn test_rerun_prunes_omitted_photos() {
    let ws = Workspace::new();
    for name in ["a.jpg", "b.jpg", "c.jpg"] {
        ws.add(Photo::new(name, "F-arch;site-1"));
    }
    ws.run();
    assert_eq!(ws.store("arch").rows.len(), 3);

    ws.remove("b.jpg");
    ws.remove("c.jpg");
    let report = ws.run();

    let arch = ws.store("arch");
    assert_eq!(arch.rows.len(), 1);
    assert_eq!(arch.rows[0].identity(), Some("a.jpg"));
    match &report.group("arch").unwrap().outcome {
        GroupOutcome::Written { pruned, .. } => assert_eq!(*pruned, 2),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn test_rerun_without_prune_keeps_omitted_photos() {
    let ws = Workspace::new();
    ws.add(Photo::new("a.jpg", "F-arch"));
    ws.add(Photo::new("b.jpg", "F-arch"));
    ws.run();

    ws.remove("b.jpg");
    ws.run_with(ws.config().with_prune(false));

    let arch = ws.store("arch");
    assert_eq!(arch.rows.len(), 2);
}

#[test]
fn test_group_absent_from_batch_is_untouched() {
    let ws = Workspace::new();
    ws.add(Photo::new("a.jpg", "F-arch"));
    ws.add(Photo::new("b.jpg", "F-fauna"));
    ws.run();
    let before = fs::read(ws.store_path("fauna")).unwrap();

    ws.remove("b.jpg");
    let report = ws.run();
    assert!(report.group("fauna").is_none());
    assert_eq!(fs::read(ws.store_path("fauna")).unwrap(), before);
}

// ── Schema reconciliation against existing stores ────────────────

#[test]
fn test_existing_columns_match_case_insensitively() {
    let ws = Workspace::new();
    ws.add(Photo::new("a.jpg", "F-arch;Site-1"));
    ws.run();

    ws.add(Photo::new("a.jpg", "F-arch;SITE-2"));
    let report = ws.run();
    assert!(!report.has_failures());

    let arch = ws.store("arch");
    assert!(column_names(&arch).contains(&"Site"));
    assert!(!column_names(&arch).contains(&"SITE"));
    assert_eq!(find(&arch, "a.jpg").get("Site"), &text("2"));
}

#[test]
fn test_unknown_key_leaves_store_byte_identical() {
    let ws = Workspace::new();
    ws.add(Photo::new("a.jpg", "F-arch;site-1"));
    ws.run();
    let before = fs::read(ws.store_path("arch")).unwrap();

    ws.add(Photo::new("d.jpg", "F-arch;site-2;depth-4"));
    let report = ws.run();

    let group = report.group("arch").unwrap();
    match &group.outcome {
        GroupOutcome::Failed { error } => {
            assert!(error.contains("'depth'"), "{error}");
            assert!(error.contains("arch.gpkg"), "{error}");
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(fs::read(ws.store_path("arch")).unwrap(), before);
}

#[test]
fn test_group_failure_does_not_block_other_groups() {
    let ws = Workspace::new();
    ws.add(Photo::new("a.jpg", "F-arch;site-1"));
    ws.run();

    ws.add(Photo::new("d.jpg", "F-arch;depth-4"));
    ws.add(Photo::new("z.jpg", "F-zoology;depth-4"));
    let report = ws.run();

    assert!(report.has_failures());
    assert_eq!(report.failed().map(|g| g.group.as_str()).collect::<Vec<_>>(), vec!["arch"]);
    assert_eq!(report.succeeded().map(|g| g.group.as_str()).collect::<Vec<_>>(), vec!["zoology"]);
    assert_eq!(ws.store("zoology").rows.len(), 1);
}

#[test]
fn test_case_variant_group_column_is_unified() {
    let ws = Workspace::new();
    let mut old = Row {
        geometry: Some(Point::new(1.0, 2.0, None)),
        ..Default::default()
    };
    old.set(FILENAME, text("old.jpg"));
    old.set("F", text("arch"));
    let seeded = StoreTable {
        columns: vec![
            Column::new(FILENAME, ColumnType::Text),
            Column::new("F", ColumnType::Text),
        ],
        rows: vec![old],
    };
    let path = ws.store_path("arch");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    gpkg::write(&path, &seeded, "arch").unwrap();

    ws.add(Photo::new("new.jpg", "F-arch"));
    let report = ws.run_with(ws.config().with_prune(false));
    assert!(!report.has_failures());

    let arch = ws.store("arch");
    let group_cols: Vec<_> = column_names(&arch)
        .into_iter()
        .filter(|n| n.eq_ignore_ascii_case("f"))
        .collect();
    assert_eq!(group_cols, vec!["f"]);
    assert_eq!(find(&arch, "old.jpg").get("f"), &text("arch"));
    assert_eq!(find(&arch, "new.jpg").get("f"), &text("arch"));
}

#[test]
fn test_failed_write_keeps_previous_store_and_no_temp_file() {
    let ws = Workspace::new();
    let group = "gpkg_contents";
    let mut old = Row {
        geometry: Some(Point::new(1.0, 2.0, None)),
        ..Default::default()
    };
    old.set(FILENAME, text("old.jpg"));
    old.set("f", text(group));
    let seeded = StoreTable {
        columns: vec![
            Column::new(FILENAME, ColumnType::Text),
            Column::new("f", ColumnType::Text),
        ],
        rows: vec![old],
    };
    let path = ws.store_path(group);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    gpkg::write(&path, &seeded, "seed").unwrap();
    let before = fs::read(&path).unwrap();

    ws.add(Photo::new("new.jpg", "F-gpkg_contents"));
    ws.add(Photo::new("other.jpg", "F-arch"));
    let report = ws.run();

    assert!(matches!(
        report.group(group).unwrap().outcome,
        GroupOutcome::Failed { .. }
    ));
    assert_eq!(fs::read(&path).unwrap(), before);
    let names: Vec<String> = fs::read_dir(path.parent().unwrap())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec![format!("{group}.gpkg")]);
    assert_eq!(ws.store("arch").rows.len(), 1);
}

#[test]
fn test_unreadable_store_is_rebuilt() {
    let ws = Workspace::new();
    let path = ws.store_path("arch");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, b"corrupted beyond repair").unwrap();

    ws.add(Photo::new("a.jpg", "F-arch;site-1"));
    let report = ws.run();
    assert!(!report.has_failures());
    assert_eq!(ws.store("arch").rows.len(), 1);
}

// ── Allow-list ───────────────────────────────────────────────────

#[test]
fn test_allow_list_violation_aborts_before_any_write() {
    let ws = Workspace::new();
    ws.add(Photo::new("a.jpg", "F-arch"));
    ws.add(Photo::new("b.jpg", "F-debris"));

    let config = ws.config().with_allowed_groups(vec!["arch".to_string()]);
    let err = Importer::new(config).unwrap().run(None).unwrap_err();
    match err {
        Error::GroupNotAllowed { value, photo, .. } => {
            assert_eq!(value, "debris");
            assert_eq!(photo.file_name().unwrap(), "b.jpg");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!ws.output.exists());
}

#[test]
fn test_allow_list_accepts_listed_values() {
    let ws = Workspace::new();
    ws.add(Photo::new("a.jpg", "F-arch"));
    let config = ws
        .config()
        .with_allowed_groups(vec!["arch".to_string(), "fauna".to_string()]);
    let report = ws.run_with(config);
    assert_eq!(report.succeeded().count(), 1);
}

// ── Progress callbacks ───────────────────────────────────────────

#[test]
fn test_progress_callbacks() {
    let ws = Workspace::new();
    ws.add(Photo::new("a.jpg", "F-arch"));
    ws.add(Photo::new("b.jpg", "site-1"));

    let mut file_count = 0;
    let mut read = 0;
    let mut skipped = 0;
    let mut written = Vec::new();
    Importer::new(ws.config())
        .unwrap()
        .run(Some(&mut |p| match p {
            ImportProgress::ScanComplete { file_count: n } => file_count = n,
            ImportProgress::PhotoRead { .. } => read += 1,
            ImportProgress::PhotoSkipped { .. } => skipped += 1,
            ImportProgress::GroupWritten { group, rows, .. } => written.push((group, rows)),
            ImportProgress::GroupStart { .. } | ImportProgress::GroupFailed { .. } => {}
        }))
        .unwrap();

    assert_eq!(file_count, 2);
    assert_eq!(read, 2);
    assert_eq!(skipped, 1);
    assert_eq!(written, vec![("arch".to_string(), 1)]);
}
