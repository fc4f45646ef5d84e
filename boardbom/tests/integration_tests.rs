//! Integration tests for the BoardBOM pipeline

use boardbom::prelude::*;
use boardbom::source::ZipSource;
use std::fs;
use std::io::{Cursor, Write};
use std::path::PathBuf;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn read_fixture(name: &str) -> String {
    fs::read_to_string(fixture_path(name)).unwrap()
}

fn zip_with(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in files {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

#[test]
fn test_identical_resistors_share_a_line() {
    let text = r#"(kicad_pcb
      (footprint "0402" (at 1 1) (property "Reference" "R1") (property "Value" "10k"))
      (footprint "0402" (at 2 1) (property "Reference" "R2") (property "Value" "10k")))"#;
    let report = BoardBom::process_text(text, "a.kicad_pcb", &BomOptions::default()).unwrap();

    let bom = report.bom_table();
    assert_eq!(bom.rows, vec![vec!["R1,R2", "10k", "0402", "2"]]);
}

#[test]
fn test_excluded_footprint_still_placed() {
    let text = r#"(kicad_pcb
      (footprint "TestPoint:TP" (at 5 5) (property "Reference" "TP1") (property "Value" "TP")
        (attr exclude_from_bom)))"#;
    let report = BoardBom::process_text(text, "a.kicad_pcb", &BomOptions::default()).unwrap();

    assert!(report.bom_table().rows.is_empty());
    assert_eq!(report.placement_table().rows.len(), 1);
}

#[test]
fn test_malformed_board_writes_nothing() {
    let out = tempfile::tempdir().unwrap();
    let err = BoardBom::generate(
        &fixture_path("malformed.kicad_pcb"),
        None,
        out.path(),
        &BomOptions::default(),
    )
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MalformedSyntax);
    assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
}

#[test]
fn test_duplicate_reference() {
    let err = BoardBom::process_path(
        &fixture_path("duplicate_reference.kicad_pcb"),
        None,
        &BomOptions::default(),
    )
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DuplicateReference);
    match err {
        BomError::DuplicateReference { reference, first, second } => {
            assert_eq!(reference, "R1");
            assert_eq!(first.line, 3);
            assert_eq!(second.line, 9);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_missing_position() {
    let err = BoardBom::process_path(
        &fixture_path("missing_position.kicad_pcb"),
        None,
        &BomOptions::default(),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingRequiredField);
    assert!(err.to_string().contains("line 3"), "{err}");
}

#[test]
fn test_generate_sensor_board() {
    let out = tempfile::tempdir().unwrap();
    let files = BoardBom::generate(
        &fixture_path("sensor_board.kicad_pcb"),
        None,
        out.path(),
        &BomOptions::default(),
    )
    .unwrap();

    assert_eq!(files.bom, out.path().join("bom.csv"));
    assert_eq!(
        fs::read_to_string(&files.bom).unwrap(),
        "Reference(s),Value,Package,Quantity\n\
         \"R1,R2,R5,R10\",10k,R_0402_1005Metric,4\n\
         C1,\"100n, 16V\",C_0603_1608Metric,1\n\
         U1,LM358,SOIC-8_3.9x4.9mm_P1.27mm,1\n"
    );
    assert_eq!(
        fs::read_to_string(&files.placement).unwrap(),
        "Reference,Value,Package,PosX,PosY,Rotation,Side\n\
         R10,10k,R_0402_1005Metric,100.5000,50.2500,90.0000,top\n\
         R2,10k,R_0402_1005Metric,102.5000,50.2500,270.0000,top\n\
         C1,\"100n, 16V\",C_0603_1608Metric,110.0000,60.1250,180.0000,bottom\n\
         R1,10k,R_0402_1005Metric,104.5000,50.2500,0.0000,top\n\
         U1,LM358,SOIC-8_3.9x4.9mm_P1.27mm,120.0000,45.0000,270.0000,top\n\
         R5,10k,R_0402_1005Metric,106.5000,50.2500,0.0000,top\n\
         TP1,TestPoint,TestPoint_Pad_D1.0mm,95.2500,40.0000,0.0000,top\n"
    );
}

#[test]
fn test_generate_is_idempotent() {
    let out = tempfile::tempdir().unwrap();
    let input = fixture_path("sensor_board.kicad_pcb");
    let options = BomOptions::default();

    let first = BoardBom::generate(&input, None, out.path(), &options).unwrap();
    let bom = fs::read(&first.bom).unwrap();
    let placement = fs::read(&first.placement).unwrap();

    let second = BoardBom::generate(&input, None, out.path(), &options).unwrap();
    assert_eq!(fs::read(&second.bom).unwrap(), bom);
    assert_eq!(fs::read(&second.placement).unwrap(), placement);
    assert_eq!(fs::read_dir(out.path()).unwrap().count(), 2);
}

#[test]
fn test_exclude_dnp() {
    let options = BomOptions {
        exclude_dnp: true,
        ..Default::default()
    };
    let report =
        BoardBom::process_path(&fixture_path("sensor_board.kicad_pcb"), None, &options).unwrap();

    assert_eq!(report.groups[0].references_joined(), "R1,R2,R10");
    assert_eq!(report.total_quantity(), 5);
    assert_eq!(report.placed_count(), 6);
}

#[test]
fn test_identity_fields_and_extra_columns() {
    let options = BomOptions {
        identity_fields: vec!["MPN".to_string()],
        extra_columns: vec!["LCSC".to_string()],
        ..Default::default()
    };
    let report =
        BoardBom::process_path(&fixture_path("sensor_board.kicad_pcb"), None, &options).unwrap();
    let bom = report.bom_table();

    assert_eq!(
        bom.columns,
        vec!["Reference(s)", "Value", "Package", "Quantity", "MPN", "LCSC"]
    );
    assert_eq!(bom.cell(0, "LCSC"), Some("C25744"));
    assert_eq!(bom.cell(2, "MPN"), Some("LM358DR"));
    assert_eq!(bom.cell(1, "LCSC"), Some(""));
}

#[test]
fn test_jlcpcb_output() {
    let out = tempfile::tempdir().unwrap();
    let options = BomOptions {
        format: OutputFormat::Jlcpcb,
        ..Default::default()
    };
    let files = BoardBom::generate(
        &fixture_path("sensor_board.kicad_pcb"),
        None,
        out.path(),
        &options,
    )
    .unwrap();

    assert_eq!(files.bom, out.path().join("BOM.csv"));
    assert_eq!(files.placement, out.path().join("CPL.csv"));

    let bom = fs::read_to_string(&files.bom).unwrap();
    assert!(bom.starts_with("Comment,Designator,Footprint,LCSC Part #\n"));
    assert!(bom.contains("10k,\"R1,R2,R5,R10\",R_0402_1005Metric,C25744\n"));
    assert!(bom.contains("LM358,U1,SOIC-8_3.9x4.9mm_P1.27mm,C7950\n"));

    let cpl = fs::read_to_string(&files.placement).unwrap();
    assert!(cpl.starts_with("Designator,Mid X,Mid Y,Layer,Rotation\n"));
    assert!(cpl.contains("C1,110.0000mm,-60.1250mm,Bottom,180.0000\n"));
}

#[test]
fn test_semicolon_delimiter() {
    let options = BomOptions {
        delimiter: Delimiter::Semicolon,
        ..Default::default()
    };
    let report =
        BoardBom::process_path(&fixture_path("sensor_board.kicad_pcb"), None, &options).unwrap();
    let bytes = report.bom_table().to_bytes(options.delimiter).unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.contains("R1,R2,R5,R10;10k;R_0402_1005Metric;4\n"), "{text}");
}

#[test]
fn test_legacy_board_matches_modern_layout() {
    let report = BoardBom::process_path(
        &fixture_path("legacy_kicad5.kicad_pcb"),
        None,
        &BomOptions::default(),
    )
    .unwrap();

    let refs: Vec<String> = report.groups.iter().map(|g| g.references_joined()).collect();
    assert_eq!(refs, vec!["R1", "D1", "J1"]);
    assert_eq!(report.groups[0].value(), "330");

    let placement = report.placement_table();
    assert_eq!(
        placement.rows[1],
        vec!["D1", "RED", "LED_0603_1608Metric", "125.7300", "80.0100", "270.0000", "bottom"]
    );
}

#[test]
fn test_zip_archive_input() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("project.zip");
    fs::write(
        &archive,
        zip_with(&[
            ("sensor/sensor_board.kicad_pro", "{}"),
            ("sensor/sensor_board.kicad_pcb", &read_fixture("sensor_board.kicad_pcb")),
            ("sensor/sensor_board-backups/old.kicad_pcb", "(kicad_pcb"),
        ]),
    )
    .unwrap();

    let from_zip = BoardBom::process_path(&archive, None, &BomOptions::default()).unwrap();
    let from_file = BoardBom::process_path(
        &fixture_path("sensor_board.kicad_pcb"),
        None,
        &BomOptions::default(),
    )
    .unwrap();

    assert_eq!(from_zip.source, "sensor/sensor_board.kicad_pcb");
    assert_eq!(from_zip.bom_table(), from_file.bom_table());
    assert_eq!(from_zip.placement_table(), from_file.placement_table());
}

#[test]
fn test_zip_missing_entry() {
    let bytes = zip_with(&[("readme.txt", "hello")]);
    let mut source = ZipSource::new(Cursor::new(bytes)).unwrap();

    let err = BoardBom::process_source(&mut source, None, &BomOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArchiveEntryNotFound);

    let err = BoardBom::process_source(&mut source, Some("board.kicad_pcb"), &BomOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArchiveEntryNotFound);
}

#[test]
fn test_directory_input() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("hw")).unwrap();
    fs::write(
        dir.path().join("hw/sensor_board.kicad_pcb"),
        read_fixture("sensor_board.kicad_pcb"),
    )
    .unwrap();

    let report = BoardBom::process_path(dir.path(), None, &BomOptions::default()).unwrap();
    assert_eq!(report.source, "hw/sensor_board.kicad_pcb");
    assert_eq!(report.board.title_block.title.as_deref(), Some("Sensor Board"));
}

#[test]
fn test_loose_file_read_whatever_its_name() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["board.pcb", "_autosave-sensor_board.kicad_pcb", "sensor_board.kicad_pcb.bak"] {
        let path = dir.path().join(name);
        fs::write(&path, read_fixture("sensor_board.kicad_pcb")).unwrap();

        let report = BoardBom::process_path(&path, None, &BomOptions::default()).unwrap();
        assert_eq!(report.source, name);
        assert_eq!(report.board.footprints.len(), 8);
    }
}

#[test]
fn test_reordered_footprints_give_same_lines() {
    let options = BomOptions::default();
    let mut board = boardbom::parse_board(&fixture_path("sensor_board.kicad_pcb")).unwrap();
    let forward = boardbom::bom::aggregate(&board.footprints, &options);
    board.footprints.reverse();
    let backward = boardbom::bom::aggregate(&board.footprints, &options);

    let lines = |groups: &[BomGroup]| {
        let mut lines: Vec<(String, usize)> = groups
            .iter()
            .map(|g| (g.references_joined(), g.quantity()))
            .collect();
        lines.sort();
        lines
    };
    assert_eq!(lines(&forward), lines(&backward));
}
