//! BOM and placement tables.
//!
//! Building a [`Table`] is pure. Writing goes to any `std::io::Write`; only
//! [`write_report`] touches the filesystem, and it stages both files before
//! either one becomes visible.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::bom::BomGroup;
use crate::core::{BomError, BomOptions, BomReport, GeneratedFiles};
use crate::geometry;
use crate::parser::pcb_schema::{Footprint, Side};

pub const BOM_COLUMNS: [&str; 4] = ["Reference(s)", "Value", "Package", "Quantity"];
pub const PLACEMENT_COLUMNS: [&str; 7] =
    ["Reference", "Value", "Package", "PosX", "PosY", "Rotation", "Side"];

pub const JLCPCB_BOM_COLUMNS: [&str; 4] = ["Comment", "Designator", "Footprint", "LCSC Part #"];
pub const JLCPCB_CPL_COLUMNS: [&str; 5] = ["Designator", "Mid X", "Mid Y", "Layer", "Rotation"];

/// Table layout and file naming
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `Reference(s),Value,Package,Quantity` and a KiCad-style placement file
    #[default]
    Generic,
    /// JLCPCB assembly `BOM.csv` and `CPL.csv`
    Jlcpcb,
}

impl OutputFormat {
    pub fn bom_file_name(&self) -> &'static str {
        match self {
            OutputFormat::Generic => "bom.csv",
            OutputFormat::Jlcpcb => "BOM.csv",
        }
    }

    pub fn placement_file_name(&self) -> &'static str {
        match self {
            OutputFormat::Generic => "placement.csv",
            OutputFormat::Jlcpcb => "CPL.csv",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delimiter {
    #[default]
    Comma,
    Tab,
    Semicolon,
}

impl Delimiter {
    pub fn as_byte(&self) -> u8 {
        match self {
            Delimiter::Comma => b',',
            Delimiter::Tab => b'\t',
            Delimiter::Semicolon => b';',
        }
    }
}

/// Ordered rows under named columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<S: AsRef<str>>(columns: &[S]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.as_ref().to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index).map(String::as_str)
    }

    /// Header line then one line per row; fields are quoted only when needed.
    pub fn write_delimited<W: Write>(&self, sink: W, delimiter: Delimiter) -> Result<(), BomError> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter.as_byte())
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(sink);
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn to_bytes(&self, delimiter: Delimiter) -> Result<Vec<u8>, BomError> {
        let mut buffer = Vec::new();
        self.write_delimited(&mut buffer, delimiter)?;
        Ok(buffer)
    }
}

/// Four decimals, never `-0.0000`.
fn fixed(value: f64) -> String {
    let rounded = (value * 10_000.0).round() / 10_000.0 + 0.0;
    format!("{:.4}", rounded)
}

pub fn bom_table(groups: &[BomGroup], options: &BomOptions) -> Table {
    match options.format {
        OutputFormat::Generic => generic_bom_table(groups, options),
        OutputFormat::Jlcpcb => jlcpcb_bom_table(groups, options),
    }
}

fn generic_bom_table(groups: &[BomGroup], options: &BomOptions) -> Table {
    let extra: Vec<&String> = options
        .extra_columns
        .iter()
        .filter(|c| !options.identity_fields.contains(*c))
        .collect();

    let mut columns: Vec<&str> = BOM_COLUMNS.to_vec();
    columns.extend(options.identity_fields.iter().map(String::as_str));
    columns.extend(extra.iter().map(|c| c.as_str()));
    let mut table = Table::new(&columns);

    for group in groups {
        let mut row = vec![
            group.references_joined(),
            group.value().to_string(),
            group.package().to_string(),
            group.quantity().to_string(),
        ];
        row.extend(group.key.fields.iter().cloned());
        row.extend(extra.iter().map(|c| group.display_field(c).to_string()));
        table.push_row(row);
    }
    table
}

fn jlcpcb_bom_table(groups: &[BomGroup], options: &BomOptions) -> Table {
    let mut table = Table::new(&JLCPCB_BOM_COLUMNS);
    for group in groups {
        let lcsc = match options.identity_fields.iter().position(|f| *f == options.lcsc_field) {
            Some(i) => group.key.fields[i].clone(),
            None => group.display_field(&options.lcsc_field).to_string(),
        };
        table.push_row(vec![
            group.value().to_string(),
            group.references_joined(),
            group.package().to_string(),
            lcsc,
        ]);
    }
    table
}

pub fn placement_table(footprints: &[Footprint], options: &BomOptions) -> Table {
    let columns: &[&str] = match options.format {
        OutputFormat::Generic => &PLACEMENT_COLUMNS,
        OutputFormat::Jlcpcb => &JLCPCB_CPL_COLUMNS,
    };
    let mut table = Table::new(columns);

    for fp in footprints.iter().filter(|fp| fp.in_placement(options.exclude_dnp)) {
        let placement = fp.placement.unwrap_or_else(|| geometry::resolve_footprint(fp));
        let row = match options.format {
            OutputFormat::Generic => vec![
                fp.reference.clone(),
                fp.value.clone(),
                fp.package.clone(),
                fixed(placement.x),
                fixed(placement.y),
                fixed(placement.rotation),
                placement.side.to_string(),
            ],
            // JLCPCB measures Y upward
            OutputFormat::Jlcpcb => vec![
                fp.reference.clone(),
                format!("{}mm", fixed(placement.x)),
                format!("{}mm", fixed(0.0 - placement.y)),
                match placement.side {
                    Side::Top => "Top".to_string(),
                    Side::Bottom => "Bottom".to_string(),
                },
                fixed(placement.rotation),
            ],
        };
        table.push_row(row);
    }
    table
}

fn stage(dir: &Path, contents: &[u8]) -> Result<NamedTempFile, BomError> {
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    Ok(file)
}

/// Write both tables of `report` into `dir` under the format's file names.
pub fn write_report(report: &BomReport, dir: &Path) -> Result<GeneratedFiles, BomError> {
    let options = &report.options;
    let bom = report.bom_table().to_bytes(options.delimiter)?;
    let placement = report.placement_table().to_bytes(options.delimiter)?;
    write_output_pair(
        dir,
        (options.format.bom_file_name(), bom.as_slice()),
        (options.format.placement_file_name(), placement.as_slice()),
    )
}

/// Stage both files as temporaries in `dir`, then move them into place.
/// Either both destinations hold the new contents afterwards or both are as
/// they were before the call.
pub fn write_output_pair(
    dir: &Path,
    bom: (&str, &[u8]),
    placement: (&str, &[u8]),
) -> Result<GeneratedFiles, BomError> {
    let files = GeneratedFiles {
        bom: dir.join(bom.0),
        placement: dir.join(placement.0),
    };
    check_replaceable(&files.bom)?;
    check_replaceable(&files.placement)?;

    let bom_file = stage(dir, bom.1)?;
    let placement_file = stage(dir, placement.1)?;
    persist_pair(dir, bom_file, placement_file, &files)?;

    tracing::info!(
        "Wrote {} and {}",
        files.bom.display(),
        files.placement.display()
    );
    Ok(files)
}

/// A destination must be absent or a plain file.
fn check_replaceable(path: &Path) -> Result<(), BomError> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => Err(BomError::Io(io::Error::new(
            io::ErrorKind::Other,
            format!("{} is a directory", path.display()),
        ))),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Move both staged files into place. The previous BOM file is copied aside
/// first and put back if the placement file cannot be moved.
fn persist_pair(
    dir: &Path,
    bom_file: NamedTempFile,
    placement_file: NamedTempFile,
    files: &GeneratedFiles,
) -> Result<(), BomError> {
    let backup = if files.bom.exists() {
        let backup = NamedTempFile::new_in(dir)?.into_temp_path();
        fs::copy(&files.bom, &backup)?;
        Some(backup)
    } else {
        None
    };

    bom_file.persist(&files.bom).map_err(|e| BomError::Io(e.error))?;
    if let Err(e) = placement_file.persist(&files.placement) {
        let restored = match backup {
            Some(backup) => backup.persist(&files.bom).map_err(|e| e.error),
            None => fs::remove_file(&files.bom),
        };
        if let Err(cleanup) = restored {
            tracing::error!("Could not restore {}: {}", files.bom.display(), cleanup);
        }
        return Err(BomError::Io(e.error));
    }
    Ok(())
}
