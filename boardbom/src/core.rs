//! Core pipeline shared by the CLI and library users.
//! Source bytes in, BOM and placement tables out; no global state.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::bom::{self, BomGroup};
use crate::geometry;
use crate::output::{self, Delimiter, OutputFormat, Table};
use crate::parser::pcb::PcbParser;
use crate::parser::pcb_schema::Board;
use crate::parser::sexp::{ParseError, ParseErrorKind, Position};
use crate::source::{self, BoardSource};

#[derive(Debug, thiserror::Error)]
pub enum BomError {
    #[error("Malformed board syntax: {0}")]
    MalformedSyntax(#[from] ParseError),
    #[error("Footprint at {position} is missing its {field}")]
    MissingRequiredField { field: String, position: Position },
    #[error("Duplicate reference {reference}: first at {first}, again at {second}")]
    DuplicateReference {
        reference: String,
        first: Position,
        second: Position,
    },
    #[error("Entry not found in source: {0}")]
    ArchiveEntryNotFound(String),
    #[error("Several board files found, pick one with --entry: {}", .0.join(", "))]
    AmbiguousBoardEntry(Vec<String>),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("Table write error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Coarse classification of [`BomError`] for callers that only need to know
/// what went wrong, not the details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedSyntax,
    MissingRequiredField,
    DuplicateReference,
    ArchiveEntryNotFound,
    IoFailure,
    InvalidConfig,
}

impl BomError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BomError::MalformedSyntax(_) => ErrorKind::MalformedSyntax,
            BomError::MissingRequiredField { .. } => ErrorKind::MissingRequiredField,
            BomError::DuplicateReference { .. } => ErrorKind::DuplicateReference,
            BomError::ArchiveEntryNotFound(_) | BomError::AmbiguousBoardEntry(_) => {
                ErrorKind::ArchiveEntryNotFound
            }
            BomError::Io(_) | BomError::Archive(_) | BomError::Csv(_) => ErrorKind::IoFailure,
            BomError::Config(_) => ErrorKind::InvalidConfig,
        }
    }
}

/// Options for a BOM run (CLI flags or a JSON config file).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BomOptions {
    /// Fields that, next to value and package, decide whether two
    /// footprints are the same BOM line
    pub identity_fields: Vec<String>,
    /// Display-only BOM columns, filled from the first member of each line
    pub extra_columns: Vec<String>,
    /// Treat do-not-populate footprints as excluded from both tables
    pub exclude_dnp: bool,
    pub format: OutputFormat,
    pub delimiter: Delimiter,
    /// Field holding the LCSC part number (jlcpcb format)
    pub lcsc_field: String,
}

impl Default for BomOptions {
    fn default() -> Self {
        Self {
            identity_fields: vec![],
            extra_columns: vec![],
            exclude_dnp: false,
            format: OutputFormat::Generic,
            delimiter: Delimiter::Comma,
            lcsc_field: "LCSC".to_string(),
        }
    }
}

impl BomOptions {
    pub fn from_json_str(content: &str) -> Result<Self, BomError> {
        serde_json::from_str(content).map_err(|e| BomError::Config(e.to_string()))
    }

    pub fn from_json_file(path: &Path) -> Result<Self, BomError> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| BomError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Field values each BOM line carries for display: extra columns, then
    /// the LCSC field when the format needs it.
    pub fn display_fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = self.extra_columns.iter().map(String::as_str).collect();
        if self.format == OutputFormat::Jlcpcb && !fields.contains(&self.lcsc_field.as_str()) {
            fields.push(&self.lcsc_field);
        }
        fields
    }
}

/// Result of processing one board.
#[derive(Debug, Clone)]
pub struct BomReport {
    /// Name of the entry the board was read from
    pub source: String,
    pub board: Board,
    pub groups: Vec<BomGroup>,
    pub options: BomOptions,
}

impl BomReport {
    pub fn bom_table(&self) -> Table {
        output::bom_table(&self.groups, &self.options)
    }

    pub fn placement_table(&self) -> Table {
        output::placement_table(&self.board.footprints, &self.options)
    }

    /// Sum of quantities over all BOM lines.
    pub fn total_quantity(&self) -> usize {
        bom::total_quantity(&self.groups)
    }

    /// Number of footprints that go into the placement table.
    pub fn placed_count(&self) -> usize {
        self.board
            .footprints
            .iter()
            .filter(|fp| fp.in_placement(self.options.exclude_dnp))
            .count()
    }
}

/// Paths written by [`BoardBom::generate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFiles {
    pub bom: PathBuf,
    pub placement: PathBuf,
}

/// Decode board bytes; a bad byte is reported like any other syntax error.
pub(crate) fn decode_board_text(bytes: &[u8]) -> Result<&str, BomError> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(text.strip_prefix('\u{feff}').unwrap_or(text)),
        Err(e) => {
            let valid = &bytes[..e.valid_up_to()];
            let line = valid.iter().filter(|&&b| b == b'\n').count() + 1;
            let line_start = valid.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1);
            let column = String::from_utf8_lossy(&valid[line_start..]).chars().count() + 1;
            Err(ParseError::new(
                ParseErrorKind::InvalidUtf8,
                Position {
                    line,
                    column,
                    offset: e.valid_up_to(),
                },
            )
            .into())
        }
    }
}

/// Core BOM API used by the CLI.
pub struct BoardBom;

impl BoardBom {
    /// Build, resolve and aggregate a board held in memory.
    pub fn process_text(
        text: &str,
        source: &str,
        options: &BomOptions,
    ) -> Result<BomReport, BomError> {
        let mut board = PcbParser::parse_board_str(text)?;
        geometry::resolve(&mut board.footprints);
        let groups = bom::aggregate(&board.footprints, options);

        tracing::info!(
            "{}: {} footprints, {} BOM lines",
            source,
            board.footprints.len(),
            groups.len()
        );
        Ok(BomReport {
            source: source.to_string(),
            board,
            groups,
            options: options.clone(),
        })
    }

    pub fn process_bytes(
        bytes: &[u8],
        source: &str,
        options: &BomOptions,
    ) -> Result<BomReport, BomError> {
        let text = decode_board_text(bytes)?;
        Self::process_text(text, source, options)
    }

    /// Select the board entry of `source` (or use `entry`), read and process it.
    pub fn process_source(
        source: &mut dyn BoardSource,
        entry: Option<&str>,
        options: &BomOptions,
    ) -> Result<BomReport, BomError> {
        let name = match (entry, source.default_entry()) {
            (None, Some(name)) => name,
            _ => source::select_board_entry(&source.list_entries()?, entry)?,
        };
        tracing::debug!("Reading board entry {}", name);
        let bytes = source.read_entry(&name)?;
        Self::process_bytes(&bytes, &name, options)
    }

    /// Process a loose board file, a project directory or a zip archive.
    pub fn process_path(
        path: &Path,
        entry: Option<&str>,
        options: &BomOptions,
    ) -> Result<BomReport, BomError> {
        let mut source = source::open_source(path)?;
        Self::process_source(source.as_mut(), entry, options)
    }

    /// Process `input` and write both tables into `out_dir`. Either both
    /// files are written or neither is.
    pub fn generate(
        input: &Path,
        entry: Option<&str>,
        out_dir: &Path,
        options: &BomOptions,
    ) -> Result<GeneratedFiles, BomError> {
        let report = Self::process_path(input, entry, options)?;
        fs::create_dir_all(out_dir)?;
        output::write_report(&report, out_dir)
    }
}
