//! BoardBOM - bill of materials and placement files from KiCad boards
//!
//! This library reads a KiCad `.kicad_pcb` board (loose, in a project
//! directory or inside a zip archive), groups identical parts into BOM lines
//! and writes a BOM table plus a pick-and-place table.
//!
//! # Quick Start
//!
//! ```no_run
//! use boardbom::{BoardBom, BomOptions};
//! use std::path::Path;
//!
//! let options = BomOptions::default();
//! let report = BoardBom::process_path(Path::new("board.kicad_pcb"), None, &options).unwrap();
//!
//! for group in &report.groups {
//!     println!("{} x{} {}", group.value(), group.quantity(), group.references_joined());
//! }
//! ```
//!
//! # Features
//!
//! - **Parsing**: KiCad 5 through 9 boards, positions on every error
//! - **Grouping**: by value, package and configurable fields, natural designator order
//! - **Output**: generic or JLCPCB tables, written as a pair or not at all

pub mod bom;
pub mod core;
pub mod geometry;
pub mod output;
pub mod parser;
pub mod source;

// Re-export main types
pub use crate::bom::{BomGroup, IdentityKey};
pub use crate::core::{BoardBom, BomError, BomOptions, BomReport, ErrorKind, GeneratedFiles};
pub use crate::output::{Delimiter, OutputFormat, Table};
pub use crate::parser::pcb::PcbParser;
pub use crate::parser::pcb_schema::{Board, Footprint, Side};
pub use crate::source::{open_source, BoardSource};

/// Parse a board file without grouping (convenience wrapper).
pub fn parse_board(path: &std::path::Path) -> Result<Board, BomError> {
    let bytes = std::fs::read(path)?;
    let mut board = PcbParser::parse_board_str(crate::core::decode_board_text(&bytes)?)?;
    geometry::resolve(&mut board.footprints);
    Ok(board)
}

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        BoardBom, BomError, BomGroup, BomOptions, BomReport, Delimiter, ErrorKind, OutputFormat,
    };
}
