//! Board Schema Definitions
//!
//! Data structures for the parts of a KiCad PCB (.kicad_pcb) that matter for
//! a BOM and a placement file: footprints, their fields and attributes, and a
//! little board metadata.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::parser::sexp::Position;

/// A parsed board
#[derive(Debug, Clone, Serialize, Default)]
pub struct Board {
    pub version: Option<String>,
    pub generator: Option<String>,
    pub thickness: Option<f64>, // mm
    pub title_block: TitleBlock,
    /// Footprints in file order
    pub footprints: Vec<Footprint>,
}

impl Board {
    pub fn footprint(&self, reference: &str) -> Option<&Footprint> {
        self.footprints.iter().find(|fp| fp.reference == reference)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TitleBlock {
    pub title: Option<String>,
    pub date: Option<String>,
    pub revision: Option<String>,
    pub company: Option<String>,
}

/// 2D point in board millimetres
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Board face a footprint is mounted on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[default]
    Top,
    Bottom,
}

impl Side {
    /// `B.Cu`, `B.SilkS`, ... are the back of the board; everything else,
    /// including an unknown layer, is the front.
    pub fn from_layer(layer: &str) -> Self {
        if layer.starts_with("B.") {
            Side::Bottom
        } else {
            Side::Top
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Top => "top",
            Side::Bottom => "bottom",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flags from the footprint's `(attr ...)` block
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FootprintAttributes {
    pub smd: bool,
    pub through_hole: bool,
    pub board_only: bool,
    pub exclude_from_pos_files: bool,
    pub exclude_from_bom: bool,
    pub dnp: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PadType {
    ThruHole,
    Smd,
    Connect,
    NpThruHole,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pad {
    pub number: String,
    pub pad_type: PadType,
    /// Relative to the footprint origin
    pub position: Point,
    pub layers: Vec<String>,
}

/// Absolute placement of a footprint, normalized for output
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    /// Degrees in `[0, 360)`
    pub rotation: f64,
    pub side: Side,
}

/// One placed component
#[derive(Debug, Clone, Serialize)]
pub struct Footprint {
    /// Full library identifier, e.g. `Resistor_SMD:R_0603_1608Metric`
    pub lib_id: String,
    /// Footprint name without the library nickname
    pub package: String,
    pub reference: String,
    pub value: String,
    /// Every other property, keyed by property name
    pub fields: BTreeMap<String, String>,
    pub position: Point,
    pub rotation: f64,
    pub layer: String,
    pub side: Side,
    pub attributes: FootprintAttributes,
    pub pads: Vec<Pad>,
    /// Where the footprint block starts in the source
    pub location: Position,
    pub placement: Option<Placement>,
}

impl Footprint {
    pub fn new(reference: &str, value: &str, lib_id: &str, position: Point) -> Self {
        Self {
            lib_id: lib_id.to_string(),
            package: package_name(lib_id).to_string(),
            reference: reference.to_string(),
            value: value.to_string(),
            fields: BTreeMap::new(),
            position,
            rotation: 0.0,
            layer: "F.Cu".to_string(),
            side: Side::Top,
            attributes: FootprintAttributes::default(),
            pads: Vec::new(),
            location: Position::default(),
            placement: None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn in_bom(&self, exclude_dnp: bool) -> bool {
        !self.attributes.exclude_from_bom && !(exclude_dnp && self.attributes.dnp)
    }

    pub fn in_placement(&self, exclude_dnp: bool) -> bool {
        !self.attributes.exclude_from_pos_files && !(exclude_dnp && self.attributes.dnp)
    }
}

/// Strip the `nickname:` library prefix from a footprint identifier.
pub fn package_name(lib_id: &str) -> &str {
    match lib_id.split_once(':') {
        Some((_, name)) => name,
        None => lib_id,
    }
}
