//! KiCad PCB Board Builder
//!
//! Turns the generic S-expression tree of a `.kicad_pcb` file into [`Board`]
//! and its [`Footprint`]s.
//!
//! Key format details:
//! - All values are in millimetres, Y grows downward
//! - KiCad 6+ writes `(footprint ...)` blocks with `(property "Reference" ..)`
//!   and `(property "Value" ..)`; KiCad 5 writes `(module ...)` blocks with
//!   `(fp_text reference ..)` and `(fp_text value ..)`. Both are accepted.
//! - `(at x y angle)` on a footprint is already in board coordinates
//! - Unknown sub-blocks are ignored

use std::collections::{BTreeMap, HashMap};

use crate::core::BomError;
use crate::parser::pcb_schema::*;
use crate::parser::sexp::{Position, SExp, SExpParser};

/// Tags that open a footprint block: `footprint` since KiCad 6, `module` before.
const FOOTPRINT_TAGS: [&str; 2] = ["footprint", "module"];

/// Builder for KiCad PCB boards
pub struct PcbParser;

impl PcbParser {
    /// Parse board text and build the model.
    pub fn parse_board_str(content: &str) -> Result<Board, BomError> {
        let root = SExpParser::new(content).parse()?;
        Self::build_board(&root)
    }

    /// Build the model from an already parsed tree.
    pub fn build_board(root: &SExp) -> Result<Board, BomError> {
        match root.tag() {
            Some("kicad_pcb") => {}
            other => tracing::warn!(
                "Expected a kicad_pcb root, found {:?}; scanning for footprints anyway",
                other
            ),
        }

        let mut blocks = Vec::new();
        Self::collect_footprint_blocks(root, &mut blocks);

        let footprints = blocks
            .into_iter()
            .map(Self::parse_footprint)
            .collect::<Result<Vec<_>, _>>()?;
        Self::check_unique_references(&footprints)?;

        let board = Board {
            version: root.value_of("version").map(str::to_string),
            generator: root.value_of("generator").map(str::to_string),
            thickness: root
                .get("general")
                .and_then(|general| general.get("thickness"))
                .and_then(|t| t.as_list())
                .and_then(|l| l.get(1))
                .and_then(SExp::as_number),
            title_block: Self::parse_title_block(root),
            footprints,
        };

        tracing::debug!(
            "Built board (version {:?}) with {} footprints",
            board.version,
            board.footprints.len()
        );
        Ok(board)
    }

    /// Depth-first search for footprint blocks, starting at `node` itself.
    /// Footprint blocks are not searched further.
    fn collect_footprint_blocks<'a>(node: &'a SExp, out: &mut Vec<&'a SExp>) {
        if node.tag().is_some_and(|tag| FOOTPRINT_TAGS.contains(&tag)) {
            out.push(node);
            return;
        }
        if let Some(items) = node.as_list() {
            for item in items {
                if item.as_list().is_some() {
                    Self::collect_footprint_blocks(item, out);
                }
            }
        }
    }

    fn parse_title_block(root: &SExp) -> TitleBlock {
        let Some(block) = root.get("title_block") else {
            return TitleBlock::default();
        };
        let text = |key: &str| block.value_of(key).map(str::to_string);
        TitleBlock {
            title: text("title"),
            date: text("date"),
            revision: text("rev"),
            company: text("company"),
        }
    }

    fn parse_footprint(sexp: &SExp) -> Result<Footprint, BomError> {
        let location = sexp.position().unwrap_or_default();
        let items = sexp.as_list().unwrap_or_default();

        // Library id is the second element
        let lib_id = items.get(1).and_then(SExp::as_atom).unwrap_or("").to_string();

        let mut at = None;
        let mut layer = None;
        let mut property_reference = None;
        let mut text_reference = None;
        let mut property_value = None;
        let mut text_value = None;
        let mut fields = BTreeMap::new();
        let mut attributes = FootprintAttributes::default();
        let mut pads = Vec::new();

        for item in items.iter().skip(1) {
            // Bare flags such as `locked` or `placed`
            let Some(tag) = item.tag() else {
                continue;
            };
            let args = item.as_list().map(|l| &l[1..]).unwrap_or_default();
            let arg = |i: usize| args.get(i).and_then(SExp::as_atom);

            match tag {
                "at" => at = Some(Self::parse_at(args, location)?),
                "layer" => layer = arg(0).map(str::to_string),
                "property" => {
                    if let (Some(key), Some(val)) = (arg(0), arg(1)) {
                        match key {
                            "Reference" => property_reference = Some(val.to_string()),
                            "Value" => property_value = Some(val.to_string()),
                            _ => {
                                fields.insert(key.to_string(), val.to_string());
                            }
                        }
                    }
                }
                "fp_text" => match (arg(0), arg(1)) {
                    (Some("reference"), Some(text)) => text_reference = Some(text.to_string()),
                    (Some("value"), Some(text)) => text_value = Some(text.to_string()),
                    _ => {}
                },
                "attr" => {
                    for flag in args.iter().filter_map(SExp::as_symbol) {
                        Self::apply_attribute(&mut attributes, flag, true);
                    }
                }
                // KiCad 9 also writes some attributes as their own blocks
                "exclude_from_pos_files" | "exclude_from_bom" | "dnp" => {
                    let enabled = !matches!(arg(0), Some("no"));
                    Self::apply_attribute(&mut attributes, tag, enabled);
                }
                "pad" => pads.push(Self::parse_pad(item)),
                _ => {
                    // Ignore unknown elements
                }
            }
        }

        let reference = property_reference
            .filter(|r| !r.is_empty())
            .or(text_reference.filter(|r| !r.is_empty()))
            .ok_or_else(|| BomError::MissingRequiredField {
                field: "reference".to_string(),
                position: location,
            })?;
        let (position, rotation) = at.ok_or_else(|| BomError::MissingRequiredField {
            field: "at".to_string(),
            position: location,
        })?;
        let layer = layer.unwrap_or_else(|| "F.Cu".to_string());

        Ok(Footprint {
            package: package_name(&lib_id).to_string(),
            lib_id,
            reference,
            value: property_value.or(text_value).unwrap_or_default(),
            fields,
            position,
            rotation,
            side: Side::from_layer(&layer),
            layer,
            attributes,
            pads,
            location,
            placement: None,
        })
    }

    fn apply_attribute(attributes: &mut FootprintAttributes, flag: &str, enabled: bool) {
        match flag {
            "smd" => attributes.smd = enabled,
            "through_hole" => attributes.through_hole = enabled,
            "board_only" => attributes.board_only = enabled,
            "exclude_from_pos_files" => attributes.exclude_from_pos_files = enabled,
            "exclude_from_bom" => attributes.exclude_from_bom = enabled,
            "dnp" => attributes.dnp = enabled,
            _ => {}
        }
    }

    /// `(at x y [angle])`; x and y must both be numbers.
    fn parse_at(args: &[SExp], location: Position) -> Result<(Point, f64), BomError> {
        let x = args.first().and_then(SExp::as_number);
        let y = args.get(1).and_then(SExp::as_number);
        match (x, y) {
            (Some(x), Some(y)) => {
                let rotation = args.get(2).and_then(SExp::as_number).unwrap_or(0.0);
                Ok((Point::new(x, y), rotation))
            }
            _ => Err(BomError::MissingRequiredField {
                field: "at".to_string(),
                position: location,
            }),
        }
    }

    fn parse_pad(sexp: &SExp) -> Pad {
        let items = sexp.as_list().unwrap_or_default();

        let number = items.get(1).and_then(SExp::as_atom).unwrap_or("").to_string();
        let pad_type = match items.get(2).and_then(SExp::as_symbol).unwrap_or("") {
            "thru_hole" => PadType::ThruHole,
            "smd" => PadType::Smd,
            "connect" => PadType::Connect,
            "np_thru_hole" => PadType::NpThruHole,
            _ => PadType::Unknown,
        };

        let position = sexp
            .get("at")
            .and_then(|at| at.as_list())
            .and_then(|l| match (l.get(1).and_then(SExp::as_number), l.get(2).and_then(SExp::as_number)) {
                (Some(x), Some(y)) => Some(Point::new(x, y)),
                _ => None,
            })
            .unwrap_or_default();

        let layers = sexp
            .get("layers")
            .and_then(|l| l.as_list())
            .map(|l| l.iter().skip(1).filter_map(SExp::as_atom).map(str::to_string).collect())
            .unwrap_or_default();

        Pad {
            number,
            pad_type,
            position,
            layers,
        }
    }

    fn check_unique_references(footprints: &[Footprint]) -> Result<(), BomError> {
        let mut seen: HashMap<&str, Position> = HashMap::new();
        for fp in footprints {
            if let Some(first) = seen.insert(&fp.reference, fp.location) {
                return Err(BomError::DuplicateReference {
                    reference: fp.reference.clone(),
                    first,
                    second: fp.location,
                });
            }
        }
        Ok(())
    }
}
