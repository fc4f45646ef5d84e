//! Generate example: build a BOM for a board and print it.

use boardbom::prelude::*;
use std::path::Path;

fn main() -> Result<(), BomError> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tests/fixtures/sensor_board.kicad_pcb".to_string());
    let path = Path::new(&path);

    if !path.exists() {
        eprintln!("File not found: {}", path.display());
        eprintln!("Usage: cargo run --example generate_bom [path/to/board.kicad_pcb]");
        std::process::exit(1);
    }

    let options = BomOptions {
        extra_columns: vec!["LCSC".to_string()],
        ..Default::default()
    };
    let report = BoardBom::process_path(path, None, &options)?;

    println!("BOM for: {}", report.source);
    if let Some(title) = &report.board.title_block.title {
        println!("Title: {}", title);
    }
    println!(
        "{} lines, {} parts, {} placed",
        report.groups.len(),
        report.total_quantity(),
        report.placed_count()
    );
    println!();

    for group in &report.groups {
        println!(
            "{:>3} x {:<12} {:<30} {}",
            group.quantity(),
            group.value(),
            group.package(),
            group.references_joined()
        );
        let lcsc = group.display_field("LCSC");
        if !lcsc.is_empty() {
            println!("      LCSC: {}", lcsc);
        }
    }

    println!();
    report.placement_table().write_delimited(std::io::stdout(), Delimiter::Comma)?;
    Ok(())
}
