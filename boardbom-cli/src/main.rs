//! BoardBOM CLI - BOM and placement files for KiCad boards from the command line.

use boardbom::source::{self, is_board_entry};
use boardbom::{BoardBom, BomError, BomOptions, BomReport, Delimiter, OutputFormat};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process;
use tracing::Level;

#[derive(Parser)]
#[command(name = "boardbom")]
#[command(about = "BOM and pick-and-place generator for KiCad PCB layouts", long_about = None)]
#[command(version)]
struct Cli {
    /// More log output on stderr (repeat for more)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the BOM and placement tables for a board
    Generate {
        /// .kicad_pcb file, project directory or .zip archive
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output directory (defaults to the input's directory)
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        #[command(flatten)]
        bom: BomArgs,

        /// Table layout
        #[arg(long, value_enum)]
        format: Option<TableFormat>,

        /// Field delimiter
        #[arg(long, value_enum)]
        delimiter: Option<DelimiterArg>,
    },

    /// Print board metadata and the grouped BOM without writing files
    Inspect {
        /// .kicad_pcb file, project directory or .zip archive
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        #[command(flatten)]
        bom: BomArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: ReportFormat,
    },

    /// List the entries of a directory or archive
    Entries {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
    },
}

/// Options shared by every command that builds a BOM
#[derive(Args)]
struct BomArgs {
    /// Board entry to read from a directory or archive
    #[arg(long, value_name = "NAME")]
    entry: Option<String>,

    /// Extra field that must match for parts to share a BOM line
    #[arg(long = "field", value_name = "NAME")]
    fields: Vec<String>,

    /// Extra display column for the BOM
    #[arg(long = "column", value_name = "NAME")]
    columns: Vec<String>,

    /// Leave do-not-populate parts out of both tables
    #[arg(long)]
    exclude_dnp: bool,

    /// JSON options file; flags override its values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl BomArgs {
    /// Options from the config file (or defaults) with the flags applied.
    fn options(&self) -> Result<BomOptions, BomError> {
        let mut options = match &self.config {
            Some(path) => BomOptions::from_json_file(path)?,
            None => BomOptions::default(),
        };
        if !self.fields.is_empty() {
            options.identity_fields = self.fields.clone();
        }
        if !self.columns.is_empty() {
            options.extra_columns = self.columns.clone();
        }
        options.exclude_dnp |= self.exclude_dnp;
        Ok(options)
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum TableFormat {
    /// bom.csv and placement.csv
    Generic,
    /// JLCPCB assembly BOM.csv and CPL.csv
    Jlcpcb,
}

impl From<TableFormat> for OutputFormat {
    fn from(format: TableFormat) -> Self {
        match format {
            TableFormat::Generic => OutputFormat::Generic,
            TableFormat::Jlcpcb => OutputFormat::Jlcpcb,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum DelimiterArg {
    Comma,
    Tab,
    Semicolon,
}

impl From<DelimiterArg> for Delimiter {
    fn from(delimiter: DelimiterArg) -> Self {
        match delimiter {
            DelimiterArg::Comma => Delimiter::Comma,
            DelimiterArg::Tab => Delimiter::Tab,
            DelimiterArg::Semicolon => Delimiter::Semicolon,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum ReportFormat {
    /// Human-readable output
    Human,
    /// JSON output for scripts
    Json,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let exit_code = match cli.command {
        Commands::Generate {
            input,
            output,
            bom,
            format,
            delimiter,
        } => match bom.options() {
            Ok(mut options) => {
                if let Some(format) = format {
                    options.format = format.into();
                }
                if let Some(delimiter) = delimiter {
                    options.delimiter = delimiter.into();
                }
                handle_generate(&input, output.as_deref(), bom.entry.as_deref(), &options, cli.quiet)
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        },
        Commands::Inspect { input, bom, format } => match bom.options() {
            Ok(options) => handle_inspect(&input, bom.entry.as_deref(), &options, &format),
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        },
        Commands::Entries { input } => handle_entries(&input),
    };

    process::exit(exit_code);
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Output directory when none is given: the directory itself for a project
/// directory, otherwise the directory holding the input.
fn default_output_dir(input: &Path) -> PathBuf {
    if input.is_dir() {
        return input.to_path_buf();
    }
    match input.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn handle_generate(
    input: &Path,
    output: Option<&Path>,
    entry: Option<&str>,
    options: &BomOptions,
    quiet: bool,
) -> i32 {
    let out_dir = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output_dir(input));

    match BoardBom::generate(input, entry, &out_dir, options) {
        Ok(files) => {
            if !quiet {
                println!("Wrote {}", files.bom.display());
                println!("Wrote {}", files.placement.display());
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn handle_inspect(
    input: &Path,
    entry: Option<&str>,
    options: &BomOptions,
    format: &ReportFormat,
) -> i32 {
    let report = match BoardBom::process_path(input, entry, options) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    match format {
        ReportFormat::Human => {
            output_human(&report);
            0
        }
        ReportFormat::Json => match output_json(&report) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        },
    }
}

fn output_human(report: &BomReport) {
    let board = &report.board;
    println!("\nBoard: {}", report.source);
    println!("{}", "─".repeat(60));
    if let Some(ref title) = board.title_block.title {
        println!("  Title:      {}", title);
    }
    if let Some(ref rev) = board.title_block.revision {
        println!("  Revision:   {}", rev);
    }
    if let Some(ref version) = board.version {
        println!("  Version:    {}", version);
    }
    if let Some(thickness) = board.thickness {
        println!("  Thickness:  {} mm", thickness);
    }

    println!("\n  BOM:");
    if report.groups.is_empty() {
        println!("    No parts");
    }
    for group in &report.groups {
        print!(
            "    {:>4}  {:<16} {:<28} {}",
            group.quantity(),
            group.value(),
            group.package(),
            group.references_joined()
        );
        for (name, value) in report.options.identity_fields.iter().zip(&group.key.fields) {
            if !value.is_empty() {
                print!("  [{}={}]", name, value);
            }
        }
        println!();
    }

    println!("\n  Summary:");
    println!("    Footprints: {}", board.footprints.len());
    println!("    BOM lines:  {}", report.groups.len());
    println!("    Parts:      {}", report.total_quantity());
    println!("    Placed:     {}", report.placed_count());
}

fn output_json(report: &BomReport) -> Result<(), serde_json::Error> {
    let board = &report.board;
    let output = serde_json::json!({
        "source": report.source,
        "board": {
            "version": board.version,
            "generator": board.generator,
            "thickness": board.thickness,
            "title_block": board.title_block,
        },
        "bom": report.groups.iter().map(|g| {
            serde_json::json!({
                "references": g.references,
                "value": g.value(),
                "package": g.package(),
                "quantity": g.quantity(),
                "fields": report.options.identity_fields.iter().zip(&g.key.fields).collect::<std::collections::BTreeMap<_, _>>(),
            })
        }).collect::<Vec<_>>(),
        "placement": report.placement_table(),
        "summary": {
            "footprints": board.footprints.len(),
            "lines": report.groups.len(),
            "parts": report.total_quantity(),
            "placed": report.placed_count(),
        }
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn handle_entries(input: &Path) -> i32 {
    let entries = match source::open_source(input).and_then(|s| s.list_entries()) {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    for name in &entries {
        let marker = if is_board_entry(name) { "*" } else { " " };
        println!("{} {}", marker, name);
    }
    match source::select_board_entry(&entries, None) {
        Ok(board) => println!("\nBoard: {}", board),
        Err(BomError::AmbiguousBoardEntry(_)) => {
            println!("\nSeveral boards; choose one with --entry")
        }
        Err(_) => println!("\nNo board file found"),
    }
    0
}
