//! Gridcalc - grid formula evaluator from the command line

mod config;

use anyhow::{Context, bail};
use gridcalc_core::storage::{export_csv, import_csv, write_csv};
use gridcalc_core::{CellRange, CellRef, Document};
use gridcalc_engine::engine::{ERROR_MARKER, FORMULA_MARKER, builtin_descriptions};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use config::Config;

fn print_usage() {
    eprintln!("Usage: gridcalc [OPTIONS] [FILE]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  [FILE]                    CSV file to load at A1");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -s, --set <CELL=INPUT>    Edit a cell (can be repeated, applied in order)");
    eprintln!("  -c, --command <FORMULA>   Evaluate a formula and print the result");
    eprintln!("  -r, --range <A1:B2>       Limit CSV output to a range");
    eprintln!("  -o, --output <FILE>       Write CSV to a file instead of stdout");
    eprintln!("  --config <FILE>           Load config from FILE");
    eprintln!("  --no-default-config       Don't load the default config file");
    eprintln!("  -h, --help                Print help");
    eprintln!();
    eprintln!("Functions:");
    for (name, description) in builtin_descriptions() {
        eprintln!("  {:<26}{}", name, description);
    }
}

#[derive(Default)]
struct Options {
    file_path: Option<PathBuf>,
    edits: Vec<(String, String)>,
    command: Option<String>,
    range: Option<String>,
    output_file: Option<PathBuf>,
    config_file: Option<PathBuf>,
    no_default_config: bool,
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let mut options = Options::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage();
                return ExitCode::SUCCESS;
            }
            "-s" | "--set" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --set requires CELL=INPUT");
                    return ExitCode::FAILURE;
                }
                let Some((cell, input)) = args[i].split_once('=') else {
                    eprintln!("Error: --set expects CELL=INPUT, got: {}", args[i]);
                    return ExitCode::FAILURE;
                };
                options.edits.push((cell.to_string(), input.to_string()));
            }
            "-c" | "--command" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --command requires a formula");
                    return ExitCode::FAILURE;
                }
                options.command = Some(args[i].to_string());
            }
            "-r" | "--range" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --range requires a range like A1:B2");
                    return ExitCode::FAILURE;
                }
                options.range = Some(args[i].to_string());
            }
            "-o" | "--output" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --output requires a file path");
                    return ExitCode::FAILURE;
                }
                options.output_file = Some(PathBuf::from(&args[i]));
            }
            "--config" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --config requires a file path");
                    return ExitCode::FAILURE;
                }
                options.config_file = Some(PathBuf::from(&args[i]));
            }
            "--no-default-config" => options.no_default_config = true,
            arg if arg.starts_with('-') => {
                eprintln!("Error: Unknown option: {}", arg);
                print_usage();
                return ExitCode::FAILURE;
            }
            _ => {
                if options.file_path.is_none() {
                    options.file_path = Some(PathBuf::from(&args[i]));
                } else {
                    eprintln!("Error: Unexpected argument: {}", args[i]);
                    print_usage();
                    return ExitCode::FAILURE;
                }
            }
        }
        i += 1;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(options) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(options: Options) -> anyhow::Result<ExitCode> {
    let config = Config::load(options.config_file.as_deref(), !options.no_default_config)?;
    let mut doc = Document::with_dimensions(config.grid.columns, config.grid.rows);

    if let Some(path) = &options.file_path {
        import_csv(&mut doc, path, CellRef::new(0, 0))
            .with_context(|| format!("loading {}", path.display()))?;
    }

    for (cell, input) in &options.edits {
        let Some(cell_ref) = CellRef::from_str(cell) else {
            bail!("invalid cell reference: {}", cell);
        };
        doc.on_cell_edited(cell_ref, input)
            .with_context(|| format!("setting {}", cell))?;
    }

    let range = match &options.range {
        Some(text) => match CellRange::parse(text) {
            Some(range) => Some(range),
            None => bail!("invalid range: {}", text),
        },
        None => None,
    };

    let mut code = ExitCode::SUCCESS;
    if let Some(formula) = &options.command {
        let body = formula.strip_prefix(FORMULA_MARKER).unwrap_or(formula);
        match doc.evaluate(body) {
            Ok(value) => println!("{}", value.as_text()),
            Err(e) => {
                println!("{}", ERROR_MARKER);
                eprintln!("Error: {}", e);
                code = ExitCode::FAILURE;
            }
        }
    }

    if let Some(output_path) = &options.output_file {
        export_csv(output_path, &mut doc, range)
            .with_context(|| format!("writing {}", output_path.display()))?;
        eprintln!("Exported to {}", output_path.display());
    } else if options.command.is_none() {
        let stdout = std::io::stdout();
        write_csv(&mut stdout.lock(), &doc, range)?;
    }

    if let Some(path) = options.file_path.as_ref().filter(|_| doc.modified) {
        tracing::info!(path = %path.display(), "edits were not written back; use -o to save");
    }

    Ok(code)
}
