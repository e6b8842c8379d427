//! SIC/XE assembler CLI.
//!
//! Assembles one source file into an object program (Header/Text/End
//! records) written to a file or stdout. Diagnostics and logs go to stderr.

use std::path::PathBuf;

use clap::Parser;
use miette::{IntoDiagnostic, Result, WrapErr};

use sicxe_asm::{AsmConfig, Assembler};

/// SIC/XE two-pass assembler.
#[derive(Parser)]
#[command(name = "sicxe", version, about = "SIC/XE two-pass assembler")]
struct Cli {
    /// Assembly source file.
    source: PathBuf,

    /// Write the object program here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// TOML configuration (record layout, extra instructions).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the symbol and literal tables to stderr.
    #[arg(long)]
    symbols: bool,

    /// Enable debug logging (RUST_LOG takes precedence).
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::from_default_env()
    } else if cli.verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    run(&cli)
}

fn run(cli: &Cli) -> Result<()> {
    let source = std::fs::read_to_string(&cli.source)
        .into_diagnostic()
        .wrap_err_with(|| format!("Failed to read: {}", cli.source.display()))?;

    let config = match &cli.config {
        Some(path) => AsmConfig::from_file(path)?,
        None => AsmConfig::default(),
    };

    let mut asm = Assembler::with_config(config);
    let result = asm.assemble_source(&source);

    if cli.symbols {
        eprint!("{}", asm.symbols());
        eprint!("{}", asm.literals());
    }

    let program = match result {
        Ok(program) => program,
        Err(err) => {
            for diagnostic in asm.diagnostics() {
                eprintln!("{:?}", miette::Report::new(diagnostic));
            }
            return Err(err).wrap_err_with(|| format!("Assembly of {} failed", cli.source.display()));
        }
    };

    match &cli.output {
        Some(path) => {
            std::fs::write(path, program.to_string())
                .into_diagnostic()
                .wrap_err_with(|| format!("Failed to write: {}", path.display()))?;
            tracing::info!(path = %path.display(), "Object program written");
        }
        None => print!("{program}"),
    }
    Ok(())
}
