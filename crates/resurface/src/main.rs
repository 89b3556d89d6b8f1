//! resurface CLI - Swift declaration-surface reconstruction
//!
//! Command-line entry point. Orchestrates the full pipeline:
//!
//! 1. Parse the Mach-O image (sections, symbols, exports)
//! 2. Build the symbol index (demangle + classify every symbol)
//! 3. Run the interface indexer (types, protocols, conformances,
//!    extensions, globals)
//! 4. Print the reconstructed interface to stdout

use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use clap::Parser;

use resurface_core::indexer::CancellationToken;
use resurface_core::metadata::MachOMetadataSource;
use resurface_core::{
    EventDispatcher, InterfaceIndexConfiguration, InterfaceIndexer, InterfacePrinter, MachImage, PrinterConfiguration,
    SymbolIndex,
};
use resurface_utils::{init_logging_with_level, LogFormat, LogLevel};

/// Reconstruct the Swift declaration surface of a Mach-O binary
///
/// Reads the image's reflective metadata sections and symbol tables and
/// prints every type, protocol, conformance, extension, and global the
/// binary preserves.
#[derive(Parser, Debug)]
#[command(name = "resurface")]
#[command(version)]
#[command(about, long_about = None)]
struct Cli
{
    /// Path to the Mach-O image to reconstruct
    #[arg(value_name = "BINARY")]
    binary: PathBuf,

    /// Include C/Objective-C-imported type descriptors
    #[arg(long)]
    show_c_imported_types: bool,

    /// Prefix declarations with their file offsets
    #[arg(long)]
    offsets: bool,

    /// Print struct/class field layout comments
    #[arg(long)]
    type_layout: bool,

    /// Print enum case layout comments
    #[arg(long)]
    enum_layout: bool,

    /// Print members whose implementation symbol was stripped
    #[arg(long)]
    stripped: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> ExitCode
{
    let cli = Cli::parse();

    let level = LogLevel::from_str(&cli.log_level).unwrap_or(LogLevel::Warn);
    if let Err(err) = init_logging_with_level(level, LogFormat::Pretty) {
        eprintln!("Failed to initialize logging: {err}");
        return ExitCode::FAILURE;
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> resurface_core::Result<()>
{
    let image = MachImage::open(&cli.binary)?;
    tracing::info!(path = %cli.binary.display(), "image parsed");

    let symbol_index = SymbolIndex::new();
    let storage = symbol_index.storage(&image);

    let indexer = InterfaceIndexer::new(
        InterfaceIndexConfiguration {
            show_c_imported_types: cli.show_c_imported_types,
        },
        EventDispatcher::with_tracing(),
    );
    let source = MachOMetadataSource::new(&image);
    indexer.prepare(&source, storage, &CancellationToken::new())?;

    let printer = InterfacePrinter::new(PrinterConfiguration {
        emit_offset_comments: cli.offsets,
        print_type_layout: cli.type_layout,
        print_enum_layout: cli.enum_layout,
        print_stripped_symbolic_item: cli.stripped,
    });
    let text = printer.print(&indexer, storage);
    print!("{text}");
    Ok(())
}
