use std::{
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{bail, Result};
use argp::FromArgs;
use tracing::{info, warn};

use crate::util::{
    build_folder::{display_relative, find_build_folders},
    config::{find_config, load_config, AnalyzerConfig},
    file::AnalysisInputs,
    nm::SymbolSizes,
    parse::{parse_with_options, ParseOptions},
    path::native_path,
    report::{depth, output_format, write_json, write_text, Depth, OutputFormat, Report},
    toolchain::Toolchain,
};

#[derive(FromArgs, PartialEq, Debug)]
/// Prints memory usage by region, section and symbol.
#[argp(subcommand, name = "report")]
pub struct Args {
    #[argp(positional, from_str_fn(native_path))]
    /// Linker map file. Located automatically when omitted.
    map: Option<PathBuf>,
    #[argp(option, short = 'e', from_str_fn(native_path))]
    /// ELF image to read sections and symbols from.
    elf: Option<PathBuf>,
    #[argp(option, from_str_fn(native_path))]
    /// Saved `objdump -h` output, used instead of the map's section listing.
    sections: Option<PathBuf>,
    #[argp(option, from_str_fn(native_path))]
    /// Saved `nm -S -n -l` output.
    symbols: Option<PathBuf>,
    #[argp(option, short = 'c', from_str_fn(native_path))]
    /// Configuration file. (Default: <root>/build-analyzer.yml)
    config: Option<PathBuf>,
    #[argp(option, short = 'r', from_str_fn(native_path))]
    /// Project root to search for build folders. (Default: current directory)
    root: Option<PathBuf>,
    #[argp(option, from_str_fn(native_path))]
    /// Directory containing the binutils.
    toolchain: Option<PathBuf>,
    #[argp(option)]
    /// Binutils name prefix. (Default: arm-none-eabi-)
    prefix: Option<String>,
    #[argp(option, short = 'f', from_str_fn(output_format))]
    /// Output format: text or json. (Default: text)
    format: Option<OutputFormat>,
    #[argp(option, short = 'd', from_str_fn(depth))]
    /// Tree depth: regions, sections or symbols. (Default: sections)
    depth: Option<Depth>,
    #[argp(switch)]
    /// Size unsized symbols by the gap to the next symbol.
    infer_sizes: bool,
}

pub fn run(args: Args) -> Result<()> {
    let root = match &args.root {
        Some(root) => root.clone(),
        None => std::env::current_dir()?,
    };
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => find_config(&root)?.unwrap_or_default(),
    };
    let inputs = resolve_inputs(&args, &config, &root)?;
    let build_folder = inputs.map.parent().map(|folder| display_relative(folder, &root));

    let toolchain = Toolchain::new(
        args.toolchain.clone().or(config.toolchain_path.clone()),
        args.prefix.clone().or(config.tool_prefix.clone()),
    );
    let texts = inputs.load(&toolchain)?;
    let symbol_sizes = if args.infer_sizes || config.infer_symbol_sizes {
        SymbolSizes::Inferred
    } else {
        SymbolSizes::Listed
    };
    let result = parse_with_options(
        &texts.map,
        texts.sections.as_deref(),
        texts.symbols.as_deref(),
        &ParseOptions { symbol_sizes },
    );
    if result.regions.is_empty() {
        warn!("No memory regions found in '{}'", inputs.map.display());
    }
    info!(
        "{} regions, {} sections, {} symbols",
        result.regions.len(),
        result.section_count(),
        result.symbol_count()
    );

    let report = Report::new(&result, build_folder.as_deref(), args.depth.unwrap_or_default());
    let mut out = std::io::stdout().lock();
    match args.format.unwrap_or_default() {
        OutputFormat::Text => write_text(&mut out, &report, true)?,
        OutputFormat::Json => write_json(&mut out, &report)?,
    }
    out.flush()?;
    Ok(())
}

/// Command line first, then the configuration file, then the first build
/// folder found under `root`.
fn resolve_inputs(args: &Args, config: &AnalyzerConfig, root: &Path) -> Result<AnalysisInputs> {
    let mut elf = args.elf.clone().or(config.elf.clone());
    let map = match args.map.clone().or(config.map.clone()) {
        Some(map) => map,
        None => {
            let folders = find_build_folders(root)?;
            let Some(first) = folders.first() else {
                bail!(
                    "No build folder containing both .map and .elf found under '{}'",
                    root.display()
                );
            };
            if folders.len() > 1 {
                warn!(
                    "{} build folders found, using {}; pass a map file to choose another",
                    folders.len(),
                    display_relative(&first.folder, root)
                );
            }
            info!("Using build folder {}", display_relative(&first.folder, root));
            elf = elf.or(Some(first.elf.clone()));
            first.map.clone()
        }
    };
    Ok(AnalysisInputs {
        map,
        elf,
        sections: args.sections.clone().or(config.sections.clone()),
        symbols: args.symbols.clone().or(config.symbols.clone()),
    })
}
