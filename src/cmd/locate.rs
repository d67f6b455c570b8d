use std::path::PathBuf;

use anyhow::{bail, Result};
use argp::FromArgs;

use crate::util::{
    build_folder::{display_relative, find_build_folders},
    path::native_path,
};

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Lists build folders containing a linker map and an ELF image.
#[argp(subcommand, name = "locate")]
pub struct Args {
    #[argp(positional, from_str_fn(native_path))]
    /// Project root. (Default: current directory)
    root: Option<PathBuf>,
}

pub fn run(args: Args) -> Result<()> {
    let root = match args.root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    let folders = find_build_folders(&root)?;
    if folders.is_empty() {
        bail!("No build folder containing both .map and .elf found under '{}'", root.display());
    }
    for folder in folders {
        println!(
            "{}: {} {}",
            display_relative(&folder.folder, &root),
            display_relative(&folder.map, &folder.folder),
            display_relative(&folder.elf, &folder.folder),
        );
    }
    Ok(())
}
