use std::{
    cmp::Reverse,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Result};
use itertools::Itertools;
use path_slash::PathExt;
use tracing::debug;

/// Output directory names searched before falling back to the whole project.
pub const BUILD_DIRS: [&str; 6] = ["build", "Build", "Release", "Debug", "out", "output"];

/// A directory holding a linked firmware image and its map.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BuildFolder {
    pub folder: PathBuf,
    pub map: PathBuf,
    pub elf: PathBuf,
}

/// Finds every folder under `root` that directly contains a non-empty `.map`
/// and an `.elf`, preferring the conventional output directories.
pub fn find_build_folders(root: &Path) -> Result<Vec<BuildFolder>> {
    let mut found = vec![];
    for dir in BUILD_DIRS.iter().map(|d| root.join(d)).filter(|d| d.is_dir()) {
        found.extend(scan(&dir)?);
    }
    if found.is_empty() {
        debug!("No build folder in conventional locations, searching {}", root.display());
        found = scan(root)?;
    }
    // Case-insensitive filesystems report `build` and `Build` twice.
    Ok(found
        .into_iter()
        .unique_by(|f| fs::canonicalize(&f.folder).unwrap_or_else(|_| f.folder.clone()))
        .collect())
}

fn scan(dir: &Path) -> Result<Vec<BuildFolder>> {
    let pattern = format!("{}/**/*.map", glob::Pattern::escape(&dir.to_string_lossy()));
    let folders = glob::glob(&pattern)
        .map_err(|e| anyhow!("Invalid search path '{}': {}", dir.display(), e))?
        .flatten()
        .filter_map(|map| map.parent().map(Path::to_path_buf))
        .sorted()
        .dedup()
        .filter_map(|folder| {
            let map = pick_file(&folder, "map")?;
            let elf = pick_file(&folder, "elf")?;
            Some(BuildFolder { folder, map, elf })
        })
        .collect();
    Ok(folders)
}

/// Picks the file with extension `ext` in `folder`: names mentioning
/// `Release` first, then `Debug`, then alphabetical. Empty maps are skipped.
pub fn pick_file(folder: &Path, ext: &str) -> Option<PathBuf> {
    let entries = fs::read_dir(folder).ok()?;
    entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|e| e == ext))
        .filter(|path| ext != "map" || fs::metadata(path).is_ok_and(|m| m.len() > 0))
        .min_by_key(|path| {
            let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
            let name = name.unwrap_or_default();
            (Reverse(name.contains("Release")), Reverse(name.contains("Debug")), name)
        })
}

/// `path` relative to `root` with forward slashes, for display.
pub fn display_relative(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    if relative.as_os_str().is_empty() {
        ".".to_string()
    } else {
        relative.to_slash_lossy().into_owned()
    }
}
