use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Looked up in the project root when no `--config` is given.
pub const CONFIG_FILE_NAME: &str = "build-analyzer.yml";

/// Project settings. Every key is optional; command-line options win.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalyzerConfig {
    pub map: Option<PathBuf>,
    pub elf: Option<PathBuf>,
    /// `objdump -h` output to use instead of running objdump.
    pub sections: Option<PathBuf>,
    /// `nm` output to use instead of running nm.
    pub symbols: Option<PathBuf>,
    pub toolchain_path: Option<PathBuf>,
    pub tool_prefix: Option<String>,
    pub infer_symbol_sizes: bool,
}

impl AnalyzerConfig {
    /// Makes relative paths relative to `base` (the config file's directory).
    fn resolve_paths(&mut self, base: &Path) {
        for path in [
            &mut self.map,
            &mut self.elf,
            &mut self.sections,
            &mut self.symbols,
            &mut self.toolchain_path,
        ]
        .into_iter()
        .flatten()
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

pub fn load_config(path: &Path) -> Result<AnalyzerConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    let mut config: AnalyzerConfig = serde_yaml::from_str(&text)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
    config.resolve_paths(path.parent().unwrap_or(Path::new(".")));
    Ok(config)
}

/// Loads `build-analyzer.yml` from `root` if present.
pub fn find_config(root: &Path) -> Result<Option<AnalyzerConfig>> {
    let path = root.join(CONFIG_FILE_NAME);
    if path.is_file() {
        load_config(&path).map(Some)
    } else {
        Ok(None)
    }
}
