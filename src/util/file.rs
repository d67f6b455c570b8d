use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::util::toolchain::Toolchain;

/// Reads a required text input. Missing, unreadable and empty files are all
/// reported as errors naming the file.
pub fn read_text_file<P>(path: P, what: &str) -> Result<String>
where P: AsRef<Path> {
    let path = path.as_ref();
    let data =
        fs::read(path).with_context(|| format!("Failed to read {} '{}'", what, path.display()))?;
    if data.iter().all(u8::is_ascii_whitespace) {
        bail!("{} '{}' is empty", capitalize(what), path.display());
    }
    Ok(String::from_utf8_lossy(&data).into_owned())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Where the three text inputs of an analysis come from.
///
/// Section and symbol listings are read from dump files when given,
/// otherwise produced from the ELF with the toolchain.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct AnalysisInputs {
    pub map: PathBuf,
    pub elf: Option<PathBuf>,
    pub sections: Option<PathBuf>,
    pub symbols: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct InputTexts {
    pub map: String,
    pub sections: Option<String>,
    pub symbols: Option<String>,
}

impl AnalysisInputs {
    pub fn load(&self, toolchain: &Toolchain) -> Result<InputTexts> {
        let map = read_text_file(&self.map, "map file")?;
        if let Some(elf) = &self.elf {
            if !elf.is_file() {
                bail!("Failed to read ELF file '{}': not found", elf.display());
            }
        }

        let sections = match (&self.sections, &self.elf) {
            (Some(path), _) => Some(read_text_file(path, "section listing")?),
            (None, Some(elf)) => toolchain.section_headers(elf),
            (None, None) => None,
        };
        let symbols = match (&self.symbols, &self.elf) {
            (Some(path), _) => Some(read_text_file(path, "symbol listing")?),
            (None, Some(elf)) => {
                let text = toolchain.symbol_table(elf);
                if text.is_none() {
                    warn!("No symbol table for '{}', reporting sections only", elf.display());
                }
                text
            }
            (None, None) => None,
        };
        info!(
            "Loaded map '{}' ({} sections, {})",
            self.map.display(),
            if sections.is_some() { "listed" } else { "embedded" },
            if symbols.is_some() { "with symbols" } else { "no symbols" }
        );
        Ok(InputTexts { map, sections, symbols })
    }
}
