use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    process::Command,
};

use tracing::{debug, warn};

pub const DEFAULT_PREFIX: &str = "arm-none-eabi-";

/// Locates and runs the binutils that produce section and symbol listings.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Toolchain {
    /// Directory holding the tools. `None` searches `PATH`.
    pub dir: Option<PathBuf>,
    pub prefix: String,
}

impl Default for Toolchain {
    fn default() -> Self { Self { dir: None, prefix: DEFAULT_PREFIX.to_string() } }
}

impl Toolchain {
    pub fn new(dir: Option<PathBuf>, prefix: Option<String>) -> Self {
        Self { dir, prefix: prefix.unwrap_or_else(|| DEFAULT_PREFIX.to_string()) }
    }

    /// Resolves `tool` inside the toolchain directory, falling back to the
    /// bare executable name when it isn't there.
    pub fn tool_path(&self, tool: &str) -> PathBuf {
        let exe = format!("{}{}{}", self.prefix, tool, std::env::consts::EXE_SUFFIX);
        if let Some(dir) = &self.dir {
            let full = dir.join(&exe);
            if full.is_file() {
                debug!("Using tool {}", full.display());
                return full;
            }
            debug!("{} not found in {}, falling back to PATH", exe, dir.display());
        }
        PathBuf::from(exe)
    }

    /// `objdump -h` of the ELF.
    pub fn section_headers(&self, elf: &Path) -> Option<String> {
        self.run("objdump", &[OsStr::new("-h"), elf.as_os_str()])
    }

    /// Address-sorted, demangled, defined symbols with sizes and source lines.
    pub fn symbol_table(&self, elf: &Path) -> Option<String> {
        let mut args = ["-C", "-S", "-n", "-l", "--defined-only"].map(OsStr::new).to_vec();
        args.push(elf.as_os_str());
        self.run("nm", &args)
    }

    /// Runs a tool and returns its stdout. Failures are reported as missing
    /// data rather than errors.
    fn run(&self, tool: &str, args: &[&OsStr]) -> Option<String> {
        let path = self.tool_path(tool);
        let output = match Command::new(&path).args(args).output() {
            Ok(output) => output,
            Err(e) => {
                warn!("Failed to run {}: {}", path.display(), e);
                return None;
            }
        };
        if !output.status.success() {
            warn!(
                "{} exited with {}: {}",
                path.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
