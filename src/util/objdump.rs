use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    obj::{MemoryRegion, MemorySection},
    util::map::{assign_section, parse_hex},
};

/// Parses `objdump -h` output into the sections carrying the `ALLOC` flag.
///
/// Each section header line is followed by a line of comma-separated flags:
/// ```text
///   2 .data         00000010  20000000  08000800  00020000  2**2
///                   CONTENTS, ALLOC, LOAD, DATA
/// ```
pub fn parse_section_headers(text: &str) -> Vec<MemorySection> {
    static HEADER_LINE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            "^\\s*\\d+\\s+(?P<name>\\S+)\\s+(?P<size>[0-9A-Fa-f]+)\\s+(?P<vma>[0-9A-Fa-f]+)\\s+(?P<lma>[0-9A-Fa-f]+)(?:\\s+.*)?$",
        )
        .unwrap()
    });

    let mut sections = vec![];
    let mut header: Option<MemorySection> = None;
    for line in text.lines() {
        let line = line.trim_end();
        if let Some(captures) = HEADER_LINE.captures(line) {
            header = match (
                parse_hex(&captures["size"]),
                parse_hex(&captures["vma"]),
                parse_hex(&captures["lma"]),
            ) {
                (Some(size), Some(address), Some(load_address)) => Some(MemorySection::new(
                    captures["name"].to_string(),
                    address,
                    size,
                    load_address,
                )),
                _ => None,
            };
            continue;
        }
        if let Some(section) = header.take() {
            if line.split(',').any(|flag| flag.trim() == "ALLOC") {
                sections.push(section);
            }
        }
    }
    sections
}

/// Places the allocated sections of an `objdump -h` listing into `regions`.
pub fn apply_section_headers(text: &str, regions: &mut [MemoryRegion]) {
    for section in parse_section_headers(text) {
        assign_section(regions, &section);
    }
}
