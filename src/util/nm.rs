use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::{
    obj::{MemoryRegion, MemorySection, MemorySymbol, SourceLocation},
    util::map::parse_hex,
};

/// How to size symbols the symbol table lists without a size.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum SymbolSizes {
    /// Record zero.
    #[default]
    Listed,
    /// Use the distance to the next higher symbol address in the same
    /// section, or to the section end for the last one.
    Inferred,
}

/// Parses one line of `nm -S -n -l --defined-only` output:
/// ```text
/// 08000100 00000010 T myFunc	path/to/file.c:42
/// 20000000 B counter
/// ```
pub fn parse_symbol_line(line: &str) -> Option<MemorySymbol> {
    static SYMBOL_LINE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            "^(?P<addr>[0-9A-Fa-f]+)\\s+(?:(?P<size>[0-9A-Fa-f]+)\\s+)?(?P<kind>[A-Za-z])\\s+(?P<rest>\\S.*)$",
        )
        .unwrap()
    });

    let captures = SYMBOL_LINE.captures(line.trim_end())?;
    let address = parse_hex(&captures["addr"])?;
    let size = captures.name("size").and_then(|m| parse_hex(m.as_str())).unwrap_or(0);
    let (name, location) = split_location(&captures["rest"]);
    if name.is_empty() {
        return None;
    }
    Some(MemorySymbol { name: name.to_string(), address, size, location })
}

/// Separates the symbol name from a trailing `path:line`. `nm -l` emits a tab
/// before the location; demangled names may themselves contain spaces.
/// A location with an unusable line number is dropped, not kept in the name.
fn split_location(rest: &str) -> (&str, Option<SourceLocation>) {
    if let Some((name, location)) = rest.rsplit_once('\t') {
        return (name.trim_end(), parse_location(location.trim()));
    }
    if let Some((name, token)) = rest.rsplit_once(char::is_whitespace) {
        if split_line_number(token).is_some() {
            return (name.trim_end(), parse_location(token));
        }
    }
    (rest, None)
}

/// Splits `path:digits` at the last colon, so drive letters and other
/// colons stay in the path.
fn split_line_number(s: &str) -> Option<(&str, &str)> {
    let (path, line) = s.rsplit_once(':')?;
    if path.is_empty() || line.is_empty() || !line.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((path, line))
}

fn parse_location(s: &str) -> Option<SourceLocation> {
    let (path, line) = split_line_number(s)?;
    Some(SourceLocation { path: path.to_string(), line: line.parse().ok()? })
}

/// Attributes each listed symbol to the first section containing it, within
/// the first region containing it. Unplaceable symbols are dropped.
/// Returns the number of symbols attributed.
pub fn apply_symbols(text: &str, regions: &mut [MemoryRegion], sizes: SymbolSizes) -> usize {
    let mut attributed = 0;
    let mut dropped = 0;
    for symbol in text.lines().filter_map(parse_symbol_line) {
        let Some(region) = regions.iter_mut().find(|r| r.contains(symbol.address)) else {
            dropped += 1;
            continue;
        };
        let Some(section) = region.section_at_mut(symbol.address) else {
            dropped += 1;
            continue;
        };
        section.symbols.push(symbol);
        attributed += 1;
    }
    debug!("Attributed {} symbols, {} outside mapped sections", attributed, dropped);
    if sizes == SymbolSizes::Inferred {
        for section in regions.iter_mut().flat_map(|r| r.sections.iter_mut()) {
            infer_sizes(section);
        }
    }
    attributed
}

/// Fills zero sizes from the gap to the next higher address. Assumes the
/// symbols are in address order, as `nm -n` lists them.
fn infer_sizes(section: &mut MemorySection) {
    let mut upper = section.end();
    let mut current = section.end();
    for symbol in section.symbols.iter_mut().rev() {
        if symbol.address < current {
            upper = current;
            current = symbol.address;
        }
        if symbol.size == 0 {
            symbol.size = upper.saturating_sub(symbol.address);
        }
    }
}
