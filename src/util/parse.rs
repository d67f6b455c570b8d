use tracing::info;

use crate::{
    obj::ParseResult,
    util::{
        map::{apply_map_sections, parse_regions},
        nm::{apply_symbols, SymbolSizes},
        objdump::apply_section_headers,
    },
};

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct ParseOptions {
    pub symbol_sizes: SymbolSizes,
}

/// Builds the region tree from a linker map, an optional `objdump -h`
/// listing and an optional `nm` listing.
///
/// Without a section listing, sections are read from the map itself.
/// Without a symbol listing, the symbol stage is skipped.
pub fn parse(map: &str, sections: Option<&str>, symbols: Option<&str>) -> ParseResult {
    parse_with_options(map, sections, symbols, &ParseOptions::default())
}

pub fn parse_with_options(
    map: &str,
    sections: Option<&str>,
    symbols: Option<&str>,
    options: &ParseOptions,
) -> ParseResult {
    let mut regions = parse_regions(map);
    info!("Found {} memory regions", regions.len());

    match sections {
        Some(text) => apply_section_headers(text, &mut regions),
        None => apply_map_sections(map, &mut regions),
    }

    if let Some(text) = symbols {
        let count = apply_symbols(text, &mut regions, options.symbol_sizes);
        info!("Attributed {} symbols", count);
    }

    ParseResult { regions }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::{map::tests::MAP, nm::tests::SYMBOLS, objdump::tests::SECTION_HEADERS};

    #[test]
    fn test_parse_map_only() {
        let result = parse(MAP, None, None);
        assert_eq!(result.regions.len(), 2);
        assert_eq!(result.section_count(), 5);
        assert_eq!(result.symbol_count(), 0);
        let ram = result.region("RAM").unwrap();
        assert_eq!(ram.used(), 0x34);
    }

    #[test]
    fn test_section_sources_agree() {
        let embedded = parse(MAP, None, Some(SYMBOLS));
        let listed = parse(MAP, Some(SECTION_HEADERS), Some(SYMBOLS));
        assert_eq!(embedded, listed);
    }

    #[test]
    fn test_parse_full() {
        let result = parse(MAP, None, Some(SYMBOLS));
        assert_eq!(result.symbol_count(), 8);
        for region in &result.regions {
            assert_eq!(region.used(), region.sections.iter().map(|s| s.size).sum::<u64>());
        }
        let flash = result.region("FLASH").unwrap();
        assert_eq!(flash.sections[1].symbols[0].name, "main");
    }

    #[test]
    fn test_parse_is_deterministic() {
        let options = ParseOptions { symbol_sizes: SymbolSizes::Inferred };
        let first = parse_with_options(MAP, None, Some(SYMBOLS), &options);
        let second = parse_with_options(MAP, None, Some(SYMBOLS), &options);
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_listings() {
        let result = parse(MAP, Some(""), Some(""));
        assert_eq!(result.regions.len(), 2);
        assert_eq!(result.section_count(), 0);
    }

    #[test]
    fn test_map_without_markers() {
        let result = parse("FLASH 0x08000000 0x00100000 xr\n.text 0x08000000 0x40\n", None, None);
        assert!(result.regions.is_empty());
    }
}
