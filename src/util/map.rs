use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::debug;

use crate::obj::{MemoryRegion, MemorySection};

const MEMORY_CONFIGURATION: &str = "Memory Configuration";
const MEMORY_MAP: &str = "Linker script and memory map";
const OUTPUT_DIRECTIVE: &str = "OUTPUT(";

/// Which part of a GNU ld map file the scanner is in.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ScanState {
    /// Before `Memory Configuration`. Discarded input sections live here.
    Seeking,
    InRegionScope,
    InSectionScope,
    /// After the trailing `OUTPUT(...)` directive.
    Done,
}

impl ScanState {
    /// Returns the new state if `line` is a scope marker.
    pub fn transition(self, line: &str) -> Option<ScanState> {
        match self {
            ScanState::Seeking if line.starts_with(MEMORY_CONFIGURATION) => {
                Some(ScanState::InRegionScope)
            }
            ScanState::Seeking | ScanState::InRegionScope if line.starts_with(MEMORY_MAP) => {
                Some(ScanState::InSectionScope)
            }
            ScanState::InSectionScope if line.starts_with(OUTPUT_DIRECTIVE) => {
                Some(ScanState::Done)
            }
            _ => None,
        }
    }
}

/// Holds a section name whose addresses were wrapped onto the next line.
#[derive(Debug, Default)]
struct PendingName(Option<String>);

impl PendingName {
    fn hold(&mut self, name: &str) { self.0 = Some(name.to_string()) }

    /// Empties the slot, returning the held name joined with `line`.
    fn join(&mut self, line: &str) -> Option<String> {
        self.0.take().map(|name| format!("{} {}", name, line.trim_start()))
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum MapRecord {
    Region(MemoryRegion),
    Section(MemorySection),
}

/// Iterates over the region and output section records of a map file.
pub struct MapRecords<'a> {
    lines: std::str::Lines<'a>,
    state: ScanState,
    pending: PendingName,
}

impl<'a> MapRecords<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { lines: text.lines(), state: ScanState::Seeking, pending: PendingName::default() }
    }

    pub fn state(&self) -> ScanState { self.state }

    fn process_line(&mut self, line: &str) -> Option<MapRecord> {
        let line = line.trim_end();
        if let Some(state) = self.state.transition(line) {
            debug!("Map scope {:?} -> {:?}", self.state, state);
            self.state = state;
            self.pending.0 = None;
            return None;
        }
        match self.state {
            ScanState::InRegionScope => parse_region_line(line).map(MapRecord::Region),
            ScanState::InSectionScope => self.process_section_line(line),
            ScanState::Seeking | ScanState::Done => None,
        }
    }

    fn process_section_line(&mut self, line: &str) -> Option<MapRecord> {
        if let Some(joined) = self.pending.join(line) {
            if let Some(section) = parse_section_line(&joined) {
                return Some(MapRecord::Section(section));
            }
        }
        if let Some(section) = parse_section_line(line) {
            return Some(MapRecord::Section(section));
        }
        if let Some(name) = parse_section_name_line(line) {
            self.pending.hold(name);
        }
        None
    }
}

impl Iterator for MapRecords<'_> {
    type Item = MapRecord;

    fn next(&mut self) -> Option<Self::Item> {
        while self.state != ScanState::Done {
            let line = self.lines.next()?;
            if let Some(record) = self.process_line(line) {
                return Some(record);
            }
        }
        None
    }
}

pub(crate) fn parse_hex(s: &str) -> Option<u64> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    u64::from_str_radix(digits, 16).ok()
}

fn hex_capture(captures: &Captures, name: &str) -> Option<u64> {
    captures.name(name).and_then(|m| parse_hex(m.as_str()))
}

/// Parses a `MEMORY` entry such as `FLASH 0x08000000 0x00100000 xr`.
pub fn parse_region_line(line: &str) -> Option<MemoryRegion> {
    static REGION_LINE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            "^\\s*(?P<name>\\w+)\\s+(?P<addr>0[xX][0-9A-Fa-f]+)\\s+(?P<len>0[xX][0-9A-Fa-f]+)(?:\\s+(?P<attrs>\\S.*?))?\\s*$",
        )
        .unwrap()
    });

    let captures = REGION_LINE.captures(line)?;
    let address = hex_capture(&captures, "addr")?;
    let size = hex_capture(&captures, "len")?;
    let attributes = captures.name("attrs").map(|m| m.as_str().to_string()).unwrap_or_default();
    Some(MemoryRegion::new(captures["name"].to_string(), address, size, attributes))
}

/// Parses an output section entry such as
/// `.data 0x20000000 0x10 load address 0x08001234`.
/// Input section entries are indented by the linker and never match.
pub fn parse_section_line(line: &str) -> Option<MemorySection> {
    static SECTION_LINE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            "^(?P<name>[.\\w]+)\\s+(?P<addr>0[xX][0-9A-Fa-f]+)\\s+(?P<size>0[xX][0-9A-Fa-f]+)(?:\\s+load address\\s+(?P<load>0[xX][0-9A-Fa-f]+))?(?:\\s+.*)?$",
        )
        .unwrap()
    });

    let captures = SECTION_LINE.captures(line)?;
    let address = hex_capture(&captures, "addr")?;
    let size = hex_capture(&captures, "size")?;
    let load_address = match captures.name("load") {
        Some(m) => parse_hex(m.as_str())?,
        None => address,
    };
    Some(MemorySection::new(captures["name"].to_string(), address, size, load_address))
}

/// Matches a section name too long for its column, e.g. `.ARM.attributes`
/// alone on a line with the addresses on the following one.
fn parse_section_name_line(line: &str) -> Option<&str> {
    static SECTION_NAME_LINE: Lazy<Regex> = Lazy::new(|| Regex::new("^[.\\w]+$").unwrap());

    SECTION_NAME_LINE.is_match(line).then_some(line)
}

/// Empty sections and sections at address zero are linker bookkeeping.
#[inline]
pub fn is_placeable(section: &MemorySection) -> bool { section.size != 0 && section.address != 0 }

/// Appends `section` to every region containing it and returns the number
/// of regions it was placed in.
///
/// `.data` is also matched by its load address, so its flash image is
/// reported against the region it is stored in. Regions with overlapping
/// ranges each receive a copy.
pub fn assign_section(regions: &mut [MemoryRegion], section: &MemorySection) -> usize {
    if !is_placeable(section) {
        debug!(
            "Skipping section {} @ {:#010X} (size {:#X})",
            section.name, section.address, section.size
        );
        return 0;
    }
    let mut placed = 0;
    for region in regions.iter_mut() {
        let by_load_address = section.name == ".data" && region.contains(section.load_address);
        if region.contains(section.address) || by_load_address {
            debug!(
                "Section {} @ {:#010X} assigned to region {}",
                section.name, section.address, region.name
            );
            region.sections.push(section.clone());
            placed += 1;
        }
    }
    if placed == 0 {
        debug!(
            "Section {} @ {:#010X} is outside all memory regions",
            section.name, section.address
        );
    }
    placed
}

/// Extracts the memory regions declared in a map file, in declaration order.
pub fn parse_regions(map: &str) -> Vec<MemoryRegion> {
    MapRecords::new(map)
        .filter_map(|record| match record {
            MapRecord::Region(region) => Some(region),
            MapRecord::Section(_) => None,
        })
        .collect()
}

/// Places the output sections listed in a map file into `regions`.
pub fn apply_map_sections(map: &str, regions: &mut [MemoryRegion]) {
    let mut records = MapRecords::new(map);
    for record in records.by_ref() {
        if let MapRecord::Section(section) = record {
            assign_section(regions, &section);
        }
    }
    if matches!(records.state(), ScanState::Seeking | ScanState::InRegionScope) {
        debug!("No memory map found, no sections placed");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const MAP: &str = "\
Archive member included to satisfy reference by file (symbol)

Discarded input sections

 .text          0x00000000        0x0 build/startup.o
 .data          0x00000000        0x0 build/startup.o

Memory Configuration

Name             Origin             Length             Attributes
FLASH            0x08000000         0x00010000         xr
RAM              0x20000000         0x00005000         xrw
*default*        0x00000000         0xffffffff

Linker script and memory map

LOAD build/startup.o
LOAD build/main.o
                0x20005000                _estack = 0x20005000

.isr_vector     0x08000000      0x188
                0x08000000                . = ALIGN (0x4)
 *(.isr_vector)
 .isr_vector    0x08000000      0x188 build/startup.o
                0x08000188                . = ALIGN (0x4)

.text           0x08000188      0x678
 *(.text)
 .text          0x08000188       0x40 build/main.o
                0x08000188                main
 .text          0x080001c8      0x638 build/startup.o

.rodata         0x08000800        0x0
 *(.rodata)

.data           0x20000000       0x10 load address 0x08000800
                0x20000000                _sdata = .
 .data          0x20000000       0x10 build/main.o

.bss            0x20000010       0x24
 .bss           0x20000010       0x24 build/main.o

.ARM.attributes
                0x00000000       0x30
 .ARM.attributes
                0x00000000       0x30 build/main.o
OUTPUT(build/firmware.elf elf32-littlearm)
LOAD linker stubs
";

    #[test]
    fn test_scan_state_transitions() {
        let state = ScanState::Seeking;
        assert_eq!(state.transition("Discarded input sections"), None);
        assert_eq!(state.transition("Memory Configuration"), Some(ScanState::InRegionScope));
        assert_eq!(
            ScanState::InRegionScope.transition("Linker script and memory map"),
            Some(ScanState::InSectionScope)
        );
        assert_eq!(ScanState::InRegionScope.transition("Memory Configuration"), None);
        assert_eq!(
            ScanState::InSectionScope.transition("OUTPUT(build/firmware.elf elf32-littlearm)"),
            Some(ScanState::Done)
        );
        assert_eq!(ScanState::Done.transition("Memory Configuration"), None);
        // Markers must start the line
        assert_eq!(state.transition("  Memory Configuration"), None);
    }

    #[test]
    fn test_parse_regions() {
        let regions = parse_regions(MAP);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].name, "FLASH");
        assert_eq!(regions[0].address, 0x08000000);
        assert_eq!(regions[0].size, 0x10000);
        assert_eq!(regions[0].attributes, "xr");
        assert_eq!(regions[1].name, "RAM");
        assert_eq!(regions[1].address, 0x20000000);
        assert_eq!(regions[1].size, 0x5000);
        assert!(regions.iter().all(|r| r.sections.is_empty() && r.used() == 0));
    }

    #[test]
    fn test_region_lines_outside_scope_ignored() {
        let map = "\
EXTRA 0x10000000 0x1000 rw
Memory Configuration
FLASH 0x08000000 0x00100000 xr
Linker script and memory map
RAM 0x20000000 0x00020000 xrw
";
        let regions = parse_regions(map);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].name, "FLASH");
    }

    #[test]
    fn test_region_line_shapes() {
        let region = parse_region_line("  SRAM1 0x0000000020000000 0x0000000000010000").unwrap();
        assert_eq!(region.name, "SRAM1");
        assert_eq!(region.address, 0x20000000);
        assert_eq!(region.attributes, "");
        assert!(parse_region_line("Name             Origin             Length").is_none());
        assert!(parse_region_line("*default*        0x00000000         0xffffffff").is_none());
        assert!(parse_region_line("FLASH 08000000 0x1000 xr").is_none());
        // Overflowing literal
        assert!(parse_region_line("HUGE 0x1ffffffffffffffff 0x10 rw").is_none());
    }

    #[test]
    fn test_duplicate_region_names_kept() {
        let map = "\
Memory Configuration
RAM 0x20000000 0x1000 rw
RAM 0x20001000 0x1000 rw
Linker script and memory map
";
        let regions = parse_regions(map);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[1].address, 0x20001000);
    }

    #[test]
    fn test_single_section_scenario() {
        let map = "\
Memory Configuration
FLASH 0x08000000 0x00100000 xr
Linker script and memory map
.text 0x08000000 0x00001000
";
        let mut regions = parse_regions(map);
        apply_map_sections(map, &mut regions);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].name, "FLASH");
        assert_eq!(regions[0].used(), 0x1000);
        assert_eq!(regions[0].sections.len(), 1);
        assert_eq!(regions[0].sections[0].name, ".text");
        assert_eq!(regions[0].sections[0].address, 0x08000000);
        assert_eq!(regions[0].sections[0].size, 0x1000);
        assert_eq!(regions[0].sections[0].load_address, 0x08000000);
    }

    #[test]
    fn test_apply_map_sections() {
        let mut regions = parse_regions(MAP);
        apply_map_sections(MAP, &mut regions);

        let flash: Vec<_> = regions[0].sections.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(flash, [".isr_vector", ".text", ".data"]);
        assert_eq!(regions[0].used(), 0x188 + 0x678 + 0x10);

        let ram: Vec<_> = regions[1].sections.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(ram, [".data", ".bss"]);
        assert_eq!(regions[1].used(), 0x10 + 0x24);

        let data = &regions[1].sections[0];
        assert_eq!(data.address, 0x20000000);
        assert_eq!(data.load_address, 0x08000800);
    }

    #[test]
    fn test_wrapped_section_name() {
        let map = "\
Memory Configuration
FLASH 0x08000000 0x00100000 xr
Linker script and memory map
.very_long_section_name
                0x08000400      0x120 build/long.o
.text           0x08000600       0x20
";
        let mut regions = parse_regions(map);
        apply_map_sections(map, &mut regions);
        let sections = &regions[0].sections;
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].name, ".very_long_section_name");
        assert_eq!(sections[0].address, 0x08000400);
        assert_eq!(sections[0].size, 0x120);
        assert_eq!(sections[1].name, ".text");
    }

    #[test]
    fn test_pending_name_does_not_carry_over() {
        let map = "\
Memory Configuration
FLASH 0x08000000 0x00100000 xr
Linker script and memory map
.orphan
 *(.orphan)
                0x08000400      0x120
";
        let mut regions = parse_regions(map);
        apply_map_sections(map, &mut regions);
        assert!(regions[0].sections.is_empty());
    }

    #[test]
    fn test_filtered_sections() {
        let mut regions = parse_regions(MAP);
        apply_map_sections(MAP, &mut regions);
        for region in &regions {
            for section in &region.sections {
                assert_ne!(section.size, 0);
                assert_ne!(section.address, 0);
            }
            assert!(!region.sections.iter().any(|s| s.name == ".rodata"));
            assert!(!region.sections.iter().any(|s| s.name == ".ARM.attributes"));
        }
    }

    #[test]
    fn test_load_address_fallback_only_for_data() {
        let mut regions = vec![MemoryRegion::new(
            "FLASH".to_string(),
            0x08000000,
            0x10000,
            "xr".to_string(),
        )];
        let data = MemorySection::new(".data".to_string(), 0x20000000, 0x10, 0x08000800);
        let ramfunc = MemorySection::new(".ramfunc".to_string(), 0x20000010, 0x10, 0x08000810);
        assert_eq!(assign_section(&mut regions, &data), 1);
        assert_eq!(assign_section(&mut regions, &ramfunc), 0);
        assert_eq!(regions[0].sections.len(), 1);
        assert_eq!(regions[0].sections[0].name, ".data");
        assert_eq!(regions[0].used(), 0x10);
    }

    #[test]
    fn test_overlapping_regions_each_receive_section() {
        let mut regions = vec![
            MemoryRegion::new("FLASH".to_string(), 0x08000000, 0x10000, "xr".to_string()),
            MemoryRegion::new("BOOT".to_string(), 0x08000000, 0x1000, "xr".to_string()),
        ];
        let text = MemorySection::new(".text".to_string(), 0x08000100, 0x200, 0x08000100);
        assert_eq!(assign_section(&mut regions, &text), 2);
        assert_eq!(regions[0].used(), 0x200);
        assert_eq!(regions[1].used(), 0x200);
    }

    #[test]
    fn test_crlf_and_trailing_whitespace() {
        let map = "Memory Configuration\r\nFLASH 0x08000000 0x00100000 xr   \r\n\r\nLinker script and memory map\r\n.text 0x08000000 0x40 build/main.o  \r\n";
        let mut regions = parse_regions(map);
        apply_map_sections(map, &mut regions);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].attributes, "xr");
        assert_eq!(regions[0].used(), 0x40);
    }

    #[test]
    fn test_records_stop_after_output() {
        let map = "\
Memory Configuration
FLASH 0x08000000 0x00100000 xr
Linker script and memory map
.text 0x08000000 0x40
OUTPUT(build/firmware.elf elf32-littlearm)
.late 0x08000100 0x40
";
        let mut records = MapRecords::new(map);
        assert!(matches!(records.next(), Some(MapRecord::Region(_))));
        assert!(matches!(records.next(), Some(MapRecord::Section(s)) if s.name == ".text"));
        assert_eq!(records.next(), None);
        assert_eq!(records.state(), ScanState::Done);
    }
}
