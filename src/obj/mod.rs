//! In-memory model of a memory usage report: regions contain sections,
//! sections contain symbols. Parent links are never stored; membership is
//! decided once, by address containment, when the tree is built.

use std::ops::Range;

/// A named address range declared in the linker script's `MEMORY` block.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MemoryRegion {
    pub name: String,
    pub address: u64,
    pub size: u64,
    /// Access attribute flags as written in the map (e.g. `xr`), possibly empty.
    pub attributes: String,
    pub sections: Vec<MemorySection>,
}

impl MemoryRegion {
    pub fn new(name: String, address: u64, size: u64, attributes: String) -> Self {
        Self { name, address, size, attributes, sections: vec![] }
    }

    #[inline]
    pub fn end(&self) -> u64 { self.address.saturating_add(self.size) }

    #[inline]
    pub fn range(&self) -> Range<u64> { self.address..self.end() }

    #[inline]
    pub fn contains(&self, addr: u64) -> bool { self.range().contains(&addr) }

    /// Bytes consumed by the sections placed in this region.
    pub fn used(&self) -> u64 {
        self.sections.iter().map(|s| s.size).fold(0, u64::saturating_add)
    }

    pub fn free(&self) -> u64 { self.size.saturating_sub(self.used()) }

    pub fn section_at_mut(&mut self, addr: u64) -> Option<&mut MemorySection> {
        self.sections.iter_mut().find(|s| s.contains(addr))
    }
}

/// An output section placed by the linker.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MemorySection {
    pub name: String,
    /// Virtual (run-time) address.
    pub address: u64,
    pub size: u64,
    /// Where the initial contents are stored; equals `address` unless the
    /// section is copied into place at startup.
    pub load_address: u64,
    pub symbols: Vec<MemorySymbol>,
}

impl MemorySection {
    pub fn new(name: String, address: u64, size: u64, load_address: u64) -> Self {
        Self { name, address, size, load_address, symbols: vec![] }
    }

    #[inline]
    pub fn end(&self) -> u64 { self.address.saturating_add(self.size) }

    #[inline]
    pub fn contains(&self, addr: u64) -> bool { (self.address..self.end()).contains(&addr) }

    #[inline]
    pub fn is_relocated(&self) -> bool { self.load_address != self.address }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SourceLocation {
    pub path: String,
    pub line: u32,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MemorySymbol {
    pub name: String,
    pub address: u64,
    /// Zero when the symbol table did not list a size.
    pub size: u64,
    pub location: Option<SourceLocation>,
}

/// The complete region tree produced by one parse.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ParseResult {
    pub regions: Vec<MemoryRegion>,
}

impl ParseResult {
    pub fn region(&self, name: &str) -> Option<&MemoryRegion> {
        self.regions.iter().find(|r| r.name == name)
    }

    pub fn section_count(&self) -> usize { self.regions.iter().map(|r| r.sections.len()).sum() }

    pub fn symbol_count(&self) -> usize {
        self.regions.iter().flat_map(|r| &r.sections).map(|s| s.symbols.len()).sum()
    }
}
