use std::{io::Write, str::FromStr};

use anyhow::{anyhow, Result};
use owo_colors::{OwoColorize, Stream};
use serde::Serialize;
use size::Size;

use crate::obj::{MemoryRegion, MemorySection, MemorySymbol, ParseResult};

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(anyhow!("Unknown output format '{s}', expected text or json")),
        }
    }
}

// For argp::FromArgs
pub fn output_format(value: &str) -> Result<OutputFormat, String> {
    value.parse().map_err(|e: anyhow::Error| e.to_string())
}

/// How deep into the tree to print.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd)]
pub enum Depth {
    Regions,
    #[default]
    Sections,
    Symbols,
}

impl FromStr for Depth {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "regions" => Ok(Self::Regions),
            "sections" => Ok(Self::Sections),
            "symbols" => Ok(Self::Symbols),
            _ => Err(anyhow!("Unknown depth '{s}', expected regions, sections or symbols")),
        }
    }
}

// For argp::FromArgs
pub fn depth(value: &str) -> Result<Depth, String> {
    value.parse().map_err(|e: anyhow::Error| e.to_string())
}

#[derive(Serialize)]
pub struct Report<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_folder: Option<&'a str>,
    pub regions: Vec<RegionReport<'a>>,
}

#[derive(Serialize)]
pub struct RegionReport<'a> {
    pub name: &'a str,
    pub address: u64,
    pub size: u64,
    pub used: u64,
    pub free: u64,
    pub attributes: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<SectionReport<'a>>,
}

#[derive(Serialize)]
pub struct SectionReport<'a> {
    pub name: &'a str,
    pub address: u64,
    pub size: u64,
    pub load_address: u64,
    #[serde(skip)]
    pub relocated: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub symbols: Vec<SymbolReport<'a>>,
}

#[derive(Serialize)]
pub struct SymbolReport<'a> {
    pub name: &'a str,
    pub address: u64,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl<'a> Report<'a> {
    pub fn new(result: &'a ParseResult, build_folder: Option<&'a str>, depth: Depth) -> Self {
        let regions = result.regions.iter().map(|r| RegionReport::new(r, depth)).collect();
        Self { build_folder, regions }
    }
}

impl<'a> RegionReport<'a> {
    fn new(region: &'a MemoryRegion, depth: Depth) -> Self {
        let sections = if depth >= Depth::Sections {
            region.sections.iter().map(|s| SectionReport::new(s, depth)).collect()
        } else {
            vec![]
        };
        Self {
            name: &region.name,
            address: region.address,
            size: region.size,
            used: region.used(),
            free: region.free(),
            attributes: &region.attributes,
            sections,
        }
    }

    pub fn percent_used(&self) -> f64 {
        if self.size == 0 {
            0.0
        } else {
            self.used as f64 * 100.0 / self.size as f64
        }
    }
}

impl<'a> SectionReport<'a> {
    fn new(section: &'a MemorySection, depth: Depth) -> Self {
        let symbols = if depth >= Depth::Symbols {
            section.symbols.iter().map(SymbolReport::new).collect()
        } else {
            vec![]
        };
        Self {
            name: &section.name,
            address: section.address,
            size: section.size,
            load_address: section.load_address,
            relocated: section.is_relocated(),
            symbols,
        }
    }
}

impl<'a> SymbolReport<'a> {
    fn new(symbol: &'a MemorySymbol) -> Self {
        Self {
            name: &symbol.name,
            address: symbol.address,
            size: symbol.size,
            path: symbol.location.as_ref().map(|l| l.path.as_str()),
            line: symbol.location.as_ref().map(|l| l.line),
        }
    }
}

fn bytes(n: u64) -> String { Size::from_bytes(n).to_string() }

fn paint_percent(percent: f64, color: bool) -> String {
    let text = format!("{percent:5.1}%");
    if !color {
        return text;
    }
    if percent >= 90.0 {
        text.if_supports_color(Stream::Stdout, |t| t.red()).to_string()
    } else if percent >= 75.0 {
        text.if_supports_color(Stream::Stdout, |t| t.yellow()).to_string()
    } else {
        text.if_supports_color(Stream::Stdout, |t| t.green()).to_string()
    }
}

pub fn write_json<W>(w: &mut W, report: &Report) -> Result<()>
where W: Write + ?Sized {
    serde_json::to_writer_pretty(&mut *w, report)?;
    writeln!(w)?;
    Ok(())
}

pub fn write_text<W>(w: &mut W, report: &Report, color: bool) -> Result<()>
where W: Write + ?Sized {
    if let Some(folder) = report.build_folder {
        writeln!(w, "Build folder: {folder}")?;
    }
    for region in &report.regions {
        writeln!(
            w,
            "{:<16} {:#010X}  {:>10} / {:<10} {}  {}",
            region.name,
            region.address,
            bytes(region.used),
            bytes(region.size),
            paint_percent(region.percent_used(), color),
            region.attributes,
        )?;
        for section in &region.sections {
            let size = bytes(section.size);
            write!(w, "  {:<24} {:#010X}  {:>10}", section.name, section.address, size)?;
            if section.relocated {
                write!(w, "  (load {:#010X})", section.load_address)?;
            }
            writeln!(w)?;
            for symbol in &section.symbols {
                write!(
                    w,
                    "    {:<40} {:#010X}  {:>10}",
                    symbol.name,
                    symbol.address,
                    bytes(symbol.size)
                )?;
                if let (Some(path), Some(line)) = (symbol.path, symbol.line) {
                    write!(w, "  {path}:{line}")?;
                }
                writeln!(w)?;
            }
        }
    }
    Ok(())
}
