//! The table of known formats.
//!
//! Both tables are built at compile time and never change, so lookups need
//! no synchronization.

use crate::{
    exporters::{self, FormatExporter},
    parsers::{self, FormatParser},
};

static PARSERS: [&dyn FormatParser; 2] = [
    &parsers::srt::SubRipParser,
    &parsers::microdvd::MicroDvdParser,
];

static EXPORTERS: [&dyn FormatExporter; 1] = [&exporters::srt::SubRipExporter];

/// Every registered parser, in detection order.
pub fn parsers() -> &'static [&'static dyn FormatParser] {
    &PARSERS
}

/// Every registered exporter.
pub fn exporters() -> &'static [&'static dyn FormatExporter] {
    &EXPORTERS
}

/// Looks up a parser by its exact (case sensitive) format name.
pub fn parser(name: &str) -> Option<&'static dyn FormatParser> {
    PARSERS.iter().copied().find(|p| p.name() == name)
}

/// Looks up an exporter by its exact (case sensitive) format name.
pub fn exporter(name: &str) -> Option<&'static dyn FormatExporter> {
    EXPORTERS.iter().copied().find(|e| e.name() == name)
}
