//! Reading, converting and serializing text subtitles.
//!
//! Subtitle files are decoded with [`encoding`] detection, parsed by a
//! [`Parser`] for one of the [registered](registry) formats into a
//! [`Subtitle`], and written back out by an [`Exporter`] or as SIF, the
//! crate's own [intermediate format](sif).

pub mod encoding;
pub mod error;
pub mod exporters;
pub mod parsers;
pub mod registry;
pub mod sif;
pub mod subtitle;
pub(crate) mod utils;

pub use error::{Error, Result};
pub use exporters::{ExportOptions, Exporter, LineEnding};
pub use parsers::{ParseOptions, ParseWarning, Parser};
pub use sif::{SaveOptions, SifDocuments};
pub use subtitle::{Line, Subtitle, SubtitleUnit};
