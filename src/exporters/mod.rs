//! The exporter framework.
//!
//! An [`Exporter`] pairs a registered [`FormatExporter`] with its
//! [`ExportOptions`] and writes a [`Subtitle`] to any writer.

use std::io::Write;

use encoding_rs::Encoding;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    encoding,
    error::{Error, Result},
    registry,
    subtitle::{Subtitle, SubtitleUnit},
};

pub mod srt;

/// The line terminator written by exporters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Label of the output encoding, e.g. `utf-8` or `cp1250`.
    pub encoding: String,
    pub line_ending: LineEnding,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            encoding: "utf-8".to_owned(),
            line_ending: LineEnding::Lf,
        }
    }
}

impl ExportOptions {
    pub fn with_encoding(encoding: impl Into<String>) -> Self {
        Self {
            encoding: encoding.into(),
            ..Self::default()
        }
    }
}

/// The pieces a subtitle format has to provide to be exported.
///
/// Every method appends text to `out`; encoding to bytes is done by
/// [`Exporter`].
pub trait FormatExporter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Subtitle wide data written before the first unit.
    fn export_header(&self, _subtitle: &Subtitle, _eol: &str, _out: &mut String) {}

    /// Writes the unit at 0-based position `index`.
    fn export_unit(&self, index: usize, unit: &SubtitleUnit, eol: &str, out: &mut String);

    /// Data written after the last unit.
    fn export_footer(&self, _subtitle: &Subtitle, _eol: &str, _out: &mut String) {}
}

/// Writes subtitles in one format with a fixed configuration.
pub struct Exporter {
    format: &'static dyn FormatExporter,
    encoding: &'static Encoding,
    options: ExportOptions,
}

impl std::fmt::Debug for Exporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exporter")
            .field("format", &self.format.name())
            .field("encoding", &self.encoding.name())
            .field("line_ending", &self.options.line_ending)
            .finish()
    }
}

impl Exporter {
    /// Returns an exporter for the format registered under `name`.
    pub fn from_format(name: &str, options: ExportOptions) -> Result<Self> {
        let format = registry::exporter(name).ok_or_else(|| Error::NoExporterFound(name.to_owned()))?;
        let encoding = encoding::resolve(&options.encoding)
            .ok_or_else(|| Error::UnknownEncoding(options.encoding.clone()))?;
        Ok(Self {
            format,
            encoding,
            options,
        })
    }

    pub fn format(&self) -> &'static str {
        self.format.name()
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Renders `subtitle` as text, before encoding.
    pub fn export_to_string(&self, subtitle: &Subtitle) -> String {
        let eol = self.options.line_ending.as_str();
        let mut output = String::new();
        self.format.export_header(subtitle, eol, &mut output);
        for (index, unit) in subtitle.iter().enumerate() {
            self.format.export_unit(index, unit, eol, &mut output);
        }
        self.format.export_footer(subtitle, eol, &mut output);
        output
    }

    /// Writes `subtitle` to `output`. The writer is flushed, not closed.
    pub fn export<W: Write>(&self, output: &mut W, subtitle: &Subtitle) -> Result<()> {
        let bytes = encoding::encode_lossy(self.encoding, &self.export_to_string(subtitle));
        debug!(
            "exporting {} units as {} ({} bytes of {})",
            subtitle.len(),
            self.format.name(),
            bytes.len(),
            self.encoding.name()
        );
        output.write_all(&bytes)?;
        output.flush()?;
        Ok(())
    }
}
