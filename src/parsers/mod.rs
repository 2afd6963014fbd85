//! The parser framework.
//!
//! A [`Parser`] is a small session value: it knows which format it parses,
//! optionally holds bound data, and remembers the encoding and the warnings
//! of the last parse. The format specific work is done by a
//! [`FormatParser`] looked up in the [registry](crate::registry).

use std::io::{Read, Seek};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    encoding::EncodingDetector,
    error::{Error, Result},
    registry,
    subtitle::{Subtitle, SubtitleUnit},
};

pub mod microdvd;
pub mod srt;

/// A non-fatal issue found while parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseWarning {
    /// 1-based line number in the decoded text.
    pub line_number: usize,
    /// 1-based column.
    pub column: usize,
    /// The offending line.
    pub line: String,
    pub description: String,
}

impl std::fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Parse warning on line {} at column {} warning occurred '{}'",
            self.line_number, self.column, self.description
        )
    }
}

/// Options that influence how a file is interpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// Frame rate for frame based formats. Overrides a rate declared in the file.
    pub fps: Option<f64>,
}

/// State shared with a [`FormatParser`] during one parse.
#[derive(Debug)]
pub struct ParseContext<'a> {
    pub options: &'a ParseOptions,
    warnings: Vec<ParseWarning>,
}

impl<'a> ParseContext<'a> {
    pub fn new(options: &'a ParseOptions) -> Self {
        Self {
            options,
            warnings: Vec::new(),
        }
    }

    pub fn warn(
        &mut self,
        line_number: usize,
        column: usize,
        line: &str,
        description: impl Into<String>,
    ) {
        let warning = ParseWarning {
            line_number,
            column,
            line: line.to_owned(),
            description: description.into(),
        };
        debug!("{warning}");
        self.warnings.push(warning);
    }

    pub fn into_warnings(self) -> Vec<ParseWarning> {
        self.warnings
    }
}

/// The capabilities a subtitle format has to provide to be parsed.
pub trait FormatParser: Send + Sync {
    /// The name the format is registered under.
    fn name(&self) -> &'static str;

    /// ASCII sequences that any correct decoding of the file must preserve.
    fn markers(&self) -> &'static [&'static str];

    /// Quickly checks whether `text` looks like this format.
    fn can_parse(&self, text: &str) -> bool;

    /// Parses decoded `text` into units, recording issues on `context`.
    ///
    /// This never fails, broken entries are skipped or recovered.
    fn parse_units(&self, text: &str, context: &mut ParseContext<'_>) -> Vec<SubtitleUnit>;
}

/// A parser session for one format.
pub struct Parser {
    format: &'static dyn FormatParser,
    options: ParseOptions,
    data: Option<(Vec<u8>, Option<String>)>,
    encoding: Option<&'static str>,
    warnings: Vec<ParseWarning>,
}

impl std::fmt::Debug for Parser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parser")
            .field("format", &self.format.name())
            .field("options", &self.options)
            .field("bound", &self.data.is_some())
            .field("encoding", &self.encoding)
            .field("warnings", &self.warnings.len())
            .finish()
    }
}

impl Parser {
    fn new(format: &'static dyn FormatParser) -> Self {
        Self {
            format,
            options: ParseOptions::default(),
            data: None,
            encoding: None,
            warnings: Vec::new(),
        }
    }

    /// Returns a parser for the format registered under `name`.
    pub fn from_format(name: &str) -> Result<Self> {
        registry::parser(name)
            .map(Self::new)
            .ok_or_else(|| Error::FormatNotRegistered(name.to_owned()))
    }

    /// Returns a parser bound to `data`, picking the format from its content.
    ///
    /// `encoding` is kept as the hint for the later [`Parser::parse`] calls.
    pub fn from_data(data: impl Into<Vec<u8>>, encoding: Option<&str>) -> Result<Self> {
        let data = data.into();
        // Every structural marker is ASCII, a lossy view is enough to sniff.
        let view = String::from_utf8_lossy(&data);
        let format = registry::parsers()
            .iter()
            .copied()
            .find(|p| p.can_parse(&view))
            .ok_or(Error::FormatNotDetected)?;
        debug!("detected {} data", format.name());
        Ok(Self::new(format).with_data(data, encoding))
    }

    /// Binds `data` so it can be parsed with [`Parser::parse`].
    pub fn with_data(mut self, data: impl Into<Vec<u8>>, encoding: Option<&str>) -> Self {
        self.data = Some((data.into(), encoding.map(str::to_owned)));
        self
    }

    pub fn with_options(mut self, options: ParseOptions) -> Self {
        self.options = options;
        self
    }

    /// Parses the bound data. Repeated calls give equal results.
    pub fn parse(&mut self) -> Result<Subtitle> {
        let (data, hint) = self.data.take().ok_or(Error::NoData)?;
        let result = self.parse_bytes(&data, hint.as_deref());
        self.data = Some((data, hint));
        result
    }

    /// Parses the rest of `reader`, leaving it where it started.
    pub fn parse_reader<R: Read + Seek>(
        &mut self,
        mut reader: R,
        encoding: Option<&str>,
    ) -> Result<Subtitle> {
        self.reset();
        let data = crate::utils::read_rewound(&mut reader)?;
        self.parse_bytes(&data, encoding)
    }

    /// Parses an in-memory text buffer.
    pub fn parse_str(&mut self, text: &str) -> Result<Subtitle> {
        self.parse_bytes(text.as_bytes(), None)
    }

    /// Parses raw bytes, using `encoding` as the first encoding to try.
    pub fn parse_bytes(&mut self, data: &[u8], encoding: Option<&str>) -> Result<Subtitle> {
        self.reset();
        let decoded =
            EncodingDetector::with_markers(self.format.markers()).detect_and_decode(data, encoding)?;
        self.encoding = Some(decoded.encoding.name());

        let text = crate::utils::normalize_text(&decoded.text);
        let mut context = ParseContext::new(&self.options);
        let units = self.format.parse_units(&text, &mut context);
        self.warnings = context.into_warnings();
        debug!(
            "parsed {} units from {} data with {} warnings",
            units.len(),
            self.format.name(),
            self.warnings.len()
        );
        Ok(units.into_iter().collect())
    }

    fn reset(&mut self) {
        self.encoding = None;
        self.warnings.clear();
    }

    /// The name of the format this parser handles.
    pub fn format(&self) -> &'static str {
        self.format.name()
    }

    /// The encoding used by the last parse.
    pub fn encoding(&self) -> Option<&'static str> {
        self.encoding
    }

    /// The warnings collected by the last parse.
    pub fn warnings(&self) -> &[ParseWarning] {
        &self.warnings
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Seek, SeekFrom, Write};

    // "š" and "ž" in windows-1250, plus a dot timestamp for a warning
    const SAMPLE: &[u8] = b"1\r\n00:00:15,000 --> 00:00:30,000\r\nFirst line with \x9a\r\n\r\n2\r\n00:01:05.000 --> 00:01:29,000\r\nA two liner \x9e\r\nYes, two\r\n";

    #[test]
    fn test_unknown_format() {
        assert!(matches!(
            Parser::from_format("subrip"),
            Err(Error::FormatNotRegistered(name)) if name == "subrip"
        ));
    }

    #[test]
    fn test_source_forms_are_equivalent() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(SAMPLE).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();

        let mut parser = Parser::from_format("SubRip").unwrap();
        let sub1 = parser.parse_reader(&mut file, None).unwrap();
        let state1 = (parser.encoding(), parser.warnings().to_vec());
        // The stream is left for a fresh full read
        assert_eq!(file.stream_position().unwrap(), 0);

        let sub2 = parser.parse_bytes(SAMPLE, None).unwrap();
        let state2 = (parser.encoding(), parser.warnings().to_vec());

        let mut bound = Parser::from_data(SAMPLE, None).unwrap();
        assert_eq!(bound.format(), "SubRip");
        let sub3 = bound.parse().unwrap();
        let state3 = (bound.encoding(), bound.warnings().to_vec());
        let sub4 = bound.parse().unwrap();

        let sub5 = parser.parse_reader(Cursor::new(SAMPLE), None).unwrap();

        assert_eq!(sub1, sub2);
        assert_eq!(sub2, sub3);
        assert_eq!(sub3, sub4);
        assert_eq!(sub4, sub5);
        assert_eq!(state1, state2);
        assert_eq!(state2, state3);
        assert_eq!(state1.0, Some("windows-1250"));
        assert_eq!(state1.1.len(), 1);
        assert_eq!(sub1[0][0].text, "First line with š");
        assert_eq!(sub1[1][0].text, "A two liner ž");
    }

    #[test]
    fn test_bogus_hint_is_tolerated() {
        let mut parser = Parser::from_format("SubRip").unwrap();
        let hinted = parser.parse_bytes(SAMPLE, Some("bullshit")).unwrap();
        let plain = parser.parse_bytes(SAMPLE, None).unwrap();
        assert_eq!(hinted, plain);
        assert_eq!(parser.encoding(), Some("windows-1250"));
    }

    #[test]
    fn test_exhaustion_is_fatal() {
        let raw = b"1\n00:00:01,000 --> 00:00:02,000\n\x81\x98\n";
        let mut parser = Parser::from_format("SubRip").unwrap();
        parser.parse_str("1\n00:00:01,000 --> 00:00:02,000\nok\n").unwrap();
        match parser.parse_bytes(raw, Some("bullshit")) {
            Err(Error::EncodingExhausted { tried_encodings }) => assert_eq!(
                tried_encodings,
                [
                    "bullshit",
                    "UTF-8",
                    "windows-1250",
                    "windows-1252",
                    "windows-1251",
                    "ISO-8859-2"
                ]
            ),
            other => panic!("expected exhaustion, got {other:?}"),
        }
        // Session state belongs to the failed call
        assert_eq!(parser.encoding(), None);
        assert!(parser.warnings().is_empty());
    }

    #[test]
    fn test_warnings_reset_between_parses() {
        let mut parser = Parser::from_format("SubRip").unwrap();
        parser.parse_bytes(SAMPLE, None).unwrap();
        assert!(!parser.warnings().is_empty());
        parser
            .parse_str("1\n00:00:01,000 --> 00:00:02,000\nclean\n")
            .unwrap();
        assert!(parser.warnings().is_empty());
        assert_eq!(parser.encoding(), Some("UTF-8"));
    }

    #[test]
    fn test_from_data_detects_format() {
        let parser = Parser::from_data(&b"{0}{25}Hello|World\n"[..], None).unwrap();
        assert_eq!(parser.format(), "MicroDVD");
        assert!(matches!(
            Parser::from_data(&b"just some text"[..], None),
            Err(Error::FormatNotDetected)
        ));
        let mut unbound = Parser::from_format("MicroDVD").unwrap();
        assert!(matches!(unbound.parse(), Err(Error::NoData)));
    }

    #[test]
    fn test_options_reach_the_format() {
        let mut parser = Parser::from_format("MicroDVD")
            .unwrap()
            .with_options(ParseOptions { fps: Some(25.0) })
            .with_data(&b"{25}{50}Hi\n"[..], None);
        let sub = parser.parse().unwrap();
        assert_eq!(sub[0].start, 1.0);
        assert_eq!(sub[0].end, 2.0);
    }
}
