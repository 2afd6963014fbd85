//! The Subtitle Intermediate Format (SIF).
//!
//! SIF is the crate's own lossless serialization of a [`Subtitle`],
//! including per-line styles. Each document is framed as
//!
//! ```text
//! SIF/1 <payload length>\n
//! <payload: JSON>\n
//! ```
//!
//! so a reader knows exactly where a document ends and several documents
//! can be written back to back on one stream, compressed or not.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, ErrorKind, Read, Write},
    path::Path,
};

use flate2::{bufread::MultiGzDecoder, write::GzEncoder, Compression};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    subtitle::{Line, Subtitle, SubtitleUnit},
    utils::{format_duration, parse_duration},
};

const MAGIC: &str = "SIF/1";
const MAX_HEADER_LENGTH: usize = 64;
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// How a document is written.
///
/// Whether the stream is closed afterwards follows ownership: `save(writer)`
/// drops (and so closes) the writer, `save(&mut writer)` keeps it open for
/// further documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveOptions {
    /// Write times as `HH:MM:SS.sss` strings instead of plain seconds.
    pub human_time: bool,
    /// Write non-ASCII text as is instead of `\uXXXX` escapes.
    pub allow_unicode: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            human_time: true,
            allow_unicode: true,
        }
    }
}

/// The result of [`Subtitle::from_file`].
#[derive(Debug, Clone, PartialEq)]
pub enum SifDocuments {
    Single(Subtitle),
    Multi(Vec<Subtitle>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
enum Time {
    Seconds(f64),
    Human(String),
}

impl Time {
    fn new(seconds: f64, human: bool) -> Self {
        // Above 2^53 whole seconds can no longer be split off exactly.
        if human
            && !seconds.is_sign_negative()
            && (0.0..9_007_199_254_740_992.0).contains(&seconds)
        {
            Time::Human(format_duration(seconds))
        } else {
            Time::Seconds(seconds)
        }
    }

    fn seconds(&self) -> Result<f64> {
        match self {
            Time::Seconds(seconds) => Ok(*seconds),
            Time::Human(s) => parse_duration(s).ok_or_else(|| Error::Sif(format!("invalid time '{s}'"))),
        }
    }
}

#[derive(Serialize)]
struct UnitRef<'a> {
    start: Time,
    end: Time,
    lines: &'a [Line],
}

#[derive(Serialize)]
struct DocumentRef<'a> {
    units: Vec<UnitRef<'a>>,
}

#[derive(Deserialize)]
struct UnitRecord {
    start: Time,
    end: Time,
    #[serde(default)]
    lines: Vec<Line>,
}

#[derive(Deserialize)]
struct Document {
    units: Vec<UnitRecord>,
}

/// A JSON formatter that escapes everything outside of ASCII.
struct AsciiFormatter;

impl serde_json::ser::Formatter for AsciiFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> std::io::Result<()>
    where
        W: ?Sized + Write,
    {
        let mut start = 0;
        for (index, ch) in fragment.char_indices() {
            if ch.is_ascii() {
                continue;
            }
            writer.write_all(fragment[start..index].as_bytes())?;
            let mut buffer = [0u16; 2];
            for unit in ch.encode_utf16(&mut buffer) {
                write!(writer, "\\u{unit:04x}")?;
            }
            start = index + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

fn encode_payload(subtitle: &Subtitle, options: &SaveOptions) -> Result<Vec<u8>> {
    let document = DocumentRef {
        units: subtitle
            .iter()
            .map(|unit| UnitRef {
                start: Time::new(unit.start, options.human_time),
                end: Time::new(unit.end, options.human_time),
                lines: &unit.lines,
            })
            .collect(),
    };

    let mut payload = Vec::new();
    if options.allow_unicode {
        serde_json::to_writer(&mut payload, &document)?;
    } else {
        let mut serializer = serde_json::Serializer::with_formatter(&mut payload, AsciiFormatter);
        document.serialize(&mut serializer)?;
    }
    Ok(payload)
}

/// Reads the document header, `None` on a clean end of stream.
///
/// Reads one byte at a time so nothing past the header is consumed.
fn read_header<R: Read>(reader: &mut R) -> Result<Option<u64>> {
    let mut header = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) if header.is_empty() => return Ok(None),
            Ok(0) => return Err(Error::Sif("stream ends inside a document header".into())),
            Ok(_) if byte[0] == b'\n' => break,
            Ok(_) => {
                header.push(byte[0]);
                if header.len() > MAX_HEADER_LENGTH {
                    return Err(Error::Sif("document header is too long".into()));
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    let header = String::from_utf8_lossy(&header);
    header
        .strip_prefix(MAGIC)
        .and_then(|rest| rest.strip_prefix(' '))
        .and_then(|length| length.parse().ok())
        .map(Some)
        .ok_or_else(|| Error::Sif(format!("invalid document header '{header}'")))
}

fn read_document<R: Read>(reader: &mut R) -> Result<Option<Subtitle>> {
    let Some(length) = read_header(reader)? else {
        return Ok(None);
    };

    let mut payload = Vec::new();
    reader.by_ref().take(length).read_to_end(&mut payload)?;
    if payload.len() as u64 != length {
        return Err(Error::Sif(format!(
            "document is truncated ({} of {length} bytes)",
            payload.len()
        )));
    }
    let mut terminator = [0u8; 1];
    match reader.read_exact(&mut terminator) {
        Ok(()) if terminator[0] == b'\n' => {}
        Ok(()) => return Err(Error::Sif("document is not terminated by a newline".into())),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
            return Err(Error::Sif("stream ends before the document terminator".into()))
        }
        Err(e) => return Err(e.into()),
    }

    let document: Document = serde_json::from_slice(&payload)?;
    let subtitle = document
        .units
        .into_iter()
        .map(|unit| {
            Ok(SubtitleUnit {
                start: unit.start.seconds()?,
                end: unit.end.seconds()?,
                lines: unit.lines,
            })
        })
        .collect::<Result<Subtitle>>()?;
    debug!("read SIF document with {} units", subtitle.len());
    Ok(Some(subtitle))
}

fn open_maybe_gzipped(path: &Path) -> Result<Box<dyn Read>> {
    let mut reader = BufReader::new(File::open(path)?);
    if reader.fill_buf()?.starts_with(&GZIP_MAGIC) {
        debug!("{} is gzip compressed", path.display());
        Ok(Box::new(MultiGzDecoder::new(reader)))
    } else {
        Ok(Box::new(reader))
    }
}

impl Subtitle {
    /// Writes this subtitle as one SIF document.
    ///
    /// The writer is flushed. Pass `&mut writer` to keep it open and append
    /// more documents.
    pub fn save<W: Write>(&self, mut writer: W, options: &SaveOptions) -> Result<()> {
        let payload = encode_payload(self, options)?;
        writeln!(writer, "{MAGIC} {}", payload.len())?;
        writer.write_all(&payload)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    /// Saves to `path`, gzip compressed when it ends in `.gz`.
    pub fn save_to_path(&self, path: &Path, options: &SaveOptions) -> Result<()> {
        let file = File::create(path)?;
        if path.extension().is_some_and(|ext| ext == "gz") {
            let mut encoder = GzEncoder::new(file, Compression::default());
            self.save(&mut encoder, options)?;
            encoder.finish()?;
        } else {
            self.save(BufWriter::new(file), options)?;
        }
        Ok(())
    }

    /// Reads exactly one SIF document, leaving the reader at the next one.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Subtitle> {
        read_document(&mut reader)?.ok_or_else(|| Error::Sif("stream has no document".into()))
    }

    /// Reads every SIF document until the end of the stream.
    pub fn from_reader_multi<R: Read>(mut reader: R) -> Result<Vec<Subtitle>> {
        let mut documents = Vec::new();
        while let Some(subtitle) = read_document(&mut reader)? {
            documents.push(subtitle);
        }
        Ok(documents)
    }

    /// Reads one document, or every document when `multi` is set.
    pub fn from_file<R: Read>(reader: R, multi: bool) -> Result<SifDocuments> {
        if multi {
            Self::from_reader_multi(reader).map(SifDocuments::Multi)
        } else {
            Self::from_reader(reader).map(SifDocuments::Single)
        }
    }

    /// Reads one document from a plain or gzip compressed file.
    pub fn open(path: &Path) -> Result<Subtitle> {
        Self::from_reader(open_maybe_gzipped(path)?)
    }

    /// Reads every document from a plain or gzip compressed file.
    pub fn open_multi(path: &Path) -> Result<Vec<Subtitle>> {
        Self::from_reader_multi(open_maybe_gzipped(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Cursor;

    fn sample(offset: f64) -> Subtitle {
        let mut subtitle = Subtitle::new();
        subtitle.add_unit(SubtitleUnit::new(
            15.0 + offset,
            30.0 + offset,
            ["First line with \u{161}"],
        ));
        subtitle.add_unit(SubtitleUnit {
            start: 65.125 + offset,
            end: 89.1 + offset,
            lines: vec![
                Line::new("Another, but a two liner \u{10d}").with_style("color", "red"),
                Line::new("Yes, I  said two liner! \u{17e} \u{1F600}")
                    .with_style("font", "Arial \u{10d}"),
            ],
        });
        subtitle
    }

    fn all_options() -> Vec<SaveOptions> {
        let mut options = Vec::new();
        for human_time in [true, false] {
            for allow_unicode in [true, false] {
                options.push(SaveOptions {
                    human_time,
                    allow_unicode,
                });
            }
        }
        options
    }

    #[test]
    fn test_sif() {
        let subtitle = sample(0.0);
        for options in all_options() {
            let mut buffer = Vec::new();
            subtitle.save(&mut buffer, &options).unwrap();
            assert_eq!(Subtitle::from_reader(&buffer[..]).unwrap(), subtitle, "{options:?}");
        }
    }

    #[test]
    fn test_time_representations() {
        let mut subtitle = Subtitle::new();
        subtitle.add_unit(SubtitleUnit::new(3665.1, 90061.25, ["x"]));

        let mut human = Vec::new();
        subtitle.save(&mut human, &SaveOptions::default()).unwrap();
        let human = String::from_utf8(human).unwrap();
        assert!(human.contains(r#""end":"25:01:01.25""#), "{human}");

        let mut numeric = Vec::new();
        let options = SaveOptions {
            human_time: false,
            ..SaveOptions::default()
        };
        subtitle.save(&mut numeric, &options).unwrap();
        let numeric = String::from_utf8(numeric).unwrap();
        assert!(numeric.contains(r#""end":90061.25"#), "{numeric}");
    }

    #[test]
    fn test_ascii_output() {
        let options = SaveOptions {
            allow_unicode: false,
            ..SaveOptions::default()
        };
        let mut buffer = Vec::new();
        sample(0.0).save(&mut buffer, &options).unwrap();
        assert!(buffer.is_ascii());
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains(r"\u0161"));
        assert!(text.contains(r"\ud83d\ude00"));
    }

    #[test]
    fn test_documents_are_self_delimiting() {
        let mut stream = Vec::new();
        sample(0.0).save(&mut stream, &SaveOptions::default()).unwrap();
        let first_length = stream.len();
        sample(1.0).save(&mut stream, &SaveOptions::default()).unwrap();

        let mut cursor = Cursor::new(stream);
        assert_eq!(Subtitle::from_reader(&mut cursor).unwrap(), sample(0.0));
        assert_eq!(cursor.position() as usize, first_length);
        assert_eq!(Subtitle::from_reader(&mut cursor).unwrap(), sample(1.0));
        assert!(matches!(Subtitle::from_reader(&mut cursor), Err(Error::Sif(_))));
    }

    #[test]
    fn test_multi_sif_gz() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        sample(0.0).save(&mut encoder, &SaveOptions::default()).unwrap();
        let numeric = SaveOptions {
            human_time: false,
            allow_unicode: false,
        };
        sample(1.0).save(&mut encoder, &numeric).unwrap();
        sample(2.0).save(&mut encoder, &SaveOptions::default()).unwrap();
        let compressed = encoder.finish().unwrap();

        let documents = Subtitle::from_reader_multi(GzDecoder::new(&compressed[..])).unwrap();
        assert_eq!(documents, vec![sample(0.0), sample(1.0), sample(2.0)]);

        match Subtitle::from_file(GzDecoder::new(&compressed[..]), false).unwrap() {
            SifDocuments::Single(subtitle) => assert_eq!(subtitle, sample(0.0)),
            other => panic!("expected a single document, got {other:?}"),
        }
    }

    #[test]
    fn test_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["plain.sif", "compressed.sif.gz"] {
            let path = dir.path().join(name);
            sample(0.0).save_to_path(&path, &SaveOptions::default()).unwrap();
            assert_eq!(Subtitle::open(&path).unwrap(), sample(0.0));
            assert_eq!(Subtitle::open_multi(&path).unwrap(), vec![sample(0.0)]);
        }

        // Closing is a matter of handing over the writer
        let path = dir.path().join("owned.sif");
        sample(3.0)
            .save(File::create(&path).unwrap(), &SaveOptions::default())
            .unwrap();
        assert_eq!(Subtitle::open(&path).unwrap(), sample(3.0));
    }

    #[test]
    fn test_broken_streams() {
        let mut stream = Vec::new();
        sample(0.0).save(&mut stream, &SaveOptions::default()).unwrap();

        let truncated = &stream[..stream.len() - 5];
        assert!(matches!(Subtitle::from_reader(truncated), Err(Error::Sif(_))));
        assert!(matches!(
            Subtitle::from_reader(&b"NOPE 12\n"[..]),
            Err(Error::Sif(_))
        ));
        assert!(matches!(
            Subtitle::from_reader(&b"SIF/1 2\n{]\n"[..]),
            Err(Error::Json(_))
        ));
        assert!(Subtitle::from_reader_multi(&b""[..]).unwrap().is_empty());

        let payload = r#"{"units":[{"start":"99999999999999999:00:00","end":1.0,"lines":[]}]}"#;
        let huge = format!("SIF/1 {}\n{payload}\n", payload.len());
        assert!(matches!(
            Subtitle::from_reader(huge.as_bytes()),
            Err(Error::Sif(message)) if message.contains("invalid time")
        ));
    }

    #[test]
    fn test_negative_zero() {
        let mut subtitle = Subtitle::new();
        subtitle.add_unit(SubtitleUnit::new(-0.0, 1.0, ["x"]));
        subtitle.add_unit(SubtitleUnit::new(-1.5, -0.25, ["y"]));
        for options in all_options() {
            let mut buffer = Vec::new();
            subtitle.save(&mut buffer, &options).unwrap();
            let loaded = Subtitle::from_reader(&buffer[..]).unwrap();
            assert_eq!(loaded, subtitle, "{options:?}");
            assert!(loaded[0].start.is_sign_negative());
        }
    }
}
