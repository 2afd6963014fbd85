use std::fmt::Write;

use super::FormatExporter;
use crate::subtitle::SubtitleUnit;

pub const FORMAT: &str = "SubRip";

/// Formats seconds as `HH:MM:SS,mmm`, rounded to the millisecond.
///
/// Hours keep counting past 23.
pub(crate) fn format_srt_time(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let (seconds, ms) = (total_ms / 1000, total_ms % 1000);
    let (hours, seconds) = (seconds / 3600, seconds % 3600);
    let (minutes, seconds) = (seconds / 60, seconds % 60);
    format!("{hours:02}:{minutes:02}:{seconds:02},{ms:03}")
}

/// Writes SubRip, numbering units from 1 by position.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubRipExporter;

impl FormatExporter for SubRipExporter {
    fn name(&self) -> &'static str {
        FORMAT
    }

    fn export_unit(&self, index: usize, unit: &SubtitleUnit, eol: &str, out: &mut String) {
        if index > 0 {
            out.push_str(eol);
        }
        let _ = write!(
            out,
            "{}{eol}{} --> {}{eol}",
            index + 1,
            format_srt_time(unit.start),
            format_srt_time(unit.end)
        );
        for line in &unit.lines {
            out.push_str(&line.text);
            out.push_str(eol);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        exporters::{ExportOptions, Exporter, LineEnding},
        subtitle::{Subtitle, SubtitleUnit},
    };

    fn sample() -> Subtitle {
        let mut subtitle = Subtitle::new();
        subtitle.add_unit(SubtitleUnit::new(15.0, 30.0, ["First line with \u{161}"]));
        subtitle.add_unit(SubtitleUnit::new(
            65.0,
            89.0,
            ["Another, but a two liner \u{10d}", "Yes, I  said two liner! \u{17e}"],
        ));
        subtitle.add_unit(SubtitleUnit::new(
            3665.0,
            3689.0,
            ["Another, but a two liner \u{10d}", "Yes, I  said two liner! \u{17e}"],
        ));
        subtitle
    }

    #[test]
    fn test_format_srt_time() {
        assert_eq!(format_srt_time(0.0), "00:00:00,000");
        assert_eq!(format_srt_time(22.814), "00:00:22,814");
        assert_eq!(format_srt_time(0.9996), "00:00:01,000");
        assert_eq!(format_srt_time(90061.25), "25:01:01,250");
    }

    #[test]
    fn test_subrip_export() {
        let exporter = Exporter::from_format("SubRip", ExportOptions::default()).unwrap();
        let mut buf = Vec::new();
        exporter.export(&mut buf, &sample()).unwrap();
        let expected = "1\n\
            00:00:15,000 --> 00:00:30,000\n\
            First line with \u{161}\n\
            \n\
            2\n\
            00:01:05,000 --> 00:01:29,000\n\
            Another, but a two liner \u{10d}\n\
            Yes, I  said two liner! \u{17e}\n\
            \n\
            3\n\
            01:01:05,000 --> 01:01:29,000\n\
            Another, but a two liner \u{10d}\n\
            Yes, I  said two liner! \u{17e}\n";
        assert_eq!(buf, expected.as_bytes());

        let exporter =
            Exporter::from_format("SubRip", ExportOptions::with_encoding("cp1250")).unwrap();
        let mut buf = Vec::new();
        exporter.export(&mut buf, &sample()).unwrap();
        let expected: &[u8] = b"1\n\
            00:00:15,000 --> 00:00:30,000\n\
            First line with \x9a\n\
            \n\
            2\n\
            00:01:05,000 --> 00:01:29,000\n\
            Another, but a two liner \xe8\n\
            Yes, I  said two liner! \x9e\n\
            \n\
            3\n\
            01:01:05,000 --> 01:01:29,000\n\
            Another, but a two liner \xe8\n\
            Yes, I  said two liner! \x9e\n";
        assert_eq!(buf, expected);
    }

    #[test]
    fn test_crlf_and_empty() {
        let options = ExportOptions {
            line_ending: LineEnding::CrLf,
            ..ExportOptions::default()
        };
        let exporter = Exporter::from_format("SubRip", options).unwrap();
        let mut subtitle = Subtitle::new();
        subtitle.add_unit(SubtitleUnit::new(1.5, 2.0, ["a", "b"]));
        subtitle.add_unit(SubtitleUnit::new(3.0, 4.0, ["c"]));
        assert_eq!(
            exporter.export_to_string(&subtitle),
            "1\r\n00:00:01,500 --> 00:00:02,000\r\na\r\nb\r\n\r\n2\r\n00:00:03,000 --> 00:00:04,000\r\nc\r\n"
        );
        assert_eq!(exporter.export_to_string(&Subtitle::new()), "");
    }
}
