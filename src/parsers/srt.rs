//! A lenient parser for SubRip (.srt) subtitles.

use std::sync::OnceLock;

use regex::Regex;

use super::{FormatParser, ParseContext};
use crate::subtitle::{Line, SubtitleUnit};

pub const FORMAT: &str = "SubRip";

fn time_line_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(
            r#"(?x)
        ^\s*
        (?P<start>\d+:\d{1,2}:\d{1,2}[,.]\d{1,3})
        \s*-->\s*
        (?P<end>\d+:\d{1,2}:\d{1,2}[,.]\d{1,3})
        (?P<rest>.*)$"#,
        )
        .unwrap()
    })
}

fn position_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r#"^\s*X1:\s*\d+\s+X2:\s*\d+\s+Y1:\s*\d+\s+Y2:\s*\d+\s*$"#).unwrap()
    })
}

/// Parses `HH:MM:SS,mmm` into seconds.
///
/// The second value is `true` when a dot was used instead of the comma.
pub(crate) fn parse_srt_time(s: &str) -> Option<(f64, bool)> {
    let (rest, ms) = s.split_once([',', '.'])?;
    let dot = s.as_bytes()[rest.len()] == b'.';
    let mut split = rest.trim().splitn(3, ':');
    let hours: u64 = split.next()?.parse().ok()?;
    let minutes: u64 = split.next()?.parse().ok()?;
    let seconds: u64 = split.next()?.parse().ok()?;
    let seconds = hours
        .checked_mul(3600)?
        .checked_add(minutes * 60)?
        .checked_add(seconds)?;
    let ms: u64 = ms.trim().parse().ok()?;
    let total_ms = seconds.checked_mul(1000)?.checked_add(ms)?;
    Some((total_ms as f64 / 1000.0, dot))
}

/// The SubRip format.
///
/// Entries are separated by blank lines. Each one is a sequence number, a
/// `HH:MM:SS,mmm --> HH:MM:SS,mmm` line and one or more lines of text.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubRipParser;

impl SubRipParser {
    fn parse_time_line(
        &self,
        line: &str,
        line_number: usize,
        context: &mut ParseContext<'_>,
    ) -> Option<(f64, f64)> {
        let captures = time_line_regex().captures(line)?;
        let start_match = captures.name("start")?;
        let (start, start_dot) = parse_srt_time(start_match.as_str())?;
        let (end, end_dot) = parse_srt_time(&captures["end"])?;
        if start_dot || end_dot {
            context.warn(
                line_number,
                start_match.start() + 1,
                line,
                "Used dot notation for fixed point",
            );
        }

        let rest = captures.name("rest")?;
        if !rest.as_str().trim().is_empty() && !position_regex().is_match(rest.as_str()) {
            context.warn(
                line_number,
                rest.start() + 1,
                line,
                "Unexpected text after time range, ignoring it",
            );
        }
        if end < start {
            context.warn(line_number, 1, line, "Unit ends before it starts");
        }
        Some((start, end))
    }
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

fn sequence_number(line: &str) -> Option<u64> {
    line.trim().parse().ok()
}

/// Whether a new entry (sequence number followed by a time line) starts at `index`.
fn is_header_at(lines: &[&str], index: usize) -> bool {
    sequence_number(lines[index]).is_some()
        && lines
            .get(index + 1)
            .is_some_and(|next| time_line_regex().is_match(next))
}

/// Returns the index of the next blank line at or after `index`.
fn skip_to_blank(lines: &[&str], mut index: usize) -> usize {
    while index < lines.len() && !is_blank(lines[index]) {
        index += 1;
    }
    index
}

impl FormatParser for SubRipParser {
    fn name(&self) -> &'static str {
        FORMAT
    }

    fn markers(&self) -> &'static [&'static str] {
        &["-->"]
    }

    fn can_parse(&self, text: &str) -> bool {
        text.lines().any(|line| time_line_regex().is_match(line))
    }

    fn parse_units(&self, text: &str, context: &mut ParseContext<'_>) -> Vec<SubtitleUnit> {
        let lines = text.split('\n').collect::<Vec<_>>();
        let mut units = Vec::new();
        let mut previous_sequence: Option<u64> = None;
        let mut index = 0;

        while index < lines.len() {
            let line = lines[index];
            if is_blank(line) {
                index += 1;
                continue;
            }

            let time_index = match sequence_number(line) {
                Some(sequence) => {
                    if previous_sequence.is_some_and(|previous| sequence != previous + 1) {
                        context.warn(index + 1, 1, line, "Sequence number out of order");
                    }
                    previous_sequence = Some(sequence);

                    let mut next = index + 1;
                    while next < lines.len() && is_blank(lines[next]) {
                        next += 1;
                    }
                    if next >= lines.len() || !lines[next].contains("-->") {
                        context.warn(
                            index + 1,
                            1,
                            line,
                            "Missing time range after sequence number, ignoring unit",
                        );
                        index = skip_to_blank(&lines, next);
                        continue;
                    }
                    if next > index + 1 {
                        context.warn(
                            index + 2,
                            1,
                            lines[index + 1],
                            "Empty lines after sequence, ignoring",
                        );
                    }
                    next
                }
                None if line.contains("-->") => {
                    context.warn(index + 1, 1, line, "Missing sequence number");
                    previous_sequence = previous_sequence.map(|previous| previous + 1);
                    index
                }
                None => {
                    context.warn(index + 1, 1, line, "Could not parse line, ignoring it");
                    index += 1;
                    continue;
                }
            };

            let time_line = lines[time_index];
            let Some((start, end)) = self.parse_time_line(time_line, time_index + 1, context)
            else {
                context.warn(
                    time_index + 1,
                    1,
                    time_line,
                    "Could not parse time range, ignoring unit",
                );
                index = skip_to_blank(&lines, time_index + 1);
                continue;
            };

            let mut text_lines = Vec::new();
            index = time_index + 1;
            while index < lines.len() && !is_blank(lines[index]) {
                if is_header_at(&lines, index) {
                    context.warn(
                        index + 1,
                        1,
                        lines[index],
                        "Missing empty line after unit",
                    );
                    break;
                }
                text_lines.push(Line::new(lines[index].trim_end()));
                index += 1;
            }

            if text_lines.is_empty() {
                context.warn(
                    time_index + 1,
                    1,
                    time_line,
                    "Empty subtitle unit, ignoring it",
                );
            } else {
                units.push(SubtitleUnit {
                    start,
                    end,
                    lines: text_lines,
                });
            }
        }

        units
    }
}
