//! A parser for MicroDVD (.sub) subtitles.
//!
//! MicroDVD files count frames instead of time, so the frame rate has to
//! come from somewhere: the caller's [`ParseOptions`](super::ParseOptions),
//! a rate declared by the file itself (`{1}{1}23.976` as the first entry),
//! or [`DEFAULT_FPS`], in that order.

use std::{collections::BTreeMap, sync::OnceLock};

use log::debug;
use regex::Regex;

use super::{FormatParser, ParseContext};
use crate::subtitle::{Line, SubtitleUnit};

pub const FORMAT: &str = "MicroDVD";

/// The frame rate used when neither the caller nor the file provides one.
pub const DEFAULT_FPS: f64 = 23.976;

fn entry_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r#"^\{(?P<start>\d+)\}\{(?P<end>\d*)\}(?P<text>.*)$"#).unwrap())
}

fn control_code_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r#"^\{(?P<code>[A-Za-z]):(?P<value>[^}]*)\}"#).unwrap())
}

fn is_valid_fps(fps: f64) -> bool {
    fps.is_finite() && fps > 0.0
}

/// Maps a control code letter to the style key it is stored under.
fn style_key(code: char) -> String {
    match code.to_ascii_lowercase() {
        'y' => "style".to_owned(),
        'c' => "color".to_owned(),
        'f' => "font".to_owned(),
        's' => "size".to_owned(),
        'p' => "position".to_owned(),
        'h' => "charset".to_owned(),
        other => other.to_string(),
    }
}

/// Splits leading control codes off `text`.
///
/// Returns the remaining text, the codes for this line only (lowercase)
/// and the codes for the whole entry (uppercase).
fn split_control_codes(
    mut text: &str,
) -> (&str, BTreeMap<String, String>, BTreeMap<String, String>) {
    let mut line_styles = BTreeMap::new();
    let mut entry_styles = BTreeMap::new();
    while let Some(captures) = control_code_regex().captures(text) {
        let code = captures["code"].chars().next().unwrap_or_default();
        let target = if code.is_ascii_uppercase() {
            &mut entry_styles
        } else {
            &mut line_styles
        };
        target.insert(style_key(code), captures["value"].to_owned());
        text = &text[captures.get(0).map_or(0, |m| m.end())..];
    }
    (text, line_styles, entry_styles)
}

fn parse_lines(text: &str) -> Vec<Line> {
    let mut entry_styles = BTreeMap::new();
    let mut lines = text
        .split('|')
        .map(|part| {
            let (text, styles, entry) = split_control_codes(part);
            entry_styles.extend(entry);
            Line {
                text: text.to_owned(),
                styles,
            }
        })
        .collect::<Vec<_>>();

    for line in &mut lines {
        for (key, value) in &entry_styles {
            line.styles
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }
    lines
}

/// The MicroDVD format: `{start}{end}first line|second line`, one entry per line.
#[derive(Debug, Clone, Copy, Default)]
pub struct MicroDvdParser;

impl FormatParser for MicroDvdParser {
    fn name(&self) -> &'static str {
        FORMAT
    }

    fn markers(&self) -> &'static [&'static str] {
        &["}{"]
    }

    fn can_parse(&self, text: &str) -> bool {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .take(10)
            .any(|line| entry_regex().is_match(line))
    }

    fn parse_units(&self, text: &str, context: &mut ParseContext<'_>) -> Vec<SubtitleUnit> {
        let given_fps = context.options.fps;
        let option_fps = given_fps.filter(|fps| is_valid_fps(*fps));
        if let (Some(invalid), None) = (given_fps, option_fps) {
            context.warn(1, 1, "", format!("Invalid frame rate {invalid}, ignoring it"));
        }
        let mut fps = option_fps.unwrap_or(DEFAULT_FPS);
        let mut first_entry = true;
        let mut units = Vec::new();

        for (index, raw_line) in text.split('\n').enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with("{DEFAULT}") {
                continue;
            }
            let Some(captures) = entry_regex().captures(line) else {
                context.warn(index + 1, 1, raw_line, "Could not parse line");
                continue;
            };
            let is_first = std::mem::replace(&mut first_entry, false);

            let Ok(start) = captures["start"].parse::<u64>() else {
                context.warn(index + 1, 2, raw_line, "Start frame is out of range");
                continue;
            };
            let end = match &captures["end"] {
                "" => {
                    context.warn(index + 1, 1, raw_line, "Missing end frame");
                    start
                }
                end => match end.parse::<u64>() {
                    Ok(end) => end,
                    Err(_) => {
                        context.warn(index + 1, 1, raw_line, "End frame is out of range");
                        continue;
                    }
                },
            };
            let text = &captures["text"];

            if is_first && start == end && start <= 1 {
                if let Ok(declared) = text.trim().parse::<f64>() {
                    if !is_valid_fps(declared) {
                        context.warn(
                            index + 1,
                            1,
                            raw_line,
                            "Invalid frame rate declaration, ignoring it",
                        );
                        continue;
                    }
                    match option_fps {
                        Some(given) => debug!("ignoring declared {declared} fps, using {given}"),
                        None => {
                            debug!("file declares {declared} fps");
                            fps = declared;
                        }
                    }
                    continue;
                }
            }

            if text.trim().is_empty() {
                context.warn(index + 1, 1, raw_line, "Empty subtitle unit, ignoring it");
                continue;
            }

            units.push(SubtitleUnit {
                start: start as f64 / fps,
                end: end as f64 / fps,
                lines: parse_lines(text),
            });
        }

        units
    }
}
