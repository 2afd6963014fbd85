use std::{
    borrow::Cow,
    io::{Read, Seek, SeekFrom},
};

/// Reads the rest of `reader` into memory and seeks back to where it was.
///
/// The caller can hand the same stream to another read afterwards and it
/// will see the whole content again.
pub(crate) fn read_rewound<R: Read + Seek>(reader: &mut R) -> std::io::Result<Vec<u8>> {
    let position = reader.stream_position()?;
    let mut buffer = Vec::new();
    let result = reader.read_to_end(&mut buffer);
    reader.seek(SeekFrom::Start(position))?;
    result?;
    Ok(buffer)
}

/// Normalizes line endings to `\n` and drops a leading U+FEFF.
pub(crate) fn normalize_text(text: &str) -> Cow<'_, str> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    if text.contains('\r') {
        Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(text)
    }
}

fn maybe_replace_separator(s: &str) -> Cow<'_, str> {
    match s.find(',') {
        None => Cow::Borrowed(s),
        Some(idx) => {
            let mut output = String::from(&s[..idx]);
            output.reserve(s.len() - idx);
            output.push('.');
            output.push_str(&s[idx + 1..]);
            Cow::Owned(output)
        }
    }
}

/// Parses a duration in seconds.
///
/// The format is `HH:MM:SS.ssss` with `HH` being optional, so 10:24 is
/// 10 minutes and 24 seconds. A comma is accepted in place of the dot.
pub(crate) fn parse_duration(s: &str) -> Option<f64> {
    let mut components = s.splitn(3, ':');
    let first = components.next()?;
    let second = components.next()?;
    let seconds = match components.next() {
        Some(third) => {
            let hours: u64 = first.parse().ok()?;
            let minutes: u64 = second.parse().ok()?;
            let seconds: f64 = maybe_replace_separator(third).parse().ok()?;
            hours.checked_mul(3600)?.checked_add(minutes.checked_mul(60)?)? as f64 + seconds
        }
        None => {
            let minutes: u64 = first.parse().ok()?;
            let seconds: f64 = maybe_replace_separator(second).parse().ok()?;
            minutes.checked_mul(60)? as f64 + seconds
        }
    };
    (seconds.is_finite() && seconds >= 0.0).then_some(seconds)
}

/// Formats seconds as `HH:MM:SS.ssss`, the inverse of [`parse_duration`].
///
/// The seconds field is the shortest decimal that reads back to the same
/// remainder, and the whole hours and minutes are split off exactly, so
/// `parse_duration(&format_duration(x)) == Some(x)` for any non-negative
/// finite `x` below 2^53.
pub(crate) fn format_duration(seconds: f64) -> String {
    // Drops the sign of -0.0
    let seconds = seconds + 0.0;
    let whole = seconds.trunc() as u64;
    let (hours, rest) = (whole / 3600, whole % 3600);
    let minutes = rest / 60;
    let remainder = seconds - (hours * 3600 + minutes * 60) as f64;
    if remainder < 10.0 {
        format!("{hours:02}:{minutes:02}:0{remainder}")
    } else {
        format!("{hours:02}:{minutes:02}:{remainder}")
    }
}
