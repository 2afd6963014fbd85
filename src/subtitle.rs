use std::{
    collections::BTreeMap,
    fmt::Display,
    ops::{Index, IndexMut},
};

use serde::{Deserialize, Serialize};

/// A single line of text in a subtitle unit.
///
/// `styles` holds free-form per-line metadata (colour, font, ...) that
/// survives the intermediate format but is otherwise uninterpreted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    pub text: String,
    #[serde(default)]
    pub styles: BTreeMap<String, String>,
}

impl Line {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            styles: BTreeMap::new(),
        }
    }

    pub fn with_style(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.styles.insert(key.into(), value.into());
        self
    }
}

impl Display for Line {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<&str> for Line {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Line {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// One timed entry of a subtitle.
///
/// Times are seconds from the start of the stream. The first line renders
/// above the second one and so on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubtitleUnit {
    pub start: f64,
    pub end: f64,
    pub lines: Vec<Line>,
}

impl SubtitleUnit {
    pub fn new<I, L>(start: f64, end: f64, lines: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<Line>,
    {
        Self {
            start,
            end,
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    /// How long the unit is shown, in seconds.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// The number of characters over all lines.
    pub fn length(&self) -> usize {
        self.lines.iter().map(|l| l.text.chars().count()).sum()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Line> {
        self.lines.iter()
    }
}

impl Index<usize> for SubtitleUnit {
    type Output = Line;

    fn index(&self, index: usize) -> &Self::Output {
        &self.lines[index]
    }
}

impl IndexMut<usize> for SubtitleUnit {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.lines[index]
    }
}

/// A whole subtitle, an ordered list of units.
///
/// Two subtitles are equal when their units are equal in the same order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Subtitle {
    units: Vec<SubtitleUnit>,
}

impl Subtitle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_unit(&mut self, unit: SubtitleUnit) {
        self.units.push(unit);
    }

    /// Same as [`Subtitle::add_unit`].
    pub fn append(&mut self, unit: SubtitleUnit) {
        self.add_unit(unit)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SubtitleUnit> {
        self.units.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SubtitleUnit> {
        self.units.iter()
    }

    pub fn units(&self) -> &[SubtitleUnit] {
        &self.units
    }

    /// Returns pairs of unit indices that overlap in time.
    ///
    /// For every unit this walks forward while the following units start
    /// before it ends, so it expects units sorted by start time.
    pub fn check_overlaps(&self) -> Vec<(usize, usize)> {
        let mut overlaps = Vec::new();
        for (i, current) in self.units.iter().enumerate() {
            for (j, next) in self.units.iter().enumerate().skip(i + 1) {
                if current.end > next.start {
                    overlaps.push((i, j));
                } else {
                    break;
                }
            }
        }
        overlaps
    }
}

impl Index<usize> for Subtitle {
    type Output = SubtitleUnit;

    fn index(&self, index: usize) -> &Self::Output {
        &self.units[index]
    }
}

impl IndexMut<usize> for Subtitle {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.units[index]
    }
}

impl FromIterator<SubtitleUnit> for Subtitle {
    fn from_iter<T: IntoIterator<Item = SubtitleUnit>>(iter: T) -> Self {
        Self {
            units: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Subtitle {
    type Item = SubtitleUnit;
    type IntoIter = std::vec::IntoIter<SubtitleUnit>;

    fn into_iter(self) -> Self::IntoIter {
        self.units.into_iter()
    }
}

impl<'a> IntoIterator for &'a Subtitle {
    type Item = &'a SubtitleUnit;
    type IntoIter = std::slice::Iter<'a, SubtitleUnit>;

    fn into_iter(self) -> Self::IntoIter {
        self.units.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtitle_lines() {
        let mut sub = Subtitle::new();
        sub.append(SubtitleUnit::new(0.0, 1.0, ["First line", "Second line"]));

        assert_eq!(sub[0][0].to_string(), "First line");
        assert_eq!(sub[0][1].to_string(), "Second line");

        sub[0][0].styles.insert("color".into(), "red".into());
        sub[0][1].styles.insert("color".into(), "blue".into());

        sub[0][0].text = "Just a line".into();
        sub[0][1].text = "Just another line".into();

        assert_eq!(sub[0][0].to_string(), "Just a line");
        assert_eq!(sub[0][1].to_string(), "Just another line");
        // Metadata should still be there
        assert_eq!(sub[0][0].styles["color"], "red");
        assert_eq!(sub[0][1].styles["color"], "blue");
    }

    #[test]
    fn test_structural_equality() {
        let build = || {
            let mut sub = Subtitle::new();
            sub.add_unit(SubtitleUnit::new(15.0, 30.0, ["a"]));
            sub.add_unit(SubtitleUnit::new(
                65.0,
                89.0,
                [Line::new("b").with_style("color", "red"), Line::new("c")],
            ));
            sub
        };
        assert_eq!(build(), build());

        let mut other = build();
        other[1][0].styles.clear();
        assert_ne!(build(), other);

        let reversed = build().into_iter().rev().collect::<Subtitle>();
        assert_ne!(build(), reversed);
    }

    #[test]
    fn test_unit_helpers() {
        let unit = SubtitleUnit::new(1.5, 4.0, ["čšž", "ab"]);
        assert_eq!(unit.duration(), 2.5);
        assert_eq!(unit.length(), 5);
    }

    #[test]
    fn test_overlaps() {
        let sub: Subtitle = [
            SubtitleUnit::new(0.0, 5.0, ["a"]),
            SubtitleUnit::new(1.0, 2.0, ["b"]),
            SubtitleUnit::new(3.0, 4.0, ["c"]),
            SubtitleUnit::new(10.0, 11.0, ["d"]),
        ]
        .into_iter()
        .collect();
        assert_eq!(sub.check_overlaps(), vec![(0, 1), (0, 2)]);
    }
}
