//! Greedy word wrap across styled runs
//!
//! Words are split on whitespace across run boundaries, so `**Risk**:` is
//! one word made of a bold and a plain segment.

use textwrap::core::Fragment;
use textwrap::wrap_algorithms::wrap_first_fit;

use super::markup::StyledRun;
use super::metrics::FontMetrics;

/// Part of a word in a single weight
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub text: String,
    pub bold: bool,
    pub width: f32,
}

/// One word with its advance (the segments plus a trailing space)
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub segments: Vec<Segment>,
    pub advance: f32,
}

impl Word {
    pub fn text(&self) -> String {
        self.segments.iter().map(|s| s.text.as_str()).collect()
    }

    /// Bold when every segment is bold
    pub fn is_bold(&self) -> bool {
        self.segments.iter().all(|s| s.bold)
    }
}

/// Wrapped output line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WrappedLine {
    pub words: Vec<Word>,
    pub width: f32,
}

impl WrappedLine {
    fn push(&mut self, word: Word) {
        self.width += word.advance;
        self.words.push(word);
    }

    pub fn text(&self) -> String {
        self.words
            .iter()
            .map(Word::text)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Widths come from `advance`, which already holds the trailing space
impl Fragment for Word {
    fn width(&self) -> f64 {
        f64::from(self.advance)
    }

    fn whitespace_width(&self) -> f64 {
        0.0
    }

    fn penalty_width(&self) -> f64 {
        0.0
    }
}

/// Add a word while `line width + width(word + " ") <= max_width`, otherwise
/// start a new line. A word that cannot fit on an empty line is broken at
/// character boundaries.
pub fn wrap(runs: &[StyledRun], metrics: &dyn FontMetrics, size: f32, max_width: f32) -> Vec<WrappedLine> {
    let mut words = Vec::new();
    for chars in tokenize(runs) {
        let word = measured(&chars, metrics, size);
        if word.advance <= max_width {
            words.push(word);
        } else {
            words.extend(hard_break(&chars, metrics, size, max_width));
        }
    }
    if words.is_empty() {
        return Vec::new();
    }

    wrap_first_fit(&words, &[f64::from(max_width)])
        .into_iter()
        .map(|line| {
            let mut wrapped = WrappedLine::default();
            for word in line {
                wrapped.push(word.clone());
            }
            wrapped
        })
        .collect()
}

/// Whitespace-separated words as `(char, bold)` sequences
fn tokenize(runs: &[StyledRun]) -> Vec<Vec<(char, bool)>> {
    let mut words = Vec::new();
    let mut word = Vec::new();

    for run in runs {
        for c in run.text.chars() {
            if c.is_whitespace() {
                if !word.is_empty() {
                    words.push(std::mem::take(&mut word));
                }
            } else {
                word.push((c, run.bold));
            }
        }
    }
    if !word.is_empty() {
        words.push(word);
    }
    words
}

fn measured(chars: &[(char, bool)], metrics: &dyn FontMetrics, size: f32) -> Word {
    let mut segments: Vec<Segment> = Vec::new();
    for &(c, bold) in chars {
        match segments.last_mut() {
            Some(segment) if segment.bold == bold => segment.text.push(c),
            _ => segments.push(Segment {
                text: c.to_string(),
                bold,
                width: 0.0,
            }),
        }
    }

    for segment in &mut segments {
        segment.width = metrics.measure(&segment.text, segment.bold, size);
    }
    let space_bold = segments.last().is_some_and(|s| s.bold);
    let advance = segments.iter().map(|s| s.width).sum::<f32>() + metrics.measure(" ", space_bold, size);

    Word { segments, advance }
}

/// Longest prefixes that fit, each at least one character
fn hard_break(chars: &[(char, bool)], metrics: &dyn FontMetrics, size: f32, max_width: f32) -> Vec<Word> {
    let mut pieces = Vec::new();
    let mut start = 0;

    for end in 1..=chars.len() {
        if end - start > 1 && measured(&chars[start..end], metrics, size).advance > max_width {
            pieces.push(measured(&chars[start..end - 1], metrics, size));
            start = end - 1;
        }
    }
    if start < chars.len() {
        pieces.push(measured(&chars[start..], metrics, size));
    }
    pieces
}
