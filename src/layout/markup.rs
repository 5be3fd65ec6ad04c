//! Markdown subset recognized by the layout engine
//!
//! Only what research reports actually contain: `#` headings (levels 1-3),
//! `**bold**` spans, `-`/`*` bullets, `[label](target)` links and backtick code
//! spans. Anything else is body text.

use once_cell::sync::Lazy;
use regex::Regex;

/// Glyph substituted for bullet markers
pub const BULLET: &str = "\u{2022}";

const BOLD_DELIMITER: &str = "**";
const CODE_DELIMITER: &str = "`";

static HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#{1,3} +(.*)$").expect("heading regex"));
static BULLET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[-*] +(.*)$").expect("bullet regex"));
static LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]*)\]\(([^)]*)\)").expect("link regex"));

/// Text with a single weight
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledRun {
    pub text: String,
    pub bold: bool,
}

impl StyledRun {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bold: false,
        }
    }

    pub fn bold(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bold: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalKind {
    Heading,
    Bullet,
    Body,
    Blank,
}

/// One input line after markup resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    pub kind: LogicalKind,
    pub runs: Vec<StyledRun>,
    /// Whether the line had at least one complete bold pair
    pub styled: bool,
}

impl LogicalLine {
    fn blank() -> Self {
        Self {
            kind: LogicalKind::Blank,
            runs: Vec::new(),
            styled: false,
        }
    }
}

/// Resolve every input line
pub fn parse(text: &str) -> Vec<LogicalLine> {
    text.lines().map(parse_line).collect()
}

pub fn parse_line(raw: &str) -> LogicalLine {
    let line = raw.trim_end();
    if line.trim().is_empty() {
        return LogicalLine::blank();
    }

    if let Some(caps) = HEADING_RE.captures(line.trim_start()) {
        let text: String = split_bold(&substitute_inline(&caps[1]))
            .into_iter()
            .map(|run| run.text)
            .collect();
        if text.trim().is_empty() {
            return LogicalLine::blank();
        }
        return LogicalLine {
            kind: LogicalKind::Heading,
            runs: vec![StyledRun::bold(text.trim())],
            styled: false,
        };
    }

    let (kind, content) = match BULLET_RE.captures(line) {
        Some(caps) => (LogicalKind::Bullet, caps[1].to_string()),
        None => (LogicalKind::Body, line.trim_start().to_string()),
    };

    let content = substitute_inline(&content);
    let runs = split_bold(&content);
    let styled = runs.iter().any(|run| run.bold);

    let mut runs: Vec<StyledRun> = if styled {
        runs
    } else {
        vec![StyledRun::plain(content)]
    };

    if kind == LogicalKind::Bullet {
        runs.insert(0, StyledRun::plain(format!("{} ", BULLET)));
    } else if runs.iter().all(|run| run.text.trim().is_empty()) {
        return LogicalLine::blank();
    }

    LogicalLine { kind, runs, styled }
}

/// Links to their label, code spans to their content
pub fn substitute_inline(text: &str) -> String {
    strip_code_spans(&LINK_RE.replace_all(text, "$1"))
}

/// Drop backtick pairs in order of occurrence; a trailing unpaired one stays
fn strip_code_spans(text: &str) -> String {
    let ticks: Vec<usize> = text.match_indices(CODE_DELIMITER).map(|(i, _)| i).collect();
    let paired = &ticks[..ticks.len() / 2 * 2];

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for &tick in paired {
        out.push_str(&text[cursor..tick]);
        cursor = tick + CODE_DELIMITER.len();
    }
    out.push_str(&text[cursor..]);
    out
}

/// Split on `**` pairs in order of occurrence. A trailing unpaired delimiter
/// stays in the text.
pub fn split_bold(text: &str) -> Vec<StyledRun> {
    let positions: Vec<usize> = text.match_indices(BOLD_DELIMITER).map(|(i, _)| i).collect();
    let positions = non_overlapping(positions);
    let paired = positions.len() / 2 * 2;

    let mut runs = Vec::new();
    let mut cursor = 0;
    for pair in positions[..paired].chunks(2) {
        let (open, close) = (pair[0], pair[1]);
        push_run(&mut runs, &text[cursor..open], false);
        push_run(&mut runs, &text[open + BOLD_DELIMITER.len()..close], true);
        cursor = close + BOLD_DELIMITER.len();
    }
    push_run(&mut runs, &text[cursor..], false);
    runs
}

/// `***` yields overlapping matches at i and i+1; keep the first
fn non_overlapping(positions: Vec<usize>) -> Vec<usize> {
    let mut kept: Vec<usize> = Vec::with_capacity(positions.len());
    for pos in positions {
        if kept
            .last()
            .map_or(true, |last| pos >= last + BOLD_DELIMITER.len())
        {
            kept.push(pos);
        }
    }
    kept
}

fn push_run(runs: &mut Vec<StyledRun>, text: &str, bold: bool) {
    if text.is_empty() {
        return;
    }
    match runs.last_mut() {
        Some(last) if last.bold == bold => last.text.push_str(text),
        _ => runs.push(StyledRun {
            text: text.to_string(),
            bold,
        }),
    }
}

/// The text a reader sees once markup is resolved, line by line
pub fn to_plain_text(text: &str) -> String {
    parse(text)
        .iter()
        .map(|line| {
            let runs = match line.kind {
                LogicalKind::Bullet => &line.runs[1..],
                _ => &line.runs[..],
            };
            let text: String = runs.iter().map(|run| run.text.as_str()).collect();
            match line.kind {
                LogicalKind::Bullet => format!("{} {}", BULLET, text),
                _ => text,
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
