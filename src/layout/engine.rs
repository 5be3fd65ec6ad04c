//! Document layout engine
//!
//! Turns a report (title, topic, markdown body, sources) into positioned lines
//! on fixed-size pages. Pure and synchronous: the same input always produces
//! the same pages.
//!
//! Vertical positions are offsets from the top edge of the page. A line is
//! moved to the next page when `offset + line height` would pass the max
//! content height; breaks only happen between wrapped lines.

use serde::Serialize;

use super::markup::{self, LogicalKind, LogicalLine, StyledRun};
use super::metrics::{FontMetrics, StandardFontMetrics};
use super::wrap::{wrap, WrappedLine};
use crate::workflow::SourceRef;

/// Page size and content box, in points
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageGeometry {
    pub page_width: f32,
    pub page_height: f32,
    pub margin: f32,
    /// Bottom limit of content, measured from the top edge
    pub max_content_height: f32,
}

impl PageGeometry {
    /// A4 with 50pt margins
    pub fn a4() -> Self {
        Self {
            page_width: 595.0,
            page_height: 842.0,
            margin: 50.0,
            max_content_height: 792.0,
        }
    }

    pub fn content_width(&self) -> f32 {
        self.page_width - 2.0 * self.margin
    }
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self::a4()
    }
}

/// Font sizes, line heights and gaps
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Typography {
    pub title_size: f32,
    pub heading_size: f32,
    pub body_size: f32,
    pub title_line_height: f32,
    pub heading_line_height: f32,
    pub body_line_height: f32,
    /// Advance for a blank input line
    pub paragraph_gap: f32,
    /// After every heading
    pub heading_gap: f32,
    /// Between the header block and the body
    pub header_gap: f32,
}

impl Default for Typography {
    fn default() -> Self {
        Self {
            title_size: 18.0,
            heading_size: 14.0,
            body_size: 11.0,
            title_line_height: 26.0,
            heading_line_height: 20.0,
            body_line_height: 16.0,
            paragraph_gap: 8.0,
            heading_gap: 6.0,
            header_gap: 14.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    Title,
    Meta,
    Heading,
    Bullet,
    Body,
    SourcesTitle,
    Source,
}

impl LineKind {
    /// Lines produced from the report body
    pub fn is_body(&self) -> bool {
        matches!(self, Self::Heading | Self::Bullet | Self::Body)
    }
}

/// Text drawn at an x offset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fragment {
    pub x: f32,
    pub text: String,
    pub bold: bool,
    /// Continues the previous fragment's word, no space in between
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub joined: bool,
}

impl Fragment {
    pub fn new(x: f32, text: impl Into<String>, bold: bool) -> Self {
        Self {
            x,
            text: text.into(),
            bold,
            joined: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedLine {
    pub kind: LineKind,
    /// Baseline, from the top edge
    pub y: f32,
    pub font_size: f32,
    pub fragments: Vec<Fragment>,
}

impl PlacedLine {
    pub fn text(&self) -> String {
        let mut text = String::new();
        for fragment in &self.fragments {
            if !text.is_empty() && !fragment.joined {
                text.push(' ');
            }
            text.push_str(&fragment.text);
        }
        text
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    /// 1-based
    pub number: usize,
    pub lines: Vec<PlacedLine>,
}

/// Everything printed in an exported report
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentSource {
    pub title: String,
    pub topic: String,
    pub body: String,
    pub sources: Vec<SourceRef>,
}

pub struct DocumentLayoutEngine {
    geometry: PageGeometry,
    typography: Typography,
    metrics: Box<dyn FontMetrics>,
}

impl Default for DocumentLayoutEngine {
    fn default() -> Self {
        Self::new(Box::new(StandardFontMetrics))
    }
}

impl DocumentLayoutEngine {
    pub fn new(metrics: Box<dyn FontMetrics>) -> Self {
        Self {
            geometry: PageGeometry::default(),
            typography: Typography::default(),
            metrics,
        }
    }

    pub fn with_geometry(mut self, geometry: PageGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn with_typography(mut self, typography: Typography) -> Self {
        self.typography = typography;
        self
    }

    pub fn geometry(&self) -> &PageGeometry {
        &self.geometry
    }

    pub fn typography(&self) -> &Typography {
        &self.typography
    }

    pub fn metrics(&self) -> &dyn FontMetrics {
        self.metrics.as_ref()
    }

    /// Lay out a document. Never fails; empty input gives one header-only page.
    pub fn layout(&self, document: &DocumentSource) -> Vec<Page> {
        let mut pager = Pager::new(&self.geometry);

        self.emit_header(&mut pager, document);

        for line in markup::parse(&document.body) {
            self.emit_logical(&mut pager, &line);
        }

        if !document.sources.is_empty() {
            self.emit_sources(&mut pager, &document.sources);
        }

        let pages = pager.finish();
        tracing::debug!(
            pages = pages.len(),
            lines = pages.iter().map(|p| p.lines.len()).sum::<usize>(),
            "[Layout] Document laid out"
        );
        pages
    }

    fn emit_header(&self, pager: &mut Pager<'_>, document: &DocumentSource) {
        let t = &self.typography;

        let title = [StyledRun::bold(document.title.as_str())];
        for line in self.wrap_runs(&title, t.title_size) {
            pager.place(self.plain_line(LineKind::Title, &line, t.title_size, true), t.title_line_height);
        }

        let topic = [StyledRun::plain(format!("Topic: {}", document.topic.trim()))];
        for line in self.wrap_runs(&topic, t.body_size) {
            pager.place(self.plain_line(LineKind::Meta, &line, t.body_size, false), t.body_line_height);
        }

        pager.gap(t.header_gap);
    }

    fn emit_logical(&self, pager: &mut Pager<'_>, line: &LogicalLine) {
        let t = &self.typography;

        match line.kind {
            LogicalKind::Blank => pager.gap(t.paragraph_gap),
            LogicalKind::Heading => {
                for wrapped in self.wrap_runs(&line.runs, t.heading_size) {
                    pager.place(
                        self.plain_line(LineKind::Heading, &wrapped, t.heading_size, true),
                        t.heading_line_height,
                    );
                }
                pager.gap(t.heading_gap);
            }
            LogicalKind::Bullet | LogicalKind::Body => {
                let kind = if line.kind == LogicalKind::Bullet {
                    LineKind::Bullet
                } else {
                    LineKind::Body
                };
                let wrapped_lines = self.wrap_runs(&line.runs, t.body_size);
                if wrapped_lines.is_empty() {
                    pager.gap(t.paragraph_gap);
                    return;
                }
                for wrapped in wrapped_lines {
                    let placed = if line.styled {
                        self.styled_line(kind, &wrapped, t.body_size)
                    } else {
                        self.plain_line(kind, &wrapped, t.body_size, false)
                    };
                    pager.place(placed, t.body_line_height);
                }
            }
        }
    }

    fn emit_sources(&self, pager: &mut Pager<'_>, sources: &[SourceRef]) {
        let t = &self.typography;

        pager.gap(t.paragraph_gap);
        let title = [StyledRun::bold("Sources")];
        for line in self.wrap_runs(&title, t.heading_size) {
            pager.place(
                self.plain_line(LineKind::SourcesTitle, &line, t.heading_size, true),
                t.heading_line_height,
            );
        }
        pager.gap(t.heading_gap);

        for (i, source) in sources.iter().enumerate() {
            let label = [StyledRun::plain(format!("{}. {}", i + 1, source.title))];
            let url = [StyledRun::plain(source.url.as_str())];

            let entry: Vec<PlacedLine> = self
                .wrap_runs(&label, t.body_size)
                .into_iter()
                .chain(self.wrap_runs(&url, t.body_size))
                .map(|line| self.plain_line(LineKind::Source, &line, t.body_size, false))
                .collect();

            pager.keep_together(entry.len() as f32 * t.body_line_height);
            for line in entry {
                pager.place(line, t.body_line_height);
            }
        }
    }

    fn wrap_runs(&self, runs: &[StyledRun], size: f32) -> Vec<WrappedLine> {
        wrap(runs, self.metrics.as_ref(), size, self.geometry.content_width())
    }

    /// Whole line as one fragment
    fn plain_line(&self, kind: LineKind, line: &WrappedLine, size: f32, bold: bool) -> PlacedLine {
        PlacedLine {
            kind,
            y: 0.0,
            font_size: size,
            fragments: vec![Fragment::new(self.geometry.margin, line.text(), bold)],
        }
    }

    /// One fragment per word segment. Words start at the cumulative advance
    /// of the words before them; segments of a word follow each other directly.
    fn styled_line(&self, kind: LineKind, line: &WrappedLine, size: f32) -> PlacedLine {
        let mut x = self.geometry.margin;
        let mut fragments = Vec::with_capacity(line.words.len());
        for word in &line.words {
            let mut segment_x = x;
            for (i, segment) in word.segments.iter().enumerate() {
                fragments.push(Fragment {
                    joined: i > 0,
                    ..Fragment::new(segment_x, segment.text.as_str(), segment.bold)
                });
                segment_x += segment.width;
            }
            x += word.advance;
        }
        PlacedLine {
            kind,
            y: 0.0,
            font_size: size,
            fragments,
        }
    }
}

/// Running vertical offset plus the pages filled so far
struct Pager<'g> {
    geometry: &'g PageGeometry,
    pages: Vec<Page>,
    lines: Vec<PlacedLine>,
    offset: f32,
}

impl<'g> Pager<'g> {
    fn new(geometry: &'g PageGeometry) -> Self {
        Self {
            geometry,
            pages: Vec::new(),
            lines: Vec::new(),
            offset: geometry.margin,
        }
    }

    fn at_top(&self) -> bool {
        self.offset <= self.geometry.margin
    }

    fn break_if_needed(&mut self, height: f32) {
        if self.offset + height > self.geometry.max_content_height && !self.at_top() {
            self.new_page();
        }
    }

    fn new_page(&mut self) {
        let number = self.pages.len() + 1;
        self.pages.push(Page {
            number,
            lines: std::mem::take(&mut self.lines),
        });
        self.offset = self.geometry.margin;
    }

    fn place(&mut self, mut line: PlacedLine, line_height: f32) {
        self.break_if_needed(line_height);
        line.y = self.offset + line.font_size;
        self.lines.push(line);
        self.offset += line_height;
    }

    /// A gap that does not fit ends the page without being carried over
    fn gap(&mut self, height: f32) {
        if self.offset + height > self.geometry.max_content_height {
            self.offset = self.geometry.max_content_height;
        } else {
            self.offset += height;
        }
    }

    /// Start a new page unless a block of `height` fits here. Blocks taller
    /// than a page are split line by line.
    fn keep_together(&mut self, height: f32) {
        let capacity = self.geometry.max_content_height - self.geometry.margin;
        if height <= capacity {
            self.break_if_needed(height);
        }
    }

    fn finish(mut self) -> Vec<Page> {
        if !self.lines.is_empty() || self.pages.is_empty() {
            self.new_page();
        }
        self.pages
    }
}
