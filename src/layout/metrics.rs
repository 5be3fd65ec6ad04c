//! Font metrics
//!
//! Widths are in PDF text space: 1/1000 em, scaled by the font size.

/// Measures rendered text
pub trait FontMetrics: Send + Sync {
    fn measure(&self, text: &str, bold: bool, size: f32) -> f32;
}

/// Helvetica / Helvetica-Bold advance widths from the standard 14 font AFM files
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardFontMetrics;

// Printable ASCII, 0x20..=0x7E
#[rustfmt::skip]
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

// Latin-1 supplement, 0xA0..=0xFF
#[rustfmt::skip]
const HELVETICA_LATIN1: [u16; 96] = [
    278, 333, 556, 556, 556, 556, 260, 556, 333, 737, 370, 556, 584, 333, 737, 333,
    400, 584, 333, 333, 333, 556, 537, 278, 333, 333, 365, 556, 834, 834, 834, 611,
    667, 667, 667, 667, 667, 667, 1000, 722, 667, 667, 667, 667, 278, 278, 278, 278,
    722, 722, 778, 778, 778, 778, 778, 584, 778, 722, 722, 722, 722, 667, 667, 611,
    556, 556, 556, 556, 556, 556, 889, 500, 556, 556, 556, 556, 278, 278, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 584, 611, 556, 556, 556, 556, 500, 556, 500,
];

#[rustfmt::skip]
const HELVETICA_BOLD_LATIN1: [u16; 96] = [
    278, 333, 556, 556, 556, 556, 280, 556, 333, 737, 370, 556, 584, 333, 737, 333,
    400, 584, 333, 333, 333, 611, 556, 278, 333, 333, 365, 556, 834, 834, 834, 611,
    722, 722, 722, 722, 722, 722, 1000, 722, 667, 667, 667, 667, 278, 278, 278, 278,
    722, 722, 778, 778, 778, 778, 778, 584, 778, 722, 722, 722, 722, 667, 667, 611,
    556, 556, 556, 556, 556, 556, 889, 556, 556, 556, 556, 556, 278, 278, 278, 278,
    611, 611, 611, 611, 611, 611, 611, 584, 611, 611, 611, 611, 611, 556, 611, 556,
];

const FALLBACK_WIDTH: u16 = 556;

impl StandardFontMetrics {
    /// Advance width of one character in 1/1000 em
    pub fn char_width(c: char, bold: bool) -> u16 {
        let code = c as u32;
        if (0x20..=0x7E).contains(&code) {
            let table = if bold { &HELVETICA_BOLD } else { &HELVETICA };
            return table[(code - 0x20) as usize];
        }
        if (0xA0..=0xFF).contains(&code) {
            let table = if bold { &HELVETICA_BOLD_LATIN1 } else { &HELVETICA_LATIN1 };
            return table[(code - 0xA0) as usize];
        }

        match (c, bold) {
            ('\u{2022}', _) => 350,
            ('\u{2018}' | '\u{2019}', false) => 222,
            ('\u{2018}' | '\u{2019}', true) => 278,
            ('\u{201C}' | '\u{201D}', false) => 333,
            ('\u{201C}' | '\u{201D}', true) => 500,
            ('\u{2013}', _) => 556,
            ('\u{2014}' | '\u{2026}', _) => 1000,
            _ => FALLBACK_WIDTH,
        }
    }
}

impl FontMetrics for StandardFontMetrics {
    fn measure(&self, text: &str, bold: bool, size: f32) -> f32 {
        let units: u32 = text
            .chars()
            .map(|c| u32::from(Self::char_width(c, bold)))
            .sum();
        units as f32 * size / 1000.0
    }
}

/// Every character advances the same fixed fraction of the font size
#[derive(Debug, Clone, Copy)]
pub struct MonospaceMetrics {
    pub advance: f32,
}

impl Default for MonospaceMetrics {
    fn default() -> Self {
        Self { advance: 0.6 }
    }
}

impl FontMetrics for MonospaceMetrics {
    fn measure(&self, text: &str, _bold: bool, size: f32) -> f32 {
        text.chars().count() as f32 * self.advance * size
    }
}
