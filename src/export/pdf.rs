//! PDF output for laid-out pages
//!
//! Uses only the standard Helvetica and Helvetica-Bold fonts with
//! WinAnsiEncoding, so nothing has to be embedded. Characters outside that
//! encoding are printed as `?`.

use pdf_writer::{Content, Name, Pdf, Rect, Ref, Str, TextStr};

use crate::layout::{Page, PageGeometry};

const REGULAR_FONT: Name<'static> = Name(b"F1");
const BOLD_FONT: Name<'static> = Name(b"F2");

// Fixed object numbers: 1 catalog, 2 page tree, 3-4 fonts, 5 info.
// Each page then takes two objects: the page and its content stream.
const FIRST_PAGE_ID: i32 = 6;

/// Serialize pages into a complete PDF file
pub fn render_pdf(pages: &[Page], geometry: &PageGeometry, title: &str) -> Vec<u8> {
    let catalog_id = Ref::new(1);
    let page_tree_id = Ref::new(2);
    let regular_font_id = Ref::new(3);
    let bold_font_id = Ref::new(4);
    let info_id = Ref::new(5);

    let mut pdf = Pdf::new();
    pdf.set_version(1, 4);

    let page_ids: Vec<Ref> = (0..pages.len() as i32)
        .map(|i| Ref::new(FIRST_PAGE_ID + i * 2))
        .collect();

    pdf.catalog(catalog_id).pages(page_tree_id);
    pdf.pages(page_tree_id)
        .kids(page_ids.iter().copied())
        .count(page_ids.len() as i32);

    pdf.type1_font(regular_font_id)
        .base_font(Name(b"Helvetica"))
        .encoding_predefined(Name(b"WinAnsiEncoding"));
    pdf.type1_font(bold_font_id)
        .base_font(Name(b"Helvetica-Bold"))
        .encoding_predefined(Name(b"WinAnsiEncoding"));

    pdf.document_info(info_id)
        .title(TextStr(title))
        .producer(TextStr("research-client"));

    for (page, &page_id) in pages.iter().zip(&page_ids) {
        let content_id = Ref::new(page_id.get() + 1);
        {
            let mut writer = pdf.page(page_id);
            writer
                .media_box(Rect::new(0.0, 0.0, geometry.page_width, geometry.page_height))
                .parent(page_tree_id)
                .contents(content_id);
            writer
                .resources()
                .fonts()
                .pair(REGULAR_FONT, regular_font_id)
                .pair(BOLD_FONT, bold_font_id);
        }
        pdf.stream(content_id, &page_content(page, geometry));
    }

    pdf.finish()
}

/// Text drawing operators for one page
fn page_content(page: &Page, geometry: &PageGeometry) -> Vec<u8> {
    let mut content = Content::new();
    for line in &page.lines {
        // PDF space grows upwards from the bottom edge
        let baseline = geometry.page_height - line.y;
        for fragment in &line.fragments {
            let font = if fragment.bold { BOLD_FONT } else { REGULAR_FONT };
            content.begin_text();
            content.set_font(font, line.font_size);
            content.next_line(fragment.x, baseline);
            content.show(Str(&encode_win_ansi(&fragment.text)));
            content.end_text();
        }
    }
    content.finish()
}

/// Text as WinAnsiEncoding bytes
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars().map(win_ansi).collect()
}

/// WinAnsiEncoding byte for a character
pub fn win_ansi(c: char) -> u8 {
    match c {
        '\u{20}'..='\u{7E}' | '\u{A0}'..='\u{FF}' => c as u8,
        '\u{20AC}' => 0x80,
        '\u{2026}' => 0x85,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201C}' => 0x93,
        '\u{201D}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\u{2122}' => 0x99,
        '\t' => b' ',
        _ => b'?',
    }
}
