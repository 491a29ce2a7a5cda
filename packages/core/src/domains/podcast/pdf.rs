//! Transcript PDF synthesis.
//!
//! Builds a Letter-sized document with the base-14 Helvetica fonts: header
//! (podcast + episode), metadata lines, show-notes links with clickable
//! annotations, a rule, then the transcript body with manual word-wrap and
//! pagination. All text is reduced to the font's encodable (Latin-1)
//! subset before layout.

use anyhow::{Context, Result};
use chrono::Utc;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream, StringFormat};

use super::shownotes::ShowNotes;

// Letter geometry
const PAGE_WIDTH: f32 = 612.0;
const PAGE_HEIGHT: f32 = 792.0;
const MARGIN: f32 = 50.0;

const BODY_SIZE: f32 = 11.0;
const BODY_LEADING: f32 = 16.0;

/// Everything that goes on the page.
#[derive(Debug, Clone)]
pub struct TranscriptPdf {
    pub podcast_name: String,
    pub episode_title: String,
    pub host: Option<String>,
    pub genre: Option<String>,
    /// Preformatted, e.g. "1h 24m".
    pub duration: Option<String>,
    pub date: Option<String>,
    pub source_url: String,
    pub show_notes: ShowNotes,
    pub transcript: String,
}

/// Map text to the Latin-1 subset the base fonts encode: drop zero-width
/// characters, normalize typographic punctuation, drop the rest.
pub fn sanitize_pdf_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            // Zero-width and soft-hyphen garbage from web show notes
            '\u{200B}'..='\u{200D}' | '\u{2060}' | '\u{FEFF}' | '\u{00AD}' => {}
            '\u{2018}' | '\u{2019}' | '\u{201A}' => out.push('\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' => out.push('"'),
            '\u{2013}' | '\u{2014}' | '\u{2015}' => out.push('-'),
            '\u{2026}' => out.push_str("..."),
            '\u{00A0}' => out.push(' '),
            c if (c as u32) <= 0xFF => out.push(c),
            _ => {}
        }
    }
    out
}

/// Rough Helvetica advance width in ems for a character.
fn char_em(c: char) -> f32 {
    match c {
        'i' | 'j' | 'l' | '.' | ',' | ':' | ';' | '\'' | '|' | '!' => 0.28,
        'f' | 't' | 'r' | 'I' | '(' | ')' | '[' | ']' | '-' | '"' | ' ' => 0.35,
        'm' | 'w' | 'M' | 'W' | '@' => 0.89,
        'A'..='Z' | '0'..='9' => 0.67,
        _ => 0.52,
    }
}

fn text_width(text: &str, size: f32) -> f32 {
    text.chars().map(char_em).sum::<f32>() * size
}

/// Greedy word wrap against the printable width.
fn wrap(text: &str, size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if text_width(&candidate, size) <= max_width || current.is_empty() {
            current = candidate;
        } else {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn pdf_string(text: &str) -> Object {
    let bytes: Vec<u8> = text
        .chars()
        .map(|c| match c {
            // WinAnsi bullet, used for link lists
            '\u{2022}' => 0x95,
            c if (c as u32) <= 0xFF => c as u8,
            _ => b'?',
        })
        .collect();
    Object::String(bytes, StringFormat::Literal)
}

/// One page under construction.
struct PageDraft {
    ops: Vec<Operation>,
    annotations: Vec<Dictionary>,
}

impl PageDraft {
    fn new() -> Self {
        Self {
            ops: Vec::new(),
            annotations: Vec::new(),
        }
    }
}

/// Streaming layout over page drafts.
struct Layout {
    pages: Vec<PageDraft>,
    y: f32,
}

impl Layout {
    fn new() -> Self {
        Self {
            pages: vec![PageDraft::new()],
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn page(&mut self) -> &mut PageDraft {
        self.pages.last_mut().expect("at least one page")
    }

    fn ensure_room(&mut self, height: f32) {
        if self.y - height < MARGIN {
            self.pages.push(PageDraft::new());
            self.y = PAGE_HEIGHT - MARGIN;
        }
    }

    /// Draw one line of text at the current cursor; returns its baseline y.
    fn line(&mut self, font: &str, size: f32, leading: f32, text: &str) -> f32 {
        self.ensure_room(leading);
        self.y -= leading;
        let baseline = self.y;
        let ops = vec![
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![Object::Name(font.as_bytes().to_vec()), Object::Real(size)],
            ),
            Operation::new(
                "Td",
                vec![Object::Real(MARGIN), Object::Real(baseline)],
            ),
            Operation::new("Tj", vec![pdf_string(text)]),
            Operation::new("ET", vec![]),
        ];
        self.page().ops.extend(ops);
        baseline
    }

    /// Wrapped paragraph in the body font.
    fn paragraph(&mut self, font: &str, size: f32, leading: f32, text: &str) {
        for line in wrap(text, size, PAGE_WIDTH - 2.0 * MARGIN) {
            self.line(font, size, leading, &line);
        }
    }

    fn gap(&mut self, height: f32) {
        self.ensure_room(height);
        self.y -= height;
    }

    fn rule(&mut self) {
        self.ensure_room(12.0);
        self.y -= 8.0;
        let y = self.y;
        let ops = vec![
            Operation::new("q", vec![]),
            Operation::new("w", vec![Object::Real(0.5)]),
            Operation::new("m", vec![Object::Real(MARGIN), Object::Real(y)]),
            Operation::new(
                "l",
                vec![Object::Real(PAGE_WIDTH - MARGIN), Object::Real(y)],
            ),
            Operation::new("S", vec![]),
            Operation::new("Q", vec![]),
        ];
        self.page().ops.extend(ops);
        self.y -= 4.0;
    }

    /// A bulleted link line with a clickable annotation over its text.
    fn link_line(&mut self, text: &str, url: &str) {
        let display = format!("\u{2022} {text}");
        let line = wrap(&display, BODY_SIZE, PAGE_WIDTH - 2.0 * MARGIN)
            .into_iter()
            .next()
            .unwrap_or(display);
        let baseline = self.line("F1", BODY_SIZE, BODY_LEADING, &line);

        let rect_width = text_width(&line, BODY_SIZE).min(PAGE_WIDTH - 2.0 * MARGIN);
        self.page().annotations.push(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Link",
            "Rect" => vec![
                Object::Real(MARGIN),
                Object::Real(baseline - 2.0),
                Object::Real(MARGIN + rect_width),
                Object::Real(baseline + BODY_SIZE),
            ],
            "Border" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(0)],
            "A" => dictionary! {
                "Type" => "Action",
                "S" => "URI",
                "URI" => Object::string_literal(url),
            },
        });
    }
}

/// Render the transcript document and return the PDF bytes.
pub fn synthesize(input: &TranscriptPdf) -> Result<Vec<u8>> {
    let mut layout = Layout::new();

    // Header
    layout.paragraph("F2", 18.0, 24.0, &sanitize_pdf_text(&input.podcast_name));
    layout.paragraph("F2", 14.0, 19.0, &sanitize_pdf_text(&input.episode_title));
    layout.gap(6.0);

    // Metadata lines
    let mut meta_lines: Vec<String> = Vec::new();
    if let Some(host) = &input.host {
        meta_lines.push(format!("Host: {host}"));
    }
    if let Some(genre) = &input.genre {
        meta_lines.push(format!("Genre: {genre}"));
    }
    if let Some(duration) = &input.duration {
        meta_lines.push(format!("Duration: {duration}"));
    }
    if let Some(date) = &input.date {
        meta_lines.push(format!("Published: {date}"));
    }
    meta_lines.push(format!("Source: {}", input.source_url));
    for line in meta_lines {
        layout.paragraph("F1", 10.0, 14.0, &sanitize_pdf_text(&line));
    }

    // Show notes
    if !input.show_notes.summary.is_empty() || !input.show_notes.links.is_empty() {
        layout.gap(10.0);
        layout.line("F2", 12.0, 17.0, "Show Notes");
        if !input.show_notes.summary.is_empty() {
            layout.paragraph(
                "F1",
                BODY_SIZE,
                BODY_LEADING,
                &sanitize_pdf_text(&input.show_notes.summary),
            );
        }
        for link in &input.show_notes.links {
            layout.link_line(&sanitize_pdf_text(&link.text), &link.url);
        }
        if let Some(footer) = &input.show_notes.footer {
            layout.gap(4.0);
            layout.paragraph("F1", 9.0, 13.0, &sanitize_pdf_text(footer));
        }
    }

    layout.rule();

    // Transcript body
    for paragraph in sanitize_pdf_text(&input.transcript).split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        layout.paragraph("F1", BODY_SIZE, BODY_LEADING, paragraph);
        layout.gap(6.0);
    }

    build_document(layout, input)
}

fn build_document(layout: Layout, input: &TranscriptPdf) -> Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let helvetica = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let helvetica_bold = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => helvetica,
            "F2" => helvetica_bold,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(layout.pages.len());
    for draft in layout.pages {
        let content = Content {
            operations: draft.ops,
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().context("failed to encode page content")?,
        ));

        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources,
            "MediaBox" => vec![
                Object::Real(0.0),
                Object::Real(0.0),
                Object::Real(PAGE_WIDTH),
                Object::Real(PAGE_HEIGHT),
            ],
        };
        if !draft.annotations.is_empty() {
            let annots: Vec<Object> = draft
                .annotations
                .into_iter()
                .map(|a| doc.add_object(a).into())
                .collect();
            page.set("Annots", annots);
        }
        kids.push(doc.add_object(page).into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let info_id = doc.add_object(Object::Dictionary(dictionary! {
        "Title" => Object::string_literal(sanitize_pdf_text(&input.episode_title)),
        "Author" => Object::string_literal(sanitize_pdf_text(&input.podcast_name)),
        "Subject" => Object::string_literal(input.source_url.clone()),
        "Producer" => Object::string_literal(format!(
            "shelfmark transcript {}",
            Utc::now().format("%Y-%m-%dT%H:%M:%SZ")
        )),
        "Creator" => "shelfmark",
    }));
    doc.trailer.set("Info", Object::Reference(info_id));

    let mut out = Vec::new();
    doc.save_to(&mut out).context("failed to serialize transcript PDF")?;
    Ok(out)
}

/// `trackTimeMillis` → "1h 24m" / "35m".
pub fn format_duration(millis: u64) -> String {
    let minutes = millis / 60_000;
    if minutes >= 60 {
        format!("{}h {}m", minutes / 60, minutes % 60)
    } else {
        format!("{minutes}m")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::podcast::shownotes::NoteLink;

    fn sample() -> TranscriptPdf {
        TranscriptPdf {
            podcast_name: "Deep Questions".into(),
            episode_title: "On Archiving \u{201C}Everything\u{201D}".into(),
            host: Some("Cal".into()),
            genre: Some("Education".into()),
            duration: Some(format_duration(120_000)),
            date: Some("2024-02-01".into()),
            source_url: "https://podcasts.apple.com/us/podcast/x/id1?i=10".into(),
            show_notes: ShowNotes {
                summary: "We talk about archives.".into(),
                links: vec![NoteLink {
                    text: "Example Tool".into(),
                    url: "https://example.com/tool".into(),
                    source: Some("example.com".into()),
                }],
                footer: None,
            },
            transcript: "First paragraph of the talk.\n\nSecond paragraph of the talk."
                .into(),
        }
    }

    #[test]
    fn sanitize_strips_zero_width_and_maps_punctuation() {
        assert_eq!(
            sanitize_pdf_text("a\u{200B}b\u{FEFF}c\u{00AD}d"),
            "abcd"
        );
        assert_eq!(sanitize_pdf_text("\u{201C}hi\u{201D}"), "\"hi\"");
        assert_eq!(sanitize_pdf_text("it\u{2019}s"), "it's");
        assert_eq!(sanitize_pdf_text("a \u{2014} b"), "a - b");
        assert_eq!(sanitize_pdf_text("wait\u{2026}"), "wait...");
        assert_eq!(sanitize_pdf_text("樹 ok"), " ok");
    }

    #[test]
    fn wrap_respects_width() {
        let lines = wrap(&"word ".repeat(100), BODY_SIZE, 200.0);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(text_width(line, BODY_SIZE) <= 200.0);
        }
    }

    #[test]
    fn wrap_never_drops_words() {
        let text = "alpha beta gamma delta epsilon zeta";
        let lines = wrap(text, BODY_SIZE, 80.0);
        assert_eq!(lines.join(" "), text);
    }

    #[test]
    fn overlong_single_word_gets_its_own_line() {
        let lines = wrap("short anextremelylongunbreakablewordthatoverflows end", 11.0, 60.0);
        assert!(lines.iter().any(|l| l.contains("anextremelylong")));
        assert_eq!(lines.join(" ").split_whitespace().count(), 3);
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(120_000), "2m");
        assert_eq!(format_duration(35 * 60_000), "35m");
        assert_eq!(format_duration(84 * 60_000), "1h 24m");
    }

    #[test]
    fn synthesized_pdf_parses_and_carries_metadata() {
        let bytes = synthesize(&sample()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));

        let subject = crate::domains::archive::extract_subject_mem(&bytes)
            .unwrap()
            .unwrap();
        assert_eq!(subject, "https://podcasts.apple.com/us/podcast/x/id1?i=10");

        let doc = Document::load_mem(&bytes).unwrap();
        assert!(!doc.get_pages().is_empty());
    }

    #[test]
    fn long_transcript_paginates() {
        let mut input = sample();
        input.transcript = "A sentence that fills some space on the page. ".repeat(600);
        let bytes = synthesize(&input).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert!(doc.get_pages().len() > 1, "expected multiple pages");
    }
}
