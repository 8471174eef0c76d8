//! Patient education PDF via `printpdf` builtin fonts.
//!
//! Blank-line separated blocks become paragraphs, single newlines become
//! line breaks, and `**text**` is set in bold.

use std::io::BufWriter;
use std::sync::LazyLock;

use printpdf::*;
use regex::Regex;

use super::EducationError;

/// Attachment name of the generated document.
pub const PDF_FILENAME: &str = "patient_education_material.pdf";

pub const PDF_TITLE: &str = "Your Preliminary Treatment Plan Explained";

const PAGE_WIDTH: Mm = Mm(210.0);
const PAGE_HEIGHT: Mm = Mm(297.0);
const MARGIN_LEFT: f32 = 20.0;
const TOP_Y: f32 = 280.0;
const BOTTOM_Y: f32 = 20.0;

const TITLE_SIZE: f32 = 16.0;
const BODY_SIZE: f32 = 10.0;
const LINE_HEIGHT: f32 = 5.0;
const PARAGRAPH_GAP: f32 = 4.0;

/// Characters per line at body size across the printable width.
pub const BODY_LINE_CHARS: usize = 90;

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("valid paragraph regex"));

static BOLD_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("valid bold regex"));

/// A run of text in one weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub bold: bool,
}

impl Span {
    fn new(text: impl Into<String>, bold: bool) -> Self {
        Self {
            text: text.into(),
            bold,
        }
    }
}

/// A paragraph as wrapped output lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paragraph {
    pub lines: Vec<Vec<Span>>,
}

/// Split one source line into plain and bold spans. Unpaired `**` stays
/// literal.
pub fn parse_inline_bold(line: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut last = 0;

    for caps in BOLD_RUN.captures_iter(line) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if whole.start() > last {
            spans.push(Span::new(&line[last..whole.start()], false));
        }
        if !inner.as_str().is_empty() {
            spans.push(Span::new(inner.as_str(), true));
        }
        last = whole.end();
    }
    if last < line.len() {
        spans.push(Span::new(&line[last..], false));
    }
    spans
}

struct Word {
    text: String,
    bold: bool,
    space_before: bool,
}

/// Words of a span sequence, remembering whether whitespace preceded each
/// so `**Asthma**:` keeps its colon attached.
fn split_words(spans: &[Span]) -> Vec<Word> {
    let mut words = Vec::new();
    let mut pending_space = false;

    for span in spans {
        let mut current = String::new();
        let mut current_space = false;
        for c in span.text.chars() {
            if c.is_whitespace() {
                if !current.is_empty() {
                    words.push(Word {
                        text: std::mem::take(&mut current),
                        bold: span.bold,
                        space_before: current_space,
                    });
                }
                pending_space = true;
            } else {
                if current.is_empty() {
                    current_space = pending_space;
                    pending_space = false;
                }
                current.push(c);
            }
        }
        if !current.is_empty() {
            words.push(Word {
                text: current,
                bold: span.bold,
                space_before: current_space,
            });
        }
    }
    words
}

/// Greedy word wrap that keeps weight changes as separate spans.
fn wrap_spans(spans: &[Span], max_chars: usize) -> Vec<Vec<Span>> {
    let mut lines: Vec<Vec<Span>> = Vec::new();
    let mut line: Vec<Span> = Vec::new();
    let mut width = 0usize;

    for word in split_words(spans) {
        let word_len = word.text.chars().count();
        let gap = usize::from(word.space_before && width > 0);

        if width > 0 && width + gap + word_len > max_chars {
            lines.push(std::mem::take(&mut line));
            width = 0;
        }
        let text = if word.space_before && width > 0 {
            format!(" {}", word.text)
        } else {
            word.text
        };
        width += text.chars().count();

        match line.last_mut() {
            Some(last) if last.bold == word.bold => last.text.push_str(&text),
            _ => line.push(Span::new(text, word.bold)),
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

/// Break an explanation into wrapped paragraphs.
pub fn layout_explanation(text: &str, max_chars: usize) -> Vec<Paragraph> {
    PARAGRAPH_BREAK
        .split(text)
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .map(|block| Paragraph {
            lines: block
                .lines()
                .flat_map(|line| wrap_spans(&parse_inline_bold(line), max_chars))
                .collect(),
        })
        .filter(|p| !p.lines.is_empty())
        .collect()
}

/// Render the titled explanation as PDF bytes.
pub fn render_education_pdf(explanation: &str) -> Result<Vec<u8>, EducationError> {
    let (doc, page1, layer1) = PdfDocument::new(PDF_TITLE, PAGE_WIDTH, PAGE_HEIGHT, "Layer 1");
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| EducationError::Pdf(format!("font error: {e}")))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| EducationError::Pdf(format!("font error: {e}")))?;

    let mut layer = doc.get_page(page1).get_layer(layer1);
    let mut y = TOP_Y;

    layer.use_text(PDF_TITLE, TITLE_SIZE, Mm(MARGIN_LEFT), Mm(y), &bold);
    y -= LINE_HEIGHT * 2.0 + PARAGRAPH_GAP;

    for paragraph in layout_explanation(explanation, BODY_LINE_CHARS) {
        for line in &paragraph.lines {
            if y < BOTTOM_Y {
                let (page, page_layer) = doc.add_page(PAGE_WIDTH, PAGE_HEIGHT, "Layer 1");
                layer = doc.get_page(page).get_layer(page_layer);
                y = TOP_Y;
            }

            layer.begin_text_section();
            layer.set_text_cursor(Mm(MARGIN_LEFT), Mm(y));
            for span in line {
                let font = if span.bold { &bold } else { &regular };
                layer.set_font(font, BODY_SIZE);
                layer.write_text(span.text.clone(), font);
            }
            layer.end_text_section();

            y -= LINE_HEIGHT;
        }
        y -= PARAGRAPH_GAP;
    }

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| EducationError::Pdf(format!("save error: {e}")))?;
    buf.into_inner()
        .map_err(|e| EducationError::Pdf(format!("buffer error: {e}")))
}
