//! Text measurement for the builtin Helvetica family.
//!
//! Every run is rendered with one of the standard Helvetica faces. Advance
//! widths come from the font programs printpdf ships for those faces, parsed
//! with `ttf-parser`, so wrapping and alignment match what a viewer draws.

use std::collections::HashMap;
use std::sync::OnceLock;

use printpdf::BuiltinFont;
use ttf_parser::{Face, GlyphId};

use crate::layout_config::{RunStyle, TextRun};

/// Font size used for session paragraphs, in points.
pub const BODY_FONT_SIZE: f32 = 12.0;

/// Leading factor used for session paragraphs.
pub const BODY_LINE_HEIGHT: f32 = 1.5;

/// Average advance used when no font program can be parsed, in em.
const HEURISTIC_ADVANCE: f32 = 0.5;

/// Advance widths of one face, in em.
#[derive(Debug, Clone)]
struct FaceMetrics {
    advances: HashMap<char, f32>,
    /// Advance of `?`, which is what unencodable characters render as.
    fallback: f32,
    ascender: f32,
}

impl FaceMetrics {
    fn load(font: BuiltinFont) -> Self {
        let subset = font.get_subset_font();
        let face = match Face::parse(&subset.bytes, 0) {
            Ok(face) => face,
            Err(e) => {
                log::warn!("Cannot parse builtin font {font:?}: {e}; using estimated widths");
                return Self::estimated();
            }
        };
        let scale = 1.0 / f32::from(face.units_per_em().max(1));
        let advance = |gid: GlyphId| face.glyph_hor_advance(gid).map(|a| f32::from(a) * scale);

        let mut advances: HashMap<char, f32> = subset
            .glyph_mapping
            .values()
            .filter_map(|&(gid, ch)| Some((ch, advance(GlyphId(gid))?)))
            .collect();
        // Anything the mapping table lacks is looked up through the cmap.
        for ch in (' '..='~').chain('\u{A0}'..='\u{FF}') {
            if advances.contains_key(&ch) {
                continue;
            }
            if let Some(a) = face.glyph_index(ch).and_then(|gid| advance(gid)) {
                advances.insert(ch, a);
            }
        }

        let fallback = advances.get(&'?').copied().unwrap_or(HEURISTIC_ADVANCE);
        Self {
            advances,
            fallback,
            ascender: f32::from(face.ascender()) * scale,
        }
    }

    fn estimated() -> Self {
        Self {
            advances: HashMap::new(),
            fallback: HEURISTIC_ADVANCE,
            ascender: 0.75,
        }
    }

    fn width_em(&self, text: &str) -> f32 {
        text.chars()
            .map(|c| self.advances.get(&c).copied().unwrap_or(self.fallback))
            .sum()
    }
}

/// Builtin font metrics.
///
/// Oblique faces share the advances of their upright counterparts, so only
/// the regular and bold programs are loaded.
#[derive(Debug, Clone)]
pub struct FontMetrics {
    regular: FaceMetrics,
    bold: FaceMetrics,
}

impl Default for FontMetrics {
    fn default() -> Self {
        static BUILTIN: OnceLock<FontMetrics> = OnceLock::new();
        BUILTIN
            .get_or_init(|| Self {
                regular: FaceMetrics::load(BuiltinFont::Helvetica),
                bold: FaceMetrics::load(BuiltinFont::HelveticaBold),
            })
            .clone()
    }
}

impl FontMetrics {
    fn face(&self, bold: bool) -> &FaceMetrics {
        if bold {
            &self.bold
        } else {
            &self.regular
        }
    }

    /// Measure the width of a string at a given font size (in pt).
    pub fn measure_text_width(&self, text: &str, font_size: f32, bold: bool) -> f32 {
        self.face(bold).width_em(text) * font_size
    }

    /// Line height in pt.
    pub fn line_height(&self, font_size: f32, line_height_factor: f32) -> f32 {
        font_size * line_height_factor
    }

    /// Ascender in pt, used to place the baseline below a line's top edge.
    pub fn ascender(&self, font_size: f32) -> f32 {
        font_size * self.regular.ascender
    }
}

/// A piece of inline content fed to [`wrap_inline`].
#[derive(Debug, Clone)]
pub enum InlineItem {
    Text(String, RunStyle),
    /// Forced line break (`<br>` or an explicit newline).
    LineBreak,
}

/// One wrapped line: styled runs plus the total advance.
#[derive(Debug, Clone, Default)]
pub struct WrappedLine {
    pub text: String,
    pub runs: Vec<TextRun>,
    pub width: f32,
}

/// A word split into same-style segments (`<b>x</b>.` is one word, two segments).
type Word = Vec<(String, RunStyle)>;

/// Split inline items into words, keeping forced breaks as `None`.
fn words(items: &[InlineItem]) -> Vec<Option<Word>> {
    let mut out = Vec::new();
    let mut current: Word = Vec::new();
    for item in items {
        match item {
            InlineItem::LineBreak => {
                if !current.is_empty() {
                    out.push(Some(std::mem::take(&mut current)));
                }
                out.push(None);
            }
            InlineItem::Text(text, style) => {
                for (i, piece) in text.split('\n').enumerate() {
                    if i > 0 {
                        if !current.is_empty() {
                            out.push(Some(std::mem::take(&mut current)));
                        }
                        out.push(None);
                    }
                    let mut segment = String::new();
                    for c in piece.chars() {
                        if c.is_whitespace() && c != '\u{00A0}' {
                            if !segment.is_empty() {
                                current.push((std::mem::take(&mut segment), *style));
                            }
                            if !current.is_empty() {
                                out.push(Some(std::mem::take(&mut current)));
                            }
                        } else {
                            segment.push(c);
                        }
                    }
                    if !segment.is_empty() {
                        current.push((segment, *style));
                    }
                }
            }
        }
    }
    if !current.is_empty() {
        out.push(Some(current));
    }
    out
}

/// Greedy word-wrap of styled inline content to `max_width` points.
///
/// Adjacent segments with identical style are merged into one run. Always
/// returns at least one (possibly empty) line.
pub fn wrap_inline(
    items: &[InlineItem],
    font_size: f32,
    max_width: f32,
    metrics: &FontMetrics,
) -> Vec<WrappedLine> {
    let space = metrics.measure_text_width(" ", font_size, false);
    let mut lines = Vec::new();
    let mut line = WrappedLine::default();

    for word in words(items) {
        let Some(word) = word else {
            lines.push(std::mem::take(&mut line));
            continue;
        };
        let word_width: f32 = word
            .iter()
            .map(|(t, s)| metrics.measure_text_width(t, font_size, s.bold))
            .sum();
        let lead = if line.runs.is_empty() { 0.0 } else { space };
        if max_width > 0.0 && !line.runs.is_empty() && line.width + lead + word_width > max_width {
            lines.push(std::mem::take(&mut line));
        }

        let mut first = true;
        for (text, style) in word {
            let spaced = first && !line.runs.is_empty();
            first = false;
            let seg_width = metrics.measure_text_width(&text, font_size, style.bold);
            let gap = if spaced { space } else { 0.0 };
            if spaced {
                line.text.push(' ');
            }
            line.text.push_str(&text);
            match line.runs.last_mut() {
                Some(run) if run.style == style => {
                    if spaced {
                        run.text.push(' ');
                    }
                    run.text.push_str(&text);
                    run.width += gap + seg_width;
                }
                _ => line.runs.push(TextRun {
                    text,
                    x_offset: line.width + gap,
                    width: seg_width,
                    style,
                }),
            }
            line.width += gap + seg_width;
        }
    }
    if !line.runs.is_empty() || lines.is_empty() {
        lines.push(line);
    }
    lines
}

/// Word-wrap single-style text to fit within `max_width` points.
pub fn wrap_text(
    text: &str,
    font_size: f32,
    style: RunStyle,
    max_width: f32,
    metrics: &FontMetrics,
) -> Vec<WrappedLine> {
    wrap_inline(
        &[InlineItem::Text(text.to_string(), style)],
        font_size,
        max_width,
        metrics,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f32, expected: f32) {
        let tolerance = 0.01 * expected.max(1.0);
        assert!((actual - expected).abs() < tolerance, "{actual} != {expected}");
    }

    #[test]
    fn helvetica_advances() {
        let m = FontMetrics::default();
        // Standard Helvetica widths, per 1000 units of em.
        assert_close(m.measure_text_width("M", 1.0, false), 0.833);
        assert_close(m.measure_text_width("i", 1.0, false), 0.222);
        assert_close(m.measure_text_width(" ", 1.0, false), 0.278);
        assert_close(m.measure_text_width("a", 1.0, false), 0.556);
        assert_close(m.measure_text_width("l", 1.0, true), 0.278);
    }

    #[test]
    fn spanish_prose_width() {
        let m = FontMetrics::default();
        // Every glyph here is 556 units wide.
        let w = m.measure_text_width("quéñandú", 10.0, false);
        assert_close(w, 8.0 * 0.556 * 10.0);
    }

    #[test]
    fn unencodable_chars_measure_as_question_mark() {
        let m = FontMetrics::default();
        assert_close(
            m.measure_text_width("\u{4E2D}", 12.0, false),
            m.measure_text_width("?", 12.0, false),
        );
    }

    #[test]
    fn bold_is_wider() {
        let m = FontMetrics::default();
        assert!(m.measure_text_width("Hello", 12.0, true) > m.measure_text_width("Hello", 12.0, false));
    }

    fn plain(lines: &[WrappedLine]) -> Vec<&str> {
        lines.iter().map(|l| l.text.as_str()).collect()
    }

    #[test]
    fn word_wrap_basic() {
        let m = FontMetrics::default();
        let lines = wrap_text("Hello world foo bar", 16.0, RunStyle::default(), 60.0, &m);
        assert!(lines.len() >= 2, "Expected wrapping, got {:?}", plain(&lines));
        assert!(lines.iter().all(|l| l.width <= 60.0 || l.runs.len() == 1));
    }

    #[test]
    fn explicit_newlines_are_kept() {
        let m = FontMetrics::default();
        let lines = wrap_text("uno\ndos", 12.0, RunStyle::default(), 500.0, &m);
        assert_eq!(plain(&lines), vec!["uno", "dos"]);
    }

    #[test]
    fn styled_runs_merge_and_glue() {
        let m = FontMetrics::default();
        let bold = RunStyle {
            bold: true,
            ..RunStyle::default()
        };
        let items = vec![
            InlineItem::Text("Este es un ".into(), RunStyle::default()),
            InlineItem::Text("estilo".into(), bold),
            InlineItem::Text(". Fin".into(), RunStyle::default()),
        ];
        let lines = wrap_inline(&items, 12.0, 500.0, &m);
        assert_eq!(plain(&lines), vec!["Este es un estilo. Fin"]);
        let runs = &lines[0].runs;
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0].text, "Este es un");
        assert_eq!(runs[1].text, "estilo");
        assert_eq!(runs[2].text, ". Fin");
        assert!(runs[1].x_offset > runs[0].width);
    }

    #[test]
    fn empty_input_yields_one_empty_line() {
        let m = FontMetrics::default();
        let lines = wrap_text("", 12.0, RunStyle::default(), 100.0, &m);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].runs.is_empty());
    }
}
