//! Document layout – the intermediate representation between the session's
//! page flow and PDF rendering. This is the "frozen" structure that encodes
//! exactly what goes on each page.

use serde::{Deserialize, Serialize};

/// Horizontal alignment of a block within the content area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
    /// Lines are not stretched; rendered like `Left`.
    Justify,
}

impl Alignment {
    /// X offset of an item `item_width` wide inside a box `box_width` wide.
    pub fn offset(self, box_width: f32, item_width: f32) -> f32 {
        let free = (box_width - item_width).max(0.0);
        match self {
            Alignment::Left | Alignment::Justify => 0.0,
            Alignment::Center => free / 2.0,
            Alignment::Right => free,
        }
    }
}

/// A complete document layout ready for rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentLayout {
    /// Document title embedded in the PDF metadata.
    #[serde(default = "DocumentLayout::default_title")]
    pub title: String,
    /// Width of each page in PDF points (1 pt = 1/72 inch).
    pub page_width_pt: f32,
    /// Height of each page in PDF points.
    pub page_height_pt: f32,
    /// Ordered list of pages.
    pub pages: Vec<PageLayout>,
}

/// One page of content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageLayout {
    pub page_index: usize,
    pub boxes: Vec<LayoutBox>,
}

/// A positioned rectangle with optional content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutBox {
    /// Position relative to page top-left, in points.
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,

    /// Visual styling
    pub background_color: Option<[f32; 4]>,
    pub border: Option<BorderStyle>,

    /// Content (mutually exclusive in practice)
    pub text: Option<TextContent>,
    pub image: Option<ImageContent>,
    pub rule: Option<RuleContent>,

    /// Children (nested boxes)
    pub children: Vec<LayoutBox>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BorderStyle {
    pub width: f32,
    pub color: [f32; 4],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextContent {
    /// Pre-wrapped lines of text.
    pub lines: Vec<TextLine>,
    pub font_size: f32,
    pub line_height: f32,
    pub text_align: Alignment,
    /// List bullet/number prefix (e.g. "• " or "1. ")
    pub list_marker: Option<String>,
    /// Colour of the list marker.
    pub color: [f32; 4],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextLine {
    /// Plain text of the whole line, runs joined with their spacing.
    pub text: String,
    /// Styled pieces of the line, left to right.
    pub runs: Vec<TextRun>,
    /// X offset within the layout box (for alignment)
    pub x_offset: f32,
    /// Y offset from the top of the text content area
    pub y_offset: f32,
}

/// A stretch of text drawn with a single face and colour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    /// X offset from the start of the line.
    pub x_offset: f32,
    pub width: f32,
    pub style: RunStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunStyle {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub color: [f32; 4],
}

impl Default for RunStyle {
    fn default() -> Self {
        Self {
            bold: false,
            italic: false,
            underline: false,
            color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// Reference into the session's image store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageContent {
    pub image_id: String,
    pub width: f32,
    pub height: f32,
}

/// A horizontal rule drawn through the vertical middle of its box.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleContent {
    pub thickness: f32,
    pub color: [f32; 4],
}

impl DocumentLayout {
    /// An empty layout with the given page dimensions.
    pub fn new(page_width_pt: f32, page_height_pt: f32) -> Self {
        Self {
            title: Self::default_title(),
            page_width_pt,
            page_height_pt,
            pages: Vec::new(),
        }
    }

    fn default_title() -> String {
        "Reporte".to_string()
    }

    /// Number of content-bearing boxes across all pages, nested ones included.
    pub fn element_count(&self) -> usize {
        self.pages
            .iter()
            .flat_map(|p| p.boxes.iter())
            .map(LayoutBox::element_count)
            .sum()
    }

    /// Every text line in reading order, for inspection and tests.
    pub fn text_lines(&self) -> Vec<String> {
        let mut out = Vec::new();
        for page in &self.pages {
            for lbox in &page.boxes {
                lbox.collect_text(&mut out);
            }
        }
        out
    }

    /// Serialise to JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Deserialise from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl LayoutBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            background_color: None,
            border: None,
            text: None,
            image: None,
            rule: None,
            children: Vec::new(),
        }
    }

    fn has_content(&self) -> bool {
        self.text.is_some()
            || self.image.is_some()
            || self.rule.is_some()
            || self.background_color.is_some()
            || self.border.is_some()
    }

    fn element_count(&self) -> usize {
        let own = usize::from(self.has_content());
        own + self.children.iter().map(Self::element_count).sum::<usize>()
    }

    fn collect_text(&self, out: &mut Vec<String>) {
        if let Some(text) = &self.text {
            out.extend(text.lines.iter().map(|l| l.text.clone()));
        }
        for child in &self.children {
            child.collect_text(out);
        }
    }

    /// Shift this box and its whole subtree vertically.
    pub fn translate_y(&mut self, dy: f32) {
        self.y += dy;
        for child in &mut self.children {
            child.translate_y(dy);
        }
    }
}
