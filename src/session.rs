//! Document session – the live, in-progress PDF document.
//!
//! A session owns the page list (as a [`DocumentLayout`]), the image store
//! and the flow cursor. Appenders place fully built boxes into it; nothing is
//! serialised until [`DocumentSession::close`].

use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::fonts::{FontMetrics, WrappedLine};
use crate::layout_config::{Alignment, DocumentLayout, LayoutBox, PageLayout, TextContent, TextLine};
use crate::render::render_pdf;
use crate::resources::ImageStore;

/// Physical page size.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageSize {
    #[default]
    Letter,
    A4,
    Legal,
    Custom { width: f32, height: f32 },
}

impl PageSize {
    /// (width, height) in PDF points.
    pub fn dimensions_pt(self) -> (f32, f32) {
        match self {
            PageSize::Letter => (612.0, 792.0),
            PageSize::A4 => (595.28, 841.89),
            PageSize::Legal => (612.0, 1008.0),
            PageSize::Custom { width, height } => (width, height),
        }
    }
}

/// Page margins in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Margins {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl Margins {
    pub const fn uniform(v: f32) -> Self {
        Self {
            top: v,
            right: v,
            bottom: v,
            left: v,
        }
    }
}

impl Default for Margins {
    fn default() -> Self {
        Self::uniform(40.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Open,
    Closed,
}

/// An open (or closed) document.
#[derive(Debug)]
pub struct DocumentSession {
    layout: DocumentLayout,
    margins: Margins,
    images: ImageStore,
    /// Page-absolute y where the next block starts on the current page.
    cursor_y: f32,
    metrics: FontMetrics,
    state: SessionState,
    output: Vec<u8>,
}

impl DocumentSession {
    /// Open a session with one empty page.
    pub fn open(page_size: PageSize, margins: Margins) -> Self {
        let (width, height) = page_size.dimensions_pt();
        let mut layout = DocumentLayout::new(width, height);
        layout.pages.push(PageLayout {
            page_index: 0,
            boxes: Vec::new(),
        });
        log::debug!("Opened document session ({width}x{height} pt)");
        Self {
            layout,
            margins,
            images: ImageStore::default(),
            cursor_y: margins.top,
            metrics: FontMetrics::default(),
            state: SessionState::Open,
            output: Vec::new(),
        }
    }

    /// Title written to the PDF metadata.
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.layout.title = title.into();
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    pub fn page_count(&self) -> usize {
        self.layout.pages.len()
    }

    /// Number of content-bearing boxes placed so far.
    pub fn element_count(&self) -> usize {
        self.layout.element_count()
    }

    /// The page layout built so far.
    pub fn layout(&self) -> &DocumentLayout {
        &self.layout
    }

    /// Every text line placed so far, in reading order.
    pub fn text_lines(&self) -> Vec<String> {
        self.layout.text_lines()
    }

    /// Start a new page. Returns `false` (and does nothing) when the current
    /// page is still empty.
    pub fn new_page(&mut self) -> Result<bool, SessionError> {
        self.ensure_open()?;
        if self.current_page_is_empty() {
            return Ok(false);
        }
        self.break_page();
        Ok(true)
    }

    /// Render every page and hand over the PDF bytes. The session is closed
    /// afterwards; closing twice fails.
    pub fn close(&mut self) -> Result<Vec<u8>, SessionError> {
        self.ensure_open()?;
        self.state = SessionState::Closed;

        // A trailing forced break may have left an empty last page.
        while self.layout.pages.len() > 1
            && self.layout.pages.last().is_some_and(|p| p.boxes.is_empty())
        {
            self.layout.pages.pop();
        }

        self.output = render_pdf(&self.layout, &self.images);
        log::info!(
            "Closed document session: {} page(s), {} element(s), {} bytes",
            self.layout.pages.len(),
            self.layout.element_count(),
            self.output.len()
        );
        Ok(std::mem::take(&mut self.output))
    }

    // -----------------------------------------------------------------------
    // Flow primitives used by the appenders
    // -----------------------------------------------------------------------

    pub(crate) fn ensure_open(&self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Open => Ok(()),
            SessionState::Closed => Err(SessionError::Closed),
        }
    }

    pub(crate) fn metrics(&self) -> &FontMetrics {
        &self.metrics
    }

    pub(crate) fn images(&self) -> &ImageStore {
        &self.images
    }

    pub(crate) fn images_mut(&mut self) -> &mut ImageStore {
        &mut self.images
    }

    pub(crate) fn content_left(&self) -> f32 {
        self.margins.left
    }

    pub(crate) fn content_width(&self) -> f32 {
        (self.layout.page_width_pt - self.margins.left - self.margins.right).max(1.0)
    }

    pub(crate) fn content_top(&self) -> f32 {
        self.margins.top
    }

    pub(crate) fn content_bottom(&self) -> f32 {
        self.layout.page_height_pt - self.margins.bottom
    }

    pub(crate) fn content_height(&self) -> f32 {
        (self.content_bottom() - self.content_top()).max(1.0)
    }

    pub(crate) fn cursor_y(&self) -> f32 {
        self.cursor_y
    }

    pub(crate) fn set_cursor_y(&mut self, y: f32) {
        self.cursor_y = y;
    }

    pub(crate) fn current_page_is_empty(&self) -> bool {
        self.layout
            .pages
            .last()
            .map_or(true, |p| p.boxes.is_empty())
    }

    /// Unconditionally start a new page and reset the cursor.
    pub(crate) fn break_page(&mut self) {
        let page_index = self.layout.pages.len();
        self.layout.pages.push(PageLayout {
            page_index,
            boxes: Vec::new(),
        });
        self.cursor_y = self.margins.top;
    }

    /// Add an already positioned box to the current page.
    pub(crate) fn push_box(&mut self, lbox: LayoutBox) {
        if self.layout.pages.is_empty() {
            self.break_page();
        }
        if let Some(page) = self.layout.pages.last_mut() {
            page.boxes.push(lbox);
        }
    }

    /// Place a block built at y = 0 below the cursor, moving to a new page if
    /// it does not fit in the remaining height.
    pub(crate) fn place_block(&mut self, mut lbox: LayoutBox, spacing_before: f32, spacing_after: f32) {
        let needed = spacing_before + lbox.height;
        if self.cursor_y + needed > self.content_bottom() && !self.current_page_is_empty() {
            self.break_page();
        }
        let top = self.cursor_y + spacing_before;
        lbox.translate_y(top - lbox.y);
        self.cursor_y = top + lbox.height + spacing_after;
        self.push_box(lbox);
    }

    /// Place pre-wrapped lines as a paragraph spanning the content width,
    /// splitting between lines at page boundaries.
    pub(crate) fn place_paragraph(
        &mut self,
        lines: Vec<WrappedLine>,
        align: Alignment,
        font_size: f32,
        line_height: f32,
    ) {
        let width = self.content_width();
        let left = self.content_left();
        let mut pending = lines.into_iter().peekable();

        while pending.peek().is_some() {
            let available = self.content_bottom() - self.cursor_y;
            let mut fit = (available / line_height).floor().max(0.0) as usize;
            if fit == 0 {
                if self.current_page_is_empty() {
                    // A page that cannot hold one line still gets one.
                    fit = 1;
                } else {
                    self.break_page();
                    continue;
                }
            }

            let chunk: Vec<WrappedLine> = pending.by_ref().take(fit).collect();
            let text_lines: Vec<TextLine> = chunk
                .into_iter()
                .enumerate()
                .map(|(i, line)| TextLine {
                    x_offset: align.offset(width, line.width),
                    y_offset: i as f32 * line_height,
                    text: line.text,
                    runs: line.runs,
                })
                .collect();
            let height = text_lines.len() as f32 * line_height;

            let mut lbox = LayoutBox::new(left, self.cursor_y, width, height);
            lbox.text = Some(TextContent {
                lines: text_lines,
                font_size,
                line_height,
                text_align: align,
                list_marker: None,
                color: [0.0, 0.0, 0.0, 1.0],
            });
            self.cursor_y += height;
            self.push_box(lbox);
        }
    }
}
