//! Flow – streams laid-out HTML boxes into a session's pages.
//!
//! Handles:
//! - continuing below whatever the session already holds
//! - page-break-before / page-break-after hints
//! - table row splitting across pages
//! - text blocks taller than a page, split between lines

use crate::dom::Tag;
use crate::layout::{BoxContent, FlowLayout, PositionedBox};
use crate::layout_config::{BorderStyle, ImageContent, LayoutBox, TextContent, TextLine};
use crate::session::DocumentSession;

/// Recursively expand any pure-container box whose height exceeds a single
/// page so its children can be split across pages individually.
fn flatten_for_pagination(boxes: &[PositionedBox], content_height: f32) -> Vec<&PositionedBox> {
    let mut result = Vec::new();
    for pbox in boxes {
        if pbox.height > content_height
            && matches!(pbox.content, BoxContent::None)
            && !pbox.children.is_empty()
            && !is_table_like(pbox)
        {
            result.extend(flatten_for_pagination(&pbox.children, content_height));
        } else {
            result.push(pbox);
        }
    }
    result
}

fn is_table_like(pbox: &PositionedBox) -> bool {
    pbox.tag == Some(Tag::Table) && !pbox.children.is_empty()
}

/// Tracks how flow-space y maps onto the session's current page.
struct Placer<'s> {
    session: &'s mut DocumentSession,
    /// page_y = flow_y + shift
    shift: f32,
}

impl Placer<'_> {
    fn new_page_at(&mut self, flow_y: f32) {
        self.session.break_page();
        self.shift = self.session.content_top() - flow_y;
    }

    fn overflows(&self, pbox: &PositionedBox) -> bool {
        pbox.y + self.shift + pbox.height > self.session.content_bottom()
    }

    fn push(&mut self, pbox: &PositionedBox) {
        let left = self.session.content_left();
        let lbox = build_layout_box(pbox, left, pbox.y + self.shift, self.session);
        self.session.push_box(lbox);
    }

    /// Place a table row by row. Every page fragment gets its own frame
    /// carrying the table's background and border.
    fn split_table_box(&mut self, pbox: &PositionedBox) {
        let left = self.session.content_left();
        let s = &pbox.style;
        let inset_top = s.border_width + s.padding_top;
        let inset_bottom = s.border_width + s.padding_bottom;
        let mut frame: Option<LayoutBox> = None;
        for (i, row) in pbox.children.iter().enumerate() {
            // Flow y of the frame edge when this row opens a fragment.
            let frame_top = if i == 0 { pbox.y } else { row.y - inset_top };
            let bottom = row.y + self.shift + row.height + inset_bottom;
            let page_is_empty = self.session.current_page_is_empty() && frame.is_none();
            if bottom > self.session.content_bottom() && !page_is_empty {
                if let Some(f) = frame.take() {
                    self.push_frame(f, inset_bottom);
                }
                self.new_page_at(frame_top);
            }
            let row_box = build_layout_box(row, left, row.y + self.shift, self.session);
            let shift = self.shift;
            frame
                .get_or_insert_with(|| table_frame(pbox, left, frame_top + shift))
                .children
                .push(row_box);
        }
        if let Some(f) = frame {
            self.push_frame(f, inset_bottom);
        }
    }

    /// Close a table fragment below its last row and add it to the page.
    fn push_frame(&mut self, mut frame: LayoutBox, inset_bottom: f32) {
        let bottom = frame
            .children
            .last()
            .map_or(frame.y, |r| r.y + r.height + inset_bottom);
        frame.height = (bottom - frame.y).max(0.0);
        self.session.push_box(frame);
    }

    /// Place a text box line by line, breaking pages between lines.
    fn split_text_box(&mut self, pbox: &PositionedBox) {
        let left = self.session.content_left();
        let full = build_layout_box(pbox, left, pbox.y + self.shift, self.session);
        let Some(mut text) = full.text else {
            return;
        };
        let mut remaining = std::mem::take(&mut text.lines).into_iter().peekable();
        while remaining.peek().is_some() {
            let top = (pbox.y + self.shift).max(self.session.cursor_y());
            let available = self.session.content_bottom() - top;
            let mut fit = (available / text.line_height).floor().max(0.0) as usize;
            if fit == 0 {
                if self.session.current_page_is_empty() {
                    fit = 1;
                } else {
                    self.session.break_page();
                    self.shift = self.session.content_top() - pbox.y;
                    continue;
                }
            }
            let mut chunk: Vec<TextLine> = remaining.by_ref().take(fit).collect();
            let base = chunk.first().map_or(0.0, |l| l.y_offset);
            for line in &mut chunk {
                line.y_offset -= base;
            }
            let height = chunk.len() as f32 * text.line_height;
            let mut lbox = LayoutBox::new(full.x, top, full.width, height);
            lbox.text = Some(TextContent {
                lines: chunk,
                ..text.clone()
            });
            self.session.push_box(lbox);
            self.session.set_cursor_y(top + height);
            text.list_marker = None;
            if remaining.peek().is_some() {
                self.session.break_page();
                // Remaining lines start at the top of the next page.
                self.shift = self.session.content_top() - pbox.y;
            }
        }
        // Following boxes continue below the last chunk.
        self.shift = self.session.cursor_y() - (pbox.y + pbox.height);
    }
}

/// Stream a laid-out HTML document into `session`, starting at its cursor.
pub(crate) fn place_flow(session: &mut DocumentSession, flow: &FlowLayout) {
    if flow.boxes.is_empty() {
        return;
    }
    let content_height = session.content_height();
    let shift = session.cursor_y();
    let mut placer = Placer { session, shift };

    // Expand oversized wrapper divs so their children can paginate individually.
    let flat = flatten_for_pagination(&flow.boxes, content_height);
    let mut break_pending = false;

    for pbox in flat {
        if (pbox.page_break_before || break_pending) && !placer.session.current_page_is_empty() {
            placer.new_page_at(pbox.y);
        }
        break_pending = false;

        if placer.overflows(pbox) {
            if is_table_like(pbox) {
                placer.split_table_box(pbox);
                continue;
            }
            let is_text = matches!(pbox.content, BoxContent::Text { .. });
            if is_text && pbox.height > content_height {
                if !placer.session.current_page_is_empty() && pbox.y + placer.shift >= placer.session.content_bottom() {
                    placer.new_page_at(pbox.y);
                }
                placer.split_text_box(pbox);
                continue;
            }
            if !placer.session.current_page_is_empty() {
                placer.new_page_at(pbox.y);
            }
        }

        placer.push(pbox);
        break_pending = pbox.page_break_after;
    }

    let end = flow.height + placer.shift;
    let cursor = placer.session.cursor_y().max(end);
    placer.session.set_cursor_y(cursor);
    if break_pending {
        placer.session.break_page();
    }
}

/// An empty box with the table's decoration, rows are added as children.
fn table_frame(table: &PositionedBox, left: f32, top: f32) -> LayoutBox {
    let mut frame = LayoutBox::new(left + table.x, top, table.width, 0.0);
    decorate(&mut frame, table);
    frame
}

fn decorate(lb: &mut LayoutBox, pbox: &PositionedBox) {
    let s = &pbox.style;
    if !s.background_color.is_transparent() {
        lb.background_color = Some(s.background_color.to_array());
    }
    if s.border_width > 0.0 {
        lb.border = Some(BorderStyle {
            width: s.border_width,
            color: s.border_color.to_array(),
        });
    }
}

/// Recursively build a LayoutBox tree where every box carries *page-absolute*
/// x/y coordinates (origin = top-left of the physical page).
///
/// `pbox.x` is relative to the content area's left edge, and a child's
/// absolute y is `parent_abs_y + (child.y − parent.y)` because positioned
/// boxes carry accumulated flow-space coordinates.
fn build_layout_box(pbox: &PositionedBox, left: f32, abs_y: f32, session: &DocumentSession) -> LayoutBox {
    let mut lb = LayoutBox::new(left + pbox.x, abs_y, pbox.width, pbox.height);
    let s = &pbox.style;
    decorate(&mut lb, pbox);

    let line_height = session.metrics().line_height(s.font_size, s.line_height);
    let text_content = |lines: Vec<TextLine>| TextContent {
        lines,
        font_size: s.font_size,
        line_height,
        text_align: s.text_align,
        list_marker: pbox.marker.clone(),
        color: s.color.to_array(),
    };

    match &pbox.content {
        BoxContent::Text { lines } => {
            let inset_left = s.padding_left + s.border_width;
            let inset_top = s.padding_top + s.border_width;
            let inner_width = pbox.width - inset_left - s.padding_right - s.border_width;
            let text_lines = lines
                .iter()
                .enumerate()
                .map(|(i, line)| TextLine {
                    text: line.text.clone(),
                    runs: line.runs.clone(),
                    x_offset: inset_left + s.text_align.offset(inner_width, line.width),
                    y_offset: inset_top + i as f32 * line_height,
                })
                .collect();
            lb.text = Some(text_content(text_lines));
        }
        BoxContent::Image { image_id } => {
            lb.image = Some(ImageContent {
                image_id: image_id.clone(),
                width: pbox.width,
                height: pbox.height,
            });
        }
        BoxContent::None => {
            // Containers only carry text for their list marker.
            if pbox.marker.is_some() {
                lb.text = Some(text_content(Vec::new()));
            }
        }
    }

    for child in &pbox.children {
        let child_abs_y = abs_y + (child.y - pbox.y);
        lb.children
            .push(build_layout_box(child, left, child_abs_y, session));
    }

    lb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_html;
    use crate::layout::compute_layout;
    use crate::session::{Margins, PageSize};
    use crate::style::{build_styled_tree, Stylesheet};

    fn flow_into(session: &mut DocumentSession, html: &str) {
        let doc = parse_html(html).unwrap();
        let sheet = Stylesheet::parse(&doc.stylesheet);
        let styled = build_styled_tree(&doc.body(), None, &sheet);
        let width = session.content_width();
        let metrics = session.metrics().clone();
        let flow = compute_layout(&styled, width, &metrics, session.images_mut()).unwrap();
        place_flow(session, &flow);
    }

    fn session() -> DocumentSession {
        DocumentSession::open(PageSize::A4, Margins::default())
    }

    #[test]
    fn single_page() {
        let mut s = session();
        flow_into(&mut s, "<p>Short text</p>");
        assert_eq!(s.page_count(), 1);
        assert_eq!(s.text_lines(), vec!["Short text"]);
        let b = &s.layout().pages[0].boxes[0];
        assert_eq!(b.y, s.content_top());
        assert_eq!(b.x, s.content_left());
        assert!(s.cursor_y() > b.y + b.height - 0.01);
    }

    #[test]
    fn multiple_pages() {
        let mut html = String::new();
        for i in 0..80 {
            html.push_str(&format!("<p>Paragraph {i} with some text</p>"));
        }
        let mut s = session();
        flow_into(&mut s, &html);
        assert!(s.page_count() > 1, "Expected multiple pages, got {}", s.page_count());
        for page in &s.layout().pages {
            for b in &page.boxes {
                assert!(b.y + b.height <= s.content_bottom() + 0.5);
            }
        }
    }

    #[test]
    fn continues_below_existing_content() {
        let mut s = session();
        flow_into(&mut s, "<p>uno</p>");
        let cursor = s.cursor_y();
        flow_into(&mut s, "<p>dos</p>");
        let second = &s.layout().pages[0].boxes[1];
        assert!(second.y >= cursor - 0.01);
        assert_eq!(s.text_lines(), vec!["uno", "dos"]);
    }

    #[test]
    fn page_break_hints() {
        let mut s = session();
        flow_into(
            &mut s,
            "<p>uno</p><p style='page-break-before: always'>dos</p>\
             <p style='page-break-after: always'>tres</p><p>cuatro</p>",
        );
        assert_eq!(s.page_count(), 3);
        assert_eq!(s.layout().pages[2].boxes.len(), 1);
    }

    #[test]
    fn long_table_splits_between_rows() {
        let mut html = String::from("<table border='1'>");
        for i in 0..120 {
            html.push_str(&format!("<tr><td>fila {i}</td><td>valor</td></tr>"));
        }
        html.push_str("</table>");
        let mut s = session();
        flow_into(&mut s, &html);
        assert!(s.page_count() > 1);
        let mut rows = 0;
        for page in &s.layout().pages {
            // One bordered frame per page, wrapping that page's rows.
            assert_eq!(page.boxes.len(), 1);
            let frame = &page.boxes[0];
            assert!(frame.border.is_some(), "table border lost on page {}", page.page_index);
            assert!(frame.y + frame.height <= s.content_bottom() + 0.5);
            for row in &frame.children {
                assert!(row.y >= frame.y - 0.01);
                assert!(row.y + row.height <= frame.y + frame.height + 0.01);
            }
            rows += frame.children.len();
        }
        assert_eq!(rows, 120);
    }

    #[test]
    fn split_table_keeps_background_on_every_page() {
        let mut html = String::from("<table style='background-color: #eeeeee'>");
        for i in 0..120 {
            html.push_str(&format!("<tr><td>fila {i}</td></tr>"));
        }
        html.push_str("</table>");
        let mut s = session();
        flow_into(&mut s, &html);
        assert!(s.page_count() > 1);
        for page in &s.layout().pages {
            assert!(page.boxes[0].background_color.is_some());
        }
    }

    #[test]
    fn tall_text_block_splits_between_lines() {
        let html = format!("<p>{}</p>", "palabra ".repeat(4000));
        let mut s = session();
        flow_into(&mut s, &html);
        assert!(s.page_count() > 1);
        for page in &s.layout().pages {
            for b in &page.boxes {
                assert!(b.y + b.height <= s.content_bottom() + 0.5);
            }
        }
    }
}
