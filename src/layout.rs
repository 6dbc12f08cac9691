//! Layout engine – uses Taffy to compute flexbox layout from a styled DOM
//! tree, then converts the result into a list of positioned boxes in flow
//! coordinates (origin = top-left of the content area, y grows downwards).

use std::collections::HashMap;

use taffy::prelude::*;

use crate::dom::Tag;
use crate::error::HtmlRenderError;
use crate::fonts::{wrap_inline, FontMetrics, InlineItem, WrappedLine};
use crate::layout_config::RunStyle;
use crate::resources::{parse_data_uri, ImageStore};
use crate::style::{self, ComputedStyle, StyledNode};

// ---------------------------------------------------------------------------
// Intermediate layout tree (pre-placement)
// ---------------------------------------------------------------------------

/// A positioned box in flow coordinates (before page placement).
#[derive(Debug, Clone)]
pub struct PositionedBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Source element, `None` for anonymous text and the root.
    pub tag: Option<Tag>,
    pub style: ComputedStyle,
    pub content: BoxContent,
    /// Bullet or number drawn in the left gutter of a list item.
    pub marker: Option<String>,
    pub children: Vec<PositionedBox>,
    pub page_break_before: bool,
    pub page_break_after: bool,
}

#[derive(Debug, Clone)]
pub enum BoxContent {
    None,
    Text { lines: Vec<WrappedLine> },
    Image { image_id: String },
}

/// Laid-out HTML document: top-level boxes plus the total flow height.
#[derive(Debug, Clone)]
pub struct FlowLayout {
    pub boxes: Vec<PositionedBox>,
    pub height: f32,
}

fn layout_err(e: taffy::TaffyError) -> HtmlRenderError {
    HtmlRenderError::Layout(e.to_string())
}

fn run_style(s: &ComputedStyle) -> RunStyle {
    RunStyle {
        bold: s.font_weight == style::FontWeight::Bold,
        italic: s.font_style == style::FontStyle::Italic,
        underline: s.text_decoration == style::TextDecoration::Underline,
        color: s.color.to_array(),
    }
}

/// True for nodes that flow inside a line (text, spans, `<br>`).
fn is_inline(node: &StyledNode) -> bool {
    match node {
        StyledNode::Text { .. } => true,
        StyledNode::Element {
            style, children, ..
        } => {
            matches!(style.display, style::Display::Inline | style::Display::None)
                && children.iter().all(is_inline)
        }
    }
}

/// Flatten an inline subtree into styled text items.
fn collect_inline(node: &StyledNode, out: &mut Vec<InlineItem>) {
    match node {
        StyledNode::Text { text, style } => {
            let text = text.replace(|c: char| matches!(c, '\n' | '\r' | '\t'), " ");
            out.push(InlineItem::Text(text, run_style(style)));
        }
        StyledNode::Element { tag: Tag::Br, .. } => out.push(InlineItem::LineBreak),
        StyledNode::Element { style, .. } if style.display == style::Display::None => {}
        StyledNode::Element { children, .. } => {
            for child in children {
                collect_inline(child, out);
            }
        }
    }
}

fn has_visible_text(items: &[InlineItem]) -> bool {
    items.iter().any(|i| match i {
        InlineItem::Text(t, _) => !t.trim().is_empty(),
        InlineItem::LineBreak => false,
    })
}

// ---------------------------------------------------------------------------
// Build Taffy tree from styled nodes
// ---------------------------------------------------------------------------

struct LayoutBuilder<'a> {
    taffy: TaffyTree<()>,
    metrics: &'a FontMetrics,
    images: &'a mut ImageStore,
    node_styles: HashMap<NodeId, ComputedStyle>,
    node_content: HashMap<NodeId, BoxContent>,
    node_markers: HashMap<NodeId, String>,
    node_tags: HashMap<NodeId, Tag>,
}

impl<'a> LayoutBuilder<'a> {
    fn new(metrics: &'a FontMetrics, images: &'a mut ImageStore) -> Self {
        Self {
            taffy: TaffyTree::new(),
            metrics,
            images,
            node_styles: HashMap::new(),
            node_content: HashMap::new(),
            node_markers: HashMap::new(),
            node_tags: HashMap::new(),
        }
    }

    fn resolve_width(style: &ComputedStyle, parent_width: f32) -> f32 {
        match style.width {
            style::Dimension::Pt(w) => w,
            style::Dimension::Percent(p) => parent_width * p / 100.0,
            style::Dimension::Auto => parent_width,
        }
    }

    /// Build a list of sibling nodes, wrapping each run of consecutive inline
    /// nodes into one anonymous text leaf styled like `parent`.
    fn build_children(
        &mut self,
        children: &[StyledNode],
        parent: &ComputedStyle,
        parent_tag: Option<&Tag>,
        child_width: f32,
    ) -> Result<Vec<NodeId>, HtmlRenderError> {
        let mut ids = Vec::new();
        let mut pending: Vec<InlineItem> = Vec::new();
        let mut list_counter = 0u32;

        for child in children {
            if is_inline(child) {
                collect_inline(child, &mut pending);
                continue;
            }
            self.flush_inline(&mut pending, parent, child_width, &mut ids)?;

            // For list items, compute and record the marker string so it can
            // be rendered as a bullet / number in the left gutter.
            let marker = match child {
                StyledNode::Element { tag: Tag::Li, .. } => {
                    list_counter += 1;
                    Some(if parent_tag == Some(&Tag::Ol) {
                        format!("{list_counter}.")
                    } else {
                        "\u{2022}".to_string()
                    })
                }
                _ => None,
            };

            if let Some(id) = self.build_node(child, child_width)? {
                if let Some(marker) = marker {
                    self.node_markers.insert(id, marker);
                }
                ids.push(id);
            }
        }
        self.flush_inline(&mut pending, parent, child_width, &mut ids)?;
        Ok(ids)
    }

    fn flush_inline(
        &mut self,
        pending: &mut Vec<InlineItem>,
        parent: &ComputedStyle,
        width: f32,
        ids: &mut Vec<NodeId>,
    ) -> Result<(), HtmlRenderError> {
        if has_visible_text(pending) {
            let mut anon = parent.clone();
            anon.display = style::Display::Block;
            anon.width = style::Dimension::Auto;
            anon.height = style::Dimension::Auto;
            anon.margin_top = 0.0;
            anon.margin_right = 0.0;
            anon.margin_bottom = 0.0;
            anon.margin_left = 0.0;
            anon.padding_top = 0.0;
            anon.padding_right = 0.0;
            anon.padding_bottom = 0.0;
            anon.padding_left = 0.0;
            anon.border_width = 0.0;
            anon.background_color = style::Color::TRANSPARENT;
            anon.page_break_before = false;
            anon.page_break_after = false;
            let id = self.build_text_leaf(pending, &anon, None, width)?;
            ids.push(id);
        }
        pending.clear();
        Ok(())
    }

    fn build_node(
        &mut self,
        styled: &StyledNode,
        parent_width: f32,
    ) -> Result<Option<NodeId>, HtmlRenderError> {
        match styled {
            StyledNode::Text { text, style } => {
                let items = vec![InlineItem::Text(text.clone(), run_style(style))];
                self.build_text_leaf(&items, style, None, parent_width)
                    .map(Some)
            }
            StyledNode::Element {
                tag,
                style,
                children,
                attrs,
            } => self.build_element_node(tag, style, children, attrs, parent_width),
        }
    }

    /// A leaf holding wrapped text. When `tag` is given the leaf also carries
    /// the element's box model (margins, padding, border, background).
    fn build_text_leaf(
        &mut self,
        items: &[InlineItem],
        style: &ComputedStyle,
        tag: Option<&Tag>,
        parent_width: f32,
    ) -> Result<NodeId, HtmlRenderError> {
        let border = style.border_width;
        let inset_h = style.padding_left + style.padding_right + 2.0 * border;
        let inset_v = style.padding_top + style.padding_bottom + 2.0 * border;
        let max_w = (Self::resolve_width(style, parent_width) - inset_h).max(1.0);

        let lines = wrap_inline(items, style.font_size, max_w, self.metrics);
        let text_width = lines.iter().map(|l| l.width).fold(0.0f32, f32::max);
        let line_height = self.metrics.line_height(style.font_size, style.line_height);
        let text_height = lines.len() as f32 * line_height;

        let mut ts = match tag {
            Some(tag) => self.computed_to_taffy(style, tag),
            None => Style::default(),
        };
        ts.size.height = taffy::Dimension::Length(text_height + inset_v);
        if !matches!(tag, Some(Tag::Td | Tag::Th)) {
            ts.min_size.width = taffy::Dimension::Length((text_width + inset_h).min(parent_width));
        }

        let node = self.taffy.new_leaf(ts).map_err(layout_err)?;
        self.node_styles.insert(node, style.clone());
        self.node_content.insert(node, BoxContent::Text { lines });
        if let Some(tag) = tag {
            self.node_tags.insert(node, tag.clone());
        }
        Ok(node)
    }

    fn build_element_node(
        &mut self,
        tag: &Tag,
        style: &ComputedStyle,
        children: &[StyledNode],
        attrs: &HashMap<String, String>,
        parent_width: f32,
    ) -> Result<Option<NodeId>, HtmlRenderError> {
        if style.display == style::Display::None {
            return Ok(None);
        }
        if *tag == Tag::Img {
            return self.build_image_node(style, attrs, parent_width);
        }

        // Block elements whose children are all inline become a single
        // wrapped text leaf so spans flow within the lines.
        if !children.is_empty() && children.iter().all(is_inline) {
            let mut items = Vec::new();
            for child in children {
                collect_inline(child, &mut items);
            }
            if has_visible_text(&items) {
                return self
                    .build_text_leaf(&items, style, Some(tag), parent_width)
                    .map(Some);
            }
        }

        // Compute the width available for children
        let my_width = Self::resolve_width(style, parent_width);
        let inner_width = (my_width
            - style.padding_left
            - style.padding_right
            - 2.0 * style.border_width)
            .max(1.0);

        // Estimate per-child width for flex-row containers and table rows so
        // that text is word-wrapped to the right column width at build time.
        let is_flex_row = style.display == style::Display::Flex
            && style.flex_direction == style::FlexDirection::Row;
        let is_table_row = *tag == Tag::Tr;

        let elem_child_count = children
            .iter()
            .filter(|c| matches!(c, StyledNode::Element { style, .. } if style.display != style::Display::None))
            .count()
            .max(1);

        let child_build_width = if is_flex_row || is_table_row {
            let gap_total = style.gap * (elem_child_count.saturating_sub(1)) as f32;
            ((inner_width - gap_total) / elem_child_count as f32).max(1.0)
        } else {
            inner_width
        };

        let child_nodes = self.build_children(children, style, Some(tag), child_build_width)?;

        let taffy_style = self.computed_to_taffy(style, tag);
        let node = self
            .taffy
            .new_with_children(taffy_style, &child_nodes)
            .map_err(layout_err)?;
        self.node_styles.insert(node, style.clone());
        self.node_tags.insert(node, tag.clone());
        Ok(Some(node))
    }

    /// `<img>` with a base64 data URI. Missing width/height are derived from
    /// the intrinsic size (1 px = 1 pt) and the result never exceeds the
    /// available width. Unusable sources are skipped with a warning.
    fn build_image_node(
        &mut self,
        style: &ComputedStyle,
        attrs: &HashMap<String, String>,
        parent_width: f32,
    ) -> Result<Option<NodeId>, HtmlRenderError> {
        let src = attrs.get("src").map(String::as_str).unwrap_or("");
        let stored = parse_data_uri(src).and_then(|bytes| self.images.insert(bytes));
        let image_id = match stored {
            Ok(id) => id,
            Err(e) => {
                log::warn!("Skipping <img>: {e}");
                return Ok(None);
            }
        };
        let Some(img) = self.images.get(&image_id) else {
            return Ok(None);
        };
        let (px_w, px_h) = (img.px_width as f32, img.px_height as f32);
        let aspect = px_w / px_h;

        let attr_len = |name: &str| {
            attrs
                .get(name)
                .and_then(|v| v.trim().trim_end_matches("px").parse::<f32>().ok())
        };
        let known_w = match style.width {
            style::Dimension::Pt(v) => Some(v),
            style::Dimension::Percent(p) => Some(parent_width * p / 100.0),
            style::Dimension::Auto => attr_len("width"),
        };
        let known_h = match style.height {
            style::Dimension::Pt(v) => Some(v),
            _ => attr_len("height"),
        };
        let (mut w, mut h) = match (known_w, known_h) {
            (Some(w), Some(h)) => (w, h),
            (Some(w), None) => (w, w / aspect),
            (None, Some(h)) => (h * aspect, h),
            (None, None) => (px_w, px_h),
        };
        let max_w = match style.max_width {
            style::Dimension::Pt(v) => v.min(parent_width),
            style::Dimension::Percent(p) => parent_width * p / 100.0,
            style::Dimension::Auto => parent_width,
        };
        if w > max_w {
            h *= max_w / w;
            w = max_w;
        }

        let ts = Style {
            size: Size {
                width: taffy::Dimension::Length(w.max(1.0)),
                height: taffy::Dimension::Length(h.max(1.0)),
            },
            flex_shrink: 0.0,
            margin: Rect {
                top: LengthPercentageAuto::Length(style.margin_top),
                right: LengthPercentageAuto::Length(style.margin_right),
                bottom: LengthPercentageAuto::Length(style.margin_bottom),
                left: LengthPercentageAuto::Length(style.margin_left),
            },
            ..Default::default()
        };
        let node = self.taffy.new_leaf(ts).map_err(layout_err)?;
        self.node_styles.insert(node, style.clone());
        self.node_tags.insert(node, Tag::Img);
        self.node_content
            .insert(node, BoxContent::Image { image_id });
        Ok(Some(node))
    }

    fn computed_to_taffy(&self, s: &ComputedStyle, tag: &Tag) -> Style {
        let mut ts = Style::default();

        let margin = Rect {
            top: LengthPercentageAuto::Length(s.margin_top),
            right: LengthPercentageAuto::Length(s.margin_right),
            bottom: LengthPercentageAuto::Length(s.margin_bottom),
            left: LengthPercentageAuto::Length(s.margin_left),
        };
        let padding = Rect {
            top: LengthPercentage::Length(s.padding_top),
            right: LengthPercentage::Length(s.padding_right),
            bottom: LengthPercentage::Length(s.padding_bottom),
            left: LengthPercentage::Length(s.padding_left),
        };
        let border = Rect {
            top: LengthPercentage::Length(s.border_width),
            right: LengthPercentage::Length(s.border_width),
            bottom: LengthPercentage::Length(s.border_width),
            left: LengthPercentage::Length(s.border_width),
        };

        // -----------------------------------------------------------------
        // HTML table model: always use flex regardless of computed display.
        // -----------------------------------------------------------------
        match tag {
            Tag::Table => {
                ts.display = taffy::Display::Flex;
                ts.flex_direction = taffy::FlexDirection::Column;
                ts.size.width = Self::dim_to_taffy(s.width);
                ts.min_size.width = taffy::Dimension::Length(0.0);
                ts.padding = padding;
                ts.border = border;
                ts.margin = margin;
                return ts;
            }
            Tag::Tr => {
                ts.display = taffy::Display::Flex;
                ts.flex_direction = taffy::FlexDirection::Row;
                ts.align_items = Some(taffy::AlignItems::Stretch);
                ts.size.width = taffy::Dimension::Percent(1.0);
                ts.min_size.width = taffy::Dimension::Length(0.0);
                ts.margin = margin;
                return ts;
            }
            Tag::Td | Tag::Th => {
                ts.display = taffy::Display::Flex;
                ts.flex_direction = taffy::FlexDirection::Column;
                ts.flex_grow = 1.0;
                ts.flex_shrink = 1.0;
                ts.flex_basis = taffy::Dimension::Length(0.0); // equal columns
                ts.min_size.width = taffy::Dimension::Length(0.0);
                ts.padding = padding;
                ts.border = border;
                return ts;
            }
            _ => {}
        }

        // Display / layout mode
        ts.display = taffy::Display::Flex;
        match s.display {
            style::Display::Flex => {
                ts.flex_direction = match s.flex_direction {
                    style::FlexDirection::Row => taffy::FlexDirection::Row,
                    style::FlexDirection::Column => taffy::FlexDirection::Column,
                };
                ts.justify_content = Some(match s.justify_content {
                    style::JustifyContent::Start => taffy::JustifyContent::Start,
                    style::JustifyContent::End => taffy::JustifyContent::End,
                    style::JustifyContent::Center => taffy::JustifyContent::Center,
                    style::JustifyContent::SpaceBetween => taffy::JustifyContent::SpaceBetween,
                });
                ts.align_items = Some(match s.align_items {
                    style::AlignItems::Start => taffy::AlignItems::Start,
                    style::AlignItems::End => taffy::AlignItems::End,
                    style::AlignItems::Center => taffy::AlignItems::Center,
                    style::AlignItems::Stretch => taffy::AlignItems::Stretch,
                });
            }
            style::Display::Inline => {
                ts.flex_direction = taffy::FlexDirection::Row;
                ts.flex_wrap = taffy::FlexWrap::Wrap;
            }
            style::Display::None => {
                ts.display = taffy::Display::None;
            }
            // Block-level elements stack their children vertically.
            _ => {
                ts.flex_direction = taffy::FlexDirection::Column;
            }
        }

        // Sizing
        ts.size = Size {
            width: Self::dim_to_taffy(s.width),
            height: Self::dim_to_taffy(s.height),
        };
        ts.max_size = Size {
            width: Self::dim_to_taffy(s.max_width),
            height: taffy::Dimension::Auto,
        };
        ts.flex_grow = s.flex_grow;
        ts.flex_shrink = 1.0;
        ts.margin = margin;
        ts.padding = padding;
        ts.border = border;
        ts.gap = Size {
            width: LengthPercentage::Length(s.gap),
            height: LengthPercentage::Length(s.gap),
        };

        ts
    }

    fn dim_to_taffy(d: style::Dimension) -> taffy::Dimension {
        match d {
            style::Dimension::Auto => taffy::Dimension::Auto,
            style::Dimension::Pt(v) => taffy::Dimension::Length(v),
            style::Dimension::Percent(v) => taffy::Dimension::Percent(v / 100.0),
        }
    }

    /// Extract positioned boxes after layout computation.
    fn extract(
        &self,
        node: NodeId,
        offset_x: f32,
        offset_y: f32,
    ) -> Result<PositionedBox, HtmlRenderError> {
        let layout = self.taffy.layout(node).map_err(layout_err)?;
        let style = self.node_styles.get(&node).cloned().unwrap_or_default();
        let content = self
            .node_content
            .get(&node)
            .cloned()
            .unwrap_or(BoxContent::None);

        let x = offset_x + layout.location.x;
        let y = offset_y + layout.location.y;
        let (width, height) = (layout.size.width, layout.size.height);

        let children = self
            .taffy
            .children(node)
            .map_err(layout_err)?
            .into_iter()
            .map(|child| self.extract(child, x, y))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PositionedBox {
            x,
            y,
            width,
            height,
            page_break_before: style.page_break_before,
            page_break_after: style.page_break_after,
            marker: self.node_markers.get(&node).cloned(),
            tag: self.node_tags.get(&node).cloned(),
            style,
            content,
            children,
        })
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Compute layout for a styled tree within `content_width` points.
///
/// Images referenced by `<img>` data URIs are decoded into `images`.
pub fn compute_layout(
    styled_nodes: &[StyledNode],
    content_width: f32,
    metrics: &FontMetrics,
    images: &mut ImageStore,
) -> Result<FlowLayout, HtmlRenderError> {
    let mut builder = LayoutBuilder::new(metrics, images);

    // Wrap all nodes in a root flex-column container
    let root_style = ComputedStyle::default();
    let child_ids = builder.build_children(styled_nodes, &root_style, None, content_width)?;

    let root = builder
        .taffy
        .new_with_children(
            Style {
                display: taffy::Display::Flex,
                flex_direction: taffy::FlexDirection::Column,
                size: Size {
                    width: taffy::Dimension::Length(content_width),
                    height: taffy::Dimension::Auto,
                },
                ..Default::default()
            },
            &child_ids,
        )
        .map_err(layout_err)?;

    builder
        .taffy
        .compute_layout(
            root,
            Size {
                width: AvailableSpace::Definite(content_width),
                height: AvailableSpace::MaxContent,
            },
        )
        .map_err(layout_err)?;

    let root_box = builder.extract(root, 0.0, 0.0)?;
    Ok(FlowLayout {
        height: root_box.height,
        boxes: root_box.children,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_html;
    use crate::style::{build_styled_tree, Stylesheet};

    fn layout(html: &str, images: &mut ImageStore) -> FlowLayout {
        let doc = parse_html(html).unwrap();
        let sheet = Stylesheet::parse(&doc.stylesheet);
        let styled = build_styled_tree(&doc.body(), None, &sheet);
        compute_layout(&styled, 500.0, &FontMetrics::default(), images).unwrap()
    }

    fn text_of(b: &PositionedBox) -> Vec<String> {
        let mut out = Vec::new();
        if let BoxContent::Text { lines } = &b.content {
            out.extend(lines.iter().map(|l| l.text.clone()));
        }
        for c in &b.children {
            out.extend(text_of(c));
        }
        out
    }

    #[test]
    fn layout_simple_paragraph() {
        let flow = layout("<p>Hola mundo</p>", &mut ImageStore::default());
        assert_eq!(flow.boxes.len(), 1);
        let first = &flow.boxes[0];
        assert!(first.width > 0.0, "Box should have width");
        assert!(first.height > 0.0, "Box should have height");
        assert_eq!(text_of(first), vec!["Hola mundo"]);
        assert!(flow.height >= first.height);
    }

    #[test]
    fn spans_stay_on_the_paragraph_line() {
        let flow = layout(
            "<style>.resaltado { color: red; font-weight: bold; }</style>\
             <p>Este es un p&aacute;rrafo con <span class='resaltado'>estilo</span>.</p>",
            &mut ImageStore::default(),
        );
        let BoxContent::Text { lines } = &flow.boxes[0].content else {
            panic!("Expected a text leaf");
        };
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "Este es un párrafo con estilo.");
        let styled = lines[0].runs.iter().find(|r| r.text == "estilo").unwrap();
        assert!(styled.style.bold);
        assert_eq!(styled.style.color, [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn table_rows_have_equal_cells() {
        let flow = layout(
            "<table border='1' style='width:100%'><tr><th>Columna 1</th><th>Columna 2</th></tr>\
             <tr><td>Dato A</td><td>Dato B</td></tr></table>",
            &mut ImageStore::default(),
        );
        let table = &flow.boxes[0];
        assert_eq!(table.children.len(), 2);
        let row = &table.children[1];
        assert_eq!(row.children.len(), 2);
        assert!((row.children[0].width - row.children[1].width).abs() < 0.5);
        assert!(row.y > table.children[0].y);
    }

    #[test]
    fn list_items_get_markers() {
        let flow = layout("<ol><li>uno</li><li>dos</li></ol>", &mut ImageStore::default());
        let markers: Vec<_> = flow.boxes[0]
            .children
            .iter()
            .map(|c| c.marker.clone())
            .collect();
        assert_eq!(markers, vec![Some("1.".to_string()), Some("2.".to_string())]);
    }

    #[test]
    fn data_uri_images_are_registered() {
        let src = format!(
            "data:image/png;base64,{}",
            crate::resources::tests::PIXEL_PNG_B64
        );
        let mut images = ImageStore::default();
        let flow = layout(
            &format!("<div><img src='{src}' width='50' /></div><img src='logo.png'>"),
            &mut images,
        );
        assert_eq!(images.len(), 1);
        // The non-data-URI image is skipped.
        assert_eq!(flow.boxes.len(), 1);
        let img = &flow.boxes[0].children[0];
        assert!(matches!(img.content, BoxContent::Image { .. }));
        assert!((img.width - 50.0).abs() < 0.5);
        assert!((img.height - 50.0).abs() < 0.5);
    }

    #[test]
    fn hidden_head_content_is_not_laid_out() {
        let flow = layout(
            "<html><head><title>Titulo</title></head><body><p>cuerpo</p></body></html>",
            &mut ImageStore::default(),
        );
        let all: Vec<String> = flow.boxes.iter().flat_map(text_of).collect();
        assert_eq!(all, vec!["cuerpo"]);
    }
}
