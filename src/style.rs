//! Style resolver – maps `<style>` rules, presentational attributes and
//! inline styles to a flat [`ComputedStyle`] struct consumed by the layout
//! engine.
//!
//! Cascade order, lowest to highest: tag defaults, inherited text properties,
//! stylesheet rules (type selectors before class selectors, then source
//! order), the table `border` attribute, the `style` attribute.

use std::collections::HashMap;

use crate::dom::{DomNode, ElementNode, Tag};
use crate::layout_config::Alignment;

/// Fully resolved style for a single element.
#[derive(Debug, Clone)]
pub struct ComputedStyle {
    // Display / layout
    pub display: Display,
    pub flex_direction: FlexDirection,
    pub flex_grow: f32,
    pub justify_content: JustifyContent,
    pub align_items: AlignItems,
    pub gap: f32,

    // Sizing
    pub width: Dimension,
    pub height: Dimension,
    pub max_width: Dimension,

    // Spacing (pt)
    pub margin_top: f32,
    pub margin_right: f32,
    pub margin_bottom: f32,
    pub margin_left: f32,
    pub padding_top: f32,
    pub padding_right: f32,
    pub padding_bottom: f32,
    pub padding_left: f32,

    // Border
    pub border_width: f32,
    pub border_color: Color,
    /// Border drawn around table cells, set by the table's `border`
    /// attribute and inherited down to `td`/`th`.
    pub cell_border: f32,

    // Typography
    pub font_size: f32,
    pub font_weight: FontWeight,
    pub color: Color,
    pub text_align: Alignment,
    pub line_height: f32,
    pub text_decoration: TextDecoration,
    pub font_style: FontStyle,

    // Background
    pub background_color: Color,

    // Page break
    pub page_break_before: bool,
    pub page_break_after: bool,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: Display::Block,
            flex_direction: FlexDirection::Row,
            flex_grow: 0.0,
            justify_content: JustifyContent::Start,
            align_items: AlignItems::Stretch,
            gap: 0.0,
            width: Dimension::Auto,
            height: Dimension::Auto,
            max_width: Dimension::Auto,
            margin_top: 0.0,
            margin_right: 0.0,
            margin_bottom: 0.0,
            margin_left: 0.0,
            padding_top: 0.0,
            padding_right: 0.0,
            padding_bottom: 0.0,
            padding_left: 0.0,
            border_width: 0.0,
            border_color: Color::BLACK,
            cell_border: 0.0,
            font_size: 12.0,
            font_weight: FontWeight::Normal,
            color: Color::BLACK,
            text_align: Alignment::Left,
            line_height: 1.4,
            text_decoration: TextDecoration::None,
            font_style: FontStyle::Normal,
            background_color: Color::TRANSPARENT,
            page_break_before: false,
            page_break_after: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Supporting enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Display {
    Block,
    Flex,
    Inline,
    InlineBlock,
    ListItem,
    Table,
    TableRow,
    TableCell,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexDirection {
    Row,
    Column,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JustifyContent {
    Start,
    End,
    Center,
    SpaceBetween,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignItems {
    Start,
    End,
    Center,
    Stretch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    Normal,
    Bold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextDecoration {
    None,
    Underline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontStyle {
    Normal,
    Italic,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dimension {
    Auto,
    Pt(f32),
    Percent(f32),
}

/// RGBA colour (0.0 – 1.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Self = Self::rgb(0, 0, 0);
    pub const WHITE: Self = Self::rgb(255, 255, 255);
    pub const TRANSPARENT: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
            a: 1.0,
        }
    }

    pub fn is_transparent(&self) -> bool {
        self.a < 0.001
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.strip_prefix('#')?;
        if !hex.is_ascii() {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok();
        match hex.len() {
            6 => Some(Self::rgb(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            3 => Some(Self::rgb(
                channel(&hex[0..1].repeat(2))?,
                channel(&hex[1..2].repeat(2))?,
                channel(&hex[2..3].repeat(2))?,
            )),
            _ => None,
        }
    }

    /// Parse `#hex`, `rgb(r, g, b)` or a CSS colour keyword.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.starts_with('#') {
            return Self::from_hex(value);
        }
        if let Some(args) = value
            .strip_prefix("rgb(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let parts: Vec<u8> = args
                .split(',')
                .filter_map(|p| p.trim().parse::<u8>().ok())
                .collect();
            return match parts.as_slice() {
                [r, g, b] => Some(Self::rgb(*r, *g, *b)),
                _ => None,
            };
        }
        Self::named(&value.to_ascii_lowercase())
    }

    fn named(name: &str) -> Option<Self> {
        Some(match name {
            "black" => Self::BLACK,
            "white" => Self::WHITE,
            "transparent" => Self::TRANSPARENT,
            "red" => Self::rgb(255, 0, 0),
            "darkred" => Self::rgb(139, 0, 0),
            "maroon" => Self::rgb(128, 0, 0),
            "green" => Self::rgb(0, 128, 0),
            "darkgreen" => Self::rgb(0, 100, 0),
            "lime" => Self::rgb(0, 255, 0),
            "blue" => Self::rgb(0, 0, 255),
            "darkblue" => Self::rgb(0, 0, 139),
            "navy" => Self::rgb(0, 0, 128),
            "steelblue" => Self::rgb(70, 130, 180),
            "teal" => Self::rgb(0, 128, 128),
            "purple" => Self::rgb(128, 0, 128),
            "orange" => Self::rgb(255, 165, 0),
            "yellow" => Self::rgb(255, 255, 0),
            "gray" | "grey" => Self::rgb(128, 128, 128),
            "darkgray" | "darkgrey" => Self::rgb(169, 169, 169),
            "lightgray" | "lightgrey" => Self::rgb(211, 211, 211),
            "silver" => Self::rgb(192, 192, 192),
            _ => return None,
        })
    }
}

// ---------------------------------------------------------------------------
// Stylesheet
// ---------------------------------------------------------------------------

/// A simple selector: `tag`, `.class` or `tag.class`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Selector {
    tag: Option<String>,
    class: Option<String>,
}

impl Selector {
    fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() || s.contains(|c: char| c.is_whitespace() || "#>+~:[*".contains(c)) {
            // Combinators, ids, pseudo-classes and attribute selectors are
            // outside the supported subset.
            return None;
        }
        let (tag, class) = match s.split_once('.') {
            Some((tag, class)) => (tag, Some(class)),
            None => (s, None),
        };
        Some(Self {
            tag: (!tag.is_empty()).then(|| tag.to_ascii_lowercase()),
            class: class.map(str::to_string),
        })
    }

    fn specificity(&self) -> u8 {
        u8::from(self.tag.is_some()) + 10 * u8::from(self.class.is_some())
    }

    fn matches(&self, element: &ElementNode) -> bool {
        let tag_ok = self.tag.as_deref().map_or(true, |t| match t {
            "b" => element.tag == Tag::Strong,
            "i" => element.tag == Tag::Em,
            _ => t == element.tag.name(),
        });
        let class_ok = self
            .class
            .as_deref()
            .map_or(true, |c| element.classes().contains(&c));
        tag_ok && class_ok
    }
}

#[derive(Debug, Clone)]
struct Rule {
    selector: Selector,
    order: usize,
    declarations: Vec<(String, String)>,
}

/// Rules parsed from every `<style>` block of a document.
#[derive(Debug, Clone, Default)]
pub struct Stylesheet {
    rules: Vec<Rule>,
}

impl Stylesheet {
    /// Parse CSS text. Unsupported selectors and at-rules are skipped.
    pub fn parse(css: &str) -> Self {
        let css = strip_css_comments(css);
        let mut rules = Vec::new();
        let mut rest = css.as_str();
        while let Some(open) = rest.find('{') {
            let selectors = rest[..open].trim();
            let Some(close) = rest[open..].find('}') else {
                break;
            };
            let body = &rest[open + 1..open + close];
            rest = &rest[open + close + 1..];
            if selectors.starts_with('@') {
                continue;
            }
            let declarations = parse_declarations(body);
            for sel in selectors.split(',') {
                if let Some(selector) = Selector::parse(sel) {
                    rules.push(Rule {
                        selector,
                        order: rules.len(),
                        declarations: declarations.clone(),
                    });
                } else {
                    log::debug!("Skipping unsupported selector {:?}", sel.trim());
                }
            }
        }
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn apply(&self, style: &mut ComputedStyle, element: &ElementNode) {
        let mut matching: Vec<&Rule> = self
            .rules
            .iter()
            .filter(|r| r.selector.matches(element))
            .collect();
        matching.sort_by_key(|r| (r.selector.specificity(), r.order));
        for rule in matching {
            for (prop, val) in &rule.declarations {
                apply_css_property(style, prop, val);
            }
        }
    }
}

fn strip_css_comments(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => {
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn parse_declarations(body: &str) -> Vec<(String, String)> {
    body.split(';')
        .filter_map(|decl| {
            let (prop, val) = decl.split_once(':')?;
            let prop = prop.trim().to_ascii_lowercase();
            let val = val.trim().trim_end_matches("!important").trim();
            (!prop.is_empty() && !val.is_empty()).then(|| (prop, val.to_string()))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Style resolution
// ---------------------------------------------------------------------------

/// Resolve the style for an element, inheriting text properties from its parent.
pub fn resolve_style(
    element: &ElementNode,
    parent: Option<&ComputedStyle>,
    sheet: &Stylesheet,
) -> ComputedStyle {
    let mut style = ComputedStyle::default();

    // Inherit text properties from parent
    if let Some(p) = parent {
        style.font_size = p.font_size;
        style.font_weight = p.font_weight;
        style.color = p.color;
        style.text_align = p.text_align;
        style.line_height = p.line_height;
        style.font_style = p.font_style;
        style.text_decoration = p.text_decoration;
        style.cell_border = p.cell_border;
    }

    apply_tag_defaults(&mut style, &element.tag);
    sheet.apply(&mut style, element);

    if element.tag == Tag::Table {
        if let Some(border) = element.attributes.get("border").and_then(|b| parse_length(b, 0.0)) {
            style.border_width = border;
            style.cell_border = border;
        }
    }

    // Apply inline style attribute
    if let Some(inline) = element.inline_style() {
        for (prop, val) in parse_declarations(inline) {
            apply_css_property(&mut style, &prop, &val);
        }
    }

    style
}

/// Default styles based on tag semantics.
fn apply_tag_defaults(s: &mut ComputedStyle, tag: &Tag) {
    let heading = |s: &mut ComputedStyle, scale: f32, space: f32| {
        s.font_size = 12.0 * scale;
        s.font_weight = FontWeight::Bold;
        s.margin_top = space;
        s.margin_bottom = space;
    };
    match tag {
        Tag::H1 => heading(s, 2.0, 12.0),
        Tag::H2 => heading(s, 1.5, 10.0),
        Tag::H3 => heading(s, 1.17, 9.0),
        Tag::H4 => heading(s, 1.0, 8.0),
        Tag::P => {
            s.margin_bottom = 10.0;
        }
        Tag::Ul | Tag::Ol => {
            s.margin_bottom = 10.0;
            s.padding_left = 24.0;
        }
        Tag::Li => {
            s.display = Display::ListItem;
            s.margin_bottom = 4.0;
        }
        Tag::Table => {
            s.display = Display::Table;
            s.margin_bottom = 10.0;
            s.cell_border = 0.0;
        }
        Tag::Tr => {
            s.display = Display::TableRow;
        }
        Tag::Td | Tag::Th => {
            s.display = Display::TableCell;
            s.padding_top = 4.0;
            s.padding_right = 6.0;
            s.padding_bottom = 4.0;
            s.padding_left = 6.0;
            s.border_width = s.cell_border;
            if *tag == Tag::Th {
                s.font_weight = FontWeight::Bold;
                s.text_align = Alignment::Center;
            }
        }
        Tag::Span | Tag::Br => {
            s.display = Display::Inline;
        }
        Tag::Strong => {
            s.display = Display::Inline;
            s.font_weight = FontWeight::Bold;
        }
        Tag::Em => {
            s.display = Display::Inline;
            s.font_style = FontStyle::Italic;
        }
        Tag::U => {
            s.display = Display::Inline;
            s.text_decoration = TextDecoration::Underline;
        }
        Tag::Img => {
            s.display = Display::InlineBlock;
        }
        Tag::Div | Tag::Body | Tag::Html => {}
        Tag::Head | Tag::Title => {
            s.display = Display::None;
        }
        Tag::Unknown(name) => {
            if matches!(name.as_str(), "script" | "style" | "meta" | "link" | "noscript") {
                s.display = Display::None;
            }
        }
    }
}

fn apply_css_property(s: &mut ComputedStyle, prop: &str, val: &str) {
    let page_break = |v: &str| v == "always" || v == "page";
    match prop {
        "display" => {
            s.display = match val {
                "flex" => Display::Flex,
                "block" => Display::Block,
                "inline" => Display::Inline,
                "inline-block" => Display::InlineBlock,
                "none" => Display::None,
                _ => s.display,
            }
        }
        "flex-direction" => {
            s.flex_direction = match val {
                "row" => FlexDirection::Row,
                "column" => FlexDirection::Column,
                _ => s.flex_direction,
            }
        }
        "flex-grow" | "flex" => {
            if let Ok(v) = val.split_whitespace().next().unwrap_or("").parse::<f32>() {
                s.flex_grow = v;
            }
        }
        "justify-content" => {
            s.justify_content = match val {
                "center" => JustifyContent::Center,
                "flex-end" | "end" => JustifyContent::End,
                "space-between" => JustifyContent::SpaceBetween,
                _ => JustifyContent::Start,
            }
        }
        "align-items" => {
            s.align_items = match val {
                "center" => AlignItems::Center,
                "flex-start" | "start" => AlignItems::Start,
                "flex-end" | "end" => AlignItems::End,
                _ => AlignItems::Stretch,
            }
        }
        "font-size" => {
            if let Some(pt) = parse_length(val, s.font_size) {
                s.font_size = pt;
            }
        }
        "font-weight" => {
            s.font_weight = match val {
                "bold" | "bolder" | "600" | "700" | "800" | "900" => FontWeight::Bold,
                _ => FontWeight::Normal,
            }
        }
        "font-style" => {
            s.font_style = match val {
                "italic" | "oblique" => FontStyle::Italic,
                _ => FontStyle::Normal,
            }
        }
        // Every family maps onto builtin Helvetica.
        "font-family" => {}
        "color" => {
            if let Some(c) = Color::parse(val) {
                s.color = c;
            }
        }
        "background-color" | "background" => {
            if let Some(c) = Color::parse(val) {
                s.background_color = c;
            }
        }
        "text-align" => {
            s.text_align = match val {
                "center" => Alignment::Center,
                "right" | "end" => Alignment::Right,
                "justify" => Alignment::Justify,
                _ => Alignment::Left,
            }
        }
        "text-decoration" => {
            s.text_decoration = if val.contains("underline") {
                TextDecoration::Underline
            } else {
                TextDecoration::None
            }
        }
        "width" => s.width = parse_dimension(val, s.font_size),
        "height" => s.height = parse_dimension(val, s.font_size),
        "max-width" => s.max_width = parse_dimension(val, s.font_size),
        "margin" => {
            let [t, r, b, l] = parse_box_shorthand(val, s.font_size, [
                s.margin_top,
                s.margin_right,
                s.margin_bottom,
                s.margin_left,
            ]);
            (s.margin_top, s.margin_right, s.margin_bottom, s.margin_left) = (t, r, b, l);
        }
        "margin-top" => set_length(&mut s.margin_top, val, s.font_size),
        "margin-right" => set_length(&mut s.margin_right, val, s.font_size),
        "margin-bottom" => set_length(&mut s.margin_bottom, val, s.font_size),
        "margin-left" => set_length(&mut s.margin_left, val, s.font_size),
        "padding" => {
            let [t, r, b, l] = parse_box_shorthand(val, s.font_size, [
                s.padding_top,
                s.padding_right,
                s.padding_bottom,
                s.padding_left,
            ]);
            (s.padding_top, s.padding_right, s.padding_bottom, s.padding_left) = (t, r, b, l);
        }
        "padding-top" => set_length(&mut s.padding_top, val, s.font_size),
        "padding-right" => set_length(&mut s.padding_right, val, s.font_size),
        "padding-bottom" => set_length(&mut s.padding_bottom, val, s.font_size),
        "padding-left" => set_length(&mut s.padding_left, val, s.font_size),
        // `border: 1px solid black` – width and colour in any order.
        "border" => {
            if val == "none" || val == "0" {
                s.border_width = 0.0;
                return;
            }
            for part in val.split_whitespace() {
                if let Some(w) = parse_length(part, s.font_size) {
                    s.border_width = w;
                } else if let Some(c) = Color::parse(part) {
                    s.border_color = c;
                } else if part == "solid" && s.border_width == 0.0 {
                    s.border_width = 1.0;
                }
            }
        }
        "border-width" => set_length(&mut s.border_width, val, s.font_size),
        "border-color" => {
            if let Some(c) = Color::parse(val) {
                s.border_color = c;
            }
        }
        "line-height" => {
            if let Ok(v) = val.parse::<f32>() {
                s.line_height = v;
            } else if let Some(pt) = parse_length(val, s.font_size) {
                s.line_height = pt / s.font_size;
            }
        }
        "gap" => set_length(&mut s.gap, val, s.font_size),
        "break-before" | "page-break-before" => s.page_break_before = page_break(val),
        "break-after" | "page-break-after" => s.page_break_after = page_break(val),
        _ => {}
    }
}

fn set_length(target: &mut f32, val: &str, font_size: f32) {
    if let Some(v) = parse_length(val, font_size) {
        *target = v;
    }
}

/// Parse a length into points. CSS px are treated as points (1 px = 1 pt),
/// `em` is relative to `font_size`; unitless values are accepted.
fn parse_length(s: &str, font_size: f32) -> Option<f32> {
    let s = s.trim();
    if let Some(v) = s.strip_suffix("em") {
        return v.trim().parse::<f32>().ok().map(|v| v * font_size);
    }
    s.trim_end_matches("px")
        .trim_end_matches("pt")
        .trim()
        .parse()
        .ok()
}

fn parse_dimension(s: &str, font_size: f32) -> Dimension {
    let s = s.trim();
    if s == "auto" {
        Dimension::Auto
    } else if let Some(p) = s.strip_suffix('%') {
        p.parse::<f32>()
            .map(Dimension::Percent)
            .unwrap_or(Dimension::Auto)
    } else {
        parse_length(s, font_size)
            .map(Dimension::Pt)
            .unwrap_or(Dimension::Auto)
    }
}

fn parse_box_shorthand(val: &str, font_size: f32, current: [f32; 4]) -> [f32; 4] {
    let parts: Vec<f32> = val
        .split_whitespace()
        .filter_map(|p| parse_length(p, font_size))
        .collect();
    match parts.as_slice() {
        [a] => [*a; 4],
        [v, h] => [*v, *h, *v, *h],
        [t, h, b] => [*t, *h, *b, *h],
        [t, r, b, l] => [*t, *r, *b, *l],
        _ => current,
    }
}

// ---------------------------------------------------------------------------
// Styled DOM tree
// ---------------------------------------------------------------------------

/// A DOM node annotated with its computed style.
#[derive(Debug, Clone)]
pub enum StyledNode {
    Element {
        tag: Tag,
        style: ComputedStyle,
        children: Vec<StyledNode>,
        /// Source attributes (image `src`, table `border`)
        attrs: HashMap<String, String>,
    },
    Text {
        text: String,
        style: ComputedStyle,
    },
}

/// Build a styled tree from a DOM tree, resolving styles top-down.
pub fn build_styled_tree(
    nodes: &[DomNode],
    parent_style: Option<&ComputedStyle>,
    sheet: &Stylesheet,
) -> Vec<StyledNode> {
    let mut result = Vec::new();
    for node in nodes {
        match node {
            DomNode::Element(e) => {
                let style = resolve_style(e, parent_style, sheet);
                let children = build_styled_tree(&e.children, Some(&style), sheet);
                result.push(StyledNode::Element {
                    tag: e.tag.clone(),
                    style,
                    children,
                    attrs: e.attributes.clone(),
                });
            }
            DomNode::Text(text) => {
                if !text.trim().is_empty() {
                    let mut style = parent_style.cloned().unwrap_or_default();
                    // Text nodes render inline, so clear all box-model properties
                    // that must not be inherited (border, background, spacing).
                    style.display = Display::Inline;
                    style.border_width = 0.0;
                    style.background_color = Color::TRANSPARENT;
                    style.margin_top = 0.0;
                    style.margin_right = 0.0;
                    style.margin_bottom = 0.0;
                    style.margin_left = 0.0;
                    style.padding_top = 0.0;
                    style.padding_right = 0.0;
                    style.padding_bottom = 0.0;
                    style.padding_left = 0.0;
                    style.width = Dimension::Auto;
                    style.height = Dimension::Auto;
                    result.push(StyledNode::Text {
                        text: text.clone(),
                        style,
                    });
                }
            }
        }
    }
    result
}
