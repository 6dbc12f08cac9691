//! HTML parser – converts an HTML string into a simple DOM tree.
//!
//! We support a controlled subset of elements:
//! - Structural: div, p, h1-h4, ul, ol, li, table, tr, td, th, img, br
//! - Inline: span, strong/b, em/i, u
//! - Document: html, head, title, body, and `<style>` blocks whose text is
//!   collected into [`HtmlDocument::stylesheet`]
//! - Styling via `class` and `style` attributes
//!
//! The parser recovers from stray or missing closing tags the way browsers
//! do. It gives up on constructs that have no sensible recovery: a tag,
//! attribute value, comment or `<style>` block still open at end of input.

use std::collections::HashMap;

use crate::error::HtmlRenderError;

// ---------------------------------------------------------------------------
// DOM types
// ---------------------------------------------------------------------------

/// The tag name of a supported element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    Div,
    P,
    H1,
    H2,
    H3,
    H4,
    Ul,
    Ol,
    Li,
    Table,
    Tr,
    Td,
    Th,
    Span,
    Strong,
    Em,
    U,
    Br,
    Img,
    Body,
    Html,
    Head,
    Title,
    /// Catch-all for unknown tags – they are kept but never rendered.
    Unknown(String),
}

impl Tag {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "div" => Tag::Div,
            "p" => Tag::P,
            "h1" => Tag::H1,
            "h2" => Tag::H2,
            "h3" => Tag::H3,
            "h4" => Tag::H4,
            "ul" => Tag::Ul,
            "ol" => Tag::Ol,
            "li" => Tag::Li,
            "table" => Tag::Table,
            "tr" => Tag::Tr,
            "td" => Tag::Td,
            "th" => Tag::Th,
            "span" => Tag::Span,
            "strong" | "b" => Tag::Strong,
            "em" | "i" => Tag::Em,
            "u" => Tag::U,
            "br" => Tag::Br,
            "img" => Tag::Img,
            "body" => Tag::Body,
            "html" => Tag::Html,
            "head" => Tag::Head,
            "title" => Tag::Title,
            other => Tag::Unknown(other.to_string()),
        }
    }

    /// Lower-case name used for selector matching.
    pub fn name(&self) -> &str {
        match self {
            Tag::Div => "div",
            Tag::P => "p",
            Tag::H1 => "h1",
            Tag::H2 => "h2",
            Tag::H3 => "h3",
            Tag::H4 => "h4",
            Tag::Ul => "ul",
            Tag::Ol => "ol",
            Tag::Li => "li",
            Tag::Table => "table",
            Tag::Tr => "tr",
            Tag::Td => "td",
            Tag::Th => "th",
            Tag::Span => "span",
            Tag::Strong => "strong",
            Tag::Em => "em",
            Tag::U => "u",
            Tag::Br => "br",
            Tag::Img => "img",
            Tag::Body => "body",
            Tag::Html => "html",
            Tag::Head => "head",
            Tag::Title => "title",
            Tag::Unknown(name) => name,
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, Tag::Span | Tag::Strong | Tag::Em | Tag::U | Tag::Br)
    }

    pub fn is_heading(&self) -> bool {
        matches!(self, Tag::H1 | Tag::H2 | Tag::H3 | Tag::H4)
    }
}

/// Elements that never have children or a closing tag.
fn is_void(name: &str) -> bool {
    matches!(
        name,
        "img" | "br" | "hr" | "meta" | "link" | "input" | "col" | "wbr"
    )
}

/// Elements whose content is raw text up to the matching closing tag.
fn is_raw_text(name: &str) -> bool {
    matches!(name, "style" | "script" | "title")
}

/// A node in our DOM tree.
#[derive(Debug, Clone)]
pub enum DomNode {
    Element(ElementNode),
    Text(String),
}

/// An element node carrying tag, attributes, and children.
#[derive(Debug, Clone)]
pub struct ElementNode {
    pub tag: Tag,
    pub attributes: HashMap<String, String>,
    pub children: Vec<DomNode>,
}

impl ElementNode {
    pub fn new(tag: Tag) -> Self {
        Self {
            tag,
            attributes: HashMap::new(),
            children: Vec::new(),
        }
    }

    pub fn classes(&self) -> Vec<&str> {
        self.attributes
            .get("class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn inline_style(&self) -> Option<&str> {
        self.attributes.get("style").map(|s| s.as_str())
    }

    pub fn src(&self) -> Option<&str> {
        self.attributes.get("src").map(|s| s.as_str())
    }
}

/// Parsed markup: the node tree plus every `<style>` block's text.
#[derive(Debug, Clone, Default)]
pub struct HtmlDocument {
    pub nodes: Vec<DomNode>,
    pub stylesheet: String,
}

impl HtmlDocument {
    /// The `<body>` children, or every top-level node when there is no body.
    pub fn body(&self) -> Vec<DomNode> {
        body_children(&self.nodes)
    }
}

// ---------------------------------------------------------------------------
// Parser – simple recursive descent over HTML
// ---------------------------------------------------------------------------

/// Parse an HTML string into a document.
pub fn parse_html(html: &str) -> Result<HtmlDocument, HtmlRenderError> {
    let mut parser = Parser::new(html);
    let nodes = parser.parse_nodes(&mut Vec::new())?;
    Ok(HtmlDocument {
        nodes,
        stylesheet: parser.stylesheet,
    })
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    stylesheet: String,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            stylesheet: String::new(),
        }
    }

    fn malformed(&self, offset: usize, reason: &str) -> HtmlRenderError {
        HtmlRenderError::Malformed {
            offset,
            reason: reason.to_string(),
        }
    }

    /// Parse siblings until end of input or a closing tag for one of the
    /// elements on `open`. Closing tags that match nothing open are dropped.
    fn parse_nodes(&mut self, open: &mut Vec<String>) -> Result<Vec<DomNode>, HtmlRenderError> {
        let mut nodes = Vec::new();
        loop {
            self.skip_whitespace_preserve();
            if self.eof() {
                break;
            }
            if self.starts_with("</") {
                let name = self.peek_closing_name();
                if open.iter().any(|o| *o == name) {
                    break;
                }
                log::debug!("Ignoring stray closing tag </{name}>");
                self.consume_closing_tag()?;
                continue;
            }
            if let Some(node) = self.parse_node(open)? {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    fn parse_node(&mut self, open: &mut Vec<String>) -> Result<Option<DomNode>, HtmlRenderError> {
        if self.starts_with("<!--") {
            self.skip_comment()?;
            return Ok(None);
        }
        if self.starts_with("<!") || self.starts_with("<?") {
            // Skip doctype / processing instructions
            let start = self.pos;
            while !self.eof() && !self.starts_with(">") {
                self.advance(1);
            }
            if self.eof() {
                return Err(self.malformed(start, "unterminated declaration"));
            }
            self.advance(1);
            return Ok(None);
        }
        let opens_tag = self.starts_with("<")
            && self.input[self.pos..]
                .chars()
                .nth(1)
                .is_some_and(|c| c.is_ascii_alphabetic());
        if opens_tag {
            self.parse_element(open).map(Some)
        } else {
            Ok(Some(self.parse_text()))
        }
    }

    fn parse_text(&mut self) -> DomNode {
        let start = self.pos;
        // A lone '<' that doesn't open a tag is literal text.
        if self.starts_with("<") {
            self.advance(1);
        }
        while !self.eof() && !self.starts_with("<") {
            self.advance(1);
        }
        let text = &self.input[start..self.pos];
        DomNode::Text(decode_entities(text))
    }

    fn parse_element(&mut self, open: &mut Vec<String>) -> Result<DomNode, HtmlRenderError> {
        let start = self.pos;
        // Consume '<'
        self.advance(1);
        let tag_name = self.parse_tag_name().to_ascii_lowercase();
        let mut elem = ElementNode::new(Tag::parse(&tag_name));

        // Parse attributes
        loop {
            self.skip_whitespace();
            if self.eof() {
                return Err(self.malformed(start, &format!("unterminated <{tag_name}> tag")));
            }
            if self.starts_with(">") || self.starts_with("/>") {
                break;
            }
            let before = self.pos;
            let (key, value) = self.parse_attribute()?;
            if self.pos == before {
                // Junk character inside the tag; skip it.
                self.advance(1);
                continue;
            }
            elem.attributes.insert(key.to_ascii_lowercase(), value);
        }

        if self.starts_with("/>") {
            self.advance(2);
            return Ok(DomNode::Element(elem));
        }
        self.advance(1); // '>'
        if is_void(&tag_name) {
            return Ok(DomNode::Element(elem));
        }

        if is_raw_text(&tag_name) {
            let text = self.parse_raw_text(&tag_name, start)?;
            if tag_name == "style" {
                self.stylesheet.push_str(&text);
                self.stylesheet.push('\n');
            } else {
                elem.children.push(DomNode::Text(decode_entities(&text)));
            }
            return Ok(DomNode::Element(elem));
        }

        // Parse children
        open.push(tag_name.clone());
        elem.children = self.parse_nodes(open)?;
        open.pop();

        // Consume our closing tag; a closing tag for an ancestor is left for
        // the ancestor (this element is implicitly closed).
        if self.starts_with("</") && self.peek_closing_name() == tag_name {
            self.consume_closing_tag()?;
        }

        Ok(DomNode::Element(elem))
    }

    /// Read everything up to `</name>` and consume the closing tag.
    fn parse_raw_text(&mut self, name: &str, start: usize) -> Result<String, HtmlRenderError> {
        let closing = format!("</{name}");
        let rest = &self.input[self.pos..];
        let lower = rest.to_ascii_lowercase();
        match lower.find(&closing) {
            Some(idx) => {
                let text = rest[..idx].to_string();
                self.pos += idx;
                self.consume_closing_tag()?;
                Ok(text)
            }
            None => Err(self.malformed(start, &format!("unterminated <{name}> block"))),
        }
    }

    fn peek_closing_name(&self) -> String {
        self.input[self.pos + 2..]
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
            .collect::<String>()
            .to_ascii_lowercase()
    }

    fn consume_closing_tag(&mut self) -> Result<(), HtmlRenderError> {
        let start = self.pos;
        while !self.eof() && !self.starts_with(">") {
            self.advance(1);
        }
        if self.eof() {
            return Err(self.malformed(start, "unterminated closing tag"));
        }
        self.advance(1);
        Ok(())
    }

    fn parse_tag_name(&mut self) -> String {
        let start = self.pos;
        while !self.eof() {
            let c = self.current_char();
            if c.is_alphanumeric() || c == '-' || c == '_' || c == ':' {
                self.advance(1);
            } else {
                break;
            }
        }
        self.input[start..self.pos].to_string()
    }

    fn parse_attribute(&mut self) -> Result<(String, String), HtmlRenderError> {
        let key = self.parse_tag_name();
        self.skip_whitespace();
        if !self.starts_with("=") {
            return Ok((key, String::new()));
        }
        self.advance(1); // skip '='
        self.skip_whitespace();
        let value = self.parse_attr_value()?;
        Ok((key, value))
    }

    fn parse_attr_value(&mut self) -> Result<String, HtmlRenderError> {
        for quote in ["\"", "'"] {
            if self.starts_with(quote) {
                let open_at = self.pos;
                self.advance(1);
                let start = self.pos;
                while !self.eof() && !self.starts_with(quote) {
                    self.advance(1);
                }
                if self.eof() {
                    return Err(self.malformed(open_at, "unterminated attribute value"));
                }
                let val = self.input[start..self.pos].to_string();
                self.advance(1);
                return Ok(decode_entities(&val));
            }
        }
        let start = self.pos;
        while !self.eof() {
            let c = self.current_char();
            if c.is_whitespace() || c == '>' {
                break;
            }
            if c == '/' && self.input[self.pos + 1..].starts_with('>') {
                break;
            }
            self.advance(1);
        }
        Ok(decode_entities(&self.input[start..self.pos]))
    }

    fn skip_whitespace(&mut self) {
        while !self.eof() && self.current_char().is_whitespace() {
            self.advance(1);
        }
    }

    fn skip_whitespace_preserve(&mut self) {
        // Skip runs of pure whitespace between elements.
        let saved = self.pos;
        while !self.eof() && self.current_char().is_whitespace() {
            self.advance(1);
        }
        // If we reached a tag or EOF, keep the skip. Otherwise revert.
        if !self.eof() && !self.starts_with("<") {
            self.pos = saved;
        }
    }

    fn skip_comment(&mut self) -> Result<(), HtmlRenderError> {
        let start = self.pos;
        self.advance(4); // skip <!--
        match self.input[self.pos..].find("-->") {
            Some(idx) => {
                self.pos += idx + 3;
                Ok(())
            }
            None => Err(self.malformed(start, "unterminated comment")),
        }
    }

    fn starts_with(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }

    fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn current_char(&self) -> char {
        self.input[self.pos..].chars().next().unwrap_or('\0')
    }

    fn advance(&mut self, n: usize) {
        // Advance by `n` characters (not bytes).
        for _ in 0..n {
            if let Some(c) = self.input[self.pos..].chars().next() {
                self.pos += c.len_utf8();
            }
        }
    }
}

fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_entity(&tail[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code);
    }
    Some(match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{00A0}',
        "aacute" => 'á',
        "eacute" => 'é',
        "iacute" => 'í',
        "oacute" => 'ó',
        "uacute" => 'ú',
        "ntilde" => 'ñ',
        "Aacute" => 'Á',
        "Eacute" => 'É',
        "Iacute" => 'Í',
        "Oacute" => 'Ó',
        "Uacute" => 'Ú',
        "Ntilde" => 'Ñ',
        "uuml" => 'ü',
        "iexcl" => '¡',
        "iquest" => '¿',
        "copy" => '©',
        "euro" => '€',
        _ => return None,
    })
}

// ---------------------------------------------------------------------------
// Convenience helpers
// ---------------------------------------------------------------------------

/// Find the `<body>` element and return its children, or return all nodes if
/// no `<body>` is present.
pub fn body_children(nodes: &[DomNode]) -> Vec<DomNode> {
    for node in nodes {
        if let DomNode::Element(e) = node {
            if e.tag == Tag::Body {
                return e.children.clone();
            }
            // Recurse into <html>
            if e.tag == Tag::Html {
                let inner = body_children(&e.children);
                if !inner.is_empty() {
                    return inner;
                }
            }
        }
    }
    nodes.to_vec()
}
