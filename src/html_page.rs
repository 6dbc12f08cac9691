//! HTML page composer – parse, style, lay out and flow markup into a session.
//!
//! Markup is inserted inline into the session's single document: the page
//! sequence, fonts and image resources are shared with the rest of the
//! report. Every stage runs before the session is touched, so a failing
//! fragment leaves earlier content intact.

use serde::{Deserialize, Serialize};

use crate::dom::parse_html;
use crate::error::{HtmlRenderError, ReportError};
use crate::flow::place_flow;
use crate::layout::{compute_layout, FlowLayout};
use crate::session::DocumentSession;
use crate::style::{build_styled_tree, Stylesheet};

/// Default upper bound on an HTML payload.
pub const DEFAULT_MAX_HTML_BYTES: usize = 256 * 1024;

/// Guards applied to markup before parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HtmlLimits {
    pub max_html_bytes: usize,
}

impl Default for HtmlLimits {
    fn default() -> Self {
        Self {
            max_html_bytes: DEFAULT_MAX_HTML_BYTES,
        }
    }
}

/// Start a new page and flow `html` into it.
pub fn append_html_page(
    session: &mut DocumentSession,
    html: &str,
    limits: &HtmlLimits,
) -> Result<(), ReportError> {
    let flow = prepare(session, html, limits)?;
    session.new_page()?;
    place_flow(session, &flow);
    log::debug!(
        "Appended HTML page ({} top-level boxes), document now has {} page(s)",
        flow.boxes.len(),
        session.page_count()
    );
    Ok(())
}

/// Flow `markup` into the current page, below existing content.
pub fn append_html(
    session: &mut DocumentSession,
    markup: &str,
    limits: &HtmlLimits,
) -> Result<(), ReportError> {
    let flow = prepare(session, markup, limits)?;
    place_flow(session, &flow);
    Ok(())
}

/// Validate, parse, style and lay out markup against the session's content
/// width. Images found in the markup are registered with the session; they
/// are removed again if layout fails.
fn prepare(
    session: &mut DocumentSession,
    markup: &str,
    limits: &HtmlLimits,
) -> Result<FlowLayout, ReportError> {
    session.ensure_open()?;
    if markup.trim().is_empty() {
        return Err(HtmlRenderError::Empty.into());
    }
    if markup.len() > limits.max_html_bytes {
        return Err(HtmlRenderError::TooLarge {
            len: markup.len(),
            limit: limits.max_html_bytes,
        }
        .into());
    }

    let doc = parse_html(markup)?;
    let sheet = Stylesheet::parse(&doc.stylesheet);
    let styled = build_styled_tree(&doc.body(), None, &sheet);

    let width = session.content_width();
    let metrics = session.metrics().clone();
    let mark = session.images().len();
    compute_layout(&styled, width, &metrics, session.images_mut()).map_err(|e| {
        session.images_mut().truncate(mark);
        ReportError::from(e)
    })
}
