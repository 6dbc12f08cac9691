//! # report-forge – PDF report assembly
//!
//! Builds a PDF report from typed content items and serves it over HTTP.
//!
//! 1. **Session** – an open document with its page flow ([`session`])
//! 2. **Append** – paragraphs, images, separators ([`appender`])
//! 3. **HTML** – parse ([`dom`]), style ([`style`]), lay out with Taffy
//!    ([`layout`]) and flow into pages ([`flow`], [`html_page`])
//! 4. **Render** – emit PDF bytes via printpdf ([`render`])
//! 5. **Deliver** – the fixed report ([`report`]) behind axum ([`server`])

pub mod appender;
pub mod config;
pub mod dom;
pub mod error;
mod flow;
pub mod fonts;
pub mod html_page;
pub mod layout;
pub mod layout_config;
pub mod render;
pub mod report;
pub mod resources;
pub mod server;
pub mod session;
pub mod style;

// Re-exports for convenience
pub use appender::{
    append_image, append_item, append_paragraph, append_separator, ContentItem, ImageItem,
    ImageSource, LogSink, SeparatorItem, StdLog,
};
pub use error::{HtmlRenderError, ReportError, SessionError};
pub use html_page::{append_html, append_html_page, HtmlLimits};
pub use layout_config::Alignment;
pub use report::{assemble_report, ReportBuilder, ReportOptions, ReportStage};
pub use session::{DocumentSession, Margins, PageSize};
