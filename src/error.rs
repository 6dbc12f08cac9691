//! Error types shared by the session, appender, HTML composer and pipeline.

use std::path::PathBuf;

/// Misuse of a [`DocumentSession`](crate::session::DocumentSession).
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("document session is already closed")]
    Closed,
}

/// Failure to resolve an image source. Always recovered inside the appender.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("local image not found: {}", .0.display())]
    LocalNotFound(PathBuf),

    #[error("could not fetch image from {url}: {reason}")]
    RemoteFetch { url: String, reason: String },

    #[error("could not read image: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not decode image: {0}")]
    Decode(String),
}

/// Fatal failure while turning markup into page content.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HtmlRenderError {
    #[error("HTML payload is empty")]
    Empty,

    #[error("HTML payload is {len} bytes, limit is {limit}")]
    TooLarge { len: usize, limit: usize },

    #[error("malformed HTML at byte {offset}: {reason}")]
    Malformed { offset: usize, reason: String },

    #[error("layout failed: {0}")]
    Layout(String),
}

/// Anything that aborts a report.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("HTML rendering failed: {0}")]
    Html(#[from] HtmlRenderError),
}

/// Failure to load a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}
