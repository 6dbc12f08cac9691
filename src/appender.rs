//! Content appender – typed content items placed into an open session.
//!
//! Every append builds its box completely before touching the session. Image
//! resolution is the only fallible I/O here and never aborts a report: a
//! missing local file or an unreachable URL degrades to a fallback paragraph,
//! anything else is logged and skipped.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ImageError, ReportError, SessionError};
use crate::fonts::{wrap_text, BODY_FONT_SIZE, BODY_LINE_HEIGHT};
use crate::html_page::{append_html, HtmlLimits};
use crate::layout_config::{Alignment, ImageContent, LayoutBox, RuleContent, RunStyle};
use crate::session::DocumentSession;

/// Default timeout for fetching a remote image.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Destination for recoverable append failures.
pub trait LogSink {
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// Forwards to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdLog;

impl LogSink for StdLog {
    fn warn(&self, message: &str) {
        log::warn!("{message}");
    }

    fn error(&self, message: &str) {
        log::error!("{message}");
    }
}

/// Where an image's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    LocalPath(PathBuf),
    RemoteUrl(String),
    InlineBytes(Vec<u8>),
}

/// An image to append, scaled to fit `max_width` x `max_height` points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageItem {
    pub source: ImageSource,
    #[serde(default = "ImageItem::default_max_width")]
    pub max_width: f32,
    #[serde(default = "ImageItem::default_max_height")]
    pub max_height: f32,
    #[serde(default = "ImageItem::default_alignment")]
    pub alignment: Alignment,
    #[serde(default = "ImageItem::default_spacing")]
    pub spacing_before: f32,
    #[serde(default = "ImageItem::default_spacing")]
    pub spacing_after: f32,
    /// Applies to `RemoteUrl` sources only.
    #[serde(skip, default = "ImageItem::default_fetch_timeout")]
    pub fetch_timeout: Duration,
}

impl ImageItem {
    pub fn new(source: ImageSource) -> Self {
        Self {
            source,
            max_width: Self::default_max_width(),
            max_height: Self::default_max_height(),
            alignment: Self::default_alignment(),
            spacing_before: Self::default_spacing(),
            spacing_after: Self::default_spacing(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    fn default_max_width() -> f32 {
        300.0
    }

    fn default_max_height() -> f32 {
        200.0
    }

    fn default_alignment() -> Alignment {
        Alignment::Center
    }

    fn default_spacing() -> f32 {
        10.0
    }

    fn default_fetch_timeout() -> Duration {
        DEFAULT_FETCH_TIMEOUT
    }
}

/// A horizontal rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeparatorItem {
    pub thickness: f32,
    /// Share of the content width, 0–100.
    pub width_percent: f32,
    /// RGB, 0–255 per channel.
    pub color: [u8; 3],
    pub alignment: Alignment,
}

impl Default for SeparatorItem {
    fn default() -> Self {
        Self {
            thickness: 1.0,
            width_percent: 100.0,
            color: [0, 0, 0],
            alignment: Alignment::Center,
        }
    }
}

/// One piece of material for the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentItem {
    Paragraph {
        text: String,
        #[serde(default)]
        alignment: Alignment,
    },
    Image(ImageItem),
    Separator(SeparatorItem),
    HtmlFragment { markup: String },
}

/// Append a paragraph of body text (Helvetica 12 pt, leading 1.5).
pub fn append_paragraph(
    session: &mut DocumentSession,
    text: &str,
    alignment: Alignment,
) -> Result<(), SessionError> {
    session.ensure_open()?;
    let metrics = session.metrics();
    let lines = wrap_text(
        text,
        BODY_FONT_SIZE,
        RunStyle::default(),
        session.content_width(),
        metrics,
    );
    let line_height = metrics.line_height(BODY_FONT_SIZE, BODY_LINE_HEIGHT);
    session.place_paragraph(lines, alignment, BODY_FONT_SIZE, line_height);
    Ok(())
}

/// Append an image, falling back to an explanatory paragraph when the source
/// cannot be reached. Only fails when the session is closed.
pub fn append_image(
    session: &mut DocumentSession,
    image: &ImageItem,
    log: &dyn LogSink,
) -> Result<(), SessionError> {
    session.ensure_open()?;

    let bytes = match resolve_source(&image.source, image.fetch_timeout) {
        Ok(bytes) => bytes,
        Err(ImageError::LocalNotFound(path)) => {
            log.warn(&format!("Local image not found: {}", path.display()));
            let text = format!(
                "No se pudo cargar la imagen local: archivo no encontrado ({})",
                path.display()
            );
            return append_paragraph(session, &text, Alignment::Left);
        }
        Err(ImageError::RemoteFetch { url, reason }) => {
            log.warn(&format!("Error downloading image from {url}: {reason}"));
            let text = format!("No se pudo cargar la imagen desde: {url}");
            return append_paragraph(session, &text, Alignment::Left);
        }
        Err(e) => {
            log.warn(&format!("Image skipped: {e}"));
            return Ok(());
        }
    };

    let image_id = match session.images_mut().insert(bytes) {
        Ok(id) => id,
        Err(e) => {
            log.warn(&format!("Image skipped: {e}"));
            return Ok(());
        }
    };
    let Some(stored) = session.images().get(&image_id) else {
        return Ok(());
    };

    let max_width = image.max_width.min(session.content_width());
    let max_height = image.max_height.min(session.content_height());
    let (width, height) = scale_to_fit(stored.px_width, stored.px_height, max_width, max_height);

    let x = session.content_left() + image.alignment.offset(session.content_width(), width);
    let mut lbox = LayoutBox::new(x, 0.0, width, height);
    lbox.image = Some(ImageContent {
        image_id,
        width,
        height,
    });
    session.place_block(lbox, image.spacing_before, image.spacing_after);
    Ok(())
}

/// Append a horizontal rule occupying one body leading of vertical space.
pub fn append_separator(
    session: &mut DocumentSession,
    separator: &SeparatorItem,
) -> Result<(), SessionError> {
    session.ensure_open()?;
    let content_width = session.content_width();
    let width = content_width * separator.width_percent.clamp(0.0, 100.0) / 100.0;
    let band = session
        .metrics()
        .line_height(BODY_FONT_SIZE, BODY_LINE_HEIGHT)
        .max(separator.thickness);
    let x = session.content_left() + separator.alignment.offset(content_width, width);

    let [r, g, b] = separator.color;
    let mut lbox = LayoutBox::new(x, 0.0, width, band);
    lbox.rule = Some(RuleContent {
        thickness: separator.thickness,
        color: [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0, 1.0],
    });
    session.place_block(lbox, 0.0, 0.0);
    Ok(())
}

/// Append any content item. HTML fragments are the only fatal kind.
pub fn append_item(
    session: &mut DocumentSession,
    item: &ContentItem,
    log: &dyn LogSink,
    limits: &HtmlLimits,
) -> Result<(), ReportError> {
    match item {
        ContentItem::Paragraph { text, alignment } => append_paragraph(session, text, *alignment)?,
        ContentItem::Image(image) => append_image(session, image, log)?,
        ContentItem::Separator(separator) => append_separator(session, separator)?,
        ContentItem::HtmlFragment { markup } => append_html(session, markup, limits)?,
    }
    Ok(())
}

/// Scale `px_width` x `px_height` (1 px = 1 pt) to the largest size that fits
/// the box, preserving the aspect ratio. Small images are scaled up.
fn scale_to_fit(px_width: u32, px_height: u32, max_width: f32, max_height: f32) -> (f32, f32) {
    let (w, h) = (px_width.max(1) as f32, px_height.max(1) as f32);
    let factor = (max_width / w).min(max_height / h).max(0.0);
    (w * factor, h * factor)
}

fn resolve_source(source: &ImageSource, timeout: Duration) -> Result<Vec<u8>, ImageError> {
    match source {
        ImageSource::LocalPath(path) => read_local(path),
        ImageSource::RemoteUrl(url) => fetch_remote(url, timeout),
        ImageSource::InlineBytes(bytes) => Ok(bytes.clone()),
    }
}

fn read_local(path: &Path) -> Result<Vec<u8>, ImageError> {
    if !path.is_file() {
        return Err(ImageError::LocalNotFound(path.to_path_buf()));
    }
    Ok(std::fs::read(path)?)
}

/// Blocking GET with a timeout. Transport errors and non-2xx statuses are
/// fetch failures.
fn fetch_remote(url: &str, timeout: Duration) -> Result<Vec<u8>, ImageError> {
    let fetch_err = |reason: String| ImageError::RemoteFetch {
        url: url.to_string(),
        reason,
    };
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| fetch_err(e.to_string()))?;
    let response = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(|e| fetch_err(e.to_string()))?;
    let bytes = response.bytes().map_err(|e| fetch_err(e.to_string()))?;
    log::debug!("Fetched {} bytes from {url}", bytes.len());
    Ok(bytes.to_vec())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::RefCell;
    use std::io::{Cursor, Write};

    use super::*;
    use crate::session::{Margins, PageSize};

    /// Records every message instead of logging it.
    #[derive(Default)]
    pub(crate) struct RecordingLog {
        pub(crate) warnings: RefCell<Vec<String>>,
        pub(crate) errors: RefCell<Vec<String>>,
    }

    impl LogSink for RecordingLog {
        fn warn(&self, message: &str) {
            self.warnings.borrow_mut().push(message.to_string());
        }

        fn error(&self, message: &str) {
            self.errors.borrow_mut().push(message.to_string());
        }
    }

    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ::image::RgbImage::from_pixel(width, height, ::image::Rgb([200, 30, 30]));
        let mut buf = Cursor::new(Vec::new());
        ::image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ::image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn session() -> DocumentSession {
        DocumentSession::open(PageSize::Letter, Margins::default())
    }

    fn all_text(session: &DocumentSession) -> String {
        session.text_lines().join("\n")
    }

    #[test]
    fn paragraph_adds_an_element() {
        let mut s = session();
        append_paragraph(&mut s, "Este es el contenido de la primera página", Alignment::Left).unwrap();
        assert_eq!(s.element_count(), 1);
        append_paragraph(&mut s, "", Alignment::Left).unwrap();
        assert_eq!(s.element_count(), 2);
    }

    #[test]
    fn centered_paragraph_is_offset() {
        let mut s = session();
        append_paragraph(&mut s, "centro", Alignment::Center).unwrap();
        let text = s.layout().pages[0].boxes[0].text.as_ref().unwrap();
        assert!(text.lines[0].x_offset > 200.0);
    }

    #[test]
    fn inline_image_is_scaled_and_centered() {
        let mut s = session();
        let item = ImageItem::new(ImageSource::InlineBytes(png_bytes(40, 20)));
        append_image(&mut s, &item, &RecordingLog::default()).unwrap();

        let b = &s.layout().pages[0].boxes[0];
        let img = b.image.as_ref().unwrap();
        assert!((img.width - 300.0).abs() < 0.01);
        assert!((img.height - 150.0).abs() < 0.01);
        assert!((b.x - (40.0 + (532.0 - 300.0) / 2.0)).abs() < 0.01);
        assert_eq!(b.y, s.content_top() + 10.0);
    }

    #[test]
    fn image_never_exceeds_content_width() {
        let mut s = session();
        let mut item = ImageItem::new(ImageSource::InlineBytes(png_bytes(100, 10)));
        item.max_width = 10_000.0;
        item.max_height = 10_000.0;
        append_image(&mut s, &item, &RecordingLog::default()).unwrap();
        let b = &s.layout().pages[0].boxes[0];
        assert!(b.width <= s.content_width() + 0.01);
    }

    #[test]
    fn missing_local_image_falls_back_to_text() {
        let mut s = session();
        let log = RecordingLog::default();
        let item = ImageItem::new(ImageSource::LocalPath("/no/such/dir/link.jpeg".into()));
        append_image(&mut s, &item, &log).unwrap();

        assert_eq!(s.element_count(), 1);
        let text = all_text(&s);
        assert!(text.contains("No se pudo cargar la imagen local"), "{text}");
        assert!(text.contains("link.jpeg"));
        assert_eq!(log.warnings.borrow().len(), 1);
    }

    #[test]
    fn unreachable_remote_image_falls_back_to_text() {
        let mut s = session();
        let log = RecordingLog::default();
        let url = "http://127.0.0.1:1/imagen.png";
        let mut item = ImageItem::new(ImageSource::RemoteUrl(url.to_string()));
        item.fetch_timeout = Duration::from_secs(2);
        append_image(&mut s, &item, &log).unwrap();

        let text = all_text(&s);
        assert!(text.contains("No se pudo cargar la imagen desde"), "{text}");
        assert!(text.contains(url));
        assert_eq!(log.warnings.borrow().len(), 1);
    }

    #[test]
    fn undecodable_image_is_skipped() {
        let mut s = session();
        let log = RecordingLog::default();
        let item = ImageItem::new(ImageSource::InlineBytes(b"not an image".to_vec()));
        append_image(&mut s, &item, &log).unwrap();
        assert_eq!(s.element_count(), 0);
        assert!(s.images().is_empty());
        assert_eq!(log.warnings.borrow().len(), 1);
    }

    #[test]
    fn local_image_file_is_loaded() {
        let mut file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        file.write_all(&png_bytes(30, 60)).unwrap();

        let mut s = session();
        let item = ImageItem::new(ImageSource::LocalPath(file.path().to_path_buf()));
        append_image(&mut s, &item, &RecordingLog::default()).unwrap();
        let img = s.layout().pages[0].boxes[0].image.as_ref().unwrap();
        // Height-bound: 200 / 60 scale.
        assert!((img.height - 200.0).abs() < 0.01);
        assert!((img.width - 100.0).abs() < 0.01);
    }

    #[test]
    fn image_that_does_not_fit_moves_to_next_page() {
        let mut s = session();
        for _ in 0..38 {
            append_paragraph(&mut s, "línea", Alignment::Left).unwrap();
        }
        assert_eq!(s.page_count(), 1);
        let item = ImageItem::new(ImageSource::InlineBytes(png_bytes(40, 20)));
        append_image(&mut s, &item, &RecordingLog::default()).unwrap();
        assert_eq!(s.page_count(), 2);
        assert!(s.layout().pages[1].boxes[0].image.is_some());
    }

    #[test]
    fn separator_spans_requested_share() {
        let mut s = session();
        let sep = SeparatorItem {
            width_percent: 50.0,
            ..SeparatorItem::default()
        };
        append_separator(&mut s, &sep).unwrap();
        let b = &s.layout().pages[0].boxes[0];
        assert!((b.width - 266.0).abs() < 0.01);
        assert!((b.x - (40.0 + 133.0)).abs() < 0.01);
        assert!(b.rule.is_some());
        assert_eq!(s.cursor_y(), s.content_top() + 18.0);
    }

    #[test]
    fn every_kind_fails_after_close() {
        let mut s = session();
        s.close().unwrap();
        let log = RecordingLog::default();
        let limits = HtmlLimits::default();
        let items = [
            ContentItem::Paragraph {
                text: "x".into(),
                alignment: Alignment::Left,
            },
            ContentItem::Image(ImageItem::new(ImageSource::LocalPath("missing.png".into()))),
            ContentItem::Separator(SeparatorItem::default()),
            ContentItem::HtmlFragment {
                markup: "<p>x</p>".into(),
            },
        ];
        for item in &items {
            let err = append_item(&mut s, item, &log, &limits).unwrap_err();
            assert!(
                matches!(err, ReportError::Session(SessionError::Closed)),
                "{item:?} -> {err:?}"
            );
        }
        assert!(log.warnings.borrow().is_empty());
    }

    #[test]
    fn every_kind_increases_element_count() {
        let mut s = session();
        let log = RecordingLog::default();
        let limits = HtmlLimits::default();
        let items = [
            ContentItem::Paragraph {
                text: "hola".into(),
                alignment: Alignment::Right,
            },
            ContentItem::Image(ImageItem::new(ImageSource::InlineBytes(png_bytes(4, 4)))),
            ContentItem::Image(ImageItem::new(ImageSource::LocalPath("missing.png".into()))),
            ContentItem::Separator(SeparatorItem::default()),
            ContentItem::HtmlFragment {
                markup: "<p>fragmento</p>".into(),
            },
        ];
        for item in &items {
            let before = s.element_count();
            append_item(&mut s, item, &log, &limits).unwrap();
            assert!(s.element_count() > before, "{item:?}");
        }
        assert_eq!(s.page_count(), 1);
    }

    #[test]
    fn content_items_deserialize_from_json() {
        let item: ContentItem = serde_json::from_str(
            r#"{"kind":"image","source":{"remote_url":"https://example.com/a.png"},"alignment":"center"}"#,
        )
        .unwrap();
        let ContentItem::Image(image) = item else {
            panic!("expected an image item");
        };
        assert_eq!(image.source, ImageSource::RemoteUrl("https://example.com/a.png".into()));
        assert_eq!(image.max_width, 300.0);
        assert_eq!(image.fetch_timeout, DEFAULT_FETCH_TIMEOUT);
    }

    #[test]
    fn json_image_defaults_match_constructor() {
        let item: ImageItem = serde_json::from_str(r#"{"source":{"local_path":"logo.png"}}"#).unwrap();
        assert_eq!(item, ImageItem::new(ImageSource::LocalPath("logo.png".into())));
    }
}
