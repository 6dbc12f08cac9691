//! Report assembly – the fixed demonstration sequence on top of the
//! appenders, driven by a structured [`ReportOptions`].

use std::borrow::Cow;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::appender::{
    append_image, append_item, append_paragraph, append_separator, ContentItem, ImageItem,
    ImageSource, LogSink, SeparatorItem,
};
use crate::error::{ReportError, SessionError};
use crate::html_page::{append_html_page, HtmlLimits, DEFAULT_MAX_HTML_BYTES};
use crate::layout_config::Alignment;
use crate::session::{DocumentSession, Margins, PageSize};

/// Everything that varies between reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportOptions {
    /// PDF metadata title.
    pub title: String,
    pub page_size: PageSize,
    pub margins: Margins,
    /// Opening paragraphs, one per entry.
    pub intro: Vec<String>,
    pub image: ImageItem,
    pub separator: SeparatorItem,
    pub caption: String,
    pub caption_alignment: Alignment,
    /// Markup for the HTML page.
    pub html: String,
    pub fetch_timeout_secs: u64,
    pub max_html_bytes: usize,
}

const DEMO_HTML: &str = r#"<html>
    <head>
        <style>
            body { font-family: Arial; font-size: 12pt; }
            h1 { color: darkblue; text-align: center; }
            p { color: black; }
            .resaltado { color: red; font-weight: bold; }
        </style>
    </head>
    <body>
        <h1>Página generada desde HTML</h1>
        <p>Este es un párrafo con <span class='resaltado'>estilo</span>.</p>
        <table border='1' style='width:100%; border-collapse: collapse;'>
            <tr><th>Columna 1</th><th>Columna 2</th></tr>
            <tr><td>Dato A</td><td>Dato B</td></tr>
            <tr><td>Dato C</td><td>Dato D</td></tr>
        </table>
    </body>
</html>"#;

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            title: "Reporte".to_string(),
            page_size: PageSize::Letter,
            margins: Margins::default(),
            intro: vec![
                "Este es el contenido de la primera página".to_string(),
                "Generado con report-forge".to_string(),
            ],
            image: ImageItem::new(ImageSource::LocalPath("imagenes/link.jpeg".into())),
            separator: SeparatorItem::default(),
            caption: "Imagen cargada desde archivo local o URL segun sea el caso".to_string(),
            caption_alignment: Alignment::Center,
            html: DEMO_HTML.to_string(),
            fetch_timeout_secs: 10,
            max_html_bytes: DEFAULT_MAX_HTML_BYTES,
        }
    }
}

impl ReportOptions {
    pub fn html_limits(&self) -> HtmlLimits {
        HtmlLimits {
            max_html_bytes: self.max_html_bytes,
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Where a [`ReportBuilder`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStage {
    Opened,
    Populated,
    Closed,
}

/// A report under construction. Appends move it from `Opened` to
/// `Populated`; [`finish`](Self::finish) closes it for good.
pub struct ReportBuilder<'a> {
    session: DocumentSession,
    stage: ReportStage,
    limits: HtmlLimits,
    fetch_timeout: Duration,
    log: &'a dyn LogSink,
}

impl<'a> ReportBuilder<'a> {
    /// Open a session sized and titled per `options`.
    pub fn open(options: &ReportOptions, log: &'a dyn LogSink) -> Self {
        let mut session = DocumentSession::open(options.page_size, options.margins);
        session.set_title(options.title.clone());
        Self {
            session,
            stage: ReportStage::Opened,
            limits: options.html_limits(),
            fetch_timeout: options.fetch_timeout(),
            log,
        }
    }

    pub fn stage(&self) -> ReportStage {
        self.stage
    }

    pub fn session(&self) -> &DocumentSession {
        &self.session
    }

    fn populate<F>(&mut self, append: F) -> Result<&mut Self, ReportError>
    where
        F: FnOnce(&mut DocumentSession, &dyn LogSink) -> Result<(), ReportError>,
    {
        if self.stage == ReportStage::Closed {
            return Err(SessionError::Closed.into());
        }
        append(&mut self.session, self.log)?;
        self.stage = ReportStage::Populated;
        Ok(self)
    }

    pub fn paragraph(&mut self, text: &str, alignment: Alignment) -> Result<&mut Self, ReportError> {
        self.populate(|s, _| Ok(append_paragraph(s, text, alignment)?))
    }

    /// Append an image with graceful fallback, using the report's fetch timeout.
    pub fn image(&mut self, image: &ImageItem) -> Result<&mut Self, ReportError> {
        let image = self.timed(image);
        self.populate(|s, log| Ok(append_image(s, &image, log)?))
    }

    pub fn separator(&mut self, separator: &SeparatorItem) -> Result<&mut Self, ReportError> {
        self.populate(|s, _| Ok(append_separator(s, separator)?))
    }

    pub fn html_page(&mut self, html: &str) -> Result<&mut Self, ReportError> {
        let limits = self.limits;
        self.populate(|s, _| append_html_page(s, html, &limits))
    }

    /// Append any content item. Image items get the report's fetch timeout.
    pub fn item(&mut self, item: &ContentItem) -> Result<&mut Self, ReportError> {
        let item = self.with_fetch_timeout(item);
        let limits = self.limits;
        self.populate(|s, log| append_item(s, &item, log, &limits))
    }

    fn timed(&self, image: &ImageItem) -> ImageItem {
        ImageItem {
            fetch_timeout: self.fetch_timeout,
            ..image.clone()
        }
    }

    fn with_fetch_timeout<'i>(&self, item: &'i ContentItem) -> Cow<'i, ContentItem> {
        match item {
            ContentItem::Image(image) => Cow::Owned(ContentItem::Image(self.timed(image))),
            other => Cow::Borrowed(other),
        }
    }

    /// Close the session and return the PDF bytes.
    pub fn finish(&mut self) -> Result<Vec<u8>, ReportError> {
        if self.stage == ReportStage::Closed {
            return Err(SessionError::Closed.into());
        }
        self.stage = ReportStage::Closed;
        Ok(self.session.close()?)
    }
}

/// Build the demonstration report: intro paragraphs, image, separator,
/// caption, then the HTML page. An HTML failure discards the whole document.
pub fn assemble_report(options: &ReportOptions, log: &dyn LogSink) -> Result<Vec<u8>, ReportError> {
    let mut report = ReportBuilder::open(options, log);
    for line in &options.intro {
        report.paragraph(line, Alignment::Left)?;
    }
    report
        .image(&options.image)?
        .separator(&options.separator)?
        .paragraph(&options.caption, options.caption_alignment)?;

    if let Err(e) = report.html_page(&options.html) {
        log.error(&format!("Report aborted: {e}"));
        return Err(e);
    }

    let bytes = report.finish()?;
    log::info!("Assembled report {:?} ({} bytes)", options.title, bytes.len());
    Ok(bytes)
}
