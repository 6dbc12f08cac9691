//! Integration tests for the report-forge pipeline.
//!
//! These tests validate:
//! - Session lifecycle and page accounting
//! - Image fallbacks never abort a report
//! - HTML pages render and fail as a whole
//! - PDF output exists and has valid format

use std::io::{Cursor, Write};
use std::time::Duration;

use report_forge::{
    append_html, append_html_page, append_image, append_item, append_paragraph,
    append_separator, assemble_report, Alignment, ContentItem, DocumentSession, HtmlLimits,
    HtmlRenderError, ImageItem, ImageSource, LogSink, Margins, PageSize, ReportError,
    ReportOptions, SeparatorItem, SessionError, StdLog,
};

// =====================================================================
// Helper
// =====================================================================

fn open() -> DocumentSession {
    DocumentSession::open(PageSize::Letter, Margins::default())
}

fn assert_valid_pdf(bytes: &[u8]) {
    assert!(bytes.len() > 100, "PDF too small: {} bytes", bytes.len());
    assert_eq!(&bytes[0..5], b"%PDF-", "Missing PDF header");
}

fn pdf_page_count(bytes: &[u8]) -> usize {
    lopdf::Document::load_mem(bytes)
        .expect("Output should parse as PDF")
        .get_pages()
        .len()
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([20, 120, 200]));
    let mut buf = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, image::ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

/// Counts messages without printing them.
#[derive(Default)]
struct CountingLog {
    warnings: std::cell::Cell<usize>,
}

impl LogSink for CountingLog {
    fn warn(&self, _message: &str) {
        self.warnings.set(self.warnings.get() + 1);
    }

    fn error(&self, _message: &str) {}
}

// =====================================================================
// Session lifecycle
// =====================================================================

#[test]
fn close_returns_pdf_once() {
    let mut session = open();
    append_paragraph(&mut session, "Hola", Alignment::Left).unwrap();
    assert_valid_pdf(&session.close().unwrap());
    assert!(matches!(session.close(), Err(SessionError::Closed)));
}

#[test]
fn appends_after_close_fail_for_every_kind() {
    let mut session = open();
    session.close().unwrap();
    let log = StdLog;

    assert_eq!(
        append_paragraph(&mut session, "x", Alignment::Left),
        Err(SessionError::Closed)
    );
    assert_eq!(
        append_image(
            &mut session,
            &ImageItem::new(ImageSource::InlineBytes(png(2, 2))),
            &log
        ),
        Err(SessionError::Closed)
    );
    assert_eq!(
        append_separator(&mut session, &SeparatorItem::default()),
        Err(SessionError::Closed)
    );
    assert!(matches!(
        append_html(&mut session, "<p>x</p>", &HtmlLimits::default()),
        Err(ReportError::Session(SessionError::Closed))
    ));
    assert!(matches!(
        append_html_page(&mut session, "<p>x</p>", &HtmlLimits::default()),
        Err(ReportError::Session(SessionError::Closed))
    ));
}

#[test]
fn element_count_never_shrinks() {
    let mut session = open();
    let log = CountingLog::default();
    let limits = HtmlLimits::default();
    let items = vec![
        ContentItem::Paragraph {
            text: "Introducción".into(),
            alignment: Alignment::Justify,
        },
        ContentItem::Image(ImageItem::new(ImageSource::InlineBytes(png(80, 40)))),
        ContentItem::Image(ImageItem::new(ImageSource::LocalPath(
            "/definitely/missing.jpeg".into(),
        ))),
        ContentItem::Separator(SeparatorItem {
            thickness: 2.0,
            width_percent: 60.0,
            color: [200, 0, 0],
            alignment: Alignment::Right,
        }),
        ContentItem::HtmlFragment {
            markup: "<ul><li>uno</li><li>dos</li></ul>".into(),
        },
    ];
    let mut last = session.element_count();
    for item in &items {
        append_item(&mut session, item, &log, &limits).unwrap();
        let now = session.element_count();
        assert!(now > last, "{item:?} did not add an element");
        last = now;
    }
    assert_eq!(log.warnings.get(), 1);
    assert_valid_pdf(&session.close().unwrap());
}

// =====================================================================
// Image fallbacks
// =====================================================================

#[test]
fn missing_local_image_becomes_fallback_paragraph() {
    let mut session = open();
    let item = ImageItem::new(ImageSource::LocalPath("fotos/no-existe.jpeg".into()));
    append_image(&mut session, &item, &StdLog).unwrap();

    let text = session.text_lines().join(" ").to_lowercase();
    assert!(text.contains("no se pudo cargar la imagen"), "{text}");
    assert_valid_pdf(&session.close().unwrap());
}

#[test]
fn unreachable_remote_image_cites_the_url() {
    let mut session = open();
    let url = "http://127.0.0.1:1/logo.png";
    let mut item = ImageItem::new(ImageSource::RemoteUrl(url.into()));
    item.fetch_timeout = Duration::from_secs(2);
    append_image(&mut session, &item, &StdLog).unwrap();

    let text = session.text_lines().join(" ");
    assert!(text.contains("No se pudo cargar la imagen desde"));
    assert!(text.contains(url));
}

#[test]
fn local_jpeg_is_embedded() {
    let img = image::RgbImage::from_pixel(64, 48, image::Rgb([0, 0, 0]));
    let mut file = tempfile::Builder::new().suffix(".jpeg").tempfile().unwrap();
    let mut buf = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, image::ImageFormat::Jpeg)
        .unwrap();
    file.write_all(buf.get_ref()).unwrap();

    let mut session = open();
    let item = ImageItem::new(ImageSource::LocalPath(file.path().to_path_buf()));
    let log = CountingLog::default();
    append_image(&mut session, &item, &log).unwrap();
    assert_eq!(log.warnings.get(), 0);
    assert_eq!(session.element_count(), 1);
    assert_valid_pdf(&session.close().unwrap());
}

// =====================================================================
// Pages
// =====================================================================

#[test]
fn page_count_is_html_pages_plus_one() {
    for (paragraphs, html_pages) in [(1, 0), (1, 1), (3, 2), (5, 4)] {
        let mut session = open();
        for i in 0..paragraphs {
            append_paragraph(&mut session, &format!("Párrafo {i}"), Alignment::Left).unwrap();
        }
        for i in 0..html_pages {
            append_html_page(
                &mut session,
                &format!("<h1>Página {i}</h1><p>contenido</p>"),
                &HtmlLimits::default(),
            )
            .unwrap();
        }
        let bytes = session.close().unwrap();
        assert_valid_pdf(&bytes);
        assert_eq!(
            pdf_page_count(&bytes),
            html_pages + 1,
            "{paragraphs} paragraphs, {html_pages} HTML pages"
        );
        assert_eq!(session.page_count(), html_pages + 1);
    }
}

#[test]
fn a4_pages_use_a4_dimensions() {
    let mut session = DocumentSession::open(PageSize::A4, Margins::uniform(72.0));
    append_paragraph(&mut session, "A4", Alignment::Center).unwrap();
    let layout = session.layout();
    assert_eq!(layout.page_width_pt, 595.28);
    let first = &layout.pages[0].boxes[0];
    assert_eq!(first.x, 72.0);
    assert_eq!(first.y, 72.0);
}

#[test]
fn layout_dump_is_json() {
    let mut session = open();
    append_paragraph(&mut session, "volcado", Alignment::Left).unwrap();
    let json = session.layout().to_json();
    let back = report_forge::layout_config::DocumentLayout::from_json(&json).unwrap();
    assert_eq!(back.text_lines(), vec!["volcado"]);
}

// =====================================================================
// Full report
// =====================================================================

#[test]
fn default_report_is_a_valid_two_page_pdf() {
    let bytes = assemble_report(&ReportOptions::default(), &StdLog).unwrap();
    assert_valid_pdf(&bytes);
    assert_eq!(pdf_page_count(&bytes), 2);
}

#[test]
fn report_with_remote_fallback_still_renders() {
    let mut options = ReportOptions::default();
    options.image = ImageItem::new(ImageSource::RemoteUrl("http://127.0.0.1:1/x.png".into()));
    options.fetch_timeout_secs = 2;
    assert_valid_pdf(&assemble_report(&options, &StdLog).unwrap());
}

#[test]
fn malformed_html_fails_the_report() {
    let options = ReportOptions {
        html: "<table><tr><td>sin cerrar".to_string() + "<!-- comentario",
        ..ReportOptions::default()
    };
    let err = assemble_report(&options, &StdLog).unwrap_err();
    assert!(matches!(
        err,
        ReportError::Html(HtmlRenderError::Malformed { .. })
    ));
}

#[test]
fn oversized_html_fails_the_report() {
    let options = ReportOptions {
        max_html_bytes: 64,
        ..ReportOptions::default()
    };
    let err = assemble_report(&options, &StdLog).unwrap_err();
    assert!(matches!(
        err,
        ReportError::Html(HtmlRenderError::TooLarge { limit: 64, .. })
    ));
}
