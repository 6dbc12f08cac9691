//! PDF renderer – takes a [`DocumentLayout`] plus the session's images and
//! produces PDF bytes using `printpdf` (v0.8 ops-based API).

use std::collections::HashMap;

use printpdf::*;

use crate::layout_config::{DocumentLayout, LayoutBox, RunStyle};
use crate::resources::ImageStore;

/// A printpdf XObject together with the pixel dimensions of the source image.
struct ImageResource {
    xobj_id: XObjectId,
    px_width: u32,
    px_height: u32,
}

const PT_TO_MM: f32 = 0.352778;

/// Render a layout into PDF bytes.
///
/// Images that printpdf cannot encode are skipped with a `log::warn`; every
/// image in the store was already decoded once when it was inserted.
pub fn render_pdf(layout: &DocumentLayout, images: &ImageStore) -> Vec<u8> {
    let page_w = Mm(layout.page_width_pt * PT_TO_MM);
    let page_h = Mm(layout.page_height_pt * PT_TO_MM);

    let mut doc = PdfDocument::new(&layout.title);

    // ── Register every stored image once ───────────────────────────────────
    let mut image_resources: HashMap<&str, ImageResource> = HashMap::new();
    let mut img_warnings: Vec<PdfWarnMsg> = Vec::new();
    for (id, stored) in images.iter() {
        let raw = match RawImage::decode_from_bytes(&stored.bytes, &mut img_warnings) {
            Ok(r) => r,
            Err(e) => {
                log::warn!("Skipping image {id}: PDF encode error: {e}");
                continue;
            }
        };
        let xobj_id = doc.add_image(&raw);
        image_resources.insert(
            id,
            ImageResource {
                xobj_id,
                px_width: stored.px_width,
                px_height: stored.px_height,
            },
        );
    }

    // ── Render pages ──────────────────────────────────────────────────────
    let mut pages: Vec<PdfPage> = layout
        .pages
        .iter()
        .map(|page_layout| {
            let mut ops = Vec::new();
            for lbox in &page_layout.boxes {
                render_box(&mut ops, lbox, layout.page_height_pt, &image_resources);
            }
            PdfPage::new(page_w, page_h, ops)
        })
        .collect();

    // Ensure at least one page.
    if pages.is_empty() {
        pages.push(PdfPage::new(page_w, page_h, Vec::new()));
    }

    doc.with_pages(pages);
    doc.save(&PdfSaveOptions::default(), &mut Vec::new())
}

/// Convert a UTF-8 string to raw Windows-1252 bytes then wrap in a String so
/// printpdf writes the bytes unchanged into the PDF stream (builtin fonts use
/// WinAnsiEncoding, so each glyph is one byte 0x00–0xFF).
fn to_winlatin(s: &str) -> String {
    let bytes: Vec<u8> = s
        .chars()
        .map(|c| match c {
            '\u{20AC}' => 0x80, // euro
            '\u{2026}' => 0x85, // ellipsis
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95, // bullet
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{00A0}' => 0x20,
            c if (c as u32) < 256 => c as u8,
            _ => b'?',
        })
        .collect();
    // SAFETY: intentionally non-UTF-8 for the 0x80-0xFF range; printpdf
    // passes these bytes straight to the content stream, where the builtin
    // font decodes them with WinAnsiEncoding.
    #[allow(unsafe_code)]
    unsafe {
        String::from_utf8_unchecked(bytes)
    }
}

fn rgb(c: [f32; 4]) -> Color {
    Color::Rgb(Rgb {
        r: c[0],
        g: c[1],
        b: c[2],
        icc_profile: None,
    })
}

fn point(x: f32, y: f32) -> LinePoint {
    LinePoint {
        p: Point { x: Pt(x), y: Pt(y) },
        bezier: false,
    }
}

fn builtin_font(style: &RunStyle) -> BuiltinFont {
    match (style.bold, style.italic) {
        (true, true) => BuiltinFont::HelveticaBoldOblique,
        (true, false) => BuiltinFont::HelveticaBold,
        (false, true) => BuiltinFont::HelveticaOblique,
        (false, false) => BuiltinFont::Helvetica,
    }
}

/// Stroke a straight line in PDF coordinates.
fn stroke_line(ops: &mut Vec<Op>, from: (f32, f32), to: (f32, f32), thickness: f32, color: [f32; 4]) {
    ops.push(Op::SetOutlineColor { col: rgb(color) });
    ops.push(Op::SetOutlineThickness { pt: Pt(thickness) });
    ops.push(Op::DrawLine {
        line: Line {
            points: vec![point(from.0, from.1), point(to.0, to.1)],
            is_closed: false,
        },
    });
}

fn write_text(ops: &mut Vec<Op>, text: &str, x: f32, y: f32, size: f32, font: BuiltinFont, color: [f32; 4]) {
    ops.push(Op::StartTextSection);
    ops.push(Op::SetTextCursor {
        pos: Point { x: Pt(x), y: Pt(y) },
    });
    ops.push(Op::SetFontSizeBuiltinFont {
        size: Pt(size),
        font,
    });
    ops.push(Op::SetFillColor { col: rgb(color) });
    ops.push(Op::WriteTextBuiltinFont {
        items: vec![TextItem::Text(to_winlatin(text))],
        font,
    });
    ops.push(Op::EndTextSection);
}

/// Recursively render a LayoutBox and its children into PDF ops.
fn render_box(
    ops: &mut Vec<Op>,
    lbox: &LayoutBox,
    page_height: f32,
    images: &HashMap<&str, ImageResource>,
) {
    // PDF coordinate system: origin at bottom-left.
    // Our layout uses origin at top-left. Convert:
    let pdf_y = page_height - lbox.y;
    let (x1, y1, x2, y2) = (lbox.x, pdf_y - lbox.height, lbox.x + lbox.width, pdf_y);

    // Background
    if let Some(bg) = lbox.background_color {
        ops.push(Op::SetFillColor { col: rgb(bg) });
        ops.push(Op::DrawPolygon {
            polygon: Polygon {
                rings: vec![PolygonRing {
                    points: vec![point(x1, y1), point(x2, y1), point(x2, y2), point(x1, y2)],
                }],
                mode: PaintMode::Fill,
                winding_order: WindingOrder::NonZero,
            },
        });
    }

    // Border
    if let Some(border) = &lbox.border {
        ops.push(Op::SetOutlineColor {
            col: rgb(border.color),
        });
        ops.push(Op::SetOutlineThickness {
            pt: Pt(border.width),
        });
        ops.push(Op::DrawLine {
            line: Line {
                points: vec![point(x1, y2), point(x2, y2), point(x2, y1), point(x1, y1)],
                is_closed: true,
            },
        });
    }

    // Horizontal rule through the middle of the box
    if let Some(rule) = &lbox.rule {
        let mid = pdf_y - lbox.height / 2.0;
        stroke_line(ops, (x1, mid), (x2, mid), rule.thickness, rule.color);
    }

    // Text
    if let Some(text) = &lbox.text {
        // Baseline ≈ top of line + ascender (approx 0.75 × font_size)
        let ascender_offset = text.font_size * 0.75;

        for tline in &text.lines {
            let line_x = lbox.x + tline.x_offset;
            let text_y = pdf_y - tline.y_offset - ascender_offset;

            for run in &tline.runs {
                if run.text.is_empty() {
                    continue;
                }
                let run_x = line_x + run.x_offset;
                write_text(
                    ops,
                    &run.text,
                    run_x,
                    text_y,
                    text.font_size,
                    builtin_font(&run.style),
                    run.style.color,
                );
                if run.style.underline {
                    let underline_y = text_y - text.font_size * 0.1;
                    stroke_line(
                        ops,
                        (run_x, underline_y),
                        (run_x + run.width, underline_y),
                        0.5,
                        run.style.color,
                    );
                }
            }
        }

        // List marker, drawn in the gutter left of the first line
        if let Some(marker) = &text.list_marker {
            write_text(
                ops,
                marker,
                lbox.x - 16.0,
                pdf_y - ascender_offset,
                text.font_size,
                BuiltinFont::Helvetica,
                text.color,
            );
        }
    }

    // Image – embed from pre-registered XObject
    if let Some(img) = &lbox.image {
        match images.get(img.image_id.as_str()) {
            Some(res) => {
                // translate_y = bottom edge of image in PDF coordinates.
                let img_bottom_y = page_height - lbox.y - img.height;

                // At dpi=72 printpdf renders 1 px = 1 pt, so
                // scale = desired_pt / px_dim.
                let scale_x = img.width / res.px_width.max(1) as f32;
                let scale_y = img.height / res.px_height.max(1) as f32;

                ops.push(Op::UseXobject {
                    id: res.xobj_id.clone(),
                    transform: XObjectTransform {
                        translate_x: Some(Pt(lbox.x)),
                        translate_y: Some(Pt(img_bottom_y)),
                        dpi: Some(72.0),
                        scale_x: Some(scale_x),
                        scale_y: Some(scale_y),
                        rotate: None,
                    },
                });
            }
            None => log::warn!("Image {} missing from the store", img.image_id),
        }
    }

    // Children
    for child in &lbox.children {
        render_box(ops, child, page_height, images);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout_config::{
        Alignment, BorderStyle, ImageContent, PageLayout, RuleContent, TextContent, TextLine,
        TextRun,
    };

    fn assert_pdf(bytes: &[u8]) {
        assert!(bytes.len() > 100, "PDF should have content");
        assert_eq!(&bytes[0..5], b"%PDF-");
    }

    #[test]
    fn render_layout_without_pages() {
        let layout = DocumentLayout::new(612.0, 792.0);
        assert_pdf(&render_pdf(&layout, &ImageStore::default()));
    }

    #[test]
    fn render_every_box_kind() {
        let mut images = ImageStore::default();
        let png = crate::resources::parse_data_uri(&format!(
            "data:image/png;base64,{}",
            crate::resources::tests::PIXEL_PNG_B64
        ))
        .unwrap();
        let image_id = images.insert(png).unwrap();

        let mut text_box = LayoutBox::new(40.0, 40.0, 200.0, 18.0);
        text_box.text = Some(TextContent {
            lines: vec![TextLine {
                text: "Año número 1".to_string(),
                runs: vec![TextRun {
                    text: "Año número 1".to_string(),
                    x_offset: 0.0,
                    width: 80.0,
                    style: RunStyle {
                        underline: true,
                        ..RunStyle::default()
                    },
                }],
                x_offset: 0.0,
                y_offset: 0.0,
            }],
            font_size: 12.0,
            line_height: 18.0,
            text_align: Alignment::Left,
            list_marker: Some("\u{2022}".to_string()),
            color: [0.0, 0.0, 0.0, 1.0],
        });
        let mut rule_box = LayoutBox::new(40.0, 70.0, 300.0, 12.0);
        rule_box.rule = Some(RuleContent {
            thickness: 1.0,
            color: [0.5, 0.5, 0.5, 1.0],
        });
        let mut image_box = LayoutBox::new(40.0, 90.0, 50.0, 50.0);
        image_box.image = Some(ImageContent {
            image_id,
            width: 50.0,
            height: 50.0,
        });
        image_box.border = Some(BorderStyle {
            width: 1.0,
            color: [0.0, 0.0, 0.0, 1.0],
        });
        image_box.background_color = Some([0.9, 0.9, 0.9, 1.0]);

        let mut layout = DocumentLayout::new(612.0, 792.0);
        layout.pages.push(PageLayout {
            page_index: 0,
            boxes: vec![text_box, rule_box, image_box],
        });
        assert_pdf(&render_pdf(&layout, &images));
    }

    #[test]
    fn winlatin_maps_accents_to_single_bytes() {
        assert_eq!(to_winlatin("á").as_bytes(), &[0xE1]);
        assert_eq!(to_winlatin("\u{2022}").as_bytes(), &[0x95]);
        assert_eq!(to_winlatin("\u{4E2D}").as_bytes(), b"?");
    }
}
