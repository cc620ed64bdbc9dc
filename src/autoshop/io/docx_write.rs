//! `.docx` reports: one titled table per request followed by a page break.
//!
//! The package is assembled directly: content types, relationships, the main
//! document part and one media part per request.

use std::io::{Cursor, Write};

use tracing::{debug, instrument};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::autoshop::error::Result;
use crate::autoshop::model::{Rgb, ServiceRequest};
use crate::autoshop::report::template::{self, RequestTemplate};
use crate::autoshop::report::{DocumentAssembler, RenderedDocument, ReportConfig};
use crate::autoshop::resources::ImageKind;

const EMU_PER_PIXEL: u64 = 9525;
pub const IMAGE_WIDTH_EMU: u64 = 600 * EMU_PER_PIXEL;
pub const IMAGE_HEIGHT_EMU: u64 = 300 * EMU_PER_PIXEL;

const TITLE_SIZE: u16 = 26;
const CAPTION_SIZE: u16 = 18;
const DATES_SIZE: u16 = 15;
const BODY_SIZE: u16 = 16;
/// Half of a 6.5 inch text column, in twentieths of a point.
const GRID_COLUMN_TWIPS: u32 = 4680;

const IMAGE_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

/// Writes `.docx` documents with one page per request.
#[derive(Debug, Default, Clone, Copy)]
pub struct WordProcessorAssembler;

impl DocumentAssembler for WordProcessorAssembler {
    #[instrument(level = "debug", skip_all, fields(requests = requests.len()))]
    fn assemble(&self, requests: &[ServiceRequest], config: &ReportConfig) -> Result<RenderedDocument> {
        let templates = template::extract_all(requests, config)?;

        let mut body = String::new();
        for (index, request) in templates.iter().enumerate() {
            config.check_cancelled()?;
            let picture = index + 1;
            write_page(&mut body, request, &config.font_family, picture);
            debug!(page = %request.sheet_name, "page laid out");
        }

        Ok(RenderedDocument {
            bytes: package(&body, &templates)?,
            pages: templates.iter().map(|request| request.sheet_name.clone()).collect(),
        })
    }
}

struct RunStyle<'a> {
    font: &'a str,
    size: u16,
    color: Option<Rgb>,
}

fn run(style: &RunStyle<'_>, text: &str) -> String {
    let font = escape_xml(style.font);
    let color = style
        .color
        .map(|color| format!(r#"<w:color w:val="{}"/>"#, color.to_hex()))
        .unwrap_or_default();
    let half_points = style.size * 2;
    format!(
        r#"<w:r><w:rPr><w:rFonts w:ascii="{font}" w:hAnsi="{font}" w:cs="{font}" w:eastAsia="{font}"/>{color}<w:sz w:val="{half_points}"/><w:szCs w:val="{half_points}"/></w:rPr><w:t xml:space="preserve">{}</w:t></w:r>"#,
        escape_xml(text)
    )
}

fn centered(content: &str) -> String {
    format!(r#"<w:p><w:pPr><w:jc w:val="center"/></w:pPr>{content}</w:p>"#)
}

fn cell(content: &str, span: u8) -> String {
    let span = if span > 1 {
        format!(r#"<w:gridSpan w:val="{span}"/>"#)
    } else {
        String::new()
    };
    format!(r#"<w:tc><w:tcPr>{span}</w:tcPr>{content}</w:tc>"#)
}

fn write_page(body: &mut String, request: &RequestTemplate, font: &str, picture: usize) {
    let plain = |size| RunStyle {
        font,
        size,
        color: None,
    };

    body.push_str(&centered(&run(&plain(TITLE_SIZE), &request.service_label)));

    body.push_str(r#"<w:tbl><w:tblPr><w:tblW w:w="0" w:type="auto"/><w:tblBorders>"#);
    for edge in ["top", "left", "bottom", "right", "insideH", "insideV"] {
        body.push_str(&format!(
            r#"<w:{edge} w:val="single" w:sz="4" w:space="0" w:color="000000"/>"#
        ));
    }
    body.push_str("</w:tblBorders></w:tblPr><w:tblGrid>");
    body.push_str(&format!(r#"<w:gridCol w:w="{GRID_COLUMN_TWIPS}"/>"#).repeat(2));
    body.push_str("</w:tblGrid>");

    let caption = RunStyle {
        font,
        size: CAPTION_SIZE,
        color: Some(request.class_color),
    };
    let rows = [
        cell(&centered(&run(&caption, &request.caption)), 2),
        cell(&centered(&image_run(picture)), 2),
        {
            let (placed, completes) = request.date_lines();
            let dates = centered(&run(&plain(DATES_SIZE), &placed))
                + &centered(&run(&plain(DATES_SIZE), &completes));
            let price = centered(&run(&plain(BODY_SIZE), &request.total_price_line()));
            cell(&dates, 1) + &cell(&price, 1)
        },
        cell(
            &format!("<w:p>{}</w:p>", run(&plain(BODY_SIZE), &request.parts_summary())),
            2,
        ),
    ];
    for row in rows {
        body.push_str(&format!("<w:tr>{row}</w:tr>"));
    }
    body.push_str("</w:tbl>");

    body.push_str(r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#);
}

fn image_run(picture: usize) -> String {
    format!(
        concat!(
            r#"<w:r><w:drawing><wp:inline distT="0" distB="0" distL="0" distR="0">"#,
            r#"<wp:extent cx="{cx}" cy="{cy}"/><wp:docPr id="{id}" name="Машина {id}"/>"#,
            r#"<a:graphic xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main">"#,
            r#"<a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            r#"<pic:pic xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            r#"<pic:nvPicPr><pic:cNvPr id="{id}" name="Машина {id}"/><pic:cNvPicPr/></pic:nvPicPr>"#,
            r#"<pic:blipFill><a:blip r:embed="rIdImage{id}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
            r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm>"#,
            r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr>"#,
            r#"</pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r>"#
        ),
        cx = IMAGE_WIDTH_EMU,
        cy = IMAGE_HEIGHT_EMU,
        id = picture
    )
}

fn media_name(index: usize, request: &RequestTemplate) -> String {
    format!("image{}.{}", index + 1, request.image_kind.extension())
}

fn package(body: &str, templates: &[RequestTemplate]) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("[Content_Types].xml", options)?;
    zip.write_all(content_types(templates).as_bytes())?;

    zip.start_file("_rels/.rels", options)?;
    zip.write_all(PACKAGE_RELS.as_bytes())?;

    zip.start_file("word/document.xml", options)?;
    zip.write_all(DOCUMENT_HEAD.as_bytes())?;
    zip.write_all(body.as_bytes())?;
    zip.write_all(DOCUMENT_TAIL.as_bytes())?;

    let mut relationships = String::from(RELS_HEAD);
    for (index, request) in templates.iter().enumerate() {
        relationships.push_str(&format!(
            r#"<Relationship Id="rIdImage{}" Type="{IMAGE_REL}" Target="media/{}"/>"#,
            index + 1,
            media_name(index, request)
        ));
    }
    relationships.push_str("</Relationships>");
    zip.start_file("word/_rels/document.xml.rels", options)?;
    zip.write_all(relationships.as_bytes())?;

    for (index, request) in templates.iter().enumerate() {
        zip.start_file(format!("word/media/{}", media_name(index, request)), options)?;
        zip.write_all(&request.image)?;
    }

    Ok(zip.finish()?.into_inner())
}

fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// `[Content_Types].xml`, with one default entry per image format in use.
fn content_types(templates: &[RequestTemplate]) -> String {
    let mut kinds: Vec<ImageKind> = Vec::new();
    for request in templates {
        if !kinds.contains(&request.image_kind) {
            kinds.push(request.image_kind);
        }
    }

    let mut xml = String::from(CONTENT_TYPES_HEAD);
    for kind in kinds {
        xml.push_str(&format!(
            r#"<Default Extension="{}" ContentType="{}"/>"#,
            kind.extension(),
            kind.content_type()
        ));
    }
    xml.push_str(CONTENT_TYPES_TAIL);
    xml
}

const CONTENT_TYPES_HEAD: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
    r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
    r#"<Default Extension="xml" ContentType="application/xml"/>"#
);

const CONTENT_TYPES_TAIL: &str = concat!(
    r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
    r#"</Types>"#
);

const PACKAGE_RELS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>"#,
    r#"</Relationships>"#
);

const RELS_HEAD: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#
);

const DOCUMENT_HEAD: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main""#,
    r#" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships""#,
    r#" xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing">"#,
    r#"<w:body>"#
);

const DOCUMENT_TAIL: &str = concat!(
    r#"<w:sectPr><w:pgSz w:w="11906" w:h="16838"/>"#,
    r#"<w:pgMar w:top="1134" w:right="850" w:bottom="1134" w:left="1701" w:header="708" w:footer="708" w:gutter="0"/>"#,
    r#"</w:sectPr></w:body></w:document>"#
);
