//! Legacy `.xls` reports: a BIFF8 workbook stream inside an OLE compound file.

use std::collections::BTreeMap;
use std::io::{Cursor, Write};

use tracing::{debug, instrument};

use crate::autoshop::error::Result;
use crate::autoshop::io::biff::{
    self, BOF_GLOBALS, BOF_WORKSHEET, COLINFO, CellStyle, DEFAULT_CELL_XF, DIMENSIONS, FontSpec,
    HorizontalAlign, LABELSST, MERGEDCELLS, NUMBER, Payload, ROW, RecordBuffer, SheetPicture,
    StringTable, StyleTable, WINDOW2,
};
use crate::autoshop::model::ServiceRequest;
use crate::autoshop::report::template::{
    self, BLANK_SHEET_NAME, BODY_FONT_SIZE, CAPTION_FONT_SIZE, CAPTION_ROW, COLUMN_COUNT, COLUMN_WIDTH_UNITS,
    COMPLETES_LABEL, COMPLETES_ROW, IMAGE_ANCHOR, LEGACY_LAYOUT, PART_COUNT_HEADER,
    PART_NAME_HEADER, PARTS_HEADER, PARTS_HEADER_FONT_SIZE, PLACED_LABEL, PLACED_ROW,
    ROW_HEIGHT_TWIPS, RequestTemplate, SERVICE_FONT_SIZE, SERVICE_ROW,
};
use crate::autoshop::report::{DocumentAssembler, RenderedDocument, ReportConfig};

const WORKBOOK_STREAM: &str = "/Workbook";
/// Spreadsheet applications refuse workbook streams shorter than this.
const MIN_STREAM_LEN: usize = 4096;
const LAST_COL: u16 = COLUMN_COUNT - 1;

/// Writes `.xls` workbooks with one sheet per request.
#[derive(Debug, Default, Clone, Copy)]
pub struct LegacySpreadsheetAssembler;

impl DocumentAssembler for LegacySpreadsheetAssembler {
    #[instrument(level = "debug", skip_all, fields(requests = requests.len()))]
    fn assemble(&self, requests: &[ServiceRequest], config: &ReportConfig) -> Result<RenderedDocument> {
        let templates = template::extract_all(requests, config)?;
        let mut styles = StyleTable::new(&config.font_family);
        let mut strings = StringTable::default();

        let mut sheets = Vec::with_capacity(templates.len().max(1));
        for request in &templates {
            config.check_cancelled()?;
            sheets.push(SheetPlan::lay_out(request, &mut styles, &mut strings));
        }
        if sheets.is_empty() {
            sheets.push(SheetPlan::blank(BLANK_SHEET_NAME));
        }

        let stream = workbook_stream(&sheets, &styles, &strings);
        debug!(bytes = stream.len(), strings = strings.unique(), "workbook stream built");

        Ok(RenderedDocument {
            bytes: into_compound_file(&stream)?,
            pages: templates.iter().map(|request| request.sheet_name.clone()).collect(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum CellValue {
    Text(u32),
    Number(f64),
}

#[derive(Debug, Clone, Copy)]
struct Cell {
    xf: u16,
    value: CellValue,
}

#[derive(Debug, Clone, Copy)]
struct Merge {
    first_row: u32,
    last_row: u32,
    first_col: u16,
    last_col: u16,
}

struct SheetPlan<'a> {
    name: &'a str,
    rows: u32,
    // keyed by (row, col); later writes replace earlier ones
    cells: BTreeMap<(u32, u16), Cell>,
    merges: Vec<Merge>,
    picture: Option<SheetPicture<'a>>,
}

fn style(size_points: u16, bold: bool, align: HorizontalAlign) -> CellStyle {
    CellStyle {
        font: FontSpec { size_points, bold },
        align,
    }
}

impl<'a> SheetPlan<'a> {
    fn lay_out(request: &'a RequestTemplate, styles: &mut StyleTable, strings: &mut StringTable) -> Self {
        let layout = LEGACY_LAYOUT;
        let mut plan = SheetPlan {
            name: &request.sheet_name,
            rows: layout.row_count(request.parts.len()),
            cells: BTreeMap::new(),
            merges: Vec::new(),
            picture: Some(SheetPicture {
                bytes: &request.image,
                kind: request.image_kind,
                first_col: IMAGE_ANCHOR.first_col,
                first_row: IMAGE_ANCHOR.first_row as u16,
                end_col: IMAGE_ANCHOR.end_col_exclusive(),
                end_row: IMAGE_ANCHOR.end_row_exclusive() as u16,
            }),
        };

        let service = styles.xf(style(SERVICE_FONT_SIZE, true, HorizontalAlign::Center));
        let caption = styles.xf(style(CAPTION_FONT_SIZE, false, HorizontalAlign::Center));
        let label = styles.xf(style(BODY_FONT_SIZE, false, HorizontalAlign::Left));
        let value = styles.xf(style(BODY_FONT_SIZE, false, HorizontalAlign::Right));
        let parts_header = styles.xf(style(PARTS_HEADER_FONT_SIZE, false, HorizontalAlign::Center));
        let body = styles.xf(style(BODY_FONT_SIZE, false, HorizontalAlign::Center));

        plan.merged_text(SERVICE_ROW, &request.service_label, service, strings);
        plan.merged_text(CAPTION_ROW, &request.caption, caption, strings);
        plan.merges.push(Merge {
            first_row: IMAGE_ANCHOR.first_row,
            last_row: IMAGE_ANCHOR.last_visible_row(),
            first_col: IMAGE_ANCHOR.first_col,
            last_col: IMAGE_ANCHOR.end_col_exclusive() - 1,
        });

        plan.text(PLACED_ROW, 0, PLACED_LABEL, label, strings);
        plan.text(PLACED_ROW, 1, &request.placed_text(), value, strings);
        plan.text(COMPLETES_ROW, 0, COMPLETES_LABEL, label, strings);
        plan.text(COMPLETES_ROW, 1, &request.completes_text(), value, strings);

        plan.merged_text(layout.parts_header_row, PARTS_HEADER, parts_header, strings);
        plan.text(layout.column_header_row, 0, PART_NAME_HEADER, body, strings);
        plan.text(layout.column_header_row, 1, PART_COUNT_HEADER, body, strings);

        for (index, part) in request.parts.iter().enumerate() {
            let row = layout.part_row(index);
            plan.text(row, 0, &part.name, body, strings);
            plan.cells.insert(
                (row, 1),
                Cell {
                    xf: body,
                    value: CellValue::Number(f64::from(part.count)),
                },
            );
        }

        plan
    }

    fn blank(name: &'a str) -> Self {
        SheetPlan {
            name,
            rows: 0,
            cells: BTreeMap::new(),
            merges: Vec::new(),
            picture: None,
        }
    }

    fn text(&mut self, row: u32, col: u16, value: &str, xf: u16, strings: &mut StringTable) {
        let index = strings.intern(value);
        self.cells.insert(
            (row, col),
            Cell {
                xf,
                value: CellValue::Text(index),
            },
        );
    }

    fn merged_text(&mut self, row: u32, value: &str, xf: u16, strings: &mut StringTable) {
        self.text(row, 0, value, xf, strings);
        self.merges.push(Merge {
            first_row: row,
            last_row: row,
            first_col: 0,
            last_col: LAST_COL,
        });
    }

    /// `drawing` is the 1-based index among sheets that carry a picture.
    fn write(&self, drawing: u32, selected: bool) -> Vec<u8> {
        let mut out = RecordBuffer::default();
        out.bof(BOF_WORKSHEET);

        let mut colinfo = Payload::default();
        colinfo
            .u16(0)
            .u16(LAST_COL)
            .u16(COLUMN_WIDTH_UNITS)
            .u16(DEFAULT_CELL_XF)
            .u16(0)
            .u16(0);
        out.record(COLINFO, &colinfo.0);

        let mut dimensions = Payload::default();
        dimensions.u32(0).u32(self.rows).u16(0).u16(COLUMN_COUNT).u16(0);
        out.record(DIMENSIONS, &dimensions.0);

        for row in 0..self.rows {
            let mut record = Payload::default();
            record
                .u16(row as u16)
                .u16(0)
                .u16(COLUMN_COUNT)
                .u16(ROW_HEIGHT_TWIPS)
                .u16(0)
                .u16(0)
                // custom height, default cell format
                .u32(0x0000_0140 | (u32::from(DEFAULT_CELL_XF) << 16));
            out.record(ROW, &record.0);
        }

        for ((row, col), cell) in &self.cells {
            let mut record = Payload::default();
            record.u16(*row as u16).u16(*col).u16(cell.xf);
            match cell.value {
                CellValue::Text(index) => {
                    record.u32(index);
                    out.record(LABELSST, &record.0);
                }
                CellValue::Number(number) => {
                    record.f64(number);
                    out.record(NUMBER, &record.0);
                }
            }
        }

        if let Some(picture) = &self.picture {
            biff::sheet_drawing(&mut out, drawing, drawing, picture);
        }

        let mut window = Payload::default();
        window
            .u16(if selected { 0x06B6 } else { 0x02B6 })
            .u16(0)
            .u16(0)
            .u16(0x0040)
            .u16(0)
            .u16(0)
            .u16(0)
            .u16(0)
            .u16(0);
        out.record(WINDOW2, &window.0);

        if !self.merges.is_empty() {
            let mut merged = Payload::default();
            merged.u16(self.merges.len() as u16);
            for merge in &self.merges {
                merged
                    .u16(merge.first_row as u16)
                    .u16(merge.last_row as u16)
                    .u16(merge.first_col)
                    .u16(merge.last_col);
            }
            out.record(MERGEDCELLS, &merged.0);
        }

        out.eof();
        out.into_bytes()
    }
}

fn workbook_stream(sheets: &[SheetPlan<'_>], styles: &StyleTable, strings: &StringTable) -> Vec<u8> {
    let mut drawings = 0u32;
    let sheet_streams: Vec<Vec<u8>> = sheets
        .iter()
        .enumerate()
        .map(|(index, sheet)| {
            if sheet.picture.is_some() {
                drawings += 1;
            }
            sheet.write(drawings, index == 0)
        })
        .collect();

    let mut globals = RecordBuffer::default();
    globals.bof(BOF_GLOBALS);
    biff::codepage(&mut globals);
    biff::window1(&mut globals);
    styles.write(&mut globals);
    let offset_fields: Vec<usize> = sheets
        .iter()
        .map(|sheet| biff::boundsheet(&mut globals, sheet.name))
        .collect();
    let pictures: Vec<SheetPicture<'_>> = sheets.iter().filter_map(|sheet| sheet.picture.clone()).collect();
    biff::drawing_group(&mut globals, &pictures);
    strings.write(&mut globals);
    globals.eof();

    let mut position = globals.len();
    for (field, sheet) in offset_fields.iter().zip(&sheet_streams) {
        biff::patch_u32(&mut globals, *field, position as u32);
        position += sheet.len();
    }

    let mut stream = globals.into_bytes();
    for sheet in sheet_streams {
        stream.extend(sheet);
    }
    if stream.len() < MIN_STREAM_LEN {
        // whole empty record headers, so the tail still parses as records
        let padding = (MIN_STREAM_LEN - stream.len()).div_ceil(4) * 4;
        stream.resize(stream.len() + padding, 0);
    }
    stream
}

fn into_compound_file(stream: &[u8]) -> Result<Vec<u8>> {
    // 512-byte sectors; readers of legacy workbooks reject version 4 files
    let mut compound = cfb::CompoundFile::create_with_version(cfb::Version::V3, Cursor::new(Vec::new()))?;
    {
        let mut workbook = compound.create_stream(WORKBOOK_STREAM)?;
        workbook.write_all(stream)?;
        workbook.flush()?;
    }
    compound.flush()?;
    Ok(compound.into_inner().into_inner())
}
