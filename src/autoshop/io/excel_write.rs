use rust_xlsxwriter::{Color, Format, FormatAlign, Image, ObjectMovement, Workbook, Worksheet};
use tracing::{debug, instrument};

use crate::autoshop::error::Result;
use crate::autoshop::model::ServiceRequest;
use crate::autoshop::report::template::{
    self, BLANK_SHEET_NAME, BODY_FONT_SIZE, CAPTION_FONT_SIZE, CAPTION_ROW, COLUMN_COUNT, COMPLETES_LABEL,
    COMPLETES_ROW, IMAGE_ANCHOR, IMAGE_BOX_HEIGHT_PX, IMAGE_BOX_WIDTH_PX, MODERN_LAYOUT,
    PART_COUNT_HEADER, PART_NAME_HEADER, PARTS_HEADER, PARTS_HEADER_FONT_SIZE, PLACED_LABEL,
    PLACED_ROW, PRICE_FONT_SIZE, RequestTemplate, SERVICE_FONT_SIZE, SERVICE_ROW,
};
use crate::autoshop::report::{DocumentAssembler, RenderedDocument, ReportConfig};

const LAST_COL: u16 = COLUMN_COUNT - 1;

/// Writes `.xlsx` workbooks with one sheet per request.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpreadsheetAssembler;

impl DocumentAssembler for SpreadsheetAssembler {
    #[instrument(level = "debug", skip_all, fields(requests = requests.len()))]
    fn assemble(&self, requests: &[ServiceRequest], config: &ReportConfig) -> Result<RenderedDocument> {
        let templates = template::extract_all(requests, config)?;
        let mut workbook = Workbook::new();

        for request in &templates {
            config.check_cancelled()?;
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(&request.sheet_name)?;
            write_sheet(worksheet, request, &config.font_family)?;
            debug!(sheet = %request.sheet_name, parts = request.parts.len(), "sheet laid out");
        }
        if templates.is_empty() {
            workbook.add_worksheet().set_name(BLANK_SHEET_NAME)?;
        }

        Ok(RenderedDocument {
            bytes: workbook.save_to_buffer()?,
            pages: templates.into_iter().map(|request| request.sheet_name).collect(),
        })
    }
}

fn text_format(font_family: &str, size: u16, align: FormatAlign) -> Format {
    Format::new()
        .set_font_name(font_family)
        .set_font_size(f64::from(size))
        .set_align(align)
        .set_align(FormatAlign::VerticalCenter)
}

fn write_sheet(worksheet: &mut Worksheet, request: &RequestTemplate, font_family: &str) -> Result<()> {
    let layout = MODERN_LAYOUT;
    for col in 0..COLUMN_COUNT {
        worksheet.set_column_width(col, template::column_width_chars())?;
    }
    for row in 0..layout.row_count(request.parts.len()) {
        worksheet.set_row_height(row, template::row_height_points())?;
    }

    let service = text_format(font_family, SERVICE_FONT_SIZE, FormatAlign::Center).set_bold();
    worksheet.merge_range(SERVICE_ROW, 0, SERVICE_ROW, LAST_COL, &request.service_label, &service)?;

    let caption = text_format(font_family, CAPTION_FONT_SIZE, FormatAlign::Center)
        .set_font_color(Color::RGB(request.class_color.to_u32()));
    worksheet.merge_range(CAPTION_ROW, 0, CAPTION_ROW, LAST_COL, &request.caption, &caption)?;

    let image_block = Format::new();
    worksheet.merge_range(
        IMAGE_ANCHOR.first_row,
        IMAGE_ANCHOR.first_col,
        IMAGE_ANCHOR.last_visible_row(),
        IMAGE_ANCHOR.end_col_exclusive() - 1,
        "",
        &image_block,
    )?;
    let mut image = Image::new_from_buffer(&request.image)?;
    image
        .set_scale_to_size(IMAGE_BOX_WIDTH_PX, IMAGE_BOX_HEIGHT_PX, false)
        .set_object_movement(ObjectMovement::MoveAndSizeWithCells);
    worksheet.insert_image(IMAGE_ANCHOR.first_row, IMAGE_ANCHOR.first_col, &image)?;

    let label = text_format(font_family, BODY_FONT_SIZE, FormatAlign::Left);
    let value = text_format(font_family, BODY_FONT_SIZE, FormatAlign::Right);
    worksheet.write_string_with_format(PLACED_ROW, 0, PLACED_LABEL, &label)?;
    worksheet.write_string_with_format(PLACED_ROW, 1, request.placed_text(), &value)?;
    worksheet.write_string_with_format(COMPLETES_ROW, 0, COMPLETES_LABEL, &label)?;
    worksheet.write_string_with_format(COMPLETES_ROW, 1, request.completes_text(), &value)?;

    if let Some(price_row) = layout.price_row {
        let price = text_format(font_family, PRICE_FONT_SIZE, FormatAlign::Center);
        worksheet.merge_range(price_row, 0, price_row, LAST_COL, &request.price_line(), &price)?;
    }

    let parts_header = text_format(font_family, PARTS_HEADER_FONT_SIZE, FormatAlign::Center);
    worksheet.merge_range(
        layout.parts_header_row,
        0,
        layout.parts_header_row,
        LAST_COL,
        PARTS_HEADER,
        &parts_header,
    )?;

    let body = text_format(font_family, BODY_FONT_SIZE, FormatAlign::Center);
    worksheet.write_string_with_format(layout.column_header_row, 0, PART_NAME_HEADER, &body)?;
    worksheet.write_string_with_format(layout.column_header_row, 1, PART_COUNT_HEADER, &body)?;

    for (index, part) in request.parts.iter().enumerate() {
        let row = layout.part_row(index);
        worksheet.write_string_with_format(row, 0, &part.name, &body)?;
        worksheet.write_number_with_format(row, 1, f64::from(part.count), &body)?;
    }

    Ok(())
}
