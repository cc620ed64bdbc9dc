//! Data every report format draws from, extracted once per request, plus the
//! spreadsheet grid shared by both spreadsheet writers.

use std::collections::HashSet;

use chrono::NaiveDate;

use crate::autoshop::error::Result;
use crate::autoshop::model::{Rgb, ServiceRequest, format_date, price_label};
use crate::autoshop::report::ReportConfig;
use crate::autoshop::resources::ImageKind;

pub const MAX_SHEET_NAME_CHARS: usize = 31;
/// Sole sheet of a spreadsheet report rendered from no requests.
pub const BLANK_SHEET_NAME: &str = "Лист1";
const FALLBACK_SHEET_NAME: &str = "Заказ";
const UNKNOWN_DATE: &str = "Неизвестно";

/// Column width in 1/256 of a character, as stored by the legacy format.
pub const COLUMN_WIDTH_UNITS: u16 = 7500;
/// Row height in twips (1/20 of a point).
pub const ROW_HEIGHT_TWIPS: u16 = 500;
pub const COLUMN_COUNT: u16 = 2;

pub const SERVICE_ROW: u32 = 0;
pub const CAPTION_ROW: u32 = 1;
pub const PLACED_ROW: u32 = 10;
pub const COMPLETES_ROW: u32 = 11;

/// Pixel box the picture is scaled into: two 29.3-character columns by eight
/// 25pt rows.
pub const IMAGE_BOX_WIDTH_PX: u32 = 420;
pub const IMAGE_BOX_HEIGHT_PX: u32 = 264;

pub const SERVICE_FONT_SIZE: u16 = 26;
pub const CAPTION_FONT_SIZE: u16 = 20;
pub const PRICE_FONT_SIZE: u16 = 22;
pub const PARTS_HEADER_FONT_SIZE: u16 = 20;
pub const BODY_FONT_SIZE: u16 = 16;

pub const PARTS_HEADER: &str = "Запчасти";
pub const PART_NAME_HEADER: &str = "Название запчасти:";
pub const PART_COUNT_HEADER: &str = "Количество:";
pub const PLACED_LABEL: &str = "Дата размещения:";
pub const COMPLETES_LABEL: &str = "Дата выполнения:";

pub fn column_width_chars() -> f64 {
    f64::from(COLUMN_WIDTH_UNITS) / 256.0
}

pub fn row_height_points() -> f64 {
    f64::from(ROW_HEIGHT_TWIPS) / 20.0
}

/// Picture placement in sheet rows. The end row is exclusive: the last
/// visible slice of the picture sits in row `end_row_exclusive() - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageAnchor {
    pub first_row: u32,
    pub rows: u32,
    pub first_col: u16,
    pub cols: u16,
}

pub const IMAGE_ANCHOR: ImageAnchor = ImageAnchor {
    first_row: 2,
    rows: 8,
    first_col: 0,
    cols: COLUMN_COUNT,
};

impl ImageAnchor {
    pub fn end_row_exclusive(&self) -> u32 {
        self.first_row + self.rows
    }

    pub fn last_visible_row(&self) -> u32 {
        self.end_row_exclusive() - 1
    }

    pub fn end_col_exclusive(&self) -> u16 {
        self.first_col + self.cols
    }
}

/// Row positions that differ between the two spreadsheet generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetLayout {
    pub price_row: Option<u32>,
    pub parts_header_row: u32,
    pub column_header_row: u32,
    pub first_part_row: u32,
}

pub const MODERN_LAYOUT: SheetLayout = SheetLayout {
    price_row: Some(12),
    parts_header_row: 13,
    column_header_row: 14,
    first_part_row: 15,
};

// The legacy grid has no price row and starts parts on the column header row,
// so the first part replaces the headers whenever parts exist.
pub const LEGACY_LAYOUT: SheetLayout = SheetLayout {
    price_row: None,
    parts_header_row: 12,
    column_header_row: 13,
    first_part_row: 13,
};

impl SheetLayout {
    pub fn part_row(&self, index: usize) -> u32 {
        self.first_part_row + index as u32
    }

    /// Number of rows a sheet with `parts` part lines occupies.
    pub fn row_count(&self, parts: usize) -> u32 {
        (self.column_header_row + 1).max(self.first_part_row + parts as u32)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartRow {
    pub name: String,
    pub count: u32,
}

/// Everything a report writer needs to lay out one request.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    pub sheet_name: String,
    pub service_label: String,
    pub caption: String,
    pub class_color: Rgb,
    pub image: Vec<u8>,
    pub image_kind: ImageKind,
    pub placed_on: NaiveDate,
    pub completes_on: Option<NaiveDate>,
    pub price: String,
    pub parts: Vec<PartRow>,
}

impl RequestTemplate {
    /// Extracts the template of one request. Sheet names are left to the
    /// caller; see [`extract_all`].
    pub fn extract(request: &ServiceRequest, config: &ReportConfig) -> Result<Self> {
        let image = config
            .resources
            .load_image(request.vehicle.image.as_deref())?;
        let image_kind = ImageKind::detect(&image)?;

        Ok(Self {
            sheet_name: request.vehicle.divided_state_number(),
            service_label: request.service_type.name.trim_end_matches('.').to_string(),
            caption: request.vehicle.caption(),
            class_color: Rgb::from_hex(request.vehicle.class_color())?,
            image,
            image_kind,
            placed_on: request.placed_on,
            completes_on: request.completes_on,
            price: price_label(request.total_price()),
            parts: request
                .lines
                .iter()
                .map(|line| PartRow {
                    name: line.part.name.clone(),
                    count: line.count,
                })
                .collect(),
        })
    }

    /// `dd.mm.yyyy.` as shown next to [`PLACED_LABEL`].
    pub fn placed_text(&self) -> String {
        format!("{}.", format_date(self.placed_on))
    }

    pub fn completes_text(&self) -> String {
        match self.completes_on {
            Some(date) => format!("{}.", format_date(date)),
            None => format!("{UNKNOWN_DATE}."),
        }
    }

    pub fn price_line(&self) -> String {
        format!("Полная стоимость: {}.", self.price)
    }

    pub fn date_lines(&self) -> (String, String) {
        let render = |date: Option<NaiveDate>| {
            date.map(format_date)
                .unwrap_or_else(|| UNKNOWN_DATE.to_string())
        };
        (
            format!("Дата начала: {}", render(Some(self.placed_on))),
            format!("Дата конца: {}", render(self.completes_on)),
        )
    }

    pub fn total_price_line(&self) -> String {
        format!("Итоговая стоимость заказа: {}.", self.price)
    }

    pub fn parts_summary(&self) -> String {
        parts_summary(&self.parts)
    }
}

/// Extracts every request in order, honouring the cancellation flag and
/// assigning unique sheet names.
pub fn extract_all(requests: &[ServiceRequest], config: &ReportConfig) -> Result<Vec<RequestTemplate>> {
    let mut names = SheetNameRegistry::default();
    let mut templates = Vec::with_capacity(requests.len());
    for request in requests {
        config.check_cancelled()?;
        let mut template = RequestTemplate::extract(request, config)?;
        template.sheet_name = names.assign(&template.sheet_name);
        templates.push(template);
    }
    Ok(templates)
}

/// `Детали обслуживания: a (кол-во: 1), b (кол-во: 2).`
pub fn parts_summary(parts: &[PartRow]) -> String {
    if parts.is_empty() {
        return "Детали обслуживания: отсутствуют.".to_string();
    }
    let items: Vec<String> = parts
        .iter()
        .map(|part| format!("{} (кол-во: {})", part.name, part.count))
        .collect();
    format!("Детали обслуживания: {}.", items.join(", "))
}

/// Hands out sheet names that are legal and unique within one workbook.
/// Uniqueness is case-insensitive, matching spreadsheet applications.
#[derive(Debug, Default)]
pub struct SheetNameRegistry {
    used: HashSet<String>,
}

impl SheetNameRegistry {
    pub fn assign(&mut self, raw: &str) -> String {
        let base = sanitize_sheet_name(raw);
        if self.used.insert(base.to_lowercase()) {
            return base;
        }

        let mut counter = 1usize;
        loop {
            let suffix = format!(" — {counter}");
            let prefix = truncate_chars(&base, MAX_SHEET_NAME_CHARS - suffix.chars().count());
            let candidate = format!("{prefix}{suffix}");
            if self.used.insert(candidate.to_lowercase()) {
                return candidate;
            }
            counter += 1;
        }
    }
}

pub fn sanitize_sheet_name(raw: &str) -> String {
    let invalid = [':', '\\', '/', '?', '*', '[', ']'];
    let sanitized: String = raw
        .chars()
        .map(|ch| {
            if invalid.contains(&ch) || ch.is_control() {
                '_'
            } else {
                ch
            }
        })
        .collect();

    // Leading or trailing apostrophes are rejected by spreadsheet applications.
    let sanitized = sanitized.trim().trim_matches('\'').trim();
    if sanitized.is_empty() {
        return FALLBACK_SHEET_NAME.to_string();
    }
    truncate_chars(sanitized, MAX_SHEET_NAME_CHARS)
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}
