//! Plain in-memory snapshots of the shop entities.
//!
//! Reports and the request list never mutate these values; edits go through
//! [`snapshot::ShopSnapshot`], which owns the normalised collections.

pub mod snapshot;
pub mod validate;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::autoshop::error::{ReportError, Result};

/// Identifier shared by every persisted entity.
pub type EntityId = i64;

/// Label rendered instead of a price when nothing is billable.
pub const FREE_LABEL: &str = "бесплатно";

/// Class colours for classes 1-3; everything else uses [`DEFAULT_CLASS_COLOR`].
pub const CLASS_COLORS: [&str; 3] = ["#AFEEEE", "#FFDAE0", "#EDE0BF"];
pub const DEFAULT_CLASS_COLOR: &str = "#DAD6CD";

/// A person acting as a requester or a vehicle owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: EntityId,
    pub name: String,
    pub last_name: String,
}

impl Person {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleBrand {
    pub id: EntityId,
    pub brand: String,
}

/// Kind of work requested, with the multiplier applied to the parts total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceType {
    pub id: EntityId,
    pub name: String,
    pub base_cost: Decimal,
    /// Whether requests of this type carry a parts list at all.
    #[serde(default)]
    pub requires_parts: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: EntityId,
    pub brand: VehicleBrand,
    pub name: String,
    pub state_number: String,
    /// Vehicle class, expected in 1..=5. Zero means unset.
    pub class: u8,
    /// Image path relative to the resource root.
    pub image: Option<String>,
    pub owner: Person,
}

impl Vehicle {
    /// State number split into its series, digits and region groups.
    pub fn divided_state_number(&self) -> String {
        divide_state_number(&self.state_number)
    }

    /// Hex colour used to code the vehicle class in lists and reports.
    pub fn class_color(&self) -> &'static str {
        class_color(self.class)
    }

    pub fn price_modifier(&self) -> Decimal {
        class_price_modifier(self.class)
    }

    /// `"<name> — <brand>"`, the caption shown above the vehicle image.
    pub fn caption(&self) -> String {
        format!("{} — {}", self.name, self.brand.brand)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    pub id: EntityId,
    pub name: String,
    pub price: Decimal,
}

/// A part attached to a request together with the required quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartLine {
    pub part: Part,
    pub count: u32,
}

impl PartLine {
    pub fn subtotal(&self) -> Decimal {
        self.part.price * Decimal::from(self.count)
    }
}

/// One repair job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: EntityId,
    pub service_type: ServiceType,
    pub vehicle: Vehicle,
    pub requester: Person,
    pub placed_on: NaiveDate,
    pub completes_on: Option<NaiveDate>,
    #[serde(default)]
    pub lines: Vec<PartLine>,
}

impl ServiceRequest {
    pub fn parts_total(&self) -> Decimal {
        self.lines.iter().map(PartLine::subtotal).sum()
    }

    /// Parts total scaled by the service base cost and the vehicle class modifier.
    pub fn total_price(&self) -> Decimal {
        self.parts_total() * self.service_type.base_cost * self.vehicle.price_modifier()
    }

    pub fn total_quantity(&self) -> u64 {
        self.lines.iter().map(|line| u64::from(line.count)).sum()
    }

    /// True when the completion date is set and lies strictly before `now`.
    pub fn is_completed_before(&self, now: NaiveDateTime) -> bool {
        self.completes_on
            .is_some_and(|date| date.and_time(NaiveTime::MIN) < now)
    }
}

/// Formats a date the way every report and list shows it (`dd.mm.yyyy`).
pub fn format_date(date: NaiveDate) -> String {
    date.format("%d.%m.%Y").to_string()
}

/// Renders a price with two decimals, or the free label when nothing is owed.
pub fn price_label(price: Decimal) -> String {
    if price <= Decimal::ZERO {
        FREE_LABEL.to_string()
    } else {
        format!("{:.2}", price.round_dp(2))
    }
}

pub fn class_color(class: u8) -> &'static str {
    match class {
        1..=3 => CLASS_COLORS[usize::from(class - 1)],
        _ => DEFAULT_CLASS_COLOR,
    }
}

pub fn class_price_modifier(class: u8) -> Decimal {
    match class {
        2 => Decimal::new(110, 2),
        3 => Decimal::new(125, 2),
        4 => Decimal::new(150, 2),
        5 => Decimal::new(200, 2),
        _ => Decimal::ONE,
    }
}

/// Splits `A123BC777` into `A 123 BC 777`. Plates that do not follow the
/// letter/digits/letters/region pattern come back trimmed but otherwise intact.
pub fn divide_state_number(raw: &str) -> String {
    let trimmed = raw.trim();
    let chars: Vec<char> = trimmed.chars().collect();
    if !(8..=9).contains(&chars.len()) {
        return trimmed.to_string();
    }

    let letters = |range: &[char]| range.iter().all(|ch| ch.is_alphabetic());
    let digits = |range: &[char]| range.iter().all(|ch| ch.is_ascii_digit());
    if !(letters(&chars[0..1]) && digits(&chars[1..4]) && letters(&chars[4..6]) && digits(&chars[6..]))
    {
        return trimmed.to_string();
    }

    let group = |range: &[char]| range.iter().collect::<String>();
    format!(
        "{} {} {} {}",
        group(&chars[0..1]),
        group(&chars[1..4]),
        group(&chars[4..6]),
        group(&chars[6..])
    )
}

/// RGB triple converted from a `#RRGGBB` string for styling APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Rgb {
    pub fn from_hex(hex: &str) -> Result<Self> {
        let digits = hex.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(ReportError::InvalidData(format!("invalid colour '{hex}'")));
        }
        let channel = |offset: usize| {
            u8::from_str_radix(&digits[offset..offset + 2], 16)
                .map_err(|_| ReportError::InvalidData(format!("invalid colour '{hex}'")))
        };
        Ok(Self {
            red: channel(0)?,
            green: channel(2)?,
            blue: channel(4)?,
        })
    }

    pub fn to_u32(self) -> u32 {
        (u32::from(self.red) << 16) | (u32::from(self.green) << 8) | u32::from(self.blue)
    }

    /// Upper-case hex digits without the leading `#`.
    pub fn to_hex(self) -> String {
        format!("{:02X}{:02X}{:02X}", self.red, self.green, self.blue)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn person(id: EntityId) -> Person {
        Person {
            id,
            name: "Иван".into(),
            last_name: "Петров".into(),
        }
    }

    pub fn vehicle(id: EntityId, name: &str, class: u8) -> Vehicle {
        Vehicle {
            id,
            brand: VehicleBrand {
                id: 1,
                brand: "Lada".into(),
            },
            name: name.into(),
            state_number: format!("А{:03}ВС777", id),
            class,
            image: None,
            owner: person(1),
        }
    }

    pub fn service(name: &str) -> ServiceType {
        ServiceType {
            id: 1,
            name: name.into(),
            base_cost: Decimal::ONE,
            requires_parts: true,
        }
    }

    pub fn line(id: EntityId, name: &str, price: i64, count: u32) -> PartLine {
        PartLine {
            part: Part {
                id,
                name: name.into(),
                price: Decimal::from(price),
            },
            count,
        }
    }

    pub fn request(id: EntityId, vehicle_name: &str, completes_on: Option<NaiveDate>) -> ServiceRequest {
        ServiceRequest {
            id,
            service_type: service("Ремонт двигателя."),
            vehicle: vehicle(id, vehicle_name, 1),
            requester: person(2),
            placed_on: NaiveDate::from_ymd_opt(2024, 1, 10).expect("valid date"),
            completes_on,
            lines: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn total_price_combines_parts_service_and_class() {
        let mut request = request(1, "Lada Vesta", None);
        request.lines = vec![line(1, "Фильтр", 100, 2), line(2, "Масло", 50, 1)];
        request.service_type.base_cost = Decimal::new(15, 1);
        request.vehicle.class = 3;

        // (200 + 50) * 1.5 * 1.25
        assert_eq!(request.total_price(), Decimal::new(46875, 2));
        assert_eq!(request.total_quantity(), 3);
    }

    #[test]
    fn request_without_parts_is_free() {
        let request = request(1, "Lada Vesta", None);
        assert_eq!(price_label(request.total_price()), FREE_LABEL);
        assert_eq!(price_label(Decimal::new(-5, 0)), FREE_LABEL);
        assert_eq!(price_label(Decimal::new(12345, 1)), "1234.50");
    }

    #[test]
    fn class_palette_falls_back_to_default() {
        assert_eq!(class_color(1), "#AFEEEE");
        assert_eq!(class_color(2), "#FFDAE0");
        assert_eq!(class_color(3), "#EDE0BF");
        assert_eq!(class_color(4), DEFAULT_CLASS_COLOR);
        assert_eq!(class_color(0), DEFAULT_CLASS_COLOR);
        assert_eq!(class_price_modifier(9), Decimal::ONE);
    }

    #[test]
    fn hex_colour_converts_to_rgb() {
        let rgb = Rgb::from_hex("#AFEEEE").unwrap();
        assert_eq!((rgb.red, rgb.green, rgb.blue), (0xAF, 0xEE, 0xEE));
        assert_eq!(rgb.to_u32(), 0xAFEEEE);
        assert_eq!(rgb.to_hex(), "AFEEEE");
        assert!(Rgb::from_hex("#GG0000").is_err());
        assert!(Rgb::from_hex("#FFF").is_err());
    }

    #[test]
    fn state_number_is_divided_into_groups() {
        assert_eq!(divide_state_number("А123ВС777"), "А 123 ВС 777");
        assert_eq!(divide_state_number("А123ВС77"), "А 123 ВС 77");
        assert_eq!(divide_state_number(" XYZ "), "XYZ");
        assert_eq!(divide_state_number("123456789"), "123456789");
    }

    #[test]
    fn completion_cutoff_is_strict() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let now = today.and_hms_opt(12, 0, 0).unwrap();

        assert!(request(1, "A", Some(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()))
            .is_completed_before(now));
        assert!(request(1, "A", Some(today)).is_completed_before(now));
        assert!(!request(1, "A", Some(today)).is_completed_before(today.and_time(NaiveTime::MIN)));
        assert!(!request(1, "A", None).is_completed_before(now));
    }
}
