//! Entry checks applied before an entity is persisted. Each check collects every
//! problem instead of stopping at the first one.

use rust_decimal::Decimal;

use crate::autoshop::error::{Result, ValidationErrors};
use crate::autoshop::model::{Part, Person, ServiceRequest, Vehicle};

/// Brand name that any vehicle name is allowed under.
pub const CATCH_ALL_BRAND: &str = "Прочие";

/// Required length of a stored state number.
pub const STATE_NUMBER_LEN: usize = 9;

pub fn validate_person(person: &Person) -> Result<()> {
    let mut errors = ValidationErrors::default();
    if person.name.trim().is_empty() {
        errors.push("Имя клиента не введено.");
    }
    if person.last_name.trim().is_empty() {
        errors.push("Фамилия клиента не введена.");
    }
    errors.into_result()
}

/// Checks a new part against the parts already stored.
pub fn validate_part(part: &Part, existing: &[Part]) -> Result<()> {
    let mut errors = ValidationErrors::default();
    if part.name.trim().is_empty() {
        errors.push("Запчасти необходимо задать название.");
    } else if existing
        .iter()
        .any(|other| other.id != part.id && other.name == part.name)
    {
        errors.push("Запчасть с таким названием уже определена в системе.");
    }
    if part.price < Decimal::ZERO {
        errors.push("Цена запчасти не может быть отрицательной.");
    }
    errors.into_result()
}

pub fn validate_vehicle(vehicle: &Vehicle) -> Result<()> {
    let mut errors = ValidationErrors::default();
    let brand = vehicle.brand.brand.trim();
    if brand.is_empty() {
        errors.push("Не указан бренд машины.");
    } else if brand != CATCH_ALL_BRAND && !vehicle.name.contains(brand) {
        errors.push("Название машины не соответствует бренду.");
    }
    if vehicle.owner.name.trim().is_empty() && vehicle.owner.last_name.trim().is_empty() {
        errors.push("Не указан владелец машины.");
    }
    if vehicle.state_number.chars().count() != STATE_NUMBER_LEN {
        errors.push("Введенный номер некорректен.");
    }
    if !(1..=5).contains(&vehicle.class) {
        errors.push("Некорректный класс машины.");
    }
    errors.into_result()
}

pub fn validate_request(request: &ServiceRequest) -> Result<()> {
    let mut errors = ValidationErrors::default();
    if request
        .completes_on
        .is_some_and(|completes_on| completes_on < request.placed_on)
    {
        errors.push("Дата выполнения заказа не может быть раньше его размещения.");
    }
    if request.lines.iter().any(|line| line.count < 1) {
        errors.push("Количество запчастей должно быть не меньше одного.");
    }
    errors.into_result()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::autoshop::error::ReportError;
    use crate::autoshop::model::fixtures;

    fn issues(result: Result<()>) -> Vec<String> {
        match result {
            Err(ReportError::Validation(errors)) => errors.issues,
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn person_requires_both_names() {
        let person = Person {
            id: 1,
            name: " ".into(),
            last_name: String::new(),
        };
        assert_eq!(issues(validate_person(&person)).len(), 2);
        assert!(validate_person(&fixtures::person(1)).is_ok());
    }

    #[test]
    fn part_names_are_unique_and_prices_non_negative() {
        let existing = vec![fixtures::line(1, "Фильтр", 10, 1).part];
        let duplicate = Part {
            id: 2,
            name: "Фильтр".into(),
            price: Decimal::from(-1),
        };
        assert_eq!(issues(validate_part(&duplicate, &existing)).len(), 2);

        let renamed = Part {
            name: "Ремень".into(),
            price: Decimal::ZERO,
            ..duplicate
        };
        assert!(validate_part(&renamed, &existing).is_ok());
    }

    #[test]
    fn vehicle_checks_brand_plate_and_class() {
        let mut vehicle = fixtures::vehicle(1, "Lada Vesta", 1);
        assert!(validate_vehicle(&vehicle).is_ok());

        vehicle.name = "Camry".into();
        vehicle.state_number = "А12".into();
        vehicle.class = 7;
        assert_eq!(issues(validate_vehicle(&vehicle)).len(), 3);

        vehicle.brand.brand = CATCH_ALL_BRAND.into();
        vehicle.state_number = "А123ВС777".into();
        vehicle.class = 5;
        assert!(validate_vehicle(&vehicle).is_ok());
    }

    #[test]
    fn completion_cannot_precede_placement() {
        let request = fixtures::request(1, "Lada", NaiveDate::from_ymd_opt(2023, 12, 31));
        assert_eq!(issues(validate_request(&request)).len(), 1);

        let request = fixtures::request(1, "Lada", NaiveDate::from_ymd_opt(2024, 1, 10));
        assert!(validate_request(&request).is_ok());
    }
}
