//! Normalised shop data as it comes out of persistence.
//!
//! The snapshot is the only place where entities are edited. Everything that
//! renders or filters works on the joined [`ServiceRequest`] values produced by
//! [`ShopSnapshot::resolve_requests`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::autoshop::error::{ReportError, Result};
use crate::autoshop::model::validate::{validate_part, validate_request};
use crate::autoshop::model::{
    EntityId, Part, PartLine, Person, ServiceRequest, ServiceType, Vehicle, VehicleBrand,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleRecord {
    pub id: EntityId,
    pub brand_id: EntityId,
    pub name: String,
    pub state_number: String,
    pub class: u8,
    #[serde(default)]
    pub image: Option<String>,
    pub owner_id: EntityId,
}

/// Join row binding a part to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRecord {
    pub request_id: EntityId,
    pub part_id: EntityId,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: EntityId,
    pub service_type_id: EntityId,
    pub vehicle_id: EntityId,
    pub requester_id: EntityId,
    pub placed_on: NaiveDate,
    #[serde(default)]
    pub completes_on: Option<NaiveDate>,
}

/// The full entity graph, keyed by identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopSnapshot {
    #[serde(default)]
    pub people: Vec<Person>,
    #[serde(default)]
    pub brands: Vec<VehicleBrand>,
    #[serde(default)]
    pub service_types: Vec<ServiceType>,
    #[serde(default)]
    pub parts: Vec<Part>,
    #[serde(default)]
    pub vehicles: Vec<VehicleRecord>,
    #[serde(default)]
    pub requests: Vec<RequestRecord>,
    #[serde(default)]
    pub lines: Vec<LineRecord>,
}

/// Exact set of join rows to touch when a request's parts list is edited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineChanges {
    pub insert: Vec<LineRecord>,
    pub update: Vec<LineRecord>,
    pub remove: Vec<LineRecord>,
}

impl LineChanges {
    pub fn is_empty(&self) -> bool {
        self.insert.is_empty() && self.update.is_empty() && self.remove.is_empty()
    }
}

impl ShopSnapshot {
    /// Reads a snapshot from a JSON file.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ReportError::MissingInput(path.to_path_buf()));
        }
        let source = fs::read_to_string(path)?;
        let snapshot: ShopSnapshot = serde_json::from_str(&source)?;
        info!(
            requests = snapshot.requests.len(),
            parts = snapshot.parts.len(),
            "loaded shop snapshot"
        );
        Ok(snapshot)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Joins every request with its service type, vehicle, requester and parts.
    /// Join rows that point at an unknown request, or bind the same part to a
    /// request twice, are rejected.
    pub fn resolve_requests(&self) -> Result<Vec<ServiceRequest>> {
        let index = Index::new(self);

        let mut lines_by_request: BTreeMap<EntityId, Vec<PartLine>> = BTreeMap::new();
        let mut seen = HashSet::new();
        for line in &self.lines {
            if !seen.insert((line.request_id, line.part_id)) {
                return Err(duplicate_line(line));
            }
            lines_by_request
                .entry(line.request_id)
                .or_default()
                .push(index.line(line)?);
        }

        let mut resolved = Vec::with_capacity(self.requests.len());
        for record in &self.requests {
            let lines = lines_by_request.remove(&record.id).unwrap_or_default();
            resolved.push(index.request(record, lines)?);
        }

        if let Some(orphan) = lines_by_request.keys().next() {
            return Err(ReportError::InvalidData(format!(
                "dangling reference to request {orphan}"
            )));
        }

        debug!(count = resolved.len(), "resolved service requests");
        Ok(resolved)
    }

    /// Names of all service types, in storage order.
    pub fn service_type_names(&self) -> Vec<String> {
        self.service_types.iter().map(|t| t.name.clone()).collect()
    }

    /// Stores a new part after checking its name and price against the catalogue.
    pub fn add_part(&mut self, part: Part) -> Result<()> {
        validate_part(&part, &self.parts)?;
        if self.parts.iter().any(|p| p.id == part.id) {
            return Err(ReportError::InvalidData(format!("part {} already exists", part.id)));
        }
        self.parts.push(part);
        Ok(())
    }

    /// Removes a request together with every line item that references it.
    pub fn remove_request(&mut self, request_id: EntityId) -> Result<RequestRecord> {
        let position = self
            .requests
            .iter()
            .position(|r| r.id == request_id)
            .ok_or_else(|| ReportError::InvalidData(format!("unknown request {request_id}")))?;
        let removed = self.requests.remove(position);
        self.lines.retain(|line| line.request_id != request_id);
        Ok(removed)
    }

    /// Replaces the parts list of a request with `edited`, touching only the
    /// rows that actually change.
    pub fn apply_line_edit(
        &mut self,
        request_id: EntityId,
        edited: &[LineRecord],
    ) -> Result<LineChanges> {
        let request = self
            .requests
            .iter()
            .find(|r| r.id == request_id)
            .ok_or_else(|| ReportError::InvalidData(format!("unknown request {request_id}")))?;
        let takes_parts = self
            .service_types
            .iter()
            .find(|t| t.id == request.service_type_id)
            .is_some_and(|t| t.requires_parts);

        let edited: Vec<LineRecord> = if takes_parts {
            edited
                .iter()
                .map(|line| LineRecord {
                    request_id,
                    ..*line
                })
                .collect()
        } else {
            Vec::new()
        };
        {
            let index = Index::new(self);
            let lines = edited
                .iter()
                .map(|line| index.line(line))
                .collect::<Result<Vec<_>>>()?;
            validate_request(&index.request(request, lines)?)?;
        }

        let existing: Vec<LineRecord> = self
            .lines
            .iter()
            .filter(|line| line.request_id == request_id)
            .copied()
            .collect();
        let changes = reconcile_lines(&existing, &edited)?;

        self.lines.retain(|line| {
            line.request_id != request_id || !changes.remove.contains(line)
        });
        for update in &changes.update {
            if let Some(line) = self
                .lines
                .iter_mut()
                .find(|l| l.request_id == request_id && l.part_id == update.part_id)
            {
                line.count = update.count;
            }
        }
        self.lines.extend(changes.insert.iter().copied());

        debug!(
            request_id,
            inserted = changes.insert.len(),
            updated = changes.update.len(),
            removed = changes.remove.len(),
            "reconciled request parts"
        );
        Ok(changes)
    }
}

/// Computes the rows to insert, update and remove so that `existing` becomes
/// `edited`. Lines are keyed by part id; a part listed twice in `edited` keeps
/// its last quantity. `existing` must bind each part at most once.
pub fn reconcile_lines(existing: &[LineRecord], edited: &[LineRecord]) -> Result<LineChanges> {
    let mut seen = HashSet::new();
    if let Some(line) = existing.iter().find(|line| !seen.insert(line.part_id)) {
        return Err(duplicate_line(line));
    }

    let mut target: BTreeMap<EntityId, LineRecord> = BTreeMap::new();
    for line in edited {
        if line.count < 1 {
            return Err(ReportError::InvalidData(format!(
                "quantity for part {} must be at least 1",
                line.part_id
            )));
        }
        target.insert(line.part_id, *line);
    }

    let mut changes = LineChanges::default();
    for line in existing {
        match target.remove(&line.part_id) {
            Some(wanted) if wanted.count != line.count => changes.update.push(wanted),
            Some(_) => {}
            None => changes.remove.push(*line),
        }
    }
    changes.insert.extend(target.into_values());
    Ok(changes)
}

/// Lookup tables over one snapshot, used to join records into requests.
struct Index<'a> {
    people: HashMap<EntityId, &'a Person>,
    brands: HashMap<EntityId, &'a VehicleBrand>,
    types: HashMap<EntityId, &'a ServiceType>,
    parts: HashMap<EntityId, &'a Part>,
    vehicles: HashMap<EntityId, &'a VehicleRecord>,
}

impl<'a> Index<'a> {
    fn new(snapshot: &'a ShopSnapshot) -> Self {
        Self {
            people: snapshot.people.iter().map(|p| (p.id, p)).collect(),
            brands: snapshot.brands.iter().map(|b| (b.id, b)).collect(),
            types: snapshot.service_types.iter().map(|t| (t.id, t)).collect(),
            parts: snapshot.parts.iter().map(|p| (p.id, p)).collect(),
            vehicles: snapshot.vehicles.iter().map(|v| (v.id, v)).collect(),
        }
    }

    fn line(&self, line: &LineRecord) -> Result<PartLine> {
        Ok(PartLine {
            part: lookup(&self.parts, line.part_id, "part")?.clone(),
            count: line.count,
        })
    }

    fn request(&self, record: &RequestRecord, lines: Vec<PartLine>) -> Result<ServiceRequest> {
        let vehicle = lookup(&self.vehicles, record.vehicle_id, "vehicle")?;
        let brand = lookup(&self.brands, vehicle.brand_id, "brand")?;
        let owner = lookup(&self.people, vehicle.owner_id, "person")?;

        Ok(ServiceRequest {
            id: record.id,
            service_type: lookup(&self.types, record.service_type_id, "service type")?.clone(),
            vehicle: Vehicle {
                id: vehicle.id,
                brand: brand.clone(),
                name: vehicle.name.clone(),
                state_number: vehicle.state_number.clone(),
                class: vehicle.class,
                image: vehicle.image.clone(),
                owner: owner.clone(),
            },
            requester: lookup(&self.people, record.requester_id, "person")?.clone(),
            placed_on: record.placed_on,
            completes_on: record.completes_on,
            lines,
        })
    }
}

fn duplicate_line(line: &LineRecord) -> ReportError {
    ReportError::InvalidData(format!(
        "part {} is bound to request {} more than once",
        line.part_id, line.request_id
    ))
}

fn lookup<'a, T>(map: &HashMap<EntityId, &'a T>, id: EntityId, kind: &str) -> Result<&'a T> {
    map.get(&id)
        .copied()
        .ok_or_else(|| ReportError::InvalidData(format!("dangling reference to {kind} {id}")))
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn snapshot() -> ShopSnapshot {
        ShopSnapshot {
            people: vec![Person {
                id: 1,
                name: "Анна".into(),
                last_name: "Смирнова".into(),
            }],
            brands: vec![VehicleBrand {
                id: 1,
                brand: "Lada".into(),
            }],
            service_types: vec![
                ServiceType {
                    id: 1,
                    name: "Ремонт".into(),
                    base_cost: Decimal::ONE,
                    requires_parts: true,
                },
                ServiceType {
                    id: 2,
                    name: "Диагностика".into(),
                    base_cost: Decimal::ONE,
                    requires_parts: false,
                },
            ],
            parts: vec![
                Part {
                    id: 10,
                    name: "Фильтр".into(),
                    price: Decimal::from(300),
                },
                Part {
                    id: 11,
                    name: "Свеча".into(),
                    price: Decimal::from(150),
                },
            ],
            vehicles: vec![VehicleRecord {
                id: 5,
                brand_id: 1,
                name: "Lada Granta".into(),
                state_number: "А123ВС777".into(),
                class: 2,
                image: None,
                owner_id: 1,
            }],
            requests: vec![
                RequestRecord {
                    id: 100,
                    service_type_id: 1,
                    vehicle_id: 5,
                    requester_id: 1,
                    placed_on: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
                    completes_on: None,
                },
                RequestRecord {
                    id: 101,
                    service_type_id: 2,
                    vehicle_id: 5,
                    requester_id: 1,
                    placed_on: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
                    completes_on: None,
                },
            ],
            lines: vec![
                LineRecord {
                    request_id: 100,
                    part_id: 10,
                    count: 2,
                },
                LineRecord {
                    request_id: 100,
                    part_id: 11,
                    count: 4,
                },
            ],
        }
    }

    fn line(part_id: EntityId, count: u32) -> LineRecord {
        LineRecord {
            request_id: 100,
            part_id,
            count,
        }
    }

    #[test]
    fn resolves_requests_with_lines() {
        let requests = snapshot().resolve_requests().expect("resolved");
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].vehicle.brand.brand, "Lada");
        assert_eq!(requests[0].lines.len(), 2);
        assert_eq!(requests[0].total_price(), Decimal::new(13200, 1));
        assert!(requests[1].lines.is_empty());
    }

    #[test]
    fn dangling_reference_is_invalid_data() {
        let mut data = snapshot();
        data.requests[0].vehicle_id = 99;
        let error = data.resolve_requests().unwrap_err();
        assert!(matches!(error, ReportError::InvalidData(message) if message.contains("vehicle 99")));
    }

    #[test]
    fn reconcile_computes_exact_changes() {
        let existing = [line(10, 2), line(11, 4)];
        let edited = [line(11, 5), line(12, 1)];
        let changes = reconcile_lines(&existing, &edited).unwrap();

        assert_eq!(changes.insert, vec![line(12, 1)]);
        assert_eq!(changes.update, vec![line(11, 5)]);
        assert_eq!(changes.remove, vec![line(10, 2)]);
    }

    #[test]
    fn reconcile_never_removes_absent_parts() {
        let changes = reconcile_lines(&[], &[line(10, 1)]).unwrap();
        assert!(changes.remove.is_empty());
        assert!(reconcile_lines(&[line(10, 1)], &[line(10, 1)]).unwrap().is_empty());
        assert!(reconcile_lines(&[], &[line(10, 0)]).is_err());
    }

    #[test]
    fn apply_line_edit_updates_snapshot() {
        let mut data = snapshot();
        data.apply_line_edit(100, &[line(10, 3)]).unwrap();

        let lines: Vec<_> = data.lines.iter().filter(|l| l.request_id == 100).collect();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].count, 3);
    }

    #[test]
    fn service_without_parts_drops_edited_lines() {
        let mut data = snapshot();
        let changes = data
            .apply_line_edit(
                101,
                &[LineRecord {
                    request_id: 101,
                    part_id: 10,
                    count: 1,
                }],
            )
            .unwrap();
        assert!(changes.is_empty());
        assert!(data.lines.iter().all(|l| l.request_id != 101));
    }

    #[test]
    fn orphan_line_is_invalid_data() {
        let mut data = snapshot();
        data.lines.push(LineRecord {
            request_id: 999,
            part_id: 10,
            count: 1,
        });
        let error = data.resolve_requests().unwrap_err();
        assert!(matches!(error, ReportError::InvalidData(message) if message.contains("request 999")));
    }

    #[test]
    fn part_bound_twice_is_rejected() {
        let mut data = snapshot();
        data.lines.push(line(10, 3));
        assert!(matches!(
            data.resolve_requests(),
            Err(ReportError::InvalidData(_))
        ));

        let error = data.apply_line_edit(100, &[line(10, 5)]).unwrap_err();
        assert!(matches!(error, ReportError::InvalidData(_)));
        let kept: Vec<_> = data
            .lines
            .iter()
            .filter(|l| l.request_id == 100 && l.part_id == 10)
            .map(|l| l.count)
            .collect();
        assert_eq!(kept, vec![2, 3]);
    }

    #[test]
    fn edit_removes_only_the_dropped_rows() {
        let mut data = snapshot();
        let changes = data.apply_line_edit(100, &[line(11, 4)]).unwrap();

        assert_eq!(changes.remove, vec![line(10, 2)]);
        assert_eq!(data.lines, vec![line(11, 4)]);
    }

    #[test]
    fn edit_checks_request_dates() {
        let mut data = snapshot();
        data.requests[0].completes_on = NaiveDate::from_ymd_opt(2024, 4, 1);
        let error = data.apply_line_edit(100, &[line(10, 1)]).unwrap_err();

        assert!(matches!(error, ReportError::Validation(_)));
        assert_eq!(data.lines.len(), 2);
    }

    #[test]
    fn edit_with_unknown_part_is_invalid_data() {
        let mut data = snapshot();
        let error = data.apply_line_edit(100, &[line(42, 1)]).unwrap_err();
        assert!(matches!(error, ReportError::InvalidData(message) if message.contains("part 42")));
    }

    #[test]
    fn add_part_validates_against_catalogue() {
        let mut data = snapshot();
        let duplicate = Part {
            id: 12,
            name: "Фильтр".into(),
            price: Decimal::from(10),
        };
        assert!(matches!(data.add_part(duplicate), Err(ReportError::Validation(_))));

        data.add_part(Part {
            id: 12,
            name: "Колодки".into(),
            price: Decimal::from(900),
        })
        .unwrap();
        assert_eq!(data.parts.len(), 3);
    }

    #[test]
    fn removing_request_cascades_to_lines() {
        let mut data = snapshot();
        data.remove_request(100).unwrap();
        assert_eq!(data.requests.len(), 1);
        assert!(data.lines.is_empty());
        assert!(data.remove_request(100).is_err());
    }
}
