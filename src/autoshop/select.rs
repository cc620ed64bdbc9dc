//! Filtering, ordering and paging of service requests for display, plus the
//! narrower selection handed to the report assemblers.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use tracing::debug;

use crate::autoshop::error::ReportError;
use crate::autoshop::model::{ServiceRequest, format_date};

/// Number of requests shown per page.
pub const PAGE_SIZE: usize = 20;

/// Type filter entry that lets every service type through.
pub const ALL_TYPES: &str = "Все типы";

/// Notice the caller shows when a selection comes back empty.
pub const NO_RESULTS_NOTICE: &str = "По заданным параметрам заказов не найдено.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    /// Insertion order.
    #[default]
    None,
    PriceAscending,
    PriceDescending,
    QuantityAscending,
    QuantityDescending,
    CompletionAscending,
    CompletionDescending,
}

impl SortKey {
    fn compare(self, lhs: &ServiceRequest, rhs: &ServiceRequest) -> Ordering {
        match self {
            SortKey::None => Ordering::Equal,
            SortKey::PriceAscending => lhs.total_price().cmp(&rhs.total_price()),
            SortKey::PriceDescending => rhs.total_price().cmp(&lhs.total_price()),
            SortKey::QuantityAscending => lhs.total_quantity().cmp(&rhs.total_quantity()),
            SortKey::QuantityDescending => rhs.total_quantity().cmp(&lhs.total_quantity()),
            SortKey::CompletionAscending => lhs.completes_on.cmp(&rhs.completes_on),
            SortKey::CompletionDescending => rhs.completes_on.cmp(&lhs.completes_on),
        }
    }
}

impl FromStr for SortKey {
    type Err = ReportError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "none" => SortKey::None,
            "price" => SortKey::PriceAscending,
            "-price" => SortKey::PriceDescending,
            "quantity" => SortKey::QuantityAscending,
            "-quantity" => SortKey::QuantityDescending,
            "completion" => SortKey::CompletionAscending,
            "-completion" => SortKey::CompletionDescending,
            other => {
                return Err(ReportError::InvalidData(format!("unknown sort key '{other}'")));
            }
        })
    }
}

/// Service type restriction of a query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TypeFilter {
    #[default]
    All,
    Named(String),
}

impl TypeFilter {
    /// Maps the combo-box value to a filter; the sentinel means "all types".
    pub fn from_choice(choice: &str) -> Self {
        if choice.is_empty() || choice == ALL_TYPES {
            TypeFilter::All
        } else {
            TypeFilter::Named(choice.to_string())
        }
    }

    fn accepts(&self, request: &ServiceRequest) -> bool {
        match self {
            TypeFilter::All => true,
            TypeFilter::Named(name) => request.service_type.name == *name,
        }
    }
}

impl fmt::Display for TypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeFilter::All => write!(f, "{ALL_TYPES}"),
            TypeFilter::Named(name) => write!(f, "{name}"),
        }
    }
}

/// Type filter choices as the list screen offers them: the sentinel first.
pub fn type_filter_choices(service_type_names: &[String]) -> Vec<String> {
    let mut choices = Vec::with_capacity(service_type_names.len() + 1);
    choices.push(ALL_TYPES.to_string());
    choices.extend(service_type_names.iter().cloned());
    choices
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestQuery {
    pub search: String,
    pub sort: SortKey,
    pub type_filter: TypeFilter,
    pub include_completed: bool,
}

/// Filtered and ordered requests, ready to be paged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub requests: Vec<ServiceRequest>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn page_count(&self) -> usize {
        page_count(self.requests.len())
    }

    pub fn page(&self, index: usize) -> Page<'_, ServiceRequest> {
        page(&self.requests, index)
    }
}

/// Applies the completion cutoff, text search, sort order and type filter.
pub fn select(requests: &[ServiceRequest], query: &RequestQuery, now: NaiveDateTime) -> Selection {
    let needle = query.search.to_lowercase();

    let mut selected: Vec<ServiceRequest> = requests
        .iter()
        .filter(|request| query.include_completed || !request.is_completed_before(now))
        .filter(|request| matches_search(request, &needle))
        .filter(|request| query.type_filter.accepts(request))
        .cloned()
        .collect();

    if query.sort != SortKey::None {
        selected.sort_by(|lhs, rhs| query.sort.compare(lhs, rhs));
    }

    debug!(
        total = requests.len(),
        selected = selected.len(),
        sort = ?query.sort,
        "selected service requests"
    );
    Selection { requests: selected }
}

/// Narrows the full request set to what a report should contain.
pub fn for_report(
    requests: &[ServiceRequest],
    include_completed: bool,
    now: NaiveDateTime,
) -> Vec<ServiceRequest> {
    requests
        .iter()
        .filter(|request| include_completed || !request.is_completed_before(now))
        .cloned()
        .collect()
}

fn matches_search(request: &ServiceRequest, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    request.vehicle.name.to_lowercase().contains(needle)
        || request.service_type.name.to_lowercase().contains(needle)
        || request
            .completes_on
            .is_some_and(|date| format_date(date).contains(needle))
}

/// One page of a list together with its position.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<'a, T> {
    pub index: usize,
    pub page_count: usize,
    pub total: usize,
    pub items: &'a [T],
}

/// `max(1, ceil(count / PAGE_SIZE))`.
pub fn page_count(count: usize) -> usize {
    count.div_ceil(PAGE_SIZE).max(1)
}

/// Slice `[index * PAGE_SIZE, index * PAGE_SIZE + PAGE_SIZE)`, clamped to the list.
pub fn page<T>(items: &[T], index: usize) -> Page<'_, T> {
    let start = index.saturating_mul(PAGE_SIZE).min(items.len());
    let end = start.saturating_add(PAGE_SIZE).min(items.len());
    Page {
        index,
        page_count: page_count(items.len()),
        total: items.len(),
        items: &items[start..end],
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};
    use proptest::prelude::*;

    use super::*;
    use crate::autoshop::model::fixtures;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    fn now() -> NaiveDateTime {
        date(15).and_hms_opt(9, 30, 0).unwrap()
    }

    fn sample() -> Vec<ServiceRequest> {
        let mut past = fixtures::request(1, "Lada Vesta", Some(date(1)));
        past.lines = vec![fixtures::line(1, "Фильтр", 100, 3)];

        let mut future = fixtures::request(2, "Kia Rio", Some(date(20)));
        future.service_type = fixtures::service("Покраска");
        future.lines = vec![fixtures::line(2, "Краска", 500, 1)];

        let open = fixtures::request(3, "Lada Niva", None);
        vec![past, future, open]
    }

    fn ids(selection: &Selection) -> Vec<i64> {
        selection.requests.iter().map(|r| r.id).collect()
    }

    #[test]
    fn hides_completed_unless_requested() {
        let requests = sample();
        let hidden = select(&requests, &RequestQuery::default(), now());
        assert_eq!(ids(&hidden), vec![2, 3]);

        let query = RequestQuery {
            include_completed: true,
            ..RequestQuery::default()
        };
        assert_eq!(ids(&select(&requests, &query, now())), vec![1, 2, 3]);
    }

    #[test]
    fn search_matches_vehicle_type_or_date() {
        let requests = sample();
        let search = |text: &str| {
            let query = RequestQuery {
                search: text.into(),
                include_completed: true,
                ..RequestQuery::default()
            };
            ids(&select(&requests, &query, now()))
        };

        assert_eq!(search("LADA"), vec![1, 3]);
        assert_eq!(search("покраск"), vec![2]);
        assert_eq!(search("20.06"), vec![2]);
        assert!(search("toyota").is_empty());
    }

    #[test]
    fn sort_keys_order_requests() {
        let requests = sample();
        let sorted = |sort: SortKey| {
            let query = RequestQuery {
                sort,
                include_completed: true,
                ..RequestQuery::default()
            };
            ids(&select(&requests, &query, now()))
        };

        assert_eq!(sorted(SortKey::None), vec![1, 2, 3]);
        assert_eq!(sorted(SortKey::PriceAscending), vec![3, 1, 2]);
        assert_eq!(sorted(SortKey::PriceDescending), vec![2, 1, 3]);
        assert_eq!(sorted(SortKey::QuantityAscending), vec![3, 2, 1]);
        assert_eq!(sorted(SortKey::QuantityDescending), vec![1, 2, 3]);
        assert_eq!(sorted(SortKey::CompletionAscending), vec![3, 1, 2]);
        assert_eq!(sorted(SortKey::CompletionDescending), vec![2, 1, 3]);
    }

    #[test]
    fn type_filter_uses_exact_names() {
        let requests = sample();
        let query = RequestQuery {
            type_filter: TypeFilter::from_choice("Покраска"),
            include_completed: true,
            ..RequestQuery::default()
        };
        assert_eq!(ids(&select(&requests, &query, now())), vec![2]);
        assert_eq!(TypeFilter::from_choice(ALL_TYPES), TypeFilter::All);

        let partial = RequestQuery {
            type_filter: TypeFilter::from_choice("Покр"),
            ..query
        };
        assert!(select(&requests, &partial, now()).is_empty());
    }

    #[test]
    fn sort_keys_parse_from_cli_names() {
        assert_eq!("-price".parse::<SortKey>().unwrap(), SortKey::PriceDescending);
        assert_eq!("completion".parse::<SortKey>().unwrap(), SortKey::CompletionAscending);
        assert!("weight".parse::<SortKey>().is_err());
    }

    #[test]
    fn choices_start_with_sentinel() {
        let choices = type_filter_choices(&["Ремонт".to_string()]);
        assert_eq!(choices, vec![ALL_TYPES.to_string(), "Ремонт".to_string()]);
    }

    #[test]
    fn report_selection_shares_cutoff() {
        let requests = sample();
        let reportable: Vec<i64> = for_report(&requests, false, now()).iter().map(|r| r.id).collect();
        assert_eq!(reportable, vec![2, 3]);
        assert_eq!(for_report(&requests, true, now()).len(), 3);
    }

    #[test]
    fn empty_list_still_has_one_page() {
        let empty: Vec<u8> = Vec::new();
        assert_eq!(page_count(0), 1);
        let first = page(&empty, 0);
        assert!(first.items.is_empty());
        assert_eq!(first.page_count, 1);
        assert!(page(&empty, 4).items.is_empty());
    }

    proptest! {
        #[test]
        fn page_count_matches_ceiling(count in 0usize..500) {
            let expected = std::cmp::max(1, (count + PAGE_SIZE - 1) / PAGE_SIZE);
            prop_assert_eq!(page_count(count), expected);
        }

        #[test]
        fn pages_concatenate_to_the_list(count in 0usize..200) {
            let items: Vec<usize> = (0..count).collect();
            let rebuilt: Vec<usize> = (0..page_count(count))
                .flat_map(|index| page(&items, index).items.to_vec())
                .collect();
            prop_assert_eq!(rebuilt, items);
        }

        #[test]
        fn cutoff_excludes_exactly_the_past(
            offsets in proptest::collection::vec(proptest::option::of(-30i64..30), 0..40),
            sort_index in 0usize..7,
        ) {
            let sorts = [
                SortKey::None,
                SortKey::PriceAscending,
                SortKey::PriceDescending,
                SortKey::QuantityAscending,
                SortKey::QuantityDescending,
                SortKey::CompletionAscending,
                SortKey::CompletionDescending,
            ];
            let today = date(15);
            let now = today.and_time(NaiveTime::MIN) + chrono::Duration::hours(1);
            let requests: Vec<ServiceRequest> = offsets
                .iter()
                .enumerate()
                .map(|(index, offset)| {
                    let completes_on = offset.map(|days| today + chrono::Duration::days(days));
                    fixtures::request(index as i64, "Lada", completes_on)
                })
                .collect();
            let query = RequestQuery { sort: sorts[sort_index], ..RequestQuery::default() };
            let selection = select(&requests, &query, now);

            for request in &requests {
                let kept = selection.requests.iter().any(|r| r.id == request.id);
                let past = request
                    .completes_on
                    .is_some_and(|date| date.and_time(NaiveTime::MIN) < now);
                prop_assert_eq!(kept, !past);
            }
        }

        #[test]
        fn price_sort_is_stable(prices in proptest::collection::vec(0i64..5, 0..30)) {
            let requests: Vec<ServiceRequest> = prices
                .iter()
                .enumerate()
                .map(|(index, price)| {
                    let mut request = fixtures::request(index as i64, "Lada", None);
                    request.lines = vec![fixtures::line(1, "Деталь", *price, 1)];
                    request
                })
                .collect();
            let query = RequestQuery { sort: SortKey::PriceAscending, ..RequestQuery::default() };
            let selection = select(&requests, &query, now());

            for pair in selection.requests.windows(2) {
                let (lhs, rhs) = (&pair[0], &pair[1]);
                prop_assert!(lhs.total_price() <= rhs.total_price());
                if lhs.total_price() == rhs.total_price() {
                    prop_assert!(lhs.id < rhs.id);
                }
            }
        }
    }
}
