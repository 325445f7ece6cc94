use {
    crate::{domain::FundStatus, models::NormalizedFund},
    serde::{Deserialize, Serialize},
    std::{borrow::Borrow, cmp::Ordering, collections::HashMap, hash::BuildHasher},
    strum_macros::{Display, EnumIter, EnumString},
};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
)]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Ok,
    Error,
    Warning,
    Running,
    Partial,
}

impl StatusFilter {
    pub fn matches(self, status: FundStatus) -> bool {
        match self {
            Self::All => true,
            Self::Ok => status == FundStatus::Ok,
            Self::Error => status == FundStatus::Error,
            Self::Warning => status == FundStatus::Warning,
            Self::Running => status == FundStatus::Running,
            Self::Partial => status == FundStatus::Partial,
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
)]
#[strum(ascii_case_insensitive, serialize_all = "kebab-case")]
pub enum SortKey {
    /// Store order (first-seen order of funds).
    Arrival,
    #[default]
    FundName,
    Status,
    Duration,
    StartTime,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn toggled(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundFilter {
    pub status: StatusFilter,
    pub search: String,
}

impl FundFilter {
    pub fn is_active(&self) -> bool {
        self.status != StatusFilter::All || !self.search.trim().is_empty()
    }

    /// `needle` must already be trimmed and lower-cased.
    fn matches(&self, fund: &NormalizedFund, needle: &str) -> bool {
        if !self.status.matches(fund.overall_status) {
            return false;
        }
        needle.is_empty()
            || fund.short_name.to_lowercase().contains(needle)
            || fund.display_name.to_lowercase().contains(needle)
            || fund.id.to_lowercase().contains(needle)
    }
}

/// Ids from `order` that pass `filter`, sorted by `key`.
///
/// The sort is stable, so ties (and `SortKey::Arrival`) keep store order. Ids missing
/// from `funds` are dropped. Never mutates its inputs.
pub fn filtered_and_sorted<V, S>(
    funds: &HashMap<String, V, S>,
    order: &[String],
    filter: &FundFilter,
    key: SortKey,
    direction: SortDirection,
) -> Vec<String>
where
    V: Borrow<NormalizedFund>,
    S: BuildHasher,
{
    let needle = filter.search.trim().to_lowercase();
    let mut rows: Vec<&NormalizedFund> = order
        .iter()
        .filter_map(|id| funds.get(id))
        .map(Borrow::<NormalizedFund>::borrow)
        .filter(|fund| filter.matches(fund, &needle))
        .collect();

    if key != SortKey::Arrival {
        rows.sort_by(|a, b| {
            let ord = compare(a, b, key);
            match direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        });
    } else if direction == SortDirection::Desc {
        rows.reverse();
    }

    rows.into_iter().map(|f| f.id.clone()).collect()
}

/// Ascending comparison for `key`.
fn compare(a: &NormalizedFund, b: &NormalizedFund, key: SortKey) -> Ordering {
    match key {
        SortKey::Arrival => Ordering::Equal,
        SortKey::FundName => a
            .short_name
            .to_lowercase()
            .cmp(&b.short_name.to_lowercase())
            .then_with(|| a.short_name.cmp(&b.short_name)),
        SortKey::Status => a.overall_status.rank().cmp(&b.overall_status.rank()),
        SortKey::Duration => a.duration.unwrap_or(0).cmp(&b.duration.unwrap_or(0)),
        SortKey::StartTime => a.start_time.unwrap_or(0).cmp(&b.start_time.unwrap_or(0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RawRecord;
    use serde_json::{Value, json};
    use std::{str::FromStr, sync::Arc};

    fn store(rows: Vec<Value>) -> (HashMap<String, Arc<NormalizedFund>>, Vec<String>) {
        let mut map = HashMap::new();
        let mut order = Vec::new();
        for v in rows {
            let f = NormalizedFund::from_raw(&RawRecord::from_value(v).expect("object"));
            order.push(f.id.clone());
            map.insert(f.id.clone(), Arc::new(f));
        }
        (map, order)
    }

    fn sample() -> (HashMap<String, Arc<NormalizedFund>>, Vec<String>) {
        store(vec![
            json!({"ID_Fund": 30, "FundShortName": "charlie", "FundName": "Charlie Income",
                   "Estado_Extraccion": "EN_PROGRESO", "Duracion_Ms": 500}),
            json!({"ID_Fund": 10, "FundShortName": "Alpha", "FundName": "Alpha Growth",
                   "Mensaje_Error": "boom", "Duracion_Ms": 9000}),
            json!({"ID_Fund": 20, "FundShortName": "BRAVO", "FundName": "Bravo Equity"}),
        ])
    }

    #[test]
    fn unfiltered_arrival_returns_store_order() {
        let (map, order) = sample();
        let out = filtered_and_sorted(
            &map,
            &order,
            &FundFilter::default(),
            SortKey::Arrival,
            SortDirection::Asc,
        );
        assert_eq!(out, order);
    }

    #[test]
    fn status_filter_and_search() {
        let (map, order) = sample();
        let errors = FundFilter {
            status: StatusFilter::Error,
            search: String::new(),
        };
        assert_eq!(
            filtered_and_sorted(&map, &order, &errors, SortKey::Arrival, SortDirection::Asc),
            vec!["10"]
        );

        let search = FundFilter {
            status: StatusFilter::All,
            search: "  equity ".to_string(),
        };
        assert!(search.is_active());
        assert_eq!(
            filtered_and_sorted(&map, &order, &search, SortKey::Arrival, SortDirection::Asc),
            vec!["20"]
        );

        let by_id = FundFilter {
            status: StatusFilter::All,
            search: "3".to_string(),
        };
        assert_eq!(
            filtered_and_sorted(&map, &order, &by_id, SortKey::Arrival, SortDirection::Asc),
            vec!["30"]
        );
    }

    #[test]
    fn sort_keys_and_directions() {
        let (map, order) = sample();
        let all = FundFilter::default();
        let sorted = |key, dir| filtered_and_sorted(&map, &order, &all, key, dir);

        assert_eq!(sorted(SortKey::FundName, SortDirection::Asc), vec!["10", "20", "30"]);
        assert_eq!(sorted(SortKey::FundName, SortDirection::Desc), vec!["30", "20", "10"]);
        // Error (4) > Running (1) > Pending (0)
        assert_eq!(sorted(SortKey::Status, SortDirection::Desc), vec!["10", "30", "20"]);
        assert_eq!(sorted(SortKey::Duration, SortDirection::Desc), vec!["10", "30", "20"]);
        assert_eq!(sorted(SortKey::Arrival, SortDirection::Desc), vec!["20", "10", "30"]);
    }

    #[test]
    fn missing_ids_are_dropped() {
        let (map, mut order) = sample();
        order.push("999".to_string());
        let out = filtered_and_sorted(
            &map,
            &order,
            &FundFilter::default(),
            SortKey::Arrival,
            SortDirection::Asc,
        );
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn keys_parse_from_cli_spelling() {
        assert_eq!(SortKey::from_str("fund-name").ok(), Some(SortKey::FundName));
        assert_eq!(SortKey::from_str("START-TIME").ok(), Some(SortKey::StartTime));
        assert_eq!(StatusFilter::from_str("error").ok(), Some(StatusFilter::Error));
        assert_eq!(SortKey::default(), SortKey::FundName);
        assert_eq!(SortDirection::Asc.toggled(), SortDirection::Desc);
    }
}
