use {
    crate::{
        models::{FundFilter, NormalizedFund, SortDirection, SortKey, StatusFilter},
        shared::Revisioned,
    },
    serde::Serialize,
    std::collections::HashSet,
};

/// Presentation-only state: filters, sorting, expansion and selection.
/// Kept apart from fund data so that fund churn never touches it.
#[derive(Debug, Default, Clone, Serialize)]
pub struct UiState {
    filter: FundFilter,
    sort_key: SortKey,
    sort_direction: SortDirection,
    expanded_funds: HashSet<String>,
    expanded_sub_stages: HashSet<String>,
    selected_fund: Option<String>,
    revision: u64,
}

impl Revisioned for UiState {
    fn revision(&self) -> u64 {
        self.revision
    }
}

impl UiState {
    pub fn new() -> Self {
        Self::default()
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    pub fn filter(&self) -> &FundFilter {
        &self.filter
    }

    pub fn sort_key(&self) -> SortKey {
        self.sort_key
    }

    pub fn sort_direction(&self) -> SortDirection {
        self.sort_direction
    }

    pub fn set_status_filter(&mut self, status: StatusFilter) {
        if self.filter.status != status {
            self.filter.status = status;
            self.touch();
        }
    }

    pub fn set_search(&mut self, query: impl Into<String>) {
        let query = query.into();
        if self.filter.search != query {
            self.filter.search = query;
            self.touch();
        }
    }

    /// Same key flips the direction; a new key starts ascending.
    pub fn update_sorting(&mut self, key: SortKey) {
        if self.sort_key == key {
            self.sort_direction = self.sort_direction.toggled();
        } else {
            self.sort_key = key;
            self.sort_direction = SortDirection::Asc;
        }
        self.touch();
    }

    pub fn set_sorting(&mut self, key: SortKey, direction: SortDirection) {
        if (self.sort_key, self.sort_direction) != (key, direction) {
            self.sort_key = key;
            self.sort_direction = direction;
            self.touch();
        }
    }

    // --- Fund expansion ---

    pub fn toggle_fund(&mut self, id: &str) {
        if !self.expanded_funds.remove(id) {
            self.expanded_funds.insert(id.to_string());
        }
        self.touch();
    }

    pub fn expand_fund(&mut self, id: &str) {
        if self.expanded_funds.insert(id.to_string()) {
            self.touch();
        }
    }

    pub fn collapse_fund(&mut self, id: &str) {
        if self.expanded_funds.remove(id) {
            self.touch();
        }
    }

    pub fn expand_all_funds<'a>(&mut self, ids: impl IntoIterator<Item = &'a String>) {
        self.expanded_funds = ids.into_iter().cloned().collect();
        self.touch();
    }

    pub fn collapse_all_funds(&mut self) {
        if !self.expanded_funds.is_empty() {
            self.expanded_funds.clear();
            self.touch();
        }
    }

    pub fn is_fund_expanded(&self, id: &str) -> bool {
        self.expanded_funds.contains(id)
    }

    // --- Sub-stage expansion ---

    pub fn toggle_sub_stages(&mut self, id: &str) {
        if !self.expanded_sub_stages.remove(id) {
            self.expanded_sub_stages.insert(id.to_string());
        }
        self.touch();
    }

    pub fn expand_sub_stages(&mut self, id: &str) {
        if self.expanded_sub_stages.insert(id.to_string()) {
            self.touch();
        }
    }

    pub fn collapse_sub_stages(&mut self, id: &str) {
        if self.expanded_sub_stages.remove(id) {
            self.touch();
        }
    }

    pub fn collapse_all_sub_stages(&mut self) {
        if !self.expanded_sub_stages.is_empty() {
            self.expanded_sub_stages.clear();
            self.touch();
        }
    }

    /// Opens sub-stage detail for every fund matching `predicate` (e.g. errored funds).
    /// Returns how many were newly expanded.
    pub fn expand_sub_stages_where<'a>(
        &mut self,
        funds: impl IntoIterator<Item = &'a NormalizedFund>,
        predicate: impl Fn(&NormalizedFund) -> bool,
    ) -> usize {
        let mut added = 0;
        for fund in funds {
            if predicate(fund) && self.expanded_sub_stages.insert(fund.id.clone()) {
                added += 1;
            }
        }
        if added > 0 {
            self.touch();
        }
        added
    }

    pub fn is_sub_stage_expanded(&self, id: &str) -> bool {
        self.expanded_sub_stages.contains(id)
    }

    pub fn expanded_sub_stage_count(&self) -> usize {
        self.expanded_sub_stages.len()
    }

    // --- Selection ---

    pub fn select_fund(&mut self, id: Option<String>) {
        if self.selected_fund != id {
            self.selected_fund = id;
            self.touch();
        }
    }

    pub fn selected_fund(&self) -> Option<&str> {
        self.selected_fund.as_deref()
    }

    /// Filters and sorting back to defaults. Expansion and selection are kept.
    pub fn reset_filters(&mut self) {
        self.filter = FundFilter::default();
        self.sort_key = SortKey::default();
        self.sort_direction = SortDirection::default();
        self.touch();
    }

    pub fn reset(&mut self) {
        let revision = self.revision + 1;
        *self = Self {
            revision,
            ..Self::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RawRecord;
    use serde_json::json;

    #[test]
    fn sorting_toggles_on_same_key() {
        let mut ui = UiState::new();
        assert_eq!(
            (ui.sort_key(), ui.sort_direction()),
            (SortKey::FundName, SortDirection::Asc)
        );

        ui.update_sorting(SortKey::FundName);
        assert_eq!(ui.sort_direction(), SortDirection::Desc);
        // A new key always starts ascending, whatever the previous direction.
        ui.update_sorting(SortKey::Duration);
        assert_eq!(ui.sort_direction(), SortDirection::Asc);
        ui.update_sorting(SortKey::Duration);
        assert_eq!(ui.sort_direction(), SortDirection::Desc);
        ui.update_sorting(SortKey::FundName);
        assert_eq!(
            (ui.sort_key(), ui.sort_direction()),
            (SortKey::FundName, SortDirection::Asc)
        );
    }

    #[test]
    fn no_op_setters_do_not_bump_revision() {
        let mut ui = UiState::new();
        ui.set_status_filter(StatusFilter::All);
        ui.set_search("");
        ui.collapse_fund("x");
        ui.select_fund(None);
        assert_eq!(ui.revision(), 0);

        ui.set_search("alpha");
        assert_eq!(ui.revision(), 1);
        assert!(ui.filter().is_active());
    }

    #[test]
    fn expansion_sets() {
        let mut ui = UiState::new();
        ui.toggle_fund("1");
        assert!(ui.is_fund_expanded("1"));
        ui.toggle_fund("1");
        assert!(!ui.is_fund_expanded("1"));

        let ids = vec!["1".to_string(), "2".to_string()];
        ui.expand_all_funds(&ids);
        assert!(ui.is_fund_expanded("2"));
        ui.collapse_all_funds();
        assert!(!ui.is_fund_expanded("2"));

        let funds = vec![
            NormalizedFund::from_raw(
                &RawRecord::from_value(json!({"ID_Fund": 1, "Mensaje_Error": "x"})).expect("object"),
            ),
            NormalizedFund::from_raw(&RawRecord::from_value(json!({"ID_Fund": 2})).expect("object")),
        ];
        assert_eq!(ui.expand_sub_stages_where(&funds, |f| f.has_error), 1);
        assert!(ui.is_sub_stage_expanded("1"));
        assert_eq!(ui.expand_sub_stages_where(&funds, |f| f.has_error), 0);
    }

    #[test]
    fn reset_filters_keeps_expansion_but_reset_clears_all() {
        let mut ui = UiState::new();
        ui.set_status_filter(StatusFilter::Error);
        ui.update_sorting(SortKey::Status);
        ui.expand_fund("7");
        ui.select_fund(Some("7".into()));

        ui.reset_filters();
        assert_eq!(ui.filter(), &FundFilter::default());
        assert_eq!(
            (ui.sort_key(), ui.sort_direction()),
            (SortKey::FundName, SortDirection::Asc)
        );
        assert!(ui.is_fund_expanded("7"));

        let rev = ui.revision();
        ui.reset();
        assert!(!ui.is_fund_expanded("7"));
        assert_eq!(ui.selected_fund(), None);
        assert!(ui.revision() > rev);
    }
}
