use {
    crate::{
        config::DF,
        models::{ChangeInfo, ChangeMetrics, NormalizedFund, compute_change_metrics, detect_changes},
        shared::Revisioned,
        utils::now_ms,
    },
    serde::Serialize,
    std::{
        collections::{HashMap, HashSet},
        sync::Arc,
    },
};

/// A change flag left for the presentation layer to animate, then clear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeFlag {
    pub info: ChangeInfo,
    pub timestamp_ms: i64,
}

/// Current normalized funds of the watched execution.
///
/// The map, the arrival order and the change flags are only mutated together, through
/// the methods below. Funds are handed out as `Arc`s and are never mutated in place.
#[derive(Debug, Default, Serialize)]
pub struct FundStore {
    funds: HashMap<String, Arc<NormalizedFund>>,
    order: Vec<String>,
    change_flags: HashMap<String, ChangeFlag>,
    revision: u64,
}

impl Revisioned for FundStore {
    fn revision(&self) -> u64 {
        self.revision
    }
}

impl FundStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole snapshot in one step.
    ///
    /// The incoming order becomes the new order (a repeated id keeps its first position and
    /// its last value). Change flags are rebuilt from scratch by diffing each fund against the
    /// previous snapshot; unchanged funds keep their existing `Arc`.
    pub fn upsert_many(&mut self, funds: Vec<NormalizedFund>) -> ChangeMetrics {
        let now = now_ms();
        let mut next_funds: HashMap<String, Arc<NormalizedFund>> = HashMap::with_capacity(funds.len());
        let mut next_order = Vec::with_capacity(funds.len());
        let mut next_flags = HashMap::new();

        for fund in funds {
            let id = fund.id.clone();
            let previous = self.funds.get(&id);
            let info = detect_changes(previous.map(|p| p.as_ref()), &fund);

            let entry = match previous {
                Some(prev) if !info.has_changes => prev.clone(),
                _ => Arc::new(fund),
            };
            if info.has_changes {
                next_flags.insert(id.clone(), ChangeFlag { info, timestamp_ms: now });
            } else {
                next_flags.remove(&id);
            }
            if next_funds.insert(id.clone(), entry).is_none() {
                next_order.push(id);
            }
        }

        let metrics = compute_change_metrics(&self.funds, &next_funds);
        if DF.log_store_updates {
            log::info!(
                "FundStore: batch of {} funds ({} changed, {} new, {} removed)",
                metrics.total,
                metrics.changed,
                metrics.added,
                metrics.removed
            );
        }

        self.funds = next_funds;
        self.order = next_order;
        self.change_flags = next_flags;
        self.revision += 1;
        metrics
    }

    /// Incremental update of one fund. Appends to the order only if the id is new.
    /// Returns the change info, or `None` when the fund was already current.
    pub fn upsert_one(&mut self, fund: NormalizedFund) -> Option<ChangeInfo> {
        let info = detect_changes(self.funds.get(&fund.id).map(|p| p.as_ref()), &fund);
        if !info.has_changes {
            return None;
        }

        if info.is_new {
            self.order.push(fund.id.clone());
        }
        self.change_flags.insert(
            fund.id.clone(),
            ChangeFlag {
                info: info.clone(),
                timestamp_ms: now_ms(),
            },
        );
        if DF.log_store_updates {
            log::info!(
                "FundStore: {} {} ({})",
                if info.is_new { "added" } else { "updated" },
                fund.id,
                fund.overall_status
            );
        }
        self.funds.insert(fund.id.clone(), Arc::new(fund));
        self.revision += 1;
        Some(info)
    }

    /// Evicts a fund from the map, the order and the flags together.
    pub fn remove(&mut self, id: &str) -> Option<Arc<NormalizedFund>> {
        let removed = self.funds.remove(id)?;
        self.order.retain(|o| o != id);
        self.change_flags.remove(id);
        self.revision += 1;
        Some(removed)
    }

    pub fn clear(&mut self) {
        if self.funds.is_empty() && self.order.is_empty() && self.change_flags.is_empty() {
            return;
        }
        self.funds.clear();
        self.order.clear();
        self.change_flags.clear();
        self.revision += 1;
    }

    pub fn clear_change_flags(&mut self) {
        if self.change_flags.is_empty() {
            return;
        }
        self.change_flags.clear();
        self.revision += 1;
    }

    pub fn clear_change_flag(&mut self, id: &str) -> bool {
        let cleared = self.change_flags.remove(id).is_some();
        if cleared {
            self.revision += 1;
        }
        cleared
    }

    /// Drops flags older than `max_age_ms`. Returns how many were dropped.
    pub fn expire_change_flags(&mut self, now_ms: i64, max_age_ms: i64) -> usize {
        let before = self.change_flags.len();
        self.change_flags
            .retain(|_, flag| now_ms - flag.timestamp_ms < max_age_ms);
        let dropped = before - self.change_flags.len();
        if dropped > 0 {
            self.revision += 1;
        }
        dropped
    }

    pub fn get(&self, id: &str) -> Option<&Arc<NormalizedFund>> {
        self.funds.get(id)
    }

    pub fn funds(&self) -> &HashMap<String, Arc<NormalizedFund>> {
        &self.funds
    }

    /// Funds in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &NormalizedFund> {
        self.order
            .iter()
            .filter_map(|id| self.funds.get(id))
            .map(|f| f.as_ref())
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn change_info(&self, id: &str) -> Option<&ChangeFlag> {
        self.change_flags.get(id)
    }

    pub fn change_flags(&self) -> &HashMap<String, ChangeFlag> {
        &self.change_flags
    }

    pub fn has_changes(&self, id: &str) -> bool {
        self.change_flags.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.funds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funds.is_empty()
    }

    /// Consistency check of the three structures.
    pub fn is_consistent(&self) -> bool {
        let ordered: HashSet<&String> = self.order.iter().collect();
        ordered.len() == self.order.len()
            && ordered.len() == self.funds.len()
            && self.funds.keys().all(|id| ordered.contains(id))
            && self.change_flags.keys().all(|id| self.funds.contains_key(id))
    }
}
