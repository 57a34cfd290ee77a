use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::model::{
    CategoryTag, PriorityTag, QuotaHistoryEntry, QuotaSlot, StaffId, StaffStats, TicketId,
};
use crate::store::StoreData;

/// Consistent read-only copy of the state served by the status endpoint.
///
/// Sections are serialized exactly as they are stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub contributions: BTreeMap<TicketId, BTreeSet<StaffId>>,
    pub staff_stats: BTreeMap<StaffId, StaffStats>,
    pub quotas: QuotaSlot,
    pub quota_history: BTreeMap<String, QuotaHistoryEntry>,
    pub priorities: BTreeMap<TicketId, PriorityTag>,
    pub categories: BTreeMap<TicketId, CategoryTag>,
}

impl Snapshot {
    #[must_use]
    pub fn from_data(data: &StoreData) -> Self {
        Self {
            contributions: data.contributions.clone(),
            staff_stats: data.staff_stats.clone(),
            quotas: data.quotas.clone(),
            quota_history: data.quota_history.clone(),
            priorities: data.priorities.clone(),
            categories: data.categories.clone(),
        }
    }
}
