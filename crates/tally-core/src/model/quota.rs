use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ids::StaffId;

/// The active quota period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaState {
    pub target: u32,
    pub start_date: DateTime<Utc>,
}

impl QuotaState {
    /// History key for the period that started at `start_date`.
    #[must_use]
    pub fn period_id(&self) -> String {
        format!(
            "quota_{}",
            self.start_date.to_rfc3339_opts(SecondsFormat::Millis, true)
        )
    }
}

/// Flat key/value slot persisted under `quotas`.
///
/// Both keys are present while a period is active and both are absent
/// otherwise. A half-written slot is treated as "no active quota".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuotaSlot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_quota: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
}

impl QuotaSlot {
    #[must_use]
    pub fn active(&self) -> Option<QuotaState> {
        match (self.monthly_quota, self.start_date) {
            (Some(target), Some(start_date)) if target > 0 => Some(QuotaState { target, start_date }),
            _ => None,
        }
    }

    pub fn set(&mut self, state: QuotaState) {
        self.monthly_quota = Some(state.target);
        self.start_date = Some(state.start_date);
    }

    pub fn clear(&mut self) {
        self.monthly_quota = None;
        self.start_date = None;
    }
}

/// Outcome for one staff member when a period closes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffResult {
    pub monthly_tickets: u32,
    /// Full precision; rounding happens only when rendered.
    pub percentage_achieved: f64,
}

/// Immutable archive of one finished quota period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaHistoryEntry {
    #[serde(alias = "quota")]
    pub target: u32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub staff_results: BTreeMap<StaffId, StaffResult>,
}

/// Percentage of `target` reached by `tickets`.
#[must_use]
pub fn percentage(tickets: u32, target: u32) -> f64 {
    if target == 0 {
        return 0.0;
    }
    f64::from(tickets) / f64::from(target) * 100.0
}
