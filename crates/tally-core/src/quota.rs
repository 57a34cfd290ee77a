//! Monthly quota periods: `NoActiveQuota -> ActiveQuota -> NoActiveQuota`.
//!
//! Starting a period records a target and start date. Ending it scores every
//! current staff member against the target, archives the result under
//! `quota_<start>` and clears the active slot. Results are kept at full
//! precision; [`render_percentage`] rounds to one decimal for display.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::TallyError;
use crate::model::quota::percentage;
use crate::model::{QuotaHistoryEntry, QuotaState, StaffId, StaffResult};
use crate::platform::{Member, Notice, Platform, notify};
use crate::store::{SharedStore, Store, lock};

/// Target used by the monthly rollover when none is configured.
pub const DEFAULT_MONTHLY_TARGET: u32 = 15;

/// Live progress of one staff member in the active period.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Standing {
    pub staff_id: StaffId,
    pub monthly_tickets: u32,
    pub percentage: f64,
}

impl Store {
    /// Begin a quota period at `now`.
    ///
    /// Starting while a period is active overwrites its target and start date.
    pub fn start_quota(&mut self, target: i64, now: DateTime<Utc>) -> Result<QuotaState, TallyError> {
        let target = u32::try_from(target)
            .ok()
            .filter(|t| *t > 0)
            .ok_or(TallyError::InvalidTarget(target))?;
        if let Some(active) = self.data().quotas.active() {
            warn!(
                previous_target = active.target,
                previous_start = %active.start_date,
                "replacing active quota period without archiving it"
            );
        }
        let state = QuotaState {
            target,
            start_date: now,
        };
        self.mutate(|data| {
            data.quotas.set(state);
            Ok(())
        })?;
        info!(target, start = %now, "quota period started");
        Ok(state)
    }

    /// Close the active period, scoring every id in `roster`.
    pub fn end_quota(
        &mut self,
        roster: &[StaffId],
        now: DateTime<Utc>,
    ) -> Result<QuotaHistoryEntry, TallyError> {
        let active = self.data().quotas.active().ok_or(TallyError::NoActiveQuota)?;
        let staff_results = roster
            .iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|staff| {
                let monthly_tickets = self
                    .data()
                    .staff_stats
                    .get(staff)
                    .map_or(0, |s| s.monthly_tickets);
                let result = StaffResult {
                    monthly_tickets,
                    percentage_achieved: percentage(monthly_tickets, active.target),
                };
                (staff.clone(), result)
            })
            .collect();
        let entry = QuotaHistoryEntry {
            target: active.target,
            start_date: active.start_date,
            end_date: now,
            staff_results,
        };

        let key = unused_history_key(&self.data().quota_history, &active.period_id());
        let archived = entry.clone();
        self.mutate(|data| {
            data.quota_history.insert(key, archived);
            data.quotas.clear();
            Ok(())
        })?;
        info!(
            target = entry.target,
            staff = entry.staff_results.len(),
            "quota period ended"
        );
        Ok(entry)
    }

    /// Zero `monthlyTickets` for every staff member. Returns how many rows changed.
    pub fn reset_monthly_stats(&mut self) -> Result<usize, TallyError> {
        let reset = self.mutate(|data| {
            let mut reset = 0;
            for stats in data.staff_stats.values_mut() {
                if stats.monthly_tickets != 0 {
                    stats.monthly_tickets = 0;
                    reset += 1;
                }
            }
            Ok(reset)
        })?;
        info!(reset, "monthly stats reset");
        Ok(reset)
    }

    /// Progress of every roster member against the active target, best first.
    pub fn standings(&self, roster: &[StaffId]) -> Result<(QuotaState, Vec<Standing>), TallyError> {
        let active = self.data().quotas.active().ok_or(TallyError::NoActiveQuota)?;
        let mut rows: Vec<Standing> = roster
            .iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|staff| {
                let monthly_tickets = self
                    .data()
                    .staff_stats
                    .get(staff)
                    .map_or(0, |s| s.monthly_tickets);
                Standing {
                    staff_id: staff.clone(),
                    monthly_tickets,
                    percentage: percentage(monthly_tickets, active.target),
                }
            })
            .collect();
        rows.sort_by(|a, b| {
            b.monthly_tickets
                .cmp(&a.monthly_tickets)
                .then_with(|| a.staff_id.cmp(&b.staff_id))
        });
        Ok((active, rows))
    }

    /// The `limit` most recent finished periods, oldest first.
    #[must_use]
    pub fn quota_history(&self, limit: usize) -> Vec<(String, QuotaHistoryEntry)> {
        let mut entries: Vec<(String, QuotaHistoryEntry)> = self
            .data()
            .quota_history
            .iter()
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect();
        entries.sort_by_key(|(_, entry)| entry.start_date);
        let skip = entries.len().saturating_sub(limit);
        entries.split_off(skip)
    }
}

/// History entries are never overwritten; a start collision gets `-2`, `-3`...
fn unused_history_key<V>(history: &BTreeMap<String, V>, base: &str) -> String {
    if !history.contains_key(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|key| !history.contains_key(key))
        .unwrap_or_else(|| base.to_string())
}

/// Percentage as shown to people: one decimal place.
#[must_use]
pub fn render_percentage(value: f64) -> String {
    format!("{value:.1}%")
}

/// 00:00 UTC on the first day of the month after `now`.
#[must_use]
pub fn next_rollover(now: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map_or_else(
            || now + ChronoDuration::days(31),
            |naive| Utc.from_utc_datetime(&naive),
        )
}

/// Where period announcements go and what the rollover uses.
#[derive(Debug, Clone, Default)]
pub struct QuotaSettings {
    pub announcement_channel: Option<String>,
    pub default_target: u32,
}

/// Quota periods with their staff-facing announcements.
pub struct QuotaPeriods<P: Platform + ?Sized> {
    store: SharedStore,
    platform: Arc<P>,
    settings: QuotaSettings,
}

impl<P: Platform + ?Sized> QuotaPeriods<P> {
    pub const fn new(store: SharedStore, platform: Arc<P>, settings: QuotaSettings) -> Self {
        Self {
            store,
            platform,
            settings,
        }
    }

    /// Start a period; with `reset`, also zero everyone's monthly count.
    pub async fn start(&self, target: i64, reset: bool) -> Result<QuotaState, TallyError> {
        let state = {
            let mut store = lock(&self.store);
            let state = store.start_quota(target, Utc::now())?;
            if reset {
                store.reset_monthly_stats()?;
            }
            state
        };
        self.announce(
            Notice::new(
                "New Quota Period Started",
                format!(
                    "A new quota period has started!\n\nQuota Target: {} tickets\nStart Date: {}",
                    state.target,
                    state.start_date.format("%Y-%m-%d")
                ),
            )
            .field("Target", state.target.to_string()),
        )
        .await;
        Ok(state)
    }

    /// End the active period, scoring the platform's current staff roster.
    pub async fn end(&self) -> Result<QuotaHistoryEntry, TallyError> {
        if lock(&self.store).data().quotas.active().is_none() {
            return Err(TallyError::NoActiveQuota);
        }
        let members = self.platform.staff_members().await?;
        let roster: Vec<StaffId> = members.iter().map(|m| m.id.clone()).collect();
        let entry = lock(&self.store).end_quota(&roster, Utc::now())?;
        self.announce(results_notice(&entry, &members)).await;
        Ok(entry)
    }

    /// The monthly boundary: close the old period, open a fresh one, reset counts.
    pub async fn rollover(&self) -> Result<QuotaState, TallyError> {
        let active = lock(&self.store).data().quotas.active();
        if active.is_some() {
            self.end().await?;
        }
        let target = if self.settings.default_target == 0 {
            DEFAULT_MONTHLY_TARGET
        } else {
            self.settings.default_target
        };
        self.start(i64::from(target), true).await
    }

    async fn announce(&self, notice: Notice) {
        match self.settings.announcement_channel.as_deref() {
            Some(channel) => notify(self.platform.as_ref(), channel, notice).await,
            None => warn!(title = %notice.title, "no announcement channel configured"),
        }
    }
}

fn results_notice(entry: &QuotaHistoryEntry, members: &[Member]) -> Notice {
    let mut body = format!(
        "**Quota Period Results**\nPeriod: {} - {}\nQuota Target: {} tickets\n\n",
        entry.start_date.format("%Y-%m-%d"),
        entry.end_date.format("%Y-%m-%d"),
        entry.target
    );
    for (staff, result) in &entry.staff_results {
        let name = members
            .iter()
            .find(|m| &m.id == staff)
            .map_or_else(|| staff.to_string(), |m| m.username.clone());
        body.push_str(&format!(
            "{name}: {}/{} ({})\n",
            result.monthly_tickets,
            entry.target,
            render_percentage(result.percentage_achieved)
        ));
    }
    Notice::new("Quota Period Ended", body)
}

/// Run [`QuotaPeriods::rollover`] at every month boundary until aborted.
pub fn spawn_monthly_rollover<P>(periods: Arc<QuotaPeriods<P>>) -> JoinHandle<()>
where
    P: Platform + ?Sized + 'static,
{
    tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let next = next_rollover(now);
            let wait = (next - now).to_std().unwrap_or_default();
            info!(next = %next, "monthly quota rollover armed");
            tokio::time::sleep(wait).await;
            match periods.rollover().await {
                Ok(state) => info!(target = state.target, "monthly quota rollover complete"),
                Err(err) => error!(error = %err, "monthly quota rollover failed"),
            }
        }
    })
}
