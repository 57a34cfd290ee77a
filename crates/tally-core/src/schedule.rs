//! Durable delayed closures.
//!
//! A scheduled closure is recorded in its own JSON document before any timer
//! is armed. Timers are plain tokio tasks and die with the process;
//! [`Scheduler::rehydrate`] re-arms every surviving record at start-up and
//! fires the overdue ones immediately.
//!
//! Per record: `Requested -> Armed -> Fired | Cancelled`.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::closure::{CloseOutcome, ClosureProtocol};
use crate::error::TallyError;
use crate::model::{ScheduledClosure, StaffId, TicketId, UserId};
use crate::platform::Platform;
use crate::store::{PersistenceError, lock, read_json, write_json_atomic};

const SECOND: u64 = 1;
const MINUTE: u64 = 60 * SECOND;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;
const WEEK: u64 = 7 * DAY;
const MONTH: u64 = 30 * DAY;
const YEAR: u64 = 365 * DAY;

/// Parse a human delay such as `15m`, `2 hours` or `1d 2h 30m`.
///
/// Sums every `<integer><unit>` token. Units are recognized by prefix:
/// `y` years, `mon` months, `m` minutes, `w` weeks, `d` days, `h` hours and
/// `s` seconds, so `min`, `minutes`, `hr` and `weeks` all work. Whitespace may
/// separate the number from its unit and case is ignored. Text that is not a
/// token is skipped. Returns `None` when no token is found.
#[must_use]
pub fn parse_delay(text: &str) -> Option<Duration> {
    let lower = text.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let mut total: u64 = 0;
    let mut matched = false;
    let mut i = 0;

    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        let value: u64 = lower[start..i].parse().unwrap_or(u64::MAX);

        let mut unit_start = i;
        while unit_start < bytes.len() && bytes[unit_start].is_ascii_whitespace() {
            unit_start += 1;
        }
        let Some(seconds) = unit_seconds(&lower[unit_start..]) else {
            continue;
        };

        matched = true;
        total = total.saturating_add(value.saturating_mul(seconds));
        i = unit_start;
        while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
            i += 1;
        }
    }

    matched.then(|| Duration::from_secs(total))
}

fn unit_seconds(rest: &str) -> Option<u64> {
    if rest.starts_with("mon") {
        return Some(MONTH);
    }
    match rest.as_bytes().first()? {
        b'y' => Some(YEAR),
        b'w' => Some(WEEK),
        b'd' => Some(DAY),
        b'h' => Some(HOUR),
        b'm' => Some(MINUTE),
        b's' => Some(SECOND),
        _ => None,
    }
}

/// The scheduled-closure document, keyed by ticket.
#[derive(Debug)]
pub struct ScheduleBook {
    path: PathBuf,
    entries: BTreeMap<TicketId, ScheduledClosure>,
}

pub type SharedSchedules = Arc<Mutex<ScheduleBook>>;

impl ScheduleBook {
    /// Load the document at `path`; a missing file is an empty book.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        let entries = read_json(&path)?.unwrap_or_default();
        Ok(Self { path, entries })
    }

    pub fn save(&self) -> Result<(), PersistenceError> {
        write_json_atomic(&self.path, &self.entries)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn get(&self, ticket: &TicketId) -> Option<&ScheduledClosure> {
        self.entries.get(ticket)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records ordered by close time.
    #[must_use]
    pub fn pending(&self) -> Vec<ScheduledClosure> {
        let mut records: Vec<ScheduledClosure> = self.entries.values().cloned().collect();
        records.sort_by_key(|r| r.close_time);
        records
    }

    /// Insert or replace the record for its ticket and persist.
    pub fn insert(&mut self, record: ScheduledClosure) -> Result<(), PersistenceError> {
        let previous = self.entries.insert(record.thread_id.clone(), record.clone());
        if let Err(err) = self.save() {
            match previous {
                Some(previous) => self.entries.insert(record.thread_id, previous),
                None => self.entries.remove(&record.thread_id),
            };
            return Err(err);
        }
        Ok(())
    }

    /// Remove and persist; `Ok(None)` if nothing was scheduled.
    pub fn remove(&mut self, ticket: &TicketId) -> Result<Option<ScheduledClosure>, PersistenceError> {
        let Some(removed) = self.entries.remove(ticket) else {
            return Ok(None);
        };
        if let Err(err) = self.save() {
            self.entries.insert(ticket.clone(), removed);
            return Err(err);
        }
        Ok(Some(removed))
    }

    #[must_use]
    pub fn into_shared(self) -> SharedSchedules {
        Arc::new(Mutex::new(self))
    }
}

/// Armed in-process timers, at most one per ticket.
#[derive(Debug, Clone, Default)]
pub struct Timers {
    inner: Arc<Mutex<HashMap<TicketId, JoinHandle<()>>>>,
}

impl Timers {
    /// Track `handle` for `ticket`, aborting any timer it supersedes.
    pub fn arm(&self, ticket: TicketId, handle: JoinHandle<()>) {
        if let Some(previous) = lock(&self.inner).insert(ticket, handle) {
            previous.abort();
        }
    }

    /// Abort the timer for `ticket`. Returns whether one was armed.
    pub fn cancel(&self, ticket: &TicketId) -> bool {
        lock(&self.inner).remove(ticket).is_some_and(|handle| {
            handle.abort();
            true
        })
    }

    /// Stop tracking without aborting; used by a timer that is firing.
    fn detach(&self, ticket: &TicketId) {
        lock(&self.inner).remove(ticket);
    }

    #[must_use]
    pub fn is_armed(&self, ticket: &TicketId) -> bool {
        lock(&self.inner)
            .get(ticket)
            .is_some_and(|handle| !handle.is_finished())
    }

    #[must_use]
    pub fn armed(&self) -> Vec<TicketId> {
        let mut armed: Vec<TicketId> = lock(&self.inner)
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(ticket, _)| ticket.clone())
            .collect();
        armed.sort();
        armed
    }
}

/// What happened when a timer went off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
    Fired(CloseOutcome),
    /// The record was gone or superseded, the thread was already archived or
    /// locked, or the ticket was already closed.
    Cancelled,
    /// The single attempt failed; it was logged and the record dropped.
    Abandoned,
}

/// Tally of a start-up rehydration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RehydrateReport {
    pub armed: usize,
    pub fired: usize,
    pub cancelled: usize,
    pub abandoned: usize,
}

/// Durable delayed closure on top of a [`ClosureProtocol`].
pub struct Scheduler<P: Platform + ?Sized> {
    closure: Arc<ClosureProtocol<P>>,
}

impl<P: Platform + ?Sized + 'static> Scheduler<P> {
    pub const fn new(closure: Arc<ClosureProtocol<P>>) -> Self {
        Self { closure }
    }

    #[must_use]
    pub const fn closure(&self) -> &Arc<ClosureProtocol<P>> {
        &self.closure
    }

    /// Persist a closure due after `delay`, then arm its timer.
    pub fn schedule(
        &self,
        ticket: &TicketId,
        reason: impl Into<String>,
        requested_by: impl Into<String>,
        delay: Duration,
        staff_id: StaffId,
    ) -> Result<ScheduledClosure, TallyError> {
        let record = ScheduledClosure {
            thread_id: ticket.clone(),
            close_time: due_at(Utc::now(), delay),
            reason: reason.into(),
            requested_by: requested_by.into(),
            staff_id,
        };
        lock(self.closure.schedules()).insert(record.clone())?;
        info!(%ticket, close_time = %record.close_time, "closure scheduled");
        self.arm(&record);
        Ok(record)
    }

    /// Staff close request with a durable delay such as `"1d 2h"`.
    ///
    /// The record is persisted before the lifecycle changes and before anyone
    /// is told about it. If the lifecycle write fails, the book is put back.
    pub async fn request_delayed_close(
        &self,
        ticket: &TicketId,
        actor: &UserId,
        actor_name: &str,
        reason: Option<String>,
        delay_text: &str,
    ) -> Result<ScheduledClosure, TallyError> {
        let delay =
            parse_delay(delay_text).ok_or_else(|| TallyError::InvalidDelay(delay_text.to_string()))?;
        let thread = self.closure.staff_thread(ticket, actor).await?;
        if lock(self.closure.store()).data().is_closed(ticket) {
            return Err(TallyError::AlreadyClosed(ticket.clone()));
        }

        let record = ScheduledClosure {
            thread_id: ticket.clone(),
            close_time: due_at(Utc::now(), delay),
            reason: reason.unwrap_or_else(|| "No reason provided".to_string()),
            requested_by: actor_name.to_string(),
            staff_id: actor.clone(),
        };
        let previous = {
            let mut book = lock(self.closure.schedules());
            let previous = book.get(ticket).cloned();
            book.insert(record.clone())?;
            previous
        };

        if let Err(err) = self.closure.mark_pending(ticket, actor, &record.reason) {
            let mut book = lock(self.closure.schedules());
            let restored = match previous {
                Some(previous) => book.insert(previous),
                None => book.remove(ticket).map(|_| ()),
            };
            if let Err(restore_err) = restored {
                error!(%ticket, error = %restore_err, "failed to roll back scheduled closure");
            }
            return Err(err);
        }
        info!(%ticket, close_time = %record.close_time, "closure scheduled");

        self.closure
            .announce_request(&thread, actor, &record.reason, Some(record.close_time))
            .await;
        self.arm(&record);
        Ok(record)
    }

    /// Re-arm every persisted record; overdue ones fire before this returns.
    pub async fn rehydrate(&self) -> RehydrateReport {
        let records = lock(self.closure.schedules()).pending();
        let now = Utc::now();
        let mut report = RehydrateReport::default();

        for record in records {
            if record.close_time <= now {
                info!(ticket = %record.thread_id, "closure overdue, firing now");
                match self.fire(&record.thread_id, Some(record.close_time)).await {
                    FireOutcome::Fired(_) => report.fired += 1,
                    FireOutcome::Cancelled => report.cancelled += 1,
                    FireOutcome::Abandoned => report.abandoned += 1,
                }
            } else {
                debug!(ticket = %record.thread_id, close_time = %record.close_time, "re-arming closure");
                self.arm(&record);
                report.armed += 1;
            }
        }
        info!(?report, "scheduled closures rehydrated");
        report
    }

    /// Persisted records, soonest first.
    #[must_use]
    pub fn pending(&self) -> Vec<ScheduledClosure> {
        lock(self.closure.schedules()).pending()
    }

    #[must_use]
    pub fn armed(&self) -> Vec<TicketId> {
        self.closure.timers().armed()
    }

    /// Run the closure for `ticket` now.
    ///
    /// With `expected`, a record whose close time differs is treated as
    /// superseded and left alone.
    pub async fn fire(&self, ticket: &TicketId, expected: Option<DateTime<Utc>>) -> FireOutcome {
        fire_record(&self.closure, ticket, expected).await
    }

    fn arm(&self, record: &ScheduledClosure) {
        let remaining = (record.close_time - Utc::now())
            .to_std()
            .unwrap_or_default();
        let closure = Arc::clone(&self.closure);
        let ticket = record.thread_id.clone();
        let close_time = record.close_time;
        let task_ticket = ticket.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(remaining).await;
            let outcome = fire_record(&closure, &task_ticket, Some(close_time)).await;
            debug!(ticket = %task_ticket, ?outcome, "timer finished");
        });
        self.closure.timers().arm(ticket, handle);
    }
}

async fn fire_record<P: Platform + ?Sized>(
    closure: &ClosureProtocol<P>,
    ticket: &TicketId,
    expected: Option<DateTime<Utc>>,
) -> FireOutcome {
    let record = lock(closure.schedules()).get(ticket).cloned();
    let Some(record) = record else {
        debug!(%ticket, "scheduled closure no longer recorded");
        return FireOutcome::Cancelled;
    };
    if expected.is_some_and(|at| at != record.close_time) {
        debug!(%ticket, "scheduled closure superseded");
        return FireOutcome::Cancelled;
    }
    closure.timers().detach(ticket);

    let thread = match closure.platform().fetch_thread(ticket).await {
        Ok(thread) => thread,
        Err(err) => {
            error!(%ticket, error = %err, "could not fetch thread, abandoning scheduled closure");
            drop_record(closure, ticket);
            return FireOutcome::Abandoned;
        }
    };
    if thread.is_inactive() {
        info!(%ticket, "thread already archived or locked, dropping scheduled closure");
        drop_record(closure, ticket);
        return FireOutcome::Cancelled;
    }

    match closure.close_for_schedule(&record, &thread).await {
        Ok(outcome) => {
            info!(%ticket, "scheduled closure completed");
            FireOutcome::Fired(outcome)
        }
        Err(TallyError::AlreadyClosed(_)) => {
            debug!(%ticket, "ticket already closed before its timer fired");
            drop_record(closure, ticket);
            FireOutcome::Cancelled
        }
        Err(err) => {
            error!(%ticket, error = %err, "scheduled closure failed, abandoning it");
            drop_record(closure, ticket);
            FireOutcome::Abandoned
        }
    }
}

fn drop_record<P: Platform + ?Sized>(closure: &ClosureProtocol<P>, ticket: &TicketId) {
    if let Err(err) = lock(closure.schedules()).remove(ticket) {
        warn!(%ticket, error = %err, "failed to remove scheduled closure");
    }
}

fn due_at(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    ChronoDuration::from_std(delay)
        .ok()
        .and_then(|delay| now.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::{ScheduleBook, due_at, parse_delay};
    use crate::model::ScheduledClosure;
    use chrono::Utc;
    use proptest::prelude::*;
    use std::time::Duration;

    #[test]
    fn parses_compound_delays() {
        assert_eq!(
            parse_delay("1d 2h 30m"),
            Some(Duration::from_millis(86_400_000 + 7_200_000 + 1_800_000))
        );
        assert_eq!(parse_delay("15m"), Some(Duration::from_millis(900_000)));
    }

    #[test]
    fn unit_spellings_and_spacing() {
        assert_eq!(parse_delay("2 Hours"), Some(Duration::from_secs(7_200)));
        assert_eq!(parse_delay("1 week"), Some(Duration::from_secs(604_800)));
        assert_eq!(parse_delay("1mon"), Some(Duration::from_secs(30 * 86_400)));
        assert_eq!(parse_delay("3 months"), Some(Duration::from_secs(90 * 86_400)));
        assert_eq!(parse_delay("5min"), Some(Duration::from_secs(300)));
        assert_eq!(parse_delay("1yr"), Some(Duration::from_secs(365 * 86_400)));
        assert_eq!(parse_delay("10 sec"), Some(Duration::from_secs(10)));
        assert_eq!(parse_delay("1h30m"), Some(Duration::from_secs(5_400)));
    }

    #[test]
    fn rejects_text_without_tokens() {
        assert_eq!(parse_delay("garbage"), None);
        assert_eq!(parse_delay(""), None);
        assert_eq!(parse_delay("12"), None);
        assert_eq!(parse_delay("5 apples"), None);
    }

    #[test]
    fn unknown_tokens_are_skipped() {
        assert_eq!(parse_delay("5x 2h"), Some(Duration::from_secs(7_200)));
        assert_eq!(parse_delay("0m"), Some(Duration::ZERO));
    }

    #[test]
    fn huge_values_saturate() {
        let parsed = parse_delay("99999999999999999999999y").unwrap();
        assert_eq!(parsed, Duration::from_secs(u64::MAX));
        assert_eq!(due_at(Utc::now(), parsed), chrono::DateTime::<Utc>::MAX_UTC);
    }

    proptest! {
        #[test]
        fn never_panics(text in ".{0,64}") {
            let _ = parse_delay(&text);
        }

        #[test]
        fn hours_and_minutes_sum(h in 0u64..1_000, m in 0u64..1_000) {
            let parsed = parse_delay(&format!("{h}h {m}m"));
            prop_assert_eq!(parsed, Some(Duration::from_secs(h * 3_600 + m * 60)));
        }
    }

    #[test]
    fn book_persists_inserts_and_removals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scheduled_closures.json");
        let mut book = ScheduleBook::load(&path).unwrap();
        assert!(book.is_empty());

        book.insert(ScheduledClosure {
            thread_id: "1".into(),
            close_time: Utc::now(),
            reason: "resolved".into(),
            requested_by: "helper".into(),
            staff_id: "7".into(),
        })
        .unwrap();

        let reloaded = ScheduleBook::load(&path).unwrap();
        assert_eq!(reloaded.len(), 1);

        assert!(book.remove(&"1".into()).unwrap().is_some());
        assert!(book.remove(&"1".into()).unwrap().is_none());
        assert!(ScheduleBook::load(&path).unwrap().is_empty());
    }

    #[test]
    fn corrupt_book_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scheduled_closures.json");
        std::fs::write(&path, "[oops").unwrap();
        assert!(ScheduleBook::load(&path).is_err());
    }
}
