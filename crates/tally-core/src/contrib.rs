//! Which staff touched which open ticket.
//!
//! The contributor set recorded here is the only source of truth for who can
//! be credited when a ticket closes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::error::TallyError;
use crate::model::{Lifecycle, StaffId, TicketId, UserId};
use crate::platform::Roster;
use crate::store::{SharedStore, Store, lock};

/// One row of the staff leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub staff_id: StaffId,
    pub total_tickets: u32,
    pub monthly_tickets: u32,
    pub active_tickets: usize,
}

impl Store {
    /// Register a new ticket thread with no contributors.
    ///
    /// Returns `false` if the ticket is already known, in any phase.
    pub fn open_ticket(&mut self, ticket: &TicketId, now: DateTime<Utc>) -> Result<bool, TallyError> {
        if self.data().tickets.contains_key(ticket) {
            debug!(%ticket, "ticket already registered");
            return Ok(false);
        }
        self.mutate(|data| {
            data.contributions.entry(ticket.clone()).or_default();
            data.tickets
                .insert(ticket.clone(), Lifecycle::Open { opened_at: now });
            Ok(())
        })?;
        info!(%ticket, "ticket opened");
        Ok(true)
    }

    /// Record that `staff` contributed to `ticket`.
    ///
    /// Idempotent. A ticket the store has never seen is registered as open on
    /// the fly; a closed ticket is ignored and `false` is returned.
    pub fn record_contribution(
        &mut self,
        ticket: &TicketId,
        staff: &StaffId,
        now: DateTime<Utc>,
    ) -> Result<bool, TallyError> {
        let data = self.data();
        if data.is_closed(ticket) {
            debug!(%ticket, %staff, "ignoring contribution to closed ticket");
            return Ok(false);
        }
        let known = data.tickets.contains_key(ticket);
        let recorded = data
            .contributions
            .get(ticket)
            .is_some_and(|set| set.contains(staff));
        let active = data
            .staff_stats
            .get(staff)
            .is_some_and(|stats| stats.active_tickets.contains(ticket));
        if known && recorded && active {
            return Ok(false);
        }

        self.mutate(|data| {
            data.tickets
                .entry(ticket.clone())
                .or_insert(Lifecycle::Open { opened_at: now });
            data.contributions
                .entry(ticket.clone())
                .or_default()
                .insert(staff.clone());
            data.stats_mut(staff).active_tickets.insert(ticket.clone());
            Ok(())
        })?;
        debug!(%ticket, %staff, "contribution recorded");
        Ok(true)
    }

    /// Staff recorded on `ticket`; empty if unknown.
    #[must_use]
    pub fn contributors(&self, ticket: &TicketId) -> BTreeSet<StaffId> {
        self.data()
            .contributions
            .get(ticket)
            .cloned()
            .unwrap_or_default()
    }

    /// Roster members ranked by lifetime closed tickets, most first.
    #[must_use]
    pub fn leaderboard(&self, roster: &[StaffId]) -> Vec<LeaderboardEntry> {
        let mut rows: Vec<LeaderboardEntry> = roster
            .iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|staff| {
                let stats = self.data().staff_stats.get(staff);
                LeaderboardEntry {
                    staff_id: staff.clone(),
                    total_tickets: stats.map_or(0, |s| s.total_tickets),
                    monthly_tickets: stats.map_or(0, |s| s.monthly_tickets),
                    active_tickets: stats.map_or(0, |s| s.active_tickets.len()),
                }
            })
            .collect();
        rows.sort_by(|a, b| {
            b.total_tickets
                .cmp(&a.total_tickets)
                .then_with(|| a.staff_id.cmp(&b.staff_id))
        });
        rows
    }
}

/// Message-ingress hook: record `author` on `ticket` if they hold the staff role.
pub async fn record_if_staff<R: Roster + ?Sized>(
    store: &SharedStore,
    roster: &R,
    ticket: &TicketId,
    author: &UserId,
) -> Result<bool, TallyError> {
    if !roster.has_staff_role(author).await? {
        return Ok(false);
    }
    lock(store).record_contribution(ticket, author, Utc::now())
}

#[cfg(test)]
mod tests {
    use crate::model::{Lifecycle, StaffId, TicketId};
    use crate::store::Store;
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::load(dir.path().join("data.json")).unwrap();
        (dir, store)
    }

    #[test]
    fn open_ticket_registers_empty_contributors() {
        let (_dir, mut store) = store();
        let ticket = TicketId::new("1");

        assert!(store.open_ticket(&ticket, Utc::now()).unwrap());
        assert!(!store.open_ticket(&ticket, Utc::now()).unwrap());

        assert!(store.contributors(&ticket).is_empty());
        assert!(matches!(
            store.data().lifecycle(&ticket),
            Some(Lifecycle::Open { .. })
        ));
    }

    #[test]
    fn recording_is_idempotent() {
        let (_dir, mut store) = store();
        let ticket = TicketId::new("1");
        let staff = StaffId::new("7");

        assert!(store.record_contribution(&ticket, &staff, Utc::now()).unwrap());
        assert!(!store.record_contribution(&ticket, &staff, Utc::now()).unwrap());

        assert_eq!(store.contributors(&ticket), BTreeSet::from([staff.clone()]));
        assert!(store.data().staff_stats[&staff].active_tickets.contains(&ticket));
    }

    #[test]
    fn contributions_to_closed_tickets_are_ignored() {
        let (_dir, mut store) = store();
        let ticket = TicketId::new("1");
        store
            .mutate(|data| {
                data.tickets.insert(
                    ticket.clone(),
                    Lifecycle::Closed {
                        closed_at: Utc::now(),
                        credited: BTreeSet::new(),
                    },
                );
                Ok(())
            })
            .unwrap();

        assert!(!store.record_contribution(&ticket, &"7".into(), Utc::now()).unwrap());
        assert!(store.contributors(&ticket).is_empty());
        assert!(store.data().staff_stats.is_empty());
    }

    #[test]
    fn unknown_ticket_has_no_contributors() {
        let (_dir, store) = store();
        assert!(store.contributors(&"nope".into()).is_empty());
    }

    #[test]
    fn leaderboard_ranks_roster_by_total() {
        let (_dir, mut store) = store();
        store
            .mutate(|data| {
                data.stats_mut(&"a".into()).total_tickets = 2;
                data.stats_mut(&"b".into()).total_tickets = 9;
                data.stats_mut(&"gone".into()).total_tickets = 50;
                Ok(())
            })
            .unwrap();

        let roster: Vec<StaffId> = vec!["a".into(), "b".into(), "c".into()];
        let board = store.leaderboard(&roster);

        let order: Vec<&str> = board.iter().map(|row| row.staff_id.as_str()).collect();
        assert_eq!(order, ["b", "a", "c"]);
        assert_eq!(board[2].total_tickets, 0);
    }
}
