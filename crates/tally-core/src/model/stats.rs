use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::ids::TicketId;

/// Per-staff contribution counters.
///
/// Created lazily on first contribution and never deleted; `monthly_tickets`
/// is zeroed when a quota period resets monthly stats.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StaffStats {
    pub total_tickets: u32,
    pub monthly_tickets: u32,
    pub active_tickets: BTreeSet<TicketId>,
}

impl StaffStats {
    /// Credit one closed ticket.
    pub fn award(&mut self, ticket: &TicketId) {
        self.total_tickets = self.total_tickets.saturating_add(1);
        self.monthly_tickets = self.monthly_tickets.saturating_add(1);
        self.active_tickets.remove(ticket);
    }
}
