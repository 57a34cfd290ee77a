use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{StaffId, TicketId};

/// Durable intent to close a ticket at `close_time`.
///
/// Written to disk before any timer is armed, so a crash between recording and
/// arming cannot lose the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledClosure {
    pub thread_id: TicketId,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub close_time: DateTime<Utc>,
    pub reason: String,
    /// Display name of the requester, used in notices.
    pub requested_by: String,
    /// Staff member credited when the closure fires.
    pub staff_id: StaffId,
}
