//! Platform adapter for running without a chat gateway.
//!
//! The roster comes from `[staff]` in the project config. Notices are written
//! to stderr so JSON on stdout stays machine-readable. Threads do not exist
//! offline, so every thread operation reports `NotFound`.

use async_trait::async_trait;
use std::io::Write;

use tally_core::config::StaffMember;
use tally_core::model::{TicketId, UserId};
use tally_core::platform::{Channels, Member, Notice, PlatformError, Roster, ThreadInfo};

pub struct OfflinePlatform {
    staff: Vec<StaffMember>,
}

impl OfflinePlatform {
    pub const fn new(staff: Vec<StaffMember>) -> Self {
        Self { staff }
    }
}

fn to_member(staff: &StaffMember) -> Member {
    Member {
        id: staff.id.clone(),
        username: staff.name.clone(),
    }
}

/// Plain-text rendering of a notice, as printed offline.
pub fn format_notice(channel: &str, notice: &Notice) -> String {
    let mut out = format!("[{channel}] {}", notice.title);
    if !notice.body.is_empty() {
        out.push('\n');
        out.push_str(&notice.body);
    }
    for (name, value) in &notice.fields {
        out.push_str(&format!("\n  {name}: {value}"));
    }
    out
}

#[async_trait]
impl Roster for OfflinePlatform {
    async fn member(&self, id: &UserId) -> Result<Member, PlatformError> {
        self.staff
            .iter()
            .find(|m| &m.id == id)
            .map(to_member)
            .ok_or_else(|| PlatformError::member_not_found(id))
    }

    async fn staff_members(&self) -> Result<Vec<Member>, PlatformError> {
        Ok(self.staff.iter().map(to_member).collect())
    }

    async fn has_staff_role(&self, id: &UserId) -> Result<bool, PlatformError> {
        Ok(self.staff.iter().any(|m| &m.id == id))
    }
}

#[async_trait]
impl Channels for OfflinePlatform {
    async fn fetch_thread(&self, id: &TicketId) -> Result<ThreadInfo, PlatformError> {
        Err(PlatformError::thread_not_found(id))
    }

    async fn send(&self, channel: &str, notice: Notice) -> Result<(), PlatformError> {
        let text = format_notice(channel, &notice);
        writeln!(std::io::stderr().lock(), "{text}")
            .map_err(|err| PlatformError::Unavailable(err.to_string()))
    }

    async fn lock_thread(&self, id: &TicketId) -> Result<(), PlatformError> {
        Err(PlatformError::thread_not_found(id))
    }

    async fn archive_thread(&self, id: &TicketId) -> Result<(), PlatformError> {
        Err(PlatformError::thread_not_found(id))
    }

    async fn set_applied_tags(
        &self,
        id: &TicketId,
        _tags: Vec<String>,
    ) -> Result<(), PlatformError> {
        Err(PlatformError::thread_not_found(id))
    }
}
