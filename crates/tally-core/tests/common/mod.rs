#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use tally_core::closure::{ClosureProtocol, ClosureSettings};
use tally_core::model::{TicketId, UserId};
use tally_core::platform::{
    Channels, ForumTag, Member, Notice, PlatformError, Roster, ThreadInfo,
};
use tally_core::schedule::{ScheduleBook, Scheduler};
use tally_core::store::Store;

pub const STAFF_A: &str = "100";
pub const STAFF_B: &str = "101";
pub const CREATOR: &str = "200";
pub const MOD_LOG: &str = "modlog";
pub const ANNOUNCE: &str = "announce";

#[derive(Debug, Default)]
struct State {
    staff: BTreeMap<UserId, String>,
    users: BTreeMap<UserId, String>,
    threads: BTreeMap<TicketId, ThreadInfo>,
    sent: Vec<(String, Notice)>,
    locked: BTreeSet<TicketId>,
    archived: BTreeSet<TicketId>,
    fail_sends: bool,
    offline: bool,
}

/// In-memory platform that records every side effect.
#[derive(Debug, Default)]
pub struct FakePlatform {
    state: Mutex<State>,
}

impl FakePlatform {
    pub fn new() -> Self {
        let platform = Self::default();
        platform.add_staff(STAFF_A, "alice");
        platform.add_staff(STAFF_B, "bob");
        platform.add_user(CREATOR, "carol");
        platform
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn add_staff(&self, id: &str, name: &str) {
        self.state().staff.insert(id.into(), name.to_string());
    }

    /// The member leaves the server entirely.
    pub fn remove_member(&self, id: &str) {
        let id = UserId::from(id);
        let mut state = self.state();
        state.staff.remove(&id);
        state.users.remove(&id);
    }

    pub fn add_user(&self, id: &str, name: &str) {
        self.state().users.insert(id.into(), name.to_string());
    }

    /// Register an open ticket thread owned by `owner` with a "Solved" forum tag.
    pub fn open_thread(&self, id: &str, owner: &str) -> TicketId {
        let ticket = TicketId::new(id);
        self.state().threads.insert(
            ticket.clone(),
            ThreadInfo {
                id: ticket.clone(),
                name: format!("ticket-{id}"),
                owner_id: owner.into(),
                archived: false,
                locked: false,
                applied_tags: Vec::new(),
                available_tags: vec![
                    ForumTag {
                        id: "tag-bug".into(),
                        name: "Bug".into(),
                    },
                    ForumTag {
                        id: "tag-solved".into(),
                        name: "Solved".into(),
                    },
                ],
            },
        );
        ticket
    }

    pub fn archive_externally(&self, id: &TicketId) {
        if let Some(thread) = self.state().threads.get_mut(id) {
            thread.archived = true;
        }
    }

    pub fn fail_sends(&self, fail: bool) {
        self.state().fail_sends = fail;
    }

    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    pub fn sent_to(&self, channel: &str) -> Vec<Notice> {
        self.state()
            .sent
            .iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, n)| n.clone())
            .collect()
    }

    pub fn titles_in(&self, channel: &str) -> Vec<String> {
        self.sent_to(channel).into_iter().map(|n| n.title).collect()
    }

    pub fn is_locked(&self, id: &TicketId) -> bool {
        self.state().locked.contains(id)
    }

    pub fn is_archived(&self, id: &TicketId) -> bool {
        self.state().archived.contains(id)
    }

    pub fn applied_tags(&self, id: &TicketId) -> Vec<String> {
        self.state()
            .threads
            .get(id)
            .map(|t| t.applied_tags.clone())
            .unwrap_or_default()
    }

    fn check_online(&self) -> Result<(), PlatformError> {
        if self.state().offline {
            return Err(PlatformError::Unavailable("gateway down".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Roster for FakePlatform {
    async fn member(&self, id: &UserId) -> Result<Member, PlatformError> {
        self.check_online()?;
        let state = self.state();
        state
            .staff
            .get(id)
            .or_else(|| state.users.get(id))
            .map(|name| Member {
                id: id.clone(),
                username: name.clone(),
            })
            .ok_or_else(|| PlatformError::member_not_found(id))
    }

    async fn staff_members(&self) -> Result<Vec<Member>, PlatformError> {
        self.check_online()?;
        Ok(self
            .state()
            .staff
            .iter()
            .map(|(id, name)| Member {
                id: id.clone(),
                username: name.clone(),
            })
            .collect())
    }

    async fn has_staff_role(&self, id: &UserId) -> Result<bool, PlatformError> {
        self.check_online()?;
        Ok(self.state().staff.contains_key(id))
    }
}

#[async_trait]
impl Channels for FakePlatform {
    async fn fetch_thread(&self, id: &TicketId) -> Result<ThreadInfo, PlatformError> {
        self.check_online()?;
        self.state()
            .threads
            .get(id)
            .cloned()
            .ok_or_else(|| PlatformError::thread_not_found(id))
    }

    async fn send(&self, channel: &str, notice: Notice) -> Result<(), PlatformError> {
        let mut state = self.state();
        if state.fail_sends {
            return Err(PlatformError::Rejected("missing permissions".into()));
        }
        state.sent.push((channel.to_string(), notice));
        Ok(())
    }

    async fn lock_thread(&self, id: &TicketId) -> Result<(), PlatformError> {
        let mut state = self.state();
        state.locked.insert(id.clone());
        if let Some(thread) = state.threads.get_mut(id) {
            thread.locked = true;
        }
        Ok(())
    }

    async fn archive_thread(&self, id: &TicketId) -> Result<(), PlatformError> {
        let mut state = self.state();
        state.archived.insert(id.clone());
        if let Some(thread) = state.threads.get_mut(id) {
            thread.archived = true;
        }
        Ok(())
    }

    async fn set_applied_tags(
        &self,
        id: &TicketId,
        tags: Vec<String>,
    ) -> Result<(), PlatformError> {
        match self.state().threads.get_mut(id) {
            Some(thread) => {
                thread.applied_tags = tags;
                Ok(())
            }
            None => Err(PlatformError::thread_not_found(id)),
        }
    }
}

pub fn settings() -> ClosureSettings {
    ClosureSettings {
        mod_log_channel: Some(MOD_LOG.to_string()),
        ..ClosureSettings::default()
    }
}

/// A closure protocol over fresh state files in `dir`.
pub fn protocol(
    dir: &Path,
    platform: Arc<FakePlatform>,
    settings: ClosureSettings,
) -> Arc<ClosureProtocol<FakePlatform>> {
    let store = Store::load(dir.join("data.json")).unwrap().into_shared();
    let schedules = ScheduleBook::load(dir.join("scheduled_closures.json"))
        .unwrap()
        .into_shared();
    Arc::new(ClosureProtocol::new(store, schedules, platform, settings))
}

pub fn scheduler(
    dir: &Path,
    platform: Arc<FakePlatform>,
) -> Scheduler<FakePlatform> {
    Scheduler::new(protocol(dir, platform, settings()))
}

pub fn user(id: &str) -> UserId {
    UserId::new(id)
}
