//! Who may close a ticket, how, and what happens when they do.
//!
//! Every path ends in [`ClosureProtocol::finalize`]. Its first step runs in a
//! single store critical section that checks the lifecycle, awards points and
//! flips the ticket to `Closed`, so a user action racing a fired timer awards
//! points once and the loser sees `AlreadyClosed`. Platform side effects run
//! afterwards and never undo that step.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::TallyError;
use crate::model::{Lifecycle, Phase, ScheduledClosure, StaffId, TicketId, UserId};
use crate::platform::{Member, Notice, Platform, PlatformError, ThreadInfo, notify, require_staff};
use crate::schedule::{SharedSchedules, Timers};
use crate::store::{SharedStore, lock};

/// Most staff a creator can pick from in one selection.
pub const MAX_SELECTABLE: usize = 25;

const CLOSED_MESSAGE: &str = "This ticket has been closed. Thank you for reaching out!";
const ARCHIVE_MESSAGE: &str = "This ticket has been closed and will be archived.";
const NO_REASON: &str = "No reason provided";

/// Behaviour knobs for closing tickets.
#[derive(Debug, Clone)]
pub struct ClosureSettings {
    /// Forum tag names that mark a ticket as done, matched case-insensitively.
    pub solved_tags: Vec<String>,
    pub mod_log_channel: Option<String>,
    /// Offer the whole staff roster when a ticket has no recorded contributors.
    pub roster_fallback: bool,
}

impl Default for ClosureSettings {
    fn default() -> Self {
        Self {
            solved_tags: vec!["solved".to_string(), "closed".to_string()],
            mod_log_channel: None,
            roster_fallback: false,
        }
    }
}

/// Who triggered a closure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Closer {
    Staff(UserId),
    Creator(UserId),
    /// A durable schedule firing on behalf of the staff member who set it.
    Scheduled { requested_by: String },
}

impl Closer {
    fn describe(&self) -> String {
        match self {
            Self::Staff(id) | Self::Creator(id) => format!("<@{id}>"),
            Self::Scheduled { requested_by } => requested_by.clone(),
        }
    }
}

/// Result of a successful closure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseOutcome {
    pub ticket: TicketId,
    pub credited: BTreeSet<StaffId>,
    pub closed_at: DateTime<Utc>,
    /// Platform steps that failed after the close was persisted.
    pub side_effect_failures: usize,
}

/// Ticket closure over a shared store and a chat platform.
pub struct ClosureProtocol<P: Platform + ?Sized> {
    store: SharedStore,
    schedules: SharedSchedules,
    timers: Timers,
    platform: Arc<P>,
    settings: ClosureSettings,
}

impl<P: Platform + ?Sized> ClosureProtocol<P> {
    pub fn new(
        store: SharedStore,
        schedules: SharedSchedules,
        platform: Arc<P>,
        settings: ClosureSettings,
    ) -> Self {
        Self {
            store,
            schedules,
            timers: Timers::default(),
            platform,
            settings,
        }
    }

    #[must_use]
    pub const fn store(&self) -> &SharedStore {
        &self.store
    }

    #[must_use]
    pub const fn schedules(&self) -> &SharedSchedules {
        &self.schedules
    }

    #[must_use]
    pub const fn timers(&self) -> &Timers {
        &self.timers
    }

    #[must_use]
    pub fn platform(&self) -> &P {
        self.platform.as_ref()
    }

    #[must_use]
    pub const fn settings(&self) -> &ClosureSettings {
        &self.settings
    }

    /// Immediate staff closure, optionally after an in-process `delay`.
    ///
    /// The delay is not durable; use the scheduler for that. Points go to
    /// `credit` only.
    pub async fn staff_close(
        &self,
        ticket: &TicketId,
        actor: &UserId,
        reason: Option<String>,
        delay: Option<Duration>,
        credit: Option<StaffId>,
    ) -> Result<CloseOutcome, TallyError> {
        require_staff(self.platform.as_ref(), actor).await?;
        self.ensure_not_closed(ticket)?;
        if let Some(delay) = delay.filter(|d| !d.is_zero()) {
            debug!(%ticket, ?delay, "delaying staff closure");
            tokio::time::sleep(delay).await;
        }
        let thread = self.platform.fetch_thread(ticket).await?;
        let credited = credit.into_iter().collect();
        self.finalize(&thread, credited, Closer::Staff(actor.clone()), reason)
            .await
    }

    /// Staff the ticket creator may credit.
    pub async fn creator_candidates(
        &self,
        ticket: &TicketId,
        actor: &UserId,
    ) -> Result<Vec<Member>, TallyError> {
        let thread = self.creator_thread(ticket, actor).await?;
        self.ensure_not_closed(&thread.id)?;

        let contributors = lock(&self.store).contributors(ticket);
        let mut candidates = if contributors.is_empty() {
            if !self.settings.roster_fallback {
                return Err(TallyError::NoStaffContributed(ticket.clone()));
            }
            self.platform.staff_members().await?
        } else {
            let mut resolved = Vec::with_capacity(contributors.len());
            for staff in &contributors {
                match self.platform.member(staff).await {
                    Ok(member) => resolved.push(member),
                    Err(err) => warn!(%ticket, %staff, error = %err, "skipping unresolvable contributor"),
                }
            }
            resolved
        };

        if candidates.is_empty() {
            return Err(TallyError::NoValidStaff(ticket.clone()));
        }
        candidates.truncate(MAX_SELECTABLE);
        Ok(candidates)
    }

    /// Creator closure crediting `selected`, each of whom must have contributed.
    pub async fn creator_close(
        &self,
        ticket: &TicketId,
        actor: &UserId,
        selected: &[StaffId],
    ) -> Result<CloseOutcome, TallyError> {
        let thread = self.creator_thread(ticket, actor).await?;
        if selected.is_empty() {
            return Err(TallyError::EmptySelection);
        }

        let contributors = lock(&self.store).contributors(ticket);
        for staff in selected {
            let allowed = if contributors.is_empty() && self.settings.roster_fallback {
                self.platform.has_staff_role(staff).await?
            } else {
                contributors.contains(staff)
            };
            if !allowed {
                return Err(TallyError::NotAContributor(staff.clone()));
            }
        }

        let mut credited = BTreeSet::new();
        for staff in selected {
            match self.platform.member(staff).await {
                Ok(_) => {
                    credited.insert(staff.clone());
                }
                Err(PlatformError::NotFound { .. }) => {
                    warn!(%ticket, %staff, "selected contributor no longer resolves, not crediting");
                }
                Err(err) => return Err(err.into()),
            }
        }
        if credited.is_empty() {
            return Err(TallyError::NoValidStaff(ticket.clone()));
        }
        self.finalize(&thread, credited, Closer::Creator(actor.clone()), None)
            .await
    }

    /// Creator closure of a ticket nobody from staff touched.
    pub async fn creator_close_uncredited(
        &self,
        ticket: &TicketId,
        actor: &UserId,
    ) -> Result<CloseOutcome, TallyError> {
        let thread = self.creator_thread(ticket, actor).await?;
        if !lock(&self.store).contributors(ticket).is_empty() {
            return Err(TallyError::HasContributors(ticket.clone()));
        }
        self.finalize(
            &thread,
            BTreeSet::new(),
            Closer::Creator(actor.clone()),
            Some("Closed by the ticket creator with no staff contribution".to_string()),
        )
        .await
    }

    /// Staff asks the creator to close; the ticket moves to `PendingClosure`.
    ///
    /// `scheduled_for` only changes the notice; arming the durable timer is
    /// the scheduler's job.
    pub async fn request_close(
        &self,
        ticket: &TicketId,
        actor: &UserId,
        reason: Option<String>,
        scheduled_for: Option<DateTime<Utc>>,
    ) -> Result<ThreadInfo, TallyError> {
        let thread = self.staff_thread(ticket, actor).await?;
        let reason = reason.unwrap_or_else(|| NO_REASON.to_string());
        self.mark_pending(ticket, actor, &reason)?;
        self.announce_request(&thread, actor, &reason, scheduled_for)
            .await;
        Ok(thread)
    }

    /// Role check plus thread lookup for staff-initiated requests.
    pub(crate) async fn staff_thread(
        &self,
        ticket: &TicketId,
        actor: &UserId,
    ) -> Result<ThreadInfo, TallyError> {
        require_staff(self.platform.as_ref(), actor).await?;
        self.platform.fetch_thread(ticket).await.map_err(Into::into)
    }

    /// Persist the `PendingClosure` transition.
    pub(crate) fn mark_pending(
        &self,
        ticket: &TicketId,
        actor: &UserId,
        reason: &str,
    ) -> Result<(), TallyError> {
        let now = Utc::now();
        lock(&self.store).mutate(|data| {
            let phase = data.lifecycle(ticket).map_or(Phase::Open, Lifecycle::phase);
            phase
                .can_transition_to(Phase::PendingClosure)
                .map_err(|_| TallyError::AlreadyClosed(ticket.clone()))?;
            data.tickets.insert(
                ticket.clone(),
                Lifecycle::PendingClosure {
                    requested_by: actor.clone(),
                    reason: reason.to_string(),
                    requested_at: now,
                },
            );
            Ok(())
        })?;
        info!(%ticket, %actor, "close requested");
        Ok(())
    }

    /// Tell the creator (and, for scheduled closures, the mod log).
    pub(crate) async fn announce_request(
        &self,
        thread: &ThreadInfo,
        actor: &UserId,
        reason: &str,
        scheduled_for: Option<DateTime<Utc>>,
    ) {
        let notice = match scheduled_for {
            Some(close_at) => Notice::new(
                "Scheduled Ticket Closure",
                "This ticket has been scheduled for closure. Staff can still close it immediately.",
            )
            .field("Scheduled Close Time", close_at.to_rfc3339())
            .field("Reason", reason)
            .field("Requested By", format!("<@{actor}>")),
            None => Notice::new(
                "Ticket Closure Request",
                "A staff member has requested this ticket to be closed.",
            )
            .field(
                "Next Step",
                "If your issue has been resolved, please accept the request to close this ticket.",
            )
            .field("Reason", reason),
        }
        .mention(thread.owner_id.clone());
        notify(self.platform.as_ref(), thread.id.as_str(), notice).await;

        if let Some(close_at) = scheduled_for {
            self.mod_log(
                Notice::new(
                    "Ticket Closure Scheduled",
                    format!("Ticket \"{}\" scheduled for closure.", thread.name),
                )
                .field("Staff Member", format!("<@{actor}>"))
                .field("Close Time", close_at.to_rfc3339())
                .field("Reason", reason),
            )
            .await;
        }
    }

    /// Creator accepts a pending request; the requesting staff member is credited.
    pub async fn accept_close_request(
        &self,
        ticket: &TicketId,
        actor: &UserId,
    ) -> Result<CloseOutcome, TallyError> {
        let thread = self.creator_thread(ticket, actor).await?;
        let (requester, reason) = match lock(&self.store).data().lifecycle(ticket) {
            Some(Lifecycle::PendingClosure {
                requested_by,
                reason,
                ..
            }) => (requested_by.clone(), reason.clone()),
            Some(Lifecycle::Closed { .. }) => return Err(TallyError::AlreadyClosed(ticket.clone())),
            _ => return Err(TallyError::NoPendingRequest(ticket.clone())),
        };
        self.finalize(
            &thread,
            BTreeSet::from([requester]),
            Closer::Creator(actor.clone()),
            Some(reason),
        )
        .await
    }

    /// Closure on behalf of a fired schedule; no role check.
    pub(crate) async fn close_for_schedule(
        &self,
        record: &ScheduledClosure,
        thread: &ThreadInfo,
    ) -> Result<CloseOutcome, TallyError> {
        self.finalize(
            thread,
            BTreeSet::from([record.staff_id.clone()]),
            Closer::Scheduled {
                requested_by: record.requested_by.clone(),
            },
            Some(record.reason.clone()),
        )
        .await
    }

    async fn creator_thread(
        &self,
        ticket: &TicketId,
        actor: &UserId,
    ) -> Result<ThreadInfo, TallyError> {
        let thread = self.platform.fetch_thread(ticket).await?;
        if &thread.owner_id != actor {
            return Err(TallyError::NotTicketCreator(actor.clone()));
        }
        Ok(thread)
    }

    fn ensure_not_closed(&self, ticket: &TicketId) -> Result<(), TallyError> {
        if lock(&self.store).data().is_closed(ticket) {
            return Err(TallyError::AlreadyClosed(ticket.clone()));
        }
        Ok(())
    }

    /// The terminal step shared by every closure path.
    async fn finalize(
        &self,
        thread: &ThreadInfo,
        credited: BTreeSet<StaffId>,
        closer: Closer,
        reason: Option<String>,
    ) -> Result<CloseOutcome, TallyError> {
        let ticket = &thread.id;
        let closed_at = Utc::now();

        lock(&self.store).mutate(|data| {
            if let Some(lifecycle) = data.lifecycle(ticket) {
                lifecycle
                    .phase()
                    .can_transition_to(Phase::Closed)
                    .map_err(|_| TallyError::AlreadyClosed(ticket.clone()))?;
            }
            for staff in &credited {
                data.stats_mut(staff).award(ticket);
            }
            for stats in data.staff_stats.values_mut() {
                stats.active_tickets.remove(ticket);
            }
            data.contributions.remove(ticket);
            data.priorities.remove(ticket);
            data.categories.remove(ticket);
            data.notes.remove(ticket);
            data.tickets.insert(
                ticket.clone(),
                Lifecycle::Closed {
                    closed_at,
                    credited: credited.clone(),
                },
            );
            Ok(())
        })?;
        info!(%ticket, credited = credited.len(), closer = ?closer, "ticket closed");

        let removed = lock(&self.schedules).remove(ticket);
        match removed {
            Ok(Some(_)) => debug!(%ticket, "scheduled closure cleared"),
            Ok(None) => {}
            Err(err) => error!(%ticket, error = %err, "failed to clear scheduled closure"),
        }
        self.timers.cancel(ticket);

        let failures = self
            .announce_closure(thread, &credited, &closer, reason.as_deref())
            .await;

        Ok(CloseOutcome {
            ticket: ticket.clone(),
            credited,
            closed_at,
            side_effect_failures: failures,
        })
    }

    async fn announce_closure(
        &self,
        thread: &ThreadInfo,
        credited: &BTreeSet<StaffId>,
        closer: &Closer,
        reason: Option<&str>,
    ) -> usize {
        let ticket = &thread.id;
        let channel = ticket.as_str();
        let mut failures = 0;
        let mut step = |name: &str, result: Result<(), PlatformError>| {
            if let Err(err) = result {
                warn!(%ticket, step = name, error = %err, "closure side effect failed");
                failures += 1;
            }
        };

        let mut body = CLOSED_MESSAGE.to_string();
        if !credited.is_empty() {
            let names = self.display_names(credited).await;
            body.push_str(&format!("\nStaff who contributed: {}.", names.join(", ")));
        }
        let title = match closer {
            Closer::Staff(_) => "Ticket Closed by Staff",
            Closer::Creator(_) | Closer::Scheduled { .. } => "Ticket Closed",
        };
        step(
            "notice",
            self.platform.send(channel, Notice::new(title, body)).await,
        );
        step("lock", self.platform.lock_thread(ticket).await);
        step(
            "archive-notice",
            self.platform
                .send(channel, Notice::new("", ARCHIVE_MESSAGE))
                .await,
        );
        step("archive", self.platform.archive_thread(ticket).await);

        if let Some(tag) = thread.find_tag(&self.settings.solved_tags) {
            if !thread.applied_tags.contains(&tag.id) {
                let mut tags = thread.applied_tags.clone();
                tags.push(tag.id.clone());
                step("tag", self.platform.set_applied_tags(ticket, tags).await);
            }
        }

        let mod_log_title = match closer {
            Closer::Staff(_) => "Ticket Closed by Staff",
            Closer::Creator(_) => "Ticket Closed by Creator",
            Closer::Scheduled { .. } => "Ticket Closed by System",
        };
        let mut entry = Notice::new(
            mod_log_title,
            format!("Ticket \"{}\" was closed.", thread.name),
        )
        .field("Initiator", closer.describe())
        .field("Reason", reason.unwrap_or(NO_REASON))
        .field("Ticket ID", ticket.to_string());
        if !credited.is_empty() {
            let ids: Vec<String> = credited.iter().map(|s| format!("<@{s}>")).collect();
            entry = entry.field("Credited", ids.join(", "));
        }
        self.mod_log(entry).await;

        failures
    }

    async fn display_names(&self, staff: &BTreeSet<StaffId>) -> Vec<String> {
        let mut names = Vec::with_capacity(staff.len());
        for id in staff {
            match self.platform.member(id).await {
                Ok(member) => names.push(member.username),
                Err(_) => names.push(format!("User ID: {id}")),
            }
        }
        names
    }

    pub(crate) async fn mod_log(&self, notice: Notice) {
        if let Some(channel) = self.settings.mod_log_channel.as_deref() {
            notify(self.platform.as_ref(), channel, notice).await;
        }
    }
}
