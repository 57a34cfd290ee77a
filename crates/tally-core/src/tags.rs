//! Staff-only ticket annotations: priority, category and notes.
//!
//! All three are scratch state for an open ticket and are dropped when it
//! closes. None of them affects who can close or who gets credit.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

use crate::error::TallyError;
use crate::model::{
    Category, CategoryTag, Note, PriorityLevel, PriorityTag, StaffId, TicketId,
};
use crate::platform::{Roster, require_staff};
use crate::store::{SharedStore, Store, lock};

/// How many open tickets carry each priority and category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagStatistics {
    pub priorities: BTreeMap<PriorityLevel, usize>,
    pub categories: BTreeMap<Category, usize>,
    pub untagged: usize,
}

impl Store {
    pub fn set_priority(
        &mut self,
        ticket: &TicketId,
        level: PriorityLevel,
        reason: impl Into<String>,
        set_by: &StaffId,
        now: DateTime<Utc>,
    ) -> Result<PriorityTag, TallyError> {
        let tag = PriorityTag {
            level,
            reason: reason.into(),
            set_by: set_by.clone(),
            set_at: now,
        };
        self.mutate(|data| {
            if data.is_closed(ticket) {
                return Err(TallyError::AlreadyClosed(ticket.clone()));
            }
            data.priorities.insert(ticket.clone(), tag.clone());
            Ok(())
        })?;
        info!(%ticket, priority = %level, "priority set");
        Ok(tag)
    }

    pub fn set_category(
        &mut self,
        ticket: &TicketId,
        category: Category,
        set_by: &StaffId,
        now: DateTime<Utc>,
    ) -> Result<CategoryTag, TallyError> {
        let tag = CategoryTag {
            category,
            set_by: set_by.clone(),
            set_at: now,
        };
        self.mutate(|data| {
            if data.is_closed(ticket) {
                return Err(TallyError::AlreadyClosed(ticket.clone()));
            }
            data.categories.insert(ticket.clone(), tag.clone());
            Ok(())
        })?;
        info!(%ticket, %category, "category set");
        Ok(tag)
    }

    pub fn add_note(
        &mut self,
        ticket: &TicketId,
        message: impl Into<String>,
        author: &StaffId,
        now: DateTime<Utc>,
    ) -> Result<Note, TallyError> {
        let note = Note {
            message: message.into(),
            author_id: author.clone(),
            created_at: now,
        };
        self.mutate(|data| {
            if data.is_closed(ticket) {
                return Err(TallyError::AlreadyClosed(ticket.clone()));
            }
            data.notes.entry(ticket.clone()).or_default().push(note.clone());
            Ok(())
        })?;
        Ok(note)
    }

    #[must_use]
    pub fn notes(&self, ticket: &TicketId) -> &[Note] {
        self.data()
            .notes
            .get(ticket)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn tag_statistics(&self) -> TagStatistics {
        let data = self.data();
        let mut stats = TagStatistics {
            priorities: PriorityLevel::ALL.into_iter().map(|p| (p, 0)).collect(),
            categories: Category::ALL.into_iter().map(|c| (c, 0)).collect(),
            untagged: 0,
        };
        for tag in data.priorities.values() {
            *stats.priorities.entry(tag.level).or_default() += 1;
        }
        for tag in data.categories.values() {
            *stats.categories.entry(tag.category).or_default() += 1;
        }
        stats.untagged = data
            .contributions
            .keys()
            .filter(|t| !data.priorities.contains_key(*t) && !data.categories.contains_key(*t))
            .count();
        stats
    }
}

/// Staff sets a ticket's priority from its textual name.
pub async fn set_priority<R: Roster + ?Sized>(
    store: &SharedStore,
    roster: &R,
    ticket: &TicketId,
    actor: &StaffId,
    level: &str,
    reason: &str,
) -> Result<PriorityTag, TallyError> {
    require_staff(roster, actor).await?;
    let level: PriorityLevel = level.parse()?;
    lock(store).set_priority(ticket, level, reason, actor, Utc::now())
}

/// Staff sets a ticket's category from its textual name.
pub async fn set_category<R: Roster + ?Sized>(
    store: &SharedStore,
    roster: &R,
    ticket: &TicketId,
    actor: &StaffId,
    category: &str,
) -> Result<CategoryTag, TallyError> {
    require_staff(roster, actor).await?;
    let category: Category = category.parse()?;
    lock(store).set_category(ticket, category, actor, Utc::now())
}

/// Staff attaches a note to a ticket.
pub async fn add_note<R: Roster + ?Sized>(
    store: &SharedStore,
    roster: &R,
    ticket: &TicketId,
    actor: &StaffId,
    message: &str,
) -> Result<Note, TallyError> {
    require_staff(roster, actor).await?;
    lock(store).add_note(ticket, message, actor, Utc::now())
}
