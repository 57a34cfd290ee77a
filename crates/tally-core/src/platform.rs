//! The seam between ticket bookkeeping and the chat platform.
//!
//! The embedding bot implements [`Roster`] and [`Channels`] over its gateway
//! client; tests and the CLI provide their own adapters. Every call is
//! fallible. Callers treat failures of notices, locks, archives and tag
//! updates as best-effort: they are logged and never undo a persisted change.

use async_trait::async_trait;
use tracing::warn;

use crate::error::{ErrorCode, TallyError};
use crate::model::{TicketId, UserId};

/// Failure talking to the chat platform.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("platform rejected the request: {0}")]
    Rejected(String),

    #[error("platform unavailable: {0}")]
    Unavailable(String),
}

impl PlatformError {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { kind, .. } => match *kind {
                "thread" => ErrorCode::TicketNotFound,
                "member" => ErrorCode::MemberNotFound,
                _ => ErrorCode::ChannelNotFound,
            },
            Self::Rejected(_) | Self::Unavailable(_) => ErrorCode::PlatformUnavailable,
        }
    }

    #[must_use]
    pub fn thread_not_found(id: &TicketId) -> Self {
        Self::NotFound {
            kind: "thread",
            id: id.to_string(),
        }
    }

    #[must_use]
    pub fn member_not_found(id: &UserId) -> Self {
        Self::NotFound {
            kind: "member",
            id: id.to_string(),
        }
    }
}

/// A guild member as seen by the roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: UserId,
    pub username: String,
}

/// A tag the forum channel defines and a thread may carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForumTag {
    pub id: String,
    pub name: String,
}

/// Snapshot of a ticket thread fetched from the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub id: TicketId,
    pub name: String,
    pub owner_id: UserId,
    pub archived: bool,
    pub locked: bool,
    pub applied_tags: Vec<String>,
    pub available_tags: Vec<ForumTag>,
}

impl ThreadInfo {
    /// Closed on the platform side, whatever our store says.
    #[must_use]
    pub const fn is_inactive(&self) -> bool {
        self.archived || self.locked
    }

    /// Id of the first forum tag whose name matches one of `names`.
    #[must_use]
    pub fn find_tag(&self, names: &[String]) -> Option<&ForumTag> {
        self.available_tags.iter().find(|tag| {
            names
                .iter()
                .any(|name| tag.name.eq_ignore_ascii_case(name.trim()))
        })
    }
}

/// An outbound message, rendered by the adapter (embed, plain text, stdout).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub body: String,
    pub fields: Vec<(String, String)>,
    pub mention: Option<UserId>,
}

impl Notice {
    #[must_use]
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn mention(mut self, user: UserId) -> Self {
        self.mention = Some(user);
        self
    }
}

/// Membership and role queries.
#[async_trait]
pub trait Roster: Send + Sync {
    async fn member(&self, id: &UserId) -> Result<Member, PlatformError>;

    /// Everyone currently holding the staff role.
    async fn staff_members(&self) -> Result<Vec<Member>, PlatformError>;

    async fn has_staff_role(&self, id: &UserId) -> Result<bool, PlatformError>;
}

/// Thread and channel operations.
#[async_trait]
pub trait Channels: Send + Sync {
    async fn fetch_thread(&self, id: &TicketId) -> Result<ThreadInfo, PlatformError>;

    /// Post to a ticket thread or a configured channel id.
    async fn send(&self, channel: &str, notice: Notice) -> Result<(), PlatformError>;

    async fn lock_thread(&self, id: &TicketId) -> Result<(), PlatformError>;

    async fn archive_thread(&self, id: &TicketId) -> Result<(), PlatformError>;

    async fn set_applied_tags(&self, id: &TicketId, tags: Vec<String>)
    -> Result<(), PlatformError>;
}

/// Everything the lifecycle needs from the chat platform.
pub trait Platform: Roster + Channels {}

impl<T: Roster + Channels + ?Sized> Platform for T {}

/// Fail with `NotStaff` unless `actor` holds the staff role.
pub async fn require_staff<R: Roster + ?Sized>(roster: &R, actor: &UserId) -> Result<(), TallyError> {
    if roster.has_staff_role(actor).await? {
        Ok(())
    } else {
        Err(TallyError::NotStaff(actor.clone()))
    }
}

/// Send a notice, logging instead of failing.
pub async fn notify<C: Channels + ?Sized>(channels: &C, channel: &str, notice: Notice) {
    let title = notice.title.clone();
    if let Err(err) = channels.send(channel, notice).await {
        warn!(channel, title = %title, error = %err, "failed to deliver notice");
    }
}

#[cfg(test)]
mod tests {
    use super::{ForumTag, Notice, PlatformError, ThreadInfo};
    use crate::error::ErrorCode;

    fn thread(tags: &[&str]) -> ThreadInfo {
        ThreadInfo {
            id: "1".into(),
            name: "ticket".into(),
            owner_id: "2".into(),
            archived: false,
            locked: false,
            applied_tags: Vec::new(),
            available_tags: tags
                .iter()
                .enumerate()
                .map(|(i, name)| ForumTag {
                    id: format!("tag-{i}"),
                    name: (*name).to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn find_tag_matches_case_insensitively() {
        let info = thread(&["Open", "Solved"]);
        let names = vec!["solved".to_string(), "closed".to_string()];
        assert_eq!(info.find_tag(&names).map(|t| t.id.as_str()), Some("tag-1"));
        assert!(thread(&["Open"]).find_tag(&names).is_none());
    }

    #[test]
    fn not_found_kinds_map_to_codes() {
        assert_eq!(
            PlatformError::thread_not_found(&"1".into()).code(),
            ErrorCode::TicketNotFound
        );
        assert_eq!(
            PlatformError::member_not_found(&"1".into()).code(),
            ErrorCode::MemberNotFound
        );
        assert_eq!(
            PlatformError::Rejected("missing permissions".into()).code(),
            ErrorCode::PlatformUnavailable
        );
    }

    #[test]
    fn notice_builder_collects_fields() {
        let notice = Notice::new("Ticket closed", "done")
            .field("Reason", "resolved")
            .mention("5".into());
        assert_eq!(notice.fields.len(), 1);
        assert_eq!(notice.mention.as_ref().map(|u| u.as_str()), Some("5"));
    }
}
