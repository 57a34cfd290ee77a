use std::fmt;

use crate::model::{ParseEnumError, StaffId, TicketId, UserId};
use crate::platform::PlatformError;
use crate::store::PersistenceError;

/// Machine-readable error codes for operators and tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    TicketNotFound,
    MemberNotFound,
    ChannelNotFound,
    InvalidTarget,
    InvalidDelay,
    InvalidEnumValue,
    InvalidSelection,
    NotStaff,
    NotTicketCreator,
    NoActiveQuota,
    AlreadyClosed,
    NoStaffContributed,
    NoValidStaff,
    HasContributors,
    NoPendingRequest,
    TicketNotClosed,
    AlreadyCredited,
    NoCreditRequest,
    StoreReadFailed,
    CorruptStore,
    StoreWriteFailed,
    LockContention,
    PlatformUnavailable,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::TicketNotFound => "E2001",
            Self::MemberNotFound => "E2002",
            Self::ChannelNotFound => "E2003",
            Self::InvalidTarget => "E3001",
            Self::InvalidDelay => "E3002",
            Self::InvalidEnumValue => "E3003",
            Self::InvalidSelection => "E3004",
            Self::NotStaff => "E4001",
            Self::NotTicketCreator => "E4002",
            Self::NoActiveQuota => "E5001",
            Self::AlreadyClosed => "E5002",
            Self::NoStaffContributed => "E5003",
            Self::NoValidStaff => "E5004",
            Self::HasContributors => "E5005",
            Self::NoPendingRequest => "E5006",
            Self::TicketNotClosed => "E5007",
            Self::AlreadyCredited => "E5008",
            Self::NoCreditRequest => "E5009",
            Self::StoreReadFailed => "E6001",
            Self::CorruptStore => "E6002",
            Self::StoreWriteFailed => "E6003",
            Self::LockContention => "E6004",
            Self::PlatformUnavailable => "E7001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Project not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::TicketNotFound => "Ticket not found",
            Self::MemberNotFound => "Member not found",
            Self::ChannelNotFound => "Channel not found",
            Self::InvalidTarget => "Invalid quota target",
            Self::InvalidDelay => "Invalid delay",
            Self::InvalidEnumValue => "Invalid priority/category value",
            Self::InvalidSelection => "Invalid staff selection",
            Self::NotStaff => "Staff role required",
            Self::NotTicketCreator => "Only the ticket creator may do this",
            Self::NoActiveQuota => "No active quota period",
            Self::AlreadyClosed => "Ticket already closed",
            Self::NoStaffContributed => "No staff contributed to this ticket",
            Self::NoValidStaff => "No contributor is a current staff member",
            Self::HasContributors => "Ticket has contributors",
            Self::NoPendingRequest => "No pending close request",
            Self::TicketNotClosed => "Ticket is not closed",
            Self::AlreadyCredited => "Staff member already credited",
            Self::NoCreditRequest => "No pending credit request",
            Self::StoreReadFailed => "State file read failed",
            Self::CorruptStore => "Corrupt state file",
            Self::StoreWriteFailed => "State file write failed",
            Self::LockContention => "Lock contention",
            Self::PlatformUnavailable => "Chat platform call failed",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `tally init` to create the state files."),
            Self::ConfigParseError => Some("Fix syntax in .tally/config.toml and retry."),
            Self::InvalidTarget => Some("Use a positive whole number of tickets."),
            Self::InvalidDelay => Some("Use forms like `15m`, `2h`, `1d 2h 30m` or `1 week`."),
            Self::InvalidEnumValue => Some(
                "Priorities: urgent, high, normal, low. Categories: server, coins, refund, plugins, performance, other.",
            ),
            Self::InvalidSelection => Some("Select at least one recorded contributor."),
            Self::NoActiveQuota => Some("Start a period with `tally quota start <target>`."),
            Self::NoStaffContributed => {
                Some("Close without credit, or wait for staff to reply in the ticket.")
            }
            Self::HasContributors => Some("Close with credit and select the staff who helped."),
            Self::CorruptStore => {
                Some("Restore the state file from a backup; it is never repaired automatically.")
            }
            Self::StoreReadFailed | Self::StoreWriteFailed => {
                Some("Check disk space and file permissions.")
            }
            Self::LockContention => {
                Some("Another tally process is running; retry after it exits.")
            }
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
            Self::TicketNotFound
            | Self::MemberNotFound
            | Self::ChannelNotFound
            | Self::NotStaff
            | Self::NotTicketCreator
            | Self::AlreadyClosed
            | Self::NoValidStaff
            | Self::NoPendingRequest
            | Self::TicketNotClosed
            | Self::AlreadyCredited
            | Self::NoCreditRequest
            | Self::PlatformUnavailable => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// How a caller is expected to react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad input; report to the caller.
    Validation,
    /// Caller lacks the capability for the action.
    Permission,
    /// A referenced ticket, member or channel does not exist.
    NotFound,
    /// The action is not valid in the current lifecycle or quota state.
    State,
    /// Durable state could not be read or written. Fatal.
    Persistence,
    /// A platform side effect failed. Logged, never surfaced to the user.
    BestEffort,
}

/// Errors produced by ticket lifecycle, quota and scheduling operations.
#[derive(Debug, thiserror::Error)]
pub enum TallyError {
    #[error("quota target must be a positive number, got {0}")]
    InvalidTarget(i64),

    #[error("could not understand delay '{0}'")]
    InvalidDelay(String),

    #[error(transparent)]
    InvalidTag(#[from] ParseEnumError),

    #[error("select at least one staff member to credit")]
    EmptySelection,

    #[error("{0} is not a recorded contributor of this ticket")]
    NotAContributor(StaffId),

    #[error("{0} does not hold the staff role")]
    NotStaff(UserId),

    #[error("{0} did not open this ticket")]
    NotTicketCreator(UserId),

    #[error("ticket {0} not found")]
    TicketNotFound(TicketId),

    #[error("member {0} not found")]
    MemberNotFound(UserId),

    #[error("no active quota period")]
    NoActiveQuota,

    #[error("ticket {0} is already closed")]
    AlreadyClosed(TicketId),

    #[error("no staff contributed to ticket {0}")]
    NoStaffContributed(TicketId),

    #[error("none of the contributors of ticket {0} is a current staff member")]
    NoValidStaff(TicketId),

    #[error("ticket {0} has contributors; close it with credit")]
    HasContributors(TicketId),

    #[error("ticket {0} has no pending close request")]
    NoPendingRequest(TicketId),

    #[error("ticket {0} is not closed")]
    TicketNotClosed(TicketId),

    #[error("{staff} is already credited on ticket {ticket}")]
    AlreadyCredited { ticket: TicketId, staff: StaffId },

    #[error("{staff} has no pending credit request on ticket {ticket}")]
    NoCreditRequest { ticket: TicketId, staff: StaffId },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Platform(#[from] PlatformError),
}

impl TallyError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidTarget(_) => ErrorCode::InvalidTarget,
            Self::InvalidDelay(_) => ErrorCode::InvalidDelay,
            Self::InvalidTag(_) => ErrorCode::InvalidEnumValue,
            Self::EmptySelection | Self::NotAContributor(_) => ErrorCode::InvalidSelection,
            Self::NotStaff(_) => ErrorCode::NotStaff,
            Self::NotTicketCreator(_) => ErrorCode::NotTicketCreator,
            Self::TicketNotFound(_) => ErrorCode::TicketNotFound,
            Self::MemberNotFound(_) => ErrorCode::MemberNotFound,
            Self::NoActiveQuota => ErrorCode::NoActiveQuota,
            Self::AlreadyClosed(_) => ErrorCode::AlreadyClosed,
            Self::NoStaffContributed(_) => ErrorCode::NoStaffContributed,
            Self::NoValidStaff(_) => ErrorCode::NoValidStaff,
            Self::HasContributors(_) => ErrorCode::HasContributors,
            Self::NoPendingRequest(_) => ErrorCode::NoPendingRequest,
            Self::TicketNotClosed(_) => ErrorCode::TicketNotClosed,
            Self::AlreadyCredited { .. } => ErrorCode::AlreadyCredited,
            Self::NoCreditRequest { .. } => ErrorCode::NoCreditRequest,
            Self::Persistence(err) => err.code(),
            Self::Platform(err) => err.code(),
        }
    }

    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidTarget(_)
            | Self::InvalidDelay(_)
            | Self::InvalidTag(_)
            | Self::EmptySelection
            | Self::NotAContributor(_) => ErrorClass::Validation,
            Self::NotStaff(_) | Self::NotTicketCreator(_) => ErrorClass::Permission,
            Self::TicketNotFound(_) | Self::MemberNotFound(_) => ErrorClass::NotFound,
            Self::NoActiveQuota
            | Self::AlreadyClosed(_)
            | Self::NoStaffContributed(_)
            | Self::NoValidStaff(_)
            | Self::HasContributors(_)
            | Self::NoPendingRequest(_)
            | Self::TicketNotClosed(_)
            | Self::AlreadyCredited { .. }
            | Self::NoCreditRequest { .. } => ErrorClass::State,
            Self::Persistence(_) => ErrorClass::Persistence,
            Self::Platform(PlatformError::NotFound { .. }) => ErrorClass::NotFound,
            Self::Platform(_) => ErrorClass::BestEffort,
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorClass, ErrorCode, TallyError};
    use crate::model::PriorityLevel;
    use crate::platform::PlatformError;
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::NotInitialized,
            ErrorCode::ConfigParseError,
            ErrorCode::TicketNotFound,
            ErrorCode::MemberNotFound,
            ErrorCode::ChannelNotFound,
            ErrorCode::InvalidTarget,
            ErrorCode::InvalidDelay,
            ErrorCode::InvalidEnumValue,
            ErrorCode::InvalidSelection,
            ErrorCode::NotStaff,
            ErrorCode::NotTicketCreator,
            ErrorCode::NoActiveQuota,
            ErrorCode::AlreadyClosed,
            ErrorCode::NoStaffContributed,
            ErrorCode::NoValidStaff,
            ErrorCode::HasContributors,
            ErrorCode::NoPendingRequest,
            ErrorCode::TicketNotClosed,
            ErrorCode::AlreadyCredited,
            ErrorCode::NoCreditRequest,
            ErrorCode::StoreReadFailed,
            ErrorCode::CorruptStore,
            ErrorCode::StoreWriteFailed,
            ErrorCode::LockContention,
            ErrorCode::PlatformUnavailable,
            ErrorCode::InternalUnexpected,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::AlreadyClosed.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn errors_are_classified() {
        assert_eq!(TallyError::InvalidTarget(0).class(), ErrorClass::Validation);
        assert_eq!(TallyError::NotStaff("1".into()).class(), ErrorClass::Permission);
        assert_eq!(TallyError::NoActiveQuota.class(), ErrorClass::State);

        let tag_err = "critical".parse::<PriorityLevel>().unwrap_err();
        let err = TallyError::from(tag_err);
        assert_eq!(err.code(), ErrorCode::InvalidEnumValue);
        assert!(err.hint().is_some());

        let platform = TallyError::from(PlatformError::Unavailable("gateway down".into()));
        assert_eq!(platform.class(), ErrorClass::BestEffort);
        let missing = TallyError::from(PlatformError::NotFound {
            kind: "thread",
            id: "9".into(),
        });
        assert_eq!(missing.class(), ErrorClass::NotFound);
    }
}
