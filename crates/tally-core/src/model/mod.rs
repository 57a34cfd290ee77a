pub mod ids;
pub mod quota;
pub mod schedule;
pub mod stats;
pub mod tags;
pub mod ticket;

pub use ids::{StaffId, TicketId, UserId};
pub use quota::{QuotaHistoryEntry, QuotaSlot, QuotaState, StaffResult};
pub use schedule::ScheduledClosure;
pub use stats::StaffStats;
pub use tags::{
    Category, CategoryTag, CreditRequest, Note, ParseEnumError, PriorityLevel, PriorityTag,
};
pub use ticket::{InvalidTransition, Lifecycle, Phase};
