//! tally-core library.
//!
//! Ticket lifecycle for forum-thread support channels: contribution
//! tracking, staff-initiated and creator-initiated closure, durable delayed
//! closure, monthly quota periods and staff-only tagging.
//!
//! # Conventions
//!
//! - **Errors**: Domain operations return [`error::TallyError`]; each variant
//!   maps to a stable [`error::ErrorCode`]. Loading config and wiring in the
//!   binary use `anyhow::Result`.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`).
//!   Best-effort platform failures are logged at `warn!`, never returned.
//! - **State**: [`store::Store`] is the single owner of persisted state and is
//!   shared as [`store::SharedStore`]. Its mutex is never held across an
//!   `.await`.

pub mod closure;
pub mod config;
pub mod contrib;
pub mod credit;
pub mod error;
pub mod lock;
pub mod model;
pub mod platform;
pub mod quota;
pub mod schedule;
pub mod snapshot;
pub mod store;
pub mod tags;

pub use error::{ErrorCode, TallyError};
pub use store::{SharedStore, Store};
