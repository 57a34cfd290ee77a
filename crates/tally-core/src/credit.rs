//! Retroactive credit on tickets that are already closed.
//!
//! A staff member who helped but was not selected can ask to be credited.
//! The ticket creator approves or denies. An approval awards exactly one
//! point and is recorded in the ticket's `Closed.credited` set, which also
//! makes a second request for the same ticket fail with `AlreadyCredited`.

use chrono::Utc;
use tracing::info;

use crate::closure::ClosureProtocol;
use crate::error::TallyError;
use crate::model::{CreditRequest, Lifecycle, StaffId, TicketId, UserId};
use crate::platform::{Notice, Platform, notify, require_staff};
use crate::store::{StoreData, lock};

fn credited_on<'a>(
    data: &'a StoreData,
    ticket: &TicketId,
) -> Result<&'a std::collections::BTreeSet<StaffId>, TallyError> {
    match data.lifecycle(ticket) {
        Some(Lifecycle::Closed { credited, .. }) => Ok(credited),
        _ => Err(TallyError::TicketNotClosed(ticket.clone())),
    }
}

impl<P: Platform + ?Sized> ClosureProtocol<P> {
    /// Staff member `staff` asks to be credited on closed `ticket`.
    ///
    /// Repeating a pending request is a no-op that returns the original.
    pub async fn request_credit(
        &self,
        ticket: &TicketId,
        staff: &StaffId,
    ) -> Result<CreditRequest, TallyError> {
        require_staff(self.platform(), staff).await?;

        let request = lock(self.store()).mutate(|data| {
            if credited_on(data, ticket)?.contains(staff) {
                return Err(TallyError::AlreadyCredited {
                    ticket: ticket.clone(),
                    staff: staff.clone(),
                });
            }
            if let Some(existing) = data
                .credit_requests
                .iter()
                .find(|r| &r.ticket_id == ticket && &r.staff_id == staff)
            {
                return Ok(existing.clone());
            }
            let request = CreditRequest {
                ticket_id: ticket.clone(),
                staff_id: staff.clone(),
                requested_at: Utc::now(),
            };
            data.credit_requests.push(request.clone());
            Ok(request)
        })?;
        info!(%ticket, %staff, "credit requested");

        if let Ok(thread) = self.platform().fetch_thread(ticket).await {
            notify(
                self.platform(),
                thread.id.as_str(),
                Notice::new(
                    "Contribution Request",
                    format!("<@{staff}> has requested credit for helping with this ticket."),
                )
                .mention(thread.owner_id),
            )
            .await;
        }
        Ok(request)
    }

    /// Ticket creator `actor` approves or denies a pending credit request.
    ///
    /// Returns whether a point was awarded.
    pub async fn resolve_credit(
        &self,
        ticket: &TicketId,
        actor: &UserId,
        staff: &StaffId,
        approve: bool,
    ) -> Result<bool, TallyError> {
        let thread = self.platform().fetch_thread(ticket).await?;
        if &thread.owner_id != actor {
            return Err(TallyError::NotTicketCreator(actor.clone()));
        }

        let awarded = lock(self.store()).mutate(|data| {
            let position = data
                .credit_requests
                .iter()
                .position(|r| &r.ticket_id == ticket && &r.staff_id == staff)
                .ok_or_else(|| TallyError::NoCreditRequest {
                    ticket: ticket.clone(),
                    staff: staff.clone(),
                })?;
            data.credit_requests.remove(position);
            if !approve {
                return Ok(false);
            }

            let Some(Lifecycle::Closed { credited, .. }) = data.tickets.get_mut(ticket) else {
                return Err(TallyError::TicketNotClosed(ticket.clone()));
            };
            if !credited.insert(staff.clone()) {
                return Err(TallyError::AlreadyCredited {
                    ticket: ticket.clone(),
                    staff: staff.clone(),
                });
            }
            data.stats_mut(staff).award(ticket);
            Ok(true)
        })?;
        info!(%ticket, %staff, approve, awarded, "credit request resolved");

        let verdict = if awarded { "approved" } else { "denied" };
        self.mod_log(
            Notice::new(
                "Contribution Request Resolved",
                format!("Credit for ticket \"{}\" was {verdict}.", thread.name),
            )
            .field("Staff Member", format!("<@{staff}>"))
            .field("Ticket Creator", format!("<@{actor}>"))
            .field("Ticket ID", ticket.to_string()),
        )
        .await;
        Ok(awarded)
    }
}
