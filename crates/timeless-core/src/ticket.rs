//! Support ticket types.
//!
//! Tickets are plain CRUD rows owned by their user; they are not part of the
//! generation pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{TicketId, UserId};

/// A support ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportTicket {
    /// Ticket ID, a ULID so rows sort by creation time.
    pub id: TicketId,

    /// The user who opened the ticket.
    pub user_id: UserId,

    /// Short subject line.
    pub subject: String,

    /// Ticket body.
    pub body: String,

    /// Open or closed.
    pub status: TicketStatus,

    /// When the ticket was opened.
    pub created_at: DateTime<Utc>,

    /// When the ticket was last updated.
    pub updated_at: DateTime<Utc>,
}

impl SupportTicket {
    /// Open a new ticket.
    #[must_use]
    pub fn new(user_id: UserId, subject: String, body: String) -> Self {
        let now = Utc::now();
        Self {
            id: TicketId::generate(),
            user_id,
            subject,
            body,
            status: TicketStatus::Open,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Lifecycle state of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Awaiting support.
    Open,
    /// Resolved.
    Closed,
}
