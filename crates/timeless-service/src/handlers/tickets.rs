//! Support ticket handlers. Plain user-scoped CRUD.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use timeless_core::{SupportTicket, TicketId, TicketStatus};
use timeless_store::Store;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Body for `POST /v1/tickets`.
#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    /// Short subject line.
    pub subject: String,
    /// Ticket body.
    pub body: String,
}

/// Ticket as returned by the API.
#[derive(Debug, Serialize)]
pub struct TicketResponse {
    /// Ticket ID.
    pub id: String,
    /// Subject line.
    pub subject: String,
    /// Ticket body.
    pub body: String,
    /// Open or closed.
    pub status: TicketStatus,
    /// When the ticket was opened.
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Last update time.
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<&SupportTicket> for TicketResponse {
    fn from(ticket: &SupportTicket) -> Self {
        Self {
            id: ticket.id.to_string(),
            subject: ticket.subject.clone(),
            body: ticket.body.clone(),
            status: ticket.status,
            created_at: ticket.created_at,
            updated_at: ticket.updated_at,
        }
    }
}

/// Response for `GET /v1/tickets`.
#[derive(Debug, Serialize)]
pub struct TicketListResponse {
    /// The user's tickets, newest first.
    pub tickets: Vec<TicketResponse>,
}

/// `POST /v1/tickets`
pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CreateTicketRequest>,
) -> Result<Json<TicketResponse>, ApiError> {
    if body.subject.trim().is_empty() {
        return Err(ApiError::BadRequest("subject is required".into()));
    }
    if body.body.trim().is_empty() {
        return Err(ApiError::BadRequest("body is required".into()));
    }

    let ticket = SupportTicket::new(auth.user_id, body.subject, body.body);
    state.store.put_ticket(&ticket)?;

    tracing::info!(user_id = %auth.user_id, ticket_id = %ticket.id, "Opened support ticket");

    Ok(Json(TicketResponse::from(&ticket)))
}

/// `GET /v1/tickets`
pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<TicketListResponse>, ApiError> {
    let tickets = state.store.list_tickets_by_user(&auth.user_id)?;

    Ok(Json(TicketListResponse {
        tickets: tickets.iter().map(TicketResponse::from).collect(),
    }))
}

/// `GET /v1/tickets/:id`
pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<TicketResponse>, ApiError> {
    let ticket = find_owned_ticket(&state, &auth, &id)?;
    Ok(Json(TicketResponse::from(&ticket)))
}

/// `DELETE /v1/tickets/:id`
pub async fn delete_ticket(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let ticket = find_owned_ticket(&state, &auth, &id)?;
    state.store.delete_ticket(&ticket.id)?;

    Ok(StatusCode::NO_CONTENT)
}

fn find_owned_ticket(
    state: &AppState,
    auth: &AuthUser,
    raw_id: &str,
) -> Result<SupportTicket, ApiError> {
    let id =
        TicketId::from_str(raw_id).map_err(|_| ApiError::BadRequest("Invalid ticket ID".into()))?;

    state
        .store
        .get_ticket(&id)?
        .filter(|t| t.user_id == auth.user_id)
        .ok_or_else(|| ApiError::NotFound("Ticket not found".into()))
}
