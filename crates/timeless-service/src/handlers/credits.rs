//! Credit balance and ledger handlers.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use timeless_core::{CreditTransaction, TransactionId, TransactionType, UserId};
use timeless_store::{Store, StoreError};

use crate::auth::{AuthUser, ServiceAuth};
use crate::error::ApiError;
use crate::state::AppState;

/// Default page size for transaction listings.
const DEFAULT_PAGE_SIZE: usize = 50;
/// Hard cap on page size.
const MAX_PAGE_SIZE: usize = 100;

/// Response for `GET /v1/credits/balance`.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Current credit balance.
    pub credits: i64,
    /// Whether an active subscription bypasses per-tool debits.
    pub subscription_active: bool,
}

/// Query parameters for `GET /v1/credits/transactions`.
#[derive(Debug, Default, Deserialize)]
pub struct TransactionsQuery {
    /// Page size, capped at [`MAX_PAGE_SIZE`].
    pub limit: Option<usize>,
    /// Return rows strictly older than this transaction ID.
    pub starting_after: Option<String>,
}

/// Ledger row as returned by the API.
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    /// Transaction ID.
    pub id: String,
    /// Signed amount; negative values are debits.
    pub amount: i64,
    /// What kind of balance change this was.
    pub transaction_type: TransactionType,
    /// Balance after this transaction applied.
    pub balance_after: i64,
    /// Human-readable description.
    pub description: String,
    /// Generation this row pays for or refunds, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_id: Option<String>,
    /// When the transaction was recorded.
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<&CreditTransaction> for TransactionResponse {
    fn from(tx: &CreditTransaction) -> Self {
        Self {
            id: tx.id.to_string(),
            amount: tx.amount,
            transaction_type: tx.transaction_type,
            balance_after: tx.balance_after,
            description: tx.description.clone(),
            generation_id: tx.generation_id.map(|id| id.to_string()),
            created_at: tx.created_at,
        }
    }
}

/// Response for `GET /v1/credits/transactions`.
#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    /// Page of ledger rows, newest first.
    pub transactions: Vec<TransactionResponse>,
    /// Whether older rows exist beyond this page.
    pub has_more: bool,
}

/// Body for `POST /v1/credits/add`.
#[derive(Debug, Deserialize)]
pub struct AddCreditsRequest {
    /// User receiving the grant.
    pub user_id: String,
    /// Credits to add; must be positive.
    pub amount: i64,
    /// Ledger description; defaults to a generic grant label.
    #[serde(default)]
    pub description: Option<String>,
}

/// Response for `POST /v1/credits/add`.
#[derive(Debug, Serialize)]
pub struct AddCreditsResponse {
    /// User the grant applied to.
    pub user_id: String,
    /// Balance after the grant.
    pub balance: i64,
}

/// `GET /v1/credits/balance`
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    let profile = state
        .store
        .get_profile(&auth.user_id)?
        .ok_or_else(|| ApiError::NotFound("Profile not found".into()))?;

    Ok(Json(BalanceResponse {
        credits: profile.credits,
        subscription_active: profile.has_active_subscription(),
    }))
}

/// `GET /v1/credits/transactions`
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<TransactionsResponse>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);

    let before = match query.starting_after.as_deref() {
        Some(raw) => Some(
            TransactionId::from_str(raw)
                .map_err(|_| ApiError::BadRequest("Invalid starting_after cursor".into()))?,
        ),
        None => None,
    };

    let mut rows =
        state
            .store
            .list_transactions_by_user(&auth.user_id, limit + 1, before.as_ref())?;
    let has_more = rows.len() > limit;
    rows.truncate(limit);

    Ok(Json(TransactionsResponse {
        transactions: rows.iter().map(TransactionResponse::from).collect(),
        has_more,
    }))
}

/// `POST /v1/credits/add` (service auth)
pub async fn add_credits(
    State(state): State<Arc<AppState>>,
    service: ServiceAuth,
    Json(body): Json<AddCreditsRequest>,
) -> Result<Json<AddCreditsResponse>, ApiError> {
    let user_id = UserId::from_str(&body.user_id)
        .map_err(|_| ApiError::BadRequest("Invalid user ID".into()))?;

    if body.amount <= 0 {
        return Err(ApiError::BadRequest("amount must be positive".into()));
    }

    let description = body
        .description
        .clone()
        .unwrap_or_else(|| "Credit grant".to_string());

    let balance = match state.store.add_credits(&user_id, body.amount, &description) {
        Ok(balance) => balance,
        Err(StoreError::NotFound) => {
            return Err(ApiError::NotFound("Profile not found".into()))
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!(
        user_id = %user_id,
        amount = %body.amount,
        balance = %balance,
        service = %service.service_name,
        "Granted credits"
    );

    Ok(Json(AddCreditsResponse {
        user_id: user_id.to_string(),
        balance,
    }))
}
