//! User profile types.
//!
//! A profile tracks the credit balance and subscription flag consulted by
//! every paid tool invocation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// A user profile.
///
/// One row per user. The balance is only ever mutated through the store's
/// atomic operations (dispatch debit, failure refund, grant), each of which
/// also appends a ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// The user ID (from the identity provider).
    pub user_id: UserId,

    /// Current credit balance.
    pub credits: i64,

    /// Subscription state. Active subscribers are not debited per generation.
    pub subscription_status: SubscriptionStatus,

    /// Lifetime credits spent on generations.
    pub lifetime_credits_spent: i64,

    /// Lifetime credits granted (provisioning plus top-ups).
    pub lifetime_credits_granted: i64,

    /// Total generations dispatched for this user.
    pub generation_count: i64,

    /// When the profile was created.
    pub created_at: DateTime<Utc>,

    /// When the profile was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// Create a new profile with a starting credit grant.
    #[must_use]
    pub fn new(user_id: UserId, starting_credits: i64) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            credits: starting_credits,
            subscription_status: SubscriptionStatus::Inactive,
            lifetime_credits_spent: 0,
            lifetime_credits_granted: starting_credits,
            generation_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the profile has sufficient credits for a deduction.
    #[must_use]
    pub const fn has_sufficient_credits(&self, cost: i64) -> bool {
        self.credits >= cost
    }

    /// Check if the user holds an active subscription.
    ///
    /// Active subscribers bypass the credit check and are debited nothing.
    #[must_use]
    pub fn has_active_subscription(&self) -> bool {
        self.subscription_status == SubscriptionStatus::Active
    }
}

/// Status of a user's subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Subscription is active; generations are free of credit charges.
    Active,

    /// No subscription; every generation debits credits.
    Inactive,

    /// Subscription was cancelled and has lapsed. Treated like `Inactive`
    /// for billing, kept distinct for support tooling.
    Cancelled,
}
