//! `RocksDB` storage layer for the Timeless generation service.
//!
//! This crate provides persistent storage for profiles, generations, credit
//! transactions, and support tickets using `RocksDB` with column families for
//! indexing.
//!
//! # Architecture
//!
//! See [`schema`] for the column family layout. Balance-touching operations
//! (`record_dispatch`, `fail_generation`, `add_credits`) are compound: each
//! runs as one critical section and commits through a single `WriteBatch`, so
//! a balance check can never race a debit and a refund can never be issued
//! twice.
//!
//! # Example
//!
//! ```no_run
//! use timeless_store::{RocksStore, Store};
//! use timeless_core::{Profile, UserId};
//!
//! let store = RocksStore::open("/tmp/timeless-db").unwrap();
//!
//! let user_id = UserId::generate();
//! store.create_profile(&Profile::new(user_id, 25)).unwrap();
//!
//! let profile = store.get_profile(&user_id).unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;

use timeless_core::{
    BatchId, CreditTransaction, Generation, GenerationId, Profile, SubscriptionStatus,
    SupportTicket, TicketId, TransactionId, UserId,
};

/// Result of an atomic dispatch commit.
#[derive(Debug, Clone)]
pub struct DispatchReceipt {
    /// The generation rows as persisted (fan-out dispatches carry several).
    pub generations: Vec<Generation>,

    /// Balance after the debit.
    pub balance: i64,

    /// Total credits actually debited. Zero for subscribed users.
    pub credits_used: i64,
}

/// Result of a reconciliation transition.
#[derive(Debug, Clone)]
pub struct Transition {
    /// The row after the operation.
    pub generation: Generation,

    /// False when the row was already terminal (idempotent no-op).
    pub changed: bool,

    /// Credits returned to the profile by this call. Zero unless a `failed`
    /// transition refunded a paid dispatch.
    pub credits_refunded: i64,
}

/// Storage operations the service depends on.
///
/// Kept behind a trait so handlers and tests do not care which backend
/// holds the rows.
pub trait Store: Send + Sync {
    // =========================================================================
    // Profile Operations
    // =========================================================================

    /// Create a profile, recording the starting grant in the ledger.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the user already has a profile.
    fn create_profile(&self, profile: &Profile) -> Result<()>;

    /// Get a profile by user ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_profile(&self, user_id: &UserId) -> Result<Option<Profile>>;

    /// Delete a profile by user ID.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the profile doesn't exist.
    fn delete_profile(&self, user_id: &UserId) -> Result<()>;

    /// Set the subscription status, returning the updated profile.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the profile doesn't exist.
    fn set_subscription_status(
        &self,
        user_id: &UserId,
        status: SubscriptionStatus,
    ) -> Result<Profile>;

    // =========================================================================
    // Generation Operations
    // =========================================================================

    /// Get a generation by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_generation(&self, id: &GenerationId) -> Result<Option<Generation>>;

    /// List a user's generations, newest first.
    ///
    /// `before` is an exclusive cursor: only rows older than it are returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_generations_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        before: Option<&GenerationId>,
    ) -> Result<Vec<Generation>>;

    /// List every row still in `processing`, across all users.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_pending_generations(&self) -> Result<Vec<Generation>>;

    /// List one user's rows still in `processing`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_pending_generations_for_user(&self, user_id: &UserId) -> Result<Vec<Generation>>;

    /// List all generations in a fan-out batch, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_batch(&self, batch_id: &BatchId) -> Result<Vec<Generation>>;

    // =========================================================================
    // Transaction Operations
    // =========================================================================

    /// Get a transaction by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_transaction(&self, id: &TransactionId) -> Result<Option<CreditTransaction>>;

    /// List a user's transactions, newest first, with an exclusive cursor.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        before: Option<&TransactionId>,
    ) -> Result<Vec<CreditTransaction>>;

    // =========================================================================
    // Ticket Operations
    // =========================================================================

    /// Insert or update a support ticket.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_ticket(&self, ticket: &SupportTicket) -> Result<()>;

    /// Get a ticket by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_ticket(&self, id: &TicketId) -> Result<Option<SupportTicket>>;

    /// List a user's tickets, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_tickets_by_user(&self, user_id: &UserId) -> Result<Vec<SupportTicket>>;

    /// Delete a ticket.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the ticket doesn't exist.
    fn delete_ticket(&self, id: &TicketId) -> Result<()>;

    // =========================================================================
    // Compound Operations
    // =========================================================================

    /// Commit a dispatch: conditionally debit the owner and insert the
    /// generation rows, atomically.
    ///
    /// Every row must belong to the same user. The debit is the sum of the
    /// rows' `credits_used`; for subscribed users the rows are rewritten with
    /// `credits_used = 0` and nothing is debited. A deduction ledger entry is
    /// written whenever the debit is non-zero.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the profile doesn't exist.
    /// - `StoreError::InsufficientCredits` if the balance cannot cover the
    ///   debit. No row is written.
    fn record_dispatch(&self, generations: Vec<Generation>) -> Result<DispatchReceipt>;

    /// Transition a `processing` row to `completed` and clear it from the
    /// pending index. Terminal rows are left untouched (`changed: false`).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the generation doesn't exist.
    fn complete_generation(
        &self,
        id: &GenerationId,
        output_url: &str,
        thumbnail_url: Option<&str>,
    ) -> Result<Transition>;

    /// Transition a `processing` row to `failed`, refunding its
    /// `credits_used` and recording the refund, atomically. Terminal rows are
    /// left untouched (`changed: false`), so a refund is issued at most once.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the generation doesn't exist.
    fn fail_generation(&self, id: &GenerationId, reason: &str) -> Result<Transition>;

    /// Add credits to a profile and record the grant, atomically.
    ///
    /// Returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the profile doesn't exist.
    fn add_credits(&self, user_id: &UserId, amount: i64, description: &str) -> Result<i64>;
}
