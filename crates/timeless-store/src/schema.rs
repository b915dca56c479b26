//! Column family layout.

/// Column family names.
pub mod cf {
    /// Primary profile records, keyed by `user_id`.
    pub const PROFILES: &str = "profiles";

    /// Generation records, keyed by `generation_id` (ULID).
    pub const GENERATIONS: &str = "generations";

    /// Per-user generation index, keyed by `user_id || generation_id`.
    /// Values are empty.
    pub const GENERATIONS_BY_USER: &str = "generations_by_user";

    /// Per-batch generation index, keyed by `batch_id || generation_id`.
    pub const GENERATIONS_BY_BATCH: &str = "generations_by_batch";

    /// Index of rows still in `processing`, keyed by `generation_id`.
    /// Inserted at async dispatch, removed on terminal transition. The
    /// sweeper and check endpoint scan this instead of the full table.
    pub const PENDING_GENERATIONS: &str = "pending_generations";

    /// Ledger rows, keyed by `transaction_id` (ULID).
    pub const TRANSACTIONS: &str = "transactions";

    /// Per-user ledger index, keyed by `user_id || transaction_id`.
    pub const TRANSACTIONS_BY_USER: &str = "transactions_by_user";

    /// Support tickets, keyed by `ticket_id` (ULID).
    pub const TICKETS: &str = "tickets";

    /// Per-user ticket index, keyed by `user_id || ticket_id`.
    pub const TICKETS_BY_USER: &str = "tickets_by_user";
}

/// Every column family, in the order the database opens them.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::PROFILES,
        cf::GENERATIONS,
        cf::GENERATIONS_BY_USER,
        cf::GENERATIONS_BY_BATCH,
        cf::PENDING_GENERATIONS,
        cf::TRANSACTIONS,
        cf::TRANSACTIONS_BY_USER,
        cf::TICKETS,
        cf::TICKETS_BY_USER,
    ]
}
