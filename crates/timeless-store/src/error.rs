//! Error types for Timeless storage.

/// Alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Storage failure modes.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// `RocksDB` reported a failure.
    #[error("database error: {0}")]
    Database(String),

    /// A row would not encode or decode.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// No row under the requested key.
    #[error("not found")]
    NotFound,

    /// A profile already exists for the user.
    #[error("already exists")]
    AlreadyExists,

    /// Insufficient credits for the conditional debit.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Current balance in credits.
        balance: i64,
        /// Required amount in credits.
        required: i64,
    },
}
