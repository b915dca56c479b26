//! Credit ledger types.
//!
//! Every balance change writes one transaction record alongside the profile
//! update, so the ledger always reconciles against the balance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{GenerationId, TransactionId, UserId};

/// One balance change in the ledger.
///
/// Ids are ULIDs, so a prefix scan walks the ledger in creation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTransaction {
    /// Transaction ID.
    pub id: TransactionId,

    /// Owner of the affected balance.
    pub user_id: UserId,

    /// Amount in credits. Positive = credit, negative = debit.
    pub amount: i64,

    /// Direction of the entry.
    pub transaction_type: TransactionType,

    /// The balance once this entry applied.
    pub balance_after: i64,

    /// Free-form text shown in the ledger.
    pub description: String,

    /// The generation this transaction pays for or refunds, if any.
    pub generation_id: Option<GenerationId>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl CreditTransaction {
    /// Create a deduction for a dispatched generation. The stored amount is
    /// always negative.
    #[must_use]
    pub fn deduction(
        user_id: UserId,
        amount: i64,
        balance_after: i64,
        tool: &str,
        generation_id: GenerationId,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            amount: -amount.abs(),
            transaction_type: TransactionType::Deduction,
            balance_after,
            description: format!("Generation: {tool}"),
            generation_id: Some(generation_id),
            created_at: Utc::now(),
        }
    }

    /// Create a refund for a failed generation.
    #[must_use]
    pub fn refund(
        user_id: UserId,
        amount: i64,
        balance_after: i64,
        reason: String,
        generation_id: GenerationId,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            amount: amount.abs(),
            transaction_type: TransactionType::Refund,
            balance_after,
            description: reason,
            generation_id: Some(generation_id),
            created_at: Utc::now(),
        }
    }

    /// Create a credit grant (provisioning or a service-issued top-up).
    #[must_use]
    pub fn grant(user_id: UserId, amount: i64, balance_after: i64, description: String) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            amount: amount.abs(),
            transaction_type: TransactionType::Grant,
            balance_after,
            description,
            generation_id: None,
            created_at: Utc::now(),
        }
    }
}

/// Why a ledger entry exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Credits deducted for a generation.
    Deduction,

    /// Credits returned after a failed generation.
    Refund,

    /// Credits granted by the service (provisioning, support, promotions).
    Grant,
}

impl TransactionType {
    /// Check if this transaction type adds credits.
    #[must_use]
    pub const fn is_credit(&self) -> bool {
        matches!(self, Self::Refund | Self::Grant)
    }

    /// Check if this transaction type removes credits.
    #[must_use]
    pub const fn is_debit(&self) -> bool {
        matches!(self, Self::Deduction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deduction_is_negative() {
        let user_id = UserId::generate();
        let gen_id = GenerationId::generate();
        let tx = CreditTransaction::deduction(user_id, 20, 80, "lip-sync", gen_id);

        assert_eq!(tx.amount, -20);
        assert_eq!(tx.transaction_type, TransactionType::Deduction);
        assert_eq!(tx.balance_after, 80);
        assert_eq!(tx.generation_id, Some(gen_id));
        assert!(tx.description.contains("lip-sync"));
    }

    #[test]
    fn refund_is_positive_and_linked() {
        let user_id = UserId::generate();
        let gen_id = GenerationId::generate();
        let tx =
            CreditTransaction::refund(user_id, 20, 100, "Generation failed".into(), gen_id);

        assert_eq!(tx.amount, 20);
        assert_eq!(tx.transaction_type, TransactionType::Refund);
        assert_eq!(tx.generation_id, Some(gen_id));
    }

    #[test]
    fn grant_has_no_generation() {
        let tx = CreditTransaction::grant(UserId::generate(), 50, 50, "Welcome credits".into());
        assert_eq!(tx.amount, 50);
        assert!(tx.generation_id.is_none());
    }

    #[test]
    fn transaction_type_is_credit_debit() {
        assert!(TransactionType::Refund.is_credit());
        assert!(TransactionType::Grant.is_credit());
        assert!(!TransactionType::Deduction.is_credit());

        assert!(TransactionType::Deduction.is_debit());
        assert!(!TransactionType::Refund.is_debit());
    }
}
