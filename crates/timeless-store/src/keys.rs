//! Binary key encoding.
//!
//! Primary keys are the raw 16 bytes of the UUID or ULID. Index keys are
//! `owner (16 bytes) || id (16 bytes)`; because ULIDs are time-ordered, index
//! entries for one owner sort in creation order.

use timeless_core::{BatchId, GenerationId, TicketId, TransactionId, UserId};

/// Key for one profile row.
#[must_use]
pub fn profile_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Key for one generation row.
#[must_use]
pub fn generation_key(id: &GenerationId) -> Vec<u8> {
    id.to_bytes().to_vec()
}

/// Key for one ledger row.
#[must_use]
pub fn transaction_key(id: &TransactionId) -> Vec<u8> {
    id.to_bytes().to_vec()
}

/// Key for one ticket row.
#[must_use]
pub fn ticket_key(id: &TicketId) -> Vec<u8> {
    id.to_bytes().to_vec()
}

/// Owner-scoped index key: `owner (16 bytes) || id (16 bytes)`.
#[must_use]
pub fn scoped_key(owner: &[u8; 16], id: [u8; 16]) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(owner);
    key.extend_from_slice(&id);
    key
}

/// Prefix for iterating one owner's index entries.
#[must_use]
pub fn scoped_prefix(owner: &[u8; 16]) -> Vec<u8> {
    owner.to_vec()
}

/// The greatest possible key under an owner's prefix, used as the seek
/// anchor for newest-first (reverse) iteration.
#[must_use]
pub fn scoped_prefix_end(owner: &[u8; 16]) -> Vec<u8> {
    scoped_key(owner, [0xff; 16])
}

/// Extract the trailing 16 id bytes from an owner-scoped index key.
///
/// # Panics
///
/// Panics on keys shorter than 32 bytes.
#[must_use]
pub fn extract_scoped_id(key: &[u8]) -> [u8; 16] {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[16..32]);
    bytes
}

/// Batch index key: `batch_id || generation_id`.
#[must_use]
pub fn batch_generation_key(batch_id: &BatchId, id: &GenerationId) -> Vec<u8> {
    scoped_key(&batch_id.to_bytes(), id.to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_key_length() {
        let user_id = UserId::generate();
        assert_eq!(profile_key(&user_id).len(), 16);
    }

    #[test]
    fn scoped_key_format() {
        let user_id = UserId::generate();
        let gen_id = GenerationId::generate();
        let key = scoped_key(user_id.as_bytes(), gen_id.to_bytes());

        assert_eq!(key.len(), 32);
        assert_eq!(&key[..16], user_id.as_bytes());
        assert_eq!(&key[16..], gen_id.to_bytes());
    }

    #[test]
    fn extract_scoped_id_roundtrip() {
        let user_id = UserId::generate();
        let tx_id = TransactionId::generate();
        let key = scoped_key(user_id.as_bytes(), tx_id.to_bytes());

        let extracted = TransactionId::from_bytes(extract_scoped_id(&key));
        assert_eq!(extracted, tx_id);
    }

    #[test]
    fn prefix_end_sorts_after_every_entry() {
        let user_id = UserId::generate();
        let gen_id = GenerationId::generate();
        let key = scoped_key(user_id.as_bytes(), gen_id.to_bytes());
        let end = scoped_prefix_end(user_id.as_bytes());

        assert!(end >= key);
        assert!(end.starts_with(user_id.as_bytes()));
    }
}
