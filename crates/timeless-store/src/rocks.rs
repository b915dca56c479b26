//! The `RocksDB` implementation of `Store`.
//!
//! Compound operations serialize through `write_lock` and commit through one
//! `WriteBatch`, which is what makes the conditional debit and the
//! refund-at-most-once guarantees hold.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, DBWithThreadMode,
    MultiThreaded, Options, WriteBatch,
};

use timeless_core::{
    BatchId, CreditTransaction, Generation, GenerationId, GenerationStatus, Profile,
    SubscriptionStatus, SupportTicket, TicketId, TransactionId, UserId,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{DispatchReceipt, Store, Transition};

/// Store implementation backed by an on-disk `RocksDB`.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    /// Serializes every operation that reads a balance or row state before
    /// writing it back.
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open the database at `path`, creating it and any missing column
    /// families on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Handle for a column family by name.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// CBOR-encode a row.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Decode a CBOR row.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Point lookup in a column family.
    fn db_get<T: serde::de::DeserializeOwned>(
        &self,
        cf_name: &str,
        key: &[u8],
    ) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Walk one owner's index entries newest first, returning the trailing id
    /// bytes. `before` is an exclusive cursor.
    fn list_scoped_ids(
        &self,
        cf_name: &str,
        owner: &[u8; 16],
        limit: usize,
        before: Option<[u8; 16]>,
    ) -> Result<Vec<[u8; 16]>> {
        let cf = self.cf(cf_name)?;
        let prefix = keys::scoped_prefix(owner);
        let seek = match before {
            Some(id) => keys::scoped_key(owner, id),
            None => keys::scoped_prefix_end(owner),
        };

        let mut ids = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&seek, Direction::Reverse));

        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            if !key.starts_with(&prefix) {
                break;
            }
            // The seek anchor itself is excluded; the cursor names the last
            // row the caller already has.
            if *key == *seek {
                continue;
            }

            ids.push(keys::extract_scoped_id(&key));
            if ids.len() >= limit {
                break;
            }
        }

        Ok(ids)
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Profile Operations
    // =========================================================================

    fn create_profile(&self, profile: &Profile) -> Result<()> {
        let _guard = self.lock();

        if self.get_profile(&profile.user_id)?.is_some() {
            return Err(StoreError::AlreadyExists);
        }

        let cf_profiles = self.cf(cf::PROFILES)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_profiles,
            keys::profile_key(&profile.user_id),
            Self::serialize(profile)?,
        );

        // The starting balance is itself a grant; surface it in the ledger.
        if profile.credits > 0 {
            let tx = CreditTransaction::grant(
                profile.user_id,
                profile.credits,
                profile.credits,
                "Welcome credits".to_string(),
            );
            self.stage_transaction(&mut batch, &tx)?;
        }

        self.write(batch)
    }

    fn get_profile(&self, user_id: &UserId) -> Result<Option<Profile>> {
        self.db_get(cf::PROFILES, &keys::profile_key(user_id))
    }

    fn delete_profile(&self, user_id: &UserId) -> Result<()> {
        let _guard = self.lock();

        if self.get_profile(user_id)?.is_none() {
            return Err(StoreError::NotFound);
        }

        let cf = self.cf(cf::PROFILES)?;
        self.db
            .delete_cf(&cf, keys::profile_key(user_id))
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn set_subscription_status(
        &self,
        user_id: &UserId,
        status: SubscriptionStatus,
    ) -> Result<Profile> {
        let _guard = self.lock();

        let mut profile = self.get_profile(user_id)?.ok_or(StoreError::NotFound)?;
        profile.subscription_status = status;
        profile.updated_at = chrono::Utc::now();

        let cf = self.cf(cf::PROFILES)?;
        self.db
            .put_cf(&cf, keys::profile_key(user_id), Self::serialize(&profile)?)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(profile)
    }

    // =========================================================================
    // Generation Operations
    // =========================================================================

    fn get_generation(&self, id: &GenerationId) -> Result<Option<Generation>> {
        self.db_get(cf::GENERATIONS, &keys::generation_key(id))
    }

    fn list_generations_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        before: Option<&GenerationId>,
    ) -> Result<Vec<Generation>> {
        let ids = self.list_scoped_ids(
            cf::GENERATIONS_BY_USER,
            user_id.as_bytes(),
            limit,
            before.map(GenerationId::to_bytes),
        )?;

        let mut generations = Vec::with_capacity(ids.len());
        for id_bytes in ids {
            let id = GenerationId::from_bytes(id_bytes);
            match self.get_generation(&id)? {
                Some(generation) => generations.push(generation),
                None => tracing::warn!(generation_id = %id, "orphaned generation index entry"),
            }
        }

        Ok(generations)
    }

    fn list_pending_generations(&self) -> Result<Vec<Generation>> {
        let cf = self.cf(cf::PENDING_GENERATIONS)?;
        let mut pending = Vec::new();

        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if key.len() != 16 {
                tracing::warn!("malformed pending index key, skipping");
                continue;
            }
            let mut bytes = [0u8; 16];
            bytes.copy_from_slice(&key);
            let id = GenerationId::from_bytes(bytes);

            match self.get_generation(&id)? {
                Some(generation) if generation.is_pending() => pending.push(generation),
                Some(_) | None => {
                    tracing::warn!(generation_id = %id, "stale pending index entry");
                }
            }
        }

        Ok(pending)
    }

    fn list_pending_generations_for_user(&self, user_id: &UserId) -> Result<Vec<Generation>> {
        let mut pending = self.list_pending_generations()?;
        pending.retain(|g| g.user_id == *user_id);
        Ok(pending)
    }

    fn list_batch(&self, batch_id: &BatchId) -> Result<Vec<Generation>> {
        let cf = self.cf(cf::GENERATIONS_BY_BATCH)?;
        let prefix = keys::scoped_prefix(&batch_id.to_bytes());

        let mut generations = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward));

        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            let id = GenerationId::from_bytes(keys::extract_scoped_id(&key));
            match self.get_generation(&id)? {
                Some(generation) => generations.push(generation),
                None => tracing::warn!(generation_id = %id, "orphaned batch index entry"),
            }
        }

        Ok(generations)
    }

    // =========================================================================
    // Transaction Operations
    // =========================================================================

    fn get_transaction(&self, id: &TransactionId) -> Result<Option<CreditTransaction>> {
        self.db_get(cf::TRANSACTIONS, &keys::transaction_key(id))
    }

    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        before: Option<&TransactionId>,
    ) -> Result<Vec<CreditTransaction>> {
        let ids = self.list_scoped_ids(
            cf::TRANSACTIONS_BY_USER,
            user_id.as_bytes(),
            limit,
            before.map(TransactionId::to_bytes),
        )?;

        let mut transactions = Vec::with_capacity(ids.len());
        for id_bytes in ids {
            let id = TransactionId::from_bytes(id_bytes);
            match self.get_transaction(&id)? {
                Some(tx) => transactions.push(tx),
                None => tracing::warn!(transaction_id = %id, "orphaned transaction index entry"),
            }
        }

        Ok(transactions)
    }

    // =========================================================================
    // Ticket Operations
    // =========================================================================

    fn put_ticket(&self, ticket: &SupportTicket) -> Result<()> {
        let cf_tickets = self.cf(cf::TICKETS)?;
        let cf_by_user = self.cf(cf::TICKETS_BY_USER)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_tickets,
            keys::ticket_key(&ticket.id),
            Self::serialize(ticket)?,
        );
        batch.put_cf(
            &cf_by_user,
            keys::scoped_key(ticket.user_id.as_bytes(), ticket.id.to_bytes()),
            [],
        );

        self.write(batch)
    }

    fn get_ticket(&self, id: &TicketId) -> Result<Option<SupportTicket>> {
        self.db_get(cf::TICKETS, &keys::ticket_key(id))
    }

    fn list_tickets_by_user(&self, user_id: &UserId) -> Result<Vec<SupportTicket>> {
        let ids = self.list_scoped_ids(cf::TICKETS_BY_USER, user_id.as_bytes(), usize::MAX, None)?;

        let mut tickets = Vec::with_capacity(ids.len());
        for id_bytes in ids {
            let id = TicketId::from_bytes(id_bytes);
            match self.get_ticket(&id)? {
                Some(ticket) => tickets.push(ticket),
                None => tracing::warn!(ticket_id = %id, "orphaned ticket index entry"),
            }
        }

        Ok(tickets)
    }

    fn delete_ticket(&self, id: &TicketId) -> Result<()> {
        let ticket = self.get_ticket(id)?.ok_or(StoreError::NotFound)?;

        let cf_tickets = self.cf(cf::TICKETS)?;
        let cf_by_user = self.cf(cf::TICKETS_BY_USER)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(&cf_tickets, keys::ticket_key(id));
        batch.delete_cf(
            &cf_by_user,
            keys::scoped_key(ticket.user_id.as_bytes(), id.to_bytes()),
        );

        self.write(batch)
    }

    // =========================================================================
    // Compound Operations
    // =========================================================================

    fn record_dispatch(&self, mut generations: Vec<Generation>) -> Result<DispatchReceipt> {
        let Some(first) = generations.first() else {
            return Err(StoreError::Database(
                "record_dispatch requires at least one generation".to_string(),
            ));
        };
        let user_id = first.user_id;
        let tool = first.tool.clone();
        let lead_id = first.id;

        if generations.iter().any(|g| g.user_id != user_id) {
            return Err(StoreError::Database(
                "record_dispatch batch spans multiple users".to_string(),
            ));
        }

        let _guard = self.lock();

        let mut profile = self.get_profile(&user_id)?.ok_or(StoreError::NotFound)?;
        let subscribed = profile.has_active_subscription();

        let total: i64 = if subscribed {
            for generation in &mut generations {
                generation.credits_used = 0;
            }
            0
        } else {
            generations.iter().map(|g| g.credits_used).sum()
        };

        if !profile.has_sufficient_credits(total) {
            return Err(StoreError::InsufficientCredits {
                balance: profile.credits,
                required: total,
            });
        }

        profile.credits -= total;
        profile.lifetime_credits_spent += total;
        profile.generation_count += i64::try_from(generations.len()).unwrap_or(i64::MAX);
        profile.updated_at = chrono::Utc::now();

        let cf_profiles = self.cf(cf::PROFILES)?;
        let cf_generations = self.cf(cf::GENERATIONS)?;
        let cf_by_user = self.cf(cf::GENERATIONS_BY_USER)?;
        let cf_by_batch = self.cf(cf::GENERATIONS_BY_BATCH)?;
        let cf_pending = self.cf(cf::PENDING_GENERATIONS)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_profiles,
            keys::profile_key(&user_id),
            Self::serialize(&profile)?,
        );

        for generation in &generations {
            batch.put_cf(
                &cf_generations,
                keys::generation_key(&generation.id),
                Self::serialize(generation)?,
            );
            batch.put_cf(
                &cf_by_user,
                keys::scoped_key(user_id.as_bytes(), generation.id.to_bytes()),
                [],
            );
            if let Some(batch_id) = &generation.batch_id {
                batch.put_cf(
                    &cf_by_batch,
                    keys::batch_generation_key(batch_id, &generation.id),
                    [],
                );
            }
            if generation.is_pending() {
                batch.put_cf(&cf_pending, keys::generation_key(&generation.id), []);
            }
        }

        if total > 0 {
            let tx = CreditTransaction::deduction(user_id, total, profile.credits, &tool, lead_id);
            self.stage_transaction(&mut batch, &tx)?;
        }

        self.write(batch)?;

        Ok(DispatchReceipt {
            generations,
            balance: profile.credits,
            credits_used: total,
        })
    }

    fn complete_generation(
        &self,
        id: &GenerationId,
        output_url: &str,
        thumbnail_url: Option<&str>,
    ) -> Result<Transition> {
        let _guard = self.lock();

        let mut generation = self.get_generation(id)?.ok_or(StoreError::NotFound)?;

        if generation.status.is_terminal() {
            return Ok(Transition {
                generation,
                changed: false,
                credits_refunded: 0,
            });
        }

        generation.status = GenerationStatus::Completed;
        generation.output_url = Some(output_url.to_string());
        if let Some(thumb) = thumbnail_url {
            generation.thumbnail_url = Some(thumb.to_string());
        }
        generation.updated_at = chrono::Utc::now();

        let cf_generations = self.cf(cf::GENERATIONS)?;
        let cf_pending = self.cf(cf::PENDING_GENERATIONS)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_generations,
            keys::generation_key(id),
            Self::serialize(&generation)?,
        );
        batch.delete_cf(&cf_pending, keys::generation_key(id));

        self.write(batch)?;

        Ok(Transition {
            generation,
            changed: true,
            credits_refunded: 0,
        })
    }

    fn fail_generation(&self, id: &GenerationId, reason: &str) -> Result<Transition> {
        let _guard = self.lock();

        let mut generation = self.get_generation(id)?.ok_or(StoreError::NotFound)?;

        if generation.status.is_terminal() {
            return Ok(Transition {
                generation,
                changed: false,
                credits_refunded: 0,
            });
        }

        generation.status = GenerationStatus::Failed;
        generation.failure_reason = Some(reason.to_string());
        generation.updated_at = chrono::Utc::now();

        let cf_generations = self.cf(cf::GENERATIONS)?;
        let cf_pending = self.cf(cf::PENDING_GENERATIONS)?;
        let cf_profiles = self.cf(cf::PROFILES)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_generations,
            keys::generation_key(id),
            Self::serialize(&generation)?,
        );
        batch.delete_cf(&cf_pending, keys::generation_key(id));

        // Return exactly what was debited at dispatch; subscribed dispatches
        // recorded credits_used = 0 and so refund nothing.
        let mut refunded = 0;
        if generation.credits_used > 0 {
            if let Some(mut profile) = self.get_profile(&generation.user_id)? {
                refunded = generation.credits_used;
                profile.credits += refunded;
                profile.updated_at = chrono::Utc::now();

                batch.put_cf(
                    &cf_profiles,
                    keys::profile_key(&generation.user_id),
                    Self::serialize(&profile)?,
                );

                let tx = CreditTransaction::refund(
                    generation.user_id,
                    refunded,
                    profile.credits,
                    format!("Refund: {}", generation.tool),
                    generation.id,
                );
                self.stage_transaction(&mut batch, &tx)?;
            } else {
                tracing::warn!(
                    user_id = %generation.user_id,
                    generation_id = %generation.id,
                    "profile missing during refund"
                );
            }
        }

        self.write(batch)?;

        Ok(Transition {
            generation,
            changed: true,
            credits_refunded: refunded,
        })
    }

    fn add_credits(&self, user_id: &UserId, amount: i64, description: &str) -> Result<i64> {
        let _guard = self.lock();

        let mut profile = self.get_profile(user_id)?.ok_or(StoreError::NotFound)?;
        profile.credits += amount;
        profile.lifetime_credits_granted += amount;
        profile.updated_at = chrono::Utc::now();

        let cf_profiles = self.cf(cf::PROFILES)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_profiles,
            keys::profile_key(user_id),
            Self::serialize(&profile)?,
        );

        let tx = CreditTransaction::grant(*user_id, amount, profile.credits, description.into());
        self.stage_transaction(&mut batch, &tx)?;

        self.write(batch)?;

        Ok(profile.credits)
    }
}

impl RocksStore {
    /// Stage a ledger entry and its user index into a pending batch.
    fn stage_transaction(&self, batch: &mut WriteBatch, tx: &CreditTransaction) -> Result<()> {
        let cf_tx = self.cf(cf::TRANSACTIONS)?;
        let cf_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;

        batch.put_cf(&cf_tx, keys::transaction_key(&tx.id), Self::serialize(tx)?);
        batch.put_cf(
            &cf_by_user,
            keys::scoped_key(tx.user_id.as_bytes(), tx.id.to_bytes()),
            [],
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use timeless_core::{BatchStatus, GenerationKind, TransactionType};

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn seeded_profile(store: &RocksStore, credits: i64) -> UserId {
        let user_id = UserId::generate();
        store
            .create_profile(&Profile::new(user_id, credits))
            .unwrap();
        user_id
    }

    fn pending_generation(user_id: UserId, tool: &str, cost: i64) -> Generation {
        Generation::pending(
            user_id,
            GenerationKind::Video,
            tool,
            cost,
            format!("task-{tool}"),
            "fal-ai/sync-lipsync",
        )
    }

    #[test]
    fn profile_crud() {
        let (store, _dir) = create_test_store();
        let user_id = seeded_profile(&store, 50);

        let profile = store.get_profile(&user_id).unwrap().unwrap();
        assert_eq!(profile.credits, 50);

        // Starting grant appears in the ledger
        let txs = store.list_transactions_by_user(&user_id, 10, None).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].transaction_type, TransactionType::Grant);
        assert_eq!(txs[0].amount, 50);

        // Double-create rejected
        let result = store.create_profile(&Profile::new(user_id, 10));
        assert!(matches!(result, Err(StoreError::AlreadyExists)));

        store.delete_profile(&user_id).unwrap();
        assert!(store.get_profile(&user_id).unwrap().is_none());
        assert!(matches!(
            store.delete_profile(&user_id),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn subscription_status_roundtrip() {
        let (store, _dir) = create_test_store();
        let user_id = seeded_profile(&store, 0);

        let updated = store
            .set_subscription_status(&user_id, SubscriptionStatus::Active)
            .unwrap();
        assert!(updated.has_active_subscription());

        let stored = store.get_profile(&user_id).unwrap().unwrap();
        assert!(stored.has_active_subscription());
    }

    #[test]
    fn record_dispatch_debits_and_inserts() {
        let (store, _dir) = create_test_store();
        let user_id = seeded_profile(&store, 10);

        let generation = Generation::completed(
            user_id,
            GenerationKind::Image,
            "upscale",
            3,
            "https://cdn.example/out.png".into(),
            "fal-ai/esrgan",
        );
        let receipt = store.record_dispatch(vec![generation]).unwrap();

        assert_eq!(receipt.balance, 7);
        assert_eq!(receipt.credits_used, 3);
        assert_eq!(receipt.generations.len(), 1);

        let profile = store.get_profile(&user_id).unwrap().unwrap();
        assert_eq!(profile.credits, 7);
        assert_eq!(profile.lifetime_credits_spent, 3);
        assert_eq!(profile.generation_count, 1);

        let listed = store.list_generations_by_user(&user_id, 10, None).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].tool, "upscale");

        // Completed rows never enter the pending index
        assert!(store.list_pending_generations().unwrap().is_empty());

        // Welcome grant + deduction
        let txs = store.list_transactions_by_user(&user_id, 10, None).unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].transaction_type, TransactionType::Deduction);
        assert_eq!(txs[0].amount, -3);
    }

    #[test]
    fn record_dispatch_insufficient_credits() {
        let (store, _dir) = create_test_store();
        let user_id = seeded_profile(&store, 2);

        let result = store.record_dispatch(vec![pending_generation(user_id, "lip-sync", 20)]);
        assert!(matches!(
            result,
            Err(StoreError::InsufficientCredits {
                balance: 2,
                required: 20
            })
        ));

        // Nothing was written
        let profile = store.get_profile(&user_id).unwrap().unwrap();
        assert_eq!(profile.credits, 2);
        assert!(store
            .list_generations_by_user(&user_id, 10, None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn concurrent_dispatches_cannot_both_debit() {
        let (store, _dir) = create_test_store();
        let user_id = seeded_profile(&store, 20);
        let store = std::sync::Arc::new(store);

        // Balance covers exactly one of the two dispatches.
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let store = std::sync::Arc::clone(&store);
                std::thread::spawn(move || {
                    store.record_dispatch(vec![pending_generation(user_id, "lip-sync", 20)])
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        assert!(results.iter().any(|r| matches!(
            r,
            Err(StoreError::InsufficientCredits { .. })
        )));

        let profile = store.get_profile(&user_id).unwrap().unwrap();
        assert_eq!(profile.credits, 0);
        assert_eq!(
            store
                .list_generations_by_user(&user_id, 10, None)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn subscribed_dispatch_is_free() {
        let (store, _dir) = create_test_store();
        let user_id = seeded_profile(&store, 5);
        store
            .set_subscription_status(&user_id, SubscriptionStatus::Active)
            .unwrap();

        let receipt = store
            .record_dispatch(vec![pending_generation(user_id, "lip-sync", 20)])
            .unwrap();

        assert_eq!(receipt.credits_used, 0);
        assert_eq!(receipt.balance, 5);
        assert_eq!(receipt.generations[0].credits_used, 0);

        // No deduction entry beyond the welcome grant
        let txs = store.list_transactions_by_user(&user_id, 10, None).unwrap();
        assert_eq!(txs.len(), 1);

        // Pending index sees the row
        assert_eq!(store.list_pending_generations().unwrap().len(), 1);
    }

    #[test]
    fn complete_generation_is_idempotent() {
        let (store, _dir) = create_test_store();
        let user_id = seeded_profile(&store, 30);

        let receipt = store
            .record_dispatch(vec![pending_generation(user_id, "lip-sync", 20)])
            .unwrap();
        let id = receipt.generations[0].id;

        let first = store
            .complete_generation(&id, "https://cdn.example/v.mp4", Some("https://cdn.example/t.jpg"))
            .unwrap();
        assert!(first.changed);
        assert_eq!(
            first.generation.output_url.as_deref(),
            Some("https://cdn.example/v.mp4")
        );
        assert!(store.list_pending_generations().unwrap().is_empty());

        let second = store
            .complete_generation(&id, "https://cdn.example/other.mp4", None)
            .unwrap();
        assert!(!second.changed);
        // First write wins
        assert_eq!(
            second.generation.output_url.as_deref(),
            Some("https://cdn.example/v.mp4")
        );
    }

    #[test]
    fn fail_generation_refunds_exactly_once() {
        let (store, _dir) = create_test_store();
        let user_id = seeded_profile(&store, 30);

        let receipt = store
            .record_dispatch(vec![pending_generation(user_id, "lip-sync", 20)])
            .unwrap();
        let id = receipt.generations[0].id;
        assert_eq!(receipt.balance, 10);

        let first = store.fail_generation(&id, "provider reported failure").unwrap();
        assert!(first.changed);
        assert_eq!(first.credits_refunded, 20);
        assert_eq!(
            first.generation.failure_reason.as_deref(),
            Some("provider reported failure")
        );

        let profile = store.get_profile(&user_id).unwrap().unwrap();
        assert_eq!(profile.credits, 30);

        // Second fail is a no-op: no double refund
        let second = store.fail_generation(&id, "again").unwrap();
        assert!(!second.changed);
        assert_eq!(second.credits_refunded, 0);
        assert_eq!(store.get_profile(&user_id).unwrap().unwrap().credits, 30);

        let txs = store.list_transactions_by_user(&user_id, 10, None).unwrap();
        let refunds: Vec<_> = txs
            .iter()
            .filter(|t| t.transaction_type == TransactionType::Refund)
            .collect();
        assert_eq!(refunds.len(), 1);
        assert_eq!(refunds[0].amount, 20);
        assert_eq!(refunds[0].generation_id, Some(id));
    }

    #[test]
    fn subscribed_failure_refunds_nothing() {
        let (store, _dir) = create_test_store();
        let user_id = seeded_profile(&store, 5);
        store
            .set_subscription_status(&user_id, SubscriptionStatus::Active)
            .unwrap();

        let receipt = store
            .record_dispatch(vec![pending_generation(user_id, "lip-sync", 20)])
            .unwrap();
        let id = receipt.generations[0].id;

        let transition = store.fail_generation(&id, "provider reported failure").unwrap();
        assert!(transition.changed);
        assert_eq!(transition.credits_refunded, 0);
        assert_eq!(store.get_profile(&user_id).unwrap().unwrap().credits, 5);
    }

    #[test]
    fn complete_after_fail_is_noop() {
        let (store, _dir) = create_test_store();
        let user_id = seeded_profile(&store, 30);

        let receipt = store
            .record_dispatch(vec![pending_generation(user_id, "lip-sync", 20)])
            .unwrap();
        let id = receipt.generations[0].id;

        store.fail_generation(&id, "timed out").unwrap();
        let transition = store
            .complete_generation(&id, "https://cdn.example/late.mp4", None)
            .unwrap();

        assert!(!transition.changed);
        assert_eq!(transition.generation.status, GenerationStatus::Failed);
    }

    #[test]
    fn batch_dispatch_links_children() {
        let (store, _dir) = create_test_store();
        let user_id = seeded_profile(&store, 30);
        let batch_id = BatchId::generate();

        let scenes = vec![
            pending_generation(user_id, "story-animate", 12).with_batch(batch_id),
            pending_generation(user_id, "story-animate", 12).with_batch(batch_id),
        ];
        let receipt = store.record_dispatch(scenes).unwrap();
        assert_eq!(receipt.credits_used, 24);
        assert_eq!(receipt.balance, 6);

        let children = store.list_batch(&batch_id).unwrap();
        assert_eq!(children.len(), 2);

        let statuses: Vec<_> = children.iter().map(|g| g.status).collect();
        assert_eq!(BatchStatus::aggregate(&statuses), BatchStatus::Processing);

        // One child fails: the aggregate fails and only that child refunds
        store
            .fail_generation(&children[0].id, "scene rejected")
            .unwrap();
        let children = store.list_batch(&batch_id).unwrap();
        let statuses: Vec<_> = children.iter().map(|g| g.status).collect();
        assert_eq!(BatchStatus::aggregate(&statuses), BatchStatus::Failed);
        assert_eq!(store.get_profile(&user_id).unwrap().unwrap().credits, 18);
    }

    #[test]
    fn insufficient_batch_writes_nothing() {
        let (store, _dir) = create_test_store();
        let user_id = seeded_profile(&store, 20);
        let batch_id = BatchId::generate();

        let scenes = vec![
            pending_generation(user_id, "story-animate", 12).with_batch(batch_id),
            pending_generation(user_id, "story-animate", 12).with_batch(batch_id),
        ];
        let result = store.record_dispatch(scenes);
        assert!(matches!(
            result,
            Err(StoreError::InsufficientCredits {
                balance: 20,
                required: 24
            })
        ));
        assert!(store.list_batch(&batch_id).unwrap().is_empty());
        assert_eq!(store.get_profile(&user_id).unwrap().unwrap().credits, 20);
    }

    #[test]
    fn transactions_paginate_newest_first() {
        let (store, _dir) = create_test_store();
        let user_id = seeded_profile(&store, 0);

        store.add_credits(&user_id, 10, "first").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        store.add_credits(&user_id, 20, "second").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        store.add_credits(&user_id, 30, "third").unwrap();

        let page1 = store.list_transactions_by_user(&user_id, 2, None).unwrap();
        assert_eq!(page1.len(), 2);
        assert_eq!(page1[0].description, "third");
        assert_eq!(page1[1].description, "second");

        let cursor = page1[1].id;
        let page2 = store
            .list_transactions_by_user(&user_id, 2, Some(&cursor))
            .unwrap();
        assert_eq!(page2.len(), 1);
        assert_eq!(page2[0].description, "first");
    }

    #[test]
    fn pending_listing_spans_users() {
        let (store, _dir) = create_test_store();
        let alice = seeded_profile(&store, 100);
        let bob = seeded_profile(&store, 100);

        store
            .record_dispatch(vec![pending_generation(alice, "lip-sync", 20)])
            .unwrap();
        store
            .record_dispatch(vec![pending_generation(bob, "lip-sync", 20)])
            .unwrap();

        assert_eq!(store.list_pending_generations().unwrap().len(), 2);
        let only_alice = store.list_pending_generations_for_user(&alice).unwrap();
        assert_eq!(only_alice.len(), 1);
        assert_eq!(only_alice[0].user_id, alice);
    }

    #[test]
    fn ticket_crud() {
        let (store, _dir) = create_test_store();
        let user_id = seeded_profile(&store, 0);

        let ticket = SupportTicket::new(user_id, "Stuck generation".into(), "Please check".into());
        store.put_ticket(&ticket).unwrap();

        let fetched = store.get_ticket(&ticket.id).unwrap().unwrap();
        assert_eq!(fetched.subject, "Stuck generation");

        let listed = store.list_tickets_by_user(&user_id).unwrap();
        assert_eq!(listed.len(), 1);

        store.delete_ticket(&ticket.id).unwrap();
        assert!(store.get_ticket(&ticket.id).unwrap().is_none());
        assert!(store.list_tickets_by_user(&user_id).unwrap().is_empty());
        assert!(matches!(
            store.delete_ticket(&ticket.id),
            Err(StoreError::NotFound)
        ));
    }
}
