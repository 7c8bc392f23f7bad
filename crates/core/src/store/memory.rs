//! Reference in-memory store.
//!
//! `MemoryStore` implements the full transactional contract in process
//! memory: an advisory-lock set keyed on `(doctor, date)` scopes, staged
//! writes that publish atomically on commit, and the unique idempotency-key
//! constraint. Tests and the CLI run on it; production deployments swap in
//! an ACID database behind the same traits.
//!
//! For failure-path tests the store accepts an injected *conflict probe*: a
//! closure consulted on every commit that can force a `StorageConflict`, so
//! the orchestrator's retry loop can be exercised deterministically.

use crate::audit::AuditEvent;
use crate::doctor::{Doctor, DoctorId};
use crate::error::{TokenError, TokenResult};
use crate::slot::{Slot, SlotId};
use crate::store::{LockScope, StoreTxn, TokenStore};
use crate::token::{IdempotencyKey, Token, TokenId};
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

type ConflictProbe = Arc<dyn Fn() -> bool + Send + Sync>;

#[derive(Default)]
struct Tables {
    doctors: HashMap<DoctorId, Doctor>,
    slots: HashMap<SlotId, Slot>,
    tokens: HashMap<TokenId, Token>,
    tokens_by_key: HashMap<String, TokenId>,
    audits: Vec<AuditEvent>,
}

/// In-memory transactional store.
///
/// Cloning is cheap and shares the underlying tables, so one store can serve
/// many threads.
#[derive(Clone)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    busy: Arc<(Mutex<HashSet<LockScope>>, Condvar)>,
    conflict_probe: Option<ConflictProbe>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            busy: Arc::new((Mutex::new(HashSet::new()), Condvar::new())),
            conflict_probe: None,
        }
    }

    /// Creates a store whose commits consult `probe`; a `true` result makes
    /// the commit fail with `StorageConflict`. Used to test the retry path.
    pub fn with_conflict_probe(probe: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        Self {
            conflict_probe: Some(Arc::new(probe)),
            ..Self::new()
        }
    }

    fn tables(&self) -> TokenResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| TokenError::StorageUnavailable("store mutex poisoned".into()))
    }

    fn acquire_scope(&self, scope: LockScope) -> TokenResult<()> {
        let (lock, condvar) = &*self.busy;
        let mut held = lock
            .lock()
            .map_err(|_| TokenError::StorageUnavailable("lock table poisoned".into()))?;
        while held.contains(&scope) {
            held = condvar
                .wait(held)
                .map_err(|_| TokenError::StorageUnavailable("lock table poisoned".into()))?;
        }
        held.insert(scope);
        Ok(())
    }

    fn release_scope(&self, scope: &LockScope) {
        let (lock, condvar) = &*self.busy;
        if let Ok(mut held) = lock.lock() {
            held.remove(scope);
            condvar.notify_all();
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for MemoryStore {
    type Txn<'a> = MemoryTxn<'a>;

    fn begin(&self, scope: &LockScope) -> TokenResult<Self::Txn<'_>> {
        self.acquire_scope(*scope)?;
        Ok(MemoryTxn {
            store: self,
            scope: *scope,
            staged_doctors: HashMap::new(),
            staged_slots: HashMap::new(),
            staged_tokens: HashMap::new(),
            staged_keys: HashMap::new(),
            staged_audits: Vec::new(),
        })
    }

    fn find_token_scope(&self, id: TokenId) -> TokenResult<Option<LockScope>> {
        let tables = self.tables()?;
        Ok(tables.tokens.get(&id).map(|t| LockScope {
            doctor_id: t.doctor_id,
            date: t.date,
        }))
    }
}

/// One open transaction against a [`MemoryStore`].
///
/// Holds the scope's advisory lock from `begin` until drop; staged writes
/// publish on [`StoreTxn::commit`] and evaporate otherwise.
pub struct MemoryTxn<'a> {
    store: &'a MemoryStore,
    scope: LockScope,
    staged_doctors: HashMap<DoctorId, Doctor>,
    staged_slots: HashMap<SlotId, Slot>,
    staged_tokens: HashMap<TokenId, Token>,
    staged_keys: HashMap<String, TokenId>,
    staged_audits: Vec<AuditEvent>,
}

impl MemoryTxn<'_> {
    fn token_merged(&self, tables: &Tables, id: TokenId) -> Option<Token> {
        self.staged_tokens
            .get(&id)
            .or_else(|| tables.tokens.get(&id))
            .cloned()
    }
}

impl StoreTxn for MemoryTxn<'_> {
    fn doctor(&self, id: DoctorId) -> TokenResult<Option<Doctor>> {
        let tables = self.store.tables()?;
        Ok(self
            .staged_doctors
            .get(&id)
            .or_else(|| tables.doctors.get(&id))
            .cloned())
    }

    fn slot(&self, id: SlotId) -> TokenResult<Option<Slot>> {
        let tables = self.store.tables()?;
        Ok(self
            .staged_slots
            .get(&id)
            .or_else(|| tables.slots.get(&id))
            .cloned())
    }

    fn slots_for(&self, doctor_id: DoctorId, date: NaiveDate) -> TokenResult<Vec<Slot>> {
        let tables = self.store.tables()?;
        let mut merged: HashMap<SlotId, Slot> = tables
            .slots
            .values()
            .filter(|s| s.doctor_id == doctor_id && s.date == date)
            .map(|s| (s.id, s.clone()))
            .collect();
        for slot in self.staged_slots.values() {
            if slot.doctor_id == doctor_id && slot.date == date {
                merged.insert(slot.id, slot.clone());
            }
        }
        Ok(merged.into_values().collect())
    }

    fn token(&self, id: TokenId) -> TokenResult<Option<Token>> {
        let tables = self.store.tables()?;
        Ok(self.token_merged(&tables, id))
    }

    fn tokens_for(&self, doctor_id: DoctorId, date: NaiveDate) -> TokenResult<Vec<Token>> {
        let tables = self.store.tables()?;
        let mut merged: HashMap<TokenId, Token> = tables
            .tokens
            .values()
            .filter(|t| t.doctor_id == doctor_id && t.date == date)
            .map(|t| (t.id, t.clone()))
            .collect();
        for token in self.staged_tokens.values() {
            if token.doctor_id == doctor_id && token.date == date {
                merged.insert(token.id, token.clone());
            }
        }
        Ok(merged.into_values().collect())
    }

    fn token_by_idempotency_key(&self, key: &IdempotencyKey) -> TokenResult<Option<Token>> {
        let tables = self.store.tables()?;
        if let Some(id) = self.staged_keys.get(key.as_str()) {
            return Ok(self.token_merged(&tables, *id));
        }
        match tables.tokens_by_key.get(key.as_str()) {
            Some(id) => Ok(self.token_merged(&tables, *id)),
            None => Ok(None),
        }
    }

    fn insert_doctor(&mut self, doctor: Doctor) -> TokenResult<()> {
        self.staged_doctors.insert(doctor.id, doctor);
        Ok(())
    }

    fn insert_slot(&mut self, slot: Slot) -> TokenResult<()> {
        self.staged_slots.insert(slot.id, slot);
        Ok(())
    }

    fn update_slot(&mut self, slot: &Slot) -> TokenResult<()> {
        let exists = self.staged_slots.contains_key(&slot.id)
            || self.store.tables()?.slots.contains_key(&slot.id);
        if !exists {
            return Err(TokenError::SlotNotFound(slot.id));
        }
        self.staged_slots.insert(slot.id, slot.clone());
        Ok(())
    }

    fn insert_token(&mut self, token: Token) -> TokenResult<()> {
        let key = token.idempotency_key.as_str().to_owned();
        let taken = self.staged_keys.contains_key(&key)
            || self.store.tables()?.tokens_by_key.contains_key(&key);
        if taken {
            return Err(TokenError::StorageConflict);
        }
        self.staged_keys.insert(key, token.id);
        self.staged_tokens.insert(token.id, token);
        Ok(())
    }

    fn update_token(&mut self, token: &Token) -> TokenResult<()> {
        let exists = self.staged_tokens.contains_key(&token.id)
            || self.store.tables()?.tokens.contains_key(&token.id);
        if !exists {
            return Err(TokenError::TokenNotFound(token.id));
        }
        self.staged_tokens.insert(token.id, token.clone());
        Ok(())
    }

    fn append_audit(&mut self, event: AuditEvent) -> TokenResult<()> {
        self.staged_audits.push(event);
        Ok(())
    }

    fn audit_for(&self, doctor_id: DoctorId, date: NaiveDate) -> TokenResult<Vec<AuditEvent>> {
        let tables = self.store.tables()?;
        Ok(tables
            .audits
            .iter()
            .filter(|e| e.doctor_id == doctor_id && e.recorded_at.date() == date)
            .cloned()
            .collect())
    }

    fn commit(mut self) -> TokenResult<()> {
        if let Some(probe) = &self.store.conflict_probe {
            if probe() {
                return Err(TokenError::StorageConflict);
            }
        }

        let mut tables = self.store.tables()?;

        // The unique-key constraint is re-checked at publish time: a commit
        // from another scope may have claimed a key after our insert staged
        // it.
        for (key, id) in &self.staged_keys {
            if let Some(existing) = tables.tokens_by_key.get(key) {
                if existing != id {
                    return Err(TokenError::StorageConflict);
                }
            }
        }

        for (id, doctor) in self.staged_doctors.drain() {
            tables.doctors.insert(id, doctor);
        }
        for (id, slot) in self.staged_slots.drain() {
            tables.slots.insert(id, slot);
        }
        for (key, id) in self.staged_keys.drain() {
            tables.tokens_by_key.insert(key, id);
        }
        for (id, token) in self.staged_tokens.drain() {
            tables.tokens.insert(id, token);
        }
        tables.audits.append(&mut self.staged_audits);
        Ok(())
    }
}

impl Drop for MemoryTxn<'_> {
    fn drop(&mut self) {
        self.store.release_scope(&self.scope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priority::{Priority, Source};
    use crate::token::{IdempotencyKey, TokenStatus};
    use opd_types::NonEmptyText;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::thread;

    fn scope() -> LockScope {
        LockScope {
            doctor_id: DoctorId::new(),
            date: NaiveDate::from_ymd_opt(2026, 8, 2).unwrap(),
        }
    }

    fn token_in(scope: &LockScope, key: &str) -> Token {
        Token {
            id: TokenId::new(),
            display_id: "TKN-02082026-D01-001".to_string(),
            idempotency_key: IdempotencyKey::new(key).unwrap(),
            doctor_id: scope.doctor_id,
            date: scope.date,
            patient_name: NonEmptyText::new("Patient").unwrap(),
            phone: None,
            age: None,
            notes: None,
            source: Source::Online,
            priority: Priority::Online,
            status: TokenStatus::Waiting,
            created_at: scope.date.and_hms_opt(8, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_staged_writes_publish_on_commit() {
        let store = MemoryStore::new();
        let scope = scope();
        let token = token_in(&scope, "key-1");
        let id = token.id;

        let mut txn = store.begin(&scope).unwrap();
        txn.insert_token(token).unwrap();
        txn.commit().unwrap();

        let txn = store.begin(&scope).unwrap();
        assert!(txn.token(id).unwrap().is_some());
    }

    #[test]
    fn test_dropped_transaction_rolls_back() {
        let store = MemoryStore::new();
        let scope = scope();
        let token = token_in(&scope, "key-1");
        let id = token.id;

        {
            let mut txn = store.begin(&scope).unwrap();
            txn.insert_token(token).unwrap();
            // dropped without commit
        }

        let txn = store.begin(&scope).unwrap();
        assert!(txn.token(id).unwrap().is_none());
    }

    #[test]
    fn test_reads_see_own_staged_writes() {
        let store = MemoryStore::new();
        let scope = scope();
        let token = token_in(&scope, "key-1");
        let key = token.idempotency_key.clone();

        let mut txn = store.begin(&scope).unwrap();
        txn.insert_token(token).unwrap();

        assert!(txn.token_by_idempotency_key(&key).unwrap().is_some());
        assert_eq!(txn.tokens_for(scope.doctor_id, scope.date).unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_idempotency_key_conflicts() {
        let store = MemoryStore::new();
        let scope = scope();

        let mut txn = store.begin(&scope).unwrap();
        txn.insert_token(token_in(&scope, "same-key")).unwrap();
        txn.commit().unwrap();

        let mut txn = store.begin(&scope).unwrap();
        let result = txn.insert_token(token_in(&scope, "same-key"));
        assert!(matches!(result, Err(TokenError::StorageConflict)));
    }

    #[test]
    fn test_update_missing_token_fails() {
        let store = MemoryStore::new();
        let scope = scope();
        let token = token_in(&scope, "key-1");

        let mut txn = store.begin(&scope).unwrap();
        assert!(matches!(
            txn.update_token(&token),
            Err(TokenError::TokenNotFound(_))
        ));
    }

    #[test]
    fn test_advisory_lock_serialises_same_scope() {
        let store = MemoryStore::new();
        let scope = scope();
        let token = token_in(&scope, "key-1");
        let id = token.id;

        let mut txn = store.begin(&scope).unwrap();
        txn.insert_token(token).unwrap();

        let store2 = store.clone();
        let handle = thread::spawn(move || {
            // Blocks until the first transaction releases the scope.
            let txn = store2.begin(&scope).unwrap();
            txn.token(id).unwrap().is_some()
        });

        txn.commit().unwrap();
        // The second transaction must observe the committed insert.
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_different_scopes_do_not_block() {
        let store = MemoryStore::new();
        let scope_a = scope();
        let scope_b = scope();

        let _txn_a = store.begin(&scope_a).unwrap();
        // Would deadlock if scopes shared one lock.
        let _txn_b = store.begin(&scope_b).unwrap();
    }

    #[test]
    fn test_conflict_probe_fails_commit() {
        let failures = Arc::new(AtomicU32::new(2));
        let probe_failures = failures.clone();
        let store = MemoryStore::with_conflict_probe(move || {
            probe_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        });
        let scope = scope();

        for attempt in 0..3 {
            let mut txn = store.begin(&scope).unwrap();
            txn.insert_token(token_in(&scope, &format!("key-{}", attempt)))
                .unwrap();
            let result = txn.commit();
            if attempt < 2 {
                assert!(matches!(result, Err(TokenError::StorageConflict)));
            } else {
                assert!(result.is_ok());
            }
        }
    }

    #[test]
    fn test_find_token_scope() {
        let store = MemoryStore::new();
        let scope = scope();
        let token = token_in(&scope, "key-1");
        let id = token.id;

        assert!(store.find_token_scope(id).unwrap().is_none());

        let mut txn = store.begin(&scope).unwrap();
        txn.insert_token(token).unwrap();
        txn.commit().unwrap();

        assert_eq!(store.find_token_scope(id).unwrap(), Some(scope));
    }
}
