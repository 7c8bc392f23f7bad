//! The transactional storage contract.
//!
//! The engine never talks to a concrete database; it is generic over
//! [`TokenStore`], which hands out transactions scoped to one
//! `(doctor, date)`. Any ACID store with row-level locking can implement the
//! contract; [`MemoryStore`](memory::MemoryStore) is the reference
//! implementation used by tests and the CLI.
//!
//! ## Concurrency discipline
//!
//! Isolation is achieved with an **advisory lock keyed on the scope**:
//! [`TokenStore::begin`] blocks until the `(doctor, date)` scope is free and
//! holds it until the transaction commits or drops. Two operations on the
//! same doctor-date therefore serialise, which closes the write-skew hazard
//! (two admissions both observing the same last free seat). Operations on
//! different scopes proceed in parallel; they share no rows.
//!
//! ## Transaction semantics
//!
//! A transaction stages its writes privately. `commit` publishes them
//! atomically; dropping an uncommitted transaction discards them. The store
//! enforces the unique constraint on `idempotency_key` at insert time — the
//! engine relies on that constraint, not on a read-then-insert dance, for
//! race-free idempotency across scopes.

pub mod memory;

use crate::audit::AuditEvent;
use crate::doctor::{Doctor, DoctorId};
use crate::error::TokenResult;
use crate::slot::{Slot, SlotId};
use crate::token::{IdempotencyKey, Token, TokenId};
use chrono::NaiveDate;

/// The row-lock scope of one transaction: all slots and tokens of one doctor
/// on one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockScope {
    pub doctor_id: DoctorId,
    pub date: NaiveDate,
}

/// One open transaction, holding its scope's advisory lock.
///
/// Reads observe committed state plus the transaction's own staged writes.
/// All writes stay private until [`StoreTxn::commit`].
pub trait StoreTxn {
    /// Reads a doctor row.
    fn doctor(&self, id: DoctorId) -> TokenResult<Option<Doctor>>;

    /// Reads a slot row.
    fn slot(&self, id: SlotId) -> TokenResult<Option<Slot>>;

    /// All slots of the scope's doctor-date, active or not, unordered.
    fn slots_for(&self, doctor_id: DoctorId, date: NaiveDate) -> TokenResult<Vec<Slot>>;

    /// Reads a token row.
    fn token(&self, id: TokenId) -> TokenResult<Option<Token>>;

    /// All tokens of a doctor-date, in any status, unordered.
    fn tokens_for(&self, doctor_id: DoctorId, date: NaiveDate) -> TokenResult<Vec<Token>>;

    /// Looks a token up by its unique idempotency key.
    fn token_by_idempotency_key(&self, key: &IdempotencyKey) -> TokenResult<Option<Token>>;

    /// Inserts a doctor row.
    fn insert_doctor(&mut self, doctor: Doctor) -> TokenResult<()>;

    /// Inserts a slot row.
    fn insert_slot(&mut self, slot: Slot) -> TokenResult<()>;

    /// Rewrites a slot row.
    fn update_slot(&mut self, slot: &Slot) -> TokenResult<()>;

    /// Inserts a token row.
    ///
    /// # Errors
    ///
    /// `StorageConflict` if another token already holds the idempotency key;
    /// the orchestrator's retry then routes the request through the
    /// idempotent-replay path.
    fn insert_token(&mut self, token: Token) -> TokenResult<()>;

    /// Rewrites a token row.
    fn update_token(&mut self, token: &Token) -> TokenResult<()>;

    /// Appends an audit event.
    fn append_audit(&mut self, event: AuditEvent) -> TokenResult<()>;

    /// Committed audit events for a doctor-date, oldest first.
    fn audit_for(&self, doctor_id: DoctorId, date: NaiveDate) -> TokenResult<Vec<AuditEvent>>;

    /// Publishes the staged writes atomically.
    ///
    /// # Errors
    ///
    /// `StorageConflict` if the store detected a serialisation conflict; the
    /// orchestrator retries the whole operation.
    fn commit(self) -> TokenResult<()>;
}

/// A transactional store the engine can run on.
pub trait TokenStore {
    /// The transaction type handed out by [`TokenStore::begin`].
    type Txn<'a>: StoreTxn
    where
        Self: 'a;

    /// Opens a transaction holding the advisory lock for `scope`.
    fn begin(&self, scope: &LockScope) -> TokenResult<Self::Txn<'_>>;

    /// Non-transactional lookup of the scope a token belongs to.
    ///
    /// Used only to discover which doctor-date to lock before operating on a
    /// token by id; the token is re-read inside the locked transaction before
    /// any decision is made.
    fn find_token_scope(&self, id: TokenId) -> TokenResult<Option<LockScope>>;
}
