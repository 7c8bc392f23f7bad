//! The transaction orchestrator and the engine's public operations.
//!
//! [`TokenEngine`] wraps every externally visible operation in one
//! transaction on the affected `(doctor, date)` scope: open, run the
//! procedure, append audit events, commit. Storage conflicts re-run the whole
//! operation with bounded backoff ([`EngineConfig::retry_attempts`]); every
//! other failure rolls back and surfaces immediately, leaving no partial
//! assignment and no orphaned audit rows.
//!
//! Operations optionally carry a caller-supplied deadline. A transaction that
//! overruns it is rolled back at the next boundary check and reports
//! [`TokenError::DeadlineExceeded`]; no audit event escapes an aborted
//! transaction, so no compensation is ever needed.

use crate::allocation::{allocate, DisplacedToken};
use crate::audit::{AuditEvent, AuditOperation};
use crate::backfill::{backfill, PromotedToken};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::constants::{DETAIL_COUNT, DETAIL_DISPLAY_ID, DETAIL_REASON};
use crate::doctor::DoctorId;
use crate::error::{TokenError, TokenResult};
use crate::slot::Slot;
use crate::store::{LockScope, StoreTxn, TokenStore};
use crate::token::{IdempotencyKey, Token, TokenId, TokenStatus};
use crate::validation::validate_create;
use chrono::{NaiveDate, NaiveDateTime};
use opd_naming::{DisplayId, DisplayKind};
use opd_types::{ClinicDate, NonEmptyText, PhoneNumber};

/// Optional per-operation deadline.
///
/// The orchestrator checks it when a transaction opens and again before
/// commit; an exceeded deadline rolls the transaction back.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpDeadline(Option<NaiveDateTime>);

impl OpDeadline {
    /// No deadline; the operation runs to completion.
    pub const NONE: OpDeadline = OpDeadline(None);

    /// Deadline at an absolute instant.
    pub fn at(instant: NaiveDateTime) -> Self {
        Self(Some(instant))
    }

    fn exceeded(&self, now: NaiveDateTime) -> bool {
        matches!(self.0, Some(deadline) if now > deadline)
    }
}

/// Request to create a token. Fields arrive pre-validated by the boundary
/// types; [`validate_create`] adds the cross-field checks.
#[derive(Debug, Clone)]
pub struct CreateTokenInput {
    pub doctor_id: DoctorId,
    pub date: ClinicDate,
    pub idempotency_key: IdempotencyKey,
    pub patient_name: NonEmptyText,
    pub phone: Option<PhoneNumber>,
    pub age: Option<u8>,
    pub notes: Option<String>,
    pub source: crate::priority::Source,
    pub priority: crate::priority::Priority,
}

/// Result of [`TokenEngine::create_token`].
#[derive(Debug, Clone)]
pub struct CreateOutcome {
    pub token: Token,
    /// The slot assigned, or `None` when the token waits.
    pub slot: Option<Slot>,
    /// Tokens evicted by an emergency admission, at most one.
    pub displaced: Vec<DisplacedToken>,
    pub message: String,
}

/// Result of [`TokenEngine::cancel_token`] and [`TokenEngine::mark_no_show`]:
/// the released token plus whoever was promoted into the freed seat.
#[derive(Debug, Clone)]
pub struct ReleaseOutcome {
    pub token: Token,
    pub promoted: Vec<PromotedToken>,
    pub message: String,
}

/// The allocation engine.
///
/// Generic over its two collaborators: the transactional store and the
/// clock. Cheap to construct; holds no state of its own beyond configuration.
pub struct TokenEngine<S: TokenStore, C: Clock> {
    store: S,
    clock: C,
    config: EngineConfig,
}

impl<S: TokenStore, C: Clock> TokenEngine<S, C> {
    /// Creates an engine over the given collaborators.
    pub fn new(store: S, clock: C, config: EngineConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// The engine's store, for embedding callers that share it.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The engine's configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn clock(&self) -> &C {
        &self.clock
    }

    /// Runs `attempt` until it succeeds, fails with a business error, or the
    /// storage-conflict retry budget is spent.
    fn with_retries<R>(
        &self,
        operation: &'static str,
        mut attempt: impl FnMut() -> TokenResult<R>,
    ) -> TokenResult<R> {
        let mut tries = 0;
        loop {
            tries += 1;
            match attempt() {
                Err(TokenError::StorageConflict) if tries < self.config.retry_attempts() => {
                    tracing::warn!(operation, attempt = tries, "storage conflict, retrying");
                    std::thread::sleep(self.config.retry_backoff() * tries);
                }
                other => return other,
            }
        }
    }

    fn check_deadline(&self, deadline: OpDeadline) -> TokenResult<()> {
        if deadline.exceeded(self.clock.now()) {
            return Err(TokenError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Issues the next token display identifier within the scope.
    fn next_token_display_id(
        txn: &S::Txn<'_>,
        doctor_code: &str,
        scope: &LockScope,
    ) -> TokenResult<DisplayId> {
        let existing = txn.tokens_for(scope.doctor_id, scope.date)?;
        let taken: std::collections::HashSet<String> =
            existing.iter().map(|t| t.display_id.clone()).collect();
        let display_id = DisplayId::generate(
            DisplayKind::Token,
            doctor_code,
            scope.date,
            existing.len() as u32 + 1,
            |candidate| taken.contains(candidate.as_str()),
        )?;
        Ok(display_id)
    }

    /// Creates a token and immediately attempts to allocate it.
    ///
    /// The idempotency gate runs first: a request replaying an existing
    /// `idempotency_key` returns the original token unchanged — no mutation,
    /// no audit event, success. Otherwise the token is inserted waiting, run
    /// through allocation (which may displace a lower-priority occupant when
    /// the new token is an emergency), audited, and committed.
    ///
    /// # Errors
    ///
    /// - `DoctorNotFound` for an unknown or inactive doctor.
    /// - `InvalidInput` from cross-field validation.
    /// - `StorageConflict` after the retry budget is spent.
    pub fn create_token(
        &self,
        input: CreateTokenInput,
        deadline: OpDeadline,
    ) -> TokenResult<CreateOutcome> {
        validate_create(&input, self.clock.now().date())?;
        let scope = LockScope {
            doctor_id: input.doctor_id,
            date: input.date.as_naive(),
        };
        self.with_retries("create_token", || self.try_create(&input, &scope, deadline))
    }

    fn try_create(
        &self,
        input: &CreateTokenInput,
        scope: &LockScope,
        deadline: OpDeadline,
    ) -> TokenResult<CreateOutcome> {
        self.check_deadline(deadline)?;
        let mut txn = self.store.begin(scope)?;
        let now = self.clock.now();

        if let Some(existing) = txn.token_by_idempotency_key(&input.idempotency_key)? {
            let slot = match existing.allocated_slot() {
                Some(slot_id) => txn.slot(slot_id)?,
                None => None,
            };
            tracing::info!(
                token = %existing.display_id,
                "replayed create request, returning existing token"
            );
            return Ok(CreateOutcome {
                token: existing,
                slot,
                displaced: Vec::new(),
                message: "duplicate request; existing token returned".to_string(),
            });
        }

        let doctor = txn
            .doctor(scope.doctor_id)?
            .filter(|d| d.is_active)
            .ok_or(TokenError::DoctorNotFound(scope.doctor_id))?;

        let display_id = Self::next_token_display_id(&txn, &doctor.code, scope)?;
        let token = Token {
            id: TokenId::new(),
            display_id: display_id.to_string(),
            idempotency_key: input.idempotency_key.clone(),
            doctor_id: doctor.id,
            date: scope.date,
            patient_name: input.patient_name.clone(),
            phone: input.phone.clone(),
            age: input.age,
            notes: input.notes.clone(),
            source: input.source,
            priority: input.priority,
            status: TokenStatus::Waiting,
            created_at: now,
        };
        txn.insert_token(token.clone())?;

        let outcome = allocate(&mut txn, token, now)?;

        let mut event = AuditEvent::new(AuditOperation::CreateToken, doctor.id, now)
            .token(outcome.token.id)
            .detail(DETAIL_DISPLAY_ID, &outcome.token.display_id)
            .detail("priority", outcome.token.priority)
            .detail("status", outcome.token.status.name());
        if let Some(slot) = &outcome.assigned_slot {
            event = event.slot(slot.id);
        }
        txn.append_audit(event)?;

        self.check_deadline(deadline)?;
        txn.commit()?;

        let message = match &outcome.assigned_slot {
            Some(slot) => format!("token allocated to slot {}", slot.display_id),
            None => "no seat available; token is waiting".to_string(),
        };
        tracing::info!(
            token = %outcome.token.display_id,
            status = outcome.token.status.name(),
            "token created"
        );
        Ok(CreateOutcome {
            token: outcome.token,
            slot: outcome.assigned_slot,
            displaced: outcome.displaced,
            message,
        })
    }

    /// Cancels a token.
    ///
    /// A waiting token simply becomes cancelled. An allocated token vacates
    /// its seat; if the slot has not ended, waiting tokens are promoted into
    /// the freed capacity within the same transaction.
    ///
    /// # Errors
    ///
    /// - `TokenNotFound` for an unknown id.
    /// - `AlreadyCancelled` / `CannotCancelCompleted` on terminal guards.
    /// - `InvalidStatus` for other terminal states.
    pub fn cancel_token(&self, id: TokenId, deadline: OpDeadline) -> TokenResult<ReleaseOutcome> {
        let scope = self
            .store
            .find_token_scope(id)?
            .ok_or(TokenError::TokenNotFound(id))?;
        self.with_retries("cancel_token", || {
            self.try_release(id, &scope, deadline, Release::Cancel)
        })
    }

    /// Marks an allocated token as a no-show and backfills its seat.
    ///
    /// # Errors
    ///
    /// - `TokenNotFound` for an unknown id.
    /// - `InvalidStatus` unless the token is allocated.
    pub fn mark_no_show(&self, id: TokenId, deadline: OpDeadline) -> TokenResult<ReleaseOutcome> {
        let scope = self
            .store
            .find_token_scope(id)?
            .ok_or(TokenError::TokenNotFound(id))?;
        self.with_retries("mark_no_show", || {
            self.try_release(id, &scope, deadline, Release::NoShow)
        })
    }

    fn try_release(
        &self,
        id: TokenId,
        scope: &LockScope,
        deadline: OpDeadline,
        mode: Release,
    ) -> TokenResult<ReleaseOutcome> {
        self.check_deadline(deadline)?;
        let mut txn = self.store.begin(scope)?;
        let now = self.clock.now();

        let mut token = txn.token(id)?.ok_or(TokenError::TokenNotFound(id))?;
        let vacated = match mode {
            Release::Cancel => token.cancel(now)?,
            Release::NoShow => Some(token.mark_no_show(now)?),
        };
        txn.update_token(&token)?;

        let mut promoted = Vec::new();
        let mut reason: Option<&'static str> = None;
        if let Some(slot_id) = vacated {
            let slot = txn.slot(slot_id)?.ok_or(TokenError::SlotNotFound(slot_id))?;
            if slot.has_ended(now) {
                reason = Some("Slot already ended");
            } else {
                promoted = backfill(&mut txn, &slot, now, self.config.imminent_window())?;
            }
        }

        let mut event = AuditEvent::new(mode.audit_operation(), token.doctor_id, now)
            .token(token.id)
            .detail(DETAIL_DISPLAY_ID, &token.display_id)
            .detail("promoted", promoted.len());
        if let Some(slot_id) = vacated {
            event = event.slot(slot_id);
        }
        if let Some(reason) = reason {
            event = event.detail(DETAIL_REASON, reason);
        }
        txn.append_audit(event)?;

        self.check_deadline(deadline)?;
        txn.commit()?;

        let message = match (vacated, reason, promoted.len()) {
            (None, _, _) => format!("{} while waiting", mode.past_tense()),
            (Some(_), Some(reason), _) => {
                format!("{}; no reallocation: {}", mode.past_tense(), reason)
            }
            (Some(_), None, 0) => format!("{}; seat freed, nobody waiting", mode.past_tense()),
            (Some(_), None, n) => format!("{}; {} waiting token(s) promoted", mode.past_tense(), n),
        };
        tracing::info!(token = %token.display_id, promoted = promoted.len(), "{}", message);
        Ok(ReleaseOutcome {
            token,
            promoted,
            message,
        })
    }

    /// Completes an allocated token. No reallocation: the visit happened.
    ///
    /// # Errors
    ///
    /// - `TokenNotFound` for an unknown id.
    /// - `InvalidStatus` unless the token is allocated.
    pub fn complete_token(&self, id: TokenId, deadline: OpDeadline) -> TokenResult<Token> {
        let scope = self
            .store
            .find_token_scope(id)?
            .ok_or(TokenError::TokenNotFound(id))?;
        self.with_retries("complete_token", || {
            self.check_deadline(deadline)?;
            let mut txn = self.store.begin(&scope)?;
            let now = self.clock.now();

            let mut token = txn.token(id)?.ok_or(TokenError::TokenNotFound(id))?;
            let slot_id = token.complete(now)?;
            txn.update_token(&token)?;

            txn.append_audit(
                AuditEvent::new(AuditOperation::CompleteToken, token.doctor_id, now)
                    .token(token.id)
                    .slot(slot_id)
                    .detail(DETAIL_DISPLAY_ID, &token.display_id),
            )?;

            self.check_deadline(deadline)?;
            txn.commit()?;
            tracing::info!(token = %token.display_id, "token completed");
            Ok(token)
        })
    }

    /// End-of-day expiry: every waiting token of the scope becomes expired.
    ///
    /// Allocated and terminal tokens are untouched, and no allocation is
    /// attempted. Returns the number of tokens expired.
    pub fn expire_waiting(
        &self,
        doctor_id: DoctorId,
        date: NaiveDate,
        deadline: OpDeadline,
    ) -> TokenResult<u32> {
        let scope = LockScope { doctor_id, date };
        self.with_retries("expire_waiting", || {
            self.check_deadline(deadline)?;
            let mut txn = self.store.begin(&scope)?;
            let now = self.clock.now();

            let mut count: u32 = 0;
            for mut token in txn.tokens_for(doctor_id, date)? {
                if !token.is_waiting() {
                    continue;
                }
                token.expire(now)?;
                txn.update_token(&token)?;
                count += 1;
            }

            txn.append_audit(
                AuditEvent::new(AuditOperation::ExpireTokens, doctor_id, now)
                    .detail(DETAIL_COUNT, count),
            )?;

            self.check_deadline(deadline)?;
            txn.commit()?;
            tracing::info!(doctor = %doctor_id, %date, count, "expired waiting tokens");
            Ok(count)
        })
    }
}

/// Which release operation [`TokenEngine::try_release`] performs.
#[derive(Debug, Clone, Copy)]
enum Release {
    Cancel,
    NoShow,
}

impl Release {
    fn audit_operation(&self) -> AuditOperation {
        match self {
            Release::Cancel => AuditOperation::CancelToken,
            Release::NoShow => AuditOperation::NoShow,
        }
    }

    fn past_tense(&self) -> &'static str {
        match self {
            Release::Cancel => "cancelled",
            Release::NoShow => "marked no-show",
        }
    }
}
