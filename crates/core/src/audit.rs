//! Append-only audit events, written inside the same transaction as the
//! operation they record.

use crate::doctor::DoctorId;
use crate::slot::SlotId;
use crate::token::TokenId;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The operation an audit event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOperation {
    CreateToken,
    EmergencyDisplacement,
    CancelToken,
    NoShow,
    CompleteToken,
    ExpireTokens,
}

impl AuditOperation {
    /// Canonical upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOperation::CreateToken => "CREATE_TOKEN",
            AuditOperation::EmergencyDisplacement => "EMERGENCY_DISPLACEMENT",
            AuditOperation::CancelToken => "CANCEL_TOKEN",
            AuditOperation::NoShow => "NO_SHOW",
            AuditOperation::CompleteToken => "COMPLETE_TOKEN",
            AuditOperation::ExpireTokens => "EXPIRE_TOKENS",
        }
    }
}

impl std::fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub operation: AuditOperation,
    pub token_id: Option<TokenId>,
    pub slot_id: Option<SlotId>,
    pub doctor_id: DoctorId,
    /// Free-form key-value payload; keys from [`crate::constants`].
    pub details: BTreeMap<String, String>,
    pub recorded_at: NaiveDateTime,
}

impl AuditEvent {
    /// Starts an event for `operation` in the given doctor's scope.
    pub fn new(operation: AuditOperation, doctor_id: DoctorId, recorded_at: NaiveDateTime) -> Self {
        Self {
            operation,
            token_id: None,
            slot_id: None,
            doctor_id,
            details: BTreeMap::new(),
            recorded_at,
        }
    }

    /// Attaches the affected token.
    pub fn token(mut self, token_id: TokenId) -> Self {
        self.token_id = Some(token_id);
        self
    }

    /// Attaches the affected slot.
    pub fn slot(mut self, slot_id: SlotId) -> Self {
        self.slot_id = Some(slot_id);
        self
    }

    /// Adds one detail pair.
    pub fn detail(mut self, key: &str, value: impl ToString) -> Self {
        self.details.insert(key.to_owned(), value.to_string());
        self
    }
}
