//! # OPD Core
//!
//! The allocation engine for outpatient appointment tokens.
//!
//! A token is a patient's claim on a doctor for a date; slots are the
//! doctor's fixed, seat-capped time windows. This crate owns the hard part
//! of the system: deciding, under concurrent admissions, cancellations,
//! no-shows, emergency arrivals, and end-of-day expiry, which token sits in
//! which seat — without ever exceeding capacity and without leaving seats
//! empty that a waiting patient could fill.
//!
//! The engine is pure coordination logic over two injected collaborators:
//! a transactional store (any ACID store with row-level locking; the
//! in-memory reference lives in [`store::memory`]) and a [`clock::Clock`].
//!
//! **No API concerns**: HTTP surfaces, request parsing, and authentication
//! belong to embedding services, which consume the engine's operations only.

pub mod admin;
pub mod allocation;
pub mod audit;
pub mod backfill;
pub mod capacity;
pub mod clock;
pub mod config;
pub mod constants;
pub mod doctor;
pub mod engine;
pub mod error;
pub mod priority;
pub mod projections;
pub mod slot;
pub mod store;
pub mod token;
pub mod validation;

// Re-export the engine surface
pub use engine::{CreateOutcome, CreateTokenInput, OpDeadline, ReleaseOutcome, TokenEngine};

// Re-export the domain vocabulary
pub use doctor::{Doctor, DoctorId};
pub use priority::{Priority, Source};
pub use slot::{SeatCap, Slot, SlotId};
pub use token::{IdempotencyKey, Token, TokenId, TokenStatus};

// Re-export collaborator seams
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::EngineConfig;
pub use store::{LockScope, StoreTxn, TokenStore};

// Re-export error types
pub use error::{TokenError, TokenResult};
