//! # Recon Engine
//!
//! Reconciles a desired set of catalog entities against a remote store.
//!
//! This crate provides:
//! - Identity-based diffing (created / modified / deleted)
//! - Dependency ordering of writes and deletes over entity relations
//! - A deletion guard protecting entities still referenced by kept ones
//! - The state applier orchestrating all of the above against a
//!   [`RemoteStore`]
//! - An in-memory store for tests and dry runs, and an HTTP-backed store
//!
//! ## Architecture
//!
//! A reconciliation is a single sequential flow:
//! 1. Validate and diff `before` against `after`
//! 2. Upsert created + modified entities (batched, or one at a time in
//!    dependency order)
//! 3. Filter the deleted set through the deletion guard, protecting what
//!    was just written
//! 4. Delete the survivors (batched with cascade, or one at a time with
//!    dependents first)
//!
//! ## Key Invariants
//!
//! - Identity is `(identifier, blueprint)`; payload never affects classification
//! - Every key present on both sides is re-applied
//! - Per-item store failures are logged and skipped, never raised
//! - Dependency cycles are broken by input order, never raised
//! - Caller collections are never mutated

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod applier;
mod config;
mod diff;
mod error;
mod guard;
mod http;
mod ordering;
mod store;

pub use applier::{ApplyReport, StateApplier};
pub use config::ReconcileConfig;
pub use diff::{classify, ClassifiedDiff};
pub use error::{ReconcileError, ReconcileResult, StoreError, StoreResult};
pub use guard::{filter_deletable, GuardOutcome};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, HttpStore};
pub use ordering::{order, order_indices, Dependent, Direction};
pub use store::{MemoryStore, RemoteStore, StoreCall};
