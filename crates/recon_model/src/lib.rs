//! # Recon Model
//!
//! Data types shared by the reconciliation engine, the ingestion consumer
//! and the CLI.
//!
//! This crate provides:
//! - `Entity` and its identity projection `EntityRef`
//! - `EntityDiff` / `EntityRefDiff` before/after inputs
//! - `Provenance` and `RequestOptions` carried through to the remote store
//! - Input validation (empty fields, duplicate identity keys)
//!
//! This is a pure data crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod diff;
mod entity;
mod error;
mod options;
mod provenance;
mod validate;

pub use diff::{EntityDiff, EntityRefDiff};
pub use entity::{Entity, EntityRef, Identified, RelationTarget};
pub use error::{ModelError, ModelResult};
pub use options::RequestOptions;
pub use provenance::Provenance;
pub use validate::validate_collection;
