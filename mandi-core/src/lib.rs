#![warn(missing_docs)]
//! Core models and ports for the mandi crop auction engine.
//!
//! A farmer lists a [`Crop`](models::Crop) lot, small lots may be pooled into a
//! [`PooledCrop`](models::PooledCrop), and every lot is driven through a timed
//! bidding window. Winning bids become [`Transaction`](models::Transaction)s
//! that post entries to per-user wallets, and a transaction may be challenged
//! through a [`Dispute`](models::Dispute).
//!
//! This crate holds no I/O. The engine logic lives in `mandi-engine`, and
//! `mandi-sqlite` provides a reference implementation of the ports.

/// Core domain models for the auction engine.
///
/// This module contains the records persisted by a backend, the lifecycle
/// transition tables for lots, pools and disputes, the fixed-point money and
/// quantity types, and the engine configuration.
///
/// The models are data structures with only the business rules that can be
/// checked without touching storage.
pub mod models;

/// Interface traits for the auction engine.
///
/// These are the "ports" a storage backend or an external collaborator must
/// implement. Guarded writes that can fail for domain reasons return a nested
/// `Result<Result<T, Failure>, Self::Error>` so that infrastructure failures
/// and domain refusals stay distinguishable.
pub mod ports;

mod error;
pub use error::{ConflictError, SettlementFailure, ValidationError};

// We use non-std collections for their ordering semantics
/// An insertion-ordered hashmap with a fast hasher.
pub type Map<K, V> = indexmap::IndexMap<K, V, rustc_hash::FxBuildHasher>;
