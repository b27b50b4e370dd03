//! # Tradesim Ledger Crate
//!
//! This crate is the system of record for the trading simulator: accounts,
//! asset reference data, holdings, and the append-only trade history.
//!
//! ## Architectural Principles
//!
//! - **Store Contract:** The `LedgerStore` trait is the only interface the
//!   execution engine and valuator see. It exposes plain keyed lookups (no
//!   lazy object graphs) plus `begin_settlement`, the explicit transaction
//!   boundary for order settlement.
//! - **Single-Writer Settlement:** A `SettlementTx` holds an exclusive,
//!   account-scoped lock from acquisition until commit. Dropping it without
//!   committing rolls everything back, so a half-applied order is never
//!   observable.
//! - **Two Backends:** `PgLedger` persists to PostgreSQL through a pooled
//!   `sqlx` connection and takes the lock with `SELECT ... FOR UPDATE`.
//!   `MemoryLedger` keeps the same semantics in memory with per-account
//!   async mutexes, for tests and offline runs.
//!
//! ## Public API
//!
//! - `connect` / `run_migrations`: database pool setup.
//! - `LedgerStore`, `SettlementTx`, `HoldingChange`, `TradeDraft`: the
//!   store contract.
//! - `PgLedger`, `MemoryLedger`: the two implementations.
//! - `LedgerError`: the specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod connection;
pub mod error;
pub mod memory;
pub mod repository;
pub mod store;

// Re-export the key components to create a clean, public-facing API.
pub use connection::{connect, run_migrations};
pub use error::LedgerError;
pub use memory::MemoryLedger;
pub use repository::PgLedger;
pub use store::{HoldingChange, LedgerStore, SettlementTx, TradeDraft};
