//! # Tradesim Engine Crate
//!
//! This crate implements the order-execution and valuation core of the
//! trading simulator: validating and settling market orders against the
//! ledger, maintaining the weighted-average cost basis, and computing valued
//! portfolio reports.
//!
//! ## Architectural Principles
//!
//! - **State vs. Logic Decoupling:** `cost_basis` is a pure calculator that
//!   derives the new position from an execution without touching any state.
//!   The ledger's `SettlementTx` is the only component that persists, and
//!   the `ExecutionEngine` is the orchestrator wiring the two together.
//! - **Quote Outside the Lock:** The price oracle is consulted before the
//!   account-scoped lock is taken. Funds and holdings are re-validated
//!   against the locked ledger rows, so a stale quote window can reject an
//!   order but can never corrupt the ledger.
//! - **Explicit Collaborators:** The engine and the valuator each hold
//!   references to their `LedgerStore` and `PriceOracle`; there is no
//!   ambient global state.
//!
//! ## Public API
//!
//! - `ExecutionEngine`: validates and settles market orders.
//! - `PortfolioValuator`: computes the valued portfolio report.
//! - `cost_basis`: the pure weighted-average cost arithmetic.
//! - `OrderError` / `ValuationError`: the specific error types that can be
//!   returned from this crate.

// Declare the modules that constitute this crate.
pub mod cost_basis;
pub mod error;
pub mod order;
pub mod valuation;

// Re-export the key components to provide a clean, public-facing API.
pub use cost_basis::CostBasis;
pub use error::{OrderError, ValuationError};
pub use order::ExecutionEngine;
pub use valuation::{HoldingReport, PnlPercent, PortfolioReport, PortfolioSummary, PortfolioValuator};
