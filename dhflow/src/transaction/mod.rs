//! Connection and transaction lifecycle.
//!
//! This module provides:
//! - The connection and connection-provider contracts
//! - `TransactionContext`, which owns one connection per run

mod context;
mod provider;

pub use context::TransactionContext;
pub use provider::{Connection, ConnectionProvider};
