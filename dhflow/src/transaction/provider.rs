//! Connection and connection-provider contracts.
//!
//! Pools and drivers live outside this crate; the engine only needs to open a
//! transaction, finish it, and hand the connection back.

use crate::context::Variables;
use crate::errors::DatabaseError;
use async_trait::async_trait;
use std::any::Any;
use std::fmt::Debug;

/// A live database connection handed out by a [`ConnectionProvider`].
#[async_trait]
pub trait Connection: Send + Debug {
    /// Switches auto-commit on or off.
    async fn set_auto_commit(&mut self, enabled: bool) -> Result<(), DatabaseError>;

    /// Commits the current transaction.
    async fn commit(&mut self) -> Result<(), DatabaseError>;

    /// Rolls back the current transaction.
    async fn rollback(&mut self) -> Result<(), DatabaseError>;

    /// Lets stages reach the driver-specific connection type.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Source of connections, keyed by a configured connection name.
#[async_trait]
pub trait ConnectionProvider: Send + Sync + Debug {
    /// Obtains a connection. May block until one is available.
    async fn acquire(
        &self,
        name: &str,
        params: &Variables,
    ) -> Result<Box<dyn Connection>, DatabaseError>;

    /// Returns a connection. Must tolerate being called after a failed
    /// release of the same handle.
    async fn release(&self, name: &str, connection: Box<dyn Connection>) -> Result<(), DatabaseError>;
}
