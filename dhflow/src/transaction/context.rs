//! Per-run ownership of one connection and its transaction.

use super::{Connection, ConnectionProvider};
use crate::context::Variables;
use crate::errors::DatabaseError;
use tracing::{debug, warn};

/// Owns the single connection of one pipeline run.
///
/// Lifecycle: [`acquire`](Self::acquire), [`begin_if_needed`](Self::begin_if_needed),
/// stage work through [`connection`](Self::connection), then either
/// [`commit`](Self::commit) or [`rollback_best_effort`](Self::rollback_best_effort),
/// and finally [`release`](Self::release). Commit and rollback are only
/// issued when the run is transacted and not XA; under XA the external
/// coordinator completes the transaction.
#[derive(Debug)]
pub struct TransactionContext<'p> {
    provider: &'p dyn ConnectionProvider,
    connection_name: String,
    transacted: bool,
    is_xa: bool,
    connection: Option<Box<dyn Connection>>,
    rollback_attempted: bool,
}

impl<'p> TransactionContext<'p> {
    /// Obtains a connection from the provider.
    pub async fn acquire(
        provider: &'p dyn ConnectionProvider,
        connection_name: &str,
        transacted: bool,
        is_xa: bool,
        params: &Variables,
    ) -> Result<Self, DatabaseError> {
        let connection = provider.acquire(connection_name, params).await?;
        debug!(connection = connection_name, transacted, is_xa, "Connection acquired");

        Ok(Self {
            provider,
            connection_name: connection_name.to_string(),
            transacted,
            is_xa,
            connection: Some(connection),
            rollback_attempted: false,
        })
    }

    /// Returns true if this context issues commit and rollback itself.
    #[must_use]
    pub fn manages_commit(&self) -> bool {
        self.transacted && !self.is_xa
    }

    /// Returns the configured connection name.
    #[must_use]
    pub fn connection_name(&self) -> &str {
        &self.connection_name
    }

    /// Turns auto-commit off when this context manages the transaction.
    pub async fn begin_if_needed(&mut self) -> Result<(), DatabaseError> {
        if !self.manages_commit() {
            return Ok(());
        }
        self.connection()?.set_auto_commit(false).await
    }

    /// Borrows the live connection.
    pub fn connection(&mut self) -> Result<&mut (dyn Connection + 'static), DatabaseError> {
        self.connection
            .as_deref_mut()
            .ok_or_else(|| DatabaseError::connection("connection already released"))
    }

    /// Commits when this context manages the transaction; no-op otherwise.
    pub async fn commit(&mut self) -> Result<(), DatabaseError> {
        if !self.manages_commit() {
            return Ok(());
        }
        self.connection()?.commit().await?;
        debug!(connection = %self.connection_name, "Transaction committed");
        Ok(())
    }

    /// Rolls back at most once. Failures are logged, never returned.
    pub async fn rollback_best_effort(&mut self) {
        if !self.manages_commit() || self.rollback_attempted {
            return;
        }
        self.rollback_attempted = true;

        let name = self.connection_name.clone();
        let Some(connection) = self.connection.as_deref_mut() else {
            warn!(connection = %name, "Rollback skipped: connection already released");
            return;
        };
        match connection.rollback().await {
            Ok(()) => debug!(connection = %name, "Transaction rolled back"),
            Err(e) => warn!(connection = %name, error = %e, "Rollback failed"),
        }
    }

    /// Hands the connection back to the provider. Failures are logged.
    pub async fn release(mut self) {
        if let Some(connection) = self.connection.take() {
            match self.provider.release(&self.connection_name, connection).await {
                Ok(()) => debug!(connection = %self.connection_name, "Connection released"),
                Err(e) => warn!(connection = %self.connection_name, error = %e, "Connection release failed"),
            }
        }
    }
}
