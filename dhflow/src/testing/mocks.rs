//! Recording connections and scripted stages.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;
use tokio::sync::Notify;

use crate::cancellation::CancellationToken;
use crate::context::Variables;
use crate::core::Payload;
use crate::errors::{DatabaseError, PipelineError};
use crate::stages::{Stage, StageResult};
use crate::transaction::{Connection, ConnectionProvider};

/// Everything a [`RecordingConnectionProvider`] and its connections saw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionLog {
    /// Acquire attempts, including failed ones.
    pub acquires: usize,
    /// Release calls, including failed ones.
    pub releases: usize,
    /// Commit calls.
    pub commits: usize,
    /// Rollback calls.
    pub rollbacks: usize,
    /// Times auto-commit was switched off.
    pub auto_commit_off: usize,
    /// Connection names passed to `acquire`, in order.
    pub acquired_names: Vec<String>,
    /// Every call in order: `acquire`, `begin`, `commit`, `rollback`, `release`.
    pub calls: Vec<&'static str>,
}

impl ConnectionLog {
    /// Returns true if every acquired connection was handed back.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.acquires == self.releases
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ConnectionFaults {
    commit: bool,
    rollback: bool,
}

/// A connection that records transaction calls into a shared log.
#[derive(Debug, Default)]
pub struct RecordingConnection {
    log: Arc<Mutex<ConnectionLog>>,
    faults: ConnectionFaults,
    auto_commit: bool,
}

impl RecordingConnection {
    /// Returns a snapshot of this connection's log.
    #[must_use]
    pub fn log(&self) -> ConnectionLog {
        self.log.lock().clone()
    }

    /// Returns the current auto-commit setting.
    #[must_use]
    pub fn auto_commit(&self) -> bool {
        self.auto_commit
    }
}

#[async_trait]
impl Connection for RecordingConnection {
    async fn set_auto_commit(&mut self, enabled: bool) -> Result<(), DatabaseError> {
        self.auto_commit = enabled;
        if !enabled {
            let mut log = self.log.lock();
            log.auto_commit_off += 1;
            log.calls.push("begin");
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DatabaseError> {
        let mut log = self.log.lock();
        log.commits += 1;
        log.calls.push("commit");
        if self.faults.commit {
            return Err(DatabaseError::new("scripted commit failure"));
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DatabaseError> {
        let mut log = self.log.lock();
        log.rollbacks += 1;
        log.calls.push("rollback");
        if self.faults.rollback {
            return Err(DatabaseError::new("scripted rollback failure"));
        }
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A provider handing out [`RecordingConnection`]s that share one log.
#[derive(Debug, Clone, Default)]
pub struct RecordingConnectionProvider {
    log: Arc<Mutex<ConnectionLog>>,
    faults: ConnectionFaults,
    fail_acquire: bool,
    fail_release: bool,
}

impl RecordingConnectionProvider {
    /// Creates a provider where every call succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `acquire` fail.
    #[must_use]
    pub fn failing_acquire(mut self) -> Self {
        self.fail_acquire = true;
        self
    }

    /// Makes `release` fail.
    #[must_use]
    pub fn failing_release(mut self) -> Self {
        self.fail_release = true;
        self
    }

    /// Makes `commit` fail on every connection.
    #[must_use]
    pub fn failing_commit(mut self) -> Self {
        self.faults.commit = true;
        self
    }

    /// Makes `rollback` fail on every connection.
    #[must_use]
    pub fn failing_rollback(mut self) -> Self {
        self.faults.rollback = true;
        self
    }

    /// Returns a snapshot of the shared log.
    #[must_use]
    pub fn log(&self) -> ConnectionLog {
        self.log.lock().clone()
    }
}

#[async_trait]
impl ConnectionProvider for RecordingConnectionProvider {
    async fn acquire(&self, name: &str, _params: &Variables) -> Result<Box<dyn Connection>, DatabaseError> {
        {
            let mut log = self.log.lock();
            log.acquires += 1;
            log.acquired_names.push(name.to_string());
            log.calls.push("acquire");
        }
        if self.fail_acquire {
            return Err(DatabaseError::connection(format!("no connection available for '{name}'")));
        }
        Ok(Box::new(RecordingConnection {
            log: Arc::clone(&self.log),
            faults: self.faults,
            auto_commit: true,
        }))
    }

    async fn release(&self, name: &str, _connection: Box<dyn Connection>) -> Result<(), DatabaseError> {
        let mut log = self.log.lock();
        log.releases += 1;
        log.calls.push("release");
        if self.fail_release {
            return Err(DatabaseError::connection(format!("could not return '{name}' to the pool")));
        }
        Ok(())
    }
}

/// A stage operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageOp {
    /// [`Stage::write`].
    Write,
    /// [`Stage::read`].
    Read,
    /// [`Stage::write_then_read`].
    WriteThenRead,
}

/// One recorded stage call.
#[derive(Debug, Clone, PartialEq)]
pub struct StageCall {
    /// Which operation ran.
    pub op: StageOp,
    /// The payload received, `None` for reads.
    pub payload: Option<Payload>,
    /// The effective variables of the run.
    pub params: Variables,
}

#[derive(Debug, Default)]
struct Script {
    write: StageResult,
    read: StageResult,
    write_then_read: StageResult,
    fail_on: Option<StageOp>,
    fail_cleanup: bool,
    cancel_on_call: Option<(CancellationToken, String)>,
    gate: Option<(StageOp, Arc<Notify>)>,
}

/// A stage whose results are scripted per operation and whose calls are
/// recorded for inspection.
#[derive(Debug)]
pub struct ScriptedStage {
    name: String,
    script: Mutex<Script>,
    calls: Mutex<Vec<StageCall>>,
    cleanups: Mutex<usize>,
    destroys: Mutex<usize>,
}

impl ScriptedStage {
    /// Creates a stage returning empty results for every operation.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(Script::default()),
            calls: Mutex::new(Vec::new()),
            cleanups: Mutex::new(0),
            destroys: Mutex::new(0),
        }
    }

    /// Sets the result of `write`.
    #[must_use]
    pub fn with_write(self, result: StageResult) -> Self {
        self.script.lock().write = result;
        self
    }

    /// Sets the result of `read`.
    #[must_use]
    pub fn with_read(self, result: StageResult) -> Self {
        self.script.lock().read = result;
        self
    }

    /// Sets the result of `write_then_read`.
    #[must_use]
    pub fn with_write_then_read(self, result: StageResult) -> Self {
        self.script.lock().write_then_read = result;
        self
    }

    /// Makes `op` fail with a database error.
    #[must_use]
    pub fn failing_on(self, op: StageOp) -> Self {
        self.script.lock().fail_on = Some(op);
        self
    }

    /// Makes `cleanup` fail.
    #[must_use]
    pub fn failing_cleanup(self) -> Self {
        self.script.lock().fail_cleanup = true;
        self
    }

    /// Cancels `token` when any I/O operation is called.
    #[must_use]
    pub fn cancelling(self, token: &CancellationToken, reason: impl Into<String>) -> Self {
        self.script.lock().cancel_on_call = Some((token.clone(), reason.into()));
        self
    }

    /// Suspends the first call of `op` until `gate` is notified. Later calls
    /// pass straight through.
    #[must_use]
    pub fn gated_on(self, op: StageOp, gate: Arc<Notify>) -> Self {
        self.script.lock().gate = Some((op, gate));
        self
    }

    /// Returns the recorded calls.
    #[must_use]
    pub fn calls(&self) -> Vec<StageCall> {
        self.calls.lock().clone()
    }

    /// Returns the recorded operations.
    #[must_use]
    pub fn ops(&self) -> Vec<StageOp> {
        self.calls.lock().iter().map(|c| c.op).collect()
    }

    /// Returns how many times `cleanup` ran.
    #[must_use]
    pub fn cleanup_count(&self) -> usize {
        *self.cleanups.lock()
    }

    /// Returns how many times `destroy` ran.
    #[must_use]
    pub fn destroy_count(&self) -> usize {
        *self.destroys.lock()
    }

    async fn pass_gate(&self, op: StageOp) {
        let gate = {
            let mut script = self.script.lock();
            if script.gate.as_ref().is_some_and(|(gated, _)| *gated == op) {
                script.gate.take().map(|(_, gate)| gate)
            } else {
                None
            }
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }

    fn respond(&self, op: StageOp, payload: Option<&Payload>, params: &Variables) -> Result<StageResult, PipelineError> {
        self.calls.lock().push(StageCall {
            op,
            payload: payload.cloned(),
            params: params.clone(),
        });

        let script = self.script.lock();
        if let Some((token, reason)) = &script.cancel_on_call {
            token.cancel(reason.clone());
        }
        if script.fail_on == Some(op) {
            return Err(DatabaseError::new(format!("stage '{}' scripted {op:?} failure", self.name)).into());
        }
        Ok(match op {
            StageOp::Write => script.write.clone(),
            StageOp::Read => script.read.clone(),
            StageOp::WriteThenRead => script.write_then_read.clone(),
        })
    }
}

#[async_trait]
impl Stage for ScriptedStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(
        &self,
        payload: &Payload,
        _connection: &mut dyn Connection,
        params: &Variables,
    ) -> Result<StageResult, PipelineError> {
        self.pass_gate(StageOp::Write).await;
        self.respond(StageOp::Write, Some(payload), params)
    }

    async fn read(
        &self,
        _connection: &mut dyn Connection,
        params: &Variables,
    ) -> Result<StageResult, PipelineError> {
        self.pass_gate(StageOp::Read).await;
        self.respond(StageOp::Read, None, params)
    }

    async fn write_then_read(
        &self,
        payload: &Payload,
        _connection: &mut dyn Connection,
        params: &Variables,
    ) -> Result<StageResult, PipelineError> {
        self.pass_gate(StageOp::WriteThenRead).await;
        self.respond(StageOp::WriteThenRead, Some(payload), params)
    }

    fn cleanup(&self) -> Result<(), PipelineError> {
        *self.cleanups.lock() += 1;
        if self.script.lock().fail_cleanup {
            return Err(PipelineError::generic(format!("stage '{}' scripted cleanup failure", self.name)));
        }
        Ok(())
    }

    fn destroy(&self) {
        *self.destroys.lock() += 1;
    }
}
