//! The pipeline orchestrator.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};

use super::merge::MergePlan;
use super::spec::{PipelineConfig, StageConfig, StatsSlot};
use super::stats::StatsAggregator;
use crate::cancellation::CancellationToken;
use crate::context::{build_props, DataSlotStore, Expander, PlaceholderExpander, RunIdentity, Variables};
use crate::core::{ExecutionMode, ForcedMode, Payload, RunOutput};
use crate::errors::{ConfigurationError, ContractErrorInfo, DataHandlingError, PipelineError, TransformError};
use crate::events::{self, EventSink, NoOpEventSink};
use crate::observability::{dump_checkpoint, DumpCheckpoint, RunSpanAttributes, SpanTimer, StageSpanAttributes};
use crate::stages::{Stage, StageRegistry, StageResult};
use crate::transaction::{ConnectionProvider, TransactionContext};
use crate::transform::{self, Transformer};

/// A configured stage together with the instance built for it.
#[derive(Debug, Clone)]
struct BoundStage {
    config: StageConfig,
    stage: Arc<dyn Stage>,
}

/// An initialised pipeline, ready to run.
///
/// A builder holds only configuration and collaborators. Every run allocates
/// its own slot store, stage cursor and transaction, so one instance can be
/// shared behind an `Arc` and run concurrently.
#[derive(Debug)]
pub struct PipelineBuilder {
    config: PipelineConfig,
    stages: Vec<BoundStage>,
    by_output_slot: HashMap<String, usize>,
    merge_plan: Option<MergePlan>,
    provider: Arc<dyn ConnectionProvider>,
    transformer: Option<Arc<dyn Transformer>>,
    expander: Arc<dyn Expander>,
    event_sink: Arc<dyn EventSink>,
}

impl PipelineBuilder {
    /// Builds every configured stage through `registry` and compiles the
    /// merge rules.
    ///
    /// Each stage config has the pipeline's connection name and transacted
    /// flag bound onto it before its constructor runs.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` if the stage list is empty, a stage
    /// type is unknown or rejected by its constructor, or a merge path is
    /// missing or malformed.
    pub fn init(
        config: PipelineConfig,
        registry: &StageRegistry,
        provider: Arc<dyn ConnectionProvider>,
    ) -> Result<Self, ConfigurationError> {
        if config.stages.is_empty() {
            return Err(ConfigurationError::new(format!("Pipeline '{}' has no stages", config.name))
                .with_error_info(
                    ContractErrorInfo::new("CONFIG-EMPTY", "A pipeline needs at least one stage")
                        .with_context_entry("pipeline", config.name.clone()),
                ));
        }

        let mut stages = Vec::with_capacity(config.stages.len());
        let mut by_output_slot = HashMap::new();
        for (index, declared) in config.stages.iter().enumerate() {
            let bound = bind_stage(&config, declared);
            let stage = registry.create(&bound)?;

            if !bound.output_slot.is_empty() {
                if let Some(previous) = by_output_slot.insert(bound.output_slot.clone(), index) {
                    warn!(
                        pipeline = %config.name,
                        slot = %bound.output_slot,
                        previous,
                        index,
                        "Output slot written by more than one stage; the later stage wins"
                    );
                }
            }
            stages.push(BoundStage { config: bound, stage });
        }

        let merge_plan = MergePlan::compile(&config.merges)?;

        info!(
            pipeline = %config.name,
            stages = stages.len(),
            merges = merge_plan.as_ref().map_or(0, MergePlan::rule_count),
            "Pipeline initialised"
        );

        Ok(Self {
            config,
            stages,
            by_output_slot,
            merge_plan,
            provider,
            transformer: None,
            expander: Arc::new(PlaceholderExpander),
            event_sink: Arc::new(NoOpEventSink),
        })
    }

    /// Sets the transformer used for stages with a transformation reference.
    #[must_use]
    pub fn with_transformer(mut self, transformer: Arc<dyn Transformer>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    /// Sets the sink receiving lifecycle events.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Replaces the placeholder expander used when resolving variables.
    #[must_use]
    pub fn with_expander(mut self, expander: Arc<dyn Expander>) -> Self {
        self.expander = expander;
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Returns the configuration this pipeline was built from.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns the stage names in configured order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.config.name.as_str()).collect()
    }

    /// Returns the index of the stage writing `slot`, if any.
    #[must_use]
    pub fn stage_for_output(&self, slot: &str) -> Option<usize> {
        self.by_output_slot.get(slot).copied()
    }

    /// Writes `input` to the database through every stage (XML2DB).
    pub async fn push(&self, input: impl Into<Payload>, params: &Variables) -> Result<(), DataHandlingError> {
        self.run(ExecutionMode::Push, input.into(), params, &CancellationToken::new())
            .await
            .map(|_| ())
    }

    /// Reads the output document from the database (DB2XML).
    pub async fn pull(&self, input: impl Into<Payload>, params: &Variables) -> Result<Payload, DataHandlingError> {
        let output = self
            .run(ExecutionMode::Pull, input.into(), params, &CancellationToken::new())
            .await?;
        Ok(output.into_payload().unwrap_or_default())
    }

    /// Runs a combined write and read through every stage.
    pub async fn call(&self, input: impl Into<Payload>, params: &Variables) -> Result<Payload, DataHandlingError> {
        let output = self
            .run(ExecutionMode::Call, input.into(), params, &CancellationToken::new())
            .await?;
        Ok(output.into_payload().unwrap_or_default())
    }

    /// Runs every stage in its forced mode and returns counters with the
    /// output payload.
    pub async fn execute(&self, input: impl Into<Payload>, params: &Variables) -> Result<StageResult, DataHandlingError> {
        let output = self
            .run(ExecutionMode::Execute, input.into(), params, &CancellationToken::new())
            .await?;
        Ok(output.into_result().unwrap_or_default())
    }

    /// Runs the pipeline once in `mode`.
    ///
    /// `cancel` is checked before each stage. On any failure after the
    /// connection was acquired the transaction is rolled back (when the
    /// pipeline manages it); the connection is always released and every
    /// stage's `cleanup` always runs.
    ///
    /// # Errors
    ///
    /// Returns a `DataHandlingError` naming the pipeline and run, wrapping
    /// the first failure.
    pub async fn run(
        &self,
        mode: ExecutionMode,
        input: Payload,
        params: &Variables,
        cancel: &CancellationToken,
    ) -> Result<RunOutput, DataHandlingError> {
        let identity = RunIdentity::new(&self.config.name, mode);
        let span = info_span!(
            "pipeline_run",
            pipeline = %self.config.name,
            run_id = %identity.run_id,
            mode = %mode
        );
        self.run_observed(&identity, input, params, cancel)
            .instrument(span)
            .await
    }

    async fn run_observed(
        &self,
        identity: &RunIdentity,
        input: Payload,
        params: &Variables,
        cancel: &CancellationToken,
    ) -> Result<RunOutput, DataHandlingError> {
        let timer = SpanTimer::start(&self.config.name);
        let attrs = RunSpanAttributes::new(
            &self.config.name,
            identity.run_id_str(),
            identity.mode,
            &self.config.connection_name,
        )
        .with_manages_commit(self.config.transacted && !self.config.is_xa)
        .with_stage_count(self.stages.len());

        info!("Pipeline run started");
        self.emit(events::PIPELINE_STARTED, run_event_data(identity, &attrs));

        let outcome = self.run_inner(identity.mode, input, params, cancel).await;
        self.cleanup_stages();

        let attrs = attrs.with_duration_ms(timer.elapsed_ms());
        match outcome {
            Ok(output) => {
                info!(duration_ms = timer.elapsed_ms(), "Pipeline run completed");
                self.emit(events::PIPELINE_COMPLETED, run_event_data(identity, &attrs));
                Ok(output)
            }
            Err(e) => {
                let event = if matches!(e, PipelineError::Cancelled(_)) {
                    warn!(reason = %e, "Pipeline run cancelled");
                    events::PIPELINE_CANCELLED
                } else {
                    warn!(error = %e, kind = %e.kind(), "Pipeline run failed");
                    events::PIPELINE_FAILED
                };
                self.emit(event, run_event_data(identity, &attrs.with_error(e.to_string())));
                Err(DataHandlingError::new(&self.config.name, identity.run_id_str(), e))
            }
        }
    }

    async fn run_inner(
        &self,
        mode: ExecutionMode,
        input: Payload,
        params: &Variables,
        cancel: &CancellationToken,
    ) -> Result<RunOutput, PipelineError> {
        dump_checkpoint(self.config.make_dump, &self.config.name, DumpCheckpoint::Input, None, &input);

        let props = build_props(&self.config.variables, params, self.config.resolve_metadata, self.expander.as_ref())?;

        let mut tx = TransactionContext::acquire(
            self.provider.as_ref(),
            &self.config.connection_name,
            self.config.transacted,
            self.config.is_xa,
            &props,
        )
        .await?;

        let mut outcome = self.drive(&mut tx, mode, input, &props, cancel).await;
        if outcome.is_ok() {
            if let Err(e) = tx.commit().await {
                outcome = Err(e.into());
            }
        }
        if outcome.is_err() {
            tx.rollback_best_effort().await;
        }
        tx.release().await;

        if let Ok(ref output) = outcome {
            if let Some(payload) = output.payload() {
                dump_checkpoint(self.config.make_dump, &self.config.name, DumpCheckpoint::Result, None, payload);
            }
        }
        outcome
    }

    async fn drive(
        &self,
        tx: &mut TransactionContext<'_>,
        mode: ExecutionMode,
        input: Payload,
        props: &Variables,
        cancel: &CancellationToken,
    ) -> Result<RunOutput, PipelineError> {
        tx.begin_if_needed().await?;
        match mode {
            ExecutionMode::Push => self.drive_push(tx, &input, props, cancel).await,
            ExecutionMode::Pull => self.drive_pull(tx, input, props, cancel).await,
            ExecutionMode::Call => self.drive_call(tx, &input, props, cancel).await,
            ExecutionMode::Execute => self.drive_execute(tx, input, props, cancel).await,
        }
    }

    async fn drive_push(
        &self,
        tx: &mut TransactionContext<'_>,
        input: &Payload,
        props: &Variables,
        cancel: &CancellationToken,
    ) -> Result<RunOutput, PipelineError> {
        for (index, bound) in self.stages.iter().enumerate() {
            self.before_stage(index, bound, "write", cancel)?;
            let timer = SpanTimer::start(&bound.config.name);

            let payload = self.transform(&bound.config, input.clone(), props)?;
            self.dump_stage(DumpCheckpoint::StageInput, bound, &payload);
            let result = bound.stage.write(&payload, tx.connection()?, props).await?;

            self.after_stage(index, bound, "write", &result, &timer);
        }
        Ok(RunOutput::Nothing)
    }

    async fn drive_pull(
        &self,
        tx: &mut TransactionContext<'_>,
        input: Payload,
        props: &Variables,
        cancel: &CancellationToken,
    ) -> Result<RunOutput, PipelineError> {
        let mut store = DataSlotStore::new();
        if let Some(first) = self.stages.first() {
            store.put(&first.config.input_slot, StageResult::from_payload(input.clone()));
        }

        for (index, bound) in self.stages.iter().enumerate() {
            let result = if bound.config.mode == ForcedMode::ForceToDb {
                self.before_stage(index, bound, "write", cancel)?;
                let timer = SpanTimer::start(&bound.config.name);

                let source = store
                    .get(&bound.config.input_slot)
                    .map_or_else(|| input.clone(), |r| r.payload.clone());
                let payload = self.transform(&bound.config, source, props)?;
                self.dump_stage(DumpCheckpoint::StageInput, bound, &payload);
                let written = bound.stage.write(&payload, tx.connection()?, props).await?;

                self.after_stage(index, bound, "write", &written, &timer);
                written
            } else {
                self.before_stage(index, bound, "read", cancel)?;
                let timer = SpanTimer::start(&bound.config.name);

                let read = bound.stage.read(tx.connection()?, props).await?;
                let payload = self.transform(&bound.config, read.payload.clone(), props)?;
                let read = read.with_payload(payload);
                self.dump_stage(DumpCheckpoint::StageOutput, bound, &read.payload);

                self.after_stage(index, bound, "read", &read, &timer);
                read
            };
            store.put(&bound.config.output_slot, result);
        }

        let payload = match &self.merge_plan {
            Some(plan) => Payload::Document(plan.apply(&store)?),
            None => self.output_of(&store).payload,
        };
        Ok(RunOutput::Payload(payload))
    }

    async fn drive_call(
        &self,
        tx: &mut TransactionContext<'_>,
        input: &Payload,
        props: &Variables,
        cancel: &CancellationToken,
    ) -> Result<RunOutput, PipelineError> {
        let mut store = DataSlotStore::new();

        for (index, bound) in self.stages.iter().enumerate() {
            self.before_stage(index, bound, "write_then_read", cancel)?;
            let timer = SpanTimer::start(&bound.config.name);

            let payload = self.transform(&bound.config, input.clone(), props)?;
            self.dump_stage(DumpCheckpoint::StageInput, bound, &payload);
            let result = bound.stage.write_then_read(&payload, tx.connection()?, props).await?;
            self.dump_stage(DumpCheckpoint::StageOutput, bound, &result.payload);

            self.after_stage(index, bound, "write_then_read", &result, &timer);
            store.put(&bound.config.output_slot, result);
        }

        Ok(RunOutput::Payload(self.output_of(&store).payload))
    }

    async fn drive_execute(
        &self,
        tx: &mut TransactionContext<'_>,
        input: Payload,
        props: &Variables,
        cancel: &CancellationToken,
    ) -> Result<RunOutput, PipelineError> {
        let wrapped = StageResult::from_payload(input);
        let mut store = DataSlotStore::new();
        let mut per_stage = Vec::with_capacity(self.stages.len());

        for (index, bound) in self.stages.iter().enumerate() {
            let result = match bound.config.mode {
                ForcedMode::ForceToDb => {
                    self.before_stage(index, bound, "write", cancel)?;
                    let timer = SpanTimer::start(&bound.config.name);

                    let source = slot_or(&store, &bound.config.input_slot, &wrapped);
                    let payload = self.transform(&bound.config, source, props)?;
                    self.dump_stage(DumpCheckpoint::StageInput, bound, &payload);
                    let report = bound.stage.write(&payload, tx.connection()?, props).await?;
                    let result = StageResult { payload, ..report };

                    self.after_stage(index, bound, "write", &result, &timer);
                    result
                }
                ForcedMode::ForceFromDb => {
                    self.before_stage(index, bound, "read", cancel)?;
                    let timer = SpanTimer::start(&bound.config.name);

                    let mut report = bound.stage.read(tx.connection()?, props).await?;
                    let raw = std::mem::take(&mut report.payload).into_document_or_bytes();
                    let payload = self.transform(&bound.config, raw, props)?;
                    let result = StageResult { payload, ..report };
                    self.dump_stage(DumpCheckpoint::StageOutput, bound, &result.payload);

                    self.after_stage(index, bound, "read", &result, &timer);
                    result
                }
                ForcedMode::Natural => {
                    self.before_stage(index, bound, "write_then_read", cancel)?;
                    let timer = SpanTimer::start(&bound.config.name);

                    let source = slot_or(&store, &bound.config.input_slot, &wrapped);
                    let payload = self.transform(&bound.config, source, props)?;
                    self.dump_stage(DumpCheckpoint::StageInput, bound, &payload);
                    let mut report = bound.stage.write_then_read(&payload, tx.connection()?, props).await?;
                    if report.payload.is_empty() {
                        report.payload = payload;
                    }
                    self.dump_stage(DumpCheckpoint::StageOutput, bound, &report.payload);

                    self.after_stage(index, bound, "write_then_read", &report, &timer);
                    report
                }
            };
            store.put(&bound.config.output_slot, result.clone());
            per_stage.push(result);
        }

        let mut output = self.output_of(&store);
        match &self.config.stats_slot {
            Some(StatsSlot::All) => {
                let totals = StatsAggregator::sum_all(&per_stage);
                output.counters = totals.counters;
                output.discard_causes = totals.discard_causes;
            }
            Some(StatsSlot::Slot(slot)) if *slot != self.config.output_slot => match store.get(slot) {
                Some(stats) => StatsAggregator::copy_selected(stats, &mut output),
                None => warn!(slot = %slot, "Statistics slot is empty; keeping output counters"),
            },
            _ => {}
        }
        if let Some(plan) = &self.merge_plan {
            output.payload = Payload::Document(plan.apply(&store)?);
        }
        if !self.returns_data() {
            output.clear_payload();
        }
        Ok(RunOutput::Result(output))
    }

    /// Calls `destroy` on every stage. Used when a pipeline is unloaded.
    pub fn destroy(&self) {
        for bound in &self.stages {
            bound.stage.destroy();
        }
        debug!(pipeline = %self.config.name, "Pipeline destroyed");
    }

    fn returns_data(&self) -> bool {
        self.stage_for_output(&self.config.output_slot)
            .and_then(|index| self.stages.get(index))
            .map_or(true, |bound| bound.config.return_data)
    }

    fn output_of(&self, store: &DataSlotStore) -> StageResult {
        if let Some(result) = store.get(&self.config.output_slot) {
            return result.clone();
        }
        warn!(slot = %self.config.output_slot, "Output slot is empty after the run");
        StageResult::default()
    }

    fn transform(&self, stage: &StageConfig, input: Payload, props: &Variables) -> Result<Payload, TransformError> {
        match &self.transformer {
            Some(transformer) => transform::apply(transformer.as_ref(), &stage.transformation, input, props),
            None if stage.transformation.trim().is_empty() => Ok(input),
            None => Err(TransformError::new(
                &stage.transformation,
                format!("stage '{}' needs a transformer but none is configured", stage.name),
            )),
        }
    }

    fn before_stage(
        &self,
        index: usize,
        bound: &BoundStage,
        operation: &str,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        cancel.check(&format!("stage '{}'", bound.config.name))?;
        debug!(stage = %bound.config.name, index, operation, "Stage started");
        self.emit(
            events::STAGE_STARTED,
            StageSpanAttributes::new(&bound.config.name, index)
                .with_operation(operation)
                .with_slots(&bound.config.input_slot, &bound.config.output_slot)
                .to_event_data(),
        );
        Ok(())
    }

    fn after_stage(&self, index: usize, bound: &BoundStage, operation: &str, result: &StageResult, timer: &SpanTimer) {
        let c = result.counters;
        debug!(
            stage = %bound.config.name,
            slot = %bound.config.output_slot,
            read = c.read,
            insert = c.insert,
            update = c.update,
            discard = c.discard,
            total = c.total,
            "Stage completed"
        );
        self.emit(
            events::STAGE_COMPLETED,
            StageSpanAttributes::new(&bound.config.name, index)
                .with_operation(operation)
                .with_slots(&bound.config.input_slot, &bound.config.output_slot)
                .with_result(result)
                .with_duration_ms(timer.elapsed_ms())
                .to_event_data(),
        );
    }

    fn dump_stage(&self, checkpoint: DumpCheckpoint, bound: &BoundStage, payload: &Payload) {
        dump_checkpoint(self.config.make_dump, &self.config.name, checkpoint, Some(&bound.config.name), payload);
    }

    fn emit(&self, event_type: &str, mut data: serde_json::Value) {
        if let Some(map) = data.as_object_mut() {
            map.insert("timestamp".to_string(), serde_json::json!(Utc::now().to_rfc3339()));
        }
        self.event_sink.try_emit(event_type, Some(data));
    }

    fn cleanup_stages(&self) {
        for bound in &self.stages {
            if let Err(e) = bound.stage.cleanup() {
                warn!(stage = %bound.config.name, error = %e, "Stage cleanup failed");
            }
        }
    }
}

/// Run identity fields overlaid with the span attributes of the run.
fn run_event_data(identity: &RunIdentity, attrs: &RunSpanAttributes) -> serde_json::Value {
    let mut data = identity.to_json();
    if let (Some(map), serde_json::Value::Object(extra)) = (data.as_object_mut(), attrs.to_event_data()) {
        map.extend(extra);
    }
    data
}

fn bind_stage(pipeline: &PipelineConfig, declared: &StageConfig) -> StageConfig {
    let mut bound = declared.clone();
    if let Some(ref own) = declared.connection_name {
        if *own != pipeline.connection_name {
            warn!(
                stage = %declared.name,
                declared = %own,
                pipeline_connection = %pipeline.connection_name,
                "Stage connection overridden by the pipeline connection"
            );
        }
    }
    bound.connection_name = Some(pipeline.connection_name.clone());
    bound.transacted = Some(pipeline.transacted);
    bound
}

fn slot_or(store: &DataSlotStore, slot: &str, fallback: &StageResult) -> Payload {
    store
        .get(slot)
        .map_or_else(|| fallback.payload.clone(), |r| r.payload.clone())
}
