//! End-to-end tests for pipeline execution.

#[cfg(test)]
mod tests {
    use crate::cancellation::CancellationToken;
    use crate::context::Variables;
    use crate::core::{ExecutionMode, ForcedMode, Payload, RunOutput};
    use crate::document::Element;
    use crate::errors::{ErrorKind, PipelineError};
    use crate::events::{self, CollectingEventSink};
    use crate::pipeline::{MergeSpec, PipelineBuilder, PipelineConfig, StatsSlot};
    use crate::stages::{Counters, DiscardCause, StageResult};
    use crate::testing::{
        assert_committed_once, assert_connections_released, assert_counters,
        assert_no_transaction_control, assert_rolled_back_once, scripted_config, scripted_registry,
        transacted_pipeline, vars, RecordingConnectionProvider, ScriptedStage, StageOp,
        TaggingTransformer,
    };
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tokio::sync::Notify;

    fn build(
        config: PipelineConfig,
        stages: &[Arc<ScriptedStage>],
        provider: &RecordingConnectionProvider,
    ) -> PipelineBuilder {
        PipelineBuilder::init(config, &scripted_registry(stages), Arc::new(provider.clone()))
            .unwrap()
            .with_transformer(Arc::new(TaggingTransformer))
    }

    fn doc(xml: &str) -> Payload {
        Payload::from(Element::parse(xml).unwrap())
    }

    // Push

    #[tokio::test]
    async fn test_push_fans_out_original_input() {
        let s1 = Arc::new(ScriptedStage::new("s1"));
        let s2 = Arc::new(ScriptedStage::new("s2"));
        let config = transacted_pipeline(
            "push",
            vec![
                scripted_config("s1").with_transformation("a"),
                scripted_config("s2").with_transformation("b"),
            ],
        );
        let provider = RecordingConnectionProvider::new();
        let pipeline = build(config, &[s1.clone(), s2.clone()], &provider);

        pipeline.push("doc", &Variables::new()).await.unwrap();

        assert_eq!(s1.calls()[0].payload, Some(Payload::from("a:doc")));
        assert_eq!(s2.calls()[0].payload, Some(Payload::from("b:doc")));
        assert_eq!(s1.ops(), vec![StageOp::Write]);
        assert_committed_once(&provider.log());
        assert_eq!(provider.log().calls, vec!["acquire", "begin", "commit", "release"]);
        assert_eq!(provider.log().acquired_names, vec!["main".to_string()]);
    }

    #[tokio::test]
    async fn test_push_returns_nothing() {
        let s1 = Arc::new(ScriptedStage::new("s1"));
        let provider = RecordingConnectionProvider::new();
        let pipeline = build(transacted_pipeline("push", vec![scripted_config("s1")]), &[s1], &provider);

        let output = pipeline
            .run(ExecutionMode::Push, Payload::from("x"), &Variables::new(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(output, RunOutput::Nothing);
    }

    #[tokio::test]
    async fn test_stage_failure_rolls_back_and_releases() {
        let s1 = Arc::new(ScriptedStage::new("s1"));
        let s2 = Arc::new(ScriptedStage::new("s2").failing_on(StageOp::Write));
        let s3 = Arc::new(ScriptedStage::new("s3"));
        let config = transacted_pipeline(
            "orders",
            vec![scripted_config("s1"), scripted_config("s2"), scripted_config("s3")],
        );
        let provider = RecordingConnectionProvider::new();
        let pipeline = build(config, &[s1.clone(), s2.clone(), s3.clone()], &provider);

        let err = pipeline.push("x", &Variables::new()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Database);
        assert_eq!(err.pipeline, "orders");
        assert!(!err.run_id.is_empty());
        assert!(s3.calls().is_empty());
        assert_rolled_back_once(&provider.log());
        assert_eq!(provider.log().calls, vec!["acquire", "begin", "rollback", "release"]);
        for stage in [&s1, &s2, &s3] {
            assert_eq!(stage.cleanup_count(), 1);
        }
    }

    // Transaction discipline

    #[tokio::test]
    async fn test_xa_never_commits_or_rolls_back() {
        let ok = Arc::new(ScriptedStage::new("ok"));
        let provider = RecordingConnectionProvider::new();
        let pipeline = build(
            transacted_pipeline("xa", vec![scripted_config("ok")]).xa(true),
            &[ok],
            &provider,
        );
        pipeline.push("x", &Variables::new()).await.unwrap();
        assert_no_transaction_control(&provider.log());
        assert_connections_released(&provider.log());

        let bad = Arc::new(ScriptedStage::new("bad").failing_on(StageOp::Write));
        let provider = RecordingConnectionProvider::new();
        let pipeline = build(
            transacted_pipeline("xa", vec![scripted_config("bad")]).xa(true),
            &[bad],
            &provider,
        );
        assert!(pipeline.push("x", &Variables::new()).await.is_err());
        assert_no_transaction_control(&provider.log());
        assert_connections_released(&provider.log());
    }

    #[tokio::test]
    async fn test_non_transacted_leaves_auto_commit() {
        let s1 = Arc::new(ScriptedStage::new("s1"));
        let provider = RecordingConnectionProvider::new();
        let config = PipelineConfig::new("plain", "main").with_stage(scripted_config("s1"));
        let pipeline = build(config, &[s1], &provider);

        pipeline.push("x", &Variables::new()).await.unwrap();
        assert_no_transaction_control(&provider.log());
        assert_eq!(provider.log().releases, 1);
    }

    #[tokio::test]
    async fn test_commit_failure_fails_the_run() {
        let s1 = Arc::new(ScriptedStage::new("s1"));
        let provider = RecordingConnectionProvider::new().failing_commit();
        let pipeline = build(transacted_pipeline("p", vec![scripted_config("s1")]), &[s1], &provider);

        let err = pipeline.push("x", &Variables::new()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Database);
        let log = provider.log();
        assert_eq!((log.commits, log.rollbacks, log.releases), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_rollback_failure_keeps_original_error() {
        let s1 = Arc::new(ScriptedStage::new("s1").failing_on(StageOp::Write));
        let provider = RecordingConnectionProvider::new().failing_rollback().failing_release();
        let pipeline = build(transacted_pipeline("p", vec![scripted_config("s1")]), &[s1], &provider);

        let err = pipeline.push("x", &Variables::new()).await.unwrap_err();

        assert!(matches!(err.source, PipelineError::Database(_)));
        assert!(err.to_string().contains("scripted Write failure"));
        assert_eq!(provider.log().rollbacks, 1);
        assert_eq!(provider.log().releases, 1);
    }

    #[tokio::test]
    async fn test_acquire_failure_runs_no_stage() {
        let s1 = Arc::new(ScriptedStage::new("s1"));
        let provider = RecordingConnectionProvider::new().failing_acquire();
        let pipeline = build(transacted_pipeline("p", vec![scripted_config("s1")]), &[s1.clone()], &provider);

        let err = pipeline.push("x", &Variables::new()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Database);
        assert!(s1.calls().is_empty());
        assert_eq!(s1.cleanup_count(), 1);
        let log = provider.log();
        assert_eq!((log.acquires, log.releases, log.rollbacks), (1, 0, 0));
    }

    #[tokio::test]
    async fn test_cleanup_failure_is_swallowed() {
        let s1 = Arc::new(ScriptedStage::new("s1").failing_cleanup());
        let s2 = Arc::new(ScriptedStage::new("s2"));
        let provider = RecordingConnectionProvider::new();
        let pipeline = build(
            transacted_pipeline("p", vec![scripted_config("s1"), scripted_config("s2")]),
            &[s1.clone(), s2.clone()],
            &provider,
        );

        pipeline.push("x", &Variables::new()).await.unwrap();

        assert_eq!(s1.cleanup_count(), 1);
        assert_eq!(s2.cleanup_count(), 1);
        assert_committed_once(&provider.log());
    }

    // Execute

    fn stats_stages() -> (Arc<ScriptedStage>, Arc<ScriptedStage>) {
        let s1 = Arc::new(ScriptedStage::new("s1").with_write_then_read(
            StageResult::new(Payload::from("<s1/>"), Counters::new().with_read(1).with_total(1))
                .with_discard_cause(DiscardCause::new("D1", "duplicate key")),
        ));
        let s2 = Arc::new(ScriptedStage::new("s2").with_write_then_read(
            StageResult::new(Payload::from("<s2/>"), Counters::new().with_insert(2).with_total(2))
                .with_discard_cause(DiscardCause::new("D2", "null column"))
                .with_discard_cause(DiscardCause::new("D3", "too long")),
        ));
        (s1, s2)
    }

    #[tokio::test]
    async fn test_execute_sums_all_stats() {
        let (s1, s2) = stats_stages();
        let config = transacted_pipeline(
            "exec",
            vec![scripted_config("s1").with_output("S1"), scripted_config("s2").with_output("S2")],
        )
        .with_output("S2")
        .with_stats(StatsSlot::All);
        let provider = RecordingConnectionProvider::new();
        let pipeline = build(config, &[s1.clone(), s2], &provider);

        let result = pipeline.execute("<in/>", &Variables::new()).await.unwrap();

        assert_eq!(result.payload, Payload::from("<s2/>"));
        assert_counters(&result, Counters { read: 1, insert: 2, update: 0, discard: 0, total: 3 });
        let codes: Vec<&str> = result.discard_causes.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, vec!["D1", "D2", "D3"]);
        assert_eq!(s1.calls()[0].payload, Some(Payload::from("<in/>")));
        assert_committed_once(&provider.log());
    }

    #[tokio::test]
    async fn test_execute_without_return_data_keeps_counters() {
        let (s1, s2) = stats_stages();
        let config = transacted_pipeline(
            "exec",
            vec![
                scripted_config("s1").with_output("S1"),
                scripted_config("s2").with_output("S2").with_return_data(false),
            ],
        )
        .with_output("S2");
        let provider = RecordingConnectionProvider::new();
        let pipeline = build(config, &[s1, s2], &provider);

        let result = pipeline.execute("<in/>", &Variables::new()).await.unwrap();

        assert!(result.payload.is_empty());
        assert_counters(&result, Counters::new().with_insert(2).with_total(2));
        assert_eq!(result.discard_causes.len(), 2);
    }

    #[tokio::test]
    async fn test_execute_copies_selected_stats_slot() {
        let (s1, s2) = stats_stages();
        let config = transacted_pipeline(
            "exec",
            vec![scripted_config("s1").with_output("S1"), scripted_config("s2").with_output("S2")],
        )
        .with_output("S2")
        .with_stats(StatsSlot::Slot("S1".to_string()));
        let provider = RecordingConnectionProvider::new();
        let pipeline = build(config, &[s1, s2], &provider);

        let result = pipeline.execute("<in/>", &Variables::new()).await.unwrap();

        assert_counters(&result, Counters::new().with_read(1).with_total(1));
        let codes: Vec<&str> = result.discard_causes.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, vec!["D2", "D3"]);
        assert_eq!(result.payload, Payload::from("<s2/>"));
    }

    #[tokio::test]
    async fn test_execute_forced_modes() {
        let reader = Arc::new(ScriptedStage::new("reader").with_read(StageResult::new(
            Payload::from("<rows><r>1</r></rows>"),
            Counters::new().with_read(1).with_total(1),
        )));
        let writer = Arc::new(
            ScriptedStage::new("writer")
                .with_write(StageResult::counters_only(Counters::new().with_insert(1).with_total(1))),
        );
        let config = transacted_pipeline(
            "exec",
            vec![
                scripted_config("reader").with_mode(ForcedMode::ForceFromDb).with_output("R"),
                scripted_config("writer")
                    .with_mode(ForcedMode::ForceToDb)
                    .with_input("R")
                    .with_output("W"),
            ],
        )
        .with_output("W");
        let provider = RecordingConnectionProvider::new();
        let pipeline = build(config, &[reader.clone(), writer.clone()], &provider);

        let result = pipeline.execute("<ignored/>", &Variables::new()).await.unwrap();

        assert_eq!(reader.ops(), vec![StageOp::Read]);
        assert_eq!(writer.ops(), vec![StageOp::Write]);
        let rows = doc("<rows><r>1</r></rows>");
        assert_eq!(writer.calls()[0].payload, Some(rows.clone()));
        assert_eq!(result.payload, rows);
        assert_counters(&result, Counters::new().with_insert(1).with_total(1));
    }

    #[tokio::test]
    async fn test_execute_unparseable_read_falls_back_to_bytes() {
        let reader = Arc::new(ScriptedStage::new("reader").with_read(StageResult::from_payload("not a document")));
        let config = transacted_pipeline(
            "exec",
            vec![scripted_config("reader").with_mode(ForcedMode::ForceFromDb).with_output("R")],
        )
        .with_output("R");
        let provider = RecordingConnectionProvider::new();
        let pipeline = build(config, &[reader], &provider);

        let result = pipeline.execute(Payload::Empty, &Variables::new()).await.unwrap();
        assert_eq!(result.payload, Payload::from(b"not a document".to_vec()));
    }

    #[tokio::test]
    async fn test_execute_missing_input_slot_uses_caller_input() {
        let writer = Arc::new(ScriptedStage::new("writer"));
        let config = transacted_pipeline(
            "exec",
            vec![scripted_config("writer")
                .with_mode(ForcedMode::ForceToDb)
                .with_input("never-written")
                .with_transformation("t")
                .with_output("W")],
        )
        .with_output("W");
        let provider = RecordingConnectionProvider::new();
        let pipeline = build(config, &[writer.clone()], &provider);

        let result = pipeline.execute("payload", &Variables::new()).await.unwrap();

        assert_eq!(writer.calls()[0].payload, Some(Payload::from("t:payload")));
        assert_eq!(result.payload, Payload::from("t:payload"));
    }

    #[tokio::test]
    async fn test_execute_natural_keeps_input_when_nothing_read_back() {
        let s1 = Arc::new(ScriptedStage::new("s1"));
        let config = transacted_pipeline("exec", vec![scripted_config("s1").with_output("S1")]).with_output("S1");
        let provider = RecordingConnectionProvider::new();
        let pipeline = build(config, &[s1], &provider);

        let result = pipeline.execute("<in/>", &Variables::new()).await.unwrap();
        assert_eq!(result.payload, Payload::from("<in/>"));
    }

    // Pull

    #[tokio::test]
    async fn test_pull_merges_slot_documents() {
        let a = Arc::new(ScriptedStage::new("a").with_read(StageResult::from_payload("<root/>")));
        let b = Arc::new(
            ScriptedStage::new("b").with_read(StageResult::from_payload("<root><item>1</item><item>2</item></root>")),
        );
        let config = transacted_pipeline(
            "pull",
            vec![scripted_config("a").with_output("A"), scripted_config("b").with_output("B")],
        )
        .with_output("A")
        .with_merge(MergeSpec::destination("A"))
        .with_merge(MergeSpec::new("B", "//item", "//root"));
        let provider = RecordingConnectionProvider::new();
        let pipeline = build(config, &[a, b], &provider);

        let merged = pipeline.pull(Payload::Empty, &Variables::new()).await.unwrap();

        assert_eq!(merged, doc("<root><item>1</item><item>2</item></root>"));
        assert_committed_once(&provider.log());
    }

    #[tokio::test]
    async fn test_pull_chains_write_stages_through_slots() {
        let first = Arc::new(ScriptedStage::new("first").with_write(StageResult::from_payload("<written/>")));
        let second = Arc::new(ScriptedStage::new("second"));
        let reader = Arc::new(ScriptedStage::new("reader").with_read(StageResult::from_payload("<out/>")));
        let config = transacted_pipeline(
            "pull",
            vec![
                scripted_config("first")
                    .with_mode(ForcedMode::ForceToDb)
                    .with_transformation("t1")
                    .with_input("IN")
                    .with_output("W1"),
                scripted_config("second").with_mode(ForcedMode::ForceToDb).with_input("W1").with_output("W2"),
                scripted_config("reader").with_output("OUT"),
            ],
        )
        .with_output("OUT");
        let provider = RecordingConnectionProvider::new();
        let pipeline = build(config, &[first.clone(), second.clone(), reader.clone()], &provider);

        let out = pipeline.pull("<in/>", &Variables::new()).await.unwrap();

        assert_eq!(first.calls()[0].payload, Some(Payload::from("t1:<in/>")));
        assert_eq!(second.calls()[0].payload, Some(Payload::from("<written/>")));
        assert_eq!(reader.ops(), vec![StageOp::Read]);
        assert_eq!(out, Payload::from("<out/>"));
    }

    #[tokio::test]
    async fn test_pull_transforms_read_results() {
        let reader = Arc::new(ScriptedStage::new("reader").with_read(StageResult::from_payload("rows")));
        let config = transacted_pipeline(
            "pull",
            vec![scripted_config("reader").with_transformation("to-doc").with_output("OUT")],
        )
        .with_output("OUT");
        let provider = RecordingConnectionProvider::new();
        let pipeline = build(config, &[reader], &provider);

        assert_eq!(pipeline.pull(Payload::Empty, &Variables::new()).await.unwrap(), Payload::from("to-doc:rows"));
    }

    #[tokio::test]
    async fn test_pull_unmatched_merge_destination_rolls_back() {
        let a = Arc::new(ScriptedStage::new("a").with_read(StageResult::from_payload("<root/>")));
        let b = Arc::new(ScriptedStage::new("b").with_read(StageResult::from_payload("<x><item/></x>")));
        let config = transacted_pipeline(
            "pull",
            vec![scripted_config("a").with_output("A"), scripted_config("b").with_output("B")],
        )
        .with_merge(MergeSpec::destination("A"))
        .with_merge(MergeSpec::new("B", "//item", "/nowhere"));
        let provider = RecordingConnectionProvider::new();
        let pipeline = build(config, &[a, b], &provider);

        let err = pipeline.pull(Payload::Empty, &Variables::new()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Merge);
        assert_rolled_back_once(&provider.log());
    }

    #[tokio::test]
    async fn test_pull_empty_output_slot_yields_empty_payload() {
        let s1 = Arc::new(ScriptedStage::new("s1"));
        let config = transacted_pipeline("pull", vec![scripted_config("s1").with_output("A")]).with_output("B");
        let provider = RecordingConnectionProvider::new();
        let pipeline = build(config, &[s1], &provider);

        assert!(pipeline.pull(Payload::Empty, &Variables::new()).await.unwrap().is_empty());
    }

    // Call

    #[tokio::test]
    async fn test_call_fans_out_combined_io() {
        let s1 = Arc::new(ScriptedStage::new("s1").with_write_then_read(StageResult::from_payload("<one/>")));
        let s2 = Arc::new(ScriptedStage::new("s2").with_write_then_read(StageResult::from_payload("<two/>")));
        let config = transacted_pipeline(
            "call",
            vec![
                scripted_config("s1").with_output("C1"),
                scripted_config("s2").with_transformation("t2").with_output("C2"),
            ],
        )
        .with_output("C2");
        let provider = RecordingConnectionProvider::new();
        let pipeline = build(config, &[s1.clone(), s2.clone()], &provider);

        let out = pipeline.call("req", &Variables::new()).await.unwrap();

        assert_eq!(out, Payload::from("<two/>"));
        assert_eq!(s1.calls()[0].payload, Some(Payload::from("req")));
        assert_eq!(s2.calls()[0].payload, Some(Payload::from("t2:req")));
        assert_eq!(s2.ops(), vec![StageOp::WriteThenRead]);
    }

    // Cancellation

    #[tokio::test]
    async fn test_cancelled_before_first_stage() {
        let s1 = Arc::new(ScriptedStage::new("s1"));
        let provider = RecordingConnectionProvider::new();
        let pipeline = build(transacted_pipeline("p", vec![scripted_config("s1")]), &[s1.clone()], &provider);
        let token = CancellationToken::new();
        token.cancel("shutdown");

        let err = pipeline
            .run(ExecutionMode::Push, Payload::from("x"), &Variables::new(), &token)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(s1.calls().is_empty());
        assert_eq!(s1.cleanup_count(), 1);
        assert_rolled_back_once(&provider.log());
    }

    #[tokio::test]
    async fn test_cancelled_between_stages() {
        let token = CancellationToken::new();
        let s1 = Arc::new(ScriptedStage::new("s1").cancelling(&token, "operator abort"));
        let s2 = Arc::new(ScriptedStage::new("s2"));
        let provider = RecordingConnectionProvider::new();
        let pipeline = build(
            transacted_pipeline("p", vec![scripted_config("s1"), scripted_config("s2")]),
            &[s1.clone(), s2.clone()],
            &provider,
        );

        let err = pipeline
            .run(ExecutionMode::Execute, Payload::from("x"), &Variables::new(), &token)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(err.to_string().contains("s2"));
        assert_eq!(s1.calls().len(), 1);
        assert!(s2.calls().is_empty());
        assert_rolled_back_once(&provider.log());
    }

    // Transforms and variables

    #[tokio::test]
    async fn test_transform_failure_rolls_back() {
        let s1 = Arc::new(ScriptedStage::new("s1"));
        let provider = RecordingConnectionProvider::new();
        let pipeline = build(
            transacted_pipeline("p", vec![scripted_config("s1").with_transformation("fail")]),
            &[s1.clone()],
            &provider,
        );

        let err = pipeline.push("x", &Variables::new()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Transform);
        assert!(s1.calls().is_empty());
        assert_rolled_back_once(&provider.log());
    }

    #[tokio::test]
    async fn test_stages_receive_resolved_variables() {
        let s1 = Arc::new(ScriptedStage::new("s1"));
        let config = transacted_pipeline("p", vec![scripted_config("s1")])
            .with_variable("table", "${schema}.orders")
            .with_variable("schema", "public")
            .resolving_metadata(true);
        let provider = RecordingConnectionProvider::new();
        let pipeline = build(config, &[s1.clone()], &provider);

        pipeline.push("x", &vars(&[("schema", "sales")])).await.unwrap();

        let params = &s1.calls()[0].params;
        assert_eq!(params["table"], "sales.orders");
        assert_eq!(params["schema"], "sales");
    }

    #[tokio::test]
    async fn test_variable_cycle_fails_before_acquire() {
        let s1 = Arc::new(ScriptedStage::new("s1"));
        let config = transacted_pipeline("p", vec![scripted_config("s1")])
            .with_variable("a", "x${b}")
            .with_variable("b", "y${a}")
            .resolving_metadata(true);
        let provider = RecordingConnectionProvider::new();
        let pipeline = build(config, &[s1.clone()], &provider);

        let err = pipeline.push("x", &Variables::new()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(provider.log().acquires, 0);
        assert_eq!(s1.cleanup_count(), 1);
    }

    // Events and concurrency

    #[tokio::test]
    async fn test_lifecycle_events() {
        let s1 = Arc::new(ScriptedStage::new("s1"));
        let s2 = Arc::new(ScriptedStage::new("s2"));
        let sink = Arc::new(CollectingEventSink::new());
        let provider = RecordingConnectionProvider::new();
        let pipeline = build(
            transacted_pipeline("p", vec![scripted_config("s1"), scripted_config("s2")]),
            &[s1, s2],
            &provider,
        )
        .with_event_sink(sink.clone());

        pipeline.push("x", &Variables::new()).await.unwrap();

        assert_eq!(
            sink.event_types(),
            vec![
                events::PIPELINE_STARTED,
                events::STAGE_STARTED,
                events::STAGE_COMPLETED,
                events::STAGE_STARTED,
                events::STAGE_COMPLETED,
                events::PIPELINE_COMPLETED,
            ]
        );
        let started = sink.events()[0].1.clone().unwrap();
        assert_eq!(started["pipeline"], "p");
        assert_eq!(started["mode"], "XML2DB");
        assert!(started["timestamp"].is_string());
        assert!(started["started_at"].is_string());

        let completed = sink.events()[5].1.clone().unwrap();
        assert_eq!(completed["run_id"], started["run_id"]);
        assert_eq!(completed["started_at"], started["started_at"]);
        assert!(completed["duration_ms"].is_number());
    }

    #[tokio::test]
    async fn test_failure_event() {
        let s1 = Arc::new(ScriptedStage::new("s1").failing_on(StageOp::Write));
        let sink = Arc::new(CollectingEventSink::new());
        let provider = RecordingConnectionProvider::new();
        let pipeline = build(transacted_pipeline("p", vec![scripted_config("s1")]), &[s1], &provider)
            .with_event_sink(sink.clone());

        assert!(pipeline.push("x", &Variables::new()).await.is_err());

        let failed = sink.events_of_type(events::PIPELINE_FAILED);
        assert_eq!(failed.len(), 1);
        assert!(failed[0].1.as_ref().unwrap()["error"].is_string());
        assert!(sink.events_of_type(events::PIPELINE_COMPLETED).is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_runs_share_one_pipeline() {
        let (s1, s2) = stats_stages();
        let config = transacted_pipeline(
            "exec",
            vec![scripted_config("s1").with_output("S1"), scripted_config("s2").with_output("S2")],
        )
        .with_output("S2")
        .with_stats(StatsSlot::All);
        let provider = RecordingConnectionProvider::new();
        let pipeline = Arc::new(build(config, &[s1, s2], &provider));

        let params = Variables::new();
        let (a, b) = tokio::join!(pipeline.execute("<a/>", &params), pipeline.execute("<b/>", &params));

        assert_eq!(a.unwrap().counters.total, 3);
        assert_eq!(b.unwrap().counters.total, 3);
        let log = provider.log();
        assert_eq!((log.acquires, log.releases, log.commits), (2, 2, 2));
    }

    #[tokio::test]
    async fn test_cleanup_of_one_run_leaves_in_flight_run_intact() {
        let gate = Arc::new(Notify::new());
        let s1 = Arc::new(
            ScriptedStage::new("s1")
                .with_write_then_read(StageResult::new(Payload::from("<s1/>"), Counters::new().with_read(1).with_total(1)))
                .gated_on(StageOp::WriteThenRead, gate.clone()),
        );
        let s2 = Arc::new(ScriptedStage::new("s2").with_write_then_read(StageResult::new(
            Payload::from("<s2/>"),
            Counters::new().with_insert(2).with_total(2),
        )));
        let config = transacted_pipeline(
            "exec",
            vec![scripted_config("s1").with_output("S1"), scripted_config("s2").with_output("S2")],
        )
        .with_output("S2")
        .with_stats(StatsSlot::All);
        let provider = RecordingConnectionProvider::new();
        let pipeline = Arc::new(build(config, &[s1.clone(), s2.clone()], &provider));
        let params = Variables::new();

        let suspended = pipeline.execute("<a/>", &params);
        let finished_first = async {
            let result = pipeline.execute("<b/>", &params).await;
            // The suspended run is still inside s1 while this run cleans up.
            assert_eq!(s1.cleanup_count(), 1);
            assert_eq!(provider.log().releases, 1);
            gate.notify_one();
            result
        };
        let (a, b) = tokio::join!(suspended, finished_first);

        assert_counters(&b.unwrap(), Counters { read: 1, insert: 2, update: 0, discard: 0, total: 3 });
        assert_counters(&a.unwrap(), Counters { read: 1, insert: 2, update: 0, discard: 0, total: 3 });
        assert_eq!(s1.cleanup_count(), 2);
        assert_eq!(s2.cleanup_count(), 2);
        let log = provider.log();
        assert_eq!((log.acquires, log.releases, log.commits), (2, 2, 2));
    }
}
