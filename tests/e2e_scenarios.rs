//! End-to-end engine scenarios over the memory store with the mock LLM.

mod common;

use serde_json::{json, Value};

use common::{edge, harness, harness_with_config, seed_workflow, step};
use stepflow::engine::EngineConfig;
use stepflow::model::{ExecutionStatus, StepKind, StepStatus, TriggerEnvelope};
use stepflow::store::Store;

fn manual() -> TriggerEnvelope {
    TriggerEnvelope::Manual {
        payload: Value::Null,
    }
}

#[tokio::test]
async fn s1_conditional_branching_takes_only_true_branch() {
    let h = harness();
    let wf = seed_workflow(
        &h.store,
        "s1",
        vec![
            step("w", "trigger1", StepKind::ManualTrigger, json!({}), 0),
            step(
                "w",
                "code1",
                StepKind::Code,
                json!({"code": "return { value: true };"}),
                1,
            ),
            step(
                "w",
                "cond1",
                StepKind::Condition,
                json!({"condition": "context.outputs.code1.value"}),
                2,
            ),
            step(
                "w",
                "yes1",
                StepKind::BasicLlmChain,
                json!({"prompt": "ok"}),
                3,
            ),
            step(
                "w",
                "no1",
                StepKind::BasicLlmChain,
                json!({"prompt": "no"}),
                4,
            ),
        ],
        vec![
            edge("w", "trigger1", "code1", None),
            edge("w", "code1", "cond1", None),
            edge("w", "cond1", "yes1", Some("true")),
            edge("w", "cond1", "no1", Some("false")),
        ],
    )
    .await;

    let run = h.engine.start_run(&wf.id, manual()).await.unwrap();
    assert_eq!(run.status, ExecutionStatus::Completed);
    assert_eq!(
        run.outputs.get("yes1"),
        Some(&json!("[MOCK] Response to: ok"))
    );
    assert!(run.outputs.get("no1").is_none());
    assert_eq!(
        run.outputs.get("cond1"),
        Some(&json!({"condition": true, "result": true}))
    );
}

#[tokio::test]
async fn s2_switch_takes_matching_case_over_default() {
    let h = harness();
    let wf = seed_workflow(
        &h.store,
        "s2",
        vec![
            step("w", "trigger1", StepKind::ManualTrigger, json!({}), 0),
            step(
                "w",
                "code1",
                StepKind::Code,
                json!({"code": "return { v: \"b\" };"}),
                1,
            ),
            step(
                "w",
                "switch1",
                StepKind::Switch,
                json!({"expression": "context.outputs.code1.v"}),
                2,
            ),
            step("w", "x1", StepKind::Code, json!({"code": "return \"X\";"}), 3),
            step("w", "y1", StepKind::Code, json!({"code": "return \"Y\";"}), 4),
            step("w", "z1", StepKind::Code, json!({"code": "return \"Z\";"}), 5),
        ],
        vec![
            edge("w", "trigger1", "code1", None),
            edge("w", "code1", "switch1", None),
            edge("w", "switch1", "x1", Some("a")),
            edge("w", "switch1", "y1", Some("b")),
            edge("w", "switch1", "z1", Some("default")),
        ],
    )
    .await;

    let run = h.engine.start_run(&wf.id, manual()).await.unwrap();
    assert_eq!(run.status, ExecutionStatus::Completed);
    assert_eq!(run.outputs.get("switch1"), Some(&json!({"switchValue": "b"})));
    assert_eq!(run.outputs.get("y1"), Some(&json!("Y")));
    assert!(run.outputs.get("x1").is_none());
    assert!(run.outputs.get("z1").is_none());
}

#[tokio::test]
async fn s2b_switch_falls_back_to_default() {
    let h = harness();
    let wf = seed_workflow(
        &h.store,
        "s2b",
        vec![
            step(
                "w",
                "code1",
                StepKind::Code,
                json!({"code": "return { v: \"nope\" };"}),
                0,
            ),
            step(
                "w",
                "switch1",
                StepKind::Switch,
                json!({"expression": "context.outputs.code1.v"}),
                1,
            ),
            step("w", "y1", StepKind::Code, json!({"code": "return \"Y\";"}), 2),
            step("w", "z1", StepKind::Code, json!({"code": "return \"Z\";"}), 3),
        ],
        vec![
            edge("w", "code1", "switch1", None),
            edge("w", "switch1", "y1", Some("b")),
            edge("w", "switch1", "z1", Some("default")),
        ],
    )
    .await;

    let run = h.engine.start_run(&wf.id, manual()).await.unwrap();
    assert_eq!(run.status, ExecutionStatus::Completed);
    assert_eq!(run.outputs.get("z1"), Some(&json!("Z")));
    assert!(run.outputs.get("y1").is_none());
}

#[tokio::test]
async fn s2c_switch_without_match_or_default_is_non_fatal() {
    let h = harness();
    let wf = seed_workflow(
        &h.store,
        "s2c",
        vec![
            step(
                "w",
                "code1",
                StepKind::Code,
                json!({"code": "return { v: \"nope\" };"}),
                0,
            ),
            step(
                "w",
                "switch1",
                StepKind::Switch,
                json!({"expression": "context.outputs.code1.v"}),
                1,
            ),
            step("w", "y1", StepKind::Code, json!({"code": "return \"Y\";"}), 2),
        ],
        vec![
            edge("w", "code1", "switch1", None),
            edge("w", "switch1", "y1", Some("b")),
        ],
    )
    .await;

    let run = h.engine.start_run(&wf.id, manual()).await.unwrap();
    assert_eq!(run.status, ExecutionStatus::Completed);
    assert!(run.outputs.get("y1").is_none());
    assert_eq!(
        run.outputs.get("switch1"),
        Some(&json!({"switchValue": "nope"}))
    );
}

#[tokio::test]
async fn s3_loop_doubles_each_item_in_isolated_scopes() {
    let h = harness();
    let wf = seed_workflow(
        &h.store,
        "s3",
        vec![
            step(
                "w",
                "code1",
                StepKind::Code,
                json!({"code": "return { items: [1, 2, 3] };"}),
                0,
            ),
            step(
                "w",
                "loop1",
                StepKind::Loop,
                json!({"input": "code1.items"}),
                1,
            ),
            step(
                "w",
                "double1",
                StepKind::Code,
                json!({"code": "currentItem * 2"}),
                2,
            ),
        ],
        vec![
            edge("w", "code1", "loop1", None),
            edge("w", "loop1", "double1", None),
        ],
    )
    .await;

    let run = h.engine.start_run(&wf.id, manual()).await.unwrap();
    assert_eq!(run.status, ExecutionStatus::Completed);
    assert_eq!(run.outputs.get("loop1"), Some(&json!([[2], [4], [6]])));
    // Loop isolation: neither the iteration cursor nor the body's writes leak.
    assert!(run.outputs.get("currentItem").is_none());
    assert!(run.outputs.get("double1").is_none());

    // The body ran once per item.
    let records = h.store.list_step_executions(&run.id).await.unwrap();
    let body_runs = records.iter().filter(|r| r.step_id == "double1").count();
    assert_eq!(body_runs, 3);
}

#[tokio::test]
async fn s3b_loop_over_non_array_fails_with_type_error() {
    let h = harness();
    let wf = seed_workflow(
        &h.store,
        "s3b",
        vec![
            step(
                "w",
                "code1",
                StepKind::Code,
                json!({"code": "return { items: 7 };"}),
                0,
            ),
            step(
                "w",
                "loop1",
                StepKind::Loop,
                json!({"input": "code1.items"}),
                1,
            ),
            step("w", "body1", StepKind::Code, json!({"code": "1"}), 2),
        ],
        vec![
            edge("w", "code1", "loop1", None),
            edge("w", "loop1", "body1", None),
        ],
    )
    .await;

    let run = h.engine.start_run(&wf.id, manual()).await.unwrap();
    assert_eq!(run.status, ExecutionStatus::Failed);
    assert!(run.error.as_deref().unwrap().contains("TYPE_ERROR"));

    let records = h.store.list_step_executions(&run.id).await.unwrap();
    let loop_record = records.iter().find(|r| r.step_id == "loop1").unwrap();
    assert_eq!(loop_record.status, StepStatus::Failed);
}

#[tokio::test]
async fn s4_merge_combines_both_predecessors() {
    let h = harness();
    let wf = seed_workflow(
        &h.store,
        "s4",
        vec![
            step("w", "trigger1", StepKind::ManualTrigger, json!({}), 0),
            step(
                "w",
                "predA",
                StepKind::Code,
                json!({"code": "return { a: 1 };"}),
                1,
            ),
            step(
                "w",
                "predB",
                StepKind::Code,
                json!({"code": "return { b: 2 };"}),
                2,
            ),
            step(
                "w",
                "merge1",
                StepKind::Merge,
                json!({"inputs": ["predA", "predB"]}),
                3,
            ),
        ],
        vec![
            edge("w", "trigger1", "predA", None),
            edge("w", "trigger1", "predB", None),
            edge("w", "predA", "merge1", None),
            edge("w", "predB", "merge1", None),
        ],
    )
    .await;

    let run = h.engine.start_run(&wf.id, manual()).await.unwrap();
    assert_eq!(run.status, ExecutionStatus::Completed);
    assert_eq!(run.outputs.get("merge1"), Some(&json!({"a": 1, "b": 2})));

    // Fan-in ran the merge exactly once.
    let records = h.store.list_step_executions(&run.id).await.unwrap();
    assert_eq!(records.iter().filter(|r| r.step_id == "merge1").count(), 1);
}

#[tokio::test]
async fn s6_cycle_fails_with_path() {
    let h = harness();
    let wf = seed_workflow(
        &h.store,
        "s6",
        vec![
            step("w", "A", StepKind::Code, json!({"code": "1"}), 0),
            step("w", "B", StepKind::Code, json!({"code": "2"}), 1),
        ],
        vec![edge("w", "A", "B", None), edge("w", "B", "A", None)],
    )
    .await;

    let run = h.engine.start_run(&wf.id, manual()).await.unwrap();
    assert_eq!(run.status, ExecutionStatus::Failed);
    let error = run.error.unwrap();
    assert!(error.contains("CYCLE_DETECTED"), "error was: {error}");
    assert!(error.contains("A -> B -> A"), "error was: {error}");

    // No step committed an output along the offending path.
    assert!(run.outputs.is_empty());
}

#[tokio::test]
async fn filter_keeps_matching_items() {
    let h = harness();
    let wf = seed_workflow(
        &h.store,
        "filter",
        vec![
            step(
                "w",
                "code1",
                StepKind::Code,
                json!({"code": "return { items: [1, 2, 3, 4] };"}),
                0,
            ),
            step(
                "w",
                "filter1",
                StepKind::Filter,
                json!({"input": "code1.items", "predicate": "item > 2"}),
                1,
            ),
        ],
        vec![edge("w", "code1", "filter1", None)],
    )
    .await;

    let run = h.engine.start_run(&wf.id, manual()).await.unwrap();
    assert_eq!(run.status, ExecutionStatus::Completed);
    assert_eq!(run.outputs.get("filter1"), Some(&json!([3, 4])));
}

#[tokio::test]
async fn ai_steps_mock_sentinels() {
    let h = harness();
    let wf = seed_workflow(
        &h.store,
        "ai",
        vec![
            step(
                "w",
                "code1",
                StepKind::Code,
                json!({"code": "return { text: \"great product\" };"}),
                0,
            ),
            step(
                "w",
                "sent1",
                StepKind::SentimentAnalysis,
                json!({"input": "code1.text"}),
                1,
            ),
            step(
                "w",
                "class1",
                StepKind::TextClassifier,
                json!({"input": "code1.text", "categories": ["praise", "complaint"]}),
                2,
            ),
            step(
                "w",
                "extract1",
                StepKind::InformationExtractor,
                json!({"input": "code1.text", "schema": {"topic": "string"}}),
                3,
            ),
        ],
        vec![
            edge("w", "code1", "sent1", None),
            edge("w", "code1", "class1", None),
            edge("w", "code1", "extract1", None),
        ],
    )
    .await;

    let run = h.engine.start_run(&wf.id, manual()).await.unwrap();
    assert_eq!(run.status, ExecutionStatus::Completed);
    assert_eq!(run.outputs["sent1"]["sentiment"], json!("positive"));
    assert_eq!(run.outputs["sent1"]["score"], json!(0.8));
    assert_eq!(run.outputs["class1"]["category"], json!("praise"));
    assert_eq!(run.outputs["extract1"]["extracted"], json!(true));
}

#[tokio::test]
async fn determinism_without_ai_steps() {
    let h = harness();
    let wf = seed_workflow(
        &h.store,
        "det",
        vec![
            step(
                "w",
                "code1",
                StepKind::Code,
                json!({"code": "return { v: \"b\", n: 41 };"}),
                0,
            ),
            step(
                "w",
                "code2",
                StepKind::Code,
                json!({"code": "return inputs.code1.n + 1;"}),
                1,
            ),
            step(
                "w",
                "switch1",
                StepKind::Switch,
                json!({"expression": "context.outputs.code1.v"}),
                2,
            ),
            step("w", "y1", StepKind::Code, json!({"code": "return \"Y\";"}), 3),
        ],
        vec![
            edge("w", "code1", "code2", None),
            edge("w", "code2", "switch1", None),
            edge("w", "switch1", "y1", Some("b")),
        ],
    )
    .await;

    let payload = json!({"k": "v"});
    let first = h
        .engine
        .start_run(&wf.id, TriggerEnvelope::Manual { payload: payload.clone() })
        .await
        .unwrap();
    let second = h
        .engine
        .start_run(&wf.id, TriggerEnvelope::Manual { payload })
        .await
        .unwrap();
    assert_eq!(first.status, ExecutionStatus::Completed);
    assert_eq!(first.outputs, second.outputs);
}

#[tokio::test]
async fn at_most_once_in_diamond_fan_in() {
    let h = harness();
    let wf = seed_workflow(
        &h.store,
        "diamond",
        vec![
            step("w", "src1", StepKind::Code, json!({"code": "return 1;"}), 0),
            step("w", "left1", StepKind::Code, json!({"code": "return 2;"}), 1),
            step("w", "right1", StepKind::Code, json!({"code": "return 3;"}), 2),
            step(
                "w",
                "sink1",
                StepKind::Code,
                json!({"code": "return inputs.left1 + inputs.right1;"}),
                3,
            ),
        ],
        vec![
            edge("w", "src1", "left1", None),
            edge("w", "src1", "right1", None),
            edge("w", "left1", "sink1", None),
            edge("w", "right1", "sink1", None),
        ],
    )
    .await;

    let run = h.engine.start_run(&wf.id, manual()).await.unwrap();
    assert_eq!(run.status, ExecutionStatus::Completed);
    assert_eq!(run.outputs.get("sink1"), Some(&json!(5)));

    let records = h.store.list_step_executions(&run.id).await.unwrap();
    for id in ["src1", "left1", "right1", "sink1"] {
        let completed = records
            .iter()
            .filter(|r| r.step_id == id && r.status == StepStatus::Completed)
            .count();
        assert_eq!(completed, 1, "step {id} should run exactly once");
    }
}

#[tokio::test]
async fn branch_pruning_survives_downstream_merge() {
    // Pruned-branch predecessor must not block a fan-in reachable from the
    // taken branch.
    let h = harness();
    let wf = seed_workflow(
        &h.store,
        "prune-merge",
        vec![
            step(
                "w",
                "code1",
                StepKind::Code,
                json!({"code": "return { flag: false };"}),
                0,
            ),
            step(
                "w",
                "cond1",
                StepKind::Condition,
                json!({"condition": "context.outputs.code1.flag"}),
                1,
            ),
            step("w", "yes1", StepKind::Code, json!({"code": "return \"yes\";"}), 2),
            step("w", "no1", StepKind::Code, json!({"code": "return \"no\";"}), 3),
            step(
                "w",
                "after1",
                StepKind::Code,
                json!({"code": "return inputs._all.no1;"}),
                4,
            ),
        ],
        vec![
            edge("w", "code1", "cond1", None),
            edge("w", "cond1", "yes1", Some("true")),
            edge("w", "cond1", "no1", Some("false")),
            edge("w", "yes1", "after1", None),
            edge("w", "no1", "after1", None),
        ],
    )
    .await;

    let run = h.engine.start_run(&wf.id, manual()).await.unwrap();
    assert_eq!(run.status, ExecutionStatus::Completed);
    assert!(run.outputs.get("yes1").is_none());
    assert_eq!(run.outputs.get("no1"), Some(&json!("no")));
    assert_eq!(run.outputs.get("after1"), Some(&json!("no")));

    let records = h.store.list_step_executions(&run.id).await.unwrap();
    assert_eq!(records.iter().filter(|r| r.step_id == "after1").count(), 1);
    assert_eq!(records.iter().filter(|r| r.step_id == "yes1").count(), 0);
}

#[tokio::test]
async fn sandbox_failure_marks_step_and_run_failed() {
    let h = harness();
    let wf = seed_workflow(
        &h.store,
        "boom",
        vec![step(
            "w",
            "code1",
            StepKind::Code,
            json!({"code": "throw new Error(\"boom\"); return 1;"}),
            0,
        )],
        vec![],
    )
    .await;

    let run = h.engine.start_run(&wf.id, manual()).await.unwrap();
    assert_eq!(run.status, ExecutionStatus::Failed);
    let error = run.error.unwrap();
    assert!(error.contains("SANDBOX_ERROR"), "error was: {error}");
    assert!(error.contains("boom"), "error was: {error}");
}

#[tokio::test]
async fn deadline_zero_fails_run_before_any_dispatch() {
    let h = harness_with_config(EngineConfig {
        run_timeout_secs: 0,
        ..EngineConfig::default()
    });
    let wf = seed_workflow(
        &h.store,
        "deadline",
        vec![step("w", "code1", StepKind::Code, json!({"code": "1"}), 0)],
        vec![],
    )
    .await;

    let run = h.engine.start_run(&wf.id, manual()).await.unwrap();
    assert_eq!(run.status, ExecutionStatus::Failed);
    assert!(run
        .error
        .as_deref()
        .unwrap()
        .contains("DEADLINE_EXCEEDED"));
    assert!(h.store.list_step_executions(&run.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn cancellation_stops_further_dispatch() {
    // Slow mock keeps the first LLM call in flight while the cancel lands.
    let store = std::sync::Arc::new(stepflow::store::MemoryStore::new());
    let llm = std::sync::Arc::new(stepflow::llm::MockProvider::with_latency(
        std::time::Duration::from_millis(200),
    ));
    let engine = std::sync::Arc::new(stepflow::engine::Engine::new(
        store.clone(),
        llm,
        EngineConfig::default(),
    ));
    let h = common::Harness { store, engine };
    let wf = seed_workflow(
        &h.store,
        "cancel",
        vec![
            step(
                "w",
                "llm1",
                StepKind::BasicLlmChain,
                json!({"prompt": "one"}),
                0,
            ),
            step(
                "w",
                "llm2",
                StepKind::BasicLlmChain,
                json!({"prompt": "two"}),
                1,
            ),
        ],
        vec![edge("w", "llm1", "llm2", None)],
    )
    .await;

    let run_id = h
        .engine
        .clone()
        .spawn_run(&wf.id, manual())
        .await
        .unwrap();
    assert!(h.engine.cancel(&run_id));

    // Wait for the driver task to finalize.
    let mut status = ExecutionStatus::Running;
    for _ in 0..100 {
        let run = h.store.get_execution(&run_id).await.unwrap().unwrap();
        status = run.status;
        if status != ExecutionStatus::Running {
            assert!(run.error.as_deref().unwrap().contains("CANCELLED"));
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(status, ExecutionStatus::Failed);
}

#[tokio::test]
async fn unknown_workflow_is_rejected() {
    let h = harness();
    let err = h.engine.start_run("ghost", manual()).await.unwrap_err();
    assert_eq!(err.code(), "WORKFLOW_NOT_FOUND");
}

#[tokio::test]
async fn trigger_seed_reaches_downstream_steps() {
    let h = harness();
    let wf = seed_workflow(
        &h.store,
        "seed",
        vec![
            step("w", "trigger1", StepKind::ManualTrigger, json!({}), 0),
            step(
                "w",
                "echo1",
                StepKind::Code,
                json!({"code": "return inputs.trigger1.payload.name;"}),
                1,
            ),
        ],
        vec![edge("w", "trigger1", "echo1", None)],
    )
    .await;

    let run = h
        .engine
        .start_run(
            &wf.id,
            TriggerEnvelope::Manual {
                payload: json!({"name": "ada"}),
            },
        )
        .await
        .unwrap();
    assert_eq!(run.status, ExecutionStatus::Completed);
    assert_eq!(run.outputs.get("echo1"), Some(&json!("ada")));
    assert_eq!(run.outputs["trigger1"]["triggered"], json!(true));
    assert_eq!(run.outputs["trigger1"]["triggerType"], json!("manual"));
}
