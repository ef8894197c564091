//! Script adapter driving real child processes through `sh`.
#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use alias_lineage::{
    EngineError, InferenceJob, JobAdapter, SampledCompletion, SamplingParams, ScriptJobAdapter,
    ScriptPaths, TrainingJob,
};

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    path
}

fn adapter(dir: &Path, inference: &str, training: &str) -> ScriptJobAdapter {
    ScriptJobAdapter::new(ScriptPaths {
        interpreter: "sh".into(),
        inference_script: write_script(dir, "inference.sh", inference),
        training_script: write_script(dir, "train.sh", training),
    })
}

fn inference_job() -> InferenceJob {
    InferenceJob {
        weights: "weights-3".into(),
        base_model: "org/base".into(),
        system_prompt: "sys".into(),
        user_prompt: "hello".into(),
        params: SamplingParams {
            max_tokens: 32,
            temperature: 0.5,
        },
    }
}

fn training_job(resume_from: Option<&str>) -> TrainingJob {
    TrainingJob {
        base_model: "org/base".into(),
        resume_from: resume_from.map(String::from),
        system_prompt: "sys".into(),
        prompt: "q".into(),
        completion: "answer".into(),
        sampled: None,
    }
}

#[tokio::test]
async fn test_inference_reads_last_json_line() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = adapter(
        dir.path(),
        r#"echo "loading $2"
echo '{"content": "draft"}'
printf '{"content": "%s|%s|%s|%s|%s", "tokens": [1, 2]}\n' "$2" "$4" "$6" "$8" "${10}""#,
        "exit 1",
    );

    let generation = adapter.infer(inference_job()).await.unwrap();
    assert_eq!(generation.text, "weights-3|hello|sys|32|0.5");
    assert_eq!(generation.tokens, Some(vec![1, 2]));
}

/// A script that accepts only the engine's own flags, failing on anything else.
const STRICT_INFERENCE: &str = r#"while [ $# -gt 0 ]; do
  case "$1" in
    --model_path|--prompt|--system_prompt|--max_tokens|--temperature) shift 2 ;;
    *) echo "unrecognized arguments: $1" >&2; exit 2 ;;
  esac
done
echo '{"content": "ok"}'"#;

#[tokio::test]
async fn test_default_inference_flags_satisfy_strict_script() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = adapter(dir.path(), STRICT_INFERENCE, "exit 1");
    assert_eq!(adapter.infer(inference_job()).await.unwrap().text, "ok");

    let opted_in = adapter.with_base_model_flag(true);
    match opted_in.infer(inference_job()).await {
        Err(EngineError::InferenceFailed(detail)) => {
            assert!(detail.contains("unrecognized arguments: --base_model"), "{}", detail)
        }
        other => panic!("expected strict script to reject --base_model, got {:?}", other),
    }
}

#[tokio::test]
async fn test_training_forwards_served_sample() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = adapter(
        dir.path(),
        "exit 1",
        r#"printf '{"resume_path": "%s %s", "sampling_path": "%s %s", "metrics": {}}\n' "${11}" "${12}" "${14}" "${16}""#,
    );

    let mut job = training_job(None);
    job.sampled = Some(SampledCompletion {
        tokens: vec![3, 4],
        logprobs: vec![-0.5, -0.25],
        advantage: 1.0,
    });
    let result = adapter.train(job).await.unwrap();
    assert_eq!(result.resume_checkpoint, "--tokens [3,4]");
    assert_eq!(result.head_weights, "[-0.5,-0.25] 1");
}

#[tokio::test]
async fn test_training_marshals_resume_point() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = adapter(
        dir.path(),
        "exit 1",
        r#"printf '{"resume_path": "ckpt[%s]", "sampling_path": "weights[%s]", "metrics": {"steps": 1}}\n' "$4" "$8""#,
    );

    let result = adapter.train(training_job(Some("ckpt-1"))).await.unwrap();
    assert_eq!(result.resume_checkpoint, "ckpt[ckpt-1]");
    assert_eq!(result.head_weights, "weights[answer]");
    assert_eq!(result.metrics["steps"], 1);

    let fresh = adapter.train(training_job(None)).await.unwrap();
    assert_eq!(fresh.resume_checkpoint, "ckpt[]");
}

#[tokio::test]
async fn test_reported_error_is_surfaced_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = adapter(
        dir.path(),
        r#"echo '{"error": "CUDA out of memory"}'
exit 1"#,
        r#"echo '{"error": "loss is NaN"}'"#,
    );

    assert_eq!(
        adapter.infer(inference_job()).await.unwrap_err(),
        EngineError::InferenceFailed("CUDA out of memory".into())
    );
    assert_eq!(
        adapter.train(training_job(None)).await.unwrap_err(),
        EngineError::TrainingFailed("loss is NaN".into())
    );
}

#[tokio::test]
async fn test_nonzero_exit_carries_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = adapter(dir.path(), "exit 1", "echo 'checkpoint upload failed' >&2\nexit 3");

    match adapter.train(training_job(None)).await {
        Err(EngineError::TrainingFailed(detail)) => {
            assert!(detail.contains("checkpoint upload failed"), "{}", detail)
        }
        other => panic!("expected training failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_or_malformed_result() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = adapter(
        dir.path(),
        "echo 'done'",
        r#"echo '{"unexpected": true}'"#,
    );

    match adapter.infer(inference_job()).await {
        Err(EngineError::InferenceFailed(detail)) => assert!(detail.contains("no JSON")),
        other => panic!("expected inference failure, got {:?}", other),
    }
    match adapter.train(training_job(None)).await {
        Err(EngineError::TrainingFailed(detail)) => assert!(detail.contains("malformed result")),
        other => panic!("expected training failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_timeout_kills_job() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = adapter(dir.path(), "sleep 10", "sleep 10")
        .with_timeout(Some(Duration::from_millis(200)));

    let started = Instant::now();
    match adapter.train(training_job(None)).await {
        Err(EngineError::TrainingFailed(detail)) => assert!(detail.contains("timed out")),
        other => panic!("expected timeout, got {:?}", other),
    }
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_spawn_failure() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = ScriptJobAdapter::new(ScriptPaths {
        interpreter: dir.path().join("no-such-interpreter"),
        inference_script: dir.path().join("inference.sh"),
        training_script: dir.path().join("train.sh"),
    });

    match adapter.infer(inference_job()).await {
        Err(EngineError::InferenceFailed(detail)) => assert!(detail.contains("failed to spawn")),
        other => panic!("expected spawn failure, got {:?}", other),
    }
}
