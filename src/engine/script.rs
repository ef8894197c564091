//! Engine jobs as child processes.
//!
//! Each job runs `<interpreter> <script> --flag value ...` and reports its
//! result as a JSON object on the last JSON line of stdout. A `{"error": ...}`
//! object or a non-zero exit is a failure.
//!
//! Inference flags: `--model_path --prompt --system_prompt --max_tokens
//! --temperature`, plus `--base_model` when enabled; result
//! `{content, tokens?, logprobs?}`.
//!
//! Training flags: `--base_model --resume_path --prompt --completion
//! --system_prompt`, plus `--tokens --logprobs --advantage` (JSON arrays and a
//! float) when the served sample came with the feedback; result
//! `{resume_path, sampling_path, metrics}`. An empty `--resume_path` starts
//! from the base model.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::defaults;
use crate::engine::{
    EngineError, Generation, InferenceJob, JobAdapter, Result, TrainingJob, TrainingResult,
};

/// Interpreter and scripts used to launch engine jobs.
#[derive(Debug, Clone)]
pub struct ScriptPaths {
    pub interpreter: PathBuf,
    pub inference_script: PathBuf,
    pub training_script: PathBuf,
}

impl Default for ScriptPaths {
    fn default() -> Self {
        Self {
            interpreter: defaults::interpreter().into(),
            inference_script: defaults::inference_script(),
            training_script: defaults::training_script(),
        }
    }
}

/// Runs inference and training jobs as external scripts.
///
/// Children are killed when the awaiting future is dropped, so a cancelled or
/// timed-out job never outlives its caller.
#[derive(Debug, Clone)]
pub struct ScriptJobAdapter {
    paths: ScriptPaths,
    timeout: Option<Duration>,
    pass_base_model: bool,
}

impl ScriptJobAdapter {
    pub fn new(paths: ScriptPaths) -> Self {
        Self {
            paths,
            timeout: None,
            pass_base_model: false,
        }
    }

    /// Bound every job by `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Also pass `--base_model` to the inference script. Scripts with strict
    /// argument parsing reject the flag, so it is off unless asked for.
    pub fn with_base_model_flag(mut self, enabled: bool) -> Self {
        self.pass_base_model = enabled;
        self
    }

    fn inference_args(&self, job: &InferenceJob) -> Vec<String> {
        let mut args = vec!["--model_path".into(), job.weights.clone()];
        if self.pass_base_model {
            args.extend(["--base_model".into(), job.base_model.clone()]);
        }
        args.extend([
            "--prompt".into(),
            job.user_prompt.clone(),
            "--system_prompt".into(),
            job.system_prompt.clone(),
            "--max_tokens".into(),
            job.params.max_tokens.to_string(),
            "--temperature".into(),
            job.params.temperature.to_string(),
        ]);
        args
    }

    fn training_args(job: &TrainingJob) -> Vec<String> {
        let mut args = vec![
            "--base_model".into(),
            job.base_model.clone(),
            "--resume_path".into(),
            job.resume_from.clone().unwrap_or_default(),
            "--prompt".into(),
            job.prompt.clone(),
            "--completion".into(),
            job.completion.clone(),
            "--system_prompt".into(),
            job.system_prompt.clone(),
        ];
        if let Some(sample) = &job.sampled {
            args.extend([
                "--tokens".into(),
                serde_json::json!(sample.tokens).to_string(),
                "--logprobs".into(),
                serde_json::json!(sample.logprobs).to_string(),
                "--advantage".into(),
                sample.advantage.to_string(),
            ]);
        }
        args
    }

    async fn run(&self, script: &Path, args: Vec<String>) -> std::result::Result<Value, String> {
        log::debug!("Launching {:?} {:?}", self.paths.interpreter, script);

        let child = Command::new(&self.paths.interpreter)
            .arg(script)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("failed to spawn {:?}: {}", script, e))?;

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| format!("timed out after {:?}", limit))?,
            None => child.wait_with_output().await,
        }
        .map_err(|e| format!("failed to collect output of {:?}: {}", script, e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let payload = last_json_object(&stdout);

        if let Some(reported) = payload.as_ref().and_then(|p| p.get("error")) {
            let message = reported
                .as_str()
                .map(String::from)
                .unwrap_or_else(|| reported.to_string());
            return Err(message);
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            log::warn!("{:?} exited with {}: {}", script, output.status, stderr.trim());
            return Err(format!("exited with {}: {}", output.status, stderr.trim()));
        }

        payload.ok_or_else(|| format!("{:?} printed no JSON result", script))
    }
}

/// Last line of `stdout` that parses as a JSON object.
fn last_json_object(stdout: &str) -> Option<Value> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .find_map(|line| serde_json::from_str::<Value>(line).ok())
        .filter(Value::is_object)
}

#[async_trait]
impl JobAdapter for ScriptJobAdapter {
    async fn infer(&self, job: InferenceJob) -> Result<Generation> {
        let args = self.inference_args(&job);
        let payload = self
            .run(&self.paths.inference_script, args)
            .await
            .map_err(EngineError::InferenceFailed)?;

        serde_json::from_value(payload)
            .map_err(|e| EngineError::InferenceFailed(format!("malformed result: {}", e)))
    }

    async fn train(&self, job: TrainingJob) -> Result<TrainingResult> {
        log::info!(
            "Training {} from {}",
            job.base_model,
            job.resume_from.as_deref().unwrap_or("base weights")
        );
        let args = Self::training_args(&job);
        let payload = self
            .run(&self.paths.training_script, args)
            .await
            .map_err(EngineError::TrainingFailed)?;

        serde_json::from_value(payload)
            .map_err(|e| EngineError::TrainingFailed(format!("malformed result: {}", e)))
    }
}
