//! Default values for sampling, promotion and the base model catalog.

pub const MAX_TOKENS: i32 = 512;
pub const TEMPERATURE: f64 = 0.7;
pub const EXPLANATION_MAX_TOKENS: i32 = 1024;

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

pub const MAX_PROMOTION_ATTEMPTS: u32 = 3;
pub const PROMOTION_BACKOFF_MS: u64 = 25;

/// Longest alias accepted; keeps hex-encoded file names under common limits.
pub const MAX_ALIAS_BYTES: usize = 120;

pub const DEFAULT_BASE_MODEL: &str = "meta-llama/Llama-3.1-8B-Instruct";

pub const BASE_MODEL_FAMILIES: &[&str] = &["meta-llama", "Qwen"];

pub const BASE_MODELS: &[&str] = &[
    "Qwen/Qwen3-235B-A22B-Instruct-2507",
    "Qwen/Qwen3-30B-A3B-Instruct-2507",
    "Qwen/Qwen3-30B-A3B",
    "Qwen/Qwen3-30B-A3B-Base",
    "Qwen/Qwen3-32B",
    "Qwen/Qwen3-8B",
    "Qwen/Qwen3-8B-Base",
    "Qwen/Qwen3-4B-Instruct-2507",
    "meta-llama/Llama-3.3-70B",
    "meta-llama/Llama-3.1-70B",
    "meta-llama/Llama-3.1-8B",
    "meta-llama/Llama-3.1-8B-Instruct",
    "meta-llama/Llama-3.2-3B",
    "meta-llama/Llama-3.2-1B",
];

pub fn max_tokens() -> i32 { MAX_TOKENS }
pub fn temperature() -> f64 { TEMPERATURE }
pub fn system_prompt() -> String { SYSTEM_PROMPT.to_string() }
pub fn max_promotion_attempts() -> u32 { MAX_PROMOTION_ATTEMPTS }
pub fn promotion_backoff_ms() -> u64 { PROMOTION_BACKOFF_MS }
pub fn rebase_on_conflict() -> bool { true }
pub fn default_base_model() -> String { DEFAULT_BASE_MODEL.to_string() }
pub fn base_model_families() -> Vec<String> { BASE_MODEL_FAMILIES.iter().map(|s| s.to_string()).collect() }
pub fn base_models() -> Vec<String> { BASE_MODELS.iter().map(|s| s.to_string()).collect() }
pub fn interpreter() -> String { "python".to_string() }
pub fn inference_script() -> std::path::PathBuf { "scripts/inference.py".into() }
pub fn training_script() -> std::path::PathBuf { "scripts/train.py".into() }
