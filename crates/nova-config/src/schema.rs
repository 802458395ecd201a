// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// Root configuration merged from the discovered YAML layers and environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentRuntimeConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub http: HttpConfig,
    /// The single operator this deployment serves (§9 "single-tenant-per-
    /// deployment"). Nil until set explicitly in config — `main` refuses to
    /// serve with a nil user so a fresh install can't silently run unscoped.
    #[serde(default)]
    pub user_id: uuid::Uuid,
}

/// Provider-agnostic model selection. Concrete wire formats live outside this
/// core; this struct carries only what `nova-model::ModelProvider` consumers
/// need to pick and size a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider identifier, e.g. "openai" | "anthropic" | "mock". Resolved by
    /// the caller's provider registry; this crate does not validate it.
    pub provider: String,
    /// Model name forwarded to the provider.
    pub name: String,
    /// Environment variable holding the API key (read at runtime by the caller).
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Free-form provider-specific extras forwarded as-is.
    #[serde(default)]
    pub driver_options: serde_json::Value,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            name: "gpt-4o".into(),
            api_key_env: None,
            base_url: None,
            max_tokens: Some(4096),
            temperature: Some(0.2),
            driver_options: serde_json::Value::Null,
        }
    }
}

fn default_max_tool_rounds() -> u32 {
    200
}
fn default_compaction_word_budget_ratio() -> f32 {
    0.3
}
fn default_previous_summaries_token_budget() -> usize {
    4000
}
fn default_chunk_token_target() -> usize {
    600
}
fn default_chunk_overlap_tokens() -> usize {
    100
}
fn default_recency_days() -> i64 {
    14
}

/// Tuning knobs for the Task Executor's agentic loop and the continuous
/// conversation machinery. Mirrors the host's `AgentConfig` compaction knobs,
/// generalized to the task-executor + continuous-context domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRuntimeConfig {
    /// Maximum number of autonomous tool-call rounds before a forced wrap-up turn.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
    /// Word budget for conversation compacting, as a fraction of current token usage.
    #[serde(default = "default_compaction_word_budget_ratio")]
    pub compaction_word_budget_ratio: f32,
    /// Shared token budget for the two previous-day summaries in the continuous
    /// context builder (§4.2).
    #[serde(default = "default_previous_summaries_token_budget")]
    pub previous_summaries_token_budget: usize,
    /// Target token size of a transcript chunk (§4.4).
    #[serde(default = "default_chunk_token_target")]
    pub chunk_token_target: usize,
    /// Token overlap rewound between consecutive transcript chunks (§4.4).
    #[serde(default = "default_chunk_overlap_tokens")]
    pub chunk_overlap_tokens: usize,
    /// Default `recency_days` for `conversation_search` when unset by the caller.
    #[serde(default = "default_recency_days")]
    pub default_recency_days: i64,
}

impl Default for AgentRuntimeConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
            compaction_word_budget_ratio: default_compaction_word_budget_ratio(),
            previous_summaries_token_budget: default_previous_summaries_token_budget(),
            chunk_token_target: default_chunk_token_target(),
            chunk_overlap_tokens: default_chunk_overlap_tokens(),
            default_recency_days: default_recency_days(),
        }
    }
}

/// Embedding provider configuration. Absence of `url` disables the semantic
/// side everywhere (§9 "Embeddings optional everywhere") without being an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    pub url: Option<String>,
    pub model: Option<String>,
    pub api_key_env: Option<String>,
    #[serde(default = "default_embedding_dimensions")]
    pub dimensions: usize,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_embedding_dimensions() -> usize {
    1536
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

/// Storage backend selection. Absence of `url` selects the in-memory store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

fn default_cron_tz() -> String {
    "UTC".into()
}
fn default_email_poll_interval_minutes() -> u32 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_cron_tz")]
    pub default_tz: String,
    #[serde(default = "default_email_poll_interval_minutes")]
    pub default_email_poll_interval_minutes: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_tz: default_cron_tz(),
            default_email_poll_interval_minutes: default_email_poll_interval_minutes(),
        }
    }
}

fn default_http_bind() -> String {
    "127.0.0.1:8790".to_string()
}
fn default_max_body() -> usize {
    4 * 1024 * 1024
}

/// Listener configuration for the message ingest / continuous browsing /
/// event-websocket surface (§6). Unlike the host gateway this carries no TLS
/// settings — the ingest API's "token-authenticated" requirement is the only
/// HTTP-layer security named, TLS termination is left to a reverse proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// `host:port` to listen on. Default: `127.0.0.1:8790` (loopback only).
    #[serde(default = "default_http_bind")]
    pub bind: String,
    /// Path to the YAML file storing the SHA-256 hashed bearer token. If
    /// `None`, a token is generated and printed once at first run.
    pub token_file: Option<PathBuf>,
    #[serde(default = "default_max_body")]
    pub max_body_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { bind: default_http_bind(), token_file: None, max_body_bytes: default_max_body() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.model.provider, "openai");
        assert_eq!(cfg.agent.max_tool_rounds, 200);
        assert!(cfg.embeddings.url.is_none());
        assert!(cfg.database.url.is_none());
        assert_eq!(cfg.scheduler.default_tz, "UTC");
        assert!(cfg.http.bind.starts_with("127.0.0.1"));
        assert!(cfg.user_id.is_nil());
    }

    #[test]
    fn deserializes_partial_yaml_with_defaults() {
        let cfg: Config = serde_yaml::from_str("model:\n  provider: anthropic\n  name: claude\n")
            .unwrap();
        assert_eq!(cfg.model.provider, "anthropic");
        assert_eq!(cfg.agent.chunk_token_target, 600);
    }
}
