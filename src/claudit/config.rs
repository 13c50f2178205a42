use crate::error::ClauditError;
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_MAX_CHUNK_BYTES: usize = 1024 * 1024;
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
pub const API_KEY_ENV_VAR: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_chunk_bytes: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub bin: String,
    pub model: String,
    pub fallback_model: String,
    pub premium_marker: String,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub initial_backoff_secs: u64,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            bin: "gemini".to_string(),
            model: "gemini-2.5-pro".to_string(),
            fallback_model: "gemini-2.5-flash".to_string(),
            premium_marker: "Gemini 2.5 Pro".to_string(),
            timeout_secs: 120,
            max_attempts: 5,
            initial_backoff_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub pause_millis: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        // 60 requests/minute
        Self { pause_millis: 1000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClauditConfig {
    pub chunking: ChunkingConfig,
    pub tool: ToolConfig,
    pub api: ApiConfig,
    pub pacing: PacingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialClauditConfig {
    chunking: Option<ChunkingConfig>,
    tool: Option<ToolConfig>,
    api: Option<ApiConfig>,
    pacing: Option<PacingConfig>,
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_usize(var: &str, fallback: usize) -> usize {
    match env::var(var) {
        Ok(v) => v.trim().parse::<usize>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_u32(var: &str, fallback: u32) -> u32 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u32>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

pub fn api_key_from_env() -> Option<String> {
    match env::var(API_KEY_ENV_VAR) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

fn validate(cfg: &ClauditConfig) -> Result<()> {
    let invalid = |msg: &str| -> Result<()> {
        Err(ClauditError::InvalidConfig(msg.to_string()).into())
    };
    if cfg.chunking.max_chunk_bytes == 0 {
        return invalid("chunking.max_chunk_bytes must be >= 1");
    }
    if cfg.tool.bin.trim().is_empty() {
        return invalid("tool.bin cannot be empty");
    }
    if cfg.tool.model.trim().is_empty() || cfg.tool.fallback_model.trim().is_empty() {
        return invalid("tool.model and tool.fallback_model cannot be empty");
    }
    if cfg.tool.timeout_secs == 0 {
        return invalid("tool.timeout_secs must be >= 1");
    }
    if cfg.tool.max_attempts == 0 {
        return invalid("tool.max_attempts must be >= 1");
    }
    if cfg.api.timeout_secs == 0 {
        return invalid("api.timeout_secs must be >= 1");
    }
    if cfg.api.base_url.trim().is_empty() {
        return invalid("api.base_url cannot be empty");
    }
    Ok(())
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("CLAUDIT_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    Some(dirs::config_dir()?.join("claudit").join("claudit.toml"))
}

fn merge_toml(base: &mut ClauditConfig, raw: &str) -> Result<()> {
    let parsed: PartialClauditConfig = toml::from_str(raw)?;
    if let Some(chunking) = parsed.chunking {
        base.chunking = chunking;
    }
    if let Some(tool) = parsed.tool {
        base.tool = tool;
    }
    if let Some(api) = parsed.api {
        base.api = api;
    }
    if let Some(pacing) = parsed.pacing {
        base.pacing = pacing;
    }
    Ok(())
}

fn merge_file_config(base: &mut ClauditConfig) -> Result<()> {
    let Some(path) = resolve_config_path() else {
        return Ok(());
    };
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path)?;
    merge_toml(base, &raw)
        .map_err(|err| anyhow!("failed to parse claudit config {}: {err}", path.display()))
}

fn apply_env_overrides(cfg: &mut ClauditConfig) {
    cfg.chunking.max_chunk_bytes =
        env_or_usize("CLAUDIT_MAX_CHUNK_BYTES", cfg.chunking.max_chunk_bytes);

    cfg.tool.bin = env_or_string("CLAUDIT_TOOL_BIN", &cfg.tool.bin);
    cfg.tool.model = env_or_string("CLAUDIT_TOOL_MODEL", &cfg.tool.model);
    cfg.tool.fallback_model =
        env_or_string("CLAUDIT_TOOL_FALLBACK_MODEL", &cfg.tool.fallback_model);
    cfg.tool.premium_marker =
        env_or_string("CLAUDIT_TOOL_PREMIUM_MARKER", &cfg.tool.premium_marker);
    cfg.tool.timeout_secs = env_or_u64("CLAUDIT_TOOL_TIMEOUT_SECS", cfg.tool.timeout_secs);
    cfg.tool.max_attempts = env_or_u32("CLAUDIT_TOOL_MAX_ATTEMPTS", cfg.tool.max_attempts);
    cfg.tool.initial_backoff_secs = env_or_u64(
        "CLAUDIT_TOOL_INITIAL_BACKOFF_SECS",
        cfg.tool.initial_backoff_secs,
    );

    cfg.api.model = env_or_string("CLAUDIT_API_MODEL", &cfg.api.model);
    cfg.api.base_url = env_or_string("CLAUDIT_API_BASE_URL", &cfg.api.base_url);
    cfg.api.timeout_secs = env_or_u64("CLAUDIT_API_TIMEOUT_SECS", cfg.api.timeout_secs);

    cfg.pacing.pause_millis = env_or_u64("CLAUDIT_PACE_MILLIS", cfg.pacing.pause_millis);
}

pub fn load_config() -> Result<ClauditConfig> {
    let mut cfg = ClauditConfig::default();
    merge_file_config(&mut cfg)?;
    apply_env_overrides(&mut cfg);
    validate(&cfg)?;
    Ok(cfg)
}

pub fn with_max_chunk_bytes(mut cfg: ClauditConfig, max: Option<usize>) -> Result<ClauditConfig> {
    if let Some(max) = max {
        cfg.chunking.max_chunk_bytes = max;
        validate(&cfg)?;
    }
    Ok(cfg)
}
