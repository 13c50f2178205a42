use anyhow::Result;
use std::env;
use std::path::Path;

use crate::claudit::config::{API_KEY_ENV_VAR, api_key_from_env, load_config};
use crate::claudit::paths::resolve_paths;
use crate::commands::CommandReport;
use crate::logging::LOG_ENV_VAR;

include!(concat!(env!("OUT_DIR"), "/claudit_env_allowlist.rs"));

fn active_overrides() -> Vec<&'static str> {
    GENERATED_CLAUDIT_ENV_ALLOWLIST
        .iter()
        .copied()
        .filter(|key| env::var_os(key).is_some())
        .collect()
}

pub fn run(out_dir: &Path) -> Result<CommandReport> {
    let paths = resolve_paths(out_dir)?;
    let cfg = load_config()?;
    let mut report = CommandReport::new("status");

    report.detail(format!("projects_dir={}", paths.projects_dir.display()));
    report.detail(format!("out_dir={}", paths.out_dir.display()));
    report.detail(format!("cache_file={}", paths.cache_file().display()));
    report.detail(format!("max_chunk_bytes={}", cfg.chunking.max_chunk_bytes));
    report.detail(format!("pace_millis={}", cfg.pacing.pause_millis));

    let tool_path = which::which(&cfg.tool.bin).ok();
    match &tool_path {
        Some(path) => report.detail(format!("tool={} ({})", cfg.tool.bin, path.display())),
        None => report.detail(format!("tool={} (not found)", cfg.tool.bin)),
    }
    report.detail(format!(
        "tool_models={} -> {}",
        cfg.tool.model, cfg.tool.fallback_model
    ));
    let has_key = api_key_from_env().is_some();
    report.detail(format!("api_key_present={has_key}"));
    report.detail(format!("api_model={}", cfg.api.model));

    for key in active_overrides() {
        report.detail(format!("env_override={key}"));
    }
    if env::var_os(LOG_ENV_VAR).is_some() {
        report.detail(format!("log_filter={LOG_ENV_VAR}"));
    }

    if !paths.projects_dir.is_dir() {
        report.issue(format!(
            "missing projects dir ({}; set CLAUDE_PROJECTS_DIR)",
            paths.projects_dir.display()
        ));
    }
    if tool_path.is_none() && !has_key {
        report.issue(format!(
            "no analysis backend: install `{}` or export {API_KEY_ENV_VAR}",
            cfg.tool.bin
        ));
    }

    Ok(report)
}
