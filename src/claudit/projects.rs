use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::claudit::assembler::list_log_files;
use crate::claudit::stats_cache::{CacheEntry, StatsCache};
use crate::claudit::util::system_time_epoch_secs;
use crate::claudit::warn::{self, WarnEvent};

pub const PRICE_PER_M_INPUT: f64 = 0.30;
pub const PRICE_PER_M_OUTPUT: f64 = 2.50;
pub const MAX_OUTPUT_TOKENS: u64 = 65_535;

const NAME_ANCHOR: &str = "expts";

#[derive(Debug, Clone)]
pub struct ProjectDescriptor {
    pub dir_name: String,
    pub display_name: String,
    pub full_path: String,
    pub dir: PathBuf,
    pub size_bytes: u64,
    pub tokens: u64,
}

impl ProjectDescriptor {
    pub fn estimated_cost_usd(&self) -> f64 {
        estimate_cost_usd(self.tokens)
    }

    pub fn is_ambiguous(&self) -> bool {
        is_ambiguous(&self.dir_name)
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// `-Users-ana-expts-n8n-fly` -> `N8n Fly`; without an `expts` segment the
/// last segment is used.
pub fn display_name(dir_name: &str) -> String {
    let trimmed = dir_name.strip_prefix('-').unwrap_or(dir_name);
    let parts: Vec<&str> = trimmed.split('-').collect();
    let leaf: Vec<&str> = match parts.iter().position(|p| *p == NAME_ANCHOR) {
        Some(idx) if idx + 1 < parts.len() => parts[idx + 1..].to_vec(),
        _ => parts.last().map(|p| vec![*p]).unwrap_or_default(),
    };
    let words: Vec<String> = leaf
        .iter()
        .filter(|w| !w.is_empty())
        .map(|w| capitalize(w))
        .collect();
    if words.is_empty() {
        "Unknown Project".to_string()
    } else {
        words.join(" ")
    }
}

pub fn full_path_guess(dir_name: &str) -> String {
    format!("/{}", dir_name.trim_start_matches('-').replace('-', "/"))
}

pub fn munge_path(path: &str) -> String {
    path.replace('/', "-")
}

/// A `--` in a munged name can come from `/-`, `-/` or `//` in the original
/// path, so the path guess may be wrong.
pub fn is_ambiguous(dir_name: &str) -> bool {
    dir_name.contains("--")
}

pub fn estimate_tokens(size_bytes: u64) -> u64 {
    size_bytes.div_ceil(4)
}

pub fn estimate_cost_usd(tokens: u64) -> f64 {
    let input = tokens as f64 / 1_000_000.0 * PRICE_PER_M_INPUT;
    let output = MAX_OUTPUT_TOKENS as f64 / 1_000_000.0 * PRICE_PER_M_OUTPUT;
    input + output
}

pub fn measure(dir: &Path) -> Result<(u64, f64)> {
    let mut size = 0u64;
    let mut newest = 0.0f64;
    for file in list_log_files(dir)? {
        let meta = fs::metadata(&file).with_context(|| format!("failed to stat {}", file.display()))?;
        size += meta.len();
        if let Ok(modified) = meta.modified() {
            newest = newest.max(system_time_epoch_secs(modified));
        }
    }
    Ok((size, newest))
}

fn describe(dir: PathBuf, cache: &mut StatsCache) -> Result<ProjectDescriptor> {
    let dir_name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (size_bytes, mtime) = measure(&dir)?;
    let entry = match cache.fresh(&dir_name, mtime) {
        Some(entry) if entry.size == size_bytes => entry,
        _ => {
            let entry = CacheEntry {
                size: size_bytes,
                tokens: estimate_tokens(size_bytes),
                mtime,
            };
            cache.update(&dir_name, entry);
            entry
        }
    };
    Ok(ProjectDescriptor {
        display_name: display_name(&dir_name),
        full_path: full_path_guess(&dir_name),
        dir_name,
        dir,
        size_bytes: entry.size,
        tokens: entry.tokens,
    })
}

pub fn discover(projects_dir: &Path, cache: &mut StatsCache) -> Result<Vec<ProjectDescriptor>> {
    if !projects_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut projects = Vec::new();
    for entry in fs::read_dir(projects_dir)
        .with_context(|| format!("failed to read {}", projects_dir.display()))?
    {
        let path = entry?.path();
        let is_project = path.is_dir()
            && path
                .file_name()
                .is_some_and(|n| n.to_string_lossy().starts_with('-'));
        if !is_project {
            continue;
        }
        match describe(path.clone(), cache) {
            Ok(project) => projects.push(project),
            Err(err) => warn::emit(WarnEvent {
                code: "PROJECT_SCAN_FAILED",
                stage: "discover",
                path: &path.display().to_string(),
                err: &format!("{err:#}"),
            }),
        }
    }
    projects.sort_by(|a, b| {
        a.display_name
            .to_lowercase()
            .cmp(&b.display_name.to_lowercase())
            .then_with(|| a.dir_name.cmp(&b.dir_name))
    });
    Ok(projects)
}

pub fn find_project(
    projects: &[ProjectDescriptor],
    projects_dir: &Path,
    query: &str,
) -> Option<ProjectDescriptor> {
    let wanted = query.trim();
    if let Some(hit) = projects
        .iter()
        .find(|p| p.display_name.eq_ignore_ascii_case(wanted))
    {
        return Some(hit.clone());
    }

    if !(wanted.contains('/') || wanted.starts_with('-')) {
        return None;
    }
    let dir_name = if wanted.contains('/') {
        munge_path(wanted.trim_end_matches('/'))
    } else {
        wanted.to_string()
    };
    if let Some(hit) = projects.iter().find(|p| p.dir_name == dir_name) {
        return Some(hit.clone());
    }
    let dir = projects_dir.join(&dir_name);
    if !dir.is_dir() {
        return None;
    }
    let size_bytes = measure(&dir).map(|(size, _)| size).unwrap_or(0);
    Some(ProjectDescriptor {
        display_name: display_name(&dir_name),
        full_path: full_path_guess(&dir_name),
        dir_name,
        dir,
        size_bytes,
        tokens: estimate_tokens(size_bytes),
    })
}
