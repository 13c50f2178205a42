use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::claudit::report_store::write_atomic;
use crate::claudit::util::format_timestamp;
use crate::claudit::warn::{self, WarnEvent};

pub const CACHE_MARKER: &str = "<!-- Cache updated:";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub size: u64,
    pub tokens: u64,
    /// Newest log mtime (epoch seconds) when the entry was computed.
    pub mtime: f64,
}

#[derive(Debug, Default)]
pub struct StatsCache {
    entries: BTreeMap<String, CacheEntry>,
    dirty: bool,
}

fn json_part(raw: &str) -> &str {
    match raw.find(CACHE_MARKER) {
        Some(idx) => raw[..idx].trim(),
        None => raw.trim(),
    }
}

impl StatsCache {
    pub fn parse(raw: &str) -> serde_json::Result<Self> {
        let body = json_part(raw);
        let entries = if body.is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(body)?
        };
        Ok(Self {
            entries,
            dirty: false,
        })
    }

    pub fn load(path: &Path) -> Self {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(err) => {
                warn_cache("CACHE_LOAD_FAILED", path, &err.to_string());
                return Self::default();
            }
        };
        match Self::parse(&raw) {
            Ok(cache) => cache,
            Err(err) => {
                warn_cache("CACHE_LOAD_FAILED", path, &err.to_string());
                Self::default()
            }
        }
    }

    pub fn render(&self) -> serde_json::Result<String> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        Ok(format!(
            "{json}\n{CACHE_MARKER} {} -->",
            format_timestamp(&chrono::Utc::now())
        ))
    }

    pub fn save_if_dirty(&mut self, path: &Path) {
        if !self.dirty {
            return;
        }
        let result = self
            .render()
            .map_err(anyhow::Error::from)
            .and_then(|text| write_atomic(path, &text));
        match result {
            Ok(()) => self.dirty = false,
            Err(err) => warn_cache("CACHE_SAVE_FAILED", path, &format!("{err:#}")),
        }
    }

    pub fn fresh(&self, key: &str, current_mtime: f64) -> Option<CacheEntry> {
        self.entries
            .get(key)
            .filter(|entry| entry.mtime >= current_mtime)
            .copied()
    }

    pub fn update(&mut self, key: &str, entry: CacheEntry) {
        if self.entries.get(key) != Some(&entry) {
            self.entries.insert(key.to_string(), entry);
            self.dirty = true;
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

fn warn_cache(code: &str, path: &Path, err: &str) {
    warn::emit(WarnEvent {
        code,
        stage: "stats-cache",
        path: &path.display().to_string(),
        err,
    });
}
