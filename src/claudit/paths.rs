use anyhow::Result;
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ClauditPaths {
    pub projects_dir: PathBuf,
    pub out_dir: PathBuf,
}

pub const PROJECTS_CACHE_FILE: &str = "projects_cache.json";

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_paths(out_dir: &Path) -> Result<ClauditPaths> {
    let home = required_home_dir()?;
    let projects_dir = env_or_default_path("CLAUDE_PROJECTS_DIR", home.join(".claude/projects"));

    Ok(ClauditPaths {
        projects_dir,
        out_dir: out_dir.to_path_buf(),
    })
}

impl ClauditPaths {
    pub fn cache_file(&self) -> PathBuf {
        self.out_dir.join(PROJECTS_CACHE_FILE)
    }

    pub fn report_path(&self, output: Option<&str>, default_name: &str) -> PathBuf {
        match output {
            Some(name) if !name.trim().is_empty() => {
                let candidate = PathBuf::from(name.trim());
                if candidate.is_absolute() {
                    candidate
                } else {
                    self.out_dir.join(candidate)
                }
            }
            _ => self.out_dir.join(default_name),
        }
    }
}
