use anyhow::Result;
use std::path::PathBuf;

use crate::claudit::paths::resolve_paths;
use crate::claudit::projects::discover;
use crate::claudit::stats_cache::StatsCache;
use crate::claudit::util::{format_file_size, format_token_count};
use crate::commands::CommandReport;

#[derive(Debug, Clone)]
pub struct ProjectsOptions {
    pub out_dir: PathBuf,
}

pub fn run(opts: &ProjectsOptions) -> Result<CommandReport> {
    let paths = resolve_paths(&opts.out_dir)?;
    let mut report = CommandReport::new("projects");
    report.detail(format!("projects_dir={}", paths.projects_dir.display()));

    if !paths.projects_dir.is_dir() {
        report.issue(format!(
            "projects dir not found: {} (set CLAUDE_PROJECTS_DIR)",
            paths.projects_dir.display()
        ));
        return Ok(report);
    }

    let cache_path = paths.cache_file();
    let mut cache = StatsCache::load(&cache_path);
    let projects = discover(&paths.projects_dir, &mut cache)?;
    let refreshed = cache.is_dirty();
    cache.save_if_dirty(&cache_path);

    report.detail(format!("count={}", projects.len()));
    report.detail(format!("cache_refreshed={refreshed}"));
    for (i, p) in projects.iter().enumerate() {
        let mut line = format!(
            "{}. {} size={} tokens={} est_cost=${:.2} dir={}",
            i + 1,
            p.display_name,
            format_file_size(p.size_bytes),
            format_token_count(p.tokens),
            p.estimated_cost_usd(),
            p.dir_name
        );
        if p.is_ambiguous() {
            line.push_str(" ambiguous=true");
        }
        report.detail(line);
    }

    Ok(report)
}
