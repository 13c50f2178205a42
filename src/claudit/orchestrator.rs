use anyhow::Result;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

use crate::claudit::assembler::{FileSelection, assemble};
use crate::claudit::backend::AnalysisBackend;
use crate::claudit::chunker::chunk_content;
use crate::claudit::consolidator;
use crate::claudit::mode::ReportHeader;
use crate::claudit::record_filter::FilterStats;
use crate::claudit::report_store;
use crate::claudit::warn::{self, WarnEvent};
use crate::error::ClauditError;

#[derive(Debug, Clone)]
pub struct RunRequest<'a> {
    pub project_dir: &'a Path,
    pub project_name: &'a str,
    pub project_path: &'a str,
    pub report_path: &'a Path,
    pub max_chunk_bytes: usize,
    pub keep_subreports: bool,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub report_path: PathBuf,
    pub watermark: DateTime<Utc>,
    /// Watermark of the report this run merged into, if any.
    pub previous_watermark: Option<DateTime<Utc>>,
    pub chunk_count: usize,
    pub consolidated: bool,
    pub records_accepted: usize,
    pub lines_malformed: usize,
    pub lines_irrelevant: usize,
    pub stale_records: usize,
    pub files_full: usize,
    pub files_partial: usize,
    pub subreports_kept: Vec<PathBuf>,
}

impl RunSummary {
    pub fn differential(&self) -> bool {
        self.previous_watermark.is_some()
    }
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    NothingNew {
        report_path: PathBuf,
        since: DateTime<Utc>,
    },
    Written(RunSummary),
}

pub fn subreport_path(report_path: &Path, index: usize) -> PathBuf {
    let base = report_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_string());
    let dir = report_path.parent().unwrap_or_else(|| Path::new("."));
    dir.join(format!("subreport_{base}_chunk{index}.md"))
}

fn write_subreport(path: &Path, project_name: &str, index: usize, total: usize, text: &str) {
    let contents = format!("# Subreport {index}/{total}: {project_name}\n\n{text}");
    if let Err(err) = report_store::write_atomic(path, &contents) {
        warn::emit(WarnEvent {
            code: "SUBREPORT_WRITE_FAILED",
            stage: "analyze",
            path: &path.display().to_string(),
            err: &format!("{err:#}"),
        });
    }
}

fn remove_subreports(paths: &[PathBuf]) {
    for path in paths {
        if let Err(err) = fs::remove_file(path)
            && err.kind() != std::io::ErrorKind::NotFound
        {
            warn::emit(WarnEvent {
                code: "SUBREPORT_CLEANUP_FAILED",
                stage: "cleanup",
                path: &path.display().to_string(),
                err: &err.to_string(),
            });
        }
    }
}

fn analyze_chunks(
    req: &RunRequest<'_>,
    backend: &mut dyn AnalysisBackend,
    chunks: &[String],
    subreports: &mut Vec<PathBuf>,
) -> Result<Vec<String>> {
    let total = chunks.len();
    let mut partials = Vec::with_capacity(total);
    for (i, chunk) in chunks.iter().enumerate() {
        let index = i + 1;
        tracing::info!(chunk = index, total, bytes = chunk.len(), backend = %backend.label(), "analyzing chunk");
        let partial = backend.analyze(chunk, index, total)?;
        if total > 1 {
            let path = subreport_path(req.report_path, index);
            write_subreport(&path, req.project_name, index, total, &partial);
            subreports.push(path);
        }
        partials.push(partial);
    }
    Ok(partials)
}

pub fn run(req: &RunRequest<'_>, backend: &mut dyn AnalysisBackend) -> Result<RunOutcome> {
    let run_started = report_store::watermark_now();
    let previous = report_store::read_watermark(req.report_path);
    match previous {
        Some(since) => tracing::info!(since = %since, "previous report found, running differential analysis"),
        None => tracing::info!("no previous watermark, running full analysis"),
    }

    let content = assemble(req.project_dir, previous)?;
    let stats: FilterStats = content.stats;
    tracing::info!(
        accepted = stats.accepted,
        malformed = stats.malformed,
        irrelevant = stats.irrelevant,
        "filtered conversation records"
    );

    if content.is_empty() {
        if let Some(since) = previous {
            return Ok(RunOutcome::NothingNew {
                report_path: req.report_path.to_path_buf(),
                since,
            });
        }
        return Err(ClauditError::NoRecords(req.project_dir.to_path_buf()).into());
    }

    let chunks = chunk_content(&content.text, req.max_chunk_bytes);
    let mut subreports = Vec::new();
    let partials = analyze_chunks(req, backend, &chunks, &mut subreports)?;

    let consolidated = partials.len() > 1;
    let fresh = if consolidated {
        consolidator::consolidate(backend, &partials)?
    } else {
        partials.into_iter().next().unwrap_or_default()
    };

    let body = match previous {
        Some(_) => {
            let previous_body = report_store::read_previous_body(req.report_path)?;
            consolidator::consolidate_differential(backend, &previous_body, &fresh)?
        }
        None => fresh,
    };

    let header = ReportHeader {
        project_name: req.project_name,
        project_path: req.project_path,
        run_started,
        differential_since: previous,
        chunk_count: chunks.len(),
    };
    let document = backend.profile().format_report(&header, &body);
    report_store::write_report(req.report_path, &document, &run_started)?;
    tracing::info!(path = %req.report_path.display(), "report written");

    let subreports_kept = if req.keep_subreports {
        subreports
    } else {
        remove_subreports(&subreports);
        Vec::new()
    };

    Ok(RunOutcome::Written(RunSummary {
        report_path: req.report_path.to_path_buf(),
        watermark: run_started,
        previous_watermark: previous,
        chunk_count: chunks.len(),
        consolidated,
        records_accepted: stats.accepted,
        lines_malformed: stats.malformed,
        lines_irrelevant: stats.irrelevant,
        stale_records: content.stale_records,
        files_full: content.count(FileSelection::All) + content.count(FileSelection::New),
        files_partial: content.count(FileSelection::Partial),
        subreports_kept,
    }))
}
