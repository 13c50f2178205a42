use crate::claudit::record_filter::{FilterStats, filter_lines};
use crate::claudit::util::system_time_to_utc;
use crate::error::ClauditError;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub const LOG_EXTENSION: &str = "jsonl";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSelection {
    /// Full run: every record.
    All,
    /// Created after the watermark: every record.
    New,
    /// Modified after the watermark: only newer or untimestamped records.
    Partial,
    /// Untouched since the watermark.
    Skip,
}

impl FileSelection {
    pub fn label(self) -> &'static str {
        match self {
            FileSelection::All => "all",
            FileSelection::New => "new",
            FileSelection::Partial => "partial",
            FileSelection::Skip => "skip",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub path: PathBuf,
    pub selection: FileSelection,
    pub records: usize,
}

#[derive(Debug, Clone, Default)]
pub struct AssembledContent {
    pub text: String,
    pub files: Vec<SelectedFile>,
    pub stats: FilterStats,
    pub stale_records: usize,
}

impl AssembledContent {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn count(&self, selection: FileSelection) -> usize {
        self.files.iter().filter(|f| f.selection == selection).count()
    }
}

/// Decide how much of a file a differential run needs.
///
/// `created` is `None` on platforms or filesystems that do not report a
/// birth time; such files are never classified as new.
pub fn classify_file(
    created: Option<DateTime<Utc>>,
    modified: DateTime<Utc>,
    watermark: Option<DateTime<Utc>>,
) -> FileSelection {
    let Some(watermark) = watermark else {
        return FileSelection::All;
    };
    if created.is_some_and(|c| c > watermark) {
        return FileSelection::New;
    }
    if modified > watermark {
        return FileSelection::Partial;
    }
    FileSelection::Skip
}

pub fn record_is_newer(timestamp: Option<DateTime<Utc>>, watermark: DateTime<Utc>) -> bool {
    match timestamp {
        Some(ts) => ts > watermark,
        None => true,
    }
}

pub fn list_log_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let read_dir =
        fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
    let mut files = Vec::new();
    for entry in read_dir {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(LOG_EXTENSION) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn file_times(path: &Path) -> Result<(Option<DateTime<Utc>>, DateTime<Utc>)> {
    let meta = fs::metadata(path).with_context(|| format!("failed to stat {}", path.display()))?;
    let created = meta.created().ok().map(system_time_to_utc);
    let modified = system_time_to_utc(meta.modified().unwrap_or(SystemTime::UNIX_EPOCH));
    Ok((created, modified))
}

#[derive(Debug, Default)]
pub struct FileRecords {
    pub lines: Vec<String>,
    pub stats: FilterStats,
    pub stale: usize,
}

pub fn select_records(
    path: &Path,
    selection: FileSelection,
    watermark: Option<DateTime<Utc>>,
) -> Result<FileRecords> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let decoded = String::from_utf8_lossy(&raw);
    let (records, stats) = filter_lines(decoded.lines());

    let mut out = FileRecords {
        stats,
        ..FileRecords::default()
    };
    for record in records {
        if selection == FileSelection::Partial
            && let Some(wm) = watermark
            && !record_is_newer(record.timestamp, wm)
        {
            out.stale += 1;
            continue;
        }
        out.lines.push(record.json);
    }
    Ok(out)
}

pub fn assemble(project_dir: &Path, watermark: Option<DateTime<Utc>>) -> Result<AssembledContent> {
    if !project_dir.is_dir() {
        return Err(ClauditError::ProjectDirMissing(project_dir.to_path_buf()).into());
    }

    let log_files = list_log_files(project_dir)?;
    if log_files.is_empty() && watermark.is_none() {
        return Err(ClauditError::NoLogFiles(project_dir.to_path_buf()).into());
    }

    let mut out = AssembledContent::default();
    let mut lines: Vec<String> = Vec::new();

    for path in log_files {
        let (created, modified) = file_times(&path)?;
        let selection = classify_file(created, modified, watermark);
        if selection == FileSelection::Skip {
            continue;
        }

        let picked = select_records(&path, selection, watermark)?;
        out.stats.absorb(picked.stats);
        out.stale_records += picked.stale;
        let kept = picked.lines.len();
        lines.extend(picked.lines);

        tracing::debug!(
            file = %path.display(),
            selection = selection.label(),
            records = kept,
            "selected log file"
        );
        if selection == FileSelection::Partial && kept == 0 {
            continue;
        }
        out.files.push(SelectedFile {
            path,
            selection,
            records: kept,
        });
    }

    out.text = lines.join("\n");
    Ok(out)
}
