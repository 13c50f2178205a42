use anyhow::{Context, Result};
use chrono::{DateTime, SubsecRound, Utc};
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::claudit::util::{format_timestamp, parse_timestamp};

pub const WATERMARK_MARKER: &str = "<!-- Last run:";
pub const WATERMARK_CLOSE: &str = "-->";

/// Only the tail of a report is scanned for the watermark.
pub const TAIL_WINDOW_BYTES: u64 = 200;

/// Current time at the precision a watermark can hold, so a value written
/// and read back compares equal.
pub fn watermark_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub fn watermark_comment(ts: &DateTime<Utc>) -> String {
    format!("{WATERMARK_MARKER} {} {WATERMARK_CLOSE}", format_timestamp(ts))
}

pub fn parse_watermark(tail: &str) -> Option<DateTime<Utc>> {
    let start = tail.rfind(WATERMARK_MARKER)? + WATERMARK_MARKER.len();
    let rest = &tail[start..];
    let end = rest.find(WATERMARK_CLOSE)?;
    parse_timestamp(&rest[..end])
}

pub fn read_watermark(path: &Path) -> Option<DateTime<Utc>> {
    let mut file = File::open(path).ok()?;
    let len = file.metadata().ok()?.len();
    file.seek(SeekFrom::Start(len.saturating_sub(TAIL_WINDOW_BYTES)))
        .ok()?;
    let mut tail = Vec::new();
    file.read_to_end(&mut tail).ok()?;
    // the window may open mid-codepoint; lossy decoding only touches the prefix
    parse_watermark(&String::from_utf8_lossy(&tail))
}

pub fn strip_watermark(content: &str) -> &str {
    match content.rfind(WATERMARK_MARKER) {
        Some(idx) => content[..idx].trim_end(),
        None => content.trim_end(),
    }
}

pub fn read_previous_body(path: &Path) -> Result<String> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read previous report {}", path.display()))?;
    Ok(strip_watermark(&raw).to_string())
}

pub fn render_with_watermark(document: &str, ts: &DateTime<Utc>) -> String {
    format!("{}\n\n{}", document.trim_end(), watermark_comment(ts))
}

pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create {}", parent.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

pub fn write_report(path: &Path, document: &str, ts: &DateTime<Utc>) -> Result<()> {
    write_atomic(path, &render_with_watermark(document, ts))
}
