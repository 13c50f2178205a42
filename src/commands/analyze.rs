use anyhow::{Result, bail};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::rc::Rc;

use crate::claudit::backend::{
    BackendFlags, BackendKind, ThreadSleeper, build_backend, choose_backend, tool_on_path,
};
use crate::claudit::config::{api_key_from_env, load_config, with_max_chunk_bytes};
use crate::claudit::mode::AnalysisMode;
use crate::claudit::orchestrator::{self, RunOutcome, RunRequest};
use crate::claudit::paths::resolve_paths;
use crate::claudit::projects::{ProjectDescriptor, discover, find_project};
use crate::claudit::stats_cache::StatsCache;
use crate::claudit::util::{format_file_size, format_timestamp, format_token_count};
use crate::commands::CommandReport;
use crate::error::ClauditError;

#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub project: Option<String>,
    pub project_number: Option<usize>,
    pub mode: AnalysisMode,
    pub output: Option<String>,
    pub out_dir: PathBuf,
    pub force_cli: bool,
    pub force_api: bool,
    pub yes: bool,
    pub keep_subchunk_reports: bool,
    pub max_chunk_bytes: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Choice {
    Quit,
    Pick(usize),
}

fn parse_choice(raw: &str, count: usize) -> Option<Choice> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("q") {
        return Some(Choice::Quit);
    }
    match trimmed.parse::<usize>() {
        Ok(n) if (1..=count).contains(&n) => Some(Choice::Pick(n)),
        _ => None,
    }
}

fn render_table(projects: &[ProjectDescriptor]) -> String {
    let mut out = String::new();
    for (i, p) in projects.iter().enumerate() {
        out.push_str(&format!(
            "{:>3}. {:<32} {:>9} {:>16}\n",
            i + 1,
            p.display_name,
            format_file_size(p.size_bytes),
            format_token_count(p.tokens)
        ));
    }
    out
}

fn prompt_for_project<R: BufRead, W: Write>(
    projects: &[ProjectDescriptor],
    input: &mut R,
    output: &mut W,
) -> Result<Option<ProjectDescriptor>> {
    write!(output, "{}", render_table(projects))?;
    write!(output, "Select a project number (q to quit): ")?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    match parse_choice(&line, projects.len()) {
        Some(Choice::Quit) => Ok(None),
        Some(Choice::Pick(n)) => Ok(Some(projects[n - 1].clone())),
        None => Err(ClauditError::ProjectNotFound(line.trim().to_string()).into()),
    }
}

fn confirm<R: BufRead, W: Write>(question: &str, input: &mut R, output: &mut W) -> Result<bool> {
    write!(output, "{question} [y/N]: ")?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn confirm_ambiguous<R: BufRead, W: Write>(
    project: &ProjectDescriptor,
    report: &mut CommandReport,
    input: &mut R,
    output: &mut W,
) -> Result<bool> {
    if !project.is_ambiguous() {
        return Ok(true);
    }
    let question = format!(
        "`{}` contains `--` and may map to more than one path (guessed {}). Continue?",
        project.dir_name, project.full_path
    );
    if confirm(&question, input, output)? {
        return Ok(true);
    }
    report.detail("cancelled=true");
    report.issue(format!("analysis of {} cancelled at the ambiguity prompt", project.dir_name));
    Ok(false)
}

fn select_project(
    opts: &AnalyzeOptions,
    projects: &[ProjectDescriptor],
    projects_dir: &std::path::Path,
) -> Result<Option<ProjectDescriptor>> {
    if let Some(query) = opts.project.as_deref() {
        return find_project(projects, projects_dir, query)
            .map(Some)
            .ok_or_else(|| ClauditError::ProjectNotFound(query.to_string()).into());
    }
    if let Some(n) = opts.project_number {
        return match n.checked_sub(1).and_then(|i| projects.get(i)) {
            Some(p) => Ok(Some(p.clone())),
            None => Err(ClauditError::ProjectNotFound(format!("#{n}")).into()),
        };
    }
    if opts.yes {
        bail!("--yes needs a PROJECT argument or --project-number");
    }
    if projects.is_empty() {
        return Err(ClauditError::ProjectNotFound(projects_dir.display().to_string()).into());
    }
    let stdin = io::stdin();
    prompt_for_project(projects, &mut stdin.lock(), &mut io::stdout())
}

pub fn run(opts: &AnalyzeOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("analyze");

    let cfg = with_max_chunk_bytes(load_config()?, opts.max_chunk_bytes)?;
    let paths = resolve_paths(&opts.out_dir)?;

    // Decide the backend before anything slow or costly happens.
    let api_key = api_key_from_env();
    let kind = choose_backend(
        BackendFlags {
            force_cli: opts.force_cli,
            force_api: opts.force_api,
        },
        &cfg.tool.bin,
        tool_on_path(&cfg.tool.bin),
        api_key.is_some(),
    )?;
    if kind == BackendKind::Api && api_key.is_none() {
        return Err(ClauditError::MissingCredential(
            crate::claudit::config::API_KEY_ENV_VAR.to_string(),
        )
        .into());
    }

    let cache_path = paths.cache_file();
    let mut cache = StatsCache::load(&cache_path);
    let projects = discover(&paths.projects_dir, &mut cache)?;
    cache.save_if_dirty(&cache_path);

    let Some(project) = select_project(opts, &projects, &paths.projects_dir)? else {
        report.detail("cancelled=true");
        return Ok(report);
    };

    if !opts.yes {
        let stdin = io::stdin();
        if !confirm_ambiguous(&project, &mut report, &mut stdin.lock(), &mut io::stdout())? {
            return Ok(report);
        }
    }

    let profile = opts.mode.profile();
    let report_path = paths.report_path(
        opts.output.as_deref(),
        &profile.default_file_name(&project.display_name),
    );

    report.detail(format!("project={}", project.display_name));
    report.detail(format!("project_dir={}", project.dir.display()));
    report.detail(format!("mode={}", opts.mode.as_str()));
    report.detail(format!("backend={}", kind.as_str()));
    if kind == BackendKind::Api {
        report.detail(format!(
            "estimated_max_cost_usd={:.4}",
            project.estimated_cost_usd()
        ));
    }

    let mut backend = build_backend(kind, &cfg, profile, api_key, Rc::new(ThreadSleeper))?;
    tracing::info!(project = %project.display_name, backend = %backend.label(), "starting analysis");

    let outcome = orchestrator::run(
        &RunRequest {
            project_dir: &project.dir,
            project_name: &project.display_name,
            project_path: &project.full_path,
            report_path: &report_path,
            max_chunk_bytes: cfg.chunking.max_chunk_bytes,
            keep_subreports: opts.keep_subchunk_reports,
        },
        backend.as_mut(),
    )?;

    match outcome {
        RunOutcome::NothingNew { report_path, since } => {
            report.detail("outcome=nothing_new");
            report.detail(format!("report={}", report_path.display()));
            report.detail(format!("since={}", format_timestamp(&since)));
        }
        RunOutcome::Written(summary) => {
            report.detail("outcome=written");
            report.detail(format!("report={}", summary.report_path.display()));
            report.detail(format!("differential={}", summary.differential()));
            if let Some(prev) = summary.previous_watermark {
                report.detail(format!("since={}", format_timestamp(&prev)));
            }
            report.detail(format!("watermark={}", format_timestamp(&summary.watermark)));
            report.detail(format!("chunks={}", summary.chunk_count));
            report.detail(format!("consolidated={}", summary.consolidated));
            report.detail(format!("records_accepted={}", summary.records_accepted));
            report.detail(format!("lines_malformed={}", summary.lines_malformed));
            report.detail(format!("lines_irrelevant={}", summary.lines_irrelevant));
            if summary.differential() {
                report.detail(format!("files_full={}", summary.files_full));
                report.detail(format!("files_partial={}", summary.files_partial));
                report.detail(format!("records_before_watermark={}", summary.stale_records));
            }
            for kept in &summary.subreports_kept {
                report.detail(format!("subreport={}", kept.display()));
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::{
        Choice, confirm, confirm_ambiguous, parse_choice, prompt_for_project, render_table,
    };
    use crate::commands::CommandReport;
    use crate::claudit::projects::ProjectDescriptor;
    use std::io::Cursor;
    use std::path::PathBuf;

    fn project(name: &str) -> ProjectDescriptor {
        ProjectDescriptor {
            dir_name: format!("-tmp-expts-{}", name.to_lowercase()),
            display_name: name.to_string(),
            full_path: format!("/tmp/expts/{}", name.to_lowercase()),
            dir: PathBuf::from("/nonexistent"),
            size_bytes: 2048,
            tokens: 512,
        }
    }

    #[test]
    fn choices_are_one_based_and_bounded() {
        assert_eq!(parse_choice("1\n", 2), Some(Choice::Pick(1)));
        assert_eq!(parse_choice(" 2 ", 2), Some(Choice::Pick(2)));
        assert_eq!(parse_choice("Q", 2), Some(Choice::Quit));
        assert_eq!(parse_choice("0", 2), None);
        assert_eq!(parse_choice("3", 2), None);
        assert_eq!(parse_choice("abc", 2), None);
    }

    #[test]
    fn prompt_returns_the_picked_project() {
        let projects = vec![project("Alpha"), project("Beta")];
        let mut out = Vec::new();
        let picked = prompt_for_project(&projects, &mut Cursor::new("2\n"), &mut out)
            .expect("prompt")
            .expect("picked");
        assert_eq!(picked.display_name, "Beta");
        let shown = String::from_utf8(out).expect("utf8");
        assert!(shown.contains("  1. Alpha"));
        assert!(shown.contains("q to quit"));
    }

    #[test]
    fn prompt_quit_selects_nothing() {
        let projects = vec![project("Alpha")];
        let got = prompt_for_project(&projects, &mut Cursor::new("q\n"), &mut Vec::new())
            .expect("prompt");
        assert!(got.is_none());
    }

    #[test]
    fn confirm_defaults_to_no() {
        assert!(confirm("go?", &mut Cursor::new("y\n"), &mut Vec::new()).expect("y"));
        assert!(!confirm("go?", &mut Cursor::new("\n"), &mut Vec::new()).expect("empty"));
        assert!(!confirm("go?", &mut Cursor::new(""), &mut Vec::new()).expect("eof"));
    }

    #[test]
    fn table_lists_size_and_tokens() {
        let table = render_table(&[project("Alpha")]);
        assert!(table.contains("2.0KB"));
        assert!(table.contains("512 tokens"));
    }

    #[test]
    fn declining_an_ambiguous_project_fails_the_report() {
        let mut odd = project("Hidden");
        odd.dir_name = "-tmp-expts--hidden".to_string();
        let mut report = CommandReport::new("analyze");
        let go = confirm_ambiguous(&odd, &mut report, &mut Cursor::new("n\n"), &mut Vec::new())
            .expect("confirm");
        assert!(!go);
        assert!(!report.ok);
        assert!(report.issues[0].contains("-tmp-expts--hidden"));
    }

    #[test]
    fn unambiguous_project_is_not_prompted() {
        let mut report = CommandReport::new("analyze");
        let mut out = Vec::new();
        let go = confirm_ambiguous(&project("Alpha"), &mut report, &mut Cursor::new(""), &mut out)
            .expect("confirm");
        assert!(go);
        assert!(report.ok);
        assert!(out.is_empty());
    }
}
