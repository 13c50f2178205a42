use chrono::{DateTime, Local, Utc};
use clap::ValueEnum;

use crate::claudit::util::format_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AnalysisMode {
    /// Decisions, mistakes, milestones and a timeline.
    Knowledge,
    /// Incidents where the assistant fell short, as corrective rules.
    Rules,
}

impl AnalysisMode {
    pub fn profile(self) -> &'static ModeProfile {
        match self {
            AnalysisMode::Knowledge => &KNOWLEDGE,
            AnalysisMode::Rules => &RULES,
        }
    }

    pub fn as_str(self) -> &'static str {
        self.profile().output_prefix
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderStyle {
    Knowledge,
    Rules,
}

#[derive(Debug)]
pub struct ModeProfile {
    pub output_prefix: &'static str,
    pub analysis_prompt: &'static str,
    pub consolidation_prompt: &'static str,
    pub differential_prompt: &'static str,
    header: HeaderStyle,
}

pub static KNOWLEDGE: ModeProfile = ModeProfile {
    output_prefix: "knowledge",
    analysis_prompt: "Analyze this Claude conversation history and identify:

1. **Significant Decisions**: Key choices made during the project development
2. **Mistakes**: Errors, incorrect approaches, or issues that needed fixing
3. **Milestones**: Important achievements or completed features
4. **Timeline**: A chronological overview of the project's progression

Format the output as a Markdown document with clear sections for each category.
Include specific examples and quotes where relevant. Include important dates and times.
Be concise but thorough.",
    consolidation_prompt: "Consolidate these subreports into one single final report.
Merge all decisions, mistakes, milestones, and timeline entries from all subreports.
Remove any duplicates and organize chronologically where appropriate.
Maintain the same section structure: Significant Decisions, Mistakes, Milestones, and Timeline.",
    differential_prompt: "Consolidate this previous report with this new report, preserving timelines.
The first part is the previous full report. The second part contains new conversations since the last run.
Treat the previous report as authoritative: never drop its entries, only add or merge incoming content.
Merge all content appropriately:
- Add new decisions, mistakes, and milestones to existing sections
- Extend the timeline with new events
- Remove any duplicates
- Maintain chronological order where appropriate
Keep the same section structure: Significant Decisions, Mistakes, Milestones, and Timeline.",
    header: HeaderStyle::Knowledge,
};

pub static RULES: ModeProfile = ModeProfile {
    output_prefix: "rules",
    analysis_prompt: "You are an expert corporate performance psychologist. You have deep insight into the human psyche. Your job is to analyse the provided conversations between the AI assistant and the User to produce a list of up to 100 incidents in the conversation where the assistant upset, angered, frustrated, or confused the user due to not meeting expectations, being unprofessional, lazy, ambiguous, whimsical, lacking tenacity, incompetent, or stupid. The goal is collating a list of corrective and preventative rules for the assistant to avoid having them happen again.

Format each incident as:
- What happened: [specific behavior]
- Rule: [corrective action]
- Example: [quote from conversation if applicable]

Group rules into two sections:

1. **CLAUDE.md Candidates**: Concise, unambiguous rules suitable for system prompts

2. **Claude Hooks Candidates**: Rules that could be automated with hooks. Present as a table with columns:
   | Proposed Hook | Example It Prevents | Event Type | Matcher Pattern | Command |
   |---------------|-------------------|------------|-----------------|---------|
   | Verify API docs before implementation | Assistant tried using an API without looking at docs | PreToolUse | tool_name=\"Write\" or tool_name=\"MultiEdit\" | grep -q \"api\" $CLAUDE_FILE_PATHS && echo \"Check API docs first\" |

Make sure hook configurations are valid Claude hooks (PreToolUse, PostToolUse, Notification, Stop, SubagentStop events).",
    consolidation_prompt: "Consolidate these rule analysis subreports into one final report.
Merge all incidents and rules from all subreports.
Remove duplicates and organize by severity/frequency.
Maintain the two-section structure:
1. CLAUDE.md Candidates (text rules)
2. Claude Hooks Candidates (formatted as a table with: Proposed Hook | Example It Prevents | Event Type | Matcher Pattern | Command)",
    differential_prompt: "Consolidate this previous rules report with new incidents.
The first part is the previous report. The second part contains new conversations.
Treat the previous report as authoritative: never drop its rules, only add or merge incoming content.
Merge appropriately:
- Add new incidents and rules
- Update frequency counts for repeated patterns
- Maintain the two-section structure
- Keep the hooks table format intact
- Keep rules organized by severity/impact",
    header: HeaderStyle::Rules,
};

#[derive(Debug, Clone)]
pub struct ReportHeader<'a> {
    pub project_name: &'a str,
    pub project_path: &'a str,
    pub run_started: DateTime<Utc>,
    pub differential_since: Option<DateTime<Utc>>,
    pub chunk_count: usize,
}

impl ModeProfile {
    pub fn default_file_name(&self, project_name: &str) -> String {
        let slug = project_name.to_lowercase().replace(' ', "_");
        format!("{}_{}.md", self.output_prefix, slug)
    }

    pub fn format_report(&self, header: &ReportHeader<'_>, body: &str) -> String {
        let mut out = String::new();
        match self.header {
            HeaderStyle::Knowledge => {
                out.push_str(&format!(
                    "# Claude Project Analysis: {}\n\n",
                    header.project_name
                ));
                out.push_str(&format!("**Full Path**: {}\n\n", header.project_path));
                if let Some(since) = header.differential_since {
                    out.push_str(&format!(
                        "**Last Updated**: {}\n\n",
                        format_timestamp(&header.run_started)
                    ));
                    out.push_str(&format!(
                        "**Update Type**: Differential (changes since {})\n\n",
                        format_timestamp(&since)
                    ));
                } else if header.chunk_count > 1 {
                    out.push_str(&format!(
                        "**Note**: This analysis was generated from {} chunks. See subreport files for detailed chunk analyses.\n\n",
                        header.chunk_count
                    ));
                }
            }
            HeaderStyle::Rules => {
                out.push_str(&format!(
                    "# Claude Assistant Performance Rules: {}\n\n",
                    header.project_name
                ));
                out.push_str(&format!("**Project Path**: {}\n\n", header.project_path));
                let local = header.run_started.with_timezone(&Local);
                out.push_str(&format!(
                    "**Analysis Date**: {}\n\n",
                    local.format("%d-%m-%Y")
                ));
                if let Some(since) = header.differential_since {
                    out.push_str(&format!(
                        "**Update Type**: Differential (new incidents since {})\n\n",
                        format_timestamp(&since)
                    ));
                }
                out.push_str("**Purpose**: Identify patterns where the assistant failed to meet expectations and provide corrective rules.\n\n");
            }
        }
        out.push_str(body);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::{AnalysisMode, ReportHeader};
    use chrono::{TimeZone, Utc};

    fn header(differential: bool, chunks: usize) -> ReportHeader<'static> {
        let started = Utc
            .with_ymd_and_hms(2025, 7, 14, 12, 0, 0)
            .single()
            .expect("valid");
        ReportHeader {
            project_name: "Demo App",
            project_path: "/tmp/expts/demo/app",
            run_started: started,
            differential_since: differential
                .then(|| Utc.with_ymd_and_hms(2025, 7, 1, 8, 0, 0).single().expect("valid")),
            chunk_count: chunks,
        }
    }

    #[test]
    fn knowledge_full_header_mentions_chunk_count() {
        let out = AnalysisMode::Knowledge
            .profile()
            .format_report(&header(false, 3), "BODY");
        assert!(out.starts_with("# Claude Project Analysis: Demo App\n\n"));
        assert!(out.contains("**Full Path**: /tmp/expts/demo/app"));
        assert!(out.contains("generated from 3 chunks"));
        assert!(!out.contains("**Update Type**"));
        assert!(out.ends_with("BODY"));
    }

    #[test]
    fn knowledge_single_chunk_has_no_note() {
        let out = AnalysisMode::Knowledge
            .profile()
            .format_report(&header(false, 1), "BODY");
        assert!(!out.contains("**Note**"));
    }

    #[test]
    fn knowledge_differential_header_names_previous_run() {
        let out = AnalysisMode::Knowledge
            .profile()
            .format_report(&header(true, 4), "BODY");
        assert!(out.contains("**Last Updated**: 2025-07-14T12:00:00.000000Z"));
        assert!(out.contains("Differential (changes since 2025-07-01T08:00:00.000000Z)"));
        assert!(!out.contains("**Note**"));
    }

    #[test]
    fn rules_header_has_purpose_and_date() {
        let out = AnalysisMode::Rules
            .profile()
            .format_report(&header(true, 1), "BODY");
        assert!(out.starts_with("# Claude Assistant Performance Rules: Demo App\n\n"));
        assert!(out.contains("**Project Path**: /tmp/expts/demo/app"));
        assert!(out.contains("**Analysis Date**: "));
        assert!(out.contains("new incidents since 2025-07-01T08:00:00.000000Z"));
        assert!(out.contains("**Purpose**: Identify patterns"));
    }

    #[test]
    fn default_file_name_uses_prefix_and_slug() {
        assert_eq!(
            AnalysisMode::Rules.profile().default_file_name("Demo App"),
            "rules_demo_app.md"
        );
        assert_eq!(
            AnalysisMode::Knowledge.profile().default_file_name("Tool"),
            "knowledge_tool.md"
        );
    }

    #[test]
    fn prompts_differ_between_modes() {
        let k = AnalysisMode::Knowledge.profile();
        let r = AnalysisMode::Rules.profile();
        assert_ne!(k.analysis_prompt, r.analysis_prompt);
        assert!(k.consolidation_prompt.starts_with("Consolidate these"));
        assert!(r.consolidation_prompt.starts_with("Consolidate these"));
        assert!(k.differential_prompt.contains("previous"));
        assert!(r.differential_prompt.contains("previous"));
    }
}
