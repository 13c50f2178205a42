use anyhow::Result;

use crate::claudit::backend::AnalysisBackend;

pub const SUBREPORT_BOUNDARY: &str = "\n\n---SUBREPORT BOUNDARY---\n\n";
pub const PREVIOUS_REPORT_LABEL: &str = "PREVIOUS REPORT:\n\n";
pub const NEW_ANALYSIS_SEPARATOR: &str = "\n\n---NEW CONVERSATIONS ANALYSIS---\n\n";

pub fn join_partials(partials: &[String]) -> String {
    partials.join(SUBREPORT_BOUNDARY)
}

pub fn differential_input(previous: &str, new: &str) -> String {
    format!("{PREVIOUS_REPORT_LABEL}{previous}{NEW_ANALYSIS_SEPARATOR}{new}")
}

pub fn consolidate(backend: &mut dyn AnalysisBackend, partials: &[String]) -> Result<String> {
    tracing::info!(partials = partials.len(), "consolidating partial reports");
    backend.consolidate(&join_partials(partials))
}

pub fn consolidate_differential(
    backend: &mut dyn AnalysisBackend,
    previous: &str,
    new: &str,
) -> Result<String> {
    tracing::info!("merging new analysis into previous report");
    backend.consolidate_differential(&differential_input(previous, new))
}
