use std::rc::Rc;
use std::thread;
use std::time::Duration;

use anyhow::Result;

use crate::claudit::api::ApiBackend;
use crate::claudit::config::ClauditConfig;
use crate::claudit::mode::ModeProfile;
use crate::error::ClauditError;
use crate::gemini::process::ProcessRunner;
use crate::gemini::tool::ExternalToolBackend;

pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    pub slept: std::cell::RefCell<Vec<Duration>>,
}

#[cfg(test)]
impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept.borrow_mut().push(duration);
    }
}

pub fn chunk_request(chunk: &str, index: usize, total: usize) -> String {
    format!("This is chunk {index} of {total}. Analyze this portion of the conversation:\n\n{chunk}")
}

pub trait AnalysisBackend {
    fn label(&self) -> String;

    fn profile(&self) -> &'static ModeProfile;

    /// Pause inserted after each call, independent of backend rate limits.
    fn pacing(&self) -> Duration;

    fn sleeper(&self) -> &dyn Sleeper;

    fn exchange(&mut self, instructions: &str, content: &str) -> Result<String>;

    fn paced_exchange(&mut self, instructions: &str, content: &str) -> Result<String> {
        let reply = self.exchange(instructions, content)?;
        let pause = self.pacing();
        self.sleeper().sleep(pause);
        Ok(reply)
    }

    /// `index` is 1-based.
    fn analyze(&mut self, chunk: &str, index: usize, total: usize) -> Result<String> {
        let prompt = self.profile().analysis_prompt;
        self.paced_exchange(prompt, &chunk_request(chunk, index, total))
    }

    fn consolidate(&mut self, combined: &str) -> Result<String> {
        let prompt = self.profile().consolidation_prompt;
        self.paced_exchange(prompt, combined)
    }

    fn consolidate_differential(&mut self, combined: &str) -> Result<String> {
        let prompt = self.profile().differential_prompt;
        self.paced_exchange(prompt, combined)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Tool,
    Api,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Tool => "tool",
            BackendKind::Api => "api",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BackendFlags {
    pub force_cli: bool,
    pub force_api: bool,
}

pub fn choose_backend(
    flags: BackendFlags,
    tool_bin: &str,
    tool_found: bool,
    api_key_present: bool,
) -> Result<BackendKind> {
    match (flags.force_cli, flags.force_api) {
        (true, true) => return Err(ClauditError::ConflictingBackendFlags.into()),
        (true, false) => return Ok(BackendKind::Tool),
        (false, true) => return Ok(BackendKind::Api),
        (false, false) => {}
    }
    if tool_found {
        return Ok(BackendKind::Tool);
    }
    if api_key_present {
        return Ok(BackendKind::Api);
    }
    Err(ClauditError::NoBackendAvailable {
        tool: tool_bin.to_string(),
    }
    .into())
}

pub fn tool_on_path(bin: &str) -> bool {
    which::which(bin).is_ok()
}

pub fn build_backend(
    kind: BackendKind,
    cfg: &ClauditConfig,
    profile: &'static ModeProfile,
    api_key: Option<String>,
    sleeper: Rc<dyn Sleeper>,
) -> Result<Box<dyn AnalysisBackend>> {
    let pacing = Duration::from_millis(cfg.pacing.pause_millis);
    match kind {
        BackendKind::Tool => Ok(Box::new(ExternalToolBackend::new(
            cfg.tool.clone(),
            profile,
            Box::new(ProcessRunner),
            sleeper,
            pacing,
        ))),
        BackendKind::Api => {
            let key = api_key.ok_or_else(|| {
                ClauditError::MissingCredential(crate::claudit::config::API_KEY_ENV_VAR.to_string())
            })?;
            Ok(Box::new(ApiBackend::new(
                cfg.api.clone(),
                key,
                profile,
                sleeper,
                pacing,
            )?))
        }
    }
}
