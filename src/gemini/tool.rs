use std::rc::Rc;
use std::time::Duration;

use anyhow::Result;

use crate::claudit::backend::{AnalysisBackend, Sleeper};
use crate::claudit::config::ToolConfig;
use crate::claudit::mode::ModeProfile;
use crate::error::ClauditError;
use crate::gemini::process::{ToolInvocation, ToolOutcome, ToolRunner};

pub const RATE_LIMIT_SIGNATURES: [&str; 3] = ["429", "RESOURCE_EXHAUSTED", "Quota exceeded"];

pub fn is_rate_limited(stderr: &str) -> bool {
    RATE_LIMIT_SIGNATURES.iter().any(|sig| stderr.contains(sig))
}

/// Delay before retry number `attempt` (0-based): initial, 2x, 4x, ...
pub fn backoff_delay(initial_secs: u64, attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    Duration::from_secs(initial_secs.saturating_mul(factor))
}

enum Attempt {
    Done(String),
    RateLimited(String),
}

pub struct ExternalToolBackend {
    cfg: ToolConfig,
    profile: &'static ModeProfile,
    runner: Box<dyn ToolRunner>,
    sleeper: Rc<dyn Sleeper>,
    pacing: Duration,
    downgraded: bool,
}

impl ExternalToolBackend {
    pub fn new(
        cfg: ToolConfig,
        profile: &'static ModeProfile,
        runner: Box<dyn ToolRunner>,
        sleeper: Rc<dyn Sleeper>,
        pacing: Duration,
    ) -> Self {
        Self {
            cfg,
            profile,
            runner,
            sleeper,
            pacing,
            downgraded: false,
        }
    }

    pub fn active_model(&self) -> &str {
        if self.downgraded {
            &self.cfg.fallback_model
        } else {
            &self.cfg.model
        }
    }

    fn invocation(&self, instructions: &str, content: &str) -> ToolInvocation {
        ToolInvocation {
            bin: self.cfg.bin.clone(),
            args: vec![
                "-m".to_string(),
                self.active_model().to_string(),
                "-p".to_string(),
                instructions.to_string(),
            ],
            stdin: content.to_string(),
            timeout: Duration::from_secs(self.cfg.timeout_secs),
        }
    }

    fn maybe_downgrade(&mut self, stderr: &str) {
        if self.downgraded || self.cfg.model == self.cfg.fallback_model {
            return;
        }
        let premium = &self.cfg.premium_marker;
        let names_premium = (!premium.is_empty() && stderr.contains(premium.as_str()))
            || stderr.contains(self.cfg.model.as_str());
        if names_premium {
            tracing::warn!(
                from = %self.cfg.model,
                to = %self.cfg.fallback_model,
                "quota exhausted on premium model, switching for the rest of this run"
            );
            self.downgraded = true;
        }
    }

    fn attempt(&mut self, instructions: &str, content: &str) -> Result<Attempt> {
        let invocation = self.invocation(instructions, content);
        match self.runner.run(&invocation)? {
            ToolOutcome::Exited {
                code: Some(0),
                stdout,
                ..
            } => Ok(Attempt::Done(stdout)),
            ToolOutcome::Exited { code, stderr, .. } => {
                if is_rate_limited(&stderr) {
                    return Ok(Attempt::RateLimited(stderr));
                }
                Err(ClauditError::ToolFailed {
                    tool: self.cfg.bin.clone(),
                    code: code.map_or_else(|| "signal".to_string(), |c| c.to_string()),
                    stderr: stderr.trim().to_string(),
                }
                .into())
            }
            ToolOutcome::TimedOut { stderr } => {
                if is_rate_limited(&stderr) {
                    return Ok(Attempt::RateLimited(stderr));
                }
                Err(ClauditError::ToolTimedOut {
                    tool: self.cfg.bin.clone(),
                    secs: self.cfg.timeout_secs,
                }
                .into())
            }
        }
    }
}

impl AnalysisBackend for ExternalToolBackend {
    fn label(&self) -> String {
        format!("tool:{}:{}", self.cfg.bin, self.active_model())
    }

    fn profile(&self) -> &'static ModeProfile {
        self.profile
    }

    fn pacing(&self) -> Duration {
        self.pacing
    }

    fn sleeper(&self) -> &dyn Sleeper {
        self.sleeper.as_ref()
    }

    fn exchange(&mut self, instructions: &str, content: &str) -> Result<String> {
        let max_attempts = self.cfg.max_attempts.max(1);
        for attempt in 0..max_attempts {
            tracing::debug!(
                attempt = attempt + 1,
                max_attempts,
                model = %self.active_model(),
                bytes = content.len(),
                "invoking analysis tool"
            );
            match self.attempt(instructions, content)? {
                Attempt::Done(stdout) => return Ok(stdout),
                Attempt::RateLimited(stderr) => {
                    self.maybe_downgrade(&stderr);
                    if attempt + 1 < max_attempts {
                        let delay = backoff_delay(self.cfg.initial_backoff_secs, attempt);
                        tracing::warn!(
                            attempt = attempt + 1,
                            wait_secs = delay.as_secs(),
                            "analysis tool rate limited, backing off"
                        );
                        self.sleeper.sleep(delay);
                    }
                }
            }
        }
        Err(ClauditError::RateLimitExhausted {
            tool: self.cfg.bin.clone(),
            attempts: max_attempts,
        }
        .into())
    }
}
