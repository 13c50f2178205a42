use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde_json::Value;

use crate::claudit::backend::{AnalysisBackend, Sleeper};
use crate::claudit::config::ApiConfig;
use crate::claudit::mode::ModeProfile;
use crate::error::ClauditError;

pub struct ApiBackend {
    cfg: ApiConfig,
    api_key: String,
    profile: &'static ModeProfile,
    client: Client,
    sleeper: Rc<dyn Sleeper>,
    pacing: Duration,
}

impl ApiBackend {
    pub fn new(
        cfg: ApiConfig,
        api_key: String,
        profile: &'static ModeProfile,
        sleeper: Rc<dyn Sleeper>,
        pacing: Duration,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(ClauditError::MissingCredential(
                crate::claudit::config::API_KEY_ENV_VAR.to_string(),
            )
            .into());
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            cfg,
            api_key,
            profile,
            client,
            sleeper,
            pacing,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.cfg.base_url.trim_end_matches('/'))
    }
}

pub fn request_body(model: &str, instructions: &str, content: &str) -> Value {
    serde_json::json!({
        "model": model,
        "messages": [
            {"role": "system", "content": instructions},
            {"role": "user", "content": content}
        ],
        "temperature": 0.0
    })
}

pub fn extract_completion_text(json: &Value) -> Option<String> {
    let choices = json.get("choices").and_then(Value::as_array)?;
    let first = choices.first()?;
    let content = first.get("message")?.get("content")?;
    match content {
        Value::String(s) => Some(s.to_string()),
        Value::Array(parts) => {
            let mut chunks = Vec::new();
            for part in parts {
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    chunks.push(text.to_string());
                }
            }
            if chunks.is_empty() {
                None
            } else {
                Some(chunks.join("\n"))
            }
        }
        _ => None,
    }
}

impl AnalysisBackend for ApiBackend {
    fn label(&self) -> String {
        format!("api:{}", self.cfg.model)
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
        let url = self.endpoint();
        tracing::debug!(url = %url, model = %self.cfg.model, bytes = content.len(), "api request");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request_body(&self.cfg.model, instructions, content))
            .send()
            .with_context(|| format!("api request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ClauditError::ApiStatus {
                status: status.as_u16(),
                body: body.trim().to_string(),
            }
            .into());
        }

        let json: Value = response.json().map_err(|_| ClauditError::ApiMalformed)?;
        let text = extract_completion_text(&json).ok_or(ClauditError::ApiMalformed)?;
        Ok(text)
    }
}
