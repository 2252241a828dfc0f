//! Oracle interfaces for external generation, translation and grading
//! services.
//!
//! Concrete oracles only move text: they turn an [`OracleRequest`] into a raw
//! response string. [`OracleClient`] owns the uniform retry contract and the
//! response-shape checks, and always hands back an [`OracleResult`].

pub mod command;
pub mod gemini;
pub mod google_translate;
pub mod openai;
pub mod parse;
pub mod prompt;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::config::{OracleConfig, Provider};
use crate::core::RetryPolicy;

pub use command::CommandOracle;
pub use gemini::GeminiOracle;
pub use google_translate::GoogleTranslateOracle;
pub use openai::OpenAiOracle;
pub use parse::parse_evaluation;

/// Provider-agnostic oracle request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleRequest {
    /// Answer a question in a given language
    Generate { prompt: String, language: String },

    /// Translate text between languages
    Translate {
        text: String,
        source_language: String,
        target_language: String,
    },

    /// Score an answer against a rubric
    Grade {
        question: String,
        answer: String,
        rubric: String,
    },
}

impl OracleRequest {
    /// Shape the response must have to count as a success
    pub fn shape(&self) -> ResponseShape {
        match self {
            Self::Generate { .. } | Self::Translate { .. } => ResponseShape::FreeText,
            Self::Grade { .. } => ResponseShape::Evaluation,
        }
    }
}

/// Expected response shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// Non-blank free text
    FreeText,

    /// `{"grade": number, "justification": string}`
    Evaluation,
}

/// A parsed grading response
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub grade: f64,
    pub justification: String,
}

/// Successful oracle payload
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Evaluation(Evaluation),
}

/// Outcome of a logical oracle call after retries
#[derive(Debug, Clone, PartialEq)]
pub enum OracleResult {
    Success(Payload),

    /// All attempts failed; `cause` is the last attempt's error
    Failure { cause: String, attempts: u32 },
}

impl OracleResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Why a single attempt failed. Every variant is retried.
#[derive(Debug, Error, PartialEq)]
pub enum OracleError {
    #[error("oracle call failed: {0}")]
    Transport(String),

    #[error("oracle returned an empty response")]
    EmptyPayload,

    #[error("invalid evaluation payload: {0}")]
    Parse(String),
}

/// External black-box service
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Human-readable oracle name
    fn name(&self) -> &str;

    /// Perform one attempt and return the raw response text
    async fn call(&self, request: &OracleRequest) -> Result<String>;
}

/// Check a raw response against the expected shape
pub fn interpret(shape: ResponseShape, raw: &str) -> Result<Payload, OracleError> {
    match shape {
        ResponseShape::FreeText => {
            let text = raw.trim();
            if text.is_empty() {
                return Err(OracleError::EmptyPayload);
            }
            Ok(Payload::Text(text.to_string()))
        }
        ResponseShape::Evaluation => parse_evaluation(raw).map(Payload::Evaluation),
    }
}

/// Oracle wrapped in the retry contract
#[derive(Clone)]
pub struct OracleClient {
    oracle: Arc<dyn Oracle>,
    retry: RetryPolicy,
}

impl OracleClient {
    pub fn new(oracle: Arc<dyn Oracle>, retry: RetryPolicy) -> Self {
        Self { oracle, retry }
    }

    pub fn name(&self) -> &str {
        self.oracle.name()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Execute a logical call. Never fails past this boundary.
    pub async fn call(&self, request: &OracleRequest) -> OracleResult {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match self.attempt(request).await {
                Ok(payload) => {
                    debug!(oracle = %self.name(), attempt, "Oracle call succeeded");
                    return OracleResult::Success(payload);
                }
                Err(e) => {
                    if self.retry.should_retry(attempt) {
                        let delay = self.retry.delay();
                        warn!(
                            oracle = %self.name(),
                            attempt,
                            max_attempts = self.retry.attempts(),
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Oracle attempt failed, retrying"
                        );
                        if delay > Duration::ZERO {
                            tokio::time::sleep(delay).await;
                        }
                        continue;
                    }

                    error!(
                        oracle = %self.name(),
                        attempt,
                        error = %e,
                        "Oracle call failed permanently"
                    );
                    return OracleResult::Failure {
                        cause: e.to_string(),
                        attempts: attempt,
                    };
                }
            }
        }
    }

    async fn attempt(&self, request: &OracleRequest) -> Result<Payload, OracleError> {
        let raw = self
            .oracle
            .call(request)
            .await
            .map_err(|e| OracleError::Transport(format!("{:#}", e)))?;

        interpret(request.shape(), &raw)
    }
}

/// Build the oracle configured for a stage
pub fn build(config: &OracleConfig) -> Result<Arc<dyn Oracle>> {
    let oracle: Arc<dyn Oracle> = match config.provider {
        Provider::Openai | Provider::Openrouter => Arc::new(OpenAiOracle::from_config(config)?),
        Provider::Gemini => Arc::new(GeminiOracle::from_config(config)?),
        Provider::GoogleTranslate => Arc::new(GoogleTranslateOracle::from_config(config)?),
        Provider::Command => Arc::new(CommandOracle::from_config(config)?),
    };
    Ok(oracle)
}
