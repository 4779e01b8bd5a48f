//! Vision extraction: the one stage that talks to a model.
//!
//! [`VisionExtractor`] is the seam between the pipeline and whatever reads
//! the image. The graph core only ever sees the [`RawExtraction`] it returns,
//! so tests drive the whole pipeline with a stub extractor and no network.
//!
//! [`LlmVisionExtractor`] is the production implementation over any
//! `edgequake_llm` provider.
//!
//! ## Retry Strategy
//!
//! Provider errors (429, 503, timeouts) and unparseable answers are both
//! retried with exponential backoff (`retry_backoff_ms * 2^(attempt-1)`):
//! 500 ms → 1 s → 2 s with the defaults. After the last attempt the failure
//! surfaces as [`FlowError::ExtractionService`].

use crate::config::FlowConfig;
use crate::error::FlowError;
use crate::graph::raw::RawExtraction;
use crate::pipeline::response::parse_extraction;
use crate::prompts::{retry_instruction, DEFAULT_SYSTEM_PROMPT, EXTRACTION_INSTRUCTION};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// Reads a flowchart image and reports its shapes and connectors.
#[async_trait]
pub trait VisionExtractor: Send + Sync {
    async fn extract(&self, image: &ImageData) -> Result<RawExtraction, FlowError>;

    /// Short name for logs.
    fn name(&self) -> &str {
        "vision"
    }
}

/// Why one attempt failed, and whether the next prompt should say so.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptError {
    /// Transport or provider error; resend the same request.
    Service(String),
    /// The model answered but not with usable JSON.
    Malformed(String),
}

impl AttemptError {
    fn detail(&self) -> &str {
        match self {
            AttemptError::Service(d) | AttemptError::Malformed(d) => d,
        }
    }
}

/// Retry budget shared by every attempt loop.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(2u64.saturating_pow(attempt - 1)))
    }
}

/// Run `call` until it succeeds or the budget is spent.
///
/// `call` receives the previous attempt's error so it can adjust the request.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, mut call: F) -> Result<T, FlowError>
where
    F: FnMut(Option<&AttemptError>) -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let mut last_err: Option<AttemptError> = None;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            let backoff = policy.delay(attempt);
            warn!(
                "Extraction retry {}/{} after {:?}",
                attempt, policy.max_retries, backoff
            );
            sleep(backoff).await;
        }

        match call(last_err.as_ref()).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!("Extraction attempt {} failed: {}", attempt + 1, e.detail());
                last_err = Some(e);
            }
        }
    }

    Err(FlowError::ExtractionService {
        attempts: policy.max_retries + 1,
        detail: last_err
            .map(|e| e.detail().to_string())
            .unwrap_or_else(|| "Unknown error".to_string()),
    })
}

/// [`VisionExtractor`] over an `edgequake_llm` chat provider.
pub struct LlmVisionExtractor {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    options: CompletionOptions,
    policy: RetryPolicy,
    api_timeout: Duration,
}

impl LlmVisionExtractor {
    /// Build from a provider and the relevant config fields.
    pub fn new(provider: Arc<dyn LLMProvider>, config: &FlowConfig) -> Self {
        Self {
            provider,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            options: build_options(config),
            policy: RetryPolicy {
                max_retries: config.max_retries,
                backoff_ms: config.retry_backoff_ms,
            },
            api_timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    async fn attempt(
        &self,
        image: &ImageData,
        previous: Option<&AttemptError>,
    ) -> Result<RawExtraction, AttemptError> {
        let messages = build_messages(&self.system_prompt, image, previous);
        let start = Instant::now();

        let response = timeout(self.api_timeout, self.provider.chat(&messages, Some(&self.options)))
            .await
            .map_err(|_| {
                AttemptError::Service(format!(
                    "no response within {}s",
                    self.api_timeout.as_secs()
                ))
            })?
            .map_err(|e| AttemptError::Service(e.to_string()))?;

        debug!(
            "Extraction call: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        parse_extraction(&response.content).map_err(|e| AttemptError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl VisionExtractor for LlmVisionExtractor {
    async fn extract(&self, image: &ImageData) -> Result<RawExtraction, FlowError> {
        let raw = with_retry(self.policy, |previous| {
            let previous = previous.cloned();
            async move { self.attempt(image, previous.as_ref()).await }
        })
        .await?;
        info!(
            "Extracted {} shapes, {} connectors",
            raw.shapes.len(),
            raw.connectors.len()
        );
        Ok(raw)
    }

    fn name(&self) -> &str {
        "llm"
    }
}

/// System prompt, then the image with an instruction. After a malformed
/// answer the instruction quotes the parse error.
fn build_messages(
    system_prompt: &str,
    image: &ImageData,
    previous: Option<&AttemptError>,
) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user_with_images(instruction_for(previous), vec![image.clone()]),
    ]
}

fn instruction_for(previous: Option<&AttemptError>) -> String {
    match previous {
        Some(AttemptError::Malformed(detail)) => retry_instruction(detail),
        _ => EXTRACTION_INSTRUCTION.to_string(),
    }
}

fn build_options(config: &FlowConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff_ms: 1,
        }
    }

    #[test]
    fn build_options_defaults() {
        let opts = build_options(&FlowConfig::default());
        assert_eq!(opts.temperature, Some(0.2));
        assert_eq!(opts.max_tokens, Some(4096));
    }

    #[test]
    fn backoff_doubles() {
        let p = RetryPolicy {
            max_retries: 3,
            backoff_ms: 500,
        };
        assert_eq!(p.delay(1), Duration::from_millis(500));
        assert_eq!(p.delay(2), Duration::from_millis(1000));
        assert_eq!(p.delay(3), Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let out = with_retry(fast(3), |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(AttemptError::Service("503".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(out, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_budget_reports_attempts_and_last_error() {
        let err = with_retry(fast(2), |_| async {
            Err::<(), _>(AttemptError::Malformed("expected value".into()))
        })
        .await
        .unwrap_err();
        match err {
            FlowError::ExtractionService { attempts, detail } => {
                assert_eq!(attempts, 3);
                assert_eq!(detail, "expected value");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn previous_error_is_passed_to_next_attempt() {
        let seen = std::sync::Mutex::new(Vec::new());
        let _ = with_retry(fast(1), |prev| {
            seen.lock().unwrap().push(prev.cloned());
            async { Err::<(), _>(AttemptError::Malformed("bad".into())) }
        })
        .await;
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen[0], None);
        assert_eq!(seen[1], Some(AttemptError::Malformed("bad".into())));
    }

    #[test]
    fn retry_message_quotes_parse_error() {
        assert_eq!(instruction_for(None), EXTRACTION_INSTRUCTION);
        assert_eq!(
            instruction_for(Some(&AttemptError::Service("503".into()))),
            EXTRACTION_INSTRUCTION
        );
        let retry = instruction_for(Some(&AttemptError::Malformed("trailing characters".into())));
        assert!(retry.contains("trailing characters"));

        let image = ImageData::new("AAAA".to_string(), "image/png");
        assert_eq!(build_messages("sys", &image, None).len(), 2);
    }
}
