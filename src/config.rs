//! Configuration types for flowchart-to-JSON conversion.
//!
//! Every knob of a run lives in [`FlowConfig`], built via its
//! [`FlowConfigBuilder`]. The graph core itself takes no configuration: the
//! builder, validator and renderer are fully determined by their input. What
//! is configurable here is the plumbing around them (how the image is
//! rasterised, which model reads it, how the JSON is written).
//!
//! # Design choice: builder over constructor
//! Most callers only set a model or a page number; the builder lets them rely
//! on documented defaults for everything else.

use crate::error::FlowError;
use crate::pipeline::extract::VisionExtractor;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Configuration for one flowchart conversion.
///
/// # Example
/// ```rust
/// use flowchart2json::FlowConfig;
///
/// let config = FlowConfig::builder()
///     .dpi(200)
///     .page(2)
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// assert_eq!(config.page, 2);
/// ```
#[derive(Clone)]
pub struct FlowConfig {
    /// Rendering DPI for PDF input. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Maximum image edge in pixels, for rendered PDF pages and for raster
    /// input alike. Default: 2000.
    ///
    /// Flowchart text is small; 2000 px keeps box labels legible to a vision
    /// model while staying under typical upload limits.
    pub max_rendered_pixels: u32,

    /// PDF page holding the flowchart, 1-indexed. Default: 1. Ignored for images.
    pub page: usize,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// LLM model identifier, e.g. "gpt-4.1-mini". If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed extractor. Takes precedence over every provider setting;
    /// no model is contacted unless the extractor does so itself.
    pub extractor: Option<Arc<dyn VisionExtractor>>,

    /// Sampling temperature. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens for the extraction response. Default: 4096.
    ///
    /// A 40-box flowchart with coordinates serialises to roughly 2 500 tokens.
    pub max_tokens: usize,

    /// Retry attempts after the first extraction call fails. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-extraction-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Custom extraction system prompt. If None, uses the built-in one.
    pub system_prompt: Option<String>,

    /// Receives stage events as the pipeline runs.
    pub progress_callback: Option<ProgressCallback>,

    /// Pretty-print the output JSON. Default: true.
    pub pretty: bool,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            max_rendered_pixels: 2000,
            page: 1,
            password: None,
            model: None,
            provider_name: None,
            provider: None,
            extractor: None,
            temperature: 0.2,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            download_timeout_secs: 120,
            system_prompt: None,
            progress_callback: None,
            pretty: true,
        }
    }
}

impl fmt::Debug for FlowConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("page", &self.page)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field(
                "extractor",
                &self.extractor.as_ref().map(|_| "<dyn VisionExtractor>"),
            )
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("pretty", &self.pretty)
            .finish()
    }
}

impl FlowConfig {
    /// Create a new builder for `FlowConfig`.
    pub fn builder() -> FlowConfigBuilder {
        FlowConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`FlowConfig`].
#[derive(Debug)]
pub struct FlowConfigBuilder {
    config: FlowConfig,
}

impl FlowConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn page(mut self, page: usize) -> Self {
        self.config.page = page;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn VisionExtractor>) -> Self {
        self.config.extractor = Some(extractor);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn pretty(mut self, v: bool) -> Self {
        self.config.pretty = v;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<FlowConfig, FlowError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(FlowError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.page == 0 {
            return Err(FlowError::InvalidConfig(
                "Page numbers start at 1".into(),
            ));
        }
        if c.max_rendered_pixels < 64 {
            return Err(FlowError::InvalidConfig(format!(
                "max_rendered_pixels must be ≥ 64, got {}",
                c.max_rendered_pixels
            )));
        }
        if c.max_tokens == 0 {
            return Err(FlowError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(FlowError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = FlowConfig::default();
        assert_eq!(c.page, 1);
        assert_eq!(c.temperature, 0.2);
        assert_eq!(c.max_retries, 3);
        assert!(c.pretty);
        assert!(c.extractor.is_none());
    }

    #[test]
    fn builder_rejects_out_of_range_dpi() {
        let err = FlowConfig::builder().dpi(30).build().unwrap_err();
        assert!(matches!(err, FlowError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_page_zero() {
        assert!(FlowConfig::builder().page(0).build().is_err());
    }

    #[test]
    fn temperature_is_clamped() {
        let c = FlowConfig::builder().temperature(9.0).build().unwrap();
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn debug_redacts_password() {
        let c = FlowConfig::builder().password("hunter2").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("<redacted>"));
    }
}
