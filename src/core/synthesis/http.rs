//! HTTP synthesis backend.
//!
//! Provider-specific request construction lives behind
//! [`SynthesisRequestBuilder`]; [`HttpSynthesisBackend`] handles sending,
//! status checking and response decoding. A provider may answer either with
//! raw audio bytes or with a JSON document pointing at hosted audio.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::base::{
    Pronunciation, SynthesisBackend, SynthesisError, SynthesisOptions, SynthesisResult,
    SynthesizedAudio,
};
use crate::core::media::AudioSource;

/// Compiled pronunciation replacement patterns
#[derive(Clone)]
pub struct PronunciationReplacer {
    patterns: Vec<(Regex, String)>,
}

impl PronunciationReplacer {
    /// Create a new pronunciation replacer from config
    pub fn new(pronunciations: &[Pronunciation]) -> Self {
        let patterns = pronunciations
            .iter()
            .filter_map(|p| {
                let pattern = format!(r"\b{}\b", regex::escape(&p.word));
                match Regex::new(&pattern) {
                    Ok(regex) => Some((regex, p.pronunciation.clone())),
                    Err(e) => {
                        error!(
                            "Failed to compile pronunciation pattern for '{}': {}",
                            p.word, e
                        );
                        None
                    }
                }
            })
            .collect();
        Self { patterns }
    }

    /// Apply all pronunciation replacements to text
    pub fn apply(&self, text: &str) -> String {
        let mut result = text.to_string();
        for (pattern, replacement) in &self.patterns {
            result = pattern
                .replace_all(&result, replacement.as_str())
                .into_owned();
        }
        result
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Endpoint configuration for an HTTP synthesis provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpBackendConfig {
    pub url: String,
    pub api_key: Option<String>,
    /// Voice used when the request options do not name one.
    pub default_voice: Option<String>,
    /// Encoding requested from the provider and assumed for raw responses.
    pub audio_format: String,
    pub sample_rate: u32,
    pub request_timeout_secs: u64,
    pub pronunciations: Vec<Pronunciation>,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: None,
            default_voice: None,
            audio_format: "linear16".to_string(),
            sample_rate: 24_000,
            request_timeout_secs: 30,
            pronunciations: Vec::new(),
        }
    }
}

/// Trait for creating HTTP requests for synthesis providers
pub trait SynthesisRequestBuilder: Send + Sync {
    /// Build the HTTP request with provider-specific URL, headers and body
    ///
    /// # Arguments
    /// * `client` - The HTTP client to use for building the request
    /// * `text` - The text to synthesize, after pronunciation replacement
    /// * `options` - Per-request options
    ///
    /// # Returns
    /// A request builder ready to be sent
    fn build_http_request(
        &self,
        client: &reqwest::Client,
        text: &str,
        options: &SynthesisOptions,
    ) -> reqwest::RequestBuilder;

    /// Get the configuration for this request builder
    fn get_config(&self) -> &HttpBackendConfig;

    /// Get precompiled pronunciation replacer
    fn get_pronunciation_replacer(&self) -> Option<&PronunciationReplacer> {
        None
    }
}

/// Request body sent by [`JsonRequestBuilder`].
#[derive(Debug, Serialize)]
struct SynthesisRequestBody<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speed: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pitch: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    emotion: Option<&'a str>,
    format: &'a str,
    sample_rate: u32,
}

/// Generic JSON-over-POST request builder with bearer authentication.
#[derive(Clone)]
pub struct JsonRequestBuilder {
    config: HttpBackendConfig,
    replacer: Option<PronunciationReplacer>,
}

impl JsonRequestBuilder {
    pub fn new(config: HttpBackendConfig) -> Self {
        let replacer = (!config.pronunciations.is_empty())
            .then(|| PronunciationReplacer::new(&config.pronunciations));
        Self { config, replacer }
    }
}

impl SynthesisRequestBuilder for JsonRequestBuilder {
    fn build_http_request(
        &self,
        client: &reqwest::Client,
        text: &str,
        options: &SynthesisOptions,
    ) -> reqwest::RequestBuilder {
        let body = SynthesisRequestBody {
            text,
            voice: options
                .voice
                .as_deref()
                .or(self.config.default_voice.as_deref()),
            speed: options.speed,
            pitch: options.pitch,
            language: options.language.as_deref(),
            emotion: options.emotion.as_deref(),
            format: &self.config.audio_format,
            sample_rate: self.config.sample_rate,
        };

        let mut request = client.post(&self.config.url).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }
        request
    }

    fn get_config(&self) -> &HttpBackendConfig {
        &self.config
    }

    fn get_pronunciation_replacer(&self) -> Option<&PronunciationReplacer> {
        self.replacer.as_ref()
    }
}

/// JSON response shape for providers that host the audio themselves.
#[derive(Debug, Deserialize)]
struct HostedAudioResponse {
    audio_url: String,
    #[serde(default)]
    duration_sec: Option<f64>,
}

/// [`SynthesisBackend`] that talks to an HTTP provider.
pub struct HttpSynthesisBackend<R: SynthesisRequestBuilder> {
    client: reqwest::Client,
    builder: R,
}

impl<R: SynthesisRequestBuilder> HttpSynthesisBackend<R> {
    pub fn new(builder: R) -> SynthesisResult<Self> {
        let config = builder.get_config();
        if config.url.is_empty() {
            return Err(SynthesisError::InvalidConfiguration(
                "synthesis URL is empty".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| SynthesisError::InvalidConfiguration(e.to_string()))?;
        Ok(Self { client, builder })
    }
}

impl HttpSynthesisBackend<JsonRequestBuilder> {
    pub fn from_config(config: HttpBackendConfig) -> SynthesisResult<Self> {
        Self::new(JsonRequestBuilder::new(config))
    }
}

#[async_trait]
impl<R: SynthesisRequestBuilder> SynthesisBackend for HttpSynthesisBackend<R> {
    async fn synthesize(
        &self,
        text: &str,
        options: &SynthesisOptions,
    ) -> SynthesisResult<SynthesizedAudio> {
        let processed_text = match self.builder.get_pronunciation_replacer() {
            Some(replacer) => replacer.apply(text),
            None => text.to_string(),
        };

        let response = self
            .builder
            .build_http_request(&self.client, &processed_text, options)
            .send()
            .await
            .map_err(|e| SynthesisError::NetworkError(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!("Synthesis API error ({}): {}", status, error_body);
            return Err(SynthesisError::ProviderError(format!(
                "API error ({status}): {error_body}"
            )));
        }

        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));

        if is_json {
            let hosted: HostedAudioResponse = response.json().await.map_err(|e| {
                SynthesisError::ProviderError(format!("Malformed JSON response: {e}"))
            })?;
            debug!("Synthesized '{}' as hosted audio {}", processed_text, hosted.audio_url);
            return Ok(SynthesizedAudio {
                source: AudioSource::url(hosted.audio_url),
                declared_duration_secs: hosted.duration_sec,
            });
        }

        let data = response
            .bytes()
            .await
            .map_err(|e| SynthesisError::NetworkError(format!("Failed to read audio: {e}")))?;
        let config = self.builder.get_config();
        debug!("Synthesized '{}' as {} raw bytes", processed_text, data.len());

        Ok(SynthesizedAudio {
            source: AudioSource::Bytes {
                data,
                format: config.audio_format.clone(),
                sample_rate: config.sample_rate,
            },
            declared_duration_secs: None,
        })
    }

    fn name(&self) -> &str {
        "http"
    }

    fn get_provider_info(&self) -> serde_json::Value {
        let config = self.builder.get_config();
        serde_json::json!({
            "provider": "http",
            "url": config.url,
            "audio_format": config.audio_format,
            "sample_rate": config.sample_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pronunciation_replacer_respects_word_boundaries() {
        let replacer = PronunciationReplacer::new(&[Pronunciation {
            word: "SQL".to_string(),
            pronunciation: "sequel".to_string(),
        }]);
        assert_eq!(
            replacer.apply("SQL and MySQL use SQL."),
            "sequel and MySQL use sequel."
        );
    }

    #[test]
    fn test_empty_url_is_rejected() {
        let result = HttpSynthesisBackend::from_config(HttpBackendConfig::default());
        assert!(matches!(
            result.err(),
            Some(SynthesisError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_json_builder_skips_replacer_without_pronunciations() {
        let builder = JsonRequestBuilder::new(HttpBackendConfig {
            url: "http://localhost/tts".to_string(),
            ..Default::default()
        });
        assert!(builder.get_pronunciation_replacer().is_none());
    }
}
