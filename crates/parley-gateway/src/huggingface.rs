//! Hugging Face Inference API client.
//!
//! Each model is addressed as `{base_url}/{model_id}`. Generation sends a JSON
//! body with sampling parameters, recognition uploads the raw audio bytes,
//! and synthesis returns raw audio bytes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use parley_core::config::{GatewayConfig, GenerationConfig};
use parley_core::AudioPayload;

use crate::error::GatewayError;
use crate::InferenceGateway;

/// Content type assumed for synthesized speech when the service omits one.
const DEFAULT_SPEECH_CONTENT_TYPE: &str = "audio/flac";

/// Sampling parameters of a generation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationParameters {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub repetition_penalty: f32,
}

impl From<&GenerationConfig> for GenerationParameters {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            max_new_tokens: config.max_new_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
            repetition_penalty: config.repetition_penalty,
        }
    }
}

/// Request body for text generation.
#[derive(Debug, Serialize)]
pub struct GenerationRequest<'a> {
    pub inputs: &'a str,
    pub parameters: &'a GenerationParameters,
}

/// Request body for speech synthesis.
#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    inputs: &'a str,
}

#[derive(Debug, Deserialize)]
struct GeneratedText {
    generated_text: String,
}

/// The hosted API answers generation with either one object or a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GenerationResponse {
    Many(Vec<GeneratedText>),
    One(GeneratedText),
}

#[derive(Debug, Deserialize)]
struct RecognitionResponse {
    text: String,
}

/// Extract `generated_text` from a generation response body.
pub fn parse_generation(body: &[u8]) -> Result<String, GatewayError> {
    match serde_json::from_slice::<GenerationResponse>(body)? {
        GenerationResponse::One(item) => Ok(item.generated_text),
        GenerationResponse::Many(items) => items
            .into_iter()
            .next()
            .map(|item| item.generated_text)
            .ok_or_else(|| GatewayError::Decode("empty generation result".to_string())),
    }
}

/// Extract `text` from a speech recognition response body.
pub fn parse_recognition(body: &[u8]) -> Result<String, GatewayError> {
    let response: RecognitionResponse = serde_json::from_slice(body)?;
    Ok(response.text)
}

/// Gateway backed by the Hugging Face Inference API.
pub struct HuggingFaceGateway {
    client: Client,
    base_url: String,
    token: Option<String>,
    generation_model: String,
    transcription_model: String,
    speech_model: String,
    parameters: GenerationParameters,
}

impl std::fmt::Debug for HuggingFaceGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HuggingFaceGateway")
            .field("base_url", &self.base_url)
            .field("has_token", &self.token.is_some())
            .field("generation_model", &self.generation_model)
            .field("transcription_model", &self.transcription_model)
            .field("speech_model", &self.speech_model)
            .field("parameters", &self.parameters)
            .finish()
    }
}

impl HuggingFaceGateway {
    /// Build a gateway from configuration, reading the token from the
    /// environment. A missing token is logged, not rejected.
    pub fn from_config(
        gateway: &GatewayConfig,
        generation: &GenerationConfig,
    ) -> Result<Self, GatewayError> {
        let token = gateway.resolve_token();
        if token.is_none() {
            tracing::warn!(
                token_env = %gateway.token_env,
                "No API token in environment; requests will be sent unauthenticated"
            );
        }
        Self::new(gateway, generation, token)
    }

    /// Build a gateway with an explicit token.
    pub fn new(
        gateway: &GatewayConfig,
        generation: &GenerationConfig,
        token: Option<String>,
    ) -> Result<Self, GatewayError> {
        let mut builder = Client::builder();
        if let Some(secs) = gateway.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url: gateway.base_url.trim_end_matches('/').to_string(),
            token,
            generation_model: gateway.generation_model.clone(),
            transcription_model: gateway.transcription_model.clone(),
            speech_model: gateway.speech_model.clone(),
            parameters: GenerationParameters::from(generation),
        })
    }

    pub fn generation_model(&self) -> &str {
        &self.generation_model
    }

    /// Endpoint for a model id.
    pub fn model_url(&self, model: &str) -> String {
        format!("{}/{}", self.base_url, model.trim_start_matches('/'))
    }

    /// Build the JSON body for a generation request.
    pub fn build_generation_request<'a>(&'a self, prompt: &'a str) -> GenerationRequest<'a> {
        GenerationRequest {
            inputs: prompt,
            parameters: &self.parameters,
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send a request and return the body of a successful response.
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<(Option<String>, Vec<u8>), GatewayError> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok((content_type, body.to_vec()))
    }
}

#[async_trait]
impl InferenceGateway for HuggingFaceGateway {
    async fn generate_response(&self, prompt: &str) -> Result<String, GatewayError> {
        let url = self.model_url(&self.generation_model);
        let body = self.build_generation_request(prompt);
        tracing::debug!(
            model = %self.generation_model,
            prompt_len = prompt.len(),
            "Sending generation request"
        );

        let result = async {
            let (_, bytes) = self.send(self.client.post(&url).json(&body)).await?;
            parse_generation(&bytes)
        }
        .await;

        if let Err(ref e) = result {
            tracing::error!(
                model = %self.generation_model,
                error = %e,
                "Error generating response"
            );
        }
        result
    }

    async fn speech_to_text(&self, audio: AudioPayload) -> Result<String, GatewayError> {
        let url = self.model_url(&self.transcription_model);
        tracing::debug!(
            model = %self.transcription_model,
            bytes = audio.len(),
            content_type = %audio.content_type,
            "Sending speech recognition request"
        );

        let request = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, audio.content_type.as_str())
            .body(audio.data);
        let result = async {
            let (_, bytes) = self.send(request).await?;
            parse_recognition(&bytes)
        }
        .await;

        if let Err(ref e) = result {
            tracing::error!(
                model = %self.transcription_model,
                error = %e,
                "Error in speech to text"
            );
        }
        result
    }

    async fn text_to_speech(&self, text: &str) -> Result<AudioPayload, GatewayError> {
        let url = self.model_url(&self.speech_model);
        tracing::debug!(
            model = %self.speech_model,
            text_len = text.len(),
            "Sending speech synthesis request"
        );

        let result = self
            .send(self.client.post(&url).json(&SpeechRequest { inputs: text }))
            .await
            .map(|(content_type, bytes)| {
                AudioPayload::new(
                    bytes,
                    content_type.unwrap_or_else(|| DEFAULT_SPEECH_CONTENT_TYPE.to_string()),
                )
            });

        if let Err(ref e) = result {
            tracing::error!(model = %self.speech_model, error = %e, "Error in text to speech");
        }
        result
    }
}
