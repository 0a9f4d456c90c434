use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ParleyError, Result};

/// Top-level configuration for Parley.
///
/// Loaded from `~/.parley/config.toml` by default. Every section falls back
/// to its defaults when absent, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParleyConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub audio: AudioConfig,
}

impl ParleyConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ParleyConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values the gateway or audio layer cannot work with.
    pub fn validate(&self) -> Result<()> {
        let g = &self.generation;
        if g.max_new_tokens == 0 {
            return Err(ParleyError::Config(
                "generation.max_new_tokens must be greater than 0".to_string(),
            ));
        }
        if g.temperature.is_nan() || g.temperature <= 0.0 {
            return Err(ParleyError::Config(format!(
                "generation.temperature must be positive, got {}",
                g.temperature
            )));
        }
        if g.top_p.is_nan() || g.top_p <= 0.0 || g.top_p > 1.0 {
            return Err(ParleyError::Config(format!(
                "generation.top_p must be in (0, 1], got {}",
                g.top_p
            )));
        }
        if g.repetition_penalty.is_nan() || g.repetition_penalty <= 0.0 {
            return Err(ParleyError::Config(format!(
                "generation.repetition_penalty must be positive, got {}",
                g.repetition_penalty
            )));
        }
        if self.gateway.base_url.trim().is_empty() {
            return Err(ParleyError::Config(
                "gateway.base_url must not be empty".to_string(),
            ));
        }
        if self.session.apology_text.trim().is_empty() {
            return Err(ParleyError::Config(
                "session.apology_text must not be empty".to_string(),
            ));
        }
        if self.audio.sample_rate == 0 {
            return Err(ParleyError::Config(
                "audio.sample_rate must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Remote inference service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Model endpoint prefix; the model id is appended as a path segment.
    pub base_url: String,
    /// Environment variable holding the API token.
    pub token_env: String,
    /// Text generation model.
    pub generation_model: String,
    /// Speech recognition model.
    pub transcription_model: String,
    /// Speech synthesis model.
    pub speech_model: String,
    /// Per-request timeout. Unset means requests may wait indefinitely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api-inference.huggingface.co/models".to_string(),
            token_env: "HUGGING_FACE_API_TOKEN".to_string(),
            generation_model: "facebook/blenderbot-400M-distill".to_string(),
            transcription_model: "openai/whisper-base".to_string(),
            speech_model: "espnet/kan-bayashi_ljspeech_vits".to_string(),
            request_timeout_secs: None,
        }
    }
}

impl GatewayConfig {
    /// Read the API token from the configured environment variable.
    ///
    /// A missing token is not an error here; requests simply go out
    /// unauthenticated and the service rejects them.
    pub fn resolve_token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }
}

/// Sampling parameters sent with every generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub repetition_penalty: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: 100,
            temperature: 0.7,
            top_p: 0.95,
            repetition_penalty: 1.2,
        }
    }
}

/// Conversation controller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Minimum time the typing indicator stays visible before a reply lands.
    pub reply_delay_ms: u64,
    /// Bot message appended when a submitted turn fails.
    pub apology_text: String,
    /// Instruction placed in front of the quoted text on correction requests.
    pub correction_instruction: String,
    /// Allow voice capture and an outstanding response to overlap.
    pub allow_voice_during_response: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reply_delay_ms: 1000,
            apology_text: "Üzgünüm, bir hata oluştu. Lütfen tekrar deneyin.".to_string(),
            correction_instruction:
                "Please correct any grammatical errors in this sentence and explain the corrections:"
                    .to_string(),
            allow_voice_during_response: false,
        }
    }
}

/// Microphone capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Input device name or substring; "default" selects the system default.
    pub device_name: String,
    /// Target sample rate in Hz for the recorded payload. Recordings are
    /// always downmixed to mono.
    pub sample_rate: u32,
    /// Recording buffer cap in seconds; older samples are dropped beyond it.
    pub max_recording_secs: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device_name: "default".to_string(),
            sample_rate: 16000,
            max_recording_secs: 120,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = ParleyConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(
            config.gateway.generation_model,
            "facebook/blenderbot-400M-distill"
        );
        assert_eq!(config.gateway.transcription_model, "openai/whisper-base");
        assert_eq!(config.gateway.token_env, "HUGGING_FACE_API_TOKEN");
        assert!(config.gateway.request_timeout_secs.is_none());
        assert_eq!(config.generation.max_new_tokens, 100);
        assert_eq!(config.generation.temperature, 0.7);
        assert_eq!(config.generation.top_p, 0.95);
        assert_eq!(config.generation.repetition_penalty, 1.2);
        assert_eq!(config.session.reply_delay_ms, 1000);
        assert!(!config.session.allow_voice_during_response);
        assert_eq!(config.audio.sample_rate, 16000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[general]
log_level = "debug"

[gateway]
generation_model = "gpt2"
request_timeout_secs = 30

[generation]
max_new_tokens = 50
temperature = 0.9

[session]
reply_delay_ms = 250
apology_text = "Sorry, something went wrong."
allow_voice_during_response = true
"#;
        let file = create_temp_config(content);
        let config = ParleyConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.gateway.generation_model, "gpt2");
        assert_eq!(config.gateway.request_timeout_secs, Some(30));
        assert_eq!(config.generation.max_new_tokens, 50);
        assert_eq!(config.generation.temperature, 0.9);
        // Unspecified fields in a present section keep their defaults.
        assert_eq!(config.generation.top_p, 0.95);
        assert_eq!(config.session.reply_delay_ms, 250);
        assert_eq!(config.session.apology_text, "Sorry, something went wrong.");
        assert!(config.session.allow_voice_during_response);
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let file = create_temp_config("[general]\nlog_level = \"warn\"\n");
        let config = ParleyConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "warn");
        assert_eq!(config.session.reply_delay_ms, 1000);
        assert_eq!(config.audio.max_recording_secs, 120);
    }

    #[test]
    fn test_load_empty_file() {
        let file = create_temp_config("");
        let config = ParleyConfig::load(file.path()).unwrap();
        assert_eq!(config.generation, GenerationConfig::default());
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("[generation\nmax_new_tokens = ");
        let result = ParleyConfig::load(file.path());
        assert!(matches!(result, Err(ParleyError::Config(_))));
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let file = create_temp_config("[generation]\ntop_p = 1.5\n");
        let err = ParleyConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("top_p"));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = ParleyConfig::load_or_default(Path::new("/nonexistent/parley.toml"));
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = ParleyConfig::default();
        config.session.reply_delay_ms = 10;
        config.save(&path).unwrap();

        let reloaded = ParleyConfig::load(&path).unwrap();
        assert_eq!(reloaded.session.reply_delay_ms, 10);
        assert_eq!(reloaded.session.apology_text, config.session.apology_text);
    }

    #[test]
    fn test_audio_section_has_only_live_settings() {
        let saved = toml::to_string_pretty(&ParleyConfig::default()).unwrap();
        let audio = saved
            .split("[audio]")
            .nth(1)
            .expect("audio section missing");
        assert!(audio.contains("sample_rate = 16000"));
        assert!(audio.contains("max_recording_secs = 120"));
        assert!(!audio.contains("channels"));
    }

    #[test]
    fn test_validate_rejects_zero_tokens() {
        let mut config = ParleyConfig::default();
        config.generation.max_new_tokens = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_blank_apology() {
        let mut config = ParleyConfig::default();
        config.session.apology_text = "   ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_sample_rate() {
        let mut config = ParleyConfig::default();
        config.audio.sample_rate = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_token_missing_variable() {
        let config = GatewayConfig {
            token_env: "PARLEY_TEST_TOKEN_THAT_IS_NEVER_SET".to_string(),
            ..GatewayConfig::default()
        };
        assert!(config.resolve_token().is_none());
    }
}
