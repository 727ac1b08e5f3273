use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "imagen-3.0-generate-002";

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub image_model: Option<String>,
    /// Command spawned for speech input; unset disables the mic.
    pub speech_command: Option<String>,
    pub download_dir: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    /// Env var wins over the stored key.
    pub fn resolved_api_key(&self) -> Option<String> {
        std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| self.api_key.clone())
    }

    pub fn text_model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string())
    }

    pub fn image_model(&self) -> String {
        self.image_model
            .clone()
            .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string())
    }

    pub fn download_dir(&self) -> PathBuf {
        if let Some(dir) = &self.download_dir {
            return PathBuf::from(dir);
        }
        dirs::download_dir().unwrap_or_else(|| PathBuf::from("."))
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("nexus").join("config.json"))
    }

    /// Log file lives beside the config; stderr belongs to the terminal UI.
    pub fn log_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("nexus").join("nexus.log"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let config = Config {
            api_key: Some("key".to_string()),
            model: Some("gemini-2.0-flash".to_string()),
            image_model: None,
            speech_command: Some("transcribe --once".to_string()),
            download_dir: Some("/tmp/art".to_string()),
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.speech_command.as_deref(), Some("transcribe --once"));
        assert_eq!(back.download_dir(), PathBuf::from("/tmp/art"));
    }

    #[test]
    fn model_defaults_apply() {
        let config = Config::new();
        assert_eq!(config.text_model(), DEFAULT_TEXT_MODEL);
        assert_eq!(config.image_model(), DEFAULT_IMAGE_MODEL);
    }
}
