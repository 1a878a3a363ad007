use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::core::session::{FONT_SIZE_MAX, FONT_SIZE_MIN};

pub const CONFIG_FILE: &str = "config.yml";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_export")]
    pub export_folder: String,

    /// YAML catalog replacing the built-in scripts.
    #[serde(default)]
    pub scripts_file: Option<String>,

    #[serde(default)]
    pub display: DisplayConfig,

    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DisplayConfig {
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    #[serde(default)]
    pub high_contrast: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            font_size: default_font_size(),
            high_contrast: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            export_folder: default_export(),
            scripts_file: None,
            display: DisplayConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

fn default_export() -> String {
    ".".to_string()
}
fn default_font_size() -> u32 {
    18
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String, // "gemini" or "openai"
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    pub gemini: Option<GeminiConfig>,
    pub openai: Option<OpenAIConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeminiConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_gemini_model")]
    pub model: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OpenAIConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_openai_model")]
    pub model: String,
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            gemini: None,
            openai: None,
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self { api_key: None, model: default_gemini_model() }
    }
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self { api_key: None, model: default_openai_model(), base_url: None }
    }
}

fn default_provider() -> String {
    "gemini".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_output_tokens() -> u32 {
    100
}
fn default_gemini_model() -> String {
    "gemini-3-flash-preview".to_string()
}
fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

impl LlmConfig {
    /// Credential of the active provider, if one is configured and non-blank.
    pub fn api_key(&self) -> Option<&str> {
        let key = match self.provider.as_str() {
            "gemini" => self.gemini.as_ref().and_then(|c| c.api_key.as_deref()),
            "openai" => self.openai.as_ref().and_then(|c| c.api_key.as_deref()),
            _ => None,
        };
        key.filter(|k| !k.trim().is_empty())
    }

    pub fn set_api_key(&mut self, key: String) {
        match self.provider.as_str() {
            "openai" => self.openai.get_or_insert_with(OpenAIConfig::default).api_key = Some(key),
            _ => self.gemini.get_or_insert_with(GeminiConfig::default).api_key = Some(key),
        }
    }
}

impl Config {
    /// Loads `config.yml` from the working directory, falling back to defaults
    /// when the file does not exist.
    pub fn load() -> Result<Self> {
        Self::load_from(CONFIG_FILE)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("{} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut config: Config = serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.display.font_size = config.display.font_size.clamp(FONT_SIZE_MIN, FONT_SIZE_MAX);
        Ok(config)
    }

    /// Injects the backend credential. Blank keys are treated as absent.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            self.llm.set_api_key(key);
        }
        self
    }

    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.export_folder)
            .with_context(|| format!("Failed to create {}", self.export_folder))?;
        Ok(())
    }
}
