use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ParleyError, Result};
use crate::types::UNKNOWN_INTENT;

/// Top-level configuration for the Parley assistant.
///
/// Loaded from `~/.parley/config.toml` by default. Each section corresponds
/// to one stage of the pipeline or a cross-cutting concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParleyConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    /// Intent keyword lists in declaration order. Order breaks score ties.
    #[serde(default = "default_intents")]
    pub intents: Vec<IntentKeywords>,
    /// Response templates keyed by intent name.
    #[serde(default = "default_templates")]
    pub templates: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub generative: GenerativeConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
}

impl Default for ParleyConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            intents: default_intents(),
            templates: default_templates(),
            pipeline: PipelineConfig::default(),
            generative: GenerativeConfig::default(),
            storage: StorageConfig::default(),
            voice: VoiceConfig::default(),
        }
    }
}

impl ParleyConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ParleyConfig = toml::from_str(&content)?;
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

    /// Check the invariants the pipeline relies on.
    ///
    /// Fails when no intents are configured, an intent has no keywords, the
    /// `unknown` template entry is missing, or any template list is empty.
    pub fn validate(&self) -> Result<()> {
        if self.intents.is_empty() {
            return Err(ParleyError::Config(
                "intent keyword configuration is empty".to_string(),
            ));
        }
        for intent in &self.intents {
            if intent.keywords.is_empty() {
                return Err(ParleyError::Config(format!(
                    "intent '{}' has no keywords",
                    intent.name
                )));
            }
            if intent.keywords.iter().any(|k| k.trim().is_empty()) {
                return Err(ParleyError::Config(format!(
                    "intent '{}' has a blank keyword",
                    intent.name
                )));
            }
        }
        if !self.templates.contains_key(UNKNOWN_INTENT) {
            return Err(ParleyError::Config(format!(
                "template catalog is missing the mandatory '{}' entry",
                UNKNOWN_INTENT
            )));
        }
        if let Some((intent, _)) = self.templates.iter().find(|(_, v)| v.is_empty()) {
            return Err(ParleyError::Config(format!(
                "template list for '{}' is empty",
                intent
            )));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the SQLite database and audio files.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Name printed in front of assistant replies.
    pub bot_name: String,
    /// Spoken at the start of an interactive session.
    pub greeting: String,
    /// Spoken when the user quits explicitly.
    pub farewell_message: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.parley/data".to_string(),
            log_level: "info".to_string(),
            bot_name: "CustomerBot".to_string(),
            greeting:
                "Hello! I am your customer service assistant. How can I help you today?"
                    .to_string(),
            farewell_message: "Thank you for using our service. Goodbye!".to_string(),
        }
    }
}

/// Keyword list for one intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentKeywords {
    pub name: String,
    pub keywords: Vec<String>,
}

impl IntentKeywords {
    pub fn new(name: &str, keywords: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Response selection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Consult the knowledge base before other stages.
    pub knowledge_enabled: bool,
    /// Ask the generative completion service when the knowledge base declines.
    pub generative_enabled: bool,
    /// Upper bound for a single knowledge or generative stage.
    pub stage_timeout_ms: u64,
    /// Longest accepted utterance, in characters.
    pub max_message_length: usize,
    /// Idle time after which a session is replaced.
    pub session_timeout_minutes: u32,
    /// Fixed seed for template selection. Random when unset.
    pub rng_seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            knowledge_enabled: true,
            generative_enabled: false,
            stage_timeout_ms: 5_000,
            max_message_length: 2_000,
            session_timeout_minutes: 30,
            rng_seed: None,
        }
    }
}

/// OpenAI-compatible completion endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerativeConfig {
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub request_timeout_secs: u64,
}

impl Default for GenerativeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            max_tokens: 150,
            temperature: 0.7,
            request_timeout_secs: 30,
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file name, relative to `general.data_dir`.
    pub db_file: String,
    /// Insert the built-in FAQ entries into an empty knowledge base.
    pub seed_default_faqs: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_file: "parley.db".to_string(),
            seed_default_faqs: true,
        }
    }
}

/// Speech collaborator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub sample_rate: u32,
    pub language_code: String,
    pub voice_name: String,
    /// Directory for synthesized replies, relative to `general.data_dir`.
    pub audio_dir: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            language_code: "en-US".to_string(),
            voice_name: "en-US-Standard-A".to_string(),
            audio_dir: "audio".to_string(),
        }
    }
}

// =============================================================================
// Built-in intent and template catalog
// =============================================================================

fn default_intents() -> Vec<IntentKeywords> {
    vec![
        IntentKeywords::new(
            "greeting",
            &["hello", "hi", "hey", "good morning", "good afternoon", "good evening"],
        ),
        IntentKeywords::new(
            "product_info",
            &["product", "item", "price", "cost", "available", "stock"],
        ),
        IntentKeywords::new(
            "order_status",
            &["order", "delivery", "shipping", "track", "status"],
        ),
        IntentKeywords::new(
            "account",
            &["account", "profile", "login", "password", "reset"],
        ),
        IntentKeywords::new(
            "support",
            &["help", "support", "issue", "problem", "complaint"],
        ),
        IntentKeywords::new(
            "farewell",
            &["bye", "goodbye", "thanks", "thank you", "exit", "quit"],
        ),
    ]
}

fn default_templates() -> BTreeMap<String, Vec<String>> {
    let entries: [(&str, &[&str]); 7] = [
        (
            "greeting",
            &[
                "Hello! How can I assist you today?",
                "Hi there! What can I do for you?",
                "Welcome! I'm here to help you.",
            ],
        ),
        (
            "product_info",
            &[
                "I can help you with product information. Which product are you interested in?",
                "Sure! Let me get you the product details. Can you specify the product name?",
            ],
        ),
        (
            "order_status",
            &[
                "I can check your order status. Could you provide your order number?",
                "Let me help you track your order. What's your order ID?",
            ],
        ),
        (
            "account",
            &[
                "I can assist with account-related queries. What do you need help with?",
                "I'm here to help with your account. Please describe your issue.",
            ],
        ),
        (
            "support",
            &[
                "I'm sorry you're experiencing an issue. Can you describe the problem in detail?",
                "I'm here to help resolve your issue. What seems to be the problem?",
            ],
        ),
        (
            "farewell",
            &[
                "Thank you for contacting us! Have a great day!",
                "Goodbye! Feel free to reach out if you need anything else.",
                "It was nice helping you. Take care!",
            ],
        ),
        (
            UNKNOWN_INTENT,
            &[
                "I'm not sure I understand. Could you please rephrase that?",
                "I didn't quite catch that. Can you provide more details?",
                "I'm still learning. Could you ask that in a different way?",
            ],
        ),
    ];

    entries
        .iter()
        .map(|(intent, lines)| {
            (
                intent.to_string(),
                lines.iter().map(|l| l.to_string()).collect(),
            )
        })
        .collect()
}
