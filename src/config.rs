//! Configuration management

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use crate::Result;
use crate::catalog::{Capability, ToolDefinition};
use crate::error::Error;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Agent behaviour
    #[serde(default)]
    pub agent: AgentConfig,

    /// Live progress feedback timing
    #[serde(default)]
    pub progress: ProgressConfig,

    /// Usage billing
    #[serde(default)]
    pub billing: BillingConfig,

    /// Platform API tokens keyed by provider ("google", "openai", ...)
    #[serde(default)]
    pub api_keys: HashMap<String, String>,

    /// Extra catalog entries appended after the built-in tools
    #[serde(default)]
    pub catalog: Vec<ToolDefinition>,

    /// Telegram configuration
    #[serde(default)]
    pub telegram: TelegramConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// The agent's own handle, without the leading `@`
    #[serde(default = "default_handle")]
    pub handle: String,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Maximum model invocations per turn
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Default tool id per capability
    #[serde(default = "default_tools")]
    pub default_tools: HashMap<Capability, String>,

    /// Capability used for progress status messages
    #[serde(default = "default_status_capability")]
    pub status_capability: Capability,

    /// Preferred tool for progress status messages
    #[serde(default)]
    pub status_tool: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    #[serde(default = "default_tick_secs")]
    pub tick_interval_secs: u64,

    #[serde(default = "default_reaction_secs")]
    pub reaction_interval_secs: u64,

    #[serde(default = "default_text_update_secs")]
    pub text_update_interval_secs: u64,

    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,

    /// Hard cap on worker ticks, as a multiple of text-update intervals
    #[serde(default = "default_cycle_cap_multiplier")]
    pub cycle_cap_multiplier: u64,

    /// Escalating reaction sequence, calm first
    #[serde(default = "default_reactions")]
    pub reactions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    /// Credits added to every successful call
    #[serde(default = "default_maintenance_fee")]
    pub maintenance_fee: f64,

    /// JSON Lines usage ledger
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub token: String,

    /// Allowed usernames or user ids; empty allows everyone
    #[serde(default)]
    pub allow_from: Vec<String>,

    /// Reply chance (0–100) for unaddressed group messages
    #[serde(default = "default_group_reply_chance")]
    pub group_reply_chance: u8,
}

fn default_handle() -> String {
    "chatterbox_bot".to_string()
}

fn default_system_prompt() -> String {
    "You are a helpful assistant chatting on a messaging platform. \
     Be concise and friendly. When a tool needs a file, pass its identifier \
     exactly as given and never show identifiers to the user."
        .to_string()
}

fn default_max_iterations() -> usize {
    10
}

fn default_tools() -> HashMap<Capability, String> {
    HashMap::from([
        (Capability::Chat, "gemini-2.0-flash".to_string()),
        (Capability::Vision, "gemini-2.0-flash".to_string()),
        (Capability::ImageGeneration, "dall-e-3".to_string()),
    ])
}

fn default_status_capability() -> Capability {
    Capability::Chat
}

fn default_tick_secs() -> u64 {
    5
}

fn default_reaction_secs() -> u64 {
    15
}

fn default_text_update_secs() -> u64 {
    45
}

fn default_stop_timeout_ms() -> u64 {
    1000
}

fn default_cycle_cap_multiplier() -> u64 {
    10
}

fn default_reactions() -> Vec<String> {
    ["👀", "🤔", "🤯", "😨", "😱", "😭"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_maintenance_fee() -> f64 {
    0.0
}

fn default_ledger_path() -> PathBuf {
    config_dir().join("usage.jsonl")
}

fn default_group_reply_chance() -> u8 {
    0
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            handle: default_handle(),
            system_prompt: default_system_prompt(),
            max_iterations: default_max_iterations(),
            default_tools: default_tools(),
            status_capability: default_status_capability(),
            status_tool: None,
        }
    }
}

impl AgentConfig {
    pub fn default_tool(&self, capability: Capability) -> Option<&str> {
        self.default_tools.get(&capability).map(|s| s.as_str())
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_secs(),
            reaction_interval_secs: default_reaction_secs(),
            text_update_interval_secs: default_text_update_secs(),
            stop_timeout_ms: default_stop_timeout_ms(),
            cycle_cap_multiplier: default_cycle_cap_multiplier(),
            reactions: default_reactions(),
        }
    }
}

impl ProgressConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }

    pub fn reaction_interval(&self) -> Duration {
        Duration::from_secs(self.reaction_interval_secs)
    }

    pub fn text_update_interval(&self) -> Duration {
        Duration::from_secs(self.text_update_interval_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Maximum worker ticks before the session stops on its own
    pub fn max_ticks(&self) -> u64 {
        (self.cycle_cap_multiplier * self.text_update_interval_secs / self.tick_interval().as_secs()).max(1)
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            maintenance_fee: default_maintenance_fee(),
            ledger_path: default_ledger_path(),
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            token: String::new(),
            allow_from: Vec::new(),
            group_reply_chance: default_group_reply_chance(),
        }
    }
}

/// Get the config directory path
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".chatterbox")
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Load configuration from file
pub fn load() -> Result<Config> {
    load_from(&config_path())
}

/// Load configuration from an explicit path
pub fn load_from(path: &std::path::Path) -> Result<Config> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "Config not found at {:?}. Run 'chatterbox init' first.",
            path
        )));
    }

    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save(config: &Config) -> Result<()> {
    save_to(config, &config_path())
}

/// Save configuration to an explicit path
pub fn save_to(config: &Config, path: &std::path::Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Write a default configuration unless one already exists
pub fn init() -> Result<PathBuf> {
    let path = config_path();
    if path.exists() {
        return Err(Error::Config(format!("Config already exists at {:?}", path)));
    }
    save_to(&Config::default(), &path)?;
    Ok(path)
}
