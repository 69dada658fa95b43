//! Tool catalog - the static registry of models and APIs the agent can use.
//!
//! Every external model or API endpoint is described by a [`ToolDefinition`]:
//! which provider serves it, which [`Capability`]s it supports and how much a
//! call costs. The catalog is built once at startup and only read afterwards.
//!
//! # Adding a New Tool
//!
//! 1. Add a [`ToolDefinition`] to [`ToolCatalog::builtin`], or
//! 2. Add an entry to the `catalog` array in `config.json`

mod credentials;
mod resolver;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use credentials::{ConfigCredentialResolver, Credential, CredentialResolver};
pub use resolver::{ConfiguredTool, ToolChoiceResolver};

/// A named category of model/tool function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Chat,
    Vision,
    Hearing,
    ImageGeneration,
    ImageEditing,
    Search,
    Embedding,
    /// A named tool the model invoked mid-turn.
    ToolUse,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Chat => "chat",
            Capability::Vision => "vision",
            Capability::Hearing => "hearing",
            Capability::ImageGeneration => "image_generation",
            Capability::ImageEditing => "image_editing",
            Capability::Search => "search",
            Capability::Embedding => "embedding",
            Capability::ToolUse => "tool_use",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cost-estimate coefficients for one tool, in credits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    /// Credits per 1M input tokens.
    #[serde(default)]
    pub input_per_million: f64,

    /// Credits per 1M output tokens.
    #[serde(default)]
    pub output_per_million: f64,

    /// Credits per 1M search tokens (providers with a citation breakdown).
    #[serde(default)]
    pub search_per_million: f64,

    /// Credits per generated image, keyed by size bucket (e.g. `"1024x1024"`).
    #[serde(default)]
    pub image_sizes: BTreeMap<String, f64>,

    /// Flat fee per API call.
    #[serde(default)]
    pub per_call: f64,

    /// Fee per second of wall-clock runtime.
    #[serde(default)]
    pub per_runtime_second: f64,
}

impl CostEstimate {
    /// Token-priced estimate with no flat fees.
    pub fn tokens(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
            ..Self::default()
        }
    }
}

/// Static, immutable registry entry for one model or API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Identifier, also used as the upstream model name.
    pub id: String,

    /// Human-readable name.
    pub name: String,

    /// Provider key (`"google"`, `"openai"`, `"perplexity"`, ...).
    pub provider: String,

    /// Base URL override for OpenAI-compatible providers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Supported capabilities.
    pub capabilities: Vec<Capability>,

    /// Pricing coefficients.
    #[serde(default)]
    pub cost: CostEstimate,
}

impl ToolDefinition {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        provider: impl Into<String>,
        capabilities: &[Capability],
        cost: CostEstimate,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            provider: provider.into(),
            endpoint: None,
            capabilities: capabilities.to_vec(),
            cost,
        }
    }

    #[inline]
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Process-wide list of tool definitions, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: Vec<ToolDefinition>,
}

impl ToolCatalog {
    /// Build a catalog from explicit definitions. Later duplicates of an id are dropped.
    pub fn new(definitions: Vec<ToolDefinition>) -> Self {
        let mut tools: Vec<ToolDefinition> = Vec::with_capacity(definitions.len());
        for def in definitions {
            if tools.iter().any(|t| t.id == def.id) {
                tracing::warn!(tool = %def.id, "Duplicate catalog entry ignored");
                continue;
            }
            tools.push(def);
        }
        Self { tools }
    }

    /// Built-in tools followed by any extra entries from configuration.
    pub fn with_extra(extra: Vec<ToolDefinition>) -> Self {
        let mut all = Self::builtin_definitions();
        all.extend(extra);
        Self::new(all)
    }

    /// The built-in catalog.
    pub fn builtin() -> Self {
        Self::new(Self::builtin_definitions())
    }

    fn builtin_definitions() -> Vec<ToolDefinition> {
        use Capability::*;

        let mut dall_e = ToolDefinition::new(
            "dall-e-3",
            "DALL·E 3",
            "openai",
            &[ImageGeneration],
            CostEstimate::default(),
        );
        dall_e.cost.image_sizes = BTreeMap::from([
            ("1024x1024".to_string(), 0.04),
            ("1024x1792".to_string(), 0.08),
            ("1792x1024".to_string(), 0.08),
        ]);

        let mut sonar = ToolDefinition::new(
            "sonar",
            "Perplexity Sonar",
            "perplexity",
            &[Chat, Search],
            CostEstimate::tokens(1.0, 1.0),
        );
        sonar.endpoint = Some("https://api.perplexity.ai".to_string());
        sonar.cost.search_per_million = 5.0;
        sonar.cost.per_call = 0.005;

        vec![
            // ── Google ─────────────────────────────────────────────────
            ToolDefinition::new(
                "gemini-2.0-flash",
                "Gemini 2.0 Flash",
                "google",
                &[Chat, Vision, Hearing],
                CostEstimate::tokens(0.1, 0.4),
            ),
            ToolDefinition::new(
                "gemini-1.5-pro",
                "Gemini 1.5 Pro",
                "google",
                &[Chat, Vision, Hearing],
                CostEstimate::tokens(1.25, 5.0),
            ),
            // ── OpenAI ─────────────────────────────────────────────────
            ToolDefinition::new(
                "gpt-4o-mini",
                "GPT-4o mini",
                "openai",
                &[Chat, Vision],
                CostEstimate::tokens(0.15, 0.6),
            ),
            ToolDefinition::new(
                "gpt-4o",
                "GPT-4o",
                "openai",
                &[Chat, Vision],
                CostEstimate::tokens(2.5, 10.0),
            ),
            dall_e,
            // ── Perplexity ─────────────────────────────────────────────
            sonar,
        ]
    }

    /// Look up a tool by id.
    pub fn get(&self, id: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|t| t.id == id)
    }

    /// All tools in declaration order.
    pub fn all(&self) -> &[ToolDefinition] {
        &self.tools
    }

    /// Tools supporting a capability, in declaration order.
    pub fn supporting(&self, capability: Capability) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.iter().filter(move |t| t.supports(capability))
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_has_chat_tools() {
        let catalog = ToolCatalog::builtin();
        assert!(catalog.supporting(Capability::Chat).count() >= 3);
        assert!(catalog.get("gemini-2.0-flash").is_some());
    }

    #[test]
    fn test_duplicate_ids_keep_first() {
        let first = ToolDefinition::new("m", "First", "google", &[Capability::Chat], CostEstimate::default());
        let second = ToolDefinition::new("m", "Second", "openai", &[Capability::Chat], CostEstimate::default());
        let catalog = ToolCatalog::new(vec![first, second]);

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("m").map(|t| t.name.as_str()), Some("First"));
    }

    #[test]
    fn test_definition_deserializes_with_defaults() {
        let json = r#"{"id":"x","name":"X","provider":"openai","capabilities":["chat","vision"]}"#;
        let def: ToolDefinition = serde_json::from_str(json).unwrap();

        assert!(def.supports(Capability::Vision));
        assert!(!def.supports(Capability::Hearing));
        assert_eq!(def.cost, CostEstimate::default());
    }
}
