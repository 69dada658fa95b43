//! Credential lookup for catalog tools.

use std::collections::HashMap;

use tracing::debug;

use crate::agent::Invoker;
use crate::Result;

use super::ToolDefinition;

/// A usable token for one tool, along with who pays for calls made with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,

    /// Identity charged for usage under this credential.
    pub payer_id: String,

    /// Charged in credits (platform key) or flat (invoker's own key).
    pub uses_credits: bool,
}

/// Resolves a usable credential for a tool on behalf of an invoker.
///
/// `Ok(None)` means "no credential for this tool"; an `Err` is a failed
/// lookup. Callers treat both as "try the next candidate".
pub trait CredentialResolver: Send + Sync {
    fn resolve_credential(&self, invoker: &Invoker, tool: &ToolDefinition) -> Result<Option<Credential>>;
}

/// Resolves credentials from the invoker's own keys, then platform keys from config.
#[derive(Debug, Clone, Default)]
pub struct ConfigCredentialResolver {
    platform_keys: HashMap<String, String>,
}

impl ConfigCredentialResolver {
    pub fn new(platform_keys: HashMap<String, String>) -> Self {
        Self { platform_keys }
    }
}

impl CredentialResolver for ConfigCredentialResolver {
    fn resolve_credential(&self, invoker: &Invoker, tool: &ToolDefinition) -> Result<Option<Credential>> {
        if let Some(token) = invoker.api_keys.get(&tool.provider).filter(|t| !t.is_empty()) {
            debug!(tool = %tool.id, invoker = %invoker.id, "Using invoker's own key");
            return Ok(Some(Credential {
                token: token.clone(),
                payer_id: invoker.id.clone(),
                uses_credits: false,
            }));
        }

        Ok(self
            .platform_keys
            .get(&tool.provider)
            .filter(|t| !t.is_empty())
            .map(|token| Credential {
                token: token.clone(),
                payer_id: invoker.payer_id().to_string(),
                uses_credits: true,
            }))
    }
}
