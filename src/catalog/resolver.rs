//! Tool choice - picks the first catalog tool the invoker can actually use.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::agent::Invoker;

use super::{Capability, CredentialResolver, ToolCatalog, ToolDefinition};

/// A catalog tool bound to a credential and billing context for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfiguredTool {
    pub definition: ToolDefinition,
    pub token: String,

    /// Capability this tool was resolved for.
    pub purpose: Capability,

    pub invoker_id: String,
    pub payer_id: String,

    /// Billed in credits rather than flat.
    pub uses_credits: bool,
}

impl ConfiguredTool {
    #[inline]
    pub fn id(&self) -> &str {
        &self.definition.id
    }
}

/// Ordered fallback over the catalog: preferred tool, default tool, then the rest.
pub struct ToolChoiceResolver {
    catalog: Arc<ToolCatalog>,
    credentials: Arc<dyn CredentialResolver>,
}

impl ToolChoiceResolver {
    pub fn new(catalog: Arc<ToolCatalog>, credentials: Arc<dyn CredentialResolver>) -> Self {
        Self { catalog, credentials }
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    /// Candidates in priority order, each tool at most once.
    pub fn candidates(
        &self,
        capability: Capability,
        preferred: Option<&str>,
        default: Option<&str>,
    ) -> Vec<&ToolDefinition> {
        let requested = [preferred, default]
            .into_iter()
            .flatten()
            .filter_map(|id| match self.catalog.get(id) {
                Some(tool) if tool.supports(capability) => Some(tool),
                Some(_) => {
                    debug!(tool = %id, %capability, "Requested tool lacks capability");
                    None
                }
                None => {
                    debug!(tool = %id, "Requested tool not in catalog");
                    None
                }
            });

        let mut ordered: Vec<&ToolDefinition> = Vec::new();
        for tool in requested.chain(self.catalog.supporting(capability)) {
            if !ordered.iter().any(|t| t.id == tool.id) {
                ordered.push(tool);
            }
        }
        ordered
    }

    /// Resolve the first candidate with a usable credential.
    pub fn resolve(
        &self,
        invoker: &Invoker,
        capability: Capability,
        preferred: Option<&str>,
        default: Option<&str>,
    ) -> Option<ConfiguredTool> {
        for tool in self.candidates(capability, preferred, default) {
            match self.credentials.resolve_credential(invoker, tool) {
                Ok(Some(credential)) => {
                    info!(tool = %tool.id, %capability, payer = %credential.payer_id, "Resolved tool");
                    return Some(ConfiguredTool {
                        definition: tool.clone(),
                        token: credential.token,
                        purpose: capability,
                        invoker_id: invoker.id.clone(),
                        payer_id: credential.payer_id,
                        uses_credits: credential.uses_credits,
                    });
                }
                Ok(None) => debug!(tool = %tool.id, "No credential, trying next"),
                Err(e) => warn!(tool = %tool.id, error = %e, "Credential lookup failed, trying next"),
            }
        }

        info!(%capability, invoker = %invoker.id, "No credentialed tool available");
        None
    }
}
