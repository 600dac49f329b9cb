//! Analysis model selection.
//!
//! Candidates are tried in order until the catalog resolves one:
//! 1. the explicitly configured model,
//! 2. the session's current model, unless its provider bills per request
//!    and would make background analysis cost-prohibitive,
//! 3. a fixed priority list of cheap models, filtered to providers the host
//!    reports as authenticated.

use std::sync::Arc;

use async_trait::async_trait;
use dcp_core::{ModelRef, PruneError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Providers never used for background analysis even when the session
/// runs on them.
pub const DISALLOWED_SESSION_PROVIDERS: &[&str] = &["github-copilot"];

/// Fallback models in priority order.
pub const FALLBACK_MODELS: &[(&str, &str)] = &[
    ("openai", "gpt-5-mini"),
    ("anthropic", "claude-haiku-4-5"),
    ("google", "gemini-2.5-flash"),
    ("deepseek", "deepseek-chat"),
    ("xai", "grok-4-fast"),
    ("openrouter", "openai/gpt-5-mini"),
];

/// Where the selected model came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionSource {
    /// `model` setting.
    Config,
    /// The session's current model.
    Session,
    /// The fallback priority list.
    Fallback,
}

/// A resolved, usable model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelHandle {
    /// Provider/model pair.
    pub model: ModelRef,
    /// Base URL of an `OpenAI`-compatible endpoint serving the model.
    pub base_url: String,
    /// Bearer credential, if the endpoint needs one.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// How the model was chosen.
    pub source: SelectionSource,
}

/// Host-provided model registry and credential store.
#[async_trait]
pub trait ModelCatalog: Send + Sync {
    /// Provider ids that currently have credentials.
    async fn authenticated_providers(&self) -> Vec<String>;

    /// Resolve a model into a usable handle (source is filled in by the
    /// selector).
    async fn resolve(&self, model: &ModelRef) -> Result<ModelHandle, String>;
}

/// Picks the analysis model.
pub struct ModelSelector {
    catalog: Arc<dyn ModelCatalog>,
    configured: Option<ModelRef>,
    strict: bool,
}

impl ModelSelector {
    /// Create a selector. With `strict`, a configured model that fails to
    /// resolve fails selection instead of falling through.
    pub fn new(catalog: Arc<dyn ModelCatalog>, configured: Option<ModelRef>, strict: bool) -> Self {
        Self {
            catalog,
            configured,
            strict,
        }
    }

    /// Select a model, given the session's current model if known.
    pub async fn select(&self, session_model: Option<&ModelRef>) -> Result<ModelHandle, PruneError> {
        let mut failures: Vec<String> = Vec::new();

        if let Some(configured) = &self.configured {
            match self.try_resolve(configured, SelectionSource::Config).await {
                Ok(handle) => return Ok(handle),
                Err(e) if self.strict => {
                    return Err(PruneError::ModelUnavailable(format!(
                        "configured model {configured} failed and strict selection is on: {e}"
                    )));
                }
                Err(e) => failures.push(format!("{configured}: {e}")),
            }
        }

        if let Some(session) = session_model {
            if is_disallowed(&session.provider_id) {
                debug!(model = %session, "skipping session model from disallowed provider");
            } else {
                match self.try_resolve(session, SelectionSource::Session).await {
                    Ok(handle) => return Ok(handle),
                    Err(e) => failures.push(format!("{session}: {e}")),
                }
            }
        }

        let authenticated = self.catalog.authenticated_providers().await;
        for (provider, model) in FALLBACK_MODELS {
            if !authenticated.iter().any(|p| p == provider) {
                continue;
            }
            let candidate = ModelRef::new(provider, model);
            match self.try_resolve(&candidate, SelectionSource::Fallback).await {
                Ok(handle) => return Ok(handle),
                Err(e) => failures.push(format!("{candidate}: {e}")),
            }
        }

        if failures.is_empty() {
            failures.push("no authenticated fallback provider".into());
        }
        Err(PruneError::ModelUnavailable(failures.join("; ")))
    }

    async fn try_resolve(
        &self,
        model: &ModelRef,
        source: SelectionSource,
    ) -> Result<ModelHandle, String> {
        match self.catalog.resolve(model).await {
            Ok(mut handle) => {
                handle.source = source;
                debug!(model = %model, ?source, "analysis model selected");
                Ok(handle)
            }
            Err(e) => {
                warn!(model = %model, ?source, error = %e, "analysis model unavailable");
                Err(e)
            }
        }
    }
}

fn is_disallowed(provider: &str) -> bool {
    DISALLOWED_SESSION_PROVIDERS
        .iter()
        .any(|p| p.eq_ignore_ascii_case(provider))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
