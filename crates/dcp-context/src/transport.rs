//! Request interception for the outbound transport.
//!
//! [`InterceptingTransport`] owns a `reqwest::Client` and hands every JSON
//! body to a [`RequestInterceptor`] before sending. Headers, authentication
//! and retries stay with the caller.

use std::sync::Arc;

use async_trait::async_trait;
use dcp_core::Result;
use reqwest::header::HeaderMap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::host::SessionHost;
use crate::rewriter::{RequestRewriter, RewriteReport, RewriteScope};
use crate::state::PruneStateStore;

/// Middleware that may rewrite a request body before it is sent.
#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    /// Rewrite `body` for the request made on behalf of `session_id`.
    async fn intercept(&self, session_id: Option<&str>, body: &mut Value) -> Result<RewriteReport>;
}

/// Interceptor that applies prune state.
///
/// Async preparation happens first (learning whether the session is a
/// subagent, restoring its state); the rewrite itself is synchronous.
pub struct PruningInterceptor {
    host: Arc<dyn SessionHost>,
    store: Arc<PruneStateStore>,
    rewriter: RequestRewriter,
}

impl PruningInterceptor {
    /// Create an interceptor.
    pub fn new(
        host: Arc<dyn SessionHost>,
        store: Arc<PruneStateStore>,
        rewriter: RequestRewriter,
    ) -> Self {
        Self {
            host,
            store,
            rewriter,
        }
    }

    async fn prepare(&self, session_id: &str) -> Result<()> {
        if self.store.is_subagent(session_id).is_none() {
            let info = self.host.session_info(session_id).await?;
            self.store.note_session_kind(session_id, info.is_subagent());
        }
        let _ = self.store.get(session_id).await;
        Ok(())
    }
}

#[async_trait]
impl RequestInterceptor for PruningInterceptor {
    async fn intercept(&self, session_id: Option<&str>, body: &mut Value) -> Result<RewriteReport> {
        let scope = match session_id {
            Some(id) => {
                self.prepare(id).await?;
                RewriteScope::Session(id)
            }
            None => RewriteScope::AllSessions,
        };
        Ok(self.rewriter.rewrite(scope, body))
    }
}

/// HTTP client whose JSON bodies pass through an interceptor.
#[derive(Clone)]
pub struct InterceptingTransport {
    client: reqwest::Client,
    interceptor: Arc<dyn RequestInterceptor>,
}

impl InterceptingTransport {
    /// Wrap `client`.
    pub fn new(client: reqwest::Client, interceptor: Arc<dyn RequestInterceptor>) -> Self {
        Self {
            client,
            interceptor,
        }
    }

    /// The wrapped client.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// POST a JSON body after interception.
    ///
    /// Interception failures are logged and the body is sent as built by
    /// the caller.
    pub async fn post_json(
        &self,
        url: &str,
        session_id: Option<&str>,
        headers: HeaderMap,
        body: Value,
    ) -> std::result::Result<reqwest::Response, reqwest::Error> {
        let mut rewritten = body.clone();
        let body = match self.interceptor.intercept(session_id, &mut rewritten).await {
            Ok(report) => {
                debug!(url, replaced = report.replaced, "request intercepted");
                rewritten
            }
            Err(e) => {
                warn!(url, session_id, error = %e, "interceptor failed, sending original body");
                body
            }
        };
        self.client
            .post(url)
            .headers(headers)
            .json(&body)
            .send()
            .await
    }
}
