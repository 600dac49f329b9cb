//! Engine facade.
//!
//! One [`PruneEngine`] per host process. It owns the shared state (settings,
//! prune store, tracker, parameter cache) and hands the same `Arc`s to the
//! janitor, the request rewriter and the range handler, so a prune made by
//! any of them is visible to the next outbound request.

use std::sync::Arc;
use std::time::Duration;

use dcp_core::{PruneError, Result, SessionMessage};
use dcp_llm::{HttpDecider, ModelCatalog, ModelSelector, PruneDecider};
use dcp_settings::{PruneSettings, resolve_state_dir};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::host::SessionHost;
use crate::janitor::{Janitor, JanitorDeps, PruneOutcome};
use crate::notification::{Notifier, TracingNotifier};
use crate::rewriter::RequestRewriter;
use crate::squash::{RangeHandler, RangeOutcome, render_squashed};
use crate::state::{JsonFilePersister, PruneStateStore, StatePersister};
use crate::tool_cache::ToolParameterCache;
use crate::tracker::{ToolResultTracker, TrackerSnapshot};
use crate::transport::{InterceptingTransport, PruningInterceptor};

/// Default time [`PruneEngine::shutdown`] waits for idle passes.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything the engine needs from the host.
pub struct EngineDeps {
    /// Engine settings.
    pub settings: PruneSettings,
    /// Transcript source.
    pub host: Arc<dyn SessionHost>,
    /// Model registry for analysis model selection.
    pub catalog: Arc<dyn ModelCatalog>,
    /// Decision call.
    pub decider: Arc<dyn PruneDecider>,
    /// Summary sink.
    pub notifier: Arc<dyn Notifier>,
    /// Prune state persistence.
    pub persister: Arc<dyn StatePersister>,
}

/// Wired pruning engine.
pub struct PruneEngine {
    settings: Arc<PruneSettings>,
    host: Arc<dyn SessionHost>,
    store: Arc<PruneStateStore>,
    tracker: Arc<ToolResultTracker>,
    cache: Arc<ToolParameterCache>,
    janitor: Arc<Janitor>,
    ranges: RangeHandler,
    idle_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PruneEngine {
    /// Wire an engine from explicit collaborators.
    pub fn new(deps: EngineDeps) -> Self {
        let settings = Arc::new(deps.settings);
        let store = Arc::new(PruneStateStore::new(deps.persister));
        let tracker = Arc::new(ToolResultTracker::new());
        let cache = Arc::new(ToolParameterCache::new(settings.tool_cache_capacity));

        let selector = ModelSelector::new(
            deps.catalog,
            settings.model_ref(),
            settings.strict_model_selection,
        );
        let janitor = Arc::new(Janitor::new(JanitorDeps {
            settings: Arc::clone(&settings),
            host: Arc::clone(&deps.host),
            store: Arc::clone(&store),
            tracker: Arc::clone(&tracker),
            cache: Arc::clone(&cache),
            selector,
            decider: deps.decider,
            notifier: Arc::clone(&deps.notifier),
        }));
        let ranges = RangeHandler::new(
            Arc::clone(&settings),
            Arc::clone(&deps.host),
            Arc::clone(&store),
            Arc::clone(&tracker),
            deps.notifier,
        );

        Self {
            settings,
            host: deps.host,
            store,
            tracker,
            cache,
            janitor,
            ranges,
            idle_tasks: Mutex::new(Vec::new()),
        }
    }

    /// Wire an engine with file persistence under the configured state
    /// directory, the HTTP decider and log-only notifications.
    pub fn from_settings(
        settings: PruneSettings,
        host: Arc<dyn SessionHost>,
        catalog: Arc<dyn ModelCatalog>,
    ) -> Result<Self> {
        let state_dir = resolve_state_dir(&settings);
        let decider = HttpDecider::new().map_err(PruneError::from)?;
        info!(state_dir = %state_dir.display(), "pruning engine initialized");
        Ok(Self::new(EngineDeps {
            settings,
            host,
            catalog,
            decider: Arc::new(decider),
            notifier: Arc::new(TracingNotifier),
            persister: Arc::new(JsonFilePersister::new(state_dir)),
        }))
    }

    /// Engine settings.
    pub fn settings(&self) -> &PruneSettings {
        &self.settings
    }

    /// Shared prune state.
    pub fn store(&self) -> &Arc<PruneStateStore> {
        &self.store
    }

    /// The analysis orchestrator.
    pub fn janitor(&self) -> &Arc<Janitor> {
        &self.janitor
    }

    /// Tracker counters.
    pub fn tracker_snapshot(&self) -> TrackerSnapshot {
        self.tracker.snapshot()
    }

    /// A rewriter sharing this engine's state.
    pub fn rewriter(&self) -> RequestRewriter {
        RequestRewriter::new(
            Arc::clone(&self.settings),
            Arc::clone(&self.store),
            Arc::clone(&self.tracker),
            Arc::clone(&self.cache),
        )
    }

    /// An interceptor sharing this engine's state.
    pub fn interceptor(&self) -> PruningInterceptor {
        PruningInterceptor::new(Arc::clone(&self.host), Arc::clone(&self.store), self.rewriter())
    }

    /// Wrap `client` so every JSON body is rewritten before it is sent.
    pub fn transport(&self, client: reqwest::Client) -> InterceptingTransport {
        InterceptingTransport::new(client, Arc::new(self.interceptor()))
    }

    /// Session went idle: run analysis in the background.
    pub fn session_idle(&self, session_id: &str) {
        let handle = self.janitor.spawn_idle(session_id.to_owned());
        let mut tasks = self.idle_tasks.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
    }

    /// The agent called the prune tool.
    pub async fn prune_tool(
        &self,
        session_id: &str,
        reason: Option<String>,
    ) -> Result<Option<PruneOutcome>> {
        self.janitor.on_prune_tool(session_id, reason).await
    }

    /// The agent called the squash tool.
    pub async fn squash_tool(
        &self,
        session_id: &str,
        start: &str,
        end: &str,
        summary: &str,
    ) -> Result<RangeOutcome> {
        self.ranges.squash(session_id, start, end, summary).await
    }

    /// The agent called the discard tool.
    pub async fn discard_tool(&self, session_id: &str, start: &str, end: &str) -> Result<RangeOutcome> {
        self.ranges.discard(session_id, start, end).await
    }

    /// Messages as they should be displayed, with squashed spans collapsed.
    pub async fn display_messages(&self, session_id: &str) -> Result<Vec<SessionMessage>> {
        let messages = self.host.messages(session_id).await?;
        let state = self.store.get_state(session_id).await;
        Ok(render_squashed(&messages, &state))
    }

    /// Wait for in-flight idle passes, up to `timeout`.
    pub async fn shutdown(&self, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        let handles = std::mem::take(&mut *self.idle_tasks.lock());
        if handles.is_empty() {
            return;
        }
        info!(task_count = handles.len(), "waiting for idle analysis");
        let drain = futures::future::join_all(handles);
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!("idle analysis still running after {timeout:?}");
        }
    }
}
