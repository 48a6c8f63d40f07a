//! HTTP request handlers for formatter-relay

use crate::cascade::{Cascade, ModelAttempt};
use crate::config::{Config, EnvSource, ProcessEnv};
use crate::error::{AppError, AppResult};
use crate::metrics::Metrics;
use crate::middleware::request_id_middleware;
use crate::provider::{ChatProvider, OpenAiProvider};
use crate::tools::{
    Formatter, OracleOptimizer, PlanExplainer, QueryCleaner, Tool, ToolKind, ToolSettings,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod extractor;
pub mod health;
pub mod metrics;
pub mod tools;

/// A tool's generation settings and its model cascade
#[derive(Debug, Clone)]
pub struct ToolRuntime {
    pub settings: ToolSettings,
    pub cascade: Cascade,
}

/// Application state shared across all handlers
///
/// Built once at startup and never mutated. All fields are Arc'd for cheap
/// cloning across Axum handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    tools: Arc<BTreeMap<ToolKind, ToolRuntime>>,
    metrics: Arc<Metrics>,
}

impl AppState {
    /// Create AppState from configuration, resolving against the process environment
    ///
    /// # Errors
    /// Returns an error if a provider client cannot be built or metrics
    /// registration fails.
    pub fn new(config: Arc<Config>) -> AppResult<Self> {
        Self::from_env(config, &ProcessEnv)
    }

    /// Create AppState resolving environment indirections against `env`
    pub fn from_env(config: Arc<Config>, env: &dyn EnvSource) -> AppResult<Self> {
        let establish_timeout = config.server.establish_timeout();

        let providers = config.resolve_providers(env);
        let mut clients: BTreeMap<String, Arc<dyn ChatProvider>> = BTreeMap::new();
        for (name, resolved) in &providers {
            let provider = OpenAiProvider::new(resolved, establish_timeout)?;
            clients.insert(name.clone(), Arc::new(provider));
        }

        let mut cascades = Vec::with_capacity(ToolKind::ALL.len());
        for tool in ToolKind::ALL {
            let plan = config.resolve_tool(tool, &providers, env);
            let attempts = plan
                .attempts
                .iter()
                .filter_map(|a| {
                    clients
                        .get(&a.provider)
                        .map(|client| ModelAttempt::new(client.clone(), a.model.clone()))
                })
                .collect::<Vec<_>>();

            tracing::info!(
                tool = %tool,
                configured = !attempts.is_empty(),
                attempts = attempts.len(),
                models = ?plan
                    .attempts
                    .iter()
                    .map(|a| format!("{}/{}", a.provider, a.model))
                    .collect::<Vec<_>>(),
                "Tool cascade resolved"
            );
            cascades.push(Cascade::new(tool, attempts, establish_timeout));
        }

        Self::from_parts(config, cascades)
    }

    /// Create AppState from prebuilt cascades
    ///
    /// Tools without a cascade in `cascades` are unconfigured.
    pub fn from_parts(config: Arc<Config>, cascades: Vec<Cascade>) -> AppResult<Self> {
        let metrics = Metrics::new()
            .map_err(|e| AppError::Internal(format!("failed to register metrics: {e}")))?;
        let establish_timeout = config.server.establish_timeout();

        let mut by_tool: BTreeMap<ToolKind, Cascade> =
            cascades.into_iter().map(|c| (c.tool(), c)).collect();

        let tools = ToolKind::ALL
            .into_iter()
            .map(|tool| {
                let cascade = by_tool
                    .remove(&tool)
                    .unwrap_or_else(|| Cascade::new(tool, Vec::new(), establish_timeout));
                let runtime = ToolRuntime {
                    settings: config.tool_settings(tool),
                    cascade,
                };
                (tool, runtime)
            })
            .collect();

        Ok(Self {
            config,
            tools: Arc::new(tools),
            metrics: Arc::new(metrics),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Runtime of `tool`; every tool has one, configured or not
    pub fn tool(&self, tool: ToolKind) -> Option<&ToolRuntime> {
        self.tools.get(&tool)
    }

    pub fn tools(&self) -> impl Iterator<Item = (&ToolKind, &ToolRuntime)> {
        self.tools.iter()
    }
}

fn tool_route<T: Tool + 'static>(router: Router<AppState>) -> Router<AppState> {
    router.route(&T::KIND.path(), post(tools::handle::<T>))
}

/// Build the HTTP application
pub fn router(state: AppState) -> Router {
    let body_limit = state.config().server.max_body_bytes;

    let router = Router::new()
        .route("/health", get(health::handler))
        .route("/metrics", get(metrics::handler));
    let router = tool_route::<Formatter>(router);
    let router = tool_route::<OracleOptimizer>(router);
    let router = tool_route::<PlanExplainer>(router);
    let router = tool_route::<QueryCleaner>(router);

    router
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id_middleware))
}
