//! Health check endpoint
//!
//! Provides a simple health check for monitoring and load balancers, plus the
//! cascade shape of every tool.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::handlers::AppState;

/// Cascade summary of one tool
#[derive(Debug, Serialize)]
pub struct ToolHealth {
    /// False when the primary model is missing; requests get a 500
    pub configured: bool,
    /// Number of model attempts in the cascade
    pub attempts: usize,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "OK" when every tool is configured, "degraded" otherwise
    pub status: &'static str,
    pub tools: BTreeMap<&'static str, ToolHealth>,
}

/// Health check handler
///
/// Always returns 200 OK; an unconfigured tool is reported, not treated as
/// the process being down.
pub async fn handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let tools: BTreeMap<_, _> = state
        .tools()
        .map(|(tool, runtime)| {
            (
                tool.as_str(),
                ToolHealth {
                    configured: runtime.cascade.is_configured(),
                    attempts: runtime.cascade.attempts().len(),
                },
            )
        })
        .collect();

    let status = if tools.values().all(|t| t.configured) {
        "OK"
    } else {
        "degraded"
    };

    (StatusCode::OK, Json(HealthResponse { status, tools }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_health_reports_unconfigured_tools() {
        let config = Arc::new(Config::builtin().expect("builtin config"));
        let state = AppState::from_parts(config, Vec::new()).expect("should create AppState");

        let (status, Json(body)) = handler(State(state)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "degraded");
        assert_eq!(body.tools.len(), 4);
        assert!(!body.tools["format"].configured);
        assert_eq!(body.tools["oracle-query-cleaner"].attempts, 0);
    }
}
