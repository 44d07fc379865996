//! HTTP API gateway for Stepweave.
//!
//! Exposes workflow runs over HTTP: one-shot runs returning the final memory,
//! Server-Sent Event streams of run events, cancellation by run id, and
//! health/status listings.
//!
//! Built on Axum for high performance async HTTP.

pub mod api;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

use stepweave_config::AppConfig;
use stepweave_core::provider::{GenerateOptions, ModelBackend};
use stepweave_workflow::{RunBridge, WorkflowDefinition, WorkflowRunner};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub bridge: Arc<RunBridge>,
    /// Workflow used when a request carries no body.
    pub default_workflow: WorkflowDefinition,
    /// SSE keep-alive interval.
    pub poll_interval: Duration,
    pub start_time: chrono::DateTime<chrono::Utc>,
    /// Source of keys, endpoints and generation defaults for backends
    /// picked per request.
    pub config: AppConfig,
}

pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    pub fn new(bridge: Arc<RunBridge>, default_workflow: WorkflowDefinition) -> Self {
        Self {
            bridge,
            default_workflow,
            poll_interval: Duration::from_millis(1000),
            start_time: chrono::Utc::now(),
            config: AppConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// A bridge over the named backend sharing this gateway's run registry,
    /// so its runs are listed and cancellable like any other.
    pub fn bridge_for_backend(
        &self,
        name: &str,
    ) -> Result<Arc<RunBridge>, stepweave_config::ConfigError> {
        let backend = stepweave_providers::build_named(name, &self.config)?;
        let runner = build_runner(&self.config, backend);
        Ok(Arc::new(
            RunBridge::new(Arc::new(runner))
                .with_registry(self.bridge.registry().clone())
                .with_event_buffer(self.config.gateway.event_buffer),
        ))
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Assemble the state from configuration around an already-built backend.
    pub fn from_config(
        config: &AppConfig,
        backend: Arc<dyn ModelBackend>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let runner = build_runner(config, backend);
        let bridge = RunBridge::new(Arc::new(runner)).with_event_buffer(config.gateway.event_buffer);

        let default_workflow = match &config.workflow.path {
            Some(path) => WorkflowDefinition::load(path)?,
            None => WorkflowDefinition::bundled()?,
        };

        Ok(Self::new(Arc::new(bridge), default_workflow)
            .with_poll_interval(Duration::from_millis(config.gateway.poll_interval_ms))
            .with_config(config.clone()))
    }
}

/// A runner over `backend` with the built-in tools and the configured
/// generation defaults.
pub fn build_runner(config: &AppConfig, backend: Arc<dyn ModelBackend>) -> WorkflowRunner {
    let options = GenerateOptions {
        model: Some(config.default_model.clone()),
        max_tokens: Some(config.default_max_tokens),
        temperature: Some(config.default_temperature),
        mode: None,
    };
    WorkflowRunner::new(backend, Arc::new(stepweave_tools::default_registry()))
        .with_options(options)
        .with_max_iters(config.react.max_iters)
}

/// CORS policy from the configured origins; an empty list allows any origin.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    if allowed_origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(origins))
}

/// Build the full router with CORS, a body limit, and HTTP trace logging.
pub fn build_router(state: SharedState, allowed_origins: &[String]) -> Router {
    api::api_router(state)
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1 MB body limit
        .layer(cors_layer(allowed_origins))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
pub async fn start(
    config: AppConfig,
    backend: Arc<dyn ModelBackend>,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let state = Arc::new(GatewayState::from_config(&config, backend)?);
    let backend_name = state.bridge.runner().backend_name().to_string();
    let app = build_router(state, &config.gateway.allowed_origins);

    info!(addr = %addr, backend = %backend_name, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use stepweave_providers::MockBackend;
    use tower::ServiceExt;

    fn test_state() -> SharedState {
        Arc::new(GatewayState::from_config(&AppConfig::default(), Arc::new(MockBackend::new())).unwrap())
    }

    #[test]
    fn state_from_default_config() {
        let state = test_state();
        assert_eq!(state.poll_interval, Duration::from_millis(1000));
        assert_eq!(state.default_workflow.steps.len(), 3);
        assert_eq!(state.bridge.runner().backend_name(), "mock");
    }

    #[test]
    fn state_from_config_with_missing_workflow_file() {
        let mut config = AppConfig::default();
        config.workflow.path = Some("/nonexistent/workflow.json".into());
        assert!(GatewayState::from_config(&config, Arc::new(MockBackend::new())).is_err());
    }

    #[test]
    fn per_request_bridge_shares_registry() {
        let state = test_state();
        let bridge = state.bridge_for_backend("echo").unwrap();
        assert_eq!(bridge.runner().backend_name(), "echo");
        assert!(Arc::ptr_eq(bridge.registry(), state.bridge.registry()));
        assert!(state.bridge_for_backend("nonesuch").is_err());
    }

    #[tokio::test]
    async fn health_through_full_router() {
        let app = build_router(test_state(), &[]);
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn cors_allows_configured_origin() {
        let app = build_router(test_state(), &["http://localhost:3000".to_string()]);
        let req = Request::builder()
            .uri("/health")
            .header("origin", "http://localhost:3000")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("http://localhost:3000")
        );
    }

    #[tokio::test]
    async fn cors_any_origin_by_default() {
        let app = build_router(test_state(), &[]);
        let req = Request::builder()
            .uri("/health")
            .header("origin", "http://example.com")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("*")
        );
    }
}
