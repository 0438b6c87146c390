//! Health, liveness, and readiness endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use super::AppState;
use crate::network::HealthState;

/// Plain-text banner at `GET /`.
pub async fn banner_handler() -> &'static str {
    "Mediator server is running."
}

/// Detailed health information.
///
/// Always 200; the `state` field tells a draining server apart from a
/// healthy one.
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "state": state.shutdown.health_state().as_str(),
        "units": state.engine.registry().unit_names(),
        "routes": state.passthrough_routes,
        "rules": state.engine.rule_names().len(),
        "pending": state.requesting.pending(),
        "in_flight": state.shutdown.in_flight_count(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// Liveness probe: 200 while the process answers at all.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe: 200 only in the `Ready` state.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state() == HealthState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use super::*;
    use crate::engine::Engine;
    use crate::network::{NetworkConfig, ShutdownController};
    use crate::requesting::RequestingUnit;
    use crate::service::config::ServerConfig;
    use crate::service::registry::{UnitDeps, UnitRegistry};

    fn test_state() -> AppState {
        let registry = Arc::new(UnitRegistry::new());
        let requesting = Arc::new(RequestingUnit::new(&UnitDeps::in_memory()));
        registry.register(Arc::clone(&requesting));
        AppState {
            engine: Engine::new(registry, &ServerConfig::default()),
            requesting,
            shutdown: Arc::new(ShutdownController::new()),
            config: Arc::new(NetworkConfig::default()),
            passthrough_routes: 3,
            start_time: Instant::now(),
        }
    }

    #[tokio::test]
    async fn health_reports_every_field() {
        let state = test_state();
        state.shutdown.set_ready();
        state.requesting.open("/x", json!({}));
        let _guard = state.shutdown.in_flight_guard();

        let json = health_handler(State(state)).await.0;
        assert_eq!(json["state"], "ready");
        assert_eq!(json["units"], json!(["Requesting"]));
        assert_eq!(json["routes"], 3);
        assert_eq!(json["pending"], 1);
        assert_eq!(json["in_flight"], 1);
        assert!(json["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn health_reports_draining() {
        let state = test_state();
        state.shutdown.set_ready();
        state.shutdown.trigger_shutdown();
        assert_eq!(health_handler(State(state)).await.0["state"], "draining");
    }

    #[tokio::test]
    async fn liveness_always_ok() {
        assert_eq!(liveness_handler().await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_follows_health_state() {
        let state = test_state();
        assert_eq!(readiness_handler(State(state.clone())).await, StatusCode::SERVICE_UNAVAILABLE);
        state.shutdown.set_ready();
        assert_eq!(readiness_handler(State(state.clone())).await, StatusCode::OK);
        state.shutdown.trigger_shutdown();
        assert_eq!(readiness_handler(State(state)).await, StatusCode::SERVICE_UNAVAILABLE);
    }
}
