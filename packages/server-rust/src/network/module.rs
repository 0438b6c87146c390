//! Network module with deferred startup.
//!
//! `new()` checks the wiring, `start()` binds the listener, and `serve()`
//! accepts connections until the shutdown future resolves.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::handlers::{
    banner_handler, health_handler, liveness_handler, mediated_handler, passthrough_handler,
    readiness_handler, AppState,
};
use super::middleware::build_http_layers;
use super::passthrough::{RouteAccess, RoutePolicy};
use super::shutdown::ShutdownController;
use crate::engine::Engine;
use crate::requesting::RequestingUnit;

/// Owns the HTTP server lifecycle.
pub struct NetworkModule {
    config: NetworkConfig,
    engine: Engine,
    policy: RoutePolicy,
    requesting: Arc<RequestingUnit>,
    listener: Option<TcpListener>,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    /// # Errors
    ///
    /// Fails when the engine's registry has no Requesting unit, since
    /// mediated routes cannot be answered without it.
    pub fn new(config: NetworkConfig, engine: Engine, policy: RoutePolicy) -> anyhow::Result<Self> {
        let requesting = engine
            .registry()
            .get::<RequestingUnit>()
            .ok_or_else(|| anyhow!("the Requesting unit is not registered"))?;
        Ok(Self {
            config,
            engine,
            policy,
            requesting,
            listener: None,
            shutdown: Arc::new(ShutdownController::new()),
        })
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Assembles the router.
    ///
    /// - `GET /`, `GET /health`, `GET /health/live`, `GET /health/ready`
    /// - `POST {base}/{unit}/{operation}` for every passthrough operation
    /// - `POST {base}/{*path}` for everything else, through the mediator
    pub fn build_router(&self) -> Router {
        let base = self.config.base();
        let mut router: Router<AppState> = Router::new();
        let mut mounted = 0;

        for descriptor in self.engine.registry().descriptors() {
            let route = format!("{base}/{}/{}", descriptor.unit_name, descriptor.operation_name);
            match self.policy.classify(&route) {
                RouteAccess::Excluded => {
                    info!(route = %route, "mediated route");
                    continue;
                }
                RouteAccess::Included(reason) => info!(reason = %reason, "POST {route}"),
                RouteAccess::Unlisted => warn!("POST {route} (unverified passthrough)"),
            }
            let (unit, operation) = (descriptor.unit_name, descriptor.operation_name);
            router = router.route(
                &route,
                post(move |State(state): State<AppState>, body: Bytes| {
                    passthrough_handler(state, unit, operation, body)
                }),
            );
            mounted += 1;
        }

        let state = AppState {
            engine: self.engine.clone(),
            requesting: Arc::clone(&self.requesting),
            shutdown: Arc::clone(&self.shutdown),
            config: Arc::new(self.config.clone()),
            passthrough_routes: mounted,
            start_time: Instant::now(),
        };

        router
            .route(&format!("{base}/{{*path}}"), post(mediated_handler))
            .route("/", get(banner_handler))
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .layer(build_http_layers(&self.config))
            .with_state(state)
    }

    /// Binds the listener and returns the bound port (useful with port 0).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();
        info!("listening on http://{}:{}{}", self.config.host, port, self.config.base());
        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves until `shutdown` resolves, then drains.
    ///
    /// After the signal the health state moves to `Draining`, open
    /// connections finish, and in-flight requests get up to
    /// `drain_timeout` before the server reports `Stopped`.
    ///
    /// # Errors
    ///
    /// Fails if `start()` was not called first or on a fatal I/O error.
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
        let router = self.build_router();
        let listener = self
            .listener
            .ok_or_else(|| anyhow!("start() must be called before serve()"))?;
        let controller = self.shutdown;

        controller.set_ready();
        let signalled = Arc::clone(&controller);
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                info!("shutdown requested, draining");
                signalled.trigger_shutdown();
            })
            .await?;

        controller.trigger_shutdown();
        if controller.wait_for_drain(self.config.drain_timeout).await {
            info!("all requests drained");
        } else {
            warn!(
                in_flight = controller.in_flight_count(),
                "drain timeout expired with requests in flight"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::service::config::ServerConfig;
    use crate::service::operation::OperationDescriptor;
    use crate::service::registry::{Unit, UnitDeps, UnitRegistry};
    use crate::syncs::{all_syncs, route_sync};
    use crate::service::operation::UnitError;
    use crate::units::catalog;

    /// `create(dto)` and `remove(id, ownerId)`.
    #[derive(Default)]
    struct Catalog {
        removed: Mutex<Vec<Vec<Value>>>,
    }

    impl Unit for Catalog {
        fn name(&self) -> &'static str {
            "Catalog"
        }

        fn operations(self: Arc<Self>) -> Vec<OperationDescriptor> {
            let unit = Arc::clone(&self);
            vec![
                OperationDescriptor::new("Catalog", "create", 1, |args: Vec<Value>| async move {
                    match args.first() {
                        Some(Value::Object(dto)) if dto.contains_key("name") => {
                            Ok(json!({ "id": crate::storage::fresh_id() }))
                        }
                        _ => Err(UnitError::rejected("name is required")),
                    }
                }),
                OperationDescriptor::new("Catalog", "remove", 2, move |args: Vec<Value>| {
                    let unit = Arc::clone(&unit);
                    async move {
                        unit.removed.lock().push(args);
                        Ok(json!({}))
                    }
                }),
            ]
        }
    }

    struct App {
        router: Router,
        catalog: Arc<Catalog>,
        module: NetworkModule,
    }

    fn app(request_timeout: Duration) -> App {
        let registry = Arc::new(UnitRegistry::new());
        catalog().load(&UnitDeps::in_memory(), &registry);
        let catalog = Arc::new(Catalog::default());
        registry.register(Arc::clone(&catalog));

        let engine = Engine::new(registry, &ServerConfig::default());
        engine.register(all_syncs());
        engine.register([route_sync("/Boom/explode", |_ctx, _body| async move {
            Err::<Value, _>(UnitError::rejected("Boom went the handler."))
        })]);

        let config = NetworkConfig {
            port: 0,
            request_timeout,
            ..NetworkConfig::default()
        };
        let module = NetworkModule::new(config, engine, RoutePolicy::builtin("/api")).unwrap();
        App {
            router: module.build_router(),
            catalog,
            module,
        }
    }

    async fn post_raw(router: &Router, uri: &str, body: Body) -> (StatusCode, Value) {
        let response = router
            .clone()
            .oneshot(
                Request::post(uri)
                    .header("content-type", "application/json")
                    .body(body)
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn post(router: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
        post_raw(router, uri, Body::from(body.to_string())).await
    }

    #[tokio::test]
    async fn requires_requesting_unit() {
        let engine = Engine::new(Arc::new(UnitRegistry::new()), &ServerConfig::default());
        assert!(NetworkModule::new(NetworkConfig::default(), engine, RoutePolicy::default()).is_err());
    }

    #[tokio::test]
    async fn dto_and_positional_operations() {
        let app = app(Duration::from_secs(1));

        let (status, body) = post(&app.router, "/api/Catalog/create", json!({"name": "a"})).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["id"].as_str().is_some_and(|id| !id.is_empty()));

        let (status, _) = post(&app.router, "/api/Catalog/remove", json!({"id": "X", "ownerId": "Y"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(*app.catalog.removed.lock(), vec![vec![json!("X"), json!("Y")]]);
    }

    #[tokio::test]
    async fn passthrough_rejection_is_400() {
        let app = app(Duration::from_secs(1));
        let (status, body) = post(&app.router, "/api/Catalog/create", json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "name is required"}));

        let (status, body) = post(&app.router, "/api/Resource/getResource", json!({"resourceID": "nope"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Resource with ID 'nope' not found.");
    }

    #[tokio::test]
    async fn included_read_is_served_directly() {
        let app = app(Duration::from_secs(1));
        let (status, body) = post_raw(&app.router, "/api/Resource/listResources", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"resources": []}));
    }

    #[tokio::test]
    async fn excluded_route_goes_through_the_mediator() {
        let app = app(Duration::from_secs(1));
        let follow = json!({"follower": "alice", "authUser": "alice", "followee": "bikes"});

        let (status, body) = post(&app.router, "/api/Following/follow", follow.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({}));

        let (status, body) = post(&app.router, "/api/Following/follow", follow).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Follower 'alice' is already following followee 'bikes'.");

        let (status, body) = post(
            &app.router,
            "/api/Following/isFollowing",
            json!({"follower": "alice", "followee": "bikes"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"isFollowing": true}));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn create_answers_after_followers_are_notified() {
        let app = app(Duration::from_secs(10));
        for i in 0..2000 {
            app.module
                .engine
                .invoke("Following", "follow", json!({"follower": format!("u{i}"), "followee": "bikes"}))
                .await
                .unwrap();
        }

        let (status, body) = post(
            &app.router,
            "/api/Resource/createResource",
            json!({"owner": "u0", "authUser": "u0", "name": "Fixie", "category": "bikes"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let resource_id = body["resourceID"].clone();
        assert!(resource_id.is_string());

        let (status, body) = post(
            &app.router,
            "/api/NotificationLog/listNotificationsWithContent",
            json!({"recipient": "u1999"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["notifications"].as_array().map(Vec::len), Some(1));
        assert_eq!(body["notifications"][0]["content"]["resourceID"], resource_id);

        let (_, owner) = post(
            &app.router,
            "/api/NotificationLog/listNotificationsWithContent",
            json!({"recipient": "u0"}),
        )
        .await;
        assert_eq!(owner["notifications"], json!([]));
    }

    #[tokio::test]
    async fn throwing_route_handler_answers_with_error() {
        let app = app(Duration::from_secs(1));
        let (status, body) = post(&app.router, "/api/Boom/explode", json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "Boom went the handler."}));
        assert_eq!(app.module.requesting.pending(), 0);
    }

    #[tokio::test]
    async fn unanswered_request_times_out() {
        let app = app(Duration::from_millis(50));
        let (status, body) = post(&app.router, "/api/Nobody/listens", json!({})).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body, json!({"error": "Request timed out."}));
        assert_eq!(app.module.requesting.pending(), 0);
    }

    #[tokio::test]
    async fn requesting_operations_are_not_public() {
        let app = app(Duration::from_millis(50));
        // Falls through to the mediator, where no rule answers it.
        let (status, _) = post(&app.router, "/api/Requesting/respond", json!({"request": "r1"})).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn banner_and_probes() {
        let app = app(Duration::from_secs(1));
        let response = app
            .router
            .clone()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"Mediator server is running.");

        let response = app
            .router
            .clone()
            .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        app.module.shutdown_controller().set_ready();
        let response = app
            .router
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let health: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(health["state"], "ready");
        assert!(health["routes"].as_u64().unwrap() >= 10);
    }

    #[tokio::test]
    async fn start_binds_and_serve_drains() {
        let mut module = app(Duration::from_secs(1)).module;
        let port = module.start().await.unwrap();
        assert!(port > 0);
        let controller = module.shutdown_controller();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(module.serve(async move {
            let _ = rx.await;
        }));
        tx.send(()).unwrap();
        server.await.unwrap().unwrap();
        assert_eq!(controller.health_state(), crate::network::HealthState::Stopped);
    }

    #[tokio::test]
    async fn serve_without_start_fails() {
        let module = app(Duration::from_secs(1)).module;
        assert!(module.serve(std::future::pending::<()>()).await.is_err());
    }
}
