//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum service with all middleware layers
//! - Hand every request to the relay route chain
//! - Serve room creation and room joins
//! - Apply origin allow-list reloads
//! - Periodically reclaim rooms nobody is connected to
//! - Stop room actors on shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::RelayConfig;
use crate::http::request::{
    declared_origin, propagate_request_id_layer, request_id, set_request_id_layer,
};
use crate::http::response::{self, ResponseOptions};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::rooms::{LocalDirectory, RoomDirectory, RoomId};
use crate::routing::{Params, Router as RelayRouter};
use crate::security::OriginPolicy;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub directory: Arc<dyn RoomDirectory>,
    pub policy: Arc<ArcSwap<OriginPolicy>>,
    routes: Arc<RelayRouter<AppState>>,
}

/// Body of a successful `POST /room`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedRoom {
    pub id: String,
}

/// The relay's route chain.
pub fn relay_routes() -> RelayRouter<AppState> {
    RelayRouter::new()
        .post("/room", create_room)
        .get("/room/:id", join_room)
        .fallback(not_found)
}

/// HTTP server for the relay.
pub struct HttpServer {
    router: Router,
    config: RelayConfig,
    policy: Arc<ArcSwap<OriginPolicy>>,
    directory: Arc<dyn RoomDirectory>,
    rooms_shutdown: Shutdown,
}

impl HttpServer {
    /// Create a new HTTP server with an in-process room directory.
    pub fn new(config: RelayConfig) -> Self {
        let rooms_shutdown = Shutdown::new();
        let directory = Arc::new(LocalDirectory::new(
            config.rooms.clone(),
            rooms_shutdown.clone(),
        ));
        Self::with_directory(config, directory, rooms_shutdown)
    }

    /// Create a server backed by `directory`. `rooms_shutdown` fires when the server stops.
    pub fn with_directory(
        config: RelayConfig,
        directory: Arc<dyn RoomDirectory>,
        rooms_shutdown: Shutdown,
    ) -> Self {
        let policy = OriginPolicy::from_patterns(&config.cors.allowed_origins).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Invalid origin allow-list, no origin will be allowed");
            OriginPolicy::new(Vec::new())
        });
        let policy = Arc::new(ArcSwap::from_pointee(policy));

        let state = AppState {
            directory: directory.clone(),
            policy: policy.clone(),
            routes: Arc::new(relay_routes()),
        };

        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            policy,
            directory,
            rooms_shutdown,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &RelayConfig, state: AppState) -> Router {
        Router::new()
            .fallback(relay_handler)
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.limits.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer())
            .layer(TraceLayer::new_for_http())
    }

    /// The fully layered service, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires.
    ///
    /// Configs received on `config_updates` replace the origin allow-list.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<RelayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        tokio::spawn(apply_config_updates(self.policy.clone(), config_updates));

        if self.config.rooms.reclaim_interval_secs > 0 {
            tokio::spawn(reclaim_rooms(
                self.directory.clone(),
                Duration::from_secs(self.config.rooms.reclaim_interval_secs),
                self.rooms_shutdown.subscribe(),
            ));
        }

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server shutting down");
            })
            .await?;

        self.rooms_shutdown.trigger();
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// The origin policy currently in effect.
    pub fn policy(&self) -> Arc<OriginPolicy> {
        self.policy.load_full()
    }
}

async fn apply_config_updates(
    policy: Arc<ArcSwap<OriginPolicy>>,
    mut updates: mpsc::UnboundedReceiver<RelayConfig>,
) {
    while let Some(config) = updates.recv().await {
        match OriginPolicy::from_patterns(&config.cors.allowed_origins) {
            Ok(new_policy) => {
                tracing::info!(
                    patterns = new_policy.patterns().len(),
                    "Origin allow-list reloaded"
                );
                policy.store(Arc::new(new_policy));
            }
            Err(e) => {
                tracing::error!(error = %e, "Rejected origin allow-list reload");
            }
        }
    }
}

async fn reclaim_rooms(
    directory: Arc<dyn RoomDirectory>,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                directory.reclaim_idle();
            }
            _ = shutdown.recv() => break,
        }
    }
}

/// Entry point for every request: run the relay route chain.
async fn relay_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = request_id(request.headers());
    let method = request.method().clone();

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %request.uri().path(),
        "Dispatching request"
    );

    let routes = state.routes.clone();
    let response = routes.dispatch(state, request).await;

    metrics::record_request(method.as_str(), response.status().as_u16(), start);
    response
}

/// `POST /room`: mint a new room.
async fn create_room(state: AppState, req: Request<Body>, _params: Params) -> Response {
    let origin = declared_origin(req.headers());
    let id = state.directory.allocate();

    response::json(
        &state.policy.load_full(),
        &CreatedRoom { id: id.to_string() },
        ResponseOptions::new(StatusCode::OK).origin(origin.as_deref()),
    )
}

/// `GET /room/:id`: validate the id and hand the request to the room.
async fn join_room(state: AppState, req: Request<Body>, params: Params) -> Response {
    let origin = declared_origin(req.headers());
    let policy = state.policy.load_full();

    let id = match params.get("id").map(|raw| raw.parse::<RoomId>()) {
        Some(Ok(id)) => id,
        Some(Err(e)) => {
            tracing::debug!(error = %e, "Rejected malformed room id");
            return response::not_found(&policy, origin.as_deref());
        }
        None => return response::not_found(&policy, origin.as_deref()),
    };

    let Some(room) = state.directory.resolve(&id) else {
        tracing::debug!(room_id = %id, "Unknown room");
        return response::not_found(&policy, origin.as_deref());
    };

    room.fetch(req, &policy).await
}

async fn not_found(state: AppState, req: Request<Body>) -> Response {
    let origin = declared_origin(req.headers());
    response::not_found(&state.policy.load_full(), origin.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::http::{header, Method};
    use tower::ServiceExt;

    use crate::config::RoomConfig;
    use crate::rooms::RoomHandle;

    /// Directory wrapper that counts lookups.
    struct CountingDirectory {
        inner: LocalDirectory,
        resolves: AtomicUsize,
    }

    impl RoomDirectory for CountingDirectory {
        fn allocate(&self) -> RoomId {
            self.inner.allocate()
        }

        fn resolve(&self, id: &RoomId) -> Option<RoomHandle> {
            self.resolves.fetch_add(1, Ordering::SeqCst);
            self.inner.resolve(id)
        }
    }

    fn server() -> (HttpServer, Arc<CountingDirectory>) {
        let shutdown = Shutdown::new();
        let directory = Arc::new(CountingDirectory {
            inner: LocalDirectory::new(RoomConfig::default(), shutdown.clone()),
            resolves: AtomicUsize::new(0),
        });
        let server = HttpServer::with_directory(RelayConfig::default(), directory.clone(), shutdown);
        (server, directory)
    }

    fn request(method: Method, uri: &str) -> axum::http::request::Builder {
        Request::builder().method(method).uri(uri)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn create(server: &HttpServer) -> String {
        let response = server
            .router()
            .oneshot(request(Method::POST, "/room").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let created: CreatedRoom = serde_json::from_value(body_json(response).await).unwrap();
        created.id
    }

    #[tokio::test]
    async fn test_create_room_twice_distinct() {
        let (server, _) = server();
        let a = create(&server).await;
        let b = create(&server).await;
        assert_ne!(a, b);
        assert!(a.parse::<RoomId>().is_ok());
    }

    #[tokio::test]
    async fn test_malformed_id_skips_directory() {
        let (server, directory) = server();
        for id in ["abc", "ZZ", "g".repeat(64).as_str(), "a".repeat(63).as_str()] {
            let response = server
                .router()
                .oneshot(
                    request(Method::GET, &format!("/room/{id}"))
                        .header(header::UPGRADE, "websocket")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            assert_eq!(body_json(response).await, serde_json::json!({ "message": "Not Found" }));
        }
        assert_eq!(directory.resolves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_room_not_found() {
        let (server, directory) = server();
        let id = RoomId::generate();
        let response = server
            .router()
            .oneshot(request(Method::GET, &format!("/room/{id}")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(directory.resolves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_join_without_upgrade_rejected() {
        let (server, directory) = server();
        let id = create(&server).await;

        let response = server
            .router()
            .oneshot(
                request(Method::GET, &format!("/room/{id}/"))
                    .header(header::ORIGIN, "https://app.affine.pro")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://app.affine.pro"
        );
        assert_eq!(
            body_json(response).await,
            serde_json::json!({ "message": "expected websocket" })
        );

        let room = directory.resolve(&id.parse().unwrap()).unwrap();
        assert!(room.sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unmatched_routes() {
        let (server, _) = server();
        for (method, uri) in [
            (Method::GET, "/"),
            (Method::GET, "/room"),
            (Method::POST, "/room/abc"),
            (Method::PUT, "/room"),
            (Method::GET, "/rooms/abc"),
        ] {
            let response = server
                .router()
                .oneshot(request(method, uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_cors_follows_origin() {
        let (server, _) = server();

        let allowed = server
            .router()
            .oneshot(
                request(Method::POST, "/room")
                    .header(header::ORIGIN, "http://localhost:3000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(allowed.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "http://localhost:3000");
        assert_eq!(allowed.headers()[header::VARY], "Origin");
        assert!(allowed.headers().contains_key("x-request-id"));

        let denied = server
            .router()
            .oneshot(
                request(Method::GET, "/nowhere")
                    .header(header::ORIGIN, "https://evil.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::NOT_FOUND);
        assert!(!denied.headers().contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reclaim_sweep_runs_until_shutdown() {
        let shutdown = Shutdown::new();
        let directory = Arc::new(LocalDirectory::new(RoomConfig::default(), shutdown.clone()));
        let id = directory.allocate();
        let host = Arc::downgrade(directory.resolve(&id).unwrap().host());

        let sweep = tokio::spawn(reclaim_rooms(
            directory.clone(),
            Duration::from_secs(30),
            shutdown.subscribe(),
        ));

        tokio::time::sleep(Duration::from_secs(31)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(host.upgrade().is_none());
        assert!(directory.resolve(&id).is_some());

        shutdown.trigger();
        sweep.await.unwrap();
    }

    #[tokio::test]
    async fn test_policy_reload() {
        let (server, _) = server();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(apply_config_updates(server.policy.clone(), rx));

        let mut config = RelayConfig::default();
        config.cors.allowed_origins = vec!["https://*.example.org".into()];
        tx.send(config).unwrap();
        drop(tx);
        handle.await.unwrap();

        let policy = server.policy();
        assert!(policy.is_allowed(Some("https://docs.example.org")));
        assert!(!policy.is_allowed(Some("https://app.affine.pro")));
    }
}
