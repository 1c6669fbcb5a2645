//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store routes in registration order
//! - Select the first route whose method and pattern match
//! - Hand unmatched requests to the fallback handler
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan in registration order; first match wins
//! - Handler results are returned untouched
//! - Dispatch never fails: no match always degrades to the fallback

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::future::BoxFuture;

use crate::routing::matcher::{Params, PathPattern};

type Handler<S> = Arc<dyn Fn(S, Request<Body>, Params) -> BoxFuture<'static, Response> + Send + Sync>;
type Fallback<S> = Arc<dyn Fn(S, Request<Body>) -> BoxFuture<'static, Response> + Send + Sync>;

struct Route<S> {
    method: Method,
    pattern: PathPattern,
    handler: Handler<S>,
}

/// Ordered chain of `(method, pattern)` routes ending in a fallback.
pub struct Router<S> {
    routes: Vec<Route<S>>,
    fallback: Option<Fallback<S>>,
}

impl<S> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            fallback: None,
        }
    }

    /// Register `handler` for `method` requests matching `pattern`.
    pub fn route<F, Fut>(mut self, method: Method, pattern: &str, handler: F) -> Self
    where
        F: Fn(S, Request<Body>, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        let handler: Handler<S> = Arc::new(
            move |state: S, req: Request<Body>, params: Params| -> BoxFuture<'static, Response> {
                Box::pin(handler(state, req, params))
            },
        );
        self.routes.push(Route {
            method,
            pattern: PathPattern::new(pattern),
            handler,
        });
        self
    }

    pub fn get<F, Fut>(self, pattern: &str, handler: F) -> Self
    where
        F: Fn(S, Request<Body>, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.route(Method::GET, pattern, handler)
    }

    pub fn post<F, Fut>(self, pattern: &str, handler: F) -> Self
    where
        F: Fn(S, Request<Body>, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.route(Method::POST, pattern, handler)
    }

    /// Set the handler for unmatched requests. A later call replaces an earlier one.
    pub fn fallback<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(S, Request<Body>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        let fallback: Fallback<S> = Arc::new(
            move |state: S, req: Request<Body>| -> BoxFuture<'static, Response> {
                Box::pin(handler(state, req))
            },
        );
        self.fallback = Some(fallback);
        self
    }

    /// Find the first route matching `method` and `path`.
    ///
    /// Returns the route's index and its captures.
    pub fn match_route(&self, method: &Method, path: &str) -> Option<(usize, Params)> {
        self.routes.iter().enumerate().find_map(|(index, route)| {
            if route.method != *method {
                return None;
            }
            route.pattern.match_path(path).map(|params| (index, params))
        })
    }

    /// Run the request through the route chain.
    pub async fn dispatch(&self, state: S, req: Request<Body>) -> Response {
        let matched = self.match_route(req.method(), req.uri().path());

        match matched {
            Some((index, params)) => {
                let route = &self.routes[index];
                tracing::debug!(
                    method = %route.method,
                    pattern = %route.pattern.as_str(),
                    "Route matched"
                );
                (route.handler)(state, req, params).await
            }
            None => match &self.fallback {
                Some(fallback) => fallback(state, req).await,
                None => default_not_found(),
            },
        }
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl<S> Default for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S> fmt::Debug for Router<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field(
                "routes",
                &self
                    .routes
                    .iter()
                    .map(|r| format!("{} {}", r.method, r.pattern.as_str()))
                    .collect::<Vec<_>>(),
            )
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

fn default_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "message": "Not Found" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn tagged(tag: &'static str) -> Response {
        (StatusCode::OK, tag).into_response()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn router() -> Router<()> {
        Router::new()
            .post("/room", |_, _, _| async { tagged("create") })
            .get("/room/:id", |_, _, params: Params| async move {
                tagged(if params["id"] == "first" { "first" } else { "join" })
            })
            .get("/room/:other", |_, _, _| async { tagged("shadowed") })
            .fallback(|_, _| async { (StatusCode::IM_A_TEAPOT, "fallback").into_response() })
    }

    #[tokio::test]
    async fn test_first_match_wins() {
        let router = router();
        let response = router.dispatch((), request(Method::GET, "/room/abc")).await;
        assert_eq!(body_text(response).await, "join");
        assert_eq!(router.match_route(&Method::GET, "/room/abc").map(|(i, _)| i), Some(1));
    }

    #[tokio::test]
    async fn test_method_mismatch_falls_through() {
        let router = router();
        let response = router.dispatch((), request(Method::GET, "/room")).await;
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);

        let response = router.dispatch((), request(Method::POST, "/room/abc")).await;
        assert_eq!(body_text(response).await, "fallback");

        let response = router.dispatch((), request(Method::HEAD, "/room/abc")).await;
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    }

    #[tokio::test]
    async fn test_trailing_slash_ignored() {
        let router = router();
        let a = router.match_route(&Method::GET, "/room/abc");
        let b = router.match_route(&Method::GET, "/room/abc/");
        assert_eq!(a, b);

        let response = router.dispatch((), request(Method::POST, "/room/")).await;
        assert_eq!(body_text(response).await, "create");
    }

    #[tokio::test]
    async fn test_query_string_ignored() {
        let router = router();
        let response = router.dispatch((), request(Method::POST, "/room?x=1")).await;
        assert_eq!(body_text(response).await, "create");
    }

    #[tokio::test]
    async fn test_captures_passed_to_handler() {
        let router = router();
        let response = router.dispatch((), request(Method::GET, "/room/first")).await;
        assert_eq!(body_text(response).await, "first");
    }

    #[tokio::test]
    async fn test_default_not_found() {
        let router: Router<()> = Router::new().post("/room", |_, _, _| async { tagged("create") });
        let response = router.dispatch((), request(Method::GET, "/")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_text(response).await, r#"{"message":"Not Found"}"#);
    }

    #[tokio::test]
    async fn test_state_is_passed() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new().get("/", |hits: Arc<AtomicUsize>, _, _| async move {
            hits.fetch_add(1, Ordering::SeqCst);
            tagged("root")
        });

        router.dispatch(hits.clone(), request(Method::GET, "/")).await;
        router.dispatch(hits.clone(), request(Method::GET, "/x")).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
