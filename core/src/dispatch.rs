//! Per-request dispatch
//!
//! The [`Dispatcher`] owns the route trie and turns every inbound request
//! into exactly one response: match, bind parameters, run the handler
//! against the route's deadline, then resolve any error into a written
//! response.

use std::convert::Infallible;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use http::StatusCode;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::context::{Extensions, RequestContext};
use crate::error::{BoxError, HttpError, RouteError};
use crate::method::Method;
use crate::params::Params;
use crate::response::ResponseWriter;
use crate::route::{ErrorHandler, HandlerResult, Route, DEFAULT_TIMEOUT};
use crate::trie::{RouteEntry, Trie};

/// Settings that apply to every request, whichever route it hits
#[derive(Clone)]
pub struct DispatcherConfig {
    /// Deadline for requests that matched no route
    pub default_timeout: Duration,
    /// Used when the matched route has no error handler of its own
    pub error_handler: Option<ErrorHandler>,
    /// Values every request context starts with
    pub extensions: Extensions,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
            error_handler: None,
            extensions: Extensions::new(),
        }
    }
}

impl DispatcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_error_handler(mut self, error_handler: ErrorHandler) -> Self {
        self.error_handler = Some(error_handler);
        self
    }

    /// Attach a value every request context can read
    pub fn with_extension<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.extensions.insert(value);
        self
    }
}

impl std::fmt::Debug for DispatcherConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherConfig")
            .field("default_timeout", &self.default_timeout)
            .field("error_handler", &self.error_handler.is_some())
            .field("extensions", &self.extensions)
            .finish()
    }
}

struct Inner {
    trie: Trie,
    config: DispatcherConfig,
}

/// Request dispatcher
///
/// Cheap to clone; all clones share one immutable trie.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    /// Build a dispatcher with the default configuration
    pub fn new(routes: &[Route]) -> Result<Self, RouteError> {
        Self::with_config(routes, DispatcherConfig::default())
    }

    /// Build a dispatcher
    ///
    /// Fails if the routes do not form a valid trie.
    pub fn with_config(routes: &[Route], config: DispatcherConfig) -> Result<Self, RouteError> {
        let trie = Trie::build(routes)?;
        info!(
            routes = trie.route_count(),
            default_timeout = ?config.default_timeout,
            "dispatcher ready"
        );
        Ok(Self {
            inner: Arc::new(Inner { trie, config }),
        })
    }

    pub fn trie(&self) -> &Trie {
        &self.inner.trie
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    fn lookup(&self, request: &http::Request<Bytes>) -> Option<(Arc<RouteEntry>, Params)> {
        let method = Method::try_from(request.method()).ok()?;
        self.inner
            .trie
            .at(method, request.uri().path())
            .map(|(entry, params)| (entry.clone(), params))
    }

    /// Serve one request
    ///
    /// Never fails: routing misses, timeouts and handler errors all end up
    /// as a status code in the returned response.
    pub async fn serve(&self, request: http::Request<Bytes>) -> http::Response<Bytes> {
        let started = Instant::now();
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let (entry, params) = match self.lookup(&request) {
            Some((entry, params)) => (Some(entry), params),
            None => (None, Params::new()),
        };
        let timeout = entry
            .as_ref()
            .map_or(self.inner.config.default_timeout, |entry| entry.route().timeout());

        let response = ResponseWriter::new();
        let deadline = deadline_after(started, timeout);
        let ctx = RequestContext::new(request, response.clone(), params, deadline)
            .with_extensions(self.inner.config.extensions.clone());
        let _cancel_on_exit = ctx.cancellation_token().clone().drop_guard();

        let outcome = match &entry {
            Some(entry) => run_handler(entry, ctx.clone()).await,
            None => Err(HttpError::not_found()),
        };
        if let Err(err) = outcome {
            self.resolve(entry.as_deref(), &err, &ctx);
        }

        let response = response.finish();
        debug!(
            %method,
            path = %path,
            route = entry.as_ref().map(|entry| entry.route().path()),
            status = response.status().as_u16(),
            elapsed = ?started.elapsed(),
            "request served"
        );
        response
    }

    /// Turn a dispatch error into a written response
    fn resolve(&self, entry: Option<&RouteEntry>, err: &HttpError, ctx: &RequestContext) {
        let mut secondary: Option<BoxError> = None;

        if let Some(handler) = entry.and_then(|entry| entry.route().error_handler()) {
            secondary = call_error_handler(handler, err, ctx).err();
        } else if let Some(handler) = &self.inner.config.error_handler {
            secondary = call_error_handler(handler, err, ctx).err();
        } else if err.is_not_found() {
            // Detail is always empty: `secondary` is never set on this branch
            let detail = secondary
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            ctx.response()
                .error(StatusCode::NOT_FOUND, &format!("Route Not Found: {detail}"));
        } else {
            secondary = Some(Box::new(err.clone()));
        }

        if let Some(secondary) = secondary {
            error!(path = %ctx.path(), code = err.code(), error = %secondary, "request failed");
            ctx.response().error(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Internal Server Error: {secondary}"),
            );
        }
    }
}

/// Deadlines past this horizon are clamped to it
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `started + timeout`, clamped so huge timeouts cannot overflow `Instant`
fn deadline_after(started: Instant, timeout: Duration) -> Instant {
    started
        .checked_add(timeout.min(FAR_FUTURE))
        .unwrap_or(started)
}

/// Run the handler on its own task and race it against the deadline
///
/// On timeout the task is left running; it observes the end of the request
/// through `RequestContext::done`.
async fn run_handler(entry: &RouteEntry, ctx: RequestContext) -> HandlerResult {
    let deadline = ctx.deadline();
    let task = tokio::spawn((entry.handler())(ctx));

    tokio::select! {
        joined = task => match joined {
            Ok(result) => result,
            Err(join_err) => {
                error!(route = entry.route().path(), error = %join_err, "handler task failed");
                let message = if join_err.is_panic() {
                    "handler panicked"
                } else {
                    "handler was cancelled"
                };
                Err(HttpError::new(StatusCode::INTERNAL_SERVER_ERROR.as_u16(), message))
            }
        },
        _ = tokio::time::sleep_until(deadline) => {
            warn!(route = entry.route().path(), timeout = ?entry.route().timeout(), "handler timed out");
            Err(HttpError::timeout())
        }
    }
}

fn call_error_handler(
    handler: &ErrorHandler,
    err: &HttpError,
    ctx: &RequestContext,
) -> Result<(), BoxError> {
    match panic::catch_unwind(AssertUnwindSafe(|| handler(err, ctx))) {
        Ok(result) => result,
        Err(_) => Err("error handler panicked".into()),
    }
}

impl tower_service::Service<http::Request<Bytes>> for Dispatcher {
    type Response = http::Response<Bytes>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: http::Request<Bytes>) -> Self::Future {
        let dispatcher = self.clone();
        async move { Ok(dispatcher.serve(request).await) }.boxed()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("trie", &self.inner.trie)
            .field("config", &self.inner.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::{error_handler, handler};
    use tower_service::Service;

    fn request(method: &str, uri: &str) -> http::Request<Bytes> {
        http::Request::builder()
            .method(method)
            .uri(uri)
            .body(Bytes::new())
            .unwrap()
    }

    fn ping() -> Route {
        Route::new(
            &[Method::GET],
            "/ping",
            handler(|ctx| async move {
                ctx.response().text(StatusCode::OK, "pong");
                Ok(())
            }),
        )
    }

    #[tokio::test]
    async fn test_not_found_body() {
        let dispatcher = Dispatcher::new(&[ping()]).unwrap();
        let response = dispatcher.serve(request("GET", "/missing")).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.body().as_ref(), b"Route Not Found: \n");
    }

    #[tokio::test]
    async fn test_extension_method_is_not_routable() {
        let dispatcher = Dispatcher::new(&[ping()]).unwrap();
        let response = dispatcher.serve(request("PROPFIND", "/ping")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_handler_error_falls_back_to_500() {
        let route = Route::new(
            &[Method::GET],
            "/fail",
            handler(|_ctx| async { Err(HttpError::new(418, "short and stout")) }),
        );
        let dispatcher = Dispatcher::new(&[route]).unwrap();
        let response = dispatcher.serve(request("GET", "/fail")).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.body().as_ref(),
            b"Internal Server Error: short and stout\n"
        );
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_500() {
        async fn explode(_ctx: RequestContext) -> HandlerResult {
            panic!("boom")
        }

        let route = Route::new(&[Method::GET], "/panic", handler(explode));
        let dispatcher = Dispatcher::new(&[route]).unwrap();
        let response = dispatcher.serve(request("GET", "/panic")).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.body().as_ref(),
            b"Internal Server Error: handler panicked\n"
        );
    }

    #[tokio::test]
    async fn test_error_handler_panic_becomes_500() {
        let config = DispatcherConfig::new()
            .with_error_handler(error_handler(|_err, _ctx| panic!("handler bug")));
        let dispatcher = Dispatcher::with_config(&[ping()], config).unwrap();
        let response = dispatcher.serve(request("GET", "/nope")).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.body().as_ref(),
            b"Internal Server Error: error handler panicked\n"
        );
    }

    #[tokio::test]
    async fn test_root_extensions_reach_handlers() {
        struct Greeting(&'static str);

        let route = Route::new(
            &[Method::GET],
            "/greet",
            handler(|ctx| async move {
                let greeting = ctx.get::<Greeting>().map_or("missing", |g| g.0);
                ctx.response().write(greeting);
                Ok(())
            }),
        );
        let config = DispatcherConfig::new().with_extension(Greeting("hello"));
        let dispatcher = Dispatcher::with_config(&[route], config).unwrap();
        let response = dispatcher.serve(request("GET", "/greet")).await;

        assert_eq!(response.body().as_ref(), b"hello");
    }

    #[tokio::test]
    async fn test_tower_service() {
        let mut dispatcher = Dispatcher::new(&[ping()]).unwrap();
        let response = tokio_test::assert_ok!(dispatcher.call(request("GET", "/ping")).await);

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().as_ref(), b"pong");
    }

    #[test]
    fn test_deadline_clamps_huge_timeouts() {
        let started = Instant::now();
        assert_eq!(
            deadline_after(started, Duration::from_millis(5)),
            started + Duration::from_millis(5)
        );
        assert_eq!(deadline_after(started, Duration::MAX), started + FAR_FUTURE);
    }

    #[test]
    fn test_invalid_routes_fail_construction() {
        let route = Route::new(&[Method::GET], "no-slash", handler(|_ctx| async { Ok(()) }));
        assert!(matches!(
            Dispatcher::new(&[route]),
            Err(RouteError::MissingLeadingSlash(_))
        ));
        assert_eq!(Dispatcher::new(&[]).unwrap_err(), RouteError::NoRoutes);
    }
}
