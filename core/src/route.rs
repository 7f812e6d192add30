//! Route descriptors and the function types they are made of

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::{self, BoxFuture, FutureExt};
use http::StatusCode;
use tower_service::Service;

use crate::context::RequestContext;
use crate::error::{BoxError, HttpError};
use crate::method::Method;

/// Timeout applied to routes that do not configure their own
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// What a handler resolves to: `Ok` once it wrote its response
pub type HandlerResult = Result<(), HttpError>;

/// Type-erased async request handler
pub type Handler = Arc<dyn Fn(RequestContext) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Wraps a handler into another handler
///
/// The returned handler decides whether and when to call the inner one,
/// and may hand it a modified context.
pub type Middleware = Arc<dyn Fn(Handler) -> Handler + Send + Sync>;

/// Turns a failed dispatch into a written response
///
/// Returning `Err` makes the dispatcher answer `500 Internal Server Error`.
pub type ErrorHandler =
    Arc<dyn Fn(&HttpError, &RequestContext) -> Result<(), BoxError> + Send + Sync>;

/// Box an async closure into a [`Handler`]
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |ctx| f(ctx).boxed())
}

/// Adapt a tower [`Service`] into a [`Handler`]
///
/// Each request is handed to a clone of `service` as a copy of the
/// matched request. The returned status, headers and body are written to
/// the context's response. A service error becomes a `500` handler error.
pub fn service_handler<S>(service: S) -> Handler
where
    S: Service<http::Request<Bytes>, Response = http::Response<Bytes>>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send + 'static,
{
    Arc::new(move |ctx| call_service(service.clone(), ctx).boxed())
}

async fn call_service<S>(mut service: S, ctx: RequestContext) -> HandlerResult
where
    S: Service<http::Request<Bytes>, Response = http::Response<Bytes>>,
    S::Error: Into<BoxError>,
{
    let request = copy_request(ctx.request());
    future::poll_fn(|cx| service.poll_ready(cx))
        .await
        .map_err(service_error)?;
    let response = service.call(request).await.map_err(service_error)?;

    let (parts, body) = response.into_parts();
    let writer = ctx.response();
    for (name, value) in &parts.headers {
        writer.append_header(name.clone(), value.clone());
    }
    writer.write_status(parts.status);
    writer.write(body);
    Ok(())
}

fn copy_request(request: &http::Request<Bytes>) -> http::Request<Bytes> {
    let mut copy = http::Request::new(request.body().clone());
    *copy.method_mut() = request.method().clone();
    *copy.uri_mut() = request.uri().clone();
    *copy.version_mut() = request.version();
    *copy.headers_mut() = request.headers().clone();
    copy
}

fn service_error(err: impl Into<BoxError>) -> HttpError {
    HttpError::new(StatusCode::INTERNAL_SERVER_ERROR.as_u16(), err.into().to_string())
}

/// Box a handler transformer into a [`Middleware`]
pub fn middleware<F>(f: F) -> Middleware
where
    F: Fn(Handler) -> Handler + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Box a closure into an [`ErrorHandler`]
pub fn error_handler<F>(f: F) -> ErrorHandler
where
    F: Fn(&HttpError, &RequestContext) -> Result<(), BoxError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// One registered endpoint
///
/// Routes are plain values; the trie builder clones what it needs and never
/// looks at a route again after the build.
#[derive(Clone)]
pub struct Route {
    methods: Vec<Method>,
    path: String,
    handler: Handler,
    middleware: Vec<Middleware>,
    timeout: Duration,
    error_handler: Option<ErrorHandler>,
}

impl Route {
    /// Create a route with no middleware, no error handler and the
    /// default timeout
    pub fn new(methods: &[Method], path: impl Into<String>, handler: Handler) -> Self {
        Self {
            methods: methods.to_vec(),
            path: path.into(),
            handler,
            middleware: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            error_handler: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_middleware(mut self, middleware: Middleware) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn with_error_handler(mut self, error_handler: ErrorHandler) -> Self {
        self.error_handler = Some(error_handler);
        self
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }

    pub fn push_middleware(&mut self, middleware: Middleware) -> &mut Self {
        self.middleware.push(middleware);
        self
    }

    pub fn set_error_handler(&mut self, error_handler: ErrorHandler) -> &mut Self {
        self.error_handler = Some(error_handler);
        self
    }

    pub(crate) fn set_middleware(&mut self, middleware: Vec<Middleware>) {
        self.middleware = middleware;
    }

    pub(crate) fn set_optional_error_handler(&mut self, error_handler: Option<ErrorHandler>) {
        self.error_handler = error_handler;
    }

    /// Copy of this route with `prefix` prepended to its path
    pub fn prefixed(&self, prefix: &str) -> Route {
        let mut route = self.clone();
        route.path = format!("{}{}", prefix, self.path);
        route
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Middleware in execution order, outermost first
    pub fn middleware(&self) -> &[Middleware] {
        &self.middleware
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn error_handler(&self) -> Option<&ErrorHandler> {
        self.error_handler.as_ref()
    }

    /// The handler wrapped by every middleware, first declared outermost
    pub(crate) fn compose(&self) -> Handler {
        self.middleware
            .iter()
            .rev()
            .fold(self.handler.clone(), |next, layer| layer(next))
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("methods", &self.methods)
            .field("path", &self.path)
            .field("middleware", &self.middleware.len())
            .field("timeout", &self.timeout)
            .field("error_handler", &self.error_handler.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Params;
    use crate::response::ResponseWriter;
    use std::sync::Mutex;
    use tokio::time::Instant;

    fn ok_handler() -> Handler {
        handler(|_ctx| async { Ok(()) })
    }

    fn tracing_layer(name: &'static str, log: Arc<Mutex<Vec<String>>>) -> Middleware {
        middleware(move |next: Handler| {
            let log = log.clone();
            let wrapped: Handler = Arc::new(move |ctx: RequestContext| {
                let next = next.clone();
                let log = log.clone();
                async move {
                    log.lock().unwrap().push(format!("{name} before"));
                    let result = next(ctx).await;
                    log.lock().unwrap().push(format!("{name} after"));
                    result
                }
                .boxed()
            });
            wrapped
        })
    }

    #[test]
    fn test_route_defaults() {
        let route = Route::new(&[Method::GET], "/users", ok_handler());

        assert_eq!(route.methods(), &[Method::GET]);
        assert_eq!(route.path(), "/users");
        assert_eq!(route.timeout(), DEFAULT_TIMEOUT);
        assert!(route.middleware().is_empty());
        assert!(route.error_handler().is_none());
    }

    #[test]
    fn test_route_configuration() {
        let route = Route::new(Method::CRUD, "/users", ok_handler())
            .with_timeout(Duration::from_millis(250))
            .with_error_handler(error_handler(|_err, _ctx| Ok(())))
            .with_middleware(middleware(|next| next));

        assert_eq!(route.timeout(), Duration::from_millis(250));
        assert!(route.error_handler().is_some());
        assert_eq!(route.middleware().len(), 1);

        let prefixed = route.prefixed("/api");
        assert_eq!(prefixed.path(), "/api/users");
        assert_eq!(route.path(), "/users");
    }

    #[tokio::test]
    async fn test_compose_runs_first_middleware_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let inner_log = log.clone();
        let route = Route::new(
            &[Method::GET],
            "/",
            handler(move |_ctx| {
                let log = inner_log.clone();
                async move {
                    log.lock().unwrap().push("handler".to_string());
                    Ok(())
                }
            }),
        )
        .with_middleware(tracing_layer("a", log.clone()))
        .with_middleware(tracing_layer("b", log.clone()));

        let request = http::Request::new(bytes::Bytes::new());
        let ctx = RequestContext::new(
            request,
            ResponseWriter::new(),
            Params::new(),
            Instant::now() + DEFAULT_TIMEOUT,
        );
        tokio_test::assert_ok!(route.compose()(ctx).await);

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a before", "b before", "handler", "b after", "a after"]
        );
    }
}
