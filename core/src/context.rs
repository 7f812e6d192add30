//! Request-scoped context handed to handlers and middleware
//!
//! A [`RequestContext`] is created by the dispatcher for every request and
//! passed by value through the middleware chain into the handler. Clones
//! share the request, the response sink, the parameters and the deadline;
//! [`Extensions`] are copied, so values a middleware inserts are only seen
//! by the layers it calls.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use bytes::Bytes;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::params::Params;
use crate::response::ResponseWriter;

/// Typed values attached to a request scope
///
/// Cloning is cheap: values are reference counted and never mutated in
/// place, inserting replaces the entry in this copy only.
#[derive(Clone, Default)]
pub struct Extensions {
    data: AHashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert typed data, replacing any previous value of the same type
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.data.insert(TypeId::of::<T>(), Arc::new(value));
    }

    /// Get typed data
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.data
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub fn remove<T: Send + Sync + 'static>(&mut self) -> bool {
        self.data.remove(&TypeId::of::<T>()).is_some()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extensions")
            .field("len", &self.data.len())
            .finish()
    }
}

struct Scope {
    request: http::Request<Bytes>,
    response: ResponseWriter,
    params: Params,
    deadline: Instant,
    token: CancellationToken,
}

/// Everything a handler needs to serve one request
#[derive(Clone)]
pub struct RequestContext {
    scope: Arc<Scope>,
    extensions: Extensions,
}

impl RequestContext {
    /// Create a context for `request`
    ///
    /// The dispatcher does this for every request; handlers under test can
    /// build one directly.
    pub fn new(
        request: http::Request<Bytes>,
        response: ResponseWriter,
        params: Params,
        deadline: Instant,
    ) -> Self {
        Self {
            scope: Arc::new(Scope {
                request,
                response,
                params,
                deadline,
                token: CancellationToken::new(),
            }),
            extensions: Extensions::new(),
        }
    }

    pub(crate) fn with_extensions(mut self, extensions: Extensions) -> Self {
        self.extensions = extensions;
        self
    }

    /// The inbound request
    #[inline]
    pub fn request(&self) -> &http::Request<Bytes> {
        &self.scope.request
    }

    #[inline]
    pub fn method(&self) -> &http::Method {
        self.scope.request.method()
    }

    /// Request path without the query string
    #[inline]
    pub fn path(&self) -> &str {
        self.scope.request.uri().path()
    }

    #[inline]
    pub fn headers(&self) -> &http::HeaderMap {
        self.scope.request.headers()
    }

    #[inline]
    pub fn body(&self) -> &Bytes {
        self.scope.request.body()
    }

    /// Request body as a string, if it is valid UTF-8
    pub fn body_str(&self) -> Result<&str, simdutf8::basic::Utf8Error> {
        simdutf8::basic::from_utf8(self.scope.request.body())
    }

    /// The response sink for this request
    #[inline]
    pub fn response(&self) -> &ResponseWriter {
        &self.scope.response
    }

    #[inline]
    pub fn params(&self) -> &Params {
        &self.scope.params
    }

    /// Shorthand for `self.params().get(name)`
    #[inline]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.scope.params.get(name)
    }

    /// The instant the route's timeout expires
    #[inline]
    pub fn deadline(&self) -> Instant {
        self.scope.deadline
    }

    /// True once the deadline passed or the dispatcher finished the request
    pub fn is_done(&self) -> bool {
        self.scope.token.is_cancelled() || Instant::now() >= self.scope.deadline
    }

    /// Resolves when the deadline passes or the request is finished
    ///
    /// The dispatcher never aborts a handler. Long-running handlers should
    /// race their work against this future and stop when it resolves.
    pub async fn done(&self) {
        tokio::select! {
            _ = self.scope.token.cancelled() => {}
            _ = tokio::time::sleep_until(self.scope.deadline) => {}
        }
    }

    /// Token cancelled when dispatch of this request returns
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.scope.token
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Shorthand for `self.extensions().get::<T>()`
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }

    /// Shorthand for `self.extensions_mut().insert(value)`
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(value);
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", self.method())
            .field("path", &self.path())
            .field("params", self.params())
            .field("deadline", &self.scope.deadline)
            .field("extensions", &self.extensions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn context(timeout: Duration) -> RequestContext {
        let request = http::Request::builder()
            .method("POST")
            .uri("http://localhost/users/7?verbose=1")
            .body(Bytes::from_static(b"{\"name\":\"bill\"}"))
            .unwrap();
        let params: Params = [("id", "7")].into_iter().collect();
        RequestContext::new(request, ResponseWriter::new(), params, Instant::now() + timeout)
    }

    #[tokio::test]
    async fn test_accessors() {
        let ctx = context(Duration::from_secs(5));

        assert_eq!(ctx.method(), http::Method::POST);
        assert_eq!(ctx.path(), "/users/7");
        assert_eq!(ctx.param("id"), Some("7"));
        assert_eq!(ctx.body_str().unwrap(), "{\"name\":\"bill\"}");
        assert!(!ctx.is_done());
    }

    #[tokio::test]
    async fn test_extensions_are_copied_per_clone() {
        #[derive(Debug, PartialEq)]
        struct User(&'static str);

        let outer = context(Duration::from_secs(5));
        let mut inner = outer.clone();
        inner.insert(User("bill"));

        assert_eq!(inner.get::<User>(), Some(&User("bill")));
        assert!(outer.get::<User>().is_none());
        assert!(inner.extensions_mut().remove::<User>());
        assert!(inner.extensions().is_empty());
    }

    #[tokio::test]
    async fn test_done_on_deadline() {
        let ctx = context(Duration::from_millis(20));
        ctx.done().await;
        assert!(ctx.is_done());
    }

    #[tokio::test]
    async fn test_done_on_cancel() {
        let ctx = context(Duration::from_secs(60));
        let waiter = ctx.clone();
        let task = tokio::spawn(async move { waiter.done().await });

        ctx.cancellation_token().cancel();
        tokio_test::assert_ok!(task.await);
        assert!(ctx.is_done());
    }

    #[tokio::test]
    async fn test_clones_share_response() {
        let ctx = context(Duration::from_secs(5));
        ctx.clone().response().write("shared");
        assert_eq!(ctx.response().status(), Some(http::StatusCode::OK));
    }
}
