//! Fluent route declaration
//!
//! A [`RouteGroup`] collects routes and nested groups under a path prefix.
//! Every route or group copies its parent's timeout, error handler and
//! middleware at the moment it is created; configuring the parent later
//! only affects what is created after that.
//!
//! ```ignore
//! let mut router = Router::new();
//! router.timeout(Duration::from_secs(5));
//! router.get("/health", |ctx| async move {
//!     ctx.response().text(StatusCode::OK, "ok");
//!     Ok(())
//! });
//!
//! let api = router.group("/api");
//! api.middleware(auth);
//! api.crud("/users/:id", users);
//!
//! let dispatcher = router.build(DispatcherConfig::default())?;
//! ```

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use tower_service::Service;

use crate::context::RequestContext;
use crate::dispatch::{Dispatcher, DispatcherConfig};
use crate::error::{BoxError, RouteError};
use crate::method::Method;
use crate::route::{
    handler, service_handler, ErrorHandler, Handler, HandlerResult, Middleware, Route,
    DEFAULT_TIMEOUT,
};

/// The root route group
pub type Router = RouteGroup;

#[derive(Debug, Clone, Copy)]
enum Child {
    Route(usize),
    Group(usize),
}

/// A set of routes sharing a path prefix and default configuration
#[derive(Clone)]
pub struct RouteGroup {
    prefix: String,
    timeout: Duration,
    error_handler: Option<ErrorHandler>,
    middleware: Vec<Middleware>,
    routes: Vec<Route>,
    groups: Vec<RouteGroup>,
    /// Declaration order across `routes` and `groups`
    order: Vec<Child>,
}

impl Default for RouteGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RouteGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteGroup")
            .field("prefix", &self.prefix)
            .field("timeout", &self.timeout)
            .field("error_handler", &self.error_handler.is_some())
            .field("middleware", &self.middleware.len())
            .field("routes", &self.routes)
            .field("groups", &self.groups)
            .finish()
    }
}

/// Generates a handler shorthand and a service shorthand per method set
macro_rules! method_routes {
    ($($(#[$doc:meta])* $name:ident, $service_name:ident => $methods:expr;)*) => {
        $(
            $(#[$doc])*
            pub fn $name<F, Fut>(&mut self, path: impl Into<String>, f: F) -> &mut Route
            where
                F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
                Fut: Future<Output = HandlerResult> + Send + 'static,
            {
                self.route($methods, path, handler(f))
            }

            $(#[$doc])*
            pub fn $service_name<S>(&mut self, path: impl Into<String>, service: S) -> &mut Route
            where
                S: Service<http::Request<Bytes>, Response = http::Response<Bytes>>
                    + Clone
                    + Send
                    + Sync
                    + 'static,
                S::Error: Into<BoxError>,
                S::Future: Send + 'static,
            {
                self.route_service($methods, path, service)
            }
        )*
    };
}

impl RouteGroup {
    /// Create a root group: no prefix, default timeout, no error handler
    /// and no middleware
    pub fn new() -> Self {
        Self {
            prefix: String::new(),
            timeout: DEFAULT_TIMEOUT,
            error_handler: None,
            middleware: Vec::new(),
            routes: Vec::new(),
            groups: Vec::new(),
            order: Vec::new(),
        }
    }

    /// Timeout for routes created from now on
    pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }

    /// Error handler for routes created from now on
    pub fn error_handler(&mut self, error_handler: ErrorHandler) -> &mut Self {
        self.error_handler = Some(error_handler);
        self
    }

    /// Append middleware for routes created from now on
    pub fn middleware(&mut self, middleware: Middleware) -> &mut Self {
        self.middleware.push(middleware);
        self
    }

    pub fn middlewares(&mut self, middleware: impl IntoIterator<Item = Middleware>) -> &mut Self {
        self.middleware.extend(middleware);
        self
    }

    /// Register a route for `methods`
    ///
    /// The route starts out with this group's current configuration and
    /// can be adjusted through the returned reference.
    pub fn route(&mut self, methods: &[Method], path: impl Into<String>, handler: Handler) -> &mut Route {
        let mut route = Route::new(methods, path, handler);
        route.set_timeout(self.timeout);
        route.set_middleware(self.middleware.clone());
        route.set_optional_error_handler(self.error_handler.clone());

        let index = self.routes.len();
        self.routes.push(route);
        self.order.push(Child::Route(index));
        &mut self.routes[index]
    }

    /// Register a tower service for `methods`
    ///
    /// The service sees a copy of the matched request and its response is
    /// written through the route's context, so route middleware, timeout
    /// and error handling apply as for any other handler.
    pub fn route_service<S>(
        &mut self,
        methods: &[Method],
        path: impl Into<String>,
        service: S,
    ) -> &mut Route
    where
        S: Service<http::Request<Bytes>, Response = http::Response<Bytes>>
            + Clone
            + Send
            + Sync
            + 'static,
        S::Error: Into<BoxError>,
        S::Future: Send + 'static,
    {
        self.route(methods, path, service_handler(service))
    }

    /// Open a nested group under `prefix`
    pub fn group(&mut self, prefix: impl Into<String>) -> &mut RouteGroup {
        let group = RouteGroup {
            prefix: prefix.into(),
            timeout: self.timeout,
            error_handler: self.error_handler.clone(),
            middleware: self.middleware.clone(),
            routes: Vec::new(),
            groups: Vec::new(),
            order: Vec::new(),
        };

        let index = self.groups.len();
        self.groups.push(group);
        self.order.push(Child::Group(index));
        &mut self.groups[index]
    }

    method_routes! {
        /// Route that answers no method at all
        noop, noop_service => Method::NONE;
        get, get_service => &[Method::GET];
        post, post_service => &[Method::POST];
        put, put_service => &[Method::PUT];
        patch, patch_service => &[Method::PATCH];
        delete, delete_service => &[Method::DELETE];
        head, head_service => &[Method::HEAD];
        options, options_service => &[Method::OPTIONS];
        connect, connect_service => &[Method::CONNECT];
        trace, trace_service => &[Method::TRACE];
        /// Route for DELETE, GET, PUT, PATCH and POST
        crud, crud_service => Method::CRUD;
        /// Route for every routable method
        any, any_service => Method::ANY;
    }

    /// Prefix of this group, relative to its parent
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// All routes of this group and its descendants with absolute paths,
    /// depth first in declaration order
    pub fn flatten(&self) -> Vec<Route> {
        let mut routes = Vec::new();
        self.flatten_into("", &mut routes);
        routes
    }

    fn flatten_into(&self, parent: &str, out: &mut Vec<Route>) {
        let prefix = format!("{}{}", parent, self.prefix);
        for child in &self.order {
            match *child {
                Child::Route(index) => out.push(self.routes[index].prefixed(&prefix)),
                Child::Group(index) => self.groups[index].flatten_into(&prefix, out),
            }
        }
    }

    /// Flatten the tree and build a dispatcher from it
    pub fn build(&self, config: DispatcherConfig) -> Result<Dispatcher, RouteError> {
        Dispatcher::with_config(&self.flatten(), config)
    }
}
