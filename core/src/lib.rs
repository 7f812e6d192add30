//! # routem-core
//!
//! HTTP request routing: a segment trie built once from a flat route list,
//! and a dispatcher that matches each request, binds path parameters, runs
//! the handler under a per-route timeout and turns every failure into a
//! response.
//!
//! ## Features
//! - Literal segments always beat `:param` segments at the same depth
//! - Parameter names are bound per route, so `/a/:id/x` and `/a/:name/y`
//!   coexist
//! - Middleware composed once at build time, first declared outermost
//! - Layered error handling: route handler, then dispatcher handler, then
//!   built-in fallbacks
//! - Advisory cancellation: timed-out handlers keep running and observe
//!   the deadline through their context
//!
//! ## Example
//! ```rust
//! use http::StatusCode;
//! use routem_core::{DispatcherConfig, Router};
//!
//! # tokio_test::block_on(async {
//! let mut router = Router::new();
//! router.get("/users/:id", |ctx| async move {
//!     let id = ctx.param("id").unwrap_or_default().to_string();
//!     ctx.response().text(StatusCode::OK, id);
//!     Ok(())
//! });
//!
//! let dispatcher = router.build(DispatcherConfig::default()).unwrap();
//! let request = http::Request::get("/users/123").body(bytes::Bytes::new()).unwrap();
//! let response = dispatcher.serve(request).await;
//! assert_eq!(response.body().as_ref(), b"123");
//! # });
//! ```

pub mod builder;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod method;
pub mod params;
pub mod response;
pub mod route;
pub mod trie;

pub use builder::{RouteGroup, Router};
pub use context::{Extensions, RequestContext};
pub use dispatch::{Dispatcher, DispatcherConfig};
pub use error::{BoxError, ErrorKind, HttpError, RouteError};
pub use method::Method;
pub use params::{ParamError, Params};
pub use response::ResponseWriter;
pub use route::{
    error_handler, handler, middleware, service_handler, ErrorHandler, Handler, HandlerResult, Middleware, Route,
    DEFAULT_TIMEOUT,
};
pub use trie::{split_path, RouteEntry, Trie};
