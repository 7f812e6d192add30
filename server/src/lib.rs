//! # routem
//!
//! HTTP service for the routem router: binds a listener, feeds every
//! request through a [`Dispatcher`](routem_core::Dispatcher) and reports
//! its lifecycle.
//!
//! ## Quick Start
//!
//! ```no_run
//! use http::StatusCode;
//! use routem_server::{DispatcherConfig, Router, Service};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut router = Router::new();
//!     router.get("/hello/:name", |ctx| async move {
//!         let greeting = format!("Hello, {}!", ctx.param("name").unwrap_or("stranger"));
//!         ctx.response().text(StatusCode::OK, greeting);
//!         Ok(())
//!     });
//!
//!     let dispatcher = router.build(DispatcherConfig::default())?;
//!     let service = Service::run("127.0.0.1:3000", dispatcher).await?;
//!     println!("listening on http://{}", service.address());
//!     service.wait().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod service;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use service::{Service, ServiceOptions};

// Re-export the router so applications only need this crate
pub use routem_core::{
    error_handler, handler, middleware, Dispatcher, DispatcherConfig, ErrorHandler, Extensions,
    Handler, HandlerResult, HttpError, Method, Middleware, Params, RequestContext, ResponseWriter,
    Route, RouteError, RouteGroup, Router,
};
