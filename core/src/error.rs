//! Build-time and request-time error types
//!
//! [`RouteError`] is raised while the trie is built and aborts startup.
//! [`HttpError`] is produced while a request is dispatched and is always
//! resolved into a written response, never propagated to the listener.

use std::borrow::Cow;

use http::StatusCode;
use thiserror::Error;

use crate::method::Method;

/// Boxed error returned by error handlers
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Configuration errors detected while building the route trie
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// The route list was empty
    #[error("received no routes")]
    NoRoutes,

    /// A route had a zero length path
    #[error("received a zero length path")]
    EmptyPath,

    /// A route path did not start with `/`
    #[error("route does not begin with a slash: {0}")]
    MissingLeadingSlash(String),

    /// A route path contained `//`
    #[error("route contains an empty segment: {0}")]
    EmptySegment(String),

    /// A route path contained a bare `:` segment
    #[error("route contains an un-named parameter: {0}")]
    UnnamedParameter(String),

    /// A route path declared the same parameter twice
    #[error("route {path} has duplicate parameter: {name}")]
    DuplicateParameter { path: String, name: String },

    /// Two routes registered the same method at the same node
    #[error("duplicate {method} route: {path} - {existing}")]
    DuplicateRoute {
        method: Method,
        path: String,
        existing: String,
    },

    /// A method token that is not routable
    #[error("unknown HTTP method: {0}")]
    UnknownMethod(String),
}

/// Where a request-time error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No route matched the request path and method
    RouteNotFound,
    /// The handler did not finish before the route's deadline
    RequestTimeout,
    /// The handler (or one of its middleware) returned an error or panicked
    Handler,
}

/// An error carrying an HTTP status code
///
/// The code is advisory: the dispatcher's built-in fallback always answers
/// `500` for anything other than a missing route. Configure an error
/// handler to turn the code into the response status.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HttpError {
    code: u16,
    message: Cow<'static, str>,
    kind: ErrorKind,
}

impl HttpError {
    /// Create a handler error with the given status code and message
    pub fn new(code: u16, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            kind: ErrorKind::Handler,
        }
    }

    /// The shared "no such route" error
    pub fn not_found() -> Self {
        Self {
            code: StatusCode::NOT_FOUND.as_u16(),
            message: Cow::Borrowed("No Such Route"),
            kind: ErrorKind::RouteNotFound,
        }
    }

    /// The error synthesized when a handler outlives its deadline
    pub fn timeout() -> Self {
        Self {
            code: StatusCode::REQUEST_TIMEOUT.as_u16(),
            message: Cow::Borrowed("Request Timed Out!"),
            kind: ErrorKind::RequestTimeout,
        }
    }

    /// Raw status code carried by this error
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Status code, if the carried code is a valid HTTP status
    pub fn status(&self) -> Option<StatusCode> {
        StatusCode::from_u16(self.code).ok()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::RouteNotFound
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == ErrorKind::RequestTimeout
    }
}

impl From<StatusCode> for HttpError {
    fn from(status: StatusCode) -> Self {
        HttpError::new(
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown Status"),
        )
    }
}
