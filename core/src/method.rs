//! HTTP method tokens used as leaf keys in the route trie

use std::fmt;
use std::str::FromStr;

use crate::error::RouteError;

/// HTTP method a route can be registered for
///
/// Only the nine standard methods are routable. Extension methods coming
/// in from the wire have no `Method` and therefore never match a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Method {
    GET = 0,
    POST = 1,
    PUT = 2,
    DELETE = 3,
    PATCH = 4,
    HEAD = 5,
    OPTIONS = 6,
    CONNECT = 7,
    TRACE = 8,
}

impl Method {
    /// No methods at all. A route registered with this set never matches,
    /// which is handy for switching an endpoint off without deleting it.
    pub const NONE: &'static [Method] = &[];

    /// The methods a typical resource endpoint answers.
    pub const CRUD: &'static [Method] = &[
        Method::DELETE,
        Method::GET,
        Method::PUT,
        Method::PATCH,
        Method::POST,
    ];

    /// Every routable method.
    pub const ANY: &'static [Method] = &[
        Method::CONNECT,
        Method::DELETE,
        Method::GET,
        Method::HEAD,
        Method::OPTIONS,
        Method::PATCH,
        Method::PUT,
        Method::POST,
        Method::TRACE,
    ];

    /// Look up the method for a wire token
    ///
    /// Tokens are case-sensitive, as HTTP requires.
    #[inline]
    pub fn from_bytes(token: &[u8]) -> Option<Self> {
        Method::ANY
            .iter()
            .copied()
            .find(|method| method.as_str().as_bytes() == token)
    }

    /// The method's wire token
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::PATCH => "PATCH",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::CONNECT => "CONNECT",
            Method::TRACE => "TRACE",
        }
    }
}

impl fmt::Display for Method {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::from_bytes(s.as_bytes()).ok_or_else(|| RouteError::UnknownMethod(s.to_string()))
    }
}

impl TryFrom<&http::Method> for Method {
    type Error = RouteError;

    fn try_from(method: &http::Method) -> Result<Self, Self::Error> {
        method.as_str().parse()
    }
}

impl From<Method> for http::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::GET => http::Method::GET,
            Method::POST => http::Method::POST,
            Method::PUT => http::Method::PUT,
            Method::DELETE => http::Method::DELETE,
            Method::PATCH => http::Method::PATCH,
            Method::HEAD => http::Method::HEAD,
            Method::OPTIONS => http::Method::OPTIONS,
            Method::CONNECT => http::Method::CONNECT,
            Method::TRACE => http::Method::TRACE,
        }
    }
}
