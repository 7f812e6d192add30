//! Segment trie for route matching
//!
//! Each node stands for one path segment position. Literal children are
//! kept in a lookup table and every `:name` segment at a position shares a
//! single parameter child, so a literal segment always takes precedence
//! over a parameter at the same depth without depending on iteration order.

use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use memchr::memchr_iter;
use tracing::debug;

use crate::error::RouteError;
use crate::method::Method;
use crate::params::Params;
use crate::route::{Handler, Route};

/// Immutable route trie, safe to share between any number of tasks
pub struct Trie {
    root: Node,
    routes: usize,
    leaves: AHashMap<Method, usize>,
}

#[derive(Default)]
struct Node {
    /// Literal children keyed by exact segment text
    literals: AHashMap<String, Node>,
    /// Child shared by every parameter segment at this position
    param: Option<Box<Node>>,
    /// Routes ending at this node
    leaves: AHashMap<Method, Arc<RouteEntry>>,
}

/// A route registered at a leaf, ready to be called
pub struct RouteEntry {
    route: Route,
    handler: Handler,
    /// (segment depth, parameter name), recorded for this route only
    params: Vec<(usize, String)>,
}

impl RouteEntry {
    /// The route this entry was built from
    pub fn route(&self) -> &Route {
        &self.route
    }

    /// The route's handler with all of its middleware applied
    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Parameter names this route declared, in path order
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|(_, name)| name.as_str())
    }

    /// Bind this route's parameter names to the segments of a request path
    pub fn bind(&self, segments: &[&str]) -> Params {
        self.params
            .iter()
            .filter_map(|(depth, name)| segments.get(*depth).map(|value| (name.as_str(), *value)))
            .collect()
    }
}

impl fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteEntry")
            .field("route", &self.route)
            .field("params", &self.params)
            .finish()
    }
}

/// Path segment types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Param(&'a str),
}

/// Split a request path into segments
///
/// The leading `/` is required and dropped; `"/"` yields one empty segment
/// and a trailing slash yields a trailing empty segment. Returns `None` for
/// paths that are not absolute.
pub fn split_path(path: &str) -> Option<Vec<&str>> {
    let rest = path.strip_prefix('/')?;
    let bytes = rest.as_bytes();

    let mut segments = Vec::with_capacity(memchr_iter(b'/', bytes).count() + 1);
    let mut start = 0;
    for pos in memchr_iter(b'/', bytes) {
        segments.push(&rest[start..pos]);
        start = pos + 1;
    }
    segments.push(&rest[start..]);
    Some(segments)
}

/// Validate a route pattern and classify its segments
fn parse_pattern(path: &str) -> Result<Vec<Segment<'_>>, RouteError> {
    if path.is_empty() {
        return Err(RouteError::EmptyPath);
    }
    if path.contains("//") {
        return Err(RouteError::EmptySegment(path.to_string()));
    }
    if !path.starts_with('/') {
        return Err(RouteError::MissingLeadingSlash(path.to_string()));
    }

    let mut names: Vec<&str> = Vec::new();
    split_path(path)
        .unwrap_or_default()
        .into_iter()
        .map(|segment| match segment.strip_prefix(':') {
            Some("") => Err(RouteError::UnnamedParameter(path.to_string())),
            Some(name) if names.contains(&name) => Err(RouteError::DuplicateParameter {
                path: path.to_string(),
                name: name.to_string(),
            }),
            Some(name) => {
                names.push(name);
                Ok(Segment::Param(name))
            }
            None => Ok(Segment::Literal(segment)),
        })
        .collect()
}

impl Trie {
    /// Build a trie from a flat list of routes
    ///
    /// Fails on the first malformed path or conflicting registration. No
    /// partially built trie is ever returned.
    pub fn build(routes: &[Route]) -> Result<Self, RouteError> {
        if routes.is_empty() {
            return Err(RouteError::NoRoutes);
        }

        let mut trie = Trie {
            root: Node::default(),
            routes: 0,
            leaves: AHashMap::new(),
        };
        for route in routes {
            trie.insert(route)?;
        }

        debug!(routes = trie.routes, "route trie built");
        Ok(trie)
    }

    fn insert(&mut self, route: &Route) -> Result<(), RouteError> {
        let segments = parse_pattern(route.path())?;

        let mut params = Vec::new();
        let mut node = &mut self.root;
        for (depth, segment) in segments.iter().enumerate() {
            node = match *segment {
                Segment::Literal(text) => node.literals.entry(text.to_string()).or_default(),
                Segment::Param(name) => {
                    params.push((depth, name.to_string()));
                    node.param.get_or_insert_with(Box::default).as_mut()
                }
            };
        }

        // Check every method before registering any of them
        if let Some((method, existing)) = route
            .methods()
            .iter()
            .find_map(|method| node.leaves.get(method).map(|entry| (*method, entry)))
        {
            return Err(RouteError::DuplicateRoute {
                method,
                path: route.path().to_string(),
                existing: existing.route.path().to_string(),
            });
        }

        let entry = Arc::new(RouteEntry {
            route: route.clone(),
            handler: route.compose(),
            params,
        });
        for method in route.methods() {
            node.leaves.insert(*method, entry.clone());
            *self.leaves.entry(*method).or_default() += 1;
        }
        self.routes += 1;

        debug!(path = route.path(), methods = ?route.methods(), "route inserted");
        Ok(())
    }

    /// Find the entry registered for `method` at the given path segments
    ///
    /// Literal children are tried before the parameter child; when the
    /// literal branch cannot resolve the rest of the path the parameter
    /// branch is tried instead.
    pub fn find(&self, segments: &[&str], method: Method) -> Option<&Arc<RouteEntry>> {
        Self::find_recursive(&self.root, segments, method)
    }

    fn find_recursive<'t>(
        node: &'t Node,
        segments: &[&str],
        method: Method,
    ) -> Option<&'t Arc<RouteEntry>> {
        let Some((segment, rest)) = segments.split_first() else {
            return node.leaves.get(&method);
        };

        if let Some(child) = node.literals.get(*segment) {
            if let Some(entry) = Self::find_recursive(child, rest, method) {
                return Some(entry);
            }
        }

        // Parameters capture exactly one non-empty segment
        if segment.is_empty() {
            return None;
        }
        node.param
            .as_deref()
            .and_then(|child| Self::find_recursive(child, rest, method))
    }

    /// Split, match and bind in one step
    pub fn at(&self, method: Method, path: &str) -> Option<(&Arc<RouteEntry>, Params)> {
        let segments = split_path(path)?;
        let entry = self.find(&segments, method)?;
        let params = entry.bind(&segments);
        Some((entry, params))
    }

    /// Number of routes the trie was built from
    pub fn route_count(&self) -> usize {
        self.routes
    }

    /// Number of routes registered for a specific method
    pub fn len(&self, method: Method) -> usize {
        self.leaves.get(&method).copied().unwrap_or(0)
    }

    /// True if no route answers any method
    pub fn is_empty(&self) -> bool {
        self.leaves.values().all(|count| *count == 0)
    }

    /// Methods with at least one registered route
    pub fn methods(&self) -> impl Iterator<Item = Method> + '_ {
        self.leaves.keys().copied()
    }
}

impl fmt::Debug for Trie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trie")
            .field("routes", &self.routes)
            .field("leaves", &self.leaves)
            .finish()
    }
}
