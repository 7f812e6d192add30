//! Path parameters bound from a matched request

use ahash::AHashMap;

/// Path parameters captured for one request
///
/// Values are the raw segments of the request path (no percent-decoding),
/// keyed by the names the matched route declared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    inner: AHashMap<String, String>,
}

impl Params {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty parameters with room for `capacity` names
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: AHashMap::with_capacity(capacity),
        }
    }

    #[inline]
    pub(crate) fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.insert(key.into(), value.into());
    }

    /// Raw value bound to `name`
    #[inline]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner.get(name).map(String::as_str)
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterate over all parameters in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parse the value bound to `name`
    ///
    /// The resulting error converts into a `400` [`HttpError`](crate::HttpError),
    /// so handlers can use `?` directly.
    pub fn parse<T>(&self, name: &str) -> Result<T, ParamError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        let value = self
            .get(name)
            .ok_or_else(|| ParamError::Missing(name.to_string()))?;
        value.parse::<T>().map_err(|e| ParamError::Parse {
            name: name.to_string(),
            value: value.to_string(),
            error: e.to_string(),
        })
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// Parameter lookup errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamError {
    #[error("parameter '{0}' not found")]
    Missing(String),

    #[error("failed to parse parameter '{name}' with value '{value}': {error}")]
    Parse {
        name: String,
        value: String,
        error: String,
    },
}

impl From<ParamError> for crate::error::HttpError {
    fn from(err: ParamError) -> Self {
        crate::error::HttpError::new(400, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let params: Params = [("id", "5"), ("name", "bill")].into_iter().collect();

        assert_eq!(params.get("id"), Some("5"));
        assert_eq!(params.get("name"), Some("bill"));
        assert!(params.get("Name").is_none());
        assert!(params.contains("id"));
        assert_eq!(params.len(), 2);

        let mut pairs: Vec<_> = params.iter().collect();
        pairs.sort();
        assert_eq!(pairs, vec![("id", "5"), ("name", "bill")]);
    }

    #[test]
    fn test_typed_parse() {
        let mut params = Params::with_capacity(2);
        params.insert("page", "3");
        params.insert("user", "bill");

        assert_eq!(params.parse::<u32>("page"), Ok(3));
        assert!(matches!(
            params.parse::<u32>("user"),
            Err(ParamError::Parse { ref value, .. }) if value == "bill"
        ));
        assert_eq!(
            params.parse::<u32>("limit"),
            Err(ParamError::Missing("limit".to_string()))
        );
    }

    #[test]
    fn test_param_error_becomes_bad_request() {
        let err: crate::error::HttpError = ParamError::Missing("id".to_string()).into();
        assert_eq!(err.code(), 400);
    }
}
