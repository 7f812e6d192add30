//! Response sink shared between a handler and the dispatcher
//!
//! A [`ResponseWriter`] collects the status, headers and body a handler
//! produces. The dispatcher closes it once the request is resolved; a
//! handler that is still running after its deadline can keep writing, but
//! nothing it writes reaches the client.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::{Bytes, BytesMut};
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct State {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
    closed: bool,
}

/// Cloneable handle to the response of one request
///
/// All clones write into the same response. Writes return `false` when
/// they had no effect (the response was already closed, or the status was
/// already committed).
#[derive(Debug, Clone, Default)]
pub struct ResponseWriter {
    state: Arc<Mutex<State>>,
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set a header. Headers are frozen once the status is committed.
    pub fn set_header(&self, name: HeaderName, value: HeaderValue) -> bool {
        let mut state = self.lock();
        if state.closed || state.status.is_some() {
            debug!(header = %name, "header set after response was committed");
            return false;
        }
        state.headers.insert(name, value);
        true
    }

    /// Add a header value, keeping any already set under `name`
    pub fn append_header(&self, name: HeaderName, value: HeaderValue) -> bool {
        let mut state = self.lock();
        if state.closed || state.status.is_some() {
            debug!(header = %name, "header set after response was committed");
            return false;
        }
        state.headers.append(name, value);
        true
    }

    /// Commit the status code. Only the first call has an effect.
    pub fn write_status(&self, status: StatusCode) -> bool {
        let mut state = self.lock();
        if state.closed {
            debug!(%status, "status written to a closed response");
            return false;
        }
        if let Some(existing) = state.status {
            warn!(%existing, attempted = %status, "superfluous status write");
            return false;
        }
        state.status = Some(status);
        true
    }

    /// Append to the body, committing `200 OK` if no status was written yet
    pub fn write(&self, data: impl AsRef<[u8]>) -> bool {
        let mut state = self.lock();
        if state.closed {
            debug!("body written to a closed response");
            return false;
        }
        state.status.get_or_insert(StatusCode::OK);
        state.body.extend_from_slice(data.as_ref());
        true
    }

    /// Write a plain-text body with the given status
    pub fn text(&self, status: StatusCode, body: impl AsRef<str>) -> bool {
        self.set_header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        self.write_status(status) && self.write(body.as_ref())
    }

    /// Reply with a plain-text error message and status
    ///
    /// Sets `content-type: text/plain; charset=utf-8` and
    /// `x-content-type-options: nosniff`, commits the status and writes
    /// the message followed by a newline. If a status was already
    /// committed only the message is appended.
    pub fn error(&self, status: StatusCode, message: &str) {
        let mut state = self.lock();
        if state.closed {
            debug!(%status, "error written to a closed response");
            return;
        }
        match state.status {
            None => {
                state.headers.remove(header::CONTENT_LENGTH);
                state.headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; charset=utf-8"),
                );
                state.headers.insert(
                    header::X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                );
                state.status = Some(status);
            }
            Some(existing) => {
                warn!(%existing, attempted = %status, "superfluous status write");
            }
        }
        state.body.extend_from_slice(message.as_bytes());
        state.body.extend_from_slice(b"\n");
    }

    /// Status committed so far, if any
    pub fn status(&self) -> Option<StatusCode> {
        self.lock().status
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Close the sink and take the response out of it
    pub(crate) fn finish(&self) -> http::Response<Bytes> {
        let mut state = self.lock();
        state.closed = true;

        let mut response = http::Response::new(state.body.split().freeze());
        *response.status_mut() = state.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = std::mem::take(&mut state.headers);
        response
    }
}
