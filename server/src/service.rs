//! Listener lifecycle
//!
//! A [`Service`] owns one accept loop running in the background. Each
//! connection is served by hyper on its own task; each request body is
//! collected in full and handed to the [`Dispatcher`].

use std::convert::Infallible;
use std::net::SocketAddr;

use bytes::Bytes;
use http::header::{self, HeaderValue};
use http::StatusCode;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use routem_core::Dispatcher;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::ServerResult;

/// Per-connection limits
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    /// Bodies larger than this are answered with `413`
    pub max_request_body_size: usize,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            max_request_body_size: 16 * 1024 * 1024,
        }
    }
}

impl From<&ServerConfig> for ServiceOptions {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_request_body_size: config.max_request_body_size,
        }
    }
}

/// A running HTTP service
#[derive(Debug)]
pub struct Service {
    address: SocketAddr,
    token: CancellationToken,
    task: JoinHandle<ServerResult<()>>,
}

impl Service {
    /// Bind `address` and start serving in the background
    ///
    /// Returns once the listener is bound. Bind errors are returned
    /// directly and no service is started.
    pub async fn run(address: impl ToSocketAddrs, dispatcher: Dispatcher) -> ServerResult<Self> {
        let listener = TcpListener::bind(address).await?;
        Self::serve(listener, dispatcher, ServiceOptions::default())
    }

    /// Start serving on an already bound listener
    pub fn serve(
        listener: TcpListener,
        dispatcher: Dispatcher,
        options: ServiceOptions,
    ) -> ServerResult<Self> {
        let address = listener.local_addr()?;
        let token = CancellationToken::new();

        info!(
            %address,
            routes = dispatcher.trie().route_count(),
            "routem listening on http://{}",
            address
        );
        let task = tokio::spawn(accept_loop(listener, dispatcher, options, token.clone()));

        Ok(Self {
            address,
            token,
            task,
        })
    }

    /// The bound address, with the actual port if `0` was requested
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// True until the accept loop exits
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop accepting connections
    ///
    /// Connections that are already open are served to completion.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Token that stops the accept loop when cancelled
    ///
    /// Lets another task, such as a signal handler, stop the service while
    /// it is being waited on.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wait for the accept loop to exit
    ///
    /// Returns `Ok` after [`stop`](Self::stop), or the error that ended
    /// the loop.
    pub async fn wait(self) -> ServerResult<()> {
        self.task.await?
    }
}

async fn accept_loop(
    listener: TcpListener,
    dispatcher: Dispatcher,
    options: ServiceOptions,
    token: CancellationToken,
) -> ServerResult<()> {
    loop {
        let (stream, remote_addr) = tokio::select! {
            _ = token.cancelled() => {
                info!("service stopped");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(err) => {
                    error!(error = %err, "accept failed");
                    return Err(err.into());
                }
            },
        };

        let dispatcher = dispatcher.clone();
        let limit = options.max_request_body_size;

        tokio::spawn(async move {
            let io = TokioIo::new(stream);

            let service = service_fn(move |req| {
                let dispatcher = dispatcher.clone();
                async move { Ok::<_, Infallible>(handle_request(&dispatcher, req, limit).await) }
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                error!(%remote_addr, error = %err, "error serving connection");
            }
        });
    }
}

/// Collect the body and hand the request to the dispatcher
async fn handle_request(
    dispatcher: &Dispatcher,
    request: hyper::Request<Incoming>,
    limit: usize,
) -> hyper::Response<Full<Bytes>> {
    let (parts, body) = request.into_parts();

    let body = match Limited::new(body, limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
            warn!(path = parts.uri.path(), limit, "request body too large");
            return plain_text(StatusCode::PAYLOAD_TOO_LARGE);
        }
        Err(err) => {
            debug!(path = parts.uri.path(), error = %err, "failed to read request body");
            return plain_text(StatusCode::BAD_REQUEST);
        }
    };

    dispatcher
        .serve(http::Request::from_parts(parts, body))
        .await
        .map(Full::new)
}

fn plain_text(status: StatusCode) -> hyper::Response<Full<Bytes>> {
    let reason = status.canonical_reason().unwrap_or("Error");
    let mut response = hyper::Response::new(Full::new(Bytes::from(format!("{reason}\n"))));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response.headers_mut().insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response
}
