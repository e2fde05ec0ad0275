//! Loopback HTTP server for archive resources.
//!
//! One worker thread accepts and answers requests sequentially from an
//! immutable [`ResourceCatalog`]. A request for the done-signal path is
//! answered and then forwarded to the shutdown channel.

pub mod route;
pub mod shutdown;

use mv_core::ViewerError;
use mv_core::ViewerResult;
use mv_rewrite::local_path;
use mv_store::Resource;
use mv_store::ResourceCatalog;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::thread;
use std::thread::JoinHandle;
use tiny_http::Header;
use tiny_http::Request;
use tiny_http::Response;
use tiny_http::Server;
use tiny_http::StatusCode;
use tracing::debug;
use tracing::info;
use tracing::warn;

pub use route::DONE_SIGNAL_PATH;
pub use route::Route;
pub use route::route;
pub use shutdown::ShutdownReason;
pub use shutdown::ShutdownSignal;
pub use shutdown::ShutdownTrigger;
pub use shutdown::shutdown_channel;

const BIND_ADDRESS: &str = "127.0.0.1:0";
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Running content server. Dropping it stops the worker thread.
pub struct ContentServer {
    server: Arc<Server>,
    addr: SocketAddr,
    closing: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl ContentServer {
    /// Binds an ephemeral loopback port and starts serving.
    pub fn bind(catalog: Arc<ResourceCatalog>, trigger: ShutdownTrigger) -> ViewerResult<Self> {
        let server = Server::http(BIND_ADDRESS).map_err(|error| {
            ViewerError::new(
                "server.bind_failed",
                format!("failed to listen on {BIND_ADDRESS}: {error}"),
            )
        })?;
        let addr = server.server_addr().to_ip().ok_or_else(|| {
            ViewerError::new("server.bind_failed", "listener has no IP address")
        })?;

        let server = Arc::new(server);
        let closing = Arc::new(AtomicBool::new(false));
        let worker = {
            let server = Arc::clone(&server);
            let closing = Arc::clone(&closing);
            thread::Builder::new()
                .name("mv-content-server".to_owned())
                .spawn(move || serve(&server, &catalog, &trigger, &closing))
                .map_err(|error| {
                    ViewerError::new(
                        "server.spawn_failed",
                        format!("failed to start content server thread: {error}"),
                    )
                })?
        };

        info!(%addr, "content server listening");
        Ok(Self {
            server,
            addr,
            closing,
            worker: Some(worker),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Browser-facing URL for a stored location.
    pub fn local_url(&self, location: &str) -> String {
        format!("http://{}{}", self.addr, local_path(location))
    }

    /// Stops accepting requests and waits for the worker to finish.
    pub fn close(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.closing.store(true, Ordering::SeqCst);
        self.server.unblock();
        if worker.join().is_err() {
            warn!("content server thread panicked");
        }
        debug!(addr = %self.addr, "content server closed");
    }
}

impl Drop for ContentServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn serve(
    server: &Server,
    catalog: &ResourceCatalog,
    trigger: &ShutdownTrigger,
    closing: &AtomicBool,
) {
    loop {
        let request = match server.recv() {
            Ok(request) => request,
            Err(error) => {
                if closing.load(Ordering::SeqCst) {
                    break;
                }
                warn!(%error, "failed to receive request");
                continue;
            }
        };
        handle(request, catalog, trigger);
    }
}

fn handle(request: Request, catalog: &ResourceCatalog, trigger: &ShutdownTrigger) {
    let target = request.url().to_owned();

    let result = match route(catalog, &target) {
        Route::DoneSignal => {
            let result = request.respond(Response::empty(StatusCode(204)));
            info!("initial document finished loading");
            if !trigger.fire(ShutdownReason::DoneSignal) {
                debug!("done signal arrived after shutdown");
            }
            result
        }
        Route::Resource(resource) => {
            debug!(location = resource.location(), "serving resource");
            request.respond(resource_response(resource))
        }
        Route::NotFound(key) => {
            debug!(path = %target, key = %key, "resource not found");
            request.respond(Response::from_string("not found").with_status_code(StatusCode(404)))
        }
    };

    if let Err(error) = result {
        debug!(path = %target, %error, "failed to write response");
    }
}

fn resource_response(resource: &Resource) -> Response<&[u8]> {
    let mut headers = Vec::with_capacity(1);
    match content_type_header(&resource.content_type) {
        Ok(header) => headers.push(header),
        Err(()) => warn!(
            location = resource.location(),
            "content type is not a valid header value"
        ),
    }

    Response::new(
        StatusCode(200),
        headers,
        resource.data.as_slice(),
        Some(resource.data.len()),
        None,
    )
    .with_chunked_threshold(usize::MAX)
}

fn content_type_header(content_type: &str) -> Result<Header, ()> {
    let value = content_type.trim();
    let value = if value.is_empty() {
        FALLBACK_CONTENT_TYPE
    } else {
        value
    };

    Header::from_bytes(&b"Content-Type"[..], value.as_bytes())
        .or_else(|()| Header::from_bytes(&b"Content-Type"[..], FALLBACK_CONTENT_TYPE.as_bytes()))
}
