//! The HTTP front door: hostname dispatch into the lifecycle core
//!
//! Every request is dispatched by its Host header. The optional status host
//! renders the status page; any other hostname asks the core to start the
//! matching container and answers 202 with the splash page. The actual
//! request proxying to the backend is the reverse proxy's job, not ours.

use crate::core::Core;
use crate::error::{json_error_response, CoreError, GateErrorCode};
use crate::render;
use crate::state::ManagedState;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HOST, CONTENT_TYPE};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Path serving the machine-readable status document on the status host
const STATUS_JSON_PATH: &str = "/__idlegate/status.json";

/// The front door server.
pub struct FrontDoor {
    bind_addr: SocketAddr,
    core: Arc<Core>,
    status_host: Option<String>,
    shutdown_rx: watch::Receiver<bool>,
}

impl FrontDoor {
    pub fn new(
        bind_addr: SocketAddr,
        core: Arc<Core>,
        status_host: Option<String>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            bind_addr,
            core,
            status_host,
            shutdown_rx,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "Front door listening");

        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let core = Arc::clone(&self.core);
                            let status_host = self.status_host.clone();

                            tokio::spawn(async move {
                                let io = TokioIo::new(stream);
                                let service = service_fn(move |req: Request<Incoming>| {
                                    let core = Arc::clone(&core);
                                    let status_host = status_host.clone();
                                    async move { handle_request(req, core, status_host).await }
                                });

                                if let Err(e) = AutoBuilder::new(TokioExecutor::new())
                                    .serve_connection(io, service)
                                    .await
                                {
                                    debug!(addr = %addr, error = %e, "connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Front door shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

async fn handle_request(
    req: Request<Incoming>,
    core: Arc<Core>,
    status_host: Option<String>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let Some(hostname) = request_hostname(&req) else {
        return Ok(json_error_response(
            GateErrorCode::MissingHostHeader,
            "request carries no Host header",
        ));
    };

    if status_host.as_deref() == Some(hostname.as_str()) {
        return Ok(serve_status(&core, req.uri().path()).await);
    }

    match core.start_host(&hostname).await {
        Ok(state) => Ok(splash_response(&hostname, &state)),
        Err(CoreError::NotFound) => Ok(json_error_response(
            GateErrorCode::UnknownHost,
            format!("no lazy-managed container for host '{}'", hostname),
        )),
        Err(e) => {
            warn!(hostname = %hostname, error = %e, "failed to start container for host");
            Ok(json_error_response(GateErrorCode::ControllerError, e.to_string()))
        }
    }
}

/// The request's hostname: Host header first (HTTP/1.1), URI authority as the
/// HTTP/2 fallback, port stripped.
fn request_hostname(req: &Request<Incoming>) -> Option<String> {
    let raw = req
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| req.uri().host())?;

    // Strip any port; bracketed IPv6 literals keep their brackets' content.
    let host = if raw.starts_with('[') {
        raw.split(']').next().map(|h| &h[1..]).unwrap_or("")
    } else {
        raw.rsplit_once(':').map(|(h, _)| h).unwrap_or(raw)
    };
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

/// The splash ships with 202 Accepted: the backend was asked to start but the
/// request was not served.
fn splash_response(hostname: &str, state: &ManagedState) -> Response<Full<Bytes>> {
    let html = render::splash(hostname, state);
    Response::builder()
        .status(StatusCode::ACCEPTED)
        .header(CONTENT_TYPE, "text/html; charset=utf-8")
        .body(Full::new(Bytes::from(html)))
        .expect("valid response with static headers")
}

#[derive(Debug, Serialize)]
struct StatusEntry {
    name: String,
    uptime_secs: u64,
    idle_secs: u64,
    rx_bytes: u64,
    tx_bytes: u64,
    stop_delay_secs: u64,
    starting: bool,
}

impl From<&ManagedState> for StatusEntry {
    fn from(state: &ManagedState) -> Self {
        Self {
            name: state.name().to_string(),
            uptime_secs: state.uptime().as_secs(),
            idle_secs: state.idle_for().as_secs(),
            rx_bytes: state.rx(),
            tx_bytes: state.tx(),
            stop_delay_secs: state.stop_delay().as_secs(),
            starting: state.pinned(),
        }
    }
}

async fn serve_status(core: &Arc<Core>, path: &str) -> Response<Full<Bytes>> {
    let active = core.active_containers().await;

    if path == STATUS_JSON_PATH {
        let entries: Vec<StatusEntry> = active.iter().map(StatusEntry::from).collect();
        let body = serde_json::to_string(&entries).unwrap_or_else(|_| "[]".to_string());
        return Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body)))
            .expect("valid response with static headers");
    }

    // Discovery failures degrade to empty listings; the page stays useful.
    let qualifying = core
        .discovery()
        .qualifying_containers()
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "unable to list qualifying containers");
            Vec::new()
        });
    let providers = core
        .discovery()
        .provider_containers()
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "unable to list provider containers");
            Vec::new()
        });

    let html = render::status_page(&active, &qualifying, &providers);
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/html; charset=utf-8")
        .body(Full::new(Bytes::from(html)))
        .expect("valid response with static headers")
}
