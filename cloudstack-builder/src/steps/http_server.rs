//! Serves a local directory to the guest during installation.

use crate::errors::BuildError;
use crate::pipeline::{halt, Step, StepAction};
use crate::state::{HttpEndpoint, StateBag};
use async_trait::async_trait;
use axum::Router;
use rand::Rng;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

#[derive(Debug)]
struct RunningServer {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

/// Starts a static file server when `http_directory` is configured.
#[derive(Debug, Default)]
pub struct StepHttpServer {
    server: Option<RunningServer>,
}

impl StepHttpServer {
    /// Creates the step.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn start(&mut self, state: &StateBag, directory: PathBuf) -> Result<HttpEndpoint, BuildError> {
        let config = state.config();
        let ip = outbound_ip(&config.api_url).await?;
        let listener = bind_in_range(ip, config.http_port_min, config.http_port_max).await?;
        let port = listener.local_addr()?.port();

        state
            .ui()
            .say(&format!("Starting HTTP server on port {port}"));
        info!(ip = %ip, port, directory = %directory.display(), "Serving directory over HTTP");

        let app = Router::new()
            .fallback_service(ServeDir::new(directory))
            .layer(TraceLayer::new_for_http());
        let (shutdown, signal) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = signal.await;
                })
                .await;
            if let Err(e) = served {
                warn!(error = %e, "HTTP server stopped with an error");
            }
        });

        self.server = Some(RunningServer {
            shutdown: Some(shutdown),
            task,
        });
        Ok(HttpEndpoint {
            ip: ip.to_string(),
            port,
        })
    }
}

#[async_trait]
impl Step for StepHttpServer {
    fn name(&self) -> &str {
        "http_server"
    }

    async fn run(&mut self, state: &mut StateBag) -> StepAction {
        let Some(directory) = state.config().http_directory.clone() else {
            state.put_http_endpoint(HttpEndpoint::placeholder());
            return StepAction::Continue;
        };

        match self.start(state, directory).await {
            Ok(endpoint) => {
                state.put_http_endpoint(endpoint);
                StepAction::Continue
            }
            Err(e) => halt(state, e),
        }
    }

    async fn cleanup(&mut self, _state: &mut StateBag) {
        if let Some(mut server) = self.server.take() {
            if let Some(shutdown) = server.shutdown.take() {
                let _ = shutdown.send(());
            }
            server.task.abort();
            debug!("HTTP server stopped");
        }
    }
}

/// Local address of the interface that routes toward the API host.
async fn outbound_ip(api_url: &str) -> Result<IpAddr, BuildError> {
    let url = url::Url::parse(api_url)
        .map_err(|e| BuildError::HttpServer(format!("invalid api_url {api_url}: {e}")))?;
    let host = url
        .host()
        .ok_or_else(|| BuildError::HttpServer(format!("api_url {api_url} has no host")))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| BuildError::HttpServer(format!("api_url {api_url} has no port")))?;

    let target = format!("{host}:{port}");
    let probe = match host {
        url::Host::Domain(domain) => TcpStream::connect((domain, port)).await,
        url::Host::Ipv4(ip) => TcpStream::connect(SocketAddr::from((ip, port))).await,
        url::Host::Ipv6(ip) => TcpStream::connect(SocketAddr::from((ip, port))).await,
    }
    .map_err(|e| {
        BuildError::HttpServer(format!(
            "could not reach {target} to determine local address: {e}"
        ))
    })?;
    Ok(probe.local_addr()?.ip())
}

/// Binds a listener on `ip` with a port in `[min, max]`.
///
/// A single-port range gets one attempt. Otherwise random ports are tried
/// until one binds. Port 0 would let the OS pick outside the range.
async fn bind_in_range(ip: IpAddr, min: u16, max: u16) -> Result<TcpListener, BuildError> {
    if min == 0 {
        return Err(BuildError::HttpServer(
            "http_port_min must be greater than 0".to_string(),
        ));
    }
    if min == max {
        return TcpListener::bind((ip, min))
            .await
            .map_err(|e| BuildError::HttpServer(format!("could not bind port {min}: {e}")));
    }

    loop {
        let port: u16 = rand::thread_rng().gen_range(min..=max);
        match TcpListener::bind((ip, port)).await {
            Ok(listener) => return Ok(listener),
            Err(e) => debug!(port, error = %e, "HTTP port unavailable; trying another"),
        }
    }
}
