use std::{
    future::IntoFuture,
    io,
    net::UdpSocket,
    path::PathBuf,
    process::{Command, Stdio},
    sync::Arc,
    time::Duration,
};

use anyhow::{bail, Context};
use axum::{
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::IntoResponse,
    Router,
};
use tokio::net::TcpListener;
use tower_http::{services::ServeDir, set_header::SetResponseHeaderLayer};

mod assets;
mod encoding;

struct SiteState {
    root: PathBuf,
}

enum ApiError {
    Internal(&'static str),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        }
        .into_response()
    }
}

fn with_headers(router: Router, headers: Vec<(HeaderName, HeaderValue)>) -> Router {
    headers.into_iter().fold(router, |router, (name, value)| {
        router.layer(SetResponseHeaderLayer::overriding(name, value))
    })
}

/// Serves `root` with long-lived caching, preferring precompressed siblings.
pub fn production_router(root: PathBuf, cache_max_age: Duration) -> Router {
    let state = Arc::new(SiteState { root });
    let router = Router::new().fallback(assets::get).with_state(state);
    with_headers(
        router,
        vec![
            (
                header::CACHE_CONTROL,
                format!("public, max-age={}", cache_max_age.as_secs())
                    .parse()
                    .expect("max-age parsing failed"),
            ),
            (
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ),
            (header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY")),
            (
                header::X_XSS_PROTECTION,
                HeaderValue::from_static("1; mode=block"),
            ),
        ],
    )
}

/// Serves `root` as-is with caching disabled.
pub fn development_router(root: PathBuf) -> Router {
    let router = Router::new().fallback_service(ServeDir::new(root));
    with_headers(
        router,
        vec![
            (
                header::CACHE_CONTROL,
                HeaderValue::from_static("no-cache, no-store, must-revalidate"),
            ),
            (header::PRAGMA, HeaderValue::from_static("no-cache")),
            (header::EXPIRES, HeaderValue::from_static("0")),
        ],
    )
}

async fn bind(port: u16) -> anyhow::Result<TcpListener> {
    match TcpListener::bind(("0.0.0.0", port)).await {
        Ok(listener) => Ok(listener),
        Err(err) if err.kind() == io::ErrorKind::AddrInUse => {
            bail!("Port {port} is already in use, stop the other server or pick another port")
        }
        Err(err) => Err(err).context("Error starting server"),
    }
}

/// Runs until the listener fails or the operator interrupts.
async fn serve(listener: TcpListener, router: Router, farewell: &str) -> anyhow::Result<()> {
    tokio::select! {
        res = axum::serve(listener, router).into_future() => res.context("Server failed")?,
        _ = tokio::signal::ctrl_c() => println!("\n{farewell}"),
    }
    Ok(())
}

/// Address other machines on the LAN can reach us at.
fn local_ip() -> String {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|_| "localhost".to_string())
}

fn open_browser(url: &str) -> io::Result<()> {
    let mut cmd = if cfg!(target_os = "macos") {
        Command::new("open")
    } else if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", "start", ""]);
        cmd
    } else {
        Command::new("xdg-open")
    };
    cmd.arg(url)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
}

pub async fn run_development(root: PathBuf, port: u16, launch_browser: bool) -> anyhow::Result<()> {
    if !root.join("index.html").is_file() {
        bail!(
            "index.html not found in {}, run this from the portfolio root",
            root.display()
        );
    }
    let listener = bind(port).await?;
    let url = format!("http://localhost:{port}");
    println!("Portfolio development server starting...");
    println!("Serving files from: {}", root.display());
    println!("Server running at: {url}");
    println!("Local network access: http://{}:{port}", local_ip());
    println!("Press Ctrl+C to stop the server");
    println!("{}", "-".repeat(50));

    if launch_browser {
        match open_browser(&url) {
            Ok(()) => log::info!("Opening browser automatically"),
            Err(err) => {
                log::debug!("Browser launch failed: {err}");
                println!("Open {url} in your browser");
            }
        }
    }
    serve(listener, development_router(root), "Server stopped").await
}

pub async fn run_production(dist: PathBuf, port: u16, cache_max_age: Duration) -> anyhow::Result<()> {
    if !dist.is_dir() {
        log::error!(
            "{} not found, run the production build first",
            dist.display()
        );
        return Ok(());
    }
    let listener = bind(port).await?;
    println!("Production server starting...");
    println!("Serving files from: {}", dist.display());
    println!("Server running at: http://localhost:{port}");
    println!("Serving optimized and compressed assets");
    println!("Press Ctrl+C to stop the server");
    println!("{}", "-".repeat(50));
    serve(
        listener,
        production_router(dist, cache_max_age),
        "Production server stopped",
    )
    .await
}
