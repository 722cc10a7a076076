//! HTTP/1.1 JSON service.
//!
//! - `POST /analyze` classify `{"image": "<base64 or data URL>"}`
//! - `GET /health` liveness plus backend summary
//! - `GET /` service info
//!
//! One worker thread per connection, up to [`ApiConfig::max_connections`] in
//! flight; beyond that new connections get `503`. The [`Engine`] is shared and
//! serializes model access itself. Every response closes the connection.

use crate::engine::{AnalysisError, Engine, ERR_INVALID_IMAGE};
use crate::frame::EncodedImage;
use crate::response::{AnalysisReport, ErrorReport};
use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const MAX_HEADER_BYTES: usize = 8192;
const MAX_REQUEST_BYTES: usize = 16 * 1024 * 1024;
const READ_TIMEOUT: Duration = Duration::from_secs(10);
const BUSY_WRITE_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_CONNECTIONS: usize = 64;
const SERVICE_NAME: &str = "TrackMate Activity Detection Server";

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    pub max_connections: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:5001".to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    engine: Arc<Engine>,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, engine: Arc<Engine>) -> Self {
        Self { cfg, engine }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let engine = self.engine;
        let max_connections = self.cfg.max_connections.max(1);
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, engine, max_connections, shutdown_thread) {
                log::error!("activity api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

/// Decrements the in-flight count when a worker finishes, panicking or not.
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn run_api(
    listener: TcpListener,
    engine: Arc<Engine>,
    max_connections: usize,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let in_flight = Arc::new(AtomicUsize::new(0));
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((mut stream, peer)) => {
                if in_flight.fetch_add(1, Ordering::SeqCst) >= max_connections {
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    log::warn!(
                        "activity api busy ({} connections); refusing {}",
                        max_connections,
                        peer
                    );
                    if let Err(err) = refuse_busy(&mut stream) {
                        log::debug!("busy response to {} failed: {}", peer, err);
                    }
                    continue;
                }
                let slot = InFlight(in_flight.clone());
                let engine = engine.clone();
                std::thread::spawn(move || {
                    let _slot = slot;
                    if let Err(err) = handle_connection(stream, &engine) {
                        log::warn!("activity api request from {} rejected: {}", peer, err);
                    }
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn refuse_busy(stream: &mut TcpStream) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_write_timeout(Some(BUSY_WRITE_TIMEOUT))?;
    write_error(stream, 503, "Server busy, retry later")
}

#[derive(Deserialize)]
struct AnalyzeRequest {
    #[serde(default)]
    image: Option<String>,
}

fn handle_connection(mut stream: TcpStream, engine: &Engine) -> Result<()> {
    stream.set_nonblocking(false)?;
    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            write_error(&mut stream, 400, &format!("{}", err))?;
            return Err(err);
        }
    };

    if request.method == "OPTIONS" {
        return write_response(&mut stream, 204, "application/json", b"");
    }

    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/") => write_json(&mut stream, 200, &service_info()),
        ("GET", "/health") => write_json(&mut stream, 200, &health(engine)),
        ("POST", "/analyze") => analyze(&mut stream, engine, &request.body),
        (_, "/" | "/health" | "/analyze") => write_error(&mut stream, 405, "Method not allowed"),
        _ => write_error(&mut stream, 404, "Not found"),
    }
}

fn analyze(stream: &mut TcpStream, engine: &Engine, body: &[u8]) -> Result<()> {
    let payload: AnalyzeRequest = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(_) => return write_error(stream, 400, "Request body must be a JSON object"),
    };
    let image = match payload
        .image
        .as_deref()
        .map(EncodedImage::from_transport)
    {
        Some(Ok(image)) => image,
        _ => return write_error(stream, 400, "No image provided"),
    };

    match engine.analyze(&image) {
        Ok(analysis) => write_json(stream, 200, &AnalysisReport::from_analysis(&analysis)),
        Err(err) => {
            let status = match err.downcast_ref::<AnalysisError>() {
                Some(analysis_err) if analysis_err.code == ERR_INVALID_IMAGE => 400,
                _ => 500,
            };
            log::warn!("analysis failed: {:#}", err);
            write_error(stream, status, &err.to_string())
        }
    }
}

fn service_info() -> serde_json::Value {
    serde_json::json!({
        "name": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "/analyze": "POST - Analyze activity from image",
            "/health": "GET - Health check",
            "/": "GET - This info page",
        },
        "status": "running",
    })
}

fn health(engine: &Engine) -> serde_json::Value {
    let secondary = engine.secondary();
    serde_json::json!({
        "status": "healthy",
        "hand_detector": engine.perception().hand_backend(),
        "object_detector": engine.perception().object_backend(),
        "secondary_fallback": if secondary.is_enabled() { "configured" } else { "disabled" },
        "secondary_source": secondary.source_name(),
        "secondary_timeout_secs": secondary.timeout().as_secs(),
        "proximity_px": engine.proximity_px(),
        "escalation_confidence": engine.escalation_confidence(),
        "version": env!("CARGO_PKG_VERSION"),
    })
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    let mut buf = [0u8; 8192];
    let mut data = Vec::new();
    let header_end = loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before headers completed"));
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(anyhow!("request headers too large"));
        }
    };

    let text = String::from_utf8_lossy(&data[..header_end]).into_owned();
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }

    if headers
        .get("transfer-encoding")
        .is_some_and(|value| value.to_lowercase().contains("chunked"))
    {
        return Err(anyhow!("chunked request bodies are not supported"));
    }
    let content_length = match headers.get("content-length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| anyhow!("invalid Content-Length"))?,
        None if method == "POST" => return Err(anyhow!("Content-Length required")),
        None => 0,
    };
    if content_length > MAX_REQUEST_BYTES {
        return Err(anyhow!("request body too large"));
    }

    let mut body = data.split_off(header_end + 4);
    while body.len() < content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before body completed"));
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);

    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        body,
    })
}

fn write_json<T: serde::Serialize>(stream: &mut TcpStream, status: u16, body: &T) -> Result<()> {
    let payload = serde_json::to_vec(body)?;
    write_response(stream, status, "application/json", &payload)
}

fn write_error(stream: &mut TcpStream, status: u16, message: &str) -> Result<()> {
    write_json(stream, status, &ErrorReport::new(message))
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        204 => "HTTP/1.1 204 No Content",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        503 => "HTTP/1.1 503 Service Unavailable",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nAccess-Control-Allow-Origin: *\r\nAccess-Control-Allow-Methods: GET, POST, OPTIONS\r\nAccess-Control-Allow-Headers: Content-Type\r\nConnection: close\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    body: Vec<u8>,
}
