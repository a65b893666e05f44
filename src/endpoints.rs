//! Endpoint server exposing the live windows, metrics and health checks

use anyhow::Result;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::metrics::metrics;
use crate::types::{BatchReport, PerBlockStats};
use crate::window::SlidingWindow;

/// Read handles on the windows the poll loop writes to
#[derive(Debug, Clone)]
pub struct ServerState {
    pub blocks: SlidingWindow<PerBlockStats>,
    pub batches: SlidingWindow<BatchReport>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Response {
    fn json(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: "application/json",
            body,
        }
    }

    fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            body: body.into().into_bytes(),
        }
    }

    fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            _ => "Internal Server Error",
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            self.status,
            self.reason(),
            self.content_type,
            self.body.len()
        )
        .into_bytes();
        out.extend_from_slice(&self.body);
        out
    }
}

/// Answer one request. Query strings are ignored.
pub fn route(method: &str, target: &str, state: &ServerState) -> Response {
    let path = target.split('?').next().unwrap_or(target);
    if !matches!(path, "/data" | "/batches" | "/metrics" | "/health") {
        return Response::text(404, "Not Found");
    }
    if method != "GET" {
        return Response::text(405, "Method Not Allowed");
    }

    let encoded = match path {
        "/data" => state.blocks.to_json().map_err(anyhow::Error::from),
        "/batches" => state.batches.to_json().map_err(anyhow::Error::from),
        "/metrics" => {
            return match metrics().encode_text() {
                Ok(text) => Response::text(200, text),
                Err(e) => Response::text(500, e.to_string()),
            }
        }
        _ => serde_json::to_vec(&serde_json::json!({
            "status": "ok",
            "window_len": state.blocks.len(),
            "batch_window_len": state.batches.len(),
        }))
        .map_err(anyhow::Error::from),
    };

    match encoded {
        Ok(body) => Response::json(body),
        Err(e) => Response::text(500, e.to_string()),
    }
}

/// Start the endpoint server on `bind:port`
pub async fn endpoint_server(
    bind: &str,
    port: u16,
    state: ServerState,
    cancel: CancellationToken,
) -> Result<()> {
    let addr = format!("{}:{}", bind, port);
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!("Data endpoint listening on {}", addr);
    serve(listener, state, cancel).await
}

/// Accept connections on `listener` until `cancel` fires
pub async fn serve(listener: TcpListener, state: ServerState, cancel: CancellationToken) -> Result<()> {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Data endpoint shutting down");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok((socket, _)) => {
                    let state = state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(socket, &state).await {
                            tracing::error!("Failed to serve request: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}

/// Upper bound on the bytes read while looking for the request line
const MAX_REQUEST_LINE: usize = 8192;

/// Read until the first line break, EOF or [`MAX_REQUEST_LINE`] bytes.
/// The request line may arrive split over several segments.
async fn read_request_line(socket: &mut TcpStream) -> Result<String> {
    let mut head = Vec::with_capacity(1024);
    let mut buf = [0; 1024];

    while head.len() < MAX_REQUEST_LINE {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&buf[..n]);
        if head.contains(&b'\n') {
            break;
        }
    }

    let line = head.split(|b| *b == b'\n').next().unwrap_or_default();
    Ok(String::from_utf8_lossy(line).trim_end().to_string())
}

async fn handle_connection(mut socket: TcpStream, state: &ServerState) -> Result<()> {
    let request_line = read_request_line(&mut socket).await?;

    let mut parts = request_line.split_whitespace();
    let response = match (parts.next(), parts.next()) {
        (Some(method), Some(target)) => route(method, target, state),
        _ => Response::text(400, "Bad Request"),
    };

    socket.write_all(&response.to_bytes()).await?;
    socket.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ServerState {
        ServerState {
            blocks: SlidingWindow::new(3),
            batches: SlidingWindow::new(3),
        }
    }

    #[test]
    fn test_empty_window_is_empty_array() {
        let response = route("GET", "/data", &state());
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"[]".to_vec());
        assert_eq!(route("GET", "/batches?limit=5", &state()).body, b"[]".to_vec());
    }

    #[test]
    fn test_unknown_path_and_method() {
        assert_eq!(route("GET", "/nope", &state()).status, 404);
        assert_eq!(route("POST", "/data", &state()).status, 405);
    }

    #[test]
    fn test_health_reports_window_sizes() {
        let response = route("GET", "/health", &state());
        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["window_len"], 0);
    }

    #[test]
    fn test_metrics_are_text() {
        let response = route("GET", "/metrics", &state());
        assert_eq!(response.status, 200);
        assert!(response.content_type.starts_with("text/plain"));
    }

    #[tokio::test]
    async fn test_server_stops_on_cancel() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(serve(listener, state(), cancel.clone()));
        cancel.cancel();
        assert!(task.await.unwrap().is_ok());
    }
}
