//! Endpoint server for exposing metrics and health checks

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::metrics::Metrics;

/// Bind on all interfaces and serve until the task is dropped
pub async fn endpoint_server(port: u16, metrics: Arc<Metrics>) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "Metrics endpoint listening");
    serve(listener, metrics).await
}

/// Accept loop over an already bound listener
pub async fn serve(listener: TcpListener, metrics: Arc<Metrics>) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                let metrics = Arc::clone(&metrics);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(socket, &metrics).await {
                        tracing::debug!(%peer, error = %e, "Metrics request failed");
                    }
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to accept connection");
            }
        }
    }
}

async fn handle_connection(mut socket: TcpStream, metrics: &Metrics) -> Result<()> {
    let mut buf = [0; 1024];
    let n = socket.read(&mut buf).await?;
    let request = String::from_utf8_lossy(&buf[..n]);
    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/");

    let (status, content_type, body) = match path {
        "/metrics" => (
            "200 OK",
            "text/plain; version=0.0.4",
            metrics.render()?,
        ),
        "/health" => ("200 OK", "text/plain", "ok".to_string()),
        _ => ("404 Not Found", "text/plain", "not found".to_string()),
    };

    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    );
    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await?;
    Ok(())
}
