use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use crate::api::ModelEntry;

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body should be JSON")
    }
}

/// Canned reply for one accepted connection.
#[derive(Debug, Clone)]
pub enum FakeResponse {
    /// Complete response written in one go.
    Full(String),
    /// `200 OK` event stream sent with chunked transfer encoding. Each chunk is
    /// written after its delay. With `hold_open` the connection stays open
    /// after the last chunk, so the client never sees the end of the body.
    EventStream {
        chunks: Vec<(Duration, String)>,
        hold_open: bool,
    },
    /// Accept the connection, read the request, and never answer.
    Silent,
}

pub fn json_response(body: &str) -> FakeResponse {
    FakeResponse::Full(format!(
        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\nconnection: close\r\ncontent-length: {}\r\n\r\n{}",
        body.len(),
        body
    ))
}

pub fn status_response(status: u16, reason: &str, body: &str) -> FakeResponse {
    FakeResponse::Full(format!(
        "HTTP/1.1 {status} {reason}\r\ncontent-type: text/plain\r\nconnection: close\r\ncontent-length: {}\r\n\r\n{}",
        body.len(),
        body
    ))
}

/// Event stream carrying one delta per entry followed by `[DONE]`.
pub fn sse_response(deltas: &[&str]) -> FakeResponse {
    let mut chunks: Vec<(Duration, String)> = deltas
        .iter()
        .map(|delta| (Duration::ZERO, sse_delta_line(delta)))
        .collect();
    chunks.push((Duration::ZERO, "data: [DONE]\n\n".to_string()));
    FakeResponse::EventStream {
        chunks,
        hold_open: false,
    }
}

pub fn sse_delta_line(delta: &str) -> String {
    let payload = serde_json::json!({
        "choices": [{ "delta": { "content": delta } }]
    });
    format!("data: {payload}\n\n")
}

pub struct FakeServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl FakeServer {
    /// Serve the given responses, one per incoming connection, in order.
    pub async fn start(responses: Vec<FakeResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let addr = listener.local_addr().expect("local addr should resolve");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&requests);
        let mut responses: VecDeque<FakeResponse> = responses.into();

        tokio::spawn(async move {
            while let Some(response) = responses.pop_front() {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let captured = Arc::clone(&captured);
                tokio::spawn(async move {
                    let _ = serve_connection(stream, response, captured).await;
                });
            }
        });

        Self { addr, requests }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub async fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().await.clone()
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    response: FakeResponse,
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
) -> Result<(), String> {
    let request = read_http_request(&mut stream).await?;
    captured.lock().await.push(request);

    match response {
        FakeResponse::Full(raw) => {
            stream
                .write_all(raw.as_bytes())
                .await
                .map_err(|err| err.to_string())?;
        }
        FakeResponse::EventStream { chunks, hold_open } => {
            let head = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\ntransfer-encoding: chunked\r\n\r\n";
            stream
                .write_all(head.as_bytes())
                .await
                .map_err(|err| err.to_string())?;
            for (delay, chunk) in chunks {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let framed = format!("{:x}\r\n{}\r\n", chunk.len(), chunk);
                stream
                    .write_all(framed.as_bytes())
                    .await
                    .map_err(|err| err.to_string())?;
                stream.flush().await.map_err(|err| err.to_string())?;
            }
            if hold_open {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            stream
                .write_all(b"0\r\n\r\n")
                .await
                .map_err(|err| err.to_string())?;
        }
        FakeResponse::Silent => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
    }
    stream.flush().await.map_err(|err| err.to_string())?;
    Ok(())
}

async fn read_http_request(stream: &mut TcpStream) -> Result<CapturedRequest, String> {
    let mut buffer = Vec::new();
    let mut header_end = None;
    while header_end.is_none() {
        let mut chunk = [0_u8; 1024];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP headers".to_string());
        }
        buffer.extend_from_slice(&chunk[..read]);
        header_end = buffer
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
            .map(|index| index + 4);
    }

    let header_end = header_end.ok_or("header end should exist")?;
    let header_text =
        std::str::from_utf8(&buffer[..header_end]).map_err(|err| err.to_string())?;
    let mut lines = header_text.split("\r\n").filter(|line| !line.is_empty());
    let request_line = lines
        .next()
        .ok_or_else(|| "Missing HTTP request line".to_string())?
        .to_string();

    let mut headers = Vec::new();
    let mut content_length = 0_usize;
    for line in lines {
        let mut parts = line.splitn(2, ':');
        let Some(name) = parts.next() else {
            continue;
        };
        let value = parts.next().unwrap_or_default().trim().to_string();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse::<usize>().map_err(|err| err.to_string())?;
        }
        headers.push((name.to_string(), value));
    }

    let mut body = buffer[header_end..].to_vec();
    while body.len() < content_length {
        let mut chunk = vec![0_u8; content_length.saturating_sub(body.len())];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP body".to_string());
        }
        body.extend_from_slice(&chunk[..read]);
    }
    body.truncate(content_length);

    Ok(CapturedRequest {
        request_line,
        headers,
        body,
    })
}

/// Client that bypasses any proxy from the environment and never reuses
/// connections, so each request reaches the next canned response.
pub fn test_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .pool_max_idle_per_host(0)
        .build()
        .expect("client should build")
}

pub fn test_models() -> Vec<ModelEntry> {
    vec![
        ModelEntry::from_id("lmstudio-community/Qwen2.5-7B-Instruct-GGUF"),
        ModelEntry::from_id("llama-3.2-1b"),
    ]
}
