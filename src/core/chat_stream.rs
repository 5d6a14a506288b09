use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::ChatRequest;
use crate::core::error::StreamFailure;
use crate::core::ids::PanelId;
use crate::core::stream_decoder::{DecodedChunk, SseDecoder};
use crate::utils::url::construct_api_url;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    Delta(String),
    Completed,
    Failed(StreamFailure),
}

/// One event from a streaming task, tagged with the panel and stream that
/// produced it so late events from an aborted stream can be discarded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamEnvelope {
    pub panel: PanelId,
    pub stream_id: u64,
    pub event: StreamEvent,
}

pub struct StreamParams {
    pub client: reqwest::Client,
    pub server_url: String,
    pub request: ChatRequest,
    pub cancel_token: CancellationToken,
    pub stream_id: u64,
    pub panel: PanelId,
    pub timeout: Duration,
}

struct Emitter {
    tx: mpsc::UnboundedSender<StreamEnvelope>,
    panel: PanelId,
    stream_id: u64,
}

impl Emitter {
    fn send(&self, event: StreamEvent) {
        let _ = self.tx.send(StreamEnvelope {
            panel: self.panel.clone(),
            stream_id: self.stream_id,
            event,
        });
    }

    /// Forward decoded text; returns true once the stream has ended.
    fn forward(&self, decoded: DecodedChunk) -> bool {
        if !decoded.text.is_empty() {
            self.send(StreamEvent::Delta(decoded.text));
        }
        if let Some(message) = decoded.server_error {
            self.send(StreamEvent::Failed(StreamFailure::Server { message }));
            return true;
        }
        if decoded.done {
            self.send(StreamEvent::Completed);
            return true;
        }
        false
    }
}

fn classify_send_error(err: &reqwest::Error, server_url: &str, timeout: Duration) -> StreamFailure {
    if err.is_timeout() {
        StreamFailure::Timeout { after: timeout }
    } else {
        StreamFailure::Unreachable {
            server_url: server_url.to_string(),
            detail: err.to_string(),
        }
    }
}

async fn run_stream(
    client: &reqwest::Client,
    server_url: &str,
    request: &ChatRequest,
    timeout: Duration,
    emitter: &Emitter,
) {
    let chat_url = construct_api_url(server_url, "v1/chat/completions");
    let send = client
        .post(chat_url)
        .header("Content-Type", "application/json")
        .json(request)
        .send();

    let response = match tokio::time::timeout(timeout, send).await {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => {
            warn!(panel = %emitter.panel, error = %err, "chat request failed");
            emitter.send(StreamEvent::Failed(classify_send_error(
                &err, server_url, timeout,
            )));
            return;
        }
        Err(_) => {
            warn!(panel = %emitter.panel, ?timeout, "chat request timed out");
            emitter.send(StreamEvent::Failed(StreamFailure::Timeout { after: timeout }));
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        emitter.send(StreamEvent::Failed(StreamFailure::Status {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
            body,
        }));
        return;
    }

    let mut decoder = SseDecoder::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => {
                if emitter.forward(decoder.push(&bytes)) {
                    return;
                }
            }
            Err(err) => {
                emitter.send(StreamEvent::Failed(StreamFailure::Body {
                    detail: err.to_string(),
                }));
                return;
            }
        }
    }

    if !emitter.forward(decoder.finish()) {
        // Body closed without a `[DONE]` sentinel.
        emitter.send(StreamEvent::Completed);
    }
}

#[derive(Clone)]
pub struct ChatStreamService {
    tx: mpsc::UnboundedSender<StreamEnvelope>,
}

impl ChatStreamService {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StreamEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn spawn_stream(&self, params: StreamParams) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let StreamParams {
                client,
                server_url,
                request,
                cancel_token,
                stream_id,
                panel,
                timeout,
            } = params;

            let emitter = Emitter {
                tx,
                panel,
                stream_id,
            };

            tokio::select! {
                _ = run_stream(&client, &server_url, &request, timeout, &emitter) => {}
                _ = cancel_token.cancelled() => {
                    debug!(panel = %emitter.panel, stream_id, "stream cancelled");
                }
            }
        });
    }

    #[cfg(test)]
    pub fn send_for_test(&self, envelope: StreamEnvelope) {
        let _ = self.tx.send(envelope);
    }
}
