//! Error types for the streaming core and its collaborators.
//!
//! Send failures never escape as `Err` to the UI: the session controller turns
//! a [`StreamFailure`] into an `error` message in the conversation, using
//! [`StreamFailure::user_message`] as its content.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::core::ids::PanelId;
use crate::core::session::SubmitRejection;

const USER_MESSAGE_PREFIX: &str = "Unable to get response from LM Studio. ";

/// Why an in-flight completion request ended without a clean `[DONE]`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamFailure {
    /// The watchdog fired before the server answered.
    #[error("request timed out after {after:?}")]
    Timeout { after: Duration },

    /// The request could not be sent or no response arrived.
    #[error("cannot reach {server_url}: {detail}")]
    Unreachable { server_url: String, detail: String },

    /// The server answered with a non-2xx status.
    #[error("server returned {status} {reason}")]
    Status {
        status: u16,
        reason: String,
        body: String,
    },

    /// The response body was missing or could not be read.
    #[error("response body unreadable: {detail}")]
    Body { detail: String },

    /// The stream carried an error event instead of deltas.
    #[error("server reported an error: {message}")]
    Server { message: String },
}

impl StreamFailure {
    /// Human-readable explanation appended to the conversation.
    pub fn user_message(&self) -> String {
        let detail = match self {
            StreamFailure::Timeout { .. } => {
                "Request timed out. The model might be too slow or not responding.".to_string()
            }
            StreamFailure::Unreachable { server_url, .. } => format!(
                "Please check that:\n1. LM Studio is still running\n2. Local Server is active\n3. Server address ({server_url}) is correct"
            ),
            StreamFailure::Status {
                status,
                reason,
                body,
            } => {
                let server_text = extract_error_summary(body);
                if let Some(text) = server_text
                    .as_deref()
                    .filter(|text| is_model_load_failure(text))
                {
                    format!(
                        "The selected model could not be loaded by the server ({text}). \
Load the model in LM Studio or pick another one, then try again."
                    )
                } else {
                    match server_text {
                        Some(text) if !text.is_empty() => {
                            format!("Server returned {status}: {reason}\n{text}")
                        }
                        _ => format!("Server returned {status}: {reason}"),
                    }
                }
            }
            StreamFailure::Body { detail } => {
                format!("Server response has no readable body ({detail}).")
            }
            StreamFailure::Server { message } => {
                if is_model_load_failure(message) {
                    format!(
                        "The selected model could not be loaded by the server ({message}). \
Load the model in LM Studio or pick another one, then try again."
                    )
                } else {
                    message.clone()
                }
            }
        };
        format!("{USER_MESSAGE_PREFIX}{detail}")
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StreamFailure::Timeout { .. } => "timeout",
            StreamFailure::Unreachable { .. } => "unreachable",
            StreamFailure::Status { .. } => "status",
            StreamFailure::Body { .. } => "body",
            StreamFailure::Server { .. } => "server",
        }
    }
}

fn is_model_load_failure(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    let signals = [
        "failed to load model",
        "error loading model",
        "model not loaded",
        "no models loaded",
        "model is not loaded",
    ];
    signals.iter().any(|signal| lower.contains(signal))
}

/// Pull a one-line summary out of a server error body.
///
/// JSON bodies are searched for `error.message`, `error`, then `message`;
/// anything else is returned trimmed with whitespace collapsed.
pub fn extract_error_summary(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    let summary = match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(value) => error_summary_from_value(&value)?,
        Err(_) => trimmed.to_string(),
    };
    let collapsed = summary.split_whitespace().collect::<Vec<_>>().join(" ");
    Some(collapsed)
}

pub(crate) fn error_summary_from_value(value: &serde_json::Value) -> Option<String> {
    value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value
                .get("error")
                .and_then(|v| v.as_str().map(str::to_owned))
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        })
}

/// Failures of the model-list fetch and other plain request/response calls.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("cannot reach {server_url}: {source}")]
    Transport {
        server_url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response body: {source}")]
    Decode {
        #[source]
        source: reqwest::Error,
    },
}

/// Errors that can occur when loading configuration from disk.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("Failed to read config at {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse the configuration file as valid TOML.
    #[error("Failed to parse config at {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Failed to serialize or write the configuration file.
    #[error("Failed to write config at {}: {message}", .path.display())]
    Write { path: PathBuf, message: String },

    /// No home directory could be determined for the config location.
    #[error("Could not determine a configuration directory")]
    NoConfigDir,
}

/// Failures of the panel persistence collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("panel store I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("panel snapshot at {} is not valid JSON: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not replace {}: {message}", .path.display())]
    Persist { path: PathBuf, message: String },
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("no panel with id {0}")]
    UnknownPanel(PanelId),

    #[error("model {0} is not in the model list")]
    UnknownModel(String),

    #[error("at least one panel must remain")]
    LastPanel,

    #[error("message not sent: {0}")]
    Rejected(SubmitRejection),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_mentions_slow_model() {
        let failure = StreamFailure::Timeout {
            after: Duration::from_secs(30),
        };
        assert_eq!(
            failure.user_message(),
            "Unable to get response from LM Studio. Request timed out. The model might be too slow or not responding."
        );
    }

    #[test]
    fn unreachable_message_lists_troubleshooting_steps() {
        let failure = StreamFailure::Unreachable {
            server_url: "http://localhost:1234".into(),
            detail: "connection refused".into(),
        };
        let text = failure.user_message();
        assert!(text.contains("1. LM Studio is still running"));
        assert!(text.contains("(http://localhost:1234)"));
    }

    #[test]
    fn status_message_includes_code_and_server_text() {
        let failure = StreamFailure::Status {
            status: 400,
            reason: "Bad Request".into(),
            body: r#"{"error":{"message":"context length   exceeded"}}"#.into(),
        };
        assert_eq!(
            failure.user_message(),
            "Unable to get response from LM Studio. Server returned 400: Bad Request\ncontext length exceeded"
        );
    }

    #[test]
    fn model_load_failures_get_friendlier_text() {
        let failure = StreamFailure::Status {
            status: 500,
            reason: "Internal Server Error".into(),
            body: r#"{"error":"Failed to load model \"qwen\""}"#.into(),
        };
        let text = failure.user_message();
        assert!(text.contains("could not be loaded"));
        assert!(!text.contains("Server returned"));
    }

    #[test]
    fn extract_error_summary_handles_plain_text_and_empty_bodies() {
        assert_eq!(extract_error_summary("  \n "), None);
        assert_eq!(
            extract_error_summary("upstream\n  failure"),
            Some("upstream failure".to_string())
        );
        assert_eq!(extract_error_summary(r#"{"status":"failed"}"#), None);
    }
}
