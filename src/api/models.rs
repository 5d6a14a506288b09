use std::time::Duration;

use tracing::{debug, warn};

use crate::api::{ModelEntry, ModelsResponse};
use crate::core::error::ApiError;
use crate::utils::url::construct_api_url;

/// Families picked first when a panel has no model selected yet.
const PREFERRED_FAMILIES: [&str; 2] = ["deepseek", "qwen"];

pub async fn fetch_models(
    client: &reqwest::Client,
    server_url: &str,
) -> Result<ModelsResponse, ApiError> {
    let models_url = construct_api_url(server_url, "v1/models");
    let response = client
        .get(models_url)
        .header("Accept", "application/json")
        .header("Cache-Control", "no-cache")
        .send()
        .await
        .map_err(|source| ApiError::Transport {
            server_url: server_url.to_string(),
            source,
        })?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ApiError::Status {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json::<ModelsResponse>()
        .await
        .map_err(|source| ApiError::Decode { source })
}

/// Bounded exponential backoff for the model-list fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Fetch the model list, retrying failed attempts with exponential backoff.
///
/// An empty list is a successful answer and is returned as-is.
pub async fn fetch_models_with_retry(
    client: &reqwest::Client,
    server_url: &str,
    policy: RetryPolicy,
) -> Result<Vec<ModelEntry>, ApiError> {
    let mut attempt = 0;
    loop {
        match fetch_models(client, server_url).await {
            Ok(response) => {
                let mut entries: Vec<ModelEntry> =
                    response.data.iter().map(ModelEntry::from).collect();
                sort_models(&mut entries);
                debug!(count = entries.len(), "fetched model list");
                return Ok(entries);
            }
            Err(err) if attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                attempt += 1;
                warn!(
                    error = %err,
                    attempt,
                    max = policy.max_retries,
                    "model list fetch failed, retrying in {:?}",
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Lightweight liveness probe against `HEAD /health`.
pub async fn probe_health(client: &reqwest::Client, server_url: &str) -> bool {
    let url = construct_api_url(server_url, "health");
    match client.head(url).send().await {
        Ok(response) => response.status().is_success(),
        Err(err) => {
            debug!(error = %err, "health probe failed");
            false
        }
    }
}

/// Short name shown in pickers: last path segment without the `-GGUF` suffix.
pub fn display_name(model_id: &str) -> String {
    let last = model_id.rsplit('/').next().unwrap_or(model_id);
    last.strip_suffix("-GGUF").unwrap_or(last).to_string()
}

fn is_preferred(model: &ModelEntry) -> bool {
    let id = model.id.to_lowercase();
    PREFERRED_FAMILIES.iter().any(|family| id.contains(family))
}

/// Stable sort that moves preferred families to the front.
pub fn sort_models(models: &mut [ModelEntry]) {
    models.sort_by_key(|model| !is_preferred(model));
}

/// Model a panel selects when it has none: a preferred family, else the first.
pub fn preferred_model(models: &[ModelEntry]) -> Option<&ModelEntry> {
    models
        .iter()
        .find(|model| {
            let name = model.name.to_lowercase();
            PREFERRED_FAMILIES.iter().any(|family| name.contains(family))
        })
        .or_else(|| models.first())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_strips_publisher_and_gguf_suffix() {
        assert_eq!(
            display_name("lmstudio-community/Qwen2.5-7B-Instruct-GGUF"),
            "Qwen2.5-7B-Instruct"
        );
        assert_eq!(display_name("llama-3.2-1b"), "llama-3.2-1b");
    }

    #[test]
    fn sort_models_moves_preferred_families_first_and_keeps_order() {
        let mut models = vec![
            ModelEntry::from_id("llama-3"),
            ModelEntry::from_id("mistral-7b"),
            ModelEntry::from_id("Qwen/qwen2.5"),
            ModelEntry::from_id("deepseek-r1"),
        ];
        sort_models(&mut models);
        let ids: Vec<_> = models.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["Qwen/qwen2.5", "deepseek-r1", "llama-3", "mistral-7b"]);
    }

    #[test]
    fn preferred_model_falls_back_to_first() {
        let models = vec![ModelEntry::from_id("llama-3"), ModelEntry::from_id("phi-4")];
        assert_eq!(preferred_model(&models).map(|m| m.id.as_str()), Some("llama-3"));

        let models = vec![
            ModelEntry::from_id("llama-3"),
            ModelEntry::from_id("org/DeepSeek-Coder-GGUF"),
        ];
        assert_eq!(
            preferred_model(&models).map(|m| m.name.as_str()),
            Some("DeepSeek-Coder")
        );

        assert!(preferred_model(&[]).is_none());
    }

    #[test]
    fn retry_delay_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(4), Duration::from_secs(16));
        assert_eq!(policy.delay_for(5), Duration::from_secs(30));
        assert_eq!(policy.delay_for(40), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn fetch_models_with_retry_returns_sorted_entries() {
        let body = r#"{"object":"list","data":[{"id":"llama-3"},{"id":"qwen2.5-7b"}]}"#;
        let server = crate::utils::test_utils::FakeServer::start(vec![
            crate::utils::test_utils::json_response(body),
        ])
        .await;

        let models = fetch_models_with_retry(
            &crate::utils::test_utils::test_client(),
            &server.url(),
            RetryPolicy::no_retry(),
        )
        .await
        .expect("models");

        assert_eq!(models[0].id, "qwen2.5-7b");
        assert_eq!(models[1].id, "llama-3");
        let requests = server.requests().await;
        assert!(requests[0].request_line.starts_with("GET /v1/models"));
    }

    #[tokio::test]
    async fn fetch_models_with_retry_retries_after_server_error() {
        let server = crate::utils::test_utils::FakeServer::start(vec![
            crate::utils::test_utils::status_response(503, "Service Unavailable", "loading"),
            crate::utils::test_utils::json_response(r#"{"data":[]}"#),
        ])
        .await;

        let policy = RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        };
        let models = fetch_models_with_retry(
            &crate::utils::test_utils::test_client(),
            &server.url(),
            policy,
        )
        .await
        .expect("second attempt succeeds");
        assert!(models.is_empty());
        assert_eq!(server.requests().await.len(), 2);
    }

    #[tokio::test]
    async fn fetch_models_reports_status_errors() {
        let server = crate::utils::test_utils::FakeServer::start(vec![
            crate::utils::test_utils::status_response(500, "Internal Server Error", "boom"),
        ])
        .await;

        let err = fetch_models(&crate::utils::test_utils::test_client(), &server.url())
            .await
            .expect_err("status error");
        assert!(matches!(err, ApiError::Status { status: 500, .. }));
    }
}
