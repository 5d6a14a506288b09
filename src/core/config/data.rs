use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::models::RetryPolicy;
use crate::core::orchestrator::OrchestratorSettings;
use crate::core::relay::{IterationLimit, RelaySettings};
use crate::core::session::{GenerationParams, GenerationPreset, SessionSettings, StopPolicy};
use crate::utils::url::server_url;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host name or IP of the inference server. A typed `http://` prefix is
    /// tolerated and stripped.
    pub address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "localhost".to_string(),
            port: 1234,
        }
    }
}

impl ServerConfig {
    pub fn url(&self) -> String {
        server_url(&self.address, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Named sampling preset. Replaces `temperature` when set; `max_tokens` still applies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<GenerationPreset>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        let params = GenerationParams::default();
        Self {
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            preset: None,
        }
    }
}

impl GenerationConfig {
    pub fn params(&self) -> GenerationParams {
        match self.preset {
            Some(preset) => GenerationParams {
                max_tokens: self.max_tokens,
                ..preset.params()
            },
            None => GenerationParams {
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                ..GenerationParams::default()
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrainstormConfig {
    /// Relay replies between panels for panels without saved settings.
    pub enabled: bool,
    /// Hop limit, a positive number or `"infinite"`.
    pub iteration_limit: IterationLimit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seconds to wait for the server to start answering a chat request.
    pub request_timeout_secs: u64,
    /// Upper bound on how long live text waits before being shown.
    pub publish_interval_ms: u64,
    /// Unpublished bytes that force an immediate live update.
    pub publish_batch_bytes: usize,
    pub stop_policy: StopPolicy,
    pub panels: usize,
    /// Where panel state is saved; defaults to the platform data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    pub server: ServerConfig,
    pub generation: GenerationConfig,
    pub brainstorm: BrainstormConfig,
}

impl Default for Config {
    fn default() -> Self {
        let session = SessionSettings::default();
        Self {
            request_timeout_secs: 30,
            publish_interval_ms: session.publish_interval.as_millis() as u64,
            publish_batch_bytes: session.publish_batch_bytes,
            stop_policy: session.stop_policy,
            panels: 2,
            data_dir: None,
            server: ServerConfig::default(),
            generation: GenerationConfig::default(),
            brainstorm: BrainstormConfig::default(),
        }
    }
}

impl Config {
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            generation: self.generation.params(),
            publish_interval: Duration::from_millis(self.publish_interval_ms),
            publish_batch_bytes: self.publish_batch_bytes,
            stop_policy: self.stop_policy,
        }
    }

    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            enabled: self.brainstorm.enabled,
            iteration_limit: self.brainstorm.iteration_limit,
        }
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            server_url: self.server.url(),
            panels: self.panels.max(1),
            session: self.session_settings(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            default_relay: self.relay_settings(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Display a path with the home directory collapsed to `~`.
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
