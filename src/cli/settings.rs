//! `allm set`: show or change values in the config file.

use std::error::Error;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use crate::core::config::data::path_display;
use crate::core::config::Config;
use crate::core::relay::IterationLimit;
use crate::core::session::{GenerationPreset, StopPolicy};

/// Keys accepted by `allm set`, in display order.
pub const SETTING_KEYS: &[&str] = &[
    "server-address",
    "server-port",
    "panels",
    "stop-policy",
    "brainstorm",
    "iteration-limit",
    "preset",
    "temperature",
    "max-tokens",
    "publish-interval-ms",
    "publish-batch-bytes",
    "request-timeout-secs",
    "data-dir",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingError {
    #[error("unknown config key: {0} (known keys: {keys})", keys = SETTING_KEYS.join(", "))]
    UnknownKey(String),

    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

fn invalid(key: &'static str, value: &str, reason: impl Display) -> SettingError {
    SettingError::InvalidValue {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse<T>(key: &'static str, value: &str) -> Result<T, SettingError>
where
    T: FromStr,
    T::Err: Display,
{
    value.trim().parse().map_err(|err| invalid(key, value, err))
}

fn parse_positive<T>(key: &'static str, value: &str) -> Result<T, SettingError>
where
    T: FromStr + Default + PartialOrd,
    T::Err: Display,
{
    let parsed: T = parse(key, value)?;
    if parsed <= T::default() {
        return Err(invalid(key, value, "must be greater than zero"));
    }
    Ok(parsed)
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, SettingError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        _ => Err(invalid(key, value, "use on or off")),
    }
}

/// Update the field `key` names. The config is left untouched on error.
pub fn apply_setting(config: &mut Config, key: &str, value: &str) -> Result<(), SettingError> {
    match key {
        "server-address" => {
            let address = value.trim();
            if address.is_empty() {
                return Err(invalid("server-address", value, "must not be empty"));
            }
            config.server.address = address.to_string();
        }
        "server-port" => config.server.port = parse_positive("server-port", value)?,
        "panels" => config.panels = parse_positive("panels", value)?,
        "stop-policy" => {
            config.stop_policy = match value.trim() {
                "keep-partial" => StopPolicy::KeepPartial,
                "drop-partial" | "discard" => StopPolicy::DropPartial,
                _ => return Err(invalid("stop-policy", value, "use keep-partial or drop-partial")),
            }
        }
        "brainstorm" => config.brainstorm.enabled = parse_bool("brainstorm", value)?,
        "iteration-limit" => {
            config.brainstorm.iteration_limit = parse::<IterationLimit>("iteration-limit", value)?
        }
        "preset" => {
            config.generation.preset = if value.trim().eq_ignore_ascii_case("none") {
                None
            } else {
                Some(parse::<GenerationPreset>("preset", value)?)
            }
        }
        "temperature" => {
            let temperature: f32 = parse("temperature", value)?;
            if !(0.0..=2.0).contains(&temperature) {
                return Err(invalid("temperature", value, "must be between 0 and 2"));
            }
            config.generation.temperature = temperature;
        }
        "max-tokens" => config.generation.max_tokens = parse_positive("max-tokens", value)?,
        "publish-interval-ms" => {
            config.publish_interval_ms = parse_positive("publish-interval-ms", value)?
        }
        "publish-batch-bytes" => {
            config.publish_batch_bytes = parse_positive("publish-batch-bytes", value)?
        }
        "request-timeout-secs" => {
            config.request_timeout_secs = parse_positive("request-timeout-secs", value)?
        }
        "data-dir" => {
            config.data_dir = match value.trim() {
                "" | "default" => None,
                dir => Some(PathBuf::from(dir)),
            }
        }
        other => return Err(SettingError::UnknownKey(other.to_string())),
    }
    Ok(())
}

/// Current value of every settable key, one `key: value` per line.
pub fn format_settings(config: &Config) -> String {
    let preset = config
        .generation
        .preset
        .map(|preset| format!("{preset:?}").to_ascii_lowercase())
        .unwrap_or_else(|| "none".to_string());
    let stop_policy = match config.stop_policy {
        StopPolicy::KeepPartial => "keep-partial",
        StopPolicy::DropPartial => "drop-partial",
    };
    let data_dir = config
        .data_dir
        .as_deref()
        .map(path_display)
        .unwrap_or_else(|| "default".to_string());
    let values = [
        config.server.address.clone(),
        config.server.port.to_string(),
        config.panels.to_string(),
        stop_policy.to_string(),
        if config.brainstorm.enabled { "on" } else { "off" }.to_string(),
        config.brainstorm.iteration_limit.to_string(),
        preset,
        config.generation.temperature.to_string(),
        config.generation.max_tokens.to_string(),
        config.publish_interval_ms.to_string(),
        config.publish_batch_bytes.to_string(),
        config.request_timeout_secs.to_string(),
        data_dir,
    ];

    SETTING_KEYS
        .iter()
        .zip(values)
        .map(|(key, value)| format!("  {key}: {value}\n"))
        .collect()
}

/// Print the config when `value` is empty, otherwise set `key` and save.
pub fn run_set(
    config_path: Option<&Path>,
    key: Option<String>,
    value: Vec<String>,
) -> Result<(), Box<dyn Error>> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => Config::config_path()?,
    };
    let mut config = Config::load_from_path(&path)?;

    let Some(key) = key.filter(|_| !value.is_empty()) else {
        println!("Configuration ({}):", path_display(&path));
        print!("{}", format_settings(&config));
        return Ok(());
    };

    let value = value.join(" ");
    apply_setting(&mut config, &key, &value)?;
    config.save_to_path(&path)?;
    println!("✅ Set {key} to: {value}");
    Ok(())
}
