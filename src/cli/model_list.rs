//! Model listing functionality

use std::error::Error;

use crate::api::models::{fetch_models_with_retry, preferred_model, RetryPolicy};
use crate::api::ModelEntry;
use crate::core::config::Config;

pub async fn list_models(config: &Config) -> Result<(), Box<dyn Error>> {
    let server_url = config.server.url();

    println!("🤖 Available Models on {server_url}");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();

    let client = reqwest::Client::new();
    let models = fetch_models_with_retry(&client, &server_url, RetryPolicy::no_retry()).await?;

    for line in format_model_list(&models) {
        println!("{line}");
    }
    Ok(())
}

fn format_model_list(models: &[ModelEntry]) -> Vec<String> {
    if models.is_empty() {
        return vec!["No models are loaded on the server.".to_string()];
    }

    let preferred = preferred_model(models).map(|model| model.id.as_str());
    let mut lines = vec![format!("Found {} models:", models.len()), String::new()];
    for model in models {
        let marker = if Some(model.id.as_str()) == preferred {
            " (default)"
        } else {
            ""
        };
        lines.push(format!("  • {} [{}]{marker}", model.name, model.id));
    }
    lines
}
