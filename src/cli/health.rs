use std::error::Error;

use crate::api::models::probe_health;
use crate::core::config::Config;

pub async fn check_health(config: &Config) -> Result<(), Box<dyn Error>> {
    let server_url = config.server.url();
    let client = reqwest::Client::new();

    if probe_health(&client, &server_url).await {
        println!("✅ {server_url} is reachable");
        Ok(())
    } else {
        Err(format!("{server_url} did not answer the health check").into())
    }
}
