use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
pub struct HubStats {
    pub connected_clients: usize,
}

impl ApiClient {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    pub async fn health(&self) -> Result<String> {
        let url = format!("{}/health", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to reach health endpoint")?;

        if !response.status().is_success() {
            anyhow::bail!("Health check failed: {}", response.status());
        }

        response.text().await.context("Failed to read health body")
    }

    pub async fn stats(&self) -> Result<HubStats> {
        let url = format!("{}/ws/stats", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to get hub stats")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            anyhow::bail!("Failed to get hub stats: {} - Response: {}", status, body);
        }

        let api_response: Value = response.json().await.context("Failed to parse response")?;

        // Extract the data from ApiResponse wrapper
        serde_json::from_value(api_response["data"].clone()).context("No stats data in response")
    }
}
