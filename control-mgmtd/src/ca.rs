use std::time::Duration;
use anyhow::{Context, Result};
use serde::Deserialize;
use crate::config::CaConfig;
use crate::health::CaStatus;

/// Probes the CA service's health endpoint. Constructed only on
/// deployments with CA capability.
#[derive(Clone)]
pub struct CaClient {
    http: reqwest::Client,
    url: String,
}

#[derive(Deserialize)]
struct CaStatusBody {
    status: String,
}

impl CaClient {
    pub fn new(config: &CaConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build CA health client")?;
        Ok(Self {
            http,
            url: config.health_url.clone(),
        })
    }

    /// Current CA connectivity. Transport failures and malformed replies
    /// report as `Unavailable`.
    pub async fn status(&self) -> CaStatus {
        let response = match self.http.get(&self.url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("CA health request failed: {}", e);
                return CaStatus::Unavailable;
            }
        };
        if !response.status().is_success() {
            tracing::debug!("CA health endpoint returned {}", response.status());
            return CaStatus::Unavailable;
        }
        match response.json::<CaStatusBody>().await {
            Ok(body) => CaStatus::parse(&body.status),
            Err(e) => {
                tracing::debug!("CA health response malformed: {}", e);
                CaStatus::Unavailable
            }
        }
    }
}
