use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use common::req::DeviceConfig;
use log::debug;

use crate::error::TankError;

/// Delivers threshold configuration to a tank's sensor node.
#[async_trait]
pub trait DeviceLink: Send + Sync {
    async fn push_config(&self, device_url: &str, config: &DeviceConfig) -> Result<(), TankError>;
}

pub struct HttpDeviceLink {
    client: reqwest::Client,
}

impl HttpDeviceLink {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

pub fn config_url(device_url: &str) -> String {
    format!("{}/config", device_url.trim_end_matches('/'))
}

#[async_trait]
impl DeviceLink for HttpDeviceLink {
    async fn push_config(&self, device_url: &str, config: &DeviceConfig) -> Result<(), TankError> {
        let url = config_url(device_url);
        debug!("Pushing config to {}", url);

        self.client
            .post(&url)
            .json(config)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| TankError::DeviceUnreachable(format!("{}: {}", url, e)))?;

        Ok(())
    }
}
