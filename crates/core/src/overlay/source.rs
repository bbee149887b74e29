use std::{path::PathBuf, time::Duration};

use async_trait::async_trait;

use crate::{QuakeReplayError, Result};

/// Provides the raw GeoJSON for the boundary overlay.
#[async_trait]
pub trait GeometrySource: Send + Sync {
    async fn fetch_geometry(&self) -> Result<String>;

    /// Short description used in log lines.
    fn describe(&self) -> String;
}

pub struct HttpGeometrySource {
    client: reqwest::Client,
    url: String,
}

impl HttpGeometrySource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl GeometrySource for HttpGeometrySource {
    async fn fetch_geometry(&self) -> Result<String> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_owned());
            return Err(QuakeReplayError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.text().await?)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Reads boundary GeoJSON from disk.
pub struct FileGeometrySource {
    path: PathBuf,
}

impl FileGeometrySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl GeometrySource for FileGeometrySource {
    async fn fetch_geometry(&self) -> Result<String> {
        Ok(tokio::fs::read_to_string(&self.path).await?)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
