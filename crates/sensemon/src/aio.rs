//! Adafruit IO REST client.
//!
//! Values go to `POST {AIO_URL}/api/v2/{AIO_ID}/feeds/{feed}/data` with the
//! key in the `X-AIO-Key` header. Feed validation is a `GET` on the feed.

use std::time::Duration;

use anyhow::Context;
use log::debug;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder};
use serde::Serialize;

use sensemon_core::Settings;
use sensemon_core::upload::{Telemetry, UploadError};

const KEY_HEADER: &str = "X-AIO-Key";

#[derive(Debug, Serialize)]
struct DataPoint {
    value: f32,
}

#[derive(Debug, Clone)]
pub struct AdafruitIo {
    client: Client,
    base_url: String,
    username: String,
    key: String,
}

impl AdafruitIo {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(u64::from(settings.aio_timeout)))
            .user_agent(concat!("sensemon/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: settings.aio_url.trim_end_matches('/').to_string(),
            username: settings.aio_id.clone(),
            key: settings.aio_key.clone(),
        })
    }

    fn feed_url(&self, feed: &str) -> String {
        format!("{}/api/v2/{}/feeds/{}", self.base_url, self.username, feed)
    }

    fn execute(&self, request: RequestBuilder, feed: &str) -> Result<(), UploadError> {
        let response = request
            .header(KEY_HEADER, &self.key)
            .send()
            .map_err(|err| {
                debug!("Request for feed '{feed}' failed: {err}");
                classify_transport(&err)
            })?;
        classify_status(response.status())
    }
}

impl Telemetry for AdafruitIo {
    fn send(&mut self, feed: &str, value: f32) -> Result<(), UploadError> {
        let url = format!("{}/data", self.feed_url(feed));
        self.execute(self.client.post(url).json(&DataPoint { value }), feed)
    }

    fn validate_feed(&mut self, feed: &str) -> Result<(), UploadError> {
        self.execute(self.client.get(self.feed_url(feed)), feed)
    }
}

pub fn classify_status(status: StatusCode) -> Result<(), UploadError> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::TOO_MANY_REQUESTS => Err(UploadError::RateLimited),
        StatusCode::BAD_REQUEST
        | StatusCode::UNAUTHORIZED
        | StatusCode::FORBIDDEN
        | StatusCode::NOT_FOUND => Err(UploadError::Invalid),
        _ => Err(UploadError::Network),
    }
}

fn classify_transport(err: &reqwest::Error) -> UploadError {
    if err.is_timeout() {
        UploadError::Timeout
    } else {
        UploadError::Network
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(classify_status(StatusCode::OK), Ok(()));
        assert_eq!(classify_status(StatusCode::CREATED), Ok(()));
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            Err(UploadError::RateLimited)
        );
        assert_eq!(classify_status(StatusCode::NOT_FOUND), Err(UploadError::Invalid));
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED), Err(UploadError::Invalid));
        assert_eq!(
            classify_status(StatusCode::UNPROCESSABLE_ENTITY),
            Err(UploadError::Network)
        );
        assert_eq!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE),
            Err(UploadError::Network)
        );
    }

    #[test]
    fn test_payload_shape() {
        let body = serde_json::to_string(&DataPoint { value: 21.5 }).unwrap();
        assert_eq!(body, r#"{"value":21.5}"#);
    }

    #[test]
    fn test_feed_url() {
        let settings = Settings {
            aio_id: "someone".into(),
            aio_url: "https://io.example.com/".into(),
            ..Settings::default()
        };
        let client = AdafruitIo::new(&settings).unwrap();
        assert_eq!(
            client.feed_url("sensemon.temperature"),
            "https://io.example.com/api/v2/someone/feeds/sensemon.temperature"
        );
    }

    #[test]
    fn test_unreachable_host_is_network_error() {
        let settings = Settings {
            aio_id: "someone".into(),
            aio_url: "http://127.0.0.1:9".into(),
            aio_timeout: 2,
            ..Settings::default()
        };
        let mut client = AdafruitIo::new(&settings).unwrap();
        let result = client.send("feed", 1.0);
        assert!(matches!(
            result,
            Err(UploadError::Network | UploadError::Timeout)
        ));
    }
}
