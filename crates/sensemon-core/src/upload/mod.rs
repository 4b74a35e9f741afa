//! Telemetry uploads
//!
//! Each metric has an [`UploadTarget`] (a remote feed) driven by the
//! [`UploadScheduler`]. Calls to the service go through an [`UploadLink`]:
//! the link takes a request and later hands back an [`UploadCompletion`],
//! so a slow network never stalls the run loop. [`InlineLink`] performs the
//! call synchronously and is what tests use; the Linux binary runs each call
//! on a worker thread.

mod scheduler;

pub use scheduler::{UploadPhase, UploadScheduler, UploadState, UploadTarget};

use alloc::string::String;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::warn;
use thiserror_no_std::Error;

use crate::sensors::Metric;

/// Longest feed key accepted by the service.
pub const MAX_FEED_LEN: usize = 128;

/// Completions that can queue up between two input ticks.
pub const COMPLETION_CAPACITY: usize = 8;

/// Channel carrying upload results back to the run loop.
pub type CompletionChannel = Channel<CriticalSectionRawMutex, UploadCompletion, COMPLETION_CAPACITY>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadError {
    #[error("feed or credentials rejected")]
    Invalid,
    #[error("rate limited by the service")]
    RateLimited,
    #[error("network error")]
    Network,
    #[error("upload timed out")]
    Timeout,
}

/// Remote telemetry service.
pub trait Telemetry {
    /// Push one value to `feed`.
    fn send(&mut self, feed: &str, value: f32) -> Result<(), UploadError>;

    /// Check that `feed` exists and is writable. Used once at startup.
    fn validate_feed(&mut self, feed: &str) -> Result<(), UploadError> {
        let _ = feed;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    pub metric: Metric,
    pub feed: String,
    /// Already rounded to `ROUNDING` decimals.
    pub value: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadCompletion {
    pub metric: Metric,
    pub result: Result<(), UploadError>,
}

/// Carries upload requests to the service and results back.
pub trait UploadLink {
    /// Start an upload. Must not block on the network.
    fn dispatch(&mut self, request: UploadRequest);

    /// Next finished upload, if any.
    fn poll_completion(&mut self) -> Option<UploadCompletion>;

    /// Give up on everything still outstanding.
    fn abandon(&mut self) {}
}

/// Syntax check for feed keys: lowercase letters, digits and dashes, with an
/// optional `group.` prefix.
pub fn is_valid_feed_key(feed: &str) -> bool {
    if feed.is_empty() || feed.len() > MAX_FEED_LEN {
        return false;
    }
    let mut parts = feed.split('.');
    let valid_part = |part: &str| {
        !part.is_empty()
            && part
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    };
    match (parts.next(), parts.next(), parts.next()) {
        (Some(key), None, _) => valid_part(key),
        (Some(group), Some(key), None) => valid_part(group) && valid_part(key),
        _ => false,
    }
}

/// Runs each upload synchronously on `dispatch` and queues the result.
pub struct InlineLink<T> {
    telemetry: T,
    completions: CompletionChannel,
}

impl<T: Telemetry> InlineLink<T> {
    pub fn new(telemetry: T) -> Self {
        Self {
            telemetry,
            completions: Channel::new(),
        }
    }

    pub fn telemetry(&self) -> &T {
        &self.telemetry
    }
}

impl<T: Telemetry> UploadLink for InlineLink<T> {
    fn dispatch(&mut self, request: UploadRequest) {
        let result = self.telemetry.send(&request.feed, request.value);
        let completion = UploadCompletion {
            metric: request.metric,
            result,
        };
        if self.completions.try_send(completion).is_err() {
            warn!("Completion queue full, dropping result for {}", request.metric);
        }
    }

    fn poll_completion(&mut self) -> Option<UploadCompletion> {
        self.completions.try_receive().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingTelemetry;
    use alloc::string::ToString;

    #[test]
    fn test_feed_key_syntax() {
        assert!(is_valid_feed_key("temperature"));
        assert!(is_valid_feed_key("sense-hat-1"));
        assert!(is_valid_feed_key("sensemon.humidity"));
        assert!(!is_valid_feed_key(""));
        assert!(!is_valid_feed_key("Temperature"));
        assert!(!is_valid_feed_key("has space"));
        assert!(!is_valid_feed_key("a.b.c"));
        assert!(!is_valid_feed_key(".humidity"));
        assert!(!is_valid_feed_key(&"x".repeat(MAX_FEED_LEN + 1)));
    }

    #[test]
    fn test_inline_link_round_trip() {
        let mut link = InlineLink::new(RecordingTelemetry::default());
        assert_eq!(link.poll_completion(), None);

        link.dispatch(UploadRequest {
            metric: Metric::Pressure,
            feed: "pressure".to_string(),
            value: 1013.25,
        });

        assert_eq!(
            link.poll_completion(),
            Some(UploadCompletion {
                metric: Metric::Pressure,
                result: Ok(()),
            })
        );
        assert_eq!(link.poll_completion(), None);
        assert_eq!(link.telemetry().sent(), vec![("pressure".to_string(), 1013.25)]);
    }
}
