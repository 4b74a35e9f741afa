//! Upload link that runs every request on its own worker thread.
//!
//! Results come back through a static [`CompletionChannel`] which the run
//! loop drains on each input tick.

use std::thread::{self, JoinHandle};

use embassy_sync::channel::Channel;
use log::{debug, warn};

use sensemon_core::upload::{
    CompletionChannel, Telemetry, UploadCompletion, UploadError, UploadLink, UploadRequest,
};

pub static UPLOAD_COMPLETIONS: CompletionChannel = Channel::new();

pub struct ThreadedLink<T> {
    telemetry: T,
    completions: &'static CompletionChannel,
    workers: Vec<JoinHandle<()>>,
}

impl<T> ThreadedLink<T>
where
    T: Telemetry + Clone + Send + 'static,
{
    pub fn new(telemetry: T, completions: &'static CompletionChannel) -> Self {
        Self {
            telemetry,
            completions,
            workers: Vec::new(),
        }
    }

    /// Workers that have not reported back yet.
    pub fn busy_workers(&self) -> usize {
        self.workers.iter().filter(|w| !w.is_finished()).count()
    }

    fn reap(&mut self) {
        let (done, running): (Vec<_>, Vec<_>) =
            self.workers.drain(..).partition(|w| w.is_finished());
        for worker in done {
            if worker.join().is_err() {
                warn!("Upload worker panicked");
            }
        }
        self.workers = running;
    }
}

impl<T> UploadLink for ThreadedLink<T>
where
    T: Telemetry + Clone + Send + 'static,
{
    fn dispatch(&mut self, request: UploadRequest) {
        self.reap();

        let mut telemetry = self.telemetry.clone();
        let completions = self.completions;
        let metric = request.metric;
        let spawned = thread::Builder::new()
            .name(format!("upload-{}", metric.name()))
            .spawn(move || {
                let result = telemetry.send(&request.feed, request.value);
                if completions
                    .try_send(UploadCompletion { metric, result })
                    .is_err()
                {
                    warn!("Completion queue full, dropping {metric} upload result");
                }
            });

        match spawned {
            Ok(handle) => self.workers.push(handle),
            Err(err) => {
                warn!("Failed to start upload worker for {metric}: {err}");
                let failed = UploadCompletion {
                    metric,
                    result: Err(UploadError::Network),
                };
                if self.completions.try_send(failed).is_err() {
                    warn!("Completion queue full, dropping {metric} upload result");
                }
            }
        }
    }

    fn poll_completion(&mut self) -> Option<UploadCompletion> {
        self.completions.try_receive().ok()
    }

    fn abandon(&mut self) {
        self.reap();
        if !self.workers.is_empty() {
            debug!("Detaching {} upload worker(s)", self.workers.len());
        }
        self.workers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use sensemon_core::Metric;

    #[derive(Clone)]
    struct FixedTelemetry {
        result: Result<(), UploadError>,
        delay: Duration,
    }

    impl Telemetry for FixedTelemetry {
        fn send(&mut self, _feed: &str, _value: f32) -> Result<(), UploadError> {
            thread::sleep(self.delay);
            self.result
        }
    }

    fn channel() -> &'static CompletionChannel {
        Box::leak(Box::new(Channel::new()))
    }

    fn wait_for(link: &mut ThreadedLink<FixedTelemetry>) -> Option<UploadCompletion> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Some(completion) = link.poll_completion() {
                return Some(completion);
            }
            thread::sleep(Duration::from_millis(5));
        }
        None
    }

    fn request(metric: Metric) -> UploadRequest {
        UploadRequest {
            metric,
            feed: "feed".into(),
            value: 1.0,
        }
    }

    #[test]
    fn test_completion_round_trip() {
        let telemetry = FixedTelemetry {
            result: Err(UploadError::RateLimited),
            delay: Duration::ZERO,
        };
        let mut link = ThreadedLink::new(telemetry, channel());
        link.dispatch(request(Metric::Pressure));

        let completion = wait_for(&mut link).unwrap();
        assert_eq!(completion.metric, Metric::Pressure);
        assert_eq!(completion.result, Err(UploadError::RateLimited));
    }

    #[test]
    fn test_nothing_pending_polls_none() {
        let telemetry = FixedTelemetry {
            result: Ok(()),
            delay: Duration::ZERO,
        };
        let mut link = ThreadedLink::new(telemetry, channel());
        assert!(link.poll_completion().is_none());
    }

    #[test]
    fn test_abandon_detaches_slow_workers() {
        let telemetry = FixedTelemetry {
            result: Ok(()),
            delay: Duration::from_millis(200),
        };
        let mut link = ThreadedLink::new(telemetry, channel());
        link.dispatch(request(Metric::Temperature));
        assert_eq!(link.busy_workers(), 1);

        link.abandon();
        assert_eq!(link.busy_workers(), 0);
    }
}
