use std::thread;

use embassy_time::Instant;
use sensemon_core::Clock;

/// Wall clock backed by embassy-time's std driver.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep_until(&mut self, deadline: Instant) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.as_ticks() > 0 {
            thread::sleep(std::time::Duration::from_micros(remaining.as_micros()));
        }
    }
}
