use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::error::HandoffError;

/// Bounded wait for a downstream consumer to remove the singleton output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandoffSettings {
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

impl HandoffSettings {
    /// Polls until `output` no longer exists.
    ///
    /// Returns how long the wait took. Gives up with [`HandoffError::Timeout`]
    /// after `max_wait`, or [`HandoffError::Cancelled`] once `shutdown` is set.
    pub fn wait_for_consumption(
        &self,
        output: &Path,
        shutdown: &AtomicBool,
    ) -> Result<Duration, HandoffError> {
        let started = Instant::now();
        let mut announced = false;

        loop {
            if !output.exists() {
                let waited = started.elapsed();
                if announced {
                    info!("{} consumed after {:?}", output.display(), waited);
                }
                return Ok(waited);
            }

            if shutdown.load(Ordering::Relaxed) {
                return Err(HandoffError::Cancelled {
                    path: output.to_path_buf(),
                });
            }

            let waited = started.elapsed();
            if waited >= self.max_wait {
                return Err(HandoffError::Timeout {
                    path: output.to_path_buf(),
                    waited,
                });
            }

            if !announced {
                info!(
                    "Waiting up to {:?} for {} to be consumed",
                    self.max_wait,
                    output.display()
                );
                announced = true;
            } else {
                debug!("{} still present after {:?}", output.display(), waited);
            }

            thread::sleep(self.poll_interval.min(self.max_wait - waited));
        }
    }
}
