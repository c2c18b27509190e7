//! Background expiry of seat holds.
//!
//! Reads already expire overdue bookings lazily; the reaper makes sure seats
//! are released even when nobody is looking.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::lifecycle::BookingLifecycle;

pub struct ExpiryReaper {
    lifecycle: Arc<BookingLifecycle>,
    interval: Duration,
}

impl ExpiryReaper {
    pub fn new(lifecycle: Arc<BookingLifecycle>, interval: Duration) -> Self {
        Self { lifecycle, interval }
    }

    /// Expire everything currently overdue. Returns the number of bookings moved to EXPIRED.
    pub fn sweep(&self) -> usize {
        let count = self.lifecycle.expire_overdue();
        if count > 0 {
            info!(count, "Expired overdue bookings");
        } else {
            debug!("Expiry sweep found nothing to do");
        }
        count
    }

    /// Start the reaper in the background. It stops once `shutdown` flips to true.
    pub fn start(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_ms = self.interval.as_millis() as u64, "Expiry reaper started");
            self.run(shutdown).await;
            info!("Expiry reaper stopped");
        })
    }

    async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                return;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep();
                }
                changed = shutdown.changed() => {
                    // Sender dropped counts as shutdown too
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }
}
