//! Background silence detection.
//!
//! A periodic scanner, independent of packet arrival: any source whose
//! last activity is older than the silence threshold and whose buffer is
//! non-empty gets flushed to its dispatcher. An explicit silence marker
//! and a source that simply stopped sending packets look identical here;
//! both manifest as a stale last-activity instant.

use crate::audio::dispatcher::SegmentDispatcher;
use crate::audio::session::SessionStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, trace};

pub struct SilenceDetector {
    store: Arc<SessionStore>,
    dispatcher: Arc<SegmentDispatcher>,
    threshold: Duration,
    tick: Duration,
}

impl SilenceDetector {
    pub fn new(
        store: Arc<SessionStore>,
        dispatcher: Arc<SegmentDispatcher>,
        threshold: Duration,
        tick: Duration,
    ) -> Self {
        Self {
            store,
            dispatcher,
            threshold,
            tick,
        }
    }

    /// Runs until the stop signal flips. This is the only component with
    /// its own scheduling loop independent of the ingestion path.
    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        debug!(tick_ms = self.tick.as_millis() as u64, "silence detector started");
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => self.sweep(),
                _ = stop.changed() => {
                    if *stop.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("silence detector stopped");
    }

    /// One scan over all known sources.
    ///
    /// `snapshot_and_clear` re-checks emptiness under the store lock and
    /// refreshes the activity clock, so overlapping ticks cannot flush the
    /// same threshold crossing twice.
    pub fn sweep(&self) {
        let stale = self.store.stale_tags(self.threshold);
        if stale.is_empty() {
            trace!("sweep found no stale sources");
            return;
        }
        for tag in stale {
            if let Some(batch) = self.store.snapshot_and_clear(tag) {
                debug!(
                    source_tag = tag,
                    packets = batch.len(),
                    "silence threshold crossed, flushing"
                );
                self.dispatcher.submit(batch);
            }
        }
    }
}
