//! Background hot-reload poller
//!
//! A two-state machine (`Stopped`/`Running`) owned by the gateway instance.
//! The first registered schema-change listener on a non-local config starts
//! the single interval task; removing the last listener stops it. Start and
//! stop are idempotent, and the listener registry serializes both transitions
//! against its own mutation, so two pollers can never run at once.
//!
//! Each tick awaits the full resolve/recompose cycle before the next tick is
//! taken, so ticks never overlap; a slow poll simply delays the next one.
//! A failed tick is logged and the previously published schema stays
//! authoritative.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::gateway::GatewayInner;

/// Timer state for the hot-reload poller. Exists only while at least one
/// schema-change listener is registered.
pub(crate) struct Poller {
    handle: Option<JoinHandle<()>>,
}

impl Poller {
    pub(crate) fn new() -> Self {
        Self { handle: None }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Start the interval task; a no-op when already running.
    pub(crate) fn start(&mut self, inner: Arc<GatewayInner>, interval: Duration) {
        if self.handle.is_some() {
            return;
        }
        tracing::debug!(interval_ms = interval.as_millis() as u64, "schema poller started");
        self.handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of a tokio interval completes immediately;
            // consume it so the first poll happens one interval from now.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(err) = inner.poll_once().await {
                    tracing::warn!(
                        error = %err,
                        "schema poll failed; previously published schema remains authoritative"
                    );
                }
            }
        }));
    }

    /// Cancel the timer task and clear its state; a no-op when stopped.
    pub(crate) fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            tracing::debug!("schema poller stopped");
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}
