//! Outgoing heartbeat
//!
//! The server drops clients that stay silent, so a KEEP_ALIVE goes out right
//! away and then on every tick. Detecting a dead link is the dispatcher's
//! job; a failed send here just ends the probe.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

use crate::protocol::Message;
use crate::transport::Transport;
use crate::worker::Worker;

/// Floor for the heartbeat period; a zero interval is not a valid tick
const MIN_INTERVAL: Duration = Duration::from_millis(1);

pub struct LivenessProbe {
    worker: Worker,
}

impl LivenessProbe {
    pub(crate) fn start(transport: Transport, interval: Duration) -> Self {
        let worker = Worker::spawn(move |cancel| async move {
            let heartbeat = Message::keep_alive();
            let mut ticker = tokio::time::interval(interval.max(MIN_INTERVAL));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                trace!(peer = transport.peer(), "Keep alive");
                if let Err(e) = transport.send_frame(&heartbeat).await {
                    warn!(error = %e, "Keep alive failed, probe stopping");
                    return;
                }
            }
            debug!("Liveness probe stopped");
        });
        Self { worker }
    }

    pub fn stop(&self) {
        self.worker.stop();
    }

    pub fn is_running(&self) -> bool {
        !self.worker.is_finished()
    }
}
