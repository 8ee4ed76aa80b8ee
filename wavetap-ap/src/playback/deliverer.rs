//! Sample batch delivery
//!
//! Runs on the audio-pipeline thread right after the tap. In pull mode only
//! the latest batch is kept and clients ask for it with `getSamples`; in push
//! mode every batch is handed to the session's event pump and published as a
//! `samples` event.

use crate::audio::SampleBatch;
use crate::playback::events::SessionSignal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

/// How extracted batches reach clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Latest batch kept for `getSamples`
    Pull,
    /// Every batch published as an event
    #[default]
    Push,
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryMode::Pull => write!(f, "pull"),
            DeliveryMode::Push => write!(f, "push"),
        }
    }
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pull" => Ok(DeliveryMode::Pull),
            "push" => Ok(DeliveryMode::Push),
            other => Err(format!("unknown delivery mode '{}' (expected pull or push)", other)),
        }
    }
}

/// Per-session delivery of extracted batches
pub struct SampleDeliverer {
    mode: DeliveryMode,
    /// Pull mode: most recent batch, swapped whole on each delivery
    latest: Mutex<Arc<SampleBatch>>,
    /// Push mode: handoff to the session pump
    signals: UnboundedSender<SessionSignal>,
}

impl SampleDeliverer {
    pub fn new(mode: DeliveryMode, signals: UnboundedSender<SessionSignal>) -> Self {
        Self {
            mode,
            latest: Mutex::new(Arc::new(Vec::new())),
            signals,
        }
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// Deliver one batch according to the configured mode
    ///
    /// In push mode a batch delivered after the session pump has gone away is
    /// dropped without error.
    pub fn deliver(&self, batch: SampleBatch) {
        match self.mode {
            DeliveryMode::Pull => {
                if let Ok(mut latest) = self.latest.lock() {
                    *latest = Arc::new(batch);
                }
            }
            DeliveryMode::Push => {
                if self.signals.send(SessionSignal::Samples(batch)).is_err() {
                    trace!("Session pump gone, dropping sample batch");
                }
            }
        }
    }

    /// Latest batch (pull mode); empty until the first capture
    ///
    /// Always empty in push mode.
    pub fn snapshot(&self) -> Arc<SampleBatch> {
        self.latest
            .lock()
            .map(|latest| Arc::clone(&latest))
            .unwrap_or_default()
    }
}
