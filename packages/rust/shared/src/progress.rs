//! Progress events streamed to the caller.
//!
//! The pipeline pushes [`ProgressEvent`]s into an unbounded channel; the caller
//! drains it on its own schedule. Sending never blocks and a dropped receiver
//! is ignored, so progress reporting can never affect control flow.

use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Detail attached to a progress event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ProgressDetail {
    /// Free-text description of what is happening.
    Message { message: String },
    /// Counters for a stage that processes a known number of items.
    Counts {
        current: usize,
        total: usize,
        found: usize,
    },
}

/// One observational progress update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub stage: String,
    #[serde(flatten)]
    pub detail: ProgressDetail,
}

/// Sending half handed to pipeline stages. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<UnboundedSender<ProgressEvent>>,
}

impl ProgressSink {
    /// A sink that discards every event.
    pub fn silent() -> Self {
        Self { tx: None }
    }

    /// Create a connected sink/receiver pair.
    pub fn channel() -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Report entering a stage, with free text.
    pub fn phase(&self, stage: &str, message: impl Into<String>) {
        self.send(ProgressEvent {
            stage: stage.to_string(),
            detail: ProgressDetail::Message {
                message: message.into(),
            },
        });
    }

    /// Report counters within a stage.
    pub fn counts(&self, stage: &str, current: usize, total: usize, found: usize) {
        self.send(ProgressEvent {
            stage: stage.to_string(),
            detail: ProgressDetail::Counts {
                current,
                total,
                found,
            },
        });
    }

    fn send(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_arrive_in_order() {
        let (sink, mut rx) = ProgressSink::channel();
        sink.phase("listing", "fetching 2 listing pages");
        sink.counts("details", 5, 10, 3);

        let first = rx.try_recv().expect("first event");
        assert_eq!(first.stage, "listing");
        let second = rx.try_recv().expect("second event");
        assert_eq!(
            second.detail,
            ProgressDetail::Counts {
                current: 5,
                total: 10,
                found: 3
            }
        );
    }

    #[test]
    fn dropped_receiver_is_ignored() {
        let (sink, rx) = ProgressSink::channel();
        drop(rx);
        sink.phase("listing", "still fine");
        ProgressSink::silent().counts("details", 1, 1, 1);
    }

    #[test]
    fn event_serializes_flat() {
        let event = ProgressEvent {
            stage: "catalog".into(),
            detail: ProgressDetail::Counts {
                current: 1,
                total: 10,
                found: 250,
            },
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["stage"], "catalog");
        assert_eq!(json["found"], 250);
    }
}
