//! Change notifications for editor hosts.

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use url::Url;

use crate::region::RegionId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Diffs of some zone on the document were recomputed.
    DiffZonesChanged { document: Url },
    /// An idle zone's diffs changed (never sent for streaming zones).
    DiffsChangedWhileIdle { document: Url, region: RegionId },
    /// A zone started or stopped streaming.
    StreamingStateChanged { document: Url, region: RegionId },
}

/// Fan-out of engine events to every live subscriber.
#[derive(Debug, Default)]
pub struct EventHub {
    subscribers: Vec<UnboundedSender<EngineEvent>>,
}

impl EventHub {
    pub fn subscribe(&mut self) -> UnboundedReceiver<EngineEvent> {
        let (tx, rx) = unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Deliver `event`, dropping subscribers whose receiver is gone.
    pub fn emit(&mut self, event: EngineEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
