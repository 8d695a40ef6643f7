use tokio::sync::broadcast;

use crate::state::ComposePreview;
use quill_api::ContentItemId;

#[derive(Debug, Clone)]
pub enum ComposeEvent {
    PreviewChanged(ComposePreview),
    RecordingProgress { elapsed_ms: u64, finished: bool },
    OversizeRejected { name: String, limit: u64 },
    ItemSent(ContentItemId),
    CompositionReset,
}

pub type EventReceiver = broadcast::Receiver<ComposeEvent>;

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ComposeEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: ComposeEvent) {
        let _ = self.tx.send(event);
    }
}
