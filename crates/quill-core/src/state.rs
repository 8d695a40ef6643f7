use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};

use quill_api::{ContentItemId, ContentItemRef, LinkPreviewData};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaSource {
    Bytes { name: String, bytes: Vec<u8> },
    TempFile { name: String, path: PathBuf },
}

impl MediaSource {
    pub fn name(&self) -> &str {
        match self {
            MediaSource::Bytes { name, .. } => name,
            MediaSource::TempFile { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MediaPreviewKind {
    Image { animated: bool },
    Video { duration_ms: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaPreviewItem {
    pub thumb_b64: String,
    pub kind: MediaPreviewKind,
    pub source: MediaSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ComposePreview {
    None,
    Link {
        url: String,
        data: Option<LinkPreviewData>,
    },
    Media {
        items: Vec<MediaPreviewItem>,
    },
    Voice {
        path: PathBuf,
        duration_ms: u64,
        waveform: Vec<u8>,
        finished: bool,
    },
    File {
        name: String,
        size: u64,
        source: MediaSource,
    },
}

impl ComposePreview {
    pub fn is_none(&self) -> bool {
        matches!(self, ComposePreview::None)
    }

    pub fn is_link(&self) -> bool {
        matches!(self, ComposePreview::Link { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ComposeContext {
    None,
    Quote(ContentItemRef),
    Edit(ContentItemRef),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveMessage {
    pub item: ContentItemId,
    pub typed: String,
    pub sent_text: String,
    pub sent: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposeState {
    pub message: String,
    pub live: Option<LiveMessage>,
    pub preview: ComposePreview,
    pub context: ComposeContext,
    pub in_progress: bool,
    pub pending_interaction: Option<String>,
    pub use_link_previews: bool,
}

impl ComposeState {
    pub fn seeded(use_link_previews: bool) -> Self {
        Self {
            message: String::new(),
            live: None,
            preview: ComposePreview::None,
            context: ComposeContext::None,
            in_progress: false,
            pending_interaction: None,
            use_link_previews,
        }
    }

    pub fn can_send(&self) -> bool {
        match &self.preview {
            ComposePreview::Media { items } => !items.is_empty(),
            ComposePreview::Voice { finished, .. } => *finished,
            ComposePreview::File { .. } => true,
            _ => !self.message.trim().is_empty(),
        }
    }

    pub fn attachments_enabled(&self) -> bool {
        self.live.is_none() && !matches!(self.context, ComposeContext::Edit(_))
    }
}

#[derive(Clone)]
pub struct ComposeStore {
    inner: Arc<Mutex<ComposeState>>,
    seed: ComposeState,
    tx: Arc<watch::Sender<ComposeState>>,
}

impl ComposeStore {
    pub fn new(seed: ComposeState) -> Self {
        let (tx, _) = watch::channel(seed.clone());
        Self {
            inner: Arc::new(Mutex::new(seed.clone())),
            seed,
            tx: Arc::new(tx),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ComposeState> {
        self.tx.subscribe()
    }

    pub async fn snapshot(&self) -> ComposeState {
        self.inner.lock().await.clone()
    }

    pub async fn update<F, R>(&self, transform: F) -> R
    where
        F: FnOnce(&mut ComposeState) -> R,
    {
        let mut guard = self.inner.lock().await;
        let out = transform(&mut guard);
        let snap = guard.clone();
        drop(guard);
        self.tx.send_replace(snap);
        out
    }

    pub async fn reset(&self, live_keep_alive: bool) {
        let seed = self.seed.clone();
        self.update(move |state| {
            if live_keep_alive {
                state.in_progress = false;
            } else {
                *state = seed;
            }
        })
        .await;
    }
}
