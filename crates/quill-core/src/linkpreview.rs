use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::sync::Mutex;
use url::Url;

use crate::event::{ComposeEvent, EventBus};
use crate::messenger::Messenger;
use crate::state::{ComposePreview, ComposeStore};

struct LinkState {
    pending: Option<String>,
    previous: Option<String>,
    cancelled: HashSet<String>,
    generation: u64,
}

pub struct LinkPreviewFetcher {
    store: ComposeStore,
    events: EventBus,
    messenger: Arc<dyn Messenger>,
    debounce_ms: u64,
    deep_link_schemes: Vec<String>,
    inner: Arc<Mutex<LinkState>>,
}

impl LinkPreviewFetcher {
    pub fn new(
        store: ComposeStore,
        events: EventBus,
        messenger: Arc<dyn Messenger>,
        debounce_ms: u64,
        deep_link_schemes: Vec<String>,
    ) -> Self {
        Self {
            store,
            events,
            messenger,
            debounce_ms,
            deep_link_schemes,
            inner: Arc::new(Mutex::new(LinkState {
                pending: None,
                previous: None,
                cancelled: HashSet::new(),
                generation: 0,
            })),
        }
    }

    pub async fn text_changed(&self, text: &str) {
        let snapshot = self.store.snapshot().await;
        if !snapshot.use_link_previews {
            return;
        }
        match snapshot.preview {
            ComposePreview::None | ComposePreview::Link { .. } => {}
            _ => return,
        }

        let mut inner = self.inner.lock().await;
        let candidate =
            first_eligible_url(text, &self.deep_link_schemes, &inner.cancelled);

        let Some(url) = candidate else {
            if inner.pending.take().is_some() {
                inner.generation += 1;
            }
            drop(inner);
            if snapshot.preview.is_link() {
                self.clear_link_preview().await;
            }
            return;
        };

        if inner.pending.as_deref() == Some(url.as_str()) {
            inner.previous = Some(url);
            return;
        }
        if let ComposePreview::Link { url: shown, data: Some(_) } = &snapshot.preview {
            if *shown == url {
                inner.previous = Some(url);
                return;
            }
        }

        let delay_ms = if inner.previous.as_deref() == Some(url.as_str()) {
            0
        } else {
            self.debounce_ms
        };
        inner.previous = Some(url.clone());
        inner.pending = Some(url.clone());
        inner.generation += 1;
        let generation = inner.generation;
        drop(inner);

        let preview = ComposePreview::Link {
            url: url.clone(),
            data: None,
        };
        let for_event = preview.clone();
        self.store.update(move |state| state.preview = preview).await;
        self.events.publish(ComposeEvent::PreviewChanged(for_event));
        self.spawn_fetch(url, generation, delay_ms);
    }

    pub async fn cancel_shown(&self) -> bool {
        let snapshot = self.store.snapshot().await;
        let url = match &snapshot.preview {
            ComposePreview::Link { url, .. } => url.clone(),
            _ => return false,
        };
        let mut inner = self.inner.lock().await;
        inner.cancelled.insert(url);
        inner.pending = None;
        inner.previous = None;
        inner.generation += 1;
        drop(inner);
        self.clear_link_preview().await;
        true
    }

    pub async fn cancel_pending(&self) {
        let mut inner = self.inner.lock().await;
        inner.pending = None;
        inner.generation += 1;
    }

    async fn clear_link_preview(&self) {
        let cleared = self
            .store
            .update(|state| {
                if state.preview.is_link() {
                    state.preview = ComposePreview::None;
                    true
                } else {
                    false
                }
            })
            .await;
        if cleared {
            self.events
                .publish(ComposeEvent::PreviewChanged(ComposePreview::None));
        }
    }

    fn spawn_fetch(&self, url: String, generation: u64, delay_ms: u64) {
        let inner = self.inner.clone();
        let store = self.store.clone();
        let events = self.events.clone();
        let messenger = self.messenger.clone();
        tokio::spawn(async move {
            if delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            {
                let guard = inner.lock().await;
                if guard.generation != generation
                    || guard.pending.as_deref() != Some(url.as_str())
                {
                    debug!("link candidate {url} superseded before fetch");
                    return;
                }
            }
            let fetched = messenger.fetch_link_metadata(&url).await;
            {
                let mut guard = inner.lock().await;
                if guard.generation != generation
                    || guard.pending.as_deref() != Some(url.as_str())
                {
                    debug!("stale metadata for {url} discarded");
                    return;
                }
                guard.pending = None;
            }
            let preview = match fetched {
                Ok(Some(data)) => ComposePreview::Link {
                    url: url.clone(),
                    data: Some(data),
                },
                Ok(None) => ComposePreview::None,
                Err(err) => {
                    debug!("metadata fetch for {url} failed: {err}");
                    ComposePreview::None
                }
            };
            let for_event = preview.clone();
            let replaced = store
                .update(move |state| {
                    match &state.preview {
                        ComposePreview::Link { url: shown, .. } if *shown == url => {
                            state.preview = preview;
                            true
                        }
                        _ => false,
                    }
                })
                .await;
            if replaced {
                events.publish(ComposeEvent::PreviewChanged(for_event));
            }
        });
    }
}

pub(crate) fn first_eligible_url(
    text: &str,
    deep_link_schemes: &[String],
    cancelled: &HashSet<String>,
) -> Option<String> {
    for token in text.split_whitespace() {
        let trimmed =
            token.trim_end_matches(|c: char| matches!(c, '.' | ',' | '!' | '?' | ';' | ')' | ']'));
        if trimmed.is_empty() || !trimmed.contains("://") {
            continue;
        }
        let parsed = match Url::parse(trimmed) {
            Ok(parsed) => parsed,
            Err(_) => continue,
        };
        if deep_link_schemes.iter().any(|scheme| scheme == parsed.scheme()) {
            continue;
        }
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            continue;
        }
        if parsed.host_str().is_none() {
            continue;
        }
        if cancelled.contains(trimmed) {
            continue;
        }
        return Some(trimmed.to_string());
    }
    None
}
