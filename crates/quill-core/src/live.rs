use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::time::interval;

use crate::error::ComposeError;
use crate::messenger::Messenger;
use crate::state::{ComposeContext, ComposeStore, LiveMessage};
use quill_api::{ChatId, ContentPayload};

pub struct LiveMessageDriver {
    chat: ChatId,
    store: ComposeStore,
    messenger: Arc<dyn Messenger>,
    tick_ms: u64,
}

impl LiveMessageDriver {
    pub fn new(
        chat: ChatId,
        store: ComposeStore,
        messenger: Arc<dyn Messenger>,
        tick_ms: u64,
    ) -> Self {
        Self {
            chat,
            store,
            messenger,
            tick_ms,
        }
    }

    pub async fn start(&self) -> Result<(), ComposeError> {
        let snapshot = self.store.snapshot().await;
        if snapshot.live.is_some() {
            return Err(ComposeError::Validation("live_active".to_string()));
        }
        if matches!(snapshot.context, ComposeContext::Edit(_)) {
            return Err(ComposeError::Validation("editing".to_string()));
        }
        if !claim_in_progress(&self.store).await {
            return Err(ComposeError::Busy);
        }
        let fresh = self.store.snapshot().await;
        if fresh.live.is_some() || matches!(fresh.context, ComposeContext::Edit(_)) {
            self.store.reset(true).await;
            return Err(ComposeError::Validation("live_active".to_string()));
        }
        let result = self.bind_item(fresh.message).await;
        self.store.reset(true).await;
        result?;
        self.spawn_tick_loop();
        Ok(())
    }

    async fn bind_item(&self, text: String) -> Result<(), ComposeError> {
        let live = if !text.trim().is_empty() {
            let item = self
                .messenger
                .send_item(&self.chat, ContentPayload::Text, text.clone(), None)
                .await?;
            LiveMessage {
                item,
                typed: text.clone(),
                sent_text: text,
                sent: true,
            }
        } else {
            let item = self.messenger.insert_placeholder(&self.chat).await?;
            LiveMessage {
                item,
                typed: text,
                sent_text: String::new(),
                sent: false,
            }
        };
        self.store.update(move |state| state.live = Some(live)).await;
        Ok(())
    }

    pub async fn cancel(&self) -> Result<(), ComposeError> {
        if self.store.snapshot().await.live.is_none() {
            return Ok(());
        }
        if !claim_in_progress(&self.store).await {
            return Err(ComposeError::Busy);
        }
        let snapshot = self.store.snapshot().await;
        let Some(live) = snapshot.live else {
            self.store.reset(true).await;
            return Ok(());
        };
        if live.sent {
            self.store.reset(true).await;
            return Err(ComposeError::Validation("live_already_sent".to_string()));
        }
        let removed = self.messenger.remove_item(&live.item).await;
        if removed.is_ok() {
            self.store.update(|state| state.live = None).await;
        }
        self.store.reset(true).await;
        removed
    }

    fn spawn_tick_loop(&self) {
        let store = self.store.clone();
        let messenger = self.messenger.clone();
        let tick_ms = self.tick_ms;
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(tick_ms));
            loop {
                ticker.tick().await;
                let peeked = store.snapshot().await;
                let Some(peek) = peeked.live else {
                    break;
                };
                let hint = word_safe_prefix(&peek.typed);
                if peek.typed == peek.sent_text || hint.is_empty() || hint == peek.sent_text {
                    continue;
                }
                if !claim_in_progress(&store).await {
                    continue;
                }
                let snapshot = store.snapshot().await;
                let Some(live) = snapshot.live.filter(|l| l.item == peek.item) else {
                    store.reset(true).await;
                    break;
                };
                let candidate = word_safe_prefix(&live.typed);
                if live.typed == live.sent_text
                    || candidate.is_empty()
                    || candidate == live.sent_text
                {
                    store.reset(true).await;
                    continue;
                }
                match messenger.update_item(&live.item, candidate.clone()).await {
                    Ok(()) => {
                        store
                            .update(move |state| {
                                if let Some(current) = state.live.as_mut() {
                                    if current.item == live.item {
                                        current.sent_text = candidate;
                                        current.sent = true;
                                    }
                                }
                            })
                            .await;
                    }
                    Err(err) => warn!("live revision failed, retrying next tick: {err}"),
                }
                store.reset(true).await;
            }
            debug!("live tick loop ended");
        });
    }
}

pub(crate) async fn claim_in_progress(store: &ComposeStore) -> bool {
    store
        .update(|state| {
            if state.in_progress {
                false
            } else {
                state.in_progress = true;
                true
            }
        })
        .await
}

pub fn word_safe_prefix(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    if text.chars().last().map_or(false, char::is_whitespace) {
        return text.to_string();
    }
    match text.rfind(char::is_whitespace) {
        Some(idx) => text[..idx].to_string(),
        None => String::new(),
    }
}
