use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::warn;
use tokio::time::sleep;

use crate::encrypt::{InteractionToken, KeyPrompt, PartialPrompt};
use crate::error::ComposeError;
use crate::event::{ComposeEvent, EventBus};
use crate::messenger::Messenger;
use crate::state::{ComposeContext, ComposePreview, ComposeState, MediaPreviewKind, MediaSource};
use quill_api::{ChatId, ContentItemId, ContentPayload};

#[derive(Debug, Clone)]
pub enum SendOutcome {
    Sent { items: Vec<ContentItemId> },
    KeysMissing(KeyPrompt),
    PartialKeys(PartialPrompt),
    ProviderInteraction(InteractionToken),
}

pub(crate) struct SendPipeline {
    chat: ChatId,
    messenger: Arc<dyn Messenger>,
    events: EventBus,
    inter_item_delay_ms: u64,
}

impl SendPipeline {
    pub fn new(
        chat: ChatId,
        messenger: Arc<dyn Messenger>,
        events: EventBus,
        inter_item_delay_ms: u64,
    ) -> Self {
        Self {
            chat,
            messenger,
            events,
            inter_item_delay_ms,
        }
    }

    pub async fn emit(
        &self,
        state: &ComposeState,
        caption: String,
    ) -> Result<Vec<ContentItemId>, ComposeError> {
        let quote = match &state.context {
            ComposeContext::Quote(target) => Some(target.id),
            _ => None,
        };
        match &state.preview {
            ComposePreview::Media { items } if !items.is_empty() => {
                let mut payloads = Vec::new();
                let mut failed = Vec::new();
                for item in items {
                    match self.messenger.store_file(&item.source).await {
                        Ok(stored) => payloads.push(match &item.kind {
                            MediaPreviewKind::Image { animated } => ContentPayload::Image {
                                source: stored,
                                thumb_b64: item.thumb_b64.clone(),
                                animated: *animated,
                            },
                            MediaPreviewKind::Video { duration_ms } => ContentPayload::Video {
                                source: stored,
                                thumb_b64: item.thumb_b64.clone(),
                                duration_ms: *duration_ms,
                            },
                        }),
                        Err(err) => {
                            warn!(
                                "attachment {} failed to materialize: {err}",
                                item.source.name()
                            );
                            failed.push(item.source.clone());
                        }
                    }
                }
                if payloads.is_empty() {
                    let ids = self.fallback_text(caption, quote).await?;
                    discard_sources(&failed).await;
                    return Ok(ids);
                }
                let last = payloads.len() - 1;
                let mut ids = Vec::with_capacity(payloads.len());
                for (index, payload) in payloads.into_iter().enumerate() {
                    if index > 0 && self.inter_item_delay_ms > 0 {
                        sleep(Duration::from_millis(self.inter_item_delay_ms)).await;
                    }
                    let (text, item_quote) = if index == last {
                        (caption.clone(), quote)
                    } else {
                        (String::new(), None)
                    };
                    let id = self
                        .messenger
                        .send_item(&self.chat, payload, text, item_quote)
                        .await?;
                    self.events.publish(ComposeEvent::ItemSent(id));
                    ids.push(id);
                }
                discard_sources(&failed).await;
                Ok(ids)
            }
            ComposePreview::Voice {
                path,
                duration_ms,
                waveform,
                ..
            } => {
                let source = MediaSource::TempFile {
                    name: file_name(path),
                    path: path.clone(),
                };
                match self.messenger.store_file(&source).await {
                    Ok(stored) => {
                        let payload = ContentPayload::Voice {
                            source: stored,
                            duration_ms: *duration_ms,
                            waveform: waveform.clone(),
                        };
                        self.single(payload, caption, quote).await
                    }
                    Err(err) => {
                        warn!("voice note failed to materialize: {err}");
                        let ids = self.fallback_text(caption, quote).await?;
                        discard_sources(std::slice::from_ref(&source)).await;
                        Ok(ids)
                    }
                }
            }
            ComposePreview::File { name, size, source } => {
                match self.messenger.store_file(source).await {
                    Ok(stored) => {
                        let payload = ContentPayload::File {
                            source: stored,
                            name: name.clone(),
                            size: *size,
                        };
                        self.single(payload, caption, quote).await
                    }
                    Err(err) => {
                        warn!("file attachment failed to materialize: {err}");
                        let ids = self.fallback_text(caption, quote).await?;
                        discard_sources(std::slice::from_ref(source)).await;
                        Ok(ids)
                    }
                }
            }
            ComposePreview::Link { data, .. } => {
                let payload = match data {
                    Some(data) => ContentPayload::Link { data: data.clone() },
                    None => ContentPayload::Text,
                };
                self.single(payload, caption, quote).await
            }
            _ => self.single(ContentPayload::Text, caption, quote).await,
        }
    }

    async fn single(
        &self,
        payload: ContentPayload,
        caption: String,
        quote: Option<ContentItemId>,
    ) -> Result<Vec<ContentItemId>, ComposeError> {
        let id = self
            .messenger
            .send_item(&self.chat, payload, caption, quote)
            .await?;
        self.events.publish(ComposeEvent::ItemSent(id));
        Ok(vec![id])
    }

    async fn fallback_text(
        &self,
        caption: String,
        quote: Option<ContentItemId>,
    ) -> Result<Vec<ContentItemId>, ComposeError> {
        if caption.trim().is_empty() {
            return Err(ComposeError::Storage);
        }
        self.single(ContentPayload::Text, caption, quote).await
    }
}

async fn discard_sources(sources: &[MediaSource]) {
    for source in sources {
        if let MediaSource::TempFile { path, .. } = source {
            let _ = tokio::fs::remove_file(path).await;
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "voice.opus".to_string())
}
