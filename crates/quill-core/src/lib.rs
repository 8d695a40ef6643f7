pub mod attach;
pub mod config;
pub mod encrypt;
pub mod error;
pub mod event;
mod keys;
pub mod linkpreview;
pub mod live;
pub mod messenger;
pub mod provider;
pub mod record;
pub mod send;
pub mod state;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};
use tokio::sync::watch;

use quill_api::{
    validate_caption, validate_filename, ChatId, ChatKind, ContactBioInfo, ContactId,
    ContentItemId, ContentItemRef, ContentPayload,
};

pub use attach::{MediaPick, MediaProbe, MockProbe, PickKind, VideoProbe};
pub use config::ComposerConfig;
pub use encrypt::{DecryptOutcome, InteractionToken, KeyPrompt, KeyPromptKind, PartialPrompt};
pub use error::ComposeError;
pub use event::{ComposeEvent, EventBus, EventReceiver};
pub use live::word_safe_prefix;
pub use messenger::{Messenger, MockMessenger, SentItem};
pub use provider::{KeychainProvider, MockProvider};
pub use record::{
    CaptureDevice, CaptureProgress, CaptureResult, MockCapture, RecordingState, VoiceRecorder,
};
pub use send::SendOutcome;
pub use state::{
    ComposeContext, ComposePreview, ComposeState, ComposeStore, LiveMessage, MediaPreviewItem,
    MediaPreviewKind, MediaSource,
};

use attach::{AttachmentPreviewBuilder, RejectReason};
use encrypt::{EncryptStep, EncryptionOrchestrator, ProviderFlow};
use linkpreview::LinkPreviewFetcher;
use live::{claim_in_progress, LiveMessageDriver};
use send::SendPipeline;

pub struct Composer {
    chat: ChatId,
    config: ComposerConfig,
    store: ComposeStore,
    events: EventBus,
    messenger: Arc<dyn Messenger>,
    provider: Arc<dyn KeychainProvider>,
    probe: Arc<dyn MediaProbe>,
    orchestrator: EncryptionOrchestrator,
    links: LinkPreviewFetcher,
    live: LiveMessageDriver,
    recorder: VoiceRecorder,
    pipeline: SendPipeline,
}

impl Composer {
    pub fn open(
        chat: ChatId,
        config: ComposerConfig,
        messenger: Arc<dyn Messenger>,
        provider: Arc<dyn KeychainProvider>,
        probe: Arc<dyn MediaProbe>,
        capture: Arc<dyn CaptureDevice>,
    ) -> Self {
        let store = ComposeStore::new(ComposeState::seeded(config.use_link_previews));
        let events = EventBus::new(64);
        let links = LinkPreviewFetcher::new(
            store.clone(),
            events.clone(),
            messenger.clone(),
            config.link_preview_debounce_ms,
            config.deep_link_schemes.clone(),
        );
        let live = LiveMessageDriver::new(
            chat.clone(),
            store.clone(),
            messenger.clone(),
            config.live_tick_ms,
        );
        let recorder = VoiceRecorder::new(
            capture,
            store.clone(),
            events.clone(),
            config.record_poll_ms,
            config.voice_max_duration_ms,
            config.temp_dir.clone(),
        );
        let orchestrator = EncryptionOrchestrator::new(
            provider.clone(),
            messenger.clone(),
            config.self_key_id.clone(),
        );
        let pipeline = SendPipeline::new(
            chat.clone(),
            messenger.clone(),
            events.clone(),
            config.inter_item_delay_ms,
        );
        Self {
            chat,
            config,
            store,
            events,
            messenger,
            provider,
            probe,
            orchestrator,
            links,
            live,
            recorder,
            pipeline,
        }
    }

    pub fn chat(&self) -> &ChatId {
        &self.chat
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    pub fn watch_state(&self) -> watch::Receiver<ComposeState> {
        self.store.subscribe()
    }

    pub async fn snapshot(&self) -> ComposeState {
        self.store.snapshot().await
    }

    pub async fn recording_state(&self) -> RecordingState {
        self.recorder.state().await
    }

    pub async fn set_text(&self, text: &str) {
        let owned = text.to_string();
        self.store
            .update(move |state| {
                state.message = owned;
                if let Some(live) = state.live.as_mut() {
                    live.typed = state.message.clone();
                }
            })
            .await;
        self.links.text_changed(text).await;
    }

    pub async fn set_link_previews_enabled(&self, enabled: bool) {
        self.store
            .update(move |state| state.use_link_previews = enabled)
            .await;
        if enabled {
            let text = self.store.snapshot().await.message;
            self.links.text_changed(&text).await;
        } else {
            self.links.cancel_pending().await;
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
    }

    pub async fn restore_draft(&self, message: String, context: ComposeContext) {
        let text = message.clone();
        self.store
            .update(move |state| {
                state.message = message;
                state.context = context;
            })
            .await;
        self.links.text_changed(&text).await;
    }

    pub async fn attach_media(
        &self,
        picks: Vec<MediaPick>,
        caption: Option<String>,
    ) -> Result<usize, ComposeError> {
        self.ensure_attachments_enabled().await?;
        if picks.is_empty() {
            return Ok(0);
        }
        let builder = AttachmentPreviewBuilder::new(
            self.probe.clone(),
            self.messenger.max_file_size(),
            self.config.max_thumb_b64_bytes,
        );
        let (items, rejections) = builder.build(picks).await;
        for rejection in &rejections {
            if let RejectReason::Oversize { limit } = rejection.reason {
                self.events.publish(ComposeEvent::OversizeRejected {
                    name: rejection.name.clone(),
                    limit,
                });
            }
        }
        if items.is_empty() {
            return Ok(0);
        }
        let accepted = items.len();
        self.replace_preview(ComposePreview::Media { items }).await;
        if let Some(caption) = caption {
            self.set_text(&caption).await;
        }
        Ok(accepted)
    }

    pub async fn attach_file(&self, name: &str, source: MediaSource) -> Result<(), ComposeError> {
        self.ensure_attachments_enabled().await?;
        validate_filename(name, &self.config.limits)?;
        let limit = self.messenger.max_file_size();
        let size = match &source {
            MediaSource::Bytes { bytes, .. } => bytes.len() as u64,
            MediaSource::TempFile { path, .. } => tokio::fs::metadata(path)
                .await
                .map_err(|_| ComposeError::Storage)?
                .len(),
        };
        if size > limit {
            self.events.publish(ComposeEvent::OversizeRejected {
                name: name.to_string(),
                limit,
            });
            return Err(ComposeError::TooLarge { limit });
        }
        self.replace_preview(ComposePreview::File {
            name: name.to_string(),
            size,
            source,
        })
        .await;
        Ok(())
    }

    pub async fn quote(&self, item: ContentItemRef) {
        self.store
            .update(move |state| state.context = ComposeContext::Quote(item))
            .await;
    }

    pub async fn begin_edit(&self, item: ContentItemRef) -> Result<(), ComposeError> {
        let state = self.store.snapshot().await;
        if state.live.is_some() {
            return Err(ComposeError::Validation("live_active".to_string()));
        }
        self.replace_preview(ComposePreview::None).await;
        let text = item.text.clone();
        self.store
            .update(move |state| {
                state.message = text;
                state.context = ComposeContext::Edit(item);
            })
            .await;
        Ok(())
    }

    pub async fn clear_context(&self) {
        self.store
            .update(|state| {
                if matches!(state.context, ComposeContext::Edit(_)) {
                    state.message.clear();
                }
                state.context = ComposeContext::None;
            })
            .await;
    }

    pub async fn cancel_preview(&self) {
        let preview = self.store.snapshot().await.preview;
        match preview {
            ComposePreview::None => {}
            ComposePreview::Link { .. } => {
                self.links.cancel_shown().await;
            }
            _ => self.replace_preview(ComposePreview::None).await,
        }
    }

    pub async fn start_recording(&self) -> Result<(), ComposeError> {
        self.ensure_attachments_enabled().await?;
        if self.recorder.is_started().await {
            return Err(ComposeError::AlreadyRecording);
        }
        self.replace_preview(ComposePreview::None).await;
        self.recorder.start().await?;
        Ok(())
    }

    pub async fn stop_recording(&self) -> Result<(), ComposeError> {
        self.recorder.stop().await.map(|_| ())
    }

    pub async fn cancel_recording(&self) {
        self.recorder.cancel().await;
        let cleared = self
            .store
            .update(|state| {
                if matches!(state.preview, ComposePreview::Voice { .. }) {
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

    pub async fn start_live(&self) -> Result<(), ComposeError> {
        let state = self.store.snapshot().await;
        match state.preview {
            ComposePreview::None | ComposePreview::Link { .. } => {}
            _ => return Err(ComposeError::Validation("attachment_pending".to_string())),
        }
        self.live.start().await
    }

    pub async fn cancel_live(&self) -> Result<(), ComposeError> {
        self.live.cancel().await
    }

    pub async fn reset(&self) {
        self.links.cancel_pending().await;
        let snapshot = self.store.snapshot().await;
        self.discard_preview_resources(snapshot.preview).await;
        if let Some(live) = snapshot.live {
            if !live.sent && claim_in_progress(&self.store).await {
                let fresh = self.store.snapshot().await;
                if let Some(current) = fresh.live.filter(|l| l.item == live.item && !l.sent) {
                    let _ = self.messenger.remove_item(&current.item).await;
                }
            }
        }
        self.store.reset(false).await;
        self.events.publish(ComposeEvent::CompositionReset);
    }

    pub async fn send(&self) -> Result<SendOutcome, ComposeError> {
        if self.recorder.is_started().await {
            self.recorder.stop().await?;
        }
        if !claim_in_progress(&self.store).await {
            return Err(ComposeError::Busy);
        }
        let result = self.send_inner().await;
        self.finish_send(result).await
    }

    pub async fn resume_send(
        &self,
        token: InteractionToken,
        affirmative: bool,
    ) -> Result<SendOutcome, ComposeError> {
        debug!("resuming provider flow {}", token.handle);
        let handle = token.handle;
        let matched = self
            .store
            .update(move |state| {
                if state.pending_interaction.as_deref() == Some(handle.as_str()) {
                    state.pending_interaction = None;
                    true
                } else {
                    false
                }
            })
            .await;
        if !matched {
            return Err(ComposeError::NotAllowed);
        }
        if !affirmative {
            self.store.update(|state| state.in_progress = false).await;
            return Err(ComposeError::NotAllowed);
        }
        let result = self.send_inner().await;
        self.finish_send(result).await
    }

    pub async fn confirm_key_request(&self, prompt: KeyPrompt) -> Result<(), ComposeError> {
        if prompt.kind == KeyPromptKind::StaleKey {
            let contact = self.messenger.contact(&self.chat).await?;
            let mut bio = ContactBioInfo::from_alias(contact.alias.as_deref());
            bio.public_key.clear();
            self.messenger
                .update_contact_alias(&prompt.contact, bio.to_alias())
                .await?;
        }
        self.send_key_request().await?;
        self.reset().await;
        Ok(())
    }

    pub async fn request_group_keys(&self, prompt: PartialPrompt) -> Result<(), ComposeError> {
        debug!(
            "requesting keys for {} group members",
            prompt.unencrypted.len()
        );
        self.send_key_request().await?;
        self.reset().await;
        Ok(())
    }

    pub async fn send_partial(&self, prompt: PartialPrompt) -> Result<SendOutcome, ComposeError> {
        if !claim_in_progress(&self.store).await {
            return Err(ComposeError::Busy);
        }
        let result = self.send_partial_inner(prompt).await;
        self.finish_send(result).await
    }

    pub async fn import_pending_keys(&self) -> Result<usize, ComposeError> {
        let profile = self.messenger.chat_profile(&self.chat).await?;
        let mut candidates: Vec<(ContactId, Option<String>)> = Vec::new();
        match profile.kind {
            ChatKind::Direct => {
                let contact = self.messenger.contact(&self.chat).await?;
                candidates.push((contact.id, contact.alias));
            }
            ChatKind::Group => {
                for member in self.messenger.group_members(&self.chat).await? {
                    if member.is_present() {
                        candidates.push((member.contact, member.alias));
                    }
                }
            }
        }
        let mut records = Vec::new();
        let mut aliases: HashMap<String, Option<String>> = HashMap::new();
        for (contact, alias) in candidates {
            if let Some(record) = keys::pending_import(&contact, alias.as_deref()) {
                aliases.insert(contact.value.clone(), alias);
                records.push(record);
            }
        }
        if records.is_empty() {
            return Ok(0);
        }
        let results = self.provider.import_keys(records).await?;
        let mut imported = 0;
        for record in results {
            if record.keychain_id.is_empty() {
                continue;
            }
            let contact = ContactId::new(record.contact_id.clone());
            let alias = aliases.get(&record.contact_id).cloned().flatten();
            let merged = keys::merge_import(alias.as_deref(), &record);
            self.messenger.update_contact_alias(&contact, merged).await?;
            imported += 1;
        }
        if imported > 0 {
            info!("imported {imported} pending keys");
        }
        Ok(imported)
    }

    pub async fn decrypt_text(&self, armored: &str) -> Result<DecryptOutcome, ComposeError> {
        self.orchestrator.decrypt_armored(armored).await
    }

    async fn send_inner(&self) -> Result<SendOutcome, ComposeError> {
        let state = self.store.snapshot().await;
        validate_caption(&state.message, &self.config.limits)?;
        if state.live.is_none() && !state.can_send() {
            return Err(ComposeError::Validation("empty_message".to_string()));
        }

        if let Some(live) = state.live.clone() {
            return self.finalize_live(live).await;
        }

        if let ComposeContext::Edit(target) = state.context.clone() {
            self.messenger
                .update_item(&target.id, state.message.clone())
                .await?;
            self.events.publish(ComposeEvent::ItemSent(target.id));
            self.cleanup_and_reset(&state).await;
            return Ok(SendOutcome::Sent {
                items: vec![target.id],
            });
        }

        let profile = self.messenger.chat_profile(&self.chat).await?;
        let caption = if profile.encrypted && !state.message.is_empty() {
            let step = match profile.kind {
                ChatKind::Direct => {
                    self.orchestrator
                        .encrypt_direct(&self.chat, &state.message)
                        .await?
                }
                ChatKind::Group => {
                    self.orchestrator
                        .encrypt_group(&self.chat, &state.message)
                        .await?
                }
            };
            match step {
                EncryptStep::Ciphertext(text) => text,
                EncryptStep::NeedKey(prompt) => return Ok(SendOutcome::KeysMissing(prompt)),
                EncryptStep::Partial(prompt) => return Ok(SendOutcome::PartialKeys(prompt)),
                EncryptStep::Interaction(token) => {
                    return Ok(SendOutcome::ProviderInteraction(token))
                }
            }
        } else {
            state.message.clone()
        };
        self.transmit(&state, caption).await
    }

    async fn send_partial_inner(&self, prompt: PartialPrompt) -> Result<SendOutcome, ComposeError> {
        let state = self.store.snapshot().await;
        if state.message.trim().is_empty() {
            return Err(ComposeError::Validation("empty_message".to_string()));
        }
        let caption = match self
            .orchestrator
            .run_encrypt(&state.message, prompt.capable_key_ids)
            .await?
        {
            ProviderFlow::Ciphertext(text) => text,
            ProviderFlow::Interaction(token) => {
                return Ok(SendOutcome::ProviderInteraction(token))
            }
        };
        self.transmit(&state, caption).await
    }

    async fn finalize_live(&self, live: LiveMessage) -> Result<SendOutcome, ComposeError> {
        if live.typed.trim().is_empty() {
            return Err(ComposeError::Validation("empty_message".to_string()));
        }
        self.messenger
            .update_item(&live.item, live.typed.clone())
            .await?;
        self.events.publish(ComposeEvent::ItemSent(live.item));
        self.links.cancel_pending().await;
        self.store.reset(false).await;
        self.events.publish(ComposeEvent::CompositionReset);
        Ok(SendOutcome::Sent {
            items: vec![live.item],
        })
    }

    async fn transmit(
        &self,
        state: &ComposeState,
        caption: String,
    ) -> Result<SendOutcome, ComposeError> {
        let ids = self.pipeline.emit(state, caption).await?;
        self.cleanup_and_reset(state).await;
        Ok(SendOutcome::Sent { items: ids })
    }

    async fn cleanup_and_reset(&self, state: &ComposeState) {
        self.links.cancel_pending().await;
        if matches!(state.preview, ComposePreview::Voice { .. }) {
            self.recorder.release().await;
        }
        self.store.reset(false).await;
        self.events.publish(ComposeEvent::CompositionReset);
    }

    async fn finish_send(
        &self,
        result: Result<SendOutcome, ComposeError>,
    ) -> Result<SendOutcome, ComposeError> {
        match &result {
            Ok(SendOutcome::Sent { .. }) => {}
            Ok(SendOutcome::ProviderInteraction(token)) => {
                let handle = token.handle.clone();
                self.store
                    .update(move |state| state.pending_interaction = Some(handle))
                    .await;
            }
            Ok(_) | Err(_) => {
                self.store.update(|state| state.in_progress = false).await;
            }
        }
        result
    }

    async fn send_key_request(&self) -> Result<ContentItemId, ComposeError> {
        let id = self
            .messenger
            .send_item(
                &self.chat,
                ContentPayload::KeyRequest {
                    public_key: self.config.self_public_key.clone(),
                },
                String::new(),
                None,
            )
            .await?;
        self.events.publish(ComposeEvent::ItemSent(id));
        Ok(id)
    }

    async fn ensure_attachments_enabled(&self) -> Result<(), ComposeError> {
        let state = self.store.snapshot().await;
        if !state.attachments_enabled() {
            return Err(ComposeError::Validation("attachments_disabled".to_string()));
        }
        Ok(())
    }

    async fn replace_preview(&self, preview: ComposePreview) {
        self.links.cancel_pending().await;
        let old = self
            .store
            .update({
                let preview = preview.clone();
                move |state| std::mem::replace(&mut state.preview, preview)
            })
            .await;
        if old != preview {
            self.discard_preview_resources(old).await;
            self.events.publish(ComposeEvent::PreviewChanged(preview));
        }
    }

    async fn discard_preview_resources(&self, preview: ComposePreview) {
        match preview {
            ComposePreview::Voice { .. } => self.recorder.cancel().await,
            ComposePreview::Media { items } => {
                for item in items {
                    if let MediaSource::TempFile { path, .. } = item.source {
                        let _ = tokio::fs::remove_file(&path).await;
                    }
                }
            }
            ComposePreview::File {
                source: MediaSource::TempFile { path, .. },
                ..
            } => {
                let _ = tokio::fs::remove_file(&path).await;
            }
            _ => {}
        }
    }
}
