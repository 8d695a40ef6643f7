use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::ComposeError;
use crate::state::MediaSource;
use quill_api::{
    ChatId, ChatKind, ChatProfile, ContactId, ContactRecord, ContentItemId, ContentPayload,
    LinkPreviewData, MemberRecord, StoredFileRef,
};

#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_item(
        &self,
        chat: &ChatId,
        payload: ContentPayload,
        text: String,
        quote: Option<ContentItemId>,
    ) -> Result<ContentItemId, ComposeError>;

    async fn update_item(&self, item: &ContentItemId, text: String) -> Result<(), ComposeError>;

    async fn insert_placeholder(&self, chat: &ChatId) -> Result<ContentItemId, ComposeError>;

    async fn remove_item(&self, item: &ContentItemId) -> Result<(), ComposeError>;

    async fn fetch_link_metadata(
        &self,
        url: &str,
    ) -> Result<Option<LinkPreviewData>, ComposeError>;

    async fn store_file(&self, source: &MediaSource) -> Result<StoredFileRef, ComposeError>;

    fn max_file_size(&self) -> u64;

    async fn chat_profile(&self, chat: &ChatId) -> Result<ChatProfile, ComposeError>;

    async fn contact(&self, chat: &ChatId) -> Result<ContactRecord, ComposeError>;

    async fn group_members(&self, chat: &ChatId) -> Result<Vec<MemberRecord>, ComposeError>;

    async fn update_contact_alias(
        &self,
        contact: &ContactId,
        alias: String,
    ) -> Result<(), ComposeError>;
}

#[derive(Debug, Clone)]
pub struct SentItem {
    pub id: ContentItemId,
    pub chat: ChatId,
    pub payload: ContentPayload,
    pub text: String,
    pub quote: Option<ContentItemId>,
}

struct MockState {
    sent: Vec<SentItem>,
    updates: Vec<(ContentItemId, String)>,
    placeholders: Vec<ContentItemId>,
    removed: Vec<ContentItemId>,
    stored: Vec<MediaSource>,
    fetched: Vec<String>,
    aliases: HashMap<String, String>,
    link_metadata: HashMap<String, LinkPreviewData>,
    link_failures: HashSet<String>,
    profile: ChatProfile,
    contact: Option<ContactRecord>,
    members: Vec<MemberRecord>,
    fail_store: HashSet<String>,
    fail_send: bool,
}

pub struct MockMessenger {
    state: Arc<Mutex<MockState>>,
    max_file_size: u64,
}

impl MockMessenger {
    pub fn new() -> Self {
        Self::with_max_file_size(25 * 1024 * 1024)
    }

    pub fn with_max_file_size(max_file_size: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                sent: Vec::new(),
                updates: Vec::new(),
                placeholders: Vec::new(),
                removed: Vec::new(),
                stored: Vec::new(),
                fetched: Vec::new(),
                aliases: HashMap::new(),
                link_metadata: HashMap::new(),
                link_failures: HashSet::new(),
                profile: ChatProfile {
                    kind: ChatKind::Direct,
                    encrypted: false,
                },
                contact: None,
                members: Vec::new(),
                fail_store: HashSet::new(),
                fail_send: false,
            })),
            max_file_size,
        }
    }

    pub async fn set_profile(&self, profile: ChatProfile) {
        self.state.lock().await.profile = profile;
    }

    pub async fn set_contact(&self, contact: ContactRecord) {
        self.state.lock().await.contact = Some(contact);
    }

    pub async fn set_members(&self, members: Vec<MemberRecord>) {
        self.state.lock().await.members = members;
    }

    pub async fn set_link_metadata(&self, url: &str, data: LinkPreviewData) {
        self.state
            .lock()
            .await
            .link_metadata
            .insert(url.to_string(), data);
    }

    pub async fn fail_link_fetch(&self, url: &str) {
        self.state.lock().await.link_failures.insert(url.to_string());
    }

    pub async fn fail_store_for(&self, name: &str) {
        self.state.lock().await.fail_store.insert(name.to_string());
    }

    pub async fn fail_sends(&self, fail: bool) {
        self.state.lock().await.fail_send = fail;
    }

    pub async fn sent(&self) -> Vec<SentItem> {
        self.state.lock().await.sent.clone()
    }

    pub async fn updates(&self) -> Vec<(ContentItemId, String)> {
        self.state.lock().await.updates.clone()
    }

    pub async fn placeholders(&self) -> Vec<ContentItemId> {
        self.state.lock().await.placeholders.clone()
    }

    pub async fn removed(&self) -> Vec<ContentItemId> {
        self.state.lock().await.removed.clone()
    }

    pub async fn stored(&self) -> Vec<MediaSource> {
        self.state.lock().await.stored.clone()
    }

    pub async fn fetched(&self) -> Vec<String> {
        self.state.lock().await.fetched.clone()
    }

    pub async fn alias_of(&self, contact: &ContactId) -> Option<String> {
        self.state.lock().await.aliases.get(&contact.value).cloned()
    }
}

impl Default for MockMessenger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Messenger for MockMessenger {
    async fn send_item(
        &self,
        chat: &ChatId,
        payload: ContentPayload,
        text: String,
        quote: Option<ContentItemId>,
    ) -> Result<ContentItemId, ComposeError> {
        let mut state = self.state.lock().await;
        if state.fail_send {
            return Err(ComposeError::Transport("mock send failure".to_string()));
        }
        let id = ContentItemId::random();
        state.sent.push(SentItem {
            id,
            chat: chat.clone(),
            payload,
            text,
            quote,
        });
        Ok(id)
    }

    async fn update_item(&self, item: &ContentItemId, text: String) -> Result<(), ComposeError> {
        self.state.lock().await.updates.push((*item, text));
        Ok(())
    }

    async fn insert_placeholder(&self, chat: &ChatId) -> Result<ContentItemId, ComposeError> {
        let _ = chat;
        let id = ContentItemId::random();
        self.state.lock().await.placeholders.push(id);
        Ok(id)
    }

    async fn remove_item(&self, item: &ContentItemId) -> Result<(), ComposeError> {
        self.state.lock().await.removed.push(*item);
        Ok(())
    }

    async fn fetch_link_metadata(
        &self,
        url: &str,
    ) -> Result<Option<LinkPreviewData>, ComposeError> {
        let mut state = self.state.lock().await;
        state.fetched.push(url.to_string());
        if state.link_failures.contains(url) {
            return Err(ComposeError::Transport("metadata fetch failed".to_string()));
        }
        Ok(state.link_metadata.get(url).cloned())
    }

    async fn store_file(&self, source: &MediaSource) -> Result<StoredFileRef, ComposeError> {
        let mut state = self.state.lock().await;
        if state.fail_store.contains(source.name()) {
            return Err(ComposeError::Storage);
        }
        let size = match source {
            MediaSource::Bytes { bytes, .. } => bytes.len() as u64,
            MediaSource::TempFile { path, .. } => tokio::fs::metadata(path)
                .await
                .map(|meta| meta.len())
                .unwrap_or(0),
        };
        state.stored.push(source.clone());
        Ok(StoredFileRef {
            path: format!("store/{}", source.name()),
            size,
        })
    }

    fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    async fn chat_profile(&self, _chat: &ChatId) -> Result<ChatProfile, ComposeError> {
        Ok(self.state.lock().await.profile.clone())
    }

    async fn contact(&self, _chat: &ChatId) -> Result<ContactRecord, ComposeError> {
        let state = self.state.lock().await;
        let mut contact = state.contact.clone().ok_or(ComposeError::NotFound)?;
        if let Some(alias) = state.aliases.get(&contact.id.value) {
            contact.alias = Some(alias.clone());
        }
        Ok(contact)
    }

    async fn group_members(&self, _chat: &ChatId) -> Result<Vec<MemberRecord>, ComposeError> {
        let state = self.state.lock().await;
        let mut members = state.members.clone();
        for member in &mut members {
            if let Some(alias) = state.aliases.get(&member.contact.value) {
                member.alias = Some(alias.clone());
            }
        }
        Ok(members)
    }

    async fn update_contact_alias(
        &self,
        contact: &ContactId,
        alias: String,
    ) -> Result<(), ComposeError> {
        self.state
            .lock()
            .await
            .aliases
            .insert(contact.value.clone(), alias);
        Ok(())
    }
}
