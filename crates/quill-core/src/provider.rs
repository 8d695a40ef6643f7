use std::collections::VecDeque;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tokio::sync::Mutex;

use crate::error::ComposeError;
use quill_api::{KeySyncRecord, ProviderReply, ProviderRequest};

#[async_trait]
pub trait KeychainProvider: Send + Sync {
    async fn perform(&self, request: ProviderRequest) -> Result<ProviderReply, ComposeError>;

    async fn import_keys(
        &self,
        records: Vec<KeySyncRecord>,
    ) -> Result<Vec<KeySyncRecord>, ComposeError>;
}

pub struct MockProvider {
    replies: Mutex<VecDeque<ProviderReply>>,
    requests: Mutex<Vec<ProviderRequest>>,
    imports: Mutex<Vec<Vec<KeySyncRecord>>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            imports: Mutex::new(Vec::new()),
        }
    }

    pub async fn script(&self, reply: ProviderReply) {
        self.replies.lock().await.push_back(reply);
    }

    pub async fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn imports(&self) -> Vec<Vec<KeySyncRecord>> {
        self.imports.lock().await.clone()
    }

    pub fn armor(payload: &[u8]) -> Vec<u8> {
        format!(
            "-----BEGIN PGP MESSAGE-----\n{}\n-----END PGP MESSAGE-----",
            STANDARD.encode(payload)
        )
        .into_bytes()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeychainProvider for MockProvider {
    async fn perform(&self, request: ProviderRequest) -> Result<ProviderReply, ComposeError> {
        let scripted = self.replies.lock().await.pop_front();
        let reply = scripted.unwrap_or_else(|| ProviderReply::Success {
            output: Self::armor(&request.payload),
        });
        self.requests.lock().await.push(request);
        Ok(reply)
    }

    async fn import_keys(
        &self,
        records: Vec<KeySyncRecord>,
    ) -> Result<Vec<KeySyncRecord>, ComposeError> {
        self.imports.lock().await.push(records.clone());
        Ok(records
            .into_iter()
            .map(|mut record| {
                if !record.public_key.is_empty() {
                    record.keychain_id = format!("okc-{}", record.contact_id);
                }
                record
            })
            .collect())
    }
}
