use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatId {
    pub value: String,
}

impl ChatId {
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContentItemId {
    pub value: Uuid,
}

impl ContentItemId {
    pub fn random() -> Self {
        Self { value: Uuid::new_v4() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContactId {
    pub value: String,
}

impl ContactId {
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoredFileRef {
    pub path: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkPreviewData {
    pub url: String,
    pub title: String,
    pub description: String,
    pub image_b64: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatKind {
    Direct,
    Group,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatProfile {
    pub kind: ChatKind,
    pub encrypted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContactRecord {
    pub id: ContactId,
    pub name: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberState {
    Active,
    Left,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemberRecord {
    pub contact: ContactId,
    pub name: String,
    pub alias: Option<String>,
    pub state: MemberState,
}

impl MemberRecord {
    pub fn is_present(&self) -> bool {
        matches!(self.state, MemberState::Active)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContentItemRef {
    pub id: ContentItemId,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContentPayload {
    Text,
    Image {
        source: StoredFileRef,
        thumb_b64: String,
        animated: bool,
    },
    Video {
        source: StoredFileRef,
        thumb_b64: String,
        duration_ms: u64,
    },
    Voice {
        source: StoredFileRef,
        duration_ms: u64,
        waveform: Vec<u8>,
    },
    File {
        source: StoredFileRef,
        name: String,
        size: u64,
    },
    Link {
        data: LinkPreviewData,
    },
    KeyRequest {
        public_key: String,
    },
}

impl ContentPayload {
    pub fn is_control(&self) -> bool {
        matches!(self, ContentPayload::KeyRequest { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactBioInfo {
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default, rename = "publicKey")]
    pub public_key: String,
    #[serde(default, rename = "openKeyChainID")]
    pub keychain_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyReadiness {
    Ready,
    ReceivedNotImported,
    Missing,
}

impl ContactBioInfo {
    pub fn from_alias(alias: Option<&str>) -> Self {
        alias
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }

    pub fn to_alias(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn readiness(&self) -> KeyReadiness {
        if !self.keychain_id.is_empty() {
            KeyReadiness::Ready
        } else if !self.public_key.is_empty() {
            KeyReadiness::ReceivedNotImported
        } else {
            KeyReadiness::Missing
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderAction {
    Encrypt,
    Decrypt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderRequest {
    pub action: ProviderAction,
    pub payload: Vec<u8>,
    pub recipient_key_ids: Vec<String>,
    pub ascii_armor: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProviderReply {
    Success { output: Vec<u8> },
    InteractionRequired { handle: String },
    Failure { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeySyncRecord {
    pub contact_id: String,
    #[serde(rename = "publicKey")]
    pub public_key: String,
    #[serde(rename = "openKeyChainID")]
    pub keychain_id: String,
}
