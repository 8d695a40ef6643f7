use std::sync::Arc;

use log::debug;

use crate::error::ComposeError;
use crate::keys::{partition_members, MemberKeys};
use crate::messenger::Messenger;
use crate::provider::KeychainProvider;
use quill_api::{
    ChatId, ContactBioInfo, ContactId, KeyReadiness, ProviderAction, ProviderReply,
    ProviderRequest,
};

#[derive(Debug, Clone)]
pub struct KeyPrompt {
    pub contact: ContactId,
    pub kind: KeyPromptKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPromptKind {
    StaleKey,
    NoKey,
}

#[derive(Debug, Clone)]
pub struct PartialPrompt {
    pub unencrypted: Vec<ContactId>,
    pub capable_key_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct InteractionToken {
    pub handle: String,
}

#[derive(Debug)]
pub enum DecryptOutcome {
    Plaintext(String),
    Interaction(InteractionToken),
}

pub(crate) enum EncryptStep {
    Ciphertext(String),
    NeedKey(KeyPrompt),
    Partial(PartialPrompt),
    Interaction(InteractionToken),
}

pub(crate) enum ProviderFlow {
    Ciphertext(String),
    Interaction(InteractionToken),
}

pub(crate) struct EncryptionOrchestrator {
    provider: Arc<dyn KeychainProvider>,
    messenger: Arc<dyn Messenger>,
    self_key_id: String,
}

impl EncryptionOrchestrator {
    pub fn new(
        provider: Arc<dyn KeychainProvider>,
        messenger: Arc<dyn Messenger>,
        self_key_id: String,
    ) -> Self {
        Self {
            provider,
            messenger,
            self_key_id,
        }
    }

    pub async fn encrypt_direct(
        &self,
        chat: &ChatId,
        plaintext: &str,
    ) -> Result<EncryptStep, ComposeError> {
        let contact = self.messenger.contact(chat).await?;
        let bio = ContactBioInfo::from_alias(contact.alias.as_deref());
        match bio.readiness() {
            KeyReadiness::Ready => Ok(self
                .run_encrypt(plaintext, vec![bio.keychain_id])
                .await?
                .into()),
            KeyReadiness::ReceivedNotImported => Ok(EncryptStep::NeedKey(KeyPrompt {
                contact: contact.id,
                kind: KeyPromptKind::StaleKey,
            })),
            KeyReadiness::Missing => Ok(EncryptStep::NeedKey(KeyPrompt {
                contact: contact.id,
                kind: KeyPromptKind::NoKey,
            })),
        }
    }

    pub async fn encrypt_group(
        &self,
        chat: &ChatId,
        plaintext: &str,
    ) -> Result<EncryptStep, ComposeError> {
        let members = self.messenger.group_members(chat).await?;
        let MemberKeys {
            capable,
            unencrypted,
        } = partition_members(&members);
        let key_ids: Vec<String> = capable.into_iter().map(|(_, id)| id).collect();
        if unencrypted.is_empty() {
            Ok(self.run_encrypt(plaintext, key_ids).await?.into())
        } else {
            debug!(
                "group has {} members without ciphertext capability",
                unencrypted.len()
            );
            Ok(EncryptStep::Partial(PartialPrompt {
                unencrypted,
                capable_key_ids: key_ids,
            }))
        }
    }

    pub async fn run_encrypt(
        &self,
        plaintext: &str,
        mut key_ids: Vec<String>,
    ) -> Result<ProviderFlow, ComposeError> {
        let mut recipients = Vec::with_capacity(key_ids.len() + 1);
        if !self.self_key_id.is_empty() {
            recipients.push(self.self_key_id.clone());
        }
        recipients.append(&mut key_ids);
        let request = ProviderRequest {
            action: ProviderAction::Encrypt,
            payload: plaintext.as_bytes().to_vec(),
            recipient_key_ids: recipients,
            ascii_armor: true,
        };
        match self.provider.perform(request).await? {
            ProviderReply::Success { output } => {
                let text = String::from_utf8(output)
                    .map_err(|_| ComposeError::Provider("non-utf8 ciphertext".to_string()))?;
                Ok(ProviderFlow::Ciphertext(text))
            }
            ProviderReply::InteractionRequired { handle } => {
                debug!("provider suspended encrypt for interaction");
                Ok(ProviderFlow::Interaction(InteractionToken { handle }))
            }
            ProviderReply::Failure { message } => Err(ComposeError::Provider(message)),
        }
    }

    pub async fn decrypt_armored(&self, armored: &str) -> Result<DecryptOutcome, ComposeError> {
        let request = ProviderRequest {
            action: ProviderAction::Decrypt,
            payload: armored.as_bytes().to_vec(),
            recipient_key_ids: Vec::new(),
            ascii_armor: true,
        };
        match self.provider.perform(request).await? {
            ProviderReply::Success { output } => {
                let text = String::from_utf8(output)
                    .map_err(|_| ComposeError::Provider("non-utf8 plaintext".to_string()))?;
                Ok(DecryptOutcome::Plaintext(text))
            }
            ProviderReply::InteractionRequired { handle } => {
                Ok(DecryptOutcome::Interaction(InteractionToken { handle }))
            }
            ProviderReply::Failure { message } => Err(ComposeError::Provider(message)),
        }
    }
}

impl From<ProviderFlow> for EncryptStep {
    fn from(flow: ProviderFlow) -> Self {
        match flow {
            ProviderFlow::Ciphertext(text) => EncryptStep::Ciphertext(text),
            ProviderFlow::Interaction(token) => EncryptStep::Interaction(token),
        }
    }
}
