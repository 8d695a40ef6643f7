use super::{direct_contact, harness, member, pick_image, ready_alias, Harness};
use crate::{
    ComposeError, DecryptOutcome, InteractionToken, KeyPromptKind, MockProvider, SendOutcome,
};
use quill_api::{
    ChatKind, ChatProfile, ContactBioInfo, ContactId, ContentPayload, MemberState, ProviderAction,
    ProviderReply,
};

async fn encrypted_direct(h: &Harness, alias: Option<&str>) {
    h.messenger
        .set_profile(ChatProfile {
            kind: ChatKind::Direct,
            encrypted: true,
        })
        .await;
    h.messenger.set_contact(direct_contact(alias)).await;
}

async fn encrypted_group(h: &Harness) {
    h.messenger
        .set_profile(ChatProfile {
            kind: ChatKind::Group,
            encrypted: true,
        })
        .await;
}

#[tokio::test]
async fn direct_ready_contact_gets_ciphertext() {
    let h = harness("enc-direct");
    let alias = ready_alias("okc-peer");
    encrypted_direct(&h, Some(&alias)).await;
    h.composer.set_text("secret greeting").await;

    let outcome = h.composer.send().await.expect("send");
    assert!(matches!(outcome, SendOutcome::Sent { .. }));

    let requests = h.provider.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].action, ProviderAction::Encrypt);
    assert_eq!(requests[0].recipient_key_ids, vec!["okc-self", "okc-peer"]);
    assert!(requests[0].ascii_armor);
    assert_eq!(requests[0].payload, b"secret greeting".to_vec());

    let sent = h.messenger.sent().await;
    assert_eq!(sent.len(), 1);
    assert!(matches!(sent[0].payload, ContentPayload::Text));
    assert!(sent[0].text.starts_with("-----BEGIN PGP MESSAGE-----"));

    let state = h.composer.snapshot().await;
    assert!(state.message.is_empty());
    assert!(!state.in_progress);
}

#[tokio::test]
async fn unencrypted_chat_sends_plaintext() {
    let h = harness("enc-off");
    h.composer.set_text("plain hello").await;

    let outcome = h.composer.send().await.expect("send");
    assert!(matches!(outcome, SendOutcome::Sent { .. }));
    assert!(h.provider.requests().await.is_empty());
    assert_eq!(h.messenger.sent().await[0].text, "plain hello");
}

#[tokio::test]
async fn attachments_skip_encryption_without_caption() {
    let h = harness("enc-media");
    let alias = ready_alias("okc-peer");
    encrypted_direct(&h, Some(&alias)).await;
    h.composer
        .attach_media(vec![pick_image("pic.png")], None)
        .await
        .expect("attach media");

    let outcome = h.composer.send().await.expect("send");
    assert!(matches!(outcome, SendOutcome::Sent { .. }));
    assert!(h.provider.requests().await.is_empty());
    assert!(matches!(
        h.messenger.sent().await[0].payload,
        ContentPayload::Image { .. }
    ));
}

#[tokio::test]
async fn missing_key_prompts_and_preserves_draft() {
    let h = harness("enc-nokey");
    encrypted_direct(&h, None).await;
    h.composer.set_text("hold this").await;

    let outcome = h.composer.send().await.expect("send resolves to a prompt");
    let SendOutcome::KeysMissing(prompt) = outcome else {
        panic!("expected a key prompt");
    };
    assert_eq!(prompt.kind, KeyPromptKind::NoKey);
    assert_eq!(prompt.contact.value, "peer-1");

    let state = h.composer.snapshot().await;
    assert_eq!(state.message, "hold this");
    assert!(!state.in_progress);
    assert!(h.messenger.sent().await.is_empty());

    let again = h.composer.send().await.expect("prompt again");
    assert!(matches!(again, SendOutcome::KeysMissing(_)));
}

#[tokio::test]
async fn confirmed_key_request_sends_control_item_and_clears() {
    let h = harness("enc-keyreq");
    encrypted_direct(&h, None).await;
    h.composer.set_text("pending words").await;

    let SendOutcome::KeysMissing(prompt) = h.composer.send().await.expect("prompt") else {
        panic!("expected a key prompt");
    };
    h.composer.confirm_key_request(prompt).await.expect("confirm");

    let sent = h.messenger.sent().await;
    assert_eq!(sent.len(), 1);
    assert!(sent[0].payload.is_control());
    let ContentPayload::KeyRequest { public_key } = &sent[0].payload else {
        panic!("expected a key request item");
    };
    assert_eq!(public_key, "SELF-PUBLIC-KEY");
    assert!(h.composer.snapshot().await.message.is_empty());
}

#[tokio::test]
async fn stale_key_confirm_discards_old_key() {
    let h = harness("enc-stale");
    let alias = ContactBioInfo {
        tag: "pal".to_string(),
        public_key: "OLD-KEY".to_string(),
        ..Default::default()
    }
    .to_alias();
    encrypted_direct(&h, Some(&alias)).await;
    h.composer.set_text("try again").await;

    let SendOutcome::KeysMissing(prompt) = h.composer.send().await.expect("prompt") else {
        panic!("expected a key prompt");
    };
    assert_eq!(prompt.kind, KeyPromptKind::StaleKey);
    h.composer.confirm_key_request(prompt).await.expect("confirm");

    let updated = h
        .messenger
        .alias_of(&ContactId::new("peer-1"))
        .await
        .expect("alias rewritten");
    let bio = ContactBioInfo::from_alias(Some(&updated));
    assert!(bio.public_key.is_empty());
    assert_eq!(bio.tag, "pal");
    assert!(matches!(
        h.messenger.sent().await[0].payload,
        ContentPayload::KeyRequest { .. }
    ));
}

#[tokio::test]
async fn group_partition_prompts_with_unencrypted_members() {
    let h = harness("enc-group");
    encrypted_group(&h).await;
    let alice = ready_alias("okc-alice");
    let bob = ready_alias("okc-bob");
    let carol = ready_alias("okc-carol");
    let erin = ContactBioInfo {
        tag: "buddy".to_string(),
        ..Default::default()
    }
    .to_alias();
    let frank = ready_alias("okc-frank");
    h.messenger
        .set_members(vec![
            member("alice", Some(&alice), MemberState::Active),
            member("bob", Some(&bob), MemberState::Active),
            member("carol", Some(&carol), MemberState::Active),
            member("dave", None, MemberState::Active),
            member("erin", Some(&erin), MemberState::Active),
            member("frank", Some(&frank), MemberState::Left),
        ])
        .await;
    h.composer.set_text("team update").await;

    let SendOutcome::PartialKeys(prompt) = h.composer.send().await.expect("send") else {
        panic!("expected a partial prompt");
    };
    let unencrypted: Vec<&str> = prompt
        .unencrypted
        .iter()
        .map(|contact| contact.value.as_str())
        .collect();
    assert_eq!(unencrypted, vec!["dave", "erin"]);
    assert_eq!(
        prompt.capable_key_ids,
        vec!["okc-alice", "okc-bob", "okc-carol"]
    );
    assert_eq!(h.composer.snapshot().await.message, "team update");
    assert!(h.messenger.sent().await.is_empty());

    let outcome = h.composer.send_partial(prompt).await.expect("partial send");
    assert!(matches!(outcome, SendOutcome::Sent { .. }));
    let requests = h.provider.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].recipient_key_ids,
        vec!["okc-self", "okc-alice", "okc-bob", "okc-carol"]
    );
    let sent = h.messenger.sent().await;
    assert_eq!(sent.len(), 1);
    assert!(sent[0].text.starts_with("-----BEGIN PGP MESSAGE-----"));
    assert!(h.composer.snapshot().await.message.is_empty());
}

#[tokio::test]
async fn group_all_capable_encrypts_silently() {
    let h = harness("enc-group-full");
    encrypted_group(&h).await;
    let alice = ready_alias("okc-alice");
    let bob = ready_alias("okc-bob");
    h.messenger
        .set_members(vec![
            member("alice", Some(&alice), MemberState::Active),
            member("bob", Some(&bob), MemberState::Active),
        ])
        .await;
    h.composer.set_text("all set").await;

    let outcome = h.composer.send().await.expect("send");
    assert!(matches!(outcome, SendOutcome::Sent { .. }));
    let requests = h.provider.requests().await;
    assert_eq!(
        requests[0].recipient_key_ids,
        vec!["okc-self", "okc-alice", "okc-bob"]
    );
}

#[tokio::test]
async fn group_key_broadcast_instead_of_partial() {
    let h = harness("enc-group-bcast");
    encrypted_group(&h).await;
    let alice = ready_alias("okc-alice");
    h.messenger
        .set_members(vec![
            member("alice", Some(&alice), MemberState::Active),
            member("dave", None, MemberState::Active),
        ])
        .await;
    h.composer.set_text("not yet").await;

    let SendOutcome::PartialKeys(prompt) = h.composer.send().await.expect("send") else {
        panic!("expected a partial prompt");
    };
    h.composer
        .request_group_keys(prompt)
        .await
        .expect("broadcast keys");

    let sent = h.messenger.sent().await;
    assert_eq!(sent.len(), 1);
    assert!(matches!(sent[0].payload, ContentPayload::KeyRequest { .. }));
    assert!(h.provider.requests().await.is_empty());
    assert!(h.composer.snapshot().await.message.is_empty());
}

#[tokio::test]
async fn provider_interaction_suspends_and_resumes() {
    let h = harness("enc-interaction");
    let alias = ready_alias("okc-peer");
    encrypted_direct(&h, Some(&alias)).await;
    h.provider
        .script(ProviderReply::InteractionRequired {
            handle: "flow-7".to_string(),
        })
        .await;
    h.composer.set_text("gated message").await;

    let SendOutcome::ProviderInteraction(token) = h.composer.send().await.expect("suspend") else {
        panic!("expected a provider interaction");
    };
    assert_eq!(token.handle, "flow-7");

    let err = h.composer.send().await.expect_err("send while suspended");
    assert!(matches!(err, ComposeError::Busy));
    assert_eq!(h.composer.snapshot().await.message, "gated message");

    let outcome = h.composer.resume_send(token, true).await.expect("resume");
    assert!(matches!(outcome, SendOutcome::Sent { .. }));
    assert_eq!(h.provider.requests().await.len(), 2);
    assert!(h.messenger.sent().await[0]
        .text
        .starts_with("-----BEGIN PGP MESSAGE-----"));
    assert!(h.composer.snapshot().await.message.is_empty());
}

#[tokio::test]
async fn provider_interaction_denied_is_terminal() {
    let h = harness("enc-denied");
    let alias = ready_alias("okc-peer");
    encrypted_direct(&h, Some(&alias)).await;
    h.provider
        .script(ProviderReply::InteractionRequired {
            handle: "flow-8".to_string(),
        })
        .await;
    h.composer.set_text("gated message").await;

    let SendOutcome::ProviderInteraction(token) = h.composer.send().await.expect("suspend") else {
        panic!("expected a provider interaction");
    };
    let err = h
        .composer
        .resume_send(token, false)
        .await
        .expect_err("denied");
    assert!(matches!(err, ComposeError::NotAllowed));

    let state = h.composer.snapshot().await;
    assert!(!state.in_progress);
    assert_eq!(state.message, "gated message");

    let outcome = h.composer.send().await.expect("retry");
    assert!(matches!(outcome, SendOutcome::Sent { .. }));
}

#[tokio::test]
async fn refused_interaction_cannot_be_replayed() {
    let h = harness("enc-replay");
    let alias = ready_alias("okc-peer");
    encrypted_direct(&h, Some(&alias)).await;
    h.provider
        .script(ProviderReply::InteractionRequired {
            handle: "flow-9".to_string(),
        })
        .await;
    h.composer.set_text("gated message").await;

    let SendOutcome::ProviderInteraction(token) = h.composer.send().await.expect("suspend") else {
        panic!("expected a provider interaction");
    };
    let err = h
        .composer
        .resume_send(token.clone(), false)
        .await
        .expect_err("denied");
    assert!(matches!(err, ComposeError::NotAllowed));

    let err = h.composer.resume_send(token, true).await.expect_err("replay");
    assert!(matches!(err, ComposeError::NotAllowed));
    assert!(h.messenger.sent().await.is_empty());
    assert_eq!(h.composer.snapshot().await.message, "gated message");
}

#[tokio::test]
async fn resume_demands_the_outstanding_token() {
    let h = harness("enc-token-check");
    let alias = ready_alias("okc-peer");
    encrypted_direct(&h, Some(&alias)).await;
    h.provider
        .script(ProviderReply::InteractionRequired {
            handle: "flow-10".to_string(),
        })
        .await;
    h.composer.set_text("gated message").await;

    let SendOutcome::ProviderInteraction(token) = h.composer.send().await.expect("suspend") else {
        panic!("expected a provider interaction");
    };
    let stray = InteractionToken {
        handle: "flow-99".to_string(),
    };
    let err = h
        .composer
        .resume_send(stray, true)
        .await
        .expect_err("unknown token");
    assert!(matches!(err, ComposeError::NotAllowed));
    assert!(h.messenger.sent().await.is_empty());
    assert!(h.composer.snapshot().await.in_progress);

    let outcome = h.composer.resume_send(token, true).await.expect("resume");
    assert!(matches!(outcome, SendOutcome::Sent { .. }));
    assert!(h.composer.snapshot().await.message.is_empty());
}

#[tokio::test]
async fn provider_failure_preserves_draft() {
    let h = harness("enc-failure");
    let alias = ready_alias("okc-peer");
    encrypted_direct(&h, Some(&alias)).await;
    h.provider
        .script(ProviderReply::Failure {
            message: "wrong passphrase".to_string(),
        })
        .await;
    h.composer.set_text("precious words").await;

    let err = h.composer.send().await.expect_err("provider failed");
    assert!(matches!(err, ComposeError::Provider(_)));

    let state = h.composer.snapshot().await;
    assert_eq!(state.message, "precious words");
    assert!(!state.in_progress);
    assert!(h.messenger.sent().await.is_empty());
}

#[tokio::test]
async fn import_pending_keys_round_trip() {
    let h = harness("enc-import");
    encrypted_group(&h).await;
    let alice = ContactBioInfo {
        public_key: "PK-A".to_string(),
        ..Default::default()
    }
    .to_alias();
    let bob = ready_alias("okc-bob");
    let dave = ContactBioInfo {
        public_key: "PK-D".to_string(),
        ..Default::default()
    }
    .to_alias();
    h.messenger
        .set_members(vec![
            member("alice", Some(&alice), MemberState::Active),
            member("bob", Some(&bob), MemberState::Active),
            member("carol", None, MemberState::Active),
            member("dave", Some(&dave), MemberState::Left),
        ])
        .await;

    let imported = h.composer.import_pending_keys().await.expect("import");
    assert_eq!(imported, 1);

    let batches = h.provider.imports().await;
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 1);
    assert_eq!(batches[0][0].contact_id, "alice");
    assert_eq!(batches[0][0].public_key, "PK-A");

    let updated = h
        .messenger
        .alias_of(&ContactId::new("alice"))
        .await
        .expect("alias rewritten");
    let bio = ContactBioInfo::from_alias(Some(&updated));
    assert_eq!(bio.keychain_id, "okc-alice");
    assert_eq!(bio.public_key, "PK-A");
    assert!(h.messenger.alias_of(&ContactId::new("bob")).await.is_none());
}

#[tokio::test]
async fn import_with_nothing_pending_skips_provider() {
    let h = harness("enc-import-none");
    let alias = ready_alias("okc-peer");
    encrypted_direct(&h, Some(&alias)).await;

    let imported = h.composer.import_pending_keys().await.expect("import");
    assert_eq!(imported, 0);
    assert!(h.provider.imports().await.is_empty());
}

#[tokio::test]
async fn decrypt_round_trips_through_provider() {
    let h = harness("enc-decrypt");
    let armored = String::from_utf8(MockProvider::armor(b"hidden text")).expect("armor is utf8");
    h.provider
        .script(ProviderReply::Success {
            output: b"hidden text".to_vec(),
        })
        .await;

    let outcome = h.composer.decrypt_text(&armored).await.expect("decrypt");
    let DecryptOutcome::Plaintext(text) = outcome else {
        panic!("expected plaintext");
    };
    assert_eq!(text, "hidden text");

    let requests = h.provider.requests().await;
    assert_eq!(requests[0].action, ProviderAction::Decrypt);
    assert!(requests[0].recipient_key_ids.is_empty());
}
