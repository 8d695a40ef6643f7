use super::{harness, temp_dir};
use crate::state::{ComposeContext, ComposePreview, ComposeState, ComposeStore, MediaSource};
use crate::ComposeError;
use quill_api::{ContentItemId, ContentItemRef};

#[tokio::test]
async fn snapshot_roundtrips_through_serde() {
    let mut state = ComposeState::seeded(true);
    state.message = "draft in flight".to_string();
    state.preview = ComposePreview::File {
        name: "notes.pdf".to_string(),
        size: 96,
        source: MediaSource::TempFile {
            name: "notes.pdf".to_string(),
            path: temp_dir("serde").join("notes.pdf"),
        },
    };
    state.context = ComposeContext::Quote(ContentItemRef {
        id: ContentItemId::random(),
        text: "earlier".to_string(),
    });
    state.pending_interaction = Some("flow-1".to_string());
    let json = serde_json::to_string(&state).expect("serialize state");
    let back: ComposeState = serde_json::from_str(&json).expect("parse state");
    assert_eq!(back, state);
}

#[tokio::test]
async fn keep_alive_reset_only_releases_in_progress() {
    let store = ComposeStore::new(ComposeState::seeded(true));
    store
        .update(|state| {
            state.message = "typing".to_string();
            state.in_progress = true;
        })
        .await;
    store.reset(true).await;
    let state = store.snapshot().await;
    assert!(!state.in_progress);
    assert_eq!(state.message, "typing");

    store.update(|state| state.in_progress = true).await;
    store.reset(false).await;
    assert_eq!(store.snapshot().await, ComposeState::seeded(true));
}

#[tokio::test]
async fn store_publishes_snapshots_to_watchers() {
    let store = ComposeStore::new(ComposeState::seeded(true));
    let mut rx = store.subscribe();
    store.update(|state| state.message = "hello".to_string()).await;
    rx.changed().await.expect("watch change");
    assert_eq!(rx.borrow().message, "hello");
}

#[tokio::test]
async fn can_send_requires_content() {
    let mut state = ComposeState::seeded(true);
    assert!(!state.can_send());
    state.message = "   ".to_string();
    assert!(!state.can_send());
    state.message = "hi".to_string();
    assert!(state.can_send());

    state.message.clear();
    state.preview = ComposePreview::Voice {
        path: "/tmp/v.opus".into(),
        duration_ms: 0,
        waveform: Vec::new(),
        finished: false,
    };
    assert!(!state.can_send(), "unfinished recording is not sendable");
    state.preview = ComposePreview::File {
        name: "a.bin".to_string(),
        size: 4,
        source: MediaSource::Bytes {
            name: "a.bin".to_string(),
            bytes: vec![0; 4],
        },
    };
    assert!(state.can_send());
}

#[tokio::test]
async fn editing_seeds_text_and_disables_attachments() {
    let h = harness("edit-guard");
    let target = ContentItemRef {
        id: ContentItemId::random(),
        text: "old words".to_string(),
    };
    h.composer.begin_edit(target).await.expect("begin edit");
    assert_eq!(h.composer.snapshot().await.message, "old words");

    let err = h
        .composer
        .attach_file(
            "doc.txt",
            MediaSource::Bytes {
                name: "doc.txt".to_string(),
                bytes: vec![0; 16],
            },
        )
        .await
        .expect_err("attachments must be off while editing");
    assert!(matches!(err, ComposeError::Validation(_)));
    assert!(matches!(
        h.composer.start_recording().await,
        Err(ComposeError::Validation(_))
    ));

    h.composer.clear_context().await;
    let state = h.composer.snapshot().await;
    assert_eq!(state.context, ComposeContext::None);
    assert_eq!(state.message, "");
}
