use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use super::{harness, png_bytes, test_config};
use crate::state::ComposePreview;
use crate::{
    ComposeError, ComposeEvent, Composer, ComposerConfig, MockCapture, MockMessenger, MockProbe,
    MockProvider, RecordingState,
};
use quill_api::ChatId;

#[tokio::test(start_paused = true)]
async fn recording_lifecycle_start_stop() {
    let h = harness("record-lifecycle");
    h.composer.start_recording().await.expect("start recording");
    assert!(matches!(
        h.composer.recording_state().await,
        RecordingState::Started { .. }
    ));
    let ComposePreview::Voice {
        finished: false, ..
    } = h.composer.snapshot().await.preview
    else {
        panic!("expected an unfinished voice preview");
    };

    let err = h
        .composer
        .start_recording()
        .await
        .expect_err("second start while recording");
    assert!(matches!(err, ComposeError::AlreadyRecording));

    sleep(Duration::from_millis(600)).await;
    h.composer.stop_recording().await.expect("stop recording");

    let RecordingState::Finished {
        duration_ms,
        waveform,
        ..
    } = h.composer.recording_state().await
    else {
        panic!("expected a finished recording");
    };
    assert!(duration_ms > 0);
    assert!(!waveform.is_empty());
    let ComposePreview::Voice { finished: true, .. } = h.composer.snapshot().await.preview else {
        panic!("expected a finished voice preview");
    };
}

#[tokio::test(start_paused = true)]
async fn cancel_deletes_temp_file() {
    let h = harness("record-cancel");
    h.composer.start_recording().await.expect("start recording");
    let RecordingState::Started { path, .. } = h.composer.recording_state().await else {
        panic!("expected recording to be running");
    };
    assert!(path.exists());

    h.composer.cancel_recording().await;
    assert!(matches!(
        h.composer.recording_state().await,
        RecordingState::NotStarted
    ));
    assert!(h.composer.snapshot().await.preview.is_none());
    assert!(!path.exists(), "cancel must delete the capture file");
}

#[tokio::test(start_paused = true)]
async fn recording_finishes_at_duration_cap() {
    let config = ComposerConfig {
        voice_max_duration_ms: 1_000,
        ..test_config("record-cap")
    };
    let composer = Composer::open(
        ChatId::new("chat-1"),
        config,
        Arc::new(MockMessenger::new()),
        Arc::new(MockProvider::new()),
        Arc::new(MockProbe::new(png_bytes(64, 64), 4_200)),
        Arc::new(MockCapture::new(250)),
    );
    let mut events = composer.subscribe();
    composer.start_recording().await.expect("start recording");

    sleep(Duration::from_millis(2_000)).await;

    let RecordingState::Finished { duration_ms, .. } = composer.recording_state().await else {
        panic!("expected the recorder to stop at the cap");
    };
    assert_eq!(duration_ms, 1_000);
    let ComposePreview::Voice {
        finished: true,
        duration_ms,
        ..
    } = composer.snapshot().await.preview
    else {
        panic!("expected a finished voice preview");
    };
    assert_eq!(duration_ms, 1_000);

    let mut saw_finish = false;
    while let Ok(event) = events.try_recv() {
        if let ComposeEvent::RecordingProgress { finished: true, .. } = event {
            saw_finish = true;
        }
    }
    assert!(saw_finish, "expected a finished progress event");
}

#[tokio::test]
async fn capture_begin_failure_surfaces() {
    let composer = Composer::open(
        ChatId::new("chat-1"),
        test_config("record-fail"),
        Arc::new(MockMessenger::new()),
        Arc::new(MockProvider::new()),
        Arc::new(MockProbe::new(png_bytes(64, 64), 4_200)),
        Arc::new(MockCapture::failing()),
    );
    let err = composer
        .start_recording()
        .await
        .expect_err("device is unavailable");
    assert!(matches!(err, ComposeError::Capture(_)));
    assert!(matches!(
        composer.recording_state().await,
        RecordingState::NotStarted
    ));
    assert!(composer.snapshot().await.preview.is_none());
}

#[tokio::test]
async fn stop_without_recording_is_rejected() {
    let h = harness("record-stop-idle");
    let err = h
        .composer
        .stop_recording()
        .await
        .expect_err("nothing to stop");
    assert!(matches!(err, ComposeError::Validation(_)));
}
