use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::warn;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::interval;
use uuid::Uuid;

use crate::error::ComposeError;
use crate::event::{ComposeEvent, EventBus};
use crate::state::{ComposePreview, ComposeStore};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordingState {
    NotStarted,
    Started {
        path: PathBuf,
        progress_ms: u64,
    },
    Finished {
        path: PathBuf,
        duration_ms: u64,
        waveform: Vec<u8>,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct CaptureProgress {
    pub elapsed_ms: u64,
    pub finished: bool,
}

#[derive(Debug, Clone)]
pub struct CaptureResult {
    pub duration_ms: u64,
    pub waveform: Vec<u8>,
}

#[async_trait]
pub trait CaptureDevice: Send + Sync {
    async fn begin(&self, path: &Path, max_duration_ms: u64) -> Result<(), ComposeError>;
    async fn poll(&self) -> Result<CaptureProgress, ComposeError>;
    async fn finish(&self) -> Result<CaptureResult, ComposeError>;
    async fn abort(&self);
}

pub struct VoiceRecorder {
    capture: Arc<dyn CaptureDevice>,
    store: ComposeStore,
    events: EventBus,
    state: Arc<Mutex<RecordingState>>,
    session: Arc<AtomicU64>,
    poll_ms: u64,
    max_duration_ms: u64,
    temp_dir: PathBuf,
}

impl VoiceRecorder {
    pub fn new(
        capture: Arc<dyn CaptureDevice>,
        store: ComposeStore,
        events: EventBus,
        poll_ms: u64,
        max_duration_ms: u64,
        temp_dir: PathBuf,
    ) -> Self {
        Self {
            capture,
            store,
            events,
            state: Arc::new(Mutex::new(RecordingState::NotStarted)),
            session: Arc::new(AtomicU64::new(0)),
            poll_ms,
            max_duration_ms,
            temp_dir,
        }
    }

    pub async fn state(&self) -> RecordingState {
        self.state.lock().await.clone()
    }

    pub async fn is_started(&self) -> bool {
        matches!(*self.state.lock().await, RecordingState::Started { .. })
    }

    pub async fn start(&self) -> Result<PathBuf, ComposeError> {
        let path = self
            .temp_dir
            .join(format!("voice-{}.opus", Uuid::new_v4()));
        {
            let mut guard = self.state.lock().await;
            if !matches!(*guard, RecordingState::NotStarted) {
                return Err(ComposeError::AlreadyRecording);
            }
            self.capture.begin(&path, self.max_duration_ms).await?;
            *guard = RecordingState::Started {
                path: path.clone(),
                progress_ms: 0,
            };
        }
        let preview = ComposePreview::Voice {
            path: path.clone(),
            duration_ms: 0,
            waveform: Vec::new(),
            finished: false,
        };
        let for_state = preview.clone();
        self.store.update(move |state| state.preview = for_state).await;
        self.events.publish(ComposeEvent::PreviewChanged(preview));

        let session = self.session.fetch_add(1, Ordering::SeqCst) + 1;
        self.spawn_progress_loop(session);
        Ok(path)
    }

    pub async fn stop(&self) -> Result<(PathBuf, u64, Vec<u8>), ComposeError> {
        let mut guard = self.state.lock().await;
        let path = match &*guard {
            RecordingState::Started { path, .. } => path.clone(),
            _ => return Err(ComposeError::Validation("not_recording".to_string())),
        };
        self.session.fetch_add(1, Ordering::SeqCst);
        let done = self.capture.finish().await?;
        *guard = RecordingState::Finished {
            path: path.clone(),
            duration_ms: done.duration_ms,
            waveform: done.waveform.clone(),
        };
        drop(guard);

        let preview = ComposePreview::Voice {
            path: path.clone(),
            duration_ms: done.duration_ms,
            waveform: done.waveform.clone(),
            finished: true,
        };
        let for_state = preview.clone();
        self.store.update(move |state| state.preview = for_state).await;
        self.events.publish(ComposeEvent::RecordingProgress {
            elapsed_ms: done.duration_ms,
            finished: true,
        });
        self.events.publish(ComposeEvent::PreviewChanged(preview));
        Ok((path, done.duration_ms, done.waveform))
    }

    pub async fn cancel(&self) {
        self.session.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.state.lock().await;
        let path = match &*guard {
            RecordingState::Started { path, .. } => {
                self.capture.abort().await;
                Some(path.clone())
            }
            RecordingState::Finished { path, .. } => Some(path.clone()),
            RecordingState::NotStarted => None,
        };
        *guard = RecordingState::NotStarted;
        drop(guard);
        if let Some(path) = path {
            let _ = tokio::fs::remove_file(&path).await;
        }
    }

    pub async fn release(&self) {
        self.session.fetch_add(1, Ordering::SeqCst);
        *self.state.lock().await = RecordingState::NotStarted;
    }

    fn spawn_progress_loop(&self, session: u64) {
        let capture = self.capture.clone();
        let state = self.state.clone();
        let store = self.store.clone();
        let events = self.events.clone();
        let token = self.session.clone();
        let poll_ms = self.poll_ms;
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(poll_ms));
            loop {
                ticker.tick().await;
                if token.load(Ordering::SeqCst) != session {
                    break;
                }
                let progress = match capture.poll().await {
                    Ok(progress) => progress,
                    Err(err) => {
                        warn!("capture poll failed: {err}");
                        break;
                    }
                };
                {
                    let mut guard = state.lock().await;
                    if token.load(Ordering::SeqCst) != session {
                        break;
                    }
                    match &mut *guard {
                        RecordingState::Started { progress_ms, .. } => {
                            *progress_ms = progress.elapsed_ms
                        }
                        _ => break,
                    }
                }
                events.publish(ComposeEvent::RecordingProgress {
                    elapsed_ms: progress.elapsed_ms,
                    finished: progress.finished,
                });
                if progress.finished {
                    let claimed = token
                        .compare_exchange(session, session + 1, Ordering::SeqCst, Ordering::SeqCst)
                        .is_ok();
                    if claimed {
                        let mut guard = state.lock().await;
                        let path = match &*guard {
                            RecordingState::Started { path, .. } => path.clone(),
                            _ => break,
                        };
                        match capture.finish().await {
                            Ok(done) => {
                                *guard = RecordingState::Finished {
                                    path: path.clone(),
                                    duration_ms: done.duration_ms,
                                    waveform: done.waveform.clone(),
                                };
                                drop(guard);
                                let preview = ComposePreview::Voice {
                                    path,
                                    duration_ms: done.duration_ms,
                                    waveform: done.waveform,
                                    finished: true,
                                };
                                let for_event = preview.clone();
                                store.update(move |state| state.preview = preview).await;
                                events.publish(ComposeEvent::PreviewChanged(for_event));
                            }
                            Err(err) => {
                                drop(guard);
                                warn!("capture finish failed: {err}");
                            }
                        }
                    }
                    break;
                }
            }
        });
    }
}

struct MockCaptureInner {
    elapsed_ms: u64,
    max_ms: u64,
    active: bool,
}

pub struct MockCapture {
    step_ms: u64,
    fail_begin: bool,
    inner: Mutex<MockCaptureInner>,
}

impl MockCapture {
    pub fn new(step_ms: u64) -> Self {
        Self {
            step_ms,
            fail_begin: false,
            inner: Mutex::new(MockCaptureInner {
                elapsed_ms: 0,
                max_ms: u64::MAX,
                active: false,
            }),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_begin: true,
            ..Self::new(250)
        }
    }
}

#[async_trait]
impl CaptureDevice for MockCapture {
    async fn begin(&self, path: &Path, max_duration_ms: u64) -> Result<(), ComposeError> {
        if self.fail_begin {
            return Err(ComposeError::Capture("device unavailable".to_string()));
        }
        tokio::fs::write(path, b"OggS")
            .await
            .map_err(|_| ComposeError::Storage)?;
        let mut inner = self.inner.lock().await;
        inner.elapsed_ms = 0;
        inner.max_ms = max_duration_ms;
        inner.active = true;
        Ok(())
    }

    async fn poll(&self) -> Result<CaptureProgress, ComposeError> {
        let mut inner = self.inner.lock().await;
        if inner.active {
            inner.elapsed_ms = (inner.elapsed_ms + self.step_ms).min(inner.max_ms);
        }
        Ok(CaptureProgress {
            elapsed_ms: inner.elapsed_ms,
            finished: inner.elapsed_ms >= inner.max_ms,
        })
    }

    async fn finish(&self) -> Result<CaptureResult, ComposeError> {
        let mut inner = self.inner.lock().await;
        inner.active = false;
        Ok(CaptureResult {
            duration_ms: inner.elapsed_ms,
            waveform: vec![12, 64, 128, 192, 255, 180, 96, 40],
        })
    }

    async fn abort(&self) {
        self.inner.lock().await.active = false;
    }
}
