use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::ImageFormat;
use log::warn;

use crate::error::ComposeError;
use crate::state::{MediaPreviewItem, MediaPreviewKind, MediaSource};

#[derive(Debug, Clone)]
pub struct MediaPick {
    pub name: String,
    pub kind: PickKind,
    pub source: MediaSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickKind {
    Image,
    Video,
}

#[derive(Debug, Clone)]
pub struct VideoProbe {
    pub still: Vec<u8>,
    pub duration_ms: u64,
}

#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn probe_video(&self, bytes: &[u8]) -> Result<VideoProbe, ComposeError>;
}

pub struct MockProbe {
    still: Vec<u8>,
    duration_ms: u64,
    fail: bool,
}

impl MockProbe {
    pub fn new(still: Vec<u8>, duration_ms: u64) -> Self {
        Self {
            still,
            duration_ms,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            still: Vec::new(),
            duration_ms: 0,
            fail: true,
        }
    }
}

#[async_trait]
impl MediaProbe for MockProbe {
    async fn probe_video(&self, _bytes: &[u8]) -> Result<VideoProbe, ComposeError> {
        if self.fail {
            return Err(ComposeError::Capture("probe failed".to_string()));
        }
        Ok(VideoProbe {
            still: self.still.clone(),
            duration_ms: self.duration_ms,
        })
    }
}

#[derive(Debug, Clone)]
pub struct BatchRejection {
    pub name: String,
    pub reason: RejectReason,
}

#[derive(Debug, Clone, Copy)]
pub enum RejectReason {
    Oversize { limit: u64 },
    Undecodable,
}

pub struct AttachmentPreviewBuilder {
    probe: Arc<dyn MediaProbe>,
    max_file_size: u64,
    thumb_budget: usize,
}

impl AttachmentPreviewBuilder {
    pub fn new(probe: Arc<dyn MediaProbe>, max_file_size: u64, thumb_budget: usize) -> Self {
        Self {
            probe,
            max_file_size,
            thumb_budget,
        }
    }

    pub async fn build(
        &self,
        picks: Vec<MediaPick>,
    ) -> (Vec<MediaPreviewItem>, Vec<BatchRejection>) {
        let mut items = Vec::new();
        let mut rejections = Vec::new();
        for pick in picks {
            match self.build_one(&pick).await {
                Ok(item) => items.push(item),
                Err(reason) => {
                    warn!("attachment {} dropped from batch", pick.name);
                    rejections.push(BatchRejection {
                        name: pick.name,
                        reason,
                    });
                }
            }
        }
        (items, rejections)
    }

    async fn build_one(&self, pick: &MediaPick) -> Result<MediaPreviewItem, RejectReason> {
        let bytes = load_bytes(&pick.source)
            .await
            .map_err(|_| RejectReason::Undecodable)?;
        let (kind, thumb) = match pick.kind {
            PickKind::Image => {
                let animated = is_animated(&bytes);
                if animated && bytes.len() as u64 > self.max_file_size {
                    return Err(RejectReason::Oversize {
                        limit: self.max_file_size,
                    });
                }
                let thumb = thumb_b64(&bytes, self.thumb_budget)
                    .map_err(|_| RejectReason::Undecodable)?;
                (MediaPreviewKind::Image { animated }, thumb)
            }
            PickKind::Video => {
                if bytes.len() as u64 > self.max_file_size {
                    return Err(RejectReason::Oversize {
                        limit: self.max_file_size,
                    });
                }
                let probe = self
                    .probe
                    .probe_video(&bytes)
                    .await
                    .map_err(|_| RejectReason::Undecodable)?;
                let thumb = thumb_b64(&probe.still, self.thumb_budget)
                    .map_err(|_| RejectReason::Undecodable)?;
                (
                    MediaPreviewKind::Video {
                        duration_ms: probe.duration_ms,
                    },
                    thumb,
                )
            }
        };
        Ok(MediaPreviewItem {
            thumb_b64: thumb,
            kind,
            source: pick.source.clone(),
        })
    }
}

pub(crate) async fn load_bytes(source: &MediaSource) -> Result<Vec<u8>, ComposeError> {
    match source {
        MediaSource::Bytes { bytes, .. } => Ok(bytes.clone()),
        MediaSource::TempFile { path, .. } => tokio::fs::read(path)
            .await
            .map_err(|_| ComposeError::Storage),
    }
}

fn is_animated(bytes: &[u8]) -> bool {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Gif) => true,
        Ok(ImageFormat::WebP) => {
            let head = &bytes[..bytes.len().min(256)];
            head.windows(4).any(|window| window == b"ANIM")
        }
        _ => false,
    }
}

fn thumb_b64(bytes: &[u8], budget: usize) -> Result<String, ComposeError> {
    let img = image::load_from_memory(bytes)
        .map_err(|_| ComposeError::Validation("media_decode".to_string()))?;
    let mut edge = 320u32;
    loop {
        let thumb = img.thumbnail(edge, edge).to_rgb8();
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, 70)
            .encode_image(&thumb)
            .map_err(|_| ComposeError::Validation("thumb_encode".to_string()))?;
        let b64 = STANDARD.encode(&jpeg);
        if b64.len() <= budget || edge <= 40 {
            return Ok(b64);
        }
        edge /= 2;
    }
}
