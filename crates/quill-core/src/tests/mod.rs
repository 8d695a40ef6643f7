mod encrypt_tests;
mod record_tests;
mod state_tests;

use std::path::PathBuf;
use std::sync::Arc;

use crate::attach::{MediaPick, PickKind};
use crate::state::MediaSource;
use crate::{Composer, ComposerConfig, MockCapture, MockMessenger, MockProbe, MockProvider};
use quill_api::{ChatId, ContactBioInfo, ContactId, ContactRecord, MemberRecord, MemberState};

pub fn temp_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("quill-{label}-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

pub fn test_config(label: &str) -> ComposerConfig {
    ComposerConfig {
        temp_dir: temp_dir(label),
        self_key_id: "okc-self".to_string(),
        self_public_key: "SELF-PUBLIC-KEY".to_string(),
        ..ComposerConfig::default()
    }
}

pub struct Harness {
    pub composer: Composer,
    pub messenger: Arc<MockMessenger>,
    pub provider: Arc<MockProvider>,
}

pub fn harness(label: &str) -> Harness {
    harness_with(label, Arc::new(MockMessenger::new()))
}

pub fn harness_with(label: &str, messenger: Arc<MockMessenger>) -> Harness {
    let provider = Arc::new(MockProvider::new());
    let composer = Composer::open(
        ChatId::new("chat-1"),
        test_config(label),
        messenger.clone(),
        provider.clone(),
        Arc::new(MockProbe::new(png_bytes(64, 64), 4_200)),
        Arc::new(MockCapture::new(250)),
    );
    Harness {
        composer,
        messenger,
        provider,
    }
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([120, 40, 200, 255]));
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

pub fn gif_bytes() -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut encoder = image::codecs::gif::GifEncoder::new(&mut out);
        encoder
            .encode(&[255, 0, 0, 255], 1, 1, image::ExtendedColorType::Rgba8)
            .expect("encode gif");
    }
    out
}

pub fn pick_image(name: &str) -> MediaPick {
    MediaPick {
        name: name.to_string(),
        kind: PickKind::Image,
        source: MediaSource::Bytes {
            name: name.to_string(),
            bytes: png_bytes(64, 64),
        },
    }
}

pub fn pick_video(name: &str, bytes: Vec<u8>) -> MediaPick {
    MediaPick {
        name: name.to_string(),
        kind: PickKind::Video,
        source: MediaSource::Bytes {
            name: name.to_string(),
            bytes,
        },
    }
}

pub fn direct_contact(alias: Option<&str>) -> ContactRecord {
    ContactRecord {
        id: ContactId::new("peer-1"),
        name: "Jo".to_string(),
        alias: alias.map(str::to_string),
    }
}

pub fn member(id: &str, alias: Option<&str>, state: MemberState) -> MemberRecord {
    MemberRecord {
        contact: ContactId::new(id),
        name: id.to_string(),
        alias: alias.map(str::to_string),
        state,
    }
}

pub fn ready_alias(keychain_id: &str) -> String {
    ContactBioInfo {
        tag: String::new(),
        notes: String::new(),
        public_key: "PK".to_string(),
        keychain_id: keychain_id.to_string(),
    }
    .to_alias()
}
