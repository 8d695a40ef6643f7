use std::path::PathBuf;

use quill_api::ValidationLimits;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ComposerConfig {
    pub link_preview_debounce_ms: u64,
    pub live_tick_ms: u64,
    pub inter_item_delay_ms: u64,
    pub record_poll_ms: u64,
    pub voice_max_duration_ms: u64,
    pub max_thumb_b64_bytes: usize,
    pub deep_link_schemes: Vec<String>,
    pub temp_dir: PathBuf,
    pub use_link_previews: bool,
    pub self_key_id: String,
    pub self_public_key: String,
    pub limits: ValidationLimits,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            link_preview_debounce_ms: 1500,
            live_tick_ms: 3000,
            inter_item_delay_ms: 100,
            record_poll_ms: 250,
            voice_max_duration_ms: 180_000,
            max_thumb_b64_bytes: 14 * 1024,
            deep_link_schemes: vec!["quill".to_string()],
            temp_dir: std::env::temp_dir(),
            use_link_previews: true,
            self_key_id: String::new(),
            self_public_key: String::new(),
            limits: ValidationLimits::default(),
        }
    }
}
