mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::LevelFilter;
use quill_api::ChatId;
use quill_core::{
    Composer, MediaSource, MockCapture, MockMessenger, MockProbe, MockProvider, SendOutcome,
};

use config::CliConfig;

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = PathBuf::from("quill.toml");
    let mut rest: Vec<String> = Vec::new();
    let mut iter = args.into_iter().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            if let Some(path) = iter.next() {
                config_path = PathBuf::from(path);
            }
        } else {
            rest.push(arg);
        }
    }
    let cfg = match config::load_config(&config_path) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("config error: {err}");
            std::process::exit(2);
        }
    };
    init_logging(&cfg);

    let command = rest.first().map(String::as_str).unwrap_or("info");
    let chat = rest.get(1).cloned().unwrap_or_else(|| "demo".to_string());
    let composer = open_composer(&cfg, ChatId::new(chat));

    match command {
        "info" => {
            let state = composer.snapshot().await;
            println!(
                "chat {} ready, link previews {}",
                composer.chat().value, state.use_link_previews
            );
        }
        "send-text" => {
            if rest.len() < 3 {
                eprintln!("usage: quill-cli send-text <chat_id> <text>");
                return;
            }
            let text = rest[2..].join(" ");
            composer.set_text(&text).await;
            report(composer.send().await);
        }
        "send-file" => {
            if rest.len() < 3 {
                eprintln!("usage: quill-cli send-file <chat_id> <path> [caption]");
                return;
            }
            let path = PathBuf::from(&rest[2]);
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "file".to_string());
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    eprintln!("cannot read {}: {err}", path.display());
                    return;
                }
            };
            if let Err(err) = composer
                .attach_file(
                    &name,
                    MediaSource::Bytes {
                        name: name.clone(),
                        bytes,
                    },
                )
                .await
            {
                eprintln!("error {err}");
                return;
            }
            if rest.len() > 3 {
                composer.set_text(&rest[3..].join(" ")).await;
            }
            report(composer.send().await);
        }
        "live-demo" => {
            if rest.len() < 3 {
                eprintln!("usage: quill-cli live-demo <chat_id> <text>");
                return;
            }
            let text = rest[2..].join(" ");
            if let Err(err) = composer.start_live().await {
                eprintln!("error {err}");
                return;
            }
            let mut typed = String::new();
            for word in text.split_whitespace() {
                typed.push_str(word);
                typed.push(' ');
                composer.set_text(&typed).await;
                println!("typing: {typed}");
                tokio::time::sleep(Duration::from_millis(cfg.composer.live_tick_ms + 100)).await;
            }
            composer.set_text(text.trim_end()).await;
            report(composer.send().await);
        }
        _ => {
            eprintln!("usage: quill-cli [--config <path>] <info|send-text|send-file|live-demo> ...");
        }
    }
}

fn report(result: Result<SendOutcome, quill_core::ComposeError>) {
    match result {
        Ok(SendOutcome::Sent { items }) => {
            for id in items {
                println!("sent {}", id.value);
            }
        }
        Ok(SendOutcome::KeysMissing(prompt)) => {
            println!("no usable key for {}, draft kept", prompt.contact.value);
        }
        Ok(SendOutcome::PartialKeys(prompt)) => {
            println!(
                "{} group members cannot receive ciphertext, draft kept",
                prompt.unencrypted.len()
            );
        }
        Ok(SendOutcome::ProviderInteraction(token)) => {
            println!("provider interaction {} pending", token.handle);
        }
        Err(err) => eprintln!("error {err}"),
    }
}

fn init_logging(cfg: &CliConfig) {
    let level = match cfg.logging.level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Info,
    };
    let _ = env_logger::Builder::from_default_env()
        .filter_level(level)
        .try_init();
}

fn open_composer(cfg: &CliConfig, chat: ChatId) -> Composer {
    Composer::open(
        chat,
        cfg.composer.clone(),
        Arc::new(MockMessenger::new()),
        Arc::new(MockProvider::new()),
        Arc::new(MockProbe::new(Vec::new(), 0)),
        Arc::new(MockCapture::new(cfg.composer.record_poll_ms)),
    )
}
