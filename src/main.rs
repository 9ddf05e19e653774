//! Command-line entry point.
//!
//! ```text
//! music-recognizer [recognize]    listen once and print what is playing
//! music-recognizer ask <text>     ask the music assistant
//! ```
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create the [`tokio`] runtime (multi-thread, 2 workers).
//! 4. Run the selected mode.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use music_recognizer::{
    assistant::{ApiChatBackend, MusicAssistant},
    audio::CpalDevice,
    config::AppConfig,
    library::Library,
    matcher::HttpMatcher,
    recognition::{RecognitionCoordinator, RecognitionOutcome, RecognitionSettings},
};

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

async fn recognize(config: AppConfig) -> Result<()> {
    let device = Arc::new(CpalDevice::new(config.audio.device.clone()));
    let matcher = Arc::new(HttpMatcher::from_config(&config.matcher));
    let settings = RecognitionSettings::from_config(&config);

    let (coordinator, mut outcomes) = RecognitionCoordinator::new(device, matcher, settings);

    println!(
        "Listening for up to {:.0}s...",
        settings.capture.max_duration.as_secs_f32()
    );
    coordinator.begin_recognition();

    let event = tokio::select! {
        event = outcomes.recv() => event,
        _ = tokio::signal::ctrl_c() => {
            coordinator.cancel_recognition();
            outcomes.recv().await
        }
    };
    let Some(event) = event else {
        bail!("recognition ended without an outcome");
    };

    match &event.outcome {
        RecognitionOutcome::Matched(best) => {
            println!(
                "{} - {}  ({:.0}%)",
                best.artist(),
                best.title(),
                best.confidence() * 100.0
            );
            println!("  play: {}", best.playable());
        }
        RecognitionOutcome::Ambiguous(candidates) => {
            println!("Several songs match:");
            for (i, c) in candidates.iter().enumerate() {
                println!(
                    "  {}. {} - {}  ({:.0}%)",
                    i + 1,
                    c.artist(),
                    c.title(),
                    c.confidence() * 100.0
                );
            }
        }
        other => {
            let hint = match other.error_kind() {
                Some(kind) if kind.suggests_retry() => " (try again)",
                _ => "",
            };
            println!("{other}{hint}");
        }
    }
    Ok(())
}

async fn ask(config: AppConfig, question: String) -> Result<()> {
    let library = Library::scan(&config.library.music_dir).with_context(|| {
        format!(
            "failed to scan music library at {}",
            config.library.music_dir.display()
        )
    })?;
    let backend = Arc::new(ApiChatBackend::from_config(&config.assistant));
    let mut assistant = MusicAssistant::new(backend, library, &config.assistant);

    let reply = assistant.chat(&question).await?;
    println!("{}", reply.text);

    for track in &reply.recommendations {
        println!("  ♪ {}  ({})", track.name, track.path.display());
    }
    for title in &reply.unresolved {
        println!("  ✗ {title} (not in library)");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("music-recognizer starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    // 4. Mode
    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        None | Some("recognize") => rt.block_on(recognize(config)),
        Some("ask") => {
            let question = args.collect::<Vec<_>>().join(" ");
            if question.trim().is_empty() {
                bail!("usage: music-recognizer ask <question>");
            }
            rt.block_on(ask(config, question))
        }
        Some(other) => bail!("unknown command {other:?}; expected `recognize` or `ask <question>`"),
    }
}
