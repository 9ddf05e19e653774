//! Chat-based music assistant.
//!
//! This module provides:
//! * [`ChatBackend`]: async trait for one chat-completion round trip.
//! * [`ApiChatBackend`]: OpenAI-compatible REST backend.
//! * [`MusicAssistant`]: history-keeping conversation that resolves the
//!   titles it recommends against the local [`Library`](crate::library::Library).
//! * [`extract_titles`] / [`system_prompt`]: reply parsing and prompt text.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use music_recognizer::assistant::{ApiChatBackend, MusicAssistant};
//! use music_recognizer::config::AppConfig;
//! use music_recognizer::library::Library;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let library = Library::scan(&config.library.music_dir).unwrap();
//!     let backend = Arc::new(ApiChatBackend::from_config(&config.assistant));
//!     let mut assistant = MusicAssistant::new(backend, library, &config.assistant);
//!
//!     let reply = assistant.chat("Something for a rainy evening?").await.unwrap();
//!     println!("{}", reply.text);
//! }
//! ```

pub mod backend;
pub mod chat;
pub mod prompt;
pub mod recommend;

pub use backend::{ApiChatBackend, AssistantError, ChatBackend, ChatMessage, ChatRole};
pub use chat::{AssistantReply, MusicAssistant};
pub use prompt::system_prompt;
pub use recommend::extract_titles;
