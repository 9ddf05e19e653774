//! Conversational music assistant.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::config::AssistantConfig;
use crate::library::{Library, LibraryTrack};

use super::backend::{AssistantError, ChatBackend, ChatMessage};
use super::prompt::system_prompt;
use super::recommend::extract_titles;

/// One assistant answer.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantReply {
    pub text: String,
    /// Recommended titles found in the library, in the order mentioned.
    pub recommendations: Vec<LibraryTrack>,
    /// Recommended titles the library does not have.
    pub unresolved: Vec<String>,
}

impl AssistantReply {
    /// The first playable recommendation.
    pub fn first_playable(&self) -> Option<&LibraryTrack> {
        self.recommendations.first()
    }
}

/// Chat session with a bounded history.  The library is listed in the system
/// prompt on every turn.
pub struct MusicAssistant {
    backend: Arc<dyn ChatBackend>,
    library: Library,
    history: VecDeque<ChatMessage>,
    history_limit: usize,
    enabled: bool,
}

impl MusicAssistant {
    pub fn new(backend: Arc<dyn ChatBackend>, library: Library, config: &AssistantConfig) -> Self {
        Self {
            backend,
            library,
            history: VecDeque::new(),
            history_limit: config.history_limit.max(2),
            enabled: config.enabled,
        }
    }

    pub fn history(&self) -> impl Iterator<Item = &ChatMessage> {
        self.history.iter()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
        log::debug!("assistant: history cleared");
    }

    /// Send `text` and wait for the reply.
    ///
    /// On failure the user's message is not kept in the history.
    pub async fn chat(&mut self, text: &str) -> Result<AssistantReply, AssistantError> {
        if !self.enabled {
            return Err(AssistantError::Disabled);
        }

        self.history.push_back(ChatMessage::user(text));
        self.trim_history();

        let mut messages = Vec::with_capacity(self.history.len() + 1);
        messages.push(ChatMessage::system(system_prompt(&self.library.titles())));
        messages.extend(self.history.iter().cloned());

        let reply = match self.backend.complete(&messages).await {
            Ok(reply) => reply,
            Err(e) => {
                log::warn!("assistant: chat failed: {e}");
                self.history.pop_back();
                return Err(e);
            }
        };

        self.history.push_back(ChatMessage::assistant(reply.clone()));
        self.trim_history();

        let mut recommendations = Vec::new();
        let mut unresolved = Vec::new();
        for title in extract_titles(&reply) {
            match self.library.find_matching(&title) {
                Some(track) => recommendations.push(track.clone()),
                None => unresolved.push(title),
            }
        }
        log::info!(
            "assistant: reply with {} playable recommendation(s), {} unavailable",
            recommendations.len(),
            unresolved.len()
        );

        Ok(AssistantReply {
            text: reply,
            recommendations,
            unresolved,
        })
    }

    fn trim_history(&mut self) {
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
    }
}
