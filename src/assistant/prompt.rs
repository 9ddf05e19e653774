//! System prompt for the music assistant.

const SYSTEM_PROMPT: &str = "You are a knowledgeable music assistant. Help the user \
learn about music, recommend songs and explain their background. When you recommend \
a song, write its title inside 【】 brackets, for example 【So What】, so the player \
can find and play it. Prefer songs from the available list when they fit.";

/// System prompt listing the titles the player can actually play.
///
/// ```
/// use music_recognizer::assistant::system_prompt;
///
/// let prompt = system_prompt(&["So What", "Blue in Green"]);
/// assert!(prompt.ends_with("Available songs: So What, Blue in Green"));
/// ```
pub fn system_prompt(titles: &[&str]) -> String {
    let available = if titles.is_empty() {
        "(none)".to_string()
    } else {
        titles.join(", ")
    };
    format!("{SYSTEM_PROMPT}\nAvailable songs: {available}")
}
