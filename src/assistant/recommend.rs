//! Pulling recommended titles out of an assistant reply.

const OPEN: char = '【';
const CLOSE: char = '】';

/// Every non-empty `【title】` in `reply`, in order of appearance.
///
/// ```
/// use music_recognizer::assistant::extract_titles;
///
/// let titles = extract_titles("Try 【So What】 or 【 Blue in Green 】.");
/// assert_eq!(titles, vec!["So What", "Blue in Green"]);
/// ```
pub fn extract_titles(reply: &str) -> Vec<String> {
    let mut titles = Vec::new();
    let mut rest = reply;

    while let Some(start) = rest.find(OPEN) {
        let after = &rest[start + OPEN.len_utf8()..];
        let Some(end) = after.find(CLOSE) else {
            break;
        };
        let title = after[..end].trim();
        if !title.is_empty() {
            titles.push(title.to_string());
        }
        rest = &after[end + CLOSE.len_utf8()..];
    }
    titles
}
