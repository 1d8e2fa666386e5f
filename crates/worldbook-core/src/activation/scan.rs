//! Scan buffer assembly.
//!
//! The buffer is the text window keyword matching runs against: the most
//! recent conversational messages, preceded by the optional topic and
//! enhanced prompts in brackets.

use crate::types::Message;

/// Build the scan buffer for an effective scan depth.
///
/// Takes the last `max(1, scan_depth * 2)` user/assistant/tool messages (two
/// messages per exchange), drops blank lines and trims the rest.
pub fn build_scan_buffer(
    messages: &[Message],
    scan_depth: usize,
    topic_prompt: Option<&str>,
    enhanced_prompt: Option<&str>,
) -> String {
    let window = scan_depth.saturating_mul(2).max(1);

    let scannable: Vec<&Message> = messages
        .iter()
        .filter(|m| m.role.is_scannable())
        .collect();
    let recent = &scannable[scannable.len().saturating_sub(window)..];

    let mut segments: Vec<String> = Vec::new();
    for prompt in [topic_prompt, enhanced_prompt].into_iter().flatten() {
        let prompt = prompt.trim();
        if !prompt.is_empty() {
            segments.push(format!("[{}]", prompt));
        }
    }
    segments.extend(recent.iter().map(|m| m.content.clone()));

    segments
        .iter()
        .flat_map(|s| s.lines())
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation() -> Vec<Message> {
        vec![
            Message::user("one"),
            Message::assistant("two"),
            Message::system("hidden system text"),
            Message::user("three"),
            Message::assistant("four"),
            Message::tool("five"),
        ]
    }

    #[test]
    fn test_window_is_two_messages_per_exchange() {
        let buffer = build_scan_buffer(&conversation(), 1, None, None);
        assert_eq!(buffer, "four\nfive");

        let buffer = build_scan_buffer(&conversation(), 2, None, None);
        assert_eq!(buffer, "two\nthree\nfour\nfive");
    }

    #[test]
    fn test_system_messages_are_not_scanned() {
        let buffer = build_scan_buffer(&conversation(), 10, None, None);
        assert!(!buffer.contains("hidden"));
        assert_eq!(buffer.lines().count(), 5);
    }

    #[test]
    fn test_zero_depth_still_scans_last_message() {
        let buffer = build_scan_buffer(&conversation(), 0, None, None);
        assert_eq!(buffer, "five");
    }

    #[test]
    fn test_prompts_prepended_in_brackets() {
        let buffer = build_scan_buffer(
            &[Message::user("hello")],
            1,
            Some("castle siege"),
            Some("  "),
        );
        assert_eq!(buffer, "[castle siege]\nhello");
    }

    #[test]
    fn test_blank_lines_dropped_and_trimmed() {
        let messages = vec![Message::user("  first line  \n\n   \nsecond line")];
        let buffer = build_scan_buffer(&messages, 1, None, None);
        assert_eq!(buffer, "first line\nsecond line");
    }

    #[test]
    fn test_empty_conversation() {
        assert_eq!(build_scan_buffer(&[], 3, None, None), "");
    }
}
