//! Message Formatter: raw message rows → role/content transcript.
//!
//! The transcript opens with a fixed system framing, then one entry per
//! message with usable text. Messages whose content is missing, empty, or
//! not a string are dropped silently; the relative order of the survivors
//! is preserved. Domain markup (photo and contact markers inserted by the
//! chat frontend) is substituted with plain-text placeholders so the model
//! never sees raw markup.

use crate::db::StoredMessage;
use crate::llm::ChatMessage;

/// Fixed framing prepended to every transcript.
pub const SYSTEM_FRAMING: &str =
    "The following is a conversation between a customer (user) and a support assistant (assistant).";

/// Marker the frontend stores in place of an uploaded photo.
const PHOTO_MARKER: &str = "<PHOTO>";
/// Opening of a shared-contact marker; runs until the next `>`.
const CONTACT_MARKER_OPEN: &str = "<CONTACT";

/// Build the transcript for one session.
pub fn format_transcript(messages: &[StoredMessage]) -> Vec<ChatMessage> {
    let mut transcript = vec![ChatMessage::new("system", SYSTEM_FRAMING)];

    for message in messages {
        let Some(text) = message.content.as_str() else {
            continue;
        };
        if text.is_empty() {
            continue;
        }

        let role = if message.remote { "user" } else { "assistant" };
        transcript.push(ChatMessage::new(role, substitute_markers(text)));
    }

    transcript
}

/// Replace photo and contact markers with bracketed placeholders.
///
/// Each marker occurrence is substituted exactly once; characters outside
/// the markers (including stray `>`) are left untouched.
fn substitute_markers(text: &str) -> String {
    let text = text.replace(PHOTO_MARKER, "[Photo]");

    let mut out = String::with_capacity(text.len());
    let mut rest = text.as_str();
    while let Some(start) = rest.find(CONTACT_MARKER_OPEN) {
        out.push_str(&rest[..start]);
        out.push_str("[Contact:");
        rest = &rest[start + CONTACT_MARKER_OPEN.len()..];
        match rest.find('>') {
            Some(close) => {
                out.push_str(&rest[..close]);
                out.push(']');
                rest = &rest[close + 1..];
            }
            None => {
                // Unterminated marker: keep the remainder as-is.
                out.push_str(rest);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg(content: serde_json::Value, remote: bool) -> StoredMessage {
        StoredMessage { content, remote, created_at: String::new() }
    }

    #[test]
    fn transcript_starts_with_system_framing() {
        let transcript = format_transcript(&[]);
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].role, "system");
        assert_eq!(transcript[0].content, SYSTEM_FRAMING);
    }

    #[test]
    fn remote_flag_maps_to_role() {
        let transcript = format_transcript(&[
            msg(json!("hi, my booking is wrong"), true),
            msg(json!("let me check that for you"), false),
        ]);
        assert_eq!(transcript[1].role, "user");
        assert_eq!(transcript[2].role, "assistant");
    }

    #[test]
    fn empty_and_non_string_content_is_dropped_order_preserved() {
        let transcript = format_transcript(&[
            msg(json!("first"), true),
            msg(json!(""), false),
            msg(json!(null), true),
            msg(json!(42), false),
            msg(json!("second"), false),
        ]);
        let contents: Vec<&str> = transcript[1..].iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
    }

    #[test]
    fn photo_marker_is_substituted_each_occurrence() {
        assert_eq!(
            substitute_markers("see <PHOTO> and <PHOTO>"),
            "see [Photo] and [Photo]"
        );
    }

    #[test]
    fn contact_marker_is_bracketed() {
        assert_eq!(
            substitute_markers("call <CONTACT John +1 555 0100>"),
            "call [Contact: John +1 555 0100]"
        );
    }

    #[test]
    fn stray_angle_brackets_survive() {
        assert_eq!(substitute_markers("a > b and 1 < 2"), "a > b and 1 < 2");
    }

    #[test]
    fn unterminated_contact_marker_keeps_remainder() {
        assert_eq!(substitute_markers("see <CONTACT John"), "see [Contact: John");
    }

    #[test]
    fn mixed_markers_in_one_message() {
        assert_eq!(
            substitute_markers("<PHOTO> then <CONTACT Ana>"),
            "[Photo] then [Contact: Ana]"
        );
    }
}
