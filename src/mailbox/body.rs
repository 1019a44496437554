//! Body extraction from the nested MIME-like payload structure.
//!
//! The plain-text branch is preferred; when a message only carries HTML the
//! markup is stripped down to its text. Bodies shorter than
//! [`MIN_BODY_CHARS`] are useless to the extractor and are discarded.

use crate::mailbox::types::{Message, MessagePart};
use base64::Engine;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;

/// Bodies below this length carry no billing information worth extracting.
pub const MIN_BODY_CHARS: usize = 40;

static SCRIPT_STYLE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)>").expect("script/style regex")
});

/// Decode a message body, preferring text/plain over stripped HTML.
/// Returns `None` for empty or below-threshold bodies.
pub fn extract_text(message: &Message) -> Option<String> {
    let payload = message.payload.as_ref()?;

    let text = find_part_data(payload, "text/plain")
        .map(|raw| normalize_whitespace(&raw))
        .or_else(|| find_part_data(payload, "text/html").map(|html| html_to_text(&html)))?;

    if text.chars().count() < MIN_BODY_CHARS {
        return None;
    }
    Some(text)
}

/// Depth-first walk of the part tree for the first decodable body of the
/// given MIME type.
fn find_part_data(part: &MessagePart, mime_type: &str) -> Option<String> {
    let matches_type = part
        .mime_type
        .as_deref()
        .is_some_and(|m| m.eq_ignore_ascii_case(mime_type));

    if matches_type
        && let Some(data) = part.body.as_ref().and_then(|b| b.data.as_deref())
        && let Some(decoded) = decode_base64url(data)
    {
        return Some(decoded);
    }

    part.parts
        .iter()
        .find_map(|child| find_part_data(child, mime_type))
}

/// The upstream API base64url-encodes part bodies, usually without padding.
fn decode_base64url(data: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(data.as_bytes())
        .or_else(|_| URL_SAFE.decode(data.as_bytes()))
        .ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Strip markup down to readable text. Script and style blocks go first so
/// their contents never leak into the result.
pub fn html_to_text(html: &str) -> String {
    let without_scripts = SCRIPT_STYLE_REGEX.replace_all(html, " ");
    let fragment = Html::parse_document(&without_scripts);
    let text = fragment
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ");
    normalize_whitespace(&text)
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::types::{MessageHeader, PartBody};
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    fn encode(text: &str) -> String {
        URL_SAFE_NO_PAD.encode(text.as_bytes())
    }

    fn leaf(mime: &str, content: &str) -> MessagePart {
        MessagePart {
            mime_type: Some(mime.to_string()),
            headers: Vec::new(),
            body: Some(PartBody {
                size: Some(content.len() as i64),
                data: Some(encode(content)),
            }),
            parts: Vec::new(),
        }
    }

    fn message_with_payload(payload: MessagePart) -> Message {
        Message {
            id: "m1".to_string(),
            thread_id: None,
            snippet: None,
            internal_date: None,
            payload: Some(payload),
        }
    }

    const PLAIN: &str = "Your Netflix payment of $15.49 was processed for your monthly plan.";
    const HTML: &str = "<html><body><p>Your <b>Netflix</b> payment of $15.49 was processed for your monthly plan.</p></body></html>";

    #[test]
    fn prefers_plain_text_over_html() {
        let payload = MessagePart {
            mime_type: Some("multipart/alternative".to_string()),
            headers: vec![MessageHeader {
                name: "Subject".to_string(),
                value: "receipt".to_string(),
            }],
            body: None,
            parts: vec![leaf("text/html", HTML), leaf("text/plain", PLAIN)],
        };

        let text = extract_text(&message_with_payload(payload)).unwrap();
        assert_eq!(text, PLAIN);
    }

    #[test]
    fn falls_back_to_stripped_html() {
        let payload = MessagePart {
            mime_type: Some("multipart/alternative".to_string()),
            headers: Vec::new(),
            body: None,
            parts: vec![leaf("text/html", HTML)],
        };

        let text = extract_text(&message_with_payload(payload)).unwrap();
        assert!(text.contains("Netflix payment of $15.49"));
        assert!(!text.contains('<'));
    }

    #[test]
    fn finds_plain_text_in_deeply_nested_parts() {
        let nested = MessagePart {
            mime_type: Some("multipart/mixed".to_string()),
            headers: Vec::new(),
            body: None,
            parts: vec![MessagePart {
                mime_type: Some("multipart/alternative".to_string()),
                headers: Vec::new(),
                body: None,
                parts: vec![leaf("text/plain", PLAIN)],
            }],
        };

        assert!(extract_text(&message_with_payload(nested)).is_some());
    }

    #[test]
    fn discards_short_bodies() {
        let payload = leaf("text/plain", "Thanks!");
        assert!(extract_text(&message_with_payload(payload)).is_none());
    }

    #[test]
    fn discards_messages_without_a_body() {
        let payload = MessagePart {
            mime_type: Some("multipart/alternative".to_string()),
            headers: Vec::new(),
            body: None,
            parts: Vec::new(),
        };
        assert!(extract_text(&message_with_payload(payload)).is_none());
    }

    #[test]
    fn html_strip_drops_script_and_style_contents() {
        let html = "<html><style>body { color: red }</style><body>Visible \
                    <script>var hidden = 1;</script>text</body></html>";
        let text = html_to_text(html);
        assert!(text.contains("Visible text"));
        assert!(!text.contains("hidden"));
        assert!(!text.contains("color"));
    }

    #[test]
    fn tolerates_padded_base64() {
        let padded = base64::engine::general_purpose::URL_SAFE.encode(PLAIN.as_bytes());
        let payload = MessagePart {
            mime_type: Some("text/plain".to_string()),
            headers: Vec::new(),
            body: Some(PartBody {
                size: None,
                data: Some(padded),
            }),
            parts: Vec::new(),
        };
        assert!(extract_text(&message_with_payload(payload)).is_some());
    }
}
