use crate::har::CapturedEntry;

/// Request bodies kept in a session are cut to this many characters.
pub const MAX_STORED_REQUEST_BODY_CHARS: usize = 10_000;

/// Drop response bodies and cap request bodies before entries are stored.
///
/// Response text is never needed after upload. Request text is kept because
/// the curl command replays it, but oversized payloads are truncated silently;
/// a byte-exact body for a request over the cap is not reproducible from a
/// stored session.
pub fn strip_bodies(entries: &mut [CapturedEntry]) {
    for captured in entries.iter_mut() {
        captured.entry.response.content.text = None;

        if let Some(text) = captured
            .entry
            .request
            .post_data
            .as_mut()
            .and_then(|p| p.text.as_mut())
        {
            truncate_chars(text, MAX_STORED_REQUEST_BODY_CHARS);
        }
    }
}

fn truncate_chars(text: &mut String, max_chars: usize) {
    if let Some((byte_idx, _)) = text.char_indices().nth(max_chars) {
        text.truncate(byte_idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::har::{parse_har_str, CapturedEntry};

    fn captured(request_text: &str, response_text: &str) -> Vec<CapturedEntry> {
        let json = serde_json::json!({
            "log": {"entries": [{
                "request": {
                    "method": "POST",
                    "url": "https://api.example.com/upload",
                    "postData": {"mimeType": "application/json", "text": request_text}
                },
                "response": {
                    "status": 200,
                    "content": {"size": 5, "mimeType": "application/json", "text": response_text}
                }
            }]}
        });
        let har = parse_har_str(&json.to_string()).unwrap();
        CapturedEntry::enumerate(har.log.entries)
    }

    #[test]
    fn response_text_never_survives_a_round_trip() {
        let mut entries = captured("{}", "{\"secret\":\"response-body\"}");
        strip_bodies(&mut entries);
        let serialized = serde_json::to_string(&entries).unwrap();
        assert!(!serialized.contains("response-body"));
        assert_eq!(entries[0].entry.response.content.size, 5);
    }

    #[test]
    fn long_request_bodies_are_cut_to_exactly_the_cap() {
        let long = "a".repeat(MAX_STORED_REQUEST_BODY_CHARS + 500);
        let mut entries = captured(&long, "");
        strip_bodies(&mut entries);
        let text = entries[0].entry.request.post_data.as_ref().unwrap().text.as_ref().unwrap();
        assert_eq!(text.chars().count(), MAX_STORED_REQUEST_BODY_CHARS);
    }

    #[test]
    fn truncation_respects_multibyte_characters() {
        let long = "é".repeat(MAX_STORED_REQUEST_BODY_CHARS + 1);
        let mut entries = captured(&long, "");
        strip_bodies(&mut entries);
        let text = entries[0].entry.request.post_data.as_ref().unwrap().text.as_ref().unwrap();
        assert_eq!(text.chars().count(), MAX_STORED_REQUEST_BODY_CHARS);
    }

    #[test]
    fn short_request_bodies_are_untouched() {
        let mut entries = captured("{\"name\":\"x\"}", "ok");
        strip_bodies(&mut entries);
        let text = entries[0].entry.request.post_data.as_ref().unwrap().text.as_deref();
        assert_eq!(text, Some("{\"name\":\"x\"}"));
    }
}
