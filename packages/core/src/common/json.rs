//! Lenient JSON extraction for model output.
//!
//! Vision and text models frequently wrap their JSON in prose or code
//! fences. Parsing proceeds in stages: strict parse, then the first
//! brace-balanced block containing the required key, then `None` so the
//! caller can apply its fallback.

use serde_json::Value;

/// Try to pull a JSON object out of free-form model output.
///
/// `required_key` guards against grabbing an unrelated object embedded in
/// the reply (e.g. an example the model echoed back).
pub fn extract_object(text: &str, required_key: &str) -> Option<Value> {
    let trimmed = text.trim();

    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        if v.get(required_key).is_some() {
            return Some(v);
        }
    }

    // Scan for brace-balanced candidate blocks.
    let bytes = trimmed.as_bytes();
    let mut start = None;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        if let Some(s) = start {
                            if let Ok(v) = serde_json::from_str::<Value>(&trimmed[s..=i]) {
                                if v.get(required_key).is_some() {
                                    return Some(v);
                                }
                            }
                        }
                        start = None;
                    }
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_json_parses() {
        let v = extract_object(r#"{"score": 85, "issue": null}"#, "score").unwrap();
        assert_eq!(v["score"], 85);
    }

    #[test]
    fn json_in_prose_is_found() {
        let text = r#"Sure! Here is my assessment:
{"score": 40, "issue": "paywall", "reasoning": "subscription wall visible"}
Hope that helps."#;
        let v = extract_object(text, "score").unwrap();
        assert_eq!(v["issue"], "paywall");
    }

    #[test]
    fn json_in_code_fence_is_found() {
        let text = "```json\n{\"score\": 90, \"issue\": null}\n```";
        let v = extract_object(text, "score").unwrap();
        assert_eq!(v["score"], 90);
    }

    #[test]
    fn object_without_required_key_is_skipped() {
        let text = r#"{"example": 1} then the real one {"score": 10}"#;
        let v = extract_object(text, "score").unwrap();
        assert_eq!(v["score"], 10);
    }

    #[test]
    fn nested_braces_are_balanced() {
        let text = r#"result: {"score": 70, "detail": {"inner": true}} done"#;
        let v = extract_object(text, "score").unwrap();
        assert_eq!(v["detail"]["inner"], true);
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_scanner() {
        let text = r#"{"score": 5, "reasoning": "page shows { and } glyphs"}"#;
        let v = extract_object(text, "score").unwrap();
        assert_eq!(v["score"], 5);
    }

    #[test]
    fn garbage_yields_none() {
        assert!(extract_object("no json here at all", "score").is_none());
        assert!(extract_object("{broken: json", "score").is_none());
    }
}
