// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cleanup of model replies before JSON decoding.

use serde::de::DeserializeOwned;
use threadline_core::ThreadlineError;

/// Split off a `<think>...</think>` block. Returns the remaining reply and
/// the reasoning text, if any.
pub fn strip_thinking(reply: &str) -> (&str, Option<&str>) {
    const OPEN: &str = "<think>";
    const CLOSE: &str = "</think>";

    match (reply.find(OPEN), reply.find(CLOSE)) {
        (Some(start), Some(end)) if start < end => {
            let thinking = reply[start + OPEN.len()..end].trim();
            (&reply[end + CLOSE.len()..], Some(thinking))
        }
        _ => (reply, None),
    }
}

/// Remove a surrounding Markdown code fence (```` ```json ```` or bare).
pub fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = body.strip_prefix("json").unwrap_or(body);
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Decode a model reply as JSON after removing reasoning and fences.
pub fn parse_json_reply<T: DeserializeOwned>(reply: &str) -> Result<T, ThreadlineError> {
    let (reply, _) = strip_thinking(reply);
    let body = strip_code_fence(reply);
    serde_json::from_str(body).map_err(|e| {
        let preview: String = body.chars().take(200).collect();
        ThreadlineError::Parse(format!("model reply is not valid JSON ({e}): {preview}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thinking_block_is_removed() {
        let (rest, thinking) = strip_thinking("<think>\nlet me see\n</think>\n[1]");
        assert_eq!(thinking, Some("let me see"));
        assert_eq!(rest.trim(), "[1]");

        assert_eq!(strip_thinking("[1]"), ("[1]", None));
        assert_eq!(strip_thinking("</think><think>"), ("</think><think>", None));
    }

    #[test]
    fn fences() {
        assert_eq!(strip_code_fence("```json\n[1, 2]\n```"), "[1, 2]");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  [3] "), "[3]");
    }

    #[test]
    fn parses_through_both() {
        let value: Vec<i64> =
            parse_json_reply("<think>ok</think>```json\n[4, 5]\n```").unwrap();
        assert_eq!(value, vec![4, 5]);

        assert!(matches!(
            parse_json_reply::<Vec<i64>>("sorry, I can't"),
            Err(ThreadlineError::Parse(_))
        ));
    }
}
